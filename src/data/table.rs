//! Flatten epochs into observation rows.

use tracing::info;

use crate::domain::{Epochs, ObservationRow, ObservationTable};

/// One row per (epoch, channel, time point), ordered epoch-major.
pub fn tabulize(epochs: &Epochs) -> ObservationTable {
    let n_rows = epochs.len() * epochs.channels.len() * epochs.keys.len();
    let mut rows = Vec::with_capacity(n_rows);

    for epoch in &epochs.epochs {
        for (channel, trace) in epoch.data.iter().enumerate() {
            for (j, &amplitude) in trace.iter().enumerate() {
                rows.push(ObservationRow {
                    epoch: epoch.index,
                    condition: epoch.condition,
                    time_key: epochs.keys[j],
                    time: epochs.times[j],
                    channel,
                    amplitude,
                });
            }
        }
    }

    info!(rows = rows.len(), "tabulized observations");
    ObservationTable {
        rows,
        conditions: epochs.conditions.clone(),
        channels: epochs.channels.clone(),
        sfreq: epochs.sfreq,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Epoch, Event, TimeKey};

    #[test]
    fn rows_cover_every_epoch_channel_and_time() {
        let epochs = Epochs {
            sfreq: 10.0,
            keys: vec![TimeKey(-1), TimeKey(0), TimeKey(1)],
            times: vec![-0.1, 0.0, 0.1],
            channels: vec!["Cz".to_string(), "Pz".to_string()],
            conditions: vec!["a".to_string(), "b".to_string()],
            epochs: vec![
                Epoch {
                    index: 0,
                    event: Event::new(10, 1),
                    condition: 0,
                    data: vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]],
                },
                Epoch {
                    index: 1,
                    event: Event::new(20, 2),
                    condition: 1,
                    data: vec![vec![7.0, 8.0, 9.0], vec![10.0, 11.0, 12.0]],
                },
            ],
            drop_log: Vec::new(),
        };

        let table = tabulize(&epochs);
        assert_eq!(table.len(), 12);

        let row = table.rows[10];
        assert_eq!(row.epoch, 1);
        assert_eq!(row.condition, 1);
        assert_eq!(row.channel, 1);
        assert_eq!(row.time_key, TimeKey(0));
        assert_eq!(row.amplitude, 11.0);
    }
}
