//! Epoch segmentation.
//!
//! For every event with a mapped code we cut the window
//! `[sample + round(tmin * sfreq), sample + round(tmax * sfreq)]` (inclusive) from
//! the selected channels, subtract the per-channel baseline mean and apply the
//! optional peak-to-peak thresholds.
//!
//! Windows that do not fit inside the recording are dropped without failing the
//! run; every drop is recorded in `Epochs::drop_log`.

use tracing::{debug, info};

use crate::domain::{
    ConditionMap, DropEntry, DropReason, Epoch, EpochConfig, Epochs, Event, Recording, TimeKey,
};
use crate::error::AppError;

/// Segment a recording into baseline-corrected epochs.
///
/// `exclude` names a channel (usually the trigger channel) that is left out when
/// `config.picks` is empty.
pub fn segment(
    recording: &Recording,
    events: &[Event],
    conditions: &ConditionMap,
    config: &EpochConfig,
    exclude: Option<&str>,
) -> Result<Epochs, AppError> {
    let sfreq = recording.sfreq;
    let picks = resolve_picks(recording, &config.picks, exclude)?;

    let start = (config.tmin * sfreq).round() as i64;
    let stop = (config.tmax * sfreq).round() as i64;
    if stop <= start {
        return Err(AppError::config(format!(
            "Epoch window [{}, {}] s covers fewer than two samples at {sfreq} Hz.",
            config.tmin, config.tmax
        )));
    }
    let keys: Vec<TimeKey> = (start..=stop).map(TimeKey).collect();
    let times: Vec<f64> = keys.iter().map(|k| k.seconds(sfreq)).collect();

    let baseline = match &config.baseline {
        Some(window) => Some(baseline_range(
            window.start.unwrap_or(config.tmin),
            window.end.unwrap_or(config.tmax),
            start,
            stop,
            sfreq,
        )?),
        None => None,
    };

    let n_samples = recording.n_samples() as i64;
    let channel_names: Vec<String> = picks
        .iter()
        .map(|&i| recording.channels[i].name.clone())
        .collect();

    let mut epochs = Vec::new();
    let mut drop_log = Vec::new();

    for &event in events {
        let Some(condition) = conditions.condition_of(event.code) else {
            continue;
        };

        let lo = event.sample as i64 + start;
        let hi = event.sample as i64 + stop;
        if lo < 0 || hi >= n_samples {
            debug!(sample = event.sample, code = event.code, "epoch window out of bounds");
            drop_log.push(DropEntry {
                event,
                reason: DropReason::OutOfBounds,
            });
            continue;
        }
        let (lo, hi) = (lo as usize, hi as usize);

        let mut data = Vec::with_capacity(picks.len());
        for &ch in &picks {
            let mut row = recording.data[ch][lo..=hi].to_vec();
            if let Some((b0, b1)) = baseline {
                let mean = row[b0..=b1].iter().sum::<f64>() / (b1 - b0 + 1) as f64;
                for v in &mut row {
                    *v -= mean;
                }
            }
            data.push(row);
        }

        if let Some(reason) = rejection(&data, &channel_names, config) {
            debug!(sample = event.sample, code = event.code, reason = reason.label(), "epoch rejected");
            drop_log.push(DropEntry { event, reason });
            continue;
        }

        epochs.push(Epoch {
            index: epochs.len(),
            event,
            condition,
            data,
        });
    }

    let out = Epochs {
        sfreq,
        keys,
        times,
        channels: channel_names,
        conditions: conditions.labels(),
        epochs,
        drop_log,
    };

    info!(
        kept = out.len(),
        matched = out.n_matched(),
        out_of_bounds = out.n_out_of_bounds(),
        rejected = out.drop_log.len() - out.n_out_of_bounds(),
        "segmented epochs"
    );
    Ok(out)
}

fn resolve_picks(recording: &Recording, picks: &[String], exclude: Option<&str>) -> Result<Vec<usize>, AppError> {
    if picks.is_empty() {
        let all: Vec<usize> = recording
            .channels
            .iter()
            .enumerate()
            .filter(|(_, c)| Some(c.name.as_str()) != exclude)
            .map(|(i, _)| i)
            .collect();
        if all.is_empty() {
            return Err(AppError::config("No data channels left after excluding the trigger channel."));
        }
        return Ok(all);
    }

    picks
        .iter()
        .map(|name| {
            recording.channel_index(name).ok_or_else(|| {
                AppError::config(format!(
                    "Channel '{name}' not found (channels: {}).",
                    recording.channel_names().join(", ")
                ))
            })
        })
        .collect()
}

/// Baseline window as inclusive indices into the epoch's time grid.
fn baseline_range(bmin: f64, bmax: f64, start: i64, stop: i64, sfreq: f64) -> Result<(usize, usize), AppError> {
    if !(bmin.is_finite() && bmax.is_finite()) || bmax < bmin {
        return Err(AppError::config(format!("Invalid baseline window [{bmin}, {bmax}].")));
    }
    let b0 = (bmin * sfreq).round() as i64;
    let b1 = (bmax * sfreq).round() as i64;
    if b0 < start || b1 > stop {
        return Err(AppError::config(format!(
            "Baseline window [{bmin}, {bmax}] s lies outside the epoch window."
        )));
    }
    Ok(((b0 - start) as usize, (b1 - start) as usize))
}

fn rejection(data: &[Vec<f64>], channels: &[String], config: &EpochConfig) -> Option<DropReason> {
    if config.reject.is_none() && config.flat.is_none() {
        return None;
    }
    for (row, name) in data.iter().zip(channels) {
        let (lo, hi) = row
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let p2p = hi - lo;
        if let Some(limit) = config.reject {
            if p2p > limit {
                return Some(DropReason::PeakToPeak {
                    channel: name.clone(),
                    value: p2p,
                });
            }
        }
        if let Some(limit) = config.flat {
            if p2p < limit {
                return Some(DropReason::Flat {
                    channel: name.clone(),
                    value: p2p,
                });
            }
        }
    }
    None
}
