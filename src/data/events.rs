//! Event extraction.
//!
//! Events come either from the marker file (stimulus/response markers whose
//! description ends in an integer, e.g. `S  1`) or from a trigger channel,
//! where every change to a new non-zero value is an onset.
//!
//! The output is sorted by sample index. Duplicates at the same sample are kept;
//! callers that need unique onsets must filter them.

use tracing::{debug, info};

use crate::domain::{Event, EventSource, Recording};
use crate::error::{AppError, ErrorKind};

/// Extract events from a recording.
pub fn find_events(recording: &Recording, source: &EventSource) -> Result<Vec<Event>, AppError> {
    let mut events = match source {
        EventSource::Markers => events_from_markers(recording),
        EventSource::TriggerChannel(name) => {
            let idx = recording.channel_index(name).ok_or_else(|| {
                AppError::config(format!(
                    "Trigger channel '{name}' not found (channels: {}).",
                    recording.channel_names().join(", ")
                ))
            })?;
            events_from_trigger(&recording.data[idx])
        }
    };

    // Stable: equal samples keep their file order.
    events.sort_by_key(|e| e.sample);

    if events.is_empty() {
        let origin = match source {
            EventSource::Markers => "marker file".to_string(),
            EventSource::TriggerChannel(name) => format!("trigger channel '{name}'"),
        };
        return Err(AppError::new(
            ErrorKind::NoEventsFound,
            format!("No events found in {origin}."),
        ));
    }

    info!(count = events.len(), "extracted events");
    Ok(events)
}

fn events_from_markers(recording: &Recording) -> Vec<Event> {
    recording
        .markers
        .iter()
        .filter(|m| m.kind.eq_ignore_ascii_case("Stimulus") || m.kind.eq_ignore_ascii_case("Response"))
        .filter_map(|m| marker_code(&m.description).map(|code| Event::new(m.sample, code)))
        .collect()
}

/// Trailing integer of a marker description (`"S  1"` -> 1, `"R 12"` -> 12).
fn marker_code(description: &str) -> Option<u32> {
    let digits: String = description
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<char>>()
        .into_iter()
        .rev()
        .collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok().filter(|code| *code > 0)
}

/// Onsets on a trigger channel: samples whose value differs from the previous
/// sample and is non-zero.
///
/// Values that do not fit a `u32` code are skipped.
fn events_from_trigger(channel: &[f64]) -> Vec<Event> {
    let mut out = Vec::new();
    let mut prev = 0i64;
    for (sample, &value) in channel.iter().enumerate() {
        let cur = if value.is_finite() { value.round() as i64 } else { 0 };
        if cur != prev && cur > 0 {
            match u32::try_from(cur) {
                Ok(code) => out.push(Event::new(sample, code)),
                Err(_) => debug!(sample, value, "skipping trigger value outside the code range"),
            }
        }
        prev = cur;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChannelInfo, Marker};

    fn marker(kind: &str, description: &str, sample: usize) -> Marker {
        Marker {
            kind: kind.to_string(),
            description: description.to_string(),
            sample,
            duration: 1,
            channel: 0,
        }
    }

    fn recording(trigger: Vec<f64>) -> Recording {
        let n = trigger.len();
        Recording::new(
            100.0,
            vec![ChannelInfo::new("Cz", "µV"), ChannelInfo::new("STI", "µV")],
            vec![vec![0.0; n], trigger],
        )
        .unwrap()
    }

    #[test]
    fn marker_codes_are_trailing_integers() {
        assert_eq!(marker_code("S  1"), Some(1));
        assert_eq!(marker_code("R 12"), Some(12));
        assert_eq!(marker_code("boundary"), None);
        assert_eq!(marker_code("S  0"), None);
    }

    #[test]
    fn markers_are_sorted_and_duplicates_kept() {
        let rec = recording(vec![0.0; 50]).with_markers(vec![
            marker("New Segment", "", 0),
            marker("Stimulus", "S  2", 30),
            marker("Stimulus", "S  1", 10),
            marker("Response", "R  1", 30),
            marker("Comment", "S  9", 40),
        ]);
        let events = find_events(&rec, &EventSource::Markers).unwrap();
        assert_eq!(
            events,
            vec![Event::new(10, 1), Event::new(30, 2), Event::new(30, 1)]
        );
    }

    #[test]
    fn trigger_channel_reports_onsets_only() {
        let mut trig = vec![0.0; 20];
        // A held pulse counts once; a change of value while high is a new event.
        trig[2] = 1.0;
        trig[3] = 1.0;
        trig[4] = 1.0;
        trig[8] = 2.0;
        trig[9] = 3.0;
        trig[15] = 1.0;
        let rec = recording(trig);
        let events = find_events(&rec, &EventSource::TriggerChannel("STI".to_string())).unwrap();
        assert_eq!(
            events,
            vec![Event::new(2, 1), Event::new(8, 2), Event::new(9, 3), Event::new(15, 1)]
        );
    }

    #[test]
    fn trigger_values_beyond_u32_are_skipped() {
        let mut trig = vec![0.0; 10];
        trig[2] = 5e9;
        trig[6] = 4.0;
        let rec = recording(trig);
        let events = find_events(&rec, &EventSource::TriggerChannel("STI".to_string())).unwrap();
        assert_eq!(events, vec![Event::new(6, 4)]);
    }

    #[test]
    fn no_events_is_an_error() {
        let rec = recording(vec![0.0; 10]);
        let err = find_events(&rec, &EventSource::TriggerChannel("STI".to_string())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoEventsFound);

        let err = find_events(&rec, &EventSource::Markers).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoEventsFound);
    }

    #[test]
    fn unknown_trigger_channel_is_a_config_error() {
        let rec = recording(vec![0.0; 10]);
        let err = find_events(&rec, &EventSource::TriggerChannel("TRIG".to_string())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}
