//! Shared domain types.
//!
//! These types flow through the pipeline in order:
//!
//! - `Recording` (loaded once, immutable)
//! - `Event` list (sorted by sample index)
//! - `Epochs` (one shared time grid, one row per selected channel)
//! - `ObservationTable` (flat rows consumed by the fitter)
//! - `GridRow` / `Prediction` / `IntervalSummary` (model queries and outputs)

use std::path::PathBuf;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Metadata for one recorded channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub name: String,
    /// Unit label as written in the header (samples are always stored in µV).
    pub unit: String,
}

impl ChannelInfo {
    pub fn new(name: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
        }
    }
}

/// A marker as stored in the marker file.
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    /// Marker type (`Stimulus`, `Response`, `New Segment`, ...).
    pub kind: String,
    pub description: String,
    /// 0-based sample index.
    pub sample: usize,
    /// Length in samples (1 for point events).
    pub duration: usize,
    /// 0 means "all channels".
    pub channel: usize,
}

/// A continuous multi-channel recording.
#[derive(Debug, Clone)]
pub struct Recording {
    pub sfreq: f64,
    pub channels: Vec<ChannelInfo>,
    /// Channel-major samples in µV: `data[channel][sample]`.
    pub data: Vec<Vec<f64>>,
    pub markers: Vec<Marker>,
    pub meas_date: Option<NaiveDateTime>,
    pub source: Option<PathBuf>,
}

impl Recording {
    /// Build a recording, checking that every channel has the same length.
    pub fn new(sfreq: f64, channels: Vec<ChannelInfo>, data: Vec<Vec<f64>>) -> Result<Self, AppError> {
        if !(sfreq.is_finite() && sfreq > 0.0) {
            return Err(AppError::load(format!("Invalid sampling rate: {sfreq}")));
        }
        if channels.is_empty() {
            return Err(AppError::load("Recording has no channels."));
        }
        if channels.len() != data.len() {
            return Err(AppError::load(format!(
                "Channel count ({}) does not match data rows ({}).",
                channels.len(),
                data.len()
            )));
        }
        let n = data[0].len();
        if data.iter().any(|row| row.len() != n) {
            return Err(AppError::load("Channels have different sample counts."));
        }
        Ok(Self {
            sfreq,
            channels,
            data,
            markers: Vec::new(),
            meas_date: None,
            source: None,
        })
    }

    pub fn with_markers(mut self, markers: Vec<Marker>) -> Self {
        self.markers = markers;
        self
    }

    pub fn n_samples(&self) -> usize {
        self.data.first().map(|row| row.len()).unwrap_or(0)
    }

    pub fn n_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn duration_secs(&self) -> f64 {
        self.n_samples() as f64 / self.sfreq
    }

    pub fn channel_index(&self, name: &str) -> Option<usize> {
        self.channels.iter().position(|c| c.name == name)
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.name.clone()).collect()
    }
}

/// A trigger event: sample index plus integer stimulus code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Event {
    pub sample: usize,
    pub code: u32,
}

impl Event {
    pub fn new(sample: usize, code: u32) -> Self {
        Self { sample, code }
    }
}

/// Where the event extractor looks for triggers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    /// Stimulus/response markers from the marker file.
    Markers,
    /// Onsets on the named trigger channel.
    TriggerChannel(String),
}

/// Mapping from event codes to condition labels.
///
/// Conditions are indexed by the order in which their label first appears;
/// condition 0 is the reference level for treatment contrasts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionMap {
    entries: Vec<(u32, String)>,
}

impl ConditionMap {
    pub fn new(entries: Vec<(u32, String)>) -> Result<Self, AppError> {
        if entries.is_empty() {
            return Err(AppError::config("At least one event code must be mapped to a condition."));
        }
        for (i, (code, label)) in entries.iter().enumerate() {
            if label.trim().is_empty() {
                return Err(AppError::config(format!("Empty condition label for code {code}.")));
            }
            if entries[..i].iter().any(|(c, _)| c == code) {
                return Err(AppError::config(format!("Event code {code} is mapped twice.")));
            }
        }
        Ok(Self { entries })
    }

    /// Condition labels in index order.
    pub fn labels(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for (_, label) in &self.entries {
            if !out.contains(label) {
                out.push(label.clone());
            }
        }
        out
    }

    /// Condition index for an event code, if the code is mapped.
    pub fn condition_of(&self, code: u32) -> Option<usize> {
        let (_, label) = self.entries.iter().find(|(c, _)| *c == code)?;
        self.labels().iter().position(|l| l == label)
    }

    pub fn entries(&self) -> &[(u32, String)] {
        &self.entries
    }
}

/// Integer sample offset from the event anchor.
///
/// Used as the grouping key for time points so that grouping never compares
/// floating-point times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeKey(pub i64);

impl TimeKey {
    pub fn seconds(self, sfreq: f64) -> f64 {
        self.0 as f64 / sfreq
    }
}

/// One event-locked window.
#[derive(Debug, Clone)]
pub struct Epoch {
    /// Position among the kept epochs.
    pub index: usize,
    pub event: Event,
    pub condition: usize,
    /// `data[channel][time]`, baseline corrected.
    pub data: Vec<Vec<f64>>,
}

/// Why a matched event did not produce an epoch.
#[derive(Debug, Clone, PartialEq)]
pub enum DropReason {
    /// Window extends past the start or end of the recording.
    OutOfBounds,
    /// Peak-to-peak amplitude above the rejection threshold.
    PeakToPeak { channel: String, value: f64 },
    /// Peak-to-peak amplitude below the flatness threshold.
    Flat { channel: String, value: f64 },
}

impl DropReason {
    pub fn label(&self) -> &'static str {
        match self {
            DropReason::OutOfBounds => "out of bounds",
            DropReason::PeakToPeak { .. } => "peak-to-peak",
            DropReason::Flat { .. } => "flat",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropEntry {
    pub event: Event,
    pub reason: DropReason,
}

/// Epochs of a run, sharing one time grid.
#[derive(Debug, Clone)]
pub struct Epochs {
    pub sfreq: f64,
    /// Sample offsets of the window, ascending.
    pub keys: Vec<TimeKey>,
    /// `keys` in seconds.
    pub times: Vec<f64>,
    pub channels: Vec<String>,
    pub conditions: Vec<String>,
    pub epochs: Vec<Epoch>,
    pub drop_log: Vec<DropEntry>,
}

impl Epochs {
    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    /// Events that had a mapped code (kept + dropped).
    pub fn n_matched(&self) -> usize {
        self.epochs.len() + self.drop_log.len()
    }

    pub fn n_out_of_bounds(&self) -> usize {
        self.drop_log
            .iter()
            .filter(|d| d.reason == DropReason::OutOfBounds)
            .count()
    }

    pub fn count_for_condition(&self, condition: usize) -> usize {
        self.epochs.iter().filter(|e| e.condition == condition).count()
    }
}

/// One flat observation consumed by the fitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObservationRow {
    pub epoch: usize,
    pub condition: usize,
    pub time_key: TimeKey,
    pub time: f64,
    pub channel: usize,
    pub amplitude: f64,
}

/// Flattened epochs plus the label tables the row indices refer to.
#[derive(Debug, Clone)]
pub struct ObservationTable {
    pub rows: Vec<ObservationRow>,
    pub conditions: Vec<String>,
    pub channels: Vec<String>,
    pub sfreq: f64,
}

impl ObservationTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A synthetic (condition, time) query point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridRow {
    pub condition: usize,
    pub time: f64,
}

impl GridRow {
    pub fn new(condition: usize, time: f64) -> Self {
        Self { condition, time }
    }
}

/// Conditional expectation at a grid row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub condition: usize,
    pub time: f64,
    pub fit: f64,
}

/// Bootstrap summary at a grid row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IntervalSummary {
    pub condition: usize,
    pub time: f64,
    pub mean: f64,
    pub median: f64,
    pub lower: f64,
    pub upper: f64,
}

impl IntervalSummary {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}
