//! BrainVision recording reader and writer.
//!
//! A recording is a triplet of files:
//!
//! - `.vhdr`: INI-like header (channels, sampling interval, binary layout)
//! - `.vmrk`: markers (stimulus/response codes, segment start date)
//! - `.eeg`: raw little-endian samples
//!
//! Samples are scaled by each channel's resolution and converted to µV on load.
//! The writer always produces `IEEE_FLOAT_32`, multiplexed data.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDateTime};
use tracing::{debug, warn};

use crate::domain::{ChannelInfo, Marker, Recording};
use crate::error::AppError;

const HEADER_MAGIC: &str = "Brain Vision Data Exchange Header File Version 1.0";
const MARKER_MAGIC: &str = "Brain Vision Data Exchange Marker File, Version 1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Orientation {
    Multiplexed,
    Vectorized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryFormat {
    Int16,
    Int32,
    Float32,
}

impl BinaryFormat {
    fn parse(value: &str) -> Result<Self, AppError> {
        match value.trim().to_ascii_uppercase().as_str() {
            "INT_16" => Ok(Self::Int16),
            "INT_32" => Ok(Self::Int32),
            "IEEE_FLOAT_32" => Ok(Self::Float32),
            other => Err(AppError::load(format!("Unsupported BinaryFormat '{other}'."))),
        }
    }

    fn bytes(self) -> usize {
        match self {
            Self::Int16 => 2,
            Self::Int32 | Self::Float32 => 4,
        }
    }

    fn decode(self, b: &[u8]) -> f64 {
        match self {
            Self::Int16 => i16::from_le_bytes([b[0], b[1]]) as f64,
            Self::Int32 => i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64,
            Self::Float32 => f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64,
        }
    }
}

/// Flat `(section, key, value)` view of an INI-like file.
#[derive(Debug, Default)]
struct IniFile {
    entries: Vec<(String, String, String)>,
}

impl IniFile {
    fn parse(text: &str) -> Self {
        let mut entries = Vec::new();
        let mut section = String::new();
        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with(';') {
                continue;
            }
            if line.starts_with('[') && line.ends_with(']') {
                section = line[1..line.len() - 1].trim().to_string();
                continue;
            }
            // Free text ([Comment] blocks, the magic line) has no `=`.
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            entries.push((section.clone(), key.trim().to_string(), value.trim().to_string()));
        }
        Self { entries }
    }

    fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(s, k, _)| s.eq_ignore_ascii_case(section) && k.eq_ignore_ascii_case(key))
            .map(|(_, _, v)| v.as_str())
    }

    fn require(&self, section: &str, key: &str) -> Result<&str, AppError> {
        self.get(section, key)
            .ok_or_else(|| AppError::load(format!("Header is missing [{section}] {key}.")))
    }

    /// Entries `<prefix><n>` of a section, ordered by `n`.
    fn numbered(&self, section: &str, prefix: &str) -> Vec<(usize, &str)> {
        let mut out: Vec<(usize, &str)> = self
            .entries
            .iter()
            .filter(|(s, _, _)| s.eq_ignore_ascii_case(section))
            .filter_map(|(_, k, v)| {
                let rest = k.strip_prefix(prefix)?;
                rest.parse::<usize>().ok().map(|n| (n, v.as_str()))
            })
            .collect();
        out.sort_by_key(|(n, _)| *n);
        out
    }
}

/// Read a recording from its `.vhdr` header path.
pub fn read_recording(vhdr: &Path) -> Result<Recording, AppError> {
    let text = fs::read_to_string(vhdr)
        .map_err(|e| AppError::load(format!("Failed to read header '{}': {e}", vhdr.display())))?;

    let first = text.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    if !(first.contains("Brain Vision") || first.contains("BrainVision")) {
        return Err(AppError::load(format!(
            "'{}' is not a BrainVision header.",
            vhdr.display()
        )));
    }

    let ini = IniFile::parse(&text);
    let base = vhdr.parent().unwrap_or_else(|| Path::new("."));

    let data_format = ini.require("Common Infos", "DataFormat")?;
    if !data_format.eq_ignore_ascii_case("BINARY") {
        return Err(AppError::load(format!("Unsupported DataFormat '{data_format}'.")));
    }

    let orientation = match ini.get("Common Infos", "DataOrientation") {
        None => Orientation::Multiplexed,
        Some(v) if v.eq_ignore_ascii_case("MULTIPLEXED") => Orientation::Multiplexed,
        Some(v) if v.eq_ignore_ascii_case("VECTORIZED") => Orientation::Vectorized,
        Some(v) => return Err(AppError::load(format!("Unsupported DataOrientation '{v}'."))),
    };

    let n_channels: usize = parse_field(ini.require("Common Infos", "NumberOfChannels")?, "NumberOfChannels")?;
    if n_channels == 0 {
        return Err(AppError::load("NumberOfChannels must be > 0."));
    }

    let interval_us: f64 = parse_field(ini.require("Common Infos", "SamplingInterval")?, "SamplingInterval")?;
    if !(interval_us.is_finite() && interval_us > 0.0) {
        return Err(AppError::load(format!("Invalid SamplingInterval {interval_us}.")));
    }
    let sfreq = 1e6 / interval_us;

    let format = BinaryFormat::parse(ini.require("Binary Infos", "BinaryFormat")?)?;

    let channel_lines = ini.numbered("Channel Infos", "Ch");
    if channel_lines.len() != n_channels {
        return Err(AppError::load(format!(
            "Header declares {n_channels} channels but lists {}.",
            channel_lines.len()
        )));
    }
    let mut channels = Vec::with_capacity(n_channels);
    let mut scales = Vec::with_capacity(n_channels);
    for (_, line) in &channel_lines {
        let (info, scale) = parse_channel(line)?;
        channels.push(info);
        scales.push(scale);
    }

    let data_path = base.join(ini.require("Common Infos", "DataFile")?);
    let bytes = fs::read(&data_path)
        .map_err(|e| AppError::load(format!("Failed to read data file '{}': {e}", data_path.display())))?;

    let bps = format.bytes();
    let frame = n_channels * bps;
    if bytes.len() % frame != 0 {
        return Err(AppError::load(format!(
            "Data file size {} is not a multiple of the frame size {frame}.",
            bytes.len()
        )));
    }
    let n_samples = bytes.len() / frame;

    let mut data = vec![vec![0.0; n_samples]; n_channels];
    for (i, chunk) in bytes.chunks_exact(bps).enumerate() {
        let (ch, s) = match orientation {
            Orientation::Multiplexed => (i % n_channels, i / n_channels),
            Orientation::Vectorized => (i / n_samples, i % n_samples),
        };
        data[ch][s] = format.decode(chunk) * scales[ch];
    }

    let mut recording = Recording::new(sfreq, channels, data)?;

    if let Some(marker_file) = ini.get("Common Infos", "MarkerFile") {
        let vmrk = base.join(marker_file);
        let (markers, meas_date) = read_markers(&vmrk)?;
        recording.markers = markers;
        recording.meas_date = meas_date;
    }
    recording.source = Some(vhdr.to_path_buf());

    debug!(
        path = %vhdr.display(),
        channels = n_channels,
        samples = n_samples,
        sfreq,
        markers = recording.markers.len(),
        "loaded recording"
    );
    Ok(recording)
}

/// Read markers and the segment start date from a `.vmrk` file.
pub fn read_markers(vmrk: &Path) -> Result<(Vec<Marker>, Option<NaiveDateTime>), AppError> {
    let text = fs::read_to_string(vmrk)
        .map_err(|e| AppError::load(format!("Failed to read marker file '{}': {e}", vmrk.display())))?;
    parse_markers(&text)
}

fn parse_markers(text: &str) -> Result<(Vec<Marker>, Option<NaiveDateTime>), AppError> {
    let ini = IniFile::parse(text);
    let mut markers = Vec::new();
    let mut meas_date = None;

    for (n, line) in ini.numbered("Marker Infos", "Mk") {
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() < 3 {
            return Err(AppError::load(format!("Malformed marker Mk{n}: '{line}'.")));
        }
        let position: usize = parse_field(fields[2], "marker position")?;
        if position == 0 {
            return Err(AppError::load(format!("Marker Mk{n} has position 0 (positions are 1-based).")));
        }
        let duration = match fields.get(3).map(|s| s.trim()) {
            Some(s) if !s.is_empty() => parse_field(s, "marker size")?,
            _ => 1,
        };
        let channel = match fields.get(4).map(|s| s.trim()) {
            Some(s) if !s.is_empty() => parse_field(s, "marker channel")?,
            _ => 0,
        };
        let kind = fields[0].trim().to_string();
        if kind.eq_ignore_ascii_case("New Segment") {
            if let Some(stamp) = fields.get(5) {
                meas_date = parse_marker_date(stamp.trim());
            }
        }
        markers.push(Marker {
            kind,
            description: unescape(fields[1].trim()),
            sample: position - 1,
            duration,
            channel,
        });
    }

    Ok((markers, meas_date))
}

/// Parse `YYYYMMDDhhmmssuuuuuu`; all-zero stamps mean "unknown".
fn parse_marker_date(stamp: &str) -> Option<NaiveDateTime> {
    if stamp.len() < 14 || stamp.chars().all(|c| c == '0') {
        return None;
    }
    let base = NaiveDateTime::parse_from_str(&stamp[..14], "%Y%m%d%H%M%S").ok()?;
    let micros: i64 = stamp.get(14..20).and_then(|s| s.parse().ok()).unwrap_or(0);
    Some(base + Duration::microseconds(micros))
}

fn format_marker_date(date: &NaiveDateTime) -> String {
    date.format("%Y%m%d%H%M%S%6f").to_string()
}

/// Parse `<name>,<ref>,<resolution>,<unit>` into channel info and a µV scale.
fn parse_channel(line: &str) -> Result<(ChannelInfo, f64), AppError> {
    let fields: Vec<&str> = line.split(',').collect();
    let name = unescape(fields[0].trim());
    if name.is_empty() {
        return Err(AppError::load(format!("Channel with empty name: '{line}'.")));
    }
    let resolution = match fields.get(2).map(|s| s.trim()) {
        Some(s) if !s.is_empty() => parse_field::<f64>(s, "channel resolution")?,
        _ => 1.0,
    };
    let unit = match fields.get(3).map(|s| s.trim()) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => "µV".to_string(),
    };
    let unit_scale = match unit.as_str() {
        "µV" | "μV" | "uV" => 1.0,
        "mV" => 1e3,
        "V" => 1e6,
        "nV" => 1e-3,
        other => {
            warn!(channel = %name, unit = other, "unknown channel unit; samples left unscaled");
            1.0
        }
    };
    Ok((ChannelInfo { name, unit }, resolution * unit_scale))
}

/// BrainVision escapes commas inside names as `\1`.
fn unescape(s: &str) -> String {
    s.replace("\\1", ",")
}

fn escape(s: &str) -> String {
    s.replace(',', "\\1")
}

fn parse_field<T: std::str::FromStr>(value: &str, what: &str) -> Result<T, AppError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| AppError::load(format!("Invalid {what}: '{value}'.")))
}

/// Write a recording as a BrainVision triplet next to `vhdr`.
///
/// The data and marker files share the header's stem.
pub fn write_recording(vhdr: &Path, recording: &Recording) -> Result<(), AppError> {
    let stem = vhdr
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| AppError::output(format!("Invalid header path '{}'.", vhdr.display())))?;
    let base = vhdr.parent().unwrap_or_else(|| Path::new("."));
    if !base.as_os_str().is_empty() {
        fs::create_dir_all(base)
            .map_err(|e| AppError::output(format!("Failed to create '{}': {e}", base.display())))?;
    }
    let data_name = format!("{stem}.eeg");
    let marker_name = format!("{stem}.vmrk");

    let mut header = String::new();
    header.push_str(HEADER_MAGIC);
    header.push_str("\n\n[Common Infos]\nCodepage=UTF-8\n");
    header.push_str(&format!("DataFile={data_name}\nMarkerFile={marker_name}\n"));
    header.push_str("DataFormat=BINARY\nDataOrientation=MULTIPLEXED\n");
    header.push_str(&format!("NumberOfChannels={}\n", recording.n_channels()));
    header.push_str(&format!("SamplingInterval={}\n", 1e6 / recording.sfreq));
    header.push_str("\n[Binary Infos]\nBinaryFormat=IEEE_FLOAT_32\n\n[Channel Infos]\n");
    header.push_str("; Ch<n>=<name>,<reference>,<resolution>,<unit>\n");
    for (i, ch) in recording.channels.iter().enumerate() {
        header.push_str(&format!("Ch{}={},,1,µV\n", i + 1, escape(&ch.name)));
    }
    write_text(vhdr, &header)?;

    let mut vmrk = String::new();
    vmrk.push_str(MARKER_MAGIC);
    vmrk.push_str(&format!("\n\n[Common Infos]\nCodepage=UTF-8\nDataFile={data_name}\n\n[Marker Infos]\n"));
    let mut n = 1;
    if let Some(date) = &recording.meas_date {
        vmrk.push_str(&format!("Mk{n}=New Segment,,1,1,0,{}\n", format_marker_date(date)));
        n += 1;
    }
    for m in recording
        .markers
        .iter()
        .filter(|m| !m.kind.eq_ignore_ascii_case("New Segment"))
    {
        vmrk.push_str(&format!(
            "Mk{n}={},{},{},{},{}\n",
            m.kind,
            escape(&m.description),
            m.sample + 1,
            m.duration,
            m.channel
        ));
        n += 1;
    }
    write_text(&base.join(&marker_name), &vmrk)?;

    let n_samples = recording.n_samples();
    let mut bytes = Vec::with_capacity(n_samples * recording.n_channels() * 4);
    for s in 0..n_samples {
        for row in &recording.data {
            bytes.extend_from_slice(&(row[s] as f32).to_le_bytes());
        }
    }
    let data_path: PathBuf = base.join(&data_name);
    fs::write(&data_path, bytes)
        .map_err(|e| AppError::output(format!("Failed to write '{}': {e}", data_path.display())))?;

    Ok(())
}

fn write_text(path: &Path, text: &str) -> Result<(), AppError> {
    let mut file = fs::File::create(path)
        .map_err(|e| AppError::output(format!("Failed to create '{}': {e}", path.display())))?;
    file.write_all(text.as_bytes())
        .map_err(|e| AppError::output(format!("Failed to write '{}': {e}", path.display())))
}
