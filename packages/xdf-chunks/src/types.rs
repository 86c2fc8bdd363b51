use crate::error::{Result, XdfError};
use ndarray::{s, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Value format of every channel in a stream (the XDF `channel_format`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelFormat {
    Float32,
    Double64,
    String,
    Int8,
    Int16,
    Int32,
    Int64,
}

impl ChannelFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim() {
            "float32" => Some(Self::Float32),
            "double64" => Some(Self::Double64),
            "string" => Some(Self::String),
            "int8" => Some(Self::Int8),
            "int16" => Some(Self::Int16),
            "int32" => Some(Self::Int32),
            "int64" => Some(Self::Int64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Float32 => "float32",
            Self::Double64 => "double64",
            Self::String => "string",
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
        }
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, Self::String)
    }

    /// Encoded width of one value, `None` for variable-length strings
    pub fn value_size(&self) -> Option<usize> {
        match self {
            Self::Int8 => Some(1),
            Self::Int16 => Some(2),
            Self::Float32 | Self::Int32 => Some(4),
            Self::Double64 | Self::Int64 => Some(8),
            Self::String => None,
        }
    }
}

/// Full stream header as declared in the recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub stream_id: u32,
    pub name: String,
    #[serde(rename = "type")]
    pub stream_type: String,
    pub channel_count: usize,
    /// 0.0 marks an irregular (event) stream
    pub nominal_srate: f64,
    pub channel_format: ChannelFormat,
    pub source_id: String,
    /// Labels from `desc/channels/channel/label`; empty when the header has none
    pub channel_labels: Vec<String>,
}

impl StreamInfo {
    pub fn new(
        stream_id: u32,
        name: impl Into<String>,
        stream_type: impl Into<String>,
        channel_count: usize,
        nominal_srate: f64,
        channel_format: ChannelFormat,
    ) -> Self {
        Self {
            stream_id,
            name: name.into(),
            stream_type: stream_type.into(),
            channel_count,
            nominal_srate,
            channel_format,
            source_id: String::new(),
            channel_labels: Vec::new(),
        }
    }

    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.channel_labels = labels;
        self
    }

    pub fn is_irregular(&self) -> bool {
        self.nominal_srate <= 0.0
    }
}

/// Digest of a stream header exposed by the iterators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamMetadata {
    pub name: String,
    #[serde(rename = "type")]
    pub stream_type: String,
    pub channel_count: usize,
    pub nominal_srate: f64,
}

impl From<&StreamInfo> for StreamMetadata {
    fn from(info: &StreamInfo) -> Self {
        Self {
            name: info.name.clone(),
            stream_type: info.stream_type.clone(),
            channel_count: info.channel_count,
            nominal_srate: info.nominal_srate,
        }
    }
}

/// Sample matrix of one stream, rows = samples and columns = channels
///
/// `int64` streams keep their own matrix since `f64` cannot hold every
/// 64-bit value; the narrower formats widen to `f64` exactly.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleData {
    Numeric(Array2<f64>),
    Int64(Array2<i64>),
    Text(Array2<String>),
}

impl SampleData {
    /// Typed zero-row buffer for a stream of the given format
    pub fn empty(format: ChannelFormat, channel_count: usize) -> Self {
        match format {
            ChannelFormat::String => Self::Text(Array2::default((0, channel_count))),
            ChannelFormat::Int64 => Self::Int64(Array2::zeros((0, channel_count))),
            _ => Self::Numeric(Array2::zeros((0, channel_count))),
        }
    }

    pub fn numeric(rows: usize, channel_count: usize, values: Vec<f64>) -> Result<Self> {
        Array2::from_shape_vec((rows, channel_count), values)
            .map(Self::Numeric)
            .map_err(|e| XdfError::ParseError(format!("Invalid numeric sample shape: {}", e)))
    }

    pub fn int64(rows: usize, channel_count: usize, values: Vec<i64>) -> Result<Self> {
        Array2::from_shape_vec((rows, channel_count), values)
            .map(Self::Int64)
            .map_err(|e| XdfError::ParseError(format!("Invalid int64 sample shape: {}", e)))
    }

    pub fn text(rows: usize, channel_count: usize, values: Vec<String>) -> Result<Self> {
        Array2::from_shape_vec((rows, channel_count), values)
            .map(Self::Text)
            .map_err(|e| XdfError::ParseError(format!("Invalid string sample shape: {}", e)))
    }

    /// Number of samples (rows)
    pub fn len(&self) -> usize {
        match self {
            Self::Numeric(a) => a.nrows(),
            Self::Int64(a) => a.nrows(),
            Self::Text(a) => a.nrows(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn channel_count(&self) -> usize {
        match self {
            Self::Numeric(a) => a.ncols(),
            Self::Int64(a) => a.ncols(),
            Self::Text(a) => a.ncols(),
        }
    }

    /// Whether this matrix can carry values of `format`
    pub fn matches_format(&self, format: ChannelFormat) -> bool {
        match self {
            Self::Numeric(_) => format.is_numeric() && format != ChannelFormat::Int64,
            Self::Int64(_) => format == ChannelFormat::Int64,
            Self::Text(_) => format == ChannelFormat::String,
        }
    }

    pub fn as_numeric(&self) -> Option<&Array2<f64>> {
        match self {
            Self::Numeric(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_int64(&self) -> Option<&Array2<i64>> {
        match self {
            Self::Int64(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&Array2<String>> {
        match self {
            Self::Text(a) => Some(a),
            _ => None,
        }
    }

    /// Copy out the given rows, in the given order
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        match self {
            Self::Numeric(a) => Self::Numeric(a.select(Axis(0), rows)),
            Self::Int64(a) => Self::Int64(a.select(Axis(0), rows)),
            Self::Text(a) => Self::Text(a.select(Axis(0), rows)),
        }
    }

    /// Copy out a contiguous run of rows
    pub fn row_range(&self, rows: Range<usize>) -> Self {
        match self {
            Self::Numeric(a) => Self::Numeric(a.slice(s![rows.start..rows.end, ..]).to_owned()),
            Self::Int64(a) => Self::Int64(a.slice(s![rows.start..rows.end, ..]).to_owned()),
            Self::Text(a) => Self::Text(a.slice(s![rows.start..rows.end, ..]).to_owned()),
        }
    }
}

/// One parsed stream: header, samples and one timestamp per sample
#[derive(Debug, Clone, PartialEq)]
pub struct RawStream {
    pub info: StreamInfo,
    pub data: SampleData,
    pub timestamps: Vec<f64>,
}

impl RawStream {
    pub fn new(info: StreamInfo, data: SampleData, timestamps: Vec<f64>) -> Result<Self> {
        if data.len() != timestamps.len() {
            return Err(XdfError::InvalidParameter(format!(
                "Stream '{}' has {} samples but {} timestamps",
                info.name,
                data.len(),
                timestamps.len()
            )));
        }
        Ok(Self {
            info,
            data,
            timestamps,
        })
    }

    /// A stream with no samples
    pub fn empty(info: StreamInfo) -> Self {
        let data = SampleData::empty(info.channel_format, info.channel_count);
        Self {
            info,
            data,
            timestamps: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn first_timestamp(&self) -> Option<f64> {
        self.timestamps.first().copied()
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.timestamps.last().copied()
    }

    /// Keep only the given rows of both data and timestamps
    pub fn retain_rows(&mut self, rows: &[usize]) {
        self.data = self.data.select_rows(rows);
        self.timestamps = rows.iter().map(|&i| self.timestamps[i]).collect();
    }

    /// Indices of samples whose timestamp satisfies `keep`
    pub fn rows_where(&self, keep: impl Fn(f64) -> bool) -> Vec<usize> {
        self.timestamps
            .iter()
            .enumerate()
            .filter(|(_, t)| keep(**t))
            .map(|(i, _)| i)
            .collect()
    }
}

/// Samples of one stream that fall inside one window
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSlice {
    pub data: SampleData,
    pub timestamps: Vec<f64>,
}

impl StreamSlice {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// File-level header chunk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileHeader {
    pub version: Option<String>,
    pub xml: String,
}

/// Everything a loader hands over to the iterators
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedFile {
    pub streams: Vec<RawStream>,
    pub header: FileHeader,
}

/// Half-open time window `[start, end)` of one chunk
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub index: usize,
    pub start: f64,
    pub end: f64,
}

impl TimeWindow {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}
