use crate::types::{ChannelFormat, RawStream, SampleData, StreamSlice};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Dimension names of every container: rows are time, columns are channels
pub const DIMS: [&str; 2] = ["time", "ch"];

/// Regular time axis: sample rate and the time of the first row
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeAxis {
    pub fs: f64,
    pub offset: f64,
}

impl TimeAxis {
    pub fn with_offset(&self, offset: f64) -> Self {
        Self {
            fs: self.fs,
            offset,
        }
    }
}

/// One stream's data for one window, with its axes
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkContainer {
    /// Stream name
    pub key: String,
    pub data: SampleData,
    /// Value format declared by the stream header
    pub channel_format: ChannelFormat,
    pub dims: [&'static str; 2],
    pub time: TimeAxis,
    pub labels: Arc<[String]>,
}

impl ChunkContainer {
    /// Copy of `self` with new data and time offset; everything else is shared
    pub fn with_chunk(&self, data: SampleData, offset: f64) -> Self {
        Self {
            key: self.key.clone(),
            data,
            channel_format: self.channel_format,
            dims: self.dims,
            time: self.time.with_offset(offset),
            labels: Arc::clone(&self.labels),
        }
    }

    pub fn sample_count(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Channel labels from the stream header, or "1".."N" when it declares none
pub fn labels_from_stream(stream: &RawStream) -> Vec<String> {
    if !stream.info.channel_labels.is_empty() {
        stream.info.channel_labels.clone()
    } else {
        (1..=stream.info.channel_count).map(|i| i.to_string()).collect()
    }
}

/// Immutable per-stream container template, built once per iterator
#[derive(Debug, Clone)]
pub struct StreamTemplate {
    template: ChunkContainer,
}

impl StreamTemplate {
    pub fn from_stream(stream: &RawStream) -> Self {
        let fs = if stream.info.is_irregular() {
            1.0
        } else {
            stream.info.nominal_srate
        };
        let template = ChunkContainer {
            key: stream.name().to_string(),
            data: SampleData::empty(stream.info.channel_format, stream.info.channel_count),
            channel_format: stream.info.channel_format,
            dims: DIMS,
            time: TimeAxis { fs, offset: 0.0 },
            labels: labels_from_stream(stream).into(),
        };
        Self { template }
    }

    pub fn container(&self) -> &ChunkContainer {
        &self.template
    }

    pub fn key(&self) -> &str {
        &self.template.key
    }

    pub fn labels(&self) -> &[String] {
        &self.template.labels
    }

    /// Format declared by the stream header
    pub fn channel_format(&self) -> ChannelFormat {
        self.template.channel_format
    }

    /// All samples of a slice in one container, offset at the first sample
    /// (or at `fallback_time` when the slice is empty)
    pub fn stamp(&self, slice: &StreamSlice, fallback_time: f64) -> ChunkContainer {
        let offset = slice.timestamps.first().copied().unwrap_or(fallback_time);
        self.template.with_chunk(slice.data.clone(), offset)
    }

    /// One single-sample container per sample, each offset at its own timestamp
    pub fn stamp_per_sample(&self, slice: &StreamSlice) -> Vec<ChunkContainer> {
        slice
            .timestamps
            .iter()
            .enumerate()
            .map(|(i, &t)| self.template.with_chunk(slice.data.row_range(i..i + 1), t))
            .collect()
    }
}
