use crate::error::{Result, XdfError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Iteration settings shared by every iterator flavour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IterConfig {
    /// Streams to keep, in output order. `None` keeps every stream in the file.
    pub select: Option<Vec<String>>,
    /// Window width in seconds
    pub chunk_dur: f64,
    pub start_time: Option<f64>,
    /// Inclusive upper bound
    pub stop_time: Option<f64>,
    /// Shift all timestamps so the earliest sample in the file sits at 0
    pub rezero: bool,
    /// Streams emitted as one container per sample (multi-stream mode only)
    pub force_single_sample: BTreeSet<String>,
    /// Apply the recorded clock offsets while loading
    pub synchronize_clocks: bool,
    /// Refit the timestamps of regular-rate streams to remove jitter
    pub dejitter_timestamps: bool,
}

impl Default for IterConfig {
    fn default() -> Self {
        Self {
            select: None,
            chunk_dur: 1.0,
            start_time: None,
            stop_time: None,
            rezero: true,
            force_single_sample: BTreeSet::new(),
            synchronize_clocks: true,
            dejitter_timestamps: false,
        }
    }
}

impl IterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load settings from a JSON file; missing fields take their defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(XdfError::FileNotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_select<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut select: Vec<String> = Vec::new();
        for name in names {
            let name = name.into();
            if !select.contains(&name) {
                select.push(name);
            }
        }
        self.select = Some(select);
        self
    }

    pub fn with_chunk_dur(mut self, chunk_dur: f64) -> Self {
        self.chunk_dur = chunk_dur;
        self
    }

    pub fn with_time_range(mut self, start_time: Option<f64>, stop_time: Option<f64>) -> Self {
        self.start_time = start_time;
        self.stop_time = stop_time;
        self
    }

    pub fn with_rezero(mut self, rezero: bool) -> Self {
        self.rezero = rezero;
        self
    }

    pub fn with_force_single_sample<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.force_single_sample = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_synchronize_clocks(mut self, synchronize_clocks: bool) -> Self {
        self.synchronize_clocks = synchronize_clocks;
        self
    }

    pub fn with_dejitter_timestamps(mut self, dejitter_timestamps: bool) -> Self {
        self.dejitter_timestamps = dejitter_timestamps;
        self
    }

    /// Names the loader should filter on. Rezeroing needs every stream to find
    /// the global origin, so the filter is only forwarded without it.
    pub fn loader_filter(&self) -> Option<&[String]> {
        match &self.select {
            Some(names) if !self.rezero => Some(names.as_slice()),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.chunk_dur.is_finite() || self.chunk_dur <= 0.0 {
            return Err(XdfError::InvalidParameter(format!(
                "chunk_dur must be a positive number of seconds, got {}",
                self.chunk_dur
            )));
        }

        for (label, bound) in [("start_time", self.start_time), ("stop_time", self.stop_time)] {
            if let Some(value) = bound {
                if value.is_nan() {
                    return Err(XdfError::InvalidParameter(format!("{} is NaN", label)));
                }
            }
        }

        if let (Some(start), Some(stop)) = (self.start_time, self.stop_time) {
            if start > stop {
                return Err(XdfError::InvalidParameter(format!(
                    "start_time ({}) is after stop_time ({})",
                    start, stop
                )));
            }
        }

        if let Some(select) = &self.select {
            if select.is_empty() {
                return Err(XdfError::InvalidParameter(
                    "select must name at least one stream".to_string(),
                ));
            }
        }

        Ok(())
    }
}
