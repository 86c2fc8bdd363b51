//! Public pull iterators over an XDF recording
//!
//! Three flavours share one engine ([`XdfIterator`]):
//!
//! - [`XdfIterator`] yields the raw per-stream slices of every window.
//! - [`XdfStreamIterator`] follows exactly one stream and yields one
//!   [`ChunkContainer`] per window, empty windows included.
//! - [`XdfMultiIterator`] yields a [`MultiStreamChunk`] per window holding only
//!   the streams that had samples in it.
//!
//! All of them are plain synchronous iterators: `None` ends the sequence, an
//! empty [`MultiStreamChunk`] does not.

use crate::adapter::{ChunkContainer, StreamTemplate};
use crate::config::IterConfig;
use crate::cursor::{ChunkCursor, ChunkSlices};
use crate::error::{Result, XdfError};
use crate::loader::{StreamLoader, XdfLoader};
use crate::normalize::normalize;
use crate::types::{FileHeader, LoadedFile, RawStream, StreamMetadata, StreamSlice, TimeWindow};
use std::collections::{btree_map, BTreeMap, BTreeSet};
use std::path::Path;

/// Windowed view over a normalized recording
#[derive(Debug, Clone)]
pub struct XdfIterator {
    header: FileHeader,
    metadata: BTreeMap<String, StreamMetadata>,
    duration: f64,
    t0: f64,
    cursor: ChunkCursor,
}

impl XdfIterator {
    /// Load `path` from disk and prepare the windows
    pub fn open(path: impl AsRef<Path>, config: &IterConfig) -> Result<Self> {
        let loader = XdfLoader::new(config.synchronize_clocks)
            .with_dejitter_timestamps(config.dejitter_timestamps);
        Self::open_with(&loader, path, config)
    }

    pub fn open_with<L: StreamLoader + ?Sized>(
        loader: &L,
        path: impl AsRef<Path>,
        config: &IterConfig,
    ) -> Result<Self> {
        config.validate()?;
        let path = path.as_ref();
        let loaded = loader.load(path, config.loader_filter())?;
        log::info!(
            "Loaded {} streams from {}",
            loaded.streams.len(),
            path.display()
        );
        Self::from_loaded(loaded, config)
    }

    /// Build from streams that are already in memory
    pub fn from_loaded(loaded: LoadedFile, config: &IterConfig) -> Result<Self> {
        config.validate()?;
        let timeline = normalize(loaded.streams, config)?;
        let metadata = timeline.metadata.clone();
        let duration = timeline.duration;
        let t0 = timeline.t0;
        let cursor = ChunkCursor::from_timeline(timeline, config.chunk_dur);

        Ok(Self {
            header: loaded.header,
            metadata,
            duration,
            t0,
            cursor,
        })
    }

    pub fn total_chunks(&self) -> usize {
        self.cursor.total_chunks()
    }

    /// Name, type, channel count and rate of every selected stream
    pub fn stream_metadata(&self) -> &BTreeMap<String, StreamMetadata> {
        &self.metadata
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Seconds covered by the windows
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Lower bound of the first window
    pub fn origin(&self) -> f64 {
        self.cursor.origin()
    }

    /// Earliest timestamp in the file, before rezeroing
    pub fn t0(&self) -> f64 {
        self.t0
    }

    pub fn chunk_dur(&self) -> f64 {
        self.cursor.chunk_dur()
    }

    pub fn current_index(&self) -> usize {
        self.cursor.current_index()
    }

    pub fn last_time(&self) -> f64 {
        self.cursor.last_time()
    }

    pub fn window(&self, index: usize) -> TimeWindow {
        self.cursor.window(index)
    }

    /// Live streams after selection, in output order
    pub fn streams(&self) -> &[RawStream] {
        self.cursor.streams()
    }

    /// Rewind to the first window
    pub fn restart(&mut self) {
        self.cursor.restart();
    }

    pub fn next_chunk(&mut self) -> Option<ChunkSlices> {
        self.cursor.next_slices()
    }
}

impl Iterator for XdfIterator {
    type Item = ChunkSlices;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_chunk()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.cursor.size_hint()
    }
}

/// Single-stream iterator: one container per window
#[derive(Debug, Clone)]
pub struct XdfStreamIterator {
    inner: XdfIterator,
    template: StreamTemplate,
}

impl XdfStreamIterator {
    pub fn open(path: impl AsRef<Path>, name: &str, config: &IterConfig) -> Result<Self> {
        let config = config.clone().with_select([name]);
        Self::from_iterator(XdfIterator::open(path, &config)?, name)
    }

    pub fn open_with<L: StreamLoader + ?Sized>(
        loader: &L,
        path: impl AsRef<Path>,
        name: &str,
        config: &IterConfig,
    ) -> Result<Self> {
        let config = config.clone().with_select([name]);
        Self::from_iterator(XdfIterator::open_with(loader, path, &config)?, name)
    }

    pub fn from_loaded(loaded: LoadedFile, name: &str, config: &IterConfig) -> Result<Self> {
        let config = config.clone().with_select([name]);
        Self::from_iterator(XdfIterator::from_loaded(loaded, &config)?, name)
    }

    fn from_iterator(inner: XdfIterator, name: &str) -> Result<Self> {
        let stream = inner
            .streams()
            .iter()
            .find(|s| s.name() == name)
            .ok_or_else(|| XdfError::StreamNotFound {
                name: name.to_string(),
                available: inner.streams().iter().map(|s| s.name().to_string()).collect(),
            })?;
        let template = StreamTemplate::from_stream(stream);
        Ok(Self { inner, template })
    }

    pub fn name(&self) -> &str {
        self.template.key()
    }

    pub fn template(&self) -> &StreamTemplate {
        &self.template
    }

    pub fn total_chunks(&self) -> usize {
        self.inner.total_chunks()
    }

    pub fn stream_metadata(&self) -> &BTreeMap<String, StreamMetadata> {
        self.inner.stream_metadata()
    }

    pub fn inner(&self) -> &XdfIterator {
        &self.inner
    }

    pub fn restart(&mut self) {
        self.inner.restart();
    }
}

impl Iterator for XdfStreamIterator {
    type Item = ChunkContainer;

    fn next(&mut self) -> Option<Self::Item> {
        let mut chunk = self.inner.next_chunk()?;
        let slice = chunk
            .streams
            .remove(self.template.key())
            .unwrap_or_else(|| StreamSlice {
                data: self.template.container().data.clone(),
                timestamps: Vec::new(),
            });
        Some(self.template.stamp(&slice, self.inner.last_time()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// Adapted output of one stream in one window
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// Every sample of the window in one container
    Single(ChunkContainer),
    /// One container per sample, in timestamp order
    PerSample(Vec<ChunkContainer>),
}

impl StreamChunk {
    pub fn containers(&self) -> &[ChunkContainer] {
        match self {
            StreamChunk::Single(container) => std::slice::from_ref(container),
            StreamChunk::PerSample(containers) => containers,
        }
    }

    pub fn sample_count(&self) -> usize {
        self.containers().iter().map(ChunkContainer::sample_count).sum()
    }
}

/// Per-window mapping from stream name to its containers.
///
/// Streams without samples in the window are absent, so the mapping may be
/// empty.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiStreamChunk {
    window: TimeWindow,
    streams: BTreeMap<String, StreamChunk>,
}

impl MultiStreamChunk {
    pub fn window(&self) -> TimeWindow {
        self.window
    }

    pub fn get(&self, name: &str) -> Option<&StreamChunk> {
        self.streams.get(name)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.streams.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.streams.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, StreamChunk> {
        self.streams.iter()
    }
}

impl<'a> IntoIterator for &'a MultiStreamChunk {
    type Item = (&'a String, &'a StreamChunk);
    type IntoIter = btree_map::Iter<'a, String, StreamChunk>;

    fn into_iter(self) -> Self::IntoIter {
        self.streams.iter()
    }
}

/// Multi-stream iterator: every live stream with samples in the window
#[derive(Debug, Clone)]
pub struct XdfMultiIterator {
    inner: XdfIterator,
    templates: Vec<StreamTemplate>,
    force_single_sample: BTreeSet<String>,
}

impl XdfMultiIterator {
    pub fn open(path: impl AsRef<Path>, config: &IterConfig) -> Result<Self> {
        Ok(Self::from_iterator(XdfIterator::open(path, config)?, config))
    }

    pub fn open_with<L: StreamLoader + ?Sized>(
        loader: &L,
        path: impl AsRef<Path>,
        config: &IterConfig,
    ) -> Result<Self> {
        Ok(Self::from_iterator(
            XdfIterator::open_with(loader, path, config)?,
            config,
        ))
    }

    pub fn from_loaded(loaded: LoadedFile, config: &IterConfig) -> Result<Self> {
        Ok(Self::from_iterator(
            XdfIterator::from_loaded(loaded, config)?,
            config,
        ))
    }

    fn from_iterator(inner: XdfIterator, config: &IterConfig) -> Self {
        let templates: Vec<StreamTemplate> =
            inner.streams().iter().map(StreamTemplate::from_stream).collect();

        for name in &config.force_single_sample {
            if !templates.iter().any(|t| t.key() == name) {
                log::warn!(
                    "force_single_sample: stream '{}' is not among the iterated streams",
                    name
                );
            }
        }

        Self {
            inner,
            templates,
            force_single_sample: config.force_single_sample.clone(),
        }
    }

    pub fn total_chunks(&self) -> usize {
        self.inner.total_chunks()
    }

    pub fn stream_metadata(&self) -> &BTreeMap<String, StreamMetadata> {
        self.inner.stream_metadata()
    }

    pub fn templates(&self) -> &[StreamTemplate] {
        &self.templates
    }

    pub fn inner(&self) -> &XdfIterator {
        &self.inner
    }

    pub fn restart(&mut self) {
        self.inner.restart();
    }

    fn combine(&self, chunk: ChunkSlices) -> MultiStreamChunk {
        let last_time = self.inner.last_time();
        let mut streams = BTreeMap::new();

        for template in &self.templates {
            let Some(slice) = chunk.streams.get(template.key()) else {
                continue;
            };
            if slice.is_empty() {
                continue;
            }
            let adapted = if self.force_single_sample.contains(template.key()) {
                StreamChunk::PerSample(template.stamp_per_sample(slice))
            } else {
                StreamChunk::Single(template.stamp(slice, last_time))
            };
            streams.insert(template.key().to_string(), adapted);
        }

        MultiStreamChunk {
            window: chunk.window,
            streams,
        }
    }
}

impl Iterator for XdfMultiIterator {
    type Item = MultiStreamChunk;

    fn next(&mut self) -> Option<Self::Item> {
        let chunk = self.inner.next_chunk()?;
        Some(self.combine(chunk))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}
