use crate::normalize::Timeline;
use crate::types::{RawStream, StreamSlice, TimeWindow};
use std::collections::BTreeMap;

/// Per-stream slices of one window, keyed by stream name
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkSlices {
    pub window: TimeWindow,
    pub streams: BTreeMap<String, StreamSlice>,
}

/// Stateful cursor over fixed-duration windows of a [`Timeline`]
#[derive(Debug, Clone)]
pub struct ChunkCursor {
    streams: Vec<RawStream>,
    chunk_dur: f64,
    origin: f64,
    duration: f64,
    total_chunks: usize,
    current_index: usize,
    last_time: f64,
}

impl ChunkCursor {
    pub fn new(streams: Vec<RawStream>, duration: f64, origin: f64, chunk_dur: f64) -> Self {
        let total_chunks = (duration / chunk_dur).ceil().max(0.0) as usize;
        Self {
            streams,
            chunk_dur,
            origin,
            duration,
            total_chunks,
            current_index: 0,
            last_time: origin,
        }
    }

    pub fn from_timeline(timeline: Timeline, chunk_dur: f64) -> Self {
        Self::new(timeline.streams, timeline.duration, timeline.origin, chunk_dur)
    }

    pub fn total_chunks(&self) -> usize {
        self.total_chunks
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn chunk_dur(&self) -> f64 {
        self.chunk_dur
    }

    pub fn origin(&self) -> f64 {
        self.origin
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Latest timestamp delivered so far in this session
    pub fn last_time(&self) -> f64 {
        self.last_time
    }

    pub fn streams(&self) -> &[RawStream] {
        &self.streams
    }

    pub fn is_exhausted(&self) -> bool {
        self.current_index >= self.total_chunks
    }

    /// Bounds of window `index`
    pub fn window(&self, index: usize) -> TimeWindow {
        TimeWindow {
            index,
            start: self.origin + index as f64 * self.chunk_dur,
            end: self.origin + (index + 1) as f64 * self.chunk_dur,
        }
    }

    /// Rewind to the first window. `last_time` is kept.
    pub fn restart(&mut self) {
        self.current_index = 0;
    }

    /// Slice every stream at the current window and advance.
    /// Returns `None` once every window has been delivered.
    pub fn next_slices(&mut self) -> Option<ChunkSlices> {
        if self.is_exhausted() {
            return None;
        }

        let window = self.window(self.current_index);
        // The last window is closed and reaches the end of the recording even
        // when `total_chunks * chunk_dur` rounds below the duration.
        let closed = self.current_index + 1 == self.total_chunks;
        let closed_end = window.end.max(self.origin + self.duration);

        let mut slices = BTreeMap::new();
        for stream in &self.streams {
            let rows = stream.rows_where(|t| {
                t >= window.start && (t < window.end || (closed && t <= closed_end))
            });
            let slice = StreamSlice {
                data: stream.data.select_rows(&rows),
                timestamps: rows.iter().map(|&i| stream.timestamps[i]).collect(),
            };
            if let Some(&last) = slice.timestamps.last() {
                self.last_time = self.last_time.max(last);
            }
            slices.insert(stream.name().to_string(), slice);
        }

        log::debug!(
            "Chunk {}/{} [{:.3}, {:.3})",
            window.index + 1,
            self.total_chunks,
            window.start,
            window.end
        );

        self.current_index += 1;
        Some(ChunkSlices {
            window,
            streams: slices,
        })
    }
}

impl Iterator for ChunkCursor {
    type Item = ChunkSlices;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_slices()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total_chunks.saturating_sub(self.current_index);
        (remaining, Some(remaining))
    }
}
