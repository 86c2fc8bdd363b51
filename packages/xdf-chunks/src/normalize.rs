use crate::config::IterConfig;
use crate::error::{Result, XdfError};
use crate::profile_scope;
use crate::types::{RawStream, StreamMetadata};
use std::collections::BTreeMap;

/// Streams placed on a common timeline, ready for chunking
#[derive(Debug, Clone)]
pub struct Timeline {
    pub streams: Vec<RawStream>,
    pub metadata: BTreeMap<String, StreamMetadata>,
    /// Span covered by the windows, starting at `origin`
    pub duration: f64,
    /// Time of the first window's lower bound
    pub origin: f64,
    /// Earliest timestamp in the file before any shifting
    pub t0: f64,
}

/// Fail fast on `select` names that the file does not contain
pub fn check_selection(streams: &[RawStream], select: &[String]) -> Result<()> {
    for name in select {
        if !streams.iter().any(|s| s.name() == name) {
            return Err(XdfError::StreamNotFound {
                name: name.clone(),
                available: streams.iter().map(|s| s.name().to_string()).collect(),
            });
        }
    }
    Ok(())
}

/// Earliest first and latest last timestamp over streams that have samples
fn time_span(streams: &[RawStream]) -> Option<(f64, f64)> {
    streams
        .iter()
        .filter_map(|s| Some((s.first_timestamp()?, s.last_timestamp()?)))
        .fold(None, |acc, (first, last)| match acc {
            None => Some((first, last)),
            Some((t0, tmax)) => Some((f64::min(t0, first), f64::max(tmax, last))),
        })
}

/// Apply rezeroing, time bounds and stream selection.
///
/// The order matters: the origin is taken from every stream in the file,
/// timestamps are shifted, bounds are applied in the shifted frame, and only
/// then are unselected streams dropped.
pub fn normalize(mut streams: Vec<RawStream>, config: &IterConfig) -> Result<Timeline> {
    profile_scope!("normalize timeline");

    if let Some(select) = &config.select {
        check_selection(&streams, select)?;
    }

    let mut metadata: BTreeMap<String, StreamMetadata> = streams
        .iter()
        .map(|s| (s.name().to_string(), StreamMetadata::from(&s.info)))
        .collect();

    let t0 = time_span(&streams).map_or(0.0, |(t0, _)| t0);

    if config.rezero {
        for stream in streams.iter_mut() {
            for t in stream.timestamps.iter_mut() {
                *t -= t0;
            }
        }
    }

    if config.start_time.is_some() || config.stop_time.is_some() {
        let start = config.start_time.unwrap_or(f64::NEG_INFINITY);
        let stop = config.stop_time.unwrap_or(f64::INFINITY);
        for stream in streams.iter_mut() {
            let keep = stream.rows_where(|t| t >= start && t <= stop);
            if keep.len() < stream.len() {
                log::debug!(
                    "Stream '{}': trimmed {} of {} samples outside [{}, {}]",
                    stream.name(),
                    stream.len() - keep.len(),
                    stream.len(),
                    start,
                    stop
                );
                stream.retain_rows(&keep);
            }
        }
    }

    let last = streams
        .iter()
        .filter_map(RawStream::last_timestamp)
        .fold(0.0, f64::max);
    let (duration, origin) = if config.rezero {
        (last, 0.0)
    } else {
        ((last - t0).max(0.0), t0)
    };

    if let Some(select) = &config.select {
        let mut by_name: BTreeMap<String, RawStream> = streams
            .into_iter()
            .map(|s| (s.name().to_string(), s))
            .collect();
        streams = select.iter().filter_map(|name| by_name.remove(name)).collect();
        metadata.retain(|name, _| select.contains(name));
    }

    log::info!(
        "Imported {} streams spanning {:.2} s beginning at t={:.2}.",
        streams.len(),
        duration,
        origin
    );

    Ok(Timeline {
        streams,
        metadata,
        duration: duration.max(0.0),
        origin,
        t0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChannelFormat, SampleData, StreamInfo};

    fn stream(id: u32, name: &str, timestamps: Vec<f64>) -> RawStream {
        let info = StreamInfo::new(id, name, "EEG", 1, 10.0, ChannelFormat::Double64);
        let data = SampleData::numeric(timestamps.len(), 1, timestamps.clone()).unwrap();
        RawStream::new(info, data, timestamps).unwrap()
    }

    #[test]
    fn test_rezero_uses_global_minimum() {
        let streams = vec![
            stream(1, "late", vec![102.0, 103.0]),
            stream(2, "early", vec![100.5, 101.0]),
        ];
        let timeline = normalize(streams, &IterConfig::default()).unwrap();

        assert_eq!(timeline.t0, 100.5);
        assert_eq!(timeline.origin, 0.0);
        assert_eq!(timeline.streams[0].timestamps, vec![1.5, 2.5]);
        assert_eq!(timeline.streams[1].timestamps, vec![0.0, 0.5]);
        assert_eq!(timeline.duration, 2.5);
    }

    #[test]
    fn test_rezero_before_select() {
        let streams = vec![
            stream(1, "late", vec![102.0, 103.0]),
            stream(2, "early", vec![100.0, 101.0]),
        ];
        let config = IterConfig::default().with_select(["late"]);
        let timeline = normalize(streams, &config).unwrap();

        assert_eq!(timeline.streams.len(), 1);
        assert_eq!(timeline.streams[0].timestamps, vec![2.0, 3.0]);
        assert!(timeline.metadata.contains_key("late"));
        assert!(!timeline.metadata.contains_key("early"));
    }

    #[test]
    fn test_without_rezero_origin_is_t0() {
        let streams = vec![stream(1, "a", vec![50.0, 51.0, 52.5])];
        let config = IterConfig::default().with_rezero(false);
        let timeline = normalize(streams, &config).unwrap();

        assert_eq!(timeline.origin, 50.0);
        assert_eq!(timeline.duration, 2.5);
        assert_eq!(timeline.streams[0].timestamps, vec![50.0, 51.0, 52.5]);
    }

    #[test]
    fn test_time_bounds_trim_data_and_timestamps() {
        let streams = vec![stream(1, "a", vec![0.0, 0.5, 1.0, 1.5, 2.0])];
        let config = IterConfig::default().with_time_range(Some(0.5), Some(1.5));
        let timeline = normalize(streams, &config).unwrap();

        let a = &timeline.streams[0];
        assert_eq!(a.timestamps, vec![0.5, 1.0, 1.5]);
        assert_eq!(a.data.len(), 3);
        assert_eq!(a.data.as_numeric().unwrap()[[0, 0]], 0.5);
        assert_eq!(timeline.duration, 1.5);
    }

    #[test]
    fn test_unknown_selection_is_not_found() {
        let streams = vec![stream(1, "a", vec![0.0])];
        let config = IterConfig::default().with_select(["missing"]);
        match normalize(streams, &config) {
            Err(XdfError::StreamNotFound { name, available }) => {
                assert_eq!(name, "missing");
                assert_eq!(available, vec!["a".to_string()]);
            }
            other => panic!("expected StreamNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_streams_do_not_affect_span() {
        let info = StreamInfo::new(2, "silent", "Markers", 1, 0.0, ChannelFormat::String);
        let streams = vec![stream(1, "a", vec![10.0, 11.0]), RawStream::empty(info)];
        let timeline = normalize(streams, &IterConfig::default()).unwrap();

        assert_eq!(timeline.t0, 10.0);
        assert_eq!(timeline.duration, 1.0);
        assert!(timeline.streams[1].is_empty());
        assert_eq!(timeline.metadata.len(), 2);
    }

    #[test]
    fn test_file_without_samples() {
        let info = StreamInfo::new(1, "silent", "Markers", 1, 0.0, ChannelFormat::String);
        let timeline = normalize(vec![RawStream::empty(info)], &IterConfig::default()).unwrap();
        assert_eq!(timeline.t0, 0.0);
        assert_eq!(timeline.duration, 0.0);
    }
}
