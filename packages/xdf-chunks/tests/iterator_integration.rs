use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use xdf_chunks::{
    write_streams, ChannelFormat, FileHeader, IterConfig, LoadedFile, MultiStreamChunk,
    RawStream, SampleData, StreamChunk, StreamInfo, XdfError, XdfIterator, XdfMultiIterator,
    XdfStreamIterator, XdfWriter,
};

const EPS: f64 = 1e-9;

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < EPS
}

/// Stream A: 10 Hz, 20 samples from t=512.0. Stream B: 3 string markers.
fn two_stream_recording() -> Vec<RawStream> {
    let a_times: Vec<f64> = (0..20).map(|i| 512.0 + i as f64 / 10.0).collect();
    let a_info = StreamInfo::new(1, "A", "EEG", 1, 10.0, ChannelFormat::Float32)
        .with_labels(vec!["Cz".to_string()]);
    let a_data = SampleData::numeric(20, 1, (0..20).map(|i| i as f64).collect()).unwrap();

    let b_info = StreamInfo::new(2, "B", "Markers", 1, 0.0, ChannelFormat::String);
    let b_data = SampleData::text(
        3,
        1,
        vec!["start".to_string(), "cue".to_string(), "stop".to_string()],
    )
    .unwrap();

    vec![
        RawStream::new(a_info, a_data, a_times).unwrap(),
        RawStream::new(b_info, b_data, vec![512.05, 512.9, 513.95]).unwrap(),
    ]
}

fn write_fixture(dir: &TempDir, streams: &[RawStream]) -> PathBuf {
    let path = dir.path().join("recording.xdf");
    write_streams(&path, streams).unwrap();
    path
}

fn fixture() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = write_fixture(&dir, &two_stream_recording());
    (dir, path)
}

fn timestamps_of(chunk: &MultiStreamChunk, name: &str) -> Vec<f64> {
    match chunk.get(name) {
        Some(stream_chunk) => stream_chunk
            .containers()
            .iter()
            .flat_map(|c| {
                let n = c.sample_count();
                // regular streams are stamped at the first sample, markers per sample
                (0..n).map(move |i| c.time.offset + i as f64 / c.time.fs)
            })
            .collect(),
        None => Vec::new(),
    }
}

// =============================================================================
// End-to-end scenario
// =============================================================================

#[test]
fn test_two_stream_chunks() {
    let (_dir, path) = fixture();
    let mut iter = XdfMultiIterator::open(&path, &IterConfig::default()).unwrap();

    assert_eq!(iter.total_chunks(), 2);
    assert_eq!(iter.stream_metadata().len(), 2);
    assert_eq!(iter.stream_metadata()["A"].nominal_srate, 10.0);
    assert_eq!(iter.stream_metadata()["B"].stream_type, "Markers");

    let first = iter.next().unwrap();
    let a = first.get("A").unwrap();
    assert_eq!(a.sample_count(), 10);
    assert!(close(a.containers()[0].time.offset, 0.0));
    assert_eq!(&*a.containers()[0].labels, ["Cz".to_string()]);

    let b = first.get("B").unwrap();
    assert_eq!(b.sample_count(), 2);
    assert!(close(b.containers()[0].time.offset, 0.05));
    let markers = b.containers()[0].data.as_text().unwrap();
    assert_eq!(markers[[0, 0]], "start");
    assert_eq!(markers[[1, 0]], "cue");

    let second = iter.next().unwrap();
    assert_eq!(second.get("A").unwrap().sample_count(), 10);
    let a_values = second.get("A").unwrap().containers()[0]
        .data
        .as_numeric()
        .unwrap()
        .clone();
    assert_eq!(a_values[[0, 0]], 10.0);
    assert_eq!(a_values[[9, 0]], 19.0);
    assert_eq!(second.get("B").unwrap().sample_count(), 1);
    assert!(close(second.get("B").unwrap().containers()[0].time.offset, 1.95));

    assert!(iter.next().is_none());
}

#[test]
fn test_sample_at_the_end_survives_window_rounding() {
    let info = StreamInfo::new(1, "A", "EEG", 1, 0.0, ChannelFormat::Double64);
    let data = SampleData::numeric(2, 1, vec![0.0, 1.0]).unwrap();
    let loaded = LoadedFile {
        streams: vec![RawStream::new(info, data, vec![0.0, 1.8]).unwrap()],
        header: FileHeader::default(),
    };

    let config = IterConfig::default().with_chunk_dur(0.3);
    let iter = XdfIterator::from_loaded(loaded, &config).unwrap();
    let delivered: usize = iter.map(|chunk| chunk.streams["A"].len()).sum();
    assert_eq!(delivered, 2);
}

#[test]
fn test_total_chunks_is_ceil_of_duration() {
    let (_dir, path) = fixture();
    for (dur, expected) in [(1.0, 2), (0.5, 4), (0.3, 7), (2.0, 1), (10.0, 1)] {
        let config = IterConfig::default().with_chunk_dur(dur);
        let iter = XdfIterator::open(&path, &config).unwrap();
        assert!(close(iter.duration(), 1.95));
        assert_eq!(iter.total_chunks(), expected, "chunk_dur={}", dur);
    }
}

#[test]
fn test_windows_are_exhaustive_without_duplicates() {
    let (_dir, path) = fixture();
    let config = IterConfig::default().with_chunk_dur(0.3);
    let iter = XdfIterator::open(&path, &config).unwrap();

    let mut seen_a = Vec::new();
    let mut seen_b = Vec::new();
    for chunk in iter {
        seen_a.extend(chunk.streams["A"].timestamps.iter().copied());
        seen_b.extend(chunk.streams["B"].timestamps.iter().copied());
    }

    assert_eq!(seen_a.len(), 20);
    assert_eq!(seen_b.len(), 3);
    assert!(seen_a.windows(2).all(|w| w[0] < w[1]));
    assert!(close(seen_b[2], 1.95));
}

#[test]
fn test_rezero_puts_earliest_sample_at_zero() {
    let (_dir, path) = fixture();
    let mut iter = XdfMultiIterator::open(&path, &IterConfig::default()).unwrap();
    let first = iter.next().unwrap();
    assert!(close(timestamps_of(&first, "A")[0], 0.0));
    assert!(close(iter.inner().t0(), 512.0));
}

#[test]
fn test_without_rezero_windows_start_at_first_sample() {
    let (_dir, path) = fixture();
    let config = IterConfig::default().with_rezero(false);
    let mut iter = XdfIterator::open(&path, &config).unwrap();

    assert!(close(iter.origin(), 512.0));
    assert_eq!(iter.total_chunks(), 2);
    let first = iter.next().unwrap();
    assert!(close(first.window.start, 512.0));
    assert_eq!(first.streams["A"].len(), 10);
    assert!(close(first.streams["A"].timestamps[0], 512.0));
}

// =============================================================================
// Trimming, selection, restart
// =============================================================================

#[test]
fn test_trimming_excludes_samples_outside_bounds() {
    let (_dir, path) = fixture();
    let config = IterConfig::default().with_time_range(Some(0.5), Some(1.5));
    let mut iter = XdfIterator::open(&path, &config).unwrap();

    assert!(close(iter.duration(), 1.5));
    assert_eq!(iter.total_chunks(), 2);

    let first = iter.next().unwrap();
    assert_eq!(first.streams["A"].len(), 5);
    assert_eq!(first.streams["B"].timestamps.len(), 1);
    assert!(close(first.streams["B"].timestamps[0], 0.9));

    let second = iter.next().unwrap();
    assert_eq!(second.streams["A"].len(), 6);
    assert!(close(*second.streams["A"].timestamps.last().unwrap(), 1.5));
    assert!(second.streams["B"].is_empty());
    assert!(iter.next().is_none());
}

#[test]
fn test_restart_reproduces_first_chunk() {
    let (_dir, path) = fixture();
    let mut iter = XdfMultiIterator::open(&path, &IterConfig::default()).unwrap();

    let first = iter.next().unwrap();
    while iter.next().is_some() {}
    assert!(iter.next().is_none());

    iter.restart();
    assert_eq!(iter.next().unwrap(), first);
}

#[test]
fn test_selection_subset_keeps_global_origin() {
    let (_dir, path) = fixture();
    let config = IterConfig::default().with_select(["B"]);
    let mut iter = XdfMultiIterator::open(&path, &config).unwrap();

    assert_eq!(iter.stream_metadata().keys().collect::<Vec<_>>(), vec!["B"]);
    let first = iter.next().unwrap();
    assert!(first.keys().all(|k| k == "B"));
    // B is rezeroed against A's earlier start
    assert!(close(first.get("B").unwrap().containers()[0].time.offset, 0.05));
    for chunk in iter {
        assert!(chunk.keys().all(|k| k == "B"));
    }
}

#[test]
fn test_unknown_selection_fails_fast() {
    let (_dir, path) = fixture();
    let config = IterConfig::default().with_select(["A", "Missing"]);
    match XdfMultiIterator::open(&path, &config) {
        Err(XdfError::StreamNotFound { name, available }) => {
            assert_eq!(name, "Missing");
            assert_eq!(available, vec!["A".to_string(), "B".to_string()]);
        }
        other => panic!("expected StreamNotFound, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_force_single_sample_splits_markers() {
    let (_dir, path) = fixture();
    let config = IterConfig::default().with_force_single_sample(["B"]);
    let mut iter = XdfMultiIterator::open(&path, &config).unwrap();

    let first = iter.next().unwrap();
    match first.get("B").unwrap() {
        StreamChunk::PerSample(containers) => {
            assert_eq!(containers.len(), 2);
            assert!(containers.iter().all(|c| c.sample_count() == 1));
            assert!(close(containers[0].time.offset, 0.05));
            assert!(close(containers[1].time.offset, 0.9));
            assert_eq!(containers[1].data.as_text().unwrap()[[0, 0]], "cue");
        }
        other => panic!("expected per-sample containers, got {:?}", other),
    }
    assert!(matches!(first.get("A"), Some(StreamChunk::Single(_))));
}

#[test]
fn test_single_stream_iterator() {
    let (_dir, path) = fixture();
    let config = IterConfig::default().with_chunk_dur(0.5);
    let iter = XdfStreamIterator::open(&path, "B", &config).unwrap();
    assert_eq!(iter.total_chunks(), 4);

    let containers: Vec<_> = iter.collect();
    let counts: Vec<usize> = containers.iter().map(|c| c.sample_count()).collect();
    assert_eq!(counts, vec![1, 1, 0, 1]);
    assert_eq!(containers[0].key, "B");
    assert_eq!(containers[0].dims, ["time", "ch"]);
}

// =============================================================================
// Loader behaviour
// =============================================================================

#[test]
fn test_missing_file() {
    let result = XdfIterator::open(Path::new("/nonexistent/recording.xdf"), &IterConfig::default());
    assert!(matches!(result, Err(XdfError::FileNotFound(_))));
}

#[test]
fn test_not_an_xdf_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("plain.xdf");
    fs::write(&path, b"hello world").unwrap();
    let result = XdfIterator::open(&path, &IterConfig::default());
    assert!(matches!(result, Err(XdfError::ParseError(_))));
}

#[test]
fn test_truncated_file_keeps_parsed_chunks() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("truncated.xdf");
    let streams = two_stream_recording();

    let mut writer = XdfWriter::create(&path).unwrap();
    for stream in &streams {
        writer.write_stream_header(&stream.info).unwrap();
    }
    for stream in &streams {
        writer
            .write_samples(&stream.info, &stream.timestamps, &stream.data)
            .unwrap();
    }
    // a samples chunk declaring 200 bytes of which only the tag arrives
    writer.write_raw(&[1, 200, 3, 0]).unwrap();
    writer.finish().unwrap();

    let iter = XdfIterator::open(&path, &IterConfig::default()).unwrap();
    assert_eq!(iter.header().version.as_deref(), Some("1.0"));
    assert_eq!(iter.streams()[0].len(), 20);
    assert_eq!(iter.streams()[1].len(), 3);
}

#[test]
fn test_clock_offsets_are_applied() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("clocked.xdf");
    let info = StreamInfo::new(5, "Clocked", "EEG", 1, 0.0, ChannelFormat::Double64);
    let data = SampleData::numeric(2, 1, vec![0.1, 0.2]).unwrap();

    let mut writer = XdfWriter::create(&path).unwrap();
    writer.write_stream_header(&info).unwrap();
    writer.write_samples(&info, &[100.0, 101.0], &data).unwrap();
    writer.write_clock_offset(5, 90.0, 0.25).unwrap();
    writer.write_clock_offset(5, 110.0, 0.25).unwrap();
    writer.finish().unwrap();

    let config = IterConfig::default().with_rezero(false);
    let synced = XdfIterator::open(&path, &config).unwrap();
    assert!(close(synced.streams()[0].timestamps[0], 100.25));
    assert!(close(synced.streams()[0].timestamps[1], 101.25));

    let raw = XdfIterator::open(&path, &config.with_synchronize_clocks(false)).unwrap();
    assert_eq!(raw.streams()[0].timestamps, vec![100.0, 101.0]);
}

#[test]
fn test_integer_formats_and_empty_streams() {
    let dir = TempDir::new().unwrap();
    let counter = StreamInfo::new(1, "Counter", "Misc", 2, 2.0, ChannelFormat::Int16);
    let counter_data = SampleData::numeric(3, 2, vec![1.0, -1.0, 2.0, -2.0, 3.0, -3.0]).unwrap();
    let silent = StreamInfo::new(2, "Silent", "Markers", 1, 0.0, ChannelFormat::String);
    let streams = vec![
        RawStream::new(counter, counter_data, vec![0.0, 0.5, 1.0]).unwrap(),
        RawStream::empty(silent),
    ];
    let path = write_fixture(&dir, &streams);

    let mut iter = XdfMultiIterator::open(&path, &IterConfig::default()).unwrap();
    assert_eq!(iter.stream_metadata().len(), 2);
    assert_eq!(iter.total_chunks(), 1);

    let chunk = iter.next().unwrap();
    assert!(!chunk.contains_key("Silent"));
    let counter = chunk.get("Counter").unwrap().containers()[0].clone();
    assert_eq!(counter.sample_count(), 3);
    assert_eq!(&*counter.labels, ["1".to_string(), "2".to_string()]);
    assert_eq!(counter.data.as_numeric().unwrap()[[2, 1]], -3.0);
    assert!(iter.next().is_none());
}

#[test]
fn test_int64_stream_is_lossless_end_to_end() {
    let dir = TempDir::new().unwrap();
    let info = StreamInfo::new(1, "Ticks", "Misc", 1, 0.0, ChannelFormat::Int64);
    let data = SampleData::int64(2, 1, vec![i64::MAX - 1, -(1 << 60)]).unwrap();
    let streams = vec![RawStream::new(info, data, vec![0.0, 0.25]).unwrap()];
    let path = write_fixture(&dir, &streams);

    let mut iter = XdfMultiIterator::open(&path, &IterConfig::default()).unwrap();
    let chunk = iter.next().unwrap();
    let ticks = &chunk.get("Ticks").unwrap().containers()[0];
    assert_eq!(ticks.channel_format, ChannelFormat::Int64);
    let values = ticks.data.as_int64().unwrap();
    assert_eq!(values[[0, 0]], i64::MAX - 1);
    assert_eq!(values[[1, 0]], -(1 << 60));
}

#[test]
fn test_dejitter_regularises_timestamps() {
    let dir = TempDir::new().unwrap();
    let info = StreamInfo::new(1, "A", "EEG", 1, 10.0, ChannelFormat::Float32);
    let jitter = [0.0, 0.004, -0.003, 0.002, -0.004, 0.001, 0.0, -0.002];
    let times: Vec<f64> = jitter
        .iter()
        .enumerate()
        .map(|(i, j)| 100.0 + i as f64 / 10.0 + j)
        .collect();
    let data = SampleData::numeric(8, 1, vec![0.0; 8]).unwrap();
    let streams = vec![RawStream::new(info, data, times.clone()).unwrap()];
    let path = write_fixture(&dir, &streams);

    let config = IterConfig::default().with_rezero(false);
    let raw = XdfIterator::open(&path, &config).unwrap();
    assert_eq!(raw.streams()[0].timestamps, times);

    let smooth = XdfIterator::open(&path, &config.with_dejitter_timestamps(true)).unwrap();
    let fitted = &smooth.streams()[0].timestamps;
    let steps: Vec<f64> = fitted.windows(2).map(|w| w[1] - w[0]).collect();
    for step in &steps {
        assert!(close(*step, steps[0]));
    }
    assert!((steps[0] - 0.1).abs() < 0.002);
}
