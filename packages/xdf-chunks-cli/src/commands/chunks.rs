use crate::chunk_params;
use crate::cli::ChunksArgs;
use crate::exit_codes;
use crate::output;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use xdf_chunks::{
    ChannelFormat, ChunkContainer, IterConfig, MultiStreamChunk, PlaybackClock, SampleData, TimeWindow,
    XdfMultiIterator, XdfStreamIterator,
};

#[derive(Serialize)]
struct ChunkRecord {
    index: usize,
    start: f64,
    end: f64,
    streams: BTreeMap<String, StreamRecord>,
}

#[derive(Serialize)]
struct StreamRecord {
    sample_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel_format: Option<ChannelFormat>,
    /// Time of the first sample of each container
    offsets: Vec<f64>,
    fs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
}

impl StreamRecord {
    fn from_containers(containers: &[ChunkContainer], include_data: bool) -> Self {
        let data = include_data.then(|| {
            serde_json::Value::Array(containers.iter().flat_map(|c| rows_json(&c.data)).collect())
        });
        Self {
            sample_count: containers.iter().map(ChunkContainer::sample_count).sum(),
            channel_format: containers.first().map(|c| c.channel_format),
            offsets: containers.iter().map(|c| c.time.offset).collect(),
            fs: containers.first().map_or(0.0, |c| c.time.fs),
            data,
        }
    }
}

/// One JSON array per sample row
fn rows_json(data: &SampleData) -> Vec<serde_json::Value> {
    match data {
        SampleData::Numeric(values) => values
            .rows()
            .into_iter()
            .map(|row| serde_json::json!(row.to_vec()))
            .collect(),
        SampleData::Int64(values) => values
            .rows()
            .into_iter()
            .map(|row| serde_json::json!(row.to_vec()))
            .collect(),
        SampleData::Text(values) => values
            .rows()
            .into_iter()
            .map(|row| serde_json::json!(row.to_vec()))
            .collect(),
    }
}

fn record_for(window: TimeWindow, streams: BTreeMap<String, StreamRecord>) -> ChunkRecord {
    ChunkRecord {
        index: window.index,
        start: window.start,
        end: window.end,
        streams,
    }
}

fn multi_record(chunk: &MultiStreamChunk, include_data: bool) -> ChunkRecord {
    let streams = chunk
        .iter()
        .map(|(name, stream_chunk)| {
            (
                name.clone(),
                StreamRecord::from_containers(stream_chunk.containers(), include_data),
            )
        })
        .collect();
    record_for(chunk.window(), streams)
}

/// Paces and writes the records of one run
struct Emitter {
    writer: Box<dyn Write>,
    clock: Option<PlaybackClock>,
    compact: bool,
    emitted: usize,
}

impl Emitter {
    /// Wait for the next window without writing anything
    async fn tick(&mut self) {
        if let Some(clock) = self.clock.as_mut() {
            clock.astep().await;
        }
    }

    async fn emit(&mut self, record: &ChunkRecord) -> Result<(), String> {
        self.tick().await;
        let json = output::to_json(record, self.compact)?;
        output::write_line(self.writer.as_mut(), &json)?;
        self.emitted += 1;
        Ok(())
    }
}

pub async fn execute(args: ChunksArgs) -> i32 {
    if let Err(msg) = chunk_params::validate_file(&args.file) {
        eprintln!("Error: {}", msg);
        return exit_codes::INPUT_ERROR;
    }

    let config = match chunk_params::build_config(&args) {
        Ok(config) => config,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    let clock = match args.playback_rate {
        Some(rate) => match PlaybackClock::new(rate, config.chunk_dur) {
            Ok(clock) => Some(clock),
            Err(e) => {
                eprintln!("Error: {}", e);
                return exit_codes::INPUT_ERROR;
            }
        },
        None => None,
    };

    let writer = match output::open_output(args.output.as_deref()) {
        Ok(writer) => writer,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    };

    let mut emitter = Emitter {
        writer,
        clock,
        compact: args.compact,
        emitted: 0,
    };

    let result = match &args.stream {
        Some(name) => run_single(&args, name, &config, &mut emitter).await,
        None => run_multi(&args, &config, &mut emitter).await,
    };

    match result {
        Ok(()) => {
            if !args.quiet {
                eprintln!("Emitted {} chunks", emitter.emitted);
                if let Some(ref path) = args.output {
                    eprintln!("Chunks written to {}", path);
                }
            }
            exit_codes::SUCCESS
        }
        Err(code) => code,
    }
}

async fn run_multi(args: &ChunksArgs, config: &IterConfig, emitter: &mut Emitter) -> Result<(), i32> {
    let iter = XdfMultiIterator::open(&args.file, config).map_err(|e| {
        eprintln!("Error: {}", e);
        chunk_params::exit_code_for(&e)
    })?;

    if !args.quiet {
        eprintln!(
            "Streaming {} chunks of {}s from {} ({} streams)",
            iter.total_chunks(),
            config.chunk_dur,
            args.file,
            iter.stream_metadata().len()
        );
    }

    for chunk in iter {
        let record = multi_record(&chunk, args.include_data);
        emitter.emit(&record).await.map_err(|e| {
            eprintln!("Error: {}", e);
            exit_codes::EXECUTION_ERROR
        })?;
    }
    Ok(())
}

async fn run_single(
    args: &ChunksArgs,
    name: &str,
    config: &IterConfig,
    emitter: &mut Emitter,
) -> Result<(), i32> {
    let mut iter = XdfStreamIterator::open(&args.file, name, config).map_err(|e| {
        eprintln!("Error: {}", e);
        chunk_params::exit_code_for(&e)
    })?;

    if !args.quiet {
        eprintln!(
            "Streaming {} chunks of {}s of '{}' from {}",
            iter.total_chunks(),
            config.chunk_dur,
            name,
            args.file
        );
    }

    loop {
        let index = iter.inner().current_index();
        let Some(container) = iter.next() else {
            break;
        };
        if container.is_empty() {
            emitter.tick().await;
            continue;
        }
        let window = iter.inner().window(index);
        let mut streams = BTreeMap::new();
        streams.insert(
            container.key.clone(),
            StreamRecord::from_containers(std::slice::from_ref(&container), args.include_data),
        );
        emitter
            .emit(&record_for(window, streams))
            .await
            .map_err(|e| {
                eprintln!("Error: {}", e);
                exit_codes::EXECUTION_ERROR
            })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use xdf_chunks::{RawStream, StreamInfo, StreamTemplate};

    #[test]
    fn test_stream_record_counts_per_sample_containers() {
        let info = StreamInfo::new(1, "M", "Markers", 1, 0.0, ChannelFormat::String);
        let data = SampleData::text(2, 1, vec!["a".to_string(), "b".to_string()]).unwrap();
        let stream = RawStream::new(info, data.clone(), vec![0.1, 0.4]).unwrap();
        let template = StreamTemplate::from_stream(&stream);
        let slice = xdf_chunks::StreamSlice {
            data,
            timestamps: vec![0.1, 0.4],
        };

        let containers = template.stamp_per_sample(&slice);
        let record = StreamRecord::from_containers(&containers, true);
        assert_eq!(record.sample_count, 2);
        assert_eq!(record.offsets, vec![0.1, 0.4]);
        assert_eq!(record.fs, 1.0);
        assert_eq!(record.data, Some(serde_json::json!([["a"], ["b"]])));
    }

    #[test]
    fn test_stream_record_without_data() {
        let info = StreamInfo::new(1, "A", "EEG", 2, 10.0, ChannelFormat::Float32);
        let data = SampleData::numeric(1, 2, vec![1.5, 2.5]).unwrap();
        let stream = RawStream::new(info, data, vec![0.0]).unwrap();
        let template = StreamTemplate::from_stream(&stream);
        let container = template.stamp(
            &xdf_chunks::StreamSlice {
                data: stream.data.clone(),
                timestamps: stream.timestamps.clone(),
            },
            0.0,
        );

        let record = StreamRecord::from_containers(std::slice::from_ref(&container), false);
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("data").is_none());
        assert_eq!(json["sample_count"], 1);
        assert_eq!(json["fs"], 10.0);
        assert_eq!(json["channel_format"], "float32");
    }

    #[test]
    fn test_int64_rows_are_written_exactly() {
        let info = StreamInfo::new(1, "Ticks", "Misc", 1, 0.0, ChannelFormat::Int64);
        let data = SampleData::int64(1, 1, vec![i64::MAX - 1]).unwrap();
        assert_eq!(rows_json(&data), vec![serde_json::json!([i64::MAX - 1])]);
        let stream = RawStream::new(info, data, vec![0.0]).unwrap();
        let template = StreamTemplate::from_stream(&stream);
        let container = template.stamp(
            &xdf_chunks::StreamSlice {
                data: stream.data.clone(),
                timestamps: stream.timestamps.clone(),
            },
            0.0,
        );
        let record = StreamRecord::from_containers(std::slice::from_ref(&container), true);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["channel_format"], "int64");
        assert_eq!(json["data"][0][0].as_i64(), Some(i64::MAX - 1));
    }
}
