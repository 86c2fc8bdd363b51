use crate::chunk_params;
use crate::cli::InfoArgs;
use crate::exit_codes;
use crate::output;
use serde::Serialize;
use std::path::Path;
use xdf_chunks::{load_xdf, ChannelFormat, RawStream};

#[derive(Serialize)]
struct InfoOutput {
    file: String,
    xdf_version: Option<String>,
    duration: f64,
    streams: Vec<StreamSummary>,
}

#[derive(Serialize)]
struct StreamSummary {
    stream_id: u32,
    name: String,
    #[serde(rename = "type")]
    stream_type: String,
    channel_count: usize,
    nominal_srate: f64,
    channel_format: ChannelFormat,
    sample_count: usize,
    first_timestamp: Option<f64>,
    last_timestamp: Option<f64>,
}

impl From<&RawStream> for StreamSummary {
    fn from(stream: &RawStream) -> Self {
        Self {
            stream_id: stream.info.stream_id,
            name: stream.info.name.clone(),
            stream_type: stream.info.stream_type.clone(),
            channel_count: stream.info.channel_count,
            nominal_srate: stream.info.nominal_srate,
            channel_format: stream.info.channel_format,
            sample_count: stream.len(),
            first_timestamp: stream.first_timestamp(),
            last_timestamp: stream.last_timestamp(),
        }
    }
}

pub fn execute(args: InfoArgs) -> i32 {
    if let Err(msg) = chunk_params::validate_file(&args.file) {
        eprintln!("Error: {}", msg);
        return exit_codes::INPUT_ERROR;
    }

    let loaded = match load_xdf(Path::new(&args.file), None) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {}", e);
            return chunk_params::exit_code_for(&e);
        }
    };

    let streams: Vec<StreamSummary> = loaded.streams.iter().map(StreamSummary::from).collect();
    let first = streams.iter().filter_map(|s| s.first_timestamp).fold(f64::INFINITY, f64::min);
    let last = streams
        .iter()
        .filter_map(|s| s.last_timestamp)
        .fold(f64::NEG_INFINITY, f64::max);
    let duration = if first.is_finite() && last.is_finite() {
        last - first
    } else {
        0.0
    };

    let info = InfoOutput {
        file: args.file.clone(),
        xdf_version: loaded.header.version.clone(),
        duration,
        streams,
    };

    if args.json {
        match output::to_json(&info, false) {
            Ok(json) => {
                if let Err(e) = output::write_output(&json, None) {
                    eprintln!("Error: {}", e);
                    return exit_codes::EXECUTION_ERROR;
                }
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                return exit_codes::EXECUTION_ERROR;
            }
        }
    } else {
        println!("File: {}", info.file);
        println!(
            "XDF version: {}",
            info.xdf_version.as_deref().unwrap_or("unknown")
        );
        println!("Duration: {:.3}s", info.duration);
        println!();
        println!(
            "{:<4} {:<24} {:<12} {:>8} {:>10} {:<10} {:>10}",
            "ID", "Name", "Type", "Channels", "Rate (Hz)", "Format", "Samples"
        );
        for s in &info.streams {
            println!(
                "{:<4} {:<24} {:<12} {:>8} {:>10} {:<10} {:>10}",
                s.stream_id,
                s.name,
                s.stream_type,
                s.channel_count,
                s.nominal_srate,
                s.channel_format.as_str(),
                s.sample_count
            );
        }
    }

    exit_codes::SUCCESS
}
