use crate::cli::ChunksArgs;
use crate::exit_codes;
use std::path::Path;
use xdf_chunks::{IterConfig, XdfError};

/// Validate a single file path: existence and `.xdf` extension.
pub fn validate_file(file_path: &str) -> Result<(), String> {
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(format!("Input file not found: {}", file_path));
    }

    if !is_supported_extension(path) {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        return Err(format!("Unsupported file extension '{}'. Supported: xdf", ext));
    }

    Ok(())
}

pub fn is_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("xdf"))
        .unwrap_or(false)
}

/// Merge the optional JSON config with the command-line flags.
pub fn build_config(args: &ChunksArgs) -> Result<IterConfig, String> {
    let mut config = match &args.config {
        Some(path) => IterConfig::from_json_file(Path::new(path)).map_err(|e| e.to_string())?,
        None => IterConfig::default(),
    };

    if let Some(name) = &args.stream {
        config = config.with_select([name.as_str()]);
    } else if !args.select.is_empty() {
        config = config.with_select(args.select.iter().map(String::as_str));
    }

    if let Some(chunk_dur) = args.chunk_dur {
        config = config.with_chunk_dur(chunk_dur);
    }
    if args.start.is_some() {
        config.start_time = args.start;
    }
    if args.stop.is_some() {
        config.stop_time = args.stop;
    }
    if args.no_rezero {
        config = config.with_rezero(false);
    }
    if !args.force_single_sample.is_empty() {
        config = config.with_force_single_sample(args.force_single_sample.iter().cloned());
    }
    if args.no_clock_sync {
        config = config.with_synchronize_clocks(false);
    }
    if args.dejitter {
        config = config.with_dejitter_timestamps(true);
    }

    config.validate().map_err(|e| e.to_string())?;

    if let Some(rate) = args.playback_rate {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(format!("--playback-rate must be positive, got {}", rate));
        }
    }

    Ok(config)
}

/// Map a library error onto the process exit code
pub fn exit_code_for(error: &XdfError) -> i32 {
    match error {
        XdfError::StreamNotFound { .. } => exit_codes::STREAM_NOT_FOUND,
        XdfError::FileNotFound(_)
        | XdfError::InvalidParameter(_)
        | XdfError::ConfigError(_)
        | XdfError::ParseError(_)
        | XdfError::UnsupportedFormat(_) => exit_codes::INPUT_ERROR,
        XdfError::IoError(_) => exit_codes::EXECUTION_ERROR,
    }
}
