use crate::chunk_params;
use crate::cli::ValidateArgs;
use crate::exit_codes;
use crate::output;
use serde::Serialize;
use std::io::Read;
use std::path::Path;
use xdf_chunks::loader::XDF_MAGIC;
use xdf_chunks::load_xdf;

#[derive(Serialize)]
struct ValidateOutput {
    file: String,
    exists: bool,
    readable: bool,
    supported: bool,
    has_magic: bool,
    parsed: bool,
    stream_count: Option<usize>,
    size_bytes: Option<u64>,
    error: Option<String>,
}

fn read_magic(path: &Path) -> bool {
    let mut magic = [0u8; 4];
    std::fs::File::open(path)
        .and_then(|mut f| f.read_exact(&mut magic))
        .map(|_| &magic == XDF_MAGIC)
        .unwrap_or(false)
}

pub fn execute(args: ValidateArgs) -> i32 {
    let path = Path::new(&args.file);

    let exists = path.exists();
    let readable = path.is_file() && std::fs::File::open(path).is_ok();
    let supported = chunk_params::is_supported_extension(path);
    let has_magic = readable && read_magic(path);

    let size_bytes = if readable {
        std::fs::metadata(path).ok().map(|m| m.len())
    } else {
        None
    };

    let mut error = if !exists {
        Some(format!("File not found: {}", args.file))
    } else if !readable {
        Some(format!("File is not readable: {}", args.file))
    } else if !supported {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        Some(format!("Unsupported file extension '{}'. Supported: xdf", ext))
    } else if !has_magic {
        Some("Missing XDF magic string".to_string())
    } else {
        None
    };

    let mut stream_count = None;
    if error.is_none() {
        match load_xdf(path, None) {
            Ok(loaded) => stream_count = Some(loaded.streams.len()),
            Err(e) => error = Some(e.to_string()),
        }
    }
    let parsed = stream_count.is_some();

    let result = ValidateOutput {
        file: args.file.clone(),
        exists,
        readable,
        supported,
        has_magic,
        parsed,
        stream_count,
        size_bytes,
        error: error.clone(),
    };

    if args.json {
        match output::to_json(&result, false) {
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
    } else if let Some(ref err) = error {
        eprintln!("Error: {}", err);
    } else {
        println!(
            "File '{}' is valid ({} streams, {} bytes)",
            args.file,
            stream_count.unwrap_or(0),
            size_bytes.unwrap_or(0)
        );
    }

    if error.is_some() {
        exit_codes::INPUT_ERROR
    } else {
        exit_codes::SUCCESS
    }
}
