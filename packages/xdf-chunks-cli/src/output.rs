use std::io::Write;
use std::path::Path;

/// Write JSON string to stdout or a file.
pub fn write_output(json: &str, output_path: Option<&str>) -> Result<(), String> {
    match output_path {
        Some(path) => {
            std::fs::write(Path::new(path), json)
                .map_err(|e| format!("Failed to write output file '{}': {}", path, e))
        }
        None => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(json.as_bytes())
                .and_then(|_| handle.write_all(b"\n"))
                .map_err(|e| format!("Failed to write to stdout: {}", e))
        }
    }
}

/// Serialize a value to JSON (pretty or compact).
pub fn to_json<T: serde::Serialize>(value: &T, compact: bool) -> Result<String, String> {
    if compact {
        serde_json::to_string(value).map_err(|e| format!("JSON serialization failed: {}", e))
    } else {
        serde_json::to_string_pretty(value)
            .map_err(|e| format!("JSON serialization failed: {}", e))
    }
}

/// Open stdout or a file for line-by-line output.
pub fn open_output(output_path: Option<&str>) -> Result<Box<dyn Write>, String> {
    match output_path {
        Some(path) => {
            let file = std::fs::File::create(Path::new(path))
                .map_err(|e| format!("Failed to create output file '{}': {}", path, e))?;
            Ok(Box::new(std::io::BufWriter::new(file)))
        }
        None => Ok(Box::new(std::io::stdout().lock())),
    }
}

/// Write one JSON document followed by a newline.
pub fn write_line(writer: &mut dyn Write, json: &str) -> Result<(), String> {
    writer
        .write_all(json.as_bytes())
        .and_then(|_| writer.write_all(b"\n"))
        .and_then(|_| writer.flush())
        .map_err(|e| format!("Failed to write output: {}", e))
}
