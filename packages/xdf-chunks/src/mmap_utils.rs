use crate::error::{Result, XdfError};
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;

/// Open a recording and map it into memory (read-only)
pub fn mmap_file(path: &Path) -> Result<Mmap> {
    if !path.exists() {
        return Err(XdfError::FileNotFound(path.display().to_string()));
    }
    let file = File::open(path).map_err(XdfError::IoError)?;
    // SAFETY: read-only map, dropped as soon as the loader has parsed it.
    let mmap = unsafe { Mmap::map(&file).map_err(XdfError::IoError)? };
    Ok(mmap)
}
