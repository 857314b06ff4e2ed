use std::{fs::File, io::Read, path::Path};

// Same window git uses when sniffing for binary content.
const SNIFF_LEN: u64 = 8000;

/// Classifies a file as binary if its leading bytes contain a NUL or aren't
/// valid UTF-8.
pub fn is_binary_file<P: AsRef<Path>>(path: P) -> std::io::Result<bool> {
    let mut buf = Vec::new();
    File::open(path)?.take(SNIFF_LEN).read_to_end(&mut buf)?;

    if buf.contains(&0) {
        return Ok(true);
    }

    match std::str::from_utf8(&buf) {
        Ok(_) => Ok(false),
        // A multi-byte sequence cut off by the sniff window is still text.
        Err(e) => Ok(e.error_len().is_some()),
    }
}
