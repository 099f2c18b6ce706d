//! Content hashing using blake3.
//!
//! Used to tell whether a compiled output actually changed between two
//! watcher signals (linkers often rewrite identical bytes).

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// A 256-bit content hash (blake3 output).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Hash an in-memory buffer.
    #[inline]
    pub fn of(bytes: &[u8]) -> Self {
        Self(*blake3::hash(bytes).as_bytes())
    }

    /// Convert to hex string (for debugging/display).
    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // First 16 chars of hex for brevity
        write!(f, "{}", &self.to_hex()[..16])
    }
}

/// Compute blake3 hash of file contents, streaming.
pub fn file_hash(path: &Path) -> io::Result<ContentHash> {
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(64 * 1024, file);
    let mut hasher = blake3::Hasher::new();
    let mut buffer = [0u8; 64 * 1024];

    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => {
                hasher.update(&buffer[..n]);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    Ok(ContentHash(*hasher.finalize().as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_hash_matches_buffer_hash() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("app.pvm");
        std::fs::write(&path, b"{\"format\":1}").unwrap();

        let from_file = file_hash(&path).unwrap();
        assert_eq!(from_file, ContentHash::of(b"{\"format\":1}"));
        assert_ne!(from_file, ContentHash::of(b"{}"));
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(file_hash(Path::new("/nonexistent/app.pvm")).is_err());
    }

    #[test]
    fn test_display_is_short() {
        assert_eq!(ContentHash::of(b"x").to_string().len(), 16);
    }
}
