//! MD5 content hashing for custom files.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Read buffer for hashing (64KB)
const BUFFER_SIZE: usize = 64 * 1024;

/// Compute the lowercase hex MD5 of a file, streaming it from disk.
pub fn md5_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut context = md5::Context::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        context.consume(&buffer[..n]);
    }

    Ok(format!("{:x}", context.compute()))
}

/// Hash a file on the blocking pool so the event loop keeps running.
pub async fn md5_file_async(path: PathBuf) -> io::Result<String> {
    tokio::task::spawn_blocking(move || md5_file(&path))
        .await
        .map_err(io::Error::other)?
}
