//! Chunked file hashing
//!
//! Hashing is CPU bound, so file reads run on the blocking pool and never
//! stall other transfers on the runtime threads.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use crate::app::hash::{ContentHash, HashAlgorithm, StreamingHasher};
use crate::errors::{StoreError, StoreResult};

/// Hash everything a reader yields, `chunk_size` bytes at a time
///
/// Returns the digest and the number of bytes read.
pub fn hash_reader<R: Read>(
    reader: R,
    algorithm: HashAlgorithm,
    chunk_size: usize,
) -> io::Result<(ContentHash, u64)> {
    let mut hasher = StreamingHasher::new(algorithm);
    let total = feed_reader(reader, &mut hasher, chunk_size, None)?;
    Ok((hasher.finalize(), total))
}

/// Hash a file on disk without loading it into memory
pub async fn hash_file(
    path: &Path,
    algorithm: HashAlgorithm,
    chunk_size: usize,
) -> StoreResult<(ContentHash, u64)> {
    let path = path.to_path_buf();
    run_blocking(path.clone(), move || {
        let file = File::open(&path)?;
        hash_reader(BufReader::with_capacity(chunk_size, file), algorithm, chunk_size)
    })
    .await
}

/// Seed a hasher with the first `len` bytes of a partial file
///
/// Used when resuming so the running hash covers the bytes already on disk.
/// Fails with `UnexpectedEof` if the file is shorter than `len`.
pub async fn hash_prefix(
    path: &Path,
    len: u64,
    algorithm: HashAlgorithm,
    chunk_size: usize,
) -> StoreResult<StreamingHasher> {
    let path = path.to_path_buf();
    run_blocking(path.clone(), move || {
        let file = File::open(&path)?;
        let mut hasher = StreamingHasher::new(algorithm);
        let read = feed_reader(file, &mut hasher, chunk_size, Some(len))?;
        if read != len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("expected {} bytes, found {}", len, read),
            ));
        }
        Ok(hasher)
    })
    .await
}

fn feed_reader<R: Read>(
    mut reader: R,
    hasher: &mut StreamingHasher,
    chunk_size: usize,
    limit: Option<u64>,
) -> io::Result<u64> {
    let mut buffer = vec![0u8; chunk_size.max(1)];
    let mut total = 0u64;

    loop {
        let want = match limit {
            Some(limit) if total >= limit => break,
            Some(limit) => buffer.len().min((limit - total) as usize),
            None => buffer.len(),
        };

        let read = match reader.read(&mut buffer[..want]) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };

        hasher.update(&buffer[..read]);
        total += read as u64;
    }

    Ok(total)
}

async fn run_blocking<T, F>(path: PathBuf, job: F) -> StoreResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> io::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
        .map_err(|source| StoreError::Io { path, source })
}
