//! Rotation signature -- the leading bytes of a watched file.

use std::io::SeekFrom;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Reads up to `len` bytes from the start of the file.
///
/// Leaves the cursor wherever the read ended; callers seek afterwards.
pub async fn read_signature(file: &mut File, len: usize) -> std::io::Result<Vec<u8>> {
    file.seek(SeekFrom::Start(0)).await?;

    let mut signature = Vec::with_capacity(len);
    let mut limited = file.take(len as u64);
    limited.read_to_end(&mut signature).await?;
    Ok(signature)
}

/// `true` when two signatures describe different files.
///
/// Only the common prefix is compared, so a signature captured while the
/// file was shorter than the window does not look like a rotation later.
/// An empty stored signature never mismatches.
pub fn is_rotated(stored: &[u8], current: &[u8]) -> bool {
    if stored.is_empty() {
        return false;
    }
    let common = stored.len().min(current.len());
    stored[..common] != current[..common]
}
