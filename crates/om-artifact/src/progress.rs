//! Progress reporting for streamed copies.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::Result;

const CHUNK_SIZE: usize = 64 * 1024;

/// Receives progress of a single transfer.
///
/// `set_total` is called before the first `advance`. Positions only grow.
pub trait ProgressSink: Send {
    fn set_total(&mut self, total: u64);
    fn advance(&mut self, bytes: u64);
    fn finish(&mut self);
}

/// Discards progress
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn set_total(&mut self, _total: u64) {}
    fn advance(&mut self, _bytes: u64) {}
    fn finish(&mut self) {}
}

/// Copy `reader` into `writer`, reporting every chunk.
///
/// Returns the number of bytes copied. The writer is flushed but `finish`
/// is left to the caller, which may still reject the transfer.
pub async fn copy_with_progress<R, W>(
    reader: &mut R,
    writer: &mut W,
    total: Option<u64>,
    progress: &mut dyn ProgressSink,
) -> Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    if let Some(total) = total {
        progress.set_total(total);
    }
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut copied = 0u64;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
        copied += n as u64;
        progress.advance(n as u64);
    }
    writer.flush().await?;
    Ok(copied)
}
