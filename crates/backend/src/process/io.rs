use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Bytes written to the formatter's stdin per write call.
pub const WRITE_CHUNK_SIZE: usize = 64 * 1024;

/// Writes `bytes` in [`WRITE_CHUNK_SIZE`] chunks, then closes the writer.
///
/// A child that exits before reading all of its input closes the pipe; the resulting
/// `BrokenPipe` ends the write early and the exit status tells the rest of the story.
pub(crate) async fn write_chunked<W>(mut writer: W, bytes: &[u8]) -> io::Result<()>
where
	W: AsyncWrite + Unpin,
{
	for chunk in bytes.chunks(WRITE_CHUNK_SIZE) {
		match writer.write_all(chunk).await {
			Ok(()) => {}
			Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
				tracing::trace!("formatter closed stdin early");
				return Ok(());
			}
			Err(e) => return Err(e),
		}
	}
	match writer.shutdown().await {
		Err(e) if e.kind() != io::ErrorKind::BrokenPipe => Err(e),
		_ => Ok(()),
	}
}
