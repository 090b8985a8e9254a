use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
	Stdout,
	Stderr,
}

/// Copy of everything a child wrote, kept for the lifetime of its handle.
///
/// The buffers are unbounded: a chatty process that runs for a long time
/// grows them without limit. Capping would drop output mid-stream, so the
/// buffer is left uncapped and the cost is paid in memory.
#[derive(Clone, Default)]
pub struct OutputCapture {
	stdout: Arc<Mutex<Vec<u8>>>,
	stderr: Arc<Mutex<Vec<u8>>>,
}

impl OutputCapture {
	pub fn new() -> Self {
		Self::default()
	}

	fn buffer(&self, stream: Stream) -> &Arc<Mutex<Vec<u8>>> {
		match stream {
			Stream::Stdout => &self.stdout,
			Stream::Stderr => &self.stderr,
		}
	}

	pub async fn write(&self, stream: Stream, data: &[u8]) {
		self.buffer(stream).lock().await.extend_from_slice(data);
	}

	pub async fn snapshot(&self, stream: Stream) -> Vec<u8> {
		self.buffer(stream).lock().await.clone()
	}

	pub async fn len(&self, stream: Stream) -> usize {
		self.buffer(stream).lock().await.len()
	}
}

/// Forward `reader` to our own stdout/stderr and into `capture` until EOF.
pub async fn tee<R: AsyncRead + Unpin>(mut reader: R, stream: Stream, capture: OutputCapture) {
	let mut buf = [0u8; 4096];
	loop {
		match reader.read(&mut buf).await {
			Ok(0) => break,
			Ok(n) => {
				let data = &buf[..n];
				let echoed = match stream {
					Stream::Stdout => echo(tokio::io::stdout(), data).await,
					Stream::Stderr => echo(tokio::io::stderr(), data).await,
				};
				if let Err(e) = echoed {
					tracing::debug!("terminal echo failed: {}", e);
				}
				capture.write(stream, data).await;
			}
			Err(e) => {
				tracing::debug!("child {:?} closed: {}", stream, e);
				break;
			}
		}
	}
}

async fn echo<W: tokio::io::AsyncWrite + Unpin>(mut out: W, data: &[u8]) -> std::io::Result<()> {
	out.write_all(data).await?;
	out.flush().await
}
