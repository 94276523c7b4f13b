//! Newline framing shared by the stream transports (TCP and RFCOMM).

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tracing::trace;

use super::LinkMonitor;

/// Writes `data` followed by `\n` as a single buffer, then flushes.
pub(crate) async fn write_line<W>(writer: &mut W, data: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = Vec::with_capacity(data.len() + 1);
    line.extend_from_slice(data.as_bytes());
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await
}

/// Drains and discards inbound bytes, reporting EOF or a read error as link
/// loss.
///
/// Receivers may talk back, but nothing they send is interpreted.
pub(crate) fn spawn_eof_watch<R>(mut reader: R, link: LinkMonitor, channel: &'static str) -> JoinHandle<()>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        let mut buf = [0u8; 512];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => {
                    link.lost(format!("{channel} peer closed the connection"));
                    return;
                }
                Ok(n) => trace!(bytes = n, channel, "discarding inbound bytes"),
                Err(e) => {
                    link.lost(format!("{channel} read failed: {e}"));
                    return;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_line_appends_newline() {
        let (mut ours, mut theirs) = tokio::io::duplex(64);

        write_line(&mut ours, "a,1").await.unwrap();
        drop(ours);

        let mut received = String::new();
        theirs.read_to_string(&mut received).await.unwrap();
        assert_eq!(received, "a,1\n");
    }

    #[tokio::test]
    async fn test_eof_watch_reports_close() {
        // Arrange
        let (ours, theirs) = tokio::io::duplex(64);
        let (link, mut losses) = LinkMonitor::channel(4);
        let watch = spawn_eof_watch(ours, link, "test");

        // Act
        drop(theirs);

        // Assert
        let loss = losses.recv().await.unwrap();
        assert_eq!(loss.epoch, 4);
        assert!(loss.reason.contains("closed"));
        watch.await.unwrap();
    }
}
