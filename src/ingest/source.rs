//! Byte sources for the companion link.
//!
//! A reader task pulls raw bytes from the configured source and hands them to
//! the node loop over a bounded channel. The loop drains the channel without
//! blocking, so a quiet link never stalls housekeeping.

use crate::error::{NodeError, Result};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const READ_CHUNK_BYTES: usize = 512;
const TCP_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Where companion bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ByteSource {
    /// Standard input
    Stdin,
    /// Serial device or capture file
    Path(PathBuf),
    /// TCP stream, `host:port`
    Tcp(String),
}

impl FromStr for ByteSource {
    type Err = NodeError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(NodeError::source_error("empty source"));
        }
        if s == "stdin" || s == "-" {
            return Ok(ByteSource::Stdin);
        }
        if let Some(addr) = s.strip_prefix("tcp://") {
            if addr.is_empty() {
                return Err(NodeError::source_error("tcp source is missing host:port"));
            }
            return Ok(ByteSource::Tcp(addr.to_string()));
        }
        Ok(ByteSource::Path(PathBuf::from(s)))
    }
}

impl fmt::Display for ByteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ByteSource::Stdin => write!(f, "stdin"),
            ByteSource::Path(path) => write!(f, "{}", path.display()),
            ByteSource::Tcp(addr) => write!(f, "tcp://{}", addr),
        }
    }
}

/// Spawn a reader for `source`, returning the receiving end of its queue.
///
/// The task ends when the source reaches EOF (stdin, files) or the receiver
/// is dropped. TCP sources reconnect until the receiver goes away.
pub fn spawn_reader(
    source: ByteSource,
    capacity: usize,
) -> (mpsc::Receiver<Vec<u8>>, JoinHandle<Result<()>>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));

    let handle = tokio::spawn(async move {
        info!("Reading companion frames from {}", source);
        match source {
            ByteSource::Stdin => pump(tokio::io::stdin(), &tx).await,
            ByteSource::Path(path) => {
                let file = tokio::fs::File::open(&path).await.map_err(|e| {
                    NodeError::source_error(format!("cannot open {}: {}", path.display(), e))
                })?;
                pump(file, &tx).await
            }
            ByteSource::Tcp(addr) => read_tcp(&addr, &tx).await,
        }
    });

    (rx, handle)
}

/// Copy `reader` into the queue until EOF or the receiver is dropped.
pub async fn pump<R>(mut reader: R, tx: &mpsc::Sender<Vec<u8>>) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; READ_CHUNK_BYTES];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            debug!("Companion source reached end of input");
            return Ok(());
        }
        if tx.send(buf[..n].to_vec()).await.is_err() {
            debug!("Ingestion queue closed, stopping reader");
            return Ok(());
        }
    }
}

async fn read_tcp(addr: &str, tx: &mpsc::Sender<Vec<u8>>) -> Result<()> {
    while !tx.is_closed() {
        match tokio::net::TcpStream::connect(addr).await {
            Ok(stream) => {
                info!("Connected to companion at {}", addr);
                if let Err(e) = pump(stream, tx).await {
                    warn!("Companion link {} failed: {}", addr, e);
                } else {
                    warn!("Companion link {} closed", addr);
                }
            }
            Err(e) => warn!("Cannot reach companion at {}: {}", addr, e),
        }
        if tx.is_closed() {
            break;
        }
        tokio::time::sleep(TCP_RECONNECT_DELAY).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sources() {
        assert_eq!("stdin".parse::<ByteSource>().unwrap(), ByteSource::Stdin);
        assert_eq!("-".parse::<ByteSource>().unwrap(), ByteSource::Stdin);
        assert_eq!(
            "tcp://10.0.0.2:9000".parse::<ByteSource>().unwrap(),
            ByteSource::Tcp("10.0.0.2:9000".to_string())
        );
        assert_eq!(
            "/dev/ttyAMA0".parse::<ByteSource>().unwrap(),
            ByteSource::Path(PathBuf::from("/dev/ttyAMA0"))
        );
        assert!("".parse::<ByteSource>().is_err());
        assert!("tcp://".parse::<ByteSource>().is_err());
    }

    #[test]
    fn test_display_round_trips() {
        for text in ["stdin", "tcp://host:1", "/tmp/capture.log"] {
            let source: ByteSource = text.parse().unwrap();
            assert_eq!(source.to_string(), text);
        }
    }

    #[tokio::test]
    async fn test_pump_forwards_all_bytes() {
        let (tx, mut rx) = mpsc::channel(8);
        let input: &[u8] = b"DISTANCE:12\nHEARTBEAT:\n";
        pump(input, &tx).await.unwrap();
        drop(tx);

        let mut collected = Vec::new();
        while let Some(chunk) = rx.recv().await {
            collected.extend(chunk);
        }
        assert_eq!(collected, input);
    }

    #[tokio::test]
    async fn test_pump_stops_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let input: &[u8] = b"HEARTBEAT:\n";
        assert!(pump(input, &tx).await.is_ok());
    }
}
