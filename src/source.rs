use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{info, warn};

/// Producer of raw plate recognition candidates (a detection pipeline).
#[async_trait]
pub trait PlateSource: Send {
    /// Next candidate, or `None` once the source is exhausted.
    async fn next_candidate(&mut self) -> Option<String>;
}

/// Reads one candidate per line, e.g. from a recogniser writing to a pipe.
/// Blank lines are skipped.
pub struct LinePlateSource<R> {
    lines: Lines<BufReader<R>>,
}

impl<R: AsyncRead + Unpin + Send> LinePlateSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> PlateSource for LinePlateSource<R> {
    async fn next_candidate(&mut self) -> Option<String> {
        loop {
            match self.lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        return Some(line.to_string());
                    }
                }
                Ok(None) => return None,
                Err(e) => {
                    warn!("plate feed read error: {e}");
                    return None;
                }
            }
        }
    }
}

/// Forward candidates into the bounded voting channel. A full channel drops
/// the candidate rather than stalling the producer.
pub async fn run_plate_feed<S: PlateSource>(mut source: S, tx: mpsc::Sender<String>) {
    let mut forwarded = 0u64;
    while let Some(candidate) = source.next_candidate().await {
        match tx.try_send(candidate) {
            Ok(()) => forwarded += 1,
            Err(TrySendError::Full(dropped)) => {
                metrics::counter!(crate::observability::CANDIDATES_DROPPED_TOTAL).increment(1);
                tracing::debug!("voting channel full, dropped {dropped}");
            }
            Err(TrySendError::Closed(_)) => break,
        }
    }
    info!("plate feed ended after {forwarded} candidates");
}
