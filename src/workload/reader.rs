//! Capture tasks for workload stdout and stderr.

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::codec::OutputCodec;
use super::SharedCapture;

/// Spawn a task that drains one output stream into `capture`.
///
/// Runs until EOF, a decode failure, or cancellation; in every case the
/// buffer is marked closed before the task exits so observers polling it
/// can distinguish "quiet" from "finished".
pub fn spawn_capture<R>(
    stream_name: &'static str,
    stream: R,
    capture: SharedCapture,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut frames = FramedRead::new(stream, OutputCodec::new());
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!(stream = stream_name, "capture cancelled");
                    break;
                }
                frame = frames.next() => match frame {
                    Some(Ok(line)) => {
                        capture.lock().await.push(line);
                    }
                    Some(Err(err)) => {
                        warn!(stream = stream_name, error = %err, "capture aborted");
                        break;
                    }
                    None => {
                        debug!(stream = stream_name, "stream closed");
                        break;
                    }
                },
            }
        }
        capture.lock().await.mark_closed();
    })
}
