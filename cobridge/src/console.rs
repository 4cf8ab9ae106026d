//! Line-oriented JSON console.
//!
//! Serves the verbs over newline-delimited JSON:
//!
//! ```text
//! → {"id": 1, "verb": "get", "args": {"itf":0,"id":1,"reg":"0x6041","subreg":0,"type":"u16"}}
//! ← {"id":1,"status":0,"reply":[567]}
//! → {"id": 2, "verb": "add", "args": {"name":"sw","periodms":100,"itf":0,"id":1,"reg":"0x6041","subreg":0,"type":"u16"}}
//! ← {"id":2,"status":0,"reply":null}
//! ← {"event":"sw","data":[567]}
//! ```
//!
//! Every subscription created by the session is forwarded to the output
//! until it is removed. The loop ends on end of input or when the shutdown
//! token is cancelled.

use crate::error::ServiceError;
use crate::registry::SubscriptionHandle;
use crate::service::Service;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Event lines queued for output before forwarders wait.
const EVENT_QUEUE: usize = 256;

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    id: Value,
    verb: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize)]
struct Reply<'a> {
    id: &'a Value,
    status: i32,
    reply: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct Event<'a> {
    event: &'a str,
    data: Value,
}

/// Run the console until end of input or cancellation of `shutdown`.
///
/// # Errors
/// Returns the I/O error that stopped reading or writing.
pub async fn run<R, W>(
    service: Arc<Service>,
    input: R,
    mut output: W,
    shutdown: CancellationToken,
) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let (events_tx, mut events_rx) = mpsc::channel::<String>(EVENT_QUEUE);
    info!("Console ready");

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                info!("Console stopped by shutdown request");
                break;
            }
            Some(event) = events_rx.recv() => write_line(&mut output, &event).await?,
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("Console input closed");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let reply = handle_line(&service, &line, &events_tx).await;
                write_line(&mut output, &reply).await?;
            }
        }
    }
    Ok(())
}

async fn handle_line(service: &Service, line: &str, events: &mpsc::Sender<String>) -> String {
    let request: Request = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            debug!("Malformed console line: {}", e);
            return encode(&Reply {
                id: &Value::Null,
                status: ServiceError::InvalidDescription(String::new()).status(),
                reply: None,
                error: Some(format!("malformed request: {e}")),
            });
        }
    };

    let response = service.call(&request.verb, &request.args).await;
    if let Some(handle) = response.events {
        forward(handle, events.clone());
    }
    encode(&Reply {
        id: &request.id,
        status: response.status,
        reply: response.payload,
        error: response.error,
    })
}

/// Copy the payloads of a subscription to the console output.
fn forward(handle: SubscriptionHandle, events: mpsc::Sender<String>) {
    let name = handle.name().to_string();
    let mut receiver = handle.into_receiver();
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(payload) => {
                    let data = serde_json::from_str(&payload).unwrap_or(Value::Null);
                    let line = encode(&Event { event: &name, data });
                    if events.send(line).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!("Console dropped {} events of '{}'", missed, name);
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("Console forwarding of '{}' ended", name);
    });
}

fn encode<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| {
        format!(r#"{{"id":null,"status":-14,"reply":null,"error":"{e}"}}"#)
    })
}

async fn write_line<W: AsyncWrite + Unpin>(output: &mut W, line: &str) -> io::Result<()> {
    output.write_all(line.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await
}
