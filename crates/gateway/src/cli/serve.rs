//! `relay-adapter serve`: stdio connector.
//!
//! A chat-platform bridge process talks to the adapter over pipes:
//!
//! ```text
//! stdin   {"type":"command","text":"weather","room":"general","username":"bob"}
//! stdout  {"kind":"reply","room":"general","action":{"type":"text","text":"Sunny"}}
//! stdout  {"kind":"hook","room":"general","action":{"type":"text","text":"Reminder!"}}
//! stdout  {"kind":"error","room":"general","error":"unrecognized message type ..."}
//! ```
//!
//! Each line is routed on its own task. The router's per-room lock runs
//! one message per room at a time, but two lines for the same room may
//! still be handled in either order.

use std::sync::Arc;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use ra_domain::config::Config;
use ra_domain::{InboundMessage, OutgoingAction};
use ra_sessions::BoxError;

use crate::bootstrap;
use crate::events::PlatformSink;
use crate::router::ConversationRouter;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Output lines
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputLine {
    Reply { room: String, action: OutgoingAction },
    Hook { room: String, action: OutgoingAction },
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        room: Option<String>,
        error: String,
    },
}

/// Hook deliveries go to the same stdout stream as replies.
pub struct StdoutSink {
    lines: mpsc::Sender<OutputLine>,
}

#[async_trait::async_trait]
impl PlatformSink for StdoutSink {
    async fn send_message(&self, room: &str, action: OutgoingAction) -> Result<(), BoxError> {
        self.lines
            .send(OutputLine::Hook {
                room: room.to_owned(),
                action,
            })
            .await
            .map_err(|_| "stdout writer closed".into())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Entry point
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn serve(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("relay adapter starting");

    let (state, events) = bootstrap::build_adapter_state(config).await?;
    let cancel = CancellationToken::new();

    let (lines_tx, lines_rx) = mpsc::channel::<OutputLine>(256);
    let writer = tokio::spawn(write_lines(lines_rx));

    let sink = Arc::new(StdoutSink {
        lines: lines_tx.clone(),
    });
    let pump = bootstrap::connect(&state, events, sink, cancel.clone());

    tokio::select! {
        res = read_lines(state.router.clone(), lines_tx) => {
            if let Err(e) = res {
                tracing::error!(error = %e, "stdin reader failed");
            }
            tracing::info!("stdin closed, shutting down");
        }
        _ = shutdown_signal() => {}
    }

    // ── Shutdown ─────────────────────────────────────────────────────
    cancel.cancel();
    state.brain.shutdown();
    if let Err(e) = pump.await {
        tracing::warn!(error = %e, "event pump task failed");
    }
    // The writer ends once the sink and every routing task are gone.
    if let Err(e) = writer.await {
        tracing::warn!(error = %e, "stdout writer task failed");
    }

    tracing::info!("shutdown complete");
    Ok(())
}

async fn read_lines(
    router: Arc<ConversationRouter>,
    out: mpsc::Sender<OutputLine>,
) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let msg: InboundMessage = match serde_json::from_str(line) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!(error = %e, "malformed inbound line");
                let _ = out
                    .send(OutputLine::Error {
                        room: None,
                        error: format!("malformed message: {e}"),
                    })
                    .await;
                continue;
            }
        };

        let router = router.clone();
        let out = out.clone();
        tokio::spawn(async move {
            if let Some(line) = route_line(&router, msg).await {
                let _ = out.send(line).await;
            }
        });
    }
    Ok(())
}

/// Route one message into the line to print, if any.
pub async fn route_line(router: &ConversationRouter, msg: InboundMessage) -> Option<OutputLine> {
    let room = msg.room.clone();
    match router.route(msg).await {
        Ok(outcome) => outcome
            .into_action()
            .map(|action| OutputLine::Reply { room, action }),
        Err(e) => {
            tracing::error!(room = %room, error = %e, "routing failed");
            Some(OutputLine::Error {
                room: Some(room),
                error: e.to_string(),
            })
        }
    }
}

async fn write_lines(mut lines: mpsc::Receiver<OutputLine>) {
    let mut stdout = tokio::io::stdout();
    while let Some(line) = lines.recv().await {
        let mut json = match serde_json::to_string(&line) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, "could not serialize output line");
                continue;
            }
        };
        json.push('\n');
        if let Err(e) = stdout.write_all(json.as_bytes()).await {
            tracing::error!(error = %e, "stdout write failed");
            break;
        }
        let _ = stdout.flush().await;
    }
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => tracing::info!("received SIGINT, shutting down"),
                    _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to register SIGTERM handler");
                let _ = ctrl_c.await;
                tracing::info!("received SIGINT, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
        tracing::info!("received SIGINT, shutting down");
    }
}
