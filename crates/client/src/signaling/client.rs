//! Websocket signaling client
//!
//! Runs as a background task owning the socket. Commands arrive over an
//! unbounded channel; everything observable leaves through the typed
//! event port. Involuntary socket loss reconnects with exponential
//! backoff; an application `disconnect()` parks the task until the next
//! `connect()`, which the orchestrator uses for its reset-then-reconnect
//! cycle.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use super::protocol::{HelloMeta, IceCandidatePayload, IncomingFrame, SignalFrame};
use crate::config::BackoffOptions;

/// Events emitted by the signaling session
#[derive(Debug, Clone, PartialEq)]
pub enum SignalingEvent {
    /// Human-readable connection progress
    Status(String),
    /// Registration acknowledged by the server
    Registered,
    /// The server's session-description offer
    Offer { sdp: String },
    /// A remote ICE candidate
    RemoteCandidate(IceCandidatePayload),
    /// Socket gone; `reconnect` is false only for application-requested
    /// disconnects
    Disconnected { reconnect: bool },
    /// Server-reported or local error, string form only
    Error(String),
}

enum Command {
    Connect,
    Send(String),
    UpdateMeta(HelloMeta),
    Disconnect,
    Shutdown,
}

enum SessionExit {
    Voluntary,
    Involuntary,
    Shutdown,
}

/// Handle to the background signaling task
#[derive(Debug)]
pub struct SignalingClient {
    cmd_tx: mpsc::UnboundedSender<Command>,
    task: tokio::task::JoinHandle<()>,
}

impl SignalingClient {
    /// Spawn the signaling task. No socket is opened until
    /// [`connect`](Self::connect).
    pub fn spawn(
        url: Url,
        peer_id: u32,
        meta: HelloMeta,
        backoff: BackoffOptions,
        events: mpsc::UnboundedSender<SignalingEvent>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(url, peer_id, meta, backoff, cmd_rx, events));
        Self { cmd_tx, task }
    }

    pub fn connect(&self) {
        let _ = self.cmd_tx.send(Command::Connect);
    }

    /// Application-requested disconnect; the next event is
    /// `Disconnected { reconnect: false }`.
    pub fn disconnect(&self) {
        let _ = self.cmd_tx.send(Command::Disconnect);
    }

    /// Refresh the resolution metadata used at the next registration.
    pub fn update_meta(&self, meta: HelloMeta) {
        let _ = self.cmd_tx.send(Command::UpdateMeta(meta));
    }

    pub fn send_answer(&self, sdp: impl Into<String>) {
        self.send_frame(SignalFrame::answer(sdp));
    }

    pub fn send_candidate(&self, candidate: IceCandidatePayload) {
        self.send_frame(SignalFrame::ice(candidate));
    }

    fn send_frame(&self, frame: SignalFrame) {
        match frame.encode() {
            Ok(text) => {
                let _ = self.cmd_tx.send(Command::Send(text));
            }
            Err(e) => warn!("dropping unencodable signaling frame: {e}"),
        }
    }

    /// Stop the task for good. Used by `cleanup()`; safe to call twice.
    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(Command::Shutdown);
        self.task.abort();
    }
}

async fn run(
    url: Url,
    peer_id: u32,
    mut meta: HelloMeta,
    backoff: BackoffOptions,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<SignalingEvent>,
) {
    'idle: loop {
        // Parked until the application asks for a connection.
        loop {
            match cmd_rx.recv().await {
                Some(Command::Connect) => break,
                Some(Command::UpdateMeta(m)) => meta = m,
                Some(Command::Shutdown) | None => return,
                Some(_) => {}
            }
        }

        let mut delay_ms = backoff.initial_ms;
        loop {
            let _ = events.send(SignalingEvent::Status(format!("Connecting to {url}")));
            match connect_async(url.as_str()).await {
                Ok((ws, _)) => {
                    info!(%url, "signaling socket open");
                    delay_ms = backoff.initial_ms;
                    let (mut sink, mut stream) = ws.split();

                    match meta.registration_line(peer_id) {
                        Ok(line) => {
                            if sink.send(Message::Text(line)).await.is_err() {
                                let _ =
                                    events.send(SignalingEvent::Disconnected { reconnect: true });
                                continue;
                            }
                        }
                        Err(e) => {
                            let _ = events.send(SignalingEvent::Error(format!(
                                "cannot build registration: {e}"
                            )));
                        }
                    }

                    let exit = loop {
                        tokio::select! {
                            cmd = cmd_rx.recv() => match cmd {
                                Some(Command::Send(text)) => {
                                    if sink.send(Message::Text(text)).await.is_err() {
                                        break SessionExit::Involuntary;
                                    }
                                }
                                Some(Command::UpdateMeta(m)) => meta = m,
                                Some(Command::Disconnect) => {
                                    let _ = sink.send(Message::Close(None)).await;
                                    break SessionExit::Voluntary;
                                }
                                Some(Command::Connect) => {}
                                Some(Command::Shutdown) | None => {
                                    let _ = sink.send(Message::Close(None)).await;
                                    break SessionExit::Shutdown;
                                }
                            },
                            msg = stream.next() => match msg {
                                Some(Ok(Message::Text(text))) => {
                                    handle_frame(&text, &events);
                                }
                                Some(Ok(Message::Ping(payload))) => {
                                    let _ = sink.send(Message::Pong(payload)).await;
                                }
                                Some(Ok(Message::Close(_))) | None => {
                                    warn!("signaling socket closed by server");
                                    break SessionExit::Involuntary;
                                }
                                Some(Ok(_)) => {}
                                Some(Err(e)) => {
                                    warn!("signaling socket error: {e}");
                                    break SessionExit::Involuntary;
                                }
                            },
                        }
                    };

                    match exit {
                        SessionExit::Shutdown => return,
                        SessionExit::Voluntary => {
                            let _ = events.send(SignalingEvent::Disconnected { reconnect: false });
                            continue 'idle;
                        }
                        SessionExit::Involuntary => {
                            let _ = events.send(SignalingEvent::Disconnected { reconnect: true });
                        }
                    }
                }
                Err(e) => {
                    let _ = events.send(SignalingEvent::Status(format!(
                        "Connection failed, retrying in {delay_ms} ms: {e}"
                    )));
                }
            }

            debug!(delay_ms, "signaling reconnect backoff");
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
            delay_ms = backoff.next_delay_ms(delay_ms);
        }
    }
}

fn handle_frame(text: &str, events: &mpsc::UnboundedSender<SignalingEvent>) {
    match IncomingFrame::decode(text) {
        Ok(IncomingFrame::Registered) => {
            let _ = events.send(SignalingEvent::Registered);
            let _ = events.send(SignalingEvent::Status("Registered with server".to_string()));
        }
        Ok(IncomingFrame::ServerError(detail)) => {
            let _ = events.send(SignalingEvent::Error(detail));
        }
        Ok(IncomingFrame::Signal(SignalFrame::Sdp { sdp })) => {
            if sdp.kind == "offer" {
                let _ = events.send(SignalingEvent::Offer { sdp: sdp.sdp });
            } else {
                warn!(kind = %sdp.kind, "ignoring unexpected session description");
            }
        }
        Ok(IncomingFrame::Signal(SignalFrame::Ice { ice })) => {
            let _ = events.send(SignalingEvent::RemoteCandidate(ice));
        }
        Err(e) => {
            // Protocol violation: log and drop, the session continues.
            warn!("dropping malformed signaling frame: {e}");
        }
    }
}
