//! Session coordinator - owns one optimizer connection from accept to close.
//!
//! Flow:
//! 1. Bind the endpoint, read the simulator's greeting frame, accept one client
//! 2. Relay the greeting, exchange socket addresses
//! 3. Serve: request → expression → (simulator answer → reply), one at a time
//! 4. On exit request, peer hangup or any terminal error: report, release
//!    everything, tell the host to exit with [`BRIDGE_EXIT_CODE`]
//!
//! There is no timeout on any read. A silent simulator or optimizer stalls the
//! session until the other side closes its stream.

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;

use crate::bridge::peer::PeerChannel;
use crate::bridge::protocol::Reply;
use crate::bridge::text::{TextChannel, TextFrame};
use crate::bridge::transport::{BoundListener, Endpoint, PeerAddr, PeerStream, SocketFileGuard};
use crate::config::BridgeConfig;
use crate::diagnostics::Diagnostics;
use crate::error::BridgeError;
use crate::store::VariableStore;
use crate::translator::{Command, FileLayout, RequestSeq, TranslationError, Translator};

/// Exit status telling the launcher that the bridge, not the simulator, ended the session.
pub const BRIDGE_EXIT_CODE: i32 = 255;

pub const SESSION_END_NOTICE: &str = "Connection with the optimizer ended!\n\n";

type Peer = PeerChannel<Box<dyn PeerStream>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Listening,
    Handshaking,
    Serving,
    Closing,
    Closed,
}

#[derive(Debug)]
pub enum CloseReason {
    /// The optimizer sent `info`/`exit`.
    Terminated,
    /// The optimizer closed its socket between requests.
    PeerClosed,
    Failed(BridgeError),
}

#[derive(Debug)]
pub struct SessionReport {
    pub reason: CloseReason,
    /// Round trips completed; also the next file sequence number.
    pub completed: RequestSeq,
    /// Every request read from the optimizer, rejected ones included.
    pub handled: u64,
}

enum Flow {
    Continue,
    Terminate,
    PeerClosed,
}

/// Long-lived bridge state: where to listen and how to translate.
pub struct Bridge<S> {
    endpoint: Endpoint,
    translator: Translator<S>,
    debug: bool,
    debug_delay: std::time::Duration,
    state_tx: watch::Sender<SessionState>,
}

impl<S: VariableStore> Bridge<S> {
    pub fn new(config: &BridgeConfig, store: S) -> Self {
        let (state_tx, _) = watch::channel(SessionState::default());
        Self {
            endpoint: config.endpoint.clone(),
            translator: Translator::new(FileLayout::from_config(config), store),
            debug: config.debug,
            debug_delay: config.debug_delay,
            state_tx,
        }
    }

    /// Observe state transitions of the current session.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Bind the configured endpoint and run the single session on it.
    pub async fn run<R, W, E>(
        &self,
        text: TextChannel<R, W>,
        diagnostics: Diagnostics<E>,
    ) -> SessionReport
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
        E: AsyncWrite + Unpin,
    {
        let session = self.session(text, diagnostics);
        match BoundListener::bind(&self.endpoint).await {
            Ok(listener) => session.run(listener).await,
            Err(e) => {
                tracing::error!(endpoint = %self.endpoint, error = %e, "Failed to bind listener");
                session.close(CloseReason::Failed(BridgeError::Transport(e))).await
            }
        }
    }

    /// Run the session on a listener the caller already bound.
    pub async fn run_with_listener<R, W, E>(
        &self,
        listener: BoundListener,
        text: TextChannel<R, W>,
        diagnostics: Diagnostics<E>,
    ) -> SessionReport
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
        E: AsyncWrite + Unpin,
    {
        self.session(text, diagnostics).run(listener).await
    }

    fn session<R, W, E>(
        &self,
        text: TextChannel<R, W>,
        diagnostics: Diagnostics<E>,
    ) -> Session<'_, S, R, W, E>
    where
        E: AsyncWrite + Unpin,
    {
        self.state_tx.send_replace(SessionState::Listening);
        Session {
            translator: &self.translator,
            state_tx: &self.state_tx,
            text,
            diagnostics: diagnostics.with_debug(self.debug, self.debug_delay),
            socket_file: None,
            seq: RequestSeq::default(),
            handled: 0,
        }
    }
}

struct Session<'a, S, R, W, E> {
    translator: &'a Translator<S>,
    state_tx: &'a watch::Sender<SessionState>,
    text: TextChannel<R, W>,
    diagnostics: Diagnostics<E>,
    socket_file: Option<SocketFileGuard>,
    seq: RequestSeq,
    handled: u64,
}

impl<S, R, W, E> Session<'_, S, R, W, E>
where
    S: VariableStore,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    E: AsyncWrite + Unpin,
{
    fn transition(&self, next: SessionState) {
        let previous = self.state_tx.send_replace(next);
        tracing::debug!(from = ?previous, to = ?next, "Session state changed");
    }

    async fn run(mut self, listener: BoundListener) -> SessionReport {
        let reason = match self.open(listener).await {
            Ok(mut peer) => {
                self.transition(SessionState::Serving);
                let reason = self.serve(&mut peer).await;
                if let Err(e) = peer.close().await {
                    tracing::debug!(error = %e, "Optimizer socket already closed");
                }
                reason
            }
            Err(e) => CloseReason::Failed(e),
        };
        self.close(reason).await
    }

    /// Greeting, accept, address exchange.
    async fn open(&mut self, listener: BoundListener) -> Result<Peer, BridgeError> {
        let greeting = self.text.recv_text().await?;
        tracing::debug!(?greeting, "Simulator greeting received");

        let accepted = listener.accept().await.map_err(BridgeError::Transport)?;
        self.socket_file = accepted.socket_file;
        let mut peer = PeerChannel::new(accepted.stream);

        self.transition(SessionState::Handshaking);
        self.handshake(&mut peer, greeting, &accepted.peer).await?;
        Ok(peer)
    }

    async fn handshake(
        &mut self,
        peer: &mut Peer,
        greeting: TextFrame,
        peer_addr: &PeerAddr,
    ) -> Result<(), BridgeError> {
        peer.send_object(&Reply::info(greeting.text().into_owned()))
            .await?;

        let hello = peer.recv_object().await?;
        let client_addr = describe_address(hello.get("data").unwrap_or(&Value::Null));
        self.diagnostics
            .send_warning(&format!(
                "Connected to client with the address {}\n",
                client_addr
            ))
            .await?;

        peer.send_object(&Reply::info(peer_addr.to_json())).await?;
        self.diagnostics.send_debug("Client is connected!").await?;
        tracing::info!(%peer_addr, %client_addr, "Handshake complete");
        Ok(())
    }

    async fn serve(&mut self, peer: &mut Peer) -> CloseReason {
        loop {
            let outcome = match self.step(peer).await {
                Err(BridgeError::Translation(e)) => self.reject(peer, e).await.map(|()| Flow::Continue),
                other => other,
            };

            match outcome {
                Ok(Flow::Continue) => {}
                Ok(Flow::Terminate) => return CloseReason::Terminated,
                Ok(Flow::PeerClosed) => return CloseReason::PeerClosed,
                Err(e) => return CloseReason::Failed(e),
            }
        }
    }

    /// One request, start to finish.
    async fn step(&mut self, peer: &mut Peer) -> Result<Flow, BridgeError> {
        let Some(request) = peer.recv_request().await? else {
            return Ok(Flow::PeerClosed);
        };
        self.handled += 1;

        match self.translator.translate_request(&request, self.seq)? {
            Command::Terminate => {
                tracing::info!("Exit requested by optimizer");
                Ok(Flow::Terminate)
            }
            Command::Notify { expression } => {
                self.text.send_text(&expression).await?;
                Ok(Flow::Continue)
            }
            Command::RoundTrip { kind, expression } => {
                self.text.send_text(&expression).await?;
                let answer = self.text.recv_text().await?;
                let answer = answer.text();

                let reply = self.translator.translate_response(&answer, self.seq)?;
                tracing::debug!(%kind, seq = %self.seq, reply_kind = ?reply.kind, "Forwarding reply");
                peer.send_object(&reply).await?;
                self.diagnostics
                    .send_debug(&format!("Data sent to client: {}", answer))
                    .await?;

                self.seq.advance();
                Ok(Flow::Continue)
            }
        }
    }

    async fn reject(&mut self, peer: &mut Peer, error: TranslationError) -> Result<(), BridgeError> {
        tracing::warn!(error = %error, "Rejected optimizer request");
        self.diagnostics
            .send_warning(&format!("Error: {}\n", error))
            .await?;
        peer.send_object(&Reply::rejected()).await?;
        Ok(())
    }

    async fn close(mut self, reason: CloseReason) -> SessionReport {
        self.transition(SessionState::Closing);

        match &reason {
            CloseReason::Terminated => tracing::info!("Session ended by optimizer"),
            CloseReason::PeerClosed => tracing::info!("Optimizer disconnected"),
            CloseReason::Failed(e) => {
                tracing::error!(error = %e, "Session failed");
                if let Err(write_err) = self.diagnostics.send_warning(&format!("Error: {}\n", e)).await {
                    tracing::warn!(error = %write_err, "Could not report failure to simulator");
                }
            }
        }

        if let Err(e) = self.diagnostics.send_warning(SESSION_END_NOTICE).await {
            tracing::warn!(error = %e, "Could not send session end notice");
        }
        if let Err(e) = self.text.close().await {
            tracing::debug!(error = %e, "Simulator output already closed");
        }
        if let Err(e) = self.diagnostics.close().await {
            tracing::debug!(error = %e, "Simulator error stream already closed");
        }
        drop(self.socket_file.take());

        self.transition(SessionState::Closed);
        SessionReport {
            reason,
            completed: self.seq,
            handled: self.handled,
        }
    }
}

/// `host:port` for the `[host, port]` pair clients send, JSON text otherwise.
fn describe_address(value: &Value) -> String {
    match value {
        Value::Array(parts) if parts.len() == 2 => {
            let host = parts[0].as_str().map(str::to_string).unwrap_or_else(|| parts[0].to_string());
            format!("{}:{}", host, parts[1])
        }
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
