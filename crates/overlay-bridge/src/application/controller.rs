//! BridgeController: session lifecycle and the dispatch loop.
//!
//! # State machine
//!
//! ```text
//! Disconnected ─start()─► Negotiating ─► Connecting ─► Running
//!      ▲                       │              │           │
//!      └──── failure ──────────┴──────────────┘           │
//!      └──────────── Stopping ◄── stop() / fatal error ───┘
//!      └──────────── peer closed the relay ───────────────┘
//! ```
//!
//! # Concurrency model
//!
//! Each session runs two tasks:
//!
//! 1. the relay read loop (owned by `RelayTransport`), the producer;
//! 2. the session task spawned here, which runs the dispatch loop and is the
//!    only owner of session state.
//!
//! They share nothing but the bounded inbound queue, the one-shot close
//! notice and the session's `CancellationToken`.  The controller itself keeps
//! only the token and the session task's `JoinHandle`, so `stop()` can cancel
//! and then await the full shutdown.
//!
//! `start()` on a controller that already runs a session first stops that
//! session and awaits it, so there is never more than one read loop.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::application::dispatcher::{DispatchSettings, Dispatcher};
use crate::application::ports::{
    ControlClient, ControlConnector, ControlError, NegotiationError, SessionNegotiator,
};
use crate::domain::config::SessionConfig;
use crate::domain::{CloseNotice, SessionState};
use crate::infrastructure::relay_transport::{RelayInbound, RelayTransport, TransportError};

/// Errors that end `start()` or a running session.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("control tool error: {0}")]
    Control(#[from] ControlError),

    #[error("session negotiation failed: {0}")]
    Negotiation(#[from] NegotiationError),

    #[error("relay transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("session task failed: {0}")]
    Task(String),
}

/// Timers that shape a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTiming {
    /// Interval between keepalive pings.
    pub ping_interval: Duration,
    /// Bound on each wait during graceful close.
    pub close_timeout: Duration,
}

impl From<&SessionConfig> for SessionTiming {
    fn from(config: &SessionConfig) -> Self {
        Self {
            ping_interval: config.ping_interval(),
            close_timeout: config.close_timeout(),
        }
    }
}

/// Handle on the running session task.
struct ActiveSession {
    token: CancellationToken,
    task: JoinHandle<Result<(), BridgeError>>,
}

/// Orchestrates one relay session at a time.
pub struct BridgeController {
    identity: String,
    settings: Arc<DispatchSettings>,
    timing: SessionTiming,
    negotiator: Arc<dyn SessionNegotiator>,
    connector: Arc<dyn ControlConnector>,
    state: Arc<watch::Sender<SessionState>>,
    active: Option<ActiveSession>,
}

impl BridgeController {
    /// Creates an idle controller for the external user `identity`.
    pub fn new(
        identity: impl Into<String>,
        settings: DispatchSettings,
        timing: SessionTiming,
        negotiator: Arc<dyn SessionNegotiator>,
        connector: Arc<dyn ControlConnector>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        Self {
            identity: identity.into(),
            settings: Arc::new(settings),
            timing,
            negotiator,
            connector,
            state: Arc::new(state),
            active: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Observes lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Starts a new session, retiring the current one first.
    ///
    /// Returns once the dispatch loop is running.  On failure every
    /// connection opened so far is released and the state is back to
    /// `Disconnected`.
    pub async fn start(&mut self) -> Result<(), BridgeError> {
        if self.active.is_some() {
            info!("superseding the running session");
            if let Err(e) = self.stop().await {
                warn!("previous session ended with error: {e}");
            }
        }

        let token = CancellationToken::new();
        set_state(&self.state, SessionState::Negotiating);

        let control = match self.connector.connect().await {
            Ok(control) => control,
            Err(e) => {
                error!("could not connect to the control tool: {e}");
                set_state(&self.state, SessionState::Disconnected);
                return Err(e.into());
            }
        };
        log_version(control.as_ref()).await;

        let (transport, inbound, dispatcher) = match self.open_session(&control, &token).await {
            Ok(parts) => parts,
            Err(e) => {
                error!("session start failed: {e}");
                if let Err(release) = control.disconnect().await {
                    warn!("failed to release control connection: {release}");
                }
                set_state(&self.state, SessionState::Disconnected);
                return Err(e);
            }
        };

        set_state(&self.state, SessionState::Running);
        let session = Session {
            dispatcher,
            control,
            transport,
            inbound,
            token: token.clone(),
            timing: self.timing,
            state: Arc::clone(&self.state),
        };
        self.active = Some(ActiveSession {
            token,
            task: tokio::spawn(session.run()),
        });
        Ok(())
    }

    /// Stops the current session and waits for its shutdown to finish.
    ///
    /// A no-op returning `Ok(())` when no session is active.  Otherwise
    /// returns the session's outcome: the first error met by the dispatch
    /// loop or during cleanup.
    pub async fn stop(&mut self) -> Result<(), BridgeError> {
        let Some(active) = self.active.take() else {
            debug!("stop requested with no active session");
            return Ok(());
        };

        if !active.task.is_finished() {
            set_state(&self.state, SessionState::Stopping);
        }
        active.token.cancel();
        let result = join_session(active.task).await;
        set_state(&self.state, SessionState::Disconnected);
        result
    }

    /// Waits until the current session ends on its own (peer close or fatal
    /// error) and returns its outcome.  Returns immediately when idle.
    ///
    /// Cancel-safe: dropping the future leaves the session running.
    pub async fn wait(&mut self) -> Result<(), BridgeError> {
        let Some(active) = self.active.as_mut() else {
            return Ok(());
        };
        let result = match (&mut active.task).await {
            Ok(result) => result,
            Err(e) => Err(BridgeError::Task(e.to_string())),
        };
        self.active = None;
        result
    }

    /// Negotiate → fetch canvas → open relay → spawn read loop.
    async fn open_session(
        &self,
        control: &Arc<dyn ControlClient>,
        token: &CancellationToken,
    ) -> Result<(RelayTransport, RelayInbound, Dispatcher), BridgeError> {
        let negotiated = self.negotiator.negotiate(&self.identity).await?;
        info!(
            "relay room ready for user {} (key {})",
            negotiated.user_id,
            negotiated.masked_key()
        );

        let canvas = control.get_video_canvas().await?;
        if !canvas.is_valid() {
            warn!(
                "control tool reported an unusable canvas {}x{}",
                canvas.base_width, canvas.base_height
            );
        }

        set_state(&self.state, SessionState::Connecting);
        let mut transport = RelayTransport::open(&negotiated.relay_address).await?;
        let inbound = transport.spawn_read_loop(token.clone())?;
        info!("connected to relay");

        let dispatcher = Dispatcher::new(Arc::clone(control), Arc::clone(&self.settings), canvas);
        Ok((transport, inbound, dispatcher))
    }
}

// ── Session task ──────────────────────────────────────────────────────────────

/// Why the dispatch loop ended.
enum Exit {
    Cancelled,
    PeerClosed(CloseNotice),
    Failed(BridgeError),
}

/// Everything one running session owns.  Moved into the session task.
struct Session {
    dispatcher: Dispatcher,
    control: Arc<dyn ControlClient>,
    transport: RelayTransport,
    inbound: RelayInbound,
    token: CancellationToken,
    timing: SessionTiming,
    state: Arc<watch::Sender<SessionState>>,
}

impl Session {
    async fn run(self) -> Result<(), BridgeError> {
        let Session {
            mut dispatcher,
            control,
            mut transport,
            inbound,
            token,
            timing,
            state,
        } = self;
        let RelayInbound {
            mut messages,
            mut closed,
        } = inbound;

        // Greeting.
        dispatcher.send_keepalive(&mut transport).await;

        // First tick one full interval from now, not immediately.
        let mut ticker = interval_at(Instant::now() + timing.ping_interval, timing.ping_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("bridge running");
        let exit = loop {
            tokio::select! {
                biased;

                _ = token.cancelled() => break Exit::Cancelled,

                notice = &mut closed => break match notice {
                    Ok(notice) => Exit::PeerClosed(notice),
                    // The read loop only drops the sender silently on cancellation.
                    Err(_) => Exit::Cancelled,
                },

                frame = messages.recv() => match frame {
                    Some(frame) => {
                        if let Err(e) = dispatcher.handle_frame(&mut transport, &frame).await {
                            break Exit::Failed(e.into());
                        }
                    }
                    None => break exit_after_reader(&mut closed),
                },

                _ = ticker.tick() => dispatcher.send_keepalive(&mut transport).await,
            }
        };

        let (outcome, transport_result) = match exit {
            Exit::Cancelled => {
                info!("session stopping");
                set_state(&state, SessionState::Stopping);
                (Ok(()), transport.graceful_close(timing.close_timeout).await)
            }
            Exit::PeerClosed(notice) => {
                warn!("relay {notice}; session ended");
                transport.release();
                (Ok(()), Ok(()))
            }
            Exit::Failed(e) => {
                error!("session failed: {e}");
                set_state(&state, SessionState::Stopping);
                token.cancel();
                (Err(e), transport.graceful_close(timing.close_timeout).await)
            }
        };

        // Release both connections even if one of them fails.
        let control_result = control.disconnect().await;
        if let Err(e) = &transport_result {
            warn!("relay shutdown error: {e}");
        }
        if let Err(e) = &control_result {
            warn!("control shutdown error: {e}");
        }

        set_state(&state, SessionState::Disconnected);
        info!("session ended");
        outcome
            .and(transport_result.map_err(BridgeError::from))
            .and(control_result.map_err(BridgeError::from))
    }
}

/// The inbound queue closed; the close notice, if any, was sent first.
fn exit_after_reader(closed: &mut oneshot::Receiver<CloseNotice>) -> Exit {
    match closed.try_recv() {
        Ok(notice) => Exit::PeerClosed(notice),
        Err(_) => Exit::Cancelled,
    }
}

async fn join_session(task: JoinHandle<Result<(), BridgeError>>) -> Result<(), BridgeError> {
    match task.await {
        Ok(result) => result,
        Err(e) => Err(BridgeError::Task(e.to_string())),
    }
}

async fn log_version(control: &dyn ControlClient) {
    match control.get_version_info().await {
        Ok(v) => info!(
            "control tool {} (websocket {}, rpc v{})",
            v.tool_version, v.adapter_version, v.rpc_version
        ),
        Err(e) => warn!("could not read control tool version: {e}"),
    }
}

fn set_state(state: &watch::Sender<SessionState>, next: SessionState) {
    let previous = state.send_replace(next);
    if previous != next {
        debug!("session state {previous} → {next}");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
