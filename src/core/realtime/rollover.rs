//! Rollover state machine.
//!
//! Keeps an interview alive across short-lived upstream credentials. One
//! task owns every piece of mutable session state (active transport,
//! candidate, timers) and is driven by a `select!` loop over commands,
//! transport events, candidate setup results and two deadlines:
//!
//! ```text
//! Idle -> Connecting -> Active <-> RollingOver
//!             |            |            |
//!             +------------+------------+--> Closed
//! ```
//!
//! A rollover is make-before-break: the candidate is opened next to the
//! active transport and only swapped in once it reports connected. If it
//! does not connect within the timeout it is discarded and the active
//! transport keeps serving the interview.
//!
//! Tool calls run on their own tasks so a slow lookup never holds up stop,
//! deadlines or promotion. A reply is delivered only to the transport that
//! asked for it.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};

use super::base::{
    AudioOutput, Connector, CredentialSource, InboundAudio, QuestionTool, RealtimeError,
    RealtimeResult, SessionState, TaggedEvent, Transport, TransportEvent, TransportId,
};
use super::messages::{ChannelMessage, ClientEvent};
use super::peer::PeerSessionManager;
use super::scheduler::{Deadline, RolloverConfig, now_ms};
use super::settings::InterviewSettings;
use super::tools::{FunctionCall, PendingCalls, ToolDispatcher};
use crate::core::session::SessionCredential;

const COMMAND_CHANNEL_CAPACITY: usize = 8;

// =============================================================================
// Public handle
// =============================================================================

/// Observable summary of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: SessionState,
    pub active_transport: Option<TransportId>,
    pub expires_at_ms: Option<i64>,
    pub completed_rollovers: u32,
    pub failed_rollovers: u32,
}

/// Collaborators of a session.
pub struct SessionServices {
    pub credentials: Arc<dyn CredentialSource>,
    pub questions: Arc<dyn QuestionTool>,
    pub connector: Arc<dyn Connector>,
    pub output: Arc<dyn AudioOutput>,
}

enum Command {
    Start(oneshot::Sender<RealtimeResult<()>>),
    Stop(oneshot::Sender<()>),
}

/// Handle to one interview session.
///
/// Dropping the handle stops the session.
pub struct InterviewSession {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<SessionStatus>,
    task: JoinHandle<()>,
}

impl InterviewSession {
    /// Spawn the session task. Nothing connects until [`Self::start`].
    pub fn spawn(
        settings: InterviewSettings,
        config: RolloverConfig,
        services: SessionServices,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (prepared_tx, prepared_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SessionStatus::default());

        let machine = RolloverMachine {
            config,
            settings,
            credentials: services.credentials,
            peers: Arc::new(PeerSessionManager::new(services.connector, events_tx)),
            output: services.output,
            dispatcher: Arc::new(ToolDispatcher::new(services.questions, settings.mode)),
            tool_calls: JoinSet::new(),
            status: status_tx,
            state: SessionState::Idle,
            active: None,
            pending: None,
            rollover_timer: Deadline::new(),
            connect_deadline: Deadline::new(),
            prepared_tx,
            completed_rollovers: 0,
            failed_rollovers: 0,
        };
        let task = tokio::spawn(machine.run(commands_rx, events_rx, prepared_rx));

        Self {
            commands: commands_tx,
            status: status_rx,
            task,
        }
    }

    /// Fetch a credential, open the first transport and arm the rollover.
    ///
    /// Fails with `InvalidState` unless the session is idle and with
    /// `SessionClosed` once it has been stopped. A failed start closes the
    /// session.
    pub async fn start(&self) -> RealtimeResult<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Start(reply_tx))
            .await
            .map_err(|_| RealtimeError::SessionClosed)?;
        reply_rx.await.map_err(|_| RealtimeError::SessionClosed)?
    }

    /// Close everything and move to `Closed`. Idempotent.
    pub async fn stop(&self) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.commands.send(Command::Stop(reply_tx)).await.is_ok() {
            let _ = reply_rx.await;
        }
    }

    pub fn state(&self) -> SessionState {
        self.status.borrow().state
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    pub fn active_transport(&self) -> Option<TransportId> {
        self.status.borrow().active_transport
    }

    /// Receiver that observes every status change.
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Whether the session task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

// =============================================================================
// State machine
// =============================================================================

struct ActiveTransport {
    transport: Arc<dyn Transport>,
    expires_at_ms: Option<i64>,
    channel_open: bool,
    /// Only the first transport of a session starts the conversation.
    initial: bool,
    kicked_off: bool,
    calls: PendingCalls,
}

impl ActiveTransport {
    fn new(transport: Arc<dyn Transport>, expires_at_ms: Option<i64>, initial: bool) -> Self {
        Self {
            transport,
            expires_at_ms,
            channel_open: false,
            initial,
            kicked_off: false,
            calls: PendingCalls::new(),
        }
    }

    fn id(&self) -> TransportId {
        self.transport.id()
    }
}

/// A rollover in progress. Events for `id` are stashed until promotion.
struct PendingRollover {
    id: TransportId,
    candidate: Option<(Arc<dyn Transport>, SessionCredential)>,
    channel_open: bool,
    audio: Option<Arc<dyn InboundAudio>>,
    connected: bool,
    failed: bool,
}

impl PendingRollover {
    fn new(id: TransportId) -> Self {
        Self {
            id,
            candidate: None,
            channel_open: false,
            audio: None,
            connected: false,
            failed: false,
        }
    }
}

struct PreparedCandidate {
    id: TransportId,
    result: RealtimeResult<(Arc<dyn Transport>, SessionCredential)>,
}

/// Reply events of one executed tool call.
struct ToolReply {
    transport: TransportId,
    call_id: String,
    events: Vec<ClientEvent>,
}

struct RolloverMachine {
    config: RolloverConfig,
    settings: InterviewSettings,
    credentials: Arc<dyn CredentialSource>,
    peers: Arc<PeerSessionManager>,
    output: Arc<dyn AudioOutput>,
    dispatcher: Arc<ToolDispatcher>,
    tool_calls: JoinSet<ToolReply>,
    status: watch::Sender<SessionStatus>,
    state: SessionState,
    active: Option<ActiveTransport>,
    pending: Option<PendingRollover>,
    rollover_timer: Deadline,
    connect_deadline: Deadline,
    prepared_tx: mpsc::UnboundedSender<PreparedCandidate>,
    completed_rollovers: u32,
    failed_rollovers: u32,
}

impl RolloverMachine {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut events: mpsc::UnboundedReceiver<TaggedEvent>,
        mut prepared: mpsc::UnboundedReceiver<PreparedCandidate>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Start(reply)) => {
                        let result = self.start().await;
                        let _ = reply.send(result);
                    }
                    Some(Command::Stop(reply)) => {
                        self.teardown().await;
                        let _ = reply.send(());
                    }
                    None => self.teardown().await,
                },
                Some(tagged) = events.recv() => self.on_transport_event(tagged).await,
                Some(ready) = prepared.recv() => self.on_candidate_ready(ready).await,
                Some(joined) = self.tool_calls.join_next() => self.on_tool_reply(joined).await,
                _ = self.rollover_timer.fired() => self.begin_rollover(),
                _ = self.connect_deadline.fired() => {
                    self.fail_rollover("candidate did not connect in time").await;
                }
            }

            if self.state == SessionState::Closed {
                break;
            }
        }

        // Candidates that finished setting up after teardown.
        prepared.close();
        while let Ok(ready) = prepared.try_recv() {
            if let Ok((transport, _)) = ready.result {
                transport.close().await;
            }
        }
        tracing::debug!("Interview session task exited");
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            tracing::debug!("Session state: {} -> {}", self.state, state);
        }
        self.state = state;
        self.publish();
    }

    fn publish(&self) {
        let status = SessionStatus {
            state: self.state,
            active_transport: self.active.as_ref().map(ActiveTransport::id),
            expires_at_ms: self.active.as_ref().and_then(|a| a.expires_at_ms),
            completed_rollovers: self.completed_rollovers,
            failed_rollovers: self.failed_rollovers,
        };
        self.status.send_replace(status);
    }

    // -------------------------------------------------------------------------
    // Start / stop
    // -------------------------------------------------------------------------

    async fn start(&mut self) -> RealtimeResult<()> {
        match self.state {
            SessionState::Idle => {}
            SessionState::Closed => return Err(RealtimeError::SessionClosed),
            other => {
                return Err(RealtimeError::InvalidState(format!(
                    "cannot start while {other}"
                )));
            }
        }

        self.set_state(SessionState::Connecting);
        match self.connect_first().await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::error!("Interview start failed: {}", e);
                self.teardown().await;
                Err(e)
            }
        }
    }

    async fn connect_first(&mut self) -> RealtimeResult<()> {
        let credential = self.credentials.fetch_credential().await?;
        let id = self.peers.allocate_id();
        let transport = self.peers.open(id, &credential).await?;

        self.active = Some(ActiveTransport::new(
            transport,
            credential.expires_at_ms,
            true,
        ));
        self.set_state(SessionState::Active);
        tracing::info!(
            "Interview connected: language={}, mode={}",
            self.settings.language,
            self.settings.mode
        );
        self.schedule_rollover(credential.expires_at_ms);
        Ok(())
    }

    async fn teardown(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.rollover_timer.cancel();
        self.connect_deadline.cancel();
        self.tool_calls.abort_all();

        if let Some(pending) = self.pending.take()
            && let Some((candidate, _)) = pending.candidate
        {
            self.peers.close(&candidate).await;
        }
        if let Some(active) = self.active.take() {
            self.peers.close(&active.transport).await;
        }
        self.output.detach();
        self.peers.shutdown().await;

        self.set_state(SessionState::Closed);
        tracing::info!("Interview session closed");
    }

    // -------------------------------------------------------------------------
    // Rollover
    // -------------------------------------------------------------------------

    /// Arm the single rollover trigger, replacing any stale one.
    fn schedule_rollover(&mut self, expires_at_ms: Option<i64>) {
        let delay = self.config.delay_until_rollover(expires_at_ms, now_ms());
        self.rollover_timer.arm(delay);
        tracing::info!("Rollover scheduled in {}s", delay.as_secs());
    }

    fn begin_rollover(&mut self) {
        if self.state != SessionState::Active || self.active.is_none() {
            return;
        }
        let id = self.peers.allocate_id();
        tracing::info!("Starting session rollover (candidate {})", id);
        self.pending = Some(PendingRollover::new(id));
        self.set_state(SessionState::RollingOver);

        let credentials = self.credentials.clone();
        let peers = self.peers.clone();
        let prepared_tx = self.prepared_tx.clone();
        tokio::spawn(async move {
            let result = async {
                let credential = credentials.fetch_credential().await?;
                let transport = peers.open(id, &credential).await?;
                Ok::<_, RealtimeError>((transport, credential))
            }
            .await;

            // The session is gone; nobody will promote or close this one.
            if let Err(mpsc::error::SendError(ready)) =
                prepared_tx.send(PreparedCandidate { id, result })
                && let Ok((transport, _)) = ready.result
            {
                transport.close().await;
            }
        });
    }

    async fn on_candidate_ready(&mut self, ready: PreparedCandidate) {
        let Some(pending) = self.pending.as_mut().filter(|p| p.id == ready.id) else {
            if let Ok((transport, _)) = ready.result {
                tracing::debug!("Discarding stale candidate {}", ready.id);
                self.peers.close(&transport).await;
            }
            return;
        };

        match ready.result {
            Err(e) => {
                self.fail_rollover(&format!("candidate setup failed: {e}"))
                    .await;
            }
            Ok(candidate) => {
                pending.candidate = Some(candidate);
                let (connected, failed) = (pending.connected, pending.failed);
                if connected {
                    self.promote().await;
                } else if failed {
                    self.fail_rollover("candidate connection failed").await;
                } else {
                    self.connect_deadline.arm(self.config.connect_timeout);
                }
            }
        }
    }

    /// Swap the candidate in and retire the previous transport.
    async fn promote(&mut self) {
        self.connect_deadline.cancel();
        let Some(pending) = self.pending.take() else {
            return;
        };
        let Some((transport, credential)) = pending.candidate else {
            self.pending = Some(pending);
            return;
        };

        let mut next = ActiveTransport::new(transport, credential.expires_at_ms, false);
        next.channel_open = pending.channel_open;
        if next.channel_open {
            tracing::info!("Control channel reattached after promote");
        }
        let previous = self.active.replace(next);

        if let Some(audio) = pending.audio {
            self.output.attach(audio);
        }
        if let Some(previous) = previous {
            self.peers.close(&previous.transport).await;
        }

        self.completed_rollovers += 1;
        self.set_state(SessionState::Active);
        tracing::info!("Session rollover completed");
        self.schedule_rollover(credential.expires_at_ms);
    }

    /// Discard the candidate and keep serving from the active transport.
    async fn fail_rollover(&mut self, reason: &str) {
        self.connect_deadline.cancel();
        if let Some(pending) = self.pending.take()
            && let Some((candidate, _)) = pending.candidate
        {
            self.peers.close(&candidate).await;
        }

        self.failed_rollovers += 1;
        tracing::warn!("Rollover failed ({}); staying on current session", reason);
        self.set_state(SessionState::Active);
        self.schedule_rollover(None);
    }

    // -------------------------------------------------------------------------
    // Transport events
    // -------------------------------------------------------------------------

    async fn on_transport_event(&mut self, tagged: TaggedEvent) {
        let TaggedEvent { transport, event } = tagged;

        if self.active.as_ref().is_some_and(|a| a.id() == transport) {
            self.on_active_event(event).await;
        } else if self.pending.as_ref().is_some_and(|p| p.id == transport) {
            self.on_candidate_event(transport, event).await;
        } else {
            tracing::trace!("Ignoring event from retired transport {}", transport);
        }
    }

    async fn on_active_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::ChannelOpen => {
                let Some(active) = self.active.as_mut() else {
                    return;
                };
                active.channel_open = true;
                tracing::info!("Control channel open (transport {})", active.id());
                if active.initial && !active.kicked_off {
                    active.kicked_off = true;
                    let kickoff = [
                        ClientEvent::user_text(self.settings.kickoff_prompt()),
                        ClientEvent::ResponseCreate,
                    ];
                    self.send_active(&kickoff).await;
                }
            }
            TransportEvent::ChannelMessage(text) => self.on_channel_message(&text).await,
            TransportEvent::ChannelClosed => {
                if let Some(active) = self.active.as_mut() {
                    active.channel_open = false;
                    tracing::info!("Control channel closed (transport {})", active.id());
                }
            }
            TransportEvent::RemoteAudio(audio) => {
                tracing::debug!("Binding output to remote track {}", audio.id());
                self.output.attach(audio);
            }
            TransportEvent::StateChanged { kind, state } => {
                tracing::debug!("{}: {}", kind, state);
            }
        }
    }

    async fn on_candidate_event(&mut self, id: TransportId, event: TransportEvent) {
        let connected = event.is_connected();
        let failed = event.is_failed();
        let Some(pending) = self.pending.as_mut() else {
            return;
        };

        match event {
            TransportEvent::ChannelOpen => {
                pending.channel_open = true;
                tracing::info!("Secondary control channel open ({}), pending promote", id);
            }
            TransportEvent::ChannelClosed => pending.channel_open = false,
            TransportEvent::RemoteAudio(audio) => pending.audio = Some(audio),
            TransportEvent::ChannelMessage(_) => {
                tracing::trace!("Ignoring message from unpromoted candidate {}", id);
            }
            TransportEvent::StateChanged { kind, state } => {
                tracing::debug!("candidate {} {}: {}", id, kind, state);
            }
        }

        if connected && !pending.connected {
            pending.connected = true;
            if pending.candidate.is_some() {
                self.promote().await;
            }
        } else if failed && !pending.failed {
            pending.failed = true;
            if pending.candidate.is_some() {
                self.fail_rollover("candidate connection failed").await;
            }
        }
    }

    async fn on_channel_message(&mut self, text: &str) {
        let (message, kind) = match ChannelMessage::parse(text) {
            Ok(parsed) => parsed,
            Err(_) => {
                tracing::debug!("evt non-json: {}", text);
                return;
            }
        };
        if let Some(kind) = kind.as_deref() {
            tracing::trace!("evt: {}", kind);
        }

        let Some(active) = self.active.as_mut() else {
            return;
        };
        let Some(call) = active.calls.observe(message) else {
            return;
        };
        let transport = active.id();
        self.dispatch(transport, call);
    }

    fn dispatch(&mut self, transport: TransportId, call: FunctionCall) {
        tracing::debug!("Dispatching tool call {} ({})", call.call_id, call.name);
        let dispatcher = self.dispatcher.clone();
        self.tool_calls.spawn(async move {
            let events = dispatcher.execute(&call).await;
            ToolReply {
                transport,
                call_id: call.call_id,
                events,
            }
        });
    }

    async fn on_tool_reply(&mut self, joined: Result<ToolReply, JoinError>) {
        let reply = match joined {
            Ok(reply) => reply,
            Err(e) => {
                if !e.is_cancelled() {
                    tracing::error!("Tool call task failed: {}", e);
                }
                return;
            }
        };
        if self.active.as_ref().is_none_or(|a| a.id() != reply.transport) {
            tracing::info!(
                "Dropping reply to call {}: transport {} is no longer active",
                reply.call_id,
                reply.transport
            );
            return;
        }
        self.send_active(&reply.events).await;
    }

    /// Send over the active control channel; dropped when it is not open.
    async fn send_active(&self, events: &[ClientEvent]) {
        let Some(active) = self.active.as_ref() else {
            return;
        };
        if !active.channel_open {
            tracing::warn!("Control channel not open; dropping {} event(s)", events.len());
            return;
        }
        for event in events {
            if let Err(e) = active.transport.send(event).await {
                tracing::warn!("Failed to send on control channel: {}", e);
                return;
            }
        }
    }
}
