//! Outer reconnect loop.
//!
//! Runs one [`GatewaySession`] at a time, classifies how it ended and
//! either reconnects (resume or fresh, optionally after a delay) or stops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use snek_core::{close_code, Intents, Presence};
use snek_transport::GatewayConnector;

use crate::dispatch::Dispatcher;
use crate::error::{Result, SnekError};
use crate::event::{names, Event};
use crate::ready::ReadinessGate;

use super::classify::{classify, NextStep, ReconnectMode};
use super::session::{GatewaySession, ResumeState, SessionHandle, SessionInfo, SessionParams};
use super::GatewayError;

// ============================================================================
// Runner State
// ============================================================================

/// Lifecycle state shared between the reconnect loop and the client.
#[derive(Default)]
pub struct RunnerState {
    closed: AtomicBool,
    session: RwLock<Option<SessionHandle>>,
    presence: RwLock<Presence>,
    last: RwLock<SessionInfo>,
}

impl RunnerState {
    pub fn new(presence: Presence) -> Self {
        Self {
            presence: RwLock::new(presence),
            ..Self::default()
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Sets the closed flag; the loop exits before its next attempt.
    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Handle of the active session, if connected.
    pub async fn session(&self) -> Option<SessionHandle> {
        self.session.read().await.clone()
    }

    /// Presence sent with the next IDENTIFY.
    pub async fn presence(&self) -> Presence {
        self.presence.read().await.clone()
    }

    pub async fn set_presence(&self, presence: Presence) {
        *self.presence.write().await = presence;
    }

    /// Session id, sequence and latency, live while connected and kept
    /// after the connection ends.
    pub async fn session_info(&self) -> SessionInfo {
        match self.session().await {
            Some(handle) => handle.info(),
            None => self.last.read().await.clone(),
        }
    }

    async fn attach(&self, handle: SessionHandle) {
        *self.session.write().await = Some(handle);
    }

    async fn detach(&self, info: SessionInfo) {
        *self.session.write().await = None;
        *self.last.write().await = info;
    }
}

// ============================================================================
// Reconnect Loop
// ============================================================================

pub struct ReconnectLoop {
    connector: Arc<dyn GatewayConnector>,
    dispatcher: Dispatcher,
    gate: Arc<ReadinessGate>,
    state: Arc<RunnerState>,
    token: String,
    intents: Intents,
    retry_delay: Duration,
    cancel: CancellationToken,
}

impl ReconnectLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        connector: Arc<dyn GatewayConnector>,
        dispatcher: Dispatcher,
        gate: Arc<ReadinessGate>,
        state: Arc<RunnerState>,
        token: impl Into<String>,
        intents: Intents,
        retry_delay: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            connector,
            dispatcher,
            gate,
            state,
            token: token.into(),
            intents,
            retry_delay,
            cancel,
        }
    }

    /// Keeps the gateway connected until stopped.
    ///
    /// # Errors
    ///
    /// Only fatal close codes end the loop with an error. Every other
    /// failure is classified and retried.
    pub async fn run(&self) -> Result<()> {
        let mut resume: Option<ResumeState> = None;
        let mut attempt = 0u32;

        loop {
            if self.state.is_closed() || self.cancel.is_cancelled() {
                info!("Gateway loop stopped");
                return Ok(());
            }
            attempt = attempt.saturating_add(1);

            let params = SessionParams {
                token: self.token.clone(),
                intents: self.intents,
                resume: resume.take(),
                presence: self.state.presence().await,
            };
            debug!(attempt, resume = params.resume.is_some(), "Connecting to gateway");

            let connected = tokio::select! {
                connected = GatewaySession::connect(self.connector.as_ref(), &params, self.dispatcher.clone()) => connected,
                _ = self.cancel.cancelled() => {
                    info!("Gateway connect cancelled");
                    return Ok(());
                }
            };

            let (outcome, info) = match connected {
                Ok((session, handle)) => self.drive(session, handle).await,
                Err(err) => (Err(err), SessionInfo::default()),
            };

            let plan = classify(&outcome, self.gate.is_ready(), self.retry_delay);
            log_outcome(&outcome);

            if plan.dispatch_disconnect {
                self.dispatcher.dispatch(Event::empty(names::DISCONNECT));
            }

            match plan.next {
                NextStep::Terminate => {
                    info!("Gateway session terminated");
                    return Ok(());
                }
                NextStep::Fatal(code) => {
                    error!(code, "Gateway closed with a fatal code");
                    self.state.mark_closed();
                    return Err(SnekError::from_close_code(code));
                }
                NextStep::Reconnect(ReconnectMode::Resume) => {
                    resume = info.resume_state().or(params.resume);
                }
                NextStep::Reconnect(ReconnectMode::Fresh) => {
                    if let (Err(GatewayError::Unexpected(_) | GatewayError::Protocol(_)), Some(previous)) =
                        (&outcome, info.resume_state())
                    {
                        warn!(
                            session_id = %previous.session_id,
                            "Discarding resumable session after an unexpected failure"
                        );
                    }
                    resume = None;
                }
            }

            if !plan.delay.is_zero() {
                debug!(delay_ms = plan.delay.as_millis() as u64, "Waiting before reconnecting");
                tokio::select! {
                    _ = sleep(plan.delay) => {}
                    _ = self.cancel.cancelled() => {
                        info!("Gateway reconnect cancelled");
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn drive(
        &self,
        session: GatewaySession,
        handle: SessionHandle,
    ) -> (std::result::Result<(), GatewayError>, SessionInfo) {
        self.state.attach(handle.clone()).await;
        if self.state.is_closed() {
            handle.close(close_code::GOING_AWAY);
        }

        let outcome = session.run().await;

        let info = handle.info();
        self.state.detach(info.clone()).await;
        (outcome, info)
    }
}

fn log_outcome(outcome: &std::result::Result<(), GatewayError>) {
    match outcome {
        Ok(()) => debug!("Gateway session closed by client"),
        Err(GatewayError::Restart { resume }) => debug!(resume, "Gateway session restarting"),
        Err(GatewayError::Closed { code }) => info!(code, "Gateway connection closed"),
        Err(GatewayError::Transport(err)) if err.is_reset() => {
            warn!(error = %err, "Gateway connection reset")
        }
        Err(err) => error!(error = %err, "Gateway connection failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::GlobalCache;
    use crate::dispatch::spawn_dispatcher;
    use crate::hooks::DefaultHooks;
    use snek_core::{Application, Snowflake, User};
    use snek_protocol::OpCode;
    use snek_transport::{MemoryHttp, ScriptStep, ScriptedGateway, TransportError};

    struct Fixture {
        gateway: ScriptedGateway,
        gate: Arc<ReadinessGate>,
        state: Arc<RunnerState>,
        runner: ReconnectLoop,
    }

    fn fixture(gateway: ScriptedGateway) -> Fixture {
        let user = User::new(1u64, "bot").as_bot();
        let http = MemoryHttp::new(
            user,
            Application {
                id: Snowflake::new(1),
                name: "bot".to_string(),
                owner: None,
            },
        );
        let cache = Arc::new(GlobalCache::new(Arc::new(http)));
        let gate = Arc::new(ReadinessGate::new(cache, Duration::from_secs(3)));
        let state = Arc::new(RunnerState::default());
        let cancel = CancellationToken::new();
        let dispatcher = spawn_dispatcher(Arc::new(DefaultHooks), cancel.clone());
        let runner = ReconnectLoop::new(
            Arc::new(gateway.clone()),
            dispatcher,
            Arc::clone(&gate),
            Arc::clone(&state),
            "token",
            Intents::DEFAULT,
            Duration::from_secs(5),
            cancel,
        );
        Fixture {
            gateway,
            gate,
            state,
            runner,
        }
    }

    fn hello() -> ScriptStep {
        ScriptStep::hello(Duration::from_secs(40))
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_close_before_ready_terminates() {
        let f = fixture(ScriptedGateway::new().with_connection(vec![hello(), ScriptStep::Close(1000)]));

        assert!(f.runner.run().await.is_ok());
        assert_eq!(f.gateway.attempts().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_close_marks_closed() {
        let f = fixture(ScriptedGateway::new().with_connection(vec![hello(), ScriptStep::Close(4014)]));

        let err = f.runner.run().await.unwrap_err();
        assert!(matches!(err, SnekError::DisallowedIntents));
        assert!(f.state.is_closed());
        assert_eq!(f.gateway.attempts().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generic_failure_waits_then_identifies() {
        let user = User::new(1u64, "bot").as_bot();
        let f = fixture(
            ScriptedGateway::new()
                .with_connection(vec![
                    hello(),
                    ScriptStep::ready(1, "abc", &user, &[]),
                    ScriptStep::Fail(TransportError::Timeout),
                ])
                .with_connection(vec![hello(), ScriptStep::Close(1000)]),
        );

        assert!(f.runner.run().await.is_ok());
        let attempts = f.gateway.attempts();
        assert_eq!(attempts.len(), 2);
        assert!(attempts[1] - attempts[0] >= Duration::from_secs(5));
        assert_eq!(f.gateway.sent(1)[0].opcode(), OpCode::Identify);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_resumes_with_session() {
        let user = User::new(1u64, "bot").as_bot();
        let f = fixture(
            ScriptedGateway::new()
                .with_connection(vec![
                    hello(),
                    ScriptStep::ready(4, "abc", &user, &[]),
                    ScriptStep::Fail(TransportError::ConnectionReset("peer".into())),
                ])
                .with_connection(vec![hello(), ScriptStep::Close(4011)]),
        );
        f.gate.mark_ready();

        assert!(matches!(f.runner.run().await, Err(SnekError::ShardingRequired)));
        let resume = &f.gateway.sent(1)[0];
        assert_eq!(resume.opcode(), OpCode::Resume);
        assert_eq!(resume.d["session_id"], "abc");
        assert_eq!(resume.d["seq"], 4);
        assert_eq!(f.state.session_info().await.session_id.as_deref(), Some("abc"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_while_connected_ends_loop() {
        let f = fixture(ScriptedGateway::new().with_connection(vec![hello(), ScriptStep::Pending]));
        let state = Arc::clone(&f.state);
        let gateway = f.gateway.clone();

        let run = tokio::spawn(async move { f.runner.run().await });
        while state.session().await.is_none() {
            tokio::task::yield_now().await;
        }
        state.mark_closed();
        state.session().await.unwrap().close(close_code::GOING_AWAY);

        assert!(run.await.unwrap().is_ok());
        assert_eq!(gateway.closed_with(0), Some(1001));
    }
}
