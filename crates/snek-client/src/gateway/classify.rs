//! Failure classification for the reconnect loop.

use std::time::Duration;

use snek_core::close_code;

use super::GatewayError;

/// Handshake to use for the next connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectMode {
    /// RESUME with the previous session id and sequence.
    Resume,
    /// IDENTIFY a new session.
    Fresh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    Reconnect(ReconnectMode),
    /// Stop without error.
    Terminate,
    /// Stop with the fatal close code.
    Fatal(u16),
}

/// What the loop does after a connection ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPlan {
    pub dispatch_disconnect: bool,
    pub next: NextStep,
    /// Wait before the next attempt.
    pub delay: Duration,
}

impl ReconnectPlan {
    const fn new(dispatch_disconnect: bool, next: NextStep, delay: Duration) -> Self {
        Self {
            dispatch_disconnect,
            next,
            delay,
        }
    }

    const fn immediate(next: NextStep) -> Self {
        Self::new(true, next, Duration::ZERO)
    }
}

/// Classifies how a connection ended.
///
/// `ready` is whether the client reached readiness at least once; it only
/// matters for a normal (1000) close. `retry_delay` is applied to the
/// fresh-reconnect rows that follow a network or unexpected failure.
pub fn classify(outcome: &Result<(), GatewayError>, ready: bool, retry_delay: Duration) -> ReconnectPlan {
    let Err(err) = outcome else {
        return ReconnectPlan::new(false, NextStep::Terminate, Duration::ZERO);
    };

    match err {
        GatewayError::Restart { resume: true } => {
            ReconnectPlan::immediate(NextStep::Reconnect(ReconnectMode::Resume))
        }
        GatewayError::Restart { resume: false } => {
            ReconnectPlan::immediate(NextStep::Reconnect(ReconnectMode::Fresh))
        }
        GatewayError::Closed {
            code: close_code::NORMAL,
        } if ready => ReconnectPlan::immediate(NextStep::Reconnect(ReconnectMode::Resume)),
        GatewayError::Closed {
            code: close_code::NORMAL,
        } => ReconnectPlan::immediate(NextStep::Terminate),
        GatewayError::Closed { code } => ReconnectPlan::immediate(NextStep::Fatal(*code)),
        GatewayError::Transport(err) if err.is_reset() => {
            ReconnectPlan::immediate(NextStep::Reconnect(ReconnectMode::Resume))
        }
        GatewayError::Transport(_) | GatewayError::Protocol(_) | GatewayError::Unexpected(_) => {
            ReconnectPlan::new(true, NextStep::Reconnect(ReconnectMode::Fresh), retry_delay)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use snek_transport::TransportError;

    const DELAY: Duration = Duration::from_secs(5);

    fn closed(code: u16) -> Result<(), GatewayError> {
        Err(GatewayError::Closed { code })
    }

    #[test]
    fn test_stopped_session_terminates_quietly() {
        let plan = classify(&Ok(()), true, DELAY);
        assert!(!plan.dispatch_disconnect);
        assert_eq!(plan.next, NextStep::Terminate);
    }

    #[test]
    fn test_restart_rows() {
        for (resume, mode) in [(true, ReconnectMode::Resume), (false, ReconnectMode::Fresh)] {
            for ready in [true, false] {
                let plan = classify(&Err(GatewayError::Restart { resume }), ready, DELAY);
                assert_eq!(plan, ReconnectPlan::immediate(NextStep::Reconnect(mode)));
            }
        }
    }

    #[test]
    fn test_transport_rows() {
        let reset = Err(GatewayError::Transport(TransportError::ConnectionReset("peer".into())));
        assert_eq!(
            classify(&reset, false, DELAY),
            ReconnectPlan::immediate(NextStep::Reconnect(ReconnectMode::Resume))
        );

        for err in [
            TransportError::Timeout,
            TransportError::GatewayNotFound("gone".into()),
            TransportError::Io(std::io::Error::other("boom")),
        ] {
            let plan = classify(&Err(GatewayError::Transport(err)), true, DELAY);
            assert_eq!(
                plan,
                ReconnectPlan::new(true, NextStep::Reconnect(ReconnectMode::Fresh), DELAY)
            );
        }
    }

    #[test]
    fn test_unexpected_failure_resets_to_fresh() {
        let plan = classify(&Err(GatewayError::Unexpected("bad frame".into())), true, DELAY);
        assert_eq!(
            plan,
            ReconnectPlan::new(true, NextStep::Reconnect(ReconnectMode::Fresh), DELAY)
        );
    }

    proptest! {
        #[test]
        fn prop_close_codes_match_table(code in 1000u16..=4999, ready in any::<bool>()) {
            let plan = classify(&closed(code), ready, DELAY);

            prop_assert!(plan.dispatch_disconnect);
            prop_assert_eq!(plan.delay, Duration::ZERO);
            let expected = match (code, ready) {
                (1000, true) => NextStep::Reconnect(ReconnectMode::Resume),
                (1000, false) => NextStep::Terminate,
                (code, _) => NextStep::Fatal(code),
            };
            prop_assert_eq!(plan.next, expected);
        }

        #[test]
        fn prop_retry_delay_only_on_fresh_failures(secs in 0u64..60, ready in any::<bool>()) {
            let delay = Duration::from_secs(secs);
            let plan = classify(&Err(GatewayError::Unexpected(String::new())), ready, delay);
            prop_assert_eq!(plan.delay, delay);

            let plan = classify(&Err(GatewayError::Restart { resume: false }), ready, delay);
            prop_assert_eq!(plan.delay, Duration::ZERO);
        }
    }
}
