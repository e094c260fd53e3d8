use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// Lifecycle of a live session.
///
/// `Accepted -> Streaming -> Draining -> Closed`, with `Errored` as an
/// absorbing state that only leads to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Accepted,
    Streaming,
    Draining,
    Errored,
    Closed,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Accepted, Streaming)
                | (Accepted, Errored)
                | (Streaming, Draining)
                | (Streaming, Errored)
                | (Draining, Closed)
                | (Draining, Errored)
                | (Errored, Closed)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == SessionState::Closed
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Accepted => "accepted",
            SessionState::Streaming => "streaming",
            SessionState::Draining => "draining",
            SessionState::Errored => "errored",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Current state plus every state visited, in order
#[derive(Debug, Clone)]
pub struct StateMachine {
    current: SessionState,
    history: Vec<SessionState>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self {
            current: SessionState::Accepted,
            history: vec![SessionState::Accepted],
        }
    }
}

impl StateMachine {
    pub fn current(&self) -> SessionState {
        self.current
    }

    pub fn history(&self) -> &[SessionState] {
        &self.history
    }

    pub fn has_errored(&self) -> bool {
        self.history.contains(&SessionState::Errored)
    }

    /// Move to `next` if the transition is legal. Returns whether it moved.
    pub fn advance(&mut self, next: SessionState) -> bool {
        if self.current == next {
            return false;
        }
        if !self.current.can_transition_to(next) {
            warn!("Ignoring illegal session transition {} -> {}", self.current, next);
            return false;
        }
        debug!("Session state {} -> {}", self.current, next);
        self.current = next;
        self.history.push(next);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut machine = StateMachine::default();
        assert!(machine.advance(SessionState::Streaming));
        assert!(machine.advance(SessionState::Draining));
        assert!(machine.advance(SessionState::Closed));

        assert_eq!(
            machine.history(),
            &[
                SessionState::Accepted,
                SessionState::Streaming,
                SessionState::Draining,
                SessionState::Closed
            ]
        );
        assert!(!machine.has_errored());
    }

    #[test]
    fn test_errored_is_absorbing() {
        let mut machine = StateMachine::default();
        machine.advance(SessionState::Streaming);
        assert!(machine.advance(SessionState::Errored));

        assert!(!machine.advance(SessionState::Draining));
        assert!(!machine.advance(SessionState::Streaming));
        assert_eq!(machine.current(), SessionState::Errored);

        assert!(machine.advance(SessionState::Closed));
        assert!(machine.has_errored());
    }

    #[test]
    fn test_closed_is_terminal() {
        for next in [
            SessionState::Accepted,
            SessionState::Streaming,
            SessionState::Draining,
            SessionState::Errored,
        ] {
            assert!(!SessionState::Closed.can_transition_to(next));
        }
        assert!(SessionState::Closed.is_terminal());
    }

    #[test]
    fn test_repeated_transition_is_noop() {
        let mut machine = StateMachine::default();
        machine.advance(SessionState::Streaming);
        assert!(!machine.advance(SessionState::Streaming));
        assert_eq!(machine.history().len(), 2);
    }
}
