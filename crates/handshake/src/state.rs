use std::time::{Duration, Instant};

use crate::error::{HandshakeError, Result};

/// A non-terminal handshake that has not reached a terminal state within
/// this long reads as [`HandshakeState::TimedOut`] on query (`spec.md`
/// §4.5).
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// States of the 4-message IPv8-style handshake (`spec.md` §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    None,
    IntroRequestSent,
    IntroResponseReceived,
    PunctureRequestSent,
    PunctureReceived,
    TimedOut,
    Failed,
}

impl HandshakeState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            HandshakeState::PunctureReceived | HandshakeState::TimedOut | HandshakeState::Failed
        )
    }
}

/// Tracks one peer's handshake progress and the wall-clock it started at,
/// so a stale non-terminal state can be read back as `TimedOut` without a
/// separate timer task per handshake.
pub struct Handshake {
    identifier: u16,
    state: HandshakeState,
    started_at: Instant,
}

impl Handshake {
    pub fn new(identifier: u16) -> Self {
        Handshake {
            identifier,
            state: HandshakeState::None,
            started_at: Instant::now(),
        }
    }

    pub fn identifier(&self) -> u16 {
        self.identifier
    }

    /// Current state, collapsing a stale non-terminal state to `TimedOut`.
    pub fn state(&self) -> HandshakeState {
        if !self.state.is_terminal() && self.started_at.elapsed() > HANDSHAKE_TIMEOUT {
            HandshakeState::TimedOut
        } else {
            self.state
        }
    }

    fn transition(&mut self, next: HandshakeState) -> Result<()> {
        if self.state().is_terminal() {
            return Err(HandshakeError::AlreadyTerminal);
        }
        self.state = next;
        Ok(())
    }

    pub fn mark_intro_request_sent(&mut self) -> Result<()> {
        self.transition(HandshakeState::IntroRequestSent)
    }

    pub fn mark_intro_response_received(&mut self) -> Result<()> {
        self.transition(HandshakeState::IntroResponseReceived)
    }

    pub fn mark_puncture_request_sent(&mut self) -> Result<()> {
        self.transition(HandshakeState::PunctureRequestSent)
    }

    pub fn mark_puncture_received(&mut self) -> Result<()> {
        self.transition(HandshakeState::PunctureReceived)
    }

    pub fn mark_failed(&mut self) {
        // Failure is always recordable, even over a timed-out handshake,
        // so callers don't need to special-case the read-only timeout path.
        self.state = HandshakeState::Failed;
    }

    pub fn is_handshake_complete(&self) -> bool {
        matches!(
            self.state(),
            HandshakeState::IntroResponseReceived | HandshakeState::PunctureReceived
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_handshake_starts_at_none() {
        let hs = Handshake::new(42);
        assert_eq!(hs.state(), HandshakeState::None);
        assert!(!hs.is_handshake_complete());
    }

    #[test]
    fn intro_response_marks_handshake_complete() {
        let mut hs = Handshake::new(1);
        hs.mark_intro_request_sent().unwrap();
        hs.mark_intro_response_received().unwrap();
        assert!(hs.is_handshake_complete());
    }

    #[test]
    fn full_puncture_sequence_reaches_terminal_state() {
        let mut hs = Handshake::new(1);
        hs.mark_intro_request_sent().unwrap();
        hs.mark_intro_response_received().unwrap();
        hs.mark_puncture_request_sent().unwrap();
        hs.mark_puncture_received().unwrap();
        assert_eq!(hs.state(), HandshakeState::PunctureReceived);
        assert!(hs.state().is_terminal());
    }

    #[test]
    fn transition_after_terminal_state_fails() {
        let mut hs = Handshake::new(1);
        hs.mark_failed();
        let err = hs.mark_intro_request_sent().unwrap_err();
        assert!(matches!(err, HandshakeError::AlreadyTerminal));
    }

    #[test]
    fn stale_non_terminal_state_reads_as_timed_out() {
        let mut hs = Handshake::new(1);
        hs.mark_intro_request_sent().unwrap();
        hs.started_at = Instant::now() - Duration::from_secs(11);
        assert_eq!(hs.state(), HandshakeState::TimedOut);
    }

    #[test]
    fn mark_failed_overrides_any_state() {
        let mut hs = Handshake::new(1);
        hs.mark_intro_request_sent().unwrap();
        hs.mark_failed();
        assert_eq!(hs.state(), HandshakeState::Failed);
    }
}
