//! Shell startup state machine
//!
//! States only move forward, one step at a time, and each is entered once.
//! `ShuttingDown` is the exception: it can be entered from any earlier state
//! so an interrupt during startup still shuts down cleanly.

use std::fmt;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ShellState {
    #[default]
    Init,
    LayoutBuilt,
    PluginsRegistered,
    PluginsBooted,
    ChannelsReady,
    Running,
    ShuttingDown,
    Stopped,
}

impl ShellState {
    pub fn next(self) -> Option<ShellState> {
        use ShellState::*;
        match self {
            Init => Some(LayoutBuilt),
            LayoutBuilt => Some(PluginsRegistered),
            PluginsRegistered => Some(PluginsBooted),
            PluginsBooted => Some(ChannelsReady),
            ChannelsReady => Some(Running),
            Running => Some(ShuttingDown),
            ShuttingDown => Some(Stopped),
            Stopped => None,
        }
    }
}

impl fmt::Display for ShellState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("cannot go from {from} to {to}")]
    InvalidTransition { from: ShellState, to: ShellState },
}

#[derive(Debug, Clone)]
pub struct StateMachine {
    current: ShellState,
    entered: Vec<(ShellState, Instant)>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            current: ShellState::Init,
            entered: vec![(ShellState::Init, Instant::now())],
        }
    }

    pub fn current(&self) -> ShellState {
        self.current
    }

    /// Whether `state` has been reached (or passed).
    pub fn reached(&self, state: ShellState) -> bool {
        self.current >= state
    }

    pub fn advance(&mut self, to: ShellState) -> Result<(), StateError> {
        let allowed = self.current.next() == Some(to)
            || (to == ShellState::ShuttingDown && self.current < ShellState::ShuttingDown);
        if !allowed {
            return Err(StateError::InvalidTransition {
                from: self.current,
                to,
            });
        }

        tracing::debug!("Shell state {} -> {}", self.current, to);
        self.current = to;
        self.entered.push((to, Instant::now()));
        Ok(())
    }

    /// Time spent in each state that has been left, in order.
    pub fn timings(&self) -> Vec<(ShellState, Duration)> {
        self.entered
            .windows(2)
            .map(|pair| (pair[0].0, pair[1].1.duration_since(pair[0].1)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_only() {
        let mut sm = StateMachine::new();
        sm.advance(ShellState::LayoutBuilt).unwrap();
        assert!(sm.advance(ShellState::LayoutBuilt).is_err());
        assert!(sm.advance(ShellState::Init).is_err());
        assert_eq!(
            sm.advance(ShellState::Running),
            Err(StateError::InvalidTransition {
                from: ShellState::LayoutBuilt,
                to: ShellState::Running
            })
        );
        assert_eq!(sm.current(), ShellState::LayoutBuilt);
    }

    #[test]
    fn test_full_sequence() {
        let mut sm = StateMachine::new();
        let mut state = ShellState::Init;
        while let Some(next) = state.next() {
            sm.advance(next).unwrap();
            state = next;
        }
        assert_eq!(sm.current(), ShellState::Stopped);
        assert_eq!(sm.timings().len(), 7);
        assert!(sm.advance(ShellState::ShuttingDown).is_err());
    }

    #[test]
    fn test_shutdown_from_any_earlier_state() {
        let mut sm = StateMachine::new();
        sm.advance(ShellState::LayoutBuilt).unwrap();
        sm.advance(ShellState::ShuttingDown).unwrap();
        assert!(sm.reached(ShellState::Running));
        assert!(sm.advance(ShellState::ShuttingDown).is_err());
        sm.advance(ShellState::Stopped).unwrap();
    }
}
