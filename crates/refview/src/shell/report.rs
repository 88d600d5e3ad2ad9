// Startup Report - one entry per load, place, start or hook attempt

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Register,
    Load,
    Place,
    Start,
    Hook,
    Channel,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum Outcome {
    Ok,
    Skipped(String),
    Failed(String),
}

impl Outcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartupEntry {
    /// Plugin identity, hook point, channel or file the attempt was about
    pub subject: String,
    pub phase: Phase,
    pub outcome: Outcome,
}

impl fmt::Display for StartupEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            Outcome::Ok => write!(f, "{:?} {}: ok", self.phase, self.subject),
            Outcome::Skipped(reason) => {
                write!(f, "{:?} {}: skipped ({})", self.phase, self.subject, reason)
            }
            Outcome::Failed(reason) => {
                write!(f, "{:?} {}: failed ({})", self.phase, self.subject, reason)
            }
        }
    }
}

/// Everything that happened during startup, in order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StartupReport {
    entries: Vec<StartupEntry>,
}

impl StartupReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, subject: impl Into<String>, phase: Phase, outcome: Outcome) {
        self.entries.push(StartupEntry {
            subject: subject.into(),
            phase,
            outcome,
        });
    }

    pub fn ok(&mut self, subject: impl Into<String>, phase: Phase) {
        self.record(subject, phase, Outcome::Ok);
    }

    pub fn failed(&mut self, subject: impl Into<String>, phase: Phase, reason: impl fmt::Display) {
        self.record(subject, phase, Outcome::Failed(reason.to_string()));
    }

    pub fn entries(&self) -> &[StartupEntry] {
        &self.entries
    }

    pub fn failures(&self) -> impl Iterator<Item = &StartupEntry> {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, Outcome::Failed(_)))
    }

    pub fn in_phase(&self, phase: Phase) -> impl Iterator<Item = &StartupEntry> {
        self.entries.iter().filter(move |e| e.phase == phase)
    }

    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }
}
