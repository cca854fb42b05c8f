//! Import state machine.

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{ImportError, ImportResult};

/// Stage an import has reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportState {
    /// Request parsed, nothing touched yet.
    Requested,
    /// File opened and its descriptor decoded.
    Probed,
    /// Catalog entry built.
    Reconciled,
    /// Page tree validated.
    Validated,
    /// Entry registered. Terminal.
    Committed,
    /// Import abandoned. Terminal.
    Failed(String),
}

impl ImportState {
    /// Returns true for `Committed` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::Failed(_))
    }

    fn ordinal(&self) -> Option<u8> {
        match self {
            Self::Requested => Some(0),
            Self::Probed => Some(1),
            Self::Reconciled => Some(2),
            Self::Validated => Some(3),
            Self::Committed => Some(4),
            Self::Failed(_) => None,
        }
    }

    /// Returns true if `next` may follow this state.
    pub fn can_transition_to(&self, next: &ImportState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self.ordinal(), next.ordinal()) {
            (_, None) => true,
            (Some(from), Some(to)) => to == from + 1,
            (None, Some(_)) => false,
        }
    }
}

impl fmt::Display for ImportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => f.write_str("requested"),
            Self::Probed => f.write_str("probed"),
            Self::Reconciled => f.write_str("reconciled"),
            Self::Validated => f.write_str("validated"),
            Self::Committed => f.write_str("committed"),
            Self::Failed(reason) => write!(f, "failed({})", reason),
        }
    }
}

/// Tracks one import through its stages.
#[derive(Debug)]
pub struct ImportOperation {
    uri: String,
    history: Vec<ImportState>,
    started: Instant,
}

impl ImportOperation {
    /// Starts tracking an import of `uri`.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            history: vec![ImportState::Requested],
            started: Instant::now(),
        }
    }

    /// Current state.
    pub fn state(&self) -> &ImportState {
        // history always holds at least the initial state
        &self.history[self.history.len() - 1]
    }

    /// Every state visited, oldest first.
    pub fn history(&self) -> &[ImportState] {
        &self.history
    }

    /// Time since the import started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Moves to `next`, rejecting skipped or repeated stages.
    pub fn advance(&mut self, next: ImportState) -> ImportResult<()> {
        let current = self.state();
        if !current.can_transition_to(&next) {
            return Err(ImportError::InvalidTransition {
                from: current.to_string(),
                to: next.to_string(),
            });
        }
        debug!(uri = %self.uri, from = %current, to = %next, "import state");
        self.history.push(next);
        Ok(())
    }

    /// Records a failure. A terminal operation is left unchanged.
    pub fn fail(&mut self, err: &ImportError) {
        if self.state().is_terminal() {
            return;
        }
        warn!(uri = %self.uri, stage = %self.state(), error = %err, "import failed");
        self.history.push(ImportState::Failed(err.to_string()));
    }

    /// Consumes the tracker, returning the visited states.
    pub fn into_history(self) -> Vec<ImportState> {
        self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut op = ImportOperation::new("table:t");
        for next in [
            ImportState::Probed,
            ImportState::Reconciled,
            ImportState::Validated,
            ImportState::Committed,
        ] {
            op.advance(next).unwrap();
        }
        assert_eq!(op.state(), &ImportState::Committed);
        assert_eq!(op.history().len(), 5);
    }

    #[test]
    fn test_no_skipping_or_revisiting() {
        let mut op = ImportOperation::new("table:t");
        assert!(op.advance(ImportState::Reconciled).is_err());
        op.advance(ImportState::Probed).unwrap();
        assert!(op.advance(ImportState::Probed).is_err());
        assert!(op.advance(ImportState::Requested).is_err());
    }

    #[test]
    fn test_fail_from_any_non_terminal() {
        let mut op = ImportOperation::new("table:t");
        op.advance(ImportState::Probed).unwrap();
        op.fail(&ImportError::MissingMetadata { uri: "table:t".into() });
        assert!(matches!(op.state(), ImportState::Failed(_)));
        assert!(op.advance(ImportState::Reconciled).is_err());

        // Failing again keeps the first reason.
        op.fail(&ImportError::NameConflict { uri: "table:t".into() });
        assert_eq!(op.history().len(), 3);
    }

    #[test]
    fn test_committed_is_terminal() {
        let state = ImportState::Committed;
        assert!(!state.can_transition_to(&ImportState::Failed("x".into())));
    }
}
