use std::any::type_name;
use std::fmt;

use tracing::trace;

use crate::error::SqlMultisetError;
use crate::materialize::Entity;

/// Where an extractor stands in the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// Positioned on result set `n` (zero-based).
    At(usize),
    /// The cursor reported no further result sets.
    Exhausted,
    /// The cursor was released.
    Disposed,
    /// A read or materialization failed part way through a result set.
    Faulted,
}

impl Position {
    /// Index of the current result set, or `None` in a terminal state.
    #[must_use]
    pub fn index(self) -> Option<usize> {
        match self {
            Position::At(n) => Some(n),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Position::At(_))
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::At(n) => write!(f, "result set {n}"),
            Position::Exhausted => f.write_str("exhausted"),
            Position::Disposed => f.write_str("disposed"),
            Position::Faulted => f.write_str("faulted"),
        }
    }
}

/// Shape a caller expects a result set to have.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpectedShape {
    /// Rows of the named entity type.
    Typed(&'static str),
    Dynamic,
    Scalar,
}

impl ExpectedShape {
    #[must_use]
    pub fn typed<T: Entity>() -> Self {
        ExpectedShape::Typed(type_name::<T>())
    }
}

impl fmt::Display for ExpectedShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpectedShape::Typed(name) => write!(f, "rows of {name}"),
            ExpectedShape::Dynamic => f.write_str("dynamic rows"),
            ExpectedShape::Scalar => f.write_str("a scalar"),
        }
    }
}

/// Position bookkeeping shared by the blocking and suspending extractors.
#[derive(Debug)]
pub(crate) struct ExtractorState {
    position: Position,
    consumed: usize,
    expected: Option<Vec<ExpectedShape>>,
}

impl ExtractorState {
    pub(crate) fn new(has_current: bool) -> Self {
        Self {
            position: if has_current {
                Position::At(0)
            } else {
                Position::Exhausted
            },
            consumed: 0,
            expected: None,
        }
    }

    pub(crate) fn position(&self) -> Position {
        self.position
    }

    pub(crate) fn set_expected(&mut self, shapes: Vec<ExpectedShape>) {
        self.expected = Some(shapes);
    }

    /// Index of the current result set, checked against the expected shapes if any.
    pub(crate) fn require_current(
        &self,
        operation: &str,
        shape: &ExpectedShape,
    ) -> Result<usize, SqlMultisetError> {
        let Position::At(index) = self.position else {
            return Err(SqlMultisetError::CursorState(format!(
                "{operation} called on a {} extractor",
                self.position
            )));
        };
        if let Some(expected) = &self.expected {
            match expected.get(index) {
                Some(want) if want == shape => {}
                Some(want) => {
                    return Err(SqlMultisetError::ShapeMismatch(format!(
                        "result set {index} is expected to be {want}, {operation} requested {shape}"
                    )));
                }
                None => {
                    return Err(SqlMultisetError::ShapeMismatch(format!(
                        "only {} result sets expected, {operation} requested result set {index}",
                        expected.len()
                    )));
                }
            }
        }
        Ok(index)
    }

    /// Record the outcome of one cursor advance.
    pub(crate) fn advanced(&mut self, more: bool) {
        if let Position::At(n) = self.position {
            self.consumed = n + 1;
        }
        self.position = match self.position {
            Position::At(n) if more => Position::At(n + 1),
            Position::At(_) => Position::Exhausted,
            terminal => terminal,
        };
        trace!(position = %self.position, "advanced cursor");
    }

    pub(crate) fn fault(&mut self) {
        if let Position::At(_) = self.position {
            self.position = Position::Faulted;
        }
    }

    /// Whether `next_result` may touch the cursor.
    pub(crate) fn check_advance(&self) -> Result<bool, SqlMultisetError> {
        match self.position {
            Position::At(_) => Ok(true),
            Position::Exhausted => Ok(false),
            other => Err(SqlMultisetError::CursorState(format!(
                "next_result called on a {other} extractor"
            ))),
        }
    }

    /// Move to `Disposed`; returns `true` the first time only.
    pub(crate) fn dispose(&mut self) -> bool {
        if self.position == Position::Disposed {
            false
        } else {
            self.position = Position::Disposed;
            true
        }
    }

    /// Check that every expected result set was consumed.
    pub(crate) fn verify_complete(&self) -> Result<(), SqlMultisetError> {
        let consumed = self.consumed;
        match &self.expected {
            Some(expected) if expected.len() != consumed => Err(SqlMultisetError::ShapeMismatch(
                format!(
                    "{} result sets expected, {consumed} consumed",
                    expected.len()
                ),
            )),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_moves_by_one_then_sticks_at_exhausted() {
        let mut state = ExtractorState::new(true);
        state.advanced(true);
        assert_eq!(state.position(), Position::At(1));
        state.advanced(false);
        assert_eq!(state.position(), Position::Exhausted);
        state.advanced(true);
        assert_eq!(state.position(), Position::Exhausted);
    }

    #[test]
    fn terminal_states_reject_extraction() {
        let state = ExtractorState::new(false);
        let err = state.require_current("extract", &ExpectedShape::Scalar).unwrap_err();
        assert!(err.is_cursor_state());
    }

    #[test]
    fn dispose_reports_first_call_only() {
        let mut state = ExtractorState::new(true);
        assert!(state.dispose());
        assert!(!state.dispose());
        state.fault();
        assert_eq!(state.position(), Position::Disposed);
    }

    #[test]
    fn expected_shapes_are_checked_in_order() {
        let mut state = ExtractorState::new(true);
        state.set_expected(vec![ExpectedShape::Dynamic]);
        assert_eq!(state.require_current("extract_dynamic", &ExpectedShape::Dynamic).unwrap(), 0);
        let err = state
            .require_current("extract_scalar", &ExpectedShape::Scalar)
            .unwrap_err();
        assert!(matches!(err, SqlMultisetError::ShapeMismatch(_)));
        state.advanced(true);
        assert!(state.require_current("extract_dynamic", &ExpectedShape::Dynamic).is_err());
        assert!(state.verify_complete().is_ok());
    }
}
