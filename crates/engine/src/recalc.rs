//! Recalculation reporting and cycle errors.
//!
//! Types produced by the edit path: the error raised when an edit would
//! close a dependency cycle, and the per-edit report describing what the
//! recalculation pass touched.

use std::fmt;

/// Error raised when an edit would introduce a circular reference.
///
/// Detected on a read-only view before anything is committed, so the
/// store and graph are untouched whenever this is returned.
#[derive(Debug, Clone)]
pub struct CircularError {
    /// Cells participating in the cycle.
    /// May be a subset for large cycles.
    pub cells: Vec<String>,

    /// Human-readable description of the cycle.
    pub message: String,
}

impl CircularError {
    pub fn new(cells: Vec<String>, message: impl Into<String>) -> Self {
        Self {
            cells,
            message: message.into(),
        }
    }

    /// Cycle report for a cell whose formula references itself.
    pub fn self_reference(cell: &str) -> Self {
        Self {
            cells: vec![cell.to_string()],
            message: format!("Cell {} references itself", cell),
        }
    }

    /// Cycle report for a multi-cell cycle.
    pub fn cycle(cells: Vec<String>) -> Self {
        let message = if cells.len() <= 5 {
            format!("Circular reference: {}", cells.join(" → "))
        } else {
            format!(
                "Circular reference involving {} cells: {} → ... → {}",
                cells.len(),
                cells[0],
                cells[cells.len() - 1]
            )
        };
        Self { cells, message }
    }
}

impl fmt::Display for CircularError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CircularError {}

/// An error that occurred while re-evaluating a specific cell.
///
/// These are observations, not failures of the pass: the cell stores the
/// error as its value and the pass continues.
#[derive(Debug, Clone)]
pub struct RecalcError {
    /// The cell where the error occurred.
    pub cell: String,

    /// Description of the error.
    pub error: String,
}

impl RecalcError {
    pub fn new(cell: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            cell: cell.into(),
            error: error.into(),
        }
    }
}

/// Report from one edit's recalculation pass.
#[derive(Debug, Clone, Default)]
pub struct RecalcReport {
    /// Number of cells whose values were recomputed.
    pub cells_recomputed: usize,

    /// Evaluation errors encountered during the pass.
    pub errors: Vec<RecalcError>,
}

impl RecalcReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Format as a concise one-line summary for logging.
    pub fn summary(&self) -> String {
        format!(
            "{} cells recomputed, errors={}",
            self.cells_recomputed,
            self.errors.len()
        )
    }
}
