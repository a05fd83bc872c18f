//! Cell store and edit orchestration.
//!
//! `Sheet` owns the cells and the dependency graph; nothing else ever
//! mutates either. Every edit runs the same pipeline: normalize and
//! validate the name, classify the content, probe the graph for cycles on
//! a read-only view, and only then commit and re-evaluate the affected
//! cells in dependency order.

use std::fmt;

use rustc_hash::FxHashMap;

use crate::cell::{Cell, CellContent, CellValue};
use crate::dep_graph::DepGraph;
use crate::formula::{self, Formula, FormulaFormatError};
use crate::recalc::{CircularError, RecalcError, RecalcReport};

/// Canonicalizes a cell name before storage and comparison.
pub type Normalizer = Box<dyn Fn(&str) -> String>;

/// Accepts or rejects a normalized cell name beyond the base grammar.
pub type Validator = Box<dyn Fn(&str) -> bool>;

/// Error for a name that fails the grammar or validator, or for a lookup
/// of a cell that has no contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidNameError {
    /// The offending name, as seen by the check that rejected it.
    pub name: String,

    /// Human-readable description.
    pub message: String,
}

impl InvalidNameError {
    /// The name fails the grammar or the injected validator.
    pub fn bad_name(name: &str) -> Self {
        Self {
            name: name.to_string(),
            message: format!("'{}' is not a valid cell name", name),
        }
    }

    /// The name is well formed but no cell with contents exists under it.
    pub fn empty_cell(name: &str) -> Self {
        Self {
            name: name.to_string(),
            message: format!("cell '{}' has no contents", name),
        }
    }
}

impl fmt::Display for InvalidNameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for InvalidNameError {}

/// Structural errors from `set_contents_of_cell`. Each one rejects the
/// edit with the store exactly as it was before the call.
#[derive(Debug)]
pub enum SheetError {
    InvalidName(InvalidNameError),
    BadFormula(FormulaFormatError),
    Circular(CircularError),
}

impl fmt::Display for SheetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SheetError::InvalidName(e) => write!(f, "{}", e),
            SheetError::BadFormula(e) => write!(f, "{}", e),
            SheetError::Circular(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SheetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SheetError::InvalidName(e) => Some(e),
            SheetError::BadFormula(e) => Some(e),
            SheetError::Circular(e) => Some(e),
        }
    }
}

impl From<InvalidNameError> for SheetError {
    fn from(e: InvalidNameError) -> Self {
        SheetError::InvalidName(e)
    }
}

impl From<FormulaFormatError> for SheetError {
    fn from(e: FormulaFormatError) -> Self {
        SheetError::BadFormula(e)
    }
}

impl From<CircularError> for SheetError {
    fn from(e: CircularError) -> Self {
        SheetError::Circular(e)
    }
}

/// A set of named cells kept consistent under edits.
///
/// Cells with empty content are absent, not stored. The dependency graph
/// is acyclic at rest: edits that would close a cycle are rejected before
/// anything is committed.
pub struct Sheet {
    cells: FxHashMap<String, Cell>,
    deps: DepGraph,
    normalize: Normalizer,
    is_valid: Validator,
    version: String,
    last_recalc: RecalcReport,
}

impl Default for Sheet {
    fn default() -> Self {
        Self::new()
    }
}

impl Sheet {
    /// Empty sheet with the identity normalizer, a validator that accepts
    /// every well-formed name, and the version tag "default".
    pub fn new() -> Self {
        Self::with_config(
            Box::new(|s: &str| s.to_string()),
            Box::new(|_: &str| true),
            "default",
        )
    }

    /// Empty sheet with an injected normalizer, validator, and version
    /// tag. The version tag is opaque to the sheet; persistence
    /// collaborators read it back through `version()`.
    pub fn with_config(
        normalize: Normalizer,
        is_valid: Validator,
        version: impl Into<String>,
    ) -> Self {
        Self {
            cells: FxHashMap::default(),
            deps: DepGraph::new(),
            normalize,
            is_valid,
            version: version.into(),
            last_recalc: RecalcReport::new(),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Report from the most recent edit's recalculation pass.
    pub fn last_recalc(&self) -> &RecalcReport {
        &self.last_recalc
    }

    /// Names of all cells with contents. Finite and restartable;
    /// re-iterating reflects the current state.
    pub fn nonempty_cell_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.cells.keys().map(String::as_str)
    }

    /// The stored content of `name`. Fails for invalid names and for
    /// cells with no contents.
    pub fn get_cell_contents(&self, name: &str) -> Result<&CellContent, InvalidNameError> {
        let name = self.checked_name(name)?;
        self.cells
            .get(&name)
            .map(|cell| &cell.content)
            .ok_or_else(|| InvalidNameError::empty_cell(&name))
    }

    /// The computed value of `name`. Fails for invalid names and for
    /// cells with no contents.
    pub fn get_cell_value(&self, name: &str) -> Result<&CellValue, InvalidNameError> {
        let name = self.checked_name(name)?;
        self.cells
            .get(&name)
            .map(|cell| &cell.value)
            .ok_or_else(|| InvalidNameError::empty_cell(&name))
    }

    /// Cells whose formulas directly reference `name`, sorted.
    pub fn direct_dependents(&self, name: &str) -> Result<Vec<String>, InvalidNameError> {
        let name = self.checked_name(name)?;
        let mut dependents: Vec<String> =
            self.deps.dependents(&name).map(str::to_string).collect();
        dependents.sort();
        Ok(dependents)
    }

    /// Sets the contents of `name` from raw input text and re-evaluates
    /// every transitively affected cell.
    ///
    /// Classification: text that parses as a number is a numeric literal,
    /// a leading `=` marks a formula, anything else is free text, and
    /// empty input removes the cell. Returns the affected cell names with
    /// `name` first, ordered so each cell follows everything it reads.
    ///
    /// Structural failures (`InvalidNameError`, `FormulaFormatError`,
    /// `CircularError`) reject the edit before any mutation; evaluation
    /// failures are stored as `CellValue::Error` and do not abort the
    /// pass.
    pub fn set_contents_of_cell(
        &mut self,
        name: &str,
        content: &str,
    ) -> Result<Vec<String>, SheetError> {
        let name = self.checked_name(name)?;
        let new_content = self.classify(content)?;

        let new_dependees: Vec<String> = match &new_content {
            Some(CellContent::Expr(f)) => f.variables().to_vec(),
            _ => Vec::new(),
        };

        // Read-only cycle probe; nothing has been committed yet, so a
        // rejection here leaves the sheet exactly as it was.
        if let Some(cycle) = self.deps.would_create_cycle(&name, &new_dependees) {
            return Err(cycle.into());
        }

        // Commit: edge swap first, then content.
        self.deps.replace_dependees(&name, new_dependees);
        match new_content {
            Some(content) => {
                self.cells.insert(name.clone(), Cell::new(content));
            }
            None => {
                self.cells.remove(&name);
            }
        }

        // Re-evaluate the affected set in dependency order. The edited
        // cell is first; each later cell reads the freshly stored values
        // of everything before it.
        let affected = self.deps.update_order(&name);
        let mut report = RecalcReport::new();
        for cell_name in &affected {
            let Some(value) = self.compute_value(cell_name) else {
                // The cleared cell itself: nothing to evaluate, but it
                // stays in the affected list so callers repaint it.
                continue;
            };
            if let CellValue::Error(e) = &value {
                report
                    .errors
                    .push(RecalcError::new(cell_name.as_str(), e.reason()));
            }
            if let Some(cell) = self.cells.get_mut(cell_name) {
                cell.value = value;
                report.cells_recomputed += 1;
            }
        }
        self.last_recalc = report;

        Ok(affected)
    }

    /// Normalizes `name`, then checks the base grammar and the injected
    /// validator.
    fn checked_name(&self, name: &str) -> Result<String, InvalidNameError> {
        let normalized = (self.normalize)(name);
        if !formula::is_variable(&normalized) || !(self.is_valid)(&normalized) {
            return Err(InvalidNameError::bad_name(&normalized));
        }
        Ok(normalized)
    }

    /// Classifies raw input into cell content, or `None` for empty input.
    fn classify(&self, content: &str) -> Result<Option<CellContent>, SheetError> {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        if let Ok(n) = trimmed.parse::<f64>() {
            return Ok(Some(CellContent::Number(n)));
        }
        if let Some(body) = trimmed.strip_prefix('=') {
            let f = Formula::with_rules(body, &self.normalize, &self.is_valid)?;
            return Ok(Some(CellContent::Expr(f)));
        }
        Ok(Some(CellContent::Text(trimmed.to_string())))
    }

    /// Computes the current value of `name` from its content, reading
    /// referenced cells' stored values. `None` if the cell is absent.
    fn compute_value(&self, name: &str) -> Option<CellValue> {
        let cell = self.cells.get(name)?;
        Some(match &cell.content {
            CellContent::Number(n) => CellValue::Number(*n),
            CellContent::Text(s) => CellValue::Text(s.clone()),
            CellContent::Expr(f) => match f.evaluate(|var| self.numeric_value(var)) {
                Ok(n) => CellValue::Number(n),
                Err(e) => CellValue::Error(e),
            },
        })
    }

    /// The numeric value of `name`, if it currently has one. Text-valued,
    /// error-valued, and absent cells have none; formula lookups on them
    /// fail.
    fn numeric_value(&self, name: &str) -> Option<f64> {
        self.cells.get(name)?.value.as_number()
    }
}
