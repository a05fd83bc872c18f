use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::formula::{Formula, FormulaError};

/// What a cell holds after its input text has been classified.
#[derive(Debug, Clone, PartialEq)]
pub enum CellContent {
    Number(f64),
    Text(String),
    Expr(Formula),
}

impl CellContent {
    /// The input text that reproduces this content through an edit.
    ///
    /// This is the replay form used by bulk loading: feeding it back
    /// through `set_contents_of_cell` classifies to an equal content.
    pub fn input_text(&self) -> String {
        match self {
            CellContent::Number(n) => format!("{}", n),
            CellContent::Text(s) => s.clone(),
            CellContent::Expr(f) => format!("={}", f),
        }
    }
}

impl fmt::Display for CellContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.input_text())
    }
}

impl Serialize for CellContent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.input_text())
    }
}

impl<'de> Deserialize<'de> for CellContent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        if let Some(body) = text.strip_prefix('=') {
            let formula = Formula::new(body).map_err(D::Error::custom)?;
            return Ok(CellContent::Expr(formula));
        }
        if let Ok(n) = text.parse::<f64>() {
            return Ok(CellContent::Number(n));
        }
        Ok(CellContent::Text(text))
    }
}

/// A cell's computed value: the number or text echo of its content, or
/// the error its formula evaluated to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Error(FormulaError),
}

impl CellValue {
    /// Numeric view, used by formula lookups. Text and error values have
    /// no numeric reading.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, CellValue::Error(_))
    }

    pub fn to_display(&self) -> String {
        match self {
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            CellValue::Text(s) => s.clone(),
            CellValue::Error(e) => format!("#ERR: {}", e.reason()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub content: CellContent,
    pub value: CellValue,
}

impl Cell {
    /// A freshly edited cell. Literal contents carry their value
    /// immediately; a formula's value is filled in by the recalculation
    /// pass that follows every commit.
    pub fn new(content: CellContent) -> Self {
        let value = match &content {
            CellContent::Number(n) => CellValue::Number(*n),
            CellContent::Text(s) => CellValue::Text(s.clone()),
            CellContent::Expr(_) => CellValue::Error(FormulaError::new("not yet evaluated")),
        };
        Self { content, value }
    }
}
