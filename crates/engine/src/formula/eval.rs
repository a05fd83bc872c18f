//! Two-stack formula evaluation.
//!
//! Evaluation never panics and never returns a Rust error for value-level
//! failures: division by zero and failed variable lookups come back as
//! `FormulaError` values, which the cell store keeps as cell values.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::parser::Token;

/// Why a formula failed to produce a number.
///
/// This is data, not control flow: a cell whose formula evaluates to a
/// `FormulaError` stores the error as its value, and cells referencing it
/// fail their own lookups in turn.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FormulaError {
    reason: String,
}

impl FormulaError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for FormulaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason)
    }
}

/// Left-to-right scan over the token stream with an operand stack and an
/// operator stack.
///
/// Additive operators resolve any pending `+`/`-` before pushing; every
/// operand resolves a pending `*`/`/` immediately after its push, so
/// multiplicative operators are never deferred past the next operand.
/// `)` resolves a pending additive, pops the `(`, then resolves the
/// multiplicative the group exposes. Construction already rejected
/// malformed streams; a stack underflow here is reported as a
/// `FormulaError` rather than unwrapped.
pub(super) fn evaluate(
    tokens: &[Token],
    lookup: &dyn Fn(&str) -> Option<f64>,
) -> Result<f64, FormulaError> {
    let mut values: Vec<f64> = Vec::new();
    let mut ops: Vec<char> = Vec::new();

    for token in tokens {
        match token {
            Token::Number(n) => push_operand(n.into_inner(), &mut values, &mut ops)?,
            Token::Var(name) => {
                let value = lookup(name).ok_or_else(|| {
                    FormulaError::new(format!("variable '{}' has no numeric value", name))
                })?;
                push_operand(value, &mut values, &mut ops)?;
            }
            Token::Plus | Token::Minus => {
                if matches!(ops.last(), Some('+') | Some('-')) {
                    apply_additive(&mut values, &mut ops)?;
                }
                ops.push(if matches!(token, Token::Plus) { '+' } else { '-' });
            }
            Token::Star => ops.push('*'),
            Token::Slash => ops.push('/'),
            Token::LParen => ops.push('('),
            Token::RParen => {
                if matches!(ops.last(), Some('+') | Some('-')) {
                    apply_additive(&mut values, &mut ops)?;
                }
                match ops.pop() {
                    Some('(') => {}
                    _ => return Err(FormulaError::new("mismatched parentheses")),
                }
                if matches!(ops.last(), Some('*') | Some('/')) {
                    apply_multiplicative(&mut values, &mut ops)?;
                }
            }
        }
    }

    while matches!(ops.last(), Some('+') | Some('-')) {
        apply_additive(&mut values, &mut ops)?;
    }
    if !ops.is_empty() || values.len() != 1 {
        return Err(FormulaError::new("expression did not reduce to a single value"));
    }
    values
        .pop()
        .ok_or_else(|| FormulaError::new("expression did not reduce to a single value"))
}

fn push_operand(value: f64, values: &mut Vec<f64>, ops: &mut Vec<char>) -> Result<(), FormulaError> {
    values.push(value);
    if matches!(ops.last(), Some('*') | Some('/')) {
        apply_multiplicative(values, ops)?;
    }
    Ok(())
}

/// Pops (rhs, lhs) in that order.
fn pop_two(values: &mut Vec<f64>) -> Result<(f64, f64), FormulaError> {
    let rhs = values
        .pop()
        .ok_or_else(|| FormulaError::new("operator is missing an operand"))?;
    let lhs = values
        .pop()
        .ok_or_else(|| FormulaError::new("operator is missing an operand"))?;
    Ok((rhs, lhs))
}

fn apply_additive(values: &mut Vec<f64>, ops: &mut Vec<char>) -> Result<(), FormulaError> {
    let op = ops
        .pop()
        .ok_or_else(|| FormulaError::new("operand is missing an operator"))?;
    let (rhs, lhs) = pop_two(values)?;
    values.push(if op == '+' { lhs + rhs } else { lhs - rhs });
    Ok(())
}

fn apply_multiplicative(values: &mut Vec<f64>, ops: &mut Vec<char>) -> Result<(), FormulaError> {
    let op = ops
        .pop()
        .ok_or_else(|| FormulaError::new("operand is missing an operator"))?;
    let (rhs, lhs) = pop_two(values)?;
    if op == '/' {
        if rhs == 0.0 {
            return Err(FormulaError::new("division by zero"));
        }
        values.push(lhs / rhs);
    } else {
        values.push(lhs * rhs);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::formula::Formula;

    use super::*;

    fn no_vars(_: &str) -> Option<f64> {
        None
    }

    fn eval(input: &str) -> Result<f64, FormulaError> {
        Formula::new(input)
            .expect("formula should parse")
            .evaluate(no_vars)
    }

    #[test]
    fn test_precedence() {
        assert_eq!(eval("5+5*2"), Ok(15.0));
        assert_eq!(eval("2+3*4"), Ok(14.0));
        assert_eq!(eval("2*3+4"), Ok(10.0));
    }

    #[test]
    fn test_left_associativity() {
        assert_eq!(eval("10-2-3"), Ok(5.0));
        assert_eq!(eval("20/2*10/10+10*5"), Ok(60.0));
        assert_eq!(eval("100/10/5"), Ok(2.0));
    }

    #[test]
    fn test_parentheses() {
        assert_eq!(eval("(2+3)*4"), Ok(20.0));
        assert_eq!(eval("2*(3+4)"), Ok(14.0));
        assert_eq!(eval("((1+2)*(3+4))"), Ok(21.0));
        assert_eq!(eval("2*(3+4)*5"), Ok(70.0));
        assert_eq!(eval("(5)"), Ok(5.0));
    }

    #[test]
    fn test_division_by_zero_is_an_error_value() {
        let err = eval("5/0").expect_err("must not evaluate");
        assert_eq!(err.reason(), "division by zero");
        let err = eval("1/(2-2)").expect_err("must not evaluate");
        assert_eq!(err.reason(), "division by zero");
    }

    #[test]
    fn test_variable_lookup() {
        let f = Formula::new("x+7").expect("formula should parse");
        let result = f.evaluate(|v| if v == "x" { Some(2.0) } else { None });
        assert_eq!(result, Ok(9.0));
    }

    #[test]
    fn test_unknown_variable_is_an_error_value() {
        let f = Formula::new("x+7").expect("formula should parse");
        let err = f.evaluate(no_vars).expect_err("lookup must fail");
        assert!(err.reason().contains("x"));
    }

    #[test]
    fn test_scientific_notation_literal() {
        assert_eq!(eval("5e3/1000"), Ok(5.0));
        assert_eq!(eval("2.5e1+5"), Ok(30.0));
    }

    #[test]
    fn test_single_operand() {
        assert_eq!(eval("42"), Ok(42.0));
        let f = Formula::new("y1").expect("formula should parse");
        assert_eq!(f.evaluate(|_| Some(3.5)), Ok(3.5));
    }
}
