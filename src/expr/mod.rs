//! Restricted boolean expressions for conditional transitions.
//!
//! A condition can only read variables from the instance context and combine
//! comparisons with `and` / `or` / `not`:
//!
//! ```text
//! amount > 5000 and applicant.country == "ES"
//! not approved || (score >= 7.5 && flagged != true)
//! ```
//!
//! There are no function calls, attribute access beyond dotted context paths,
//! or any way to reach the process environment.

pub mod lexer;
pub mod parser;

use std::cmp::Ordering;

use serde_json::{Number, Value};
use thiserror::Error;

use crate::engine::types::Context;

pub use parser::{CompareOp, Expr, Operand, parse};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExprError {
    #[error("unexpected character '{ch}' at {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("unterminated string starting at {0}")]
    UnterminatedString(usize),

    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    #[error("unexpected {found} at {pos}")]
    UnexpectedToken { found: String, pos: usize },

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("expression nested deeper than {0} levels")]
    TooDeep(usize),

    #[error("expression longer than {0} tokens")]
    TooLong(usize),

    #[error("unknown variable '{0}'")]
    UnknownVariable(String),

    #[error("cannot compare {left} {op} {right}")]
    TypeMismatch {
        left: &'static str,
        op: CompareOp,
        right: &'static str,
    },
}

/// Parse and evaluate `condition` against `ctx`. An empty condition is true.
pub fn evaluate(condition: &str, ctx: &Context) -> Result<bool, ExprError> {
    if condition.trim().is_empty() {
        return Ok(true);
    }
    let expr = parse(condition)?;
    eval(&expr, ctx)
}

/// Evaluate an already parsed expression. `and` / `or` short-circuit.
pub fn eval(expr: &Expr, ctx: &Context) -> Result<bool, ExprError> {
    match expr {
        Expr::Or(left, right) => Ok(eval(left, ctx)? || eval(right, ctx)?),
        Expr::And(left, right) => Ok(eval(left, ctx)? && eval(right, ctx)?),
        Expr::Not(inner) => Ok(!eval(inner, ctx)?),
        Expr::Truthy(operand) => Ok(truthy(resolve(operand, ctx)?)),
        Expr::Compare { left, op, right } => {
            compare(resolve(left, ctx)?, *op, resolve(right, ctx)?)
        }
    }
}

/// Resolve a dotted path like `applicant.address.city` from the context.
pub fn lookup<'a>(ctx: &'a Context, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = ctx.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn resolve<'a>(operand: &'a Operand, ctx: &'a Context) -> Result<&'a Value, ExprError> {
    match operand {
        Operand::Literal(value) => Ok(value),
        Operand::Path(path) => {
            lookup(ctx, path).ok_or_else(|| ExprError::UnknownVariable(path.clone()))
        }
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn compare(left: &Value, op: CompareOp, right: &Value) -> Result<bool, ExprError> {
    let ordering = match (left, right) {
        (Value::Number(l), Value::Number(r)) => compare_numbers(l, r),
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        _ => match op {
            CompareOp::Eq => return Ok(left == right),
            CompareOp::Ne => return Ok(left != right),
            _ => {
                return Err(ExprError::TypeMismatch {
                    left: type_name(left),
                    op,
                    right: type_name(right),
                });
            }
        },
    };

    let Some(ordering) = ordering else {
        return Ok(op == CompareOp::Ne);
    };

    Ok(match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::Ne => ordering != Ordering::Equal,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Le => ordering != Ordering::Greater,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Ge => ordering != Ordering::Less,
    })
}

/// Order two JSON numbers. Integers compare exactly; a float on either side
/// falls back to f64.
pub(crate) fn compare_numbers(l: &Number, r: &Number) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (l.as_i64(), r.as_i64()) {
        return Some(a.cmp(&b));
    }
    if let (Some(a), Some(b)) = (l.as_u64(), r.as_u64()) {
        return Some(a.cmp(&b));
    }
    match (l.as_f64(), r.as_f64()) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => None,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
