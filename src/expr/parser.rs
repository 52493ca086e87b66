//! Recursive-descent parser producing a condition AST.
//!
//! Precedence, loosest first: `or`, `and`, `not`, comparison.
//!
//! Nesting of `(` and `not` is capped at [`MAX_DEPTH`] and the token count at
//! [`MAX_TOKENS`], so both parsing and evaluating a tree stay within a small
//! stack whatever the input.

use serde_json::Value;

use super::ExprError;
use super::lexer::{Spanned, Token, tokenize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(Value),
    Path(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Compare {
        left: Operand,
        op: CompareOp,
        right: Operand,
    },
    Truthy(Operand),
}

/// Deepest allowed nesting of parentheses and `not`.
pub const MAX_DEPTH: usize = 64;

/// Longest allowed condition, in tokens. Bounds `and`/`or` chains, which
/// nest to the left.
pub const MAX_TOKENS: usize = 1024;

pub fn parse(input: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(input)?;
    if tokens.len() > MAX_TOKENS {
        return Err(ExprError::TooLong(MAX_TOKENS));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.parse_or()?;

    match parser.tokens.get(parser.pos) {
        None => Ok(expr),
        Some((token, pos)) => Err(ExprError::UnexpectedToken {
            found: token.to_string(),
            pos: *pos,
        }),
    }
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn next(&mut self) -> Result<Spanned, ExprError> {
        let spanned = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(ExprError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(spanned)
    }

    fn descend(&mut self) -> Result<(), ExprError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExprError::TooDeep(MAX_DEPTH));
        }
        Ok(())
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            self.descend()?;
            let inner = self.parse_unary()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            self.descend()?;
            let inner = self.parse_or()?;
            self.depth -= 1;
            let (token, pos) = self.next()?;
            if token != Token::RParen {
                return Err(ExprError::UnexpectedToken {
                    found: token.to_string(),
                    pos,
                });
            }
            return Ok(inner);
        }

        let left = self.parse_operand()?;

        let op = match self.peek() {
            Some(Token::Eq) => CompareOp::Eq,
            Some(Token::Ne) => CompareOp::Ne,
            Some(Token::Lt) => CompareOp::Lt,
            Some(Token::Le) => CompareOp::Le,
            Some(Token::Gt) => CompareOp::Gt,
            Some(Token::Ge) => CompareOp::Ge,
            _ => return Ok(Expr::Truthy(left)),
        };
        self.pos += 1;

        let right = self.parse_operand()?;
        Ok(Expr::Compare { left, op, right })
    }

    fn parse_operand(&mut self) -> Result<Operand, ExprError> {
        let (token, pos) = self.next()?;
        let operand = match token {
            Token::Path(path) => Operand::Path(path),
            Token::Str(s) => Operand::Literal(Value::String(s)),
            Token::True => Operand::Literal(Value::Bool(true)),
            Token::False => Operand::Literal(Value::Bool(false)),
            Token::Null => Operand::Literal(Value::Null),
            Token::Number(n) => Operand::Literal(Value::Number(n)),
            other => {
                return Err(ExprError::UnexpectedToken {
                    found: other.to_string(),
                    pos,
                });
            }
        };
        Ok(operand)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(p: &str) -> Operand {
        Operand::Path(p.to_string())
    }

    #[test]
    fn test_single_comparison() {
        assert_eq!(
            parse("amount > 5000").unwrap(),
            Expr::Compare {
                left: path("amount"),
                op: CompareOp::Gt,
                right: Operand::Literal(serde_json::json!(5000)),
            }
        );
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let expr = parse("a or b and c").unwrap();
        assert_eq!(
            expr,
            Expr::Or(
                Box::new(Expr::Truthy(path("a"))),
                Box::new(Expr::And(
                    Box::new(Expr::Truthy(path("b"))),
                    Box::new(Expr::Truthy(path("c"))),
                )),
            )
        );
    }

    #[test]
    fn test_parentheses_override_precedence() {
        let expr = parse("(a or b) and c").unwrap();
        assert!(matches!(expr, Expr::And(_, _)));
    }

    #[test]
    fn test_trailing_tokens_rejected() {
        assert!(matches!(
            parse("a == 1 2"),
            Err(ExprError::UnexpectedToken { .. })
        ));
    }

    #[test]
    fn test_missing_operand() {
        assert_eq!(parse("amount >"), Err(ExprError::UnexpectedEnd));
    }

    #[test]
    fn test_nesting_depth_is_capped() {
        let nested = |n: usize| format!("{}a{}", "(".repeat(n), ")".repeat(n));

        assert_eq!(parse(&nested(200)), Err(ExprError::TooDeep(MAX_DEPTH)));
        assert_eq!(
            parse(&format!("{}a", "not ".repeat(200))),
            Err(ExprError::TooDeep(MAX_DEPTH))
        );
        assert!(parse(&nested(MAX_DEPTH)).is_ok());

        // Far past both limits: rejected without recursing.
        assert!(matches!(
            parse(&nested(100_000)),
            Err(ExprError::TooLong(_) | ExprError::TooDeep(_))
        ));
    }

    #[test]
    fn test_long_chain_is_rejected() {
        let chain = vec!["a"; 100_000].join(" and ");
        assert_eq!(parse(&chain), Err(ExprError::TooLong(MAX_TOKENS)));
    }

    #[test]
    fn test_unbalanced_parenthesis() {
        assert_eq!(parse("(a and b"), Err(ExprError::UnexpectedEnd));
    }
}
