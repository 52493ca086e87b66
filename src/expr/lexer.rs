//! Tokenizer for transition conditions.

use serde_json::Number;

use super::ExprError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Variable reference, possibly dotted (`applicant.age`).
    Path(String),
    /// Integers stay exact; anything with a fraction is an f64.
    Number(Number),
    Str(String),
    True,
    False,
    Null,
    And,
    Or,
    Not,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LParen,
    RParen,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Path(p) => write!(f, "'{}'", p),
            Token::Number(n) => write!(f, "{}", n),
            Token::Str(s) => write!(f, "\"{}\"", s),
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::Null => write!(f, "null"),
            Token::And => write!(f, "and"),
            Token::Or => write!(f, "or"),
            Token::Not => write!(f, "not"),
            Token::Eq => write!(f, "=="),
            Token::Ne => write!(f, "!="),
            Token::Lt => write!(f, "<"),
            Token::Le => write!(f, "<="),
            Token::Gt => write!(f, ">"),
            Token::Ge => write!(f, ">="),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
        }
    }
}

/// A token and its byte offset in the source.
pub type Spanned = (Token, usize);

pub fn tokenize(input: &str) -> Result<Vec<Spanned>, ExprError> {
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    let peek = |i: usize| chars.get(i).map(|(_, c)| *c);

    while let Some(&(pos, ch)) = chars.get(i) {
        match ch {
            c if c.is_whitespace() => {
                i += 1;
            }
            '(' => {
                tokens.push((Token::LParen, pos));
                i += 1;
            }
            ')' => {
                tokens.push((Token::RParen, pos));
                i += 1;
            }
            '=' if peek(i + 1) == Some('=') => {
                tokens.push((Token::Eq, pos));
                i += 2;
            }
            '!' if peek(i + 1) == Some('=') => {
                tokens.push((Token::Ne, pos));
                i += 2;
            }
            '!' => {
                tokens.push((Token::Not, pos));
                i += 1;
            }
            '<' if peek(i + 1) == Some('=') => {
                tokens.push((Token::Le, pos));
                i += 2;
            }
            '<' => {
                tokens.push((Token::Lt, pos));
                i += 1;
            }
            '>' if peek(i + 1) == Some('=') => {
                tokens.push((Token::Ge, pos));
                i += 2;
            }
            '>' => {
                tokens.push((Token::Gt, pos));
                i += 1;
            }
            '&' if peek(i + 1) == Some('&') => {
                tokens.push((Token::And, pos));
                i += 2;
            }
            '|' if peek(i + 1) == Some('|') => {
                tokens.push((Token::Or, pos));
                i += 2;
            }
            '\'' | '"' => {
                let quote = ch;
                let mut text = String::new();
                let mut j = i + 1;
                loop {
                    match peek(j) {
                        None => return Err(ExprError::UnterminatedString(pos)),
                        Some('\\') if matches!(peek(j + 1), Some(c) if c == quote || c == '\\') => {
                            text.push(chars[j + 1].1);
                            j += 2;
                        }
                        Some(c) if c == quote => break,
                        Some(c) => {
                            text.push(c);
                            j += 1;
                        }
                    }
                }
                tokens.push((Token::Str(text), pos));
                i = j + 1;
            }
            c if c.is_ascii_digit()
                || (c == '-' && matches!(peek(i + 1), Some(d) if d.is_ascii_digit())) =>
            {
                let mut j = i + 1;
                while matches!(peek(j), Some(d) if d.is_ascii_digit() || d == '.') {
                    j += 1;
                }
                let end = chars.get(j).map(|(p, _)| *p).unwrap_or(input.len());
                let raw = &input[pos..end];
                let value = number_literal(raw)
                    .ok_or_else(|| ExprError::InvalidNumber(raw.to_string()))?;
                tokens.push((Token::Number(value), pos));
                i = j;
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut j = i + 1;
                while matches!(peek(j), Some(d) if d.is_alphanumeric() || d == '_' || d == '.') {
                    j += 1;
                }
                let end = chars.get(j).map(|(p, _)| *p).unwrap_or(input.len());
                let word = &input[pos..end];
                let token = match word {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    _ => {
                        if word.ends_with('.') || word.contains("..") {
                            return Err(ExprError::UnexpectedChar { ch: '.', pos: end - 1 });
                        }
                        Token::Path(word.to_string())
                    }
                };
                tokens.push((token, pos));
                i = j;
            }
            other => return Err(ExprError::UnexpectedChar { ch: other, pos }),
        }
    }

    Ok(tokens)
}

fn number_literal(raw: &str) -> Option<Number> {
    if !raw.contains('.') {
        if let Ok(n) = raw.parse::<i64>() {
            return Some(n.into());
        }
        if let Ok(n) = raw.parse::<u64>() {
            return Some(n.into());
        }
    }
    raw.parse::<f64>().ok().and_then(Number::from_f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<Token> {
        tokenize(input).unwrap().into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn test_comparison_tokens() {
        assert_eq!(
            kinds("amount >= 5000"),
            vec![Token::Path("amount".into()), Token::Ge, Token::Number(5000.into())]
        );
    }

    #[test]
    fn test_keywords_and_symbols() {
        assert_eq!(
            kinds("a && !b || not c and d or e"),
            vec![
                Token::Path("a".into()),
                Token::And,
                Token::Not,
                Token::Path("b".into()),
                Token::Or,
                Token::Not,
                Token::Path("c".into()),
                Token::And,
                Token::Path("d".into()),
                Token::Or,
                Token::Path("e".into()),
            ]
        );
    }

    #[test]
    fn test_strings_and_negative_numbers() {
        assert_eq!(
            kinds(r#"kind == 'it\'s' and delta > -2.5"#),
            vec![
                Token::Path("kind".into()),
                Token::Eq,
                Token::Str("it's".into()),
                Token::And,
                Token::Path("delta".into()),
                Token::Gt,
                Token::Number(Number::from_f64(-2.5).unwrap()),
            ]
        );
    }

    #[test]
    fn test_large_integers_stay_exact() {
        assert_eq!(
            kinds("id == 9007199254740993"),
            vec![
                Token::Path("id".into()),
                Token::Eq,
                Token::Number(9007199254740993u64.into()),
            ]
        );
        assert!(matches!(
            tokenize("x > 1.2.3"),
            Err(ExprError::InvalidNumber(_))
        ));
    }

    #[test]
    fn test_rejects_call_syntax() {
        assert!(matches!(
            tokenize("__import__('os').system('ls')"),
            Err(ExprError::UnexpectedChar { .. })
        ));
    }

    #[test]
    fn test_unterminated_string() {
        assert_eq!(
            tokenize("name == 'abc"),
            Err(ExprError::UnterminatedString(8))
        );
    }
}
