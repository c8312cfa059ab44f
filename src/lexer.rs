//! Formula tokenizer.
//!
//! Produces a flat token list; the parser decides what identifiers mean
//! (unit suffix, function name, member, scope lookup).

use crate::errors::FormulaError;

/// Known operator spellings, longest first so matching is maximal.
pub const OPERATORS: &[&str] = &[
    "==", "!=", "<=", ">=", "&&", "||", "+", "-", "*", "/", "<", ">", "!", "(", ")", ",", ".",
];

const SYMBOL_CHARS: &str = "=!<>&|+-*/(),.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Number,
    String,
    Identifier,
    Operator,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Byte offset of the first character in the formula
    pub offset: usize,
    pub kind: TokenKind,
    /// Literal text; for strings, the unescaped contents
    pub text: String,
}

impl Token {
    fn new(offset: usize, kind: TokenKind, text: impl Into<String>) -> Self {
        Token {
            offset,
            kind,
            text: text.into(),
        }
    }

    pub fn is_operator(&self, op: &str) -> bool {
        self.kind == TokenKind::Operator && self.text == op
    }
}

/// Split formula text into tokens.
pub fn tokenize(text: &str) -> Result<Vec<Token>, FormulaError> {
    Lexer::new(text).collect()
}

struct Lexer<'input> {
    input: &'input str,
    pos: usize,
}

impl<'input> Lexer<'input> {
    fn new(input: &'input str) -> Self {
        Lexer { input, pos: 0 }
    }

    fn rest(&self) -> &'input str {
        &self.input[self.pos..]
    }

    fn skip_whitespace(&mut self) {
        let skipped: usize = self
            .rest()
            .chars()
            .take_while(|c| c.is_whitespace())
            .map(char::len_utf8)
            .sum();
        self.pos += skipped;
    }

    fn take_identifier(&mut self) -> Token {
        let start = self.pos;
        let len: usize = self
            .rest()
            .chars()
            .take_while(|&c| c.is_alphanumeric() || c == '_')
            .map(char::len_utf8)
            .sum();
        self.pos += len;
        Token::new(start, TokenKind::Identifier, &self.input[start..self.pos])
    }

    fn take_number(&mut self) -> Token {
        let start = self.pos;
        let bytes = self.rest().as_bytes();
        let mut end = 0;
        let mut seen_point = false;
        while end < bytes.len() {
            match bytes[end] {
                b'0'..=b'9' => end += 1,
                b'.' if !seen_point => {
                    seen_point = true;
                    end += 1;
                }
                _ => break,
            }
        }
        self.pos += end;
        Token::new(start, TokenKind::Number, &self.input[start..self.pos])
    }

    fn take_string(&mut self) -> Result<Token, FormulaError> {
        let start = self.pos;
        let mut value = String::new();
        let mut chars = self.input[start + 1..].char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '"' => {
                    self.pos = start + 1 + i + 1;
                    return Ok(Token::new(start, TokenKind::String, value));
                }
                '\\' => match chars.next() {
                    Some((_, '"')) => value.push('"'),
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, 't')) => value.push('\t'),
                    Some((_, '\\')) => value.push('\\'),
                    Some((_, other)) => {
                        return Err(FormulaError::lex(
                            start + 1 + i,
                            format!("unknown escape '\\{other}'"),
                        ));
                    }
                    None => break,
                },
                _ => value.push(c),
            }
        }
        Err(FormulaError::lex(start, "unterminated string literal"))
    }

    fn take_operator(&mut self) -> Result<Token, FormulaError> {
        let start = self.pos;
        let run: usize = self
            .rest()
            .chars()
            .take_while(|c| SYMBOL_CHARS.contains(*c))
            .map(char::len_utf8)
            .sum();
        let run = &self.rest()[..run];
        match OPERATORS.iter().find(|op| run.starts_with(**op)) {
            Some(op) => {
                self.pos += op.len();
                Ok(Token::new(start, TokenKind::Operator, *op))
            }
            None => Err(FormulaError::lex(start, format!("unknown operator '{run}'"))),
        }
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<Token, FormulaError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.skip_whitespace();
        let c = self.rest().chars().next()?;
        let next_is_digit = self.rest()[c.len_utf8()..]
            .starts_with(|n: char| n.is_ascii_digit());

        let token = match c {
            c if c.is_alphabetic() || c == '_' => Ok(self.take_identifier()),
            '0'..='9' => Ok(self.take_number()),
            '.' if next_is_digit => Ok(self.take_number()),
            '"' => self.take_string(),
            c if SYMBOL_CHARS.contains(c) => self.take_operator(),
            other => {
                let offset = self.pos;
                // Stop iteration after the first error.
                self.pos = self.input.len();
                return Some(Err(FormulaError::lex(
                    offset,
                    format!("unexpected character '{other}'"),
                )));
            }
        };
        if token.is_err() {
            self.pos = self.input.len();
        }
        Some(token)
    }
}
