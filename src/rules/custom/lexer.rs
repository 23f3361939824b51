use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;

use super::error::ExprError;

/// Lexical token with its byte offset in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(Decimal),
    Str(String),
    Ident(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    And,
    Or,
    Not,
    In,
    Is,
    Null,
    True,
    False,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Number(n) => write!(f, "number {n}"),
            TokenKind::Str(s) => write!(f, "string '{s}'"),
            TokenKind::Ident(s) => write!(f, "identifier '{s}'"),
            TokenKind::LParen => write!(f, "'('"),
            TokenKind::RParen => write!(f, "')'"),
            TokenKind::LBracket => write!(f, "'['"),
            TokenKind::RBracket => write!(f, "']'"),
            TokenKind::Comma => write!(f, "','"),
            TokenKind::Eq => write!(f, "'=='"),
            TokenKind::Ne => write!(f, "'!='"),
            TokenKind::Lt => write!(f, "'<'"),
            TokenKind::Le => write!(f, "'<='"),
            TokenKind::Gt => write!(f, "'>'"),
            TokenKind::Ge => write!(f, "'>='"),
            TokenKind::Plus => write!(f, "'+'"),
            TokenKind::Minus => write!(f, "'-'"),
            TokenKind::Star => write!(f, "'*'"),
            TokenKind::Slash => write!(f, "'/'"),
            TokenKind::And => write!(f, "'and'"),
            TokenKind::Or => write!(f, "'or'"),
            TokenKind::Not => write!(f, "'not'"),
            TokenKind::In => write!(f, "'in'"),
            TokenKind::Is => write!(f, "'is'"),
            TokenKind::Null => write!(f, "'null'"),
            TokenKind::True => write!(f, "'true'"),
            TokenKind::False => write!(f, "'false'"),
        }
    }
}

/// Split an expression into tokens.
pub fn tokenize(src: &str) -> Result<Vec<Token>, ExprError> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos];
        let start = pos;

        if c.is_ascii_whitespace() {
            pos += 1;
            continue;
        }

        let next = bytes.get(pos + 1).copied();

        let kind = match c {
            b'(' => single(&mut pos, TokenKind::LParen),
            b')' => single(&mut pos, TokenKind::RParen),
            b'[' => single(&mut pos, TokenKind::LBracket),
            b']' => single(&mut pos, TokenKind::RBracket),
            b',' => single(&mut pos, TokenKind::Comma),
            b'+' => single(&mut pos, TokenKind::Plus),
            b'-' => single(&mut pos, TokenKind::Minus),
            b'*' => single(&mut pos, TokenKind::Star),
            b'/' => single(&mut pos, TokenKind::Slash),
            b'=' if next == Some(b'=') => double(&mut pos, TokenKind::Eq),
            b'=' => single(&mut pos, TokenKind::Eq),
            b'!' if next == Some(b'=') => double(&mut pos, TokenKind::Ne),
            b'!' => single(&mut pos, TokenKind::Not),
            b'<' if next == Some(b'=') => double(&mut pos, TokenKind::Le),
            b'<' if next == Some(b'>') => double(&mut pos, TokenKind::Ne),
            b'<' => single(&mut pos, TokenKind::Lt),
            b'>' if next == Some(b'=') => double(&mut pos, TokenKind::Ge),
            b'>' => single(&mut pos, TokenKind::Gt),
            b'&' if next == Some(b'&') => double(&mut pos, TokenKind::And),
            b'|' if next == Some(b'|') => double(&mut pos, TokenKind::Or),
            b'\'' | b'"' => {
                let (text, end) = read_quoted(src, pos, c)?;
                pos = end;
                TokenKind::Str(text)
            }
            b'`' => {
                let (text, end) = read_quoted(src, pos, c)?;
                pos = end;
                TokenKind::Ident(text)
            }
            b'0'..=b'9' | b'.' => {
                while pos < bytes.len() && (bytes[pos].is_ascii_digit() || bytes[pos] == b'.') {
                    pos += 1;
                }
                let text = &src[start..pos];
                let number = Decimal::from_str(text).map_err(|_| ExprError::InvalidNumber {
                    text: text.to_string(),
                    offset: start,
                })?;
                TokenKind::Number(number)
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_')
                {
                    pos += 1;
                }
                keyword_or_ident(&src[start..pos])
            }
            _ => {
                let ch = src[start..].chars().next().unwrap_or('?');
                return Err(ExprError::UnexpectedChar { ch, offset: start });
            }
        };

        tokens.push(Token {
            kind,
            offset: start,
        });
    }

    Ok(tokens)
}

fn single(pos: &mut usize, kind: TokenKind) -> TokenKind {
    *pos += 1;
    kind
}

fn double(pos: &mut usize, kind: TokenKind) -> TokenKind {
    *pos += 2;
    kind
}

/// Read a quoted run starting at `start`; a doubled quote escapes itself.
fn read_quoted(src: &str, start: usize, quote: u8) -> Result<(String, usize), ExprError> {
    let bytes = src.as_bytes();
    let mut out = String::new();
    let mut pos = start + 1;
    let mut run_start = pos;

    while pos < bytes.len() {
        if bytes[pos] == quote {
            out.push_str(&src[run_start..pos]);
            if bytes.get(pos + 1) == Some(&quote) {
                out.push(quote as char);
                pos += 2;
                run_start = pos;
                continue;
            }
            return Ok((out, pos + 1));
        }
        pos += 1;
    }

    Err(ExprError::UnterminatedString { offset: start })
}

fn keyword_or_ident(word: &str) -> TokenKind {
    match word.to_ascii_lowercase().as_str() {
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "not" => TokenKind::Not,
        "in" => TokenKind::In,
        "is" => TokenKind::Is,
        "null" => TokenKind::Null,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        _ => TokenKind::Ident(word.to_string()),
    }
}
