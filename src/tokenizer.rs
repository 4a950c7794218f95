//! Lexical analysis: turns the raw input string into a vector of tokens.
//!
//! Multi-character punctuators are matched before single-character ones to
//! avoid ambiguity. Comments at a statement boundary are kept as tokens so
//! the pretty-printer can re-emit them. `(*` only opens a comment there,
//! otherwise `(*p)` would be swallowed.

use crate::error::{CompileError, CompileResult};

/// Reserved words of the language.
pub const KEYWORDS: [&str; 8] = [
  "int",
  "char",
  "while",
  "if",
  "else",
  "printf",
  "giveMeBack",
  "getMeVar",
];

/// Kinds of tokens recognised by the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
  Ident,
  Keyword,
  Punctuator,
  Num,
  Comment,
  Eof,
}

/// Thin wrapper for lexical information needed by later stages.
#[derive(Debug, Clone)]
pub struct Token {
  pub kind: TokenKind,
  /// Magnitude of a numeric literal. Any sign is applied by the parser.
  pub value: Option<u64>,
  pub loc: usize,
  pub len: usize,
}

impl Token {
  pub fn new(kind: TokenKind, loc: usize, len: usize, value: Option<u64>) -> Self {
    Self {
      kind,
      value,
      loc,
      len,
    }
  }
}

/// True when the previous token leaves us where a statement or function
/// definition can start.
fn at_statement_boundary(tokens: &[Token], input: &str) -> bool {
  match tokens.last() {
    None => true,
    Some(token) if token.kind == TokenKind::Comment => true,
    Some(token) if token.kind == TokenKind::Punctuator => {
      matches!(token_text(token, input), ";" | "{" | "}")
    }
    Some(_) => false,
  }
}

/// Lex the input into a flat vector of tokens terminated by an `Eof` marker.
pub fn tokenize(input: &str) -> CompileResult<Vec<Token>> {
  let mut tokens = Vec::new();
  let bytes = input.as_bytes();
  let mut i = 0;

  while i < bytes.len() {
    let c = bytes[i];
    if c.is_ascii_whitespace() {
      i += 1;
      continue;
    }

    if input[i..].starts_with("//") {
      let end = input[i..].find('\n').map_or(input.len(), |n| i + n);
      // Mid-statement line comments carry nothing worth keeping.
      if at_statement_boundary(&tokens, input) {
        tokens.push(Token::new(TokenKind::Comment, i, end - i, None));
      }
      i = end;
      continue;
    }

    if input[i..].starts_with("(*") && at_statement_boundary(&tokens, input) {
      let Some(close) = input[i + 2..].find("*)") else {
        return Err(CompileError::at(input, i, "unterminated comment"));
      };
      let end = i + 2 + close + 2;
      tokens.push(Token::new(TokenKind::Comment, i, end - i, None));
      i = end;
      continue;
    }

    if c.is_ascii_digit() {
      let start = i;
      i += 1;
      while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
      }
      let text = &input[start..i];
      let value = text
        .parse::<u64>()
        .map_err(|err| CompileError::at(input, start, format!("invalid number: {err}")))?;
      tokens.push(Token::new(TokenKind::Num, start, i - start, Some(value)));
      continue;
    }

    if c.is_ascii_alphabetic() {
      let start = i;
      i += 1;
      while i < bytes.len() && bytes[i].is_ascii_alphanumeric() {
        i += 1;
      }
      let kind = if KEYWORDS.contains(&&input[start..i]) {
        TokenKind::Keyword
      } else {
        TokenKind::Ident
      };
      tokens.push(Token::new(kind, start, i - start, None));
      continue;
    }

    if let Some(op) = ["==", "!=", "<=", ">="]
      .into_iter()
      .find(|op| input[i..].starts_with(op))
    {
      tokens.push(Token::new(TokenKind::Punctuator, i, op.len(), None));
      i += op.len();
      continue;
    }

    if matches!(
      c,
      b'+'
        | b'-'
        | b'*'
        | b'/'
        | b'&'
        | b'('
        | b')'
        | b'{'
        | b'}'
        | b'<'
        | b'>'
        | b'='
        | b';'
        | b','
    ) {
      tokens.push(Token::new(TokenKind::Punctuator, i, 1, None));
      i += 1;
      continue;
    }

    let invalid_char = input[i..].chars().next().unwrap_or('\0');
    return Err(CompileError::at(
      input,
      i,
      format!("invalid token: '{invalid_char}'"),
    ));
  }

  tokens.push(Token::new(TokenKind::Eof, input.len(), 0, None));
  Ok(tokens)
}

/// Return the slice from the source that produced this token.
pub fn token_text<'a>(token: &Token, source: &'a str) -> &'a str {
  let end = token.loc + token.len;
  &source[token.loc..end]
}

/// Human-friendly description used in diagnostics.
pub fn describe_token(token: Option<&Token>, source: &str) -> String {
  match token {
    Some(t) => match t.kind {
      TokenKind::Eof => "EOF".to_string(),
      _ => token_text(t, source).to_string(),
    },
    None => "EOF".to_string(),
  }
}
