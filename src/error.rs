//! Shared error utilities used across the compilation pipeline.
//!
//! Syntax diagnostics point at the offending byte with a caret under the
//! source line. Every other kind names the function and identifier involved,
//! since codegen failures have no single byte to blame.

use snafu::Snafu;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CompileError {
  #[snafu(display("{line}:{column}: {message}\n{source_line}\n{marker}"))]
  Syntax {
    line: usize,
    column: usize,
    source_line: String,
    marker: String,
    message: String,
  },

  #[snafu(display("in function `{function}`: unknown identifier `{name}`"))]
  UnknownIdentifier { function: String, name: String },

  #[snafu(display(
    "call to `{callee}` passes {found} argument(s), but it declares {expected} parameter(s)"
  ))]
  ArityMismatch {
    callee: String,
    expected: usize,
    found: usize,
  },

  #[snafu(display("in function `{function}`: {message}"))]
  UnsupportedConstruct { function: String, message: String },
}

impl CompileError {
  /// Construct a syntax error anchored at a specific byte offset in the source.
  pub fn at(source: &str, loc: usize, message: impl Into<String>) -> Self {
    let safe_loc = loc.min(source.len());
    let line_start = source[..safe_loc].rfind('\n').map_or(0, |i| i + 1);
    let line_end = source[safe_loc..]
      .find('\n')
      .map_or(source.len(), |i| safe_loc + i);
    let line = source[..line_start].matches('\n').count() + 1;
    let column = source[line_start..safe_loc].chars().count() + 1;
    let marker = format!("{}^", " ".repeat(column - 1));
    Self::Syntax {
      line,
      column,
      source_line: source[line_start..line_end].to_string(),
      marker,
      message: message.into(),
    }
  }

  /// Short machine-friendly name of the error kind.
  pub fn kind(&self) -> &'static str {
    match self {
      Self::Syntax { .. } => "SyntaxError",
      Self::UnknownIdentifier { .. } => "UnknownIdentifier",
      Self::ArityMismatch { .. } => "ArityMismatch",
      Self::UnsupportedConstruct { .. } => "UnsupportedConstruct",
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn caret_points_at_column_on_second_line() {
    let src = "int main() {\n  x = ;\n}";
    let loc = src.find(';').unwrap();
    let err = CompileError::at(src, loc, "expected an expression");
    let CompileError::Syntax {
      line,
      column,
      source_line,
      marker,
      ..
    } = &err
    else {
      panic!("expected a syntax error, got {err:?}");
    };
    assert_eq!(*line, 2);
    assert_eq!(*column, 7);
    assert_eq!(source_line, "  x = ;");
    assert_eq!(marker, "      ^");
    assert_eq!(err.kind(), "SyntaxError");
  }

  #[test]
  fn location_past_end_is_clamped() {
    let err = CompileError::at("int", 99, "unexpected end of input");
    assert!(err.to_string().starts_with("1:4: unexpected end of input"));
  }
}
