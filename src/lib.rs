//! Crate root: wires together the compilation pipeline.
//!
//! - `tokenizer` performs lexical analysis and produces a flat token stream.
//! - `parser` owns all syntactic knowledge and returns the program AST.
//! - `symbols` resolves every function's variables to stack-frame offsets.
//! - `codegen` lowers the resolved program into NASM x86-64 assembly.
//! - `platform` supplies symbol naming and the surrounding boilerplate.
//! - `format` renders an AST back to canonical source.
//! - `error` centralises the diagnostics shared by the other modules.

pub mod error;
pub mod format;
pub mod parser;
pub mod platform;
pub mod symbols;
pub mod tokenizer;
pub mod ty;

mod codegen;

use tracing::debug;

pub use error::{CompileError, CompileResult};
pub use parser::Program;
pub use platform::{Platform, Target};

/// Knobs for one compilation run.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
  pub platform: Platform,
  /// Treat names no function declares as zero-initialised globals.
  pub legacy_globals: bool,
}

/// Tokenize and parse a source string.
pub fn parse_program(source: &str) -> CompileResult<Program> {
  let tokens = tokenizer::tokenize(source)?;
  debug!(tokens = tokens.len(), "tokenized source");
  let program = parser::parse(tokens, source)?;
  debug!(functions = program.functions.len(), "parsed program");
  Ok(program)
}

/// Compile a source string into NASM assembly.
pub fn generate_assembly(source: &str, options: &CompileOptions) -> CompileResult<String> {
  let program = parse_program(source)?;
  let symbols = symbols::ProgramSymbols::resolve(&program, options.legacy_globals)?;
  codegen::generate(&program, &symbols, &options.platform)
}

/// Parse a source string and render it in canonical layout.
pub fn reformat(source: &str) -> CompileResult<String> {
  let program = parse_program(source)?;
  Ok(format::program(&program))
}
