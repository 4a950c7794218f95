//! Target configuration: symbol naming and the text generated code is
//! spliced into.
//!
//! Emitted assembly is NASM syntax. The data section always defines three
//! format strings the code generator refers to by name. Their labels start
//! with `_`, which no source identifier can, so program symbols never
//! collide with them.

use std::fmt;

/// Data label of the `printf` format.
pub const PRINT_FORMAT: &str = "__fmt";
/// Data label of the format for 8-byte reads.
pub const READ_FORMAT: &str = "__read";
/// Data label of the format for `char` reads.
pub const READ_CHAR_FORMAT: &str = "__readc";

/// Supported object formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
  Linux,
  MacOs,
}

impl Target {
  /// Target of the machine running the compiler.
  pub fn host() -> Self {
    if cfg!(target_os = "macos") {
      Target::MacOs
    } else {
      Target::Linux
    }
  }
}

impl fmt::Display for Target {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Target::Linux => f.write_str("linux"),
      Target::MacOs => f.write_str("macos"),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
  pub target: Target,
  /// Prepended to every function and runtime symbol.
  pub symbol_prefix: &'static str,
  pub print_routine: &'static str,
  pub read_routine: &'static str,
  /// Appended to calls into the C runtime.
  pub extern_call_suffix: &'static str,
}

impl Platform {
  pub fn host() -> Self {
    Self::for_target(Target::host())
  }

  pub fn for_target(target: Target) -> Self {
    match target {
      Target::Linux => Self {
        target,
        symbol_prefix: "",
        print_routine: "printf",
        read_routine: "__isoc99_scanf",
        extern_call_suffix: " wrt ..plt",
      },
      Target::MacOs => Self {
        target,
        symbol_prefix: "_",
        print_routine: "printf",
        read_routine: "scanf",
        extern_call_suffix: "",
      },
    }
  }

  /// Assembly name of a function defined by the program. The `$` marks it
  /// as an identifier, so names like `test` or `loop` are not read as
  /// instructions.
  pub fn symbol(&self, name: &str) -> String {
    format!("${}{name}", self.symbol_prefix)
  }

  /// Linker name of a C runtime routine.
  pub fn runtime_symbol(&self, routine: &str) -> String {
    format!("{}{routine}", self.symbol_prefix)
  }

  /// Operand of a `call` into the C runtime.
  pub fn runtime_call(&self, routine: &str) -> String {
    format!("{}{}", self.runtime_symbol(routine), self.extern_call_suffix)
  }

  /// True when a program function would define a runtime routine's symbol.
  pub fn shadows_runtime(&self, name: &str) -> bool {
    name == self.print_routine || name == self.read_routine
  }

  /// Everything before the global data declarations.
  pub fn preamble(&self) -> String {
    format!(
      "extern {print}, {read}\n\
       global {main}\n\
       default rel\n\
       section .data\n\
       \n\
       {PRINT_FORMAT} :\n   db \"%ld\", 10, 0\n\
       {READ_FORMAT} :\n   db \"%ld\", 0\n\
       {READ_CHAR_FORMAT} :\n   db \"%hhd\", 0\n",
      print = self.runtime_symbol(self.print_routine),
      read = self.runtime_symbol(self.read_routine),
      main = self.runtime_symbol("main"),
    )
  }

  /// Label opening the code section.
  pub fn text_section(&self) -> &'static str {
    "\nsection .text\n\n"
  }

  pub fn trailer(&self) -> &'static str {
    match self.target {
      Target::Linux => "section .note.GNU-stack noalloc noexec nowrite progbits\n",
      Target::MacOs => "",
    }
  }
}

impl Default for Platform {
  fn default() -> Self {
    Self::host()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn macos_prefixes_every_symbol() {
    let platform = Platform::for_target(Target::MacOs);
    assert_eq!(platform.symbol("main"), "$_main");
    assert_eq!(platform.runtime_call("printf"), "_printf");
    assert!(platform.shadows_runtime("scanf"));
    let preamble = platform.preamble();
    assert!(preamble.starts_with("extern _printf, _scanf\nglobal _main\n"));
    assert!(platform.trailer().is_empty());
  }

  #[test]
  fn linux_calls_through_the_plt() {
    let platform = Platform::for_target(Target::Linux);
    assert_eq!(platform.symbol("test"), "$test");
    assert!(!platform.shadows_runtime("scanf"));
    assert_eq!(
      platform.runtime_call(platform.read_routine),
      "__isoc99_scanf wrt ..plt"
    );
    let preamble = platform.preamble();
    assert!(preamble.contains("\n__fmt :\n   db \"%ld\", 10, 0\n"));
    assert!(preamble.contains("\n__read :\n   db \"%ld\", 0\n"));
    assert!(preamble.contains("\n__readc :\n   db \"%hhd\", 0\n"));
    assert!(platform.trailer().contains("GNU-stack"));
  }
}
