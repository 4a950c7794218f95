//! Code generation: lower the resolved AST into NASM x86-64 assembly.
//!
//! Every expression leaves its value in `rax`; binary operators park the
//! right operand on the stack while the left one is evaluated. Arguments
//! are passed on the stack in declaration order and popped by the caller.
//!
//! Frame shape, from `rbp` downwards: locals rounded up to 16 bytes, then a
//! 16-byte scratch reserve (`push rdi` / `push rsi`). At statement level
//! `rsp` is therefore 16-byte aligned; calls made with values pending on
//! the stack get one word of padding so the callee sees the same alignment.

use snafu::{OptionExt, ensure};
use tracing::{debug, trace};

use crate::error::{
  ArityMismatchSnafu, CompileResult, UnknownIdentifierSnafu, UnsupportedConstructSnafu,
};
use crate::parser::{BinaryOp, CmpOp, Expr, Function, Program, Stmt};
use crate::platform::{PRINT_FORMAT, Platform, READ_CHAR_FORMAT, READ_FORMAT};
use crate::symbols::{FrameLayout, ProgramSymbols, Variable};
use crate::ty::Type;

/// Emit assembly for a whole program.
pub fn generate(
  program: &Program,
  symbols: &ProgramSymbols,
  platform: &Platform,
) -> CompileResult<String> {
  let mut labels = Labels::default();
  let mut functions = String::new();
  for func in &program.functions {
    ensure!(
      !platform.shadows_runtime(&func.name),
      UnsupportedConstructSnafu {
        function: func.name.as_str(),
        message: format!("function name clashes with the C runtime on {}", platform.target),
      }
    );
    let frame = symbols
      .frames
      .get(&func.name)
      .context(UnknownIdentifierSnafu {
        function: func.name.as_str(),
        name: func.name.as_str(),
      })?;
    let body = FunctionEmitter::new(platform, symbols, func, frame, &mut labels).emit()?;
    functions.push_str(&body);
  }
  debug!(
    functions = program.functions.len(),
    globals = symbols.globals.len(),
    labels = labels.next,
    "generated program"
  );

  let mut asm = platform.preamble();
  for global in &symbols.globals {
    asm.push_str(&format!("${global} : dq 0\n"));
  }
  asm.push_str(platform.text_section());
  asm.push_str(&functions);
  asm.push_str(platform.trailer());
  Ok(asm)
}

/// Source of label numbers, unique across one compilation run.
#[derive(Debug, Default)]
pub struct Labels {
  next: usize,
}

impl Labels {
  pub fn fresh(&mut self) -> usize {
    let n = self.next;
    self.next += 1;
    n
  }
}

/// Where a named value lives.
#[derive(Debug, Clone, Copy)]
enum Slot<'v> {
  Frame(&'v Variable),
  Global(&'v str),
}

impl Slot<'_> {
  fn ty(&self) -> Type {
    match self {
      Slot::Frame(var) => var.ty,
      Slot::Global(_) => Type::int(),
    }
  }

  /// Memory operand addressing the slot.
  fn operand(&self) -> String {
    match self {
      Slot::Frame(var) => format!("[rbp{:+}]", var.offset),
      Slot::Global(name) => format!("[rel ${name}]"),
    }
  }
}

/// Typed state of one dereference chain. Built when a chain is emitted and
/// dropped with it, so sibling subexpressions never observe it.
struct DerefChain<'v> {
  base: Slot<'v>,
  /// Pointers followed once the chain is done.
  levels: usize,
}

impl DerefChain<'_> {
  /// Type loaded at hop `level` (1-based).
  fn hop_type(&self, level: usize) -> Option<Type> {
    self.base.ty().deref(level)
  }
}

fn load(ty: Type, src: &str) -> String {
  match ty.size() {
    8 => format!("    mov rax, qword {src}\n"),
    _ => format!("    movsx rax, byte {src}\n"),
  }
}

/// Store the low bytes of `reg` (`rax` or `rbx`) with the width of `ty`.
fn store(ty: Type, dst: &str, reg: &str) -> String {
  match ty.size() {
    8 => format!("    mov qword {dst}, {reg}\n"),
    _ => {
      let low = if reg == "rbx" { "bl" } else { "al" };
      format!("    mov byte {dst}, {low}\n")
    }
  }
}

fn set_instruction(op: CmpOp) -> &'static str {
  match op {
    CmpOp::Eq => "sete",
    CmpOp::Ne => "setne",
    CmpOp::Lt => "setl",
    CmpOp::Le => "setle",
    CmpOp::Gt => "setg",
    CmpOp::Ge => "setge",
  }
}

/// Collapse runs of blank lines left behind by nested blocks.
fn collapse_blank_lines(text: &str) -> String {
  let mut out = String::with_capacity(text.len());
  let mut blank_run = false;
  for line in text.lines() {
    let blank = line.trim().is_empty();
    if blank && blank_run {
      continue;
    }
    blank_run = blank;
    out.push_str(line);
    out.push('\n');
  }
  out
}

struct FunctionEmitter<'a> {
  platform: &'a Platform,
  symbols: &'a ProgramSymbols,
  func: &'a Function,
  frame: &'a FrameLayout,
  labels: &'a mut Labels,
  /// Words pushed by expression evaluation and not yet popped.
  pushed: usize,
  asm: String,
}

impl<'a> FunctionEmitter<'a> {
  fn new(
    platform: &'a Platform,
    symbols: &'a ProgramSymbols,
    func: &'a Function,
    frame: &'a FrameLayout,
    labels: &'a mut Labels,
  ) -> Self {
    Self {
      platform,
      symbols,
      func,
      frame,
      labels,
      pushed: 0,
      asm: String::new(),
    }
  }

  fn emit(mut self) -> CompileResult<String> {
    trace!(function = %self.func.name, "emitting function");
    let name = self.platform.symbol(&self.func.name);
    self.asm.push_str(&format!("{name}:\n"));
    self.asm.push_str("    push rbp\n");
    self.asm.push_str("    mov rbp, rsp\n");
    let frame_size = self.frame.frame_size();
    if frame_size > 0 {
      self.asm.push_str(&format!("    sub rsp, {frame_size}\n"));
    }
    self.asm.push_str("    push rdi\n");
    self.asm.push_str("    push rsi\n");

    let func = self.func;
    self.emit_block(&func.body)?;

    // Falling off the end returns 0 rather than running into the next function.
    if !matches!(func.body.last(), Some(Stmt::Return { .. })) {
      self.asm.push_str("    mov rax, 0\n");
      self.emit_epilogue();
    }
    self.asm.push('\n');
    Ok(collapse_blank_lines(&self.asm))
  }

  fn emit_epilogue(&mut self) {
    self.asm.push_str("    pop rsi\n");
    self.asm.push_str("    pop rdi\n");
    let frame_size = self.frame.frame_size();
    if frame_size > 0 {
      self.asm.push_str(&format!("    add rsp, {frame_size}\n"));
    }
    self.asm.push_str("    pop rbp\n");
    self.asm.push_str("    ret\n");
  }

  fn push(&mut self, reg: &str) {
    self.asm.push_str(&format!("    push {reg}\n"));
    self.pushed += 1;
  }

  fn pop(&mut self, reg: &str) {
    self.asm.push_str(&format!("    pop {reg}\n"));
    self.pushed -= 1;
  }

  fn lookup(&self, name: &str) -> CompileResult<Slot<'a>> {
    if let Some(var) = self.frame.get(name) {
      return Ok(Slot::Frame(var));
    }
    let symbols = self.symbols;
    symbols
      .global(name)
      .map(Slot::Global)
      .context(UnknownIdentifierSnafu {
        function: self.func.name.as_str(),
        name,
      })
  }

  fn unsupported(&self, message: String) -> CompileResult<()> {
    UnsupportedConstructSnafu {
      function: self.func.name.as_str(),
      message,
    }
    .fail()
  }

  fn emit_block(&mut self, stmts: &[Stmt]) -> CompileResult<()> {
    for stmt in stmts {
      self.emit_stmt(stmt)?;
    }
    Ok(())
  }

  fn emit_stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
    match stmt {
      Stmt::Decl { .. } | Stmt::Comment { .. } => {}
      Stmt::Init { name, value, .. } | Stmt::Assign { name, value } => {
        let slot = self.lookup(name)?;
        self.emit_expr(value)?;
        self.asm.push_str(&store(slot.ty(), &slot.operand(), "rax"));
      }
      Stmt::DerefAssign { depth, name, value } => {
        let chain = DerefChain {
          base: self.lookup(name)?,
          levels: depth - 1,
        };
        let Some(target) = chain.base.ty().deref(*depth) else {
          return self.unsupported(format!(
            "`{name}` has pointer depth {}, cannot store through {depth} level(s)",
            chain.base.ty().ptr_depth
          ));
        };
        self.emit_deref(&chain, name)?;
        self.push("rax");
        self.emit_expr(value)?;
        self.asm.push_str("    mov rbx, rax\n");
        self.pop("rax");
        self.asm.push_str(&store(target, "[rax]", "rbx"));
      }
      Stmt::While { cond, body } => {
        let n = self.labels.fresh();
        self.asm.push_str(&format!(".while_{n}:\n"));
        self.emit_expr(cond)?;
        self.asm.push_str("    cmp rax, 0\n");
        self.asm.push_str(&format!("    je .endwhile_{n}\n"));
        self.emit_block(body)?;
        self.asm.push_str(&format!("    jmp .while_{n}\n"));
        self.asm.push_str(&format!(".endwhile_{n}:\n\n"));
      }
      Stmt::If { cond, then } => {
        let n = self.labels.fresh();
        self.emit_expr(cond)?;
        self.asm.push_str("    cmp rax, 0\n");
        self.asm.push_str(&format!("    je .endif_{n}\n"));
        self.emit_block(then)?;
        self.asm.push_str(&format!(".endif_{n}:\n\n"));
      }
      Stmt::IfElse {
        cond,
        then,
        otherwise,
      } => {
        let n = self.labels.fresh();
        self.emit_expr(cond)?;
        self.asm.push_str("    cmp rax, 0\n");
        self.asm.push_str(&format!("    je .altif_{n}\n"));
        self.emit_block(then)?;
        self.asm.push_str(&format!("    jmp .endif_{n}\n"));
        self.asm.push_str(&format!(".altif_{n}:\n"));
        self.emit_block(otherwise)?;
        self.asm.push_str(&format!(".endif_{n}:\n\n"));
      }
      Stmt::Print { value } => {
        self.emit_expr(value)?;
        self.asm.push_str("    mov rsi, rax\n");
        self.asm.push_str(&format!("    lea rdi, [rel {PRINT_FORMAT}]\n"));
        self.asm.push_str("    xor eax, eax\n");
        let call = self.platform.runtime_call(self.platform.print_routine);
        self.asm.push_str(&format!("    call {call}\n"));
      }
      Stmt::Read { name } => {
        let slot = self.lookup(name)?;
        let format = if slot.ty().size() == 1 {
          READ_CHAR_FORMAT
        } else {
          READ_FORMAT
        };
        self.asm.push_str(&format!("    lea rsi, {}\n", slot.operand()));
        self.asm.push_str(&format!("    lea rdi, [rel {format}]\n"));
        self.asm.push_str("    xor eax, eax\n");
        let call = self.platform.runtime_call(self.platform.read_routine);
        self.asm.push_str(&format!("    call {call}\n"));
      }
      Stmt::Return { value } => {
        self.emit_expr(value)?;
        if self.func.ret.size() == 1 {
          self.asm.push_str("    movsx rax, al\n");
        }
        self.emit_epilogue();
        self.asm.push('\n');
      }
    }
    Ok(())
  }

  fn emit_expr(&mut self, expr: &Expr) -> CompileResult<()> {
    match expr {
      Expr::Num { value } => {
        self.asm.push_str(&format!("    mov rax, {value}\n"));
      }
      Expr::Var { name } => {
        let slot = self.lookup(name)?;
        self.asm.push_str(&load(slot.ty(), &slot.operand()));
      }
      Expr::Binary { op, lhs, rhs } => {
        self.emit_operands(lhs, rhs)?;
        match op {
          BinaryOp::Add => self.asm.push_str("    add rax, rbx\n"),
          BinaryOp::Sub => self.asm.push_str("    sub rax, rbx\n"),
          BinaryOp::Mul => self.asm.push_str("    imul rax, rbx\n"),
          BinaryOp::Div => {
            self.asm.push_str("    cqo\n");
            self.asm.push_str("    idiv rbx\n");
          }
        }
      }
      Expr::Compare { op, lhs, rhs } => {
        self.emit_operands(lhs, rhs)?;
        self.asm.push_str("    cmp rax, rbx\n");
        self.asm.push_str(&format!("    {} al\n", set_instruction(*op)));
        self.asm.push_str("    movzx rax, al\n");
      }
      Expr::Neg { operand } => {
        self.emit_expr(operand)?;
        self.asm.push_str("    neg rax\n");
      }
      Expr::AddrOf { name } => {
        let slot = self.lookup(name)?;
        self.asm.push_str(&format!("    lea rax, {}\n", slot.operand()));
      }
      Expr::Deref { depth, name } => {
        let chain = DerefChain {
          base: self.lookup(name)?,
          levels: *depth,
        };
        self.emit_deref(&chain, name)?;
      }
      Expr::Paren { inner } => self.emit_expr(inner)?,
      Expr::Call { callee, args } => self.emit_call(callee, args)?,
    }
    Ok(())
  }

  /// Right operand into `rbx`, left operand into `rax`.
  fn emit_operands(&mut self, lhs: &Expr, rhs: &Expr) -> CompileResult<()> {
    self.emit_expr(rhs)?;
    self.push("rax");
    self.emit_expr(lhs)?;
    self.pop("rbx");
    Ok(())
  }

  /// Load the base pointer, then follow it `chain.levels` times. Hops load
  /// 8 bytes until the last one reaches the scalar type.
  fn emit_deref(&mut self, chain: &DerefChain<'_>, name: &str) -> CompileResult<()> {
    let base_ty = chain.base.ty();
    if !base_ty.is_pointer() {
      return self.unsupported(format!("`{name}` is not a pointer and cannot be dereferenced"));
    }
    if chain.levels > base_ty.ptr_depth {
      return self.unsupported(format!(
        "`{name}` has pointer depth {}, cannot dereference {} level(s)",
        base_ty.ptr_depth, chain.levels
      ));
    }

    self.asm.push_str(&load(base_ty, &chain.base.operand()));
    for level in 1..=chain.levels {
      if let Some(ty) = chain.hop_type(level) {
        self.asm.push_str(&load(ty, "[rax]"));
      }
    }
    Ok(())
  }

  fn emit_call(&mut self, callee: &str, args: &[Expr]) -> CompileResult<()> {
    let symbols = self.symbols;
    let frame = symbols.frames.get(callee).context(UnknownIdentifierSnafu {
      function: self.func.name.as_str(),
      name: callee,
    })?;
    ensure!(
      frame.param_count() == args.len(),
      ArityMismatchSnafu {
        callee,
        expected: frame.param_count(),
        found: args.len(),
      }
    );

    let pad = (self.pushed + args.len()) % 2 == 1;
    if pad {
      self.asm.push_str("    sub rsp, 8\n");
      self.pushed += 1;
    }
    for arg in args {
      self.emit_expr(arg)?;
      self.push("rax");
    }
    let name = self.platform.symbol(callee);
    self.asm.push_str(&format!("    call {name}\n"));

    let popped = frame.param_bytes() + if pad { 8 } else { 0 };
    if popped > 0 {
      self.asm.push_str(&format!("    add rsp, {popped}\n"));
    }
    self.pushed -= args.len() + usize::from(pad);
    Ok(())
  }
}
