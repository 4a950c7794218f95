//! Symbol resolution: per-function variable tables and stack-frame offsets.
//!
//! Arguments are pushed by the caller in declaration order, so with `N`
//! parameters the first one lives at `rbp + 8*(N+1)` and the last at
//! `rbp + 16`. Locals grow downwards from `rbp` by their storage width, in
//! the order their declaring statement first appears in the body.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, warn};

use crate::error::{CompileResult, UnsupportedConstructSnafu};
use crate::parser::{Expr, Function, Program, Stmt};
use crate::ty::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
  Param,
  Local,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
  pub name: String,
  pub ty: Type,
  pub role: Role,
  /// Byte offset from the frame base (`rbp`).
  pub offset: i64,
}

/// Ordered variable table of one function: parameters first, then locals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameLayout {
  vars: Vec<Variable>,
  index: HashMap<String, usize>,
  param_count: usize,
  locals_size: i64,
}

impl FrameLayout {
  /// Build the table and offsets for `func`. Never fails: a redeclared
  /// identifier keeps its first declaration.
  pub fn resolve(func: &Function) -> Self {
    let mut layout = Self {
      vars: Vec::new(),
      index: HashMap::new(),
      param_count: func.params.len(),
      locals_size: 0,
    };

    let n = func.params.len() as i64;
    for (i, param) in func.params.iter().enumerate() {
      layout.insert(&func.name, &param.name, param.ty, Role::Param, 8 * (n + 1 - i as i64));
    }

    let mut decls = Vec::new();
    collect_decls(&func.body, &mut decls);
    for (name, ty) in decls {
      let offset = -(layout.locals_size + ty.size());
      if layout.insert(&func.name, name, ty, Role::Local, offset) {
        layout.locals_size += ty.size();
      }
    }

    debug!(
      function = %func.name,
      params = layout.param_count,
      locals = layout.vars.len() - layout.param_count,
      frame = layout.frame_size(),
      "resolved frame layout"
    );
    layout
  }

  fn insert(&mut self, function: &str, name: &str, ty: Type, role: Role, offset: i64) -> bool {
    if self.index.contains_key(name) {
      warn!(function, name, "identifier declared more than once, keeping the first declaration");
      return false;
    }
    self.index.insert(name.to_string(), self.vars.len());
    self.vars.push(Variable {
      name: name.to_string(),
      ty,
      role,
      offset,
    });
    true
  }

  pub fn get(&self, name: &str) -> Option<&Variable> {
    self.index.get(name).map(|&i| &self.vars[i])
  }

  /// Variables in table order.
  pub fn iter(&self) -> impl Iterator<Item = &Variable> {
    self.vars.iter()
  }

  pub fn param_count(&self) -> usize {
    self.param_count
  }

  /// Bytes the caller pushes for this function's arguments.
  pub fn param_bytes(&self) -> i64 {
    8 * self.param_count as i64
  }

  /// Sum of local storage widths.
  pub fn locals_size(&self) -> i64 {
    self.locals_size
  }

  /// Locals area rounded up to a multiple of 16.
  pub fn frame_size(&self) -> i64 {
    (self.locals_size + 15) / 16 * 16
  }
}

/// Declarations and initialisations in source order, nested blocks included.
fn collect_decls<'a>(stmts: &'a [Stmt], out: &mut Vec<(&'a str, Type)>) {
  for stmt in stmts {
    match stmt {
      Stmt::Decl { ty, name } | Stmt::Init { ty, name, .. } => out.push((name.as_str(), *ty)),
      Stmt::While { body, .. } | Stmt::If { then: body, .. } => collect_decls(body, out),
      Stmt::IfElse {
        then, otherwise, ..
      } => {
        collect_decls(then, out);
        collect_decls(otherwise, out);
      }
      Stmt::Assign { .. }
      | Stmt::DerefAssign { .. }
      | Stmt::Print { .. }
      | Stmt::Read { .. }
      | Stmt::Return { .. }
      | Stmt::Comment { .. } => {}
    }
  }
}

/// Everything codegen needs to know about names in a program.
#[derive(Debug, Clone)]
pub struct ProgramSymbols {
  pub frames: HashMap<String, FrameLayout>,
  /// Free-standing globals, sorted by name.
  pub globals: Vec<String>,
}

impl ProgramSymbols {
  /// Resolve every function. With `legacy_globals`, variable names that no
  /// function declares become zero-initialised globals instead of being
  /// left for codegen to reject.
  pub fn resolve(program: &Program, legacy_globals: bool) -> CompileResult<Self> {
    let mut frames = HashMap::new();
    for func in &program.functions {
      let layout = FrameLayout::resolve(func);
      if frames.insert(func.name.clone(), layout).is_some() {
        return UnsupportedConstructSnafu {
          function: func.name.clone(),
          message: "function is defined more than once",
        }
        .fail();
      }
    }

    let mut globals = BTreeSet::new();
    if legacy_globals {
      for func in &program.functions {
        let frame = &frames[&func.name];
        let mut names = Vec::new();
        collect_var_refs(&func.body, &mut names);
        for name in names.into_iter().filter(|name| frame.get(name).is_none()) {
          if frames.contains_key(name) {
            return UnsupportedConstructSnafu {
              function: func.name.clone(),
              message: format!("`{name}` names a function and cannot be used as a variable"),
            }
            .fail();
          }
          globals.insert(name.to_string());
        }
      }
    }

    Ok(Self {
      frames,
      globals: globals.into_iter().collect(),
    })
  }

  /// The legacy global called `name`, if there is one.
  pub fn global(&self, name: &str) -> Option<&str> {
    self
      .globals
      .binary_search_by(|g| g.as_str().cmp(name))
      .ok()
      .map(|i| self.globals[i].as_str())
  }
}

/// Variable names a function body refers to (not callees).
fn collect_var_refs<'a>(stmts: &'a [Stmt], out: &mut Vec<&'a str>) {
  for stmt in stmts {
    match stmt {
      Stmt::Decl { .. } | Stmt::Comment { .. } => {}
      Stmt::Init { value, .. } | Stmt::Print { value } | Stmt::Return { value } => {
        expr_var_refs(value, out)
      }
      Stmt::Assign { name, value } | Stmt::DerefAssign { name, value, .. } => {
        out.push(name);
        expr_var_refs(value, out);
      }
      Stmt::Read { name } => out.push(name),
      Stmt::While { cond, body } | Stmt::If { cond, then: body } => {
        expr_var_refs(cond, out);
        collect_var_refs(body, out);
      }
      Stmt::IfElse {
        cond,
        then,
        otherwise,
      } => {
        expr_var_refs(cond, out);
        collect_var_refs(then, out);
        collect_var_refs(otherwise, out);
      }
    }
  }
}

fn expr_var_refs<'a>(expr: &'a Expr, out: &mut Vec<&'a str>) {
  match expr {
    Expr::Num { .. } => {}
    Expr::Var { name } | Expr::AddrOf { name } | Expr::Deref { name, .. } => out.push(name),
    Expr::Binary { lhs, rhs, .. } | Expr::Compare { lhs, rhs, .. } => {
      expr_var_refs(lhs, out);
      expr_var_refs(rhs, out);
    }
    Expr::Neg { operand: inner } | Expr::Paren { inner } => expr_var_refs(inner, out),
    Expr::Call { args, .. } => args.iter().for_each(|arg| expr_var_refs(arg, out)),
  }
}
