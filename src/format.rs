//! Canonical source rendering of a parsed program.
//!
//! Output re-parses to the same AST: parentheses are kept as written and
//! signed literals are printed with their sign attached.

use crate::parser::{Expr, Function, Program, Stmt};

const INDENT: &str = "    ";

pub fn program(program: &Program) -> String {
  let functions: Vec<String> = program.functions.iter().map(function).collect();
  let mut out = functions.join("\n\n");
  out.push('\n');
  out
}

fn function(func: &Function) -> String {
  let params: Vec<String> = func
    .params
    .iter()
    .map(|p| declaration(&p.ty.to_string(), &p.name))
    .collect();
  let mut out = format!(
    "{} {{\n",
    declaration(&func.ret.to_string(), &format!("{}({})", func.name, params.join(", ")))
  );
  block(&func.body, 1, &mut out);
  out.push('}');
  out
}

/// `int x`, `char *p`: stars hug the name.
fn declaration(ty: &str, name: &str) -> String {
  match ty.split_once(' ') {
    Some((base, stars)) => format!("{base} {stars}{name}"),
    None => format!("{ty} {name}"),
  }
}

fn block(stmts: &[Stmt], depth: usize, out: &mut String) {
  for stmt in stmts {
    statement(stmt, depth, out);
  }
}

fn statement(stmt: &Stmt, depth: usize, out: &mut String) {
  let pad = INDENT.repeat(depth);
  let line = match stmt {
    Stmt::Decl { ty, name } => format!("{};", declaration(&ty.to_string(), name)),
    Stmt::Init { ty, name, value } => {
      format!("{} = {};", declaration(&ty.to_string(), name), expr(value))
    }
    Stmt::Assign { name, value } => format!("{name} = {};", expr(value)),
    Stmt::DerefAssign { depth: stars, name, value } => {
      format!("{}{name} = {};", "*".repeat(*stars), expr(value))
    }
    Stmt::Print { value } => format!("printf({});", expr(value)),
    Stmt::Read { name } => format!("getMeVar {name};"),
    Stmt::Return { value } => format!("giveMeBack {};", expr(value)),
    Stmt::Comment { text } => text.clone(),
    Stmt::While { cond, body } => {
      out.push_str(&format!("{pad}while ({}) {{\n", expr(cond)));
      block(body, depth + 1, out);
      "}".to_string()
    }
    Stmt::If { cond, then } => {
      out.push_str(&format!("{pad}if ({}) {{\n", expr(cond)));
      block(then, depth + 1, out);
      "}".to_string()
    }
    Stmt::IfElse {
      cond,
      then,
      otherwise,
    } => {
      out.push_str(&format!("{pad}if ({}) {{\n", expr(cond)));
      block(then, depth + 1, out);
      out.push_str(&format!("{pad}}}\n{pad}else {{\n"));
      block(otherwise, depth + 1, out);
      "}".to_string()
    }
  };
  out.push_str(&pad);
  out.push_str(&line);
  out.push('\n');
}

pub fn expr(e: &Expr) -> String {
  match e {
    Expr::Num { value } => value.to_string(),
    Expr::Var { name } => name.clone(),
    Expr::Binary { op, lhs, rhs } => format!("{} {} {}", expr(lhs), op.symbol(), expr(rhs)),
    Expr::Compare { op, lhs, rhs } => format!("{} {} {}", expr(lhs), op.symbol(), expr(rhs)),
    Expr::Neg { operand } => format!("-{}", expr(operand)),
    Expr::AddrOf { name } => format!("&{name}"),
    Expr::Deref { depth, name } => format!("{}{name}", "*".repeat(*depth)),
    Expr::Paren { inner } => format!("({})", expr(inner)),
    Expr::Call { callee, args } => {
      let args: Vec<String> = args.iter().map(expr).collect();
      format!("{callee}({})", args.join(", "))
    }
  }
}
