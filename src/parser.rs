//! Recursive-descent parser producing the program AST.
//!
//! Expressions use a precedence-climbing ladder: multiplicative binds
//! tighter than additive, which binds tighter than comparison. All levels
//! are left associative. Parentheses survive as `Expr::Paren` so the
//! pretty-printer can reproduce them exactly.

use crate::error::{CompileError, CompileResult};
use crate::tokenizer::{Token, TokenKind, describe_token, token_text};
use crate::ty::{Type, TypeKind};

/// Arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Add,
  Sub,
  Mul,
  Div,
}

impl BinaryOp {
  pub fn symbol(self) -> &'static str {
    match self {
      BinaryOp::Add => "+",
      BinaryOp::Sub => "-",
      BinaryOp::Mul => "*",
      BinaryOp::Div => "/",
    }
  }
}

/// Comparison operators; these always produce 0 or 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
  Eq,
  Ne,
  Lt,
  Le,
  Gt,
  Ge,
}

impl CmpOp {
  pub fn symbol(self) -> &'static str {
    match self {
      CmpOp::Eq => "==",
      CmpOp::Ne => "!=",
      CmpOp::Lt => "<",
      CmpOp::Le => "<=",
      CmpOp::Gt => ">",
      CmpOp::Ge => ">=",
    }
  }
}

/// Expression tree produced by the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
  Num {
    value: i64,
  },
  Var {
    name: String,
  },
  Binary {
    op: BinaryOp,
    lhs: Box<Expr>,
    rhs: Box<Expr>,
  },
  Compare {
    op: CmpOp,
    lhs: Box<Expr>,
    rhs: Box<Expr>,
  },
  Neg {
    operand: Box<Expr>,
  },
  AddrOf {
    name: String,
  },
  /// `*`...`*name`, with `depth` stars.
  Deref {
    depth: usize,
    name: String,
  },
  Paren {
    inner: Box<Expr>,
  },
  Call {
    callee: String,
    args: Vec<Expr>,
  },
}

impl Expr {
  pub fn number(value: i64) -> Self {
    Self::Num { value }
  }

  pub fn var(name: impl Into<String>) -> Self {
    Self::Var { name: name.into() }
  }

  pub fn unary_neg(operand: Expr) -> Self {
    Self::Neg {
      operand: Box::new(operand),
    }
  }

  pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
    Self::Binary {
      op,
      lhs: Box::new(lhs),
      rhs: Box::new(rhs),
    }
  }

  pub fn compare(op: CmpOp, lhs: Expr, rhs: Expr) -> Self {
    Self::Compare {
      op,
      lhs: Box::new(lhs),
      rhs: Box::new(rhs),
    }
  }

  pub fn paren(inner: Expr) -> Self {
    Self::Paren {
      inner: Box::new(inner),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
  Decl {
    ty: Type,
    name: String,
  },
  Init {
    ty: Type,
    name: String,
    value: Expr,
  },
  Assign {
    name: String,
    value: Expr,
  },
  /// `*`...`*name = value`, storing through `depth` levels of indirection.
  DerefAssign {
    depth: usize,
    name: String,
    value: Expr,
  },
  While {
    cond: Expr,
    body: Vec<Stmt>,
  },
  If {
    cond: Expr,
    then: Vec<Stmt>,
  },
  IfElse {
    cond: Expr,
    then: Vec<Stmt>,
    otherwise: Vec<Stmt>,
  },
  Print {
    value: Expr,
  },
  Read {
    name: String,
  },
  Return {
    value: Expr,
  },
  Comment {
    text: String,
  },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
  pub ty: Type,
  pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
  pub ret: Type,
  pub name: String,
  pub params: Vec<Param>,
  pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
  pub functions: Vec<Function>,
}

/// Parse a whole program from the token stream.
pub fn parse(tokens: Vec<Token>, source: &str) -> CompileResult<Program> {
  let mut stream = TokenStream::new(tokens, source);
  let mut functions = Vec::new();

  loop {
    while stream.next_is(TokenKind::Comment) {
      stream.pos += 1;
    }
    if stream.is_eof() {
      break;
    }
    functions.push(parse_function(&mut stream)?);
  }

  if functions.is_empty() {
    return Err(CompileError::at(source, 0, "program has no functions"));
  }

  Ok(Program { functions })
}

fn parse_function(stream: &mut TokenStream) -> CompileResult<Function> {
  let ret = parse_type(stream)?;
  let (name, _) = stream.get_ident()?;
  stream.skip("(")?;

  let mut params = Vec::new();
  if !stream.equal(")") {
    loop {
      let ty = parse_type(stream)?;
      let (name, _) = stream.get_ident()?;
      params.push(Param { ty, name });
      if stream.equal(")") {
        break;
      }
      stream.skip(",")?;
    }
  }

  stream.skip("{")?;
  let body = parse_block(stream)?;
  Ok(Function {
    ret,
    name,
    params,
    body,
  })
}

/// `("int"|"char") "*"*`
fn parse_type(stream: &mut TokenStream) -> CompileResult<Type> {
  let base = if stream.equal_keyword("int") {
    Type::int()
  } else if stream.equal_keyword("char") {
    Type::char()
  } else {
    return Err(stream.error_here("expected a type"));
  };

  let mut ty = base;
  while stream.equal("*") {
    ty = Type::pointer_to(ty);
  }
  Ok(ty)
}

fn starts_type(stream: &TokenStream) -> bool {
  [TypeKind::Int, TypeKind::Char]
    .iter()
    .any(|kind| stream.peek_keyword(kind.keyword()))
}

/// Statements up to and including the closing `}`.
fn parse_block(stream: &mut TokenStream) -> CompileResult<Vec<Stmt>> {
  let mut stmts = Vec::new();
  while !stream.equal("}") {
    if stream.is_eof() {
      return Err(stream.error_here("expected \"}\" before end of input"));
    }
    stmts.push(parse_stmt(stream)?);
  }
  Ok(stmts)
}

fn parse_stmt(stream: &mut TokenStream) -> CompileResult<Stmt> {
  if let Some(token) = stream.peek()
    && token.kind == TokenKind::Comment
  {
    let text = token_text(token, stream.source).trim().to_string();
    stream.pos += 1;
    return Ok(Stmt::Comment { text });
  }

  if starts_type(stream) {
    let ty = parse_type(stream)?;
    let (name, _) = stream.get_ident()?;
    if stream.equal("=") {
      let value = parse_expr(stream)?;
      stream.skip(";")?;
      return Ok(Stmt::Init { ty, name, value });
    }
    stream.skip(";")?;
    return Ok(Stmt::Decl { ty, name });
  }

  if stream.equal_keyword("while") {
    let cond = parse_condition(stream)?;
    stream.skip("{")?;
    let body = parse_block(stream)?;
    return Ok(Stmt::While { cond, body });
  }

  if stream.equal_keyword("if") {
    let cond = parse_condition(stream)?;
    stream.skip("{")?;
    let then = parse_block(stream)?;
    if stream.equal_keyword("else") {
      stream.skip("{")?;
      let otherwise = parse_block(stream)?;
      return Ok(Stmt::IfElse {
        cond,
        then,
        otherwise,
      });
    }
    return Ok(Stmt::If { cond, then });
  }

  if stream.equal_keyword("printf") {
    stream.skip("(")?;
    let value = parse_expr(stream)?;
    stream.skip(")")?;
    stream.skip(";")?;
    return Ok(Stmt::Print { value });
  }

  if stream.equal_keyword("giveMeBack") {
    let value = parse_expr(stream)?;
    stream.skip(";")?;
    return Ok(Stmt::Return { value });
  }

  if stream.equal_keyword("getMeVar") {
    let (name, _) = stream.get_ident()?;
    stream.skip(";")?;
    return Ok(Stmt::Read { name });
  }

  if stream.peek_punct() == Some("*") {
    let depth = stream.count_stars();
    let (name, _) = stream.get_ident()?;
    stream.skip("=")?;
    let value = parse_expr(stream)?;
    stream.skip(";")?;
    return Ok(Stmt::DerefAssign { depth, name, value });
  }

  if stream.next_is(TokenKind::Ident) {
    let (name, _) = stream.get_ident()?;
    stream.skip("=")?;
    let value = parse_expr(stream)?;
    stream.skip(";")?;
    return Ok(Stmt::Assign { name, value });
  }

  Err(stream.error_here("expected a statement"))
}

fn parse_condition(stream: &mut TokenStream) -> CompileResult<Expr> {
  stream.skip("(")?;
  let cond = parse_expr(stream)?;
  stream.skip(")")?;
  Ok(cond)
}

pub(crate) fn parse_expr(stream: &mut TokenStream) -> CompileResult<Expr> {
  parse_comparison(stream)
}

fn parse_comparison(stream: &mut TokenStream) -> CompileResult<Expr> {
  let mut node = parse_add(stream)?;

  loop {
    let op = match stream.peek_punct() {
      Some("==") => CmpOp::Eq,
      Some("!=") => CmpOp::Ne,
      Some("<") => CmpOp::Lt,
      Some("<=") => CmpOp::Le,
      Some(">") => CmpOp::Gt,
      Some(">=") => CmpOp::Ge,
      _ => break,
    };

    stream.skip(op.symbol())?;
    let rhs = parse_add(stream)?;
    node = Expr::compare(op, node, rhs);
  }

  Ok(node)
}

fn parse_add(stream: &mut TokenStream) -> CompileResult<Expr> {
  let mut node = parse_mul(stream)?;

  loop {
    let op = match stream.peek_punct() {
      Some("+") => BinaryOp::Add,
      Some("-") => BinaryOp::Sub,
      _ => break,
    };

    stream.skip(op.symbol())?;
    let rhs = parse_mul(stream)?;
    node = Expr::binary(op, node, rhs);
  }

  Ok(node)
}

fn parse_mul(stream: &mut TokenStream) -> CompileResult<Expr> {
  let mut node = parse_unary(stream)?;

  loop {
    let op = match stream.peek_punct() {
      Some("*") => BinaryOp::Mul,
      Some("/") => BinaryOp::Div,
      _ => break,
    };

    stream.skip(op.symbol())?;
    let rhs = parse_unary(stream)?;
    node = Expr::binary(op, node, rhs);
  }

  Ok(node)
}

fn parse_unary(stream: &mut TokenStream) -> CompileResult<Expr> {
  // A sign directly in front of a literal belongs to the literal.
  if matches!(stream.peek_punct(), Some("-" | "+"))
    && stream.peek_nth(1).map(|token| token.kind) == Some(TokenKind::Num)
  {
    let negative = stream.equal("-");
    if !negative {
      stream.skip("+")?;
    }
    let (magnitude, loc) = stream.get_number()?;
    return Ok(Expr::number(stream.literal(magnitude, negative, loc)?));
  }

  if stream.equal("-") {
    let operand = parse_unary(stream)?;
    return Ok(Expr::unary_neg(operand));
  }

  if stream.equal("&") {
    let (name, _) = stream.get_ident()?;
    return Ok(Expr::AddrOf { name });
  }

  if stream.peek_punct() == Some("*") {
    let depth = stream.count_stars();
    let (name, _) = stream.get_ident()?;
    return Ok(Expr::Deref { depth, name });
  }

  parse_primary(stream)
}

fn parse_primary(stream: &mut TokenStream) -> CompileResult<Expr> {
  if stream.equal("(") {
    let node = parse_expr(stream)?;
    stream.skip(")")?;
    return Ok(Expr::paren(node));
  }

  if stream.next_is(TokenKind::Ident) {
    let (name, _) = stream.get_ident()?;
    if stream.equal("(") {
      let mut args = Vec::new();
      if !stream.equal(")") {
        loop {
          args.push(parse_expr(stream)?);
          if stream.equal(")") {
            break;
          }
          stream.skip(",")?;
        }
      }
      return Ok(Expr::Call { callee: name, args });
    }
    return Ok(Expr::Var { name });
  }

  let (magnitude, loc) = stream.get_number()?;
  Ok(Expr::number(stream.literal(magnitude, false, loc)?))
}

/// Lightweight cursor over the token vector.
pub(crate) struct TokenStream<'a> {
  tokens: Vec<Token>,
  source: &'a str,
  pos: usize,
}

impl<'a> TokenStream<'a> {
  /// Take ownership of the token stream; the parser will advance `pos` as it consumes input.
  pub(crate) fn new(tokens: Vec<Token>, source: &'a str) -> Self {
    Self {
      tokens,
      source,
      pos: 0,
    }
  }

  fn peek(&self) -> Option<&Token> {
    self.tokens.get(self.pos)
  }

  fn peek_nth(&self, n: usize) -> Option<&Token> {
    self.tokens.get(self.pos + n)
  }

  fn next_is(&self, kind: TokenKind) -> bool {
    self.peek().map(|token| token.kind) == Some(kind)
  }

  /// Text of the current token when it is a punctuator.
  fn peek_punct(&self) -> Option<&'a str> {
    let source = self.source;
    self
      .peek()
      .filter(|token| token.kind == TokenKind::Punctuator)
      .map(|token| token_text(token, source))
  }

  fn peek_keyword(&self, word: &str) -> bool {
    self
      .peek()
      .is_some_and(|token| token.kind == TokenKind::Keyword && token_text(token, self.source) == word)
  }

  /// Consume the current token if it matches the provided punctuator.
  fn equal(&mut self, op: &str) -> bool {
    if self.peek_punct() == Some(op) {
      self.pos += 1;
      return true;
    }
    false
  }

  fn equal_keyword(&mut self, word: &str) -> bool {
    if self.peek_keyword(word) {
      self.pos += 1;
      return true;
    }
    false
  }

  fn count_stars(&mut self) -> usize {
    let mut depth = 0;
    while self.equal("*") {
      depth += 1;
    }
    depth
  }

  fn skip(&mut self, s: &str) -> CompileResult<()> {
    if self.equal(s) {
      Ok(())
    } else {
      Err(self.error_here(format!("expected \"{s}\"")))
    }
  }

  /// Syntax error at the current token, naming what was found there.
  fn error_here(&self, expected: impl Into<String>) -> CompileError {
    let (loc, got) = match self.peek() {
      Some(token) => (token.loc, describe_token(Some(token), self.source)),
      None => (self.source.len(), "EOF".to_string()),
    };
    CompileError::at(
      self.source,
      loc,
      format!("{}, but got \"{got}\"", expected.into()),
    )
  }

  /// Parse the current token as an integer literal returning its value and location.
  fn get_number(&mut self) -> CompileResult<(u64, usize)> {
    if let Some(token) = self.peek()
      && token.kind == TokenKind::Num
    {
      let value = token.value.ok_or_else(|| {
        CompileError::at(
          self.source,
          token.loc,
          "internal error: numeric token missing value",
        )
      })?;
      let loc = token.loc;
      self.pos += 1;
      return Ok((value, loc));
    }

    Err(self.error_here("expected an expression"))
  }

  /// Apply a folded sign to a literal's magnitude, which must fit `i64`.
  fn literal(&self, magnitude: u64, negative: bool, loc: usize) -> CompileResult<i64> {
    let value = if negative {
      -i128::from(magnitude)
    } else {
      i128::from(magnitude)
    };
    i64::try_from(value)
      .map_err(|_| CompileError::at(self.source, loc, "integer literal out of range"))
  }

  /// Parse the current token as an identifier.
  fn get_ident(&mut self) -> CompileResult<(String, usize)> {
    if let Some(token) = self.peek()
      && token.kind == TokenKind::Ident
    {
      let ident = token_text(token, self.source).to_string();
      let loc = token.loc;
      self.pos += 1;
      return Ok((ident, loc));
    }

    Err(self.error_here("expected an identifier"))
  }

  fn is_eof(&self) -> bool {
    matches!(self.peek().map(|token| token.kind), Some(TokenKind::Eof) | None)
  }
}
