use std::fmt;

/// Scalar kinds at the bottom of every type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
  Int,
  Char,
}

impl TypeKind {
  /// Natural width in bytes.
  pub fn size(self) -> i64 {
    match self {
      TypeKind::Int => 8,
      TypeKind::Char => 1,
    }
  }

  pub fn keyword(self) -> &'static str {
    match self {
      TypeKind::Int => "int",
      TypeKind::Char => "char",
    }
  }
}

/// A scalar kind behind zero or more levels of indirection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Type {
  pub kind: TypeKind,
  pub ptr_depth: usize,
}

impl Type {
  pub fn int() -> Self {
    Self {
      kind: TypeKind::Int,
      ptr_depth: 0,
    }
  }

  pub fn char() -> Self {
    Self {
      kind: TypeKind::Char,
      ptr_depth: 0,
    }
  }

  pub fn pointer_to(base: Type) -> Self {
    Self {
      kind: base.kind,
      ptr_depth: base.ptr_depth + 1,
    }
  }

  pub fn is_pointer(&self) -> bool {
    self.ptr_depth > 0
  }

  /// Type reached after following `levels` pointers, if that many exist.
  pub fn deref(&self, levels: usize) -> Option<Type> {
    self.ptr_depth.checked_sub(levels).map(|ptr_depth| Type {
      kind: self.kind,
      ptr_depth,
    })
  }

  /// Storage width: pointers are always 8 bytes.
  pub fn size(&self) -> i64 {
    if self.is_pointer() { 8 } else { self.kind.size() }
  }
}

impl fmt::Display for Type {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.kind.keyword())?;
    if self.is_pointer() {
      write!(f, " {}", "*".repeat(self.ptr_depth))?;
    }
    Ok(())
  }
}
