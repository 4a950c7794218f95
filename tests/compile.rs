use opale::{CompileOptions, Platform, Target, generate_assembly, parse_program, reformat};

fn linux() -> CompileOptions {
  CompileOptions {
    platform: Platform::for_target(Target::Linux),
    legacy_globals: false,
  }
}

fn compile(src: &str) -> String {
  generate_assembly(src, &linux()).unwrap_or_else(|err| panic!("{err}"))
}

fn immediate(line: &str, prefix: &str) -> Option<i64> {
  line.strip_prefix(prefix)?.trim().parse().ok()
}

/// Walk the assembly tracking `rsp` relative to `rbp`. Every function must
/// reserve a 16-byte multiple, reach `pop rbp` with nothing left on the
/// stack, and make every call with `rsp` 16-byte aligned.
fn check_stack_discipline(asm: &str) {
  let mut depth: i64 = 0;
  let mut statement_level: i64 = 0;
  let mut after_prologue = false;

  for raw in asm.lines() {
    let line = raw.trim();
    if line == "mov rbp, rsp" {
      depth = 0;
      statement_level = 0;
      after_prologue = true;
      continue;
    }
    if after_prologue {
      after_prologue = false;
      if let Some(n) = immediate(line, "sub rsp,") {
        assert_eq!(n % 16, 0, "frame of {n} bytes is not 16-byte aligned");
        depth += n;
        statement_level = n + 16;
        continue;
      }
      statement_level = 16;
    }

    if line.starts_with("push ") {
      depth += 8;
    } else if line == "pop rbp" {
      assert_eq!(depth, 0, "stack not released before return");
    } else if line.starts_with("pop ") {
      depth -= 8;
    } else if let Some(n) = immediate(line, "sub rsp,") {
      depth += n;
    } else if let Some(n) = immediate(line, "add rsp,") {
      depth -= n;
    } else if line.starts_with("call ") {
      assert_eq!(depth % 16, 0, "misaligned `{line}` at depth {depth}");
    } else if line == "ret" {
      depth = statement_level;
    }
  }
}

#[test]
fn two_locals_are_added() {
  let asm = compile("int main(){ int x = 1; int y = 2; giveMeBack x+y; }");
  assert!(asm.contains("\n$main:\n    push rbp\n    mov rbp, rsp\n    sub rsp, 16\n"));
  assert!(asm.contains("    mov rax, 1\n    mov qword [rbp-8], rax\n"));
  assert!(asm.contains("    mov rax, 2\n    mov qword [rbp-16], rax\n"));
  assert!(asm.contains("    add rax, rbx\n"));
  check_stack_discipline(&asm);
}

#[test]
fn output_is_preamble_data_text_functions() {
  let asm = compile("int main(){ giveMeBack 0; }");
  let data = asm.find("section .data").unwrap();
  let text = asm.find("section .text").unwrap();
  let main = asm.find("\n$main:").unwrap();
  assert!(asm.starts_with("extern printf, __isoc99_scanf\nglobal main\n"));
  assert!(data < text && text < main);
  assert!(asm.ends_with("section .note.GNU-stack noalloc noexec nowrite progbits\n"));
}

#[test]
fn functions_keep_source_order() {
  let asm = compile(
    "int b(){ giveMeBack 2; } int a(){ giveMeBack 1; } int main(){ giveMeBack a() + b(); }",
  );
  let b = asm.find("\n$b:").unwrap();
  let a = asm.find("\n$a:").unwrap();
  let main = asm.find("\n$main:").unwrap();
  assert!(b < a && a < main);
}

#[test]
fn stack_stays_balanced_and_aligned_across_calls() {
  let programs = [
    "int f(int n){ if(n<1){ giveMeBack 1; } giveMeBack n; } int main(){ giveMeBack f(0) + f(5); }",
    "int three(int a, int b, int c){ printf(a); giveMeBack a + b * c; }
     int one(int a){ giveMeBack a; }
     int main(){ char c = 2; int x = 1 + three(one(1), 2 - one(c), three(1, 2, 3)) * one(4); printf(x); giveMeBack x; }",
    "int fact(int n){ if (n <= 1) { giveMeBack 1; } else { giveMeBack n * fact(n - 1); } }
     int main(){ int i = 0; while (i < 5) { printf(fact(i)); i = i + 1; } }",
    "char pick(char *p, int k){ giveMeBack *p + k; } int main(){ char c = 7; getMeVar c; giveMeBack pick(&c, 1); }",
  ];
  for src in programs {
    check_stack_discipline(&compile(src));
  }
}

#[test]
fn every_comparison_is_materialised() {
  for op in ["==", "!=", "<", ">", "<=", ">="] {
    let asm = compile(&format!("int main(){{ int a = 1; giveMeBack a {op} 2; }}"));
    let set = asm
      .lines()
      .position(|l| l.trim().starts_with("set"))
      .unwrap();
    let lines: Vec<&str> = asm.lines().collect();
    assert_eq!(lines[set - 1].trim(), "cmp rax, rbx");
    assert_eq!(lines[set + 1].trim(), "movzx rax, al");
  }
}

#[test]
fn macos_prefixes_functions_and_calls() {
  let options = CompileOptions {
    platform: Platform::for_target(Target::MacOs),
    legacy_globals: false,
  };
  let asm = generate_assembly(
    "int f(){ giveMeBack 1; } int main(){ printf(f()); giveMeBack 0; }",
    &options,
  )
  .unwrap();
  assert!(asm.contains("\n$_f:\n"));
  assert!(asm.contains("\n$_main:\n"));
  assert!(asm.contains("    call $_f\n"));
  assert!(asm.contains("    call _printf\n"));
}

#[test]
fn errors_carry_their_kind() {
  let cases = [
    ("int main() { giveMeBack 1 }", "SyntaxError"),
    ("int main() { giveMeBack y; }", "UnknownIdentifier"),
    ("int main() { giveMeBack f(); }", "UnknownIdentifier"),
    ("int f(int a) { giveMeBack a; } int main() { giveMeBack f(); }", "ArityMismatch"),
    ("int main() { int *p; giveMeBack ***p; }", "UnsupportedConstruct"),
  ];
  for (src, kind) in cases {
    let err = generate_assembly(src, &linux()).unwrap_err();
    assert_eq!(err.kind(), kind, "{src}: {err}");
  }
}

#[test]
fn legacy_globals_are_opt_in() {
  let src = "int main(){ total = 5; giveMeBack total; }";
  assert_eq!(
    generate_assembly(src, &linux()).unwrap_err().kind(),
    "UnknownIdentifier"
  );
  let options = CompileOptions {
    legacy_globals: true,
    ..linux()
  };
  let asm = generate_assembly(src, &options).unwrap();
  assert!(asm.contains("\n$total : dq 0\n"));
  assert!(asm.contains("    mov qword [rel $total], rax\n"));
}

#[test]
fn names_nasm_reserves_still_compile() {
  let asm = compile(
    "int test(int a){ giveMeBack a; } int fmt(){ giveMeBack 2; } int loop(){ giveMeBack 3; }
     int main(){ int push = test(1) + fmt() + loop(); giveMeBack push; }",
  );
  for label in ["\n$test:\n", "\n$fmt:\n", "\n$loop:\n", "\n__fmt :\n"] {
    assert!(asm.contains(label), "missing {label:?}");
  }
  assert!(!asm.contains("\nfmt :"));
  assert!(asm.contains("    call $test\n"));
  check_stack_discipline(&asm);
}

#[test]
fn legacy_global_cannot_share_a_function_name() {
  let options = CompileOptions {
    legacy_globals: true,
    ..linux()
  };
  let err = generate_assembly(
    "int f(){ giveMeBack 1; } int main(){ f = 3; giveMeBack f(); }",
    &options,
  )
  .unwrap_err();
  assert_eq!(err.kind(), "UnsupportedConstruct");
}

#[test]
fn reformat_round_trips() {
  let src = "int sum(int n){int acc=0;while(n>0){acc=acc+n;n=n-1;}giveMeBack acc;}
             int main(){int *p;int x;p=&x;*p=sum(5);if(x==15){printf(x);}else{printf(-1);}giveMeBack 0;}";
  let text = reformat(src).unwrap();
  assert_eq!(parse_program(&text).unwrap(), parse_program(src).unwrap());
  assert_eq!(reformat(&text).unwrap(), text);
}
