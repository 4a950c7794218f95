//! Assemble, link and run compiled programs on x86-64 Linux.
//!
//! These need `nasm` and `cc` on PATH and are ignored by default:
//! `cargo test --test native -- --ignored`. A missing tool fails the run.
#![cfg(all(target_os = "linux", target_arch = "x86_64"))]

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use opale::{CompileOptions, Platform, Target, generate_assembly};

struct Run {
  status: i32,
  stdout: String,
}

fn require_toolchain() {
  for tool in ["nasm", "cc"] {
    if let Err(err) = which::which(tool) {
      panic!("`{tool}` is needed to run native tests: {err}");
    }
  }
}

fn scratch_dir(name: &str) -> PathBuf {
  let dir = std::env::temp_dir().join(format!("opale-{}-{name}", std::process::id()));
  fs::create_dir_all(&dir).expect("create scratch dir");
  dir
}

fn build_and_run(name: &str, src: &str, stdin: &str) -> Run {
  let options = CompileOptions {
    platform: Platform::for_target(Target::Linux),
    legacy_globals: false,
  };
  let asm = generate_assembly(src, &options).unwrap_or_else(|err| panic!("{err}"));

  let dir = scratch_dir(name);
  let asm_path = dir.join("prog.asm");
  let obj_path = dir.join("prog.o");
  let exe_path = dir.join("prog");
  fs::write(&asm_path, &asm).expect("write assembly");

  let status = Command::new("nasm")
    .args(["-f", "elf64", "-o"])
    .arg(&obj_path)
    .arg(&asm_path)
    .status()
    .expect("run nasm");
  assert!(status.success(), "nasm rejected:\n{asm}");

  let status = Command::new("cc")
    .arg(&obj_path)
    .arg("-o")
    .arg(&exe_path)
    .status()
    .expect("run cc");
  assert!(status.success(), "link failed:\n{asm}");

  let mut child = Command::new(&exe_path)
    .stdin(Stdio::piped())
    .stdout(Stdio::piped())
    .spawn()
    .expect("spawn program");
  child
    .stdin
    .take()
    .expect("piped stdin")
    .write_all(stdin.as_bytes())
    .expect("feed stdin");
  let output = child.wait_with_output().expect("wait for program");
  let _ = fs::remove_dir_all(&dir);

  Run {
    status: output.status.code().expect("exit code"),
    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
  }
}

macro_rules! native_test {
  ($name:ident, $body:block) => {
    #[test]
    #[ignore = "needs nasm and cc; run with --ignored"]
    fn $name() {
      require_toolchain();
      $body
    }
  };
}

native_test!(sum_of_two_locals, {
  let run = build_and_run(
    "sum",
    "int main(){ int x = 1; int y = 2; giveMeBack x+y; }",
    "",
  );
  assert_eq!(run.status, 3);
});

native_test!(conditional_return, {
  let f = "int f(int n){ if(n<1){ giveMeBack 1; } giveMeBack n; }";
  let zero = build_and_run("cond0", &format!("{f} int main(){{ giveMeBack f(0); }}"), "");
  assert_eq!(zero.status, 1);
  let five = build_and_run("cond5", &format!("{f} int main(){{ giveMeBack f(5); }}"), "");
  assert_eq!(five.status, 5);
});

native_test!(address_of_then_dereference, {
  let run = build_and_run(
    "ptr",
    "int main(){ int x; int *p; x = 5; p = &x; giveMeBack *p; }",
    "",
  );
  assert_eq!(run.status, 5);
});

native_test!(while_loop_prints_sum, {
  let run = build_and_run(
    "loop",
    "int main(){ int i = 1; int acc = 0; while (i <= 5) { acc = acc + i; i = i + 1; } printf(acc); giveMeBack 0; }",
    "",
  );
  assert_eq!(run.stdout, "15\n");
  assert_eq!(run.status, 0);
});

native_test!(store_through_pointer_to_pointer, {
  let run = build_and_run(
    "pp",
    "int storeAt(int **pp, int v){ **pp = v; giveMeBack 0; }
     int main(){ int x = 1; int *p = &x; int **pp = &p; int r = storeAt(pp, 42); giveMeBack x + r; }",
    "",
  );
  assert_eq!(run.status, 42);
});

native_test!(recursion_with_printing_callee, {
  let run = build_and_run(
    "fact",
    "int fact(int n){ printf(n); if (n <= 1) { giveMeBack 1; } giveMeBack n * fact(n - 1); }
     int main(){ giveMeBack fact(5) - 100; }",
    "",
  );
  assert_eq!(run.stdout, "5\n4\n3\n2\n1\n");
  assert_eq!(run.status, 20);
});

native_test!(reads_int_and_char, {
  let run = build_and_run(
    "read",
    "int main(){ int x; char c; getMeVar x; getMeVar c; printf(x * 2); giveMeBack c; }",
    "21 -3\n",
  );
  assert_eq!(run.stdout, "42\n");
  assert_eq!(run.status, 253);
});

native_test!(reserved_word_function_names_assemble, {
  let run = build_and_run(
    "names",
    "int test(int a){ giveMeBack a; } int fmt(){ giveMeBack 2; } int main(){ printf(test(1) + fmt()); giveMeBack 0; }",
    "",
  );
  assert_eq!(run.stdout, "3\n");
});

native_test!(char_return_is_sign_extended, {
  let run = build_and_run(
    "charret",
    "char wrap(int v){ giveMeBack v; } int main(){ printf(wrap(255)); giveMeBack 0; }",
    "",
  );
  assert_eq!(run.stdout, "-1\n");
});
