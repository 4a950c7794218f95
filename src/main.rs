use std::fs;
use std::path::PathBuf;
use std::process;

use clap::{Parser, ValueEnum};
use opale::{CompileError, CompileOptions, Platform, Target};
use snafu::{ResultExt, Snafu};
use tracing::{info, level_filters::LevelFilter};

#[derive(Debug, Snafu)]
enum CliError {
  #[snafu(display("cannot read {}: {source}", path.display()))]
  ReadSource {
    path: PathBuf,
    source: std::io::Error,
  },

  #[snafu(display("cannot write {}: {source}", path.display()))]
  WriteOutput {
    path: PathBuf,
    source: std::io::Error,
  },

  #[snafu(display("{}: {source}", path.display()))]
  Compile {
    path: PathBuf,
    source: CompileError,
  },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TargetArg {
  Linux,
  Macos,
}

impl From<TargetArg> for Target {
  fn from(arg: TargetArg) -> Self {
    match arg {
      TargetArg::Linux => Target::Linux,
      TargetArg::Macos => Target::MacOs,
    }
  }
}

#[derive(Parser)]
#[command(name = "opale", version)]
#[command(about = "Compile a small C-like language to x86-64 NASM assembly")]
struct Cli {
  /// Source file to compile
  input: PathBuf,

  /// Write assembly here instead of standard output
  #[arg(short, long)]
  output: Option<PathBuf>,

  /// Reformat INPUT in place instead of compiling it
  #[arg(short = 'p', long = "prettify")]
  prettify: bool,

  /// Object format to emit for (defaults to the host)
  #[arg(long, value_enum)]
  target: Option<TargetArg>,

  /// Accept undeclared variables as zero-initialised globals
  #[arg(long)]
  legacy_globals: bool,

  /// Increase log verbosity (-v info, -vv debug, -vvv trace)
  #[arg(short, long, action = clap::ArgAction::Count)]
  verbose: u8,
}

fn run(cli: &Cli) -> Result<(), CliError> {
  let source = fs::read_to_string(&cli.input).context(ReadSourceSnafu { path: &cli.input })?;

  if cli.prettify {
    let text = opale::reformat(&source).context(CompileSnafu { path: &cli.input })?;
    fs::write(&cli.input, text).context(WriteOutputSnafu { path: &cli.input })?;
    info!(path = %cli.input.display(), "reformatted source");
    return Ok(());
  }

  let platform = cli
    .target
    .map(|t| Platform::for_target(t.into()))
    .unwrap_or_else(Platform::host);
  info!(platform = %platform.target, "compiling {}", cli.input.display());
  let options = CompileOptions {
    platform,
    legacy_globals: cli.legacy_globals,
  };
  let asm = opale::generate_assembly(&source, &options).context(CompileSnafu { path: &cli.input })?;

  match &cli.output {
    Some(path) => fs::write(path, asm).context(WriteOutputSnafu { path })?,
    None => print!("{asm}"),
  }
  Ok(())
}

fn main() {
  let cli = Cli::parse();

  let level = match cli.verbose {
    0 => LevelFilter::WARN,
    1 => LevelFilter::INFO,
    2 => LevelFilter::DEBUG,
    _ => LevelFilter::TRACE,
  };
  tracing_subscriber::fmt()
    .with_target(false)
    .with_max_level(level)
    .with_writer(std::io::stderr)
    .init();

  if let Err(err) = run(&cli) {
    eprintln!("{err}");
    process::exit(1);
  }
}
