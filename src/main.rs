use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use bytelox::error::{CompileError, InterpretError};
use bytelox::scanner;
use bytelox::vm::chunk::Chunk;
use bytelox::vm::vm::Vm;
use bytelox::vm::{bytecode, compile_to_chunk, disassembler};

/// sysexits EX_IOERR
const EXIT_IO_ERROR: u8 = 74;

#[derive(Parser, Debug)]
#[command(
    name = "bytelox",
    about = "A single-pass expression compiler and bytecode VM"
)]
struct Cli {
    /// Source file to run (omit for REPL)
    file: Option<PathBuf>,

    /// Dump tokens and exit
    #[arg(long)]
    dump_tokens: bool,

    /// Token dump format
    #[arg(long, default_value = "text", value_parser = ["text", "json"])]
    token_format: String,

    /// Disassemble bytecode (from source or saved file) and print
    #[arg(long)]
    disassemble: bool,

    /// Save compiled bytecode to a file
    #[arg(long, value_name = "FILE")]
    save_bytecode: Option<PathBuf>,

    /// Load and execute bytecode from a file
    #[arg(long, value_name = "FILE")]
    load_bytecode: Option<PathBuf>,

    /// Log every executed instruction with the stack contents
    #[arg(long)]
    trace: bool,
}

fn init_tracing(trace: bool) {
    let default = if trace { "bytelox=trace" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn read_source(cli: &Cli) -> Result<String> {
    match &cli.file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("read source file '{}'", path.display())),
        None => bail!("source file required for this operation"),
    }
}

fn source_name(cli: &Cli) -> String {
    cli.file
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "<script>".to_string())
}

/// Print each diagnostic against the named source and wrap them for exit-code mapping.
fn report_compile_errors(errors: Vec<CompileError>, name: &str, source: &str) -> anyhow::Error {
    let errors: Vec<CompileError> = errors
        .into_iter()
        .map(|e| e.with_source_code(name, source))
        .collect();
    for e in &errors {
        eprint!("{}", e.render());
    }
    InterpretError::Compile(errors).into()
}

fn compile_source(cli: &Cli, source: &str) -> Result<Chunk> {
    compile_to_chunk(source)
        .map_err(|errors| report_compile_errors(errors, &source_name(cli), source))
}

fn save_chunk(compiled: &Chunk, path: &Path) -> Result<()> {
    let bytes = bytecode::encode(compiled).context("serialize bytecode")?;
    std::fs::write(path, bytes).with_context(|| format!("write bytecode to '{}'", path.display()))
}

fn load_chunk(path: &Path) -> Result<Chunk> {
    let bytes =
        std::fs::read(path).with_context(|| format!("read bytecode from '{}'", path.display()))?;
    bytecode::decode(&bytes).with_context(|| format!("load bytecode from '{}'", path.display()))
}

fn execute(compiled: &Chunk) -> Result<()> {
    let value = Vm::new()
        .interpret(compiled)
        .map_err(InterpretError::from)?;
    println!("{value}");
    Ok(())
}

fn dump_tokens(cli: &Cli) -> Result<()> {
    let source = read_source(cli)?;
    let tokens = scanner::scan(&source)
        .map_err(|errors| report_compile_errors(errors, &source_name(cli), &source))?;
    match cli.token_format.as_str() {
        "json" => println!(
            "{}",
            serde_json::to_string_pretty(&tokens).context("serialize tokens to JSON")?
        ),
        _ => {
            for token in &tokens {
                println!("{token}");
            }
        }
    }
    Ok(())
}

fn run(cli: &Cli) -> Result<()> {
    if cli.dump_tokens {
        return dump_tokens(cli);
    }

    // Load bytecode from file and execute or disassemble
    if let Some(ref path) = cli.load_bytecode {
        let compiled = load_chunk(path)?;
        if cli.disassemble {
            print!("{}", disassembler::disassemble(&compiled, &path.display().to_string()));
            return Ok(());
        }
        return execute(&compiled);
    }

    if cli.file.is_none() {
        if cli.disassemble || cli.save_bytecode.is_some() {
            bail!("source file required for this operation");
        }
        bytelox::repl::run_repl().context("run REPL")?;
        return Ok(());
    }

    let source = read_source(cli)?;
    let compiled = compile_source(cli, &source)?;

    // Disassemble source to bytecode listing
    if cli.disassemble {
        print!("{}", disassembler::disassemble(&compiled, &source_name(cli)));
        return Ok(());
    }

    // Save bytecode to file instead of running
    if let Some(ref path) = cli.save_bytecode {
        save_chunk(&compiled, path)?;
        eprintln!("bytecode saved to '{}'", path.display());
        return Ok(());
    }

    execute(&compiled)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.trace);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => match err.downcast_ref::<InterpretError>() {
            Some(InterpretError::Compile(_)) => ExitCode::from(65),
            Some(runtime @ InterpretError::Runtime(_)) => {
                eprintln!("{runtime}");
                ExitCode::from(runtime.exit_code())
            }
            None => {
                eprintln!("Error: {err:#}");
                ExitCode::from(EXIT_IO_ERROR)
            }
        },
    }
}
