use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tiny::{parse_source, Compiler, Error, Scanner, Vm, VmConfig};

fn main() -> ExitCode {
    let command = match Command::try_parse() {
        Ok(command) => command,
        Err(err) => {
            // help and version requests are not failures
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let filter = EnvFilter::try_from_env("TINY_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt::Subscriber::builder()
        .without_time()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    match run(command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<Error>() {
                Some(err) => {
                    for line in err.diagnostics() {
                        println!("{line}");
                    }
                }
                None => println!("{err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

#[derive(Parser)]
#[clap(name = "tiny", version, about = "Compile and run Tiny programs")]
pub struct Command {
    /// Phase to run
    #[clap(value_enum, ignore_case = true)]
    mode: Mode,

    /// Source file, with the .tiny extension
    #[clap(value_parser = tiny_source)]
    source: PathBuf,

    /// File receiving the compiled program listing
    output: Option<PathBuf>,

    /// Heap cells available to the program
    #[clap(long, default_value_t = VmConfig::default().heap_size)]
    heap_size: usize,

    /// Activation records the static memory is sized for
    #[clap(long, default_value_t = VmConfig::default().max_recursion)]
    max_recursion: usize,

    /// Print tokens as JSON in lex mode
    #[clap(long, default_value = "false")]
    json: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Mode {
    /// Print the token stream
    Lex,
    /// Parse only (bottom-up mode)
    Sasc,
    /// Parse only
    Sdesc,
    /// Compile and run (bottom-up mode)
    Asc,
    /// Compile and run
    Desc,
}

fn tiny_source(arg: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(arg);
    match path.extension() {
        Some(ext) if ext == "tiny" => Ok(path),
        _ => Err(format!("{arg} is not a .tiny file")),
    }
}

fn run(command: Command) -> anyhow::Result<()> {
    let source = fs::read_to_string(&command.source)
        .with_context(|| format!("cannot read {}", command.source.display()))?;

    match command.mode {
        Mode::Lex => {
            let tokens = Scanner::new(&source).scan_tokens()?;
            if command.json {
                println!("{}", serde_json::to_string_pretty(&tokens)?);
            } else {
                for token in &tokens {
                    println!("{token}");
                }
            }
        }
        // both parse modes share the recursive-descent parser
        Mode::Sasc | Mode::Sdesc => {
            parse_source(&source)?;
            info!(source = %command.source.display(), "parse succeeded");
        }
        Mode::Asc | Mode::Desc => {
            let program = Compiler::default().compile_source(&source)?;
            let config = VmConfig {
                heap_size: command.heap_size,
                max_recursion: command.max_recursion,
            };
            let stdout = BufWriter::new(io::stdout().lock());
            let mut vm = Vm::new(program, &config, io::stdin().lock(), stdout)?;

            if let Some(path) = &command.output {
                let file = File::create(path)
                    .with_context(|| format!("cannot create {}", path.display()))?;
                let mut listing = BufWriter::new(file);
                vm.write_listing(&mut listing)?;
                listing.flush()?;
            }

            vm.run()?;
        }
    }

    Ok(())
}
