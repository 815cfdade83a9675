//! Table switch CLI
//!
//! Runs the chooser driver on the selected backend, prints a class listing,
//! or writes the fixture class out as a class file.

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser, ValueEnum};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;
use ts_bytecode::Class;
use ts_driver::{Backend, BackendKind, InterpreterBackend, table_switch_class};

#[derive(Parser)]
#[command(name = "tableswitch")]
#[command(about = "Maps 0, 1 and 2 to themselves and everything else to -1", long_about = None)]
#[command(version)]
struct Cli {
    /// Class file to run or disassemble instead of the built-in fixture
    class_file: Option<PathBuf>,

    /// Backend used to evaluate the chooser [default: native, or
    /// interpreter when a class file is given]
    #[arg(long, value_enum)]
    backend: Option<BackendArg>,

    /// Print the class listing instead of running it
    #[arg(long)]
    disassemble: bool,

    /// Print the listing as JSON (with --disassemble)
    #[arg(long, requires = "disassemble")]
    json: bool,

    /// Write the fixture class to PATH as a class file
    #[arg(long, value_name = "PATH", conflicts_with_all = ["class_file", "disassemble"])]
    emit: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendArg {
    /// Evaluate the chooser directly
    Native,
    /// Execute the fixture class on the bytecode interpreter
    Interpreter,
}

impl From<BackendArg> for BackendKind {
    fn from(backend: BackendArg) -> Self {
        match backend {
            BackendArg::Native => Self::Native,
            BackendArg::Interpreter => Self::Interpreter,
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = if verbose == 0 {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    } else {
        EnvFilter::new(level)
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn load_class(path: &Path) -> Result<Class> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let class = ts_bytecode::read_class(&bytes)
        .with_context(|| format!("{} is not a valid class file", path.display()))?;
    info!(class = %class.name, path = %path.display(), "loaded class file");
    Ok(class)
}

fn emit(path: &Path) -> Result<()> {
    let class = table_switch_class().context("failed to assemble the fixture class")?;
    let bytes = ts_bytecode::write_class(&class).context("failed to encode the fixture class")?;
    fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), "wrote class file");
    Ok(())
}

fn disassemble(class: &Class, json: bool, out: &mut dyn Write) -> Result<()> {
    if json {
        let listing = ts_bytecode::listing(class)
            .with_context(|| format!("failed to decode class {}", class.name))?;
        serde_json::to_writer_pretty(&mut *out, &listing).context("failed to write listing")?;
        writeln!(out)?;
    } else {
        let text = ts_bytecode::disassemble(class)
            .with_context(|| format!("failed to decode class {}", class.name))?;
        out.write_all(text.as_bytes())?;
    }
    out.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Some(path) = &cli.emit {
        return emit(path);
    }

    let loaded = cli.class_file.as_deref().map(load_class).transpose()?;

    let stdout = io::stdout();
    let mut out = stdout.lock();

    if cli.disassemble {
        let class = match loaded {
            Some(class) => class,
            None => table_switch_class().context("failed to assemble the fixture class")?,
        };
        return disassemble(&class, cli.json, &mut out);
    }

    let mut backend: Box<dyn Backend> = match (loaded, cli.backend) {
        (Some(_), Some(BackendArg::Native)) => {
            bail!("the native backend cannot run a class file, use --backend interpreter")
        }
        (Some(class), _) => Box::new(InterpreterBackend::with_class(class)),
        (None, backend) => BackendKind::from(backend.unwrap_or(BackendArg::Native))
            .create()
            .context("failed to set up backend")?,
    };
    info!(backend = backend.name(), "running driver");
    ts_driver::run(backend.as_mut(), &mut out).context("driver failed")?;
    Ok(())
}
