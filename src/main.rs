use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use botc::bytecode::disasm::print_object;
use botc::frontend::include::SourceLoader;
use botc::frontend::token_dumper::TokenDumper;
use botc::{Definitions, Limits, compile};

#[derive(Parser)]
#[command(name = "botc")]
#[command(version, about = "Compiles botscript files to bytecode objects", long_about = None)]
struct Cli {
    /// Script to compile
    #[arg(required_unless_present = "list")]
    input: Option<PathBuf>,

    /// Object file to write (defaults to the input with a `.o` extension)
    output: Option<PathBuf>,

    /// List known commands and events, then exit
    #[arg(short = 'l', long = "list")]
    list: bool,

    /// Command and event definitions to use instead of the built-in ones
    #[arg(long)]
    defs: Option<PathBuf>,

    /// TOML file overriding compiler limits
    #[arg(long)]
    config: Option<PathBuf>,

    /// Dump the expanded token stream instead of compiling
    #[arg(long)]
    tokens: bool,

    /// Disable colors in the token dump
    #[arg(long)]
    no_color: bool,

    /// Print a disassembly of the compiled object
    #[arg(long)]
    bc: bool,

    /// Verbose logging (debug level unless RUST_LOG says otherwise)
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let defs = match &cli.defs {
        Some(path) => Definitions::from_file(path)?,
        None => Definitions::builtin()?,
    };

    if cli.list {
        list_definitions(&defs);
        return Ok(());
    }

    let limits = match &cli.config {
        Some(path) => Limits::from_toml_file(path)?,
        None => Limits::default(),
    };

    let Some(input) = cli.input.as_deref() else {
        anyhow::bail!("no input file given");
    };

    let tokens = SourceLoader::new(&limits).load_file(input)?;
    if cli.tokens {
        let mut dumper = TokenDumper::new().with_files();
        if cli.no_color {
            dumper = dumper.no_color();
        }
        dumper.dump(&tokens);
        return Ok(());
    }

    let compilation = compile(tokens, &defs, &limits)?;
    if cli.bc {
        print_object(&compilation.object);
    }

    let output = output_path(input, cli.output.as_deref());
    compilation
        .object
        .write_to(&output)
        .with_context(|| format!("cannot write {}", output.display()))?;

    println!("{}", compilation.stats);
    println!("wrote {}", output.display());
    Ok(())
}

fn list_definitions(defs: &Definitions) {
    println!("commands:");
    for command in defs.commands.iter() {
        println!("  {:>3}  {}", command.opcode, command.signature());
    }
    println!("events:");
    for event in defs.events.iter() {
        println!("  {:>3}  {}", event.index, event.name);
    }
    println!(
        "{} commands, {} events",
        defs.commands.len(),
        defs.events.len()
    );
}

fn output_path(input: &Path, output: Option<&Path>) -> PathBuf {
    match output {
        Some(path) => path.to_path_buf(),
        None => input.with_extension("o"),
    }
}
