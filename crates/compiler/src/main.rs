//! Cascade Compiler CLI
//!
//! Command-line interface for compiling contextual trees to datapacks
//! and inspecting the lowered fragment graph.

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{Shell, generate};
use std::io;
use std::path::{Path, PathBuf};
use std::process;

#[derive(ClapParser)]
#[command(name = "cascadec")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Cascade compiler - lower typed trees to datapacks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a contextual tree (JSON) to a datapack directory
    Build {
        /// Input tree, as produced by the front end
        input: PathBuf,

        /// Output datapack directory
        #[arg(short, long)]
        output: PathBuf,

        /// Configuration file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the maximum recursion depth
        #[arg(long)]
        max_depth: Option<usize>,
    },

    /// Print the fragment graph of every function
    Fragments {
        /// Input tree (JSON)
        input: PathBuf,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    // Set up logging
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "cascadec=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            input,
            output,
            config,
            max_depth,
        } => {
            run_build(&input, &output, config.as_deref(), max_depth);
        }
        Commands::Fragments { input } => {
            run_fragments(&input);
        }
        Commands::Completions { shell } => {
            run_completions(shell);
        }
    }
}

fn run_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "cascadec", &mut io::stdout());
}

fn run_build(input: &Path, output: &Path, config_path: Option<&Path>, max_depth: Option<usize>) {
    let mut config = match config_path {
        Some(path) => match cascadec::CompilerConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {}", e);
                process::exit(1);
            }
        },
        None => cascadec::CompilerConfig::default(),
    };
    if let Some(depth) = max_depth {
        config = config.with_max_recursion_depth(depth);
    }

    match cascadec::compile_file(input, output, &config) {
        Ok(count) => {
            println!(
                "Compiled {} -> {} ({} files)",
                input.display(),
                output.display(),
                count
            );
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn run_fragments(input: &Path) {
    let listing = cascadec::load_tree(input).and_then(|ctx| cascadec::describe_fragments(&ctx));
    match listing {
        Ok(listing) => print!("{}", listing),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}
