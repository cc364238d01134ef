//! xrdiff - predict Crossplane composite resource changes without applying them

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

mod commands;
mod error;
mod exit_codes;
mod input;

#[derive(Parser)]
#[command(name = "xrdiff")]
#[command(author = "xrdiff Contributors")]
#[command(version)]
#[command(about = "Diff Crossplane composite resources against a live cluster", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Diff one or more XR manifests against the cluster
    Xr {
        /// XR manifest file(s); use - for stdin
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Default namespace for namespaced resources
        #[arg(short, long, default_value = "default")]
        namespace: String,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,

        /// Minimize context around changes
        #[arg(long)]
        compact: bool,

        /// Overall timeout for the whole diff, e.g. 45s, 5m, 1h
        #[arg(long, default_value = "5m")]
        timeout: String,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Diff)]
        output: OutputFormat,

        /// External render command to invoke for the function pipeline
        #[arg(long, default_value = "crossplane render")]
        render_command: String,
    },
}

/// Output formats for the xr command
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// kubectl-diff-style text
    Diff,
    /// Structured JSON
    Json,
    /// Structured YAML
    Yaml,
}

fn init_tracing(debug: bool) {
    use tracing_subscriber::EnvFilter;

    let default_filter = if debug { "xrdiff=debug,info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.debug);

    let result = match cli.command {
        Commands::Xr {
            files,
            namespace,
            no_color,
            compact,
            timeout,
            output,
            render_command,
        } => {
            commands::xr::run(commands::xr::XrArgs {
                files,
                namespace,
                no_color,
                compact,
                timeout,
                output,
                render_command,
            })
            .await
        }
    };

    if let Err(error) = result {
        let code = error.exit_code();
        eprintln!("{:?}", miette::Report::new(error));
        std::process::exit(code);
    }
}
