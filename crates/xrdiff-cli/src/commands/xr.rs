//! Xr command - diff composite resource manifests against the cluster

use std::path::PathBuf;

use xrdiff_engine::{
    CommandRenderer, DiffProcessor, DiffRenderer, ProcessorOptions, StructuredFormat,
    StructuredRenderer, TextDiffOptions, TextRenderer,
};

use crate::OutputFormat;
use crate::error::{CliError, Result};
use crate::input;

/// Options collected from the command line
pub struct XrArgs {
    pub files: Vec<PathBuf>,
    pub namespace: String,
    pub no_color: bool,
    pub compact: bool,
    pub timeout: String,
    pub output: OutputFormat,
    pub render_command: String,
}

pub async fn run(args: XrArgs) -> Result<()> {
    let xrs = input::load_inputs(&args.files)?;
    if xrs.is_empty() {
        return Err(CliError::input("no composite resources found in input"));
    }
    let total = xrs.len();

    let timeout = input::parse_duration(&args.timeout)?;

    let client = kube::Client::try_default()
        .await
        .map_err(|e| CliError::cluster(format!("failed to configure cluster client: {}", e)))?;

    let renderer = CommandRenderer::from_command_line(&args.render_command)
        .map_err(|e| CliError::input(e.to_string()))?;

    let options = ProcessorOptions {
        timeout: Some(timeout),
        default_namespace: Some(args.namespace.clone()),
        ..Default::default()
    };
    let processor = DiffProcessor::new(client, Box::new(renderer), options);

    let outcome = processor.process(xrs).await?;

    let output: Box<dyn DiffRenderer> = match args.output {
        OutputFormat::Diff => Box::new(TextRenderer::new(TextDiffOptions {
            color: !args.no_color,
            compact: args.compact,
            ..Default::default()
        })),
        OutputFormat::Json => Box::new(StructuredRenderer::new(StructuredFormat::Json)),
        OutputFormat::Yaml => Box::new(StructuredRenderer::new(StructuredFormat::Yaml)),
    };

    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    output.render(&mut handle, &outcome.diffs)?;

    // per-XR diagnostics go to stderr; completed diffs stay on stdout
    for failure in &outcome.failures {
        eprintln!("error: {}: {}", failure.id, failure.error);
    }
    if !outcome.is_success() {
        return Err(CliError::Partial {
            failed: outcome.failures.len(),
            total,
        });
    }

    Ok(())
}
