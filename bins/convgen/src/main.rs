use std::path::PathBuf;

use clap::Parser;
use convgen_api::model::ObjectModel;
use convgen_config_hcl::HclParser;
use convgen_engine::config::TomlParser;
use convgen_engine::emit::{JsonSink, MultiSink, ReportSink};
use convgen_engine::{GenConfig, GenError, Generator};

#[derive(Parser)]
#[command(name = "convgen", about = "Struct-to-struct conversion generator")]
struct Cli {
    /// Configuration file (`.toml` or `.hcl`).
    #[arg(long, env = "CONVGEN_CONFIG")]
    config: Option<PathBuf>,

    /// Object model JSON. Overrides `model` from the config.
    #[arg(long)]
    model: Option<PathBuf>,

    /// Output directory. Overrides `output_dir` from the config.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Print reports to stdout instead of writing files.
    #[arg(long)]
    stdout: bool,

    /// Generating packages, matched by path suffix.
    packages: Vec<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        tracing::error!(error = %e, "generation failed");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), GenError> {
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!(config = %path.display(), "loading configuration");
            GenConfig::load_with(path, &[&TomlParser, &HclParser])?
        }
        None => GenConfig::default(),
    };
    if let Some(model) = cli.model {
        config.model = Some(model);
    }
    if let Some(dir) = cli.output_dir {
        config.output_dir = dir;
    }
    if !cli.packages.is_empty() {
        config.packages = cli.packages;
    }

    let model_path = config
        .model
        .as_ref()
        .ok_or_else(|| GenError::Config("no object model given (use --model or `model` in config)".into()))?;
    let json = std::fs::read_to_string(model_path)
        .map_err(|e| GenError::from(e).with_context(model_path.display()))?;
    let model = ObjectModel::from_json(&json).map_err(|e| GenError::from(e).with_context(model_path.display()))?;
    tracing::info!(
        model = %model_path.display(),
        packages = model.packages.len(),
        "object model loaded"
    );

    let mut sink = MultiSink::new();
    if cli.stdout {
        sink.push(ReportSink::stdout());
    } else {
        if config.emit.json {
            sink.push(JsonSink::new(&config.output_dir));
        }
        if config.emit.report {
            sink.push(ReportSink::new(&config.output_dir));
        }
    }
    if sink.is_empty() {
        tracing::warn!("every output is disabled, running checks only");
    }

    Generator::new(&model).with_packages(config.packages).run(sink)?;
    Ok(())
}
