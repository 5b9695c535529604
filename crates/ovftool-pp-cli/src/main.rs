//! packer-post-processor-ovftool - convert VMware build artifacts with ovftool.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use ovftool_pp_core::{
    Artifact, BuildArtifact, Config, PostProcessor, Ui, DEFAULT_EXECUTABLE, VMWARE_BUILDER_ID,
};
use serde_json::{json, Map, Value};
use tracing::info;

/// Converts VMware build artifacts into OVF/OVA appliances using ovftool.
#[derive(Parser)]
#[command(name = "packer-post-processor-ovftool")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging (RUST_LOG takes precedence).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a configuration and report every problem found.
    Validate {
        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Strip removable media from an artifact's VMX and run ovftool on it.
    Run {
        #[command(flatten)]
        config: ConfigArgs,

        /// Identifier of the builder that produced the artifact.
        #[arg(long, default_value = VMWARE_BUILDER_ID)]
        builder_id: String,

        /// Artifact identifier, available to templates as ArtifactId.
        #[arg(long)]
        artifact_id: String,

        /// Artifact file. Repeat for each file; one must end in .vmx.
        #[arg(short, long = "file", value_name = "PATH", required = true)]
        files: Vec<String>,

        /// Suppress progress output.
        #[arg(short, long)]
        quiet: bool,
    },
}

#[derive(Args)]
struct ConfigArgs {
    /// JSON configuration file. Repeatable; later files override earlier ones.
    #[arg(short, long = "config", value_name = "FILE")]
    configs: Vec<PathBuf>,

    /// Build name, available to templates as BuildName.
    #[arg(long)]
    build_name: Option<String>,

    /// User template variable.
    #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var)]
    vars: Vec<(String, String)>,

    /// ovftool executable name or path.
    #[arg(long, default_value = DEFAULT_EXECUTABLE)]
    ovftool: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Validate { config } => {
            let resolved = configure(&config)?;
            println!("Configuration OK");
            println!("ovftool:     {}", resolved.ovftool().display());
            println!("Format:      {}", resolved.target_type());
            println!("Target:      {}", resolved.target_path().source());
            println!("Compression: {}", resolved.compression());
        }
        Commands::Run {
            config,
            builder_id,
            artifact_id,
            files,
            quiet,
        } => {
            let pp = PostProcessor::new(configure(&config)?);
            let artifact = BuildArtifact::new(builder_id, artifact_id, files);
            run(&pp, artifact, quiet)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();
}

fn configure(args: &ConfigArgs) -> Result<Config> {
    let raws = raw_configs(args)?;
    info!(sources = raws.len(), ovftool = %args.ovftool, "configuring");
    Config::configure_with_executable(&raws, &args.ovftool).context("Invalid configuration")
}

/// Configuration files in order, followed by the command-line overrides.
fn raw_configs(args: &ConfigArgs) -> Result<Vec<Value>> {
    let mut raws = Vec::with_capacity(args.configs.len() + 1);

    for path in &args.configs {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let raw: Value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        raws.push(raw);
    }

    let mut overrides = Map::new();
    if let Some(name) = &args.build_name {
        overrides.insert("packer_build_name".to_string(), json!(name));
    }
    if !args.vars.is_empty() {
        let vars: Map<String, Value> = args
            .vars
            .iter()
            .map(|(k, v)| (k.clone(), json!(v)))
            .collect();
        overrides.insert("packer_user_variables".to_string(), Value::Object(vars));
    }
    raws.push(Value::Object(overrides));

    Ok(raws)
}

fn run(pp: &PostProcessor, artifact: BuildArtifact, quiet: bool) -> Result<()> {
    let spinner = if quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?,
        );
        pb.set_message(format!("Converting {}", artifact.id()));
        pb.enable_steady_tick(Duration::from_millis(120));
        pb
    };

    let ui = ConsoleUi {
        bar: spinner.clone(),
    };
    ui.say(&artifact.describe());

    let result = pp.post_process(&ui, artifact);
    spinner.finish_and_clear();

    let (artifact, _keep) = result.context("Post-processing failed")?;
    if !quiet {
        println!("Conversion completed for artifact {}", artifact.id());
    }
    Ok(())
}

/// Prints messages above the progress spinner.
struct ConsoleUi {
    bar: ProgressBar,
}

impl Ui for ConsoleUi {
    fn say(&self, message: &str) {
        self.bar.println(format!("==> ovftool: {}", message));
    }

    fn message(&self, message: &str) {
        for line in message.lines() {
            self.bar.println(format!("    ovftool: {}", line));
        }
    }

    fn error(&self, message: &str) {
        self.bar.println(format!("!!! ovftool: {}", message));
    }
}

/// Parse a `KEY=VALUE` pair.
fn parse_var(s: &str) -> Result<(String, String)> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => bail!("expected KEY=VALUE, got {:?}", s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_var() {
        assert_eq!(
            parse_var("version=1.2").unwrap(),
            ("version".to_string(), "1.2".to_string())
        );
        assert_eq!(
            parse_var("empty=").unwrap(),
            ("empty".to_string(), String::new())
        );
        assert!(parse_var("novalue").is_err());
        assert!(parse_var("=x").is_err());
    }

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "packer-post-processor-ovftool",
            "run",
            "--artifact-id",
            "web01",
            "--file",
            "build/disk.vmdk",
            "--file",
            "build/machine.vmx",
            "--var",
            "version=1.2",
        ])
        .unwrap();

        match cli.command {
            Commands::Run {
                builder_id,
                artifact_id,
                files,
                config,
                ..
            } => {
                assert_eq!(builder_id, VMWARE_BUILDER_ID);
                assert_eq!(artifact_id, "web01");
                assert_eq!(files, vec!["build/disk.vmdk", "build/machine.vmx"]);
                assert_eq!(config.ovftool, DEFAULT_EXECUTABLE);
                assert_eq!(config.vars, vec![("version".to_string(), "1.2".to_string())]);
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_raw_configs_appends_overrides() {
        let args = ConfigArgs {
            configs: Vec::new(),
            build_name: Some("demo".to_string()),
            vars: vec![("version".to_string(), "1.2".to_string())],
            ovftool: DEFAULT_EXECUTABLE.to_string(),
        };
        let raws = raw_configs(&args).unwrap();
        assert_eq!(
            raws,
            vec![json!({
                "packer_build_name": "demo",
                "packer_user_variables": {"version": "1.2"},
            })]
        );
    }
}
