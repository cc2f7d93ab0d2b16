use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::json;

use reconfigurator::config::{load_config, ReconfigureConfig};
use reconfigurator::diff::{changed_parameters, diff, touched_parameters, ConfigBundle, ConfigSnapshot, ConfigVersion, ParameterClassification};
use reconfigurator::parser::{ConfigFormat, FormatterConfig};
use reconfigurator::policy::remote::HttpReconfigureClient;
use reconfigurator::policy::ReconfigureClient;
use reconfigurator::reload::files::{read_bundle, scan_config_files, FileFilter};

#[derive(Parser)]
#[command(name = "reconfig-cli")]
#[command(about = "Inspect config changes and drive config-manager sidecars", long_about = None)]
struct Cli {
    /// config-manager TOML file; its [reconfigure] section supplies the
    /// default policy and sidecar timeout.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Timeout for sidecar calls, in seconds. Overrides the config file.
    #[arg(long)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct BundleArgs {
    /// Directory holding the previous files.
    #[arg(long)]
    old: PathBuf,

    /// Directory holding the new files.
    #[arg(long)]
    new: PathBuf,

    #[arg(long, default_value = "ini")]
    format: ConfigFormat,

    /// Ini section the diff is scoped to.
    #[arg(long)]
    section: Option<String>,

    /// Regex selecting the files that take part.
    #[arg(long)]
    files: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the patch between two config directories
    Diff(BundleArgs),
    /// Decide whether a change can be applied online
    Classify {
        #[command(flatten)]
        bundles: BundleArgs,

        #[arg(long = "static", value_delimiter = ',')]
        static_parameters: Vec<String>,

        #[arg(long = "dynamic", value_delimiter = ',')]
        dynamic_parameters: Vec<String>,
    },
    /// Push parameters to a sidecar without restarting
    OnlineUpdate {
        /// Sidecar address, host:port.
        #[arg(long)]
        addr: String,

        #[arg(long)]
        config_spec: String,

        /// key=value, repeatable.
        #[arg(long = "param", value_parser = parse_param, required = true)]
        params: Vec<(String, String)>,
    },
    /// Stop containers through a sidecar
    StopContainer {
        #[arg(long)]
        addr: String,

        #[arg(long = "id", required = true)]
        ids: Vec<String>,
    },
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{raw}'")),
    }
}

fn load_dir(dir: &Path, filter: &FileFilter) -> Result<ConfigBundle, Box<dyn std::error::Error>> {
    Ok(read_bundle(&scan_config_files(dir, filter)?)?)
}

struct Loaded {
    old: ConfigBundle,
    new: ConfigBundle,
    patch: reconfigurator::diff::ConfigPatch,
}

fn load(args: &BundleArgs) -> Result<Loaded, Box<dyn std::error::Error>> {
    let filter = FileFilter::new(args.files.as_deref())?;
    let mut formatter = FormatterConfig::new(args.format);
    if let Some(section) = &args.section {
        formatter = formatter.with_section(section.clone());
    }

    let old = load_dir(&args.old, &filter)?;
    let new = load_dir(&args.new, &filter)?;
    let patch = diff(
        &ConfigSnapshot::build_uniform(&old, &formatter)?,
        &ConfigSnapshot::build_uniform(&new, &formatter)?,
    );
    Ok(Loaded { old, new, patch })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let reconfigure: ReconfigureConfig = match &cli.config {
        Some(path) => load_config(path)?.reconfigure,
        None => ReconfigureConfig::default(),
    };
    let timeout = cli
        .timeout
        .map(Duration::from_secs)
        .unwrap_or_else(|| reconfigure.remote_timeout());

    match cli.command {
        Commands::Diff(args) => {
            let loaded = load(&args)?;
            let out = json!({
                "oldVersion": ConfigVersion::of(&loaded.old).to_string(),
                "newVersion": ConfigVersion::of(&loaded.new).to_string(),
                "patch": loaded.patch,
                "changed": changed_parameters(&loaded.patch),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Commands::Classify {
            bundles,
            static_parameters,
            dynamic_parameters,
        } => {
            let loaded = load(&bundles)?;
            let classification = ParameterClassification {
                static_parameters: static_parameters.into_iter().collect::<BTreeSet<_>>(),
                dynamic_parameters: dynamic_parameters.into_iter().collect::<BTreeSet<_>>(),
            };
            let dynamic = classification.is_dynamic(&loaded.patch);
            let out = json!({
                "modified": loaded.patch.is_modify,
                "dynamic": dynamic,
                "touched": touched_parameters(&loaded.patch),
                "policy": reconfigure.policy_for(dynamic),
                "maxUnavailable": reconfigure.max_unavailable,
                "minReadySecs": reconfigure.min_ready_secs,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Commands::OnlineUpdate {
            addr,
            config_spec,
            params,
        } => {
            let params: BTreeMap<String, String> = params.into_iter().collect();
            let client = HttpReconfigureClient::new(&addr, timeout)?;
            client.online_upgrade_params(&config_spec, &params).await?;
            println!("updated {} parameter(s) of {config_spec} on {addr}", params.len());
        }
        Commands::StopContainer { addr, ids } => {
            let client = HttpReconfigureClient::new(&addr, timeout)?;
            client.stop_container(&ids).await?;
            println!("stopped {} container(s) on {addr}", ids.len());
        }
    }

    Ok(())
}
