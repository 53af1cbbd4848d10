use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use rtsvg_apply::{render_manifests, KubeApply, Platform};
use rtsvg_compose::{Component, RealtimeSvg};
use rtsvg_core::{Config, PartialConfig};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "rtsvgctl", version, about = "Compose and deploy realtime-svg")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Config file (YAML or JSON, camelCase keys)
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json, Yaml }

/// Highest-precedence layer, above file and environment.
#[derive(Args, Debug, Default)]
struct Overrides {
    /// Target namespace
    #[arg(long = "ns", global = true)]
    namespace: Option<String>,
    #[arg(long = "replicas", global = true, allow_negative_numbers = true)]
    replicas: Option<i32>,
    #[arg(long = "image-tag", global = true)]
    image_tag: Option<String>,
    /// Skip the cache workload and service
    #[arg(long = "no-cache", global = true, action = ArgAction::SetTrue)]
    no_cache: bool,
    /// Skip the ingress
    #[arg(long = "no-ingress", global = true, action = ArgAction::SetTrue)]
    no_ingress: bool,
    #[arg(long = "ingress-host", global = true)]
    ingress_host: Option<String>,
    /// Enable TLS on the ingress with this secret
    #[arg(long = "tls-secret", global = true)]
    tls_secret: Option<String>,
}

impl Overrides {
    fn to_partial(&self) -> PartialConfig {
        PartialConfig {
            namespace: self.namespace.clone(),
            replicas: self.replicas,
            image_tag: self.image_tag.clone(),
            cache_enabled: self.no_cache.then_some(false),
            ingress_enabled: self.no_ingress.then_some(false),
            ingress_host: self.ingress_host.clone(),
            ingress_tls_enabled: self.tls_secret.as_ref().map(|_| true),
            ingress_tls_secret_name: self.tls_secret.clone(),
            ..Default::default()
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the resolved configuration
    Config,
    /// Print the manifests of every resource the configuration produces
    Render,
    /// Print the output record (names and URLs)
    Outputs,
    /// Server-side apply the manifests to the current kube context
    Apply {
        /// Ask the API server to validate without persisting
        #[arg(long = "dry-run", action = ArgAction::SetTrue)]
        dry_run: bool,
    },
}

fn init_tracing() {
    let env = std::env::var("RTSVG_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    // stdout carries manifests; logs go to stderr
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

/// Opt-in Prometheus endpoint for `rtsvg_*` counters, mostly useful while `apply` runs.
fn init_metrics() {
    if let Some(sock) = metrics_addr(std::env::var("RTSVG_METRICS_ADDR").ok()) {
        let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
        match builder.with_http_listener(sock).install() {
            Ok(()) => tracing::info!(addr = %sock, "Prometheus metrics exporter listening"),
            Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
        }
    }
}

fn metrics_addr(raw: Option<String>) -> Option<std::net::SocketAddr> {
    let addr = raw?;
    match addr.parse::<std::net::SocketAddr>() {
        Ok(sock) => Some(sock),
        Err(_) => {
            tracing::warn!(addr = %addr, "invalid RTSVG_METRICS_ADDR; expected host:port");
            None
        }
    }
}

fn max_config_bytes() -> u64 {
    std::env::var("RTSVG_MAX_CONFIG_BYTES")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(1_000_000)
}

fn load_file(path: &Path) -> Result<PartialConfig> {
    let len = std::fs::metadata(path).with_context(|| format!("reading {}", path.display()))?.len();
    if len > max_config_bytes() {
        return Err(anyhow!("config file too large (>{} bytes)", max_config_bytes()));
    }
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    // YAML is a superset of JSON, so one parser covers both
    serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// defaults < file < environment < flags
fn resolve_config(cli: &Cli) -> Result<Config> {
    let file = match &cli.config {
        Some(p) => load_file(p)?,
        None => PartialConfig::default(),
    };
    Ok(file.overlay(PartialConfig::from_env()).overlay(cli.overrides.to_partial()).resolve())
}

fn print_value<T: serde::Serialize>(output: Output, v: &T) -> Result<()> {
    match output {
        Output::Json => println!("{}", serde_json::to_string_pretty(v)?),
        Output::Human | Output::Yaml => print!("{}", serde_yaml::to_string(v)?),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;
    let component = RealtimeSvg::new();
    let comp = component.build(&config).map_err(|e| anyhow!("composition failed: {}", e))?;

    match cli.command {
        Commands::Config => print_value(cli.output, &config)?,
        Commands::Render => match cli.output {
            Output::Json => println!("{}", serde_json::to_string_pretty(&comp.descriptors)?),
            Output::Human | Output::Yaml => print!("{}", render_manifests(&comp.descriptors)?),
        },
        Commands::Outputs => match cli.output {
            Output::Human => {
                let o = &comp.outputs;
                println!("deploymentName    {}", o.deployment_name);
                println!("serviceName       {}", o.service_name);
                println!("serviceType       {}", o.service_type);
                if let Some(url) = &o.ingress_url { println!("ingressUrl        {}", url); }
                if let Some(name) = &o.cache_service_name { println!("cacheServiceName  {}", name); }
            }
            other => print_value(other, &comp.outputs)?,
        },
        Commands::Apply { dry_run } => {
            info!(component = component.type_name(), namespace = %config.namespace, dry_run, "apply invoked");
            let platform = KubeApply::try_default(dry_run).await?;
            match platform.register(&comp.descriptors).await {
                Ok(report) => match cli.output {
                    Output::Human => {
                        let verb = if report.dry_run { "validated" } else { "applied" };
                        for e in &report.entries {
                            println!("{} {} (rv {})", verb, e.key, e.resource_version.as_deref().unwrap_or("-"));
                        }
                    }
                    other => print_value(other, &report)?,
                },
                Err(e) => {
                    error!(error = ?e, "apply failed");
                    return Err(e);
                }
            }
        }
    }

    Ok(())
}
