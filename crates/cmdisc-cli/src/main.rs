//! # cmdisc
//!
//! Discovers the services of clusters administered by a cluster manager and
//! keeps the result current by watching for configuration changes.
//!
//! ## Usage
//!
//! ```bash
//! # Discover every cluster at an endpoint
//! cmdisc discover -a http://cm-host:7180 -u admin
//!
//! # Discover one cluster
//! cmdisc discover -a http://cm-host:7180 -c "Cluster 1"
//!
//! # Print only the URLs of one service
//! cmdisc discover -a http://cm-host:7180 -c "Cluster 1" -s HIVE -p discovery-transport=http
//!
//! # Watch a cluster and re-discover it whenever its configuration changes
//! cmdisc monitor -a http://cm-host:7180 -c "Cluster 1" --interval 30
//! ```
//!
//! The password for the management API is looked up through its alias in
//! the environment (`CMDISC_<ALIAS>`, e.g. `CMDISC_CM_DISCOVERY_PASSWORD`).

use anyhow::{anyhow, Result};
use argh::FromArgs;
use cmdisc_cli::{load_gateway_config, parse_params, ChannelListener};
use cmdisc_client::{EnvCredentialResolver, HttpClientFactory};
use cmdisc_common::{ApiClientFactory, DiscoveryConfig, GatewayConfig};
use cmdisc_discovery::{ClusterDiscovery, GeneratorRegistry};
use cmdisc_monitor::{ClusterConfigMonitor, StaticDescriptorInventory};
use std::sync::Arc;

/// Main CLI structure parsed from command-line arguments.
#[derive(FromArgs)]
/// cmdisc - cluster manager service discovery
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Discover(DiscoverArgs),
    Monitor(MonitorArgs),
}

/// Arguments for a one-shot discovery.
///
/// Without `--cluster`, every cluster at the endpoint is discovered.
#[derive(FromArgs)]
#[argh(subcommand, name = "discover")]
/// discover the services of one or all clusters
struct DiscoverArgs {
    /// address of the management endpoint, e.g. http://cm-host:7180
    #[argh(option, short = 'a')]
    address: String,

    /// name of the cluster to discover
    #[argh(option, short = 'c')]
    cluster: Option<String>,

    /// user for the management API
    #[argh(option, short = 'u')]
    user: Option<String>,

    /// alias under which the user's password is stored
    #[argh(option, long = "password-alias")]
    password_alias: Option<String>,

    /// path to a JSON gateway configuration file
    #[argh(option, long = "config")]
    config: Option<String>,

    /// print only the URLs of this service (requires --cluster)
    #[argh(option, short = 's', long = "service")]
    service: Option<String>,

    /// qualifying parameter as name=value, may be repeated
    #[argh(option, short = 'p', long = "param")]
    params: Vec<String>,
}

/// Arguments for watching a cluster.
///
/// The cluster is discovered once at startup; the monitor then re-runs
/// discovery whenever a restarted service's configuration has changed.
#[derive(FromArgs)]
#[argh(subcommand, name = "monitor")]
/// watch a cluster for configuration changes
struct MonitorArgs {
    /// address of the management endpoint, e.g. http://cm-host:7180
    #[argh(option, short = 'a')]
    address: String,

    /// name of the cluster to watch
    #[argh(option, short = 'c')]
    cluster: String,

    /// user for the management API
    #[argh(option, short = 'u')]
    user: Option<String>,

    /// alias under which the user's password is stored
    #[argh(option, long = "password-alias")]
    password_alias: Option<String>,

    /// path to a JSON gateway configuration file
    #[argh(option, long = "config")]
    config: Option<String>,

    /// seconds between configuration checks, overriding the file
    #[argh(option, short = 'i', long = "interval")]
    interval: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Logs go to stderr so discovery output can be piped
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Discover(args) => run_discover(args).await,
        Commands::Monitor(args) => run_monitor(args).await,
    }
}

fn connection(
    address: &str,
    cluster: Option<&str>,
    user: Option<&str>,
    password_alias: Option<&str>,
) -> DiscoveryConfig {
    let mut config = DiscoveryConfig::new(address);
    if let Some(cluster) = cluster {
        config = config.with_cluster(cluster);
    }
    if let Some(user) = user {
        config = config.with_user(user);
    }
    if let Some(alias) = password_alias {
        config = config.with_password_alias(alias);
    }
    config
}

fn client_factory(gateway: &GatewayConfig) -> Arc<dyn ApiClientFactory> {
    Arc::new(
        HttpClientFactory::new(gateway.http.clone())
            .with_credentials(Arc::new(EnvCredentialResolver::new())),
    )
}

fn discovery_engine(
    gateway: &GatewayConfig,
    registry: Arc<GeneratorRegistry>,
    clients: Arc<dyn ApiClientFactory>,
) -> ClusterDiscovery {
    ClusterDiscovery::new(registry, clients, &gateway.collector)
}

/// Executes the `discover` subcommand, printing JSON (or plain URLs) to
/// stdout.
async fn run_discover(args: DiscoverArgs) -> Result<()> {
    let gateway = load_gateway_config(args.config.as_deref())?;
    let registry = Arc::new(GeneratorRegistry::with_builtin());
    let discovery = discovery_engine(&gateway, registry, client_factory(&gateway));
    let config = connection(
        &args.address,
        args.cluster.as_deref(),
        args.user.as_deref(),
        args.password_alias.as_deref(),
    );

    let Some(cluster_name) = args.cluster.as_deref() else {
        if args.service.is_some() {
            return Err(anyhow!("--service requires --cluster"));
        }
        let clusters = discovery.discover_all(&config).await?;
        tracing::info!("Discovered {} cluster(s) at {}", clusters.len(), args.address);
        println!("{}", serde_json::to_string_pretty(&clusters)?);
        return Ok(());
    };

    let cluster = discovery
        .discover(&config, cluster_name)
        .await?
        .ok_or_else(|| anyhow!("Cluster {} could not be discovered at {}", cluster_name, args.address))?;

    match &args.service {
        Some(service) => {
            let params = parse_params(&args.params)?;
            for url in cluster.service_urls(service, &params) {
                println!("{}", url);
            }
        }
        None => println!("{}", serde_json::to_string_pretty(&cluster)?),
    }
    Ok(())
}

/// Executes the `monitor` subcommand until Ctrl-C.
async fn run_monitor(args: MonitorArgs) -> Result<()> {
    let mut gateway = load_gateway_config(args.config.as_deref())?;
    if let Some(interval) = args.interval {
        gateway.monitor.polling_interval_secs = interval;
    }
    gateway.validate()?;

    let clients = client_factory(&gateway);
    let registry = Arc::new(GeneratorRegistry::with_builtin());
    let discovery = discovery_engine(&gateway, registry.clone(), clients.clone());
    let config = connection(
        &args.address,
        Some(&args.cluster),
        args.user.as_deref(),
        args.password_alias.as_deref(),
    );

    let inventory = StaticDescriptorInventory::new().with_cluster(&args.address, &args.cluster);
    let monitor = ClusterConfigMonitor::builder(clients, registry)
        .gateway_config(&gateway)
        .inventory(Arc::new(inventory))
        .build()
        .await;

    let (listener, mut changes) = ChannelListener::new();
    monitor.add_listener(Arc::new(listener)).await;

    rediscover(&discovery, &monitor, &config).await?;
    monitor.start();

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(key) = changes.recv() => {
                tracing::info!("Configuration of {} changed; rediscovering", key);
                if let Err(e) = rediscover(&discovery, &monitor, &config).await {
                    tracing::error!("Rediscovery of {} failed: {}", key, e);
                }
            }
            result = &mut shutdown => {
                if let Err(e) = result {
                    tracing::error!("Failed to listen for Ctrl-C: {}", e);
                }
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    monitor.stop();
    Ok(())
}

/// Discovers the configured cluster and hands the result to the monitor.
async fn rediscover(
    discovery: &ClusterDiscovery,
    monitor: &ClusterConfigMonitor,
    config: &DiscoveryConfig,
) -> Result<()> {
    let cluster = discovery
        .discover_configured(config)
        .await?
        .ok_or_else(|| anyhow!("Cluster could not be discovered at {}", config.address))?;

    for service in cluster.service_names() {
        tracing::info!("{}: {}", service, cluster.service_urls(&service, &Default::default()).join(", "));
    }
    monitor.add_service_configuration(&cluster, config).await;
    Ok(())
}
