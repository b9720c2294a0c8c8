use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::{config_dir, CatalogFile, SwitchboardConfig};
use switchboard_core::{
    default_agents, default_catalog, AgentRegistry, AuditSink, HttpClassifier, IdentityContext,
    RouterService, TaxonomyHandle,
};
use switchboard_gateway::{GatewayServer, RouteReply};
use switchboard_policy::{PolicyHandle, PolicyStore};

#[derive(Parser)]
#[command(name = "switchboard")]
#[command(version)]
#[command(about = "Switchboard — role-aware routing gateway for internal agents")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway daemon
    Start,

    /// Initialize config directory and default config
    Init,

    /// Show current configuration
    Config,

    /// Route a single query locally and print the decision
    Route {
        /// The query to route
        query: String,

        /// Role to evaluate the query as
        #[arg(short, long)]
        role: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Init => cmd_init().await,
        Commands::Config => cmd_config(&cli.config),
        Commands::Start => cmd_start(&cli.config).await,
        Commands::Route { query, role } => cmd_route(&cli.config, &query, role).await,
    }
}

async fn cmd_init() -> Result<()> {
    let config_dir = config_dir();
    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        warn!("Config already exists at {}", config_path.display());
    } else {
        let default_config = include_str!("../../../config/default.toml");
        tokio::fs::write(&config_path, default_config).await?;
        info!("Created default config at {}", config_path.display());
    }

    println!("Switchboard initialized at {}", config_dir.display());
    println!(
        "Edit {} to configure the gateway, policy store, and classifier.",
        config_path.display()
    );
    Ok(())
}

fn cmd_config(custom_path: &Option<PathBuf>) -> Result<()> {
    let config = SwitchboardConfig::load(custom_path)?;
    println!("{:#?}", config);
    Ok(())
}

async fn cmd_start(custom_path: &Option<PathBuf>) -> Result<()> {
    let config = SwitchboardConfig::load(custom_path)?;
    let service = Arc::new(build_service(&config).await?);

    let bind = format!("{}:{}", config.gateway.bind, config.gateway.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid gateway bind address {}:{}",
                config.gateway.bind, config.gateway.port
            )
        })?;

    let shutdown = CancellationToken::new();
    let server = GatewayServer::new(bind, service, config.gateway.auth_token.clone());
    let mut handle = server.spawn(shutdown.clone());
    info!("Switchboard running on {}", bind);

    let result = tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Shutting down");
            shutdown.cancel();
            (&mut handle).await
        }
        result = &mut handle => result,
    };

    match result {
        Ok(inner) => inner,
        Err(e) => {
            error!("Gateway task failed: {}", e);
            Ok(())
        }
    }
}

async fn cmd_route(
    custom_path: &Option<PathBuf>,
    query: &str,
    role: Option<String>,
) -> Result<()> {
    let config = SwitchboardConfig::load(custom_path)?;
    let service = build_service(&config).await?;

    let identity = IdentityContext {
        principal: "cli".to_string(),
        role,
        bearer_token: None,
        api_key: None,
    };
    let outcome = service.route(query, &identity).await;
    let reply = RouteReply::from_outcome(outcome);
    println!("{}", serde_json::to_string_pretty(&reply)?);
    Ok(())
}

/// Assemble the routing service from configuration.
async fn build_service(config: &SwitchboardConfig) -> Result<RouterService> {
    // Policy store and snapshot. A load failure leaves the handle empty,
    // which denies every request.
    let db_path = config.policy.resolved_db_path();
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }
    let store = PolicyStore::new(&db_path)?;
    if config.policy.seed_defaults && store.is_empty().await? {
        store.seed_defaults().await?;
    }
    let policy = match store.load_graph().await {
        Ok(graph) => PolicyHandle::new(graph),
        Err(e) => {
            error!("Failed to load policy graph, all requests will be denied: {}", e);
            PolicyHandle::empty()
        }
    };

    // Taxonomy: a configured catalog file replaces the built-in one.
    let taxonomy = TaxonomyHandle::empty();
    let intents = match &config.taxonomy.path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read taxonomy catalog at {}", path))?;
            let catalog: CatalogFile = toml::from_str(&content)
                .with_context(|| format!("Failed to parse taxonomy catalog at {}", path))?;
            catalog.intents
        }
        None => default_catalog(),
    };
    taxonomy.load(intents)?;

    // Agent registry.
    let registry = Arc::new(AgentRegistry::new(&config.registry.fallback));
    let agents = if config.registry.agents.is_empty() {
        default_agents()
    } else {
        config.registry.agents.clone()
    };
    for agent in agents {
        let id = agent.id.clone();
        if let Err(e) = registry.register(agent).await {
            warn!("Skipping agent '{}': {}", id, e);
        }
    }

    let mut service = RouterService::new(
        taxonomy,
        policy,
        registry,
        AuditSink::new(config.audit.capacity),
    );

    if config.classifier.enabled {
        info!(
            "Neural classifier enabled: {} ({})",
            config.classifier.base_url, config.classifier.model
        );
        service = service.with_classifier(Arc::new(HttpClassifier::new(
            config.classifier.base_url.clone(),
            config.classifier.model.clone(),
            Duration::from_secs(config.classifier.timeout_secs),
        )));
    }

    Ok(service)
}
