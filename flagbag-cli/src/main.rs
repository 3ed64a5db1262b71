mod cache;
mod config;
mod fetch;
mod store;
mod watch;

use std::process;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use flagbag_lib::{FlagEngine, Identity, MemoryStorage, Storage};
use tracing_subscriber::EnvFilter;

use crate::config::{parse_default_flag, ClientConfig, FlagbagToml};
use crate::store::SledStorage;

#[derive(Parser, Debug)]
#[command(name = "flagbag")]
#[command(version)]
#[command(about = "Resolve feature flags for a project and visitor", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short = 'c', long = "config", default_value = "flagbag.toml", global = true)]
    config: String,

    /// Project key flags are loaded for
    #[arg(short = 'k', long = "project-key", global = true)]
    project_key: Option<String>,

    /// Flags endpoint
    #[arg(short = 'e', long = "endpoint", global = true)]
    endpoint: Option<String>,

    /// Do not read or write the persisted cache
    #[arg(long = "no-cache", global = true)]
    no_cache: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Args, Debug, Default)]
struct IdentityArgs {
    /// Visitor or user key; omit for an anonymous request
    #[arg(short = 'u', long = "user-key")]
    user_key: Option<String>,

    #[arg(long)]
    email: Option<String>,

    #[arg(long)]
    name: Option<String>,

    #[arg(long)]
    avatar: Option<String>,

    #[arg(long)]
    country: Option<String>,

    /// Ask the service to persist the user
    #[arg(long)]
    persist: bool,
}

impl IdentityArgs {
    fn to_identity(&self) -> Option<Identity> {
        let mut identity = Identity::new(self.user_key.as_deref()?)?.persist(self.persist);
        if let Some(ref email) = self.email {
            identity = identity.email(email);
        }
        if let Some(ref name) = self.name {
            identity = identity.name(name);
        }
        if let Some(ref avatar) = self.avatar {
            identity = identity.avatar(avatar);
        }
        if let Some(ref country) = self.country {
            identity = identity.country(country);
        }
        Some(identity)
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve flags once and print them as JSON
    Fetch {
        #[command(flatten)]
        identity: IdentityArgs,

        /// Default flag values (e.g. dog=false size=large)
        #[arg(short = 'd', long = "default")]
        defaults: Vec<String>,
    },
    /// Keep flags fresh; every line on stdin counts as regained focus
    Watch {
        #[command(flatten)]
        identity: IdentityArgs,

        /// Default flag values (e.g. dog=false size=large)
        #[arg(short = 'd', long = "default")]
        defaults: Vec<String>,

        /// Also revalidate every N seconds
        #[arg(short = 'i', long = "interval")]
        interval: Option<u64>,

        /// Disable revalidation on focus
        #[arg(long = "no-focus")]
        no_focus: bool,
    },
    /// Inspect the persisted cache slot
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// Print the cached entry
    Show,
    /// Delete the cached entry
    Clear,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

/// Resolve the client config from: CLI args > env vars > flagbag.toml > defaults
fn resolve_config(cli: &Cli, defaults: &[String]) -> ClientConfig {
    let mut file = FlagbagToml::load(&cli.config);
    file.apply_env_overrides();
    let mut config = file.client;

    if let Some(ref key) = cli.project_key {
        config.project_key = key.clone();
    }
    if let Some(ref endpoint) = cli.endpoint {
        config.endpoint = endpoint.clone();
    }
    if cli.no_cache {
        config.disable_cache = true;
    }
    for arg in defaults {
        match parse_default_flag(arg) {
            Ok((key, value)) => {
                config.default_flags.insert(key, value);
            }
            Err(e) => {
                eprintln!("{}", e);
                process::exit(1);
            }
        }
    }
    config
}

/// Open the sled slot, degrading to process memory when it is unavailable.
fn open_storage(config: &ClientConfig) -> Arc<dyn Storage> {
    match SledStorage::open(&config.data_dir) {
        Ok(storage) => Arc::new(storage),
        Err(e) => {
            tracing::warn!(data_dir = %config.data_dir, error = %e, "cache unavailable, using memory");
            Arc::new(MemoryStorage::new())
        }
    }
}

fn build_engine(config: &ClientConfig) -> FlagEngine {
    let mut builder = FlagEngine::builder(&config.project_key)
        .endpoint(&config.endpoint)
        .default_flags(config.default_flags.clone())
        .disable_cache(config.disable_cache);
    if !config.disable_cache {
        builder = builder.storage(open_storage(config));
    }

    match builder.build() {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("{}. Use --project-key, set FLAGBAG_PROJECT_KEY, or configure [client] in flagbag.toml", e);
            process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    match &cli.cmd {
        Command::Fetch { identity, defaults } => {
            let config = resolve_config(&cli, defaults);
            let engine = build_engine(&config);
            fetch::run_fetch(&engine, identity.to_identity()).await;
        }
        Command::Watch {
            identity,
            defaults,
            interval,
            no_focus,
        } => {
            let config = resolve_config(&cli, defaults);
            let engine = build_engine(&config);
            watch::run_watch(&engine, identity.to_identity(), *interval, !*no_focus).await;
        }
        Command::Cache { action } => {
            let config = resolve_config(&cli, &[]);
            let storage = match SledStorage::open(&config.data_dir) {
                Ok(storage) => storage,
                Err(e) => {
                    eprintln!("{}", e);
                    process::exit(1);
                }
            };
            match action {
                CacheAction::Show => cache::run_show(Arc::new(storage)),
                CacheAction::Clear => cache::run_clear(Arc::new(storage)),
            }
        }
    }
}
