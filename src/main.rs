use clap::Parser;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use std::path::{
    Path,
    PathBuf,
};
use tapme::{
    HostUser,
    InitData,
    SessionConfig,
    store::graphql::DEFAULT_BACKEND_URL,
};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::{
    EnvFilter,
    fmt,
};

mod client;
mod ui;

const DEFAULT_LOG_DIR: &str = "logs";

/// Terminal client for the TapMe tap-to-earn game.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// GraphQL endpoint holding account balances
    #[arg(long, default_value = DEFAULT_BACKEND_URL, conflicts_with = "offline")]
    backend_url: String,

    /// Keep balances in memory instead of talking to a backend
    #[arg(long)]
    offline: bool,

    /// Host-supplied username for this session
    #[arg(long)]
    username: Option<String>,

    /// Host-supplied numeric user id, used when no username is given
    #[arg(long)]
    user_id: Option<i64>,

    /// Raw host launch payload as JSON
    #[arg(long, env = "TAPME_INIT_DATA")]
    init_data: Option<String>,

    /// JSON session config (debounce, progress step, retries)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for rolling log files
    #[arg(long, default_value = DEFAULT_LOG_DIR)]
    log_dir: PathBuf,
}

impl Args {
    fn into_app_config(self) -> Result<client::AppConfig> {
        let store = if self.offline {
            client::StoreTarget::Offline
        } else {
            client::StoreTarget::Remote {
                url: self.backend_url,
            }
        };

        let mut identity = match self.init_data {
            Some(raw) => InitData::from_json(&raw).wrap_err("invalid host init data")?,
            None => InitData::default(),
        };
        if self.username.is_some() || self.user_id.is_some() {
            let user = identity.user.get_or_insert_with(HostUser::default);
            if self.username.is_some() {
                user.username = self.username;
            }
            if self.user_id.is_some() {
                user.id = self.user_id;
            }
        }

        let session = match self.config {
            Some(path) => SessionConfig::from_json_file(&path)
                .wrap_err_with(|| format!("failed to load config from {}", path.display()))?,
            None => SessionConfig::default(),
        };

        Ok(client::AppConfig {
            store,
            identity,
            session,
            log_dir: self.log_dir,
        })
    }
}

fn init_tracing(log_dir: &Path) -> Result<WorkerGuard> {
    let appender = rolling::daily(log_dir, "tapme.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tapme=info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|e| eyre!(e))?;
    Ok(guard)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let app_config = Args::parse().into_app_config()?;
    let _log_guard = init_tracing(&app_config.log_dir)?;
    tracing::info!("starting tapme client");
    client::run_app(app_config).await
}
