use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tm_common::encoder::{EncoderConfig, EncodingError, create_encoder};
use tm_common::logging::{init_tracing_subscriber, install_tracing_panic_hook};
use tm_common::matching::MatchingConfig;
use tm_common::scheduler::{BatchScheduler, SchedulerConfig};
use tm_common::service::MatchingService;
use tm_common::store::{
    DbPoolError, HEALTH_CHECK_ATTEMPTS, HEALTH_CHECK_DELAY, MigrationError, PgPool,
    PostgresVectorStore, StoreError, create_pool_from_url, run_migrations, wait_until_healthy,
};
use tm_common::{Category, MatchingError, UserProfile};
use tracing::info;

const APP_NAME: &str = "tm-recompute";

#[derive(Debug, Parser)]
#[command(
    name = "tm-recompute",
    about = "Recompute and maintain friend/couple similarity maps"
)]
struct Cli {
    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL")]
    db_url: String,

    /// Maximum pooled connections
    #[arg(long, env = "TM_DB_POOL_SIZE", default_value_t = 16)]
    pool_size: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply pending schema migrations and exit
    Migrate,
    /// Recompute every user in both categories
    RecomputeAll {
        /// Concurrent tasks (defaults to TM_WORKER_COUNT or 75% of the cores)
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Recompute one user; both categories unless one is given
    UpdateUser {
        user_id: String,
        #[arg(long)]
        category: Option<Category>,
    },
    /// Register a profile read from a JSON file
    RegisterUser { profile: PathBuf },
    /// Remove a user and every similarity entry that mentions them
    DeleteUser { user_id: String },
    /// Print the best-scoring user ids
    TopMatches {
        user_id: String,
        #[arg(long, default_value = "friend")]
        category: Category,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("database pool error: {0}")]
    DbPool(#[from] DbPoolError),
    #[error("migration failed: {0}")]
    Migration(#[from] MigrationError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("encoder error: {0}")]
    Encoder(#[from] EncodingError),
    #[error("{code}: {source}")]
    Matching {
        code: &'static str,
        source: MatchingError,
    },
    #[error("failed to read profile file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid profile json: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<MatchingError> for CliError {
    fn from(source: MatchingError) -> Self {
        CliError::Matching {
            code: source.code(),
            source,
        }
    }
}

async fn connect(cli: &Cli) -> Result<PgPool, CliError> {
    let pool = create_pool_from_url(&cli.db_url, cli.pool_size)?;
    let applied = run_migrations(&pool).await?;
    info!(applied, "schema migrations checked");
    Ok(pool)
}

async fn build_service(pool: PgPool) -> Result<Arc<MatchingService>, CliError> {
    let store = Arc::new(PostgresVectorStore::new(pool));
    wait_until_healthy(store.as_ref(), HEALTH_CHECK_ATTEMPTS, HEALTH_CHECK_DELAY).await?;

    let encoder_config = EncoderConfig::from_env();
    let encoder = create_encoder(&encoder_config)?;
    info!(
        encoder = encoder.name(),
        dimension = encoder.dimension(),
        "encoder ready"
    );

    Ok(Arc::new(MatchingService::new(
        encoder,
        store,
        MatchingConfig::from_env(),
    )))
}

fn categories(category: Option<Category>) -> Vec<Category> {
    category.map_or_else(|| Category::ALL.to_vec(), |c| vec![c])
}

async fn run() -> Result<(), CliError> {
    dotenv().ok();
    init_tracing_subscriber(APP_NAME);
    install_tracing_panic_hook(APP_NAME);

    let cli = Cli::parse();
    let pool = connect(&cli).await?;
    if matches!(cli.command, Command::Migrate) {
        return Ok(());
    }
    let service = build_service(pool).await?;

    match cli.command {
        Command::Migrate => {}
        Command::RecomputeAll { workers } => {
            let mut config = SchedulerConfig::from_env();
            if let Some(workers) = workers.filter(|w| *w > 0) {
                config.worker_count = workers;
            }
            let summary = BatchScheduler::new(service, config).recompute_all().await?;
            println!("{}", serde_json::to_string(&summary)?);
        }
        Command::UpdateUser { user_id, category } => {
            for category in categories(category) {
                let size = service
                    .update_similarity_for_user(&user_id, category, None)
                    .await?;
                info!(%user_id, category = category.as_ref(), entries = size, "user updated");
            }
        }
        Command::RegisterUser { profile } => {
            let raw = std::fs::read_to_string(&profile)?;
            let profile: UserProfile = serde_json::from_str(&raw)?;
            let registration = service.register_user(profile).await?;
            info!(
                user_id = %registration.user_id,
                friend_matches = registration.friend_matches,
                couple_matches = registration.couple_matches,
                "user registered"
            );
        }
        Command::DeleteUser { user_id } => {
            let deletion = service.delete_user(&user_id).await?;
            if !deletion.profile_removed {
                info!(%user_id, "no stored profile; similarity entries purged");
            }
        }
        Command::TopMatches {
            user_id,
            category,
            limit,
        } => {
            for id in service.top_matches(&user_id, category, limit).await? {
                println!("{id}");
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        tracing::error!(error = %err, "tm-recompute failed");
        std::process::exit(1);
    }
}
