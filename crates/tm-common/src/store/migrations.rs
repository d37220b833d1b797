use std::collections::HashSet;

use deadpool_postgres::PoolError;
use thiserror::Error;
use tokio_postgres::Error as PgError;
use tracing::{debug, info, instrument};

use super::PgPool;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("failed to get postgres connection: {0}")]
    Pool(#[from] PoolError),
    #[error("failed to run migration: {0}")]
    Postgres(#[from] PgError),
}

struct Migration {
    id: i32,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        id: 1,
        description: "profile and similarity collections",
        sql: r#"
CREATE TABLE IF NOT EXISTS tuning.user_profiles (
    id TEXT PRIMARY KEY,
    embedding REAL[],
    metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS tuning.similarity_friend (
    id TEXT PRIMARY KEY,
    embedding REAL[],
    metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS tuning.similarity_couple (
    id TEXT PRIMARY KEY,
    embedding REAL[],
    metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
"#,
    },
];

const BOOTSTRAP_SQL: &str = r#"
CREATE SCHEMA IF NOT EXISTS tuning;
CREATE TABLE IF NOT EXISTS tuning.schema_migrations (
    id INTEGER PRIMARY KEY,
    description TEXT NOT NULL,
    applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
"#;

fn pending(applied: &HashSet<i32>) -> impl Iterator<Item = &'static Migration> + '_ {
    MIGRATIONS.iter().filter(|m| !applied.contains(&m.id))
}

/// Create the `tuning` schema and apply every migration not yet recorded, each in its own
/// transaction. Returns how many were applied.
#[instrument(skip(pool))]
pub async fn run_migrations(pool: &PgPool) -> Result<usize, MigrationError> {
    let mut client = pool.get().await?;
    client.batch_execute(BOOTSTRAP_SQL).await?;

    let applied: HashSet<i32> = client
        .query("SELECT id FROM tuning.schema_migrations", &[])
        .await?
        .iter()
        .map(|row| row.get::<_, i32>(0))
        .collect();

    let mut count = 0;
    for migration in pending(&applied) {
        let tx = client.transaction().await?;
        tx.batch_execute(migration.sql).await?;
        tx.execute(
            "INSERT INTO tuning.schema_migrations (id, description) VALUES ($1, $2)",
            &[&migration.id, &migration.description],
        )
        .await?;
        tx.commit().await?;
        count += 1;
        info!(id = migration.id, description = migration.description, "migration applied");
    }

    if count == 0 {
        debug!(latest = MIGRATIONS.len(), "schema up to date");
    }
    Ok(count)
}
