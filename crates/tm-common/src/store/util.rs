#![allow(async_fn_in_trait)]

use std::future::Future;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use deadpool_postgres::GenericClient;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Error as PgError, Row, ToStatement};
use tracing::warn;

type Params<'a> = &'a [&'a (dyn ToSql + Sync)];

/// `TM_DB_LOG_MIN_DURATION_MS`, read once. Unset, zero or unparsable disables slow logging.
fn slow_threshold() -> Option<Duration> {
    static THRESHOLD: OnceLock<Option<Duration>> = OnceLock::new();
    *THRESHOLD.get_or_init(|| {
        std::env::var("TM_DB_LOG_MIN_DURATION_MS")
            .ok()
            .and_then(|raw| parse_threshold(&raw))
    })
}

fn parse_threshold(raw: &str) -> Option<Duration> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}

async fn timed<T>(label: &str, fut: impl Future<Output = T>) -> T {
    let Some(threshold) = slow_threshold() else {
        return fut.await;
    };
    let started = Instant::now();
    let out = fut.await;
    let elapsed = started.elapsed();
    if elapsed >= threshold {
        warn!(query = label, elapsed_ms = elapsed.as_millis() as u64, "slow store query");
    }
    out
}

/// Statement helpers that log anything slower than `TM_DB_LOG_MIN_DURATION_MS`.
pub trait TimedClientExt: GenericClient {
    async fn timed_query<S>(&self, statement: &S, params: Params<'_>, label: &str) -> Result<Vec<Row>, PgError>
    where
        S: ToStatement + Sync + Send + ?Sized,
    {
        timed(label, self.query(statement, params)).await
    }

    async fn timed_execute<S>(&self, statement: &S, params: Params<'_>, label: &str) -> Result<u64, PgError>
    where
        S: ToStatement + Sync + Send + ?Sized,
    {
        timed(label, self.execute(statement, params)).await
    }

    /// Prepared through the connection's statement cache; preparation counts toward the timing.
    async fn timed_execute_cached(&self, statement: &str, params: Params<'_>, label: &str) -> Result<u64, PgError> {
        timed(label, async {
            let prepared = self.prepare_cached(statement).await?;
            let affected = self.execute(&prepared, params).await?;
            Ok::<u64, PgError>(affected)
        })
        .await
    }
}

impl<T: GenericClient + ?Sized> TimedClientExt for T {}
