//! Full recomputation over every (user, category) pair.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, instrument};

use crate::error::MatchingError;
use crate::matching::Category;
use crate::service::MatchingService;
use crate::store::StoreError;

/// Users per progress report in the legacy batch job, times the two categories.
pub const DEFAULT_PROGRESS_EVERY: usize = 10 * Category::ALL.len();

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub worker_count: usize,
    pub progress_every: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            progress_every: DEFAULT_PROGRESS_EVERY,
        }
    }
}

/// Three quarters of the available parallelism, at least one.
pub fn default_worker_count() -> usize {
    let available = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (available * 3 / 4).max(1)
}

impl SchedulerConfig {
    /// `TM_WORKER_COUNT` and `TM_PROGRESS_EVERY`; zero or unparsable values keep the defaults.
    pub fn from_env() -> Self {
        fn parse_positive(key: &str, default: usize) -> usize {
            std::env::var(key)
                .ok()
                .and_then(|v| v.trim().parse::<usize>().ok())
                .filter(|v| *v > 0)
                .unwrap_or(default)
        }

        let defaults = Self::default();
        Self {
            worker_count: parse_positive("TM_WORKER_COUNT", defaults.worker_count),
            progress_every: parse_positive("TM_PROGRESS_EVERY", defaults.progress_every),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecomputeSummary {
    pub started_at: DateTime<Utc>,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed_seconds: f64,
}

pub struct BatchScheduler {
    service: Arc<MatchingService>,
    config: SchedulerConfig,
}

impl BatchScheduler {
    pub fn new(service: Arc<MatchingService>, config: SchedulerConfig) -> Self {
        Self { service, config }
    }

    /// Recompute every user in both categories against one shared snapshot.
    ///
    /// Only a failed snapshot fetch is an error; task failures are logged and counted.
    #[instrument(skip(self), fields(workers = self.config.worker_count))]
    pub async fn recompute_all(&self) -> Result<RecomputeSummary, MatchingError> {
        let started = Instant::now();
        let started_at = Utc::now();
        let snapshot = Arc::new(self.service.fetch_snapshot().await?);
        let total = snapshot.len() * Category::ALL.len();
        info!(users = snapshot.len(), tasks = total, "starting recomputation");

        let permits = Arc::new(Semaphore::new(self.config.worker_count.max(1)));
        let mut tasks = JoinSet::new();
        for user_id in snapshot.user_ids() {
            for category in Category::ALL {
                let service = self.service.clone();
                let snapshot = snapshot.clone();
                let permits = permits.clone();
                let user_id = user_id.clone();
                tasks.spawn(async move {
                    let result = match permits.acquire_owned().await {
                        Ok(_permit) => {
                            service
                                .update_similarity_for_user(&user_id, category, Some(&snapshot))
                                .await
                        }
                        Err(closed) => Err(StoreError::Unavailable(closed.to_string()).into()),
                    };
                    (user_id, category, result)
                });
            }
        }

        let mut summary = RecomputeSummary {
            started_at,
            ..Default::default()
        };
        let progress_every = self.config.progress_every.max(1);
        while let Some(joined) = tasks.join_next().await {
            summary.processed += 1;
            match joined {
                Ok((_, _, Ok(_))) => summary.succeeded += 1,
                Ok((user_id, category, Err(err))) => {
                    summary.failed += 1;
                    error!(
                        %user_id,
                        category = category.as_ref(),
                        code = err.code(),
                        error = %err,
                        "similarity update failed"
                    );
                }
                Err(join_err) => {
                    summary.failed += 1;
                    error!(error = %join_err, "similarity task aborted");
                }
            }

            if summary.processed % progress_every == 0 || summary.processed == total {
                info!(
                    processed = summary.processed,
                    total,
                    succeeded = summary.succeeded,
                    failed = summary.failed,
                    "recomputation progress"
                );
            }
        }

        summary.elapsed_seconds = started.elapsed().as_secs_f64();
        info!(
            processed = summary.processed,
            succeeded = summary.succeeded,
            failed = summary.failed,
            elapsed_seconds = summary.elapsed_seconds,
            "recomputation finished"
        );
        Ok(summary)
    }
}
