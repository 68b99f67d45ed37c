use chrono::Utc;
use sea_orm::{ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter};
use std::time::Duration;

use crate::entities::conversion_job;

const SWEEP_INTERVAL_SECS: u64 = 86400;
const RETAIN_DAYS: i64 = 30;

/// Prunes terminal conversion jobs so the history table does not grow
/// without bound. Documents and artifacts are never touched here.
pub struct CleanupService {
    db: DatabaseConnection,
}

impl CleanupService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn run_scheduler(self) {
        tracing::info!("Cleanup Scheduler | Started");
        let mut interval = tokio::time::interval(Duration::from_secs(SWEEP_INTERVAL_SECS));

        loop {
            interval.tick().await;
            tracing::info!("Cleanup Scheduler | Running cleanups...");

            if let Err(e) = self.prune_old_jobs().await {
                tracing::error!("Cleanup Scheduler | Error pruning jobs: {}", e);
            }
        }
    }

    async fn prune_old_jobs(&self) -> Result<(), sea_orm::DbErr> {
        let threshold = Utc::now().naive_utc() - chrono::Duration::days(RETAIN_DAYS);

        let res = conversion_job::Entity::delete_many()
            .filter(
                Condition::any()
                    .add(conversion_job::Column::Status.eq("completed"))
                    .add(conversion_job::Column::Status.eq("failed")),
            )
            .filter(conversion_job::Column::UpdatedAt.lt(threshold))
            .exec(&self.db)
            .await?;

        if res.rows_affected > 0 {
            tracing::info!(
                "Cleanup Scheduler | Pruned {} finished jobs older than {} days",
                res.rows_affected,
                RETAIN_DAYS
            );
        }

        Ok(())
    }
}
