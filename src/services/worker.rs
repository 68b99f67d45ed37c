use std::sync::Arc;
use std::time::Duration;

use sea_orm::sea_query::{LockBehavior, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use sea_orm::sea_query::Expr;
use tokio::time::sleep;
use uuid::Uuid;

use crate::entities::{audio_file, conversion_job, document};
use crate::error::AppError;
use crate::services::extractor;
use crate::services::storage::StorageService;
use crate::services::tts::SpeechSynthesizer;

const POLL_INTERVAL_SECS: u64 = 5;

/// Result of asking for a conversion. Repeat requests are answered with a
/// status instead of an error.
#[derive(Debug, PartialEq, Eq)]
pub enum TriggerOutcome {
    Queued,
    AlreadyProcessing,
    AlreadyConverted,
}

/// Flips the document's processing flag and inserts a pending job.
///
/// The flag update filters on `is_processing = false`, so two concurrent
/// triggers race on a single atomic check-and-set: exactly one sees a row
/// affected, the other is told the document is already processing.
pub async fn enqueue(
    db: &DatabaseConnection,
    doc: &document::Model,
) -> Result<TriggerOutcome, AppError> {
    let artifacts = audio_file::Entity::find()
        .filter(audio_file::Column::DocumentId.eq(doc.id))
        .count(db)
        .await?;
    if artifacts > 0 {
        return Ok(TriggerOutcome::AlreadyConverted);
    }

    let claimed = document::Entity::update_many()
        .col_expr(document::Column::IsProcessing, Expr::value(true))
        .col_expr(
            document::Column::UpdatedAt,
            Expr::value(chrono::Utc::now().naive_utc()),
        )
        .filter(document::Column::Id.eq(doc.id))
        .filter(document::Column::IsProcessing.eq(false))
        .exec(db)
        .await?;

    if claimed.rows_affected == 0 {
        return Ok(TriggerOutcome::AlreadyProcessing);
    }

    let job = conversion_job::ActiveModel {
        id: Set(Uuid::new_v4()),
        document_id: Set(doc.id),
        status: Set("pending".to_string()),
        error: Set(None),
        created_at: Set(chrono::Utc::now().naive_utc()),
        updated_at: Set(chrono::Utc::now().naive_utc()),
    };

    if let Err(e) = job.insert(db).await {
        // Without a job row nothing would ever clear the flag, so undo the
        // claim before reporting the error.
        let _ = document::Entity::update_many()
            .col_expr(document::Column::IsProcessing, Expr::value(false))
            .filter(document::Column::Id.eq(doc.id))
            .exec(db)
            .await;
        return Err(AppError::DatabaseError(e));
    }

    Ok(TriggerOutcome::Queued)
}

pub struct Worker {
    db: DatabaseConnection,
    storage: StorageService,
    synthesizer: Arc<SpeechSynthesizer>,
}

impl Worker {
    pub fn new(
        db: DatabaseConnection,
        storage: StorageService,
        synthesizer: Arc<SpeechSynthesizer>,
    ) -> Self {
        Self {
            db,
            storage,
            synthesizer,
        }
    }

    pub async fn run(&self) {
        tracing::info!("Worker started");

        // Reclaim work left behind by a previous run that died mid-job.
        if let Err(e) = self.recover_stuck_jobs().await {
            tracing::error!("Failed to recover stuck jobs: {}", e);
        }

        loop {
            if let Err(e) = self.process_next_job().await {
                tracing::error!("Worker error: {}", e);
            }
            sleep(Duration::from_secs(POLL_INTERVAL_SECS)).await;
        }
    }

    /// Startup recovery sweep. Jobs stuck in 'processing' go back to
    /// 'pending' for a fresh attempt, and documents whose flag is raised
    /// without any live job get the flag lowered.
    ///
    /// Safe with a single worker; multiple workers would need a heartbeat
    /// or timeout check instead.
    pub async fn recover_stuck_jobs(&self) -> Result<(), String> {
        let backend = self.db.get_database_backend();

        let reset = self
            .db
            .execute(sea_orm::Statement::from_string(
                backend,
                "UPDATE conversion_jobs SET status = 'pending' WHERE status = 'processing'"
                    .to_owned(),
            ))
            .await
            .map_err(|e| e.to_string())?;

        if reset.rows_affected() > 0 {
            tracing::info!(
                "Recovered {} stuck jobs (reset to pending)",
                reset.rows_affected()
            );
        }

        let cleared = self
            .db
            .execute(sea_orm::Statement::from_string(
                backend,
                "UPDATE documents SET is_processing = FALSE WHERE is_processing = TRUE \
                 AND id NOT IN (SELECT document_id FROM conversion_jobs \
                 WHERE status IN ('pending', 'processing'))"
                    .to_owned(),
            ))
            .await
            .map_err(|e| e.to_string())?;

        if cleared.rows_affected() > 0 {
            tracing::info!(
                "Cleared {} orphaned processing flags",
                cleared.rows_affected()
            );
        }

        Ok(())
    }

    async fn process_next_job(&self) -> Result<(), String> {
        let txn = self.db.begin().await.map_err(|e| e.to_string())?;

        let job_opt = conversion_job::Entity::find()
            .filter(conversion_job::Column::Status.eq("pending"))
            .order_by_asc(conversion_job::Column::CreatedAt)
            .limit(1)
            .lock_with_behavior(LockType::Update, LockBehavior::SkipLocked)
            .one(&txn)
            .await
            .map_err(|e| e.to_string())?;

        let job_model = match job_opt {
            Some(j) => j,
            None => return Ok(()), // No jobs
        };

        tracing::info!("Worker picked up job {}", job_model.id);

        let mut job_active: conversion_job::ActiveModel = job_model.clone().into();
        job_active.status = Set("processing".to_string());
        job_active.updated_at = Set(chrono::Utc::now().naive_utc());
        let job_model = job_active.update(&txn).await.map_err(|e| e.to_string())?;

        // Commit to release the row lock before the slow part starts.
        txn.commit().await.map_err(|e| e.to_string())?;

        let started = std::time::Instant::now();
        let result = self.handle_job(&job_model).await;

        if result.is_ok() {
            tracing::info!(
                "Job {} completed successfully took {:.2?}",
                job_model.id,
                started.elapsed()
            );
        }

        self.finish_job(job_model, result).await
    }

    /// Records the terminal job state and lowers the document's processing
    /// flag. Runs for success and failure alike; the flag is lowered even
    /// when the job update itself fails.
    async fn finish_job(
        &self,
        job: conversion_job::Model,
        result: Result<(), String>,
    ) -> Result<(), String> {
        let job_id = job.id;
        let document_id = job.document_id;
        let mut job_active: conversion_job::ActiveModel = job.into();

        match result {
            Ok(()) => {
                job_active.status = Set("completed".to_string());
            }
            Err(e) => {
                tracing::error!("Job {} failed: {}", job_id, e);
                job_active.status = Set("failed".to_string());
                job_active.error = Set(Some(e));
            }
        }
        job_active.updated_at = Set(chrono::Utc::now().naive_utc());

        // The flag goes down first; a failed job update then cannot leave
        // the document claimed until the next restart sweep.
        let flag_lowered = self.clear_processing_flag(document_id).await;
        job_active.update(&self.db).await.map_err(|e| e.to_string())?;
        flag_lowered
    }

    async fn clear_processing_flag(&self, document_id: Uuid) -> Result<(), String> {
        document::Entity::update_many()
            .col_expr(document::Column::IsProcessing, Expr::value(false))
            .col_expr(
                document::Column::UpdatedAt,
                Expr::value(chrono::Utc::now().naive_utc()),
            )
            .filter(document::Column::Id.eq(document_id))
            .exec(&self.db)
            .await
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    /// One conversion attempt: read the source, extract text, synthesize,
    /// persist the artifact row. Any error leaves no artifact behind.
    /// Replay-safe: a document that already has an artifact is treated as
    /// done, never given a second one.
    async fn handle_job(&self, job: &conversion_job::Model) -> Result<(), String> {
        // A crash between the artifact insert and the terminal job update
        // replays this job on restart. The first run's artifact already
        // satisfies it.
        let existing = audio_file::Entity::find()
            .filter(audio_file::Column::DocumentId.eq(job.document_id))
            .count(&self.db)
            .await
            .map_err(|e| e.to_string())?;
        if existing > 0 {
            tracing::info!(
                "Job {} | document {} already has an artifact, treating as done",
                job.id,
                job.document_id
            );
            return Ok(());
        }

        let doc = document::Entity::find_by_id(job.document_id)
            .one(&self.db)
            .await
            .map_err(|e| e.to_string())?
            .ok_or("Document not found")?;

        let pdf_bytes = self
            .storage
            .read_document(&doc.stored_filename)
            .await
            .map_err(|e| e.to_string())?;

        let extracted = tokio::task::spawn_blocking(move || extractor::extract(&pdf_bytes))
            .await
            .map_err(|e| format!("Task join error: {}", e))?
            .map_err(|e| format!("Extraction failed: {}", e))?;

        if extracted.text.trim().is_empty() {
            return Err("No extractable text in document".to_string());
        }

        tracing::info!(
            "Job {} | document {} | extracted {} chars from {} pages",
            job.id,
            doc.id,
            extracted.text.chars().count(),
            extracted.page_count
        );

        let (filename, duration) = self
            .synthesizer
            .synthesize_to_file(&extracted.text, self.storage.audio_dir())
            .await;
        let filename = filename.ok_or("Speech synthesis failed in every provider")?;

        let audio = audio_file::ActiveModel {
            id: Set(Uuid::new_v4()),
            document_id: Set(doc.id),
            stored_filename: Set(filename.clone()),
            duration_seconds: Set(duration),
            created_at: Set(chrono::Utc::now().naive_utc()),
        };

        if let Err(e) = audio.insert(&self.db).await {
            // Do not leave an artifact file the database knows nothing about.
            let _ = self.storage.remove_audio(&filename).await;
            return Err(e.to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::user;
    use lopdf::{dictionary, Object, Stream};
    use migration::{Migrator, MigratorTrait};
    use sea_orm::Database;

    async fn test_db() -> DatabaseConnection {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        db
    }

    async fn seed_user(db: &DatabaseConnection) -> user::Model {
        user::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(format!("{}@example.com", Uuid::new_v4().simple())),
            name: Set("Test User".to_string()),
            created_at: Set(chrono::Utc::now().naive_utc()),
            stripe_customer_id: Set(None),
            stripe_subscription_id: Set(None),
            subscription_status: Set(user::STATUS_ACTIVE.to_string()),
            subscription_end_date: Set(None),
        }
        .insert(db)
        .await
        .unwrap()
    }

    async fn seed_document(db: &DatabaseConnection, owner: &user::Model) -> document::Model {
        document::ActiveModel {
            id: Set(Uuid::new_v4()),
            owner_id: Set(owner.id),
            title: Set("Test Paper".to_string()),
            stored_filename: Set(format!("{}_test.pdf", Uuid::new_v4().simple())),
            size_bytes: Set(1024),
            page_count: Set(1),
            is_processing: Set(false),
            created_at: Set(chrono::Utc::now().naive_utc()),
            updated_at: Set(chrono::Utc::now().naive_utc()),
        }
        .insert(db)
        .await
        .unwrap()
    }

    fn one_page_pdf(text: &str) -> Vec<u8> {
        let mut doc = lopdf::Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let content = format!("BT /F1 12 Tf 50 700 Td ({}) Tj ET", text);
        let content_id = doc.add_object(Object::Stream(Stream::new(
            dictionary! {},
            content.into_bytes(),
        )));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Resources" => resources_id,
            "Contents" => content_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    fn worker_with(
        db: &DatabaseConnection,
        dir: &tempfile::TempDir,
        synthesizer: SpeechSynthesizer,
    ) -> Worker {
        Worker::new(
            db.clone(),
            StorageService::new(dir.path().join("uploads"), dir.path().join("audio")),
            Arc::new(synthesizer),
        )
    }

    async fn fetch_document(db: &DatabaseConnection, id: Uuid) -> document::Model {
        document::Entity::find_by_id(id).one(db).await.unwrap().unwrap()
    }

    async fn fetch_job(db: &DatabaseConnection, document_id: Uuid) -> conversion_job::Model {
        conversion_job::Entity::find()
            .filter(conversion_job::Column::DocumentId.eq(document_id))
            .one(db)
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn enqueue_claims_the_flag_and_creates_a_pending_job() {
        let db = test_db().await;
        let owner = seed_user(&db).await;
        let doc = seed_document(&db, &owner).await;

        let outcome = enqueue(&db, &doc).await.unwrap();
        assert_eq!(outcome, TriggerOutcome::Queued);

        assert!(fetch_document(&db, doc.id).await.is_processing);
        assert_eq!(fetch_job(&db, doc.id).await.status, "pending");
    }

    #[tokio::test]
    async fn second_trigger_while_processing_is_a_noop() {
        let db = test_db().await;
        let owner = seed_user(&db).await;
        let doc = seed_document(&db, &owner).await;

        assert_eq!(enqueue(&db, &doc).await.unwrap(), TriggerOutcome::Queued);
        assert_eq!(
            enqueue(&db, &doc).await.unwrap(),
            TriggerOutcome::AlreadyProcessing
        );

        let jobs = conversion_job::Entity::find()
            .filter(conversion_job::Column::DocumentId.eq(doc.id))
            .count(&db)
            .await
            .unwrap();
        assert_eq!(jobs, 1);
    }

    #[tokio::test]
    async fn trigger_with_existing_artifact_is_a_noop() {
        let db = test_db().await;
        let owner = seed_user(&db).await;
        let doc = seed_document(&db, &owner).await;

        audio_file::ActiveModel {
            id: Set(Uuid::new_v4()),
            document_id: Set(doc.id),
            stored_filename: Set("existing.mp3".to_string()),
            duration_seconds: Set(12.0),
            created_at: Set(chrono::Utc::now().naive_utc()),
        }
        .insert(&db)
        .await
        .unwrap();

        assert_eq!(
            enqueue(&db, &doc).await.unwrap(),
            TriggerOutcome::AlreadyConverted
        );
        assert!(!fetch_document(&db, doc.id).await.is_processing);

        let jobs = conversion_job::Entity::find().count(&db).await.unwrap();
        assert_eq!(jobs, 0);
    }

    #[tokio::test]
    async fn successful_job_persists_artifact_and_clears_flag() {
        let db = test_db().await;
        let owner = seed_user(&db).await;
        let doc = seed_document(&db, &owner).await;
        let dir = tempfile::tempdir().unwrap();
        let worker = worker_with(
            &db,
            &dir,
            SpeechSynthesizer::new(vec![Arc::new(crate::services::tts::SilentTts)]),
        );
        worker.storage.ensure_dirs().await.unwrap();
        worker
            .storage
            .store_document(&doc.stored_filename, one_page_pdf("Hello from the worker"))
            .await
            .unwrap();

        assert_eq!(enqueue(&db, &doc).await.unwrap(), TriggerOutcome::Queued);
        let job = fetch_job(&db, doc.id).await;

        let result = worker.handle_job(&job).await;
        assert!(result.is_ok(), "handle_job failed: {:?}", result);
        worker.finish_job(job, result).await.unwrap();

        let artifacts = audio_file::Entity::find()
            .filter(audio_file::Column::DocumentId.eq(doc.id))
            .all(&db)
            .await
            .unwrap();
        assert_eq!(artifacts.len(), 1);
        assert!(artifacts[0].duration_seconds > 0.0);
        assert!(dir
            .path()
            .join("audio")
            .join(&artifacts[0].stored_filename)
            .exists());

        assert!(!fetch_document(&db, doc.id).await.is_processing);
        assert_eq!(fetch_job(&db, doc.id).await.status, "completed");
    }

    #[tokio::test]
    async fn missing_source_file_fails_the_job_and_clears_flag() {
        let db = test_db().await;
        let owner = seed_user(&db).await;
        let doc = seed_document(&db, &owner).await;
        let dir = tempfile::tempdir().unwrap();
        let worker = worker_with(
            &db,
            &dir,
            SpeechSynthesizer::new(vec![Arc::new(crate::services::tts::SilentTts)]),
        );
        worker.storage.ensure_dirs().await.unwrap();
        // No source file written.

        enqueue(&db, &doc).await.unwrap();
        let job = fetch_job(&db, doc.id).await;

        let result = worker.handle_job(&job).await;
        assert!(result.is_err());
        worker.finish_job(job, result).await.unwrap();

        let refreshed = fetch_job(&db, doc.id).await;
        assert_eq!(refreshed.status, "failed");
        assert!(refreshed.error.is_some());
        assert!(!fetch_document(&db, doc.id).await.is_processing);

        let artifacts = audio_file::Entity::find().count(&db).await.unwrap();
        assert_eq!(artifacts, 0);
    }

    #[tokio::test]
    async fn synthesis_total_failure_reverts_to_idle() {
        let db = test_db().await;
        let owner = seed_user(&db).await;
        let doc = seed_document(&db, &owner).await;
        let dir = tempfile::tempdir().unwrap();
        // Empty chain: every synthesis attempt fails.
        let worker = worker_with(&db, &dir, SpeechSynthesizer::new(Vec::new()));
        worker.storage.ensure_dirs().await.unwrap();
        worker
            .storage
            .store_document(&doc.stored_filename, one_page_pdf("Some text"))
            .await
            .unwrap();

        enqueue(&db, &doc).await.unwrap();
        let job = fetch_job(&db, doc.id).await;

        let result = worker.handle_job(&job).await;
        assert!(result.is_err());
        worker.finish_job(job, result).await.unwrap();

        assert!(!fetch_document(&db, doc.id).await.is_processing);
        assert_eq!(fetch_job(&db, doc.id).await.status, "failed");

        // A failed attempt leaves the document eligible for a fresh one.
        assert_eq!(enqueue(&db, &doc).await.unwrap(), TriggerOutcome::Queued);
    }

    #[tokio::test]
    async fn recovery_resets_stuck_jobs_and_orphaned_flags() {
        let db = test_db().await;
        let owner = seed_user(&db).await;
        let stuck = seed_document(&db, &owner).await;
        let orphaned = seed_document(&db, &owner).await;
        let dir = tempfile::tempdir().unwrap();
        let worker = worker_with(&db, &dir, SpeechSynthesizer::new(Vec::new()));

        // A job that died mid-processing.
        enqueue(&db, &stuck).await.unwrap();
        let job = fetch_job(&db, stuck.id).await;
        let mut active: conversion_job::ActiveModel = job.into();
        active.status = Set("processing".to_string());
        active.update(&db).await.unwrap();

        // A raised flag with no job behind it.
        document::Entity::update_many()
            .col_expr(document::Column::IsProcessing, Expr::value(true))
            .filter(document::Column::Id.eq(orphaned.id))
            .exec(&db)
            .await
            .unwrap();

        worker.recover_stuck_jobs().await.unwrap();

        // Stuck job is pending again and its document keeps the claim.
        assert_eq!(fetch_job(&db, stuck.id).await.status, "pending");
        assert!(fetch_document(&db, stuck.id).await.is_processing);

        // The orphaned flag is lowered.
        assert!(!fetch_document(&db, orphaned.id).await.is_processing);
    }

    #[tokio::test]
    async fn replayed_job_after_crash_keeps_a_single_artifact() {
        let db = test_db().await;
        let owner = seed_user(&db).await;
        let doc = seed_document(&db, &owner).await;
        let dir = tempfile::tempdir().unwrap();
        let worker = worker_with(
            &db,
            &dir,
            SpeechSynthesizer::new(vec![Arc::new(crate::services::tts::SilentTts)]),
        );
        worker.storage.ensure_dirs().await.unwrap();
        worker
            .storage
            .store_document(&doc.stored_filename, one_page_pdf("Replay me"))
            .await
            .unwrap();

        enqueue(&db, &doc).await.unwrap();
        let job = fetch_job(&db, doc.id).await;
        let mut active: conversion_job::ActiveModel = job.into();
        active.status = Set("processing".to_string());
        let job = active.update(&db).await.unwrap();

        // First run persists the artifact, then the process dies before the
        // terminal job update.
        worker.handle_job(&job).await.unwrap();
        worker.recover_stuck_jobs().await.unwrap();

        let job = fetch_job(&db, doc.id).await;
        assert_eq!(job.status, "pending");

        // Replay after restart.
        let result = worker.handle_job(&job).await;
        assert!(result.is_ok(), "replay failed: {:?}", result);
        worker.finish_job(job, result).await.unwrap();

        let artifacts = audio_file::Entity::find()
            .filter(audio_file::Column::DocumentId.eq(doc.id))
            .all(&db)
            .await
            .unwrap();
        assert_eq!(artifacts.len(), 1);

        let audio_files = std::fs::read_dir(dir.path().join("audio")).unwrap().count();
        assert_eq!(audio_files, 1);

        assert_eq!(fetch_job(&db, doc.id).await.status, "completed");
        assert!(!fetch_document(&db, doc.id).await.is_processing);
    }

    #[tokio::test]
    async fn flag_is_lowered_even_when_the_job_update_fails() {
        let db = test_db().await;
        let owner = seed_user(&db).await;
        let doc = seed_document(&db, &owner).await;
        let dir = tempfile::tempdir().unwrap();
        let worker = worker_with(&db, &dir, SpeechSynthesizer::new(Vec::new()));

        enqueue(&db, &doc).await.unwrap();
        let job = fetch_job(&db, doc.id).await;

        // A job row vanishing under the terminal update stands in for a
        // transient database failure.
        conversion_job::Entity::delete_by_id(job.id)
            .exec(&db)
            .await
            .unwrap();

        let finish = worker.finish_job(job, Ok(())).await;
        assert!(finish.is_err());
        assert!(!fetch_document(&db, doc.id).await.is_processing);
    }
}
