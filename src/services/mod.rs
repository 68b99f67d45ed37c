use std::sync::Arc;

use sea_orm::DatabaseConnection;

pub mod billing;
pub mod cleanup;
pub mod extractor;
pub mod storage;
pub mod tts;
pub mod worker;

// Everything the request handlers need, injected once at startup. The
// synthesizer lives with the worker, not here; handlers only enqueue.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub storage: storage::StorageService,
    pub billing: Option<Arc<dyn billing::BillingClient>>,
}
