//! Local-first synchronization core.
//! Owns the progress-event outbox and the card entity sync protocol.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod outbox;
pub mod repo;
pub mod service;
pub mod single_flight;
pub mod storage;
pub mod sync;
pub mod transport;

pub use config::{load_config, ConfigError, CoreConfig};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::consent::ConsentState;
pub use model::entity::{EntityKind, EntityValidationError, OwnerKey, SyncedEntity};
pub use model::event::{EventBody, EventKind, EventValidationError, QueuedEvent};
pub use outbox::consent::ConsentGate;
pub use outbox::lease::{namespace_depths, ContextLease};
pub use outbox::notifier::{
    BroadcastHub, ChannelNotifier, DeliveryNotice, DeliveryNotifier, NoopNotifier,
};
pub use outbox::queue::{DurableQueue, EnqueueOutcome, OverflowPolicy};
pub use outbox::scheduler::{FlushReport, FlushScheduler, FlushStatus, FlushTrigger};
pub use repo::entity_repo::{
    EntitySnapshotStore, RepoError, RepoResult, SnapshotRead, SqliteEntityStore,
    UnreadableSnapshot,
};
pub use service::client_context::ClientContext;
pub use service::progress_service::{ProgressTracker, TrackOutcome};
pub use storage::kv::{KeyValueStore, MemoryKvStore, SqliteKvStore, StorageError};
pub use sync::merge::{resolve, MergeOutcome, MergeSource};
pub use sync::orchestrator::{
    EntityOutcome, EntitySyncResult, SyncError, SyncOrchestrator, SyncReport, SyncStage,
};
pub use transport::api::{CardApi, CardPullResponse, CardSyncRequest, CardSyncResponse, ProgressApi};
pub use transport::error::{SubmitError, SubmitResult};
pub use transport::http::HttpApi;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
