use crate::{CliError, CliResult};
use lifesync_core::db::open_db;
use lifesync_core::{
    load_config, namespace_depths, ClientContext, ConsentGate, CoreConfig, EventBody, EventKind,
    FlushStatus, HttpApi, KeyValueStore, OwnerKey, ProgressApi, SqliteEntityStore, SqliteKvStore,
    SyncOrchestrator, TrackOutcome,
};
use std::sync::Arc;

/// Storage and transport shared by every subcommand of one invocation.
pub struct Session {
    db_path: String,
    config: CoreConfig,
    store: Arc<dyn KeyValueStore>,
}

impl Session {
    pub fn open(db_path: &str, config_path: Option<&str>) -> Result<Self, CliError> {
        let config = match config_path {
            Some(path) => load_config(path).map_err(|err| CliError::new("config_invalid", err))?,
            None => CoreConfig::default(),
        };
        let store = SqliteKvStore::open(db_path)
            .map_err(|err| CliError::new("storage_open_failed", err))?;
        Ok(Self {
            db_path: db_path.to_string(),
            config,
            store: Arc::new(store),
        })
    }

    fn context(&self) -> ClientContext {
        let api: Arc<dyn ProgressApi> = Arc::new(HttpApi::new(&self.config));
        ClientContext::open_without_notices(&self.config, self.store.clone(), api)
    }

    pub fn status(&self) -> CliResult {
        let depths = namespace_depths(self.store.as_ref());
        let total: usize = depths.iter().map(|(_, depth)| depth).sum();
        println!("consent={}", ConsentGate::new(self.store.clone()).state().as_str());
        println!("pending_total={total} namespaces={}", depths.len());
        for (namespace, depth) in depths {
            println!("namespace={namespace} pending={depth}");
        }
        Ok(())
    }

    pub fn track(&self, kind: EventKind, subject: String, path: Option<String>) -> CliResult {
        let mut body = EventBody::new(kind, subject);
        if let Some(path) = path {
            body = body.with_path(path);
        }
        let context = self.context();
        let outcome = context.track(body);
        // Leftovers stay for the next context to adopt.
        context.detach();
        match outcome {
            TrackOutcome::Delivered => println!("delivered"),
            TrackOutcome::Queued(enqueued) => println!("queued outcome={enqueued:?}"),
            TrackOutcome::DroppedNoConsent => println!("dropped reason=consent_declined"),
            TrackOutcome::Rejected(err) => return Err(CliError::new("event_rejected", err)),
            TrackOutcome::Invalid(err) => return Err(CliError::new("event_invalid", err)),
        }
        Ok(())
    }

    pub fn flush(&self) -> CliResult {
        let context = self.context();
        let report = context.flush();
        context.detach();
        println!(
            "adopted={} delivered={} rejected={} discarded={} remaining={}",
            report.adopted,
            report.delivered.len(),
            report.rejected.len(),
            report.discarded,
            report.remaining
        );
        match report.status {
            FlushStatus::Drained => Ok(()),
            FlushStatus::Stopped { error } => Err(CliError::new("flush_stopped", error)),
            FlushStatus::BlockedByConsent => {
                Err(CliError::new("consent_declined", "delivery is disabled"))
            }
            other => Err(CliError::new("flush_incomplete", format!("{other:?}"))),
        }
    }

    pub fn sync(&self, owner: &str) -> CliResult {
        let owner: OwnerKey = owner
            .parse()
            .map_err(|err| CliError::new("owner_invalid", err))?;
        let conn = open_db(&self.db_path).map_err(|err| CliError::new("db_open_failed", err))?;
        let orchestrator =
            SyncOrchestrator::new(SqliteEntityStore::new(&conn), HttpApi::new(&self.config));
        let report = orchestrator
            .run(&owner)
            .map_err(|err| CliError::new("sync_failed", err))?;

        println!(
            "owner={} pulled={} synced={} failed={}",
            report.owner_key,
            report.pulled,
            report.synced(),
            report.failed()
        );
        for result in report.results.iter().filter(|result| !result.is_success()) {
            println!(
                "failed kind={} id={} outcome={:?}",
                result.kind.as_str(),
                result.id,
                result.outcome
            );
        }
        Ok(())
    }

    pub fn adopt(&self, device: &str, account: &str) -> CliResult {
        let device = OwnerKey::device(device);
        let account = OwnerKey::account(account);
        let conn = open_db(&self.db_path).map_err(|err| CliError::new("db_open_failed", err))?;
        let orchestrator =
            SyncOrchestrator::new(SqliteEntityStore::new(&conn), HttpApi::new(&self.config));
        let moved = orchestrator
            .adopt_device_records(&device, &account)
            .map_err(|err| CliError::new("adopt_failed", err))?;
        println!("moved={moved} from={device} to={account}");
        Ok(())
    }

    pub fn consent_enable(&self) -> CliResult {
        let context = self.context();
        let result = context.enable_consent();
        context.detach();
        let state = result.map_err(|err| CliError::new("consent_not_confirmed", err))?;
        println!("consent={}", state.as_str());
        Ok(())
    }

    pub fn consent_decline(&self) -> CliResult {
        let context = self.context();
        let state = context.decline_consent();
        context.detach();
        println!("consent={}", state.as_str());
        Ok(())
    }

    pub fn consent_show(&self) -> CliResult {
        println!("consent={}", ConsentGate::new(self.store.clone()).state().as_str());
        Ok(())
    }
}
