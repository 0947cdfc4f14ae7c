//! Promise manager - the public API over the record store and resolver registry
//!
//! Every decision about a promise's state is made from a fresh store read. The
//! registry only remembers which pending promises have a live continuation in
//! this process.
//!
//! Lock order is always `gate → registry`. The gate serializes read-check-write
//! sequences on records; observers are invoked after both locks are released, so
//! they may call back into the manager.

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use crate::config::PledgeConfig;
use crate::continuation::ContinuationHandle;
use crate::error::{PledgeError, Result, StoreError};
use crate::lifecycle::LifecycleEvent;
use crate::record::{Outcome, PromiseRecord, PromiseState};
use crate::registry::ResolverRegistry;
use crate::storage::{RecordStore, SqliteStore};
use crate::types::{Correlation, Payload, PromiseId, Rejection};

/// Result of a stale sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Records examined
    pub scanned: usize,
    /// Unresolved records rejected with a timeout
    pub timed_out: usize,
    /// Records deleted (includes the timed-out ones)
    pub removed: usize,
    /// Records skipped because their bytes could not be decoded
    pub unreadable: usize,
}

/// Result of a resume reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Pending handles whose record had reached a terminal state
    pub delivered: usize,
    /// Pending handles whose record no longer exists
    pub abandoned: usize,
    /// Handles still waiting on an unresolved record
    pub pending: usize,
    pub unreadable: usize,
}

/// What handling a lifecycle event did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum EventReport {
    Swept(SweepReport),
    Reconciled(ReconcileReport),
    Skipped,
}

/// Coordinates durable promise records with live continuations
pub struct PromiseManager {
    store: Arc<dyn RecordStore>,
    registry: ResolverRegistry,
    gate: Mutex<()>,
    config: PledgeConfig,
    /// Set while a lifecycle listener is attached
    pub(crate) listening: Arc<AtomicBool>,
}

impl PromiseManager {
    /// Manager with default configuration over an existing store
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self::with_config(store, PledgeConfig::default())
    }

    pub fn with_config(store: Arc<dyn RecordStore>, config: PledgeConfig) -> Self {
        Self {
            store,
            registry: ResolverRegistry::new(),
            gate: Mutex::new(()),
            config,
            listening: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Open the SQLite database named by `config`
    pub fn open(config: PledgeConfig) -> Result<Self> {
        config.validate()?;
        let store = SqliteStore::open(&config.database_path)?;
        tracing::info!(path = %config.database_path.display(), "promise manager opened");
        Ok(Self::with_config(Arc::new(store), config))
    }

    pub fn config(&self) -> &PledgeConfig {
        &self.config
    }

    pub fn registry(&self) -> &ResolverRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Creation and resolution
    // ─────────────────────────────────────────────────────────────────────────

    /// Create an unresolved promise. The record is durable when this returns.
    pub fn create(&self, correlation: Option<Correlation>) -> Result<PromiseId> {
        let _gate = self.gate.lock();

        let mut record = PromiseRecord::new(correlation);
        while self.store.get(&record.id)?.is_some() {
            record.id = PromiseId::generate();
        }
        self.persist(&record)?;

        tracing::info!(promise = %record.id, "promise created");
        Ok(record.id)
    }

    /// Fulfill a pending promise
    pub fn fulfill(&self, id: PromiseId, payload: impl Into<Payload>) -> Result<()> {
        self.settle(id, Outcome::Fulfilled(payload.into()))
    }

    /// Reject a pending promise
    pub fn reject(
        &self,
        id: PromiseId,
        error: Rejection,
        correlation: Option<Correlation>,
    ) -> Result<()> {
        self.settle(id, Outcome::Rejected { error, correlation })
    }

    fn settle(&self, id: PromiseId, outcome: Outcome) -> Result<()> {
        {
            let _gate = self.gate.lock();
            let mut record = self
                .load(&id)?
                .ok_or(PledgeError::UnknownIdentifier(id))?;
            record.settle(outcome.clone())?;
            self.persist(&record)?;
        }

        let delivered = self.deliver(&id, outcome.clone());
        tracing::info!(
            promise = %id,
            fulfilled = outcome.is_fulfilled(),
            delivered,
            "promise resolved"
        );
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Continuations
    // ─────────────────────────────────────────────────────────────────────────

    /// Live continuation for `id`.
    ///
    /// Repeated calls in one process return the same handle while the promise is
    /// pending. A terminal record yields a handle that is already resolved.
    pub fn obtain_continuation(&self, id: PromiseId) -> Result<ContinuationHandle> {
        if let Some(handle) = self.registry.get(&id) {
            return Ok(handle);
        }

        let _gate = self.gate.lock();
        let record = self
            .load(&id)?
            .ok_or(PledgeError::UnknownIdentifier(id))?;

        match record.outcome() {
            Some(outcome) => Ok(ContinuationHandle::settled(id, outcome)),
            None => Ok(self.registry.get_or_register(id)),
        }
    }

    /// Current durable state of `id`
    pub fn status(&self, id: PromiseId) -> Result<PromiseState> {
        self.load(&id)?
            .map(|record| record.state)
            .ok_or(PledgeError::UnknownIdentifier(id))
    }

    /// Fetch a full record
    pub fn record(&self, id: PromiseId) -> Result<PromiseRecord> {
        self.load(&id)?.ok_or(PledgeError::UnknownIdentifier(id))
    }

    /// All readable records, oldest first. Unreadable ones are logged and skipped.
    pub fn records(&self) -> Result<Vec<PromiseRecord>> {
        let mut records = Vec::new();
        for id in self.store.list()? {
            match self.load(&id) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(PledgeError::CorruptRecord { id, reason }) => {
                    tracing::warn!(promise = %id, %reason, "skipping unreadable record");
                }
                Err(e) => return Err(e),
            }
        }
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    /// Remove a terminal record once its outcome has been collected.
    ///
    /// Returns the outcome that was removed, or `None` if the promise is still
    /// unresolved (the record is kept).
    pub fn consume(&self, id: PromiseId) -> Result<Option<Outcome>> {
        let _gate = self.gate.lock();
        let record = self
            .load(&id)?
            .ok_or(PledgeError::UnknownIdentifier(id))?;

        match record.outcome() {
            Some(outcome) => {
                self.store.delete(&id)?;
                tracing::debug!(promise = %id, "promise consumed");
                Ok(Some(outcome))
            }
            None => Ok(None),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reconciliation and sweeping
    // ─────────────────────────────────────────────────────────────────────────

    /// Re-derive every registered continuation from the store.
    ///
    /// Covers records resolved or removed by another manager sharing the same
    /// store while this process was suspended.
    pub fn reconcile(&self) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();

        for id in self.registry.ids() {
            match self.load(&id) {
                Ok(Some(record)) => match record.outcome() {
                    Some(outcome) => {
                        if self.deliver(&id, outcome) {
                            report.delivered += 1;
                        }
                    }
                    None => report.pending += 1,
                },
                Ok(None) => {
                    tracing::warn!(promise = %id, "record vanished under a pending continuation");
                    let outcome = Outcome::rejected(Rejection::abandoned(
                        "promise record no longer exists",
                    ));
                    if self.deliver(&id, outcome) {
                        report.abandoned += 1;
                    }
                }
                Err(PledgeError::CorruptRecord { id, reason }) => {
                    tracing::warn!(promise = %id, %reason, "cannot reconcile unreadable record");
                    report.unreadable += 1;
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            delivered = report.delivered,
            abandoned = report.abandoned,
            pending = report.pending,
            "reconciliation finished"
        );
        Ok(report)
    }

    /// Reclaim records at least `threshold` old.
    ///
    /// Unresolved ones are rejected with a timeout (delivered to any live
    /// continuation) before removal; terminal ones without a live continuation are
    /// removed outright.
    pub fn sweep_stale(&self, threshold: Duration) -> Result<SweepReport> {
        let now = Utc::now();
        let mut report = SweepReport::default();

        for id in self.store.list()? {
            report.scanned += 1;

            let timed_out = {
                let _gate = self.gate.lock();
                let mut record = match self.load(&id) {
                    Ok(Some(record)) => record,
                    Ok(None) => continue,
                    Err(PledgeError::CorruptRecord { id, reason }) => {
                        tracing::warn!(promise = %id, %reason, "sweep skipping unreadable record");
                        report.unreadable += 1;
                        continue;
                    }
                    Err(e) => return Err(e),
                };

                if !record.is_stale(now, threshold) {
                    continue;
                }

                if record.is_terminal() {
                    if self.registry.contains(&id) {
                        continue;
                    }
                    self.store.delete(&id)?;
                    report.removed += 1;
                    None
                } else {
                    let outcome = Outcome::Rejected {
                        error: Rejection::timeout(format!(
                            "unresolved after {}s",
                            record.age(now).as_secs()
                        )),
                        correlation: record.correlation.clone(),
                    };
                    record.settle(outcome.clone())?;
                    self.persist(&record)?;
                    Some(outcome)
                }
            };

            if let Some(outcome) = timed_out {
                self.deliver(&id, outcome);
                {
                    let _gate = self.gate.lock();
                    self.store.delete(&id)?;
                }
                report.timed_out += 1;
                report.removed += 1;
                tracing::info!(promise = %id, "stale promise timed out");
            }
        }

        tracing::info!(
            scanned = report.scanned,
            timed_out = report.timed_out,
            removed = report.removed,
            "stale sweep finished"
        );
        Ok(report)
    }

    /// React to a lifecycle signal
    pub fn handle_event(&self, event: LifecycleEvent) -> Result<EventReport> {
        tracing::debug!(?event, "lifecycle event");
        match event {
            LifecycleEvent::Startup if !self.config.sweep_on_startup => Ok(EventReport::Skipped),
            LifecycleEvent::Startup | LifecycleEvent::Housekeeping => self
                .sweep_stale(self.config.stale_after())
                .map(EventReport::Swept),
            LifecycleEvent::Resumed => self.reconcile().map(EventReport::Reconciled),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Store access
    // ─────────────────────────────────────────────────────────────────────────

    fn load(&self, id: &PromiseId) -> Result<Option<PromiseRecord>> {
        let bytes = self.store.get(id).map_err(|e| match e {
            StoreError::Integrity { .. } => PledgeError::CorruptRecord {
                id: *id,
                reason: e.to_string(),
            },
            other => PledgeError::StorageFailure(other),
        })?;

        bytes
            .map(|bytes| PromiseRecord::decode(*id, &bytes))
            .transpose()
    }

    fn persist(&self, record: &PromiseRecord) -> Result<()> {
        let bytes = record.encode()?;
        self.store.put(&record.id, &bytes)?;
        Ok(())
    }

    /// Hand `outcome` to the registered continuation, if any
    fn deliver(&self, id: &PromiseId, outcome: Outcome) -> bool {
        match self.registry.take(id) {
            Some(handle) => handle.resolve(outcome),
            None => false,
        }
    }
}

impl std::fmt::Debug for PromiseManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromiseManager")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
