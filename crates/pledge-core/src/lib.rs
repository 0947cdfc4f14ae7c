//! Pledge Core - crash-durable promises
//!
//! A promise here survives the process that created it. Its state lives in a
//! durable record store; the callbacks waiting on it live in memory and are
//! re-derived from the store after a suspend, kill or relaunch.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                     PromiseManager                     │
//! │  create · fulfill · reject · obtain_continuation       │
//! │  reconcile · sweep_stale · consume                     │
//! ├──────────────────────────┬─────────────────────────────┤
//! │    ResolverRegistry      │        RecordStore          │
//! │  id → ContinuationHandle │  id → PromiseRecord bytes   │
//! │  (this process only)     │  (source of truth)          │
//! └──────────────────────────┴─────────────────────────────┘
//!              ▲
//!              │ Startup / Resumed / Housekeeping
//!      LifecycleSignals
//! ```
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use pledge_core::storage::MemoryStore;
//! use pledge_core::{PromiseManager, Payload};
//!
//! let manager = PromiseManager::new(Arc::new(MemoryStore::new()));
//!
//! // The record is durable before `create` returns
//! let id = manager.create(None).unwrap();
//!
//! manager
//!     .obtain_continuation(id)
//!     .unwrap()
//!     .on_fulfilled(|payload| println!("got {}", payload));
//!
//! manager.fulfill(id, "pong").unwrap();
//! assert!(manager.status(id).unwrap().is_terminal());
//! ```
//!
//! # Guarantees
//!
//! 1. `create`, `fulfill` and `reject` persist before returning, or fail with
//!    [`PledgeError::StorageFailure`]
//! 2. A promise resolves at most once; a second attempt is
//!    [`PledgeError::AlreadyResolved`]
//! 3. Every attached observer fires exactly once
//! 4. Abandoned promises are eventually rejected with a timeout by the sweep

#![deny(unsafe_code)]
#![warn(rust_2018_idioms, missing_debug_implementations, clippy::all)]

pub mod config;
pub mod continuation;
pub mod error;
pub mod lifecycle;
pub mod manager;
pub mod record;
pub mod registry;
pub mod storage;
pub mod types;

pub use config::PledgeConfig;
pub use continuation::ContinuationHandle;
pub use error::{PledgeError, Result, StoreError};
pub use lifecycle::{LifecycleEvent, LifecycleSignals, LifecycleSubscription};
pub use manager::{EventReport, PromiseManager, ReconcileReport, SweepReport};
pub use record::{Outcome, PromiseRecord, PromiseState};
pub use registry::ResolverRegistry;
pub use storage::{MemoryStore, RecordStore, SqliteStore};
pub use types::{Correlation, Payload, PromiseId, Rejection, RejectionKind};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
