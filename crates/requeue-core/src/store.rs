//! Business-update collaborator: the employee store.
//!
//! The retry protocol only asks the store for one thing: apply an update
//! idempotently, rejecting anything that is not strictly newer than what is
//! already persisted. A stale or unknown record is `NotApplied`, which is a
//! terminal answer, not a failure; only an `Err` sends a message down the
//! retry chain.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::RequeueError;

/// The business payload carried through every stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeUpdate {
    pub employee_id: i32,
    pub first_name: String,
    /// Monotonic version stamp (epoch ms). The store rejects anything not
    /// strictly newer than what it holds.
    pub sync_time: i64,
}

/// Outcome of an idempotent apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Record missing, or `sync_time` not newer than the stored one.
    NotApplied,
}

/// Idempotent apply capability. Safe for concurrent use from every stage; the
/// `sync_time` comparison is the store's own conflict resolution.
#[async_trait]
pub trait EmployeeStore: Send + Sync {
    async fn apply_update(&self, update: &EmployeeUpdate) -> Result<ApplyOutcome, RequeueError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmployeeRecord {
    pub first_name: String,
    pub sync_time: i64,
}

/// In-memory store keyed by employee id.
#[derive(Default)]
pub struct InMemoryEmployeeStore {
    rows: Mutex<HashMap<i32, EmployeeRecord>>,
}

impl InMemoryEmployeeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-populated with the given employee ids at `sync_time` 0.
    pub fn with_employees(ids: impl IntoIterator<Item = i32>) -> Self {
        let rows = ids
            .into_iter()
            .map(|id| {
                (
                    id,
                    EmployeeRecord {
                        first_name: String::new(),
                        sync_time: 0,
                    },
                )
            })
            .collect();
        Self {
            rows: Mutex::new(rows),
        }
    }

    pub async fn get(&self, employee_id: i32) -> Option<EmployeeRecord> {
        self.rows.lock().await.get(&employee_id).cloned()
    }
}

#[async_trait]
impl EmployeeStore for InMemoryEmployeeStore {
    async fn apply_update(&self, update: &EmployeeUpdate) -> Result<ApplyOutcome, RequeueError> {
        let mut rows = self.rows.lock().await;
        match rows.get_mut(&update.employee_id) {
            Some(row) if update.sync_time > row.sync_time => {
                row.first_name = update.first_name.clone();
                row.sync_time = update.sync_time;
                tracing::info!(
                    employee_id = update.employee_id,
                    first_name = %update.first_name,
                    sync_time = update.sync_time,
                    "updated employee"
                );
                Ok(ApplyOutcome::Applied)
            }
            _ => {
                tracing::warn!(
                    employee_id = update.employee_id,
                    sync_time = update.sync_time,
                    "no rows updated: employee missing or sync_time not newer"
                );
                Ok(ApplyOutcome::NotApplied)
            }
        }
    }
}

/// Store wrapper that fails its first `n` applies before delegating. Used by
/// the demo binary and tests to push messages down the retry chain.
pub struct FlakyStore<S> {
    inner: S,
    remaining_failures: AtomicU32,
}

impl<S> FlakyStore<S> {
    pub fn new(inner: S, failures: u32) -> Self {
        Self {
            inner,
            remaining_failures: AtomicU32::new(failures),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: EmployeeStore> EmployeeStore for FlakyStore<S> {
    async fn apply_update(&self, update: &EmployeeUpdate) -> Result<ApplyOutcome, RequeueError> {
        let left = self.remaining_failures.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(RequeueError::Store(format!(
                "intentional failure (left={left})"
            )));
        }
        self.inner.apply_update(update).await
    }
}
