//! Run ledger: persisted single-flight state for periodic triggers.
//!
//! # Table design
//!
//! One `trigger_runs` table keyed by trigger name, JSON-encoded
//! [`TriggerRun`] values. Starting a run is a compare-and-set performed inside
//! a single redb write transaction; write transactions are serialized, so two
//! callers racing on the same trigger cannot both observe it idle.
//!
//! A `running` entry older than the trigger's staleness threshold is treated as
//! abandoned (the process that owned it crashed) and may be reclaimed. Every
//! start hands out a fresh `run_id`; a finish carrying a superseded id is
//! ignored so a reclaimed run that eventually returns cannot clobber the entry.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SiteopsError};

// ---------------------------------------------------------------------------
// Table definition
// ---------------------------------------------------------------------------

/// Key: trigger name. Value: JSON-encoded TriggerRun.
const TRIGGER_RUNS: TableDefinition<&str, &[u8]> = TableDefinition::new("trigger_runs");

pub(crate) fn ensure_table(wt: &WriteTransaction) -> Result<()> {
    wt.open_table(TRIGGER_RUNS).map_err(SiteopsError::store)?;
    Ok(())
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}

// ---------------------------------------------------------------------------
// TriggerRun
// ---------------------------------------------------------------------------

/// Ledger entry for one trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerRun {
    pub trigger: String,
    pub running: bool,
    /// Owner token of the in-flight (or most recent) run.
    #[serde(default)]
    pub run_id: Option<Uuid>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<String>,
    /// Completed runs, successful or not.
    #[serde(default)]
    pub runs: u64,
}

impl TriggerRun {
    fn new(trigger: &str) -> Self {
        Self {
            trigger: trigger.to_string(),
            running: false,
            run_id: None,
            started_at: None,
            finished_at: None,
            last_error: None,
            runs: 0,
        }
    }

    /// `finished_at`, or `started_at` for a run that never finished.
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.finished_at.or(self.started_at)
    }

    pub fn is_due(&self, now: DateTime<Utc>, interval: Duration) -> bool {
        match self.last_activity() {
            None => true,
            Some(at) => at
                .checked_add_signed(to_chrono(interval))
                .is_some_and(|due| now >= due),
        }
    }

    pub fn is_stale(&self, now: DateTime<Utc>, stale_after: Duration) -> bool {
        self.running
            && self
                .started_at
                .map_or(true, |at| {
                    at.checked_add_signed(to_chrono(stale_after))
                        .is_some_and(|stale| now >= stale)
                })
    }
}

/// Proof of ownership of a started run. Required to finish it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunToken {
    pub trigger: String,
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// A stale `running` entry was taken over to start this run.
    pub reclaimed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started(RunToken),
    /// The interval has not elapsed since the last run.
    NotDue,
    /// Another run holds the entry and is not stale yet.
    Busy { started_at: Option<DateTime<Utc>> },
}

// ---------------------------------------------------------------------------
// RunLedger
// ---------------------------------------------------------------------------

/// Persistent single-flight ledger for periodic triggers.
#[derive(Clone)]
pub struct RunLedger {
    db: Arc<Database>,
}

impl RunLedger {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn get(&self, trigger: &str) -> Result<Option<TriggerRun>> {
        let rt = self.db.begin_read().map_err(SiteopsError::store)?;
        let table = rt.open_table(TRIGGER_RUNS).map_err(SiteopsError::store)?;
        let value = table.get(trigger).map_err(SiteopsError::store)?;
        match value {
            Some(v) => Ok(Some(serde_json::from_slice(v.value())?)),
            None => Ok(None),
        }
    }

    /// All entries, sorted by trigger name.
    pub fn list(&self) -> Result<Vec<TriggerRun>> {
        let rt = self.db.begin_read().map_err(SiteopsError::store)?;
        let table = rt.open_table(TRIGGER_RUNS).map_err(SiteopsError::store)?;
        let mut result = Vec::new();
        for entry in table.iter().map_err(SiteopsError::store)? {
            let (_, v) = entry.map_err(SiteopsError::store)?;
            result.push(serde_json::from_slice::<TriggerRun>(v.value())?);
        }
        Ok(result)
    }

    /// Atomically claim `trigger` for a new run at `now`.
    ///
    /// Succeeds when the trigger is due (per `interval`) and either idle or
    /// holding a `running` entry older than `stale_after`. Pass
    /// `Duration::ZERO` as `interval` to skip the due check.
    pub fn try_start(
        &self,
        trigger: &str,
        now: DateTime<Utc>,
        interval: Duration,
        stale_after: Duration,
    ) -> Result<StartOutcome> {
        let wt = self.db.begin_write().map_err(SiteopsError::store)?;
        let outcome = {
            let mut table = wt.open_table(TRIGGER_RUNS).map_err(SiteopsError::store)?;
            let existing = table
                .get(trigger)
                .map_err(SiteopsError::store)?
                .map(|g| g.value().to_vec());
            let mut entry = match existing {
                Some(bytes) => serde_json::from_slice::<TriggerRun>(&bytes)?,
                None => TriggerRun::new(trigger),
            };

            let reclaimed = entry.is_stale(now, stale_after);
            if entry.running && !reclaimed {
                StartOutcome::Busy {
                    started_at: entry.started_at,
                }
            } else if !reclaimed && !entry.is_due(now, interval) {
                StartOutcome::NotDue
            } else {
                let run_id = Uuid::new_v4();
                entry.running = true;
                entry.run_id = Some(run_id);
                entry.started_at = Some(now);
                let bytes = serde_json::to_vec(&entry)?;
                table
                    .insert(trigger, bytes.as_slice())
                    .map_err(SiteopsError::store)?;
                StartOutcome::Started(RunToken {
                    trigger: trigger.to_string(),
                    run_id,
                    started_at: now,
                    reclaimed,
                })
            }
        };

        if matches!(outcome, StartOutcome::Started(_)) {
            wt.commit().map_err(SiteopsError::store)?;
        } else {
            // Nothing written; skip the fsync.
            wt.abort().map_err(SiteopsError::store)?;
        }
        Ok(outcome)
    }

    /// Mark the run identified by `token` finished.
    ///
    /// Returns `false` (and writes nothing) if the entry has since been
    /// reclaimed by another run.
    pub fn finish(
        &self,
        token: &RunToken,
        finished_at: DateTime<Utc>,
        error: Option<String>,
    ) -> Result<bool> {
        let wt = self.db.begin_write().map_err(SiteopsError::store)?;
        let owned = {
            let mut table = wt.open_table(TRIGGER_RUNS).map_err(SiteopsError::store)?;
            let existing = table
                .get(token.trigger.as_str())
                .map_err(SiteopsError::store)?
                .map(|g| g.value().to_vec());
            match existing {
                Some(bytes) => {
                    let mut entry: TriggerRun = serde_json::from_slice(&bytes)?;
                    if entry.run_id == Some(token.run_id) && entry.running {
                        entry.running = false;
                        entry.finished_at = Some(finished_at);
                        entry.last_error = error;
                        entry.runs += 1;
                        let bytes = serde_json::to_vec(&entry)?;
                        table
                            .insert(token.trigger.as_str(), bytes.as_slice())
                            .map_err(SiteopsError::store)?;
                        true
                    } else {
                        false
                    }
                }
                None => false,
            }
        };

        if owned {
            wt.commit().map_err(SiteopsError::store)?;
        } else {
            wt.abort().map_err(SiteopsError::store)?;
        }
        Ok(owned)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
