//! The action table: an append-only, time-ordered ledger of hardware
//! commands.
//!
//! The table is the central data structure this crate produces. Each entry
//! pairs an exact timestamp with a target resource and an action payload.
//! Entries are immutable once appended, and appends are validated against a
//! per-resource causal-order invariant: an entry may never be scheduled
//! before the most recent entry for the same resource. Cross-resource
//! entries interleave freely.
//!
//! Alongside the entries, the table keeps a readiness ledger: each append can
//! record how long the commanded action keeps its resource busy (a camera's
//! exposure plus readout, a stage's travel plus settle). The
//! [`ActionTable::earliest_available`] query derives from that ledger the
//! earliest instant a new command may legally be issued to a resource, which
//! is what prevents the planner from double-booking hardware.
//!
//! The table deliberately does not deduplicate repeated identical commands:
//! redundant "hold position" entries guard against drift when a downstream
//! executor snaps to the nearest known setpoint.

use std::collections::HashMap;
use std::fmt;
use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::error::{SeqResult, SequencerError};
use crate::resource::ResourceId;
use crate::time::Time;

/// Command payload carried by a table entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "value", rename_all = "snake_case")]
pub enum ActionPayload {
    /// Drive a digital line high (`true`) or low (`false`).
    SetDigital(bool),
    /// Write an analog setpoint.
    SetAnalog(f64),
    /// Move an axis to an absolute position.
    MoveAbsolute(f64),
    /// Move an axis by a relative distance.
    MoveRelative(f64),
    /// Device-interpreted action index (e.g. a pattern-generator sequence
    /// step).
    Custom(usize),
}

impl fmt::Display for ActionPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionPayload::SetDigital(v) => write!(f, "set_digital {v}"),
            ActionPayload::SetAnalog(v) => write!(f, "set_analog {v}"),
            ActionPayload::MoveAbsolute(v) => write!(f, "move_absolute {v}"),
            ActionPayload::MoveRelative(v) => write!(f, "move_relative {v}"),
            ActionPayload::Custom(v) => write!(f, "custom {v}"),
        }
    }
}

/// One scheduled hardware command. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEntry {
    /// Exact time at which the executor should issue the command.
    pub time: Time,
    /// Resource the command targets.
    pub target: ResourceId,
    /// The command itself.
    pub payload: ActionPayload,
}

/// Per-resource readiness bookkeeping.
#[derive(Debug, Clone, PartialEq, Default)]
struct ResourceLedger {
    /// Timestamp of the most recently appended entry for the resource.
    last_scheduled: Time,
    /// Busy duration opened by that entry.
    busy_after: Time,
}

/// Append-only, per-resource time-ordered ledger of scheduled commands.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionTable {
    entries: Vec<ActionEntry>,
    resources: HashMap<ResourceId, ResourceLedger>,
}

impl ActionTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry whose action leaves the resource immediately ready
    /// again. See [`ActionTable::append_with_busy`].
    pub fn append(
        &mut self,
        time: Time,
        target: ResourceId,
        payload: ActionPayload,
    ) -> SeqResult<()> {
        self.append_with_busy(time, target, payload, Time::ZERO)
    }

    /// Appends an entry and records the busy duration the action opens on
    /// its resource (exposure + readout for a camera trigger, travel +
    /// settle for a stage move).
    ///
    /// Fails with [`SequencerError::OutOfOrder`] if `time` is strictly
    /// earlier than the most recently appended entry for the same resource.
    /// Equal timestamps are allowed; ties keep append order.
    pub fn append_with_busy(
        &mut self,
        time: Time,
        target: ResourceId,
        payload: ActionPayload,
        busy_after: Time,
    ) -> SeqResult<()> {
        if let Some(ledger) = self.resources.get(&target) {
            if time < ledger.last_scheduled {
                return Err(SequencerError::OutOfOrder {
                    resource: target,
                    last: ledger.last_scheduled,
                    attempted: time,
                });
            }
        }
        tracing::trace!(time = %time, target = %target, payload = %payload, "append");
        self.resources.insert(
            target.clone(),
            ResourceLedger {
                last_scheduled: time,
                busy_after,
            },
        );
        self.entries.push(ActionEntry {
            time,
            target,
            payload,
        });
        Ok(())
    }

    /// Earliest time a new command may be issued to `target`: the timestamp
    /// of its last entry plus that entry's busy duration, or
    /// [`Time::ZERO`] if the resource has no entries yet.
    pub fn earliest_available(&self, target: &ResourceId) -> Time {
        self.resources
            .get(target)
            .map(|ledger| ledger.last_scheduled + ledger.busy_after)
            .unwrap_or(Time::ZERO)
    }

    /// Entries in append order. Restartable and finite.
    pub fn entries(&self) -> impl Iterator<Item = &ActionEntry> {
        self.entries.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Timestamp of the latest entry in the table.
    pub fn end_time(&self) -> Time {
        self.entries
            .iter()
            .map(|entry| entry.time)
            .max()
            .unwrap_or(Time::ZERO)
    }

    /// Entries stable-sorted by timestamp, ties broken by append order. This
    /// is the form handed to the external executor.
    pub fn sorted_entries(&self) -> Vec<ActionEntry> {
        let mut sorted = self.entries.clone();
        sorted.sort_by_key(|entry| entry.time);
        sorted
    }

    /// Consumes the table into the executor handoff form (stable-sorted by
    /// timestamp).
    pub fn into_sorted(self) -> Vec<ActionEntry> {
        let mut sorted = self.entries;
        sorted.sort_by_key(|entry| entry.time);
        sorted
    }

    /// Writes the deterministic textual dump: one tab-separated line per
    /// sorted entry (`time<TAB>target<TAB>payload`). Used for test fixtures
    /// and cross-language replay comparison.
    pub fn write_text<W: Write>(&self, mut writer: W) -> SeqResult<()> {
        for entry in self.sorted_entries() {
            writeln!(writer, "{}\t{}\t{}", entry.time, entry.target, entry.payload)?;
        }
        Ok(())
    }

    /// Serializes the sorted entries as pretty-printed JSON.
    pub fn to_json(&self) -> SeqResult<String> {
        serde_json::to_string_pretty(&self.sorted_entries())
            .map_err(|err| SequencerError::Configuration(format!("table serialization: {err}")))
    }
}
