//! Bookkeeping for background tool execution: the active-task table and the
//! name-keyed result cache.
//!
//! Both tables are per session. Compound operations (presence check plus
//! insert, lookup plus pop) go through a single `DashMap` call so concurrent
//! tool handlers and background units cannot interleave inside them.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Replies a slow tool returns while its work is outstanding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredReplies {
    /// Returned when a background task for the invocation id is already running
    pub still_working: String,
    /// Returned right after a new background task is launched
    pub starting: String,
}

// =============================================================================
// Active Tasks
// =============================================================================

#[derive(Debug)]
struct ActiveTask {
    ticket: u64,
    tool_name: String,
    token: CancellationToken,
    started_at: Instant,
}

/// A successful reservation in [`TaskTable`].
#[derive(Debug, Clone)]
pub struct TaskReservation {
    pub invocation_id: String,
    pub ticket: u64,
    pub token: CancellationToken,
}

/// Active background tasks keyed by invocation id.
#[derive(Debug, Default)]
pub struct TaskTable {
    active: DashMap<String, ActiveTask>,
    next_ticket: AtomicU64,
}

impl TaskTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `invocation_id` for a new task.
    ///
    /// Returns `None` if a task is already active under that id.
    pub fn reserve(
        &self,
        invocation_id: &str,
        tool_name: &str,
        token: CancellationToken,
    ) -> Option<TaskReservation> {
        match self.active.entry(invocation_id.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
                slot.insert(ActiveTask {
                    ticket,
                    tool_name: tool_name.to_string(),
                    token: token.clone(),
                    started_at: Instant::now(),
                });
                Some(TaskReservation {
                    invocation_id: invocation_id.to_string(),
                    ticket,
                    token,
                })
            }
        }
    }

    /// Drop the entry created by `reservation`, returning how long it was active.
    pub fn release(&self, reservation: &TaskReservation) -> Option<std::time::Duration> {
        self.active
            .remove_if(&reservation.invocation_id, |_, task| {
                task.ticket == reservation.ticket
            })
            .map(|(_, task)| task.started_at.elapsed())
    }

    pub fn is_active(&self, invocation_id: &str) -> bool {
        self.active.contains_key(invocation_id)
    }

    /// Signal cancellation. The entry is removed by the task itself as it exits.
    pub fn cancel(&self, invocation_id: &str) -> bool {
        match self.active.get(invocation_id) {
            Some(task) => {
                task.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Signal cancellation to every active task. Returns how many were signalled.
    pub fn cancel_all(&self) -> usize {
        let mut signalled = 0;
        for task in self.active.iter() {
            debug!(
                invocation_id = %task.key(),
                tool = %task.tool_name,
                "Cancelling background task"
            );
            task.token.cancel();
            signalled += 1;
        }
        signalled
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

// =============================================================================
// Result Cache
// =============================================================================

/// Completed background results, one slot per lower-cased tool name.
///
/// Two concurrent invocations of the same tool share the slot; the later
/// completion overwrites the earlier one.
#[derive(Debug, Default)]
pub struct ResultCache {
    slots: DashMap<String, Value>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(tool_name: &str) -> String {
        tool_name.to_lowercase()
    }

    /// Store a result, returning the value it overwrote.
    pub fn store(&self, tool_name: &str, payload: Value) -> Option<Value> {
        self.slots.insert(Self::key(tool_name), payload)
    }

    /// Remove and return the cached result for `tool_name`.
    pub fn take(&self, tool_name: &str) -> Option<Value> {
        self.slots.remove(&Self::key(tool_name)).map(|(_, v)| v)
    }

    pub fn contains(&self, tool_name: &str) -> bool {
        self.slots.contains_key(&Self::key(tool_name))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Best-effort text of a caught panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}
