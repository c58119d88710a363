//! # Undo/Redo Stack
//!
//! Linear edit history of invertible transactions.
//!
//! ## Design
//!
//! - Each transaction carries its mutations and their inverse
//! - Undo applies the inverse and moves the transaction to the redo stack
//! - Redo reapplies the original mutations
//! - Recording a new transaction clears the redo stack
//! - Consecutive typing into the same text run is coalesced into one undo step
//!   while the edits arrive within the coalescing window
//!
//! ## Example
//!
//! ```rust,ignore
//! let mut stack = UndoStack::new();
//! stack.record(transaction);
//!
//! stack.undo(&mut tree)?;
//! stack.redo(&mut tree)?;
//! ```

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;
use vlatex_parser::{Node, NodeId};

use crate::mutations::{apply_all, Applied, Mutation, MutationError};

/// Where a transaction came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EditOrigin {
    /// A visual edit operation
    Visual,
    /// A direct edit of the source text
    Source,
}

/// An atomic, invertible group of mutations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// The mutations in application order
    pub mutations: Vec<Mutation>,

    /// The mutations that undo them, in application order
    pub inverse: Vec<Mutation>,

    /// Milliseconds since the Unix epoch
    pub timestamp: u64,

    pub origin: EditOrigin,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Text run extended by typing; transactions with the same key may be
    /// merged into one undo step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coalesce_key: Option<NodeId>,
}

impl Transaction {
    pub fn new(mutations: Vec<Mutation>, inverse: Vec<Mutation>, origin: EditOrigin) -> Self {
        Self {
            mutations,
            inverse,
            timestamp: now_ms(),
            origin,
            description: None,
            coalesce_key: None,
        }
    }

    /// Apply `mutations` to `tree` and record their inverse
    pub fn apply(
        tree: &mut Node,
        mutations: Vec<Mutation>,
        origin: EditOrigin,
    ) -> Result<(Self, Applied), MutationError> {
        let applied = apply_all(&mutations, tree)?;
        Ok((Self::new(mutations, applied.inverse.clone(), origin), applied))
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_coalesce_key(mut self, key: Option<NodeId>) -> Self {
        self.coalesce_key = key;
        self
    }

    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as u64)
}

/// Something mutations can be applied to as one step
pub trait MutationTarget {
    type Output;
    type Error;

    fn apply_mutations(&mut self, mutations: &[Mutation]) -> Result<Self::Output, Self::Error>;
}

impl MutationTarget for Node {
    type Output = Applied;
    type Error = MutationError;

    fn apply_mutations(&mut self, mutations: &[Mutation]) -> Result<Applied, MutationError> {
        apply_all(mutations, self)
    }
}

/// Undo/redo history
#[derive(Debug)]
pub struct UndoStack {
    /// Applied transactions (most recent last)
    undo_stack: Vec<Transaction>,

    /// Undone transactions (most recent last)
    redo_stack: Vec<Transaction>,

    /// Maximum number of undo levels (0 = unlimited)
    max_levels: usize,

    /// Coalescing window in milliseconds, `None` when coalescing is off
    coalesce_window: Option<u64>,

    /// The next transaction starts a new undo step regardless of its key
    sealed: bool,
}

impl UndoStack {
    /// Undo stack with 100 levels that coalesces typing within one second
    pub fn new() -> Self {
        Self::with_max_levels(100)
    }

    pub fn with_max_levels(max_levels: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_levels,
            coalesce_window: Some(1000),
            sealed: false,
        }
    }

    pub fn with_coalescing(mut self, window_ms: Option<u64>) -> Self {
        self.coalesce_window = window_ms;
        self
    }

    /// Record an applied transaction
    pub fn record(&mut self, transaction: Transaction) {
        if transaction.is_empty() {
            return;
        }
        let sealed = std::mem::replace(&mut self.sealed, false);
        self.redo_stack.clear();

        if let (false, Some(window), Some(last)) =
            (sealed, self.coalesce_window, self.undo_stack.last_mut())
        {
            let same_run = transaction.coalesce_key.is_some()
                && last.coalesce_key == transaction.coalesce_key;
            if same_run && transaction.timestamp.saturating_sub(last.timestamp) <= window {
                debug!(
                    run = ?transaction.coalesce_key,
                    steps = last.mutations.len() + transaction.mutations.len(),
                    "Coalescing edit into previous undo step"
                );
                let mut inverse = transaction.inverse;
                inverse.append(&mut last.inverse);
                last.inverse = inverse;
                last.mutations.extend(transaction.mutations);
                last.timestamp = transaction.timestamp;
                return;
            }
        }

        self.undo_stack.push(transaction);
        if self.max_levels > 0 && self.undo_stack.len() > self.max_levels {
            self.undo_stack.remove(0);
        }
    }

    /// End the current undo step; the next transaction is never merged into it
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    /// Undo the most recent transaction. Returns `None` when there is nothing
    /// to undo. If applying fails the history is left as it was.
    pub fn undo<T: MutationTarget>(&mut self, target: &mut T) -> Result<Option<T::Output>, T::Error> {
        let Some(transaction) = self.undo_stack.pop() else {
            return Ok(None);
        };
        match target.apply_mutations(&transaction.inverse) {
            Ok(output) => {
                self.redo_stack.push(transaction);
                self.sealed = true;
                Ok(Some(output))
            }
            Err(err) => {
                self.undo_stack.push(transaction);
                Err(err)
            }
        }
    }

    /// Redo the most recently undone transaction.
    pub fn redo<T: MutationTarget>(&mut self, target: &mut T) -> Result<Option<T::Output>, T::Error> {
        let Some(transaction) = self.redo_stack.pop() else {
            return Ok(None);
        };
        match target.apply_mutations(&transaction.mutations) {
            Ok(output) => {
                self.undo_stack.push(transaction);
                self.sealed = true;
                Ok(Some(output))
            }
            Err(err) => {
                self.redo_stack.push(transaction);
                Err(err)
            }
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_levels(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_levels(&self) -> usize {
        self.redo_stack.len()
    }

    /// Clear all undo/redo history
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.sealed = false;
    }

    /// The transaction the next undo reverts
    pub fn peek_undo(&self) -> Option<&Transaction> {
        self.undo_stack.last()
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack
            .last()
            .and_then(|transaction| transaction.description.as_deref())
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack
            .last()
            .and_then(|transaction| transaction.description.as_deref())
    }
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new()
    }
}
