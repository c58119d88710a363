//! # Editing Pipeline
//!
//! Single entry point for UI events. Events are handled one at a time, each
//! to completion, on the caller's thread. Full reparses can be handed to a
//! background worker; their results are installed between events. A result
//! an edit got to first is dropped and the current source is parsed again.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};
use vlatex_parser::{IdGenerator, TextEdit};

use crate::background::{BackgroundParser, BackgroundResult};
use crate::document::{ChangedRegion, Document};
use crate::errors::EditorError;
use crate::translator::VisualEdit;

/// An event delivered by the UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "edit", rename_all = "camelCase")]
pub enum EditorEvent {
    Visual(VisualEdit),
    Source(TextEdit),
    Undo,
    Redo,
    /// Close the current undo step
    Seal,
}

/// Seed offset of the worker's ids, so they never collide with the
/// document's own
const WORKER_SEED: u32 = 0x5eed_0001;

/// Manages the edit → render pipeline of one document
#[derive(Debug)]
pub struct Pipeline {
    document: Document,
    worker: Option<BackgroundParser>,
    /// Generation of the newest source handed to the worker
    requested: Option<u64>,
}

impl Pipeline {
    pub fn new(document: Document) -> Self {
        Self {
            document,
            worker: None,
            requested: None,
        }
    }

    /// Start a background parse worker for this document
    pub fn with_background(mut self) -> Self {
        let seed = IdGenerator::new(self.document.name()).seed() ^ WORKER_SEED;
        self.worker = Some(BackgroundParser::spawn(
            self.document.parse_options().clone(),
            IdGenerator::from_seed(seed),
        ));
        self
    }

    /// Process one event and report what changed
    #[instrument(skip(self), fields(generation = self.document.generation()))]
    pub fn handle(&mut self, event: EditorEvent) -> Result<ChangedRegion, EditorError> {
        let generation = self.document.generation();
        let region = match event {
            EditorEvent::Visual(edit) => self.document.apply_edit(&edit)?,
            EditorEvent::Source(edit) => self.document.apply_source_edit(&edit)?,
            EditorEvent::Undo => self
                .document
                .undo()?
                .unwrap_or_else(|| ChangedRegion::unchanged(generation)),
            EditorEvent::Redo => self
                .document
                .redo()?
                .unwrap_or_else(|| ChangedRegion::unchanged(generation)),
            EditorEvent::Seal => {
                self.document.seal();
                ChangedRegion::unchanged(generation)
            }
        };
        debug!(
            changed = !region.is_empty(),
            rebuilt = region.rebuilt.len(),
            "Handled event"
        );
        Ok(region)
    }

    /// Ask the worker for a full parse of the current source
    pub fn request_reparse(&mut self) -> Result<(), EditorError> {
        let worker = self.worker.as_ref().ok_or(EditorError::WorkerGone)?;
        let generation = self.document.generation();
        worker.request(generation, self.document.source())?;
        self.requested = Some(generation);
        Ok(())
    }

    /// Install finished background parses without blocking. Returns the
    /// region changed by the last one installed.
    pub fn poll_background(&mut self) -> Option<ChangedRegion> {
        let mut installed = None;
        while let Some(result) = self.worker.as_ref().and_then(BackgroundParser::try_result) {
            match self.settle(result) {
                Ok(Some(region)) => installed = Some(region),
                Ok(None) => {}
                Err(err) => {
                    warn!(error = %err, "Could not resubmit background parse");
                    break;
                }
            }
        }
        installed
    }

    /// Wait up to `timeout` for the next background parse and install it if
    /// it is still current. `Ok(None)` covers both a timeout and a stale
    /// result; after a stale one the current source is already queued.
    pub fn wait_background(&mut self, timeout: Duration) -> Result<Option<ChangedRegion>, EditorError> {
        let worker = self.worker.as_ref().ok_or(EditorError::WorkerGone)?;
        match worker.wait_result(timeout)? {
            Some(result) => self.settle(result),
            None => Ok(None),
        }
    }

    /// Install `result`, or redo it for the current source if an edit got
    /// there first and no parse of the current source is queued yet.
    fn settle(&mut self, result: BackgroundResult) -> Result<Option<ChangedRegion>, EditorError> {
        let generation = result.generation;
        if let Some(region) = self.document.accept_parse(result) {
            if self.requested == Some(generation) {
                self.requested = None;
            }
            return Ok(Some(region));
        }
        let current = self.document.generation();
        if self.requested != Some(current) {
            debug!(stale = generation, current, "Redoing background parse");
            self.request_reparse()?;
        }
        Ok(None)
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn into_document(self) -> Document {
        self.document
    }
}
