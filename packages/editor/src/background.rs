//! Full reparse off the editing thread.
//!
//! The worker owns nothing of the document: it receives a copy of the source
//! with the generation it was taken at, and sends back a fresh tree. The
//! document installs it only if its generation has not moved on.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::debug;
use vlatex_parser::{parse_source, IdGenerator, Node, ParseOptions, Token};

use crate::errors::EditorError;

/// A parse of the source as it was at `generation`
#[derive(Debug, Clone)]
pub struct BackgroundResult {
    pub generation: u64,
    pub tree: Node,
    pub tokens: Vec<Token>,
}

struct ParseRequest {
    generation: u64,
    source: String,
}

/// Handle to the parse worker thread. Dropping it stops the worker.
pub struct BackgroundParser {
    requests: Option<Sender<ParseRequest>>,
    results: Receiver<BackgroundResult>,
    worker: Option<JoinHandle<()>>,
}

impl BackgroundParser {
    /// Start a worker. Its ids come from `ids`, which must not share a seed
    /// with the document's own generator.
    pub fn spawn(options: ParseOptions, ids: IdGenerator) -> Self {
        let (request_tx, request_rx) = mpsc::channel::<ParseRequest>();
        let (result_tx, result_rx) = mpsc::channel();
        let worker = thread::spawn(move || {
            let mut ids = ids;
            while let Ok(request) = request_rx.recv() {
                let (tokens, tree) = parse_source(&request.source, &mut ids, &options);
                debug!(generation = request.generation, "Background parse finished");
                let result = BackgroundResult {
                    generation: request.generation,
                    tree,
                    tokens,
                };
                if result_tx.send(result).is_err() {
                    break;
                }
            }
        });
        Self {
            requests: Some(request_tx),
            results: result_rx,
            worker: Some(worker),
        }
    }

    /// Queue a parse of `source`, taken at `generation`
    pub fn request(&self, generation: u64, source: &str) -> Result<(), EditorError> {
        let requests = self.requests.as_ref().ok_or(EditorError::WorkerGone)?;
        requests
            .send(ParseRequest {
                generation,
                source: source.to_string(),
            })
            .map_err(|_| EditorError::WorkerGone)
    }

    /// A finished parse, if there is one
    pub fn try_result(&self) -> Option<BackgroundResult> {
        self.results.try_recv().ok()
    }

    /// Wait up to `timeout` for a finished parse
    pub fn wait_result(&self, timeout: Duration) -> Result<Option<BackgroundResult>, EditorError> {
        match self.results.recv_timeout(timeout) {
            Ok(result) => Ok(Some(result)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(EditorError::WorkerGone),
        }
    }
}

impl Drop for BackgroundParser {
    fn drop(&mut self) {
        self.requests.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl std::fmt::Debug for BackgroundParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundParser")
            .field("running", &self.worker.is_some())
            .finish()
    }
}
