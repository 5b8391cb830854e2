//! Parse/build orchestration.
//!
//! The [`Orchestrator`] exclusively owns the authoritative byte buffer and
//! the authoritative parsed value (together a [`Document`]). Everything that
//! changes them goes through it: loading new bytes parses them, an edit
//! replaces part of the value and triggers build followed by a reconciling
//! reparse.
//!
//! In [`ConvertMode::Background`] parse and build run on a worker thread
//! per operation. Results come back over a channel and are only applied
//! when the foreground calls [`Orchestrator::poll`]; a newer operation
//! cancels the previous one and bumps a generation counter, so results of
//! superseded workers are discarded rather than applied.
use std::fmt;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

use crate::error::{EditorError, GrammarError};
use crate::grammar::{CancelToken, ConstructRef, Context, Sink, Stream, StreamRef, Value};
use crate::meta::MetadataTable;
use crate::path::Path;
use crate::settings::ConvertMode;

/// The authoritative byte buffer and what was parsed from it.
#[derive(Debug, Clone)]
pub struct Document {
    pub bytes: Arc<[u8]>,
    pub value: Option<Value>,
    pub metadata: MetadataTable,
    pub root_stream: Option<StreamRef>,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            bytes: Arc::from(Vec::new()),
            value: None,
            metadata: MetadataTable::new(),
            root_stream: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Parse,
    Build,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Parse => write!(f, "parse"),
            Stage::Build => write!(f, "build"),
        }
    }
}

/// Error state recorded by the orchestrator.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{stage} failed ({}): {error}", .error.kind())]
pub struct ConvertError {
    pub stage: Stage,
    pub error: GrammarError,
}

impl ConvertError {
    /// Classification of the failure, e.g. `StreamError`.
    pub fn kind(&self) -> &'static str {
        self.error.kind()
    }

    pub fn message(&self) -> String {
        self.error.to_string()
    }
}

impl From<ConvertError> for EditorError {
    fn from(e: ConvertError) -> Self {
        match e.stage {
            Stage::Parse => EditorError::ParseFailure(e.error),
            Stage::Build => EditorError::BuildFailure(e.error),
        }
    }
}

/// State changes the foreground should react to.
#[derive(Debug, Clone, PartialEq)]
pub enum ConvertEvent {
    Parsed,
    ParseFailed(ConvertError),
    Built,
    BuildFailed(ConvertError),
    Cancelled,
}

enum Outcome {
    Parsed(Result<Document, GrammarError>),
    Built {
        built: Result<Arc<[u8]>, GrammarError>,
        reparsed: Option<Result<Document, GrammarError>>,
    },
}

struct WorkerMessage {
    generation: u64,
    outcome: Outcome,
}

struct InFlight {
    generation: u64,
    stage: Stage,
    cancel: CancelToken,
}

/// Parse `bytes` with `grammar`, collecting provenance.
pub fn run_parse(
    grammar: &ConstructRef,
    bytes: Arc<[u8]>,
    cancel: CancelToken,
) -> Result<Document, GrammarError> {
    let mut stream = Stream::root(bytes.clone());
    let mut ctx = Context::with_cancel(cancel);
    let value = grammar.parse(&mut stream, &mut ctx)?;
    ctx.metadata.seal();
    Ok(Document {
        bytes,
        value: Some(value),
        metadata: ctx.metadata,
        root_stream: Some(stream.source().clone()),
    })
}

/// Serialize `value` with `grammar`.
pub fn run_build(
    grammar: &ConstructRef,
    value: &Value,
    cancel: CancelToken,
) -> Result<Vec<u8>, GrammarError> {
    let mut sink = Sink::new();
    let mut ctx = Context::with_cancel(cancel);
    grammar.build(value, &mut sink, &mut ctx)?;
    Ok(sink.into_inner())
}

pub struct Orchestrator {
    grammar: Option<ConstructRef>,
    doc: Document,
    /// Value of the last successful parse; the edit base on build failure.
    committed: Option<Value>,
    error: Option<ConvertError>,
    mode: ConvertMode,
    generation: u64,
    in_flight: Option<InFlight>,
    tx: mpsc::Sender<WorkerMessage>,
    rx: mpsc::Receiver<WorkerMessage>,
    events: Vec<ConvertEvent>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("grammar", &self.grammar.as_ref().map(|g| g.type_name()))
            .field("bytes", &self.doc.bytes.len())
            .field("has_value", &self.doc.value.is_some())
            .field("error", &self.error)
            .field("mode", &self.mode)
            .field("generation", &self.generation)
            .field("converting", &self.in_flight.is_some())
            .finish()
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(ConvertMode::Foreground)
    }
}

impl Orchestrator {
    pub fn new(mode: ConvertMode) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            grammar: None,
            doc: Document::default(),
            committed: None,
            error: None,
            mode,
            generation: 0,
            in_flight: None,
            tx,
            rx,
            events: Vec::new(),
        }
    }

    pub fn mode(&self) -> ConvertMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: ConvertMode) {
        self.mode = mode;
    }

    /// Replace the grammar. The current value and its metadata are dropped;
    /// the byte buffer is kept.
    pub fn set_grammar(&mut self, grammar: ConstructRef) {
        self.cancel();
        self.grammar = Some(grammar);
        self.doc.value = None;
        self.doc.metadata.clear();
        self.committed = None;
        self.error = None;
    }

    pub fn grammar(&self) -> Option<&ConstructRef> {
        self.grammar.as_ref()
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn bytes(&self) -> &[u8] {
        &self.doc.bytes
    }

    pub fn value(&self) -> Option<&Value> {
        self.doc.value.as_ref()
    }

    pub fn metadata(&self) -> &MetadataTable {
        &self.doc.metadata
    }

    pub fn error(&self) -> Option<&ConvertError> {
        self.error.as_ref()
    }

    pub fn is_converting(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Take a new byte buffer and parse it.
    pub fn load(&mut self, bytes: Vec<u8>) -> Result<(), EditorError> {
        self.doc.bytes = bytes.into();
        self.parse()
    }

    /// Parse the current buffer, inline or on a worker depending on the mode.
    pub fn parse(&mut self) -> Result<(), EditorError> {
        match self.mode {
            ConvertMode::Foreground => self.parse_now(),
            ConvertMode::Background => self.spawn_parse(),
        }
    }

    /// Build the current value and reparse the result, inline or on a
    /// worker depending on the mode.
    pub fn rebuild(&mut self) -> Result<(), EditorError> {
        match self.mode {
            ConvertMode::Foreground => self.build_now(),
            ConvertMode::Background => self.spawn_build(),
        }
    }

    pub fn parse_now(&mut self) -> Result<(), EditorError> {
        let grammar = self.grammar.clone().ok_or(EditorError::NoGrammar)?;
        self.cancel();
        let result = run_parse(&grammar, self.doc.bytes.clone(), CancelToken::new());
        let failure = result.as_ref().err().cloned();
        self.apply_parse(result);
        match failure {
            Some(e) => Err(EditorError::ParseFailure(e)),
            None => Ok(()),
        }
    }

    /// Build inline. A build failure leaves the buffer untouched and is
    /// returned; a failing reconciliation parse is only recorded as error
    /// state, since the new bytes are already in place.
    pub fn build_now(&mut self) -> Result<(), EditorError> {
        let grammar = self.grammar.clone().ok_or(EditorError::NoGrammar)?;
        let value = self.doc.value.clone().ok_or(EditorError::NoValue)?;
        self.cancel();
        match run_build(&grammar, &value, CancelToken::new()) {
            Ok(bytes) => {
                debug!(len = bytes.len(), "build finished");
                self.doc.bytes = bytes.into();
                self.events.push(ConvertEvent::Built);
                let result = run_parse(&grammar, self.doc.bytes.clone(), CancelToken::new());
                self.apply_parse(result);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "build failed");
                self.error = Some(ConvertError {
                    stage: Stage::Build,
                    error: e.clone(),
                });
                Err(EditorError::BuildFailure(e))
            }
        }
    }

    fn begin(&mut self, stage: Stage) -> (u64, CancelToken) {
        self.cancel_worker();
        self.generation += 1;
        let cancel = CancelToken::new();
        self.in_flight = Some(InFlight {
            generation: self.generation,
            stage,
            cancel: cancel.clone(),
        });
        (self.generation, cancel)
    }

    pub fn spawn_parse(&mut self) -> Result<(), EditorError> {
        let grammar = self.grammar.clone().ok_or(EditorError::NoGrammar)?;
        let bytes = self.doc.bytes.clone();
        let (generation, cancel) = self.begin(Stage::Parse);
        let tx = self.tx.clone();
        debug!(generation, "spawn parse worker");
        thread::spawn(move || {
            let outcome = Outcome::Parsed(run_parse(&grammar, bytes, cancel));
            let _ = tx.send(WorkerMessage {
                generation,
                outcome,
            });
        });
        Ok(())
    }

    pub fn spawn_build(&mut self) -> Result<(), EditorError> {
        let grammar = self.grammar.clone().ok_or(EditorError::NoGrammar)?;
        let value = self.doc.value.clone().ok_or(EditorError::NoValue)?;
        let (generation, cancel) = self.begin(Stage::Build);
        let tx = self.tx.clone();
        debug!(generation, "spawn build worker");
        thread::spawn(move || {
            let outcome = match run_build(&grammar, &value, cancel.clone()) {
                Ok(bytes) => {
                    let bytes: Arc<[u8]> = bytes.into();
                    let reparsed = run_parse(&grammar, bytes.clone(), cancel);
                    Outcome::Built {
                        built: Ok(bytes),
                        reparsed: Some(reparsed),
                    }
                }
                Err(e) => Outcome::Built {
                    built: Err(e),
                    reparsed: None,
                },
            };
            let _ = tx.send(WorkerMessage {
                generation,
                outcome,
            });
        });
        Ok(())
    }

    fn cancel_worker(&mut self) -> bool {
        match self.in_flight.take() {
            Some(job) => {
                debug!(generation = job.generation, stage = %job.stage, "cancel worker");
                job.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Abort the in-flight worker, if any. Its result will be discarded.
    pub fn cancel(&mut self) {
        if self.cancel_worker() {
            self.generation += 1;
            self.events.push(ConvertEvent::Cancelled);
        }
    }

    fn apply_parse(&mut self, result: Result<Document, GrammarError>) {
        match result {
            Ok(doc) => {
                debug!(len = doc.bytes.len(), records = doc.metadata.len(), "parse finished");
                self.committed = doc.value.clone();
                self.doc = doc;
                self.error = None;
                self.events.push(ConvertEvent::Parsed);
            }
            Err(e) => {
                warn!(error = %e, "parse failed");
                self.doc.value = None;
                self.doc.metadata.clear();
                self.doc.root_stream = None;
                self.committed = None;
                let err = ConvertError {
                    stage: Stage::Parse,
                    error: e,
                };
                self.error = Some(err.clone());
                self.events.push(ConvertEvent::ParseFailed(err));
            }
        }
    }

    fn apply(&mut self, msg: WorkerMessage) {
        let current = self.in_flight.as_ref().map(|job| job.generation);
        if current != Some(msg.generation) {
            warn!(generation = msg.generation, "discarding stale worker result");
            return;
        }
        self.in_flight = None;
        match msg.outcome {
            Outcome::Parsed(result) => self.apply_parse(result),
            Outcome::Built { built, reparsed } => match built {
                Ok(bytes) => {
                    self.doc.bytes = bytes;
                    self.events.push(ConvertEvent::Built);
                    if let Some(result) = reparsed {
                        self.apply_parse(result);
                    }
                }
                Err(e) => {
                    warn!(error = %e, "build failed");
                    self.doc.value = self.committed.clone();
                    let err = ConvertError {
                        stage: Stage::Build,
                        error: e,
                    };
                    self.error = Some(err.clone());
                    self.events.push(ConvertEvent::BuildFailed(err));
                }
            },
        }
    }

    /// Apply finished worker results and return every event since the last
    /// call. Never blocks.
    pub fn poll(&mut self) -> Vec<ConvertEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(msg) => self.apply(msg),
                Err(mpsc::TryRecvError::Empty) => break,
                // never happens while `self.tx` is alive
                Err(mpsc::TryRecvError::Disconnected) => break,
            }
        }
        std::mem::take(&mut self.events)
    }

    /// Like `poll`, but first waits up to `timeout` for the in-flight
    /// worker to finish.
    pub fn wait(&mut self, timeout: Duration) -> Vec<ConvertEvent> {
        let deadline = Instant::now() + timeout;
        while self.in_flight.is_some() {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(left) {
                Ok(msg) => self.apply(msg),
                Err(_) => break,
            }
        }
        self.poll()
    }

    /// Replace the value at `path`, returning the previous value. Does not
    /// rebuild.
    pub fn replace_value(&mut self, path: &Path, value: Value) -> Result<Value, EditorError> {
        let root = self.doc.value.as_mut().ok_or(EditorError::NoValue)?;
        path.replace(root, value)
    }
}
