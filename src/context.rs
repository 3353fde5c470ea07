//! Explicit run context: unique id allocation and a diagnostic sink.
//!
//! Every stage that needs fresh identifiers or wants to report a recoverable
//! problem takes a `&mut RunContext` instead of reaching for process-wide state.
//! Warnings are forwarded to the `log` facade and also kept so callers can
//! inspect them after a run.

/// Monotonically increasing id source scoped to one run (or one tile).
///
/// Ids never repeat within an allocator. Tile workers each own an allocator
/// tagged with their tile index, so keys from different tiles cannot collide
/// either.
#[derive(Clone, Debug, Default)]
pub struct IdAllocator {
    scope: usize,
    next: u64,
}

/// A key handed out by [`IdAllocator::next_id`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopedId {
    pub scope: usize,
    pub seq: u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocator whose ids are tagged with `scope` (e.g. a tile index).
    pub fn scoped(scope: usize) -> Self {
        Self { scope, next: 0 }
    }

    pub fn next_id(&mut self) -> ScopedId {
        let id = ScopedId {
            scope: self.scope,
            seq: self.next,
        };
        self.next += 1;
        id
    }

    /// Number of ids handed out so far.
    pub fn issued(&self) -> u64 {
        self.next
    }
}

/// Severity of a recorded diagnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
}

#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

/// Collected diagnostics for one run.
#[derive(Clone, Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn info(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::info!("{}", message);
        self.entries.push(Diagnostic {
            severity: Severity::Info,
            message,
        });
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("{}", message);
        self.entries.push(Diagnostic {
            severity: Severity::Warning,
            message,
        });
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }

    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }
}

/// State threaded through a pipeline run.
#[derive(Debug, Default)]
pub struct RunContext {
    pub ids: IdAllocator,
    pub diagnostics: Diagnostics,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }
}
