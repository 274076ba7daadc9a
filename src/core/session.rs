// This module provides the arena-backed pass session shared by every step of the
// offload pass. PassSession owns a reference to a bumpalo arena in which diagnostic
// text and interned function names are allocated, so diagnostics can be handed out
// as plain borrowed records that live as long as the session. It collects the
// diagnostics emitted by the candidate scan and the cloner (warnings for functions
// that cannot be cloned, notes for functions rejected for offloading) and keeps
// PassStats counters: functions considered and rejected by the scan, kernels removed,
// clones created and edges redirected. Interior mutability through RefCell lets the
// pass steps take the session by shared reference while they hold the call graph
// and the summary store mutably.

//! Arena-based pass session and diagnostics.

use bumpalo::Bump;
use hashbrown::HashMap;
use std::cell::RefCell;
use std::fmt;

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    /// Missed-optimization style report.
    Note,
}

/// A diagnostic keyed to the function it concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Diagnostic<'arena> {
    pub severity: Severity,
    pub function: &'arena str,
    pub message: &'arena str,
}

impl fmt::Display for Diagnostic<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            Severity::Warning => "warning",
            Severity::Note => "note",
        };
        write!(f, "{}: {}: {}", self.function, tag, self.message)
    }
}

/// Arena-based pass session.
pub struct PassSession<'arena> {
    arena: &'arena Bump,
    stats: RefCell<PassStats>,
    diagnostics: RefCell<Vec<Diagnostic<'arena>>>,
    interned_strings: RefCell<HashMap<String, &'arena str>>,
}

impl<'arena> PassSession<'arena> {
    /// Create a new pass session with the given arena.
    pub fn new(arena: &'arena Bump) -> Self {
        Self {
            arena,
            stats: RefCell::new(PassStats::default()),
            diagnostics: RefCell::new(Vec::new()),
            interned_strings: RefCell::new(HashMap::new()),
        }
    }

    /// Intern a string in the arena.
    pub fn intern_str(&self, s: &str) -> &'arena str {
        let mut strings = self.interned_strings.borrow_mut();
        if let Some(&interned) = strings.get(s) {
            return interned;
        }

        let interned = self.arena.alloc_str(s);
        strings.insert(s.to_string(), interned);
        interned
    }

    /// Emit a diagnostic for `function`.
    pub fn emit(&self, severity: Severity, function: &str, message: fmt::Arguments<'_>) {
        let function = self.intern_str(function);
        let message = bumpalo::format!(in self.arena, "{}", message).into_bump_str();
        match severity {
            Severity::Warning => log::warn!("{}: {}", function, message),
            Severity::Note => log::info!("{}: {}", function, message),
        }
        self.diagnostics.borrow_mut().push(Diagnostic { severity, function, message });
    }

    /// All diagnostics emitted so far, in emission order.
    pub fn diagnostics(&self) -> Vec<Diagnostic<'arena>> {
        self.diagnostics.borrow().clone()
    }

    pub fn record_considered(&self) {
        self.stats.borrow_mut().functions_considered += 1;
    }

    pub fn record_rejected(&self) {
        self.stats.borrow_mut().functions_rejected += 1;
    }

    pub fn record_removed(&self) {
        self.stats.borrow_mut().kernels_removed += 1;
    }

    pub fn record_clone(&self) {
        self.stats.borrow_mut().clones_created += 1;
    }

    pub fn record_redirect(&self) {
        self.stats.borrow_mut().edges_redirected += 1;
    }

    /// Get pass statistics.
    pub fn stats(&self) -> PassStats {
        self.stats.borrow().clone()
    }
}

/// Pass statistics.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassStats {
    /// Definitions examined by the candidate scan.
    pub functions_considered: usize,

    /// Definitions rejected by the candidate scan.
    pub functions_rejected: usize,

    /// Rejected explicit kernels removed from the call graph.
    pub kernels_removed: usize,

    /// Accelerator clones created.
    pub clones_created: usize,

    /// Call edges pointed at an accelerator clone.
    pub edges_redirected: usize,
}

impl fmt::Display for PassStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Offload Pass Statistics:")?;
        writeln!(f, "  Functions considered: {}", self.functions_considered)?;
        writeln!(f, "  Functions rejected: {}", self.functions_rejected)?;
        writeln!(f, "  Kernels removed: {}", self.kernels_removed)?;
        writeln!(f, "  Clones created: {}", self.clones_created)?;
        writeln!(f, "  Edges redirected: {}", self.edges_redirected)?;
        Ok(())
    }
}
