//! offload-ipa - Interprocedural accelerator offloading.
//!
//! Decides which functions of a whole-program call graph must also exist as
//! accelerator (HSA) code, creates and links the accelerator clones, retargets
//! accelerator-to-host call edges at those clones, and carries the decisions
//! across separately compiled units in a summary stream.
//!
//! # Primary Usage
//!
//! ```ignore
//! use offload_ipa::{OffloadPass, PassOptions, PassSession};
//! use offload_ipa::text_ir::Module;
//! use bumpalo::Bump;
//!
//! let mut module = Module::parse(&source)?;
//!
//! // Diagnostics are allocated in the session arena
//! let arena = Bump::new();
//! let session = PassSession::new(&arena);
//!
//! let mut pass = OffloadPass::new(PassOptions::new().offload_requested(true));
//! if pass.gate() {
//!     let report = pass.execute(&mut module, &session);
//!     println!("{} clones", report.clones.len());
//! }
//! ```
//!
//! # Architecture
//!
//! - [`core`] - Call-graph adaptor trait, session, options and errors
//! - [`offload`] - Summary store, candidate scan, cloning, redirection, codec
//! - [`text_ir`] - Textual call graph used by the driver and the tests

pub mod core;
pub mod offload;
pub mod text_ir;

// Re-export common types from organized modules
pub use core::{
    // Adaptor
    Attribute, CallGraph, DeclFlags, InstKind, NodeFlags, OperandKind,
    // Session management
    Diagnostic, PassOptions, PassSession, PassStats, Severity,
    // Errors
    OffloadError, OffloadResult,
};
pub use offload::{
    FunctionKind, FunctionSummary, OffloadClass, OffloadPass, PassReport, SummaryStore,
    SymtabEncoder,
};
