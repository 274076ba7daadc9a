// This module is the hub for the infrastructure the offload pass is built on: the
// CallGraph adaptor trait through which the pass reaches the host compiler's symbol
// table, the arena-backed pass session that collects diagnostics and statistics, the
// pass options, and the error types. Everything here is independent of the offload
// decisions themselves, which live in the offload module.

//! Core offload-pass infrastructure.
//!
//! # Key Components
//!
//! ## Call-graph adaptor (`adaptor`)
//! - Narrow trait over nodes, edges, declaration markers and bodies
//! - Copy handles so summaries can refer to nodes without owning them
//!
//! ## Session management (`session`)
//! - Arena-backed diagnostics using `bumpalo`
//! - Pass statistics
//!
//! ## Options (`options`) and errors (`error`)

pub mod adaptor;
pub mod error;
pub mod options;
pub mod session;

pub use adaptor::{Attribute, CallGraph, DeclFlags, InstKind, NodeFlags, OperandKind};

pub use error::{OffloadError, OffloadResult};

pub use options::PassOptions;

pub use session::{Diagnostic, PassSession, PassStats, Severity};
