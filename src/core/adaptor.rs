// This module defines the CallGraph trait, the bridge between the offload pass and
// whatever whole-program call graph the host compiler keeps. The pass never owns
// nodes or edges; it only queries declarations (markers and flags), walks bodies
// (blocks, instructions, operands) and outgoing call edges, and performs the few
// structural mutations it needs: attaching or stripping markers, toggling visibility
// and force-output flags, creating virtual clones, removing nodes and redirecting a
// call edge to a different callee. Node and edge handles are plain Copy values so
// the summary store can hold non-owning back-references to nodes. The module also
// defines the closed set of declaration markers the pass understands and the small
// value types the adaptor hands back for declarations, nodes, instructions and
// operands.

//! CallGraph responsibilities.
//!
//! The adaptor exposes the host compiler's symbol table through a trait. The
//! pass assumes:
//! - Every function has exactly one node; clones are new nodes.
//! - A defined function has a body of basic blocks holding instructions.
//! - Direct calls are represented as edges in caller order; indirect calls are
//!   only counted.
//! - Node handles stay valid until the node is removed and are never reused.
//!
//! Iterators are boxed so implementations can hide their storage layout.

use core::fmt::Debug;
use core::hash::Hash;

/// Declaration markers that drive offload classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    /// Explicit accelerator entry point.
    HsaKernel,
    /// Explicit accelerator-callable function.
    HsaFunction,
    /// Compiled for both host and accelerator; attached by the candidate scan.
    HsaUniversal,
    /// Stand-in declaration bound to a concrete definition later.
    HsaPlaceholder,
    /// Offload-eligibility marker.
    OmpDeclareTarget,
    /// Marks OpenACC routines, which are never HSA-callable.
    OaccFunction,
}

impl Attribute {
    pub const ALL: [Attribute; 6] = [
        Attribute::HsaKernel,
        Attribute::HsaFunction,
        Attribute::HsaUniversal,
        Attribute::HsaPlaceholder,
        Attribute::OmpDeclareTarget,
        Attribute::OaccFunction,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Attribute::HsaKernel => "hsa_kernel",
            Attribute::HsaFunction => "hsa_function",
            Attribute::HsaUniversal => "hsa_universal",
            Attribute::HsaPlaceholder => "hsa_placeholder",
            Attribute::OmpDeclareTarget => "omp declare target",
            Attribute::OaccFunction => "oacc function",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|attr| attr.name() == s)
    }
}

impl core::fmt::Display for Attribute {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Declaration-level flags of a function.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeclFlags {
    pub is_virtual: bool,
    pub static_constructor: bool,
    pub static_destructor: bool,
    /// Compiler-synthesized declaration.
    pub artificial: bool,
    pub public: bool,
}

/// Call-graph node flags of a function.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeFlags {
    pub definition: bool,
    /// Safe to duplicate without breaking address identity.
    pub versionable: bool,
    /// All uses are visible inside this unit.
    pub local: bool,
    pub externally_visible: bool,
    pub force_output: bool,
    /// The address escapes, so the function may be reached indirectly.
    pub address_taken: bool,
}

/// What the analyzer needs to know about an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstKind {
    Debug,
    Call { return_slot_opt: bool },
    Other,
}

/// What the analyzer needs to know about an instruction operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// SSA value, constant or block label.
    Value,
    /// Address of a function.
    FunctionAddress,
    /// Address of a variable; `global` is true for program-wide storage.
    VariableAddress { global: bool },
}

/// Bridge between a whole-program call graph and the offload pass.
pub trait CallGraph {
    type NodeRef: Copy + Eq + Hash + Debug;
    type EdgeRef: Copy + Eq + Debug;
    type BlockRef: Copy + Eq;
    type InstRef: Copy + Eq;

    /// All live function nodes, declarations included.
    fn functions(&self) -> Box<dyn Iterator<Item = Self::NodeRef> + '_>;

    /// Live function nodes that have a body.
    fn defined_functions(&self) -> Box<dyn Iterator<Item = Self::NodeRef> + '_> {
        Box::new(
            self.functions()
                .filter(move |&node| self.node_flags(node).definition),
        )
    }

    /// Assembler name of the function.
    fn name(&self, node: Self::NodeRef) -> &str;

    /// Look up a live node by assembler name.
    fn node_by_name(&self, name: &str) -> Option<Self::NodeRef>;

    /// Look up a node by name, creating an empty declaration if none exists.
    fn get_or_create(&mut self, name: &str) -> Self::NodeRef;

    fn decl_flags(&self, node: Self::NodeRef) -> DeclFlags;
    fn node_flags(&self, node: Self::NodeRef) -> NodeFlags;

    fn has_attribute(&self, node: Self::NodeRef, attr: Attribute) -> bool;
    fn add_attribute(&mut self, node: Self::NodeRef, attr: Attribute);
    fn remove_attribute(&mut self, node: Self::NodeRef, attr: Attribute);

    fn set_public(&mut self, node: Self::NodeRef, public: bool);
    fn set_externally_visible(&mut self, node: Self::NodeRef, visible: bool);
    fn set_force_output(&mut self, node: Self::NodeRef, force: bool);

    /// Whether the function contains indirect call sites.
    fn has_indirect_calls(&self, node: Self::NodeRef) -> bool;

    /// Outgoing direct call edges in call-site order.
    fn callees(&self, node: Self::NodeRef) -> Box<dyn Iterator<Item = Self::EdgeRef> + '_>;

    fn edge_caller(&self, edge: Self::EdgeRef) -> Self::NodeRef;
    fn edge_callee(&self, edge: Self::EdgeRef) -> Self::NodeRef;

    /// Whether an exception may propagate out of the call.
    fn edge_can_throw_external(&self, edge: Self::EdgeRef) -> bool;

    /// Point the edge at a different callee.
    fn redirect_callee(&mut self, edge: Self::EdgeRef, callee: Self::NodeRef);

    /// Basic blocks of the function body. Empty for declarations.
    fn blocks(&self, node: Self::NodeRef) -> Box<dyn Iterator<Item = Self::BlockRef> + '_>;

    fn block_insts(&self, block: Self::BlockRef) -> Box<dyn Iterator<Item = Self::InstRef> + '_>;

    fn inst_kind(&self, inst: Self::InstRef) -> InstKind;

    /// Operands of an instruction. For calls these are the call arguments;
    /// the call target is described by the edge instead.
    fn inst_operands(&self, inst: Self::InstRef) -> Box<dyn Iterator<Item = OperandKind> + '_>;

    /// Create a clone sharing the body of `node`, with duplicated outgoing
    /// edges, no callers, and local, non-public linkage. The clone's name is
    /// derived from the original's name and `suffix`.
    fn create_virtual_clone(&mut self, node: Self::NodeRef, suffix: &str) -> Self::NodeRef;

    /// Remove the node together with all edges into and out of it.
    fn remove(&mut self, node: Self::NodeRef);
}
