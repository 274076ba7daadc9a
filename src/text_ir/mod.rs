//! Textual call-graph IR for driving and testing the offload pass.
//!
//! The format describes just enough of a whole program for the pass to work
//! on: declarations with markers and flags, bodies made of labelled blocks,
//! direct and indirect calls, and operands that take addresses.
//!
//! # Format
//!
//! ```text
//! ; Comments start with semicolon
//! global counter
//!
//! helper(%x) ["omp declare target"] local {
//! entry:
//!     %y = add %x, 1
//!     ret %y
//! }
//!
//! vec_add(%a, %b) [hsa_kernel] {
//! entry:
//!     %r = call @helper(%a)
//!     %p = addr &counter
//!     call_indirect %p(%r) throws
//!     ret
//! }
//!
//! ext(%a) !
//! ```
//!
//! Flags after the marker list: `local`, `virtual`, `ctor`, `dtor`,
//! `artificial`, `noclone`, `address_taken`. Call flags: `throws`, `rso`.
//! Operands: `%value`, `&%local`, `&symbol`, `^block`, integers. Names with
//! unusual characters are written in double quotes.

use crate::core::{Attribute, DeclFlags, NodeFlags};
use hashbrown::HashMap;
use std::fmt::Write as _;

pub mod adaptor;
pub mod check;
pub mod parser;

pub use adaptor::{BlockRef, EdgeRef, FuncRef, InstRef};
pub use check::{CheckDirective, TestRunner, TestSpec};

#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub functions: Vec<Function>,
    pub globals: Vec<Global>,
    pub blocks: Vec<Block>,
    pub insts: Vec<Inst>,
    pub operands: Vec<Operand>,
    pub edges: Vec<Edge>,
    names: HashMap<String, u32>,
    clone_counters: HashMap<String, u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub args: Vec<String>,
    pub attributes: Vec<Attribute>,
    pub decl: DeclFlags,
    pub flags: NodeFlags,
    pub block_begin_idx: u32,
    pub block_end_idx: u32,
    /// Outgoing direct call edges, in call-site order.
    pub callees: Vec<u32>,
    pub indirect_calls: u32,
    pub removed: bool,
}

/// Variable with program-wide storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Global {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub name: String,
    pub inst_begin_idx: u32,
    pub inst_end_idx: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inst {
    pub result: Option<String>,
    pub op: Opcode,
    pub op_begin_idx: u32,
    pub op_end_idx: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Opcode {
    Debug,
    /// Direct call; operands are the arguments.
    Call { callee: u32, flags: CallFlags },
    /// Call through a value; operands are the arguments.
    CallIndirect { target: String, flags: CallFlags },
    Other(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallFlags {
    pub throws: bool,
    pub return_slot_opt: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Value(String),
    Imm(i64),
    Block(String),
    FunctionAddress(u32),
    GlobalAddress(u32),
    LocalAddress(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub caller: u32,
    pub callee: u32,
    pub can_throw_external: bool,
    pub removed: bool,
}

impl Module {
    pub fn new() -> Self {
        Self {
            functions: Vec::new(),
            globals: Vec::new(),
            blocks: Vec::new(),
            insts: Vec::new(),
            operands: Vec::new(),
            edges: Vec::new(),
            names: HashMap::new(),
            clone_counters: HashMap::new(),
        }
    }

    pub fn parse(text: &str) -> crate::core::OffloadResult<Self> {
        parser::parse_module(text)
    }

    /// Index of a live function.
    pub fn func_index(&self, name: &str) -> Option<u32> {
        self.names.get(name).copied()
    }

    pub fn func(&self, func: FuncRef) -> &Function {
        &self.functions[func.0 as usize]
    }

    pub(crate) fn func_mut(&mut self, func: FuncRef) -> &mut Function {
        &mut self.functions[func.0 as usize]
    }

    /// Register a new function under its name and return its index.
    pub(crate) fn push_function(&mut self, function: Function) -> u32 {
        let idx = self.functions.len() as u32;
        self.names.insert(function.name.clone(), idx);
        self.functions.push(function);
        idx
    }

    pub(crate) fn unregister_name(&mut self, name: &str) {
        self.names.remove(name);
    }

    /// Next free `base.suffix.N` name.
    pub(crate) fn clone_name(&mut self, base: &str, suffix: &str) -> String {
        let counter = self.clone_counters.entry(base.to_string()).or_insert(0);
        loop {
            let name = format!("{}.{}.{}", base, suffix, counter);
            *counter += 1;
            if !self.names.contains_key(&name) {
                return name;
            }
        }
    }

    /// Live callee names of `func`, in call-site order.
    pub fn callee_names(&self, func: FuncRef) -> Vec<&str> {
        self.func(func)
            .callees
            .iter()
            .map(|&e| self.functions[self.edges[e as usize].callee as usize].name.as_str())
            .collect()
    }

    fn print_operand(&self, out: &mut String, operand: &Operand) {
        let _ = match operand {
            Operand::Value(name) => write!(out, "%{}", name),
            Operand::Imm(value) => write!(out, "{}", value),
            Operand::Block(name) => write!(out, "^{}", name),
            Operand::FunctionAddress(idx) => write!(out, "&{}", self.functions[*idx as usize].name),
            Operand::GlobalAddress(idx) => write!(out, "&{}", self.globals[*idx as usize].name),
            Operand::LocalAddress(name) => write!(out, "&%{}", name),
        };
    }

    /// Symbol-table style dump of the live call graph.
    pub fn print(&self) -> String {
        let mut out = String::new();

        for global in &self.globals {
            let _ = writeln!(out, "Global {}", global.name);
        }

        for func in self.functions.iter().filter(|f| !f.removed) {
            let kind = if func.flags.definition { "Function" } else { "Declaration" };
            let _ = writeln!(out, "{} {}", kind, func.name);

            if !func.attributes.is_empty() {
                let attrs: Vec<_> = func.attributes.iter().map(|a| a.name()).collect();
                let _ = writeln!(out, "  Attributes: {}", attrs.join(", "));
            }

            let mut flags = Vec::new();
            let d = &func.decl;
            let n = &func.flags;
            for (set, word) in [
                (d.public, "public"),
                (n.externally_visible, "externally_visible"),
                (n.local, "local"),
                (n.force_output, "force_output"),
                (n.address_taken, "address_taken"),
                (n.definition && !n.versionable, "noclone"),
                (d.is_virtual, "virtual"),
                (d.static_constructor, "ctor"),
                (d.static_destructor, "dtor"),
                (d.artificial, "artificial"),
            ] {
                if set {
                    flags.push(word);
                }
            }
            let _ = writeln!(out, "  Flags: {}", flags.join(" "));

            for &e in &func.callees {
                let edge = &self.edges[e as usize];
                let callee = &self.functions[edge.callee as usize].name;
                let throws = if edge.can_throw_external { " throws" } else { "" };
                let _ = writeln!(out, "  Edge {} -> {}{}", func.name, callee, throws);
            }
            if func.indirect_calls > 0 {
                let _ = writeln!(out, "  Indirect calls: {}", func.indirect_calls);
            }

            for block_idx in func.block_begin_idx..func.block_end_idx {
                let block = &self.blocks[block_idx as usize];
                let _ = writeln!(out, "  Block {}", block.name);
                for inst_idx in block.inst_begin_idx..block.inst_end_idx {
                    self.print_inst(&mut out, &self.insts[inst_idx as usize]);
                }
            }
        }

        out
    }

    fn print_inst(&self, out: &mut String, inst: &Inst) {
        out.push_str("    ");
        if let Some(result) = &inst.result {
            let _ = write!(out, "%{} = ", result);
        }
        let ops = &self.operands[inst.op_begin_idx as usize..inst.op_end_idx as usize];
        let (opcode, call) = match &inst.op {
            Opcode::Debug => ("dbg".to_string(), None),
            Opcode::Other(name) => (name.clone(), None),
            Opcode::Call { callee, flags } => (
                format!("call @{}", self.functions[*callee as usize].name),
                Some(*flags),
            ),
            Opcode::CallIndirect { target, flags } => {
                (format!("call_indirect %{}", target), Some(*flags))
            }
        };
        out.push_str(&opcode);

        match call {
            Some(flags) => {
                out.push('(');
                for (i, op) in ops.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.print_operand(out, op);
                }
                out.push(')');
                if flags.throws {
                    out.push_str(" throws");
                }
                if flags.return_slot_opt {
                    out.push_str(" rso");
                }
            }
            None => {
                for (i, op) in ops.iter().enumerate() {
                    out.push_str(if i == 0 { " " } else { ", " });
                    self.print_operand(out, op);
                }
            }
        }
        out.push('\n');
    }
}

impl Default for Module {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.print())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_print_module() {
        let module = Module::parse(
            r#"
global counter
helper(%x) local {
entry:
  %y = add %x, 1
  ret %y
}
k(%a) [hsa_kernel] {
entry:
  %r = call @helper(%a) throws
  %p = addr &counter
  ret %r
}
ext()!
"#,
        )
        .unwrap();

        let out = module.print();
        assert!(out.contains("Global counter"));
        assert!(out.contains("Function helper\n  Flags: local\n"));
        assert!(out.contains("Function k\n  Attributes: hsa_kernel\n  Flags: public externally_visible\n"));
        assert!(out.contains("  Edge k -> helper throws"));
        assert!(out.contains("    %y = add %x, 1"));
        assert!(out.contains("    %r = call @helper(%a) throws"));
        assert!(out.contains("    %p = addr &counter"));
        assert!(out.contains("Declaration ext"));
    }

    #[test]
    fn test_clone_names_skip_taken() {
        let mut module = Module::parse("f() { entry: ret }\n\"f.hsa.0\"() { entry: ret }").unwrap();
        assert_eq!(module.clone_name("f", "hsa"), "f.hsa.1");
        assert_eq!(module.clone_name("f", "hsa"), "f.hsa.2");
    }
}
