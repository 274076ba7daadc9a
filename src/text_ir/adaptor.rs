//! `CallGraph` implementation for the text IR.

use super::{Function, Module, Opcode, Operand};
use crate::core::{Attribute, CallGraph, DeclFlags, InstKind, NodeFlags, OperandKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncRef(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EdgeRef(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRef(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstRef(pub u32);

impl Module {
    fn detach_edges_into(&mut self, target: u32) {
        for func in self.functions.iter_mut().filter(|f| !f.removed) {
            let edges = &mut self.edges;
            func.callees.retain(|&e| {
                let edge = &mut edges[e as usize];
                if edge.callee == target {
                    edge.removed = true;
                    false
                } else {
                    true
                }
            });
        }
    }
}

impl CallGraph for Module {
    type NodeRef = FuncRef;
    type EdgeRef = EdgeRef;
    type BlockRef = BlockRef;
    type InstRef = InstRef;

    fn functions(&self) -> Box<dyn Iterator<Item = FuncRef> + '_> {
        Box::new(
            self.functions
                .iter()
                .enumerate()
                .filter(|(_, f)| !f.removed)
                .map(|(idx, _)| FuncRef(idx as u32)),
        )
    }

    fn name(&self, node: FuncRef) -> &str {
        &self.func(node).name
    }

    fn node_by_name(&self, name: &str) -> Option<FuncRef> {
        self.func_index(name).map(FuncRef)
    }

    fn get_or_create(&mut self, name: &str) -> FuncRef {
        if let Some(node) = self.node_by_name(name) {
            return node;
        }
        log::trace!("Creating declaration for {}", name);
        FuncRef(self.push_function(Function {
            name: name.to_string(),
            args: Vec::new(),
            attributes: Vec::new(),
            decl: DeclFlags { public: true, ..DeclFlags::default() },
            flags: NodeFlags { externally_visible: true, ..NodeFlags::default() },
            block_begin_idx: 0,
            block_end_idx: 0,
            callees: Vec::new(),
            indirect_calls: 0,
            removed: false,
        }))
    }

    fn decl_flags(&self, node: FuncRef) -> DeclFlags {
        self.func(node).decl
    }

    fn node_flags(&self, node: FuncRef) -> NodeFlags {
        self.func(node).flags
    }

    fn has_attribute(&self, node: FuncRef, attr: Attribute) -> bool {
        self.func(node).attributes.contains(&attr)
    }

    fn add_attribute(&mut self, node: FuncRef, attr: Attribute) {
        let attrs = &mut self.func_mut(node).attributes;
        if !attrs.contains(&attr) {
            attrs.push(attr);
        }
    }

    fn remove_attribute(&mut self, node: FuncRef, attr: Attribute) {
        self.func_mut(node).attributes.retain(|&a| a != attr);
    }

    fn set_public(&mut self, node: FuncRef, public: bool) {
        self.func_mut(node).decl.public = public;
    }

    fn set_externally_visible(&mut self, node: FuncRef, visible: bool) {
        let flags = &mut self.func_mut(node).flags;
        flags.externally_visible = visible;
        if visible {
            flags.local = false;
        }
    }

    fn set_force_output(&mut self, node: FuncRef, force: bool) {
        self.func_mut(node).flags.force_output = force;
    }

    fn has_indirect_calls(&self, node: FuncRef) -> bool {
        self.func(node).indirect_calls > 0
    }

    fn callees(&self, node: FuncRef) -> Box<dyn Iterator<Item = EdgeRef> + '_> {
        Box::new(self.func(node).callees.iter().map(|&e| EdgeRef(e)))
    }

    fn edge_caller(&self, edge: EdgeRef) -> FuncRef {
        FuncRef(self.edges[edge.0 as usize].caller)
    }

    fn edge_callee(&self, edge: EdgeRef) -> FuncRef {
        FuncRef(self.edges[edge.0 as usize].callee)
    }

    fn edge_can_throw_external(&self, edge: EdgeRef) -> bool {
        self.edges[edge.0 as usize].can_throw_external
    }

    fn redirect_callee(&mut self, edge: EdgeRef, callee: FuncRef) {
        self.edges[edge.0 as usize].callee = callee.0;
    }

    fn blocks(&self, node: FuncRef) -> Box<dyn Iterator<Item = BlockRef> + '_> {
        let func = self.func(node);
        Box::new((func.block_begin_idx..func.block_end_idx).map(BlockRef))
    }

    fn block_insts(&self, block: BlockRef) -> Box<dyn Iterator<Item = InstRef> + '_> {
        let block = &self.blocks[block.0 as usize];
        Box::new((block.inst_begin_idx..block.inst_end_idx).map(InstRef))
    }

    fn inst_kind(&self, inst: InstRef) -> InstKind {
        match &self.insts[inst.0 as usize].op {
            Opcode::Debug => InstKind::Debug,
            Opcode::Call { flags, .. } | Opcode::CallIndirect { flags, .. } => InstKind::Call {
                return_slot_opt: flags.return_slot_opt,
            },
            Opcode::Other(_) => InstKind::Other,
        }
    }

    fn inst_operands(&self, inst: InstRef) -> Box<dyn Iterator<Item = OperandKind> + '_> {
        let inst = &self.insts[inst.0 as usize];
        let ops = &self.operands[inst.op_begin_idx as usize..inst.op_end_idx as usize];
        Box::new(ops.iter().map(|op| match op {
            Operand::Value(_) | Operand::Imm(_) | Operand::Block(_) => OperandKind::Value,
            Operand::FunctionAddress(_) => OperandKind::FunctionAddress,
            Operand::GlobalAddress(_) => OperandKind::VariableAddress { global: true },
            Operand::LocalAddress(_) => OperandKind::VariableAddress { global: false },
        }))
    }

    fn create_virtual_clone(&mut self, node: FuncRef, suffix: &str) -> FuncRef {
        let original = self.func(node).clone();
        let name = self.clone_name(&original.name, suffix);
        let clone_idx = self.functions.len() as u32;

        let callees = original
            .callees
            .iter()
            .map(|&e| {
                let mut edge = self.edges[e as usize];
                edge.caller = clone_idx;
                self.edges.push(edge);
                (self.edges.len() - 1) as u32
            })
            .collect();

        let idx = self.push_function(Function {
            name,
            args: original.args,
            attributes: original.attributes,
            decl: DeclFlags { public: false, ..original.decl },
            flags: NodeFlags {
                local: true,
                externally_visible: false,
                force_output: false,
                address_taken: false,
                ..original.flags
            },
            block_begin_idx: original.block_begin_idx,
            block_end_idx: original.block_end_idx,
            callees,
            indirect_calls: original.indirect_calls,
            removed: false,
        });
        debug_assert_eq!(idx, clone_idx);
        FuncRef(idx)
    }

    fn remove(&mut self, node: FuncRef) {
        let callees = std::mem::take(&mut self.func_mut(node).callees);
        for e in callees {
            self.edges[e as usize].removed = true;
        }
        self.detach_edges_into(node.0);

        let func = self.func_mut(node);
        func.removed = true;
        let name = func.name.clone();
        self.unregister_name(&name);
        log::trace!("Removed function {}", name);
    }
}
