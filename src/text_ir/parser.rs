//! Text IR parser.

use super::*;
use crate::core::{OffloadError, OffloadResult};

pub fn parse_module(text: &str) -> OffloadResult<Module> {
    let parser = Parser::new(text);
    parser.parse()
}

struct Parser<'a> {
    text: &'a str,
    pos: usize,
    module: Module,

    globals: HashMap<&'a str, u32>,
    call_resolves: Vec<Resolve<'a>>,
    addr_resolves: Vec<Resolve<'a>>,
}

#[derive(Debug)]
struct Resolve<'a> {
    name: &'a str,
    index: u32,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            pos: 0,
            module: Module::new(),
            globals: HashMap::new(),
            call_resolves: Vec::new(),
            addr_resolves: Vec::new(),
        }
    }

    fn parse(mut self) -> OffloadResult<Module> {
        match self.parse_items() {
            Ok(()) => Ok(self.module),
            Err(message) => {
                let line = self.text[..self.pos.min(self.text.len())].matches('\n').count() + 1;
                log::debug!("Parse error at byte {}: {}", self.pos, message);
                Err(OffloadError::Parse { line, message })
            }
        }
    }

    fn parse_items(&mut self) -> Result<(), String> {
        self.skip_whitespace(true);
        while !self.is_eof() {
            self.parse_item()?;
            self.skip_whitespace(true);
        }

        self.resolve_all_references()?;
        self.build_call_edges();
        Ok(())
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn current_char(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current_char() {
            self.pos += ch.len_utf8();
        }
    }

    /// Skip blanks and comments. Without `skip_newlines` this stops at the end
    /// of the line, including before a trailing comment.
    fn skip_whitespace(&mut self, skip_newlines: bool) {
        while let Some(ch) = self.current_char() {
            if ch == ';' {
                if !skip_newlines {
                    break;
                }
                while let Some(ch) = self.current_char() {
                    self.advance();
                    if ch == '\n' {
                        break;
                    }
                }
            } else if ch.is_whitespace() {
                if ch == '\n' && !skip_newlines {
                    break;
                }
                self.advance();
            } else {
                break;
            }
        }
    }

    fn try_read(&mut self, ch: char) -> bool {
        self.skip_whitespace(true);
        if self.current_char() == Some(ch) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, ch: char) -> Result<(), String> {
        if !self.try_read(ch) {
            return Err(format!(
                "Expected '{}' but found {:?}",
                ch,
                self.current_char()
            ));
        }
        Ok(())
    }

    fn read_identifier(&mut self) -> Result<&'a str, String> {
        self.skip_whitespace(true);
        let start = self.pos;

        match self.current_char() {
            Some(ch) if ch.is_alphabetic() || ch == '_' || ch == '.' => {}
            Some(ch) => return Err(format!("Expected identifier but found '{}'", ch)),
            None => return Err("Expected identifier but found EOF".to_string()),
        }

        while let Some(ch) = self.current_char() {
            if ch.is_alphanumeric() || ch == '_' || ch == '.' || ch == '$' {
                self.advance();
            } else {
                break;
            }
        }

        Ok(&self.text[start..self.pos])
    }

    /// Identifier or double-quoted name.
    fn read_symbol(&mut self) -> Result<&'a str, String> {
        self.skip_whitespace(true);
        if self.current_char() != Some('"') {
            return self.read_identifier();
        }

        self.advance();
        let start = self.pos;
        while let Some(ch) = self.current_char() {
            if ch == '"' {
                let name = &self.text[start..self.pos];
                self.advance();
                if name.is_empty() {
                    return Err("Empty quoted name".to_string());
                }
                return Ok(name);
            }
            if ch == '\n' {
                break;
            }
            self.advance();
        }
        Err("Unterminated quoted name".to_string())
    }

    fn read_value_name(&mut self) -> Result<&'a str, String> {
        self.expect('%')?;
        self.read_identifier()
    }

    fn read_number(&mut self) -> Result<i64, String> {
        let start = self.pos;
        let negative = self.current_char() == Some('-');
        if negative {
            self.advance();
        }

        let digits_start = self.pos;
        let is_hex = self.text[self.pos..].starts_with("0x") || self.text[self.pos..].starts_with("0X");
        if is_hex {
            self.pos += 2;
        }
        while let Some(ch) = self.current_char() {
            if (is_hex && ch.is_ascii_hexdigit()) || ch.is_ascii_digit() {
                self.advance();
            } else {
                break;
            }
        }

        let digits = if is_hex {
            &self.text[digits_start + 2..self.pos]
        } else {
            &self.text[digits_start..self.pos]
        };
        if digits.is_empty() {
            self.pos = start;
            return Err("Expected number".to_string());
        }

        let magnitude = i64::from_str_radix(digits, if is_hex { 16 } else { 10 })
            .map_err(|e| format!("Failed to parse number: {}", e))?;
        Ok(if negative { -magnitude } else { magnitude })
    }

    fn is_name_taken(&self, name: &str) -> bool {
        self.module.func_index(name).is_some() || self.globals.contains_key(name)
    }

    fn parse_item(&mut self) -> Result<(), String> {
        let name = self.read_symbol()?;
        self.skip_whitespace(true);

        if name == "global" && self.current_char() != Some('(') {
            let global_name = self.read_symbol()?;
            if self.is_name_taken(global_name) {
                return Err(format!("Duplicate symbol: '{}'", global_name));
            }
            let idx = self.module.globals.len() as u32;
            self.globals.insert(global_name, idx);
            self.module.globals.push(Global {
                name: global_name.to_string(),
            });
            return Ok(());
        }

        self.parse_function(name)
    }

    fn parse_function(&mut self, func_name: &'a str) -> Result<(), String> {
        if self.is_name_taken(func_name) {
            return Err(format!("Duplicate function definition: '{}'", func_name));
        }

        self.expect('(')?;
        let mut args = Vec::new();
        while !self.try_read(')') {
            args.push(self.read_value_name()?.to_string());
            if !self.try_read(',') && self.current_char() != Some(')') {
                return Err("Expected ',' or ')' in argument list".to_string());
            }
        }

        let mut attributes = Vec::new();
        if self.try_read('[') {
            while !self.try_read(']') {
                let attr_name = self.read_symbol()?;
                let attr = Attribute::parse(attr_name)
                    .ok_or_else(|| format!("Unknown attribute: '{}'", attr_name))?;
                if !attributes.contains(&attr) {
                    attributes.push(attr);
                }
                if !self.try_read(',') && self.current_char() != Some(']') {
                    return Err("Expected ',' or ']' in attribute list".to_string());
                }
            }
        }

        let mut decl = DeclFlags::default();
        let mut local = false;
        let mut noclone = false;
        let mut address_taken = false;
        loop {
            self.skip_whitespace(true);
            match self.current_char() {
                Some('!') | Some('{') | None => break,
                _ => {}
            }
            match self.read_identifier()? {
                "local" => local = true,
                "virtual" => decl.is_virtual = true,
                "ctor" => decl.static_constructor = true,
                "dtor" => decl.static_destructor = true,
                "artificial" => decl.artificial = true,
                "noclone" => noclone = true,
                "address_taken" => address_taken = true,
                other => return Err(format!("Unknown function flag: '{}'", other)),
            }
        }
        decl.public = !local;

        let definition = !self.try_read('!');
        let block_begin_idx = self.module.blocks.len() as u32;
        if definition {
            self.expect('{')?;
            let mut block_names: Vec<&'a str> = Vec::new();
            while !self.try_read('}') {
                if self.is_eof() {
                    return Err(format!("Unterminated body of '{}'", func_name));
                }
                let block_name = self.parse_block()?;
                if block_names.contains(&block_name) {
                    return Err(format!("Duplicate block label: '{}'", block_name));
                }
                block_names.push(block_name);
            }
        }
        let block_end_idx = self.module.blocks.len() as u32;

        self.module.push_function(Function {
            name: func_name.to_string(),
            args,
            attributes,
            decl,
            flags: NodeFlags {
                definition,
                versionable: definition && !noclone,
                local,
                externally_visible: !local,
                force_output: false,
                address_taken,
            },
            block_begin_idx,
            block_end_idx,
            callees: Vec::new(),
            indirect_calls: 0,
            removed: false,
        });

        Ok(())
    }

    fn parse_block(&mut self) -> Result<&'a str, String> {
        let block_name = self.read_identifier()?;
        self.expect(':')?;

        let inst_begin_idx = self.module.insts.len() as u32;
        while !self.is_at_block_end() {
            if self.is_eof() {
                break;
            }
            self.parse_instruction()?;
        }
        let inst_end_idx = self.module.insts.len() as u32;

        self.module.blocks.push(Block {
            name: block_name.to_string(),
            inst_begin_idx,
            inst_end_idx,
        });

        Ok(block_name)
    }

    fn is_at_block_end(&mut self) -> bool {
        self.skip_whitespace(true);

        if self.current_char() == Some('}') {
            return true;
        }

        // Next block starts
        let saved_pos = self.pos;
        let has_colon = match self.read_identifier() {
            Ok(_) => {
                self.skip_whitespace(false);
                self.current_char() == Some(':')
            }
            Err(_) => false,
        };
        self.pos = saved_pos;
        has_colon
    }

    fn is_at_inst_end(&mut self) -> bool {
        self.skip_whitespace(false);
        matches!(self.current_char(), None | Some('\n') | Some(';') | Some('}'))
    }

    fn parse_instruction(&mut self) -> Result<(), String> {
        self.skip_whitespace(true);

        let result = if self.current_char() == Some('%') {
            let name = self.read_value_name()?;
            self.expect('=')?;
            Some(name.to_string())
        } else {
            None
        };

        let inst_idx = self.module.insts.len() as u32;
        let op_begin_idx = self.module.operands.len() as u32;
        let opcode = self.read_identifier()?;

        let op = match opcode {
            "call" => {
                self.expect('@')?;
                let callee_pos = self.pos;
                let callee = self.read_symbol()?;
                self.call_resolves.push(Resolve {
                    name: callee,
                    index: inst_idx,
                    pos: callee_pos,
                });
                self.parse_call_args()?;
                Opcode::Call {
                    callee: u32::MAX,
                    flags: self.parse_call_flags()?,
                }
            }
            "call_indirect" => {
                let target = self.read_value_name()?.to_string();
                self.parse_call_args()?;
                Opcode::CallIndirect {
                    target,
                    flags: self.parse_call_flags()?,
                }
            }
            "dbg" => {
                self.parse_operand_list()?;
                Opcode::Debug
            }
            other => {
                self.parse_operand_list()?;
                Opcode::Other(other.to_string())
            }
        };

        let op_end_idx = self.module.operands.len() as u32;
        self.module.insts.push(Inst {
            result,
            op,
            op_begin_idx,
            op_end_idx,
        });
        Ok(())
    }

    fn parse_call_args(&mut self) -> Result<(), String> {
        self.expect('(')?;
        while !self.try_read(')') {
            self.skip_whitespace(true);
            self.parse_operand()?;
            if !self.try_read(',') && self.current_char() != Some(')') {
                return Err("Expected ',' or ')' in call arguments".to_string());
            }
        }
        Ok(())
    }

    fn parse_call_flags(&mut self) -> Result<CallFlags, String> {
        let mut flags = CallFlags::default();
        while !self.is_at_inst_end() {
            match self.read_identifier()? {
                "throws" => flags.throws = true,
                "rso" => flags.return_slot_opt = true,
                other => return Err(format!("Unknown call flag: '{}'", other)),
            }
        }
        Ok(flags)
    }

    fn parse_operand_list(&mut self) -> Result<(), String> {
        while !self.is_at_inst_end() {
            self.parse_operand()?;
            self.skip_whitespace(false);
            if self.current_char() == Some(',') {
                self.advance();
            } else if !self.is_at_inst_end() {
                return Err(format!(
                    "Expected ',' or end of instruction but found {:?}",
                    self.current_char()
                ));
            }
        }
        Ok(())
    }

    fn parse_operand(&mut self) -> Result<(), String> {
        self.skip_whitespace(false);
        let operand = match self.current_char() {
            Some('%') => Operand::Value(self.read_value_name()?.to_string()),
            Some('^') => {
                self.advance();
                Operand::Block(self.read_identifier()?.to_string())
            }
            Some('&') => {
                self.advance();
                if self.current_char() == Some('%') {
                    Operand::LocalAddress(self.read_value_name()?.to_string())
                } else {
                    let pos = self.pos;
                    let name = self.read_symbol()?;
                    self.addr_resolves.push(Resolve {
                        name,
                        index: self.module.operands.len() as u32,
                        pos,
                    });
                    Operand::FunctionAddress(u32::MAX)
                }
            }
            Some(ch) if ch == '-' || ch.is_ascii_digit() => Operand::Imm(self.read_number()?),
            other => return Err(format!("Expected operand but found {:?}", other)),
        };
        self.module.operands.push(operand);
        Ok(())
    }

    fn resolve_all_references(&mut self) -> Result<(), String> {
        for resolve in std::mem::take(&mut self.call_resolves) {
            let Some(callee) = self.module.func_index(resolve.name) else {
                self.pos = resolve.pos;
                return Err(format!("Unknown function: '{}'", resolve.name));
            };
            if let Opcode::Call { callee: slot, .. } = &mut self.module.insts[resolve.index as usize].op {
                *slot = callee;
            }
        }

        for resolve in std::mem::take(&mut self.addr_resolves) {
            let operand = if let Some(func) = self.module.func_index(resolve.name) {
                self.module.functions[func as usize].flags.address_taken = true;
                Operand::FunctionAddress(func)
            } else if let Some(&global) = self.globals.get(resolve.name) {
                Operand::GlobalAddress(global)
            } else {
                self.pos = resolve.pos;
                return Err(format!("Unknown symbol: '{}'", resolve.name));
            };
            self.module.operands[resolve.index as usize] = operand;
        }

        Ok(())
    }

    fn build_call_edges(&mut self) {
        let module = &mut self.module;
        for caller in 0..module.functions.len() {
            let (begin, end) = {
                let f = &module.functions[caller];
                (f.block_begin_idx, f.block_end_idx)
            };
            let mut callees = Vec::new();
            let mut indirect_calls = 0;

            for block in &module.blocks[begin as usize..end as usize] {
                for inst in &module.insts[block.inst_begin_idx as usize..block.inst_end_idx as usize] {
                    match inst.op {
                        Opcode::Call { callee, flags } => {
                            callees.push(module.edges.len() as u32);
                            module.edges.push(Edge {
                                caller: caller as u32,
                                callee,
                                can_throw_external: flags.throws,
                                removed: false,
                            });
                        }
                        Opcode::CallIndirect { .. } => indirect_calls += 1,
                        _ => {}
                    }
                }
            }

            let func = &mut module.functions[caller];
            func.callees = callees;
            func.indirect_calls = indirect_calls;
        }
    }
}
