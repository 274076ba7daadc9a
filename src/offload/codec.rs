// This module implements the summary stream that carries offload decisions across
// compilation units and compiler invocations. A stream covers one partition, the
// ordered set of functions described by a SymtabEncoder, whose positions are the
// partition-local indices written into the stream. The layout is: a ULEB128 count of
// participating functions (kind != none), then for each of them the ULEB128 index,
// one bit-pack word (2 bits kind, 1 bit accelerator implementation, 1 bit bound
// function present, least significant bit first, itself written as ULEB128) and, when
// the bound bit is set, a declaration reference made of a ULEB128 length and the
// UTF-8 assembler name of the bound function. A single zero byte closes the stream.
// Reading resolves indices through the encoder of the receiving side; an index that is
// out of range or names a node without a body violates whole-program consistency and
// is reported as a fatal error. Declaration references are resolved by name, creating
// a declaration node when the receiving graph does not know the function yet. There
// is no version tag in the stream.

//! Binary summary stream.

use crate::core::{CallGraph, OffloadError, OffloadResult};
use super::summary::{FunctionKind, SummaryStore};
use hashbrown::HashMap;
use std::hash::Hash;

/// Ordered node set of one partition; a node's index is its position.
#[derive(Debug, Clone)]
pub struct SymtabEncoder<N> {
    nodes: Vec<N>,
    index: HashMap<N, u32>,
}

impl<N: Copy + Eq + Hash> Default for SymtabEncoder<N> {
    fn default() -> Self {
        Self { nodes: Vec::new(), index: HashMap::new() }
    }
}

impl<N: Copy + Eq + Hash> SymtabEncoder<N> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encoder over the given nodes, in order. Duplicates keep their first index.
    pub fn from_nodes(nodes: impl IntoIterator<Item = N>) -> Self {
        let mut encoder = Self::new();
        for node in nodes {
            encoder.encode(node);
        }
        encoder
    }

    /// Whole program as a single partition.
    pub fn for_functions<G: CallGraph<NodeRef = N>>(graph: &G) -> Self {
        Self::from_nodes(graph.functions())
    }

    /// Index of `node`, adding it to the partition if needed.
    pub fn encode(&mut self, node: N) -> u32 {
        if let Some(&idx) = self.index.get(&node) {
            return idx;
        }
        let idx = self.nodes.len() as u32;
        self.nodes.push(node);
        self.index.insert(node, idx);
        idx
    }

    pub fn lookup(&self, node: N) -> Option<u32> {
        self.index.get(&node).copied()
    }

    pub fn deref(&self, index: u64) -> Option<N> {
        usize::try_from(index).ok().and_then(|idx| self.nodes.get(idx)).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in partition order.
    pub fn iter(&self) -> impl Iterator<Item = N> + '_ {
        self.nodes.iter().copied()
    }
}

/// Fixed-width values packed into one word, least significant bit first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BitPack {
    word: u64,
    pos: u32,
}

impl BitPack {
    pub fn new() -> Self {
        Self::default()
    }

    fn from_word(word: u64) -> Self {
        Self { word, pos: 0 }
    }

    pub fn word(&self) -> u64 {
        self.word
    }

    /// Append the low `bits` bits of `value`.
    pub fn pack_value(&mut self, value: u64, bits: u32) {
        debug_assert!(bits > 0 && self.pos + bits <= 64);
        let mask = (1u64 << bits) - 1;
        self.word |= (value & mask) << self.pos;
        self.pos += bits;
    }

    /// Take the next `bits` bits.
    pub fn unpack_value(&mut self, bits: u32) -> u64 {
        debug_assert!(bits > 0 && self.pos + bits <= 64);
        let mask = (1u64 << bits) - 1;
        let value = (self.word >> self.pos) & mask;
        self.pos += bits;
        value
    }
}

/// Byte sink for the summary stream.
#[derive(Debug, Clone, Default)]
pub struct OutputStream {
    buf: Vec<u8>,
}

impl OutputStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_char(&mut self, byte: u8) {
        self.buf.push(byte);
    }

    /// Unsigned LEB128.
    pub fn write_uhwi(&mut self, mut value: u64) {
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                self.buf.push(byte);
                break;
            }
            self.buf.push(byte | 0x80);
        }
    }

    pub fn write_bitpack(&mut self, bp: &BitPack) {
        self.write_uhwi(bp.word());
    }

    /// Declaration reference by assembler name.
    pub fn write_decl_ref(&mut self, name: &str) {
        self.write_uhwi(name.len() as u64);
        self.buf.extend_from_slice(name.as_bytes());
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Byte source for the summary stream.
#[derive(Debug, Clone)]
pub struct InputStream<'data> {
    data: &'data [u8],
    pos: usize,
}

impl<'data> InputStream<'data> {
    pub fn new(data: &'data [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn offset(&self) -> usize {
        self.pos
    }

    fn error(&self, reason: impl Into<String>) -> OffloadError {
        OffloadError::Codec { offset: self.pos, reason: reason.into() }
    }

    pub fn read_char(&mut self) -> OffloadResult<u8> {
        let byte = *self
            .data
            .get(self.pos)
            .ok_or_else(|| self.error("unexpected end of stream"))?;
        self.pos += 1;
        Ok(byte)
    }

    pub fn read_uhwi(&mut self) -> OffloadResult<u64> {
        let start = self.pos;
        let mut result = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = self.read_char()?;
            if shift >= 64 || (shift == 63 && byte & 0x7e != 0) {
                self.pos = start;
                return Err(self.error("variable-length integer overflows 64 bits"));
            }
            result |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
        }
    }

    pub fn read_bitpack(&mut self) -> OffloadResult<BitPack> {
        Ok(BitPack::from_word(self.read_uhwi()?))
    }

    pub fn read_decl_ref(&mut self) -> OffloadResult<&'data str> {
        let len = self.read_uhwi()?;
        let len = usize::try_from(len).map_err(|_| self.error("reference length too large"))?;
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| self.error("declaration reference runs past end of stream"))?;
        let name = std::str::from_utf8(&self.data[self.pos..end])
            .map_err(|_| self.error("declaration reference is not valid UTF-8"))?;
        self.pos = end;
        Ok(name)
    }
}

/// Stream out the summaries of the participating functions of a partition.
pub fn write_summary<G: CallGraph>(
    graph: &G,
    summaries: &SummaryStore<G::NodeRef>,
    encoder: &SymtabEncoder<G::NodeRef>,
) -> Vec<u8> {
    let mut ob = OutputStream::new();

    let count = encoder
        .iter()
        .filter(|&node| summaries.get(node).is_participant())
        .count();
    ob.write_uhwi(count as u64);

    for (index, node) in encoder.iter().enumerate() {
        let s = summaries.get(node);
        if !s.is_participant() {
            continue;
        }
        ob.write_uhwi(index as u64);

        let mut bp = BitPack::new();
        bp.pack_value(s.kind.bits(), 2);
        bp.pack_value(u64::from(s.is_accelerator_implementation), 1);
        bp.pack_value(u64::from(s.bound_function.is_some()), 1);
        ob.write_bitpack(&bp);
        if let Some(bound) = s.bound_function {
            ob.write_decl_ref(graph.name(bound));
        }
    }

    ob.write_char(0);
    ob.into_bytes()
}

/// Read one summary stream into `summaries`. Returns the number of entries.
///
/// Indices are resolved through `encoder`. An index outside the encoder or
/// naming a node that is not a definition is a fatal consistency error.
/// Entries without a bound function leave an existing one in place.
pub fn read_summary<G: CallGraph>(
    graph: &mut G,
    summaries: &mut SummaryStore<G::NodeRef>,
    encoder: &SymtabEncoder<G::NodeRef>,
    data: &[u8],
) -> OffloadResult<usize> {
    let mut ib = InputStream::new(data);
    let count = ib.read_uhwi()?;

    for _ in 0..count {
        let index = ib.read_uhwi()?;
        let node = encoder
            .deref(index)
            .ok_or(OffloadError::BadIndex { index, len: encoder.len() })?;
        if !graph.node_flags(node).definition {
            return Err(OffloadError::NotADefinition {
                index,
                name: graph.name(node).to_string(),
            });
        }

        let mut bp = ib.read_bitpack()?;
        let kind_bits = bp.unpack_value(2);
        let kind = FunctionKind::from_bits(kind_bits).ok_or_else(|| OffloadError::Codec {
            offset: ib.offset(),
            reason: format!("invalid function kind {}", kind_bits),
        })?;
        let is_accelerator_implementation = bp.unpack_value(1) != 0;
        let has_bound = bp.unpack_value(1) != 0;

        let bound_function = if has_bound {
            let name = ib.read_decl_ref()?;
            Some(graph.get_or_create(name))
        } else {
            None
        };

        let s = summaries.get_mut(node);
        s.kind = kind;
        s.is_accelerator_implementation = is_accelerator_implementation;
        // A link read from another stream survives entries that carry none.
        if bound_function.is_some() {
            s.bound_function = bound_function;
        }
    }

    if ib.read_char()? != 0 {
        return Err(OffloadError::Codec {
            offset: ib.offset() - 1,
            reason: "missing stream terminator".to_string(),
        });
    }

    usize::try_from(count).map_err(|_| OffloadError::Codec {
        offset: 0,
        reason: "entry count too large".to_string(),
    })
}
