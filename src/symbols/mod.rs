//! The in-memory symbol database that the DWARF parser populates. A
//! [`Module`] owns everything materialized for one loaded object: source
//! files, types, compilands, functions with their blocks/locals/line
//! records, and global variables. Consumers query it by runtime address
//! ("which function covers pc?") or walk the symbol arena directly.
//!
//! Symbols are stored in a single arena and referenced by [`SymbolId`];
//! type cross-references are ids into the same arena, which makes the
//! graph cheap to build and tolerant of forward references.

use std::collections::HashMap;

use tracing::warn;

/// Index into a module's symbol arena.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SymbolId(pub u32);

/// Index into a module's source-file table.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SourceId(pub u32);

/// Index into a function's block table.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct BlockId(pub u32);

/// The interpretation of a basic (built-in) type.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BasicKind {
    NoType,
    Void,
    Bool,
    Char,
    Int,
    UInt,
    ULong,
    Float,
    Complex,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum UdtKind {
    Struct,
    Class,
    Union,
}

/// Whether a function-scope datum is a declared local or an incoming
/// parameter.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DataKind {
    Local,
    Param,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PointKind {
    Label,
}

/// Linkage visibility of a global variable.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Linkage {
    Local,
    Global,
}

/// The debug format a module's symbols were loaded from.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SymbolFormat {
    None,
    Dia,
}

/// Signature bytes stamped on a module once DWARF data has been loaded.
pub const DWARF_SIGNATURE: [u8; 4] = *b"DWAR";

/// Post-parse annotation describing what kind of debug information a
/// module ended up with.
#[derive(Copy, Clone, Debug)]
pub struct DebugFormat {
    pub format: SymbolFormat,
    pub signature: [u8; 4],
    pub line_numbers: bool,
    pub global_symbols: bool,
    pub type_info: bool,
    pub source_indexed: bool,
}

pub struct SourceFile {
    pub path: String,
}

pub struct EnumElement {
    pub name: String,
    pub value: i64,
}

pub struct UdtMember {
    pub name: String,
    pub ty: Option<SymbolId>,
    /// Offset of the member from the start of the aggregate, in bits.
    pub bit_offset: u64,
    /// Zero for ordinary members.
    pub bit_size: u64,
}

/// A lexical block inside a function. Blocks nest through `parent`.
pub struct Block {
    pub start: u64,
    pub end: u64,
    pub parent: Option<BlockId>,
}

pub struct LocalVariable {
    pub name: String,
    pub kind: DataKind,
    /// Target register number (already mapped from DWARF numbering).
    pub register: u16,
    /// The value lives at `[register] + offset` rather than in the
    /// register itself.
    pub deref: bool,
    pub offset: i64,
    pub block: Option<BlockId>,
    pub ty: Option<SymbolId>,
}

pub struct LineRecord {
    pub source: SourceId,
    pub line: u32,
    /// Code offset from the start of the owning function.
    pub offset: u64,
}

pub struct FunctionPoint {
    pub kind: PointKind,
    pub address: u64,
    pub name: String,
}

pub struct Compiland {
    pub source: SourceId,
}

pub struct BasicType {
    pub name: String,
    pub kind: BasicKind,
    pub size: u64,
}

pub struct PointerType {
    pub points_to: Option<SymbolId>,
}

pub struct ArrayType {
    pub start: u64,
    pub end: u64,
    pub element: Option<SymbolId>,
    pub index: Option<SymbolId>,
}

pub struct Typedef {
    pub name: String,
    pub of: Option<SymbolId>,
}

pub struct EnumType {
    pub name: String,
    pub elements: Vec<EnumElement>,
}

pub struct UdtType {
    pub name: String,
    pub kind: UdtKind,
    pub size: u64,
    pub members: Vec<UdtMember>,
}

pub struct FunctionSignature {
    pub returns: Option<SymbolId>,
    pub params: Vec<Option<SymbolId>>,
}

pub struct Function {
    pub name: String,
    pub compiland: Option<SymbolId>,
    pub address: u64,
    pub size: u64,
    pub signature: SymbolId,
    pub blocks: Vec<Block>,
    pub locals: Vec<LocalVariable>,
    pub lines: Vec<LineRecord>,
    pub points: Vec<FunctionPoint>,
}

pub struct GlobalVariable {
    pub name: String,
    pub compiland: Option<SymbolId>,
    pub linkage: Linkage,
    pub address: u64,
    pub ty: Option<SymbolId>,
}

pub enum Symbol {
    Compiland(Compiland),
    Basic(BasicType),
    Pointer(PointerType),
    Array(ArrayType),
    Typedef(Typedef),
    Enum(EnumType),
    Udt(UdtType),
    Signature(FunctionSignature),
    Function(Function),
    Variable(GlobalVariable),
}

impl Symbol {
    /// The runtime address of positional symbols, `None` for types.
    fn address(&self) -> Option<u64> {
        match self {
            Symbol::Function(f) => Some(f.address),
            Symbol::Variable(v) => Some(v.address),
            _ => None,
        }
    }
}

/// One loaded object and all the symbols materialized for it.
pub struct Module {
    pub name: String,
    /// Runtime load base; all addresses in the database include it.
    pub base: u64,
    symbols: Vec<Symbol>,
    sources: Vec<SourceFile>,
    source_index: HashMap<String, SourceId>,
    /// Positional symbols (functions, global variables) sorted by address.
    addr_table: Vec<SymbolId>,
    pub debug_format: Option<DebugFormat>,
}

impl Module {
    pub fn new(name: &str, base: u64) -> Self {
        Module {
            name: name.to_string(),
            base,
            symbols: Vec::new(),
            sources: Vec::new(),
            source_index: HashMap::new(),
            addr_table: Vec::new(),
            debug_format: None,
        }
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn source_path(&self, id: SourceId) -> &str {
        &self.sources[id.0 as usize].path
    }

    pub fn sources(&self) -> &[SourceFile] {
        &self.sources
    }

    /// Registers a source file, composing the directory with the file
    /// name. Absolute names ignore the directory. Re-registering the same
    /// path returns the existing id.
    pub fn add_source(&mut self, dir: Option<&str>, name: &str) -> SourceId {
        let path = match dir {
            Some(_) if name.starts_with('/') => name.to_string(),
            Some(d) if d.ends_with('/') => format!("{d}{name}"),
            Some(d) => format!("{d}/{name}"),
            None => name.to_string(),
        };
        if let Some(&id) = self.source_index.get(&path) {
            return id;
        }
        let id = SourceId(self.sources.len() as u32);
        self.source_index.insert(path.clone(), id);
        self.sources.push(SourceFile { path });
        id
    }

    fn push(&mut self, symbol: Symbol) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        if let Some(addr) = symbol.address() {
            let idx = self
                .addr_table
                .partition_point(|&s| self.symbols[s.0 as usize].address() <= Some(addr));
            self.addr_table.insert(idx, id);
        }
        self.symbols.push(symbol);
        id
    }

    pub fn new_compiland(&mut self, source: SourceId) -> SymbolId {
        self.push(Symbol::Compiland(Compiland { source }))
    }

    pub fn new_basic(&mut self, kind: BasicKind, name: &str, size: u64) -> SymbolId {
        self.push(Symbol::Basic(BasicType {
            name: name.to_string(),
            kind,
            size,
        }))
    }

    pub fn new_pointer(&mut self, points_to: Option<SymbolId>) -> SymbolId {
        self.push(Symbol::Pointer(PointerType { points_to }))
    }

    pub fn new_array(
        &mut self,
        start: u64,
        end: u64,
        element: Option<SymbolId>,
        index: Option<SymbolId>,
    ) -> SymbolId {
        self.push(Symbol::Array(ArrayType {
            start,
            end,
            element,
            index,
        }))
    }

    pub fn new_typedef(&mut self, name: &str, of: Option<SymbolId>) -> SymbolId {
        self.push(Symbol::Typedef(Typedef {
            name: name.to_string(),
            of,
        }))
    }

    pub fn new_enum(&mut self, name: &str) -> SymbolId {
        self.push(Symbol::Enum(EnumType {
            name: name.to_string(),
            elements: Vec::new(),
        }))
    }

    pub fn add_enum_element(&mut self, en: SymbolId, name: &str, value: i64) {
        match &mut self.symbols[en.0 as usize] {
            Symbol::Enum(e) => e.elements.push(EnumElement {
                name: name.to_string(),
                value,
            }),
            _ => warn!("symbol {} is not an enum", en.0),
        }
    }

    pub fn new_udt(&mut self, kind: UdtKind, name: &str, size: u64) -> SymbolId {
        self.push(Symbol::Udt(UdtType {
            name: name.to_string(),
            kind,
            size,
            members: Vec::new(),
        }))
    }

    pub fn add_udt_element(
        &mut self,
        udt: SymbolId,
        name: &str,
        ty: Option<SymbolId>,
        bit_offset: u64,
        bit_size: u64,
    ) {
        match &mut self.symbols[udt.0 as usize] {
            Symbol::Udt(u) => u.members.push(UdtMember {
                name: name.to_string(),
                ty,
                bit_offset,
                bit_size,
            }),
            _ => warn!("symbol {} is not a udt", udt.0),
        }
    }

    pub fn new_function_signature(&mut self, returns: Option<SymbolId>) -> SymbolId {
        self.push(Symbol::Signature(FunctionSignature {
            returns,
            params: Vec::new(),
        }))
    }

    pub fn add_signature_parameter(&mut self, sig: SymbolId, ty: Option<SymbolId>) {
        match &mut self.symbols[sig.0 as usize] {
            Symbol::Signature(s) => s.params.push(ty),
            _ => warn!("symbol {} is not a function signature", sig.0),
        }
    }

    pub fn new_function(
        &mut self,
        compiland: Option<SymbolId>,
        name: &str,
        address: u64,
        size: u64,
        signature: SymbolId,
    ) -> SymbolId {
        self.push(Symbol::Function(Function {
            name: name.to_string(),
            compiland,
            address,
            size,
            signature,
            blocks: Vec::new(),
            locals: Vec::new(),
            lines: Vec::new(),
            points: Vec::new(),
        }))
    }

    pub fn new_global_variable(
        &mut self,
        compiland: Option<SymbolId>,
        name: &str,
        linkage: Linkage,
        address: u64,
        ty: Option<SymbolId>,
    ) -> SymbolId {
        self.push(Symbol::Variable(GlobalVariable {
            name: name.to_string(),
            compiland,
            linkage,
            address,
            ty,
        }))
    }

    fn function_mut(&mut self, func: SymbolId) -> Option<&mut Function> {
        match &mut self.symbols[func.0 as usize] {
            Symbol::Function(f) => Some(f),
            _ => {
                warn!("symbol {} is not a function", func.0);
                None
            }
        }
    }

    pub fn open_func_block(
        &mut self,
        func: SymbolId,
        parent: Option<BlockId>,
        start: u64,
        len: u64,
    ) -> Option<BlockId> {
        let f = self.function_mut(func)?;
        let id = BlockId(f.blocks.len() as u32);
        f.blocks.push(Block {
            start,
            end: start + len,
            parent,
        });
        Some(id)
    }

    /// Closes a block opened with [`Module::open_func_block`]. A non-zero
    /// `end` overrides the extent recorded when the block was opened.
    pub fn close_func_block(&mut self, func: SymbolId, block: BlockId, end: u64) {
        if let Some(f) = self.function_mut(func) {
            if end != 0 {
                if let Some(b) = f.blocks.get_mut(block.0 as usize) {
                    b.end = end;
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_func_local(
        &mut self,
        func: SymbolId,
        kind: DataKind,
        register: u16,
        deref: bool,
        offset: i64,
        block: Option<BlockId>,
        ty: Option<SymbolId>,
        name: &str,
    ) {
        if let Some(f) = self.function_mut(func) {
            f.locals.push(LocalVariable {
                name: name.to_string(),
                kind,
                register,
                deref,
                offset,
                block,
                ty,
            });
        }
    }

    pub fn add_func_line(&mut self, func: SymbolId, source: SourceId, line: u32, offset: u64) {
        if let Some(f) = self.function_mut(func) {
            f.lines.push(LineRecord {
                source,
                line,
                offset,
            });
        }
    }

    pub fn add_func_point(&mut self, func: SymbolId, kind: PointKind, address: u64, name: &str) {
        if let Some(f) = self.function_mut(func) {
            f.points.push(FunctionPoint {
                kind,
                address,
                name: name.to_string(),
            });
        }
    }

    /// Puts a function's records into canonical order once its unit has
    /// been fully loaded: line records by code offset, points by address.
    pub fn normalize_function(&mut self, func: SymbolId) {
        if let Some(f) = self.function_mut(func) {
            f.lines.sort_by_key(|l| l.offset);
            f.points.sort_by_key(|p| p.address);
        }
    }

    /// Finds the positional symbol with the greatest start address not
    /// exceeding `addr`.
    pub fn find_nearest(&self, addr: u64) -> Option<SymbolId> {
        let idx = self
            .addr_table
            .partition_point(|&s| self.symbols[s.0 as usize].address() <= Some(addr));
        if idx == 0 {
            return None;
        }
        Some(self.addr_table[idx - 1])
    }

    /// Byte size of a type, following typedefs. Pointers are the 32-bit
    /// address size this parser supports.
    pub fn type_length(&self, ty: SymbolId) -> Option<u64> {
        match self.symbol(ty) {
            Symbol::Basic(b) => Some(b.size),
            Symbol::Pointer(_) => Some(4),
            Symbol::Enum(_) => Some(4),
            Symbol::Udt(u) => Some(u.size),
            Symbol::Typedef(t) => t.of.and_then(|of| self.type_length(of)),
            Symbol::Array(a) => {
                let elem = a.element.and_then(|e| self.type_length(e))?;
                Some((a.end - a.start + 1) * elem)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_source_dedup() {
        let mut module = Module::new("test", 0);
        let a = module.add_source(Some("/src"), "a.c");
        let b = module.add_source(Some("/src"), "b.c");
        let a2 = module.add_source(Some("/src"), "a.c");
        assert_eq!(a, a2);
        assert_ne!(a, b);
        assert_eq!(module.source_path(a), "/src/a.c");
    }

    #[test]
    fn test_source_absolute_name() {
        let mut module = Module::new("test", 0);
        let id = module.add_source(Some("/src"), "/usr/include/stdio.h");
        assert_eq!(module.source_path(id), "/usr/include/stdio.h");
    }

    #[test]
    fn test_find_nearest() {
        let mut module = Module::new("test", 0);
        let sig = module.new_function_signature(None);
        let f1 = module.new_function(None, "one", 0x1000, 0x100, sig);
        let f2 = module.new_function(None, "two", 0x2000, 0x100, sig);
        assert_eq!(module.find_nearest(0xfff), None);
        assert_eq!(module.find_nearest(0x1000), Some(f1));
        assert_eq!(module.find_nearest(0x1fff), Some(f1));
        assert_eq!(module.find_nearest(0x2000), Some(f2));
        assert_eq!(module.find_nearest(u64::MAX), Some(f2));
    }

    #[test]
    fn test_addr_table_out_of_order_inserts() {
        let mut module = Module::new("test", 0);
        let sig = module.new_function_signature(None);
        let late = module.new_function(None, "late", 0x3000, 0x10, sig);
        let early = module.new_function(None, "early", 0x1000, 0x10, sig);
        assert_eq!(module.find_nearest(0x1500), Some(early));
        assert_eq!(module.find_nearest(0x3005), Some(late));
    }

    #[test]
    fn test_type_length() {
        let mut module = Module::new("test", 0);
        let int = module.new_basic(BasicKind::Int, "int", 4);
        let ptr = module.new_pointer(Some(int));
        let td = module.new_typedef("word", Some(int));
        let arr = module.new_array(0, 9, Some(int), None);
        assert_eq!(module.type_length(int), Some(4));
        assert_eq!(module.type_length(ptr), Some(4));
        assert_eq!(module.type_length(td), Some(4));
        assert_eq!(module.type_length(arr), Some(40));
    }

    #[test]
    fn test_normalize_sorts_lines() {
        let mut module = Module::new("test", 0);
        let sig = module.new_function_signature(None);
        let f = module.new_function(None, "f", 0x1000, 0x100, sig);
        let src = module.add_source(None, "f.c");
        module.add_func_line(f, src, 3, 0x20);
        module.add_func_line(f, src, 1, 0x0);
        module.add_func_line(f, src, 2, 0x10);
        module.normalize_function(f);
        match module.symbol(f) {
            Symbol::Function(f) => {
                let offsets: Vec<u64> = f.lines.iter().map(|l| l.offset).collect();
                assert_eq!(offsets, vec![0x0, 0x10, 0x20]);
            }
            _ => panic!("expected a function"),
        }
    }
}
