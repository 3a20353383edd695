//! Translation of debug info entries into symbol-database objects. The
//! loader dispatches on each entry's tag and builds types, functions,
//! variables, and blocks through the module's constructors. Every
//! handler memoizes through the entry's `symt` back-pointer, so type
//! cross-references force a lazy build at most once and cycles through
//! self-referencing aggregates terminate.

use tracing::{debug, trace, warn};

use crate::dwarf::abbrev::AbbrevTable;
use crate::dwarf::info::{AttrValue, EntryId, Unit, UnitHeader};
use crate::dwarf::{ate, line, location, AttributeName, DwarfSections, Stream, Tag};
use crate::dwarf::location::Location;
use crate::errors::{DwarfError, Result};
use crate::registers::RegisterMapping;
use crate::symbols::{
    BasicKind, BlockId, DataKind, DebugFormat, Linkage, Module, PointKind, Symbol, SymbolFormat,
    SymbolId, UdtKind, DWARF_SIGNATURE,
};
use crate::thunks::{find_thunk, ThunkArea};

pub(crate) struct DwarfParser<'a> {
    sections: DwarfSections<'a>,
    module: &'a mut Module,
    thunks: &'a [ThunkArea],
    registers: &'a dyn RegisterMapping,
    /// Counter behind the synthetic names handed to unnamed entries.
    /// Scoped to this parser so independent parses are reproducible.
    synthetic: u32,
}

/// Context threaded through the children of one subprogram. `func` is
/// `None` for declarations and for variables outside any function.
struct SubprogramContext {
    compiland: Option<SymbolId>,
    func: Option<SymbolId>,
    /// DWARF number of the register the frame base resolves to.
    frame_register: u16,
    frame_offset: i64,
}

impl<'a> DwarfParser<'a> {
    pub fn new(
        module: &'a mut Module,
        thunks: &'a [ThunkArea],
        registers: &'a dyn RegisterMapping,
        sections: DwarfSections<'a>,
    ) -> Self {
        DwarfParser {
            sections,
            module,
            thunks,
            registers,
            synthetic: 0,
        }
    }

    /// Walks every compilation unit in the debug section. Units that
    /// fail to decode are logged and skipped; the declared unit length
    /// always tells us where the next one starts.
    pub fn run(&mut self) -> Result<()> {
        let debug = self.sections.debug;
        let mut offset = 0usize;
        while offset < debug.len() {
            let mut s = Stream::at(debug, offset, 4);
            let header = match UnitHeader::read(&mut s) {
                Ok(header) => header,
                Err(e) => {
                    warn!("truncated compilation unit header at {offset:#x}: {e}");
                    break;
                }
            };
            let next = offset + header.unit_length as usize + 4;
            if let Err(e) = self.parse_unit(&header, offset, s) {
                warn!("skipping compilation unit at {offset:#x}: {e}");
            }
            offset = next;
        }

        self.module.debug_format = Some(DebugFormat {
            format: SymbolFormat::Dia,
            signature: DWARF_SIGNATURE,
            line_numbers: true,
            global_symbols: true,
            type_info: true,
            source_indexed: true,
        });
        Ok(())
    }

    fn parse_unit(&mut self, header: &UnitHeader, unit_offset: usize, mut s: Stream<'a>) -> Result<()> {
        trace!(
            unit_offset,
            length = header.unit_length,
            version = header.version,
            abbrev_offset = header.abbrev_offset,
            address_size = header.address_size,
            "compilation unit"
        );
        if header.version != 2 {
            return Err(DwarfError::UnsupportedVersion(header.version));
        }
        if header.address_size != 4 {
            return Err(DwarfError::UnsupportedAddressSize(header.address_size));
        }
        let end = unit_offset + header.unit_length as usize + 4;
        s.set_end(end);

        let mut abbrev_stream = Stream::at(
            self.sections.abbrev,
            header.abbrev_offset as usize,
            header.address_size,
        );
        let abbrevs = AbbrevTable::parse(&mut abbrev_stream)?;

        let mut unit = Unit::new(header.address_size, unit_offset, end, abbrevs);
        let root = unit
            .read_entry(&mut s, self.sections)?
            .ok_or(DwarfError::BadUnitRoot)?;
        if unit.tag_of(root) != Tag::DW_TAG_compile_unit {
            return Err(DwarfError::BadUnitRoot);
        }

        let name = self.find_name(&unit, root, "compiland")?;
        let comp_dir = unit
            .find_attribute(self.sections, root, AttributeName::DW_AT_comp_dir)?
            .and_then(|a| a.string().map(str::to_string));
        let source = self.module.add_source(comp_dir.as_deref(), &name);
        let compiland = self.module.new_compiland(source);
        unit.entry_mut(root).symt = Some(compiland);

        for i in 0..unit.entry(root).children.len() {
            let child = unit.entry(root).children[i];
            if let Err(e) = self.load_entry(&mut unit, child, Some(compiland)) {
                warn!("entry at {:#x} failed: {e}", unit.entry(child).offset);
            }
        }

        if let Some(stmt_list) =
            unit.find_attribute(self.sections, root, AttributeName::DW_AT_stmt_list)?
        {
            match self.sections.line {
                Some(section) => line::parse_line_numbers(
                    self.module,
                    section,
                    unit.word_size,
                    comp_dir.as_deref(),
                    stmt_list.unsigned() as usize,
                )?,
                None => debug!("unit requests line numbers but the line section is stripped"),
            }
        }
        Ok(())
    }

    /// Builds the symbol for one entry, dispatching on its tag. Entries
    /// with tags we don't handle are logged and left unresolved; their
    /// siblings still load.
    fn load_entry(
        &mut self,
        unit: &mut Unit,
        die: EntryId,
        compiland: Option<SymbolId>,
    ) -> Result<()> {
        match unit.tag_of(die) {
            Tag::DW_TAG_typedef => {
                self.parse_typedef(unit, die)?;
            }
            Tag::DW_TAG_base_type => {
                self.parse_base_type(unit, die)?;
            }
            Tag::DW_TAG_pointer_type => {
                self.parse_pointer_type(unit, die)?;
            }
            Tag::DW_TAG_class_type => {
                self.parse_udt(unit, die, UdtKind::Class)?;
            }
            Tag::DW_TAG_structure_type => {
                self.parse_udt(unit, die, UdtKind::Struct)?;
            }
            Tag::DW_TAG_union_type => {
                self.parse_udt(unit, die, UdtKind::Union)?;
            }
            Tag::DW_TAG_array_type => {
                self.parse_array_type(unit, die)?;
            }
            Tag::DW_TAG_const_type | Tag::DW_TAG_volatile_type => {
                self.parse_qualifier(unit, die)?;
            }
            Tag::DW_TAG_reference_type => {
                self.parse_reference_type(unit, die)?;
            }
            Tag::DW_TAG_enumeration_type => {
                self.parse_enumeration(unit, die)?;
            }
            Tag::DW_TAG_subprogram => {
                self.parse_subprogram(unit, die, compiland)?;
            }
            Tag::DW_TAG_subroutine_type => {
                self.parse_subroutine_type(unit, die)?;
            }
            Tag::DW_TAG_variable => {
                let ctx = SubprogramContext {
                    compiland,
                    func: None,
                    frame_register: 0,
                    frame_offset: 0,
                };
                self.parse_variable(unit, &ctx, None, die)?;
            }
            tag => warn!("unhandled tag {tag:?} at {:#x}", unit.entry(die).offset),
        }
        Ok(())
    }

    /// The entry's DW_AT_name, or a synthesized `<prefix>_<n>` when the
    /// producer left it unnamed.
    fn find_name(&mut self, unit: &Unit, die: EntryId, prefix: &str) -> Result<String> {
        if let Some(attr) = unit.find_attribute(self.sections, die, AttributeName::DW_AT_name)? {
            if let Some(name) = attr.string() {
                return Ok(name.to_string());
            }
        }
        let index = self.synthetic;
        self.synthetic += 1;
        Ok(format!("{prefix}_{index}"))
    }

    fn attr_unsigned(
        &self,
        unit: &Unit,
        die: EntryId,
        at: AttributeName,
        default: u64,
    ) -> Result<u64> {
        Ok(unit
            .find_attribute(self.sections, die, at)?
            .map(|a| a.unsigned())
            .unwrap_or(default))
    }

    fn attr_flag(&self, unit: &Unit, die: EntryId, at: AttributeName) -> Result<bool> {
        Ok(self.attr_unsigned(unit, die, at, 0)? != 0)
    }

    /// Follows DW_AT_type to the referenced entry and forces its build
    /// if it hasn't resolved yet. `None` is the void type.
    fn lookup_type(&mut self, unit: &mut Unit, die: EntryId) -> Result<Option<SymbolId>> {
        let Some(attr) = unit.find_attribute(self.sections, die, AttributeName::DW_AT_type)?
        else {
            return Ok(None);
        };
        let AttrValue::Reference(offset) = attr else {
            warn!("type attribute is not a reference");
            return Ok(None);
        };
        let Some(target) = unit.find_offset(offset as usize) else {
            warn!("unable to find back reference to the type at {offset:#x}");
            return Ok(None);
        };
        if unit.entry(target).symt.is_none() {
            self.load_entry(unit, target, None)?;
        }
        Ok(unit.entry(target).symt)
    }

    /// Resolves a location-class attribute. Constant forms short-circuit
    /// to a plain address; block forms run the expression evaluator.
    fn compute_location(
        &self,
        unit: &Unit,
        die: EntryId,
        at: AttributeName,
    ) -> Result<Option<Location>> {
        let Some(attr) = unit.find_attribute(self.sections, die, at)? else {
            return Ok(None);
        };
        match attr {
            AttrValue::Block(block) => location::evaluate(block, unit.word_size).map(Some),
            AttrValue::Unsigned(v) | AttrValue::Address(v) => Ok(Some(Location::Address(v))),
            AttrValue::Signed(v) => Ok(Some(Location::Address(v as u64))),
            other => {
                warn!("unexpected location encoding {other:?}");
                Ok(None)
            }
        }
    }

    fn map_register(&self, dwarf_register: u16) -> u16 {
        self.registers.map(dwarf_register).unwrap_or_else(|| {
            warn!("no target mapping for DWARF register {dwarf_register}");
            0
        })
    }

    fn parse_base_type(&mut self, unit: &mut Unit, die: EntryId) -> Result<Option<SymbolId>> {
        if let Some(existing) = unit.entry(die).symt {
            return Ok(Some(existing));
        }
        let name = self.find_name(unit, die, "base_type")?;
        let size = self.attr_unsigned(unit, die, AttributeName::DW_AT_byte_size, 0)?;
        let encoding =
            self.attr_unsigned(unit, die, AttributeName::DW_AT_encoding, ate::DW_ATE_void)?;
        let kind = match encoding {
            ate::DW_ATE_void => BasicKind::Void,
            ate::DW_ATE_address => BasicKind::ULong,
            ate::DW_ATE_boolean => BasicKind::Bool,
            ate::DW_ATE_complex_float => BasicKind::Complex,
            ate::DW_ATE_float => BasicKind::Float,
            ate::DW_ATE_signed => BasicKind::Int,
            ate::DW_ATE_unsigned => BasicKind::UInt,
            ate::DW_ATE_signed_char | ate::DW_ATE_unsigned_char => BasicKind::Char,
            _ => BasicKind::NoType,
        };
        trace!(name = %name, size, encoding, "base type");
        let id = self.module.new_basic(kind, &name, size);
        unit.entry_mut(die).symt = Some(id);
        if unit.abbrev_of(die).has_children {
            warn!("unexpected children under a base type");
        }
        Ok(Some(id))
    }

    fn parse_typedef(&mut self, unit: &mut Unit, die: EntryId) -> Result<Option<SymbolId>> {
        if let Some(existing) = unit.entry(die).symt {
            return Ok(Some(existing));
        }
        let name = self.find_name(unit, die, "typedef")?;
        let of = self.lookup_type(unit, die)?;
        let id = self.module.new_typedef(&name, of);
        unit.entry_mut(die).symt = Some(id);
        if unit.abbrev_of(die).has_children {
            warn!("unexpected children under a typedef");
        }
        Ok(Some(id))
    }

    fn parse_pointer_type(&mut self, unit: &mut Unit, die: EntryId) -> Result<Option<SymbolId>> {
        if let Some(existing) = unit.entry(die).symt {
            return Ok(Some(existing));
        }
        let points_to = self.lookup_type(unit, die)?;
        let id = self.module.new_pointer(points_to);
        unit.entry_mut(die).symt = Some(id);
        if unit.abbrev_of(die).has_children {
            warn!("unexpected children under a pointer type");
        }
        Ok(Some(id))
    }

    /// C++ references collapse to plain pointers; the database has no
    /// separate shape for them.
    fn parse_reference_type(&mut self, unit: &mut Unit, die: EntryId) -> Result<Option<SymbolId>> {
        if let Some(existing) = unit.entry(die).symt {
            return Ok(Some(existing));
        }
        let points_to = self.lookup_type(unit, die)?;
        let id = self.module.new_pointer(points_to);
        unit.entry_mut(die).symt = Some(id);
        if unit.abbrev_of(die).has_children {
            warn!("unexpected children under a reference type");
        }
        Ok(Some(id))
    }

    /// const and volatile qualifiers are not represented; the entry
    /// resolves straight to the type it qualifies.
    fn parse_qualifier(&mut self, unit: &mut Unit, die: EntryId) -> Result<Option<SymbolId>> {
        if let Some(existing) = unit.entry(die).symt {
            return Ok(Some(existing));
        }
        let inner = self.lookup_type(unit, die)?;
        unit.entry_mut(die).symt = inner;
        if unit.abbrev_of(die).has_children {
            warn!("unexpected children under a type qualifier");
        }
        Ok(inner)
    }

    fn parse_array_type(&mut self, unit: &mut Unit, die: EntryId) -> Result<Option<SymbolId>> {
        if let Some(existing) = unit.entry(die).symt {
            return Ok(Some(existing));
        }
        if !unit.abbrev_of(die).has_children {
            warn!("array type without subrange information");
            return Ok(None);
        }
        let element = self.lookup_type(unit, die)?;

        let mut index = None;
        let mut start = 0u64;
        let mut end = 0u64;
        for i in 0..unit.entry(die).children.len() {
            let child = unit.entry(die).children[i];
            match unit.tag_of(child) {
                Tag::DW_TAG_subrange_type => {
                    index = self.lookup_type(unit, child)?;
                    start = self.attr_unsigned(unit, child, AttributeName::DW_AT_lower_bound, 0)?;
                    end = self.attr_unsigned(unit, child, AttributeName::DW_AT_upper_bound, 0)?;
                    if let Some(count) =
                        unit.find_attribute(self.sections, child, AttributeName::DW_AT_count)?
                    {
                        end = start + count.unsigned();
                    }
                }
                tag => warn!("unhandled tag {tag:?} under an array type"),
            }
        }
        let id = self.module.new_array(start, end, element, index);
        unit.entry_mut(die).symt = Some(id);
        Ok(Some(id))
    }

    fn parse_enumeration(&mut self, unit: &mut Unit, die: EntryId) -> Result<Option<SymbolId>> {
        if let Some(existing) = unit.entry(die).symt {
            return Ok(Some(existing));
        }
        let name = self.find_name(unit, die, "enum")?;
        let id = self.module.new_enum(&name);
        unit.entry_mut(die).symt = Some(id);

        for i in 0..unit.entry(die).children.len() {
            let child = unit.entry(die).children[i];
            match unit.tag_of(child) {
                Tag::DW_TAG_enumerator => {
                    let element = self.find_name(unit, child, "enum_value")?;
                    let value = unit
                        .find_attribute(self.sections, child, AttributeName::DW_AT_const_value)?
                        .map(|a| a.signed())
                        .unwrap_or(0);
                    self.module.add_enum_element(id, &element, value);
                }
                tag => warn!("unhandled tag {tag:?} under an enumeration"),
            }
        }
        Ok(Some(id))
    }

    fn parse_udt(
        &mut self,
        unit: &mut Unit,
        die: EntryId,
        kind: UdtKind,
    ) -> Result<Option<SymbolId>> {
        if let Some(existing) = unit.entry(die).symt {
            return Ok(Some(existing));
        }
        let name = self.find_name(unit, die, "udt")?;
        let size = self.attr_unsigned(unit, die, AttributeName::DW_AT_byte_size, 0)?;
        trace!(name = %name, size, ?kind, "udt");
        let id = self.module.new_udt(kind, &name, size);
        // members may point back at the aggregate; publish the symbol
        // before loading them
        unit.entry_mut(die).symt = Some(id);

        for i in 0..unit.entry(die).children.len() {
            let child = unit.entry(die).children[i];
            match unit.tag_of(child) {
                Tag::DW_TAG_member => self.parse_udt_member(unit, child, id)?,
                Tag::DW_TAG_enumeration_type => {
                    self.parse_enumeration(unit, child)?;
                }
                // nested aggregate bodies are not loaded here; a use
                // elsewhere resolves them through the offset table
                Tag::DW_TAG_structure_type
                | Tag::DW_TAG_class_type
                | Tag::DW_TAG_union_type => {}
                tag => warn!("unhandled tag {tag:?} under a udt"),
            }
        }
        Ok(Some(id))
    }

    fn parse_udt_member(&mut self, unit: &mut Unit, die: EntryId, parent: SymbolId) -> Result<()> {
        let name = self.find_name(unit, die, "udt_member")?;
        let ty = self.lookup_type(unit, die)?;

        let byte_offset = match self.compute_location(
            unit,
            die,
            AttributeName::DW_AT_data_member_location,
        )? {
            Some(Location::Address(offset)) => offset,
            Some(other) => {
                warn!("member location of {name} is not a plain offset: {other:?}");
                0
            }
            None => 0,
        };

        let bit_size = self.attr_unsigned(unit, die, AttributeName::DW_AT_bit_size, 0)?;
        let bit_offset = match unit
            .find_attribute(self.sections, die, AttributeName::DW_AT_bit_offset)?
        {
            Some(raw) => {
                // the producer numbers bit fields MSB-first within their
                // container; flip to LSB-first numbering
                let container = match unit
                    .find_attribute(self.sections, die, AttributeName::DW_AT_byte_size)?
                {
                    Some(n) => n.unsigned(),
                    None => ty.and_then(|t| self.module.type_length(t)).unwrap_or(0),
                };
                container
                    .wrapping_mul(8)
                    .wrapping_sub(raw.unsigned())
                    .wrapping_sub(bit_size)
            }
            None => 0,
        };

        self.module.add_udt_element(
            parent,
            &name,
            ty,
            (byte_offset << 3).wrapping_add(bit_offset),
            bit_size,
        );
        if unit.abbrev_of(die).has_children {
            warn!("unexpected children under a member");
        }
        Ok(())
    }

    fn parse_subroutine_type(&mut self, unit: &mut Unit, die: EntryId) -> Result<Option<SymbolId>> {
        if let Some(existing) = unit.entry(die).symt {
            return Ok(Some(existing));
        }
        let returns = self.lookup_type(unit, die)?;
        let id = self.module.new_function_signature(returns);
        unit.entry_mut(die).symt = Some(id);

        for i in 0..unit.entry(die).children.len() {
            let child = unit.entry(die).children[i];
            match unit.tag_of(child) {
                Tag::DW_TAG_formal_parameter => {
                    let ty = self.lookup_type(unit, child)?;
                    self.module.add_signature_parameter(id, ty);
                }
                Tag::DW_TAG_unspecified_parameters => {
                    warn!("unspecified parameters are not supported");
                }
                _ => {}
            }
        }
        Ok(Some(id))
    }

    fn parse_subprogram(
        &mut self,
        unit: &mut Unit,
        die: EntryId,
        compiland: Option<SymbolId>,
    ) -> Result<Option<SymbolId>> {
        if let Some(existing) = unit.entry(die).symt {
            return Ok(Some(existing));
        }
        let base = self.module.base;
        let low_pc = self.attr_unsigned(unit, die, AttributeName::DW_AT_low_pc, 0)?;
        let high_pc = self.attr_unsigned(unit, die, AttributeName::DW_AT_high_pc, 0)?;
        // thunks get their symbols from the object's symbol table, not
        // from debug info
        if find_thunk(base + low_pc, self.thunks).is_some() {
            return Ok(None);
        }
        let declaration = self.attr_flag(unit, die, AttributeName::DW_AT_declaration)?;
        let inline = self.attr_flag(unit, die, AttributeName::DW_AT_inline)?;
        let name = self.find_name(unit, die, "subprogram")?;
        trace!(name = %name, low_pc, high_pc, declaration, inline, "subprogram");
        let returns = self.lookup_type(unit, die)?;
        let signature = self.module.new_function_signature(returns);

        let func = if !declaration {
            let f = self.module.new_function(
                compiland,
                &name,
                base + low_pc,
                high_pc.saturating_sub(low_pc),
                signature,
            );
            unit.entry_mut(die).symt = Some(f);
            Some(f)
        } else {
            None
        };

        let (frame_register, frame_offset) =
            match self.compute_location(unit, die, AttributeName::DW_AT_frame_base)? {
                Some(Location::Register { register, offset, .. }) => (register, offset),
                Some(Location::FrameRelative { .. }) => {
                    warn!("frame base of {name} is itself frame-relative");
                    (0, 0)
                }
                // a bare constant here is a location-list offset, which
                // we do not follow: leave the frame unknown
                Some(Location::Address(_)) | None => (0, 0),
            };
        let ctx = SubprogramContext {
            compiland,
            func,
            frame_register,
            frame_offset,
        };

        for i in 0..unit.entry(die).children.len() {
            let child = unit.entry(die).children[i];
            match unit.tag_of(child) {
                Tag::DW_TAG_variable | Tag::DW_TAG_formal_parameter => {
                    self.parse_variable(unit, &ctx, None, child)?;
                }
                Tag::DW_TAG_lexical_block => {
                    self.parse_block(unit, &ctx, None, child)?;
                }
                Tag::DW_TAG_inlined_subroutine => {
                    self.parse_inlined(unit, &ctx, child)?;
                }
                Tag::DW_TAG_label => {
                    self.parse_label(unit, &ctx, child)?;
                }
                // nested definitions load lazily when referenced
                Tag::DW_TAG_subprogram
                | Tag::DW_TAG_class_type
                | Tag::DW_TAG_structure_type
                | Tag::DW_TAG_union_type
                | Tag::DW_TAG_enumeration_type
                | Tag::DW_TAG_typedef => {}
                Tag::DW_TAG_unspecified_parameters => {
                    warn!("unspecified parameters are not supported");
                }
                tag => warn!("unhandled tag {tag:?} under subprogram {name}"),
            }
        }

        if let Some(f) = func {
            self.module.normalize_function(f);
        }
        Ok(unit.entry(die).symt)
    }

    fn parse_block(
        &mut self,
        unit: &mut Unit,
        ctx: &SubprogramContext,
        parent: Option<BlockId>,
        die: EntryId,
    ) -> Result<()> {
        let Some(func) = ctx.func else {
            debug!("lexical block outside a function body");
            return Ok(());
        };
        let base = self.module.base;
        let low_pc = self.attr_unsigned(unit, die, AttributeName::DW_AT_low_pc, 0)?;
        let high_pc = self.attr_unsigned(unit, die, AttributeName::DW_AT_high_pc, 0)?;
        let block = self.module.open_func_block(
            func,
            parent,
            base + low_pc,
            high_pc.saturating_sub(low_pc),
        );

        for i in 0..unit.entry(die).children.len() {
            let child = unit.entry(die).children[i];
            match unit.tag_of(child) {
                Tag::DW_TAG_inlined_subroutine => {
                    self.parse_inlined(unit, ctx, child)?;
                }
                Tag::DW_TAG_variable => {
                    self.parse_variable(unit, ctx, block, child)?;
                }
                Tag::DW_TAG_lexical_block => {
                    self.parse_block(unit, ctx, block, child)?;
                }
                // nested declarations, and the parameter entries some
                // producers emit for exception handling
                Tag::DW_TAG_subprogram | Tag::DW_TAG_formal_parameter => {}
                Tag::DW_TAG_class_type
                | Tag::DW_TAG_structure_type
                | Tag::DW_TAG_union_type
                | Tag::DW_TAG_enumeration_type => {}
                tag => warn!("unhandled tag {tag:?} under a lexical block"),
            }
        }

        if let Some(b) = block {
            self.module.close_func_block(func, b, 0);
        }
        Ok(())
    }

    /// Inline bodies are not materialized yet; only labels inside them
    /// reach the enclosing function.
    fn parse_inlined(
        &mut self,
        unit: &mut Unit,
        ctx: &SubprogramContext,
        die: EntryId,
    ) -> Result<()> {
        for i in 0..unit.entry(die).children.len() {
            let child = unit.entry(die).children[i];
            match unit.tag_of(child) {
                Tag::DW_TAG_formal_parameter
                | Tag::DW_TAG_variable
                | Tag::DW_TAG_lexical_block => {}
                Tag::DW_TAG_inlined_subroutine => {
                    self.parse_inlined(unit, ctx, child)?;
                }
                Tag::DW_TAG_label => {
                    self.parse_label(unit, ctx, child)?;
                }
                tag => warn!("unhandled tag {tag:?} under an inlined subroutine"),
            }
        }
        Ok(())
    }

    fn parse_label(
        &mut self,
        unit: &mut Unit,
        ctx: &SubprogramContext,
        die: EntryId,
    ) -> Result<()> {
        let low_pc = self.attr_unsigned(unit, die, AttributeName::DW_AT_low_pc, 0)?;
        let name = self.find_name(unit, die, "label")?;
        let Some(func) = ctx.func else {
            debug!("label {name} outside a function body");
            return Ok(());
        };
        let base = self.module.base;
        self.module
            .add_func_point(func, PointKind::Label, base + low_pc, &name);
        Ok(())
    }

    /// Parses any variable: formal parameter, local, or global. The
    /// location result picks which of the three it becomes.
    fn parse_variable(
        &mut self,
        unit: &mut Unit,
        ctx: &SubprogramContext,
        block: Option<BlockId>,
        die: EntryId,
    ) -> Result<()> {
        let is_param = unit.tag_of(die) == Tag::DW_TAG_formal_parameter;
        let ty = self.lookup_type(unit, die)?;
        let name = self.find_name(unit, die, "parameter")?;
        let kind = if is_param {
            DataKind::Param
        } else {
            DataKind::Local
        };

        if let Some(loc) = self.compute_location(unit, die, AttributeName::DW_AT_location)? {
            trace!(name = %name, ?loc, "variable");
            match loc {
                Location::Address(offset) => {
                    // no register involved: a variable at a fixed address
                    let external = self.attr_flag(unit, die, AttributeName::DW_AT_external)?;
                    let linkage = if external {
                        Linkage::Global
                    } else {
                        Linkage::Local
                    };
                    let base = self.module.base;
                    self.module.new_global_variable(
                        ctx.compiland,
                        &name,
                        linkage,
                        base.wrapping_add(offset),
                        ty,
                    );
                }
                Location::FrameRelative { offset } => match ctx.func {
                    Some(func) => {
                        let register = self.map_register(ctx.frame_register);
                        self.module.add_func_local(
                            func,
                            kind,
                            register,
                            true,
                            offset + ctx.frame_offset,
                            block,
                            ty,
                            &name,
                        );
                    }
                    None => warn!("frame-relative variable {name} outside a function"),
                },
                Location::Register {
                    register,
                    deref,
                    offset,
                } => match ctx.func {
                    Some(func) => {
                        let register = self.map_register(register);
                        self.module
                            .add_func_local(func, kind, register, deref, offset, block, ty, &name);
                    }
                    None => warn!("register variable {name} outside a function"),
                },
            }
        }

        if unit
            .find_attribute(self.sections, die, AttributeName::DW_AT_const_value)?
            .is_some()
        {
            warn!("constant value for {name} is not implemented");
        }

        if is_param {
            if let Some(func) = ctx.func {
                let signature = match self.module.symbol(func) {
                    Symbol::Function(f) => Some(f.signature),
                    _ => None,
                };
                if let Some(signature) = signature {
                    self.module.add_signature_parameter(signature, ty);
                }
            }
        }

        if unit.abbrev_of(die).has_children {
            warn!("unexpected children under a variable");
        }
        Ok(())
    }
}
