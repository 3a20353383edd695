//! The per-unit tree of debug info entries. Entries are decoded lazily:
//! the builder only records where each attribute value starts and skips
//! over it, so walking the tree is cheap and values are read on demand
//! when the semantic loader asks for them.

use std::borrow::Cow;
use std::collections::HashMap;

use tracing::{trace, warn};

use crate::dwarf::abbrev::{AbbrevTable, Abbreviation};
use crate::dwarf::{AttributeName, DwarfSections, FormEncoding, Stream, Tag};
use crate::errors::{DwarfError, Result};
use crate::symbols::SymbolId;

/// Compilation-unit header at the front of each unit in the debug
/// section.
pub struct UnitHeader {
    /// Bytes in the unit, not counting this field.
    pub unit_length: u32,
    pub version: u16,
    /// Offset of the unit's abbreviation set in the abbreviation section.
    pub abbrev_offset: u32,
    pub address_size: u8,
}

impl UnitHeader {
    pub fn read(stream: &mut Stream) -> Result<Self> {
        Ok(UnitHeader {
            unit_length: stream.read_u32()?,
            version: stream.read_u16()?,
            abbrev_offset: stream.read_u32()?,
            address_size: stream.read_u8()?,
        })
    }
}

/// Index into a unit's entry arena.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct EntryId(pub u32);

/// One debug info entry. `data[i]` is the section offset at which the
/// i-th attribute's value starts; the value's form lives in the
/// abbreviation.
pub struct DebugEntry {
    /// Offset of the entry in the debug section, the key other entries
    /// use to reference it.
    pub offset: usize,
    /// Index of the entry's abbreviation in the unit's table.
    pub abbrev: usize,
    pub data: Vec<usize>,
    pub children: Vec<EntryId>,
    /// The symbol this entry resolved into, once built. Doubles as the
    /// memo that breaks cycles between cross-referencing entries.
    pub symt: Option<SymbolId>,
}

/// A decoded attribute value, tagged by the shape its form implies.
#[derive(Clone, Debug)]
pub enum AttrValue<'a> {
    Address(u64),
    Unsigned(u64),
    Signed(i64),
    String(Cow<'a, str>),
    Block(&'a [u8]),
    /// Offset of another entry in the debug section.
    Reference(u64),
}

impl<'a> AttrValue<'a> {
    /// The value as an unsigned integer, the way flag/size/pc attributes
    /// are consumed. Strings and blocks read as zero.
    pub fn unsigned(&self) -> u64 {
        match self {
            AttrValue::Address(v) | AttrValue::Unsigned(v) | AttrValue::Reference(v) => *v,
            AttrValue::Signed(v) => *v as u64,
            AttrValue::String(_) | AttrValue::Block(_) => 0,
        }
    }

    pub fn signed(&self) -> i64 {
        match self {
            AttrValue::Address(v) | AttrValue::Unsigned(v) | AttrValue::Reference(v) => *v as i64,
            AttrValue::Signed(v) => *v,
            AttrValue::String(_) | AttrValue::Block(_) => 0,
        }
    }

    pub fn string(&self) -> Option<&str> {
        match self {
            AttrValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn block(&self) -> Option<&'a [u8]> {
        match self {
            AttrValue::Block(b) => Some(b),
            _ => None,
        }
    }
}

/// One compilation unit's tree: an arena of entries plus the offset map
/// that resolves cross-references.
pub struct Unit {
    pub word_size: u8,
    /// Offset of the unit header in the debug section; unit-relative
    /// reference forms are rebased against it.
    pub ref_base: usize,
    /// Offset one past the unit's last byte.
    pub end: usize,
    pub abbrevs: AbbrevTable,
    entries: Vec<DebugEntry>,
    by_offset: HashMap<usize, EntryId>,
}

impl Unit {
    pub fn new(word_size: u8, ref_base: usize, end: usize, abbrevs: AbbrevTable) -> Self {
        Unit {
            word_size,
            ref_base,
            end,
            abbrevs,
            entries: Vec::new(),
            by_offset: HashMap::new(),
        }
    }

    pub fn entry(&self, id: EntryId) -> &DebugEntry {
        &self.entries[id.0 as usize]
    }

    pub fn entry_mut(&mut self, id: EntryId) -> &mut DebugEntry {
        &mut self.entries[id.0 as usize]
    }

    pub fn abbrev_of(&self, id: EntryId) -> &Abbreviation {
        self.abbrevs.entry(self.entry(id).abbrev)
    }

    pub fn tag_of(&self, id: EntryId) -> Tag {
        self.abbrev_of(id).tag
    }

    /// Resolves a debug-section offset back to the entry recorded there.
    pub fn find_offset(&self, offset: usize) -> Option<EntryId> {
        self.by_offset.get(&offset).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reads one entry and, recursively, its children. Returns `None`
    /// for the zero entry code that terminates a sibling list.
    pub fn read_entry(
        &mut self,
        stream: &mut Stream<'_>,
        sections: DwarfSections<'_>,
    ) -> Result<Option<EntryId>> {
        let offset = stream.pos();
        let code = stream.read_uleb128()?;
        trace!(code, offset, "entry");
        if code == 0 {
            return Ok(None);
        }

        let abbrev = self
            .abbrevs
            .find_index(code)
            .ok_or(DwarfError::MissingAbbreviation { code, offset })?;
        let (num_attrs, has_children) = {
            let a = self.abbrevs.entry(abbrev);
            (a.attrs.len(), a.has_children)
        };

        let mut data = Vec::with_capacity(num_attrs);
        for i in 0..num_attrs {
            data.push(stream.pos());
            let form = self.abbrevs.entry(abbrev).attrs[i].form;
            stream.skip_form(form)?;
        }

        let id = EntryId(self.entries.len() as u32);
        self.entries.push(DebugEntry {
            offset,
            abbrev,
            data,
            children: Vec::new(),
            symt: None,
        });
        self.by_offset.insert(offset, id);

        if has_children {
            while stream.pos() < self.end {
                match self.read_entry(stream, sections)? {
                    Some(child) => self.entry_mut(id).children.push(child),
                    None => break,
                }
            }
        }

        // DW_AT_sibling is a resync hint; honor it when the cursor is not
        // already at the indicated entry.
        if let Some(AttrValue::Reference(sibling)) =
            self.find_attribute(sections, id, AttributeName::DW_AT_sibling)?
        {
            if stream.pos() != sibling as usize {
                trace!(from = stream.pos(), to = sibling, "sibling resync");
                stream.set_pos(sibling as usize);
            }
        }

        Ok(Some(id))
    }

    /// Walks the entry's abbreviation in lockstep with the recorded value
    /// offsets and decodes the requested attribute, if present.
    pub fn find_attribute<'a>(
        &self,
        sections: DwarfSections<'a>,
        id: EntryId,
        at: AttributeName,
    ) -> Result<Option<AttrValue<'a>>> {
        let entry = self.entry(id);
        let abbrev = self.abbrevs.entry(entry.abbrev);
        for (i, attr) in abbrev.attrs.iter().enumerate() {
            if attr.name == at {
                return self
                    .read_value(sections, entry.data[i], attr.form)
                    .map(Some);
            }
        }
        Ok(None)
    }

    fn read_value<'a>(
        &self,
        sections: DwarfSections<'a>,
        offset: usize,
        form: FormEncoding,
    ) -> Result<AttrValue<'a>> {
        use FormEncoding::*;
        let mut s = Stream::at(sections.debug, offset, self.word_size);
        let value = match form {
            DW_FORM_addr => AttrValue::Address(s.read_address()?),
            // ref_addr is already relative to the start of the section
            DW_FORM_ref_addr => AttrValue::Reference(s.read_address()?),
            DW_FORM_flag | DW_FORM_data1 => AttrValue::Unsigned(s.read_u8()? as u64),
            DW_FORM_data2 => AttrValue::Unsigned(s.read_u16()? as u64),
            DW_FORM_data4 => AttrValue::Unsigned(s.read_u32()? as u64),
            DW_FORM_data8 | DW_FORM_ref8 => {
                warn!("64-bit attribute values are not handled");
                AttrValue::Unsigned(0)
            }
            DW_FORM_ref1 => AttrValue::Reference(self.ref_base as u64 + s.read_u8()? as u64),
            DW_FORM_ref2 => AttrValue::Reference(self.ref_base as u64 + s.read_u16()? as u64),
            DW_FORM_ref4 => AttrValue::Reference(self.ref_base as u64 + s.read_u32()? as u64),
            DW_FORM_ref_udata => AttrValue::Reference(self.ref_base as u64 + s.read_uleb128()?),
            DW_FORM_sdata => AttrValue::Signed(s.read_sleb128()?),
            DW_FORM_udata => AttrValue::Unsigned(s.read_uleb128()?),
            DW_FORM_string => AttrValue::String(s.read_string()?),
            DW_FORM_strp => {
                let str_offset = s.read_u32()? as usize;
                let mut strs = Stream::at(sections.string, str_offset, self.word_size);
                AttrValue::String(strs.read_string()?)
            }
            DW_FORM_block => {
                let n = s.read_uleb128()? as usize;
                AttrValue::Block(s.block(n)?)
            }
            DW_FORM_block1 => {
                let n = s.read_u8()? as usize;
                AttrValue::Block(s.block(n)?)
            }
            DW_FORM_block2 => {
                let n = s.read_u16()? as usize;
                AttrValue::Block(s.block(n)?)
            }
            DW_FORM_block4 => {
                let n = s.read_u32()? as usize;
                AttrValue::Block(s.block(n)?)
            }
            DW_FORM_indirect => return Err(DwarfError::UnhandledForm(form)),
        };
        Ok(value)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sections<'a>(debug: &'a [u8], string: &'a [u8]) -> DwarfSections<'a> {
        DwarfSections {
            debug,
            abbrev: &[],
            string,
            line: None,
        }
    }

    // compile_unit with children carrying a string name; base_type with
    // byte_size and encoding; pointer_type with a ref4 type
    const ABBREVS: &[u8] = &[
        0x01, 0x11, 0x01, 0x03, 0x08, 0x00, 0x00, //
        0x02, 0x24, 0x00, 0x0b, 0x0b, 0x3e, 0x0b, 0x00, 0x00, //
        0x03, 0x0f, 0x00, 0x49, 0x13, 0x00, 0x00, //
        0x00,
    ];

    fn build_unit(debug: &[u8]) -> (Unit, Option<EntryId>) {
        let table = AbbrevTable::parse(&mut Stream::new(ABBREVS, 4)).unwrap();
        let mut unit = Unit::new(4, 0, debug.len(), table);
        let mut s = Stream::new(debug, 4);
        let root = unit
            .read_entry(&mut s, sections(debug, &[]))
            .expect("read failed");
        (unit, root)
    }

    #[test]
    fn test_tree_and_offset_addressability() {
        // root "u.c" with a base_type child and a pointer child that
        // references it, then the end-of-children sentinel
        let debug: &[u8] = &[
            0x01, b'u', b'.', b'c', 0x00, // 0x0: compile_unit
            0x02, 0x04, 0x05, // 0x5: base_type, size 4, signed
            0x03, 0x05, 0x00, 0x00, 0x00, // 0x8: pointer to 0x5
            0x00, // sentinel
        ];
        let (unit, root) = build_unit(debug);
        let root = root.expect("expected a root entry");
        assert_eq!(unit.tag_of(root), Tag::DW_TAG_compile_unit);
        assert_eq!(unit.entry(root).children.len(), 2);
        assert_eq!(unit.len(), 3);

        // every entry is addressable by its recorded offset
        for id in 0..unit.len() {
            let id = EntryId(id as u32);
            assert_eq!(unit.find_offset(unit.entry(id).offset), Some(id));
        }

        let ptr = unit.entry(root).children[1];
        assert_eq!(unit.tag_of(ptr), Tag::DW_TAG_pointer_type);
        let target = unit
            .find_attribute(sections(debug, &[]), ptr, AttributeName::DW_AT_type)
            .unwrap()
            .expect("pointer should carry a type");
        match target {
            AttrValue::Reference(off) => assert_eq!(off, 0x5),
            other => panic!("expected a reference, got {other:?}"),
        }
    }

    #[test]
    fn test_attribute_decoding() {
        let debug: &[u8] = &[
            0x01, b'a', 0x00, // compile_unit "a"
            0x02, 0x08, 0x07, // base_type, size 8, unsigned
            0x00,
        ];
        let (unit, root) = build_unit(debug);
        let root = root.unwrap();
        let name = unit
            .find_attribute(sections(debug, &[]), root, AttributeName::DW_AT_name)
            .unwrap()
            .unwrap();
        assert_eq!(name.string(), Some("a"));

        let bt = unit.entry(root).children[0];
        let size = unit
            .find_attribute(sections(debug, &[]), bt, AttributeName::DW_AT_byte_size)
            .unwrap()
            .unwrap();
        assert_eq!(size.unsigned(), 8);
        // absent attribute
        let missing = unit
            .find_attribute(sections(debug, &[]), bt, AttributeName::DW_AT_low_pc)
            .unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_missing_abbreviation_fails() {
        let debug: &[u8] = &[0x09];
        let table = AbbrevTable::parse(&mut Stream::new(ABBREVS, 4)).unwrap();
        let mut unit = Unit::new(4, 0, debug.len(), table);
        let mut s = Stream::new(debug, 4);
        assert!(matches!(
            unit.read_entry(&mut s, sections(debug, &[])),
            Err(DwarfError::MissingAbbreviation { code: 9, .. })
        ));
    }
}
