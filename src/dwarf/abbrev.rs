//! Loader for the abbreviation area referenced by a compilation unit.
//! Every entry in the unit's tree names one of these records by entry
//! code; the record tells us the entry's tag, whether children follow,
//! and which attributes (in which forms) its payload carries.

use std::collections::HashMap;

use tracing::trace;

use crate::dwarf::{AttributeName, FormEncoding, Stream, Tag};
use crate::errors::Result;

pub struct AbbrevAttribute {
    pub name: AttributeName,
    pub form: FormEncoding,
}

pub struct Abbreviation {
    /// Entry code, unique within one abbreviation set.
    pub code: u64,

    /// DW_TAG_compile_unit, DW_TAG_typedef, DW_TAG_base_type, etc
    pub tag: Tag,
    pub has_children: bool,

    /// Order matters: the entry payload carries its attribute values in
    /// exactly this order.
    pub attrs: Vec<AbbrevAttribute>,
}

pub struct AbbrevTable {
    entries: Vec<Abbreviation>,
    index: HashMap<u64, usize>,
}

impl AbbrevTable {
    /// Reads abbreviation records until a zero entry code or the end of
    /// the section. Each record is `code, tag, has_children` followed by
    /// `(attribute, form)` pairs closed by a `(0, 0)` sentinel.
    pub fn parse(stream: &mut Stream) -> Result<Self> {
        let mut entries = Vec::new();
        let mut index = HashMap::new();

        while !stream.is_empty() {
            let code = stream.read_uleb128()?;
            if code == 0 {
                break;
            }

            let tag = Tag::from_u64(stream.read_uleb128()?)?;
            let has_children = stream.read_u8()? != 0;

            let mut attrs = Vec::new();
            loop {
                let attribute = stream.read_uleb128()?;
                let form = stream.read_uleb128()?;
                if attribute == 0 {
                    break;
                }
                attrs.push(AbbrevAttribute {
                    name: AttributeName::from_u64(attribute)?,
                    form: FormEncoding::from_u64(form)?,
                });
            }

            trace!(code, ?tag, has_children, attrs = attrs.len(), "abbrev entry");
            index.insert(code, entries.len());
            entries.push(Abbreviation {
                code,
                tag,
                has_children,
                attrs,
            });
        }

        Ok(AbbrevTable { entries, index })
    }

    pub fn find_index(&self, code: u64) -> Option<usize> {
        self.index.get(&code).copied()
    }

    pub fn entry(&self, idx: usize) -> &Abbreviation {
        &self.entries[idx]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    // entry 1: compile_unit, has children, name:string; entry 2:
    // base_type, no children, byte_size:data1 + encoding:data1
    const SET: &[u8] = &[
        0x01, 0x11, 0x01, 0x03, 0x08, 0x00, 0x00, //
        0x02, 0x24, 0x00, 0x0b, 0x0b, 0x3e, 0x0b, 0x00, 0x00, //
        0x00,
    ];

    #[test]
    fn test_parse_set() {
        let mut s = Stream::new(SET, 4);
        let table = AbbrevTable::parse(&mut s).unwrap();
        assert_eq!(table.len(), 2);

        let cu = table.entry(table.find_index(1).unwrap());
        assert_eq!(cu.tag, Tag::DW_TAG_compile_unit);
        assert!(cu.has_children);
        assert_eq!(cu.attrs.len(), 1);
        assert_eq!(cu.attrs[0].name, AttributeName::DW_AT_name);
        assert_eq!(cu.attrs[0].form, FormEncoding::DW_FORM_string);

        let bt = table.entry(table.find_index(2).unwrap());
        assert_eq!(bt.tag, Tag::DW_TAG_base_type);
        assert!(!bt.has_children);
        assert_eq!(bt.attrs[0].name, AttributeName::DW_AT_byte_size);
        assert_eq!(bt.attrs[1].name, AttributeName::DW_AT_encoding);

        assert_eq!(table.find_index(3), None);
    }

    #[test]
    fn test_parse_is_idempotent() {
        let first = AbbrevTable::parse(&mut Stream::new(SET, 4)).unwrap();
        let second = AbbrevTable::parse(&mut Stream::new(SET, 4)).unwrap();
        assert_eq!(first.len(), second.len());
        for code in [1u64, 2] {
            let a = first.entry(first.find_index(code).unwrap());
            let b = second.entry(second.find_index(code).unwrap());
            assert_eq!(a.tag, b.tag);
            assert_eq!(a.has_children, b.has_children);
            assert_eq!(a.attrs.len(), b.attrs.len());
            for (x, y) in a.attrs.iter().zip(&b.attrs) {
                assert_eq!(x.name, y.name);
                assert_eq!(x.form, y.form);
            }
        }
    }

    #[test]
    fn test_unknown_tag_fails() {
        let bytes = &[0x01, 0xff, 0x07, 0x00, 0x00, 0x00, 0x00];
        let mut s = Stream::new(bytes, 4);
        assert!(AbbrevTable::parse(&mut s).is_err());
    }

    #[test]
    fn test_empty_section() {
        let table = AbbrevTable::parse(&mut Stream::new(&[], 4)).unwrap();
        assert!(table.is_empty());
    }
}
