//! This module contains the DWARF 2 debug-information parser. The wire
//! format lives in four sections of an object file: ".debug_info" holds a
//! tree of entries per compilation unit, ".debug_abbrev" the templates
//! those entries are shaped by, ".debug_str" out-of-line strings, and
//! ".debug_line" the line-number programs. The format is documented at
//! https://dwarfstd.org/doc/dwarf-2.0.0.pdf; the readelf source code is
//! also useful for cross-checking encodings.
//!
//! Parsing runs section bytes through [`stream::Stream`], shapes entries
//! with [`abbrev::AbbrevTable`], builds the per-unit tree in
//! [`info::Unit`], and [`loader`] translates entries into symbols,
//! running [`line`] once per unit for the address→line table.

pub mod abbrev;
pub mod info;
pub mod line;
pub mod loader;
pub mod location;
pub mod stream;

pub use abbrev::{AbbrevAttribute, AbbrevTable, Abbreviation};
pub use info::{AttrValue, DebugEntry, EntryId, Unit, UnitHeader};
pub use location::Location;
pub use stream::Stream;

use crate::errors::{DwarfError, Result};
use crate::registers::RegisterMapping;
use crate::symbols::Module;
use crate::thunks::ThunkArea;

/// The debug sections extracted from one object file. Only the line
/// section is optional; producers strip it independently.
#[derive(Copy, Clone)]
pub struct DwarfSections<'a> {
    pub debug: &'a [u8],
    pub abbrev: &'a [u8],
    pub string: &'a [u8],
    pub line: Option<&'a [u8]>,
}

/// Parses every compilation unit in `sections` into `module`. Units that
/// fail to decode are logged and skipped; on return the module is
/// annotated as carrying DWARF debug information.
pub fn parse(
    module: &mut Module,
    thunks: &[ThunkArea],
    registers: &dyn RegisterMapping,
    sections: DwarfSections<'_>,
) -> Result<()> {
    loader::DwarfParser::new(module, thunks, registers, sections).run()
}

#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)] // section 7.5.4
pub enum Tag {
    //                             value
    DW_TAG_array_type,          // 0x01
    DW_TAG_class_type,          // 0x02
    DW_TAG_entry_point,         // 0x03
    DW_TAG_enumeration_type,    // 0x04
    DW_TAG_formal_parameter,    // 0x05
    DW_TAG_imported_declaration, // 0x08
    DW_TAG_label,               // 0x0a
    DW_TAG_lexical_block,       // 0x0b
    DW_TAG_member,              // 0x0d
    DW_TAG_pointer_type,        // 0x0f
    DW_TAG_reference_type,      // 0x10
    DW_TAG_compile_unit,        // 0x11
    DW_TAG_string_type,         // 0x12
    DW_TAG_structure_type,      // 0x13
    DW_TAG_subroutine_type,     // 0x15
    DW_TAG_typedef,             // 0x16
    DW_TAG_union_type,          // 0x17
    DW_TAG_unspecified_parameters, // 0x18
    DW_TAG_variant,             // 0x19
    DW_TAG_common_block,        // 0x1a
    DW_TAG_common_inclusion,    // 0x1b
    DW_TAG_inheritance,         // 0x1c
    DW_TAG_inlined_subroutine,  // 0x1d
    DW_TAG_module,              // 0x1e
    DW_TAG_ptr_to_member_type,  // 0x1f
    DW_TAG_set_type,            // 0x20
    DW_TAG_subrange_type,       // 0x21
    DW_TAG_with_stmt,           // 0x22
    DW_TAG_access_declaration,  // 0x23
    DW_TAG_base_type,           // 0x24
    DW_TAG_catch_block,         // 0x25
    DW_TAG_const_type,          // 0x26
    DW_TAG_constant,            // 0x27
    DW_TAG_enumerator,          // 0x28
    DW_TAG_file_type,           // 0x29
    DW_TAG_friend,              // 0x2a
    DW_TAG_namelist,            // 0x2b
    DW_TAG_namelist_item,       // 0x2c
    DW_TAG_packed_type,         // 0x2d
    DW_TAG_subprogram,          // 0x2e
    DW_TAG_template_type_parameter, // 0x2f
    DW_TAG_template_value_parameter, // 0x30
    DW_TAG_thrown_type,         // 0x31
    DW_TAG_try_block,           // 0x32
    DW_TAG_variant_part,        // 0x33
    DW_TAG_variable,            // 0x34
    DW_TAG_volatile_type,       // 0x35
    DW_TAG_user,                // [0x4080, 0xffff]
}

impl Tag {
    pub fn from_u64(value: u64) -> Result<Self> {
        match value {
            0x01 => Ok(Tag::DW_TAG_array_type),
            0x02 => Ok(Tag::DW_TAG_class_type),
            0x03 => Ok(Tag::DW_TAG_entry_point),
            0x04 => Ok(Tag::DW_TAG_enumeration_type),
            0x05 => Ok(Tag::DW_TAG_formal_parameter),
            0x08 => Ok(Tag::DW_TAG_imported_declaration),
            0x0a => Ok(Tag::DW_TAG_label),
            0x0b => Ok(Tag::DW_TAG_lexical_block),
            0x0d => Ok(Tag::DW_TAG_member),
            0x0f => Ok(Tag::DW_TAG_pointer_type),
            0x10 => Ok(Tag::DW_TAG_reference_type),
            0x11 => Ok(Tag::DW_TAG_compile_unit),
            0x12 => Ok(Tag::DW_TAG_string_type),
            0x13 => Ok(Tag::DW_TAG_structure_type),
            0x15 => Ok(Tag::DW_TAG_subroutine_type),
            0x16 => Ok(Tag::DW_TAG_typedef),
            0x17 => Ok(Tag::DW_TAG_union_type),
            0x18 => Ok(Tag::DW_TAG_unspecified_parameters),
            0x19 => Ok(Tag::DW_TAG_variant),
            0x1a => Ok(Tag::DW_TAG_common_block),
            0x1b => Ok(Tag::DW_TAG_common_inclusion),
            0x1c => Ok(Tag::DW_TAG_inheritance),
            0x1d => Ok(Tag::DW_TAG_inlined_subroutine),
            0x1e => Ok(Tag::DW_TAG_module),
            0x1f => Ok(Tag::DW_TAG_ptr_to_member_type),
            0x20 => Ok(Tag::DW_TAG_set_type),
            0x21 => Ok(Tag::DW_TAG_subrange_type),
            0x22 => Ok(Tag::DW_TAG_with_stmt),
            0x23 => Ok(Tag::DW_TAG_access_declaration),
            0x24 => Ok(Tag::DW_TAG_base_type),
            0x25 => Ok(Tag::DW_TAG_catch_block),
            0x26 => Ok(Tag::DW_TAG_const_type),
            0x27 => Ok(Tag::DW_TAG_constant),
            0x28 => Ok(Tag::DW_TAG_enumerator),
            0x29 => Ok(Tag::DW_TAG_file_type),
            0x2a => Ok(Tag::DW_TAG_friend),
            0x2b => Ok(Tag::DW_TAG_namelist),
            0x2c => Ok(Tag::DW_TAG_namelist_item),
            0x2d => Ok(Tag::DW_TAG_packed_type),
            0x2e => Ok(Tag::DW_TAG_subprogram),
            0x2f => Ok(Tag::DW_TAG_template_type_parameter),
            0x30 => Ok(Tag::DW_TAG_template_value_parameter),
            0x31 => Ok(Tag::DW_TAG_thrown_type),
            0x32 => Ok(Tag::DW_TAG_try_block),
            0x33 => Ok(Tag::DW_TAG_variant_part),
            0x34 => Ok(Tag::DW_TAG_variable),
            0x35 => Ok(Tag::DW_TAG_volatile_type),
            0x4080..=0xffff => Ok(Tag::DW_TAG_user),
            _ => Err(DwarfError::UnknownTag(value)),
        }
    }
}

#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)] // section 7.5.4
pub enum AttributeName {
    //                             value & class
    DW_AT_sibling,              // 0x01 reference
    DW_AT_location,             // 0x02 block, constant
    DW_AT_name,                 // 0x03 string
    DW_AT_ordering,             // 0x09 constant
    DW_AT_byte_size,            // 0x0b constant
    DW_AT_bit_offset,           // 0x0c constant
    DW_AT_bit_size,             // 0x0d constant
    DW_AT_stmt_list,            // 0x10 constant
    DW_AT_low_pc,               // 0x11 address
    DW_AT_high_pc,              // 0x12 address
    DW_AT_language,             // 0x13 constant
    DW_AT_discr,                // 0x15 reference
    DW_AT_discr_value,          // 0x16 constant
    DW_AT_visibility,           // 0x17 constant
    DW_AT_import,               // 0x18 reference
    DW_AT_string_length,        // 0x19 block, constant
    DW_AT_common_reference,     // 0x1a reference
    DW_AT_comp_dir,             // 0x1b string
    DW_AT_const_value,          // 0x1c string, constant, block
    DW_AT_containing_type,      // 0x1d reference
    DW_AT_default_value,        // 0x1e reference
    DW_AT_inline,               // 0x20 constant
    DW_AT_is_optional,          // 0x21 flag
    DW_AT_lower_bound,          // 0x22 constant, reference
    DW_AT_producer,             // 0x25 string
    DW_AT_prototyped,           // 0x27 flag
    DW_AT_return_addr,          // 0x2a block, constant
    DW_AT_start_scope,          // 0x2c constant
    DW_AT_stride_size,          // 0x2e constant
    DW_AT_upper_bound,          // 0x2f constant, reference
    DW_AT_abstract_origin,      // 0x31 reference
    DW_AT_accessibility,        // 0x32 constant
    DW_AT_address_class,        // 0x33 constant
    DW_AT_artificial,           // 0x34 flag
    DW_AT_base_types,           // 0x35 reference
    DW_AT_calling_convention,   // 0x36 constant
    DW_AT_count,                // 0x37 constant, reference
    DW_AT_data_member_location, // 0x38 block, reference
    DW_AT_decl_column,          // 0x39 constant
    DW_AT_decl_file,            // 0x3a constant
    DW_AT_decl_line,            // 0x3b constant
    DW_AT_declaration,          // 0x3c flag
    DW_AT_discr_list,           // 0x3d block
    DW_AT_encoding,             // 0x3e constant
    DW_AT_external,             // 0x3f flag
    DW_AT_frame_base,           // 0x40 block, constant
    DW_AT_friend,               // 0x41 reference
    DW_AT_identifier_case,      // 0x42 constant
    DW_AT_macro_info,           // 0x43 constant
    DW_AT_namelist_item,        // 0x44 block
    DW_AT_priority,             // 0x45 reference
    DW_AT_segment,              // 0x46 block, constant
    DW_AT_specification,        // 0x47 reference
    DW_AT_static_link,          // 0x48 block, constant
    DW_AT_type,                 // 0x49 reference
    DW_AT_use_location,         // 0x4a block, constant
    DW_AT_variable_parameter,   // 0x4b flag
    DW_AT_virtuality,           // 0x4c constant
    DW_AT_vtable_elem_location, // 0x4d block, reference
    DW_AT_user,                 // [0x2000, 0x4000)
}

impl AttributeName {
    pub fn from_u64(value: u64) -> Result<Self> {
        match value {
            0x01 => Ok(AttributeName::DW_AT_sibling),
            0x02 => Ok(AttributeName::DW_AT_location),
            0x03 => Ok(AttributeName::DW_AT_name),
            0x09 => Ok(AttributeName::DW_AT_ordering),
            0x0b => Ok(AttributeName::DW_AT_byte_size),
            0x0c => Ok(AttributeName::DW_AT_bit_offset),
            0x0d => Ok(AttributeName::DW_AT_bit_size),
            0x10 => Ok(AttributeName::DW_AT_stmt_list),
            0x11 => Ok(AttributeName::DW_AT_low_pc),
            0x12 => Ok(AttributeName::DW_AT_high_pc),
            0x13 => Ok(AttributeName::DW_AT_language),
            0x15 => Ok(AttributeName::DW_AT_discr),
            0x16 => Ok(AttributeName::DW_AT_discr_value),
            0x17 => Ok(AttributeName::DW_AT_visibility),
            0x18 => Ok(AttributeName::DW_AT_import),
            0x19 => Ok(AttributeName::DW_AT_string_length),
            0x1a => Ok(AttributeName::DW_AT_common_reference),
            0x1b => Ok(AttributeName::DW_AT_comp_dir),
            0x1c => Ok(AttributeName::DW_AT_const_value),
            0x1d => Ok(AttributeName::DW_AT_containing_type),
            0x1e => Ok(AttributeName::DW_AT_default_value),
            0x20 => Ok(AttributeName::DW_AT_inline),
            0x21 => Ok(AttributeName::DW_AT_is_optional),
            0x22 => Ok(AttributeName::DW_AT_lower_bound),
            0x25 => Ok(AttributeName::DW_AT_producer),
            0x27 => Ok(AttributeName::DW_AT_prototyped),
            0x2a => Ok(AttributeName::DW_AT_return_addr),
            0x2c => Ok(AttributeName::DW_AT_start_scope),
            0x2e => Ok(AttributeName::DW_AT_stride_size),
            0x2f => Ok(AttributeName::DW_AT_upper_bound),
            0x31 => Ok(AttributeName::DW_AT_abstract_origin),
            0x32 => Ok(AttributeName::DW_AT_accessibility),
            0x33 => Ok(AttributeName::DW_AT_address_class),
            0x34 => Ok(AttributeName::DW_AT_artificial),
            0x35 => Ok(AttributeName::DW_AT_base_types),
            0x36 => Ok(AttributeName::DW_AT_calling_convention),
            0x37 => Ok(AttributeName::DW_AT_count),
            0x38 => Ok(AttributeName::DW_AT_data_member_location),
            0x39 => Ok(AttributeName::DW_AT_decl_column),
            0x3a => Ok(AttributeName::DW_AT_decl_file),
            0x3b => Ok(AttributeName::DW_AT_decl_line),
            0x3c => Ok(AttributeName::DW_AT_declaration),
            0x3d => Ok(AttributeName::DW_AT_discr_list),
            0x3e => Ok(AttributeName::DW_AT_encoding),
            0x3f => Ok(AttributeName::DW_AT_external),
            0x40 => Ok(AttributeName::DW_AT_frame_base),
            0x41 => Ok(AttributeName::DW_AT_friend),
            0x42 => Ok(AttributeName::DW_AT_identifier_case),
            0x43 => Ok(AttributeName::DW_AT_macro_info),
            0x44 => Ok(AttributeName::DW_AT_namelist_item),
            0x45 => Ok(AttributeName::DW_AT_priority),
            0x46 => Ok(AttributeName::DW_AT_segment),
            0x47 => Ok(AttributeName::DW_AT_specification),
            0x48 => Ok(AttributeName::DW_AT_static_link),
            0x49 => Ok(AttributeName::DW_AT_type),
            0x4a => Ok(AttributeName::DW_AT_use_location),
            0x4b => Ok(AttributeName::DW_AT_variable_parameter),
            0x4c => Ok(AttributeName::DW_AT_virtuality),
            0x4d => Ok(AttributeName::DW_AT_vtable_elem_location),
            0x2000..=0x3fff => Ok(AttributeName::DW_AT_user),
            _ => Err(DwarfError::UnknownAttribute(value)),
        }
    }
}

#[allow(non_camel_case_types)] // section 7.5.4
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormEncoding {
    //                       value & class
    DW_FORM_addr,         // 0x01 address
    DW_FORM_block2,       // 0x03 block
    DW_FORM_block4,       // 0x04 block
    DW_FORM_data2,        // 0x05 constant
    DW_FORM_data4,        // 0x06 constant
    DW_FORM_data8,        // 0x07 constant
    DW_FORM_string,       // 0x08 string
    DW_FORM_block,        // 0x09 block
    DW_FORM_block1,       // 0x0a block
    DW_FORM_data1,        // 0x0b constant
    DW_FORM_flag,         // 0x0c flag
    DW_FORM_sdata,        // 0x0d constant
    DW_FORM_strp,         // 0x0e string
    DW_FORM_udata,        // 0x0f constant
    DW_FORM_ref_addr,     // 0x10 reference
    DW_FORM_ref1,         // 0x11 reference
    DW_FORM_ref2,         // 0x12 reference
    DW_FORM_ref4,         // 0x13 reference
    DW_FORM_ref8,         // 0x14 reference
    DW_FORM_ref_udata,    // 0x15 reference
    DW_FORM_indirect,     // 0x16 (see section 7.5.3)
}

impl FormEncoding {
    pub fn from_u64(value: u64) -> Result<Self> {
        match value {
            0x01 => Ok(FormEncoding::DW_FORM_addr),
            0x03 => Ok(FormEncoding::DW_FORM_block2),
            0x04 => Ok(FormEncoding::DW_FORM_block4),
            0x05 => Ok(FormEncoding::DW_FORM_data2),
            0x06 => Ok(FormEncoding::DW_FORM_data4),
            0x07 => Ok(FormEncoding::DW_FORM_data8),
            0x08 => Ok(FormEncoding::DW_FORM_string),
            0x09 => Ok(FormEncoding::DW_FORM_block),
            0x0a => Ok(FormEncoding::DW_FORM_block1),
            0x0b => Ok(FormEncoding::DW_FORM_data1),
            0x0c => Ok(FormEncoding::DW_FORM_flag),
            0x0d => Ok(FormEncoding::DW_FORM_sdata),
            0x0e => Ok(FormEncoding::DW_FORM_strp),
            0x0f => Ok(FormEncoding::DW_FORM_udata),
            0x10 => Ok(FormEncoding::DW_FORM_ref_addr),
            0x11 => Ok(FormEncoding::DW_FORM_ref1),
            0x12 => Ok(FormEncoding::DW_FORM_ref2),
            0x13 => Ok(FormEncoding::DW_FORM_ref4),
            0x14 => Ok(FormEncoding::DW_FORM_ref8),
            0x15 => Ok(FormEncoding::DW_FORM_ref_udata),
            0x16 => Ok(FormEncoding::DW_FORM_indirect),
            _ => Err(DwarfError::UnknownForm(value)),
        }
    }
}

/// Base-type encodings carried by DW_AT_encoding.
#[allow(non_upper_case_globals)]
pub mod ate {
    pub const DW_ATE_void: u64 = 0x0;
    pub const DW_ATE_address: u64 = 0x1;
    pub const DW_ATE_boolean: u64 = 0x2;
    pub const DW_ATE_complex_float: u64 = 0x3;
    pub const DW_ATE_float: u64 = 0x4;
    pub const DW_ATE_signed: u64 = 0x5;
    pub const DW_ATE_signed_char: u64 = 0x6;
    pub const DW_ATE_unsigned: u64 = 0x7;
    pub const DW_ATE_unsigned_char: u64 = 0x8;
}

/// Location-expression opcodes. Only the subset the evaluator supports
/// is named; reg/breg are ranges.
#[allow(non_upper_case_globals)]
pub mod op {
    pub const DW_OP_addr: u8 = 0x03;
    pub const DW_OP_const1u: u8 = 0x08;
    pub const DW_OP_const1s: u8 = 0x09;
    pub const DW_OP_const2u: u8 = 0x0a;
    pub const DW_OP_const2s: u8 = 0x0b;
    pub const DW_OP_const4u: u8 = 0x0c;
    pub const DW_OP_const4s: u8 = 0x0d;
    pub const DW_OP_constu: u8 = 0x10;
    pub const DW_OP_consts: u8 = 0x11;
    pub const DW_OP_plus_uconst: u8 = 0x23;
    pub const DW_OP_reg0: u8 = 0x50;
    pub const DW_OP_reg31: u8 = 0x6f;
    pub const DW_OP_breg0: u8 = 0x70;
    pub const DW_OP_breg31: u8 = 0x8f;
    pub const DW_OP_fbreg: u8 = 0x91;
    pub const DW_OP_piece: u8 = 0x93;
}

/// Standard line-number opcodes; opcode 0 introduces an extended opcode.
#[allow(non_upper_case_globals)]
pub mod lns {
    pub const DW_LNS_extended_op: u8 = 0;
    pub const DW_LNS_copy: u8 = 1;
    pub const DW_LNS_advance_pc: u8 = 2;
    pub const DW_LNS_advance_line: u8 = 3;
    pub const DW_LNS_set_file: u8 = 4;
    pub const DW_LNS_set_column: u8 = 5;
    pub const DW_LNS_negate_stmt: u8 = 6;
    pub const DW_LNS_set_basic_block: u8 = 7;
    pub const DW_LNS_const_add_pc: u8 = 8;
    pub const DW_LNS_fixed_advance_pc: u8 = 9;
}

/// Extended line-number opcodes.
#[allow(non_upper_case_globals)]
pub mod lne {
    pub const DW_LNE_end_sequence: u8 = 1;
    pub const DW_LNE_set_address: u8 = 2;
    pub const DW_LNE_define_file: u8 = 3;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_tag_round_trip() {
        assert_eq!(Tag::from_u64(0x11).unwrap(), Tag::DW_TAG_compile_unit);
        assert_eq!(Tag::from_u64(0x24).unwrap(), Tag::DW_TAG_base_type);
        assert_eq!(Tag::from_u64(0x4080).unwrap(), Tag::DW_TAG_user);
        assert!(Tag::from_u64(0x3f).is_err());
    }

    #[test]
    fn test_attribute_round_trip() {
        assert_eq!(
            AttributeName::from_u64(0x03).unwrap(),
            AttributeName::DW_AT_name
        );
        assert_eq!(
            AttributeName::from_u64(0x2116).unwrap(),
            AttributeName::DW_AT_user
        );
        assert!(AttributeName::from_u64(0x7f).is_err());
    }

    #[test]
    fn test_form_round_trip() {
        assert_eq!(
            FormEncoding::from_u64(0x13).unwrap(),
            FormEncoding::DW_FORM_ref4
        );
        assert!(FormEncoding::from_u64(0x17).is_err());
    }
}
