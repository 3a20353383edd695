//! Error types and the result alias used throughout the crate.
//!
//! Parsing errors are scoped: a failed compilation unit is logged and
//! skipped by the driver, it never aborts the surrounding parse.

use thiserror::Error;

use crate::dwarf::FormEncoding;

/// Alias for results returned by dwarfdb functions.
pub type Result<T> = std::result::Result<T, DwarfError>;

#[derive(Error, Debug)]
pub enum DwarfError {
    #[error("read past the end of the section at offset {0:#x}")]
    Truncated(usize),
    #[error("unsupported DWARF version {0}, only version 2 is handled")]
    UnsupportedVersion(u16),
    #[error("unsupported address size {0}, only 4-byte addresses are handled")]
    UnsupportedAddressSize(u8),
    #[error("unknown tag encoding {0:#x}")]
    UnknownTag(u64),
    #[error("unknown attribute name encoding {0:#x}")]
    UnknownAttribute(u64),
    #[error("unknown form encoding {0:#x}")]
    UnknownForm(u64),
    #[error("attribute form {0:?} is not handled")]
    UnhandledForm(FormEncoding),
    #[error("no abbreviation with code {code} for the entry at {offset:#x}")]
    MissingAbbreviation { code: u64, offset: usize },
    #[error("location expression overflows the evaluation stack")]
    LocationStackOverflow,
    #[error("compilation unit does not start with a compile_unit entry")]
    BadUnitRoot,
}
