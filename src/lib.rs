//! This crate reads the DWARF version 2 debugging information that
//! compilers encode into the ".debug_FOO" sections of object files and
//! loads it into an in-memory symbol database: compilation units, types,
//! functions with their locals and lexical blocks, global variables, and
//! per-address line records. Symbolic debuggers and backtrace formatters
//! then query the database for "what covers address X?" and "what is the
//! layout of this variable?".
//!
//! The caller extracts the raw section bytes (see the `dwdump` tool for
//! an example using the `object` crate) and hands them to [`parse`]
//! together with the [`Module`] to populate:
//!
//! ```no_run
//! use dwarfdb::{parse, DwarfSections, Module, registers::X86};
//!
//! # fn load(debug: &[u8], abbrev: &[u8], string: &[u8]) -> dwarfdb::Result<()> {
//! let mut module = Module::new("a.out", 0x0804_8000);
//! let sections = DwarfSections { debug, abbrev, string, line: None };
//! parse(&mut module, &[], &X86, sections)?;
//! # Ok(())
//! # }
//! ```

pub mod dwarf;
pub mod errors;
pub mod registers;
pub mod symbols;
pub mod thunks;

pub use dwarf::{parse, DwarfSections};
pub use errors::{DwarfError, Result};
pub use registers::{RegisterMapping, X86};
pub use symbols::Module;
pub use thunks::ThunkArea;
