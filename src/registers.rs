//! Mapping from DWARF register numbers to target-ABI register numbers.
//!
//! DWARF encodes variable locations against its own per-architecture
//! register numbering; the symbol database stores the debugger's own
//! numbers. The table is pluggable so a module for another architecture
//! can supply its own mapping.

// CodeView-style register numbers for the i386 target.
pub const CV_REG_EAX: u16 = 17;
pub const CV_REG_ECX: u16 = 18;
pub const CV_REG_EDX: u16 = 19;
pub const CV_REG_EBX: u16 = 20;
pub const CV_REG_ESP: u16 = 21;
pub const CV_REG_EBP: u16 = 22;
pub const CV_REG_ESI: u16 = 23;
pub const CV_REG_EDI: u16 = 24;
pub const CV_REG_ES: u16 = 25;
pub const CV_REG_CS: u16 = 26;
pub const CV_REG_SS: u16 = 27;
pub const CV_REG_DS: u16 = 28;
pub const CV_REG_FS: u16 = 29;
pub const CV_REG_GS: u16 = 30;
pub const CV_REG_EIP: u16 = 33;
pub const CV_REG_EFLAGS: u16 = 34;
pub const CV_REG_ST0: u16 = 128;
pub const CV_REG_CTRL: u16 = 136;
pub const CV_REG_STAT: u16 = 137;
pub const CV_REG_TAG: u16 = 138;
pub const CV_REG_XMM0: u16 = 154;
pub const CV_REG_MXCSR: u16 = 211;

/// Translates a DWARF register number into the target's numbering.
/// Returns `None` when the number has no equivalent on the target; the
/// loader logs these and falls back to register 0.
pub trait RegisterMapping {
    fn map(&self, dwarf_register: u16) -> Option<u16>;
}

/// The i386 register table.
pub struct X86;

impl RegisterMapping for X86 {
    fn map(&self, dwarf_register: u16) -> Option<u16> {
        match dwarf_register {
            0 => Some(CV_REG_EAX),
            1 => Some(CV_REG_ECX),
            2 => Some(CV_REG_EDX),
            3 => Some(CV_REG_EBX),
            4 => Some(CV_REG_ESP),
            5 => Some(CV_REG_EBP),
            6 => Some(CV_REG_ESI),
            7 => Some(CV_REG_EDI),
            8 => Some(CV_REG_EIP),
            9 => Some(CV_REG_EFLAGS),
            10 => Some(CV_REG_CS),
            11 => Some(CV_REG_SS),
            12 => Some(CV_REG_DS),
            13 => Some(CV_REG_ES),
            14 => Some(CV_REG_FS),
            15 => Some(CV_REG_GS),
            // x87 stack registers
            16..=23 => Some(CV_REG_ST0 + dwarf_register - 16),
            24 => Some(CV_REG_CTRL),
            25 => Some(CV_REG_STAT),
            26 => Some(CV_REG_TAG),
            32..=39 => Some(CV_REG_XMM0 + dwarf_register - 32),
            40 => Some(CV_REG_MXCSR),
            _ => None,
        }
    }
}
