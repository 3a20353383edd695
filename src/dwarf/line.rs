//! Evaluator for the line-number programs in the line section. Each
//! compilation unit that carries DW_AT_stmt_list points at one program:
//! a header with its own directory and file tables followed by state
//! machine bytecode that yields (address, file, line) rows. Rows are
//! attached to whichever function covers the address.

use tracing::{trace, warn};

use crate::dwarf::{lne, lns, Stream};
use crate::errors::Result;
use crate::symbols::{Module, SourceId, Symbol};

/// Runs the line program at `offset` in the line section, registering the
/// program's files with the module and attaching the emitted rows to the
/// functions covering them.
pub(crate) fn parse_line_numbers(
    module: &mut Module,
    section: &[u8],
    word_size: u8,
    compile_dir: Option<&str>,
    offset: usize,
) -> Result<()> {
    let mut s = Stream::at(section, offset, word_size);

    let length = s.read_u32()? as usize;
    let end = s.pos() + length;
    s.set_end(end);

    let version = s.read_u16()?;
    let _header_length = s.read_u32()?;
    let insn_size = s.read_u8()? as u64;
    let default_stmt = s.read_u8()? != 0;
    let line_base = s.read_u8()? as i8 as i64;
    let line_range = s.read_u8()? as u64;
    let opcode_base = s.read_u8()?;
    trace!(version, insn_size, line_base, line_range, opcode_base, "line program header");
    if line_range == 0 || opcode_base == 0 {
        warn!("malformed line program header");
        return Ok(());
    }

    // operand counts for the standard opcodes, used to step over opcodes
    // we don't know
    let mut opcode_lengths = Vec::with_capacity(opcode_base as usize - 1);
    for _ in 1..opcode_base {
        opcode_lengths.push(s.read_u8()?);
    }

    // include directories; entry 0 is the compilation directory
    let mut dirs: Vec<String> = vec![compile_dir.unwrap_or(".").to_string()];
    loop {
        let dir = s.read_string()?;
        if dir.is_empty() {
            break;
        }
        trace!(%dir, "include directory");
        match compile_dir {
            Some(base) if !dir.starts_with('/') => {
                if base.ends_with('/') {
                    dirs.push(format!("{base}{dir}"));
                } else {
                    dirs.push(format!("{base}/{dir}"));
                }
            }
            _ => dirs.push(dir.into_owned()),
        }
    }

    // file names; indices in the program are 1-based
    let mut files: Vec<SourceId> = Vec::new();
    loop {
        let name = s.read_string()?;
        if name.is_empty() {
            break;
        }
        let dir_index = s.read_uleb128()? as usize;
        let _mod_time = s.read_uleb128()?;
        let _file_length = s.read_uleb128()?;
        let dir = dirs.get(dir_index).unwrap_or(&dirs[0]).as_str();
        trace!(%name, dir, "file entry");
        files.push(module.add_source(Some(dir), &name));
    }

    while !s.is_empty() {
        let mut address: u64 = 0;
        let mut file: usize = 1;
        let mut line: i64 = 1;
        let mut is_stmt = default_stmt;
        let mut basic_block = false;
        let mut end_sequence = false;

        while !end_sequence {
            let opcode = s.read_u8()?;

            if opcode >= opcode_base {
                let delta = (opcode - opcode_base) as u64;
                address += (delta / line_range) * insn_size;
                line += line_base + (delta % line_range) as i64;
                basic_block = true;
                trace!(address, file, line, is_stmt, basic_block, "special opcode row");
                emit_row(module, address, &files, file, line);
                continue;
            }
            match opcode {
                lns::DW_LNS_copy => {
                    basic_block = false;
                    emit_row(module, address, &files, file, line);
                }
                lns::DW_LNS_advance_pc => {
                    address += insn_size * s.read_uleb128()?;
                }
                lns::DW_LNS_advance_line => {
                    line += s.read_sleb128()?;
                }
                lns::DW_LNS_set_file => {
                    file = s.read_uleb128()? as usize;
                }
                lns::DW_LNS_set_column => {
                    s.read_uleb128()?;
                }
                lns::DW_LNS_negate_stmt => {
                    is_stmt = !is_stmt;
                }
                lns::DW_LNS_set_basic_block => {
                    basic_block = true;
                }
                lns::DW_LNS_const_add_pc => {
                    address += (((255 - opcode_base) as u64) / line_range) * insn_size;
                }
                lns::DW_LNS_fixed_advance_pc => {
                    address += s.read_u16()? as u64;
                }
                lns::DW_LNS_extended_op => {
                    // the length prefix is not needed for the opcodes we know
                    s.read_uleb128()?;
                    let extended = s.read_u8()?;
                    match extended {
                        lne::DW_LNE_end_sequence => {
                            emit_row(module, address, &files, file, line);
                            end_sequence = true;
                        }
                        lne::DW_LNE_set_address => {
                            address = module.base + s.read_address()?;
                        }
                        lne::DW_LNE_define_file => {
                            warn!("define_file is not implemented");
                            s.read_string()?;
                            s.read_uleb128()?;
                            s.read_uleb128()?;
                            s.read_uleb128()?;
                        }
                        _ => {
                            warn!("unsupported extended line opcode {extended:#x}");
                        }
                    }
                }
                _ => {
                    warn!("unsupported line opcode {opcode:#x}");
                    let operands = opcode_lengths
                        .get(opcode as usize - 1)
                        .copied()
                        .unwrap_or(0);
                    for _ in 0..operands {
                        s.read_uleb128()?;
                    }
                }
            }
        }
    }
    Ok(())
}

/// Resolves one emitted row to the function covering its address and
/// records it there. Rows outside any function are dropped, as are rows
/// naming a file the header didn't declare.
fn emit_row(module: &mut Module, address: u64, files: &[SourceId], file: usize, line: i64) {
    if file == 0 {
        return;
    }
    let Some(&source) = files.get(file - 1) else {
        return;
    };
    let Some(nearest) = module.find_nearest(address) else {
        return;
    };
    let func_address = match module.symbol(nearest) {
        Symbol::Function(f) => f.address,
        _ => return,
    };
    module.add_func_line(nearest, source, line.max(0) as u32, address - func_address);
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::symbols::Module;

    struct Program {
        bytes: Vec<u8>,
    }

    impl Program {
        /// A header with line_base -1, line_range 4, opcode_base 13 and a
        /// single file "a.c" in the compilation directory.
        fn new() -> Self {
            let mut bytes = vec![
                0, 0, 0, 0, // total length, patched in finish()
                2, 0, // version
                0, 0, 0, 0, // header length (unused by the evaluator)
                1, // minimum instruction length
                1, // default is_stmt
                0xff, // line_base -1
                4,  // line_range
                13, // opcode_base
                0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, // standard operand counts
                0,    // end of include directories
            ];
            bytes.extend_from_slice(b"a.c\0");
            bytes.extend_from_slice(&[0, 0, 0]); // dir index, mtime, length
            bytes.push(0); // end of file names
            Program { bytes }
        }

        fn op(&mut self, bytes: &[u8]) -> &mut Self {
            self.bytes.extend_from_slice(bytes);
            self
        }

        fn set_address(&mut self, addr: u32) -> &mut Self {
            self.op(&[0, 5, 2])
                .op(&addr.to_le_bytes())
        }

        fn end_sequence(&mut self) -> &mut Self {
            self.op(&[0, 1, 1])
        }

        fn finish(mut self) -> Vec<u8> {
            let len = (self.bytes.len() - 4) as u32;
            self.bytes[0..4].copy_from_slice(&len.to_le_bytes());
            self.bytes
        }
    }

    fn module_with_function(base: u64) -> Module {
        let mut module = Module::new("test", base);
        let sig = module.new_function_signature(None);
        module.new_function(None, "f", base + 0x1000, 0x100, sig);
        module
    }

    fn lines_of(module: &Module) -> Vec<(u64, u32)> {
        match module.symbol(module.find_nearest(u64::MAX).unwrap()) {
            Symbol::Function(f) => f.lines.iter().map(|l| (l.offset, l.line)).collect(),
            _ => panic!("expected a function"),
        }
    }

    #[test]
    fn test_special_opcode_rows() {
        let mut p = Program::new();
        p.set_address(0x1000);
        p.op(&[1]); // copy: row (0x1000, 1, 1)
        p.op(&[13 + 6]); // special: address +1, line +1
        p.end_sequence();
        let bytes = p.finish();

        let mut module = module_with_function(0);
        parse_line_numbers(&mut module, &bytes, 4, Some("."), 0).unwrap();
        // end_sequence emits a final row at the last address
        assert_eq!(lines_of(&module), vec![(0, 1), (1, 2), (1, 2)]);
    }

    #[test]
    fn test_special_equals_standard_expansion() {
        // the special opcode stream and its advance_pc/advance_line/copy
        // expansion must produce identical rows
        let mut special = Program::new();
        special.set_address(0x1000);
        special.op(&[13 + 6]); // +1 insn, +1 line
        special.op(&[13 + 9]); // +2 insn, +0 line
        special.end_sequence();

        let mut expanded = Program::new();
        expanded.set_address(0x1000);
        expanded.op(&[2, 1]); // advance_pc 1
        expanded.op(&[3, 1]); // advance_line +1
        expanded.op(&[1]); // copy
        expanded.op(&[2, 2]); // advance_pc 2
        expanded.op(&[1]); // copy
        expanded.end_sequence();

        let mut m1 = module_with_function(0);
        parse_line_numbers(&mut m1, &special.finish(), 4, Some("."), 0).unwrap();
        let mut m2 = module_with_function(0);
        parse_line_numbers(&mut m2, &expanded.finish(), 4, Some("."), 0).unwrap();
        assert_eq!(lines_of(&m1), lines_of(&m2));
    }

    #[test]
    fn test_set_address_applies_module_base() {
        let mut p = Program::new();
        p.set_address(0x1000);
        p.op(&[1]); // copy
        p.end_sequence();
        let bytes = p.finish();

        let mut module = module_with_function(0x4000_0000);
        parse_line_numbers(&mut module, &bytes, 4, Some("."), 0).unwrap();
        let rows = lines_of(&module);
        assert_eq!(rows[0], (0, 1));
    }

    #[test]
    fn test_rows_outside_functions_are_dropped() {
        let mut p = Program::new();
        p.set_address(0x10); // below the function at 0x1000
        p.op(&[1]);
        p.end_sequence();
        let bytes = p.finish();

        let mut module = module_with_function(0);
        parse_line_numbers(&mut module, &bytes, 4, Some("."), 0).unwrap();
        assert!(lines_of(&module).is_empty());
    }

    #[test]
    fn test_file_table_composes_directories() {
        let p = Program::new();
        let bytes = p.finish();
        let mut module = module_with_function(0);
        parse_line_numbers(&mut module, &bytes, 4, Some("/src/proj"), 0).unwrap();
        assert_eq!(module.sources().len(), 1);
        assert_eq!(module.source_path(crate::symbols::SourceId(0)), "/src/proj/a.c");
    }
}
