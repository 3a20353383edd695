//! Evaluator for the small stack-machine language DWARF uses to encode
//! where a variable lives at runtime. Only the opcodes a DWARF 2
//! producer emits for single-location variables are handled; anything
//! else ends the expression early with whatever is on the stack.

use tracing::warn;

use crate::dwarf::{op, Stream};
use crate::errors::{DwarfError, Result};

/// Where an evaluated expression says the value lives. DWARF register
/// numbers are translated to target numbers by the caller.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Location {
    /// A memory address, or a plain constant when the expression never
    /// names a register.
    Address(u64),
    /// In a register, or at `[register] + offset` when `deref` is set.
    Register {
        register: u16,
        deref: bool,
        offset: i64,
    },
    /// Relative to the enclosing function's frame base.
    FrameRelative { offset: i64 },
}

#[derive(Copy, Clone)]
enum Chosen {
    None,
    Frame,
    Register(u16),
}

const STACK_DEPTH: usize = 64;

fn push(stack: &mut [i64; STACK_DEPTH], top: &mut usize, value: i64) -> Result<()> {
    if *top + 1 >= STACK_DEPTH {
        return Err(DwarfError::LocationStackOverflow);
    }
    *top += 1;
    stack[*top] = value;
    Ok(())
}

/// Runs an expression block and reports the resulting location. The
/// stack top doubles as the offset for register-relative results.
pub fn evaluate(block: &[u8], word_size: u8) -> Result<Location> {
    let mut stack = [0i64; STACK_DEPTH];
    let mut top = 0usize;
    let mut chosen = Chosen::None;
    let mut deref = false;
    // one logical value split across consecutive registers shows up as
    // regN piece regN+1 piece; keep the first register selected then
    let mut piece_found = false;

    let mut s = Stream::new(block, word_size);
    while !s.is_empty() {
        let opcode = s.read_u8()?;
        match opcode {
            op::DW_OP_addr => {
                let addr = s.read_address()?;
                push(&mut stack, &mut top, addr as i64)?;
            }
            op::DW_OP_const1u => {
                let v = s.read_u8()?;
                push(&mut stack, &mut top, v as i64)?;
            }
            op::DW_OP_const1s => {
                let v = s.read_u8()? as i8;
                push(&mut stack, &mut top, v as i64)?;
            }
            op::DW_OP_const2u => {
                let v = s.read_u16()?;
                push(&mut stack, &mut top, v as i64)?;
            }
            op::DW_OP_const2s => {
                let v = s.read_u16()? as i16;
                push(&mut stack, &mut top, v as i64)?;
            }
            op::DW_OP_const4u => {
                let v = s.read_u32()?;
                push(&mut stack, &mut top, v as i64)?;
            }
            op::DW_OP_const4s => {
                let v = s.read_u32()? as i32;
                push(&mut stack, &mut top, v as i64)?;
            }
            op::DW_OP_constu => {
                let v = s.read_uleb128()?;
                push(&mut stack, &mut top, v as i64)?;
            }
            op::DW_OP_consts => {
                let v = s.read_sleb128()?;
                push(&mut stack, &mut top, v)?;
            }
            op::DW_OP_plus_uconst => {
                let v = s.read_uleb128()?;
                stack[top] = stack[top].wrapping_add(v as i64);
            }
            op::DW_OP_reg0..=op::DW_OP_breg31 => {
                let (register, relative) = if opcode >= op::DW_OP_breg0 {
                    ((opcode - op::DW_OP_breg0) as u16, true)
                } else {
                    ((opcode - op::DW_OP_reg0) as u16, false)
                };
                match chosen {
                    // the same object continuing into the next register
                    Chosen::Register(prev) if piece_found && register == prev + 1 => {}
                    Chosen::None => chosen = Chosen::Register(register),
                    _ => {
                        warn!("expression selects more than one register, keeping {register}");
                        chosen = Chosen::Register(register);
                    }
                }
                if relative {
                    deref = true;
                    let offset = s.read_sleb128()?;
                    push(&mut stack, &mut top, offset)?;
                }
            }
            op::DW_OP_fbreg => {
                if !matches!(chosen, Chosen::None) {
                    warn!("expression selects both a register and the frame base");
                }
                chosen = Chosen::Frame;
                deref = true;
                let offset = s.read_sleb128()?;
                push(&mut stack, &mut top, offset)?;
            }
            op::DW_OP_piece => {
                let size = s.read_uleb128()?;
                warn!(size, "composite pieces are not handled directly");
                piece_found = true;
            }
            _ => {
                // best effort: report whatever has been computed so far
                warn!("unsupported location opcode {opcode:#04x}");
                break;
            }
        }
    }

    Ok(match chosen {
        Chosen::None => Location::Address(stack[top] as u64),
        Chosen::Frame => Location::FrameRelative { offset: stack[top] },
        Chosen::Register(register) => Location::Register {
            register,
            deref,
            offset: stack[top],
        },
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_addr_literal() {
        // DW_OP_addr 0x8049000
        let block = [0x03, 0x00, 0x90, 0x04, 0x08];
        assert_eq!(evaluate(&block, 4).unwrap(), Location::Address(0x8049000));
    }

    #[test]
    fn test_plus_uconst() {
        // DW_OP_constu 8; DW_OP_plus_uconst 12
        let block = [0x10, 0x08, 0x23, 0x0c];
        assert_eq!(evaluate(&block, 4).unwrap(), Location::Address(20));
    }

    #[test]
    fn test_plus_uconst_on_empty_stack() {
        // a bare member-offset block: DW_OP_plus_uconst 0
        let block = [0x23, 0x00];
        assert_eq!(evaluate(&block, 4).unwrap(), Location::Address(0));
    }

    #[test]
    fn test_reg_selection() {
        // DW_OP_reg5
        let block = [0x55];
        assert_eq!(
            evaluate(&block, 4).unwrap(),
            Location::Register {
                register: 5,
                deref: false,
                offset: 0
            }
        );
    }

    #[test]
    fn test_breg_with_offset() {
        // DW_OP_breg5 -16
        let block = [0x75, 0x70];
        assert_eq!(
            evaluate(&block, 4).unwrap(),
            Location::Register {
                register: 5,
                deref: true,
                offset: -16
            }
        );
    }

    #[test]
    fn test_fbreg() {
        // DW_OP_fbreg -8
        let block = [0x91, 0x78];
        assert_eq!(
            evaluate(&block, 4).unwrap(),
            Location::FrameRelative { offset: -8 }
        );
    }

    #[test]
    fn test_piece_keeps_first_register() {
        // DW_OP_reg0 piece 4 DW_OP_reg1 piece 4: a 64-bit value split
        // across eax/edx style pairs keeps the first register
        let block = [0x50, 0x93, 0x04, 0x51, 0x93, 0x04];
        assert_eq!(
            evaluate(&block, 4).unwrap(),
            Location::Register {
                register: 0,
                deref: false,
                offset: 0
            }
        );
    }

    #[test]
    fn test_conflicting_registers_keep_last() {
        // without pieces, a second register selection wins
        let block = [0x50, 0x53];
        assert_eq!(
            evaluate(&block, 4).unwrap(),
            Location::Register {
                register: 3,
                deref: false,
                offset: 0
            }
        );
    }

    #[test]
    fn test_unknown_opcode_is_best_effort() {
        // DW_OP_constu 7 then DW_OP_deref, which is not handled
        let block = [0x10, 0x07, 0x06, 0x10, 0x2a];
        assert_eq!(evaluate(&block, 4).unwrap(), Location::Address(7));
    }

    #[test]
    fn test_signed_constants() {
        // DW_OP_const2s -2
        let block = [0x0b, 0xfe, 0xff];
        assert_eq!(
            evaluate(&block, 4).unwrap(),
            Location::Address(-2i64 as u64)
        );
    }

    #[test]
    fn test_stack_overflow() {
        let mut block = Vec::new();
        for _ in 0..STACK_DEPTH {
            block.extend_from_slice(&[0x10, 0x01]); // DW_OP_constu 1
        }
        assert!(matches!(
            evaluate(&block, 4),
            Err(DwarfError::LocationStackOverflow)
        ));
    }
}
