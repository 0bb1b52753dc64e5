//! Opcode numbers and instruction lengths.
//!
//! The decoder does not interpret most instructions; it only needs to know
//! how far to step to reach the next one.

use crate::reader::{i32_at, u16_at};

pub const LDC: u8 = 0x12;
pub const LDC_W: u8 = 0x13;
pub const LDC2_W: u8 = 0x14;
pub const IINC: u8 = 0x84;
pub const TABLESWITCH: u8 = 0xAA;
pub const LOOKUPSWITCH: u8 = 0xAB;
pub const GETSTATIC: u8 = 0xB2;
pub const PUTSTATIC: u8 = 0xB3;
pub const GETFIELD: u8 = 0xB4;
pub const PUTFIELD: u8 = 0xB5;
pub const INVOKEVIRTUAL: u8 = 0xB6;
pub const INVOKESPECIAL: u8 = 0xB7;
pub const INVOKESTATIC: u8 = 0xB8;
pub const INVOKEINTERFACE: u8 = 0xB9;
pub const INVOKEDYNAMIC: u8 = 0xBA;
pub const NEW: u8 = 0xBB;
pub const ANEWARRAY: u8 = 0xBD;
pub const CHECKCAST: u8 = 0xC0;
pub const INSTANCEOF: u8 = 0xC1;
pub const WIDE: u8 = 0xC4;
pub const MULTIANEWARRAY: u8 = 0xC5;

/// Highest defined opcode (`jsr_w`).
const LAST_OPCODE: u8 = 0xC9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LengthError {
    Unknown(u8),
    Overrun,
}

/// Length in bytes of the instruction starting at `pc`, operands included.
/// The result is guaranteed to fit inside `code`.
pub(crate) fn instruction_length(code: &[u8], pc: usize) -> Result<usize, LengthError> {
    let op = *code.get(pc).ok_or(LengthError::Overrun)?;
    let len = match op {
        0x10 => 2,
        0x11 => 3,
        LDC => 2,
        LDC_W | LDC2_W => 3,
        0x15..=0x19 | 0x36..=0x3A => 2,
        IINC => 3,
        0x99..=0xA8 => 3,
        0xA9 => 2,
        TABLESWITCH => {
            let base = switch_base(pc);
            let low = i32_at(code, base + 4).ok_or(LengthError::Overrun)?;
            let high = i32_at(code, base + 8).ok_or(LengthError::Overrun)?;
            if high < low {
                return Err(LengthError::Overrun);
            }
            let count = (i64::from(high) - i64::from(low) + 1) as usize;
            (base - pc) + 12 + count * 4
        }
        LOOKUPSWITCH => {
            let base = switch_base(pc);
            let pairs = i32_at(code, base + 4).ok_or(LengthError::Overrun)?;
            let pairs = usize::try_from(pairs).map_err(|_| LengthError::Overrun)?;
            (base - pc) + 8 + pairs * 8
        }
        GETSTATIC..=INVOKESTATIC => 3,
        INVOKEINTERFACE | INVOKEDYNAMIC => 5,
        NEW => 3,
        0xBC => 2,
        ANEWARRAY => 3,
        CHECKCAST | INSTANCEOF => 3,
        WIDE => match code.get(pc + 1) {
            Some(&IINC) => 6,
            Some(_) => 4,
            None => return Err(LengthError::Overrun),
        },
        MULTIANEWARRAY => 4,
        0xC6 | 0xC7 => 3,
        0xC8 | 0xC9 => 5,
        op if op <= LAST_OPCODE => 1,
        other => return Err(LengthError::Unknown(other)),
    };
    if pc + len > code.len() {
        return Err(LengthError::Overrun);
    }
    Ok(len)
}

/// Start of a switch's aligned operands: 4-byte aligned relative to the
/// start of the code array.
fn switch_base(pc: usize) -> usize {
    let pad = (4 - ((pc + 1) % 4)) % 4;
    pc + 1 + pad
}

/// The `u16` operand right after the opcode, e.g. a pool index.
pub(crate) fn operand_u16(code: &[u8], pc: usize) -> Option<u16> {
    u16_at(code, pc + 1)
}
