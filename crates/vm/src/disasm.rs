//! Code block disassembler
//!
//! Renders the same information the validator traverses. The output is the
//! inverse of the emission helpers and is embedded in VM error reports, so
//! it must stay robust on malformed blocks: it stops with a note instead of
//! failing.

use crate::block::CodeBlock;
use crate::opcode::{read_u16, read_u32, Opcode, Register};
use std::fmt::Write as _;

/// Render a block as offset-prefixed mnemonics, one instruction per line.
pub fn disassemble(block: &CodeBlock) -> String {
    let name = block.name();
    let code = block.bytes();
    let size = block.size();

    let mut out = format!("Code block {} of size {}\n", name, size);
    let mut index = 0;

    while index < size {
        if code[index] == 0 {
            let _ = writeln!(out, "End of block {}", name);
            return out;
        }

        let Some(opcode) = Opcode::from_byte(code[index]) else {
            let _ = writeln!(out, "Invalid opcode {} at offset {}", code[index], index);
            let _ = writeln!(out, "Disassembly failed");
            return out;
        };

        if index + opcode.len() > size {
            let _ = writeln!(out, "Block {} ends with invalid bytes at the end", name);
            return out;
        }

        let _ = write!(out, "{:04x}: ", index);

        match opcode {
            Opcode::Mov => {
                let Some(reg) = register(&mut out, code[index + 1]) else {
                    return out;
                };
                let _ = writeln!(out, "{} {} {}", opcode, reg, read_u32(&code[index + 2..]) as i32);
            }
            Opcode::Constant => {
                let Some(reg) = register(&mut out, code[index + 1]) else {
                    return out;
                };
                let _ = writeln!(out, "{} {} {}", opcode, reg, read_u16(&code[index + 2..]));
            }
            Opcode::Push | Opcode::Pop => {
                let Some(reg) = register(&mut out, code[index + 1]) else {
                    return out;
                };
                let _ = writeln!(out, "{} {}", opcode, reg);
            }
            op if op.is_binary_operation() => {
                let (Some(reg1), Some(reg2)) = (
                    register(&mut out, code[index + 1]),
                    register(&mut out, code[index + 2]),
                ) else {
                    return out;
                };
                let _ = writeln!(out, "{} {} {}", opcode, reg1, reg2);
            }
            Opcode::Read | Opcode::Write => {
                let (Some(reg1), Some(reg2)) = (
                    register(&mut out, code[index + 1]),
                    register(&mut out, code[index + 2]),
                ) else {
                    return out;
                };
                let _ = writeln!(out, "{} {} {}", opcode, reg1, reg2);
            }
            op if op.is_jump() => {
                let _ = writeln!(out, "{} {:#x}", opcode, read_u16(&code[index + 1..]));
            }
            Opcode::Ret => {
                let _ = writeln!(out, "{}", opcode);
            }
            _ => unreachable!("all opcodes are covered above"),
        }

        index += opcode.len();
    }

    out
}

fn register(out: &mut String, byte: u8) -> Option<Register> {
    let reg = Register::from_byte(byte);
    if reg.is_none() {
        let _ = writeln!(out, "Invalid register id {}", byte);
        let _ = writeln!(out, "Disassembly failed");
    }
    reg
}
