//! Static analysis of code blocks
//!
//! Every block must pass analysis before execution. The walk is linear and
//! flow-insensitive; a per-path analyzer (branch-aware stack depths, dead
//! code, uninitialized register reads) is a future extension.

use crate::block::CodeBlock;
use crate::opcode::{read_u16, Opcode, Register};
use crate::vm::DEFAULT_STACK_SIZE;

/// Analyze a code block against a constants pool of `constant_count` entries.
///
/// Returns `Ok(())` for a well-formed block, otherwise every finding the
/// analysis could collect. An unknown opcode aborts the walk immediately:
/// instruction boundaries are lost beyond that point.
pub fn analyze_code_block(block: &CodeBlock, constant_count: usize) -> Result<(), Vec<String>> {
    analyze_code_block_with_stack(block, constant_count, DEFAULT_STACK_SIZE)
}

pub fn analyze_code_block_with_stack(
    block: &CodeBlock,
    constant_count: usize,
    stack_size: usize,
) -> Result<(), Vec<String>> {
    let name = block.name();
    let code = block.bytes();
    let size = block.size();

    let mut findings = Vec::new();

    // First walk: record every instruction start until the terminator.
    let mut instruction_starts: Vec<usize> = Vec::new();
    let mut index = 0;
    while index < size {
        if code[index] == 0 {
            break; // zero termination
        }

        let Some(opcode) = Opcode::from_byte(code[index]) else {
            findings.push(format!(
                "Invalid opcode 0x{:02X} at offset {} in codeblock {}",
                code[index], index, name
            ));
            return Err(findings);
        };
        instruction_starts.push(index);

        if index + opcode.len() > size {
            findings.push(format!("Block {} ends with trailing bytes", name));
            break;
        }

        index += opcode.len();
    }

    // Second walk: per-instruction operand checks.
    let mut stack_pointer: i64 = 0;
    for &start in &instruction_starts {
        let opcode = Opcode::from_byte(code[start]).expect("recorded starts are valid opcodes");
        if start + opcode.len() > size {
            continue; // already reported as trailing bytes
        }

        match opcode {
            Opcode::Mov => {
                check_register(code, start + 1, name, &mut findings);
            }
            Opcode::Constant => {
                check_register(code, start + 1, name, &mut findings);
                let const_index = read_u16(&code[start + 2..]) as usize;
                if const_index >= constant_count {
                    findings.push(format!(
                        "Out of bounds constant index {} at offset {} in codeblock {}",
                        const_index, start, name
                    ));
                }
            }
            Opcode::Push | Opcode::Pop => {
                check_register(code, start + 1, name, &mut findings);

                if opcode == Opcode::Push {
                    stack_pointer += 1;
                } else {
                    stack_pointer -= 1;
                }

                if stack_pointer < 0 {
                    findings.push(format!(
                        "Stack underflow in codeblock {} at offset {}",
                        name, start
                    ));
                }
                if stack_pointer > stack_size as i64 {
                    findings.push(format!(
                        "Stack overflow in codeblock {} at offset {}",
                        name, start
                    ));
                }
            }
            op if op.is_binary_operation() => {
                check_register(code, start + 1, name, &mut findings);
                check_register(code, start + 2, name, &mut findings);
            }
            Opcode::Read | Opcode::Write => {
                check_register(code, start + 1, name, &mut findings);
                check_register(code, start + 2, name, &mut findings);
            }
            op if op.is_jump() => {
                let address = read_u16(&code[start + 1..]) as usize;
                if !instruction_starts.contains(&address) {
                    findings.push(format!(
                        "Invalid jump address {} at offset {} in codeblock {}",
                        address, start, name
                    ));
                }
            }
            Opcode::Ret => {
                // Nothing may follow a return except the terminator.
                if start + 1 < size && code[start + 1] != 0 {
                    findings.push(format!(
                        "Codeblock {} has instructions after return opcode",
                        name
                    ));
                }
            }
            _ => unreachable!("all opcodes are covered above"),
        }
    }

    if findings.is_empty() {
        Ok(())
    } else {
        Err(findings)
    }
}

fn check_register(code: &[u8], index: usize, name: &str, findings: &mut Vec<String>) {
    if Register::from_byte(code[index]).is_none() {
        findings.push(format!(
            "Invalid register id {} at offset {} in codeblock {}",
            code[index], index, name
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::JumpCondition;

    fn valid_block() -> CodeBlock {
        let mut block = CodeBlock::named("valid");
        block.emit_mov(Register::R1, 42);
        block.emit_ret();
        block.terminate();
        block
    }

    #[test]
    fn test_accepts_minimal_block() {
        assert!(analyze_code_block(&valid_block(), 0).is_ok());
    }

    #[test]
    fn test_rejects_invalid_opcode() {
        let block = CodeBlock::from_bytes(vec![0xAB, 0x00], Some("bad-op".to_string()));
        let findings = analyze_code_block(&block, 0).unwrap_err();
        assert!(findings[0].contains("Invalid opcode"));
    }

    #[test]
    fn test_rejects_invalid_register() {
        // Mov into register 11
        let block = CodeBlock::from_bytes(
            vec![Opcode::Mov as u8, 11, 0, 0, 0, 0, Opcode::Ret as u8, 0],
            None,
        );
        let findings = analyze_code_block(&block, 0).unwrap_err();
        assert!(findings.iter().any(|f| f.contains("Invalid register id 11")));
    }

    #[test]
    fn test_rejects_mid_instruction_jump_target() {
        // Jmp into the middle of the Mov instruction at offset 3.
        let mut block = CodeBlock::named("bad-jump");
        block.emit_jmp(5);
        block.emit_mov(Register::R1, 1);
        block.emit_ret();
        block.terminate();

        let findings = analyze_code_block(&block, 0).unwrap_err();
        assert!(
            findings.iter().any(|f| f.contains("Invalid jump address")),
            "findings: {:?}",
            findings
        );
    }

    #[test]
    fn test_accepts_jump_to_instruction_start() {
        let mut block = CodeBlock::named("good-jump");
        block.emit_jmp(9); // Jmp(3) + Mov(6) -> Ret starts at 9
        block.emit_mov(Register::R1, 1);
        block.emit_ret();
        block.terminate();

        assert!(analyze_code_block(&block, 0).is_ok());
    }

    #[test]
    fn test_rejects_out_of_bounds_constant_index() {
        let mut block = CodeBlock::new();
        block.emit_constant(Register::R1, 2);
        block.emit_ret();
        block.terminate();

        let findings = analyze_code_block(&block, 2).unwrap_err();
        assert!(findings.iter().any(|f| f.contains("constant index 2")));
        assert!(analyze_code_block(&block, 3).is_ok());
    }

    #[test]
    fn test_rejects_linear_stack_underflow() {
        let mut block = CodeBlock::new();
        block.emit_pop(Register::R1);
        block.emit_ret();
        block.terminate();

        let findings = analyze_code_block(&block, 0).unwrap_err();
        assert!(findings.iter().any(|f| f.contains("Stack underflow")));
    }

    #[test]
    fn test_rejects_linear_stack_overflow() {
        let mut block = CodeBlock::new();
        block.emit_push(Register::R1);
        block.emit_push(Register::R1);
        block.emit_ret();
        block.terminate();

        let findings = analyze_code_block_with_stack(&block, 0, 1).unwrap_err();
        assert!(findings.iter().any(|f| f.contains("Stack overflow")));
    }

    #[test]
    fn test_balanced_push_pop_within_bounds() {
        let mut block = CodeBlock::new();
        block.emit_push(Register::R1);
        block.emit_push(Register::R2);
        block.emit_pop(Register::R3);
        block.emit_pop(Register::R4);
        block.emit_ret();
        block.terminate();

        assert!(analyze_code_block(&block, 0).is_ok());
    }

    #[test]
    fn test_rejects_instructions_after_ret() {
        let mut block = CodeBlock::named("after-ret");
        block.emit_ret();
        block.emit_mov(Register::R1, 1);
        block.terminate();

        let findings = analyze_code_block(&block, 0).unwrap_err();
        assert!(findings.iter().any(|f| f.contains("after return")));
    }

    #[test]
    fn test_rejects_trailing_garbage() {
        // A Mov opcode with its immediate cut short.
        let block = CodeBlock::from_bytes(vec![Opcode::Mov as u8, 1, 0x2a], Some("cut".into()));
        let findings = analyze_code_block(&block, 0).unwrap_err();
        assert!(findings.iter().any(|f| f.contains("trailing bytes")));
    }

    #[test]
    fn test_conditional_jumps_validated_like_jmp() {
        let mut block = CodeBlock::new();
        block.emit_jmp_cond(1, JumpCondition::NotZero); // offset 1 is mid-instruction
        block.emit_ret();
        block.terminate();

        let findings = analyze_code_block(&block, 0).unwrap_err();
        assert!(findings.iter().any(|f| f.contains("Invalid jump address")));
    }
}
