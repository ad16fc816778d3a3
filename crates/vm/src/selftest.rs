//! Built-in bytecode self-test battery
//!
//! Small hand-assembled blocks run through the validator, the disassembler
//! and the interpreter. Wired to `micac --test-bytecode` so the machine can
//! be exercised without a working code generator.

use crate::block::CodeBlock;
use crate::opcode::{JumpCondition, Opcode, Register};
use crate::validate::analyze_code_block;
use crate::vm::Vm;

/// Run the whole battery, printing each block's disassembly and outcome.
///
/// Returns `Err` on the first failing test with a description of what went
/// wrong.
pub fn run_self_tests() -> Result<(), String> {
    run_self_tests_with_limits(crate::vm::DEFAULT_STACK_SIZE, crate::vm::DEFAULT_MEMORY_SIZE)
}

/// Run the battery on machines sized from configuration.
pub fn run_self_tests_with_limits(stack_size: usize, memory_size: usize) -> Result<(), String> {
    register_move(stack_size, memory_size)?;
    stack_roundtrip(stack_size, memory_size)?;
    arithmetic_and_conditional_jump(stack_size, memory_size)?;
    validator_rejects_bad_jump()?;
    println!("bytecode self-tests passed");
    Ok(())
}

fn check_and_print(block: &CodeBlock, constant_count: usize) -> Result<(), String> {
    analyze_code_block(block, constant_count)
        .map_err(|findings| format!("{} failed validation:\n{}", block.name(), findings.join("\n")))?;
    println!("{}", crate::disasm::disassemble(block));
    Ok(())
}

fn register_move(stack_size: usize, memory_size: usize) -> Result<(), String> {
    let mut block = CodeBlock::named("register-move");
    block.emit_mov(Register::R1, 42);
    block.emit_ret();
    block.terminate();

    check_and_print(&block, 0)?;

    let mut vm = Vm::with_limits(stack_size, memory_size);
    vm.run(&block)?;
    expect(block.name(), "r1", vm.processor.register(Register::R1), 42)
}

fn stack_roundtrip(stack_size: usize, memory_size: usize) -> Result<(), String> {
    let mut block = CodeBlock::named("stack-roundtrip");
    block.emit_mov(Register::R1, 7);
    block.emit_push(Register::R1);
    block.emit_mov(Register::R1, 0);
    block.emit_pop(Register::R2);
    block.emit_ret();
    block.terminate();

    check_and_print(&block, 0)?;

    let mut vm = Vm::with_limits(stack_size, memory_size);
    vm.run(&block)?;
    expect(block.name(), "r2", vm.processor.register(Register::R2), 7)
}

fn arithmetic_and_conditional_jump(stack_size: usize, memory_size: usize) -> Result<(), String> {
    // r1 = 0; r1 += r1 (sets Zero); Jz past `Mov r2, 1`; r2 must stay 0.
    let mut block = CodeBlock::named("conditional-jump");
    block.emit_mov(Register::R1, 0);
    block.emit_binary_op(Opcode::Add, Register::R1, Register::R1);
    let patch_at = block.next_offset();
    block.emit_jmp_cond(0, JumpCondition::Zero);
    block.emit_mov(Register::R2, 1);
    let target = block.next_offset() as u16;
    block.emit_ret();
    block.terminate();

    let mut bytes = block.bytes().to_vec();
    bytes[patch_at + 1..patch_at + 3].copy_from_slice(&target.to_le_bytes());
    let block = CodeBlock::from_bytes(bytes, Some("conditional-jump".to_string()));

    check_and_print(&block, 0)?;

    let mut vm = Vm::with_limits(stack_size, memory_size);
    vm.run(&block)?;
    expect(block.name(), "r2", vm.processor.register(Register::R2), 0)
}

fn validator_rejects_bad_jump() -> Result<(), String> {
    // Jump target inside the Mov instruction: must not validate.
    let mut block = CodeBlock::named("bad-jump");
    block.emit_jmp(5);
    block.emit_mov(Register::R1, 1);
    block.emit_ret();
    block.terminate();

    match analyze_code_block(&block, 0) {
        Ok(()) => Err("bad-jump block unexpectedly passed validation".to_string()),
        Err(findings) => {
            if findings.iter().any(|f| f.contains("Invalid jump address")) {
                Ok(())
            } else {
                Err(format!(
                    "bad-jump block rejected for the wrong reason:\n{}",
                    findings.join("\n")
                ))
            }
        }
    }
}

fn expect(block: &str, what: &str, got: i32, want: i32) -> Result<(), String> {
    if got == want {
        Ok(())
    } else {
        Err(format!("{}: expected {} = {}, got {}", block, what, want, got))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_battery_passes() {
        run_self_tests().expect("self-test battery");
    }
}
