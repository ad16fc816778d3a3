//! The bytecode interpreter
//!
//! A deterministic load/store machine: 10 general registers, a data stack
//! and a flat memory of 32-bit words, and an indexed constants pool. One
//! interpreter loop, no suspension points.
//!
//! Fatal conditions (bad register, out-of-bounds memory, stack over/underflow,
//! falling off the end without `Ret`) surface as `Err` carrying the machine
//! state and a disassembly of the offending block; the caller decides whether
//! to print and exit. User-provided bytecode must never panic the process.

use crate::block::CodeBlock;
use crate::disasm::disassemble;
use crate::opcode::{read_u16, read_u32, Opcode, Register, REGISTER_COUNT};

pub const DEFAULT_STACK_SIZE: usize = 1024;
pub const DEFAULT_MEMORY_SIZE: usize = 1024;

/// Register file, program counter and condition flags.
#[derive(Debug, Clone)]
pub struct Processor {
    pub registers: [i32; REGISTER_COUNT],
    pub pc: usize,
    pub negative: bool,
    pub zero: bool,
}

impl Processor {
    pub fn new() -> Self {
        Processor {
            registers: [0; REGISTER_COUNT],
            pc: 0,
            negative: false,
            zero: false,
        }
    }

    pub fn register(&self, reg: Register) -> i32 {
        self.registers[reg.index()]
    }

    pub fn set_register(&mut self, reg: Register, value: i32) {
        self.registers[reg.index()] = value;
    }

    /// Flag update applied after every binary operation.
    ///
    /// A zero result sets Zero and leaves Negative untouched; this matches
    /// the machine's historical behavior and is relied on by existing blocks.
    fn update_flags(&mut self, result: i32) {
        if result != 0 {
            self.zero = false;
            self.negative = result < 0;
        } else {
            self.zero = true;
        }
    }

    pub fn state_string(&self) -> String {
        let mut out = String::from("Processor state:\nRegisters:\n");
        for (i, value) in self.registers.iter().enumerate() {
            out.push_str(&format!("  r{}: {}\n", i + 1, value));
        }
        out.push_str(&format!("Program counter: {}\n", self.pc));
        out.push_str(&format!(
            "Flags: Zero={} Negative={}\n",
            self.zero as u8, self.negative as u8
        ));
        out
    }
}

impl Default for Processor {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed-capacity stack of 32-bit words.
#[derive(Debug, Clone)]
pub struct DataStack {
    data: Vec<i32>,
    limit: usize,
}

impl DataStack {
    pub fn new(limit: usize) -> Self {
        DataStack {
            data: Vec::new(),
            limit,
        }
    }

    pub fn push(&mut self, value: i32) -> Result<(), &'static str> {
        if self.data.len() >= self.limit {
            return Err("Stack overflow");
        }
        self.data.push(value);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<i32, &'static str> {
        self.data.pop().ok_or("Stack underflow")
    }

    pub fn depth(&self) -> usize {
        self.data.len()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

/// Flat memory of 32-bit words addressed by register contents.
#[derive(Debug, Clone)]
pub struct Memory {
    words: Vec<i32>,
}

impl Memory {
    pub fn new(size: usize) -> Self {
        Memory {
            words: vec![0; size],
        }
    }

    pub fn size(&self) -> usize {
        self.words.len()
    }

    pub fn read(&self, address: i32) -> Result<i32, &'static str> {
        self.words
            .get(usize::try_from(address).map_err(|_| "Memory read out of bounds")?)
            .copied()
            .ok_or("Memory read out of bounds")
    }

    pub fn write(&mut self, value: i32, address: i32) -> Result<(), &'static str> {
        let slot = usize::try_from(address)
            .ok()
            .and_then(|a| self.words.get_mut(a))
            .ok_or("Memory write out of bounds")?;
        *slot = value;
        Ok(())
    }
}

/// The virtual machine: processor, data stack, memory and constants pool.
#[derive(Debug, Clone)]
pub struct Vm {
    pub processor: Processor,
    pub stack: DataStack,
    pub memory: Memory,
    constants: Vec<i32>,
}

impl Vm {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_STACK_SIZE, DEFAULT_MEMORY_SIZE)
    }

    pub fn with_limits(stack_size: usize, memory_size: usize) -> Self {
        Vm {
            processor: Processor::new(),
            stack: DataStack::new(stack_size),
            memory: Memory::new(memory_size),
            constants: Vec::new(),
        }
    }

    /// Append a constant to the pool and return its index.
    pub fn add_constant(&mut self, value: i32) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    pub fn constant(&self, index: u16) -> Option<i32> {
        self.constants.get(index as usize).copied()
    }

    pub fn constant_count(&self) -> usize {
        self.constants.len()
    }

    pub fn state_string(&self) -> String {
        let mut out = self.processor.state_string();
        out.push_str(&format!(
            "Stack size: {}\nStack pointer: {}\n",
            self.stack.limit(),
            self.stack.depth()
        ));
        out.push_str(&format!("Memory size: {}\n", self.memory.size()));
        out
    }

    /// Build the full error report for a fatal bytecode condition: the
    /// message, the machine state, and a disassembly of the block.
    fn error(&self, block: &CodeBlock, msg: &str, offset: usize) -> String {
        format!(
            "Bytecode error on {} at offset {}: {}\n{}\nThe code block that caused the crash:\n{}",
            block.name(),
            offset,
            msg,
            self.state_string(),
            disassemble(block)
        )
    }

    /// Execute a code block from offset 0 until `Ret`.
    ///
    /// Blocks should pass `analyze_code_block` first; the interpreter still
    /// re-checks everything it touches so a malformed block fails with a
    /// report instead of corrupting the machine.
    pub fn run(&mut self, block: &CodeBlock) -> Result<(), String> {
        self.processor.pc = 0;
        let code = block.bytes();
        let size = block.size();

        while self.processor.pc < size {
            let pc = self.processor.pc;
            let opcode = Opcode::from_byte(code[pc])
                .ok_or_else(|| self.error(block, "Undefined opcode", pc))?;

            if pc + opcode.len() > size {
                return Err(self.error(block, "Truncated instruction", pc));
            }

            match opcode {
                Opcode::Mov => {
                    let reg = self.operand_register(code, pc + 1, block)?;
                    let value = read_u32(&code[pc + 2..]) as i32;
                    self.processor.set_register(reg, value);
                }
                Opcode::Constant => {
                    let reg = self.operand_register(code, pc + 1, block)?;
                    let index = read_u16(&code[pc + 2..]);
                    let value = self.constant(index).ok_or_else(|| {
                        self.error(block, "Reaching empty constant index", pc)
                    })?;
                    self.processor.set_register(reg, value);
                }
                Opcode::Push => {
                    let reg = self.operand_register(code, pc + 1, block)?;
                    let value = self.processor.register(reg);
                    self.stack
                        .push(value)
                        .map_err(|msg| self.error(block, msg, pc))?;
                }
                Opcode::Pop => {
                    let reg = self.operand_register(code, pc + 1, block)?;
                    let value = self.stack.pop().map_err(|msg| self.error(block, msg, pc))?;
                    self.processor.set_register(reg, value);
                }
                op if op.is_binary_operation() => {
                    self.binary_operation(op, code, pc, block)?;
                }
                Opcode::Read => {
                    let target = self.operand_register(code, pc + 1, block)?;
                    let address = self.operand_register(code, pc + 2, block)?;
                    let value = self
                        .memory
                        .read(self.processor.register(address))
                        .map_err(|msg| self.error(block, msg, pc))?;
                    self.processor.set_register(target, value);
                }
                Opcode::Write => {
                    let source = self.operand_register(code, pc + 1, block)?;
                    let address = self.operand_register(code, pc + 2, block)?;
                    self.memory
                        .write(
                            self.processor.register(source),
                            self.processor.register(address),
                        )
                        .map_err(|msg| self.error(block, msg, pc))?;
                }
                Opcode::Jmp => {
                    self.processor.pc = read_u16(&code[pc + 1..]) as usize;
                    continue;
                }
                Opcode::Jz => {
                    if self.processor.zero {
                        self.processor.pc = read_u16(&code[pc + 1..]) as usize;
                        continue;
                    }
                }
                Opcode::Jnz => {
                    if !self.processor.zero {
                        self.processor.pc = read_u16(&code[pc + 1..]) as usize;
                        continue;
                    }
                }
                Opcode::Jn => {
                    if self.processor.negative {
                        self.processor.pc = read_u16(&code[pc + 1..]) as usize;
                        continue;
                    }
                }
                Opcode::Jnn => {
                    if !self.processor.negative {
                        self.processor.pc = read_u16(&code[pc + 1..]) as usize;
                        continue;
                    }
                }
                Opcode::Ret => {
                    self.processor.pc += 1;
                    return Ok(());
                }
                _ => unreachable!("binary operations are matched by the guard arm"),
            }

            self.processor.pc += opcode.len();
        }

        Err(self.error(
            block,
            "Reached end of code block before returning",
            self.processor.pc,
        ))
    }

    fn operand_register(
        &self,
        code: &[u8],
        index: usize,
        block: &CodeBlock,
    ) -> Result<Register, String> {
        Register::from_byte(code[index])
            .ok_or_else(|| self.error(block, "Unknown register", self.processor.pc))
    }

    fn binary_operation(
        &mut self,
        opcode: Opcode,
        code: &[u8],
        pc: usize,
        block: &CodeBlock,
    ) -> Result<(), String> {
        let reg1 = self.operand_register(code, pc + 1, block)?;
        let reg2 = self.operand_register(code, pc + 2, block)?;
        let lhs = self.processor.register(reg1);
        let rhs = self.processor.register(reg2);

        let result = match opcode {
            Opcode::Add => lhs.wrapping_add(rhs),
            Opcode::Sub => lhs.wrapping_sub(rhs),
            Opcode::Mult => lhs.wrapping_mul(rhs),
            Opcode::Div => {
                if rhs == 0 {
                    return Err(self.error(block, "Division by zero", pc));
                }
                lhs.wrapping_div(rhs)
            }
            Opcode::Mod => {
                if rhs == 0 {
                    return Err(self.error(block, "Division by zero", pc));
                }
                lhs.wrapping_rem(rhs)
            }
            Opcode::And => lhs & rhs,
            Opcode::Or => lhs | rhs,
            Opcode::Xor => lhs ^ rhs,
            _ => unreachable!("caller guarantees a binary operation"),
        };

        self.processor.set_register(reg1, result);
        self.processor.update_flags(result);
        Ok(())
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::JumpCondition;

    #[test]
    fn test_mov_and_ret() {
        // Mov r1, 42; Ret
        let mut block = CodeBlock::named("hello");
        block.emit_mov(Register::R1, 42);
        block.emit_ret();
        block.terminate();

        let mut vm = Vm::new();
        vm.run(&block).expect("block runs");
        assert_eq!(vm.processor.register(Register::R1), 42);
        assert_eq!(vm.processor.pc, 7);
    }

    #[test]
    fn test_conditional_jump_skips_mov() {
        // r1 = 0; r1 += r1 sets Zero; Jz past `Mov r2, 1`; r2 stays 0.
        let mut block = CodeBlock::named("jz");
        block.emit_mov(Register::R1, 0);
        block.emit_binary_op(Opcode::Add, Register::R1, Register::R1);
        let jump_at = block.next_offset();
        block.emit_jmp_cond(0, JumpCondition::Zero);
        block.emit_mov(Register::R2, 1);
        let target = block.next_offset();
        block.emit_ret();
        block.terminate();

        // Patch the jump to land on the Ret.
        let mut bytes = block.bytes().to_vec();
        bytes[jump_at + 1..jump_at + 3].copy_from_slice(&(target as u16).to_le_bytes());
        let block = CodeBlock::from_bytes(bytes, Some("jz".to_string()));

        let mut vm = Vm::new();
        vm.run(&block).expect("block runs");
        assert_eq!(vm.processor.register(Register::R2), 0);
    }

    #[test]
    fn test_push_pop_roundtrip() {
        let mut block = CodeBlock::new();
        block.emit_mov(Register::R1, 7);
        block.emit_push(Register::R1);
        block.emit_pop(Register::R2);
        block.emit_ret();
        block.terminate();

        let mut vm = Vm::new();
        vm.run(&block).expect("block runs");
        assert_eq!(vm.processor.register(Register::R2), 7);
        assert_eq!(vm.stack.depth(), 0);
    }

    #[test]
    fn test_memory_read_write() {
        // mem[r2] = r1; r3 = mem[r2]
        let mut block = CodeBlock::new();
        block.emit_mov(Register::R1, 99);
        block.emit_mov(Register::R2, 5);
        block.emit_write(Register::R1, Register::R2);
        block.emit_read(Register::R3, Register::R2);
        block.emit_ret();
        block.terminate();

        let mut vm = Vm::new();
        vm.run(&block).expect("block runs");
        assert_eq!(vm.processor.register(Register::R3), 99);
    }

    #[test]
    fn test_constant_pool_load() {
        let mut vm = Vm::new();
        let index = vm.add_constant(1234);

        let mut block = CodeBlock::new();
        block.emit_constant(Register::R4, index as u16);
        block.emit_ret();
        block.terminate();

        vm.run(&block).expect("block runs");
        assert_eq!(vm.processor.register(Register::R4), 1234);
    }

    #[test]
    fn test_empty_constant_index_is_fatal() {
        let mut block = CodeBlock::new();
        block.emit_constant(Register::R1, 3);
        block.emit_ret();
        block.terminate();

        let mut vm = Vm::new();
        let err = vm.run(&block).unwrap_err();
        assert!(err.contains("constant index"), "unexpected report: {}", err);
    }

    #[test]
    fn test_stack_underflow_is_fatal() {
        let mut block = CodeBlock::named("underflow");
        block.emit_pop(Register::R1);
        block.emit_ret();
        block.terminate();

        let mut vm = Vm::new();
        let err = vm.run(&block).unwrap_err();
        assert!(err.contains("Stack underflow"), "unexpected report: {}", err);
        // The report carries machine state and a disassembly.
        assert!(err.contains("Program counter"));
        assert!(err.contains("Op_Pop"));
    }

    #[test]
    fn test_fall_off_end_without_ret() {
        let mut block = CodeBlock::new();
        block.emit_mov(Register::R1, 1);
        // no Ret, no terminator inside the walked range
        let mut vm = Vm::new();
        let err = vm.run(&block).unwrap_err();
        assert!(err.contains("before returning"), "unexpected report: {}", err);
    }

    #[test]
    fn test_division_by_zero_is_fatal() {
        let mut block = CodeBlock::new();
        block.emit_mov(Register::R1, 10);
        block.emit_mov(Register::R2, 0);
        block.emit_binary_op(Opcode::Div, Register::R1, Register::R2);
        block.emit_ret();
        block.terminate();

        let mut vm = Vm::new();
        let err = vm.run(&block).unwrap_err();
        assert!(err.contains("Division by zero"));
    }

    #[test]
    fn test_zero_result_leaves_negative_flag() {
        // -5 + -5 = -10 sets Negative; adding 10 gives 0, which sets Zero
        // but must leave Negative as it was.
        let mut block = CodeBlock::new();
        block.emit_mov(Register::R1, -5);
        block.emit_binary_op(Opcode::Add, Register::R1, Register::R1);
        block.emit_mov(Register::R2, 10);
        block.emit_binary_op(Opcode::Add, Register::R1, Register::R2);
        block.emit_ret();
        block.terminate();

        let mut vm = Vm::new();
        vm.run(&block).expect("block runs");
        assert_eq!(vm.processor.register(Register::R1), 0);
        assert!(vm.processor.zero);
        assert!(vm.processor.negative, "zero result must not clear Negative");
    }

    #[test]
    fn test_unconditional_jump_loop_terminates_via_ret() {
        // Jmp over a Mov, then Ret.
        let mut block = CodeBlock::new();
        block.emit_jmp(9); // past the 6-byte Mov at offset 3
        block.emit_mov(Register::R1, 1);
        block.emit_ret();
        block.terminate();

        let mut vm = Vm::new();
        vm.run(&block).expect("block runs");
        assert_eq!(vm.processor.register(Register::R1), 0);
    }
}
