//! Bytecode machine for the Mica programming language
//!
//! A simple load/store machine: 10 general registers, a data stack and a
//! flat memory of 32-bit words, a constants pool, and a fixed-length
//! instruction encoding terminated by a zero byte. Blocks are statically
//! analyzed before execution; the analysis and the disassembler traverse
//! the same instruction boundaries the interpreter does.
//!
//! ```rust
//! use mica_vm::{analyze_code_block, CodeBlock, Register, Vm};
//!
//! let mut block = CodeBlock::named("answer");
//! block.emit_mov(Register::R1, 42);
//! block.emit_ret();
//! block.terminate();
//!
//! analyze_code_block(&block, 0).expect("well-formed block");
//! let mut vm = Vm::new();
//! vm.run(&block).expect("runs to Ret");
//! assert_eq!(vm.processor.register(Register::R1), 42);
//! ```

pub mod block;
pub mod disasm;
pub mod opcode;
pub mod selftest;
pub mod validate;
pub mod vm;

pub use block::CodeBlock;
pub use disasm::disassemble;
pub use opcode::{JumpCondition, Opcode, Register, REGISTER_COUNT};
pub use selftest::{run_self_tests, run_self_tests_with_limits};
pub use validate::{analyze_code_block, analyze_code_block_with_stack};
pub use vm::{DataStack, Memory, Processor, Vm, DEFAULT_MEMORY_SIZE, DEFAULT_STACK_SIZE};
