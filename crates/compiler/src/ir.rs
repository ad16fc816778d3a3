//! Three-address intermediate representation
//!
//! One instruction form carries every IR construct: an opcode, a value id
//! and two integer operands. The translator walks the typed statement tree
//! and emits one instruction per internal expression node in postorder;
//! leaves (literals, variables) allocate value ids without emitting.
//!
//! Calls emit one `Param` per argument, left to right, immediately followed
//! by the `Call` (operand1 = procedure id, operand2 = arity). Block
//! statements and procedure bodies are bracketed by `ScopeStart`/`ScopeEnd`.
//!
//! This is the input of the future bytecode emitter; control flow and the
//! comparison/logical operators have no IR encoding yet, so `if`/`for`
//! translate their pieces without branch instructions.

use crate::ast::{Expr, ExprKind, Stmt, StmtKind};
use crate::token::Operator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrOp {
    Invalid,
    /// operand1 = procedure id, operand2 = arity
    Call,
    /// operand1 = argument value id
    Param,
    ScopeStart,
    ScopeEnd,
    // binary: operand1, operand2
    Add,
    Sub,
    Mult,
    Div,
    Mod,
    // unary: operand1
    Negate,
    Not,
}

impl IrOp {
    pub fn as_str(self) -> &'static str {
        match self {
            IrOp::Invalid => "invalid",
            IrOp::Call => "call",
            IrOp::Param => "param",
            IrOp::ScopeStart => "scope_start",
            IrOp::ScopeEnd => "scope_end",
            IrOp::Add => "add",
            IrOp::Sub => "sub",
            IrOp::Mult => "mult",
            IrOp::Div => "div",
            IrOp::Mod => "mod",
            IrOp::Negate => "negate",
            IrOp::Not => "not",
        }
    }
}

/// A single three-address instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrInstr {
    pub op: IrOp,
    /// Value id produced by this instruction.
    pub id: i32,
    pub operand1: i32,
    pub operand2: i32,
}

impl std::fmt::Display for IrInstr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.op {
            IrOp::Call => write!(
                f,
                "%{} = call proc {} arity {}",
                self.id, self.operand1, self.operand2
            ),
            IrOp::Param => write!(f, "param %{}", self.operand1),
            IrOp::ScopeStart | IrOp::ScopeEnd => write!(f, "{}", self.op.as_str()),
            IrOp::Negate | IrOp::Not => {
                write!(f, "%{} = {} %{}", self.id, self.op.as_str(), self.operand1)
            }
            IrOp::Invalid => write!(f, "invalid"),
            _ => write!(
                f,
                "%{} = {} %{} %{}",
                self.id,
                self.op.as_str(),
                self.operand1,
                self.operand2
            ),
        }
    }
}

/// Translate a resolved program into IR.
pub fn translate(program: &[Stmt]) -> Vec<IrInstr> {
    let mut translator = Translator::new();
    for stmt in program {
        translator.translate_statement(stmt);
    }
    translator.instructions
}

/// Render translated IR, one instruction per line.
pub fn ir_string(instructions: &[IrInstr]) -> String {
    let mut out = String::new();
    for instr in instructions {
        out.push_str(&instr.to_string());
        out.push('\n');
    }
    out
}

struct Translator {
    instructions: Vec<IrInstr>,
    next_value_id: i32,
}

impl Translator {
    fn new() -> Self {
        Translator {
            instructions: Vec::new(),
            next_value_id: 1,
        }
    }

    fn fresh_id(&mut self) -> i32 {
        let id = self.next_value_id;
        self.next_value_id += 1;
        id
    }

    fn emit(&mut self, op: IrOp, id: i32, operand1: i32, operand2: i32) {
        self.instructions.push(IrInstr {
            op,
            id,
            operand1,
            operand2,
        });
    }

    fn translate_statement(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::DeclVar { initializer, .. } => {
                if let Some(initializer) = initializer {
                    self.translate_expression(initializer);
                }
            }

            StmtKind::DeclProc { body, .. } => {
                self.emit(IrOp::ScopeStart, 0, 0, 0);
                for stmt in body {
                    self.translate_statement(stmt);
                }
                self.emit(IrOp::ScopeEnd, 0, 0, 0);
            }

            StmtKind::Assign { rhs, .. } => {
                self.translate_expression(rhs);
            }

            StmtKind::Block { body } => {
                self.emit(IrOp::ScopeStart, 0, 0, 0);
                for stmt in body {
                    self.translate_statement(stmt);
                }
                self.emit(IrOp::ScopeEnd, 0, 0, 0);
            }

            StmtKind::If {
                condition,
                then_stmt,
                else_stmt,
            } => {
                self.translate_expression(condition);
                self.translate_statement(then_stmt);
                if let Some(else_stmt) = else_stmt {
                    self.translate_statement(else_stmt);
                }
            }

            StmtKind::For { condition, body } => {
                self.translate_expression(condition);
                self.translate_statement(body);
            }

            StmtKind::Expression { expr } => {
                self.translate_expression(expr);
            }

            StmtKind::Return { exprs } => {
                for expr in exprs {
                    self.translate_expression(expr);
                }
            }

            StmtKind::Import { .. } => {}
        }
    }

    /// Translate an expression, returning its value id.
    fn translate_expression(&mut self, expr: &Expr) -> i32 {
        match &expr.kind {
            // Leaves allocate a value id without emitting an instruction.
            ExprKind::Literal { .. } | ExprKind::Variable { .. } => self.fresh_id(),

            ExprKind::Grouping { inner } => self.translate_expression(inner),

            ExprKind::Binary {
                left,
                operator,
                right,
            } => {
                let left_id = self.translate_expression(left);
                let right_id = self.translate_expression(right);
                let id = self.fresh_id();
                match binary_ir_op(*operator) {
                    Some(op) => self.emit(op, id, left_id, right_id),
                    // Comparison and logical operators have no IR encoding
                    // yet; the value id still exists for later stages.
                    None => {}
                }
                id
            }

            ExprKind::Unary { operator, operand } => {
                let operand_id = self.translate_expression(operand);
                let id = self.fresh_id();
                let op = match operator {
                    Operator::Minus => IrOp::Negate,
                    Operator::Not => IrOp::Not,
                    other => unreachable!("operator {} is not unary", other),
                };
                self.emit(op, id, operand_id, 0);
                id
            }

            ExprKind::Call {
                callee,
                arguments,
                proc_id,
            } => {
                // Chained callees translate innermost first so each frame's
                // Param/Call group is contiguous.
                if let ExprKind::Call { .. } = callee.kind {
                    self.translate_expression(callee);
                }

                let mut argument_ids = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    argument_ids.push(self.translate_expression(argument));
                }

                for argument_id in &argument_ids {
                    self.emit(IrOp::Param, 0, *argument_id, 0);
                }

                let id = self.fresh_id();
                self.emit(IrOp::Call, id, *proc_id as i32, arguments.len() as i32);
                id
            }

            // Structure lowering is deferred.
            ExprKind::Member { object, .. } => {
                self.translate_expression(object);
                self.fresh_id()
            }
        }
    }
}

fn binary_ir_op(operator: Operator) -> Option<IrOp> {
    match operator {
        Operator::Plus => Some(IrOp::Add),
        Operator::Minus => Some(IrOp::Sub),
        Operator::Mult => Some(IrOp::Mult),
        Operator::Div => Some(IrOp::Div),
        Operator::Mod => Some(IrOp::Mod),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::Diagnostics;
    use crate::lexer::lex;
    use crate::parser::Parser;
    use crate::resolver::Resolver;

    fn translate_source(source: &str) -> Vec<IrInstr> {
        let mut diags = Diagnostics::quiet();
        let (tokens, lex_error) = lex(source, &mut diags);
        assert!(!lex_error);
        let mut parser = Parser::new(tokens);
        let (mut program, parse_error) = parser.parse(&mut diags);
        assert!(!parse_error, "{:?}", diags.lines());
        let (_, resolve_ok) = Resolver::new().resolve(&mut program, &mut diags);
        assert!(resolve_ok, "{:?}", diags.lines());
        translate(&program)
    }

    fn ops(instructions: &[IrInstr]) -> Vec<IrOp> {
        instructions.iter().map(|i| i.op).collect()
    }

    #[test]
    fn test_binary_expression_emits_one_instruction() {
        let ir = translate_source("var a : int = 1;\nvar b : int = 2;\nvar c : int = a + b;");
        assert_eq!(ops(&ir), vec![IrOp::Add]);
        let add = ir[0];
        // Operands are the ids the leaves were given.
        assert_ne!(add.operand1, add.operand2);
        assert!(add.id > add.operand1 && add.id > add.operand2);
    }

    #[test]
    fn test_unary_emits_negate() {
        let ir = translate_source("var a : int = 1;\nvar b : int = -a;");
        assert_eq!(ops(&ir), vec![IrOp::Negate]);
    }

    #[test]
    fn test_call_emits_params_then_call() {
        let ir = translate_source(
            "proc add(a : int, b : int) int { return a + b; }\nvar x : int = add(1, 2);",
        );
        // Proc body: scope brackets around the return's Add; then the call.
        assert_eq!(
            ops(&ir),
            vec![
                IrOp::ScopeStart,
                IrOp::Add,
                IrOp::ScopeEnd,
                IrOp::Param,
                IrOp::Param,
                IrOp::Call
            ]
        );

        let call = *ir.last().unwrap();
        assert_eq!(call.operand2, 2, "call arity");
        assert_eq!(call.operand1, 1, "procedure id");

        // Params reference the argument ids left to right.
        let params: Vec<_> = ir.iter().filter(|i| i.op == IrOp::Param).collect();
        assert!(params[0].operand1 < params[1].operand1);
    }

    #[test]
    fn test_block_emits_scope_brackets() {
        let ir = translate_source("{ var a : int = 1; }");
        assert_eq!(ops(&ir), vec![IrOp::ScopeStart, IrOp::ScopeEnd]);
    }

    #[test]
    fn test_if_translates_condition_and_branches() {
        let ir = translate_source(
            "var x : int = 1;\nif x == 1 { x = x + 1; } else { x = x - 1; }",
        );
        // No branch opcodes yet: condition allocates ids silently, branches
        // bracket their blocks.
        assert_eq!(
            ops(&ir),
            vec![
                IrOp::ScopeStart,
                IrOp::Add,
                IrOp::ScopeEnd,
                IrOp::ScopeStart,
                IrOp::Sub,
                IrOp::ScopeEnd
            ]
        );
    }

    #[test]
    fn test_value_ids_are_monotonic() {
        let ir = translate_source("var a : int = 1;\nvar b : int = a + a;\nvar c : int = b * b;");
        assert_eq!(ops(&ir), vec![IrOp::Add, IrOp::Mult]);
        assert!(ir[0].id < ir[1].id);
    }

    #[test]
    fn test_display_formats() {
        let add = IrInstr {
            op: IrOp::Add,
            id: 3,
            operand1: 1,
            operand2: 2,
        };
        assert_eq!(add.to_string(), "%3 = add %1 %2");

        let param = IrInstr {
            op: IrOp::Param,
            id: 0,
            operand1: 7,
            operand2: 0,
        };
        assert_eq!(param.to_string(), "param %7");

        let call = IrInstr {
            op: IrOp::Call,
            id: 9,
            operand1: 2,
            operand2: 3,
        };
        assert_eq!(call.to_string(), "%9 = call proc 2 arity 3");
    }
}
