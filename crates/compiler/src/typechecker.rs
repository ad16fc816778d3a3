//! Type checking for Mica
//!
//! Walks the resolved statement tree, typing every expression against the
//! environment table the resolver produced. The checker reports as many
//! errors as it can in one run; it never stops at the first mismatch.
//!
//! There are no implicit conversions: binary operands, initializers,
//! assignment sides, call arguments and return values must match exactly.
//! The implicit-conversion hook exists but deliberately converts nothing.

use crate::ast::{Expr, ExprKind, Stmt, StmtKind};
use crate::diag::Diagnostics;
use crate::scope::Environments;
use crate::token::Operator;
use crate::types::{value_type, TypeId, TYPE_BOOLEAN, TYPE_NONE};
use tracing::debug;

/// Implicit conversion between mismatched binary operand types. Currently a
/// stub: nothing converts, so every mismatch is an error.
fn implicit_convert(_left: TypeId, _right: TypeId) -> TypeId {
    TYPE_NONE
}

fn ordinal_string(n: usize) -> String {
    let suffix = match (n % 10, n % 100) {
        (1, 11) | (2, 12) | (3, 13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{}{}", n, suffix)
}

pub struct TypeChecker<'envs> {
    environments: &'envs Environments,
    /// Declared return lists of the procedures being checked, innermost
    /// last. Return statements check against the top entry.
    return_stack: Vec<Vec<TypeId>>,
    errors_found: bool,
}

impl<'envs> TypeChecker<'envs> {
    pub fn new(environments: &'envs Environments) -> Self {
        TypeChecker {
            environments,
            return_stack: Vec::new(),
            errors_found: false,
        }
    }

    /// Check a whole program. Returns true when no type errors were found.
    pub fn check_program(&mut self, program: &[Stmt], diags: &mut Diagnostics) -> bool {
        for stmt in program {
            self.check_statement(stmt, diags);
        }
        debug!(success = !self.errors_found, "type checked program");
        !self.errors_found
    }

    fn error(&mut self, diags: &mut Diagnostics, line: usize, msg: &str) {
        self.errors_found = true;
        diags.error(line, msg);
    }

    fn check_statement(&mut self, stmt: &Stmt, diags: &mut Diagnostics) {
        let scope = stmt.scope;

        match &stmt.kind {
            StmtKind::DeclVar {
                decl, initializer, ..
            } => {
                if let Some(initializer) = initializer {
                    let init_type = self.check_expression(initializer, scope, diags);
                    if init_type != decl.ty {
                        let line = decl.name.as_ref().map(|t| t.line).unwrap_or(0);
                        self.error(
                            diags,
                            line,
                            &format!(
                                "Expected type {} but initializer is of type {}",
                                decl.ty, init_type
                            ),
                        );
                    }
                }
            }

            StmtKind::DeclProc { name, body, .. } => {
                let returns = self
                    .environments
                    .lookup_procedure(scope, &name.lexeme)
                    .map(|proc| proc.returns.clone())
                    .unwrap_or_default();

                self.return_stack.push(returns);
                for stmt in body {
                    self.check_statement(stmt, diags);
                }
                self.return_stack.pop();
            }

            StmtKind::Assign { target, rhs, .. } => {
                let rhs_type = self.check_expression(rhs, scope, diags);

                let Some(variable) = self
                    .environments
                    .lookup_variable(scope, &target.lexeme)
                    .copied()
                else {
                    // The resolver already reported the undeclared use.
                    return;
                };

                if variable.ty != rhs_type {
                    self.error(
                        diags,
                        target.line,
                        &format!(
                            "Types of left and right hand sides of the assignment don't match, \
                             variable {} is expected to be of type {} but the right hand side is of type {}",
                            target.lexeme, variable.ty, rhs_type
                        ),
                    );
                }
            }

            StmtKind::Block { body } => {
                for stmt in body {
                    self.check_statement(stmt, diags);
                }
            }

            StmtKind::If {
                condition,
                then_stmt,
                else_stmt,
            } => {
                self.check_condition(condition, scope, diags);
                self.check_statement(then_stmt, diags);
                if let Some(else_stmt) = else_stmt {
                    self.check_statement(else_stmt, diags);
                }
            }

            StmtKind::For { condition, body } => {
                self.check_condition(condition, scope, diags);
                self.check_statement(body, diags);
            }

            StmtKind::Expression { expr } => {
                self.check_expression(expr, scope, diags);
            }

            StmtKind::Return { exprs } => {
                let expected = match self.return_stack.last() {
                    Some(returns) => returns.clone(),
                    None => {
                        let line = exprs.first().map(|e| e.location.line).unwrap_or(0);
                        self.error(diags, line, "Return statement outside of a procedure");
                        return;
                    }
                };

                if exprs.len() != expected.len() {
                    let line = exprs.first().map(|e| e.location.line).unwrap_or(0);
                    self.error(
                        diags,
                        line,
                        &format!(
                            "Expected {} return values but got {}",
                            expected.len(),
                            exprs.len()
                        ),
                    );
                }

                for (index, (expr, want)) in exprs.iter().zip(expected.iter()).enumerate() {
                    let got = self.check_expression(expr, scope, diags);
                    if got != *want {
                        self.error(
                            diags,
                            expr.location.line,
                            &format!(
                                "Type mismatch on {} return value: expected {} but got {}",
                                ordinal_string(index + 1),
                                want,
                                got
                            ),
                        );
                    }
                }
            }

            StmtKind::Import { .. } => {}
        }
    }

    /// Conditions must be of a type convertible to boolean.
    fn check_condition(&mut self, condition: &Expr, scope: usize, diags: &mut Diagnostics) {
        let cond_type = self.check_expression(condition, scope, diags);
        if cond_type != TYPE_NONE && !cond_type.convertible_to_boolean() {
            self.error(
                diags,
                condition.location.line,
                &format!("Condition of type {} is not convertible to boolean", cond_type),
            );
        }
    }

    /// Type an expression. `TYPE_NONE` marks an already-reported failure.
    pub fn check_expression(
        &mut self,
        expr: &Expr,
        scope: usize,
        diags: &mut Diagnostics,
    ) -> TypeId {
        match &expr.kind {
            ExprKind::Literal { value } => value_type(value),

            ExprKind::Grouping { inner } => self.check_expression(inner, scope, diags),

            ExprKind::Variable { identifier, .. } => {
                match self.environments.lookup_variable(scope, &identifier.lexeme) {
                    Some(variable) => variable.ty,
                    // The resolver already reported the undeclared use.
                    None => TYPE_NONE,
                }
            }

            ExprKind::Binary {
                left,
                operator,
                right,
            } => {
                let left_type = self.check_expression(left, scope, diags);
                let right_type = self.check_expression(right, scope, diags);
                if left_type == TYPE_NONE || right_type == TYPE_NONE {
                    return TYPE_NONE;
                }

                if left_type != right_type {
                    let converted = implicit_convert(left_type, right_type);
                    if converted == TYPE_NONE {
                        self.error(
                            diags,
                            expr.location.line,
                            &format!(
                                "Types {} and {} are not implicitly convertible inside binary expression",
                                left_type, right_type
                            ),
                        );
                    }
                    return converted;
                }

                // Same type on both sides; enforce the operator's domain.
                match operator {
                    Operator::Plus
                    | Operator::Minus
                    | Operator::Mult
                    | Operator::Div
                    | Operator::Mod
                    | Operator::Less
                    | Operator::Greater
                    | Operator::LessEqual
                    | Operator::GreaterEqual => {
                        if !left_type.is_numeric() {
                            self.error(
                                diags,
                                expr.location.line,
                                &format!(
                                    "Can't use binary operator {} on given types: {} {}",
                                    operator, left_type, right_type
                                ),
                            );
                            return TYPE_NONE;
                        }
                        left_type
                    }
                    Operator::Or | Operator::And => {
                        if left_type != TYPE_BOOLEAN {
                            self.error(
                                diags,
                                expr.location.line,
                                &format!(
                                    "Can't use binary operator {} on given types: {} {}",
                                    operator, left_type, right_type
                                ),
                            );
                            return TYPE_NONE;
                        }
                        TYPE_BOOLEAN
                    }
                    Operator::Equals | Operator::NotEquals => left_type,
                    Operator::None | Operator::Not => {
                        unreachable!("unary operator in binary position cannot be on the tree")
                    }
                }
            }

            ExprKind::Unary { operator, operand } => {
                let operand_type = self.check_expression(operand, scope, diags);
                if operand_type == TYPE_NONE {
                    return TYPE_NONE;
                }

                match operator {
                    Operator::Minus => {
                        if !operand_type.is_numeric() {
                            self.error(
                                diags,
                                expr.location.line,
                                "Can't negate non-numeric type",
                            );
                            return TYPE_NONE;
                        }
                        operand_type
                    }
                    Operator::Not => {
                        if !operand_type.convertible_to_boolean() {
                            self.error(
                                diags,
                                expr.location.line,
                                &format!(
                                    "Can't cast type {} to boolean, you can't use unary not",
                                    operand_type
                                ),
                            );
                            return TYPE_NONE;
                        }
                        TYPE_BOOLEAN
                    }
                    other => unreachable!(
                        "operator {} cannot appear in unary position on the tree",
                        other
                    ),
                }
            }

            ExprKind::Call {
                callee, arguments, ..
            } => self.check_call(expr, callee, arguments, scope, diags),

            ExprKind::Member { .. } => {
                self.error(
                    diags,
                    expr.location.line,
                    "Structures are not implemented yet, member access cannot be typed",
                );
                TYPE_NONE
            }
        }
    }

    /// Type a call frame: the callee must name a procedure (or be a call
    /// that itself yields a procedure type), the argument count must equal
    /// the parameter count, and argument types must match pairwise. The
    /// call's type is the procedure's return type.
    fn check_call(
        &mut self,
        call: &Expr,
        callee: &Expr,
        arguments: &[Expr],
        scope: usize,
        diags: &mut Diagnostics,
    ) -> TypeId {
        match &callee.kind {
            ExprKind::Variable { identifier, .. } => {
                let Some(proc) = self
                    .environments
                    .lookup_procedure(scope, &identifier.lexeme)
                    .cloned()
                else {
                    // The resolver already reported the undeclared use.
                    return TYPE_NONE;
                };

                if arguments.len() != proc.parameters.len() {
                    self.error(
                        diags,
                        call.location.line,
                        &format!(
                            "Expected {} arguments but got {} in call to procedure {}",
                            proc.parameters.len(),
                            arguments.len(),
                            identifier.lexeme
                        ),
                    );
                }

                for (index, (argument, parameter)) in
                    arguments.iter().zip(proc.parameters.iter()).enumerate()
                {
                    let arg_type = self.check_expression(argument, scope, diags);
                    if arg_type != parameter.ty {
                        self.error(
                            diags,
                            argument.location.line,
                            &format!(
                                "Type mismatch on {} argument of the call to procedure {}: expected {} but got {}",
                                ordinal_string(index + 1),
                                identifier.lexeme,
                                parameter.ty,
                                arg_type
                            ),
                        );
                    }
                }
                // Arguments past the declared parameter list still get typed.
                for argument in arguments.iter().skip(proc.parameters.len()) {
                    self.check_expression(argument, scope, diags);
                }

                proc.return_type
            }

            ExprKind::Call { .. } => {
                // A chained call: the inner call must yield a procedure type.
                let inner_type = self.check_expression(callee, scope, diags);
                if !inner_type.is_procedure() {
                    self.error(
                        diags,
                        callee.location.line,
                        "The callee doesn't return a procedure in a call expression chain",
                    );
                    return TYPE_NONE;
                }
                for argument in arguments {
                    self.check_expression(argument, scope, diags);
                }
                // Typing through first-class procedure values needs the
                // procedure type table; nothing constructs one yet.
                TYPE_NONE
            }

            _ => {
                // The resolver already rejected non-procedure callees.
                for argument in arguments {
                    self.check_expression(argument, scope, diags);
                }
                TYPE_NONE
            }
        }
    }
}
