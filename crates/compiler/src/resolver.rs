//! Name resolution for Mica
//!
//! Two passes over the statement tree:
//!
//! 1. **Collection** walks statements in order, builds the environment tree
//!    and binds every declaration, assigning per-scope ids. Procedure bodies
//!    are collected inside a fresh child environment; blocks open child
//!    environments of their own; `if`/`for` recurse without one.
//! 2. **Reference resolution** visits every expression and binds variable
//!    and call nodes to the ids of their declarations, walking the parent
//!    chain from the statement's scope. Misses are reported as undeclared
//!    uses.
//!
//! After a successful resolve no variable or call node carries id 0.

use crate::ast::{Expr, ExprKind, Stmt, StmtKind};
use crate::diag::Diagnostics;
use crate::scope::{Environments, Procedure, GLOBAL_SCOPE};
use crate::types::TYPE_NONE;
use tracing::debug;

pub struct Resolver {
    environments: Environments,
    current_environment: usize,
    success: bool,
}

impl Resolver {
    pub fn new() -> Self {
        Resolver {
            environments: Environments::new(),
            current_environment: GLOBAL_SCOPE,
            success: true,
        }
    }

    /// Resolve a program in place. Returns the environment table and
    /// whether resolution succeeded without errors.
    pub fn resolve(
        mut self,
        program: &mut [Stmt],
        diags: &mut Diagnostics,
    ) -> (Environments, bool) {
        for stmt in program.iter_mut() {
            self.collect_declaration(stmt);
        }
        for stmt in program.iter_mut() {
            self.resolve_reference(stmt, diags);
        }

        debug!(
            environments = self.environments.len(),
            success = self.success,
            "resolved program"
        );
        (self.environments, self.success)
    }

    // ------------------------------------------------------------------
    // Pass 1: collect declarations
    // ------------------------------------------------------------------

    fn collect_declaration(&mut self, stmt: &mut Stmt) {
        stmt.scope = self.current_environment;

        match &mut stmt.kind {
            StmtKind::DeclVar { decl, var_id, .. } => {
                let name = decl
                    .name
                    .as_ref()
                    .expect("variable declarations are always named")
                    .lexeme
                    .clone();
                *var_id = self
                    .environments
                    .get_mut(self.current_environment)
                    .bind_variable(&name, decl.ty);
            }

            StmtKind::DeclProc {
                name,
                parameters,
                returns,
                body,
                proc_id,
            } => {
                let enclosing = self.current_environment;
                let proc_scope = self.environments.push_child(enclosing);
                self.current_environment = proc_scope;

                for stmt in body.iter_mut() {
                    self.collect_declaration(stmt);
                }

                // Parameters bind into the procedure scope after the body
                // declarations, matching the collection order of the ids.
                let mut parameter_vars = Vec::with_capacity(parameters.len());
                for param in parameters.iter() {
                    let param_name = param
                        .name
                        .as_ref()
                        .expect("parameters are always named")
                        .lexeme
                        .clone();
                    let var_id = self
                        .environments
                        .get_mut(proc_scope)
                        .bind_variable(&param_name, param.ty);
                    parameter_vars.push(crate::scope::Variable {
                        var_id,
                        ty: param.ty,
                    });
                }

                self.current_environment = enclosing;

                let proc = Procedure {
                    proc_id: 0, // assigned by the environment
                    scope: proc_scope,
                    parameters: parameter_vars,
                    return_type: returns.first().map(|r| r.ty).unwrap_or(TYPE_NONE),
                    returns: returns.iter().map(|r| r.ty).collect(),
                    is_nested: enclosing > 1,
                };
                *proc_id = self
                    .environments
                    .get_mut(enclosing)
                    .bind_procedure(&name.lexeme, proc);
            }

            StmtKind::If {
                then_stmt,
                else_stmt,
                ..
            } => {
                self.collect_declaration(then_stmt);
                if let Some(else_stmt) = else_stmt {
                    self.collect_declaration(else_stmt);
                }
            }

            StmtKind::For { body, .. } => {
                self.collect_declaration(body);
            }

            StmtKind::Block { body } => {
                let enclosing = self.current_environment;
                self.current_environment = self.environments.push_child(enclosing);

                for stmt in body.iter_mut() {
                    self.collect_declaration(stmt);
                }

                self.current_environment = enclosing;
            }

            // Statements that contain no other statements.
            StmtKind::Assign { .. }
            | StmtKind::Expression { .. }
            | StmtKind::Import { .. }
            | StmtKind::Return { .. } => {}
        }
    }

    // ------------------------------------------------------------------
    // Pass 2: resolve references
    // ------------------------------------------------------------------

    fn resolve_reference(&mut self, stmt: &mut Stmt, diags: &mut Diagnostics) {
        let scope = stmt.scope;

        match &mut stmt.kind {
            StmtKind::DeclVar { initializer, .. } => {
                if let Some(initializer) = initializer {
                    Self::resolve_expression(
                        &self.environments,
                        &mut self.success,
                        initializer,
                        scope,
                        diags,
                    );
                }
            }

            StmtKind::DeclProc { body, .. } => {
                for stmt in body.iter_mut() {
                    self.resolve_reference(stmt, diags);
                }
            }

            StmtKind::If {
                condition,
                then_stmt,
                else_stmt,
            } => {
                Self::resolve_expression(
                    &self.environments,
                    &mut self.success,
                    condition,
                    scope,
                    diags,
                );
                self.resolve_reference(then_stmt, diags);
                if let Some(else_stmt) = else_stmt {
                    self.resolve_reference(else_stmt, diags);
                }
            }

            StmtKind::For { condition, body } => {
                Self::resolve_expression(
                    &self.environments,
                    &mut self.success,
                    condition,
                    scope,
                    diags,
                );
                self.resolve_reference(body, diags);
            }

            StmtKind::Block { body } => {
                for stmt in body.iter_mut() {
                    self.resolve_reference(stmt, diags);
                }
            }

            StmtKind::Expression { expr } => {
                Self::resolve_expression(&self.environments, &mut self.success, expr, scope, diags);
            }

            StmtKind::Assign {
                target,
                rhs,
                var_id,
            } => {
                Self::resolve_expression(&self.environments, &mut self.success, rhs, scope, diags);

                match self.environments.lookup_variable(scope, &target.lexeme) {
                    Some(variable) => *var_id = variable.var_id,
                    None => {
                        diags.error(
                            target.line,
                            &format!("Use of undeclared variable {}", target.lexeme),
                        );
                        self.success = false;
                    }
                }
            }

            StmtKind::Import { .. } => {
                // Module resolution has no semantics yet.
            }

            StmtKind::Return { exprs } => {
                for expr in exprs.iter_mut() {
                    Self::resolve_expression(
                        &self.environments,
                        &mut self.success,
                        expr,
                        scope,
                        diags,
                    );
                }
            }
        }
    }

    /// Visit an expression, binding variable and call ids.
    fn resolve_expression(
        environments: &Environments,
        success: &mut bool,
        expr: &mut Expr,
        scope: usize,
        diags: &mut Diagnostics,
    ) {
        match &mut expr.kind {
            ExprKind::Binary { left, right, .. } => {
                Self::resolve_expression(environments, success, left, scope, diags);
                Self::resolve_expression(environments, success, right, scope, diags);
            }
            ExprKind::Unary { operand, .. } => {
                Self::resolve_expression(environments, success, operand, scope, diags);
            }
            ExprKind::Grouping { inner } => {
                Self::resolve_expression(environments, success, inner, scope, diags);
            }
            ExprKind::Variable { identifier, var_id } => {
                match environments.lookup_variable(scope, &identifier.lexeme) {
                    Some(variable) => *var_id = variable.var_id,
                    None => {
                        diags.error(
                            identifier.line,
                            &format!("Use of undeclared variable {}", identifier.lexeme),
                        );
                        *success = false;
                    }
                }
            }
            ExprKind::Literal { .. } => {}
            ExprKind::Call {
                callee,
                arguments,
                proc_id,
            } => {
                for argument in arguments.iter_mut() {
                    Self::resolve_expression(environments, success, argument, scope, diags);
                }

                // The callee chain terminates in the variable expression
                // naming the procedure; every frame of the chain gets the
                // resolved id.
                *proc_id =
                    Self::resolve_callee(environments, success, callee, scope, diags);
            }
            ExprKind::Member { object, .. } => {
                // Structure member lookup is deferred; only the left side
                // resolves.
                Self::resolve_expression(environments, success, object, scope, diags);
            }
        }
    }

    /// Resolve a call's callee chain, returning the procedure id (0 when
    /// unresolved, with an error already reported).
    fn resolve_callee(
        environments: &Environments,
        success: &mut bool,
        callee: &mut Expr,
        scope: usize,
        diags: &mut Diagnostics,
    ) -> u32 {
        match &mut callee.kind {
            ExprKind::Variable { identifier, .. } => {
                match environments.lookup_procedure(scope, &identifier.lexeme) {
                    Some(proc) => proc.proc_id,
                    None => {
                        diags.error(
                            identifier.line,
                            &format!("Use of undeclared procedure {}", identifier.lexeme),
                        );
                        *success = false;
                        0
                    }
                }
            }
            ExprKind::Call {
                callee: inner,
                arguments,
                proc_id,
            } => {
                for argument in arguments.iter_mut() {
                    Self::resolve_expression(environments, success, argument, scope, diags);
                }
                *proc_id = Self::resolve_callee(environments, success, inner, scope, diags);
                *proc_id
            }
            _ => {
                diags.error(
                    callee.location.line,
                    "Procedure calls through member access are not supported yet",
                );
                *success = false;
                Self::resolve_expression(environments, success, callee, scope, diags);
                0
            }
        }
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::parser::Parser;
    use crate::types::TYPE_INT;

    fn resolve_program(source: &str) -> (Vec<Stmt>, Environments, bool, Diagnostics) {
        let mut diags = Diagnostics::quiet();
        let (tokens, lex_error) = lex(source, &mut diags);
        assert!(!lex_error, "lexing {:?} failed", source);
        let mut parser = Parser::new(tokens);
        let (mut stmts, parse_error) = parser.parse(&mut diags);
        assert!(!parse_error, "parsing {:?} failed: {:?}", source, diags.lines());
        let (environments, success) = Resolver::new().resolve(&mut stmts, &mut diags);
        (stmts, environments, success, diags)
    }

    #[test]
    fn test_declaration_and_assignment_share_ids() {
        let (stmts, _, success, diags) = resolve_program("var x : int = 3;\nx = x + 4;");
        assert!(success, "{:?}", diags.lines());
        assert_eq!(diags.error_count(), 0);

        let decl_id = match &stmts[0].kind {
            StmtKind::DeclVar { var_id, .. } => *var_id,
            other => panic!("expected DeclVar, got {:?}", other),
        };
        assert_ne!(decl_id, 0);

        match &stmts[1].kind {
            StmtKind::Assign { var_id, rhs, .. } => {
                assert_eq!(*var_id, decl_id);
                match &rhs.kind {
                    ExprKind::Binary { left, .. } => match &left.kind {
                        ExprKind::Variable { var_id, .. } => assert_eq!(*var_id, decl_id),
                        other => panic!("expected Variable, got {:?}", other),
                    },
                    other => panic!("expected Binary, got {:?}", other),
                }
            }
            other => panic!("expected Assign, got {:?}", other),
        }
    }

    #[test]
    fn test_undeclared_variable_reports_error() {
        let (_, _, success, diags) = resolve_program("var x : int = y;");
        assert!(!success);
        assert_eq!(diags.error_count(), 1);
        assert!(diags.lines()[0].contains("Use of undeclared variable y"));
    }

    #[test]
    fn test_undeclared_procedure_reports_error() {
        let (_, _, success, diags) = resolve_program("missing(1);");
        assert!(!success);
        assert!(diags.lines()[0].contains("Use of undeclared procedure missing"));
    }

    #[test]
    fn test_call_resolves_procedure_and_arguments() {
        let source = "var a : int = 1;\nproc f(x : int) int { return x; }\nf(a);";
        let (stmts, _, success, diags) = resolve_program(source);
        assert!(success, "{:?}", diags.lines());

        match &stmts[2].kind {
            StmtKind::Expression { expr } => match &expr.kind {
                ExprKind::Call {
                    proc_id, arguments, ..
                } => {
                    assert_ne!(*proc_id, 0);
                    match &arguments[0].kind {
                        ExprKind::Variable { var_id, .. } => assert_ne!(*var_id, 0),
                        other => panic!("expected Variable argument, got {:?}", other),
                    }
                }
                other => panic!("expected Call, got {:?}", other),
            },
            other => panic!("expected Expression, got {:?}", other),
        }
    }

    #[test]
    fn test_procedure_body_binds_into_procedure_scope() {
        let source = "proc f() { var local : int = 1; local = 2; }";
        let (stmts, environments, success, _) = resolve_program(source);
        assert!(success);

        // Global scope holds the procedure, not the local.
        assert_eq!(environments.get(GLOBAL_SCOPE).variable_count(), 0);
        assert_eq!(environments.get(GLOBAL_SCOPE).procedure_count(), 1);

        match &stmts[0].kind {
            StmtKind::DeclProc { body, .. } => {
                // Body statements were collected in the procedure scope.
                assert_ne!(body[0].scope, GLOBAL_SCOPE);
            }
            other => panic!("expected DeclProc, got {:?}", other),
        }
    }

    #[test]
    fn test_parameters_are_visible_in_body() {
        let source = "proc double(n : int) int { return n + n; }";
        let (_, _, success, diags) = resolve_program(source);
        assert!(success, "{:?}", diags.lines());
    }

    #[test]
    fn test_block_opens_child_environment() {
        let source = "var outer : int = 1;\n{ var inner : int = 2; inner = outer; }";
        let (stmts, environments, success, _) = resolve_program(source);
        assert!(success);
        assert_eq!(environments.len(), 2);

        match &stmts[1].kind {
            StmtKind::Block { body } => assert_ne!(body[0].scope, GLOBAL_SCOPE),
            other => panic!("expected Block, got {:?}", other),
        }
    }

    #[test]
    fn test_inner_scope_sees_outer_variable() {
        let source = "var x : int = 1;\nif x == 1 { x = 2; }";
        let (_, _, success, diags) = resolve_program(source);
        assert!(success, "{:?}", diags.lines());
    }

    #[test]
    fn test_environment_parents_form_a_tree_rooted_at_global() {
        let source = "proc f() { { var a : int; } }\n{ var b : int; }";
        let (_, environments, success, _) = resolve_program(source);
        assert!(success);
        assert!(environments.get(GLOBAL_SCOPE).parent.is_none());
        for index in 1..environments.len() {
            let mut current = index;
            let mut hops = 0;
            while let Some(parent) = environments.get(current).parent {
                current = parent;
                hops += 1;
                assert!(hops <= environments.len(), "parent chain must not cycle");
            }
            assert_eq!(current, GLOBAL_SCOPE);
        }
    }

    #[test]
    fn test_nested_procedure_flag() {
        let source = "proc outer() { proc mid() { proc inner() { } } }";
        let (_, environments, success, _) = resolve_program(source);
        assert!(success);

        let outer = environments
            .lookup_procedure(GLOBAL_SCOPE, "outer")
            .expect("outer resolves");
        assert!(!outer.is_nested);

        // One level down the enclosing environment index is still 1, so the
        // flag stays clear; only procedures deeper than that are nested.
        let mid = environments
            .lookup_procedure(outer.scope, "mid")
            .expect("mid resolves");
        assert!(!mid.is_nested);

        let inner = environments
            .lookup_procedure(mid.scope, "inner")
            .expect("inner resolves");
        assert!(inner.is_nested);
    }

    #[test]
    fn test_variable_ids_count_per_scope() {
        let (_, environments, success, _) =
            resolve_program("var a : int;\nvar b : int;\nvar c : int;");
        assert!(success);
        let global = environments.get(GLOBAL_SCOPE);
        assert_eq!(global.variable_count(), 3);
        assert_eq!(global.variable("a").unwrap().var_id, 1);
        assert_eq!(global.variable("c").unwrap().var_id, 3);
        assert_eq!(global.variable("a").unwrap().ty, TYPE_INT);
    }

    #[test]
    fn test_procedure_return_type_recorded() {
        let source = "proc f() int { return 1; }";
        let (_, environments, success, _) = resolve_program(source);
        assert!(success);
        let f = environments.lookup_procedure(GLOBAL_SCOPE, "f").unwrap();
        assert_eq!(f.return_type, TYPE_INT);
        assert_eq!(f.returns, vec![TYPE_INT]);
    }
}
