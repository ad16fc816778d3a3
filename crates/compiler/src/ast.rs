//! Abstract syntax tree for Mica
//!
//! Expressions and statements are sum types with the source location in a
//! common header. The tree is owned by the compilation session and outlives
//! every stage; cross-references between statements and scopes go through
//! environment indices, never through pointers.

use crate::token::{Operator, Token, Value};
use crate::types::TypeId;
use std::fmt::Write as _;

/// Source position carried by every expression node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    /// 1-based source line.
    pub line: usize,
    /// Byte offset into the source.
    pub offset: usize,
}

impl Location {
    pub fn new(line: usize, offset: usize) -> Self {
        Location { line, offset }
    }
}

/// An expression: a variant plus the location header.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Binary {
        left: Box<Expr>,
        operator: Operator,
        right: Box<Expr>,
    },
    Unary {
        operator: Operator,
        operand: Box<Expr>,
    },
    Grouping {
        inner: Box<Expr>,
    },
    /// A variable reference. `var_id` is 0 until the resolver binds it.
    Variable {
        identifier: Token,
        var_id: u32,
    },
    Literal {
        value: Value,
    },
    /// A call. The callee is a chain terminating in a variable expression
    /// naming the procedure; `proc_id` is 0 until the resolver binds it.
    Call {
        callee: Box<Expr>,
        arguments: Vec<Expr>,
        proc_id: u32,
    },
    /// Member access; structure semantics are not implemented yet.
    Member {
        object: Box<Expr>,
        member: Token,
    },
}

impl Expr {
    pub fn new(kind: ExprKind, location: Location) -> Self {
        Expr { kind, location }
    }

    pub fn literal(value: Value, location: Location) -> Self {
        Expr::new(ExprKind::Literal { value }, location)
    }
}

/// A variable declaration head: name and declared type. Used both by `var`
/// statements and by procedure parameter/return lists.
#[derive(Debug, Clone, PartialEq)]
pub struct DeclVar {
    pub name: Option<Token>,
    pub ty: TypeId,
}

/// A statement: a variant plus the index of the environment it was declared
/// in (stamped by the resolver; 0 refers to the global environment).
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub scope: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    DeclVar {
        decl: DeclVar,
        initializer: Option<Expr>,
        var_id: u32,
    },
    DeclProc {
        name: Token,
        parameters: Vec<DeclVar>,
        returns: Vec<DeclVar>,
        body: Vec<Stmt>,
        proc_id: u32,
    },
    If {
        condition: Expr,
        then_stmt: Box<Stmt>,
        else_stmt: Option<Box<Stmt>>,
    },
    /// A while-style loop spelled with the `for` keyword: condition, body.
    For {
        condition: Expr,
        body: Box<Stmt>,
    },
    Assign {
        target: Token,
        rhs: Expr,
        var_id: u32,
    },
    Block {
        body: Vec<Stmt>,
    },
    Expression {
        expr: Expr,
    },
    Import {
        module: Token,
    },
    Return {
        exprs: Vec<Expr>,
    },
}

impl Stmt {
    pub fn new(kind: StmtKind) -> Self {
        Stmt { kind, scope: 0 }
    }
}

/// Render an expression back to source-like text. Used by the C emitter and
/// by diagnostics.
pub fn expr_source_string(expr: &Expr) -> String {
    let mut out = String::new();
    write_expr_source(expr, &mut out);
    out
}

fn write_expr_source(expr: &Expr, out: &mut String) {
    match &expr.kind {
        ExprKind::Binary {
            left,
            operator,
            right,
        } => {
            write_expr_source(left, out);
            let _ = write!(out, " {} ", operator);
            write_expr_source(right, out);
        }
        ExprKind::Unary { operator, operand } => {
            let _ = write!(out, "{}", operator);
            write_expr_source(operand, out);
        }
        ExprKind::Grouping { inner } => {
            out.push('(');
            write_expr_source(inner, out);
            out.push(')');
        }
        ExprKind::Variable { identifier, .. } => out.push_str(&identifier.lexeme),
        ExprKind::Literal { value } => {
            let _ = write!(out, "{}", value);
        }
        ExprKind::Call {
            callee, arguments, ..
        } => {
            write_expr_source(callee, out);
            out.push('(');
            for (i, argument) in arguments.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr_source(argument, out);
            }
            out.push(')');
        }
        ExprKind::Member { object, member } => {
            write_expr_source(object, out);
            out.push('.');
            out.push_str(&member.lexeme);
        }
    }
}

/// Render an expression as an indented tree, one node per line.
pub fn expr_tree_string(expr: &Expr) -> String {
    let mut out = String::new();
    write_expr_tree(expr, 0, &mut out);
    out
}

fn write_expr_tree(expr: &Expr, depth: usize, out: &mut String) {
    let indent = "\t".repeat(depth);
    match &expr.kind {
        ExprKind::Binary {
            left,
            operator,
            right,
        } => {
            let _ = writeln!(out, "{}Binary expression, operator {}", indent, operator);
            write_expr_tree(left, depth + 1, out);
            write_expr_tree(right, depth + 1, out);
        }
        ExprKind::Unary { operator, operand } => {
            let _ = writeln!(out, "{}Unary expression, operator {}", indent, operator);
            write_expr_tree(operand, depth + 1, out);
        }
        ExprKind::Grouping { inner } => {
            let _ = writeln!(out, "{}Grouping expression", indent);
            write_expr_tree(inner, depth + 1, out);
        }
        ExprKind::Variable { identifier, var_id } => {
            let _ = writeln!(
                out,
                "{}Variable expression: {} (id {})",
                indent, identifier.lexeme, var_id
            );
        }
        ExprKind::Literal { value } => {
            let _ = writeln!(out, "{}Literal: {}", indent, value);
        }
        ExprKind::Call {
            callee,
            arguments,
            proc_id,
        } => {
            let _ = writeln!(out, "{}Call expression (proc id {})", indent, proc_id);
            write_expr_tree(callee, depth + 1, out);
            for argument in arguments {
                write_expr_tree(argument, depth + 1, out);
            }
        }
        ExprKind::Member { object, member } => {
            let _ = writeln!(out, "{}Member expression: .{}", indent, member.lexeme);
            write_expr_tree(object, depth + 1, out);
        }
    }
}

/// Render a whole program as an indented statement tree.
pub fn program_tree_string(program: &[Stmt], name: &str) -> String {
    let mut out = format!(
        "Ast of the program {}\nProgram has {} top level statements\n",
        name,
        program.len()
    );
    for stmt in program {
        write_stmt_tree(stmt, 0, &mut out);
    }
    out
}

fn write_stmt_tree(stmt: &Stmt, depth: usize, out: &mut String) {
    let indent = "\t".repeat(depth);
    match &stmt.kind {
        StmtKind::DeclVar {
            decl,
            initializer,
            var_id,
        } => {
            let name = decl
                .name
                .as_ref()
                .map(|t| t.lexeme.as_str())
                .unwrap_or("(unnamed)");
            let _ = writeln!(
                out,
                "{}Variable declaration: {} : {} (id {})",
                indent, name, decl.ty, var_id
            );
            if let Some(init) = initializer {
                write_expr_tree(init, depth + 1, out);
            }
        }
        StmtKind::DeclProc {
            name,
            parameters,
            returns,
            body,
            proc_id,
        } => {
            let _ = writeln!(
                out,
                "{}Procedure declaration: {} ({} parameters, {} returns, id {})",
                indent,
                name.lexeme,
                parameters.len(),
                returns.len(),
                proc_id
            );
            for stmt in body {
                write_stmt_tree(stmt, depth + 1, out);
            }
        }
        StmtKind::If {
            condition,
            then_stmt,
            else_stmt,
        } => {
            let _ = writeln!(out, "{}If statement", indent);
            write_expr_tree(condition, depth + 1, out);
            write_stmt_tree(then_stmt, depth + 1, out);
            if let Some(else_stmt) = else_stmt {
                let _ = writeln!(out, "{}Else", indent);
                write_stmt_tree(else_stmt, depth + 1, out);
            }
        }
        StmtKind::For { condition, body } => {
            let _ = writeln!(out, "{}For statement", indent);
            write_expr_tree(condition, depth + 1, out);
            write_stmt_tree(body, depth + 1, out);
        }
        StmtKind::Assign {
            target,
            rhs,
            var_id,
        } => {
            let _ = writeln!(
                out,
                "{}Assignment to {} (id {})",
                indent, target.lexeme, var_id
            );
            write_expr_tree(rhs, depth + 1, out);
        }
        StmtKind::Block { body } => {
            let _ = writeln!(out, "{}Block", indent);
            for stmt in body {
                write_stmt_tree(stmt, depth + 1, out);
            }
        }
        StmtKind::Expression { expr } => {
            let _ = writeln!(out, "{}Expression statement", indent);
            write_expr_tree(expr, depth + 1, out);
        }
        StmtKind::Import { module } => {
            let _ = writeln!(out, "{}Import: {}", indent, module.lexeme);
        }
        StmtKind::Return { exprs } => {
            let _ = writeln!(out, "{}Return ({} expressions)", indent, exprs.len());
            for expr in exprs {
                write_expr_tree(expr, depth + 1, out);
            }
        }
    }
}
