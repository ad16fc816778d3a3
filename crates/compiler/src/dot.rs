//! Graphviz output for expression trees
//!
//! Renders a parsed expression as a `digraph` with one node per expression
//! and parent-to-child edges, for inspection with the dot toolchain.

use crate::ast::{Expr, ExprKind};
use std::fmt::Write as _;
use std::path::Path;

/// Write the dot rendition of an expression tree to `path`.
pub fn expression_tree_to_dot(expr: &Expr, path: &Path) -> Result<(), String> {
    let text = expression_tree_dot_string(expr);
    std::fs::write(path, text)
        .map_err(|e| format!("Couldn't write dot file {}: {}", path.display(), e))
}

/// The dot source for an expression tree.
pub fn expression_tree_dot_string(expr: &Expr) -> String {
    let mut out = String::from("digraph ExprTree {\n");
    let mut next_id = 0usize;
    write_node(expr, None, &mut next_id, &mut out);
    out.push_str("}\n");
    out
}

fn write_node(expr: &Expr, parent: Option<usize>, next_id: &mut usize, out: &mut String) {
    let id = *next_id;
    *next_id += 1;

    let _ = writeln!(out, "  node{} [label=\"{}\"]", id, node_label(expr));
    if let Some(parent) = parent {
        let _ = writeln!(out, "  node{} -> node{}", parent, id);
    }

    match &expr.kind {
        ExprKind::Binary { left, right, .. } => {
            write_node(left, Some(id), next_id, out);
            write_node(right, Some(id), next_id, out);
        }
        ExprKind::Unary { operand, .. } => {
            write_node(operand, Some(id), next_id, out);
        }
        ExprKind::Grouping { inner } => {
            write_node(inner, Some(id), next_id, out);
        }
        ExprKind::Call {
            callee, arguments, ..
        } => {
            write_node(callee, Some(id), next_id, out);
            for argument in arguments {
                write_node(argument, Some(id), next_id, out);
            }
        }
        ExprKind::Member { object, .. } => {
            write_node(object, Some(id), next_id, out);
        }
        ExprKind::Variable { .. } | ExprKind::Literal { .. } => {}
    }
}

fn node_label(expr: &Expr) -> String {
    match &expr.kind {
        ExprKind::Binary { operator, .. } => format!("Binary {}", operator),
        ExprKind::Unary { operator, .. } => format!("Unary {}", operator),
        ExprKind::Grouping { .. } => "Grouping".to_string(),
        ExprKind::Variable { identifier, .. } => format!("Variable {}", identifier.lexeme),
        ExprKind::Literal { value } => format!("Literal {}", escape(&value.to_string())),
        ExprKind::Call { .. } => "Call".to_string(),
        ExprKind::Member { member, .. } => format!("Member .{}", member.lexeme),
    }
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}
