//! Partial C transpiler
//!
//! Quick-prototyping backend that renders the statement tree as C. Coverage
//! is deliberately partial: declarations, procedures, assignments, `if`,
//! `for` (as `while`) and expression statements translate; returns and
//! imports emit placeholder comments. Multi-value returns would need
//! generated typedefs and have none yet.

use crate::ast::{expr_source_string, Stmt, StmtKind};
use std::io::{self, Write};

/// Write a C rendition of the program.
pub fn output_c_code(program: &[Stmt], output: &mut dyn Write) -> io::Result<()> {
    writeln!(output, "#include <stdlib.h>")?;
    writeln!(output, "#include <stdio.h>")?;
    writeln!(output, "#include <string.h>")?;

    for stmt in program {
        translate_statement(stmt, output)?;
    }
    Ok(())
}

fn c_type_name(ty: crate::types::TypeId) -> &'static str {
    use crate::types::{TYPE_BOOLEAN, TYPE_FLOAT, TYPE_INT, TYPE_STRING};
    match ty {
        TYPE_INT => "long",
        TYPE_FLOAT => "double",
        TYPE_STRING => "const char*",
        TYPE_BOOLEAN => "int",
        _ => "void",
    }
}

fn translate_statement(stmt: &Stmt, output: &mut dyn Write) -> io::Result<()> {
    match &stmt.kind {
        StmtKind::DeclVar {
            decl, initializer, ..
        } => {
            let name = decl
                .name
                .as_ref()
                .map(|t| t.lexeme.as_str())
                .unwrap_or("_unnamed");
            write!(output, "{} {}", c_type_name(decl.ty), name)?;
            if let Some(initializer) = initializer {
                write!(output, " = {}", expr_source_string(initializer))?;
            }
            writeln!(output, ";")?;
        }

        StmtKind::DeclProc {
            name,
            parameters,
            returns,
            body,
            ..
        } => {
            let return_type = returns
                .first()
                .map(|r| c_type_name(r.ty))
                .unwrap_or("void");
            write!(output, "{} {}(", return_type, name.lexeme)?;
            for (i, param) in parameters.iter().enumerate() {
                if i > 0 {
                    write!(output, ", ")?;
                }
                let param_name = param
                    .name
                    .as_ref()
                    .map(|t| t.lexeme.as_str())
                    .unwrap_or("_param");
                write!(output, "{} {}", c_type_name(param.ty), param_name)?;
            }
            writeln!(output, ") {{")?;
            for stmt in body {
                translate_statement(stmt, output)?;
            }
            writeln!(output, "}}")?;
        }

        StmtKind::Assign { target, rhs, .. } => {
            writeln!(output, "{} = {};", target.lexeme, expr_source_string(rhs))?;
        }

        StmtKind::Block { body } => {
            writeln!(output, "{{")?;
            for stmt in body {
                translate_statement(stmt, output)?;
            }
            writeln!(output, "}}")?;
        }

        StmtKind::If {
            condition,
            then_stmt,
            else_stmt,
        } => {
            writeln!(output, "if ({}) {{", expr_source_string(condition))?;
            translate_statement(then_stmt, output)?;
            writeln!(output, "}}")?;
            if let Some(else_stmt) = else_stmt {
                writeln!(output, "else {{")?;
                translate_statement(else_stmt, output)?;
                writeln!(output, "}}")?;
            }
        }

        StmtKind::For { condition, body } => {
            writeln!(output, "while ({}) {{", expr_source_string(condition))?;
            translate_statement(body, output)?;
            writeln!(output, "}}")?;
        }

        StmtKind::Expression { expr } => {
            writeln!(output, "{};", expr_source_string(expr))?;
        }

        StmtKind::Import { module } => {
            // The import system has no C translation yet.
            writeln!(output, "/* import {} */", module.lexeme)?;
        }

        StmtKind::Return { exprs } => {
            // Multi-value returns need generated typedefs; not implemented.
            if let Some(first) = exprs.first() {
                writeln!(output, "/* return {} */", expr_source_string(first))?;
            }
        }
    }

    Ok(())
}
