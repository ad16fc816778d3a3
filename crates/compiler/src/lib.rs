//! Mica compiler library
//!
//! Front-end pipeline for the Mica language: source text is lexed, parsed
//! (with constant folding), name resolved, type checked, and translated to
//! three-address IR. Bytecode for the Mica VM lives in the `mica-vm` crate;
//! the IR-to-bytecode emitter is not implemented yet.
//!
//! Each stage reports user errors into a [`diag::Diagnostics`] sink and
//! downstream stages only run when the previous stage finished clean:
//!
//! ```rust
//! use micac::diag::Diagnostics;
//!
//! let mut diags = Diagnostics::new();
//! let compilation = micac::compile_source("var x : int = 3;\nx = x + 4;", &mut diags);
//! assert!(compilation.is_some());
//! assert_eq!(diags.error_count(), 0);
//! ```

pub mod ast;
pub mod c_emitter;
pub mod config;
pub mod diag;
pub mod dot;
pub mod fold;
pub mod ir;
pub mod lexer;
pub mod parser;
pub mod resolver;
pub mod scope;
pub mod token;
pub mod typechecker;
pub mod types;

pub use ast::{Expr, Stmt};
pub use config::CompilerConfig;
pub use diag::Diagnostics;
pub use parser::Parser;
pub use resolver::Resolver;
pub use scope::Environments;
pub use typechecker::TypeChecker;

use tracing::info;

/// The product of a successful front-end run.
pub struct Compilation {
    pub program: Vec<Stmt>,
    pub environments: Environments,
}

/// Run the full front-end pipeline on a source string.
///
/// Returns `None` as soon as a stage reports errors; the diagnostics sink
/// holds everything that was reported.
pub fn compile_source(source: &str, diags: &mut Diagnostics) -> Option<Compilation> {
    let (tokens, lex_error) = lexer::lex(source, diags);
    if lex_error {
        return None;
    }

    let mut parser = Parser::new(tokens);
    let (mut program, parse_error) = parser.parse(diags);
    if parse_error {
        return None;
    }

    let (environments, resolve_ok) = Resolver::new().resolve(&mut program, diags);
    if !resolve_ok {
        return None;
    }

    let mut checker = TypeChecker::new(&environments);
    if !checker.check_program(&program, diags) {
        return None;
    }

    info!("front-end pipeline finished clean");
    Some(Compilation {
        program,
        environments,
    })
}

/// Parse a single expression (the REPL path). The expression is constant
/// folded; names are not resolved.
pub fn parse_single_expression(source: &str, diags: &mut Diagnostics) -> Option<Expr> {
    let (tokens, lex_error) = lexer::lex(source, diags);
    if lex_error {
        return None;
    }
    let mut parser = Parser::new(tokens);
    parser.parse_expression(diags)
}

/// Built-in type checker battery, wired to `micac --test-typecheck`.
///
/// Compiles a handful of snippets that must pass and a handful that must
/// fail with a specific message.
pub fn run_typecheck_self_tests() -> Result<(), String> {
    let accepted = [
        "var x : int = 3;\nx = x + 4;",
        "proc f(a : int) int { return a; }\nvar y : int = f(1);",
        "var b : float = 1.5;\nb = b * 2.0;",
        "var t : string = \"text\";\nif 1 == 1 { t = \"other\"; }",
    ];

    let rejected = [
        ("var x : int = 2.5;", "initializer is of type float"),
        ("var x : int = 1;\nx = 2.5;", "don't match"),
        (
            "proc f(a : int) int { return a; }\nvar y : int = f(1.5);",
            "1st argument",
        ),
        ("proc f() int { return 1, 2; }", "return values"),
    ];

    for source in accepted {
        let mut diags = Diagnostics::quiet();
        if compile_source(source, &mut diags).is_none() {
            return Err(format!(
                "expected {:?} to type check, got: {}",
                source,
                diags.lines().join("; ")
            ));
        }
    }

    for (source, expected) in rejected {
        let mut diags = Diagnostics::quiet();
        if compile_source(source, &mut diags).is_some() {
            return Err(format!("expected {:?} to be rejected", source));
        }
        if !diags.lines().iter().any(|l| l.contains(expected)) {
            return Err(format!(
                "expected {:?} to fail with {:?}, got: {}",
                source,
                expected,
                diags.lines().join("; ")
            ));
        }
    }

    println!("type checker self-tests passed");
    Ok(())
}
