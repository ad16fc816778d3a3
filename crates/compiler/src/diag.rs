//! Diagnostic reporting
//!
//! User errors are accumulated and written to stderr as they are reported;
//! each compiler stage reports as many as it can and downstream stages are
//! gated on the error count. Panics are reserved for internal invariant
//! violations, never for user errors.
//!
//! Formats:
//! - errors:   `[line:<N>], <where>: <msg>`
//! - warnings: `WARNING: at line <N> <msg>`

use crate::token::{Token, TokenKind};

/// Per-compilation diagnostic sink.
///
/// Owned by the compilation session and passed into each stage; there is no
/// process-global state.
#[derive(Debug, Default)]
pub struct Diagnostics {
    errors: usize,
    warnings: usize,
    /// Suppress stderr output (used by tests and the REPL echo path).
    quiet: bool,
    /// Rendered lines, in report order.
    lines: Vec<String>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics::default()
    }

    pub fn quiet() -> Self {
        Diagnostics {
            quiet: true,
            ..Diagnostics::default()
        }
    }

    pub fn error_count(&self) -> usize {
        self.errors
    }

    pub fn warning_count(&self) -> usize {
        self.warnings
    }

    pub fn had_error(&self) -> bool {
        self.errors > 0
    }

    /// Every diagnostic line reported so far, in order.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn error(&mut self, line: usize, msg: &str) {
        self.report_error(line, "", msg);
    }

    pub fn error_where(&mut self, line: usize, location: &str, msg: &str) {
        self.report_error(line, location, msg);
    }

    /// Error anchored on a token; END tokens report "at end".
    pub fn error_token(&mut self, token: &Token, msg: &str) {
        if token.kind == TokenKind::End {
            self.report_error(token.line, "at end", msg);
        } else {
            let location = format!("at {}", token.lexeme);
            self.report_error(token.line, &location, msg);
        }
    }

    pub fn warning(&mut self, line: usize, msg: &str) {
        self.warnings += 1;
        let rendered = format!("WARNING: at line {} {}", line, msg);
        if !self.quiet {
            eprintln!("{}", rendered);
        }
        self.lines.push(rendered);
    }

    fn report_error(&mut self, line: usize, location: &str, msg: &str) {
        self.errors += 1;
        let rendered = format!("[line:{}], {}: {}", line, location, msg);
        if !self.quiet {
            eprintln!("{}", rendered);
        }
        self.lines.push(rendered);
    }
}
