//! Cross-stage scenarios: lex, parse, resolve and type check together.

use micac::ast::{ExprKind, StmtKind};
use micac::diag::Diagnostics;
use micac::token::Value;
use micac::{compile_source, parse_single_expression};

#[test]
fn test_var_and_assignment_end_to_end() {
    let mut diags = Diagnostics::quiet();
    let compilation = compile_source("var x : int = 3;\nx = x + 4;", &mut diags)
        .expect("program compiles clean");

    assert_eq!(diags.error_count(), 0);
    assert_eq!(diags.warning_count(), 0);

    let decl_id = match &compilation.program[0].kind {
        StmtKind::DeclVar { var_id, .. } => *var_id,
        other => panic!("expected DeclVar, got {:?}", other),
    };

    // The assignment's target id equals the declaration's assigned id.
    match &compilation.program[1].kind {
        StmtKind::Assign { var_id, .. } => assert_eq!(*var_id, decl_id),
        other => panic!("expected Assign, got {:?}", other),
    }
}

#[test]
fn test_undeclared_variable_reports_one_error() {
    let mut diags = Diagnostics::quiet();
    assert!(compile_source("var x : int = y;", &mut diags).is_none());

    assert_eq!(diags.error_count(), 1);
    assert!(diags.lines()[0].contains("Use of undeclared variable y"));
}

#[test]
fn test_constant_folding_end_to_end() {
    let mut diags = Diagnostics::quiet();
    let expr = parse_single_expression("1 + 2 * 3", &mut diags).expect("expression parses");

    match expr.kind {
        ExprKind::Literal { value } => assert_eq!(value, Value::Integer(7)),
        other => panic!("expected a single folded literal, got {:?}", other),
    }
}

#[test]
fn test_larger_program_compiles_clean() {
    let source = "\
var total : int = 0;
var limit : int = 10;

proc add(a : int, b : int) int {
    return a + b;
}

proc accumulate() int {
    var i : int = 0;
    for i < limit; {
        i = add(i, 1);
    }
    return i;
}

total = accumulate();
";
    let mut diags = Diagnostics::quiet();
    let compilation = compile_source(source, &mut diags);
    assert!(compilation.is_some(), "diagnostics: {:?}", diags.lines());
    assert_eq!(diags.error_count(), 0);
}

#[test]
fn test_every_reference_is_bound_after_resolution() {
    let source = "\
var seed : int = 1;
proc next(n : int) int { return n + seed; }
seed = next(seed);
";
    let mut diags = Diagnostics::quiet();
    let compilation = compile_source(source, &mut diags).expect("compiles clean");

    fn walk_expr(expr: &micac::Expr) {
        match &expr.kind {
            ExprKind::Variable { var_id, identifier } => {
                assert_ne!(*var_id, 0, "unbound variable {}", identifier.lexeme)
            }
            ExprKind::Call {
                callee,
                arguments,
                proc_id,
            } => {
                assert_ne!(*proc_id, 0, "unbound call");
                // Callee names a procedure; only its arguments hold
                // variable references.
                if !matches!(callee.kind, ExprKind::Variable { .. }) {
                    walk_expr(callee);
                }
                arguments.iter().for_each(walk_expr);
            }
            ExprKind::Binary { left, right, .. } => {
                walk_expr(left);
                walk_expr(right);
            }
            ExprKind::Unary { operand, .. } => walk_expr(operand),
            ExprKind::Grouping { inner } => walk_expr(inner),
            ExprKind::Member { object, .. } => walk_expr(object),
            ExprKind::Literal { .. } => {}
        }
    }

    fn walk_stmt(stmt: &micac::Stmt) {
        match &stmt.kind {
            StmtKind::DeclVar {
                initializer,
                var_id,
                ..
            } => {
                assert_ne!(*var_id, 0);
                if let Some(init) = initializer {
                    walk_expr(init);
                }
            }
            StmtKind::DeclProc { body, proc_id, .. } => {
                assert_ne!(*proc_id, 0);
                body.iter().for_each(walk_stmt);
            }
            StmtKind::Assign { rhs, var_id, .. } => {
                assert_ne!(*var_id, 0);
                walk_expr(rhs);
            }
            StmtKind::If {
                condition,
                then_stmt,
                else_stmt,
            } => {
                walk_expr(condition);
                walk_stmt(then_stmt);
                if let Some(else_stmt) = else_stmt {
                    walk_stmt(else_stmt);
                }
            }
            StmtKind::For { condition, body } => {
                walk_expr(condition);
                walk_stmt(body);
            }
            StmtKind::Block { body } => body.iter().for_each(walk_stmt),
            StmtKind::Expression { expr } => walk_expr(expr),
            StmtKind::Return { exprs } => exprs.iter().for_each(walk_expr),
            StmtKind::Import { .. } => {}
        }
    }

    compilation.program.iter().for_each(walk_stmt);
}

#[test]
fn test_diagnostics_are_deterministic_across_runs() {
    let source = "var a : int = 1.5;\nb = 2;\nvar c : float = \"text\";";

    let run = || {
        let mut diags = Diagnostics::quiet();
        let _ = compile_source(source, &mut diags);
        diags.lines().to_vec()
    };

    assert_eq!(run(), run());
}

#[test]
fn test_stage_gating_stops_at_first_failing_stage() {
    // A parse error must prevent resolve errors from being reported: the
    // undeclared `y` is never reached.
    let mut diags = Diagnostics::quiet();
    assert!(compile_source("var x : int = ;\nq = y;", &mut diags).is_none());
    assert!(diags
        .lines()
        .iter()
        .all(|l| !l.contains("undeclared variable y")));
}

#[test]
fn test_shadowing_in_nested_blocks() {
    let source = "\
var x : int = 1;
{
    var x : float = 2.0;
    x = 3.0;
}
x = 4;
";
    let mut diags = Diagnostics::quiet();
    let compilation = compile_source(source, &mut diags);
    assert!(compilation.is_some(), "diagnostics: {:?}", diags.lines());
}

#[test]
fn test_type_error_inside_procedure_body() {
    let source = "proc f() { var a : int = 1; a = 2.0; }";
    let mut diags = Diagnostics::quiet();
    assert!(compile_source(source, &mut diags).is_none());
    assert!(diags.lines().iter().any(|l| l.contains("don't match")));
}
