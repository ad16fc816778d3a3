//! Compile-time expression folding
//!
//! Every expression the parser produces is passed through `fold`, which
//! evaluates literal-only subtrees in the value domain. Folding a grouping
//! returns the folded inner expression, so grouping nodes never survive to
//! later stages. Comparison operators (`< > <= >=`) are not folded.

use crate::ast::{Expr, ExprKind};
use crate::diag::Diagnostics;
use crate::token::{Operator, Value};
use crate::types::{value_type, TypeId, TYPE_FLOAT, TYPE_INT};

/// Fold an expression tree. Returns `None` when folding uncovered a type
/// error (reported through the sink); the expression is unusable then.
pub fn fold(expr: Expr, diags: &mut Diagnostics) -> Option<Expr> {
    let location = expr.location;
    match expr.kind {
        ExprKind::Literal { .. } | ExprKind::Variable { .. } => Some(expr),

        ExprKind::Grouping { inner } => fold(*inner, diags),

        ExprKind::Unary { operator, operand } => {
            let operand = fold(*operand, diags)?;
            match operator {
                Operator::None => Some(operand),
                Operator::Minus => {
                    if let ExprKind::Literal { value } = &operand.kind {
                        let folded = match value {
                            Value::Integer(i) => Value::Integer(-i),
                            Value::Real(r) => Value::Real(-r),
                            other => {
                                diags.error(
                                    location.line,
                                    &format!(
                                        "Can't apply operator `-` on type : {}",
                                        value_type(other)
                                    ),
                                );
                                return None;
                            }
                        };
                        Some(Expr::literal(folded, location))
                    } else {
                        Some(Expr::new(
                            ExprKind::Unary {
                                operator,
                                operand: Box::new(operand),
                            },
                            location,
                        ))
                    }
                }
                Operator::Not => {
                    if let ExprKind::Literal { value } = &operand.kind {
                        match value {
                            Value::Boolean(b) => {
                                Some(Expr::literal(Value::Boolean(!b), location))
                            }
                            other => {
                                diags.error(
                                    location.line,
                                    &format!(
                                        "Can't apply operator `!` on type : {}",
                                        value_type(other)
                                    ),
                                );
                                None
                            }
                        }
                    } else {
                        Some(Expr::new(
                            ExprKind::Unary {
                                operator,
                                operand: Box::new(operand),
                            },
                            location,
                        ))
                    }
                }
                other => {
                    diags.error(location.line, &format!("Invalid unary operator : {}", other));
                    None
                }
            }
        }

        ExprKind::Binary {
            left,
            operator,
            right,
        } => {
            let left = fold(*left, diags)?;
            let right = fold(*right, diags)?;
            fold_binary(left, operator, right, location, diags)
        }

        ExprKind::Call {
            callee,
            arguments,
            proc_id,
        } => {
            let callee = Box::new(fold(*callee, diags)?);
            let mut folded_args = Vec::with_capacity(arguments.len());
            for argument in arguments {
                folded_args.push(fold(argument, diags)?);
            }
            Some(Expr::new(
                ExprKind::Call {
                    callee,
                    arguments: folded_args,
                    proc_id,
                },
                location,
            ))
        }

        ExprKind::Member { object, member } => {
            let object = Box::new(fold(*object, diags)?);
            Some(Expr::new(ExprKind::Member { object, member }, location))
        }
    }
}

fn fold_binary(
    left: Expr,
    operator: Operator,
    right: Expr,
    location: crate::ast::Location,
    diags: &mut Diagnostics,
) -> Option<Expr> {
    let rebuild = |left: Expr, right: Expr| {
        Expr::new(
            ExprKind::Binary {
                left: Box::new(left),
                operator,
                right: Box::new(right),
            },
            location,
        )
    };

    let literals = match (&left.kind, &right.kind) {
        (ExprKind::Literal { value: l }, ExprKind::Literal { value: r }) => {
            Some((l.clone(), r.clone()))
        }
        _ => None,
    };
    let Some((lhs_value, rhs_value)) = literals else {
        // Not compile-time known on both sides; nothing to do.
        return Some(rebuild(left, right));
    };
    let (lhs, rhs) = (&lhs_value, &rhs_value);

    let ltype = value_type(lhs);
    let rtype = value_type(rhs);

    match operator {
        Operator::Plus | Operator::Minus | Operator::Mult | Operator::Div => {
            if !numeric_same_type(ltype, rtype, operator, location.line, diags) {
                return None;
            }

            if operator == Operator::Div && divisor_is_zero(rhs) {
                diags.warning(location.line, "Division by zero");
                if ltype == TYPE_INT {
                    // Integer division by zero has no foldable result.
                    return Some(rebuild(left, right));
                }
            }

            let folded = match (lhs, rhs) {
                (Value::Integer(a), Value::Integer(b)) => Value::Integer(match operator {
                    Operator::Plus => a.wrapping_add(*b),
                    Operator::Minus => a.wrapping_sub(*b),
                    Operator::Mult => a.wrapping_mul(*b),
                    Operator::Div => a.wrapping_div(*b),
                    _ => unreachable!(),
                }),
                (Value::Real(a), Value::Real(b)) => Value::Real(match operator {
                    Operator::Plus => a + b,
                    Operator::Minus => a - b,
                    Operator::Mult => a * b,
                    Operator::Div => a / b,
                    _ => unreachable!(),
                }),
                _ => unreachable!("operands checked numeric and same-typed"),
            };
            Some(Expr::literal(folded, location))
        }

        Operator::Mod => match (lhs, rhs) {
            (Value::Integer(a), Value::Integer(b)) => {
                if *b == 0 {
                    diags.warning(location.line, "Division by zero");
                    return Some(rebuild(left, right));
                }
                Some(Expr::literal(Value::Integer(a.wrapping_rem(*b)), location))
            }
            (Value::Real(a), Value::Real(b)) => {
                Some(Expr::literal(Value::Real(a % b), location))
            }
            _ => {
                diags.error(
                    location.line,
                    &format!(
                        "Can't use binary operator {} on given types: {} {}",
                        operator, ltype, rtype
                    ),
                );
                None
            }
        },

        Operator::Equals | Operator::NotEquals => {
            if ltype != rtype {
                diags.error(
                    location.line,
                    &format!(
                        "Type mismatch for 2 sides of operator `{}` {} {}",
                        operator, ltype, rtype
                    ),
                );
                return None;
            }
            let equal = lhs == rhs;
            let result = if operator == Operator::Equals { equal } else { !equal };
            Some(Expr::literal(Value::Boolean(result), location))
        }

        // Comparisons are type-checked here but never folded.
        Operator::Less | Operator::Greater | Operator::LessEqual | Operator::GreaterEqual => {
            if !numeric_same_type(ltype, rtype, operator, location.line, diags) {
                return None;
            }
            Some(rebuild(left, right))
        }

        Operator::Or | Operator::And => match (lhs, rhs) {
            (Value::Boolean(a), Value::Boolean(b)) => {
                let result = if operator == Operator::Or { *a || *b } else { *a && *b };
                Some(Expr::literal(Value::Boolean(result), location))
            }
            _ => {
                diags.error(
                    location.line,
                    &format!(
                        "Can't use binary operator {} on given types: {} {}",
                        operator, ltype, rtype
                    ),
                );
                None
            }
        },

        Operator::None | Operator::Not => {
            unreachable!("operator {} cannot appear in binary position", operator)
        }
    }
}

fn numeric_same_type(
    ltype: TypeId,
    rtype: TypeId,
    operator: Operator,
    line: usize,
    diags: &mut Diagnostics,
) -> bool {
    let both_int = ltype == TYPE_INT && rtype == TYPE_INT;
    let both_float = ltype == TYPE_FLOAT && rtype == TYPE_FLOAT;
    if both_int || both_float {
        return true;
    }
    diags.error(
        line,
        &format!(
            "Can't use binary operator {} on given types: {} {}",
            operator, ltype, rtype
        ),
    );
    false
}

fn divisor_is_zero(value: &Value) -> bool {
    match value {
        Value::Integer(i) => *i == 0,
        Value::Real(r) => *r == 0.0,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::parser::Parser;

    fn parse_and_fold(source: &str) -> Option<Expr> {
        let mut diags = Diagnostics::quiet();
        let (tokens, lex_error) = lex(source, &mut diags);
        assert!(!lex_error, "lexing {:?} failed", source);
        let mut parser = Parser::new(tokens);
        parser.parse_expression(&mut diags)
    }

    fn literal_of(expr: &Expr) -> &Value {
        match &expr.kind {
            ExprKind::Literal { value } => value,
            other => panic!("expected literal, got {:?}", other),
        }
    }

    #[test]
    fn test_folds_arithmetic() {
        let expr = parse_and_fold("1 + 2 * 3").unwrap();
        assert_eq!(literal_of(&expr), &Value::Integer(7));
    }

    #[test]
    fn test_folds_grouping_away() {
        let expr = parse_and_fold("(1 + 2) * 3").unwrap();
        assert_eq!(literal_of(&expr), &Value::Integer(9));
    }

    #[test]
    fn test_folds_real_arithmetic() {
        let expr = parse_and_fold("1.5 + 2.5").unwrap();
        assert_eq!(literal_of(&expr), &Value::Real(4.0));
    }

    #[test]
    fn test_rejects_mixed_arithmetic() {
        let mut diags = Diagnostics::quiet();
        let (tokens, _) = lex("1 + 2.5", &mut diags);
        let mut parser = Parser::new(tokens);
        assert!(parser.parse_expression(&mut diags).is_none());
        assert!(diags.had_error());
    }

    #[test]
    fn test_folds_equality_to_boolean() {
        let expr = parse_and_fold("1 == 1").unwrap();
        assert_eq!(literal_of(&expr), &Value::Boolean(true));
        let expr = parse_and_fold("1 != 1").unwrap();
        assert_eq!(literal_of(&expr), &Value::Boolean(false));
    }

    #[test]
    fn test_folds_logical_operators() {
        let expr = parse_and_fold("true and false").unwrap();
        assert_eq!(literal_of(&expr), &Value::Boolean(false));
        let expr = parse_and_fold("true or false").unwrap();
        assert_eq!(literal_of(&expr), &Value::Boolean(true));
    }

    #[test]
    fn test_folds_unary() {
        let expr = parse_and_fold("-3").unwrap();
        assert_eq!(literal_of(&expr), &Value::Integer(-3));
        let expr = parse_and_fold("!true").unwrap();
        assert_eq!(literal_of(&expr), &Value::Boolean(false));
    }

    #[test]
    fn test_comparisons_are_not_folded() {
        let expr = parse_and_fold("1 < 2").unwrap();
        assert!(matches!(expr.kind, ExprKind::Binary { .. }));
    }

    #[test]
    fn test_integer_division_by_zero_warns_and_stays() {
        let mut diags = Diagnostics::quiet();
        let (tokens, _) = lex("1 / 0", &mut diags);
        let mut parser = Parser::new(tokens);
        let expr = parser.parse_expression(&mut diags).unwrap();
        assert!(matches!(expr.kind, ExprKind::Binary { .. }));
        assert_eq!(diags.warning_count(), 1);
        assert!(!diags.had_error());
    }

    #[test]
    fn test_variables_stop_folding() {
        let expr = parse_and_fold("x + 1").unwrap();
        assert!(matches!(expr.kind, ExprKind::Binary { .. }));
    }

    #[test]
    fn test_folding_is_idempotent() {
        for source in ["1 + 2 * 3", "x + 1", "1 < 2", "-(4)", "!false", "f(1 + 1)"] {
            let folded = parse_and_fold(source).unwrap();
            let mut diags = Diagnostics::quiet();
            let refolded = fold(folded.clone(), &mut diags).unwrap();
            assert_eq!(folded, refolded, "folding {:?} is not idempotent", source);
        }
    }

    #[test]
    fn test_fold_preserves_location() {
        let expr = parse_and_fold("1 + 2").unwrap();
        assert_eq!(expr.location.line, 1);
    }
}
