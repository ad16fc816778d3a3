//! Parser for Mica
//!
//! Recursive descent over the token stream. Statements dispatch on their
//! leading token (with a one-token peek after identifiers); expressions use
//! a precedence-climbing chain and every parsed expression is constant
//! folded on the way out.
//!
//! Precedence, lowest to highest: `or`, `and`, `+ -`, `* /`,
//! `< > <= >=`, `== !=`, unary, call, member, primary.
//!
//! Errors set `had_parse_error` and recover by skipping: past the next
//! semicolon, to the next statement-starting token, or back to global scope
//! by brace counting. The parser reports as many errors as it can.

use crate::ast::{DeclVar, Expr, ExprKind, Location, Stmt, StmtKind};
use crate::diag::Diagnostics;
use crate::fold::fold;
use crate::token::{Operator, Token, TokenKind, Value};
use crate::types::{basic_type_of_token, is_basic_type_token};
use tracing::debug;

/// Whether a token can start a statement; used by error recovery.
fn starts_statement(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::If
            | TokenKind::For
            | TokenKind::Identifier
            | TokenKind::Var
            | TokenKind::Proc
            | TokenKind::BraceLeft
            | TokenKind::Return
            | TokenKind::Import
    )
}

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    /// Brace nesting observed while consuming tokens; non-zero at end of
    /// input means mismatched braces.
    current_scope_depth: i64,
    pub had_parse_error: bool,
}

impl Parser {
    /// The token vector must be END-terminated, as the lexer produces it.
    pub fn new(tokens: Vec<Token>) -> Self {
        debug_assert!(matches!(
            tokens.last().map(|t| t.kind),
            Some(TokenKind::End)
        ));
        Parser {
            tokens,
            current: 0,
            current_scope_depth: 0,
            had_parse_error: false,
        }
    }

    /// Parse a whole program. Returns the statements and the error flag.
    pub fn parse(&mut self, diags: &mut Diagnostics) -> (Vec<Stmt>, bool) {
        let mut statements = Vec::new();

        while self.kind() != TokenKind::End {
            if let Some(stmt) = self.parse_statement(diags) {
                statements.push(stmt);
            }
        }

        if self.current_scope_depth < 0 {
            self.parse_error(
                diags,
                &format!(
                    "Mismatched braces, you need to add {} more {{",
                    self.current_scope_depth.abs()
                ),
            );
        } else if self.current_scope_depth > 0 {
            self.parse_error(
                diags,
                &format!(
                    "Mismatched braces, you need to add {} more }}",
                    self.current_scope_depth
                ),
            );
        }

        debug!(
            statements = statements.len(),
            error = self.had_parse_error,
            "parsed program"
        );
        (statements, self.had_parse_error)
    }

    fn parse_statement(&mut self, diags: &mut Diagnostics) -> Option<Stmt> {
        match self.kind() {
            TokenKind::If => self.if_stmt(diags),
            TokenKind::For => self.for_stmt(diags),
            TokenKind::Identifier => self.parse_after_identifier(diags),
            TokenKind::Var => self.decl_var_stmt(diags),
            TokenKind::Proc => self.decl_proc_stmt(diags),
            TokenKind::BraceLeft => self.block_stmt(diags),
            TokenKind::Return => self.return_stmt(diags),
            TokenKind::Import => self.import_stmt(diags),
            // Empty statements are allowed.
            TokenKind::Semicolon => {
                self.advance();
                None
            }
            _ => {
                let token = self.current_token().clone();
                self.had_parse_error = true;
                diags.error_token(&token, "Expected statement");
                // Skip to something that can start a statement so a single
                // stray token produces a single error.
                while self.kind() != TokenKind::End && !starts_statement(self.kind()) {
                    self.advance();
                }
                None
            }
        }
    }

    // { statement* }
    fn block_stmt(&mut self, diags: &mut Diagnostics) -> Option<Stmt> {
        self.advance(); // {

        let mut body = Vec::new();
        while self.kind() != TokenKind::End && self.kind() != TokenKind::BraceRight {
            let stmt = self.parse_statement(diags)?;
            body.push(stmt);
        }

        if !self.eat_token(
            diags,
            TokenKind::BraceRight,
            "Expected `}` at the end of block statement",
        ) {
            return None;
        }

        Some(Stmt::new(StmtKind::Block { body }))
    }

    // if cond then-stmt (else else-stmt)?
    fn if_stmt(&mut self, diags: &mut Diagnostics) -> Option<Stmt> {
        self.advance(); // if

        let condition = self.parse_expression(diags)?;
        let then_stmt = Box::new(self.parse_statement(diags)?);

        let else_stmt = if self.kind() == TokenKind::Else {
            self.advance();
            Some(Box::new(self.parse_statement(diags)?))
        } else {
            None
        };

        Some(Stmt::new(StmtKind::If {
            condition,
            then_stmt,
            else_stmt,
        }))
    }

    // for cond ; body   (a while loop; no init or step clauses)
    fn for_stmt(&mut self, diags: &mut Diagnostics) -> Option<Stmt> {
        self.advance(); // for

        let condition = self.parse_expression(diags)?;
        if !self.eat_token(
            diags,
            TokenKind::Semicolon,
            "Expected semicolon after the condition of the for loop",
        ) {
            return None;
        }

        let body = Box::new(self.parse_statement(diags)?);
        Some(Stmt::new(StmtKind::For { condition, body }))
    }

    /// A statement starting with an identifier is an assignment when the
    /// next token is `=`, an expression statement when it is `.` or `(`,
    /// and an error otherwise.
    fn parse_after_identifier(&mut self, diags: &mut Diagnostics) -> Option<Stmt> {
        debug_assert_eq!(self.kind(), TokenKind::Identifier);

        match self.peek().kind {
            TokenKind::Equal => self.assign_stmt(diags),
            TokenKind::Dot | TokenKind::ParenLeft => self.expr_stmt(diags),
            _ => {
                let next = self.peek().clone();
                self.had_parse_error = true;
                diags.error_token(
                    &next,
                    "Expected either `.`, `(` or `=` after identifier for a valid statement",
                );
                self.advance();
                None
            }
        }
    }

    // identifier = expr ;
    fn assign_stmt(&mut self, diags: &mut Diagnostics) -> Option<Stmt> {
        let target = self.current_token().clone();
        self.advance();

        if !self.eat_token(
            diags,
            TokenKind::Equal,
            "Expected `=` after identifier in assignment",
        ) {
            self.skip_past(TokenKind::Semicolon);
            return None;
        }

        let Some(rhs) = self.parse_expression(diags) else {
            self.skip_past(TokenKind::Semicolon);
            return None;
        };

        if !self.eat_token(
            diags,
            TokenKind::Semicolon,
            "Expected `;` at the end of assignment",
        ) {
            return None;
        }

        Some(Stmt::new(StmtKind::Assign {
            target,
            rhs,
            var_id: 0,
        }))
    }

    // var identifier : type (= initializer)? ;
    fn decl_var_stmt(&mut self, diags: &mut Diagnostics) -> Option<Stmt> {
        self.advance(); // var

        let name = self.current_token().clone();
        if name.kind != TokenKind::Identifier {
            self.parse_error(
                diags,
                "Expected variable name after `var` keyword in variable declaration",
            );
            return None;
        }
        self.advance();

        if !self.eat_token(
            diags,
            TokenKind::Colon,
            "Expected `:` after variable name in variable declaration",
        ) {
            return None;
        }

        let type_token = self.current_token().clone();
        if !is_basic_type_token(type_token.kind) && type_token.kind != TokenKind::Identifier {
            self.parse_error(diags, "Expected type name after `:` in variable declaration");
            return None;
        }
        self.advance();

        let initializer = if self.kind() == TokenKind::Equal {
            self.advance();
            match self.parse_expression(diags) {
                Some(expr) => Some(expr),
                None => {
                    self.skip_past(TokenKind::Semicolon);
                    return None;
                }
            }
        } else {
            None
        };

        if !self.eat_token(
            diags,
            TokenKind::Semicolon,
            "Expected `;` at the end of variable declaration",
        ) {
            return None;
        }

        Some(Stmt::new(StmtKind::DeclVar {
            decl: DeclVar {
                name: Some(name),
                ty: basic_type_of_token(type_token.kind),
            },
            initializer,
            var_id: 0,
        }))
    }

    // proc name ( params )? ret-list? { body }
    fn decl_proc_stmt(&mut self, diags: &mut Diagnostics) -> Option<Stmt> {
        self.advance(); // proc

        let name = self.current_token().clone();
        if name.kind != TokenKind::Identifier {
            self.parse_error(diags, "Expected procedure name after `proc` keyword");
            return None;
        }
        self.advance();

        if self.kind() != TokenKind::ParenLeft && self.kind() != TokenKind::BraceLeft {
            self.parse_error(
                diags,
                &format!(
                    "Expected `(` or `{{` after procedure name {}",
                    name.lexeme
                ),
            );
            self.skip_to_global_scope(diags);
            return None;
        }

        let mut parameters = Vec::new();
        if self.kind() == TokenKind::ParenLeft {
            self.advance(); // (

            loop {
                if self.kind() == TokenKind::ParenRight {
                    break;
                }

                if self.kind() != TokenKind::Identifier {
                    self.parse_error(
                        diags,
                        &format!(
                            "Expected parameter name in parameter list of the procedure declaration for {}",
                            name.lexeme
                        ),
                    );
                    self.skip_to_global_scope(diags);
                    return None;
                }
                let param_name = self.current_token().clone();
                self.advance();

                if !self.eat_token(
                    diags,
                    TokenKind::Colon,
                    "Expected `:` after parameter name in parameter list of the procedure",
                ) {
                    self.skip_to_global_scope(diags);
                    return None;
                }

                let type_token = self.current_token().clone();
                if !is_basic_type_token(type_token.kind) && type_token.kind != TokenKind::Identifier
                {
                    self.parse_error(
                        diags,
                        &format!(
                            "Expected type name in parameter list of the procedure declaration for {}",
                            name.lexeme
                        ),
                    );
                    self.skip_to_global_scope(diags);
                    return None;
                }
                self.advance();

                parameters.push(DeclVar {
                    name: Some(param_name),
                    ty: basic_type_of_token(type_token.kind),
                });

                if self.kind() != TokenKind::Comma {
                    break;
                }
                self.advance();
            }

            if !self.eat_token(
                diags,
                TokenKind::ParenRight,
                "Expected closing parenthesis after parameter list of the procedure",
            ) {
                self.skip_to_global_scope(diags);
                return None;
            }
        }

        // Return list: TYPE or IDENT : TYPE, comma separated, up to `{`.
        let mut returns = Vec::new();
        while self.kind() != TokenKind::BraceLeft {
            if self.kind() == TokenKind::End {
                self.parse_error(
                    diags,
                    &format!("Unexpected end of input in procedure declaration for {}", name.lexeme),
                );
                return None;
            }

            if !is_basic_type_token(self.kind()) && self.kind() != TokenKind::Identifier {
                self.parse_error(
                    diags,
                    &format!(
                        "Expected type name in return type list of the procedure declaration for {}",
                        name.lexeme
                    ),
                );
                self.skip_to_global_scope(diags);
                return None;
            }

            if self.peek().kind == TokenKind::Colon {
                // named return value
                let ret_name = self.current_token().clone();
                self.advance(); // name
                self.advance(); // :

                let type_token = self.current_token().clone();
                if !is_basic_type_token(type_token.kind) && type_token.kind != TokenKind::Identifier
                {
                    self.parse_error(
                        diags,
                        &format!(
                            "Expected type name after `:` in return list of procedure {}",
                            name.lexeme
                        ),
                    );
                    self.skip_to_global_scope(diags);
                    return None;
                }
                self.advance();

                returns.push(DeclVar {
                    name: Some(ret_name),
                    ty: basic_type_of_token(type_token.kind),
                });
            } else {
                returns.push(DeclVar {
                    name: None,
                    ty: basic_type_of_token(self.kind()),
                });
                self.advance();
            }

            if self.kind() == TokenKind::Comma {
                self.advance();
            }
        }

        self.advance(); // {

        let mut good = true;
        let mut body = Vec::new();
        while self.kind() != TokenKind::End && self.kind() != TokenKind::BraceRight {
            match self.parse_statement(diags) {
                Some(stmt) => body.push(stmt),
                None => good = false,
            }
        }

        if !self.eat_token(
            diags,
            TokenKind::BraceRight,
            "Expected closing `}` at the end of procedure body",
        ) {
            good = false;
        }

        if !good {
            return None;
        }

        Some(Stmt::new(StmtKind::DeclProc {
            name,
            parameters,
            returns,
            body,
            proc_id: 0,
        }))
    }

    fn expr_stmt(&mut self, diags: &mut Diagnostics) -> Option<Stmt> {
        let Some(expr) = self.parse_expression(diags) else {
            self.skip_past(TokenKind::Semicolon);
            return None;
        };

        if self.kind() == TokenKind::Semicolon {
            self.advance();
        } else {
            self.parse_error(diags, "Expected `;` after expression statement");
        }

        Some(Stmt::new(StmtKind::Expression { expr }))
    }

    // import identifier ;
    fn import_stmt(&mut self, diags: &mut Diagnostics) -> Option<Stmt> {
        self.advance(); // import

        let module = self.current_token().clone();
        if module.kind != TokenKind::Identifier {
            self.parse_error(diags, "Expected module name in import statement");
            self.skip_past(TokenKind::Semicolon);
            return None;
        }
        self.advance();

        if !self.eat_token(
            diags,
            TokenKind::Semicolon,
            "Expected `;` at the end of import statement",
        ) {
            return None;
        }

        Some(Stmt::new(StmtKind::Import { module }))
    }

    // return expr (, expr)* ;?   (the semicolon is optional)
    fn return_stmt(&mut self, diags: &mut Diagnostics) -> Option<Stmt> {
        self.advance(); // return

        let mut exprs = Vec::new();
        let Some(first) = self.parse_expression(diags) else {
            self.skip_past(TokenKind::Semicolon);
            return None;
        };
        exprs.push(first);

        while self.kind() == TokenKind::Comma {
            self.advance();
            let Some(next) = self.parse_expression(diags) else {
                self.skip_past(TokenKind::Semicolon);
                return None;
            };
            exprs.push(next);
        }

        if self.kind() == TokenKind::Semicolon {
            self.advance();
        }

        Some(Stmt::new(StmtKind::Return { exprs }))
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    /// Parse one expression and constant fold it. The folded root keeps the
    /// line the expression started on.
    pub fn parse_expression(&mut self, diags: &mut Diagnostics) -> Option<Expr> {
        let line = self.current_token().line;
        let expr = self.logical_or_expr(diags)?;
        let mut folded = fold(expr, diags)?;
        folded.location.line = line;
        Some(folded)
    }

    fn logical_or_expr(&mut self, diags: &mut Diagnostics) -> Option<Expr> {
        let mut left = self.logical_and_expr(diags)?;
        while self.kind() == TokenKind::Or {
            let location = self.token_location();
            self.advance();
            let right = self.logical_and_expr(diags)?;
            left = binary(left, Operator::Or, right, location);
        }
        Some(left)
    }

    fn logical_and_expr(&mut self, diags: &mut Diagnostics) -> Option<Expr> {
        let mut left = self.arithmetic_expr(diags)?;
        while self.kind() == TokenKind::And {
            let location = self.token_location();
            self.advance();
            let right = self.arithmetic_expr(diags)?;
            left = binary(left, Operator::And, right, location);
        }
        Some(left)
    }

    // addition and subtraction
    fn arithmetic_expr(&mut self, diags: &mut Diagnostics) -> Option<Expr> {
        let mut left = self.factor_expr(diags)?;
        while matches!(self.kind(), TokenKind::Plus | TokenKind::Minus) {
            let operator = Operator::from_token(self.kind()).expect("matched operator token");
            let location = self.token_location();
            self.advance();
            let right = self.factor_expr(diags)?;
            left = binary(left, operator, right, location);
        }
        Some(left)
    }

    // multiplication and division
    fn factor_expr(&mut self, diags: &mut Diagnostics) -> Option<Expr> {
        let mut left = self.comparison_expr(diags)?;
        while matches!(self.kind(), TokenKind::Star | TokenKind::Slash) {
            let operator = Operator::from_token(self.kind()).expect("matched operator token");
            let location = self.token_location();
            self.advance();
            let right = self.comparison_expr(diags)?;
            left = binary(left, operator, right, location);
        }
        Some(left)
    }

    fn comparison_expr(&mut self, diags: &mut Diagnostics) -> Option<Expr> {
        let mut left = self.comparison_equality_expr(diags)?;
        while matches!(
            self.kind(),
            TokenKind::Less | TokenKind::Greater | TokenKind::LessEqual | TokenKind::GreaterEqual
        ) {
            let operator = Operator::from_token(self.kind()).expect("matched operator token");
            let location = self.token_location();
            self.advance();
            let right = self.comparison_equality_expr(diags)?;
            left = binary(left, operator, right, location);
        }
        Some(left)
    }

    fn comparison_equality_expr(&mut self, diags: &mut Diagnostics) -> Option<Expr> {
        let mut left = self.unary_expr(diags)?;
        while matches!(
            self.kind(),
            TokenKind::EqualEqual | TokenKind::ExclamationEqual
        ) {
            let operator = Operator::from_token(self.kind()).expect("matched operator token");
            let location = self.token_location();
            self.advance();
            let right = self.unary_expr(diags)?;
            left = binary(left, operator, right, location);
        }
        Some(left)
    }

    fn unary_expr(&mut self, diags: &mut Diagnostics) -> Option<Expr> {
        if matches!(self.kind(), TokenKind::Minus | TokenKind::Exclamation) {
            let operator = Operator::from_token(self.kind()).expect("matched operator token");
            let location = self.token_location();
            self.advance();

            if matches!(self.kind(), TokenKind::Minus | TokenKind::Exclamation) {
                self.parse_error(diags, "Nested unary operators are not supported");
                while matches!(self.kind(), TokenKind::Minus | TokenKind::Exclamation) {
                    self.advance();
                }
                return None;
            }

            let operand = self.call_expr(diags)?;
            return Some(Expr::new(
                ExprKind::Unary {
                    operator,
                    operand: Box::new(operand),
                },
                location,
            ));
        }

        self.call_expr(diags)
    }

    fn call_expr(&mut self, diags: &mut Diagnostics) -> Option<Expr> {
        let expr = self.member_expr(diags)?;

        if self.kind() != TokenKind::ParenLeft {
            return Some(expr);
        }
        let location = expr.location;
        self.advance(); // (

        let mut arguments = Vec::new();
        while self.kind() != TokenKind::End && self.kind() != TokenKind::ParenRight {
            let Some(argument) = self.parse_expression(diags) else {
                self.parse_error(diags, "Faulty expression for call argument");
                while self.kind() != TokenKind::End
                    && self.kind() != TokenKind::ParenRight
                    && !starts_statement(self.kind())
                {
                    self.advance();
                }
                return None;
            };
            arguments.push(argument);

            if self.kind() != TokenKind::Comma {
                break;
            }
            self.advance();
        }

        if self.kind() != TokenKind::ParenRight {
            self.parse_error(diags, "Reached end of input while parsing call arguments");
            return None;
        }
        self.advance();

        Some(Expr::new(
            ExprKind::Call {
                callee: Box::new(expr),
                arguments,
                proc_id: 0,
            },
            location,
        ))
    }

    fn member_expr(&mut self, diags: &mut Diagnostics) -> Option<Expr> {
        let expr = self.grouping_expr(diags)?;

        if self.kind() != TokenKind::Dot {
            return Some(expr);
        }
        self.advance(); // .

        if self.kind() != TokenKind::Identifier {
            self.parse_error(diags, "Expected member name after `.` in expression");
            self.advance();
            return None;
        }

        let member = self.current_token().clone();
        let location = expr.location;
        self.advance();

        Some(Expr::new(
            ExprKind::Member {
                object: Box::new(expr),
                member,
            },
            location,
        ))
    }

    fn grouping_expr(&mut self, diags: &mut Diagnostics) -> Option<Expr> {
        if self.kind() != TokenKind::ParenLeft {
            return self.primary_expr(diags);
        }

        let location = self.token_location();
        self.advance(); // (

        let inner = self.parse_expression(diags)?;

        if self.kind() == TokenKind::ParenRight {
            self.advance();
        } else {
            let token = self.current_token().clone();
            self.had_parse_error = true;
            diags.error_token(&token, "Unmatched parentheses");
        }

        Some(Expr::new(
            ExprKind::Grouping {
                inner: Box::new(inner),
            },
            location,
        ))
    }

    fn primary_expr(&mut self, diags: &mut Diagnostics) -> Option<Expr> {
        let token = self.current_token().clone();
        let location = Location::new(token.line, token.offset);

        match token.kind {
            TokenKind::NumericLiteral | TokenKind::StringLiteral => {
                self.advance();
                Some(Expr::literal(token.value, location))
            }
            TokenKind::True => {
                self.advance();
                Some(Expr::literal(Value::Boolean(true), location))
            }
            TokenKind::False => {
                self.advance();
                Some(Expr::literal(Value::Boolean(false), location))
            }
            TokenKind::Identifier => {
                self.advance();
                Some(Expr::new(
                    ExprKind::Variable {
                        identifier: token,
                        var_id: 0,
                    },
                    location,
                ))
            }
            _ => {
                self.parse_error(diags, "Unrecognized token sequence");
                None
            }
        }
    }

    // ------------------------------------------------------------------
    // Token plumbing and recovery
    // ------------------------------------------------------------------

    fn current_token(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn kind(&self) -> TokenKind {
        self.tokens[self.current].kind
    }

    fn peek(&self) -> &Token {
        let index = (self.current + 1).min(self.tokens.len() - 1);
        &self.tokens[index]
    }

    fn token_location(&self) -> Location {
        let token = self.current_token();
        Location::new(token.line, token.offset)
    }

    /// Consume the current token, tracking brace depth. Advancing never
    /// moves past the END token.
    fn advance(&mut self) {
        match self.kind() {
            TokenKind::BraceLeft => self.current_scope_depth += 1,
            TokenKind::BraceRight => self.current_scope_depth -= 1,
            _ => {}
        }
        if self.current + 1 < self.tokens.len() {
            self.current += 1;
        }
    }

    fn parse_error(&mut self, diags: &mut Diagnostics, msg: &str) {
        self.had_parse_error = true;
        diags.error(self.current_token().line, msg);
    }

    #[must_use]
    fn eat_token(&mut self, diags: &mut Diagnostics, kind: TokenKind, msg: &str) -> bool {
        if self.kind() != kind {
            self.parse_error(diags, msg);
            return false;
        }
        self.advance();
        true
    }

    /// Recovery: skip forward until just past a token of `kind`, or until a
    /// token that can start a statement.
    fn skip_past(&mut self, kind: TokenKind) {
        while self.kind() != TokenKind::End {
            if starts_statement(self.kind()) {
                break;
            }
            let consumed = self.kind();
            self.advance();
            if consumed == kind {
                break;
            }
        }
    }

    /// Recovery: skip forward until the brace depth returns to zero.
    fn skip_to_global_scope(&mut self, diags: &mut Diagnostics) {
        while self.kind() != TokenKind::End && self.current_scope_depth != 0 {
            self.advance();
        }

        if self.current_scope_depth != 0 {
            let depth = self.current_scope_depth;
            if depth < 0 {
                self.parse_error(
                    diags,
                    &format!("Mismatched braces, you need to add {} more {{", depth.abs()),
                );
            } else {
                self.parse_error(
                    diags,
                    &format!("Mismatched braces, you need to add {} more }}", depth),
                );
            }
        }
    }
}

fn binary(left: Expr, operator: Operator, right: Expr, location: Location) -> Expr {
    Expr::new(
        ExprKind::Binary {
            left: Box::new(left),
            operator,
            right: Box::new(right),
        },
        location,
    )
}
