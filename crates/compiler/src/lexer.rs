//! Lexer for Mica source
//!
//! A single pass over the raw bytes. Newlines bump the line counter,
//! whitespace is skipped, and the token stream is always terminated by an
//! END token. Lexing never aborts the process: malformed input reports
//! diagnostics and raises the error flag.

use crate::diag::Diagnostics;
use crate::token::{Token, TokenKind, Value, RESERVED_WORDS};
use tracing::debug;

/// Byte cursor over the source text.
struct Source<'a> {
    bytes: &'a [u8],
    current: usize,
    line: usize,
}

impl<'a> Source<'a> {
    fn new(text: &'a str) -> Self {
        Source {
            bytes: text.as_bytes(),
            current: 0,
            line: 1,
        }
    }

    fn at_end(&self) -> bool {
        self.current >= self.bytes.len()
    }

    /// Current byte, 0 at end of input.
    fn get(&self) -> u8 {
        self.bytes.get(self.current).copied().unwrap_or(0)
    }

    /// Byte after the current one, 0 at end of input.
    fn peek(&self) -> u8 {
        self.bytes.get(self.current + 1).copied().unwrap_or(0)
    }

    /// Consume and return the current byte, counting newlines.
    fn advance(&mut self) -> u8 {
        let byte = self.get();
        if byte == b'\n' {
            self.line += 1;
        }
        if !self.at_end() {
            self.current += 1;
        }
        byte
    }

    fn slice(&self, start: usize, end: usize) -> &'a str {
        // The lexer only slices on ASCII boundaries it has scanned itself.
        std::str::from_utf8(&self.bytes[start..end]).unwrap_or("")
    }
}

fn is_digit_ascii(byte: u8) -> bool {
    byte.is_ascii_digit()
}

fn is_identifier_start(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'_'
}

fn is_identifier_char(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

/// Consecutive unknown characters tolerated before lexing bails out.
const MAX_CONSECUTIVE_UNKNOWN: usize = 100;

/// Lex the source into an END-terminated token vector.
///
/// Returns the tokens and an error flag; the flag is set when any
/// unknown-character, unterminated-string or unterminated-comment error was
/// reported.
pub fn lex(source: &str, diags: &mut Diagnostics) -> (Vec<Token>, bool) {
    let mut tokens = Vec::new();
    let mut src = Source::new(source);
    let mut error = false;
    let mut consecutive_unknown = 0usize;

    while !src.at_end() {
        let handled = handle_character(&mut tokens, &mut src, diags, &mut error);
        if handled {
            consecutive_unknown = 0;
        } else {
            consecutive_unknown += 1;
            if consecutive_unknown > MAX_CONSECUTIVE_UNKNOWN {
                diags.error(src.line, "Too many consecutive unexpected characters, giving up");
                break;
            }
        }
    }

    tokens.push(Token::new(
        String::new(),
        TokenKind::End,
        Value::Nil,
        src.line,
        src.current,
    ));

    debug!(count = tokens.len(), error, "lexed token stream");
    (tokens, error)
}

/// Handle one input position. Returns false only for an unknown character.
fn handle_character(
    tokens: &mut Vec<Token>,
    src: &mut Source<'_>,
    diags: &mut Diagnostics,
    error: &mut bool,
) -> bool {
    let c = src.get();
    match c {
        b' ' | b'\t' | b'\r' | b'\n' => {
            src.advance();
        }

        b'.' => simple(tokens, src, TokenKind::Dot, "."),
        b',' => simple(tokens, src, TokenKind::Comma, ","),
        b':' => simple(tokens, src, TokenKind::Colon, ":"),
        b';' => simple(tokens, src, TokenKind::Semicolon, ";"),
        b'(' => simple(tokens, src, TokenKind::ParenLeft, "("),
        b')' => simple(tokens, src, TokenKind::ParenRight, ")"),
        b'{' => simple(tokens, src, TokenKind::BraceLeft, "{"),
        b'}' => simple(tokens, src, TokenKind::BraceRight, "}"),
        b'[' => simple(tokens, src, TokenKind::SquareLeft, "["),
        b']' => simple(tokens, src, TokenKind::SquareRight, "]"),
        b'+' => simple(tokens, src, TokenKind::Plus, "+"),
        b'-' => simple(tokens, src, TokenKind::Minus, "-"),
        b'*' => simple(tokens, src, TokenKind::Star, "*"),
        b'%' => simple(tokens, src, TokenKind::Percent, "%"),
        b'#' => simple(tokens, src, TokenKind::Hash, "#"),

        b'!' => two_char(tokens, src, TokenKind::Exclamation, "!", TokenKind::ExclamationEqual, "!="),
        b'=' => two_char(tokens, src, TokenKind::Equal, "=", TokenKind::EqualEqual, "=="),
        b'>' => two_char(tokens, src, TokenKind::Greater, ">", TokenKind::GreaterEqual, ">="),
        b'<' => two_char(tokens, src, TokenKind::Less, "<", TokenKind::LessEqual, "<="),

        b'"' => {
            if !lex_string_literal(tokens, src, diags) {
                *error = true;
            }
        }

        b'/' => match src.peek() {
            b'/' => {
                // line comment
                loop {
                    let consumed = src.advance();
                    if consumed == b'\n' {
                        break;
                    }
                    if src.at_end() {
                        diags.warning(
                            src.line,
                            "No newline found at the end while processing comment",
                        );
                        break;
                    }
                }
            }
            b'*' => {
                if !multiline_comment(src, diags) {
                    *error = true;
                }
            }
            _ => simple(tokens, src, TokenKind::Slash, "/"),
        },

        _ => {
            if is_digit_ascii(c) {
                if !lex_number(tokens, src, diags) {
                    *error = true;
                }
            } else if is_identifier_start(c) {
                lex_identifier(tokens, src);
            } else {
                diags.error(src.line, &format!("Unexpected character : {}", c as char));
                src.advance();
                *error = true;
                return false;
            }
        }
    }

    true
}

fn simple(tokens: &mut Vec<Token>, src: &mut Source<'_>, kind: TokenKind, lexeme: &str) {
    tokens.push(Token::new(
        lexeme.to_string(),
        kind,
        Value::Nil,
        src.line,
        src.current,
    ));
    src.advance();
}

/// Single-character token, or its two-character variant when the next byte
/// is `=`.
fn two_char(
    tokens: &mut Vec<Token>,
    src: &mut Source<'_>,
    single: TokenKind,
    single_lexeme: &str,
    double: TokenKind,
    double_lexeme: &str,
) {
    let offset = src.current;
    let line = src.line;
    src.advance();
    if src.get() == b'=' {
        src.advance();
        tokens.push(Token::new(
            double_lexeme.to_string(),
            double,
            Value::Nil,
            line,
            offset,
        ));
    } else {
        tokens.push(Token::new(
            single_lexeme.to_string(),
            single,
            Value::Nil,
            line,
            offset,
        ));
    }
}

/// Integer or real literal: digits, then optionally `.` followed by digits.
fn lex_number(tokens: &mut Vec<Token>, src: &mut Source<'_>, diags: &mut Diagnostics) -> bool {
    let start = src.current;
    let line = src.line;

    while is_digit_ascii(src.get()) {
        src.advance();
    }

    let is_real = src.get() == b'.' && {
        src.advance();
        while is_digit_ascii(src.get()) {
            src.advance();
        }
        true
    };

    let text = src.slice(start, src.current);
    let value = if is_real {
        match text.parse::<f64>() {
            Ok(real) => Value::Real(real),
            Err(_) => {
                diags.error(line, &format!("Malformed numeric literal {}", text));
                return false;
            }
        }
    } else {
        match text.parse::<i64>() {
            Ok(integer) => Value::Integer(integer),
            Err(_) => {
                diags.error(line, &format!("Malformed numeric literal {}", text));
                return false;
            }
        }
    };

    tokens.push(Token::new(
        text.to_string(),
        TokenKind::NumericLiteral,
        value,
        line,
        start,
    ));
    true
}

/// Identifier or reserved word.
fn lex_identifier(tokens: &mut Vec<Token>, src: &mut Source<'_>) {
    let start = src.current;
    let line = src.line;

    while is_identifier_char(src.get()) {
        src.advance();
    }

    let text = src.slice(start, src.current);
    for (word, kind) in RESERVED_WORDS {
        if text == *word {
            tokens.push(Token::new(word.to_string(), *kind, Value::Nil, line, start));
            return;
        }
    }

    tokens.push(Token::new(
        text.to_string(),
        TokenKind::Identifier,
        Value::Nil,
        line,
        start,
    ));
}

/// String literal. The token carries no lexeme; readers must use the
/// literal value.
fn lex_string_literal(
    tokens: &mut Vec<Token>,
    src: &mut Source<'_>,
    diags: &mut Diagnostics,
) -> bool {
    let line = src.line;
    src.advance(); // opening quote
    let start = src.current;

    while !src.at_end() && src.get() != b'"' {
        src.advance();
    }

    if src.at_end() {
        diags.error(src.line, "Unterminated string literal at the end of input");
        return false;
    }

    let interior = src.slice(start, src.current).to_string();
    src.advance(); // closing quote

    tokens.push(Token::new(
        String::new(),
        TokenKind::StringLiteral,
        Value::Str(interior),
        line,
        start,
    ));
    true
}

/// Multi-line comment with nesting: every inner `/*` increments the nesting
/// counter, every `*/` decrements. Unterminated comments are reported.
fn multiline_comment(src: &mut Source<'_>, diags: &mut Diagnostics) -> bool {
    let opening_line = src.line;
    src.advance(); // '/'
    src.advance(); // '*'

    let mut nest_count = 1usize;
    while !src.at_end() && nest_count > 0 {
        if src.get() == b'*' && src.peek() == b'/' {
            src.advance();
            src.advance();
            nest_count -= 1;
        } else if src.get() == b'/' && src.peek() == b'*' {
            src.advance();
            src.advance();
            nest_count += 1;
        } else {
            src.advance();
        }
    }

    if nest_count > 0 {
        diags.error(
            opening_line,
            "Unterminated multi-line comment at the end of input",
        );
        return false;
    }
    true
}
