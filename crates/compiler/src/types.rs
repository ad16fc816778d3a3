//! Type identifiers for Mica
//!
//! A `TypeId` is a 64-bit opaque identifier. The top two bits partition the
//! space:
//!
//! ```text
//! 00 -> primitives
//! 01 -> procedure types
//! 10 -> structure types
//! ```
//!
//! Primitives are a fixed enumeration; procedure and structure types carry
//! their payload externally and the low bits index into a per-program table.
//! This front-end exercises primitives; the procedure/structure tagging is
//! in place for the code generator.

use crate::token::{TokenKind, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(pub u64);

pub const TYPE_NONE: TypeId = TypeId(0);
pub const TYPE_INT: TypeId = TypeId(1);
pub const TYPE_FLOAT: TypeId = TypeId(2);
pub const TYPE_STRING: TypeId = TypeId(3);
pub const TYPE_BOOLEAN: TypeId = TypeId(4);
pub const TYPE_NIL: TypeId = TypeId(5);

const PROCEDURE_BIT: u64 = 1 << 62;
const STRUCTURE_BIT: u64 = 1 << 63;

impl TypeId {
    /// Tag a table index as a procedure type.
    pub fn procedure(index: u64) -> TypeId {
        TypeId(PROCEDURE_BIT | index)
    }

    /// Tag a table index as a structure type.
    pub fn structure(index: u64) -> TypeId {
        TypeId(STRUCTURE_BIT | index)
    }

    pub fn is_procedure(self) -> bool {
        self.0 & PROCEDURE_BIT != 0
    }

    pub fn is_structure(self) -> bool {
        self.0 & STRUCTURE_BIT != 0
    }

    /// Table index of a procedure or structure type.
    pub fn index(self) -> u64 {
        self.0 & !(PROCEDURE_BIT | STRUCTURE_BIT)
    }

    pub fn is_numeric(self) -> bool {
        self == TYPE_INT || self == TYPE_FLOAT
    }

    /// Whether a value of this type can stand where a boolean is expected.
    /// Everything except procedures and structures converts for now.
    pub fn convertible_to_boolean(self) -> bool {
        !self.is_procedure() && !self.is_structure()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TYPE_INT => "int",
            TYPE_FLOAT => "float",
            TYPE_STRING => "string",
            TYPE_BOOLEAN => "boolean",
            TYPE_NIL => "nil",
            TYPE_NONE => "none",
            other => {
                if other.is_procedure() {
                    "procedure-type"
                } else if other.is_structure() {
                    "structure-type"
                } else {
                    "non-basic-type"
                }
            }
        }
    }
}

impl std::fmt::Display for TypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The primitive type named by a type token, `TYPE_NONE` otherwise
/// (identifiers name user types and are resolved later).
pub fn basic_type_of_token(kind: TokenKind) -> TypeId {
    match kind {
        TokenKind::Int => TYPE_INT,
        TokenKind::Float => TYPE_FLOAT,
        TokenKind::String => TYPE_STRING,
        _ => TYPE_NONE,
    }
}

/// Whether a token names a primitive type.
pub fn is_basic_type_token(kind: TokenKind) -> bool {
    matches!(kind, TokenKind::Int | TokenKind::Float | TokenKind::String)
}

/// The type of a literal value.
pub fn value_type(value: &Value) -> TypeId {
    match value {
        Value::Integer(_) => TYPE_INT,
        Value::Real(_) => TYPE_FLOAT,
        Value::Str(_) => TYPE_STRING,
        Value::Boolean(_) => TYPE_BOOLEAN,
        Value::Nil => TYPE_NIL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_names() {
        assert_eq!(TYPE_INT.as_str(), "int");
        assert_eq!(TYPE_FLOAT.as_str(), "float");
        assert_eq!(TYPE_STRING.as_str(), "string");
        assert_eq!(TYPE_BOOLEAN.as_str(), "boolean");
        assert_eq!(TYPE_NIL.as_str(), "nil");
        assert_eq!(TYPE_NONE.as_str(), "none");
    }

    #[test]
    fn test_tag_bits_partition_the_space() {
        let proc_type = TypeId::procedure(7);
        assert!(proc_type.is_procedure());
        assert!(!proc_type.is_structure());
        assert_eq!(proc_type.index(), 7);

        let struct_type = TypeId::structure(3);
        assert!(struct_type.is_structure());
        assert!(!struct_type.is_procedure());
        assert_eq!(struct_type.index(), 3);

        assert!(!TYPE_INT.is_procedure());
        assert!(!TYPE_INT.is_structure());
    }

    #[test]
    fn test_numeric_predicate() {
        assert!(TYPE_INT.is_numeric());
        assert!(TYPE_FLOAT.is_numeric());
        assert!(!TYPE_STRING.is_numeric());
        assert!(!TYPE_NONE.is_numeric());
    }

    #[test]
    fn test_boolean_convertibility() {
        assert!(TYPE_INT.convertible_to_boolean());
        assert!(TYPE_BOOLEAN.convertible_to_boolean());
        assert!(!TypeId::procedure(1).convertible_to_boolean());
        assert!(!TypeId::structure(1).convertible_to_boolean());
    }

    #[test]
    fn test_basic_type_of_token() {
        assert_eq!(basic_type_of_token(TokenKind::Int), TYPE_INT);
        assert_eq!(basic_type_of_token(TokenKind::Float), TYPE_FLOAT);
        assert_eq!(basic_type_of_token(TokenKind::String), TYPE_STRING);
        assert_eq!(basic_type_of_token(TokenKind::Identifier), TYPE_NONE);
        assert!(is_basic_type_token(TokenKind::Int));
        assert!(!is_basic_type_token(TokenKind::Identifier));
    }

    #[test]
    fn test_value_types() {
        assert_eq!(value_type(&Value::Integer(1)), TYPE_INT);
        assert_eq!(value_type(&Value::Real(1.0)), TYPE_FLOAT);
        assert_eq!(value_type(&Value::Str(String::new())), TYPE_STRING);
        assert_eq!(value_type(&Value::Boolean(true)), TYPE_BOOLEAN);
        assert_eq!(value_type(&Value::Nil), TYPE_NIL);
    }
}
