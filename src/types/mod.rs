//! # Tiny type system
//!
//! Type errors, structural type compatibility and the [`TypeChecker`] pass.
//!
//! Types are AST nodes. Named aliases (`Ref`) are compared structurally after
//! unwrapping, so two differently named aliases of `pointer(...)` records are
//! compatible when their shapes agree, including recursive shapes reached
//! through pointers:
//!
//! ```text
//! type A = record(v: int, next: pointer(A));
//! type B = record(v: int, next: pointer(B));   # compatible with A
//! ```

pub mod checker;

pub use checker::TypeChecker;

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use crate::lexer::Position;
use crate::parser::{Ast, Type, TypeId};

/// What went wrong in a type error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TypeErrorKind {
    /// Operands or assignment sides whose types do not match
    #[error("incompatible types {left} and {right}")]
    Incompatible {
        /// Type of the target or left operand
        left: String,
        /// Type of the source or right operand
        right: String,
    },

    /// An expression used where a memory location is required
    #[error("{context} requires a designator")]
    NotDesignator {
        /// Construct requiring the designator
        context: &'static str,
    },

    /// Two fields of one record share a name
    #[error("duplicate field \"{0}\"")]
    DuplicateField(String),

    /// Array declared with a negative size
    #[error("negative array size {0}")]
    NegativeArray(String),

    /// Array size that cannot be represented
    #[error("array size {0} out of range")]
    ArraySizeOutOfRange(String),

    /// Operand of the wrong kind for a construct
    #[error("invalid operand for {construct}: {detail}")]
    BadOperand {
        /// The construct, e.g. `while` or `+`
        construct: String,
        /// What was found instead
        detail: String,
    },
}

/// A type error with its source position
#[derive(Debug, Clone, PartialEq)]
pub struct TypeError {
    /// Position of the offending node
    pub pos: Position,
    /// Error detail
    pub kind: TypeErrorKind,
}

impl TypeError {
    /// Creates a type error at a position
    pub fn new(pos: Position, kind: TypeErrorKind) -> Self {
        TypeError { pos, kind }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type error at {}: {}", self.pos, self.kind)
    }
}

impl std::error::Error for TypeError {}

/// Structural compatibility of two types
///
/// Reflexive and symmetric. Recursion through named types is cut by assuming a
/// pair of alias names compatible while its structure is being compared.
pub fn compatible(ast: &Ast, t1: TypeId, t2: TypeId) -> bool {
    let mut assumed = HashMap::new();
    compatible_with(ast, t1, t2, &mut assumed)
}

fn compatible_with(
    ast: &Ast,
    mut t1: TypeId,
    mut t2: TypeId,
    assumed: &mut HashMap<(String, String), bool>,
) -> bool {
    let mut pair = None;

    // Walk both alias chains in lock-step while both sides are still names
    while let (Type::Ref { name: n1 }, Type::Ref { name: n2 }) = (&ast[t1].kind, &ast[t2].kind) {
        if n1 == n2 {
            return true;
        }
        let key = if n1 <= n2 {
            (n1.clone(), n2.clone())
        } else {
            (n2.clone(), n1.clone())
        };
        if let Some(&known) = assumed.get(&key) {
            return known;
        }
        pair = Some(key);
        match (ast.alias_target(t1), ast.alias_target(t2)) {
            (Some(next1), Some(next2)) => {
                t1 = next1;
                t2 = next2;
            }
            _ => return false,
        }
    }

    if let Some(key) = &pair {
        assumed.insert(key.clone(), true);
    }

    let t1 = ast.ref_fact(t1);
    let t2 = ast.ref_fact(t2);
    let result = match (&ast[t1].kind, &ast[t2].kind) {
        (Type::Int | Type::Real, Type::Int | Type::Real) => true,
        (Type::Bool, Type::Bool) | (Type::Str, Type::Str) => true,
        (Type::Array { elem: e1, .. }, Type::Array { elem: e2, .. }) => {
            compatible_with(ast, *e1, *e2, assumed)
        }
        (Type::Pointer { .. }, Type::Null) | (Type::Null, Type::Pointer { .. }) => true,
        (Type::Pointer { elem: e1 }, Type::Pointer { elem: e2 }) => {
            compatible_with(ast, *e1, *e2, assumed)
        }
        (Type::Record { fields: f1 }, Type::Record { fields: f2 }) => {
            f1.len() == f2.len()
                && f1
                    .iter()
                    .zip(f2)
                    .all(|(a, b)| compatible_with(ast, ast[*a].kind.ty, ast[*b].kind.ty, assumed))
        }
        _ => false,
    };

    if let Some(key) = pair {
        assumed.insert(key, result);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Resolver;
    use crate::parser::{parse_source, Decl};

    fn declared(source: &str) -> (Ast, Vec<TypeId>) {
        let mut ast = parse_source(source).unwrap();
        Resolver::new(&mut ast).resolve().unwrap();
        let types = ast
            .program
            .kind
            .decls
            .iter()
            .filter_map(|d| match &ast[*d].kind {
                Decl::Var { ty, .. } => Some(*ty),
                _ => None,
            })
            .collect();
        (ast, types)
    }

    #[test]
    fn test_numeric_types_are_compatible() {
        let ast = Ast::new();
        assert!(compatible(&ast, TypeId::INT, TypeId::REAL));
        assert!(compatible(&ast, TypeId::REAL, TypeId::INT));
        assert!(!compatible(&ast, TypeId::INT, TypeId::BOOL));
        assert!(!compatible(&ast, TypeId::STR, TypeId::BOOL));
    }

    #[test]
    fn test_null_is_compatible_with_pointers_only() {
        let (ast, vars) = declared("var p: pointer(int); var i: int;");
        assert!(compatible(&ast, vars[0], TypeId::NULL));
        assert!(compatible(&ast, TypeId::NULL, vars[0]));
        assert!(!compatible(&ast, vars[1], TypeId::NULL));
        assert!(!compatible(&ast, TypeId::NULL, TypeId::NULL));
    }

    #[test]
    fn test_records_compare_fields_in_order() {
        let (ast, vars) = declared(
            "var a: record(x: int, y: real); \
             var b: record(p: real, q: int); \
             var c: record(x: int, y: bool); \
             var d: record(x: int);",
        );
        assert!(compatible(&ast, vars[0], vars[1]));
        assert!(!compatible(&ast, vars[0], vars[2]));
        assert!(!compatible(&ast, vars[0], vars[3]));
    }

    #[test]
    fn test_recursive_named_types() {
        let (ast, vars) = declared(
            "type A = record(v: int, next: pointer(A)); \
             type B = record(v: int, next: pointer(B)); \
             type C = record(v: bool, next: pointer(C)); \
             var a: A; var b: B; var c: C;",
        );
        assert!(compatible(&ast, vars[0], vars[0]));
        assert!(compatible(&ast, vars[0], vars[1]));
        assert!(compatible(&ast, vars[1], vars[0]));
        assert!(!compatible(&ast, vars[0], vars[2]));
        assert!(!compatible(&ast, vars[2], vars[1]));
    }

    #[test]
    fn test_mutually_recursive_types() {
        let (ast, vars) = declared(
            "type P = pointer(Q); type Q = record(back: P); \
             type R = pointer(S); type S = record(back: R); \
             var p: P; var r: R; var s: S;",
        );
        assert!(compatible(&ast, vars[0], vars[1]));
        assert!(!compatible(&ast, vars[0], vars[2]));
    }

    #[test]
    fn test_arrays_compare_elements() {
        let (ast, vars) = declared(
            "var a: array(int, 3); var b: array(real, 5); var c: array(bool, 3);",
        );
        assert!(compatible(&ast, vars[0], vars[1]));
        assert!(!compatible(&ast, vars[0], vars[2]));
    }

    #[test]
    fn test_type_error_display() {
        let err = TypeError::new(Position::new(3, 9), TypeErrorKind::DuplicateField("x".into()));
        assert_eq!(err.to_string(), "type error at (l:3; c:9): duplicate field \"x\"");
    }
}
