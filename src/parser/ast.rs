//! Abstract syntax tree for Tiny programs
//!
//! Nodes live in per-category arenas owned by [`Ast`] and refer to each other by
//! typed ids. Every node carries the same [`Annotations`] header, which the
//! compiler passes fill in one after another: the resolver writes `binding`, the
//! type checker `ty`, the layout pass `level`/`addr`/`size`/`offset` and the
//! labeller `begin`/`next`.

use std::collections::VecDeque;
use std::fmt;
use std::ops::{Index, IndexMut};

use crate::lexer::Position;

macro_rules! node_id {
    ($(#[$meta:meta])* $name:ident, $field:ident, $kind:ty) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) usize);

        impl $name {
            /// Position of the node in its arena
            pub fn index(self) -> usize {
                self.0
            }
        }

        impl Index<$name> for Ast {
            type Output = Node<$kind>;

            fn index(&self, id: $name) -> &Self::Output {
                &self.$field[id.0]
            }
        }

        impl IndexMut<$name> for Ast {
            fn index_mut(&mut self, id: $name) -> &mut Self::Output {
                &mut self.$field[id.0]
            }
        }
    };
}

node_id!(
    /// Id of a declaration (variable, type alias, procedure or parameter)
    DeclId, decls, Decl
);
node_id!(
    /// Id of a type node
    TypeId, types, Type
);
node_id!(
    /// Id of a record field
    FieldId, fields, Field
);
node_id!(
    /// Id of a statement
    StmtId, stmts, Stmt
);
node_id!(
    /// Id of an expression
    ExprId, exprs, Expr
);

impl TypeId {
    /// Shared `int` singleton
    pub const INT: TypeId = TypeId(0);
    /// Shared `real` singleton
    pub const REAL: TypeId = TypeId(1);
    /// Shared `bool` singleton
    pub const BOOL: TypeId = TypeId(2);
    /// Shared `string` singleton
    pub const STR: TypeId = TypeId(3);
    /// Type of the `nil` literal
    pub const NULL: TypeId = TypeId(4);
    /// Well-typed statement marker
    pub const OK: TypeId = TypeId(5);
    /// Ill-typed node marker
    pub const ERROR: TypeId = TypeId(6);
}

/// Mutable per-node annotations written by the compiler passes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Annotations {
    /// Declaration a name use resolves to
    pub binding: Option<DeclId>,
    /// Semantic type, or one of the `OK`/`ERROR`/`NULL` sentinels
    pub ty: Option<TypeId>,
    /// Lexical nesting level (0 = global)
    pub level: usize,
    /// Storage address, relative to the frame for locals
    pub addr: usize,
    /// Number of cells; `None` until the layout pass sizes the node
    pub size: Option<usize>,
    /// Offset of a record field inside its record
    pub offset: usize,
    /// PC of the first emitted instruction
    pub begin: usize,
    /// PC just past the last emitted instruction
    pub next: usize,
}

/// A node of any category: its variant, source position and annotations
#[derive(Debug, Clone, PartialEq)]
pub struct Node<K> {
    /// Category-specific payload
    pub kind: K,
    /// Source position (immutable)
    pub pos: Position,
    /// Pass annotations
    pub ann: Annotations,
}

impl<K> Node<K> {
    fn new(kind: K, pos: Position) -> Self {
        Node {
            kind,
            pos,
            ann: Annotations::default(),
        }
    }
}

/// Root of a program: global declarations followed by the main statements
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    /// Global declarations
    pub decls: Vec<DeclId>,
    /// Main body
    pub body: Vec<StmtId>,
}

/// Parameter passing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamMode {
    /// By value (`Pval`)
    Value,
    /// By reference (`Pvar`)
    Reference,
}

/// Declarations
#[derive(Debug, Clone, PartialEq)]
pub enum Decl {
    /// `var id: type`
    Var {
        /// Variable name
        name: String,
        /// Declared type
        ty: TypeId,
    },
    /// `type id = type`
    Type {
        /// Alias name
        name: String,
        /// Aliased type
        ty: TypeId,
    },
    /// `proc id(params); decls stmts proc end`
    Proc {
        /// Procedure name
        name: String,
        /// Formal parameters, each a `Param` declaration
        params: Vec<DeclId>,
        /// Local declarations
        decls: Vec<DeclId>,
        /// Body statements
        body: Vec<StmtId>,
    },
    /// Formal parameter
    Param {
        /// Parameter name
        name: String,
        /// Declared type
        ty: TypeId,
        /// By value or by reference
        mode: ParamMode,
    },
}

impl Decl {
    /// Name introduced by the declaration
    pub fn name(&self) -> &str {
        match self {
            Decl::Var { name, .. }
            | Decl::Type { name, .. }
            | Decl::Proc { name, .. }
            | Decl::Param { name, .. } => name,
        }
    }

    /// Declared type, for every declaration except procedures
    pub fn declared_type(&self) -> Option<TypeId> {
        match self {
            Decl::Var { ty, .. } | Decl::Type { ty, .. } | Decl::Param { ty, .. } => Some(*ty),
            Decl::Proc { .. } => None,
        }
    }
}

/// Types
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    /// `int`
    Int,
    /// `real`
    Real,
    /// `bool`
    Bool,
    /// `string`
    Str,
    /// Use of a named type alias
    Ref {
        /// Alias name
        name: String,
    },
    /// `array(elem, len)`
    Array {
        /// Element type
        elem: TypeId,
        /// Element count as written, possibly with a leading `-`
        len: String,
    },
    /// `record(f: T, ...)`
    Record {
        /// Fields in declaration order
        fields: Vec<FieldId>,
    },
    /// `pointer(elem)`
    Pointer {
        /// Pointee type
        elem: TypeId,
    },
    /// Type of `nil`
    Null,
    /// Well-typed statement marker
    Ok,
    /// Ill-typed node marker
    Error,
}

/// A record field
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Field name
    pub name: String,
    /// Field type
    pub ty: TypeId,
}

/// Statements
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `lhs := rhs`
    Assign {
        /// Target designator
        lhs: ExprId,
        /// Assigned value
        rhs: ExprId,
    },
    /// `callee(args)`
    Call {
        /// Identifier naming the procedure
        callee: ExprId,
        /// Actual arguments
        args: Vec<ExprId>,
    },
    /// `begin decls stmts end`
    Seq {
        /// Block-local declarations
        decls: Vec<DeclId>,
        /// Block statements
        body: Vec<StmtId>,
    },
    /// `if cond then stmts end`
    IfThen {
        /// Condition
        cond: ExprId,
        /// Statements run when the condition holds
        then_branch: Vec<StmtId>,
    },
    /// `if cond then stmts else stmts end`
    IfThenElse {
        /// Condition
        cond: ExprId,
        /// Statements run when the condition holds
        then_branch: Vec<StmtId>,
        /// Statements run otherwise
        else_branch: Vec<StmtId>,
    },
    /// `while cond do stmts end`
    While {
        /// Loop condition
        cond: ExprId,
        /// Loop body
        body: Vec<StmtId>,
    },
    /// `read(designator)`
    Read(ExprId),
    /// `write(expr)`
    Write(ExprId),
    /// `newline()`
    NewLine,
    /// `new(pointer)`
    New(ExprId),
    /// `delete(pointer)`
    Delete(ExprId),
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<=`
    Le,
    /// `>=`
    Ge,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `and`
    And,
    /// `or`
    Or,
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
}

impl BinaryOp {
    /// True for `== != <= >= < >`
    pub fn is_relational(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Le | BinaryOp::Ge | BinaryOp::Lt | BinaryOp::Gt
        )
    }

    /// Operator as written in source
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `not`
    Not,
    /// `-`
    Neg,
}

/// Expressions
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Integer literal
    Int(i64),
    /// Real literal
    Real(f64),
    /// String literal
    Str(String),
    /// Name use
    Ident(String),
    /// `true`
    True,
    /// `false`
    False,
    /// `nil`
    Nil,
    /// `lhs op rhs`
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        lhs: ExprId,
        /// Right operand
        rhs: ExprId,
    },
    /// `op operand`
    Unary {
        /// Operator
        op: UnaryOp,
        /// Operand
        operand: ExprId,
    },
    /// `array[index]`
    Index {
        /// Array designator
        array: ExprId,
        /// Element index
        index: ExprId,
    },
    /// `record.name`
    Field {
        /// Record designator
        record: ExprId,
        /// Field name
        name: String,
    },
    /// `pointer^`
    Deref(ExprId),
}

impl Expr {
    /// Designators denote memory locations: identifiers, indexing, field access
    /// and dereference
    pub fn is_designator(&self) -> bool {
        matches!(
            self,
            Expr::Ident(_) | Expr::Index { .. } | Expr::Field { .. } | Expr::Deref(_)
        )
    }
}

/// Arena holding every node of one program
#[derive(Debug, Clone)]
pub struct Ast {
    decls: Vec<Node<Decl>>,
    types: Vec<Node<Type>>,
    fields: Vec<Node<Field>>,
    stmts: Vec<Node<Stmt>>,
    exprs: Vec<Node<Expr>>,
    /// The program root
    pub program: Node<Program>,
}

impl Default for Ast {
    fn default() -> Self {
        Self::new()
    }
}

impl Ast {
    /// Creates an empty program with the shared basic and sentinel types
    pub fn new() -> Self {
        let origin = Position::default();
        let mut ast = Ast {
            decls: Vec::new(),
            types: Vec::new(),
            fields: Vec::new(),
            stmts: Vec::new(),
            exprs: Vec::new(),
            program: Node::new(Program::default(), Position::new(1, 1)),
        };
        for kind in [
            Type::Int,
            Type::Real,
            Type::Bool,
            Type::Str,
            Type::Null,
            Type::Ok,
            Type::Error,
        ] {
            let id = ast.add_type(kind, origin);
            ast[id].ann.size = Some(1);
        }
        ast
    }

    /// Adds a declaration
    pub fn add_decl(&mut self, kind: Decl, pos: Position) -> DeclId {
        self.decls.push(Node::new(kind, pos));
        DeclId(self.decls.len() - 1)
    }

    /// Adds a type node
    pub fn add_type(&mut self, kind: Type, pos: Position) -> TypeId {
        self.types.push(Node::new(kind, pos));
        TypeId(self.types.len() - 1)
    }

    /// Adds a record field
    pub fn add_field(&mut self, field: Field, pos: Position) -> FieldId {
        self.fields.push(Node::new(field, pos));
        FieldId(self.fields.len() - 1)
    }

    /// Adds a statement
    pub fn add_stmt(&mut self, kind: Stmt, pos: Position) -> StmtId {
        self.stmts.push(Node::new(kind, pos));
        StmtId(self.stmts.len() - 1)
    }

    /// Adds an expression
    pub fn add_expr(&mut self, kind: Expr, pos: Position) -> ExprId {
        self.exprs.push(Node::new(kind, pos));
        ExprId(self.exprs.len() - 1)
    }

    /// Number of statements in the arena
    pub fn stmt_count(&self) -> usize {
        self.stmts.len()
    }

    /// Number of expressions in the arena
    pub fn expr_count(&self) -> usize {
        self.exprs.len()
    }

    /// Iterates over every statement id
    pub fn stmt_ids(&self) -> impl Iterator<Item = StmtId> {
        (0..self.stmts.len()).map(StmtId)
    }

    /// Iterates over every expression id
    pub fn expr_ids(&self) -> impl Iterator<Item = ExprId> {
        (0..self.exprs.len()).map(ExprId)
    }

    /// Iterates over every declaration id
    pub fn decl_ids(&self) -> impl Iterator<Item = DeclId> {
        (0..self.decls.len()).map(DeclId)
    }

    /// Type of an expression after type checking, `ERROR` if unset
    pub fn type_of(&self, expr: ExprId) -> TypeId {
        self[expr].ann.ty.unwrap_or(TypeId::ERROR)
    }

    /// Size of a type after layout, 0 if unset
    pub fn size_of(&self, ty: TypeId) -> usize {
        self[ty].ann.size.unwrap_or(0)
    }

    /// True if the expression denotes a memory location
    pub fn is_designator(&self, expr: ExprId) -> bool {
        self[expr].kind.is_designator()
    }

    /// Follows named aliases to the first non-`Ref` type
    ///
    /// An unbound alias, or one bound to something other than a typed
    /// declaration, yields `ERROR`.
    pub fn ref_fact(&self, mut ty: TypeId) -> TypeId {
        while let Type::Ref { .. } = self[ty].kind {
            ty = match self.alias_target(ty) {
                Some(target) => target,
                None => return TypeId::ERROR,
            };
        }
        ty
    }

    /// Type a `Ref` node's declaration stands for
    pub fn alias_target(&self, ty: TypeId) -> Option<TypeId> {
        let decl = self[ty].ann.binding?;
        self[decl].kind.declared_type()
    }

    /// True if the unwrapped type is `int`
    pub fn is_int(&self, ty: TypeId) -> bool {
        matches!(self[self.ref_fact(ty)].kind, Type::Int)
    }

    /// True if the unwrapped type is `real`
    pub fn is_real(&self, ty: TypeId) -> bool {
        matches!(self[self.ref_fact(ty)].kind, Type::Real)
    }

    /// Human-readable rendering of a type, used in diagnostics
    pub fn type_name(&self, ty: TypeId) -> String {
        match &self[ty].kind {
            Type::Int => "int".into(),
            Type::Real => "real".into(),
            Type::Bool => "bool".into(),
            Type::Str => "string".into(),
            Type::Ref { name } => name.clone(),
            Type::Array { elem, len } => format!("array<{}, {}>", self.type_name(*elem), len),
            Type::Record { fields } => {
                let fields: Vec<String> = fields
                    .iter()
                    .map(|f| format!("{}: {}", self[*f].kind.name, self.type_name(self[*f].kind.ty)))
                    .collect();
                format!("record<{}>", fields.join(", "))
            }
            Type::Pointer { elem } => format!("pointer<{}>", self.type_name(*elem)),
            Type::Null => "null".into(),
            Type::Ok => "ok".into(),
            Type::Error => "error".into(),
        }
    }

    /// Procedures in code-generation order
    ///
    /// Breadth first: procedures declared at global level (including those of
    /// `begin ... end` blocks in the main body), then for each collected
    /// procedure the ones nested inside it.
    pub fn collect_procs(&self) -> Vec<DeclId> {
        let mut procs = Vec::new();
        let mut queue = VecDeque::new();
        self.enqueue_procs(&self.program.kind.decls, &self.program.kind.body, &mut queue);
        while let Some(proc) = queue.pop_front() {
            procs.push(proc);
            if let Decl::Proc { decls, body, .. } = &self[proc].kind {
                self.enqueue_procs(decls, body, &mut queue);
            }
        }
        procs
    }

    fn enqueue_procs(&self, decls: &[DeclId], body: &[StmtId], queue: &mut VecDeque<DeclId>) {
        queue.extend(
            decls
                .iter()
                .copied()
                .filter(|d| matches!(self[*d].kind, Decl::Proc { .. })),
        );
        for stmt in body {
            match &self[*stmt].kind {
                Stmt::Seq { decls, body } => self.enqueue_procs(decls, body, queue),
                Stmt::IfThen { then_branch, .. } => self.enqueue_procs(&[], then_branch, queue),
                Stmt::IfThenElse {
                    then_branch,
                    else_branch,
                    ..
                } => {
                    self.enqueue_procs(&[], then_branch, queue);
                    self.enqueue_procs(&[], else_branch, queue);
                }
                Stmt::While { body, .. } => self.enqueue_procs(&[], body, queue),
                _ => {}
            }
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels_are_preallocated() {
        let ast = Ast::new();
        assert_eq!(ast[TypeId::INT].kind, Type::Int);
        assert_eq!(ast[TypeId::ERROR].kind, Type::Error);
        assert_eq!(ast.size_of(TypeId::REAL), 1);
    }

    #[test]
    fn test_ref_fact_follows_alias_chain() {
        let mut ast = Ast::new();
        let pos = Position::new(1, 1);
        let real = ast.add_type(Type::Real, pos);
        let a = ast.add_decl(Decl::Type { name: "A".into(), ty: real }, pos);
        let ref_a = ast.add_type(Type::Ref { name: "A".into() }, pos);
        ast[ref_a].ann.binding = Some(a);
        let b = ast.add_decl(Decl::Type { name: "B".into(), ty: ref_a }, pos);
        let ref_b = ast.add_type(Type::Ref { name: "B".into() }, pos);
        ast[ref_b].ann.binding = Some(b);

        assert_eq!(ast.ref_fact(ref_b), real);
        assert!(ast.is_real(ref_b));
        assert_eq!(ast.type_name(ref_b), "B");
    }

    #[test]
    fn test_unbound_ref_is_error() {
        let mut ast = Ast::new();
        let dangling = ast.add_type(Type::Ref { name: "X".into() }, Position::default());
        assert_eq!(ast.ref_fact(dangling), TypeId::ERROR);
    }

    #[test]
    fn test_designators() {
        assert!(Expr::Ident("x".into()).is_designator());
        assert!(Expr::Deref(ExprId(0)).is_designator());
        assert!(!Expr::Int(1).is_designator());
        assert!(!Expr::Nil.is_designator());
    }
}
