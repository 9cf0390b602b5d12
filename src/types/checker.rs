//! # Type checker for Tiny programs
//!
//! Assigns a type to every expression and `OK`/`ERROR` to every statement and
//! procedure. A failing node is marked `ERROR` and an error is recorded; nodes
//! whose operands are already `ERROR` become `ERROR` silently, so each problem
//! is reported once. The pass never stops early.

use std::collections::HashSet;

use tracing::{debug, warn};

use super::{compatible, TypeError, TypeErrorKind};
use crate::parser::{
    Ast, BinaryOp, Decl, DeclId, Expr, ExprId, ParamMode, Stmt, StmtId, Type, TypeId, UnaryOp,
};

/// Type checker pass over one resolved program
pub struct TypeChecker<'a> {
    ast: &'a mut Ast,
    errors: Vec<TypeError>,
}

impl<'a> TypeChecker<'a> {
    /// Creates a checker for a resolved program
    pub fn new(ast: &'a mut Ast) -> Self {
        TypeChecker {
            ast,
            errors: Vec::new(),
        }
    }

    /// Type check a complete program
    pub fn check_program(mut self) -> Result<(), Vec<TypeError>> {
        let program = self.ast.program.kind.clone();
        let ok = self.check_block(&program.decls, &program.body);
        self.ast.program.ann.ty = Some(if ok { TypeId::OK } else { TypeId::ERROR });

        debug!(errors = self.errors.len(), "type checking finished");
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }

    fn check_block(&mut self, decls: &[DeclId], body: &[StmtId]) -> bool {
        let before = self.errors.len();
        for decl in decls {
            self.check_decl(*decl);
        }
        for stmt in body {
            self.check_stmt(*stmt);
        }
        self.errors.len() == before
    }

    fn record(&mut self, pos: crate::lexer::Position, kind: TypeErrorKind) -> TypeId {
        let error = TypeError::new(pos, kind);
        warn!("{}", error);
        self.errors.push(error);
        TypeId::ERROR
    }

    fn bad_operand(&mut self, pos: crate::lexer::Position, construct: &str, found: TypeId) -> TypeId {
        let detail = self.ast.type_name(found);
        self.record(
            pos,
            TypeErrorKind::BadOperand {
                construct: construct.to_string(),
                detail,
            },
        )
    }

    // ========================================================================
    // Declarations and declared types
    // ========================================================================

    fn check_decl(&mut self, decl: DeclId) {
        match self.ast[decl].kind.clone() {
            Decl::Var { ty, .. } | Decl::Type { ty, .. } | Decl::Param { ty, .. } => {
                self.check_type(ty);
            }
            Decl::Proc {
                params,
                decls,
                body,
            ..
            } => {
                let before = self.errors.len();
                for param in &params {
                    self.check_decl(*param);
                }
                let ok = self.check_block(&decls, &body) && self.errors.len() == before;
                self.ast[decl].ann.ty = Some(if ok { TypeId::OK } else { TypeId::ERROR });
            }
        }
    }

    /// Validates a declared type; true if well formed
    fn check_type(&mut self, ty: TypeId) -> bool {
        let pos = self.ast[ty].pos;
        let ok = match self.ast[ty].kind.clone() {
            Type::Ref { name } => {
                let is_alias = self.ast[ty]
                    .ann
                    .binding
                    .is_some_and(|d| matches!(self.ast[d].kind, Decl::Type { .. }));
                if !is_alias {
                    self.record(
                        pos,
                        TypeErrorKind::BadOperand {
                            construct: "type reference".into(),
                            detail: format!("{} is not a type", name),
                        },
                    );
                }
                is_alias
            }
            Type::Array { elem, len } => {
                let elem_ok = self.check_type(elem);
                if len.starts_with('-') {
                    self.record(pos, TypeErrorKind::NegativeArray(len));
                    false
                } else {
                    elem_ok
                }
            }
            Type::Record { fields } => {
                let mut ok = true;
                let mut seen = HashSet::new();
                for field in fields {
                    let node = self.ast[field].clone();
                    if !seen.insert(node.kind.name.clone()) {
                        self.record(node.pos, TypeErrorKind::DuplicateField(node.kind.name));
                        ok = false;
                    }
                    ok &= self.check_type(node.kind.ty);
                }
                ok
            }
            Type::Pointer { elem } => self.check_type(elem),
            _ => true,
        };
        if !ok {
            self.ast[ty].ann.ty = Some(TypeId::ERROR);
        }
        ok
    }

    // ========================================================================
    // Statements
    // ========================================================================

    fn check_stmts(&mut self, stmts: &[StmtId]) -> bool {
        let mut ok = true;
        for stmt in stmts {
            ok &= self.check_stmt(*stmt) == TypeId::OK;
        }
        ok
    }

    fn check_stmt(&mut self, stmt: StmtId) -> TypeId {
        let pos = self.ast[stmt].pos;
        let ty = match self.ast[stmt].kind.clone() {
            Stmt::Assign { lhs, rhs } => {
                let lt = self.check_expr(lhs);
                let rt = self.check_expr(rhs);
                if lt == TypeId::ERROR || rt == TypeId::ERROR {
                    TypeId::ERROR
                } else if !compatible(self.ast, lt, rt) {
                    let left = self.ast.type_name(lt);
                    let right = self.ast.type_name(rt);
                    self.record(pos, TypeErrorKind::Incompatible { left, right })
                } else if !self.ast.is_designator(lhs) {
                    self.record(
                        pos,
                        TypeErrorKind::NotDesignator {
                            context: "assignment",
                        },
                    )
                } else {
                    TypeId::OK
                }
            }
            Stmt::Call { callee, args } => self.check_call(pos, callee, &args),
            Stmt::Seq { decls, body } => {
                if self.check_block(&decls, &body) {
                    TypeId::OK
                } else {
                    TypeId::ERROR
                }
            }
            Stmt::IfThen { cond, then_branch } => {
                let cond_ok = self.check_condition(cond, "if");
                let body_ok = self.check_stmts(&then_branch);
                ok_if(cond_ok && body_ok)
            }
            Stmt::IfThenElse {
                cond,
                then_branch,
                else_branch,
            } => {
                let cond_ok = self.check_condition(cond, "if");
                let then_ok = self.check_stmts(&then_branch);
                let else_ok = self.check_stmts(&else_branch);
                ok_if(cond_ok && then_ok && else_ok)
            }
            Stmt::While { cond, body } => {
                let cond_ok = self.check_condition(cond, "while");
                let body_ok = self.check_stmts(&body);
                ok_if(cond_ok && body_ok)
            }
            Stmt::Read(target) => {
                let ty = self.check_expr(target);
                if ty == TypeId::ERROR {
                    TypeId::ERROR
                } else if !self.ast.is_designator(target) {
                    self.record(pos, TypeErrorKind::NotDesignator { context: "read" })
                } else if matches!(
                    self.ast[self.ast.ref_fact(ty)].kind,
                    Type::Int | Type::Real | Type::Str
                ) {
                    TypeId::OK
                } else {
                    self.bad_operand(pos, "read", ty)
                }
            }
            Stmt::Write(value) => {
                let ty = self.check_expr(value);
                if ty == TypeId::ERROR {
                    TypeId::ERROR
                } else if matches!(
                    self.ast[self.ast.ref_fact(ty)].kind,
                    Type::Int | Type::Real | Type::Bool | Type::Str
                ) {
                    TypeId::OK
                } else {
                    self.bad_operand(pos, "write", ty)
                }
            }
            Stmt::NewLine => TypeId::OK,
            Stmt::New(pointer) => self.check_pointer_stmt(pos, pointer, "new"),
            Stmt::Delete(pointer) => self.check_pointer_stmt(pos, pointer, "delete"),
        };
        self.ast[stmt].ann.ty = Some(ty);
        ty
    }

    fn check_call(&mut self, pos: crate::lexer::Position, callee: ExprId, args: &[ExprId]) -> TypeId {
        let arg_types: Vec<TypeId> = args.iter().map(|a| self.check_expr(*a)).collect();

        let binding = self.ast[callee].ann.binding;
        let params = match binding.map(|d| self.ast[d].kind.clone()) {
            Some(Decl::Proc { params, .. }) => params,
            _ => {
                self.ast[callee].ann.ty = Some(TypeId::ERROR);
                let name = match &self.ast[callee].kind {
                    Expr::Ident(name) => name.clone(),
                    _ => String::new(),
                };
                return self.record(
                    pos,
                    TypeErrorKind::BadOperand {
                        construct: "call".into(),
                        detail: format!("{} is not a procedure", name),
                    },
                );
            }
        };
        self.ast[callee].ann.ty = Some(TypeId::OK);

        if params.len() != args.len() {
            return self.record(
                pos,
                TypeErrorKind::BadOperand {
                    construct: "call".into(),
                    detail: format!("{} arguments, expected {}", args.len(), params.len()),
                },
            );
        }

        let mut ok = true;
        for ((param, arg), arg_ty) in params.iter().zip(args).zip(arg_types) {
            let Decl::Param { ty, mode, .. } = self.ast[*param].kind.clone() else {
                continue;
            };
            let arg_pos = self.ast[*arg].pos;
            if arg_ty == TypeId::ERROR {
                ok = false;
            } else if mode == ParamMode::Reference && !self.ast.is_designator(*arg) {
                self.record(
                    arg_pos,
                    TypeErrorKind::NotDesignator {
                        context: "reference argument",
                    },
                );
                ok = false;
            } else if !compatible(self.ast, ty, arg_ty) {
                let left = self.ast.type_name(ty);
                let right = self.ast.type_name(arg_ty);
                self.record(arg_pos, TypeErrorKind::Incompatible { left, right });
                ok = false;
            }
        }
        ok_if(ok)
    }

    fn check_condition(&mut self, cond: ExprId, construct: &str) -> bool {
        let ty = self.check_expr(cond);
        if ty == TypeId::ERROR {
            return false;
        }
        if matches!(self.ast[self.ast.ref_fact(ty)].kind, Type::Bool) {
            true
        } else {
            let pos = self.ast[cond].pos;
            self.bad_operand(pos, construct, ty);
            false
        }
    }

    fn check_pointer_stmt(
        &mut self,
        pos: crate::lexer::Position,
        pointer: ExprId,
        construct: &str,
    ) -> TypeId {
        let ty = self.check_expr(pointer);
        if ty == TypeId::ERROR {
            TypeId::ERROR
        } else if matches!(self.ast[self.ast.ref_fact(ty)].kind, Type::Pointer { .. }) {
            TypeId::OK
        } else {
            self.bad_operand(pos, construct, ty)
        }
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn check_expr(&mut self, expr: ExprId) -> TypeId {
        let pos = self.ast[expr].pos;
        let ty = match self.ast[expr].kind.clone() {
            Expr::Int(_) => TypeId::INT,
            Expr::Real(_) => TypeId::REAL,
            Expr::Str(_) => TypeId::STR,
            Expr::True | Expr::False => TypeId::BOOL,
            Expr::Nil => TypeId::NULL,
            Expr::Ident(name) => {
                let binding = self.ast[expr].ann.binding;
                match binding.map(|d| self.ast[d].kind.clone()) {
                    Some(Decl::Var { ty, .. }) | Some(Decl::Param { ty, .. }) => ty,
                    _ => self.record(
                        pos,
                        TypeErrorKind::BadOperand {
                            construct: "expression".into(),
                            detail: format!("{} is not a variable", name),
                        },
                    ),
                }
            }
            Expr::Binary { op, lhs, rhs } => {
                let lt = self.check_expr(lhs);
                let rt = self.check_expr(rhs);
                self.check_binary(pos, op, lt, rt)
            }
            Expr::Unary { op, operand } => {
                let ty = self.check_expr(operand);
                if ty == TypeId::ERROR {
                    TypeId::ERROR
                } else {
                    let kind = self.ast[self.ast.ref_fact(ty)].kind.clone();
                    match (op, kind) {
                        (UnaryOp::Not, Type::Bool) => TypeId::BOOL,
                        (UnaryOp::Neg, Type::Int) => TypeId::INT,
                        (UnaryOp::Neg, Type::Real) => TypeId::REAL,
                        (UnaryOp::Not, _) => self.bad_operand(pos, "not", ty),
                        (UnaryOp::Neg, _) => self.bad_operand(pos, "-", ty),
                    }
                }
            }
            Expr::Index { array, index } => {
                let at = self.check_expr(array);
                let it = self.check_expr(index);
                if at == TypeId::ERROR || it == TypeId::ERROR {
                    TypeId::ERROR
                } else {
                    match self.ast[self.ast.ref_fact(at)].kind {
                        Type::Array { elem, .. } if self.ast.is_int(it) => elem,
                        Type::Array { .. } => self.bad_operand(pos, "array index", it),
                        _ => self.bad_operand(pos, "indexing", at),
                    }
                }
            }
            Expr::Field { record, name } => {
                let rt = self.check_expr(record);
                if rt == TypeId::ERROR {
                    TypeId::ERROR
                } else {
                    let field = match &self.ast[self.ast.ref_fact(rt)].kind {
                        Type::Record { fields } => fields
                            .iter()
                            .find(|f| self.ast[**f].kind.name == name)
                            .map(|f| self.ast[*f].kind.ty),
                        _ => None,
                    };
                    match field {
                        Some(ty) => ty,
                        None => {
                            let detail = format!("{} has no field {}", self.ast.type_name(rt), name);
                            self.record(
                                pos,
                                TypeErrorKind::BadOperand {
                                    construct: "field access".into(),
                                    detail,
                                },
                            )
                        }
                    }
                }
            }
            Expr::Deref(pointer) => {
                let pt = self.check_expr(pointer);
                if pt == TypeId::ERROR {
                    TypeId::ERROR
                } else {
                    match self.ast[self.ast.ref_fact(pt)].kind {
                        Type::Pointer { elem } => elem,
                        _ => self.bad_operand(pos, "dereference", pt),
                    }
                }
            }
        };
        self.ast[expr].ann.ty = Some(ty);
        ty
    }

    fn check_binary(&mut self, pos: crate::lexer::Position, op: BinaryOp, lt: TypeId, rt: TypeId) -> TypeId {
        if lt == TypeId::ERROR || rt == TypeId::ERROR {
            return TypeId::ERROR;
        }
        let left = self.ast[self.ast.ref_fact(lt)].kind.clone();
        let right = self.ast[self.ast.ref_fact(rt)].kind.clone();
        let numeric = |t: &Type| matches!(t, Type::Int | Type::Real);
        let reference = |t: &Type| matches!(t, Type::Pointer { .. } | Type::Null);

        let result = match op {
            BinaryOp::Eq | BinaryOp::Ne => {
                let ok = (numeric(&left) && numeric(&right))
                    || matches!((&left, &right), (Type::Bool, Type::Bool) | (Type::Str, Type::Str))
                    || (reference(&left) && reference(&right));
                ok.then_some(TypeId::BOOL)
            }
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let ok = (numeric(&left) && numeric(&right))
                    || matches!((&left, &right), (Type::Bool, Type::Bool) | (Type::Str, Type::Str));
                ok.then_some(TypeId::BOOL)
            }
            BinaryOp::And | BinaryOp::Or => {
                matches!((&left, &right), (Type::Bool, Type::Bool)).then_some(TypeId::BOOL)
            }
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => match (&left, &right) {
                (Type::Int, Type::Int) => Some(TypeId::INT),
                (l, r) if numeric(l) && numeric(r) => Some(TypeId::REAL),
                _ => None,
            },
            BinaryOp::Mod => matches!((&left, &right), (Type::Int, Type::Int)).then_some(TypeId::INT),
        };

        match result {
            Some(ty) => ty,
            None => {
                let detail = format!("{} and {}", self.ast.type_name(lt), self.ast.type_name(rt));
                self.record(
                    pos,
                    TypeErrorKind::BadOperand {
                        construct: format!("'{}'", op),
                        detail,
                    },
                )
            }
        }
    }
}

fn ok_if(ok: bool) -> TypeId {
    if ok {
        TypeId::OK
    } else {
        TypeId::ERROR
    }
}
