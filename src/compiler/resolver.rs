//! Name resolution
//!
//! Binds every name use (identifiers and named types) to its declaration.
//! Declarations of one block are processed in two passes so that a pointer may
//! name a type declared later in the same block:
//!
//! 1. resolve each declaration's type, except a named type directly under a
//!    `pointer(...)`, and insert the declaration into the current scope;
//! 2. resolve the named types skipped in pass 1.

use tracing::debug;

use super::symbols::SymbolTable;
use crate::error::{Error, Result};
use crate::lexer::Position;
use crate::parser::{Ast, Decl, DeclId, Expr, ExprId, Stmt, StmtId, Type, TypeId};

/// Resolver pass over one program
pub struct Resolver<'a> {
    ast: &'a mut Ast,
    symbols: SymbolTable,
    bound: usize,
}

impl<'a> Resolver<'a> {
    /// Creates a resolver for a freshly parsed program
    pub fn new(ast: &'a mut Ast) -> Self {
        Resolver {
            ast,
            symbols: SymbolTable::new(),
            bound: 0,
        }
    }

    /// Resolves the whole program, failing on the first undeclared or
    /// duplicate name
    pub fn resolve(mut self) -> Result<()> {
        let program = self.ast.program.kind.clone();
        self.resolve_block(&program.decls, &program.body)?;
        self.symbols.close_scope();
        debug!(bindings = self.bound, "name resolution finished");
        Ok(())
    }

    fn resolve_block(&mut self, decls: &[DeclId], body: &[StmtId]) -> Result<()> {
        for decl in decls {
            self.declare(*decl)?;
        }
        for decl in decls {
            self.complete(*decl)?;
        }
        for stmt in body {
            self.resolve_stmt(*stmt)?;
        }
        Ok(())
    }

    /// Pass 1
    fn declare(&mut self, decl: DeclId) -> Result<()> {
        match self.ast[decl].kind.clone() {
            Decl::Var { name, ty } | Decl::Type { name, ty } | Decl::Param { name, ty, .. } => {
                self.resolve_type_eager(ty)?;
                self.insert(name, decl)
            }
            Decl::Proc {
                name,
                params,
                decls,
                body,
            } => {
                self.insert(name, decl)?;
                self.symbols.open_scope();
                for d in params.iter().chain(&decls) {
                    self.declare(*d)?;
                }
                for d in params.iter().chain(&decls) {
                    self.complete(*d)?;
                }
                for stmt in &body {
                    self.resolve_stmt(*stmt)?;
                }
                self.symbols.close_scope();
                Ok(())
            }
        }
    }

    /// Pass 2
    fn complete(&mut self, decl: DeclId) -> Result<()> {
        match self.ast[decl].kind.declared_type() {
            Some(ty) => self.resolve_type_deferred(ty),
            None => Ok(()),
        }
    }

    fn insert(&mut self, name: String, decl: DeclId) -> Result<()> {
        if self.symbols.contains_in_top(&name) {
            return Err(Error::Duplicate {
                name,
                pos: self.ast[decl].pos,
            });
        }
        self.symbols.insert(name, decl);
        Ok(())
    }

    fn lookup(&mut self, name: &str, pos: Position) -> Result<DeclId> {
        self.bound += 1;
        self.symbols.lookup(name).ok_or_else(|| Error::Undeclared {
            name: name.to_string(),
            pos,
        })
    }

    fn bind_ref(&mut self, ty: TypeId) -> Result<()> {
        if let Type::Ref { name } = &self.ast[ty].kind {
            let name = name.clone();
            let pos = self.ast[ty].pos;
            let decl = self.lookup(&name, pos)?;
            self.ast[ty].ann.binding = Some(decl);
        }
        Ok(())
    }

    fn resolve_type_eager(&mut self, ty: TypeId) -> Result<()> {
        match self.ast[ty].kind.clone() {
            Type::Ref { .. } => self.bind_ref(ty),
            Type::Array { elem, .. } => self.resolve_type_eager(elem),
            Type::Pointer { elem } => match self.ast[elem].kind {
                Type::Ref { .. } => Ok(()),
                _ => self.resolve_type_eager(elem),
            },
            Type::Record { fields } => {
                for field in fields {
                    let field_ty = self.ast[field].kind.ty;
                    self.resolve_type_eager(field_ty)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn resolve_type_deferred(&mut self, ty: TypeId) -> Result<()> {
        match self.ast[ty].kind.clone() {
            Type::Array { elem, .. } => self.resolve_type_deferred(elem),
            Type::Pointer { elem } => match self.ast[elem].kind {
                Type::Ref { .. } => self.bind_ref(elem),
                _ => self.resolve_type_deferred(elem),
            },
            Type::Record { fields } => {
                for field in fields {
                    let field_ty = self.ast[field].kind.ty;
                    self.resolve_type_deferred(field_ty)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn resolve_stmt(&mut self, stmt: StmtId) -> Result<()> {
        match self.ast[stmt].kind.clone() {
            Stmt::Assign { lhs, rhs } => {
                self.resolve_expr(lhs)?;
                self.resolve_expr(rhs)?;
                self.ast[stmt].ann.binding = self.ast[lhs].ann.binding;
            }
            Stmt::Call { callee, args } => {
                self.resolve_expr(callee)?;
                self.ast[stmt].ann.binding = self.ast[callee].ann.binding;
                for arg in args {
                    self.resolve_expr(arg)?;
                }
            }
            Stmt::Seq { decls, body } => {
                self.symbols.open_scope();
                self.resolve_block(&decls, &body)?;
                self.symbols.close_scope();
            }
            Stmt::IfThen { cond, then_branch } => {
                self.resolve_expr(cond)?;
                self.resolve_stmts(&then_branch)?;
            }
            Stmt::IfThenElse {
                cond,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(cond)?;
                self.resolve_stmts(&then_branch)?;
                self.resolve_stmts(&else_branch)?;
            }
            Stmt::While { cond, body } => {
                self.resolve_expr(cond)?;
                self.resolve_stmts(&body)?;
            }
            Stmt::Read(e) | Stmt::Write(e) | Stmt::New(e) | Stmt::Delete(e) => {
                self.resolve_expr(e)?;
            }
            Stmt::NewLine => {}
        }
        Ok(())
    }

    fn resolve_stmts(&mut self, stmts: &[StmtId]) -> Result<()> {
        for stmt in stmts {
            self.resolve_stmt(*stmt)?;
        }
        Ok(())
    }

    fn resolve_expr(&mut self, expr: ExprId) -> Result<()> {
        match self.ast[expr].kind.clone() {
            Expr::Ident(name) => {
                let pos = self.ast[expr].pos;
                let decl = self.lookup(&name, pos)?;
                self.ast[expr].ann.binding = Some(decl);
            }
            Expr::Binary { lhs, rhs, .. } => {
                self.resolve_expr(lhs)?;
                self.resolve_expr(rhs)?;
            }
            Expr::Unary { operand, .. } => self.resolve_expr(operand)?,
            Expr::Index { array, index } => {
                self.resolve_expr(array)?;
                self.resolve_expr(index)?;
                self.ast[expr].ann.binding = self.ast[array].ann.binding;
            }
            Expr::Field { record, .. } => {
                self.resolve_expr(record)?;
                self.ast[expr].ann.binding = self.ast[record].ann.binding;
            }
            Expr::Deref(pointer) => {
                self.resolve_expr(pointer)?;
                self.ast[expr].ann.binding = self.ast[pointer].ann.binding;
            }
            Expr::Int(_) | Expr::Real(_) | Expr::Str(_) | Expr::True | Expr::False | Expr::Nil => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;

    fn resolve(source: &str) -> Result<Ast> {
        let mut ast = parse_source(source)?;
        Resolver::new(&mut ast).resolve()?;
        Ok(ast)
    }

    #[test]
    fn test_duplicate_at_second_declaration() {
        let err = resolve("var x: int; var x: real;").unwrap_err();
        assert_eq!(
            err,
            Error::Duplicate {
                name: "x".into(),
                pos: Position::new(1, 17)
            }
        );
    }

    #[test]
    fn test_undeclared_identifier() {
        let err = resolve("var x: int; y := 1;").unwrap_err();
        assert!(matches!(err, Error::Undeclared { ref name, .. } if name == "y"));
    }

    #[test]
    fn test_undeclared_type() {
        let err = resolve("var x: Missing;").unwrap_err();
        assert!(matches!(err, Error::Undeclared { ref name, .. } if name == "Missing"));
    }

    #[test]
    fn test_pointer_may_name_later_type() {
        let ast = resolve("type L = pointer(Node); type Node = record(v: int, next: L);").unwrap();
        let node_decl = ast.program.kind.decls[1];
        let list_ty = ast[ast.program.kind.decls[0]].kind.declared_type().unwrap();
        let Type::Pointer { elem } = ast[list_ty].kind else {
            panic!("expected pointer");
        };
        assert_eq!(ast[elem].ann.binding, Some(node_decl));
    }

    #[test]
    fn test_forward_reference_without_pointer_fails() {
        assert!(resolve("type A = array(B, 2); type B = int;").is_err());
    }

    #[test]
    fn test_self_referencing_record() {
        assert!(resolve("type Node = record(val: int, next: pointer(Node));").is_ok());
    }

    #[test]
    fn test_locals_shadow_globals_and_go_out_of_scope() {
        let ast = resolve(
            "var x: int; proc p(x: real); x := 1.5; proc end; x := 2;",
        )
        .unwrap();
        let global = ast.program.kind.decls[0];
        let Stmt::Assign { lhs, .. } = ast[ast.program.kind.body[0]].kind else {
            panic!("expected assignment");
        };
        assert_eq!(ast[lhs].ann.binding, Some(global));
    }

    #[test]
    fn test_recursive_procedure() {
        assert!(resolve("proc f(n: int); if n > 0 then f(n - 1); end; proc end; f(3);").is_ok());
    }

    #[test]
    fn test_block_scope_is_closed() {
        let err = resolve("begin var t: int; t := 1; end; t := 2;").unwrap_err();
        assert!(matches!(err, Error::Undeclared { ref name, .. } if name == "t"));
    }

    #[test]
    fn test_access_paths_inherit_binding() {
        let ast = resolve("var a: array(record(f: int), 2); a[0].f := 1;").unwrap();
        let var = ast.program.kind.decls[0];
        let stmt = ast.program.kind.body[0];
        let Stmt::Assign { lhs, .. } = ast[stmt].kind else {
            panic!("expected assignment");
        };
        assert_eq!(ast[lhs].ann.binding, Some(var));
        assert_eq!(ast[stmt].ann.binding, Some(var));
    }
}
