//! Storage layout
//!
//! Assigns addresses and nesting levels to variables and parameters, sizes every
//! declared type, places record fields, and computes the frame size of every
//! procedure. Globals get absolute addresses; locals and parameters get
//! addresses relative to their procedure's frame.

use tracing::debug;

use crate::error::{Error, Result};
use crate::parser::{Ast, Decl, DeclId, ParamMode, Stmt, StmtId, Type, TypeId};
use crate::types::{TypeError, TypeErrorKind};

/// Storage totals of a laid-out program
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayoutSummary {
    /// Cells of global storage
    pub globals: usize,
    /// Largest frame among all procedures
    pub max_local: usize,
    /// Deepest procedure nesting level
    pub max_level: usize,
}

/// Layout pass over one type-checked program
pub struct Layout<'a> {
    ast: &'a mut Ast,
    /// Next free address in the current frame (or global area)
    dir: usize,
    level: usize,
    max_level: usize,
    globals: usize,
    locals: usize,
    max_local: usize,
}

impl<'a> Layout<'a> {
    /// Creates the pass
    pub fn new(ast: &'a mut Ast) -> Self {
        Layout {
            ast,
            dir: 0,
            level: 0,
            max_level: 0,
            globals: 0,
            locals: 0,
            max_local: 0,
        }
    }

    /// Lays out the whole program
    pub fn run(mut self) -> Result<LayoutSummary> {
        let program = self.ast.program.kind.clone();
        self.layout_block(&program.decls, &program.body)?;
        let summary = LayoutSummary {
            globals: self.globals,
            max_local: self.max_local,
            max_level: self.max_level,
        };
        debug!(
            globals = summary.globals,
            max_local = summary.max_local,
            max_level = summary.max_level,
            "storage layout finished"
        );
        Ok(summary)
    }

    fn layout_block(&mut self, decls: &[DeclId], body: &[StmtId]) -> Result<()> {
        for decl in decls {
            self.layout_decl(*decl)?;
        }
        for stmt in body {
            self.layout_stmt(*stmt)?;
        }
        Ok(())
    }

    fn layout_decl(&mut self, decl: DeclId) -> Result<()> {
        match self.ast[decl].kind.clone() {
            Decl::Var { ty, .. } => {
                let size = self.size_type(ty)?;
                self.place(decl, size);
                if self.level == 0 {
                    self.globals += size;
                } else {
                    self.locals += size;
                }
            }
            Decl::Type { ty, .. } => {
                self.size_type(ty)?;
            }
            Decl::Param { ty, mode, .. } => {
                let value_size = self.size_type(ty)?;
                let size = match mode {
                    ParamMode::Value => value_size,
                    ParamMode::Reference => 1,
                };
                self.place(decl, size);
                self.locals += size;
            }
            Decl::Proc {
                params,
                decls,
                body,
                ..
            } => {
                let outer_dir = self.dir;
                self.level += 1;
                self.max_level = self.max_level.max(self.level);
                self.dir = 0;
                self.ast[decl].ann.level = self.level;
                self.ast[decl].ann.addr = outer_dir;

                for param in &params {
                    self.layout_decl(*param)?;
                }
                self.layout_block(&decls, &body)?;

                let frame = self.dir;
                self.ast[decl].ann.size = Some(frame);
                self.max_local = self.max_local.max(self.locals);
                self.locals -= frame;
                self.dir = outer_dir;
                self.level -= 1;
            }
        }
        Ok(())
    }

    fn place(&mut self, decl: DeclId, size: usize) {
        let node = &mut self.ast[decl];
        node.ann.addr = self.dir;
        node.ann.level = self.level;
        node.ann.size = Some(size);
        self.dir += size;
    }

    fn layout_stmt(&mut self, stmt: StmtId) -> Result<()> {
        match self.ast[stmt].kind.clone() {
            Stmt::Seq { decls, body } => self.layout_block(&decls, &body),
            Stmt::IfThen { then_branch, .. } => self.layout_stmts(&then_branch),
            Stmt::IfThenElse {
                then_branch,
                else_branch,
                ..
            } => {
                self.layout_stmts(&then_branch)?;
                self.layout_stmts(&else_branch)
            }
            Stmt::While { body, .. } => self.layout_stmts(&body),
            _ => Ok(()),
        }
    }

    fn layout_stmts(&mut self, stmts: &[StmtId]) -> Result<()> {
        for stmt in stmts {
            self.layout_stmt(*stmt)?;
        }
        Ok(())
    }

    // ========================================================================
    // Type sizing
    // ========================================================================

    /// Sizes a type if not done yet and returns its size
    ///
    /// Phase one sizes everything except the targets of pointers to named
    /// types, which phase two visits once the enclosing structure is sized.
    fn size_type(&mut self, ty: TypeId) -> Result<usize> {
        if self.ast[ty].ann.size.is_none() {
            self.size_first(ty)?;
            self.size_second(ty)?;
        }
        Ok(self.ast.size_of(ty))
    }

    fn size_first(&mut self, ty: TypeId) -> Result<()> {
        let size = match self.ast[ty].kind.clone() {
            Type::Ref { .. } => match self.ast.alias_target(ty) {
                Some(target) => self.size_type(target)?,
                None => 0,
            },
            Type::Array { elem, len } => {
                let elem_size = self.size_type(elem)?;
                let out_of_range = || {
                    let pos = self.ast[ty].pos;
                    Error::TypeCheck(vec![TypeError::new(
                        pos,
                        TypeErrorKind::ArraySizeOutOfRange(len.clone()),
                    )])
                };
                let count: usize = len.parse().map_err(|_| out_of_range())?;
                count.checked_mul(elem_size).ok_or_else(out_of_range)?
            }
            Type::Pointer { elem } => {
                if !matches!(self.ast[elem].kind, Type::Ref { .. }) {
                    self.size_first(elem)?;
                }
                1
            }
            Type::Record { fields } => {
                let mut total = 0;
                for field in fields {
                    self.ast[field].ann.offset = total;
                    let field_ty = self.ast[field].kind.ty;
                    if self.ast[field_ty].ann.size.is_none() {
                        self.size_first(field_ty)?;
                    }
                    let field_size = self.ast.size_of(field_ty);
                    self.ast[field].ann.size = Some(field_size);
                    total += field_size;
                }
                total
            }
            Type::Int | Type::Real | Type::Bool | Type::Str | Type::Null | Type::Ok | Type::Error => 1,
        };
        self.ast[ty].ann.size = Some(size);
        Ok(())
    }

    fn size_second(&mut self, ty: TypeId) -> Result<()> {
        match self.ast[ty].kind.clone() {
            Type::Pointer { elem } => {
                if matches!(self.ast[elem].kind, Type::Ref { .. }) {
                    self.size_type(elem)?;
                } else {
                    self.size_second(elem)?;
                }
            }
            Type::Record { fields } => {
                for field in fields {
                    let field_ty = self.ast[field].kind.ty;
                    self.size_second(field_ty)?;
                }
            }
            Type::Array { elem, .. } => self.size_second(elem)?,
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Resolver;
    use crate::parser::parse_source;
    use crate::types::TypeChecker;

    fn layout(source: &str) -> (Ast, LayoutSummary) {
        let mut ast = parse_source(source).unwrap();
        Resolver::new(&mut ast).resolve().unwrap();
        TypeChecker::new(&mut ast).check_program().unwrap();
        let summary = Layout::new(&mut ast).run().unwrap();
        (ast, summary)
    }

    fn decl_named(ast: &Ast, name: &str) -> DeclId {
        ast.decl_ids()
            .find(|d| ast[*d].kind.name() == name)
            .unwrap()
    }

    #[test]
    fn test_global_addresses() {
        let (ast, summary) = layout("var x: int; var a: array(real, 4); var y: bool;");
        assert_eq!(ast[decl_named(&ast, "x")].ann.addr, 0);
        assert_eq!(ast[decl_named(&ast, "a")].ann.addr, 1);
        assert_eq!(ast[decl_named(&ast, "y")].ann.addr, 5);
        assert_eq!(summary.globals, 6);
        assert_eq!(summary.max_level, 0);
    }

    #[test]
    fn test_record_offsets_and_sizes() {
        let (ast, _) = layout(
            "type P = record(x: int, y: array(real, 3), z: pointer(P)); var p: P; var q: array(P, 2);",
        );
        let p_ty = ast[decl_named(&ast, "p")].kind.declared_type().unwrap();
        assert_eq!(ast.size_of(p_ty), 5);
        let record = ast.ref_fact(p_ty);
        let Type::Record { fields } = &ast[record].kind else {
            panic!("expected record");
        };
        let offsets: Vec<usize> = fields.iter().map(|f| ast[*f].ann.offset).collect();
        assert_eq!(offsets, vec![0, 1, 4]);
        assert_eq!(ast[decl_named(&ast, "q")].ann.size, Some(10));
    }

    #[test]
    fn test_procedure_frames() {
        let (ast, summary) = layout(
            "var g: int; \
             proc outer(a: int, var b: real); var l: array(int, 3); \
                proc inner(c: record(x: int, y: int)); var m: int; proc end; \
             proc end; \
             var h: int;",
        );
        let outer = decl_named(&ast, "outer");
        let inner = decl_named(&ast, "inner");
        assert_eq!(ast[outer].ann.level, 1);
        assert_eq!(ast[outer].ann.size, Some(5));
        assert_eq!(ast[inner].ann.level, 2);
        assert_eq!(ast[inner].ann.size, Some(3));
        assert_eq!(ast[decl_named(&ast, "b")].ann.addr, 1);
        assert_eq!(ast[decl_named(&ast, "b")].ann.size, Some(1));
        assert_eq!(ast[decl_named(&ast, "l")].ann.addr, 2);
        assert_eq!(ast[decl_named(&ast, "m")].ann.addr, 2);
        assert_eq!(ast[decl_named(&ast, "m")].ann.level, 2);
        assert_eq!(ast[decl_named(&ast, "h")].ann.addr, 1);
        assert_eq!(summary.globals, 2);
        assert_eq!(summary.max_level, 2);
        assert_eq!(summary.max_local, 8);
    }

    #[test]
    fn test_block_variables_extend_frame() {
        let (ast, summary) = layout(
            "proc p(); var a: int; begin var b: int; var c: int; end; proc end; begin var d: int; end;",
        );
        assert_eq!(ast[decl_named(&ast, "p")].ann.size, Some(3));
        assert_eq!(ast[decl_named(&ast, "d")].ann.level, 0);
        assert_eq!(summary.globals, 1);
    }

    #[test]
    fn test_mutually_recursive_records() {
        let (ast, _) = layout(
            "type A = record(b: pointer(B), v: int); type B = record(a: pointer(A)); var a: A; var b: B;",
        );
        assert_eq!(ast[decl_named(&ast, "a")].ann.size, Some(2));
        assert_eq!(ast[decl_named(&ast, "b")].ann.size, Some(1));
    }

    #[test]
    fn test_array_size_out_of_range() {
        let mut ast =
            parse_source("var a: array(array(int, 4611686018427387904), 4);").unwrap();
        Resolver::new(&mut ast).resolve().unwrap();
        TypeChecker::new(&mut ast).check_program().unwrap();
        let err = Layout::new(&mut ast).run().unwrap_err();
        assert!(matches!(
            err,
            Error::TypeCheck(ref errors) if matches!(errors[0].kind, TypeErrorKind::ArraySizeOutOfRange(_))
        ));
    }
}
