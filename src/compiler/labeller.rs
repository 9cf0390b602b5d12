//! Instruction labelling
//!
//! Computes, for every statement, expression and procedure, the PC of its first
//! emitted instruction (`begin`) and the PC just past its last (`next`). The
//! per-construct costs below must agree exactly with what the emitter produces;
//! forward jumps are resolved from these labels before their targets exist.

use crate::parser::{Ast, Decl, DeclId, Expr, ExprId, ParamMode, Stmt, StmtId, TypeId};

/// Labeller pass over one laid-out program
pub struct Labeller<'a> {
    ast: &'a mut Ast,
    /// PC of the next instruction to be emitted
    tag: usize,
}

impl<'a> Labeller<'a> {
    /// Creates the pass
    pub fn new(ast: &'a mut Ast) -> Self {
        Labeller { ast, tag: 0 }
    }

    /// Labels the main body, the final `stop`, then every procedure in `procs`
    /// order; returns the program length
    pub fn run(mut self, procs: &[DeclId]) -> usize {
        self.ast.program.ann.begin = self.tag;
        let body = self.ast.program.kind.body.clone();
        self.label_stmts(&body);
        self.tag += 1;
        for proc in procs {
            self.label_proc(*proc);
        }
        self.ast.program.ann.next = self.tag;
        self.tag
    }

    fn label_proc(&mut self, proc: DeclId) {
        self.ast[proc].ann.begin = self.tag;
        if let Decl::Proc { body, .. } = self.ast[proc].kind.clone() {
            self.label_stmts(&body);
        }
        self.tag += 2;
        self.ast[proc].ann.next = self.tag;
    }

    fn label_stmts(&mut self, stmts: &[StmtId]) {
        for stmt in stmts {
            self.label_stmt(*stmt);
        }
    }

    /// 1 when a designator operand needs a `load-ind` to become a value
    fn load_cost(&self, expr: ExprId) -> usize {
        usize::from(self.ast.is_designator(expr))
    }

    /// Int operand flowing into a real target
    fn promotes(&self, target: TypeId, expr: ExprId) -> bool {
        self.ast.is_real(target) && self.ast.is_int(self.ast.type_of(expr))
    }

    fn label_stmt(&mut self, stmt: StmtId) {
        self.ast[stmt].ann.begin = self.tag;
        match self.ast[stmt].kind.clone() {
            Stmt::Assign { lhs, rhs } => {
                self.label_expr(lhs);
                self.label_expr(rhs);
                self.tag += if self.promotes(self.ast.type_of(lhs), rhs) {
                    self.load_cost(rhs) + 2
                } else {
                    1
                };
            }
            Stmt::Call { callee, args } => {
                self.tag += 1;
                let params = match self.ast[callee].ann.binding.map(|d| self.ast[d].kind.clone()) {
                    Some(Decl::Proc { params, .. }) => params,
                    _ => Vec::new(),
                };
                for (param, arg) in params.iter().zip(&args) {
                    self.tag += 3;
                    self.label_expr(*arg);
                    if let Decl::Param { ty, mode, .. } = self.ast[*param].kind.clone() {
                        self.tag += match mode {
                            ParamMode::Value if self.promotes(ty, *arg) => self.load_cost(*arg) + 2,
                            _ => 1,
                        };
                    }
                }
                self.tag += 2;
            }
            Stmt::Seq { body, .. } => self.label_stmts(&body),
            Stmt::IfThen { cond, then_branch } => {
                self.label_expr(cond);
                self.tag += self.load_cost(cond) + 1;
                self.label_stmts(&then_branch);
            }
            Stmt::IfThenElse {
                cond,
                then_branch,
                else_branch,
            } => {
                self.label_expr(cond);
                self.tag += self.load_cost(cond) + 1;
                self.label_stmts(&then_branch);
                self.tag += 1;
                self.label_stmts(&else_branch);
            }
            Stmt::While { cond, body } => {
                self.label_expr(cond);
                self.tag += self.load_cost(cond) + 1;
                self.label_stmts(&body);
                self.tag += 1;
            }
            Stmt::Read(target) => {
                self.label_expr(target);
                self.tag += 2;
            }
            Stmt::Write(value) => {
                self.label_expr(value);
                self.tag += self.load_cost(value) + 1;
            }
            Stmt::NewLine => self.tag += 1,
            Stmt::New(pointer) => {
                self.label_expr(pointer);
                self.tag += 2;
            }
            Stmt::Delete(pointer) => {
                self.label_expr(pointer);
                self.tag += 7;
            }
        }
        self.ast[stmt].ann.next = self.tag;
    }

    fn label_expr(&mut self, expr: ExprId) {
        self.ast[expr].ann.begin = self.tag;
        match self.ast[expr].kind.clone() {
            Expr::Int(_) | Expr::Real(_) | Expr::Str(_) | Expr::True | Expr::False | Expr::Nil => {
                self.tag += 1
            }
            Expr::Ident(_) => {
                let decl = self.ast[expr].ann.binding;
                self.tag += match decl.map(|d| (self.ast[d].ann.level, self.ast[d].kind.clone())) {
                    Some((0, _)) | None => 1,
                    Some((_, Decl::Param { mode: ParamMode::Reference, .. })) => 4,
                    Some(_) => 3,
                };
            }
            Expr::Binary { lhs, rhs, .. } => {
                let result = self.ast.type_of(expr);
                self.label_expr(lhs);
                self.tag += self.load_cost(lhs) + usize::from(self.promotes(result, lhs));
                self.label_expr(rhs);
                self.tag += self.load_cost(rhs) + usize::from(self.promotes(result, rhs)) + 1;
            }
            Expr::Unary { operand, .. } => {
                self.label_expr(operand);
                self.tag += self.load_cost(operand) + 1;
            }
            Expr::Index { array, index } => {
                self.label_expr(array);
                self.label_expr(index);
                self.tag += self.load_cost(index) + 3;
            }
            Expr::Field { record, .. } => {
                self.label_expr(record);
                self.tag += 2;
            }
            Expr::Deref(pointer) => {
                self.label_expr(pointer);
                self.tag += 6;
            }
        }
        self.ast[expr].ann.next = self.tag;
    }
}
