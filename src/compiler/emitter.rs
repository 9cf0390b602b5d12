//! Code emission
//!
//! Walks the labelled program in the same order as the labeller and produces
//! the instruction stream. Designators evaluate to an address on the stack; a
//! `load-ind` follows wherever their value is needed.

use crate::error::{Error, Result};
use crate::parser::{
    Ast, BinaryOp, Decl, DeclId, Expr, ExprId, ParamMode, Stmt, StmtId, Type, TypeId, UnaryOp,
};
use crate::runtime::{BinOp, Instruction, ScanType, Trap, UnOp, Value};

/// Emitter pass over one labelled program
pub struct Emitter<'a> {
    ast: &'a Ast,
    code: Vec<Instruction>,
    verify_labels: bool,
}

impl<'a> Emitter<'a> {
    /// Creates the pass; with `verify_labels` every node's `begin`/`next` is
    /// checked against the emitted position
    pub fn new(ast: &'a Ast, verify_labels: bool) -> Self {
        Emitter {
            ast,
            code: Vec::new(),
            verify_labels,
        }
    }

    /// Emits the main body, `stop`, then every procedure in `procs` order
    pub fn run(mut self, procs: &[DeclId]) -> Result<Vec<Instruction>> {
        self.emit_stmts(&self.ast.program.kind.body)?;
        self.code.push(Instruction::Stop(None));
        for proc in procs {
            self.emit_proc(*proc)?;
        }
        self.check_label("program end", self.ast.program.ann.next)?;
        Ok(self.code)
    }

    fn check_label(&self, what: &str, label: usize) -> Result<()> {
        if self.verify_labels && label != self.code.len() {
            return Err(Error::internal(format!(
                "{} labelled at {} but emitted at {}",
                what,
                label,
                self.code.len()
            )));
        }
        Ok(())
    }

    fn emit(&mut self, instruction: Instruction) {
        self.code.push(instruction);
    }

    fn push_int(&mut self, n: usize) {
        self.emit(Instruction::Push(Value::Int(n as i64)));
    }

    fn emit_proc(&mut self, proc: DeclId) -> Result<()> {
        let ast = self.ast;
        let node = &ast[proc];
        self.check_label(node.kind.name(), node.ann.begin)?;
        if let Decl::Proc { body, .. } = &node.kind {
            self.emit_stmts(body)?;
        }
        self.emit(Instruction::Deactivate {
            level: node.ann.level,
            frame: node.ann.size.unwrap_or(0),
        });
        self.emit(Instruction::JumpInd);
        self.check_label(node.kind.name(), node.ann.next)
    }

    // ========================================================================
    // Statements
    // ========================================================================

    fn emit_stmts(&mut self, stmts: &[StmtId]) -> Result<()> {
        for stmt in stmts {
            self.emit_stmt(*stmt)?;
        }
        Ok(())
    }

    fn emit_stmt(&mut self, stmt: StmtId) -> Result<()> {
        let ast = self.ast;
        let node = &ast[stmt];
        self.check_label("statement", node.ann.begin)?;
        match &node.kind {
            Stmt::Assign { lhs, rhs } => {
                self.emit_expr(*lhs)?;
                self.emit_expr(*rhs)?;
                let target = ast.type_of(*lhs);
                self.emit_store(target, *rhs);
            }
            Stmt::Call { callee, args } => self.emit_call(stmt, *callee, args)?,
            Stmt::Seq { body, .. } => self.emit_stmts(body)?,
            Stmt::IfThen { cond, then_branch } => {
                self.emit_value(*cond)?;
                self.emit(Instruction::JumpFalse(node.ann.next));
                self.emit_stmts(then_branch)?;
            }
            Stmt::IfThenElse {
                cond,
                then_branch,
                else_branch,
            } => {
                let else_start = else_branch
                    .first()
                    .map_or(node.ann.next, |s| ast[*s].ann.begin);
                self.emit_value(*cond)?;
                self.emit(Instruction::JumpFalse(else_start));
                self.emit_stmts(then_branch)?;
                self.emit(Instruction::Goto(node.ann.next));
                self.emit_stmts(else_branch)?;
            }
            Stmt::While { cond, body } => {
                self.emit_value(*cond)?;
                self.emit(Instruction::JumpFalse(node.ann.next));
                self.emit_stmts(body)?;
                self.emit(Instruction::Goto(node.ann.begin));
            }
            Stmt::Read(target) => {
                self.emit_expr(*target)?;
                let scan = match ast[ast.ref_fact(ast.type_of(*target))].kind {
                    Type::Int => ScanType::Int,
                    Type::Real => ScanType::Real,
                    Type::Bool => ScanType::Bool,
                    Type::Str => ScanType::Str,
                    _ => return Err(Error::internal("read of a non-basic type")),
                };
                self.emit(Instruction::Scan(scan));
                self.emit(Instruction::StoreInd);
            }
            Stmt::Write(value) => {
                self.emit_value(*value)?;
                self.emit(Instruction::Print);
            }
            Stmt::NewLine => self.emit(Instruction::NewLine),
            Stmt::New(pointer) => {
                self.emit_expr(*pointer)?;
                let size = self.pointee_size(*pointer)?;
                self.emit(Instruction::Alloc(size));
                self.emit(Instruction::StoreInd);
            }
            Stmt::Delete(pointer) => {
                self.emit_expr(*pointer)?;
                let size = self.pointee_size(*pointer)?;
                self.emit(Instruction::LoadInd);
                self.emit_nil_check(node.ann.next.saturating_sub(1));
                self.emit(Instruction::Dealloc(size));
            }
        }
        self.check_label("statement end", node.ann.next)
    }

    /// Stores the value computed by `source` into the address below it
    fn emit_store(&mut self, target: TypeId, source: ExprId) {
        let ast = self.ast;
        if ast.is_real(target) && ast.is_int(ast.type_of(source)) {
            if ast.is_designator(source) {
                self.emit(Instruction::LoadInd);
            }
            self.emit(Instruction::PromoteReal);
            self.emit(Instruction::StoreInd);
        } else if ast.is_designator(source) {
            self.emit(Instruction::Move(ast.size_of(target)));
        } else {
            self.emit(Instruction::StoreInd);
        }
    }

    fn emit_call(&mut self, stmt: StmtId, callee: ExprId, args: &[ExprId]) -> Result<()> {
        let ast = self.ast;
        let proc = ast[callee]
            .ann
            .binding
            .ok_or_else(|| Error::internal("unresolved call"))?;
        let Decl::Proc { params, .. } = &ast[proc].kind else {
            return Err(Error::internal("call target is not a procedure"));
        };
        let level = ast[proc].ann.level;

        self.emit(Instruction::Activate {
            level,
            frame: ast[proc].ann.size.unwrap_or(0),
            ret: ast[stmt].ann.next,
        });
        for (param, arg) in params.iter().zip(args) {
            let Decl::Param { ty, mode, .. } = &ast[*param].kind else {
                return Err(Error::internal("procedure parameter is not a parameter"));
            };
            self.emit(Instruction::Dup);
            self.push_int(ast[*param].ann.addr);
            self.emit(Instruction::Binary(BinOp::AddInt));
            self.emit_expr(*arg)?;
            match mode {
                ParamMode::Value => self.emit_store(*ty, *arg),
                ParamMode::Reference => self.emit(Instruction::StoreInd),
            }
        }
        self.emit(Instruction::PopDisplay(level));
        self.emit(Instruction::Goto(ast[proc].ann.begin));
        Ok(())
    }

    fn pointee_size(&self, pointer: ExprId) -> Result<usize> {
        let ast = self.ast;
        match ast[ast.ref_fact(ast.type_of(pointer))].kind {
            Type::Pointer { elem } => Ok(ast.size_of(elem)),
            _ => Err(Error::internal("new/delete of a non-pointer")),
        }
    }

    /// Leaves the address on the stack if it is not nil, otherwise stops with
    /// a nil-dereference trap; 5 instructions
    fn emit_nil_check(&mut self, continue_at: usize) {
        self.emit(Instruction::Dup);
        self.emit(Instruction::Push(Value::nil()));
        self.emit(Instruction::Binary(BinOp::Eq));
        self.emit(Instruction::JumpFalse(continue_at));
        self.emit(Instruction::Stop(Some(Trap::NilDereference)));
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    /// Emits an expression and loads it if it is a designator
    fn emit_value(&mut self, expr: ExprId) -> Result<()> {
        self.emit_expr(expr)?;
        if self.ast.is_designator(expr) {
            self.emit(Instruction::LoadInd);
        }
        Ok(())
    }

    fn emit_operand(&mut self, operand: ExprId, result: TypeId) -> Result<()> {
        self.emit_value(operand)?;
        if self.ast.is_real(result) && self.ast.is_int(self.ast.type_of(operand)) {
            self.emit(Instruction::PromoteReal);
        }
        Ok(())
    }

    fn emit_expr(&mut self, expr: ExprId) -> Result<()> {
        let ast = self.ast;
        let node = &ast[expr];
        self.check_label("expression", node.ann.begin)?;
        match &node.kind {
            Expr::Int(n) => self.emit(Instruction::Push(Value::Int(*n))),
            Expr::Real(r) => self.emit(Instruction::Push(Value::Real(*r))),
            Expr::Str(s) => self.emit(Instruction::Push(Value::Str(s.clone()))),
            Expr::True => self.emit(Instruction::Push(Value::Bool(true))),
            Expr::False => self.emit(Instruction::Push(Value::Bool(false))),
            Expr::Nil => self.emit(Instruction::Push(Value::nil())),
            Expr::Ident(name) => {
                let decl = node
                    .ann
                    .binding
                    .ok_or_else(|| Error::internal(format!("unresolved identifier {}", name)))?;
                let var = &ast[decl];
                if var.ann.level == 0 {
                    self.push_int(var.ann.addr);
                } else {
                    self.emit(Instruction::PushDisplay(var.ann.level));
                    self.push_int(var.ann.addr);
                    self.emit(Instruction::Binary(BinOp::AddInt));
                    if matches!(
                        var.kind,
                        Decl::Param {
                            mode: ParamMode::Reference,
                            ..
                        }
                    ) {
                        self.emit(Instruction::LoadInd);
                    }
                }
            }
            Expr::Binary { op, lhs, rhs } => {
                let result = ast.type_of(expr);
                self.emit_operand(*lhs, result)?;
                self.emit_operand(*rhs, result)?;
                let real = ast.is_real(result);
                let op = match op {
                    BinaryOp::Eq => BinOp::Eq,
                    BinaryOp::Ne => BinOp::Ne,
                    BinaryOp::Lt => BinOp::Lt,
                    BinaryOp::Le => BinOp::Le,
                    BinaryOp::Gt => BinOp::Gt,
                    BinaryOp::Ge => BinOp::Ge,
                    BinaryOp::And => BinOp::And,
                    BinaryOp::Or => BinOp::Or,
                    BinaryOp::Add if real => BinOp::AddReal,
                    BinaryOp::Add => BinOp::AddInt,
                    BinaryOp::Sub if real => BinOp::SubReal,
                    BinaryOp::Sub => BinOp::SubInt,
                    BinaryOp::Mul if real => BinOp::MulReal,
                    BinaryOp::Mul => BinOp::MulInt,
                    BinaryOp::Div if real => BinOp::DivReal,
                    BinaryOp::Div => BinOp::DivInt,
                    BinaryOp::Mod => BinOp::Mod,
                };
                self.emit(Instruction::Binary(op));
            }
            Expr::Unary { op, operand } => {
                self.emit_value(*operand)?;
                let op = match op {
                    UnaryOp::Not => UnOp::Not,
                    UnaryOp::Neg if ast.is_real(ast.type_of(expr)) => UnOp::NegReal,
                    UnaryOp::Neg => UnOp::NegInt,
                };
                self.emit(Instruction::Unary(op));
            }
            Expr::Index { array, index } => {
                self.emit_expr(*array)?;
                self.emit_value(*index)?;
                self.push_int(ast.size_of(ast.type_of(expr)));
                self.emit(Instruction::Binary(BinOp::MulInt));
                self.emit(Instruction::Binary(BinOp::AddInt));
            }
            Expr::Field { record, name } => {
                self.emit_expr(*record)?;
                let offset = match &ast[ast.ref_fact(ast.type_of(*record))].kind {
                    Type::Record { fields } => fields
                        .iter()
                        .find(|f| ast[**f].kind.name == *name)
                        .map(|f| ast[*f].ann.offset),
                    _ => None,
                }
                .ok_or_else(|| Error::internal(format!("unknown field {}", name)))?;
                self.push_int(offset);
                self.emit(Instruction::Binary(BinOp::AddInt));
            }
            Expr::Deref(pointer) => {
                self.emit_expr(*pointer)?;
                self.emit(Instruction::LoadInd);
                self.emit_nil_check(node.ann.next);
            }
        }
        self.check_label("expression end", node.ann.next)
    }
}
