//! # Tiny Compiler - AST to stack-machine code
//!
//! Compiles a parsed Tiny program into instructions for the [`Vm`](crate::runtime::Vm).
//!
//! ## Architecture
//!
//! ```text
//! Source → Tokens → AST → Resolve → Type Check → Layout → Label → Emit
//! ```
//!
//! Every pass annotates the AST in place; each one relies on the annotations of
//! the passes before it.
//!
//! ## Usage
//!
//! ```ignore
//! use tiny::compiler::{CompileOptions, Compiler};
//!
//! let compiler = Compiler::new(CompileOptions::default());
//! let program = compiler.compile_source("var x: int; x := 1; write(x);")?;
//! ```

pub mod emitter;
pub mod labeller;
pub mod layout;
pub mod resolver;
pub mod symbols;

pub use emitter::Emitter;
pub use labeller::Labeller;
pub use layout::{Layout, LayoutSummary};
pub use resolver::Resolver;
pub use symbols::SymbolTable;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::parser::{parse_source, Ast};
use crate::runtime::Instruction;
use crate::types::TypeChecker;

/// Compilation options
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Check every node's `begin`/`next` label against the emitted position
    pub verify_labels: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            verify_labels: true,
        }
    }
}

/// A compiled program together with the storage totals the VM needs
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledProgram {
    /// Instructions indexed by PC
    pub code: Vec<Instruction>,
    /// Cells of global storage
    pub globals: usize,
    /// Largest procedure frame
    pub max_local: usize,
    /// Deepest procedure nesting level
    pub max_level: usize,
}

/// Tiny to stack-machine compiler
pub struct Compiler {
    options: CompileOptions,
}

impl Compiler {
    /// Create a new compiler with options
    pub fn new(options: CompileOptions) -> Self {
        Self { options }
    }

    /// Parses and compiles source text
    pub fn compile_source(&self, source: &str) -> Result<CompiledProgram> {
        let mut ast = parse_source(source)?;
        self.compile(&mut ast)
    }

    /// Compiles a freshly parsed program, annotating it along the way
    pub fn compile(&self, ast: &mut Ast) -> Result<CompiledProgram> {
        // Phase 1: Name resolution (aborts on the first error)
        Resolver::new(ast).resolve()?;

        // Phase 2: Type checking (all errors reported together)
        TypeChecker::new(ast).check_program().map_err(Error::TypeCheck)?;

        // Phase 3: Storage layout
        let summary = Layout::new(ast).run()?;

        // Phase 4: Labelling, then emission over the same procedure order
        let procs = ast.collect_procs();
        debug!(procedures = procs.len(), "collected procedures");
        let length = Labeller::new(ast).run(&procs);
        let code = Emitter::new(ast, self.options.verify_labels).run(&procs)?;
        if code.len() != length {
            return Err(Error::internal(format!(
                "labelled {} instructions but emitted {}",
                length,
                code.len()
            )));
        }

        info!(
            instructions = code.len(),
            globals = summary.globals,
            max_level = summary.max_level,
            "compilation finished"
        );
        Ok(CompiledProgram {
            code,
            globals: summary.globals,
            max_local: summary.max_local,
            max_level: summary.max_level,
        })
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(CompileOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{BinOp, Value};
    use crate::types::TypeErrorKind;

    fn compile(source: &str) -> Result<CompiledProgram> {
        Compiler::default().compile_source(source)
    }

    #[test]
    fn test_global_assignment_code() {
        let program = compile("var x: int; x := 3;").unwrap();
        assert_eq!(
            program.code,
            vec![
                Instruction::Push(Value::Int(0)),
                Instruction::Push(Value::Int(3)),
                Instruction::StoreInd,
                Instruction::Stop(None),
            ]
        );
        assert_eq!(program.globals, 1);
    }

    #[test]
    fn test_promotion_code() {
        let program = compile("var r: real; var i: int; r := i;").unwrap();
        assert_eq!(
            program.code,
            vec![
                Instruction::Push(Value::Int(0)),
                Instruction::Push(Value::Int(1)),
                Instruction::LoadInd,
                Instruction::PromoteReal,
                Instruction::StoreInd,
                Instruction::Stop(None),
            ]
        );
    }

    #[test]
    fn test_while_jumps() {
        let program = compile("var i: int; while i < 3 do i := i + 1; end;").unwrap();
        let code = &program.code;
        assert_eq!(code[4], Instruction::JumpFalse(12));
        assert_eq!(code[5], Instruction::Push(Value::Int(0)));
        assert_eq!(code[9], Instruction::Binary(BinOp::AddInt));
        assert_eq!(code[11], Instruction::Goto(0));
        assert_eq!(code[12], Instruction::Stop(None));
        assert_eq!(code.len(), 13);
    }

    #[test]
    fn test_procedure_code_follows_main() {
        let program = compile("proc p(); write(1); proc end; p();").unwrap();
        assert_eq!(
            program.code,
            vec![
                Instruction::Activate {
                    level: 1,
                    frame: 0,
                    ret: 3
                },
                Instruction::PopDisplay(1),
                Instruction::Goto(4),
                Instruction::Stop(None),
                Instruction::Push(Value::Int(1)),
                Instruction::Print,
                Instruction::Deactivate { level: 1, frame: 0 },
                Instruction::JumpInd,
            ]
        );
        assert_eq!(program.max_level, 1);
    }

    #[test]
    fn test_type_errors_abort() {
        let err = compile("var x: int; x := true; x := \"s\";").unwrap_err();
        match err {
            Error::TypeCheck(errors) => {
                assert_eq!(errors.len(), 2);
                assert!(matches!(errors[0].kind, TypeErrorKind::Incompatible { .. }));
            }
            other => panic!("expected type errors, got {other:?}"),
        }
    }

    #[test]
    fn test_resolution_errors_abort() {
        assert!(matches!(
            compile("x := 1;"),
            Err(Error::Undeclared { ref name, .. }) if name == "x"
        ));
    }
}
