//! Stack virtual machine for compiled Tiny programs
//!
//! The machine has an operand stack of tagged [`Value`]s, a static region
//! ([`Ram`]) holding globals and activation records, a heap region
//! ([`BlockAllocator`]) for `new`/`delete`, and a display with one frame base
//! per procedure nesting level. Addresses `[0, static_size)` name static cells;
//! `[static_size, static_size + heap_size)` name heap cells.

mod heap;
mod instruction;
mod ram;
mod value;

use std::cmp::Ordering;
use std::io::{BufRead, Write};

use tracing::{debug, info, trace};

use crate::compiler::CompiledProgram;
use crate::error::{Fault, Result};

pub use heap::BlockAllocator;
pub use instruction::{BinOp, Instruction, ScanType, Trap, UnOp};
pub use ram::{Ram, DEFAULT_FIRST_BUCKET};
pub use value::{format_real, Value, NIL};

/// Cells of control information at the base of every activation record
/// (return PC, saved display entry)
const CONTROL_CELLS: usize = 2;

const LINE_SEPARATOR: &str = if cfg!(windows) { "\r\n" } else { "\n" };

/// Resource limits of the virtual machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmConfig {
    /// Number of heap cells
    pub heap_size: usize,
    /// Activation records the static region is sized for
    pub max_recursion: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            heap_size: 1 << 18,
            max_recursion: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    Static(usize),
    Heap(usize),
}

/// The virtual machine, reading `scan` input from `R` and printing to `W`
pub struct Vm<R, W> {
    code: Vec<Instruction>,
    pc: usize,
    /// First free static cell, top of the activation stack
    sp: usize,
    stack: Vec<Value>,
    ram: Ram<Value>,
    heap: BlockAllocator<Value>,
    display: Vec<usize>,
    static_size: usize,
    steps: u64,
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Vm<R, W> {
    /// Loads a compiled program
    pub fn new(program: CompiledProgram, config: &VmConfig, input: R, output: W) -> Result<Self> {
        let record = program.max_local.saturating_add(CONTROL_CELLS.saturating_mul(program.max_level));
        let static_size = program
            .globals
            .saturating_add(record.saturating_mul(config.max_recursion));
        let mut ram = Ram::new(program.globals, static_size);
        ram.reserve(program.globals)?;
        debug!(
            static_size,
            heap_size = config.heap_size,
            instructions = program.code.len(),
            "virtual machine loaded"
        );
        Ok(Vm {
            code: program.code,
            pc: 0,
            sp: program.globals,
            stack: Vec::new(),
            ram,
            heap: BlockAllocator::new(config.heap_size),
            display: vec![0; program.max_level],
            static_size,
            steps: 0,
            input,
            output,
        })
    }

    /// The loaded program
    pub fn code(&self) -> &[Instruction] {
        &self.code
    }

    /// Writes the program listing, one instruction per line in PC order
    pub fn write_listing(&self, out: &mut impl Write) -> std::io::Result<()> {
        for instruction in &self.code {
            writeln!(out, "{}", instruction)?;
        }
        Ok(())
    }

    /// Current operand stack, bottom first
    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    /// Current stack pointer into static memory
    pub fn sp(&self) -> usize {
        self.sp
    }

    /// Size of the static region; heap addresses start here
    pub fn static_size(&self) -> usize {
        self.static_size
    }

    /// Heap cells currently allocated
    pub fn heap_used(&self) -> usize {
        self.heap.used()
    }

    /// Instructions executed so far
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Reads the cell at a virtual address
    pub fn read_cell(&self, addr: i64) -> Result<Value> {
        Ok(self.load(addr)?)
    }

    /// The output sink
    pub fn output(&self) -> &W {
        &self.output
    }

    /// Consumes the machine, returning its output sink
    pub fn into_output(self) -> W {
        self.output
    }

    /// Executes from the current PC until the program runs off its end or
    /// stops
    pub fn run(&mut self) -> Result<()> {
        let code = std::mem::take(&mut self.code);
        let outcome = self.execute(&code);
        self.code = code;
        if let Err(fault) = &outcome {
            debug!(pc = self.pc, %fault, "execution aborted");
        }
        outcome?;
        self.output.flush().map_err(Fault::from)?;
        info!(steps = self.steps, heap_used = self.heap.used(), "execution finished");
        Ok(())
    }

    fn execute(&mut self, code: &[Instruction]) -> std::result::Result<(), Fault> {
        while let Some(instruction) = code.get(self.pc) {
            trace!(pc = self.pc, %instruction, depth = self.stack.len(), "execute");
            self.steps += 1;
            self.step(instruction, code.len())?;
        }
        Ok(())
    }

    fn step(&mut self, instruction: &Instruction, len: usize) -> std::result::Result<(), Fault> {
        match instruction {
            Instruction::Push(value) => self.push(value.clone()),
            Instruction::LoadInd => {
                let addr = self.pop()?.as_int()?;
                let value = self.load(addr)?;
                self.push(value);
            }
            Instruction::StoreInd => {
                let value = self.pop()?;
                let addr = self.pop()?.as_int()?;
                self.store(addr, value)?;
            }
            Instruction::Move(n) => {
                let src = self.pop()?.as_int()?;
                let dst = self.pop()?.as_int()?;
                self.move_cells(dst, src, *n)?;
            }
            Instruction::Goto(target) => return self.jump(*target as i64, len),
            Instruction::JumpFalse(target) => {
                if !self.pop()?.as_bool()? {
                    return self.jump(*target as i64, len);
                }
            }
            Instruction::JumpTrue(target) => {
                if self.pop()?.as_bool()? {
                    return self.jump(*target as i64, len);
                }
            }
            Instruction::JumpInd => {
                let target = self.pop()?.as_int()?;
                return self.jump(target, len);
            }
            Instruction::Alloc(n) => {
                let value = match self.heap.allocate(*n)? {
                    Some(cell) => Value::Int((cell + self.static_size) as i64),
                    None => Value::nil(),
                };
                self.push(value);
            }
            Instruction::Dealloc(n) => {
                let addr = self.pop()?.as_int()?;
                match self.region(addr)? {
                    Region::Heap(cell) => self.heap.destroy(cell, *n)?,
                    Region::Static(_) => return Err(Fault::InvalidAddress(addr)),
                }
            }
            Instruction::Activate { level, frame, ret } => {
                let saved = *self.display_slot(*level)?;
                self.ram.write(self.sp, Value::Int(*ret as i64))?;
                self.ram.write(self.sp + 1, Value::Int(saved as i64))?;
                self.sp += CONTROL_CELLS;
                self.push(Value::Int(self.sp as i64));
                self.sp += frame;
                self.ram.reserve(self.sp)?;
            }
            Instruction::PushDisplay(level) => {
                let base = *self.display_slot(*level)?;
                self.push(Value::Int(base as i64));
            }
            Instruction::PopDisplay(level) => {
                let base = self.pop_address()?;
                *self.display_slot(*level)? = base;
            }
            Instruction::Deactivate { level, frame } => {
                let base = self
                    .sp
                    .checked_sub(frame + CONTROL_CELLS)
                    .ok_or(Fault::InvalidAddress(self.sp as i64))?;
                let ret = self.ram.read(base).cloned().unwrap_or_else(Value::nil);
                let saved = self.ram.read(base + 1).cloned().unwrap_or_else(Value::nil);
                let saved = usize::try_from(saved.as_int()?)
                    .map_err(|_| Fault::InvalidAddress(NIL))?;
                *self.display_slot(*level)? = saved;
                self.push(ret);
                self.ram.truncate(base);
                self.sp = base;
            }
            Instruction::Dup => {
                let top = self.stack.last().cloned().ok_or(Fault::StackEmpty)?;
                self.push(top);
            }
            Instruction::Stop(None) => {
                self.pc = len;
                return Ok(());
            }
            Instruction::Stop(Some(trap)) => {
                self.pc = len;
                return Err(match trap {
                    Trap::NilDereference => Fault::NilDereference,
                });
            }
            Instruction::Binary(op) => {
                let rhs = self.pop()?;
                let lhs = self.pop()?;
                self.push(binary(*op, &lhs, &rhs)?);
            }
            Instruction::Unary(op) => {
                let operand = self.pop()?;
                let result = match op {
                    UnOp::Not => Value::Bool(!operand.as_bool()?),
                    UnOp::NegInt => Value::Int(operand.as_int()?.wrapping_neg()),
                    UnOp::NegReal => Value::Real(-operand.as_real()?),
                };
                self.push(result);
            }
            Instruction::PromoteReal => {
                let value = self.pop()?;
                self.push(Value::Real(value.as_real()?));
            }
            Instruction::Scan(ty) => {
                let value = self.scan(*ty)?;
                self.push(value);
            }
            Instruction::Print => {
                let value = self.pop()?;
                write!(self.output, "{}", value)?;
            }
            Instruction::NewLine => {
                self.output.write_all(LINE_SEPARATOR.as_bytes())?;
                self.output.flush()?;
            }
        }
        self.pc += 1;
        Ok(())
    }

    // ========================================================================
    // Operand stack
    // ========================================================================

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> std::result::Result<Value, Fault> {
        self.stack.pop().ok_or(Fault::StackEmpty)
    }

    fn pop_address(&mut self) -> std::result::Result<usize, Fault> {
        let addr = self.pop()?.as_int()?;
        usize::try_from(addr).map_err(|_| Fault::InvalidAddress(addr))
    }

    fn jump(&mut self, target: i64, len: usize) -> std::result::Result<(), Fault> {
        match usize::try_from(target) {
            Ok(pc) if pc < len => {
                self.pc = pc;
                Ok(())
            }
            _ => Err(Fault::InvalidInstruction(target)),
        }
    }

    fn display_slot(&mut self, level: usize) -> std::result::Result<&mut usize, Fault> {
        level
            .checked_sub(1)
            .and_then(|i| self.display.get_mut(i))
            .ok_or(Fault::InvalidDisplay(level))
    }

    // ========================================================================
    // Memory
    // ========================================================================

    fn region(&self, addr: i64) -> std::result::Result<Region, Fault> {
        let cell = usize::try_from(addr).map_err(|_| Fault::InvalidAddress(addr))?;
        if cell < self.static_size {
            Ok(Region::Static(cell))
        } else if cell - self.static_size < self.heap.capacity() {
            Ok(Region::Heap(cell - self.static_size))
        } else {
            Err(Fault::InvalidAddress(addr))
        }
    }

    /// Never-written cells read as nil
    fn load(&self, addr: i64) -> std::result::Result<Value, Fault> {
        let value = match self.region(addr)? {
            Region::Static(cell) => self.ram.read(cell).cloned(),
            Region::Heap(cell) => self.heap.read(cell)?.cloned(),
        };
        Ok(value.unwrap_or_else(Value::nil))
    }

    fn store(&mut self, addr: i64, value: Value) -> std::result::Result<(), Fault> {
        match self.region(addr)? {
            Region::Static(cell) => self.ram.write(cell, value),
            Region::Heap(cell) => self.heap.write(cell, value),
        }
    }

    fn move_cells(&mut self, dst: i64, src: i64, n: usize) -> std::result::Result<(), Fault> {
        let crossing = Fault::RegionCrossing { dst, src, len: n };
        let to = self.region(dst)?;
        let from = self.region(src)?;
        let spills = |region: Region| matches!(region, Region::Static(cell) if cell + n > self.static_size);
        if spills(to) || spills(from) {
            return Err(crossing);
        }
        match (to, from) {
            (Region::Static(d), Region::Static(s)) => self.ram.move_block(d, s, n),
            (Region::Static(d), Region::Heap(s)) => {
                let cells = self.heap.read_block(s, n)?;
                self.ram.write_block(d, &cells)
            }
            (Region::Heap(d), Region::Heap(s)) => self.heap.move_block(d, s, n),
            (Region::Heap(d), Region::Static(s)) => {
                let cells = self.ram.read_block(s, n);
                self.heap.write_block(d, &cells)
            }
        }
    }

    // ========================================================================
    // Input
    // ========================================================================

    fn scan(&mut self, ty: ScanType) -> std::result::Result<Value, Fault> {
        let mut line = String::new();
        let invalid = |input: &str| Fault::InvalidInput {
            expected: ty.name(),
            input: input.to_string(),
        };
        if self.input.read_line(&mut line)? == 0 {
            return Err(invalid(""));
        }
        let line = line.trim_end_matches(&['\r', '\n'][..]);
        let value = match ty {
            ScanType::Int => Value::Int(line.trim().parse().map_err(|_| invalid(line))?),
            ScanType::Real => Value::Real(line.trim().parse().map_err(|_| invalid(line))?),
            ScanType::Bool => {
                let word = line.trim();
                if word.eq_ignore_ascii_case("true") {
                    Value::Bool(true)
                } else if word.eq_ignore_ascii_case("false") {
                    Value::Bool(false)
                } else {
                    return Err(invalid(line));
                }
            }
            ScanType::Str => Value::Str(line.to_string()),
        };
        Ok(value)
    }
}

/// Orders two operands of a comparison; `None` for unordered reals
fn compare(lhs: &Value, rhs: &Value) -> std::result::Result<Option<Ordering>, Fault> {
    Ok(match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Int(_) | Value::Real(_), Value::Int(_) | Value::Real(_)) => {
            lhs.as_real()?.partial_cmp(&rhs.as_real()?)
        }
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Char(a), Value::Char(b)) => Some(a.cmp(b)),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (expected, found) => return Err(found.illegal(expected.type_name())),
    })
}

fn binary(op: BinOp, lhs: &Value, rhs: &Value) -> std::result::Result<Value, Fault> {
    use Ordering::{Equal, Greater, Less};

    let value = match op {
        BinOp::Eq => Value::Bool(compare(lhs, rhs)? == Some(Equal)),
        BinOp::Ne => Value::Bool(compare(lhs, rhs)? != Some(Equal)),
        BinOp::Lt => Value::Bool(compare(lhs, rhs)? == Some(Less)),
        BinOp::Le => Value::Bool(matches!(compare(lhs, rhs)?, Some(Less | Equal))),
        BinOp::Gt => Value::Bool(compare(lhs, rhs)? == Some(Greater)),
        BinOp::Ge => Value::Bool(matches!(compare(lhs, rhs)?, Some(Greater | Equal))),
        BinOp::And => Value::Bool(lhs.as_bool()? && rhs.as_bool()?),
        BinOp::Or => Value::Bool(lhs.as_bool()? || rhs.as_bool()?),
        BinOp::AddInt => Value::Int(lhs.as_int()?.wrapping_add(rhs.as_int()?)),
        BinOp::SubInt => Value::Int(lhs.as_int()?.wrapping_sub(rhs.as_int()?)),
        BinOp::MulInt => Value::Int(lhs.as_int()?.wrapping_mul(rhs.as_int()?)),
        BinOp::DivInt | BinOp::Mod => {
            let (a, b) = (lhs.as_int()?, rhs.as_int()?);
            if b == 0 {
                return Err(Fault::DivisionByZero);
            }
            Value::Int(if op == BinOp::DivInt {
                a.wrapping_div(b)
            } else {
                a.wrapping_rem(b)
            })
        }
        BinOp::AddReal => Value::Real(lhs.as_real()? + rhs.as_real()?),
        BinOp::SubReal => Value::Real(lhs.as_real()? - rhs.as_real()?),
        BinOp::MulReal => Value::Real(lhs.as_real()? * rhs.as_real()?),
        BinOp::DivReal => Value::Real(lhs.as_real()? / rhs.as_real()?),
    };
    Ok(value)
}
