use std::fmt;

use crate::error::Fault;

/// Address denoting "no object"
pub const NIL: i64 = -1;

/// Tagged value held on the operand stack and in memory cells
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// 64-bit integer; also used for addresses and program counters
    Int(i64),
    /// 64-bit floating-point value
    Real(f64),
    /// Boolean value
    Bool(bool),
    /// Character value
    Char(char),
    /// String value
    Str(String),
}

impl Value {
    /// The nil address
    pub fn nil() -> Self {
        Value::Int(NIL)
    }

    /// Name of the value's kind, used in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Real(_) => "real",
            Value::Bool(_) => "bool",
            Value::Char(_) => "char",
            Value::Str(_) => "string",
        }
    }

    /// Extracts an integer
    pub fn as_int(&self) -> Result<i64, Fault> {
        match self {
            Value::Int(n) => Ok(*n),
            other => Err(other.illegal("int")),
        }
    }

    /// Extracts a boolean
    pub fn as_bool(&self) -> Result<bool, Fault> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(other.illegal("bool")),
        }
    }

    /// Numeric view of an int or real
    pub fn as_real(&self) -> Result<f64, Fault> {
        match self {
            Value::Int(n) => Ok(*n as f64),
            Value::Real(r) => Ok(*r),
            other => Err(other.illegal("real")),
        }
    }

    /// Fault for a value found where another kind was expected
    pub fn illegal(&self, expected: &'static str) -> Fault {
        Fault::IllegalStackType {
            expected,
            found: format!("{} {}", self.type_name(), self),
        }
    }

    /// Rendering used in program listings: strings and chars are quoted
    pub fn literal(&self) -> String {
        match self {
            Value::Str(s) => format!("{:?}", s),
            Value::Char(c) => format!("{:?}", c),
            other => other.to_string(),
        }
    }
}

/// Formats a real the way Tiny programs print it: always with a fractional
/// part, switching to scientific notation outside `[1e-3, 1e7)`
pub fn format_real(x: f64) -> String {
    if x.is_nan() {
        return "NaN".into();
    }
    if x.is_infinite() {
        return if x > 0.0 { "Infinity" } else { "-Infinity" }.into();
    }
    let magnitude = x.abs();
    if x == 0.0 || (1e-3..1e7).contains(&magnitude) {
        let text = x.to_string();
        if text.contains('.') {
            text
        } else {
            format!("{}.0", text)
        }
    } else {
        let text = format!("{:e}", x);
        match text.split_once('e') {
            Some((mantissa, exponent)) if mantissa.contains('.') => {
                format!("{}E{}", mantissa, exponent)
            }
            Some((mantissa, exponent)) => format!("{}.0E{}", mantissa, exponent),
            None => text,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Real(r) => f.write_str(&format_real(*r)),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Char(c) => write!(f, "{}", c),
            Value::Str(s) => f.write_str(s),
        }
    }
}
