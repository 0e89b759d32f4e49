// (C) 2020 Brandon Lewis
//
// Runtime values for the Rose tree-walking interpreter.
//
// Every value is cheap to clone: scalars are copied, strings, arrays
// and functions hand out another reference to shared storage. Array
// storage is a flat row-major vector behind a RefCell, so writing
// through one handle is visible through every other handle to the
// same array.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use enumflags2::BitFlags;
use regex::Regex;

use crate::ast::{FieldDecl, Node, Stmt, Type, TypeSet, TypeTag};
use crate::buffer::ByteBuffer;
use crate::env::{Env, Handle};


// The result of any runtime operation.
pub type Result<T> = core::result::Result<T, Error>;


#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Runtime,
    DivByZero,
}

// Errors are ordinary values on the Err channel; they bubble out of
// every sub-evaluation until the top-level driver logs them.
#[derive(Clone, Debug, PartialEq)]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
}

impl Error {
    pub fn runtime(message: impl Into<String>) -> Error {
        Error { kind: ErrorKind::Runtime, message: message.into() }
    }

    pub fn div_by_zero() -> Error {
        Error { kind: ErrorKind::DivByZero, message: "division by zero".to_string() }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}


#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Builtin {
    Print,
    Println,
    Input,
    Len,
}

impl Builtin {
    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Print => "print",
            Builtin::Println => "println",
            Builtin::Input => "input",
            Builtin::Len => "len",
        }
    }
}


// A user function: its static type, the environment captured where
// it was defined, and the parameter/body syntax it runs.
pub struct Function {
    pub ty: Type,
    pub env: Handle<Env<Value>>,
    pub params: Vec<FieldDecl>,
    pub body: Stmt,
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[Function: {:p}]", self)
    }
}


#[derive(Debug)]
pub struct ArrayValue {
    pub elem: Type,
    pub dims: Vec<usize>,
    pub items: RefCell<Vec<Value>>,
}


// All runtime values.
#[derive(Clone, Debug)]
pub enum Value {
    Int(i32),
    Float(f64),
    Char(u8),
    Str(Rc<String>),
    Bool(bool),
    Nil,
    Array(Rc<ArrayValue>),
    Function(Rc<Function>),
    Builtin(Builtin),
}


// Construct a runtime error naming the admissible operand types.
fn expected(expect: TypeSet, got: &Value) -> Error {
    let names: Vec<String> = expect
        .iter()
        .map(|tag| format!("{:?}", tag).to_lowercase())
        .collect();
    Error::runtime(format!(
        "invalid operation: expected {}, got {}",
        names.join("|"),
        got.get_type()
    ))
}

// Construct a runtime error from a mismatched operand pair.
fn type_mismatch(a: &Value, b: &Value) -> Error {
    Error::runtime(format!(
        "invalid operation: {} and {}",
        a.get_type(),
        b.get_type()
    ))
}


// Factors out the boiler plate in operator method implementations.
//
// Each matcher takes the method name and a white-list of operand
// patterns that implement the operator; anything not listed is a
// runtime error.
macro_rules! operator {
    // Template for a unary operator
    (un $name:ident ($expect:expr) { $( $p:pat => $e:expr ),+ $(,)? } ) => {
        pub fn $name (&self) -> Result<Value> {
            use Value::*;
            match self {
                $($p => Ok($e)),+ ,
                value => Err(expected($expect, value))
            }
        }
    };

    // Template for a binary operator
    (bin $name:ident { $( $p:pat => $e:expr ),+ $(,)? } ) => {
        pub fn $name (&self, other: &Value) -> Result<Value> {
            use Value::*;
            #[allow(unreachable_patterns)]
            match (self, other) {
                $($p => Ok($e)),+ ,
                (a, b) => Err(type_mismatch(a, b))
            }
        }
    };
}


lazy_static! {
    static ref INT_RE: Regex = Regex::new(r"^[+-]?[0-9]+$").unwrap();
    static ref FLOAT_RE: Regex = Regex::new(r"^[+-]?([0-9]+\.[0-9]*|\.[0-9]+|[0-9]+)$").unwrap();
}

fn is_bool(text: &str) -> bool {
    text == "true" || text == "false"
}


impl Value {
    operator! { bin add {
        (Int(a),   Int(b))   => Int(a + b),
        (Float(a), Float(b)) => Float(a + b),
        (Int(a),   Float(b)) => Float(*a as f64 + b),
        (Float(a), Int(b))   => Float(a + *b as f64),
    } }

    operator! { bin sub {
        (Int(a),   Int(b))   => Int(a - b),
        (Float(a), Float(b)) => Float(a - b),
        (Int(a),   Float(b)) => Float(*a as f64 - b),
        (Float(a), Int(b))   => Float(a - *b as f64),
    } }

    operator! { bin mul {
        (Int(a),   Int(b))   => Int(a * b),
        (Float(a), Float(b)) => Float(a * b),
        (Int(a),   Float(b)) => Float(*a as f64 * b),
        (Float(a), Int(b))   => Float(a * *b as f64),
    } }

    // Division and modulo check the divisor before dispatching, so
    // both the Int and the Float form yield DivByZero.
    pub fn div(&self, other: &Value) -> Result<Value> {
        use Value::*;
        match (self, other) {
            (Int(_), Int(0)) | (Float(_), Int(0)) => Err(Error::div_by_zero()),
            (Int(_), Float(b)) | (Float(_), Float(b)) if *b == 0.0 => Err(Error::div_by_zero()),
            (Int(a), Int(b)) => Ok(Int(a / b)),
            (Float(a), Float(b)) => Ok(Float(a / b)),
            (Int(a), Float(b)) => Ok(Float(*a as f64 / b)),
            (Float(a), Int(b)) => Ok(Float(a / *b as f64)),
            (a, b) => Err(type_mismatch(a, b)),
        }
    }

    pub fn rem(&self, other: &Value) -> Result<Value> {
        use Value::*;
        match (self, other) {
            (Int(_), Int(0)) | (Float(_), Int(0)) => Err(Error::div_by_zero()),
            (Int(_), Float(b)) | (Float(_), Float(b)) if *b == 0.0 => Err(Error::div_by_zero()),
            (Int(a), Int(b)) => Ok(Int(a % b)),
            (Float(a), Float(b)) => Ok(Float(a % b)),
            (Int(a), Float(b)) => Ok(Float(*a as f64 % b)),
            (Float(a), Int(b)) => Ok(Float(a % *b as f64)),
            (a, b) => Err(type_mismatch(a, b)),
        }
    }

    operator! { bin bitand { (Int(a), Int(b)) => Int(a & b) } }

    operator! { bin bitor { (Int(a), Int(b)) => Int(a | b) } }

    operator! { bin bitxor { (Int(a), Int(b)) => Int(a ^ b) } }

    operator! { bin shl { (Int(a), Int(b)) => Int(a << b) } }

    operator! { bin shr { (Int(a), Int(b)) => Int(a >> b) } }

    operator! { bin lt {
        (Int(a),   Int(b))   => Bool(a < b),
        (Float(a), Float(b)) => Bool(a < b),
        (Int(a),   Float(b)) => Bool((*a as f64) < *b),
        (Float(a), Int(b))   => Bool(*a < (*b as f64)),
    } }

    operator! { bin gt {
        (Int(a),   Int(b))   => Bool(a > b),
        (Float(a), Float(b)) => Bool(a > b),
        (Int(a),   Float(b)) => Bool((*a as f64) > *b),
        (Float(a), Int(b))   => Bool(*a > (*b as f64)),
    } }

    operator! { bin lte {
        (Int(a),   Int(b))   => Bool(a <= b),
        (Float(a), Float(b)) => Bool(a <= b),
        (Int(a),   Float(b)) => Bool((*a as f64) <= *b),
        (Float(a), Int(b))   => Bool(*a <= (*b as f64)),
    } }

    operator! { bin gte {
        (Int(a),   Int(b))   => Bool(a >= b),
        (Float(a), Float(b)) => Bool(a >= b),
        (Int(a),   Float(b)) => Bool((*a as f64) >= *b),
        (Float(a), Int(b))   => Bool(*a >= (*b as f64)),
    } }

    operator! { un pos (TypeTag::Int | TypeTag::Float) {
        Int(a) => Int(*a),
        Float(a) => Float(*a),
    } }

    operator! { un neg (TypeTag::Int | TypeTag::Float) {
        Int(a) => Int(-a),
        Float(a) => Float(-a),
    } }

    operator! { un bitnot (BitFlags::from_flag(TypeTag::Int)) {
        Int(a) => Int(!a),
    } }

    // Structural equality; numeric operands mix, everything else
    // compares within its own variant.
    pub fn equals(&self, other: &Value) -> bool {
        use Value::*;
        match (self, other) {
            (Int(a), Int(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (Int(a), Float(b)) => (*a as f64) == *b,
            (Float(a), Int(b)) => *a == (*b as f64),
            (Char(a), Char(b)) => a == b,
            (Str(a), Str(b)) => a == b,
            (Bool(a), Bool(b)) => a == b,
            (Nil, Nil) => true,
            (Array(a), Array(b)) => {
                a.elem == b.elem
                    && a.dims == b.dims
                    && *a.items.borrow() == *b.items.borrow()
            }
            (Function(a), Function(b)) => Rc::ptr_eq(a, b),
            (Builtin(a), Builtin(b)) => a == b,
            _ => false,
        }
    }

    // Concatenate the display forms of two values into a String.
    pub fn concat(&self, other: &Value) -> Value {
        let mut bb = ByteBuffer::new();
        bb.append_fmt(format_args!("{}{}", self, other));
        Value::Str(Rc::new(bb.drain()))
    }

    // The projection onto bool used by every conditional construct.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Int(v) => *v != 0,
            Value::Float(v) => *v != 0.0,
            _ => true,
        }
    }

    pub fn get_type(&self) -> Type {
        match self {
            Value::Int(_) => Type::Int,
            Value::Float(_) => Type::Float,
            Value::Char(_) => Type::Char,
            Value::Str(_) => Type::Str,
            Value::Bool(_) => Type::Bool,
            Value::Nil => Type::Nil,
            Value::Array(a) => Type::Array {
                dims: a.dims.clone(),
                elem: Node::new(a.elem.clone()),
            },
            Value::Function(f) => f.ty.clone(),
            Value::Builtin(_) => Type::Function { params: vec![], returns: vec![] },
        }
    }

    // The zero value a declared-but-uninitialized binding receives.
    pub fn zero(ty: &Type) -> Value {
        match ty {
            Type::Int => Value::Int(0),
            Type::Float => Value::Float(0.0),
            Type::Char => Value::Char(0),
            Type::Str => Value::Str(Rc::new(String::new())),
            Type::Bool => Value::Bool(false),
            _ => Value::Nil,
        }
    }

    // Conversions, per the cast table. String sources are validated
    // before parsing; anything off the table is a runtime error.
    pub fn cast(&self, target: &Type) -> Result<Value> {
        use Value::*;
        match (self, target) {
            (Str(s), Type::Str) => Ok(Str(s.clone())),
            (Str(s), Type::Int) if INT_RE.is_match(s) => match s.parse() {
                Ok(v) => Ok(Int(v)),
                Err(_) => Err(Error::runtime("invalid cast")),
            },
            (Str(s), Type::Float) if FLOAT_RE.is_match(s) => match s.parse() {
                Ok(v) => Ok(Float(v)),
                Err(_) => Err(Error::runtime("invalid cast")),
            },
            (Str(s), Type::Char) if s.len() == 1 => Ok(Char(s.as_bytes()[0])),
            (Str(s), Type::Bool) if is_bool(s) => Ok(Bool(s.as_str() == "true")),
            (Int(v), Type::Int) => Ok(Int(*v)),
            (Int(v), Type::Float) => Ok(Float(*v as f64)),
            (Float(v), Type::Float) => Ok(Float(*v)),
            (Float(v), Type::Int) => Ok(Int(*v as i32)),
            (Char(c), Type::Char) => Ok(Char(*c)),
            (Char(c), Type::Int) => Ok(Int(i32::from(*c))),
            (Char(c), Type::Str) => Ok(Str(Rc::new((*c as char).to_string()))),
            _ => Err(Error::runtime("invalid cast")),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}


// Decode the escape vocabulary while printing; everything else is
// emitted as-is.
fn write_decoded(f: &mut fmt::Formatter, text: &str) -> fmt::Result {
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            let decoded = match chars.peek() {
                Some('n') => Some('\n'),
                Some('t') => Some('\t'),
                Some('"') => Some('"'),
                Some('\'') => Some('\''),
                Some('\\') => Some('\\'),
                _ => None,
            };
            if let Some(d) = decoded {
                chars.next();
                write!(f, "{}", d)?;
                continue;
            }
        }
        write!(f, "{}", c)?;
    }
    Ok(())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{:.6}", v),
            Value::Char(c) => write!(f, "{}", *c as char),
            Value::Str(s) => write_decoded(f, s),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Nil => write!(f, "nil"),
            Value::Array(a) => {
                write!(f, "[")?;
                for (i, item) in a.items.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Function(fun) => write!(f, "[Function: {:p}]", Rc::as_ptr(fun)),
            Value::Builtin(b) => write!(f, "[Builtin: {}]", b.name()),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use super::Value::*;

    fn s(text: &str) -> Value {
        Str(Rc::new(String::from(text)))
    }

    fn arr(elem: Type, dims: &[usize], items: &[Value]) -> Value {
        Array(Rc::new(ArrayValue {
            elem,
            dims: dims.to_vec(),
            items: RefCell::new(items.to_vec()),
        }))
    }

    #[test]
    fn test_truthiness() {
        assert!(!Nil.is_truthy());
        assert!(!Bool(false).is_truthy());
        assert!(!Int(0).is_truthy());
        assert!(!Float(0.0).is_truthy());

        assert!(Bool(true).is_truthy());
        assert!(Int(-1).is_truthy());
        assert!(Float(0.5).is_truthy());
        assert!(s("").is_truthy());
        assert!(Char(b'x').is_truthy());
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(Int(2).add(&Int(3)), Ok(Int(5)));
        assert_eq!(Int(2).sub(&Int(3)), Ok(Int(-1)));
        assert_eq!(Int(2).mul(&Int(3)), Ok(Int(6)));
        assert_eq!(Int(7).div(&Int(2)), Ok(Int(3)));
        assert_eq!(Int(7).rem(&Int(3)), Ok(Int(1)));
        assert_eq!(Float(1.5).add(&Float(2.5)), Ok(Float(4.0)));
    }

    #[test]
    fn test_numeric_mixing_widens_to_float() {
        assert_eq!(Int(1).add(&Float(0.5)), Ok(Float(1.5)));
        assert_eq!(Float(0.5).add(&Int(1)), Ok(Float(1.5)));
        assert_eq!(Int(3).div(&Float(2.0)), Ok(Float(1.5)));
        assert_eq!(Float(3.0).mul(&Int(2)), Ok(Float(6.0)));
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(Int(1).div(&Int(0)), Err(Error::div_by_zero()));
        assert_eq!(Int(1).rem(&Int(0)), Err(Error::div_by_zero()));
        assert_eq!(Float(1.0).div(&Float(0.0)), Err(Error::div_by_zero()));
        assert_eq!(Float(1.0).rem(&Float(0.0)), Err(Error::div_by_zero()));
        assert_eq!(Int(1).div(&Float(0.0)), Err(Error::div_by_zero()));
        assert_eq!(Float(1.0).div(&Int(0)), Err(Error::div_by_zero()));
    }

    #[test]
    fn test_bitwise_is_int_only() {
        assert_eq!(Int(2).bitand(&Int(3)), Ok(Int(2)));
        assert_eq!(Int(2).bitor(&Int(3)), Ok(Int(3)));
        assert_eq!(Int(2).bitxor(&Int(3)), Ok(Int(1)));
        assert_eq!(Int(1).shl(&Int(3)), Ok(Int(8)));
        assert_eq!(Int(8).shr(&Int(3)), Ok(Int(1)));

        assert!(Float(2.0).bitand(&Float(3.0)).is_err());
        assert!(Bool(true).bitor(&Bool(false)).is_err());
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(Int(2).lt(&Int(3)), Ok(Bool(true)));
        assert_eq!(Int(3).lte(&Int(3)), Ok(Bool(true)));
        assert_eq!(Float(2.0).gt(&Int(1)), Ok(Bool(true)));
        assert_eq!(Int(1).gte(&Float(1.5)), Ok(Bool(false)));
    }

    #[test]
    fn test_unary() {
        assert_eq!(Int(1).pos(), Ok(Int(1)));
        assert_eq!(Int(1).neg(), Ok(Int(-1)));
        assert_eq!(Float(1.5).neg(), Ok(Float(-1.5)));
        assert_eq!(Int(0).bitnot(), Ok(Int(-1)));
        assert!(Bool(true).neg().is_err());
        assert!(Float(1.0).bitnot().is_err());
    }

    #[test]
    fn test_equality() {
        assert!(Int(1).equals(&Int(1)));
        assert!(Int(1).equals(&Float(1.0)));
        assert!(s("ab").equals(&s("ab")));
        assert!(!s("a").equals(&Char(b'a')));
        assert!(Nil.equals(&Nil));
        assert!(!Bool(true).equals(&Int(1)));

        let a = arr(Type::Int, &[2], &[Int(1), Int(2)]);
        let b = arr(Type::Int, &[2], &[Int(1), Int(2)]);
        let c = arr(Type::Int, &[2], &[Int(1), Int(3)]);
        assert!(a.equals(&b));
        assert!(!a.equals(&c));
    }

    #[test]
    fn test_concat_uses_display_forms() {
        assert_eq!(s("ab").concat(&Char(b'c')), s("abc"));
        assert_eq!(Char(b'a').concat(&s("bc")), s("abc"));
        assert_eq!(s("n = ").concat(&Int(3)), s("n = 3"));
    }

    #[test]
    fn test_display_forms() {
        assert_eq!(Int(42).to_string(), "42");
        assert_eq!(Float(1.5).to_string(), "1.500000");
        assert_eq!(Char(b'x').to_string(), "x");
        assert_eq!(Bool(true).to_string(), "true");
        assert_eq!(Nil.to_string(), "nil");
        assert_eq!(s("plain").to_string(), "plain");
        assert_eq!(
            arr(Type::Int, &[3], &[Int(1), Int(2), Int(3)]).to_string(),
            "[1, 2, 3]"
        );
    }

    #[test]
    fn test_display_decodes_escapes() {
        assert_eq!(s("a\\nb").to_string(), "a\nb");
        assert_eq!(s("a\\tb").to_string(), "a\tb");
        assert_eq!(s("\\\"quoted\\\"").to_string(), "\"quoted\"");
        assert_eq!(s("back\\\\slash").to_string(), "back\\slash");
        // Unknown escapes pass through untouched.
        assert_eq!(s("a\\qb").to_string(), "a\\qb");
    }

    #[test]
    fn test_casts() {
        assert_eq!(Int(65).cast(&Type::Float), Ok(Float(65.0)));
        assert_eq!(Float(1.9).cast(&Type::Int), Ok(Int(1)));
        assert_eq!(Char(b'A').cast(&Type::Int), Ok(Int(65)));
        assert_eq!(Char(b'A').cast(&Type::Str), Ok(s("A")));
        assert_eq!(s("42").cast(&Type::Int), Ok(Int(42)));
        assert_eq!(s("-7").cast(&Type::Int), Ok(Int(-7)));
        assert_eq!(s("1.5").cast(&Type::Float), Ok(Float(1.5)));
        assert_eq!(s("12").cast(&Type::Float), Ok(Float(12.0)));
        assert_eq!(s("x").cast(&Type::Char), Ok(Char(b'x')));
        assert_eq!(s("true").cast(&Type::Bool), Ok(Bool(true)));
        assert_eq!(s("false").cast(&Type::Bool), Ok(Bool(false)));
    }

    #[test]
    fn test_invalid_casts() {
        assert_eq!(s("abc").cast(&Type::Int), Err(Error::runtime("invalid cast")));
        assert_eq!(s("1.5.2").cast(&Type::Float), Err(Error::runtime("invalid cast")));
        assert_eq!(s("yes").cast(&Type::Bool), Err(Error::runtime("invalid cast")));
        assert_eq!(s("ab").cast(&Type::Char), Err(Error::runtime("invalid cast")));
        assert_eq!(Bool(true).cast(&Type::Int), Err(Error::runtime("invalid cast")));
        assert_eq!(Int(1).cast(&Type::Char), Err(Error::runtime("invalid cast")));
        assert_eq!(Float(1.0).cast(&Type::Str), Err(Error::runtime("invalid cast")));
    }

    #[test]
    fn test_zero_values() {
        assert_eq!(Value::zero(&Type::Int), Int(0));
        assert_eq!(Value::zero(&Type::Float), Float(0.0));
        assert_eq!(Value::zero(&Type::Char), Char(0));
        assert_eq!(Value::zero(&Type::Str), s(""));
        assert_eq!(Value::zero(&Type::Bool), Bool(false));
        assert_eq!(Value::zero(&Type::Nil), Nil);
    }
}
