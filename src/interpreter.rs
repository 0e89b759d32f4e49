// (C) 2020 Brandon Lewis
//
// Tree-walking evaluator for Rose.
//
// *Execution model*
//
// A program is an ordered list of declarations. Evaluation walks the
// tree with a chain of lexical environment frames; a fresh frame is
// opened on every function and block entry and dropped on exit.
//
// *Control flow*
//
// return/break/continue travel as variants of the evaluator's result
// type, never as values a program can store. Loops intercept Break
// and Continue, function calls unwrap Return, and nothing leaks past
// a function boundary.
//
// *Errors*
//
// Errors ride the Err channel and abort the declaration that raised
// them. The top level logs each one to stderr and moves on to the
// next declaration; any logged error makes the final status Failure.

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use crate::ast::*;
use crate::buffer::ByteBuffer;
use crate::env::{Env, Handle};
use crate::typechecker::{self, TypeChecker};
use crate::value::{ArrayValue, Builtin, Error, Function, Result, Value};


#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Status {
    Success,
    Failure,
}


// What evaluating a declaration or statement produced: an ordinary
// value, or a control-flow signal on its way to the construct that
// intercepts it.
#[derive(Clone, Debug)]
pub enum Flow {
    Value(Value),
    Return(Value),
    Break,
    Continue,
}

impl Flow {
    // The carried value, in positions where signals have already
    // been intercepted.
    pub fn value(self) -> Value {
        match self {
            Flow::Value(v) | Flow::Return(v) => v,
            Flow::Break | Flow::Continue => Value::Nil,
        }
    }
}

type Eval = Result<Flow>;


// The evaluator's connection to the outside world. The process
// driver installs the real stdin/stdout pair; tests install a
// scripted one.
pub trait Console {
    fn write(&mut self, text: &str);
    fn read_line(&mut self) -> Option<String>;
}

pub struct Stdio;

impl Console for Stdio {
    fn write(&mut self, text: &str) {
        print!("{}", text);
        io::stdout().flush().ok();
    }

    fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match io::stdin().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => {
                if line.ends_with('\n') {
                    line.pop();
                }
                Some(line)
            }
        }
    }
}


// Type-check and evaluate a program against the real console.
pub fn eval(declarations: &[Decl]) -> Status {
    let mut checker = TypeChecker::new();
    if checker.check_program(declarations) == typechecker::Status::Failure {
        return Status::Failure;
    }

    let mut console = Stdio;
    Interpreter::new(&mut console).run(declarations)
}


pub struct Interpreter<'a> {
    env: Handle<Env<Value>>,
    console: &'a mut dyn Console,
    failed: bool,
}

impl<'a> Interpreter<'a> {
    pub fn new(console: &'a mut dyn Console) -> Interpreter<'a> {
        let env: Handle<Env<Value>> = Handle::new(Env::root());
        env.define("print", Handle::new(Value::Builtin(Builtin::Print)));
        env.define("println", Handle::new(Value::Builtin(Builtin::Println)));
        env.define("input", Handle::new(Value::Builtin(Builtin::Input)));
        env.define("len", Handle::new(Value::Builtin(Builtin::Len)));

        Interpreter { env, console, failed: false }
    }

    // Evaluate every declaration in order. Errors abort only the
    // declaration that raised them.
    pub fn run(&mut self, declarations: &[Decl]) -> Status {
        for declaration in declarations {
            trace!("eval {:?}", declaration);
            if let Err(error) = self.eval_decl(declaration) {
                eprintln!("{}", error);
                self.failed = true;
            }
        }

        if self.failed {
            Status::Failure
        } else {
            Status::Success
        }
    }

    pub fn eval_decl(&mut self, declaration: &Decl) -> Eval {
        match declaration {
            Decl::Let { name, ty, init } | Decl::Const { name, ty, init } => {
                self.eval_binding(name, ty.as_ref(), init.as_ref())
            }
            Decl::Function { name, params, returns, body } => {
                if self.env.exists(name) {
                    return Err(Error::runtime(format!("{}: already defined", name)));
                }
                let function = self.make_function(params, returns, body);
                self.env.define(name, Handle::new(function.clone()));
                Ok(Flow::Value(function))
            }
            // Struct machinery has no runtime semantics yet.
            Decl::Field(_) | Decl::Struct { .. } => Ok(Flow::Value(Value::Nil)),
            Decl::Stmt(statement) => self.eval_stmt(statement),
        }
    }

    fn eval_binding(&mut self, name: &str, ty: Option<&Type>, init: Option<&Expr>) -> Eval {
        if self.env.exists(name) {
            return Err(Error::runtime(format!("{}: already defined", name)));
        }

        let value = match init {
            Some(expr) => self.eval_expr(expr)?,
            // Declared without initializer: the zero value of the
            // declared type fills in.
            None => match ty {
                Some(ty) => Value::zero(ty),
                None => Value::Nil,
            },
        };

        self.env.define(name, Handle::new(value.clone()));
        Ok(Flow::Value(value))
    }

    fn make_function(&self, params: &[FieldDecl], returns: &[Type], body: &Stmt) -> Value {
        Value::Function(Rc::new(Function {
            ty: typechecker::function_type(params, returns),
            env: Handle::clone(&self.env),
            params: params.to_vec(),
            body: body.clone(),
        }))
    }

    pub fn eval_stmt(&mut self, statement: &Stmt) -> Eval {
        match statement {
            Stmt::Block(declarations) => {
                let previous = Handle::clone(&self.env);
                self.env = Handle::new(Env::chain(&previous));
                let result = self.eval_block(declarations);
                self.env = previous;
                result
            }
            Stmt::Expression(expr) => Ok(Flow::Value(self.eval_expr(expr)?)),
            Stmt::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval_expr(expr)?,
                    None => Value::Nil,
                };
                Ok(Flow::Return(value))
            }
            Stmt::Break => Ok(Flow::Break),
            Stmt::Continue => Ok(Flow::Continue),
            Stmt::If { cond, then_branch, else_branch } => {
                let condition = self.eval_expr(cond)?;
                let previous = Handle::clone(&self.env);
                self.env = Handle::new(Env::chain(&previous));
                let result = if condition.is_truthy() {
                    self.eval_stmt(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.eval_stmt(else_branch)
                } else {
                    Ok(Flow::Value(Value::Nil))
                };
                self.env = previous;
                result
            }
            Stmt::While { cond, body } => {
                loop {
                    if !self.eval_expr(cond)?.is_truthy() {
                        break;
                    }
                    match self.eval_stmt(body)? {
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Break => break,
                        // Continue and ordinary values both mean:
                        // next iteration.
                        _ => {}
                    }
                }
                Ok(Flow::Value(Value::Nil))
            }
            Stmt::For { init, cond, action, body } => {
                let previous = Handle::clone(&self.env);
                self.env = Handle::new(Env::chain(&previous));
                let result = self.eval_for(init, cond, action, body);
                self.env = previous;
                result
            }
        }
    }

    // Evaluate a block's declarations in order in the current frame.
    // Signals and errors stop the block and propagate.
    fn eval_block(&mut self, declarations: &[Decl]) -> Eval {
        let mut result = Flow::Value(Value::Nil);
        for declaration in declarations {
            result = self.eval_decl(declaration)?;
            match result {
                Flow::Return(_) | Flow::Break | Flow::Continue => return Ok(result),
                Flow::Value(_) => {}
            }
        }
        Ok(result)
    }

    fn eval_for(&mut self, init: &Decl, cond: &Expr, action: &Expr, body: &Stmt) -> Eval {
        self.eval_decl(init)?;
        loop {
            if !self.eval_expr(cond)?.is_truthy() {
                break;
            }
            match self.eval_stmt(body)? {
                Flow::Return(value) => return Ok(Flow::Return(value)),
                Flow::Break => break,
                _ => {}
            }
            self.eval_expr(action)?;
        }
        Ok(Flow::Value(Value::Nil))
    }

    pub fn eval_expr(&mut self, expression: &Expr) -> Result<Value> {
        match expression {
            Expr::Binary { left, op, right } => {
                let left = self.eval_expr(left)?;
                let right = self.eval_expr(right)?;
                binary(*op, &left, &right)
            }
            Expr::Group(inner) => self.eval_expr(inner),
            Expr::Assign { target, op, value } => match &**target {
                Expr::ArrayMember { receiver, indices } => {
                    self.assign_array(receiver, indices, *op, value)
                }
                Expr::Literal(Literal::Ident(name)) => self.assign_ident(name, *op, value),
                _ => Err(Error::runtime("invalid assignment target")),
            },
            Expr::Call { callee, args } => {
                let callable = self.eval_expr(callee)?;
                let mut arguments = Vec::with_capacity(args.len());
                for arg in args {
                    // An argument error short-circuits the rest.
                    arguments.push(self.eval_expr(arg)?);
                }
                self.call(callable, arguments)
            }
            Expr::Logical { left, op, right } => {
                let left = self.eval_expr(left)?;
                let decision = match op {
                    LogicalOp::And => left.is_truthy() && self.eval_expr(right)?.is_truthy(),
                    LogicalOp::Or => left.is_truthy() || self.eval_expr(right)?.is_truthy(),
                };
                Ok(Value::Bool(decision))
            }
            Expr::Unary { op, operand } => {
                let value = self.eval_expr(operand)?;
                match op {
                    UnOp::Pos => value.pos(),
                    UnOp::Neg => value.neg(),
                    UnOp::Tilde => value.bitnot(),
                    UnOp::Not => Ok(Value::Bool(!value.is_truthy())),
                }
            }
            Expr::Update { operand, op } => {
                let value = self.eval_expr(operand)?;
                match value {
                    // Post-update yields the pre-value; the binding
                    // itself is left unchanged.
                    Value::Int(_) | Value::Float(_) => Ok(value),
                    other => Err(Error::runtime(format!("invalid operation: {}{}", other, op))),
                }
            }
            // Struct machinery has no runtime semantics yet.
            Expr::StructInit { .. } | Expr::StructInline { .. } | Expr::Member { .. } => {
                Ok(Value::Nil)
            }
            Expr::ArrayInit { ty, elements } => self.eval_array_init(ty, elements),
            Expr::Function { params, returns, body } => {
                Ok(self.make_function(params, returns, body))
            }
            Expr::Conditional { cond, then_expr, else_expr } => {
                if self.eval_expr(cond)?.is_truthy() {
                    self.eval_expr(then_expr)
                } else if let Some(else_expr) = else_expr {
                    self.eval_expr(else_expr)
                } else {
                    Ok(Value::Nil)
                }
            }
            Expr::ArrayMember { receiver, indices } => self.eval_array_member(receiver, indices),
            Expr::Cast { target, ty } => {
                let value = self.eval_expr(target)?;
                value.cast(ty)
            }
            Expr::Literal(literal) => self.eval_literal(literal),
        }
    }

    fn eval_literal(&mut self, literal: &Literal) -> Result<Value> {
        match literal {
            Literal::Ident(name) => match self.env.get(name) {
                Some(handle) => Ok((*handle).clone()),
                None => Err(Error::runtime(format!("undefined: {}", name))),
            },
            Literal::Int(v) => Ok(Value::Int(*v)),
            Literal::Float(v) => Ok(Value::Float(*v)),
            Literal::Char(c) => Ok(Value::Char(*c)),
            Literal::Str(s) => Ok(Value::Str(Rc::new(s.clone()))),
            Literal::Bool(b) => Ok(Value::Bool(*b)),
            Literal::Void | Literal::Nil => Ok(Value::Nil),
        }
    }

    fn assign_ident(&mut self, name: &str, op: AssignOp, value_expr: &Expr) -> Result<Value> {
        // Reading the current value first guards assignment to an
        // undefined name.
        let current = match self.env.get(name) {
            Some(handle) => (*handle).clone(),
            None => return Err(Error::runtime(format!("undefined: {}", name))),
        };

        let value = self.eval_expr(value_expr)?;
        let result = match op {
            AssignOp::Assign => value,
            op => apply_compound(op, &current, &value)?,
        };

        self.env.assign(name, Handle::new(result.clone()));
        Ok(result)
    }

    fn assign_array(
        &mut self,
        receiver: &Expr,
        indices: &[Expr],
        op: AssignOp,
        value_expr: &Expr,
    ) -> Result<Value> {
        let array = match self.eval_expr(receiver)? {
            Value::Array(array) => array,
            _ => return Err(Error::runtime("invalid array access")),
        };
        if indices.len() != array.dims.len() {
            return Err(Error::runtime("invalid array access"));
        }

        let offset = self.flat_offset(&array, indices)?;
        // The declared dimensions may promise more elements than the
        // initializer supplied.
        if offset >= array.items.borrow().len() {
            return Err(Error::runtime(format!("index out of range: {}", offset)));
        }
        let value = self.eval_expr(value_expr)?;

        let result = match op {
            AssignOp::Assign => value,
            op => {
                let current = array.items.borrow()[offset].clone();
                apply_compound(op, &current, &value)?
            }
        };

        if result.get_type() != array.elem {
            return Err(Error::runtime("invalid assign: type mismatch"));
        }

        array.items.borrow_mut()[offset] = result.clone();
        Ok(result)
    }

    fn eval_array_init(&mut self, ty: &Type, elements: &[Expr]) -> Result<Value> {
        let (mut dims, elem) = match ty {
            Type::Array { dims, elem } => (dims.clone(), (**elem).clone()),
            _ => return Err(Error::runtime("invalid array initializer")),
        };

        let mut items = Vec::with_capacity(elements.len());
        for element in elements {
            items.push(self.eval_expr(element)?);
        }

        // An unspecified leading dimension takes its size from the
        // element count.
        if dims.first() == Some(&0) {
            let inner: usize = dims[1..].iter().product();
            dims[0] = if inner == 0 { items.len() } else { items.len() / inner };
        }

        Ok(Value::Array(Rc::new(ArrayValue {
            elem,
            dims,
            items: RefCell::new(items),
        })))
    }

    fn eval_array_member(&mut self, receiver: &Expr, indices: &[Expr]) -> Result<Value> {
        let array = match self.eval_expr(receiver)? {
            Value::Array(array) => array,
            _ => return Err(Error::runtime("invalid array access")),
        };
        if indices.len() > array.dims.len() {
            return Err(Error::runtime("invalid array access"));
        }

        let offset = self.flat_offset(&array, indices)?;

        if indices.len() == array.dims.len() {
            let items = array.items.borrow();
            match items.get(offset) {
                Some(value) => Ok(value.clone()),
                None => Err(Error::runtime(format!("index out of range: {}", offset))),
            }
        } else {
            // A partial access denotes the addressed sub-array.
            let remaining: Vec<usize> = array.dims[indices.len()..].to_vec();
            let count: usize = remaining.iter().product();
            let items = array.items.borrow();
            if offset + count > items.len() {
                return Err(Error::runtime("invalid array access"));
            }
            Ok(Value::Array(Rc::new(ArrayValue {
                elem: array.elem.clone(),
                dims: remaining,
                items: RefCell::new(items[offset..offset + count].to_vec()),
            })))
        }
    }

    // Row-major offset of the addressed element (or sub-array),
    // bounds-checking every index against its dimension.
    fn flat_offset(&mut self, array: &ArrayValue, indices: &[Expr]) -> Result<usize> {
        let mut offset = 0;
        for (depth, index_expr) in indices.iter().enumerate() {
            let index = match self.eval_expr(index_expr)? {
                Value::Int(i) => i,
                other => {
                    return Err(Error::runtime(format!("invalid array index: {}", other)));
                }
            };

            let size = array.dims[depth];
            if index < 0 || index as usize >= size {
                return Err(Error::runtime(format!("index out of range: {}", index)));
            }

            let stride: usize = array.dims[depth + 1..].iter().product();
            offset += index as usize * stride.max(1);
        }
        Ok(offset)
    }

    fn call(&mut self, callable: Value, arguments: Vec<Value>) -> Result<Value> {
        match callable {
            Value::Builtin(builtin) => self.run_builtin(builtin, arguments),
            Value::Function(function) => self.run_function(&function, arguments),
            other => Err(Error::runtime(format!("cannot call {}", other.get_type()))),
        }
    }

    fn run_function(&mut self, function: &Function, arguments: Vec<Value>) -> Result<Value> {
        let previous = Handle::clone(&self.env);
        self.env = Handle::new(Env::chain(&function.env));
        for (param, argument) in function.params.iter().zip(arguments) {
            self.env.define(&param.name, Handle::new(argument));
        }

        let result = self.eval_stmt(&function.body);
        self.env = previous;

        match result? {
            Flow::Return(value) | Flow::Value(value) => Ok(value),
            // Stray loop signals stop at the function boundary.
            Flow::Break | Flow::Continue => Ok(Value::Nil),
        }
    }

    fn run_builtin(&mut self, builtin: Builtin, arguments: Vec<Value>) -> Result<Value> {
        match builtin {
            Builtin::Print => {
                let text = render(&arguments);
                self.console.write(&text);
                Ok(Value::Nil)
            }
            Builtin::Println => {
                let mut text = render(&arguments);
                text.push('\n');
                self.console.write(&text);
                Ok(Value::Nil)
            }
            Builtin::Input => {
                let prompt = render(&arguments);
                self.console.write(&prompt);
                match self.console.read_line() {
                    Some(line) => Ok(Value::Str(Rc::new(line))),
                    None => Err(Error::runtime("input: error while reading from stdin")),
                }
            }
            Builtin::Len => {
                let argument = match arguments.first() {
                    Some(argument) => argument,
                    None => return Err(Error::runtime("len: expected one argument")),
                };
                match argument {
                    Value::Str(s) => Ok(Value::Int(s.len() as i32)),
                    Value::Array(a) => Ok(Value::Int(a.items.borrow().len() as i32)),
                    other => {
                        Err(Error::runtime(format!("len: {} has no length", other.get_type())))
                    }
                }
            }
        }
    }
}


// Render an argument list as the concatenation of display forms.
fn render(arguments: &[Value]) -> String {
    let mut bb = ByteBuffer::new();
    for argument in arguments {
        bb.append_fmt(format_args!("{}", argument));
    }
    bb.drain()
}

// Dispatch a binary operator. Any string or char operand routes to
// the textual rules; everything else is numeric (or int-only).
fn binary(op: BinOp, left: &Value, right: &Value) -> Result<Value> {
    let textual = |v: &Value| matches!(v, Value::Str(_) | Value::Char(_));

    if textual(left) || textual(right) {
        return match op {
            BinOp::Add => Ok(left.concat(right)),
            BinOp::Eq => Ok(Value::Bool(left.equals(right))),
            BinOp::Neq => Ok(Value::Bool(!left.equals(right))),
            _ => Err(Error::runtime(format!(
                "invalid operation: {} {} {}",
                left, op, right
            ))),
        };
    }

    match op {
        BinOp::Add => left.add(right),
        BinOp::Sub => left.sub(right),
        BinOp::Mul => left.mul(right),
        BinOp::Div => left.div(right),
        BinOp::Rem => left.rem(right),
        BinOp::BitAnd => left.bitand(right),
        BinOp::BitOr => left.bitor(right),
        BinOp::BitXor => left.bitxor(right),
        BinOp::Shl => left.shl(right),
        BinOp::Shr => left.shr(right),
        BinOp::Eq => Ok(Value::Bool(left.equals(right))),
        BinOp::Neq => Ok(Value::Bool(!left.equals(right))),
        BinOp::Lt => left.lt(right),
        BinOp::Gt => left.gt(right),
        BinOp::Lte => left.lte(right),
        BinOp::Gte => left.gte(right),
    }
}

// Compound assignment: read-compute-write. `+=` concatenates for
// strings and chars; everything else follows the binary operator.
fn apply_compound(op: AssignOp, current: &Value, value: &Value) -> Result<Value> {
    let textual = |v: &Value| matches!(v, Value::Str(_) | Value::Char(_));

    if textual(current) {
        return match op {
            AssignOp::Add if textual(value) => Ok(current.concat(value)),
            _ => Err(Error::runtime(format!(
                "invalid operation: {} and {}",
                current.get_type(),
                value.get_type()
            ))),
        };
    }

    match op {
        AssignOp::Assign => Ok(value.clone()),
        AssignOp::Add => current.add(value),
        AssignOp::Sub => current.sub(value),
        AssignOp::Mul => current.mul(value),
        AssignOp::Div => current.div(value),
        AssignOp::Rem => current.rem(value),
        AssignOp::BitAnd => current.bitand(value),
        AssignOp::BitOr => current.bitor(value),
        AssignOp::BitXor => current.bitxor(value),
        AssignOp::Shl => current.shl(value),
        AssignOp::Shr => current.shr(value),
    }
}
