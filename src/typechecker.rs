// Static type checker for the Rose AST.
//
// A single pre-pass installs top-level function and struct names so
// mutual reference works; the main pass then derives a type for every
// declaration and expression. Failures are collected per top-level
// declaration and written to stderr; the evaluator is only entered on
// Success.

use std::fmt;

use enumflags2::BitFlags;

use crate::ast::*;
use crate::env::{Env, Handle};


#[derive(Clone, Debug, PartialEq)]
pub enum TypeError {
    Undefined(String),
    Uninferable(String),
    Mismatch { required: Type, got: Type },
    Expected { expect: TypeSet, got: Type },
    OperandMismatch { left: Type, right: Type },
    NotCallable(Type),
    Arity { required: usize, got: usize },
    ReturnOutsideFunction,
    UnexpectedReturnValue,
    ReturnMismatch { required: Vec<Type>, got: Type },
    NotAnArray(Type),
    InvalidArrayAccess,
    NotAStruct(Type),
    UnknownField { receiver: Type, field: String },
    BranchMismatch { then: Type, other: Type },
    InvalidCast { from: Type, to: Type },
}

fn tag_names(set: TypeSet) -> String {
    set.iter()
        .map(|tag| format!("{:?}", tag).to_lowercase())
        .collect::<Vec<String>>()
        .join("|")
}

fn type_names(types: &[Type]) -> String {
    types
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<String>>()
        .join("|")
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TypeError::Undefined(name) => write!(f, "undefined: {}", name),
            TypeError::Uninferable(name) => {
                write!(f, "invalid declaration of {}: no type and no initializer", name)
            }
            TypeError::Mismatch { required, got } => {
                write!(f, "incompatible types: required {}, got {}", required, got)
            }
            TypeError::Expected { expect, got } => {
                write!(f, "unexpected operand type: expected {}, got {}", tag_names(*expect), got)
            }
            TypeError::OperandMismatch { left, right } => {
                write!(f, "invalid operation: left type {} must equal right type {}", left, right)
            }
            TypeError::NotCallable(ty) => write!(f, "{}: not a function", ty),
            TypeError::Arity { required, got } => {
                write!(f, "invalid call: expected {} arguments, got {}", required, got)
            }
            TypeError::ReturnOutsideFunction => write!(f, "return outside of a function"),
            TypeError::UnexpectedReturnValue => write!(f, "not expecting any return value"),
            TypeError::ReturnMismatch { required, got } => {
                write!(f, "invalid return: required {}, got {}", type_names(required), got)
            }
            TypeError::NotAnArray(ty) => write!(f, "can only index arrays, got {}", ty),
            TypeError::InvalidArrayAccess => write!(f, "invalid array access"),
            TypeError::NotAStruct(ty) => write!(f, "{} is not a struct", ty),
            TypeError::UnknownField { receiver, field } => {
                write!(f, "{} has no field {}", receiver, field)
            }
            TypeError::BranchMismatch { then, other } => {
                write!(f, "conditional branches disagree: {} vs {}", then, other)
            }
            TypeError::InvalidCast { from, to } => {
                write!(f, "invalid cast: {} to {}", from, to)
            }
        }
    }
}


#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Status {
    Success,
    Failure,
}


pub type TypeCheck = core::result::Result<Type, TypeError>;


// The Function type a declaration or literal denotes, derived from
// its parameter and return syntax.
pub fn function_type(params: &[FieldDecl], returns: &[Type]) -> Type {
    Type::Function {
        params: params.iter().map(|p| p.ty.clone()).collect(),
        returns: returns.to_vec(),
    }
}

pub fn struct_type(fields: &[FieldDecl]) -> Type {
    Type::Struct(
        fields
            .iter()
            .map(|f| Type::Named(f.name.clone(), Node::new(f.ty.clone())))
            .collect(),
    )
}

// Derived type of a declaration, for the evaluator's benefit.
pub fn decl_type(declaration: &Decl) -> Option<Type> {
    match declaration {
        Decl::Function { params, returns, .. } => Some(function_type(params, returns)),
        Decl::Field(field) => Some(field.ty.clone()),
        Decl::Struct { fields, .. } => Some(struct_type(fields)),
        _ => None,
    }
}

// Derived type of an expression whose type is syntactically evident.
pub fn expr_type(expression: &Expr) -> Option<Type> {
    match expression {
        Expr::Function { params, returns, .. } => Some(function_type(params, returns)),
        Expr::ArrayInit { ty, .. } => Some(ty.clone()),
        Expr::Cast { ty, .. } => Some(ty.clone()),
        _ => None,
    }
}

// A function with no declared returns implicitly returns void.
fn effective_returns(returns: &[Type]) -> Vec<Type> {
    if returns.is_empty() {
        vec![Type::Void]
    } else {
        returns.to_vec()
    }
}


pub struct TypeChecker {
    types: Handle<Env<Type>>,
    returns: Option<Vec<Type>>,
}

impl TypeChecker {
    pub fn new() -> TypeChecker {
        TypeChecker {
            types: Handle::new(Env::root()),
            returns: None,
        }
    }

    pub fn check_program(&mut self, declarations: &[Decl]) -> Status {
        // Pre-pass: install top-level function and struct names so
        // bodies can reference each other in any order.
        for declaration in declarations {
            match declaration {
                Decl::Function { name, params, returns, .. } => {
                    self.types.define(name, Handle::new(function_type(params, returns)));
                }
                Decl::Struct { name, fields } => {
                    self.types.define(name, Handle::new(struct_type(fields)));
                }
                _ => {}
            }
        }

        let mut status = Status::Success;
        for declaration in declarations {
            if let Err(error) = self.check_decl(declaration) {
                eprintln!("{}", error);
                status = Status::Failure;
            }
        }
        status
    }

    pub fn check_decl(&mut self, declaration: &Decl) -> TypeCheck {
        match declaration {
            Decl::Let { name, ty, init } | Decl::Const { name, ty, init } => {
                self.check_binding(name, ty.as_ref(), init.as_ref())
            }
            Decl::Field(field) => Ok(field.ty.clone()),
            Decl::Function { name, params, returns, body } => {
                self.check_function(Some(name), params, returns, body)
            }
            Decl::Struct { name, fields } => {
                let ty = struct_type(fields);
                self.types.define(name, Handle::new(ty.clone()));
                Ok(ty)
            }
            Decl::Stmt(statement) => self.check_stmt(statement),
        }
    }

    fn check_binding(
        &mut self,
        name: &str,
        declared: Option<&Type>,
        init: Option<&Expr>,
    ) -> TypeCheck {
        let bound = match (declared, init) {
            (None, None) => return Err(TypeError::Uninferable(name.to_string())),
            // The zero value is synthesised at runtime; the binding
            // takes the declared type.
            (Some(ty), None) => ty.clone(),
            (None, Some(expr)) => self.check_expr(expr)?,
            (Some(ty), Some(expr)) => {
                let got = self.check_expr(expr)?;
                if *ty != got {
                    return Err(TypeError::Mismatch { required: ty.clone(), got });
                }
                got
            }
        };

        self.types.define(name, Handle::new(bound.clone()));
        Ok(bound)
    }

    fn check_function(
        &mut self,
        name: Option<&str>,
        params: &[FieldDecl],
        returns: &[Type],
        body: &Stmt,
    ) -> TypeCheck {
        let ty = function_type(params, returns);
        if let Some(name) = name {
            // Bound in the outer scope before the body is checked,
            // so recursion resolves.
            self.types.define(name, Handle::new(ty.clone()));
        }

        let previous = Handle::clone(&self.types);
        self.types = Handle::new(Env::chain(&previous));
        for param in params {
            self.types.define(&param.name, Handle::new(param.ty.clone()));
        }

        let saved = std::mem::replace(&mut self.returns, Some(effective_returns(returns)));
        let result = self.check_stmt(body);
        self.returns = saved;
        self.types = previous;

        result.map(|_| ty)
    }

    fn check_stmt(&mut self, statement: &Stmt) -> TypeCheck {
        match statement {
            Stmt::Block(declarations) => {
                let previous = Handle::clone(&self.types);
                self.types = Handle::new(Env::chain(&previous));

                let mut result = Ok(Type::Void);
                for declaration in declarations {
                    if let Err(error) = self.check_decl(declaration) {
                        result = Err(error);
                        break;
                    }
                }

                self.types = previous;
                result
            }
            Stmt::Expression(expr) => self.check_expr(expr),
            Stmt::Return(expr) => self.check_return(expr.as_ref()),
            Stmt::Break | Stmt::Continue => Ok(Type::Void),
            Stmt::If { cond, then_branch, else_branch } => {
                self.check_condition(cond)?;
                self.check_stmt(then_branch)?;
                if let Some(else_branch) = else_branch {
                    self.check_stmt(else_branch)?;
                }
                Ok(Type::Void)
            }
            Stmt::While { cond, body } => {
                self.check_condition(cond)?;
                self.check_stmt(body)?;
                Ok(Type::Void)
            }
            Stmt::For { init, cond, action, body } => {
                let previous = Handle::clone(&self.types);
                self.types = Handle::new(Env::chain(&previous));
                let result = self.check_for(init, cond, action, body);
                self.types = previous;
                result
            }
        }
    }

    fn check_for(&mut self, init: &Decl, cond: &Expr, action: &Expr, body: &Stmt) -> TypeCheck {
        self.check_decl(init)?;
        self.check_condition(cond)?;
        self.check_expr(action)?;
        self.check_stmt(body)?;
        Ok(Type::Void)
    }

    fn check_return(&mut self, expr: Option<&Expr>) -> TypeCheck {
        let returns = match &self.returns {
            Some(returns) => returns.clone(),
            None => return Err(TypeError::ReturnOutsideFunction),
        };

        if expr.is_some() && returns.iter().all(|r| *r == Type::Void) {
            return Err(TypeError::UnexpectedReturnValue);
        }

        let got = match expr {
            Some(expr) => self.check_expr(expr)?,
            None => Type::Void,
        };

        if returns.iter().any(|r| *r == got) {
            Ok(got)
        } else {
            Err(TypeError::ReturnMismatch { required: returns, got })
        }
    }

    fn check_condition(&mut self, cond: &Expr) -> Result<(), TypeError> {
        let ty = self.check_expr(cond)?;
        if ty != Type::Bool {
            return Err(TypeError::Mismatch { required: Type::Bool, got: ty });
        }
        Ok(())
    }

    pub fn check_expr(&mut self, expression: &Expr) -> TypeCheck {
        match expression {
            Expr::Binary { left, op, right } => {
                let left = self.check_expr(left)?;
                let right = self.check_expr(right)?;
                binary_type(*op, left, right)
            }
            Expr::Group(inner) => self.check_expr(inner),
            Expr::Assign { target, op, value } => {
                let got = self.check_expr(value)?;
                let required = self.check_expr(target)?;
                if required != got {
                    return Err(TypeError::Mismatch { required, got });
                }
                if let Some(permitted) = compound_operand_types(*op) {
                    if !permitted.contains(got.tag()) {
                        return Err(TypeError::Expected { expect: permitted, got });
                    }
                }
                Ok(got)
            }
            Expr::Call { callee, args } => self.check_call(callee, args),
            Expr::Logical { left, right, .. } => {
                let lt = self.check_expr(left)?;
                if lt != Type::Bool {
                    return Err(TypeError::Mismatch { required: Type::Bool, got: lt });
                }
                let rt = self.check_expr(right)?;
                if rt != Type::Bool {
                    return Err(TypeError::Mismatch { required: Type::Bool, got: rt });
                }
                Ok(Type::Bool)
            }
            Expr::Unary { op, operand } => {
                let ty = self.check_expr(operand)?;
                let permitted: TypeSet = match op {
                    UnOp::Pos | UnOp::Neg => TypeTag::Int | TypeTag::Float,
                    UnOp::Not => BitFlags::from_flag(TypeTag::Bool),
                    UnOp::Tilde => BitFlags::from_flag(TypeTag::Int),
                };
                if !permitted.contains(ty.tag()) {
                    return Err(TypeError::Expected { expect: permitted, got: ty });
                }
                Ok(if *op == UnOp::Not { Type::Bool } else { ty })
            }
            Expr::Update { operand, .. } => {
                let ty = self.check_expr(operand)?;
                let permitted: TypeSet = TypeTag::Int | TypeTag::Float;
                if !permitted.contains(ty.tag()) {
                    return Err(TypeError::Expected { expect: permitted, got: ty });
                }
                Ok(ty)
            }
            Expr::StructInit { name, fields } => {
                let ty = match self.types.get(name) {
                    Some(ty) => (*ty).clone(),
                    None => return Err(TypeError::Undefined(name.clone())),
                };
                self.check_struct_fields(&ty, fields)?;
                Ok(ty)
            }
            Expr::StructInline { ty, fields } => {
                self.check_struct_fields(ty, fields)?;
                Ok(ty.clone())
            }
            Expr::ArrayInit { ty, elements } => {
                let elem = match ty {
                    Type::Array { elem, .. } => (**elem).clone(),
                    other => return Err(TypeError::NotAnArray(other.clone())),
                };
                for element in elements {
                    let got = self.check_expr(element)?;
                    if got != elem {
                        return Err(TypeError::Mismatch { required: elem, got });
                    }
                }
                Ok(ty.clone())
            }
            Expr::Function { params, returns, body } => {
                self.check_function(None, params, returns, body)
            }
            Expr::Conditional { cond, then_expr, else_expr } => {
                self.check_condition(cond)?;
                let then = self.check_expr(then_expr)?;
                if let Some(else_expr) = else_expr {
                    let other = self.check_expr(else_expr)?;
                    if then != other {
                        return Err(TypeError::BranchMismatch { then, other });
                    }
                }
                Ok(then)
            }
            Expr::Member { receiver, name } => {
                let ty = self.check_expr(receiver)?;
                let fields = match &ty {
                    Type::Struct(fields) => fields,
                    _ => return Err(TypeError::NotAStruct(ty)),
                };
                for field in fields {
                    if let Type::Named(field_name, inner) = field {
                        if field_name == name {
                            return Ok((**inner).clone());
                        }
                    }
                }
                Err(TypeError::UnknownField { receiver: ty.clone(), field: name.clone() })
            }
            Expr::ArrayMember { receiver, indices } => {
                let ty = self.check_expr(receiver)?;
                let (dims, elem) = match &ty {
                    Type::Array { dims, elem } => (dims.clone(), (**elem).clone()),
                    _ => return Err(TypeError::NotAnArray(ty)),
                };
                if indices.len() > dims.len() {
                    return Err(TypeError::InvalidArrayAccess);
                }
                for index in indices {
                    let got = self.check_expr(index)?;
                    if got != Type::Int {
                        return Err(TypeError::Mismatch { required: Type::Int, got });
                    }
                }
                if indices.len() == dims.len() {
                    Ok(elem)
                } else {
                    Ok(Type::Array {
                        dims: dims[indices.len()..].to_vec(),
                        elem: Node::new(elem),
                    })
                }
            }
            Expr::Cast { target, ty } => {
                let from = self.check_expr(target)?;
                let castable: TypeSet =
                    TypeTag::Int | TypeTag::Float | TypeTag::Char | TypeTag::Str | TypeTag::Bool;
                if castable.contains(from.tag()) && castable.contains(ty.tag()) {
                    Ok(ty.clone())
                } else {
                    Err(TypeError::InvalidCast { from, to: ty.clone() })
                }
            }
            Expr::Literal(literal) => self.check_literal(literal),
        }
    }

    fn check_struct_fields(&mut self, ty: &Type, inits: &[FieldInit]) -> Result<(), TypeError> {
        let fields = match ty {
            Type::Struct(fields) => fields.clone(),
            _ => return Err(TypeError::NotAStruct(ty.clone())),
        };

        for init in inits {
            let mut declared = None;
            for field in &fields {
                if let Type::Named(name, inner) = field {
                    if *name == init.name {
                        declared = Some((**inner).clone());
                        break;
                    }
                }
            }
            let declared = declared.ok_or_else(|| TypeError::UnknownField {
                receiver: ty.clone(),
                field: init.name.clone(),
            })?;

            let got = self.check_expr(&init.value)?;
            if got != declared {
                return Err(TypeError::Mismatch { required: declared, got });
            }
        }
        Ok(())
    }

    fn check_call(&mut self, callee: &Expr, args: &[Expr]) -> TypeCheck {
        // Builtins are arity-flexible and special-cased unless the
        // name has been rebound by the program.
        if let Expr::Literal(Literal::Ident(name)) = callee {
            if self.types.get(name).is_none() {
                match name.as_str() {
                    "print" | "println" => {
                        for arg in args {
                            self.check_expr(arg)?;
                        }
                        return Ok(Type::Void);
                    }
                    "input" => {
                        for arg in args {
                            self.check_expr(arg)?;
                        }
                        return Ok(Type::Str);
                    }
                    "len" => {
                        if args.len() != 1 {
                            return Err(TypeError::Arity { required: 1, got: args.len() });
                        }
                        let got = self.check_expr(&args[0])?;
                        let sized: TypeSet = TypeTag::Str | TypeTag::Array;
                        if !sized.contains(got.tag()) {
                            return Err(TypeError::Expected { expect: sized, got });
                        }
                        return Ok(Type::Int);
                    }
                    _ => {}
                }
            }
        }

        let callee_ty = self.check_expr(callee)?;
        let (params, returns) = match &callee_ty {
            Type::Function { params, returns } => (params.clone(), returns.clone()),
            _ => return Err(TypeError::NotCallable(callee_ty)),
        };

        if args.len() != params.len() {
            return Err(TypeError::Arity { required: params.len(), got: args.len() });
        }
        for (arg, param) in args.iter().zip(&params) {
            let got = self.check_expr(arg)?;
            if got != *param {
                return Err(TypeError::Mismatch { required: param.clone(), got });
            }
        }

        // Multi-return is deferred; a call takes the first return type.
        Ok(returns.first().cloned().unwrap_or(Type::Void))
    }

    fn check_literal(&mut self, literal: &Literal) -> TypeCheck {
        match literal {
            Literal::Ident(name) => match self.types.get(name) {
                Some(ty) => Ok((*ty).clone()),
                None => Err(TypeError::Undefined(name.clone())),
            },
            Literal::Int(_) => Ok(Type::Int),
            Literal::Float(_) => Ok(Type::Float),
            Literal::Char(_) => Ok(Type::Char),
            Literal::Str(_) => Ok(Type::Str),
            Literal::Bool(_) => Ok(Type::Bool),
            Literal::Void => Ok(Type::Void),
            Literal::Nil => Ok(Type::Nil),
        }
    }
}


// Result type of a binary operation, given its operand types.
fn binary_type(op: BinOp, left: Type, right: Type) -> TypeCheck {
    use BinOp::*;

    let permitted: TypeSet = match op {
        Add => TypeTag::Int | TypeTag::Float | TypeTag::Str | TypeTag::Char,
        Sub | Mul | Div | Rem | Lt | Gt | Lte | Gte => TypeTag::Int | TypeTag::Float,
        Eq | Neq => TypeTag::Int | TypeTag::Float | TypeTag::Str | TypeTag::Char | TypeTag::Bool,
        BitAnd | BitOr | BitXor | Shl | Shr => BitFlags::from_flag(TypeTag::Int),
    };
    if !permitted.contains(left.tag()) {
        return Err(TypeError::Expected { expect: permitted, got: left });
    }
    if !permitted.contains(right.tag()) {
        return Err(TypeError::Expected { expect: permitted, got: right });
    }

    let relational = matches!(op, Eq | Neq | Lt | Gt | Lte | Gte);

    // Strings and chars mix with each other and nothing else.
    let textual: TypeSet = TypeTag::Str | TypeTag::Char;
    if textual.contains(left.tag()) || textual.contains(right.tag()) {
        if !(textual.contains(left.tag()) && textual.contains(right.tag())) {
            return Err(TypeError::OperandMismatch { left, right });
        }
        return match op {
            Add => Ok(Type::Str),
            Eq | Neq => Ok(Type::Bool),
            _ => Err(TypeError::OperandMismatch { left, right }),
        };
    }

    // Numeric mixing widens to float.
    if (left == Type::Int && right == Type::Float) || (left == Type::Float && right == Type::Int) {
        return Ok(if relational { Type::Bool } else { Type::Float });
    }

    if left != right {
        return Err(TypeError::OperandMismatch { left, right });
    }

    Ok(if relational { Type::Bool } else { left })
}

// Admissible operand types of a compound assignment, None for plain `=`.
fn compound_operand_types(op: AssignOp) -> Option<TypeSet> {
    use AssignOp::*;
    match op {
        Assign => None,
        Add => Some(TypeTag::Int | TypeTag::Float | TypeTag::Str | TypeTag::Char),
        Sub | Mul | Div | Rem => Some(TypeTag::Int | TypeTag::Float),
        BitAnd | BitOr | BitXor | Shl | Shr => Some(BitFlags::from_flag(TypeTag::Int)),
    }
}
