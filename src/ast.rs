//! This module defines the core value types and helper functions for representing
//! both data and code in the interpreter. The main enum, [`Value`], covers every
//! runtime type: nil, booleans, numbers, strings, keywords, symbols, the four
//! collection kinds, atoms, and the three callable kinds (closures, macros and
//! native functions). Ergonomic helper functions such as [`val`], [`sym`], [`kw`]
//! and [`nil`] are provided for convenient construction in both code and tests.
//!
//! Values are totally ordered so they can be used as map keys and set members.
//! Lists and vectors are both "sequential" and compare element-wise with each
//! other; atoms and callables compare by identity.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use im::{OrdMap, OrdSet, Vector};

use crate::Error;
use crate::builtinops::Arity;
use crate::evaluator::{CallContext, Environment};
use crate::number::{IntType, Number};

/// Core value type of the interpreter
///
/// To build values, use the helper functions:
/// - `val(42)` for values, `sym("name")` for symbols, `kw("name")` for keywords
/// - `val([1, 2, 3])` for homogeneous lists
/// - `val(vec![sym("op"), val(42)])` for mixed lists
#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    /// Integer or float, see [`Number`]
    Number(Number),
    String(String),
    /// Keyword, stored without the leading colon
    Keyword(String),
    Symbol(String),
    List(Vector<Value>),
    Vector(Vector<Value>),
    Map(OrdMap<Value, Value>),
    Set(OrdSet<Value>),
    /// Mutable reference cell; equality is identity
    Atom(Rc<RefCell<Value>>),
    /// User-defined closure
    Lambda(Rc<Lambda>),
    /// Closure applied to unevaluated forms; its result is evaluated in place of the call
    Macro(Rc<Lambda>),
    /// Function implemented in Rust
    Native(Rc<Native>),
}

/// Parameter list of a closure: fixed names plus an optional `& rest` name
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Params {
    pub fixed: Vec<String>,
    pub variadic: Option<String>,
}

impl Params {
    /// Parse a parameter vector (or list) such as `[a b & rest]`
    pub fn from_form(form: &Value) -> Result<Params, Error> {
        let items = match form {
            Value::Vector(items) | Value::List(items) => items,
            other => return Err(Error::type_mismatch("parameter vector", other)),
        };

        let mut params = Params::default();
        let mut iter = items.iter();
        while let Some(item) = iter.next() {
            let name = match item {
                Value::Symbol(name) => name,
                other => return Err(Error::type_mismatch("symbol as parameter", other)),
            };

            if name == "&" {
                match (iter.next(), iter.next()) {
                    (Some(Value::Symbol(rest)), None) if rest != "&" => {
                        params.check_duplicate(rest)?;
                        params.variadic = Some(rest.clone());
                        break;
                    }
                    _ => {
                        return Err(Error::EvalError(
                            "'&' must be followed by exactly one parameter name".into(),
                        ));
                    }
                }
            }

            params.check_duplicate(name)?;
            params.fixed.push(name.clone());
        }
        Ok(params)
    }

    fn check_duplicate(&self, name: &str) -> Result<(), Error> {
        if self.fixed.iter().any(|p| p == name) {
            return Err(Error::EvalError(format!("Duplicate parameter name: {name}")));
        }
        Ok(())
    }

    pub fn arity(&self) -> Arity {
        match self.variadic {
            Some(_) => Arity::AtLeast(self.fixed.len()),
            None => Arity::Exact(self.fixed.len()),
        }
    }
}

/// A closure: parameters, body and the environment it was created in.
/// Macros share this representation.
#[derive(Clone)]
pub struct Lambda {
    /// Diagnostic name (from `def`, `defmacro` or `(fn name [..] ..)`)
    pub name: Option<String>,
    pub params: Params,
    /// Single body form; several body forms are wrapped in `do`
    pub body: Value,
    pub env: Environment,
    pub meta: Value,
}

/// Signature of native functions
pub type NativeFn = dyn Fn(&CallContext<'_>, &[Value]) -> Result<Value, Error>;

/// A builtin function with its declared arity
#[derive(Clone)]
pub struct Native {
    pub name: String,
    pub arity: Arity,
    pub func: Rc<NativeFn>,
    pub meta: Value,
}

impl Native {
    pub fn new<F>(name: impl Into<String>, arity: Arity, func: F) -> Self
    where
        F: Fn(&CallContext<'_>, &[Value]) -> Result<Value, Error> + 'static,
    {
        Native {
            name: name.into(),
            arity,
            func: Rc::new(func),
            meta: Value::Nil,
        }
    }

    /// Validate arity, then invoke. Type and evaluation errors raised inside
    /// the function are annotated with the function name.
    pub fn call(&self, ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, Error> {
        if !self.arity.accepts(args.len()) {
            return Err(Error::arity_error_with_expr(self.arity, args.len(), &self.name));
        }
        (self.func)(ctx, args).map_err(|err| add_context(err, &self.name))
    }
}

/// Helper function to add the native's name to errors
fn add_context(error: Error, name: &str) -> Error {
    match error {
        Error::EvalError(msg) => Error::EvalError(format!("{msg}\n  Context: while calling {name}")),
        Error::TypeError(msg) => Error::TypeError(format!("{msg}\n  Context: while calling {name}")),
        // Thrown values, arity and arithmetic errors pass through untouched
        other => other,
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Keyword(k) => write!(f, "Keyword({k})"),
            Value::Symbol(s) => write!(f, "Symbol({s})"),
            Value::List(items) => f.debug_tuple("List").field(&items.iter().collect::<Vec<_>>()).finish(),
            Value::Vector(items) => f.debug_tuple("Vector").field(&items.iter().collect::<Vec<_>>()).finish(),
            Value::Map(map) => f.debug_map().entries(map.iter()).finish(),
            Value::Set(set) => f.debug_set().entries(set.iter()).finish(),
            Value::Atom(_) => write!(f, "Atom({self})"),
            Value::Lambda(l) => write!(f, "Lambda({})", l.name.as_deref().unwrap_or("<anonymous>")),
            Value::Macro(m) => write!(f, "Macro({})", m.name.as_deref().unwrap_or("<anonymous>")),
            Value::Native(n) => write!(f, "Native({})", n.name),
        }
    }
}

// From trait implementations for Value - enables .into() conversion
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Value::Number(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Number(Number::Float(f))
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Number(Number::Int(IntType::from(n)))
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(IntType);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::List(arr.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value> + Clone> From<&[T]> for Value {
    fn from(slice: &[T]) -> Self {
        Value::List(slice.iter().cloned().map(Into::into).collect())
    }
}

/// Helper function for creating symbols
pub fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::Symbol(name.as_ref().to_owned())
}

/// Helper function for creating keywords (without the leading colon)
pub fn kw<S: AsRef<str>>(name: S) -> Value {
    Value::Keyword(name.as_ref().to_owned())
}

/// Helper function for creating values from anything convertible
pub fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

pub fn nil() -> Value {
    Value::Nil
}

/// Helper function for building a list out of already-constructed values
pub fn list<I: IntoIterator<Item = Value>>(items: I) -> Value {
    Value::List(items.into_iter().collect())
}

pub fn vector<I: IntoIterator<Item = Value>>(items: I) -> Value {
    Value::Vector(items.into_iter().collect())
}

impl Value {
    /// Everything except `nil` and `false` is truthy
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Check whether this is a list whose head is the given symbol
    pub fn is_form(&self, head: &str) -> bool {
        matches!(self, Value::List(items) if matches!(items.front(), Some(Value::Symbol(s)) if s == head))
    }

    /// Name of this value's type, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Keyword(_) => "keyword",
            Value::Symbol(_) => "symbol",
            Value::List(_) => "list",
            Value::Vector(_) => "vector",
            Value::Map(_) => "map",
            Value::Set(_) => "set",
            Value::Atom(_) => "atom",
            Value::Lambda(_) => "function",
            Value::Macro(_) => "macro",
            Value::Native(_) => "native function",
        }
    }

    pub fn as_number(&self) -> Result<Number, Error> {
        match self {
            Value::Number(n) => Ok(*n),
            other => Err(Error::type_mismatch("number", other)),
        }
    }

    pub fn as_int(&self) -> Result<IntType, Error> {
        match self {
            Value::Number(Number::Int(n)) => Ok(*n),
            other => Err(Error::type_mismatch("integer", other)),
        }
    }

    pub fn as_str(&self) -> Result<&str, Error> {
        match self {
            Value::String(s) => Ok(s),
            other => Err(Error::type_mismatch("string", other)),
        }
    }

    pub fn as_symbol(&self) -> Result<&str, Error> {
        match self {
            Value::Symbol(s) => Ok(s),
            other => Err(Error::type_mismatch("symbol", other)),
        }
    }

    pub fn as_atom(&self) -> Result<&Rc<RefCell<Value>>, Error> {
        match self {
            Value::Atom(cell) => Ok(cell),
            other => Err(Error::type_mismatch("atom", other)),
        }
    }

    pub fn as_map(&self) -> Result<&OrdMap<Value, Value>, Error> {
        match self {
            Value::Map(map) => Ok(map),
            other => Err(Error::type_mismatch("map", other)),
        }
    }

    /// View any seqable value as a sequence of elements.
    /// Maps yield `[key value]` vectors, strings yield one-character strings.
    pub fn to_seq(&self) -> Result<Vector<Value>, Error> {
        match self {
            Value::Nil => Ok(Vector::new()),
            Value::List(items) | Value::Vector(items) => Ok(items.clone()),
            Value::Set(set) => Ok(set.iter().cloned().collect()),
            Value::Map(map) => Ok(map
                .iter()
                .map(|(k, v)| vector([k.clone(), v.clone()]))
                .collect()),
            Value::String(s) => Ok(s.chars().map(|c| Value::String(c.to_string())).collect()),
            other => Err(Error::type_mismatch("sequence", other)),
        }
    }

    /// Metadata attached to a callable; `nil` for everything else
    pub fn meta(&self) -> Value {
        match self {
            Value::Lambda(l) | Value::Macro(l) => l.meta.clone(),
            Value::Native(n) => n.meta.clone(),
            _ => Value::Nil,
        }
    }

    /// Return a copy of this callable carrying `meta`
    pub fn with_meta(&self, meta: Value) -> Result<Value, Error> {
        match self {
            Value::Lambda(l) => Ok(Value::Lambda(Rc::new(Lambda { meta, ..(**l).clone() }))),
            Value::Macro(l) => Ok(Value::Macro(Rc::new(Lambda { meta, ..(**l).clone() }))),
            Value::Native(n) => Ok(Value::Native(Rc::new(Native { meta, ..(**n).clone() }))),
            other => Err(Error::type_mismatch("function or macro", other)),
        }
    }

    /// Rank used to order values of different types
    fn rank(&self) -> u8 {
        match self {
            Value::Nil => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Keyword(_) => 4,
            Value::Symbol(_) => 5,
            Value::List(_) | Value::Vector(_) => 6,
            Value::Map(_) => 7,
            Value::Set(_) => 8,
            Value::Atom(_) => 9,
            Value::Lambda(_) => 10,
            Value::Macro(_) => 11,
            Value::Native(_) => 12,
        }
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Number(a), Value::Number(b)) => a.total_cmp(b),
            (Value::String(a), Value::String(b))
            | (Value::Keyword(a), Value::Keyword(b))
            | (Value::Symbol(a), Value::Symbol(b)) => a.cmp(b),
            (Value::List(a) | Value::Vector(a), Value::List(b) | Value::Vector(b)) => a.iter().cmp(b.iter()),
            (Value::Map(a), Value::Map(b)) => a.cmp(b),
            (Value::Set(a), Value::Set(b)) => a.cmp(b),
            (Value::Atom(a), Value::Atom(b)) => Rc::as_ptr(a).cmp(&Rc::as_ptr(b)),
            (Value::Lambda(a), Value::Lambda(b)) | (Value::Macro(a), Value::Macro(b)) => {
                Rc::as_ptr(a).cmp(&Rc::as_ptr(b))
            }
            (Value::Native(a), Value::Native(b)) => Rc::as_ptr(a).cmp(&Rc::as_ptr(b)),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_value(f, self, true, &mut Vec::new())
    }
}

/// Render a value as text.
///
/// With `print_readably` strings are quoted and escaped so the output reads
/// back as the same value; without it strings are emitted raw (as `str` and
/// `println` do).
pub fn pr_str(value: &Value, print_readably: bool) -> String {
    let mut out = String::new();
    // Writing into a String never fails
    let _ = write_value(&mut out, value, print_readably, &mut Vec::new());
    out
}

fn write_seq<'a, W: fmt::Write>(
    out: &mut W,
    items: impl Iterator<Item = &'a Value>,
    open: &str,
    close: &str,
    readably: bool,
    printing: &mut Printing,
) -> fmt::Result {
    out.write_str(open)?;
    for (i, item) in items.enumerate() {
        if i > 0 {
            out.write_char(' ')?;
        }
        write_value(out, item, readably, printing)?;
    }
    out.write_str(close)
}

/// Atoms currently being printed, so an atom that contains itself prints a
/// placeholder instead of recursing forever
type Printing = Vec<*const RefCell<Value>>;

fn write_value<W: fmt::Write>(
    out: &mut W,
    value: &Value,
    readably: bool,
    printing: &mut Printing,
) -> fmt::Result {
    match value {
        Value::Nil => out.write_str("nil"),
        Value::Bool(b) => write!(out, "{b}"),
        Value::Number(n) => write!(out, "{n}"),
        Value::String(s) if readably => {
            out.write_char('"')?;
            for ch in s.chars() {
                match ch {
                    '"' => out.write_str("\\\"")?,
                    '\\' => out.write_str("\\\\")?,
                    '\n' => out.write_str("\\n")?,
                    '\t' => out.write_str("\\t")?,
                    '\r' => out.write_str("\\r")?,
                    c => out.write_char(c)?,
                }
            }
            out.write_char('"')
        }
        Value::String(s) => out.write_str(s),
        Value::Keyword(k) => write!(out, ":{k}"),
        Value::Symbol(s) => out.write_str(s),
        Value::List(items) => write_seq(out, items.iter(), "(", ")", readably, printing),
        Value::Vector(items) => write_seq(out, items.iter(), "[", "]", readably, printing),
        Value::Map(map) => {
            out.write_char('{')?;
            for (i, (k, v)) in map.iter().enumerate() {
                if i > 0 {
                    out.write_char(' ')?;
                }
                write_value(out, k, readably, printing)?;
                out.write_char(' ')?;
                write_value(out, v, readably, printing)?;
            }
            out.write_char('}')
        }
        Value::Set(set) => write_seq(out, set.iter(), "#{", "}", readably, printing),
        Value::Atom(cell) => {
            let ptr = Rc::as_ptr(cell);
            if printing.contains(&ptr) {
                return out.write_str("(atom ...)");
            }
            printing.push(ptr);
            out.write_str("(atom ")?;
            write_value(out, &cell.borrow(), readably, printing)?;
            printing.pop();
            out.write_char(')')
        }
        Value::Lambda(l) => write_callable(out, "function", l.name.as_deref()),
        Value::Macro(m) => write_callable(out, "macro", m.name.as_deref()),
        Value::Native(n) => write_callable(out, "native", Some(&n.name)),
    }
}

fn write_callable<W: fmt::Write>(out: &mut W, kind: &str, name: Option<&str>) -> fmt::Result {
    match name {
        Some(name) => write!(out, "#<{kind} {name}>"),
        None => write!(out, "#<{kind}>"),
    }
}
