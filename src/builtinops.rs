//! Built-in operations registry.
//!
//! This module provides one registry of the language's built-in operations:
//! the native function library and the special forms recognized directly by
//! the evaluator.
//!
//! ```lisp
//! (+ 1 2.5)                    ; => 3.5
//! (assoc {:a 1} :b 2)          ; => {:a 1 :b 2}
//! (let [a (atom 1)]
//!   (swap! a + 10))            ; => 11
//! ```
//!
//! ## Functions vs Special Forms
//!
//! - **Functions**: Evaluate all arguments before application (e.g., `+`, `cons`, `str`).
//!   They are installed into the root environment by [`crate::bootstrap`] and can be
//!   passed around like any other value.
//! - **Special Forms**: Control evaluation of their arguments (e.g., `if`, `let`, `fn`).
//!   They are looked up by head symbol before a list is treated as a call and are
//!   never bound in an environment.
//!
//! ## Error Handling
//!
//! - **Arity Checking**: every operation declares an [`Arity`] that is validated before
//!   the implementation runs
//! - **Type Safety**: operations reject values of the wrong type with a `TypeError`
//!   (e.g., `(+ 1 "2")`)
//! - **Arithmetic**: integer overflow and division by zero are `ArithmeticError`s
//!
//! ## Adding New Operations
//!
//! 1. **Implement the function** following the signature
//!    `fn(ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, Error>`
//! 2. **Add to BUILTIN_OPS** with its identifier and arity
//! 3. **Add tests** covering edge cases and error conditions

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use im::{OrdMap, Vector};

use crate::Error;
use crate::ast::{Value, kw, pr_str, sym};
use crate::evaluator::{
    CallContext, Environment, Step, eval_def, eval_defmacro, eval_do, eval_fn, eval_if, eval_let,
    eval_let_star, eval_macroexpand, eval_quote, eval_set, eval_syntax_quote, eval_try,
    eval_unquote,
};
use crate::number::{IntType, Number};
use crate::reader::read_str;

/// Number of arguments an operation accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly n arguments
    Exact(usize),
    /// At least n arguments
    AtLeast(usize),
    /// Between min and max arguments (inclusive)
    Range(usize, usize),
    /// Any even number of arguments (key/value pairs)
    Even,
    Any,
}

impl Arity {
    pub fn accepts(&self, count: usize) -> bool {
        match *self {
            Arity::Exact(n) => count == n,
            Arity::AtLeast(n) => count >= n,
            Arity::Range(min, max) => (min..=max).contains(&count),
            Arity::Even => count % 2 == 0,
            Arity::Any => true,
        }
    }

    /// Check an argument count, producing an `ArityError` on mismatch
    pub fn validate(&self, count: usize) -> Result<(), Error> {
        if self.accepts(count) {
            Ok(())
        } else {
            Err(Error::arity_error(*self, count))
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn plural(n: usize) -> &'static str {
            if n == 1 { "argument" } else { "arguments" }
        }
        match *self {
            Arity::Exact(n) => write!(f, "exactly {n} {}", plural(n)),
            Arity::AtLeast(n) => write!(f, "at least {n} {}", plural(n)),
            Arity::Range(min, max) => write!(f, "between {min} and {max} arguments"),
            Arity::Even => write!(f, "an even number of arguments"),
            Arity::Any => write!(f, "any number of arguments"),
        }
    }
}

/// Signature of a native function in the registry
pub(crate) type BuiltinFn = fn(&CallContext<'_>, &[Value]) -> Result<Value, Error>;

/// Signature of a special form: unevaluated arguments, current environment,
/// current evaluation depth
pub(crate) type SpecialFormFn = fn(&[Value], &Environment, usize) -> Result<Step, Error>;

/// Represents the implementation of a built-in operation (function or special form)
#[derive(Clone, Copy)]
pub(crate) enum OpKind {
    /// Regular function that takes evaluated arguments and returns a value
    Function(BuiltinFn),
    /// Special form that receives unevaluated arguments and decides how evaluation continues
    SpecialForm(SpecialFormFn),
}

impl fmt::Debug for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpKind::Function(_) => write!(f, "Function(<fn>)"),
            OpKind::SpecialForm(_) => write!(f, "SpecialForm(<fn>)"),
        }
    }
}

/// Definition of a built-in operation
#[derive(Debug, Clone)]
pub(crate) struct BuiltinOp {
    /// The identifier this operation is bound to
    pub id: &'static str,
    pub op_kind: OpKind,
    /// Expected number of arguments
    pub arity: Arity,
}

impl BuiltinOp {
    /// Check if the given number of arguments is valid for this operation
    pub(crate) fn validate_arity(&self, arg_count: usize) -> Result<(), Error> {
        if self.arity.accepts(arg_count) {
            Ok(())
        } else {
            Err(Error::arity_error_with_expr(self.arity, arg_count, self.id))
        }
    }
}

//
// Builtin Function Implementations
//
// Arity is validated by `Native::call` before any of these run, so direct
// indexing within the declared bounds cannot fail.
//

fn numbers(args: &[Value]) -> Result<Vec<Number>, Error> {
    args.iter().map(Value::as_number).collect()
}

/// Left fold over numeric arguments; a single argument is passed to `unary`
fn fold_numeric(
    args: &[Value],
    unary: fn(Number) -> Result<Number, Error>,
    op: fn(Number, Number) -> Result<Number, Error>,
) -> Result<Value, Error> {
    let nums = numbers(args)?;
    let result = match nums.as_slice() {
        [] => return Err(Error::arity_error(Arity::AtLeast(1), 0)),
        [only] => unary(*only)?,
        [first, rest @ ..] => rest.iter().try_fold(*first, |acc, n| op(acc, *n))?,
    };
    Ok(Value::Number(result))
}

fn builtin_add(_ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, Error> {
    let sum = numbers(args)?
        .into_iter()
        .try_fold(Number::Int(0), Number::checked_add)?;
    Ok(Value::Number(sum))
}

fn builtin_mul(_ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, Error> {
    let product = numbers(args)?
        .into_iter()
        .try_fold(Number::Int(1), Number::checked_mul)?;
    Ok(Value::Number(product))
}

fn builtin_sub(_ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, Error> {
    fold_numeric(args, Number::checked_neg, Number::checked_sub)
}

fn builtin_div(_ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, Error> {
    fold_numeric(args, |n| Number::Int(1).checked_div(n), Number::checked_div)
}

fn builtin_mod(_ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, Error> {
    args[0]
        .as_number()?
        .checked_mod(args[1].as_number()?)
        .map(Value::Number)
}

fn builtin_equal(_ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Bool(args.windows(2).all(|w| w[0] == w[1])))
}

// Macro to generate numeric comparison functions
macro_rules! numeric_comparison {
    ($name:ident, $op:tt) => {
        fn $name(_ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, Error> {
            let nums = numbers(args)?;
            Ok(Value::Bool(nums.windows(2).all(|w| w[0] $op w[1])))
        }
    };
}

numeric_comparison!(builtin_lt, <);
numeric_comparison!(builtin_gt, >);
numeric_comparison!(builtin_le, <=);
numeric_comparison!(builtin_ge, >=);

macro_rules! type_predicate {
    ($name:ident, $pattern:pat) => {
        fn $name(_ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, Error> {
            Ok(Value::Bool(matches!(args, [$pattern])))
        }
    };
}

type_predicate!(builtin_is_nil, Value::Nil);
type_predicate!(builtin_is_true, Value::Bool(true));
type_predicate!(builtin_is_false, Value::Bool(false));
type_predicate!(builtin_is_number, Value::Number(_));
type_predicate!(builtin_is_string, Value::String(_));
type_predicate!(builtin_is_symbol, Value::Symbol(_));
type_predicate!(builtin_is_keyword, Value::Keyword(_));
type_predicate!(builtin_is_list, Value::List(_));
type_predicate!(builtin_is_vector, Value::Vector(_));
type_predicate!(builtin_is_map, Value::Map(_));
type_predicate!(builtin_is_set, Value::Set(_));
type_predicate!(builtin_is_sequential, Value::List(_) | Value::Vector(_));
type_predicate!(builtin_is_fn, Value::Lambda(_) | Value::Native(_));
type_predicate!(builtin_is_macro, Value::Macro(_));
type_predicate!(builtin_is_atom, Value::Atom(_));

fn count_value(n: usize) -> Value {
    Value::from(IntType::try_from(n).unwrap_or(IntType::MAX))
}

/// Convert an index argument to `usize`
fn index_arg(value: &Value) -> Result<usize, Error> {
    let i = value.as_int()?;
    usize::try_from(i).map_err(|_| Error::EvalError(format!("Index must be non-negative, got {i}")))
}

fn builtin_is_empty(_ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, Error> {
    let empty = match &args[0] {
        Value::Map(m) => m.is_empty(),
        Value::Set(s) => s.is_empty(),
        Value::String(s) => s.is_empty(),
        other => other.to_seq()?.is_empty(),
    };
    Ok(Value::Bool(empty))
}

fn builtin_contains(_ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, Error> {
    let found = match &args[0] {
        Value::Map(m) => m.contains_key(&args[1]),
        Value::Set(s) => s.contains(&args[1]),
        Value::Vector(v) => matches!(&args[1], Value::Number(Number::Int(i)) if usize::try_from(*i).is_ok_and(|i| i < v.len())),
        Value::Nil => false,
        other => return Err(Error::type_mismatch("map, set or vector", other)),
    };
    Ok(Value::Bool(found))
}

fn builtin_list(_ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::List(args.iter().cloned().collect()))
}

fn builtin_vector(_ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Vector(args.iter().cloned().collect()))
}

fn builtin_hash_map(_ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Map(
        args.chunks(2)
            .map(|pair| (pair[0].clone(), pair[1].clone()))
            .collect(),
    ))
}

fn builtin_hash_set(_ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Set(args.iter().cloned().collect()))
}

fn builtin_symbol(_ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, Error> {
    Ok(sym(args[0].as_str()?))
}

fn builtin_keyword(_ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, Error> {
    match &args[0] {
        Value::Keyword(_) => Ok(args[0].clone()),
        other => Ok(kw(other.as_str()?)),
    }
}

fn builtin_vec(_ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Vector(args[0].to_seq()?))
}

static GENSYM_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Fresh symbol for macro hygiene: `(gensym)` or `(gensym "prefix")`
fn builtin_gensym(_ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, Error> {
    let prefix = match args.first() {
        Some(prefix) => prefix.as_str()?,
        None => "G",
    };
    let n = GENSYM_COUNTER.fetch_add(1, Ordering::Relaxed);
    Ok(sym(format!("{prefix}__{n}")))
}

fn builtin_cons(_ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, Error> {
    let mut items = args[1].to_seq()?;
    items.push_front(args[0].clone());
    Ok(Value::List(items))
}

fn builtin_conj(_ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, Error> {
    let (coll, items) = (&args[0], &args[1..]);
    match coll {
        Value::Nil | Value::List(_) => {
            let mut list = coll.to_seq()?;
            for item in items {
                list.push_front(item.clone());
            }
            Ok(Value::List(list))
        }
        Value::Vector(v) => {
            let mut v = v.clone();
            v.extend(items.iter().cloned());
            Ok(Value::Vector(v))
        }
        Value::Set(s) => {
            let mut s = s.clone();
            for item in items {
                s.insert(item.clone());
            }
            Ok(Value::Set(s))
        }
        Value::Map(m) => {
            let mut m = m.clone();
            for item in items {
                match item {
                    Value::Vector(pair) if pair.len() == 2 => {
                        m.insert(pair[0].clone(), pair[1].clone());
                    }
                    other => return Err(Error::type_mismatch("[key value] vector", other)),
                }
            }
            Ok(Value::Map(m))
        }
        other => Err(Error::type_mismatch("collection", other)),
    }
}

fn builtin_concat(_ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, Error> {
    let mut result = Vector::new();
    for arg in args {
        result.append(arg.to_seq()?);
    }
    Ok(Value::List(result))
}

fn builtin_assoc(_ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, Error> {
    let (coll, pairs) = (&args[0], &args[1..]);
    if pairs.len() % 2 != 0 {
        return Err(Error::arity_error_with_expr(Arity::Even, pairs.len(), "assoc key/value pairs"));
    }
    match coll {
        Value::Nil | Value::Map(_) => {
            let mut map = match coll {
                Value::Map(m) => m.clone(),
                _ => OrdMap::new(),
            };
            for pair in pairs.chunks(2) {
                map.insert(pair[0].clone(), pair[1].clone());
            }
            Ok(Value::Map(map))
        }
        Value::Vector(v) => {
            let mut v = v.clone();
            for pair in pairs.chunks(2) {
                let i = index_arg(&pair[0])?;
                match i.cmp(&v.len()) {
                    std::cmp::Ordering::Less => {
                        v.set(i, pair[1].clone());
                    }
                    std::cmp::Ordering::Equal => v.push_back(pair[1].clone()),
                    std::cmp::Ordering::Greater => {
                        return Err(Error::EvalError(format!(
                            "Index {i} out of bounds for vector of length {}",
                            v.len()
                        )));
                    }
                }
            }
            Ok(Value::Vector(v))
        }
        other => Err(Error::type_mismatch("map or vector", other)),
    }
}

fn builtin_dissoc(_ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, Error> {
    match &args[0] {
        Value::Nil => Ok(Value::Nil),
        Value::Map(m) => {
            let mut m = m.clone();
            for key in &args[1..] {
                m.remove(key);
            }
            Ok(Value::Map(m))
        }
        other => Err(Error::type_mismatch("map", other)),
    }
}

fn builtin_disj(_ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, Error> {
    match &args[0] {
        Value::Nil => Ok(Value::Nil),
        Value::Set(s) => {
            let mut s = s.clone();
            for item in &args[1..] {
                s.remove(item);
            }
            Ok(Value::Set(s))
        }
        other => Err(Error::type_mismatch("set", other)),
    }
}

/// `(get coll key)` or `(get coll key default)`
fn builtin_get(_ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, Error> {
    let key = &args[1];
    let found = match &args[0] {
        Value::Map(m) => m.get(key).cloned(),
        Value::Set(s) => s.contains(key).then(|| key.clone()),
        Value::Vector(v) => match key {
            Value::Number(Number::Int(i)) => usize::try_from(*i).ok().and_then(|i| v.get(i)).cloned(),
            _ => None,
        },
        Value::Nil => None,
        other => return Err(Error::type_mismatch("map, set or vector", other)),
    };
    Ok(found.or_else(|| args.get(2).cloned()).unwrap_or(Value::Nil))
}

fn builtin_nth(_ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, Error> {
    let items = match &args[0] {
        Value::List(items) | Value::Vector(items) => items,
        other => return Err(Error::type_mismatch("list or vector", other)),
    };
    let i = index_arg(&args[1])?;
    items.get(i).cloned().ok_or_else(|| {
        Error::EvalError(format!("Index {i} out of bounds for sequence of length {}", items.len()))
    })
}

fn builtin_first(_ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, Error> {
    Ok(args[0].to_seq()?.front().cloned().unwrap_or(Value::Nil))
}

fn builtin_rest(_ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, Error> {
    let mut items = args[0].to_seq()?;
    items.pop_front();
    Ok(Value::List(items))
}

fn builtin_count(_ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, Error> {
    let n = match &args[0] {
        Value::Map(m) => m.len(),
        Value::Set(s) => s.len(),
        Value::String(s) => s.chars().count(),
        other => other.to_seq()?.len(),
    };
    Ok(count_value(n))
}

fn builtin_seq(_ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, Error> {
    let items = args[0].to_seq()?;
    if items.is_empty() {
        Ok(Value::Nil)
    } else {
        Ok(Value::List(items))
    }
}

fn builtin_keys(_ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::List(args[0].as_map()?.keys().cloned().collect()))
}

fn builtin_vals(_ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::List(args[0].as_map()?.values().cloned().collect()))
}

/// `(map f coll ...)`: applies `f` across the collections, stopping at the shortest
fn builtin_map(ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, Error> {
    let (f, colls) = (&args[0], &args[1..]);
    let seqs = colls.iter().map(Value::to_seq).collect::<Result<Vec<_>, _>>()?;
    let len = seqs.iter().map(Vector::len).min().unwrap_or(0);

    let mut result = Vector::new();
    for i in 0..len {
        let call_args = seqs.iter().map(|s| s[i].clone()).collect();
        result.push_back(ctx.apply(f, call_args)?);
    }
    Ok(Value::List(result))
}

/// `(apply f a b [c d])` calls `f` with `a b c d`
fn builtin_apply(ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, Error> {
    let (f, rest) = (&args[0], &args[1..]);
    let mut call_args = Vec::with_capacity(rest.len());
    if let Some((last, middle)) = rest.split_last() {
        call_args.extend(middle.iter().cloned());
        call_args.extend(last.to_seq()?);
    }
    ctx.apply(f, call_args)
}

fn builtin_atom(_ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Atom(std::rc::Rc::new(std::cell::RefCell::new(args[0].clone()))))
}

fn builtin_deref(_ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::clone(&args[0].as_atom()?.borrow()))
}

fn builtin_reset(_ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, Error> {
    *args[0].as_atom()?.borrow_mut() = args[1].clone();
    Ok(args[1].clone())
}

/// `(swap! a f x y)` stores `(f @a x y)` into `a` and returns it
fn builtin_swap(ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, Error> {
    let cell = args[0].as_atom()?;
    // The borrow ends here: `f` may itself read the atom
    let old = Value::clone(&cell.borrow());

    let mut call_args = vec![old];
    call_args.extend(args[2..].iter().cloned());
    let new = ctx.apply(&args[1], call_args)?;

    *cell.borrow_mut() = new.clone();
    Ok(new)
}

fn join_printed(args: &[Value], readably: bool) -> String {
    args.iter()
        .map(|v| pr_str(v, readably))
        .collect::<Vec<_>>()
        .join(" ")
}

fn builtin_str(_ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::String(
        args.iter()
            .filter(|v| !v.is_nil())
            .map(|v| pr_str(v, false))
            .collect(),
    ))
}

fn builtin_pr_str(_ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, Error> {
    Ok(Value::String(join_printed(args, true)))
}

fn builtin_prn(_ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, Error> {
    println!("{}", join_printed(args, true));
    Ok(Value::Nil)
}

fn builtin_println(_ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, Error> {
    println!("{}", join_printed(args, false));
    Ok(Value::Nil)
}

fn builtin_read_string(_ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, Error> {
    read_str(args[0].as_str()?)
}

fn builtin_meta(_ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, Error> {
    Ok(args[0].meta())
}

fn builtin_with_meta(_ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, Error> {
    args[0].with_meta(args[1].clone())
}

/// Evaluates its argument in the root environment
fn builtin_eval(ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, Error> {
    ctx.eval(&args[0], &ctx.env().root())
}

fn builtin_throw(_ctx: &CallContext<'_>, args: &[Value]) -> Result<Value, Error> {
    Err(Error::Throw(args[0].clone()))
}

/// Global registry of all built-in operations.
///
/// Function pointers are plain data, but the lookup map below is built
/// lazily, so the registry shares the same `LazyLock` initialization.
static BUILTIN_OPS: LazyLock<Vec<BuiltinOp>> = LazyLock::new(|| {
    fn function(id: &'static str, arity: Arity, f: BuiltinFn) -> BuiltinOp {
        BuiltinOp {
            id,
            op_kind: OpKind::Function(f),
            arity,
        }
    }

    fn special_form(id: &'static str, arity: Arity, f: SpecialFormFn) -> BuiltinOp {
        BuiltinOp {
            id,
            op_kind: OpKind::SpecialForm(f),
            arity,
        }
    }

    vec![
        // Special forms
        special_form("def", Arity::Exact(2), eval_def),
        special_form("define", Arity::Exact(2), eval_def),
        special_form("let", Arity::AtLeast(1), eval_let),
        special_form("let*", Arity::AtLeast(1), eval_let_star),
        special_form("quote", Arity::Exact(1), eval_quote),
        special_form("syntax-quote", Arity::Exact(1), eval_syntax_quote),
        special_form("quasiquote", Arity::Exact(1), eval_syntax_quote),
        special_form("unquote", Arity::Any, eval_unquote),
        special_form("splice-unquote", Arity::Any, eval_unquote),
        special_form("defmacro", Arity::AtLeast(2), eval_defmacro),
        special_form("macroexpand", Arity::Exact(1), eval_macroexpand),
        special_form("do", Arity::Any, eval_do),
        special_form("begin", Arity::Any, eval_do),
        special_form("if", Arity::Range(2, 3), eval_if),
        special_form("fn", Arity::AtLeast(1), eval_fn),
        special_form("lambda", Arity::AtLeast(1), eval_fn),
        special_form("try", Arity::Any, eval_try),
        special_form("set!", Arity::Exact(2), eval_set),
        // Arithmetic and comparison
        function("+", Arity::Any, builtin_add),
        function("-", Arity::AtLeast(1), builtin_sub),
        function("*", Arity::Any, builtin_mul),
        function("/", Arity::AtLeast(1), builtin_div),
        function("mod", Arity::Exact(2), builtin_mod),
        function("=", Arity::AtLeast(1), builtin_equal),
        function("<", Arity::AtLeast(1), builtin_lt),
        function(">", Arity::AtLeast(1), builtin_gt),
        function("<=", Arity::AtLeast(1), builtin_le),
        function(">=", Arity::AtLeast(1), builtin_ge),
        // Predicates
        function("nil?", Arity::Exact(1), builtin_is_nil),
        function("true?", Arity::Exact(1), builtin_is_true),
        function("false?", Arity::Exact(1), builtin_is_false),
        function("number?", Arity::Exact(1), builtin_is_number),
        function("string?", Arity::Exact(1), builtin_is_string),
        function("symbol?", Arity::Exact(1), builtin_is_symbol),
        function("keyword?", Arity::Exact(1), builtin_is_keyword),
        function("list?", Arity::Exact(1), builtin_is_list),
        function("vector?", Arity::Exact(1), builtin_is_vector),
        function("map?", Arity::Exact(1), builtin_is_map),
        function("set?", Arity::Exact(1), builtin_is_set),
        function("sequential?", Arity::Exact(1), builtin_is_sequential),
        function("fn?", Arity::Exact(1), builtin_is_fn),
        function("macro?", Arity::Exact(1), builtin_is_macro),
        function("atom?", Arity::Exact(1), builtin_is_atom),
        function("empty?", Arity::Exact(1), builtin_is_empty),
        function("contains?", Arity::Exact(2), builtin_contains),
        // Constructors
        function("list", Arity::Any, builtin_list),
        function("vector", Arity::Any, builtin_vector),
        function("hash-map", Arity::Even, builtin_hash_map),
        function("hash-set", Arity::Any, builtin_hash_set),
        function("symbol", Arity::Exact(1), builtin_symbol),
        function("keyword", Arity::Exact(1), builtin_keyword),
        function("vec", Arity::Exact(1), builtin_vec),
        function("gensym", Arity::Range(0, 1), builtin_gensym),
        // Collections
        function("cons", Arity::Exact(2), builtin_cons),
        function("conj", Arity::AtLeast(1), builtin_conj),
        function("concat", Arity::Any, builtin_concat),
        function("assoc", Arity::AtLeast(1), builtin_assoc),
        function("dissoc", Arity::AtLeast(1), builtin_dissoc),
        function("disj", Arity::AtLeast(1), builtin_disj),
        function("get", Arity::Range(2, 3), builtin_get),
        function("nth", Arity::Exact(2), builtin_nth),
        function("first", Arity::Exact(1), builtin_first),
        function("rest", Arity::Exact(1), builtin_rest),
        function("count", Arity::Exact(1), builtin_count),
        function("seq", Arity::Exact(1), builtin_seq),
        function("keys", Arity::Exact(1), builtin_keys),
        function("vals", Arity::Exact(1), builtin_vals),
        function("map", Arity::AtLeast(2), builtin_map),
        function("apply", Arity::AtLeast(2), builtin_apply),
        // Atoms
        function("atom", Arity::Exact(1), builtin_atom),
        function("deref", Arity::Exact(1), builtin_deref),
        function("reset!", Arity::Exact(2), builtin_reset),
        function("swap!", Arity::AtLeast(2), builtin_swap),
        // Strings and output
        function("str", Arity::Any, builtin_str),
        function("pr-str", Arity::Any, builtin_pr_str),
        function("prn", Arity::Any, builtin_prn),
        function("println", Arity::Any, builtin_println),
        function("read-string", Arity::Exact(1), builtin_read_string),
        // Metadata and control
        function("meta", Arity::Exact(1), builtin_meta),
        function("with-meta", Arity::Exact(2), builtin_with_meta),
        function("eval", Arity::Exact(1), builtin_eval),
        function("throw", Arity::Exact(1), builtin_throw),
    ]
});

/// Lazy static map from identifier to BuiltinOp (private - use find_builtin_op)
static BUILTIN_BY_ID: LazyLock<HashMap<&'static str, &'static BuiltinOp>> = LazyLock::new(|| {
    let ops: &'static [BuiltinOp] = BUILTIN_OPS.as_slice();
    ops.iter().map(|op| (op.id, op)).collect()
});

/// Get all builtin operations (for internal use by evaluator)
pub(crate) fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS.as_slice()
}

/// Find a builtin operation by its identifier
pub(crate) fn find_builtin_op(id: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_BY_ID.get(id).copied()
}

/// Find a special form by its head symbol
pub(crate) fn find_special_form(id: &str) -> Option<(&'static BuiltinOp, SpecialFormFn)> {
    let op = find_builtin_op(id)?;
    match op.op_kind {
        OpKind::SpecialForm(form) => Some((op, form)),
        OpKind::Function(_) => None,
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{list, nil, val, vector};
    use crate::evaluator::{create_global_env, eval_str};
    use maplit::{btreemap, btreeset};
    use std::collections::{BTreeMap, BTreeSet};

    fn map_of(entries: BTreeMap<Value, Value>) -> Value {
        Value::Map(entries.into_iter().collect())
    }

    fn set_of(items: BTreeSet<Value>) -> Value {
        Value::Set(items.into_iter().collect())
    }

    /// Test result variants for data-driven builtin tests
    #[derive(Debug)]
    enum TestResult {
        EvalResult(Value),           // Evaluation should succeed with this value
        SpecificError(&'static str), // Evaluation should fail with error containing this string
        Error,                       // Evaluation should fail (any error)
    }
    use TestResult::*;

    /// Micro-helper for success cases
    fn success<T: Into<Value>>(value: T) -> TestResult {
        EvalResult(val(value))
    }

    fn run_builtin_tests(test_cases: Vec<(&str, TestResult)>) {
        for (i, (input, expected)) in test_cases.iter().enumerate() {
            let env = create_global_env();
            match (eval_str(input, &env), expected) {
                (Ok(actual), EvalResult(expected_val)) => assert!(
                    actual == *expected_val,
                    "#{} {input}: expected {expected_val}, got {actual}",
                    i + 1
                ),
                (Err(_), Error) => {}
                (Err(e), SpecificError(text)) => {
                    let msg = format!("{e}");
                    assert!(msg.contains(text), "#{} {input}: error should contain '{text}', got: {msg}", i + 1);
                }
                (Ok(actual), _) => panic!("#{} {input}: expected error, got {actual}", i + 1),
                (Err(e), EvalResult(expected_val)) => {
                    panic!("#{} {input}: expected {expected_val}, got error {e}", i + 1)
                }
            }
        }
    }

    #[test]
    fn test_arity_display_and_validation() {
        let cases = vec![
            (Arity::Exact(1), "exactly 1 argument", vec![1], vec![0, 2]),
            (Arity::Exact(0), "exactly 0 arguments", vec![0], vec![1]),
            (Arity::AtLeast(2), "at least 2 arguments", vec![2, 5], vec![1]),
            (Arity::Range(2, 3), "between 2 and 3 arguments", vec![2, 3], vec![1, 4]),
            (Arity::Even, "an even number of arguments", vec![0, 4], vec![3]),
            (Arity::Any, "any number of arguments", vec![0, 99], vec![]),
        ];

        for (arity, text, ok, bad) in cases {
            assert_eq!(arity.to_string(), text);
            for n in ok {
                assert!(arity.validate(n).is_ok(), "{arity} should accept {n}");
            }
            for n in bad {
                assert!(
                    matches!(arity.validate(n), Err(crate::Error::ArityError { got, .. }) if got == n),
                    "{arity} should reject {n}"
                );
            }
        }
    }

    #[test]
    fn test_registry_lookup() {
        assert!(find_special_form("if").is_some());
        assert!(find_special_form("+").is_none());
        assert!(find_special_form("cond").is_none(), "cond is a macro, not a special form");
        assert!(matches!(find_builtin_op("+").unwrap().op_kind, OpKind::Function(_)));

        let err = find_builtin_op("if").unwrap().validate_arity(4).unwrap_err();
        assert_eq!(
            format!("{err}"),
            "ArityError: if: expected between 2 and 3 arguments, got 4"
        );

        // Every identifier is registered once
        let mut ids: Vec<_> = get_builtin_ops().iter().map(|op| op.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), get_builtin_ops().len());
    }

    #[test]
    #[expect(clippy::too_many_lines)] // Comprehensive test coverage is intentionally thorough
    fn test_builtins_data_driven() {
        let test_cases = vec![
            // === ARITHMETIC ===
            ("(+)", success(0)),
            ("(+ 1 2 3)", success(6)),
            ("(+ 1 2.0)", success(3.0)),
            ("(- 10)", success(-10)),
            ("(- 10 3 2)", success(5)),
            ("(*)", success(1)),
            ("(* 2 3 4)", success(24)),
            ("(* 1.5 2)", success(3.0)),
            ("(/ 7 2)", success(3)),
            ("(/ 7.0 2)", success(3.5)),
            ("(/ 2)", success(0)),
            ("(/ 2.0)", success(0.5)),
            ("(mod 7 3)", success(1)),
            ("(mod -7 3)", success(2)),
            ("(/ 1 0)", SpecificError("ArithmeticError: Division by zero")),
            ("(/ 1.0 0)", SpecificError("ArithmeticError")),
            ("(mod 1 0)", SpecificError("ArithmeticError")),
            ("(+ 9223372036854775807 1)", SpecificError("Integer overflow")),
            ("(+ 1 \"2\")", SpecificError("Type error: expected number, got string")),
            ("(-)", SpecificError("ArityError: -: expected at least 1 argument, got 0")),
            // === COMPARISON ===
            ("(= 1 1)", success(true)),
            ("(= 1 1.0)", success(true)),
            ("(= 1 2)", success(false)),
            ("(= \"a\" \"a\" \"a\")", success(true)),
            ("(= [1 2] '(1 2))", success(true)),
            ("(= {:a 1} {:a 1})", success(true)),
            ("(= :a 'a)", success(false)),
            ("(< 1 2 3)", success(true)),
            ("(< 1 3 2)", success(false)),
            ("(> 3 2.5)", success(true)),
            ("(<= 1 1 2)", success(true)),
            ("(>= 2 2 3)", success(false)),
            ("(< 1 :a)", Error),
            // === PREDICATES ===
            ("(nil? nil)", success(true)),
            ("(nil? '())", success(false)),
            ("(true? true)", success(true)),
            ("(false? nil)", success(false)),
            ("(number? 1.5)", success(true)),
            ("(string? \"s\")", success(true)),
            ("(symbol? 'a)", success(true)),
            ("(keyword? :a)", success(true)),
            ("(list? '(1))", success(true)),
            ("(list? [1])", success(false)),
            ("(vector? [1])", success(true)),
            ("(map? {})", success(true)),
            ("(set? #{})", success(true)),
            ("(sequential? [1])", success(true)),
            ("(sequential? (list 1))", success(true)),
            ("(sequential? {:a 1})", success(false)),
            ("(fn? +)", success(true)),
            ("(fn? (fn [] 1))", success(true)),
            ("(fn? cond)", success(false)),
            ("(macro? cond)", success(true)),
            ("(atom? (atom 1))", success(true)),
            ("(empty? '())", success(true)),
            ("(empty? nil)", success(true)),
            ("(empty? [1])", success(false)),
            ("(empty? {})", success(true)),
            ("(contains? {:a 1} :a)", success(true)),
            ("(contains? #{1 2} 3)", success(false)),
            ("(contains? [10 20] 1)", success(true)),
            ("(contains? [10 20] 2)", success(false)),
            // === CONSTRUCTORS ===
            ("(list)", EvalResult(Value::List(Vector::new()))),
            ("(list 1 2)", success([1, 2])),
            ("(vector 1 2)", EvalResult(vector([val(1), val(2)]))),
            ("(hash-map :a 1)", EvalResult(map_of(btreemap! { kw("a") => val(1) }))),
            ("(hash-map :a)", SpecificError("expected an even number of arguments, got 1")),
            ("(count (hash-set 1 1 2))", success(2)),
            ("(symbol \"abc\")", EvalResult(sym("abc"))),
            ("(keyword \"k\")", EvalResult(kw("k"))),
            ("(keyword :k)", EvalResult(kw("k"))),
            ("(vec '(1 2))", EvalResult(vector([val(1), val(2)]))),
            ("(symbol? (gensym))", success(true)),
            ("(= (gensym) (gensym))", success(false)),
            // === COLLECTIONS ===
            ("(cons 1 '(2 3))", success([1, 2, 3])),
            ("(cons 1 [2 3])", success([1, 2, 3])),
            ("(cons 1 nil)", success([1])),
            ("(conj '(2 3) 1)", success([1, 2, 3])),
            ("(conj [1 2] 3 4)", EvalResult(vector([val(1), val(2), val(3), val(4)]))),
            ("(conj #{1} 2)", EvalResult(set_of(btreeset! {val(1), val(2)}))),
            ("(conj {} [:a 1])", EvalResult(map_of(btreemap! { kw("a") => val(1) }))),
            ("(concat '(1) [2] nil '(3))", success([1, 2, 3])),
            ("(concat)", EvalResult(Value::List(Vector::new()))),
            ("(assoc {:a 1} :b 2)", EvalResult(map_of(btreemap! { kw("a") => val(1), kw("b") => val(2) }))),
            ("(assoc nil :a 1)", EvalResult(map_of(btreemap! { kw("a") => val(1) }))),
            ("(assoc [1 2] 0 9)", EvalResult(vector([val(9), val(2)]))),
            ("(assoc {:a 1} :b)", Error),
            ("(dissoc {:a 1 :b 2} :a)", EvalResult(map_of(btreemap! { kw("b") => val(2) }))),
            ("(disj #{1 2} 1)", EvalResult(set_of(btreeset! {val(2)}))),
            ("(get {:a 1} :a)", success(1)),
            ("(get {:a 1} :b)", EvalResult(nil())),
            ("(get {:a 1} :b 0)", success(0)),
            ("(get [5 6] 1)", success(6)),
            ("(get nil :a)", EvalResult(nil())),
            ("(get #{:x} :x)", EvalResult(kw("x"))),
            ("(nth [1 2 3] 2)", success(3)),
            ("(nth '(1 2 3) 0)", success(1)),
            ("(nth [1] 5)", SpecificError("out of bounds")),
            ("(nth [1] -1)", SpecificError("non-negative")),
            ("(first '(1 2))", success(1)),
            ("(first nil)", EvalResult(nil())),
            ("(first [])", EvalResult(nil())),
            ("(rest [1 2 3])", success([2, 3])),
            ("(rest nil)", EvalResult(Value::List(Vector::new()))),
            ("(count [1 2 3])", success(3)),
            ("(count nil)", success(0)),
            ("(count {:a 1})", success(1)),
            ("(count \"héllo\")", success(5)),
            ("(count 5)", SpecificError("expected sequence, got number")),
            ("(seq [])", EvalResult(nil())),
            ("(seq [1])", success([1])),
            ("(keys {:a 1 :b 2})", EvalResult(list([kw("a"), kw("b")]))),
            ("(vals {:a 1 :b 2})", success([1, 2])),
            ("(map (fn [x] (* x x)) [1 2 3])", success([1, 4, 9])),
            ("(map + [1 2] [10 20 30])", success([11, 22])),
            ("(apply + 1 2 [3 4])", success(10)),
            ("(apply list [])", EvalResult(Value::List(Vector::new()))),
            ("(apply 1 [])", SpecificError("Cannot apply non-function")),
            // === ATOMS ===
            ("(deref (atom 5))", success(5)),
            ("(let [a (atom 1)] (reset! a 7) @a)", success(7)),
            ("(let [a (atom 1)] (swap! a + 10) (deref a))", success(11)),
            ("(let [a (atom [1])] (swap! a conj 2))", EvalResult(vector([val(1), val(2)]))),
            ("(let [a (atom 1)] (swap! a (fn [x] (+ x @a))))", success(2)),
            ("(= (atom 1) (atom 1))", success(false)),
            ("(let [a (atom 1)] (= a a))", success(true)),
            ("(= @(atom 1) @(atom 1))", success(true)),
            ("(deref 1)", SpecificError("expected atom")),
            // === STRINGS ===
            ("(str)", success("")),
            ("(str \"a\" 1 :k nil \"b\")", success("a1:kb")),
            ("(str [1 \"x\"])", success("[1 x]")),
            ("(pr-str \"a\" 1)", success("\"a\" 1")),
            ("(pr-str)", success("")),
            ("(read-string \"(+ 1 2)\")", EvalResult(list([sym("+"), val(1), val(2)]))),
            ("(read-string \"\")", EvalResult(nil())),
            ("(read-string \"(\")", SpecificError("SyntaxError")),
            // === META & CONTROL ===
            ("(meta (with-meta (fn [] 1) {:doc \"d\"}))", EvalResult(map_of(btreemap! { kw("doc") => val("d") }))),
            ("(meta +)", EvalResult(nil())),
            ("((with-meta (fn [x] x) :m) 4)", success(4)),
            ("(with-meta [1] {})", SpecificError("expected function or macro")),
            ("(eval '(+ 1 2))", success(3)),
            ("(eval (list '* 2 3))", success(6)),
            ("(throw \"boom\")", SpecificError("Uncaught exception: \"boom\"")),
            ("(throw {:code 1})", SpecificError("Uncaught exception: {:code 1}")),
        ];

        run_builtin_tests(test_cases);
    }

    #[test]
    fn test_native_error_context() {
        let env = create_global_env();
        let err = eval_str("(first 5)", &env).unwrap_err();
        assert_eq!(
            format!("{err}"),
            "Type error: expected sequence, got number\n  Context: while calling first"
        );

        // Thrown values are never rewritten
        let err = eval_str("(map (fn [x] (throw x)) [1])", &env).unwrap_err();
        assert_eq!(err, crate::Error::Throw(val(1)));
    }
}
