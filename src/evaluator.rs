//! The EVAL loop.
//!
//! [`eval`] runs a loop over an `(ast, env)` pair. Each iteration first
//! macroexpands the form, then either evaluates it as data, dispatches a
//! special form, or evaluates a call. Special forms and lambda calls hand
//! back a [`Step`]: `Return` ends the loop, `TailCall` replaces the pair and
//! continues, so forms in tail position never grow the host stack. Only
//! genuinely nested evaluations (operands, `if` conditions, `let` bindings,
//! non-final `do` forms) recurse, and those are bounded by [`MAX_EVAL_DEPTH`].

pub mod environment;
mod quasiquote;

use std::rc::Rc;

use im::{OrdMap, OrdSet, Vector};
use tracing::{debug, trace};

pub use environment::Environment;

use crate::ast::{Lambda, Params, Value, list, sym};
use crate::builtinops::{Arity, OpKind, find_special_form, get_builtin_ops};
use crate::reader::read_all;
use crate::{Error, MAX_EVAL_DEPTH};

/// What a special form or call asks the EVAL loop to do next
pub(crate) enum Step {
    /// Evaluation is finished with this value
    Return(Value),
    /// Continue the loop with this form in this environment
    TailCall(Value, Environment),
}

/// Evaluator access handed to native functions.
///
/// Natives that call back into the language (`map`, `apply`, `swap!`,
/// `eval`) go through the context so nested evaluation stays depth-limited.
pub struct CallContext<'a> {
    env: &'a Environment,
    depth: usize,
}

impl<'a> CallContext<'a> {
    /// Context for a call made from the top level of `env`
    pub fn new(env: &'a Environment) -> Self {
        CallContext { env, depth: 0 }
    }

    /// Environment of the calling form
    pub fn env(&self) -> &Environment {
        self.env
    }

    /// Call a function value with already evaluated arguments
    pub fn apply(&self, func: &Value, args: Vec<Value>) -> Result<Value, Error> {
        apply_with_depth(func, args, self.env, self.depth + 1)
    }

    /// Evaluate `ast` in `env`
    pub fn eval(&self, ast: &Value, env: &Environment) -> Result<Value, Error> {
        eval_with_depth_tracking(ast.clone(), env.clone(), self.depth + 1)
    }
}

/// Evaluate a form (public API)
pub fn eval(ast: &Value, env: &Environment) -> Result<Value, Error> {
    eval_with_depth_tracking(ast.clone(), env.clone(), 0)
}

/// Read every form of `source` and evaluate them in order, returning the
/// last value (`nil` for empty input)
pub fn eval_str(source: &str, env: &Environment) -> Result<Value, Error> {
    let mut result = Value::Nil;
    for form in read_all(source)? {
        result = eval(&form, env)?;
    }
    Ok(result)
}

/// Call a function value with already evaluated arguments (public API)
pub fn apply(func: &Value, args: Vec<Value>, env: &Environment) -> Result<Value, Error> {
    apply_with_depth(func, args, env, 0)
}

fn apply_with_depth(func: &Value, args: Vec<Value>, env: &Environment, depth: usize) -> Result<Value, Error> {
    match invoke(func, args, env, depth)? {
        Step::Return(value) => Ok(value),
        Step::TailCall(body, frame) => eval_with_depth_tracking(body, frame, depth),
    }
}

/// Evaluate with depth tracking to prevent stack overflow
fn eval_with_depth_tracking(mut ast: Value, mut env: Environment, depth: usize) -> Result<Value, Error> {
    if depth >= MAX_EVAL_DEPTH {
        return Err(Error::EvalError(format!(
            "Evaluation depth limit exceeded (max: {MAX_EVAL_DEPTH})"
        )));
    }

    loop {
        ast = macroexpand_all(ast, &env, depth)?;

        let items = match &ast {
            Value::List(items) if !items.is_empty() => items.clone(),
            _ => return eval_data(&ast, &env, depth),
        };

        let special_form = match items.front() {
            Some(Value::Symbol(head)) => find_special_form(head),
            _ => None,
        };
        let step = match special_form {
            Some((op, form)) => {
                let args: Vec<Value> = items.iter().skip(1).cloned().collect();
                op.validate_arity(args.len())?;
                form(&args, &env, depth)?
            }
            None => eval_call(&items, &env, depth)?,
        };

        match step {
            Step::Return(value) => return Ok(value),
            Step::TailCall(next, next_env) => {
                ast = next;
                env = next_env;
            }
        }
    }
}

/// Evaluate a sub-form that is not in tail position
fn eval_nested(ast: &Value, env: &Environment, depth: usize) -> Result<Value, Error> {
    eval_with_depth_tracking(ast.clone(), env.clone(), depth + 1)
}

/// Anything that is not a non-empty list: symbols resolve, collection
/// literals evaluate their elements, everything else evaluates to itself
fn eval_data(ast: &Value, env: &Environment, depth: usize) -> Result<Value, Error> {
    match ast {
        Value::Symbol(name) => env.get(name),
        Value::Vector(items) => items
            .iter()
            .map(|item| eval_nested(item, env, depth))
            .collect::<Result<Vector<_>, _>>()
            .map(Value::Vector),
        Value::Map(map) => map
            .iter()
            .map(|(k, v)| Ok((eval_nested(k, env, depth)?, eval_nested(v, env, depth)?)))
            .collect::<Result<OrdMap<_, _>, Error>>()
            .map(Value::Map),
        Value::Set(items) => items
            .iter()
            .map(|item| eval_nested(item, env, depth))
            .collect::<Result<OrdSet<_>, _>>()
            .map(Value::Set),
        other => Ok(other.clone()),
    }
}

/// Evaluate operator and operands left to right, then invoke
fn eval_call(items: &Vector<Value>, env: &Environment, depth: usize) -> Result<Step, Error> {
    let mut evaluated = items
        .iter()
        .map(|item| eval_nested(item, env, depth))
        .collect::<Result<Vec<_>, _>>()?;
    // `items` is never empty here
    let func = evaluated.remove(0);
    invoke(&func, evaluated, env, depth)
}

/// Lambdas become a tail call into their body; natives run to completion
fn invoke(func: &Value, args: Vec<Value>, env: &Environment, depth: usize) -> Result<Step, Error> {
    match func {
        Value::Lambda(lambda) => {
            let frame = bind_params(lambda, args, "fn")?;
            trace!("tail call into {}", frame.name());
            Ok(Step::TailCall(lambda.body.clone(), frame))
        }
        Value::Native(native) => native.call(&CallContext { env, depth }, &args).map(Step::Return),
        Value::Macro(_) => Err(Error::EvalError(format!("Cannot apply macro as a function: {func}"))),
        other => Err(Error::TypeError(format!("Cannot apply non-function: {other}"))),
    }
}

/// Create the call frame of a closure: fixed parameters first, then the
/// variadic parameter bound to a list of the remaining arguments
fn bind_params(lambda: &Lambda, args: Vec<Value>, kind: &str) -> Result<Environment, Error> {
    let label = match &lambda.name {
        Some(name) => format!("{kind} {name}"),
        None => format!("{kind} <anonymous>"),
    };

    let arity = lambda.params.arity();
    if !arity.accepts(args.len()) {
        return Err(Error::arity_error_with_expr(arity, args.len(), label));
    }

    let frame = Environment::child(label, &lambda.env);
    let mut args = args.into_iter();
    for (name, value) in lambda.params.fixed.iter().zip(args.by_ref()) {
        frame.define(name.as_str(), value);
    }
    if let Some(rest) = &lambda.params.variadic {
        frame.define(rest.as_str(), Value::List(args.collect()));
    }
    Ok(frame)
}

/// The macro a form invokes, with its unevaluated arguments
fn macro_call(ast: &Value, env: &Environment) -> Option<(Rc<Lambda>, Vec<Value>)> {
    let Value::List(items) = ast else {
        return None;
    };
    let Some(Value::Symbol(name)) = items.front() else {
        return None;
    };
    match env.search(name)?.get(name).ok()? {
        Value::Macro(mac) => Some((mac, items.iter().skip(1).cloned().collect())),
        _ => None,
    }
}

/// Expand until the head of `ast` no longer names a macro
fn macroexpand_all(mut ast: Value, env: &Environment, depth: usize) -> Result<Value, Error> {
    while let Some((mac, args)) = macro_call(&ast, env) {
        let frame = bind_params(&mac, args, "macro")?;
        trace!("expanding {}", frame.name());
        ast = eval_with_depth_tracking(mac.body.clone(), frame, depth + 1)?;
    }
    Ok(ast)
}

/// Body forms as one form: nothing is `nil`, several are wrapped in `do`
fn body_form(forms: &[Value]) -> Value {
    match forms {
        [] => Value::Nil,
        [single] => single.clone(),
        _ => list(std::iter::once(sym("do")).chain(forms.iter().cloned())),
    }
}

fn make_lambda(name: Option<String>, params: &Value, body: &[Value], env: &Environment) -> Result<Lambda, Error> {
    Ok(Lambda {
        name,
        params: Params::from_form(params)?,
        body: body_form(body),
        env: env.clone(),
        meta: Value::Nil,
    })
}

/// Give an anonymous closure the name it is being bound to
fn name_callable(value: Value, name: &str) -> Value {
    match value {
        Value::Lambda(l) if l.name.is_none() => Value::Lambda(Rc::new(Lambda {
            name: Some(name.to_owned()),
            ..(*l).clone()
        })),
        other => other,
    }
}

//
// Special forms
//
// Arity is validated against the registry before any of these run.
//

/// `(def name expr)`: binds in the current frame and returns the value
pub(crate) fn eval_def(args: &[Value], env: &Environment, depth: usize) -> Result<Step, Error> {
    let name = args[0].as_symbol()?;
    let value = name_callable(eval_nested(&args[1], env, depth)?, name);
    debug!("def {name} in {}", env.name());
    env.define(name, value.clone());
    Ok(Step::Return(value))
}

/// `(set! name expr)`: rebinds `name` where it is defined
pub(crate) fn eval_set(args: &[Value], env: &Environment, depth: usize) -> Result<Step, Error> {
    let name = args[0].as_symbol()?;
    if env.search(name).is_none() {
        return Err(Error::UnresolvedSymbol(name.to_owned()));
    }
    let value = eval_nested(&args[1], env, depth)?;
    env.set(name, value.clone())?;
    Ok(Step::Return(value))
}

fn eval_let_bindings(
    args: &[Value],
    env: &Environment,
    depth: usize,
    form: &str,
    sequential: bool,
) -> Result<Step, Error> {
    let bindings = match &args[0] {
        Value::Vector(items) | Value::List(items) => items,
        other => return Err(Error::type_mismatch("binding vector", other)),
    };
    if bindings.len() % 2 != 0 {
        return Err(Error::arity_error_with_expr(
            Arity::Even,
            bindings.len(),
            format!("{form} bindings"),
        ));
    }

    let frame = Environment::child(form, env);
    let mut pairs = bindings.iter();
    while let (Some(name), Some(expr)) = (pairs.next(), pairs.next()) {
        let name = name.as_symbol()?;
        let scope = if sequential { &frame } else { env };
        let value = eval_nested(expr, scope, depth)?;
        frame.define(name, value);
    }
    Ok(Step::TailCall(body_form(&args[1..]), frame))
}

/// `(let [a 1 b 2] body...)`: binding expressions see the enclosing frame
pub(crate) fn eval_let(args: &[Value], env: &Environment, depth: usize) -> Result<Step, Error> {
    eval_let_bindings(args, env, depth, "let", false)
}

/// `(let* [a 1 b a] body...)`: each binding sees the ones before it
pub(crate) fn eval_let_star(args: &[Value], env: &Environment, depth: usize) -> Result<Step, Error> {
    eval_let_bindings(args, env, depth, "let*", true)
}

pub(crate) fn eval_quote(args: &[Value], _env: &Environment, _depth: usize) -> Result<Step, Error> {
    Ok(Step::Return(args[0].clone()))
}

pub(crate) fn eval_syntax_quote(args: &[Value], env: &Environment, _depth: usize) -> Result<Step, Error> {
    Ok(Step::TailCall(quasiquote::syntax_quote(&args[0])?, env.clone()))
}

pub(crate) fn eval_unquote(_args: &[Value], _env: &Environment, _depth: usize) -> Result<Step, Error> {
    Err(Error::EvalError("unquote used outside of syntax-quote".into()))
}

/// `(defmacro name [params] body...)`
pub(crate) fn eval_defmacro(args: &[Value], env: &Environment, _depth: usize) -> Result<Step, Error> {
    let name = args[0].as_symbol()?;
    let mac = make_lambda(Some(name.to_owned()), &args[1], &args[2..], env)?;
    let value = Value::Macro(Rc::new(mac));
    debug!("defmacro {name} in {}", env.name());
    env.define(name, value.clone());
    Ok(Step::Return(value))
}

pub(crate) fn eval_macroexpand(args: &[Value], env: &Environment, depth: usize) -> Result<Step, Error> {
    macroexpand_all(args[0].clone(), env, depth).map(Step::Return)
}

pub(crate) fn eval_do(args: &[Value], env: &Environment, depth: usize) -> Result<Step, Error> {
    match args.split_last() {
        None => Ok(Step::Return(Value::Nil)),
        Some((last, init)) => {
            for form in init {
                eval_nested(form, env, depth)?;
            }
            Ok(Step::TailCall(last.clone(), env.clone()))
        }
    }
}

pub(crate) fn eval_if(args: &[Value], env: &Environment, depth: usize) -> Result<Step, Error> {
    let branch = if eval_nested(&args[0], env, depth)?.is_truthy() {
        args.get(1)
    } else {
        args.get(2)
    };
    Ok(match branch {
        Some(form) => Step::TailCall(form.clone(), env.clone()),
        None => Step::Return(Value::Nil),
    })
}

/// `(fn name? [params] body...)`
pub(crate) fn eval_fn(args: &[Value], env: &Environment, _depth: usize) -> Result<Step, Error> {
    let (name, rest) = match args {
        [Value::Symbol(name), rest @ ..] => (Some(name.clone()), rest),
        _ => (None, args),
    };
    let Some((params, body)) = rest.split_first() else {
        return Err(Error::arity_error_with_expr(Arity::AtLeast(1), 0, "fn parameters"));
    };
    let lambda = make_lambda(name, params, body, env)?;
    Ok(Step::Return(Value::Lambda(Rc::new(lambda))))
}

/// `(try body... (catch e handler...))`: only thrown values are caught
pub(crate) fn eval_try(args: &[Value], env: &Environment, depth: usize) -> Result<Step, Error> {
    let Some((Value::List(clause), body)) = args.split_last().filter(|(last, _)| last.is_form("catch")) else {
        return Ok(Step::TailCall(body_form(args), env.clone()));
    };

    let Some(binding) = clause.get(1) else {
        return Err(Error::arity_error_with_expr(Arity::AtLeast(1), 0, "catch"));
    };
    let name = binding.as_symbol()?;

    match eval_nested(&body_form(body), env, depth) {
        Err(Error::Throw(thrown)) => {
            let frame = Environment::child("catch", env);
            frame.define(name, thrown);
            let handler: Vec<Value> = clause.iter().skip(2).cloned().collect();
            Ok(Step::TailCall(body_form(&handler), frame))
        }
        other => other.map(Step::Return),
    }
}

/// Core definitions written in the language itself, evaluated once by
/// [`bootstrap`]. `load-file` needs a host `slurp` primitive.
const PRELUDE: &str = r#"
(def not (fn [x] (if x false true)))

(defmacro cond [& clauses]
  (if (empty? clauses)
    nil
    (if (= 1 (count clauses))
      (throw "cond requires an even number of forms")
      (list 'if (first clauses)
            (nth clauses 1)
            (cons 'cond (rest (rest clauses)))))))

(defmacro and [& xs]
  (if (empty? xs)
    true
    (if (= 1 (count xs))
      (first xs)
      (let* [v (gensym "and")]
        `(let* [~v ~(first xs)]
           (if ~v (and ~@(rest xs)) ~v))))))

(defmacro or [& xs]
  (if (empty? xs)
    nil
    (if (= 1 (count xs))
      (first xs)
      (let* [v (gensym "or")]
        `(let* [~v ~(first xs)]
           (if ~v ~v (or ~@(rest xs))))))))

(defmacro when [test & body]
  `(if ~test (do ~@body)))

(defmacro defn [name params & body]
  `(def ~name (fn ~name ~params ~@body)))

(def load-file
  (fn [path]
    (eval (read-string (str "(do " (slurp path) "\nnil)")))))
"#;

/// Build a root environment: every builtin function plus the prelude
pub fn bootstrap() -> Result<Environment, Error> {
    let env = Environment::new();

    for builtin_op in get_builtin_ops() {
        if let OpKind::Function(func) = builtin_op.op_kind {
            env.define_native(builtin_op.id, builtin_op.arity, func);
        }
    }

    for form in read_all(PRELUDE)? {
        eval(&form, &env)?;
    }

    debug!("root environment ready with {} bindings", env.get_all_bindings().len());
    Ok(env)
}

/// Create a global environment with built-in functions and the prelude
pub fn create_global_env() -> Environment {
    bootstrap().expect("prelude evaluates in a fresh root environment")
}
