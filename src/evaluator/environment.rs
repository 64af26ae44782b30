//! Lexical environments.
//!
//! An [`Environment`] is a cheap, cloneable handle to a frame: a name to value
//! map plus an optional parent. Frames are shared by reference counting, so a
//! closure keeps the frame it captured alive for as long as it exists.
//! Lookups walk the parent chain; [`Environment::define`] always writes to the
//! frame it is called on.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::Error;
use crate::ast::{Native, Value};
use crate::builtinops::Arity;
use crate::evaluator::CallContext;

struct Frame {
    /// Diagnostic label ("root", "fn square", "let", "catch", ...)
    name: String,
    bindings: RefCell<HashMap<String, Value>>,
    parent: Option<Environment>,
}

/// Handle to an environment frame
#[derive(Clone)]
pub struct Environment(Rc<Frame>);

impl Environment {
    /// Create a root frame with no parent
    pub fn new() -> Self {
        Environment(Rc::new(Frame {
            name: "root".to_owned(),
            bindings: RefCell::new(HashMap::new()),
            parent: None,
        }))
    }

    /// Create a child frame of `parent`
    pub fn child(name: impl Into<String>, parent: &Environment) -> Self {
        Environment(Rc::new(Frame {
            name: name.into(),
            bindings: RefCell::new(HashMap::new()),
            parent: Some(parent.clone()),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn parent(&self) -> Option<&Environment> {
        self.0.parent.as_ref()
    }

    /// Bind `name` in this frame, shadowing any binding in an ancestor
    pub fn define(&self, name: impl Into<String>, value: Value) {
        self.0.bindings.borrow_mut().insert(name.into(), value);
    }

    /// Innermost frame (this one or an ancestor) that binds `name`
    pub fn search(&self, name: &str) -> Option<Environment> {
        let mut frame = self;
        loop {
            if frame.0.bindings.borrow().contains_key(name) {
                return Some(frame.clone());
            }
            frame = frame.parent()?;
        }
    }

    /// Resolve `name` through the chain of frames
    pub fn get(&self, name: &str) -> Result<Value, Error> {
        let mut frame = self;
        loop {
            if let Some(value) = frame.0.bindings.borrow().get(name) {
                return Ok(value.clone());
            }
            match frame.parent() {
                Some(parent) => frame = parent,
                None => return Err(Error::UnresolvedSymbol(name.to_owned())),
            }
        }
    }

    /// Rebind an existing name in the innermost frame that defines it
    pub fn set(&self, name: &str, value: Value) -> Result<(), Error> {
        match self.search(name) {
            Some(frame) => {
                frame.define(name, value);
                Ok(())
            }
            None => Err(Error::UnresolvedSymbol(name.to_owned())),
        }
    }

    /// The outermost frame of this chain
    pub fn root(&self) -> Environment {
        let mut frame = self;
        while let Some(parent) = frame.parent() {
            frame = parent;
        }
        frame.clone()
    }

    pub fn ptr_eq(&self, other: &Environment) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Register a host primitive in this frame.
    ///
    /// Arity is validated before `func` runs, so the closure may index its
    /// arguments freely within the declared bounds.
    ///
    /// # Example
    /// ```
    /// use lispxp::{Value, create_global_env, eval_str};
    /// use lispxp::builtinops::Arity;
    ///
    /// let env = create_global_env();
    /// env.define_native("answer", Arity::Exact(0), |_ctx, _args| Ok(Value::from(42)));
    /// assert_eq!(eval_str("(answer)", &env).unwrap(), Value::from(42));
    /// ```
    pub fn define_native<F>(&self, name: &str, arity: Arity, func: F)
    where
        F: Fn(&CallContext<'_>, &[Value]) -> Result<Value, Error> + 'static,
    {
        self.define(name, Value::Native(Rc::new(Native::new(name, arity, func))));
    }

    /// Register a plain slice-based function that needs no evaluator access.
    ///
    /// This is the low-level API for hosts that only transform values; the
    /// function accepts any number of arguments and does its own checking.
    ///
    /// # Example
    /// ```
    /// use lispxp::{Error, Value, create_global_env, eval_str};
    ///
    /// fn arg_count(args: &[Value]) -> Result<Value, Error> {
    ///     Ok(Value::from(args.len() as i64))
    /// }
    ///
    /// let env = create_global_env();
    /// env.register_builtin_function("arg-count", arg_count);
    /// assert_eq!(eval_str("(arg-count 1 2 3)", &env).unwrap(), Value::from(3));
    /// ```
    pub fn register_builtin_function(&self, name: &str, func: fn(&[Value]) -> Result<Value, Error>) {
        self.define_native(name, Arity::Any, move |_ctx, args| func(args));
    }

    /// Get all bindings in this environment and its parents
    /// Returns a Vec of (name, value) pairs sorted by name
    pub fn get_all_bindings(&self) -> Vec<(String, Value)> {
        let mut bindings = HashMap::new();

        // Inner frames override outer ones, so walk outermost first
        let mut chain = vec![self];
        while let Some(parent) = chain.last().and_then(|f| f.parent()) {
            chain.push(parent);
        }
        for frame in chain.into_iter().rev() {
            for (name, value) in frame.0.bindings.borrow().iter() {
                bindings.insert(name.clone(), value.clone());
            }
        }

        let mut result: Vec<_> = bindings.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Environment {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Environment {
    // Bindings are omitted: closures stored in a frame usually capture that frame
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Environment({}, {} bindings)", self.0.name, self.0.bindings.borrow().len())
    }
}
