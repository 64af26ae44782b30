//! lispxp - a Lisp-family expression evaluator
//!
//! This crate provides a small, self-contained Lisp in the Clojure surface
//! style: a reader that turns source text into homogeneous data values, an
//! environment model for lexical scoping, and an evaluator that interprets
//! that data as code, including macro expansion and proper tail calls.
//!
//! ```lisp
//! (def x 5)
//! (let [y 10] (+ x y))                          ; => 15
//! (defmacro unless [c t] (list 'if c nil t))
//! (unless false 42)                             ; => 42
//! `(1 ~(+ 1 1) ~@(list 3 4))                    ; => (1 2 3 4)
//! (try (throw "boom") (catch e (str "caught:" e)))
//! ```
//!
//! ## Code is data
//!
//! The reader produces ordinary [`ast::Value`] trees. The evaluator walks the
//! same trees, so macros are plain functions from forms to forms, and
//! `eval`/`read-string` round-trip between text, data and results.
//!
//! ## Tail calls
//!
//! Evaluation runs as a loop over an `(ast, env)` pair. Forms in tail position
//! (`if` branches, the last form of `do`, `let` bodies, lambda bodies, `catch`
//! handlers, macro results) replace the pair instead of recursing, so a
//! self-recursive loop in tail position runs in constant host stack.
//!
//! ## Modules
//!
//! - `tokenizer`: source text to positioned tokens
//! - `reader`: tokens to values, including reader sugar
//! - `evaluator`: the EVAL loop, special forms, environments, quasiquote
//! - `builtinops`: the native function library and special-form registry
//! - `ast` / `number`: the value model and its printer

#![allow(clippy::mutable_key_type)] // Atom values order by identity, never by contents

use std::fmt;

use crate::builtinops::Arity;

/// Maximum reader nesting depth, guarding the recursive-descent reader.
pub const MAX_PARSE_DEPTH: usize = 256;

/// Maximum nesting of non-tail evaluations.
/// Tail calls are trampolined and do not count against this limit.
///
/// Each level costs a few KiB of host stack (more in debug builds), so a
/// host that runs programs this deep evaluates them on a thread with a
/// large stack; see [`EVAL_STACK_SIZE`].
pub const MAX_EVAL_DEPTH: usize = 2000;

/// Thread stack size that holds [`MAX_EVAL_DEPTH`] nested evaluations
pub const EVAL_STACK_SIZE: usize = 64 * 1024 * 1024;

/// Categorizes the different kinds of reader failures.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ParseErrorKind {
    /// Invalid or unexpected syntax (bad tokens, malformed forms)
    InvalidSyntax,
    /// Input ended before the form was complete (unterminated string, unclosed delimiter)
    Incomplete,
    /// A closing delimiter with no matching opener
    TrailingContent,
    /// A numeric literal that does not parse as an integer or a float
    MalformedNumber,
    /// Form nesting exceeded [`MAX_PARSE_DEPTH`]
    TooDeeplyNested,
}

/// A structured error providing detailed information about a reader failure.
#[derive(Debug, PartialEq, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// 1-based line of the offending token
    pub line: usize,
    /// 1-based column of the offending token
    pub column: usize,
    /// Context snippet from the input showing where the error occurred (max 60 chars)
    pub context: Option<String>,
    /// The problematic token or character encountered, if identifiable
    pub found: Option<String>,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, message: impl Into<String>, line: usize, column: usize) -> Self {
        ParseError {
            kind,
            message: message.into(),
            line,
            column,
            context: None,
            found: None,
        }
    }

    /// Attach the offending token text
    #[must_use]
    pub fn with_found(mut self, found: impl Into<String>) -> Self {
        self.found = Some(found.into());
        self
    }

    /// Attach a context snippet extracted from `input` around byte `offset`
    #[must_use]
    pub fn with_context(mut self, input: &str, offset: usize) -> Self {
        const MAX_CONTEXT: usize = 60;

        let offset = offset.min(input.len());
        let mut start = offset.saturating_sub(20);
        while !input.is_char_boundary(start) {
            start -= 1;
        }

        let snippet: String = input[start..].chars().take(MAX_CONTEXT).collect();

        let mut display = String::new();
        if start > 0 {
            display.push_str("[...]");
        }
        display.push_str(&snippet);
        if start + snippet.len() < input.len() {
            display.push_str("[...]");
        }

        self.context = Some(display.replace('\n', "\\n").replace('\r', ""));
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (line {}, column {})",
            self.message, self.line, self.column
        )?;
        if let Some(found) = &self.found {
            write!(f, "\nFound: {found}")?;
        }
        if let Some(context) = &self.context {
            write!(f, "\nContext: {context}")?;
        }
        Ok(())
    }
}

/// Error types for the reader and the evaluator
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("SyntaxError: {0}")]
    SyntaxError(ParseError),
    #[error("{}", arity_message(.expected, .got, .expression))]
    ArityError {
        expected: Arity,
        got: usize,
        expression: Option<String>,
    },
    #[error("Unresolved symbol: {0}")]
    UnresolvedSymbol(String),
    #[error("Type error: {0}")]
    TypeError(String),
    #[error("ArithmeticError: {0}")]
    ArithmeticError(String),
    #[error("EvaluationError: {0}")]
    EvalError(String),
    /// A value raised by `throw`; the only error `try`/`catch` intercepts
    #[error("Uncaught exception: {}", ast::pr_str(.0, true))]
    Throw(Value),
}

fn arity_message(expected: &Arity, got: &usize, expression: &Option<String>) -> String {
    match expression {
        Some(expr) => format!("ArityError: {expr}: expected {expected}, got {got}"),
        None => format!("ArityError: expected {expected}, got {got}"),
    }
}

impl Error {
    /// Create an ArityError without expression context
    pub fn arity_error(expected: Arity, got: usize) -> Self {
        Error::ArityError {
            expected,
            got,
            expression: None,
        }
    }

    /// Create an ArityError naming the function or form that was called
    pub fn arity_error_with_expr(expected: Arity, got: usize, expression: impl Into<String>) -> Self {
        Error::ArityError {
            expected,
            got,
            expression: Some(expression.into()),
        }
    }

    /// Create a TypeError of the form "expected X, got Y"
    pub fn type_mismatch(expected: &str, found: &Value) -> Self {
        Error::TypeError(format!("expected {expected}, got {}", found.type_name()))
    }
}

impl From<ParseError> for Error {
    fn from(error: ParseError) -> Self {
        Error::SyntaxError(error)
    }
}

pub mod ast;
pub mod builtinops;
pub mod evaluator;
pub mod number;
pub mod reader;
pub mod tokenizer;

pub use ast::{Value, pr_str};
pub use evaluator::{Environment, bootstrap, create_global_env, eval, eval_str};
pub use reader::{parse, read_str};
