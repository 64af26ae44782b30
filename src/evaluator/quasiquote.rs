//! Syntax-quote expansion.
//!
//! [`syntax_quote`] rewrites a template into code that rebuilds it when
//! evaluated. `~x` (`unquote`) inserts the value of `x`, `~@x`
//! (`splice-unquote`) inserts the elements of `x`, and everything else is
//! quoted. Each list is rewritten as a right fold of `cons`/`concat` calls.

use im::Vector;

use crate::Error;
use crate::ast::{Value, list, sym};
use crate::builtinops::Arity;

const UNQUOTE: &str = "unquote";
const SPLICE_UNQUOTE: &str = "splice-unquote";

/// Expand a syntax-quote template into construction code
pub(crate) fn syntax_quote(form: &Value) -> Result<Value, Error> {
    match form {
        Value::List(items) if form.is_form(UNQUOTE) => Ok(unquote_operand(items, UNQUOTE)?.clone()),
        Value::List(_) if form.is_form(SPLICE_UNQUOTE) => Err(Error::EvalError(
            "splice-unquote used outside of a list".into(),
        )),
        Value::List(items) => fold_elements(items),
        Value::Vector(items) => Ok(list([sym("vec"), fold_elements(items)?])),
        other => Ok(quote(other.clone())),
    }
}

fn quote(form: Value) -> Value {
    list([sym("quote"), form])
}

fn unquote_operand<'a>(items: &'a Vector<Value>, which: &str) -> Result<&'a Value, Error> {
    match items.get(1) {
        Some(operand) if items.len() == 2 => Ok(operand),
        _ => Err(Error::arity_error_with_expr(Arity::Exact(1), items.len() - 1, which)),
    }
}

/// Build `(cons e1 (cons e2 ... (quote ())))`, with `concat` in place of
/// `cons` for spliced elements
fn fold_elements(items: &Vector<Value>) -> Result<Value, Error> {
    let mut acc = quote(Value::List(Vector::new()));
    for element in items.iter().rev() {
        acc = match element {
            Value::List(inner) if element.is_form(SPLICE_UNQUOTE) => {
                list([sym("concat"), unquote_operand(inner, SPLICE_UNQUOTE)?.clone(), acc])
            }
            _ => list([sym("cons"), syntax_quote(element)?, acc]),
        };
    }
    Ok(acc)
}
