//! Tokens to values.
//!
//! A recursive-descent reader over the token stream from
//! [`crate::tokenizer`]. Reader sugar is expanded into ordinary forms so the
//! evaluator only ever sees lists:
//!
//! | text      | form                      |
//! |-----------|---------------------------|
//! | `'x`      | `(quote x)`               |
//! | `` `x ``  | `(syntax-quote x)`        |
//! | `~x`      | `(unquote x)`             |
//! | `~@x`     | `(splice-unquote x)`      |
//! | `@x`      | `(deref x)`               |
//! | `^m x`    | `(with-meta x m)`         |
//! | `#{a b}`  | set of `a` and `b`        |
//! | `#(+ % 1)`| `(fn [__p1] (+ __p1 1))`  |

use crate::ast::{Value, kw, list, sym};
use crate::number::{IntType, Number};
use crate::tokenizer::{Token, TokenKind, tokenize};
use crate::{Error, MAX_PARSE_DEPTH, ParseError, ParseErrorKind};

/// Read every top-level form.
///
/// Returns the number of forms read and a single value: `nil` for empty
/// input, the form itself for one form, and a list of the forms otherwise.
pub fn parse(source: &str) -> Result<(usize, Value), Error> {
    let mut forms = read_all(source)?;
    let count = forms.len();
    let value = match count {
        0 => Value::Nil,
        1 => forms.swap_remove(0),
        _ => Value::List(forms.into_iter().collect()),
    };
    Ok((count, value))
}

/// Read every top-level form, in order
pub fn read_all(source: &str) -> Result<Vec<Value>, Error> {
    let mut reader = Reader::new(source)?;
    let mut forms = Vec::new();
    while reader.peek().kind != TokenKind::Eof {
        forms.push(reader.read_form(0)?);
    }
    Ok(forms)
}

/// Read the first form of `source`; `nil` when there is none
pub fn read_str(source: &str) -> Result<Value, Error> {
    let mut reader = Reader::new(source)?;
    if reader.peek().kind == TokenKind::Eof {
        return Ok(Value::Nil);
    }
    reader.read_form(0)
}

fn closing_text(kind: TokenKind) -> &'static str {
    match kind {
        TokenKind::RParen => ")",
        TokenKind::RBracket => "]",
        _ => "}",
    }
}

struct Reader<'a> {
    source: &'a str,
    /// Always ends with an `Eof` token, which is never consumed
    tokens: Vec<Token>,
    pos: usize,
    in_anonymous_fn: bool,
}

impl<'a> Reader<'a> {
    fn new(source: &'a str) -> Result<Self, Error> {
        Ok(Reader {
            source,
            tokens: tokenize(source)?,
            pos: 0,
            in_anonymous_fn: false,
        })
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn next(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn error(&self, kind: ParseErrorKind, message: impl Into<String>, token: &Token) -> Error {
        let mut error = ParseError::new(kind, message, token.line, token.column)
            .with_context(self.source, token.offset);
        if token.kind != TokenKind::Eof {
            error = error.with_found(token.text.clone());
        }
        error.into()
    }

    fn read_form(&mut self, depth: usize) -> Result<Value, Error> {
        let token = self.next();
        if depth >= MAX_PARSE_DEPTH {
            return Err(self.error(
                ParseErrorKind::TooDeeplyNested,
                format!("expression too deeply nested (max depth: {MAX_PARSE_DEPTH})"),
                &token,
            ));
        }

        match token.kind {
            TokenKind::LParen => {
                let items = self.read_seq(&token, TokenKind::RParen, depth)?;
                Ok(Value::List(items.into_iter().collect()))
            }
            TokenKind::LBracket => {
                let items = self.read_seq(&token, TokenKind::RBracket, depth)?;
                Ok(Value::Vector(items.into_iter().collect()))
            }
            TokenKind::LBrace => {
                let items = self.read_seq(&token, TokenKind::RBrace, depth)?;
                if items.len() % 2 != 0 {
                    return Err(self.error(
                        ParseErrorKind::InvalidSyntax,
                        "map literal must contain an even number of forms",
                        &token,
                    ));
                }
                let mut items = items.into_iter();
                let mut map = im::OrdMap::new();
                while let (Some(k), Some(v)) = (items.next(), items.next()) {
                    map.insert(k, v);
                }
                Ok(Value::Map(map))
            }
            TokenKind::HashBrace => {
                let items = self.read_seq(&token, TokenKind::RBrace, depth)?;
                Ok(Value::Set(items.into_iter().collect()))
            }
            TokenKind::HashParen => self.read_anonymous_fn(&token, depth),
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => Err(self.error(
                ParseErrorKind::TrailingContent,
                format!("unexpected '{}'", token.text),
                &token,
            )),
            TokenKind::Quote => self.read_wrapped("quote", depth),
            TokenKind::SyntaxQuote => self.read_wrapped("syntax-quote", depth),
            TokenKind::Unquote => self.read_wrapped("unquote", depth),
            TokenKind::SpliceUnquote => self.read_wrapped("splice-unquote", depth),
            TokenKind::Deref => self.read_wrapped("deref", depth),
            TokenKind::Meta => {
                let meta = self.read_form(depth + 1)?;
                let target = self.read_form(depth + 1)?;
                Ok(list([sym("with-meta"), target, meta]))
            }
            TokenKind::String => Ok(Value::String(token.text)),
            TokenKind::Number => self.parse_number(&token),
            TokenKind::Keyword => Ok(kw(&token.text)),
            TokenKind::Symbol => Ok(match token.text.as_str() {
                "nil" => Value::Nil,
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => Value::Symbol(token.text),
            }),
            TokenKind::Eof => Err(self.error(ParseErrorKind::Incomplete, "unexpected end of input", &token)),
        }
    }

    /// `'x` and friends: `(name x)`
    fn read_wrapped(&mut self, name: &str, depth: usize) -> Result<Value, Error> {
        let form = self.read_form(depth + 1)?;
        Ok(list([sym(name), form]))
    }

    /// Read forms up to the `close` delimiter matching `open`
    fn read_seq(&mut self, open: &Token, close: TokenKind, depth: usize) -> Result<Vec<Value>, Error> {
        let mut items = Vec::new();
        loop {
            let (kind, is_dot) = {
                let token = self.peek();
                (token.kind, token.kind == TokenKind::Symbol && token.text == ".")
            };

            match kind {
                k if k == close => {
                    self.next();
                    return Ok(items);
                }
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    let found = self.next();
                    return Err(self.error(
                        ParseErrorKind::InvalidSyntax,
                        format!(
                            "expected '{}' to close '{}' opened at line {}, column {}",
                            closing_text(close),
                            open.text,
                            open.line,
                            open.column
                        ),
                        &found,
                    ));
                }
                TokenKind::Eof => {
                    return Err(self.error(
                        ParseErrorKind::Incomplete,
                        format!("unclosed '{}'", open.text),
                        open,
                    ));
                }
                _ if is_dot && close == TokenKind::RParen => {
                    let dot = self.next();
                    items.extend(self.read_dotted_tail(&dot, items.is_empty(), depth)?);
                }
                _ => items.push(self.read_form(depth + 1)?),
            }
        }
    }

    /// `(a b . (c d))` reads as `(a b c d)`; any other dotted shape is rejected
    fn read_dotted_tail(&mut self, dot: &Token, nothing_before: bool, depth: usize) -> Result<Vec<Value>, Error> {
        let invalid = |reader: &Self| {
            reader.error(
                ParseErrorKind::InvalidSyntax,
                "invalid dotted pair: expected one list after '.' before the closing ')'",
                dot,
            )
        };
        if nothing_before {
            return Err(invalid(self));
        }

        let tail = match self.peek().kind {
            TokenKind::RParen | TokenKind::Eof => return Err(invalid(self)),
            _ => self.read_form(depth + 1)?,
        };
        if self.peek().kind != TokenKind::RParen {
            return Err(invalid(self));
        }
        match tail {
            Value::List(items) => Ok(items.into_iter().collect()),
            _ => Err(invalid(self)),
        }
    }

    fn parse_number(&self, token: &Token) -> Result<Value, Error> {
        let text = token.text.as_str();
        let number = if text.contains('.') {
            text.parse::<f64>().ok().filter(|f| f.is_finite()).map(Number::Float)
        } else {
            text.parse::<IntType>().ok().map(Number::Int)
        };
        number
            .map(Value::Number)
            .ok_or_else(|| self.error(ParseErrorKind::MalformedNumber, format!("malformed number '{text}'"), token))
    }

    /// `#(...)`: placeholders `%`/`%1`..`%n` become positional parameters,
    /// `%&` the variadic rest parameter
    fn read_anonymous_fn(&mut self, open: &Token, depth: usize) -> Result<Value, Error> {
        if self.in_anonymous_fn {
            return Err(self.error(
                ParseErrorKind::InvalidSyntax,
                "nested #() literals are not allowed",
                open,
            ));
        }
        self.in_anonymous_fn = true;
        let body = self.read_seq(open, TokenKind::RParen, depth);
        self.in_anonymous_fn = false;

        let body = Value::List(body?.into_iter().collect());
        let mut placeholders = Placeholders::default();
        placeholders.scan(&body);

        let mut params: Vec<Value> = (1..=placeholders.max_index)
            .map(|i| sym(positional_param(i)))
            .collect();
        if placeholders.variadic {
            params.push(sym("&"));
            params.push(sym(REST_PARAM));
        }

        Ok(list([
            sym("fn"),
            Value::Vector(params.into_iter().collect()),
            rename_placeholders(&body),
        ]))
    }
}

const REST_PARAM: &str = "__rest";

fn positional_param(index: usize) -> String {
    format!("__p{index}")
}

/// Index of a positional placeholder: `%` is `%1`
fn placeholder_index(name: &str) -> Option<usize> {
    match name.strip_prefix('%')? {
        "" => Some(1),
        digits => digits.parse::<usize>().ok().filter(|&i| i > 0),
    }
}

#[derive(Default)]
struct Placeholders {
    max_index: usize,
    variadic: bool,
}

impl Placeholders {
    fn scan(&mut self, form: &Value) {
        match form {
            Value::Symbol(name) if name == "%&" => self.variadic = true,
            Value::Symbol(name) => {
                if let Some(i) = placeholder_index(name) {
                    self.max_index = self.max_index.max(i);
                }
            }
            Value::List(items) | Value::Vector(items) => items.iter().for_each(|item| self.scan(item)),
            Value::Set(items) => items.iter().for_each(|item| self.scan(item)),
            Value::Map(map) => map.iter().for_each(|(k, v)| {
                self.scan(k);
                self.scan(v);
            }),
            _ => {}
        }
    }
}

fn rename_placeholders(form: &Value) -> Value {
    match form {
        Value::Symbol(name) if name == "%&" => sym(REST_PARAM),
        Value::Symbol(name) => match placeholder_index(name) {
            Some(i) => sym(positional_param(i)),
            None => form.clone(),
        },
        Value::List(items) => Value::List(items.iter().map(rename_placeholders).collect()),
        Value::Vector(items) => Value::Vector(items.iter().map(rename_placeholders).collect()),
        Value::Set(items) => Value::Set(items.iter().map(rename_placeholders).collect()),
        Value::Map(map) => Value::Map(
            map.iter()
                .map(|(k, v)| (rename_placeholders(k), rename_placeholders(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}
