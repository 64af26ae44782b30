//! Source text to positioned tokens.
//!
//! The tokenizer is a small set of nom parsers run in a loop: skip trivia
//! (whitespace, commas, `;` comments), then lex exactly one token. Every token
//! records its 1-based line and column and its byte offset, and the stream
//! always ends with a [`TokenKind::Eof`] token.
//!
//! String literals are unescaped here, so a `String` token's text is the
//! literal's value. Numbers are only recognized by shape (optional sign then a
//! digit); whether the text is a well-formed number is decided by the reader.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, one_of, satisfy},
    combinator::{consumed, map, opt, recognize, value},
    error::ErrorKind,
    multi::many0,
    sequence::{pair, preceded},
};

use crate::{Error, ParseError, ParseErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    /// `#(`, anonymous function literal
    HashParen,
    /// `#{`, set literal
    HashBrace,
    Quote,
    SyntaxQuote,
    Unquote,
    SpliceUnquote,
    Deref,
    Meta,
    String,
    Number,
    Keyword,
    Symbol,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Source text; unescaped contents for strings, name without `:` for keywords
    pub text: String,
    pub line: usize,
    pub column: usize,
    /// Byte offset into the source
    pub offset: usize,
}

/// Characters that terminate a symbol, keyword or number
const DELIMITERS: &str = "()[]{}\"';,`~^@";

fn is_symbol_char(c: char) -> bool {
    !c.is_whitespace() && !DELIMITERS.contains(c)
}

fn comment(input: &str) -> IResult<&str, &str> {
    recognize(pair(char(';'), take_while(|c: char| c != '\n'))).parse(input)
}

fn trivia(input: &str) -> IResult<&str, &str> {
    recognize(many0(alt((
        take_while1(|c: char| c.is_whitespace() || c == ','),
        comment,
    ))))
    .parse(input)
}

fn punctuation(input: &str) -> IResult<&str, TokenKind> {
    alt((
        value(TokenKind::SpliceUnquote, tag("~@")),
        value(TokenKind::HashParen, tag("#(")),
        value(TokenKind::HashBrace, tag("#{")),
        value(TokenKind::LParen, char('(')),
        value(TokenKind::RParen, char(')')),
        value(TokenKind::LBracket, char('[')),
        value(TokenKind::RBracket, char(']')),
        value(TokenKind::LBrace, char('{')),
        value(TokenKind::RBrace, char('}')),
        value(TokenKind::Quote, char('\'')),
        value(TokenKind::SyntaxQuote, char('`')),
        value(TokenKind::Unquote, char('~')),
        value(TokenKind::Deref, char('@')),
        value(TokenKind::Meta, char('^')),
    ))
    .parse(input)
}

/// Parse a string literal, returning its unescaped contents.
///
/// Failures are fatal (`nom::Err::Failure`) so no other token kind is tried:
/// `ErrorKind::Escaped` at the backslash for an unknown escape,
/// `ErrorKind::Eof` at the opening quote for a missing closing quote.
fn string_literal(input: &str) -> IResult<&str, String> {
    let (mut remaining, _) = char('"').parse(input)?;
    let mut contents = String::new();

    loop {
        let mut chars = remaining.chars();
        match chars.next() {
            Some('"') => return Ok((chars.as_str(), contents)),
            Some('\\') => {
                match chars.next() {
                    Some('n') => contents.push('\n'),
                    Some('t') => contents.push('\t'),
                    Some('r') => contents.push('\r'),
                    Some('\\') => contents.push('\\'),
                    Some('"') => contents.push('"'),
                    Some(_) => {
                        return Err(nom::Err::Failure(nom::error::Error::new(
                            remaining,
                            ErrorKind::Escaped,
                        )));
                    }
                    None => break,
                }
                remaining = chars.as_str();
            }
            Some(c) => {
                contents.push(c);
                remaining = chars.as_str();
            }
            None => break,
        }
    }

    Err(nom::Err::Failure(nom::error::Error::new(input, ErrorKind::Eof)))
}

fn number_literal(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        opt(one_of("+-")),
        pair(satisfy(|c| c.is_ascii_digit()), take_while(is_symbol_char)),
    ))
    .parse(input)
}

fn keyword_literal(input: &str) -> IResult<&str, &str> {
    preceded(char(':'), take_while1(is_symbol_char)).parse(input)
}

fn symbol_literal(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c| is_symbol_char(c) && c != '#' && c != ':'),
        take_while(is_symbol_char),
    ))
    .parse(input)
}

fn lex_token(input: &str) -> IResult<&str, (TokenKind, String)> {
    alt((
        map(consumed(punctuation), |(text, kind): (&str, TokenKind)| (kind, text.to_owned())),
        map(string_literal, |s| (TokenKind::String, s)),
        map(number_literal, |s| (TokenKind::Number, s.to_owned())),
        map(keyword_literal, |s| (TokenKind::Keyword, s.to_owned())),
        map(symbol_literal, |s| (TokenKind::Symbol, s.to_owned())),
    ))
    .parse(input)
}

/// Tracks the line/column of a byte offset as the tokenizer moves forward
#[derive(Clone, Copy)]
struct Cursor {
    offset: usize,
    line: usize,
    column: usize,
}

impl Cursor {
    fn advance(&mut self, consumed: &str) {
        for c in consumed.chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.offset += consumed.len();
    }
}

fn lex_error(source: &str, cursor: &Cursor, error: &nom::error::Error<&str>) -> Error {
    let mut at = *cursor;
    at.advance(&source[cursor.offset..source.len() - error.input.len()]);

    let found: String = error.input.chars().next().map(String::from).unwrap_or_default();
    let (kind, message) = match error.code {
        ErrorKind::Eof => (ParseErrorKind::Incomplete, "unterminated string literal".to_owned()),
        ErrorKind::Escaped => {
            let escape: String = error.input.chars().take(2).collect();
            (ParseErrorKind::InvalidSyntax, format!("invalid escape sequence {escape}"))
        }
        _ => (ParseErrorKind::InvalidSyntax, format!("unexpected character '{found}'")),
    };

    ParseError::new(kind, message, at.line, at.column)
        .with_found(found)
        .with_context(source, at.offset)
        .into()
}

/// Split `source` into tokens, ending with an `Eof` token
pub fn tokenize(source: &str) -> Result<Vec<Token>, Error> {
    let mut tokens = Vec::new();
    let mut cursor = Cursor {
        offset: 0,
        line: 1,
        column: 1,
    };

    loop {
        let rest = &source[cursor.offset..];
        if let Ok((_, skipped)) = trivia(rest) {
            cursor.advance(skipped);
        }

        let rest = &source[cursor.offset..];
        if rest.is_empty() {
            tokens.push(Token {
                kind: TokenKind::Eof,
                text: String::new(),
                line: cursor.line,
                column: cursor.column,
                offset: cursor.offset,
            });
            return Ok(tokens);
        }

        match lex_token(rest) {
            Ok((remaining, (kind, text))) => {
                tokens.push(Token {
                    kind,
                    text,
                    line: cursor.line,
                    column: cursor.column,
                    offset: cursor.offset,
                });
                cursor.advance(&rest[..rest.len() - remaining.len()]);
            }
            Err(nom::Err::Error(e) | nom::Err::Failure(e)) => {
                return Err(lex_error(source, &cursor, &e));
            }
            Err(nom::Err::Incomplete(_)) => {
                // Complete parsers never report Incomplete
                return Err(ParseError::new(
                    ParseErrorKind::Incomplete,
                    "unexpected end of input",
                    cursor.line,
                    cursor.column,
                )
                .into());
            }
        }
    }
}
