//! Reader for the literal notation that dump output is written in.
//!
//! The same reader evaluates test inputs (`parse_values`) and reads dump
//! output back (`parse_program`), so anything the backends print must be
//! accepted here.
//!
//! Quoted strings and comments are scanned by hand in lexer callbacks
//! rather than matched as one regex token, so their length does not
//! grow the lexer's stack. Nesting is capped at [`MAX_NESTING`] levels.

use crate::value::Value;
use indexmap::IndexMap;
use logos::Logos;
use std::ops::Range;
use thiserror::Error;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
pub enum Token {
    #[token("#", skip_comment)]
    Comment,

    #[token("undef")]
    Undef,
    #[token("bless")]
    Bless,
    #[token("sub")]
    Sub,

    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(",")]
    Comma,
    #[token("=>")]
    FatArrow,
    #[token("=")]
    Assign,
    #[token(";")]
    Semi,
    #[token("\\")]
    Backslash,

    #[regex(r"-?[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?", |lex| lex.slice().to_string())]
    Number(String),

    // Raw body between the quotes; escapes are resolved by the parser.
    #[token("'", |lex| quoted_body(lex, '\''))]
    SingleQuoted(String),
    #[token("\"", |lex| quoted_body(lex, '"'))]
    DoubleQuoted(String),

    #[regex(r"\$[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice()[1..].to_string())]
    Variable(String),
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*(::[A-Za-z_][A-Za-z0-9_]*)*", |lex| lex.slice().to_string())]
    Bareword(String),
}

/// Deepest expression nesting the reader accepts.
pub const MAX_NESTING: usize = 512;

fn skip_comment(lex: &mut logos::Lexer<'_, Token>) -> logos::Skip {
    let rest = lex.remainder();
    lex.bump(rest.find('\n').unwrap_or(rest.len()));
    logos::Skip
}

// Consumes up to and including the closing quote; `None` if unterminated.
fn quoted_body(lex: &mut logos::Lexer<'_, Token>, quote: char) -> Option<String> {
    let rest = lex.remainder();
    let mut escaped = false;
    for (i, c) in rest.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            let body = rest[..i].to_string();
            lex.bump(i + c.len_utf8());
            return Some(body);
        }
    }
    None
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadError {
    #[error("unexpected character {found:?} at byte {offset}")]
    BadChar { offset: usize, found: String },
    #[error("unexpected {found:?} at byte {offset}, expected {expected}")]
    Unexpected {
        offset: usize,
        found: String,
        expected: &'static str,
    },
    #[error("unexpected end of input, expected {expected}")]
    Eof { expected: &'static str },
    #[error("invalid escape {escape:?} at byte {offset}")]
    BadEscape { offset: usize, escape: String },
    #[error("can't bless a non-reference value (byte {offset})")]
    BlessNonRef { offset: usize },
    #[error("no expression to read")]
    Empty,
    #[error("nesting deeper than {limit} levels at byte {offset}")]
    TooDeep { offset: usize, limit: usize },
}

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    span: Range<usize>,
}

fn tokenize(src: &str) -> Result<Vec<Spanned>, ReadError> {
    let mut tokens = Vec::new();
    let mut lexer = Token::lexer(src);
    while let Some(result) = lexer.next() {
        let span = lexer.span();
        match result {
            Ok(token) => tokens.push(Spanned { token, span }),
            Err(()) => {
                return Err(ReadError::BadChar {
                    offset: span.start,
                    found: src[span].to_string(),
                });
            }
        }
    }
    Ok(tokens)
}

/// Read a comma-separated list of expressions, one value each.
pub fn parse_values(src: &str) -> Result<Vec<Value>, ReadError> {
    let p = Parser::new(src)?;
    if p.at_end() {
        return Err(ReadError::Empty);
    }
    p.values()
}

/// Read `$name = expr;` statements as printed by a non-terse dump.
pub fn parse_program(src: &str) -> Result<Vec<(String, Value)>, ReadError> {
    let p = Parser::new(src)?;
    if p.at_end() {
        return Err(ReadError::Empty);
    }
    p.program()
}

/// Read dump output in either form: statements, or a terse value list.
/// Text holding nothing but whitespace and comments reads as no values.
pub fn parse_dump(src: &str) -> Result<Vec<Value>, ReadError> {
    let p = Parser::new(src)?;
    if p.at_end() {
        return Ok(Vec::new());
    }
    if matches!(p.peek(), Some(Token::Variable(_))) {
        Ok(p.program()?.into_iter().map(|(_, v)| v).collect())
    } else {
        p.values()
    }
}

struct Parser<'a> {
    src: &'a str,
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Result<Self, ReadError> {
        Ok(Self {
            src,
            tokens: tokenize(src)?,
            pos: 0,
            depth: 0,
        })
    }

    fn values(mut self) -> Result<Vec<Value>, ReadError> {
        let mut out = Vec::new();
        while !self.at_end() {
            out.push(self.expr()?);
            if self.at_end() {
                break;
            }
            self.expect(&Token::Comma, "',' between expressions")?;
        }
        Ok(out)
    }

    fn program(mut self) -> Result<Vec<(String, Value)>, ReadError> {
        let mut out = Vec::new();
        while !self.at_end() {
            let name = match self.next("a variable") {
                Ok(Spanned {
                    token: Token::Variable(name),
                    ..
                }) => name,
                Ok(other) => return Err(self.unexpected(&other, "a variable")),
                Err(e) => return Err(e),
            };
            self.expect(&Token::Assign, "'='")?;
            let value = self.expr()?;
            self.expect(&Token::Semi, "';'")?;
            out.push((name, value));
        }
        Ok(out)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    fn next(&mut self, expected: &'static str) -> Result<Spanned, ReadError> {
        let tok = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(ReadError::Eof { expected })?;
        self.pos += 1;
        Ok(tok)
    }

    fn unexpected(&self, tok: &Spanned, expected: &'static str) -> ReadError {
        ReadError::Unexpected {
            offset: tok.span.start,
            found: self.src[tok.span.clone()].to_string(),
            expected,
        }
    }

    fn expect(&mut self, want: &Token, expected: &'static str) -> Result<(), ReadError> {
        let tok = self.next(expected)?;
        if &tok.token == want {
            Ok(())
        } else {
            Err(self.unexpected(&tok, expected))
        }
    }

    fn eat(&mut self, want: &Token) -> bool {
        if self.peek() == Some(want) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expr(&mut self) -> Result<Value, ReadError> {
        if self.depth >= MAX_NESTING {
            return Err(ReadError::TooDeep {
                offset: self.tokens.get(self.pos).map_or(self.src.len(), |t| t.span.start),
                limit: MAX_NESTING,
            });
        }
        self.depth += 1;
        let value = self.term();
        self.depth -= 1;
        value
    }

    fn term(&mut self) -> Result<Value, ReadError> {
        const WHAT: &str = "an expression";
        let tok = self.next(WHAT)?;
        match tok.token {
            Token::Undef => Ok(Value::Undef),
            Token::Number(n) => Ok(Value::Scalar(n)),
            Token::SingleQuoted(raw) => Ok(Value::Scalar(unescape_single(&raw))),
            Token::DoubleQuoted(raw) => {
                unescape_double(&raw, tok.span.start + 1).map(Value::Scalar)
            }
            Token::LBracket => self.array(),
            Token::LBrace => self.hash(),
            Token::Backslash => Ok(Value::Ref(Box::new(self.expr()?))),
            Token::Bless => self.bless(tok.span.start),
            Token::Sub => self.sub_body(),
            _ => Err(self.unexpected(&tok, WHAT)),
        }
    }

    fn array(&mut self) -> Result<Value, ReadError> {
        let mut items = Vec::new();
        loop {
            if self.eat(&Token::RBracket) {
                return Ok(Value::Array(items));
            }
            items.push(self.expr()?);
            if !self.eat(&Token::Comma) {
                self.expect(&Token::RBracket, "',' or ']'")?;
                return Ok(Value::Array(items));
            }
        }
    }

    fn hash(&mut self) -> Result<Value, ReadError> {
        let mut map = IndexMap::new();
        loop {
            if self.eat(&Token::RBrace) {
                return Ok(Value::Hash(map));
            }
            let key = self.key()?;
            let sep = self.next("'=>'")?;
            if !matches!(sep.token, Token::FatArrow | Token::Comma) {
                return Err(self.unexpected(&sep, "'=>'"));
            }
            let value = self.expr()?;
            map.insert(key, value);
            if !self.eat(&Token::Comma) {
                self.expect(&Token::RBrace, "',' or '}'")?;
                return Ok(Value::Hash(map));
            }
        }
    }

    fn key(&mut self) -> Result<String, ReadError> {
        const WHAT: &str = "a hash key";
        let tok = self.next(WHAT)?;
        match tok.token {
            Token::Bareword(s) | Token::Number(s) => Ok(s),
            Token::Undef | Token::Bless | Token::Sub => Ok(self.src[tok.span].to_string()),
            Token::SingleQuoted(raw) => Ok(unescape_single(&raw)),
            Token::DoubleQuoted(raw) => unescape_double(&raw, tok.span.start + 1),
            _ => Err(self.unexpected(&tok, WHAT)),
        }
    }

    fn bless(&mut self, offset: usize) -> Result<Value, ReadError> {
        self.expect(&Token::LParen, "'(' after bless")?;
        let inner = self.expr()?;
        if !inner.is_ref() {
            return Err(ReadError::BlessNonRef { offset });
        }
        self.expect(&Token::Comma, "',' before the class name")?;
        let tok = self.next("a class name")?;
        let class = match tok.token {
            Token::SingleQuoted(raw) => unescape_single(&raw),
            Token::DoubleQuoted(raw) => unescape_double(&raw, tok.span.start + 1)?,
            Token::Bareword(s) => s,
            _ => return Err(self.unexpected(&tok, "a class name")),
        };
        self.expect(&Token::RParen, "')'")?;
        Ok(Value::Blessed {
            class,
            inner: Box::new(inner),
        })
    }

    // Code bodies are not kept; only their braces must balance.
    fn sub_body(&mut self) -> Result<Value, ReadError> {
        self.expect(&Token::LBrace, "'{' after sub")?;
        let mut depth = 1usize;
        while depth > 0 {
            match self.next("'}' closing the sub body")?.token {
                Token::LBrace => depth += 1,
                Token::RBrace => depth -= 1,
                _ => {}
            }
        }
        Ok(Value::Code)
    }
}

fn unescape_single(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&n) = chars.peek() {
                if n == '\\' || n == '\'' {
                    out.push(n);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

fn unescape_double(raw: &str, base: usize) -> Result<String, ReadError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let bad = |len: usize| ReadError::BadEscape {
            offset: base + i,
            escape: raw[i..(i + len).min(raw.len())].to_string(),
        };
        let Some((_, e)) = chars.next() else {
            return Err(bad(1));
        };
        match e {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'f' => out.push('\u{0c}'),
            'b' => out.push('\u{08}'),
            'a' => out.push('\u{07}'),
            'e' => out.push('\u{1b}'),
            '0'..='7' => {
                let mut code = e.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match chars.peek() {
                        Some(&(_, d)) if d.is_digit(8) => {
                            code = code * 8 + d.to_digit(8).unwrap_or(0);
                            chars.next();
                        }
                        _ => break,
                    }
                }
                out.push(char::from_u32(code).ok_or_else(|| bad(4))?);
            }
            'x' => {
                let mut hex = String::new();
                if chars.peek().is_some_and(|&(_, c)| c == '{') {
                    chars.next();
                    loop {
                        match chars.next() {
                            Some((_, '}')) => break,
                            Some((_, h)) if h.is_ascii_hexdigit() => hex.push(h),
                            _ => return Err(bad(hex.len() + 3)),
                        }
                    }
                } else {
                    while hex.len() < 2 {
                        match chars.peek() {
                            Some(&(_, h)) if h.is_ascii_hexdigit() => {
                                hex.push(h);
                                chars.next();
                            }
                            _ => break,
                        }
                    }
                }
                let code = if hex.is_empty() {
                    0
                } else {
                    u32::from_str_radix(&hex, 16).map_err(|_| bad(hex.len() + 2))?
                };
                out.push(char::from_u32(code).ok_or_else(|| bad(hex.len() + 2))?);
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value::*;

    fn one(src: &str) -> Value {
        let mut v = parse_values(src).unwrap();
        assert_eq!(v.len(), 1, "{src}");
        v.remove(0)
    }

    #[test]
    fn reads_scalars() {
        assert_eq!(one("undef"), Undef);
        assert_eq!(one("-12"), Value::scalar("-12"));
        assert_eq!(one("3.25e-2"), Value::scalar("3.25e-2"));
        assert_eq!(one(r"'it\'s \n'"), Value::scalar("it's \\n"));
        assert_eq!(one(r#""42\n""#), Value::scalar("42\n"));
        assert_eq!(one("'42\n'"), Value::scalar("42\n"));
    }

    #[test]
    fn reads_double_quote_escapes() {
        assert_eq!(one(r#""\$a \@b \"c\" \\""#), Value::scalar("$a @b \"c\" \\"));
        assert_eq!(one(r#""\0012\177\x41\x{e9}""#), Value::scalar("\u{1}2\u{7f}Aé"));
        assert!(matches!(
            parse_values(r#""\x{zz}""#),
            Err(ReadError::BadEscape { .. })
        ));
    }

    #[test]
    fn reads_nested_structures() {
        let v = one("{ a => [1, 'two', undef,], 'b c' => { }, 3 => \\'x' }");
        let Hash(map) = v else { panic!("not a hash") };
        assert_eq!(map.keys().collect::<Vec<_>>(), ["a", "b c", "3"]);
        assert_eq!(
            map["a"],
            Array(vec![Value::scalar("1"), Value::scalar("two"), Undef])
        );
        assert_eq!(map["b c"], Hash(IndexMap::new()));
        assert_eq!(map["3"], Ref(Box::new(Value::scalar("x"))));
    }

    #[test]
    fn reads_bless_and_sub() {
        let v = one("bless( [ sub { \"DUMMY\" } ], 'Foo::Bar' )");
        assert_eq!(
            v,
            Blessed {
                class: "Foo::Bar".into(),
                inner: Box::new(Array(vec![Code])),
            }
        );
        assert!(matches!(
            parse_values("bless( 'x', 'Foo' )"),
            Err(ReadError::BlessNonRef { .. })
        ));
    }

    #[test]
    fn reads_programs() {
        let prog = parse_program("$VAR1 = [\n  1\n];\n$foo = 'x';\n").unwrap();
        assert_eq!(prog.len(), 2);
        assert_eq!(prog[0].0, "VAR1");
        assert_eq!(prog[1], ("foo".to_string(), Value::scalar("x")));
        assert_eq!(parse_dump("$VAR1 = 1;").unwrap(), vec![Value::scalar("1")]);
        assert_eq!(parse_dump("1,2").unwrap().len(), 2);
    }

    #[test]
    fn reports_errors_with_offsets() {
        assert_eq!(parse_values("   "), Err(ReadError::Empty));
        assert!(matches!(
            parse_values("[1, 2"),
            Err(ReadError::Eof { .. })
        ));
        assert!(matches!(
            parse_program("$VAR1 = 1"),
            Err(ReadError::Eof { expected: "';'" })
        ));
        match parse_values("{ a : 1 }") {
            Err(ReadError::BadChar { offset, found }) => {
                assert_eq!(offset, 4);
                assert_eq!(found, ":");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            parse_values("[1] [2]"),
            Err(ReadError::Unexpected { offset: 4, .. })
        ));
        assert!(matches!(
            parse_values("'never closed"),
            Err(ReadError::BadChar { offset: 0, .. })
        ));
    }

    #[test]
    fn nesting_is_capped() {
        let ok = format!("{}1{}", "[".repeat(MAX_NESTING - 1), "]".repeat(MAX_NESTING - 1));
        assert!(parse_values(&ok).is_ok());

        let deep = format!("{}{}", "[".repeat(5000), "]".repeat(5000));
        match parse_values(&deep) {
            Err(ReadError::TooDeep { offset, limit }) => {
                assert_eq!(limit, MAX_NESTING);
                assert_eq!(offset, MAX_NESTING);
            }
            other => panic!("unexpected {other:?}"),
        }
        let refs = format!("{}1", "\\".repeat(5000));
        assert!(matches!(parse_values(&refs), Err(ReadError::TooDeep { .. })));
    }

    #[test]
    fn long_strings_and_comments() {
        let body = "ab\\'".repeat(40_000);
        let v = one(&format!("'{body}'"));
        assert_eq!(v, Value::scalar("ab'".repeat(40_000)));

        let comment = format!("# {}\n7", "x".repeat(200_000));
        assert_eq!(one(&comment), Value::scalar("7"));
    }

    #[test]
    fn commented_out_dump_reads_as_nothing() {
        assert_eq!(parse_dump("# $VAR1 = 1;\n"), Ok(vec![]));
        assert_eq!(parse_dump("  \n"), Ok(vec![]));
        assert_eq!(parse_values("# 1\n"), Err(ReadError::Empty));
    }
}
