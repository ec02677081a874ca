// eb-common/src/easyconfig/parser.rs
//! Tokenizer and evaluator for the assignment language easyconfig files are
//! written in. Only literal expressions, names bound earlier in the file,
//! `+`, `%` and `==`/`!=` are supported.
use std::collections::HashMap;

use tracing::trace;

use super::constants::lookup_constant;
use super::value::Value;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Name(String),
    Str(String),
    Int(i64),
    Float(f64),
    Op(char),
    EqEq,
    NotEq,
    Newline,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub line: usize,
    pub msg: String,
}

type PResult<T> = std::result::Result<T, ParseError>;

fn err<T>(line: usize, msg: impl Into<String>) -> PResult<T> {
    Err(ParseError {
        line,
        msg: msg.into(),
    })
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    src: &'a str,
    line: usize,
    depth: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            chars: src.char_indices().peekable(),
            src,
            line: 1,
            depth: 0,
        }
    }

    fn tokenize(mut self) -> PResult<Vec<(Token, usize)>> {
        let mut tokens = Vec::new();
        while let Some(&(_, c)) = self.chars.peek() {
            match c {
                '\n' => {
                    self.chars.next();
                    if self.depth == 0 {
                        tokens.push((Token::Newline, self.line));
                    }
                    self.line += 1;
                }
                ' ' | '\t' | '\r' => {
                    self.chars.next();
                }
                '\\' => {
                    // explicit line continuation
                    self.chars.next();
                    match self.chars.next() {
                        Some((_, '\n')) => self.line += 1,
                        Some((_, '\r')) if matches!(self.chars.peek(), Some((_, '\n'))) => {
                            self.chars.next();
                            self.line += 1;
                        }
                        _ => return err(self.line, "unexpected character after line continuation"),
                    }
                }
                '#' => {
                    while let Some(&(_, c)) = self.chars.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.chars.next();
                    }
                }
                '\'' | '"' => {
                    let line = self.line;
                    let s = self.string(false)?;
                    tokens.push((Token::Str(s), line));
                }
                '0'..='9' => {
                    let line = self.line;
                    tokens.push((self.number()?, line));
                }
                c if c.is_alphabetic() || c == '_' => {
                    let line = self.line;
                    let name = self.ident();
                    // raw/unicode string prefixes
                    let is_prefix = matches!(name.as_str(), "r" | "R" | "u" | "U" | "b" | "B");
                    if is_prefix && matches!(self.chars.peek(), Some((_, '\'' | '"'))) {
                        let raw = name.eq_ignore_ascii_case("r");
                        let s = self.string(raw)?;
                        tokens.push((Token::Str(s), line));
                    } else {
                        tokens.push((Token::Name(name), line));
                    }
                }
                '=' => {
                    self.chars.next();
                    if matches!(self.chars.peek(), Some((_, '='))) {
                        self.chars.next();
                        tokens.push((Token::EqEq, self.line));
                    } else {
                        tokens.push((Token::Op('='), self.line));
                    }
                }
                '!' => {
                    self.chars.next();
                    if matches!(self.chars.peek(), Some((_, '='))) {
                        self.chars.next();
                        tokens.push((Token::NotEq, self.line));
                    } else {
                        return err(self.line, "unexpected character '!'");
                    }
                }
                '(' | '[' | '{' => {
                    self.chars.next();
                    self.depth += 1;
                    tokens.push((Token::Op(c), self.line));
                }
                ')' | ']' | '}' => {
                    self.chars.next();
                    if self.depth == 0 {
                        return err(self.line, format!("unmatched '{c}'"));
                    }
                    self.depth -= 1;
                    tokens.push((Token::Op(c), self.line));
                }
                '+' | '%' | ',' | ':' | '-' => {
                    self.chars.next();
                    tokens.push((Token::Op(c), self.line));
                }
                other => return err(self.line, format!("unexpected character '{other}'")),
            }
        }
        if self.depth != 0 {
            return err(self.line, "unexpected end of file inside brackets");
        }
        tokens.push((Token::Newline, self.line));
        tokens.push((Token::Eof, self.line));
        Ok(tokens)
    }

    fn ident(&mut self) -> String {
        let mut name = String::new();
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                name.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        name
    }

    fn number(&mut self) -> PResult<Token> {
        let start = self.chars.peek().map(|&(i, _)| i).unwrap_or(0);
        let mut end = start;
        let mut is_float = false;
        while let Some(&(i, c)) = self.chars.peek() {
            if c.is_ascii_digit() || c == '_' {
                end = i + 1;
                self.chars.next();
            } else if c == '.' && !is_float {
                is_float = true;
                end = i + 1;
                self.chars.next();
            } else {
                break;
            }
        }
        let text: String = self.src[start..end].chars().filter(|&c| c != '_').collect();
        if is_float {
            text.parse::<f64>()
                .map(Token::Float)
                .or_else(|e| err(self.line, format!("invalid float '{text}': {e}")))
        } else {
            text.parse::<i64>()
                .map(Token::Int)
                .or_else(|e| err(self.line, format!("invalid integer '{text}': {e}")))
        }
    }

    fn string(&mut self, raw: bool) -> PResult<String> {
        let start_line = self.line;
        let quote = match self.chars.next() {
            Some((_, q)) => q,
            None => return err(self.line, "expected string"),
        };
        let src = self.src;
        let idx = self.chars.peek().map(|&(i, _)| i).unwrap_or(src.len());
        let triple_delim = quote.to_string().repeat(2);
        let triple = src[idx..].starts_with(&triple_delim);
        if triple {
            self.chars.next();
            self.chars.next();
        }

        let mut out = String::new();
        loop {
            let Some((_, c)) = self.chars.next() else {
                return err(start_line, "unterminated string literal");
            };
            if c == quote {
                if !triple {
                    break;
                }
                let idx = self.chars.peek().map(|&(i, _)| i).unwrap_or(src.len());
                if src[idx..].starts_with(&triple_delim) {
                    self.chars.next();
                    self.chars.next();
                    break;
                }
                out.push(c);
                continue;
            }
            if c == '\n' {
                if !triple {
                    return err(start_line, "end of line inside string literal");
                }
                self.line += 1;
                out.push(c);
                continue;
            }
            if c == '\\' {
                let Some((_, next)) = self.chars.next() else {
                    return err(start_line, "unterminated string literal");
                };
                if raw {
                    out.push('\\');
                    out.push(next);
                    if next == '\n' {
                        self.line += 1;
                    }
                    continue;
                }
                match next {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    '\\' => out.push('\\'),
                    '\'' => out.push('\''),
                    '"' => out.push('"'),
                    '\n' => self.line += 1,
                    other => {
                        out.push('\\');
                        out.push(other);
                    }
                }
                continue;
            }
            out.push(c);
        }
        Ok(out)
    }
}

struct Parser<'t, 'e> {
    tokens: &'t [(Token, usize)],
    pos: usize,
    env: &'e HashMap<String, Value>,
}

impl Parser<'_, '_> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos].0
    }

    fn line(&self) -> usize {
        self.tokens[self.pos].1
    }

    fn next(&mut self) -> Token {
        let tok = self.tokens[self.pos].0.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn expect_op(&mut self, op: char) -> PResult<()> {
        match self.next() {
            Token::Op(c) if c == op => Ok(()),
            other => err(self.line(), format!("expected '{op}', found {other:?}")),
        }
    }

    fn expression(&mut self) -> PResult<Value> {
        let lhs = self.additive()?;
        match self.peek() {
            Token::EqEq => {
                self.next();
                let rhs = self.additive()?;
                Ok(Value::Bool(lhs == rhs))
            }
            Token::NotEq => {
                self.next();
                let rhs = self.additive()?;
                Ok(Value::Bool(lhs != rhs))
            }
            _ => Ok(lhs),
        }
    }

    fn additive(&mut self) -> PResult<Value> {
        let mut lhs = self.modulo()?;
        while matches!(self.peek(), Token::Op('+')) {
            self.next();
            let line = self.line();
            let rhs = self.modulo()?;
            lhs = add(lhs, rhs).or_else(|m| err(line, m))?;
        }
        Ok(lhs)
    }

    fn modulo(&mut self) -> PResult<Value> {
        let mut lhs = self.unary()?;
        while matches!(self.peek(), Token::Op('%')) {
            self.next();
            let line = self.line();
            let rhs = self.unary()?;
            lhs = match lhs {
                Value::Str(fmt) => Value::Str(py_format(&fmt, &rhs).or_else(|m| err(line, m))?),
                Value::Int(a) => match rhs {
                    Value::Int(0) => return err(line, "integer modulo by zero"),
                    Value::Int(b) => Value::Int(a.rem_euclid(b)),
                    other => {
                        return err(line, format!("unsupported operand for %: int and {}", other.type_name()))
                    }
                },
                other => return err(line, format!("unsupported operand for %: {}", other.type_name())),
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> PResult<Value> {
        if matches!(self.peek(), Token::Op('-')) {
            self.next();
            let line = self.line();
            return match self.unary()? {
                Value::Int(i) => Ok(Value::Int(-i)),
                Value::Float(f) => Ok(Value::Float(-f)),
                other => err(line, format!("bad operand type for unary -: {}", other.type_name())),
            };
        }
        self.atom()
    }

    fn atom(&mut self) -> PResult<Value> {
        let line = self.line();
        match self.next() {
            Token::Str(s) => {
                // adjacent literals are concatenated
                let mut s = s;
                while let Token::Str(more) = self.peek() {
                    s.push_str(more);
                    self.next();
                }
                Ok(Value::Str(s))
            }
            Token::Int(i) => Ok(Value::Int(i)),
            Token::Float(f) => Ok(Value::Float(f)),
            Token::Name(name) => match name.as_str() {
                "True" => Ok(Value::Bool(true)),
                "False" => Ok(Value::Bool(false)),
                "None" => Ok(Value::None),
                _ => self
                    .env
                    .get(&name)
                    .cloned()
                    .or_else(|| lookup_constant(&name))
                    .map_or_else(|| err(line, format!("name '{name}' is not defined")), Ok),
            },
            Token::Op('(') => {
                if matches!(self.peek(), Token::Op(')')) {
                    self.next();
                    return Ok(Value::Tuple(Vec::new()));
                }
                let first = self.expression()?;
                if matches!(self.peek(), Token::Op(')')) {
                    self.next();
                    return Ok(first);
                }
                let mut items = vec![first];
                while matches!(self.peek(), Token::Op(',')) {
                    self.next();
                    if matches!(self.peek(), Token::Op(')')) {
                        break;
                    }
                    items.push(self.expression()?);
                }
                self.expect_op(')')?;
                Ok(Value::Tuple(items))
            }
            Token::Op('[') => {
                let items = self.sequence(']')?;
                Ok(Value::List(items))
            }
            Token::Op('{') => {
                let mut items: Vec<(String, Value)> = Vec::new();
                loop {
                    if matches!(self.peek(), Token::Op('}')) {
                        self.next();
                        break;
                    }
                    let key_line = self.line();
                    let key = match self.expression()? {
                        Value::Str(k) => k,
                        other => {
                            return err(key_line, format!("dict keys must be strings, found {}", other.type_name()))
                        }
                    };
                    self.expect_op(':')?;
                    let value = self.expression()?;
                    if let Some(slot) = items.iter_mut().find(|(k, _)| *k == key) {
                        slot.1 = value;
                    } else {
                        items.push((key, value));
                    }
                    match self.next() {
                        Token::Op(',') => continue,
                        Token::Op('}') => break,
                        other => return err(self.line(), format!("expected ',' or '}}', found {other:?}")),
                    }
                }
                Ok(Value::Dict(items))
            }
            other => err(line, format!("unexpected token {other:?}")),
        }
    }

    fn sequence(&mut self, close: char) -> PResult<Vec<Value>> {
        let mut items = Vec::new();
        loop {
            if matches!(self.peek(), Token::Op(c) if *c == close) {
                self.next();
                break;
            }
            items.push(self.expression()?);
            match self.next() {
                Token::Op(',') => continue,
                Token::Op(c) if c == close => break,
                other => return err(self.line(), format!("expected ',' or '{close}', found {other:?}")),
            }
        }
        Ok(items)
    }
}

fn add(lhs: Value, rhs: Value) -> std::result::Result<Value, String> {
    match (lhs, rhs) {
        (Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a + b)),
        (Value::Int(a), Value::Float(b)) => Ok(Value::Float(a as f64 + b)),
        (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a + b as f64)),
        (Value::List(mut a), Value::List(b)) => {
            a.extend(b);
            Ok(Value::List(a))
        }
        (Value::Tuple(mut a), Value::Tuple(b)) => {
            a.extend(b);
            Ok(Value::Tuple(a))
        }
        (Value::Dict(_), Value::Dict(_)) => Err("unsupported operand type(s) for +: dict and dict".to_string()),
        (a, b) => Err(format!(
            "unsupported operand type(s) for +: {} and {}",
            a.type_name(),
            b.type_name()
        )),
    }
}

/// `fmt % args` for `%s`, `%d`, `%(key)s` and `%%`.
pub fn py_format(fmt: &str, args: &Value) -> std::result::Result<String, String> {
    let positional: Vec<Value> = match args {
        Value::Tuple(items) => items.clone(),
        Value::Dict(_) => Vec::new(),
        other => vec![other.clone()],
    };
    let mut next_arg = positional.into_iter();
    let mut out = String::new();
    let mut chars = fmt.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some('(') => {
                let mut key = String::new();
                for k in chars.by_ref() {
                    if k == ')' {
                        break;
                    }
                    key.push(k);
                }
                let conv = chars.next();
                if !matches!(conv, Some('s' | 'd')) {
                    return Err(format!("unsupported format character in '%({key})'"));
                }
                let value = args
                    .dict_get(&key)
                    .ok_or_else(|| format!("format requires a mapping with key '{key}'"))?;
                out.push_str(&value.to_plain_string());
            }
            Some('s') | Some('d') => {
                let value = next_arg
                    .next()
                    .ok_or_else(|| "not enough arguments for format string".to_string())?;
                out.push_str(&value.to_plain_string());
            }
            Some(other) => return Err(format!("unsupported format character '{other}'")),
            None => return Err("incomplete format".to_string()),
        }
    }
    if next_arg.next().is_some() {
        return Err("not all arguments converted during string formatting".to_string());
    }
    Ok(out)
}

/// Evaluates an easyconfig source text into its ordered assignments.
pub fn parse_assignments(src: &str) -> PResult<Vec<(String, Value, usize)>> {
    let tokens = Lexer::new(src).tokenize()?;
    let mut env: HashMap<String, Value> = HashMap::new();
    let mut assignments: Vec<(String, Value, usize)> = Vec::new();
    let mut pos = 0;

    loop {
        let mut parser = Parser {
            tokens: &tokens,
            pos,
            env: &env,
        };
        match parser.peek().clone() {
            Token::Eof => break,
            Token::Newline => {
                parser.next();
                pos = parser.pos;
                continue;
            }
            Token::Name(name) => {
                let line = parser.line();
                parser.next();
                parser.expect_op('=')?;
                let value = parser.expression()?;
                match parser.next() {
                    Token::Newline | Token::Eof => {}
                    other => return err(line, format!("unexpected {other:?} after value of '{name}'")),
                }
                pos = parser.pos;
                trace!("easyconfig assignment (line {}): {} = {}", line, name, value);
                env.insert(name.clone(), value.clone());
                if let Some(slot) = assignments.iter_mut().find(|(k, _, _)| *k == name) {
                    slot.1 = value;
                    slot.2 = line;
                } else {
                    assignments.push((name, value, line));
                }
            }
            other => return err(parser.line(), format!("expected assignment, found {other:?}")),
        }
    }
    Ok(assignments)
}
