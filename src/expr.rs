use crate::token::TokenType;
use std::fmt;
use thiserror::Error;

/// Function names allowed to appear in binding/guard expressions. Calling
/// anything else is rejected during classification and evaluation.
pub const ALLOWED_FUNCTIONS: &[&str] = &[
    "concat",
    "substring",
    "length",
    "head",
    "tail",
    "append",
    "sublist",
    "isSublistOf",
    "isSubstringOf",
    "fst",
    "snd",
];

pub fn is_allowed_function(name: &str) -> bool {
    ALLOWED_FUNCTIONS.contains(&name)
}

// --- AST ---

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(i64),
    Str(String),
    Var {
        name: String,
        var_type: Option<TokenType>,
    },
    List(Vec<Expr>),
    /// Pair literal `(e1, e2)`. A parenthesized expression without a
    /// top-level comma is plain grouping and produces no node.
    Pair(Box<Expr>, Box<Expr>),
    Call {
        name: String,
        args: Vec<Expr>,
    },
    BinOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinOp {
    pub fn symbol(&self) -> char {
        match self {
            BinOp::Add => '+',
            BinOp::Sub => '-',
            BinOp::Mul => '*',
            BinOp::Div => '/',
        }
    }
}

impl Expr {
    /// True when any call anywhere in the tree names a disallowed function.
    pub fn has_disallowed_call(&self) -> bool {
        match self {
            Expr::Call { name, args } => {
                !is_allowed_function(name) || args.iter().any(Expr::has_disallowed_call)
            }
            Expr::BinOp { left, right, .. } => {
                left.has_disallowed_call() || right.has_disallowed_call()
            }
            Expr::Pair(fst, snd) => fst.has_disallowed_call() || snd.has_disallowed_call(),
            Expr::List(items) => items.iter().any(Expr::has_disallowed_call),
            Expr::Int(_) | Expr::Str(_) | Expr::Var { .. } => false,
        }
    }

    /// Collects variable names referenced by the expression, in-order.
    pub fn collect_variables(&self, out: &mut Vec<String>) {
        match self {
            Expr::Var { name, .. } => {
                if !out.iter().any(|n| n == name) {
                    out.push(name.clone());
                }
            }
            Expr::BinOp { left, right, .. } => {
                left.collect_variables(out);
                right.collect_variables(out);
            }
            Expr::Pair(fst, snd) => {
                fst.collect_variables(out);
                snd.collect_variables(out);
            }
            Expr::List(items) => items.iter().for_each(|e| e.collect_variables(out)),
            Expr::Call { args, .. } => args.iter().for_each(|e| e.collect_variables(out)),
            Expr::Int(_) | Expr::Str(_) => {}
        }
    }
}

// --- Parsing ---

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at position {position}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, position: usize) -> ParseError {
        ParseError {
            message: message.into(),
            position,
        }
    }
}

/// Shared character cursor for the three recursive-descent parsers.
pub(crate) struct Cursor {
    chars: Vec<char>,
    pub pos: usize,
}

impl Cursor {
    pub fn new(src: &str) -> Cursor {
        Cursor {
            chars: src.trim().chars().collect(),
            pos: 0,
        }
    }

    pub fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    pub fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    pub fn bump(&mut self) -> Option<char> {
        let ch = self.peek();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    pub fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    pub fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Consumes `word` if present at the cursor (case-insensitive) and
    /// followed by a non-identifier character.
    pub fn eat_keyword(&mut self, word: &str) -> bool {
        let len = word.chars().count();
        for (i, wc) in word.chars().enumerate() {
            match self.peek_at(i) {
                Some(c) if c.eq_ignore_ascii_case(&wc) => {}
                _ => return false,
            }
        }
        if matches!(self.peek_at(len), Some(c) if is_ident_part(c)) {
            return false;
        }
        self.pos += len;
        true
    }

    pub fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.pos)
    }

    /// Reads an identifier: `[A-Za-z_][A-Za-z0-9_]*`. Uppercase-initial names
    /// are reserved so `T`/`F` stay unambiguous boolean literals.
    pub fn read_ident(&mut self) -> Result<String, ParseError> {
        self.skip_ws();
        let start = self.pos;
        match self.peek() {
            Some(c) if is_ident_start(c) => {
                self.pos += 1;
            }
            _ => return Err(self.error("Expected identifier")),
        }
        while matches!(self.peek(), Some(c) if is_ident_part(c)) {
            self.pos += 1;
        }
        let name: String = self.chars[start..self.pos].iter().collect();
        if name.chars().next().is_some_and(|c| c.is_ascii_uppercase()) {
            return Err(ParseError::new(
                format!(
                    "Variable names must start with lowercase letter, got '{}'",
                    name
                ),
                start,
            ));
        }
        Ok(name)
    }

    /// Reads an optional `:type` suffix. An unknown type word rolls the
    /// cursor back and yields `None`.
    pub fn read_type_suffix(&mut self) -> Option<TokenType> {
        let save = self.pos;
        self.skip_ws();
        if !self.eat(':') {
            self.pos = save;
            return None;
        }
        self.skip_ws();
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphabetic()) {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        match TokenType::from_annotation(&word) {
            Some(ty) => Some(ty),
            None => {
                self.pos = save;
                None
            }
        }
    }

    /// Reads a `'...'` string literal with backslash escapes.
    pub fn read_string_literal(&mut self) -> Result<String, ParseError> {
        if !self.eat('\'') {
            return Err(self.error("Expected string literal"));
        }
        let mut value = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("Unterminated string literal")),
                Some('\'') => return Ok(value),
                Some('\\') => match self.bump() {
                    None => return Err(self.error("Unterminated string literal")),
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('r') => value.push('\r'),
                    Some(other) => value.push(other),
                },
                Some(ch) => value.push(ch),
            }
        }
    }

    pub fn read_int_literal(&mut self) -> Result<i64, ParseError> {
        self.skip_ws();
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(self.error("Expected int"));
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        text.parse()
            .map_err(|_| ParseError::new(format!("Integer literal '{}' overflows", text), start))
    }
}

pub(crate) fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

pub(crate) fn is_ident_part(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Parses an arithmetic/string/list/pair expression.
pub fn parse_arithmetic(input: &str) -> Result<Expr, ParseError> {
    let mut cur = Cursor::new(input);
    let expr = parse_expr(&mut cur)?;
    cur.skip_ws();
    if !cur.at_end() {
        return Err(cur.error(format!(
            "Unexpected character '{}'",
            cur.peek().unwrap_or_default()
        )));
    }
    Ok(expr)
}

pub(crate) fn parse_expr(cur: &mut Cursor) -> Result<Expr, ParseError> {
    let mut left = parse_term(cur)?;
    loop {
        cur.skip_ws();
        let op = match cur.peek() {
            Some('+') => BinOp::Add,
            Some('-') => BinOp::Sub,
            _ => break,
        };
        cur.bump();
        let right = parse_term(cur)?;
        left = Expr::BinOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
    }
    Ok(left)
}

fn parse_term(cur: &mut Cursor) -> Result<Expr, ParseError> {
    let mut left = parse_factor(cur)?;
    loop {
        cur.skip_ws();
        let op = match cur.peek() {
            Some('*') => BinOp::Mul,
            Some('/') => BinOp::Div,
            _ => break,
        };
        cur.bump();
        let right = parse_factor(cur)?;
        left = Expr::BinOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
    }
    Ok(left)
}

fn parse_factor(cur: &mut Cursor) -> Result<Expr, ParseError> {
    cur.skip_ws();
    match cur.peek() {
        None => Err(cur.error("Unexpected end of input")),
        Some('(') => {
            cur.bump();
            let first = parse_expr(cur)?;
            cur.skip_ws();
            if cur.eat(',') {
                let second = parse_expr(cur)?;
                cur.skip_ws();
                if !cur.eat(')') {
                    return Err(cur.error("Expected ')' after pair literal"));
                }
                return Ok(Expr::Pair(Box::new(first), Box::new(second)));
            }
            if !cur.eat(')') {
                return Err(cur.error("Expected ')'"));
            }
            Ok(first)
        }
        Some('[') => parse_list_literal(cur),
        Some('\'') => Ok(Expr::Str(cur.read_string_literal()?)),
        Some(c) if c.is_ascii_digit() => Ok(Expr::Int(cur.read_int_literal()?)),
        Some(c) if is_ident_start(c) => parse_ident_factor(cur),
        Some(c) => Err(cur.error(format!("Unexpected character '{}'", c))),
    }
}

fn parse_ident_factor(cur: &mut Cursor) -> Result<Expr, ParseError> {
    let name = cur.read_ident()?;
    cur.skip_ws();
    if cur.eat('(') {
        let mut args = Vec::new();
        cur.skip_ws();
        if !cur.eat(')') {
            loop {
                args.push(parse_expr(cur)?);
                cur.skip_ws();
                if cur.eat(',') {
                    continue;
                }
                if cur.eat(')') {
                    break;
                }
                return Err(cur.error("Expected ')' after function arguments"));
            }
        }
        return Ok(Expr::Call { name, args });
    }
    let var_type = cur.read_type_suffix();
    Ok(Expr::Var { name, var_type })
}

fn parse_list_literal(cur: &mut Cursor) -> Result<Expr, ParseError> {
    cur.bump(); // '['
    let mut elements = Vec::new();
    cur.skip_ws();
    if cur.eat(']') {
        return Ok(Expr::List(elements));
    }
    loop {
        elements.push(parse_expr(cur)?);
        cur.skip_ws();
        if cur.eat(']') {
            return Ok(Expr::List(elements));
        }
        if cur.eat(',') {
            continue;
        }
        return Err(cur.error("Expected ',' or ']'"));
    }
}

// --- Stringification ---

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Int(v) => write!(f, "{}", v),
            Expr::Str(s) => {
                write!(f, "'")?;
                for ch in s.chars() {
                    match ch {
                        '\'' => write!(f, "\\'")?,
                        '\\' => write!(f, "\\\\")?,
                        '\n' => write!(f, "\\n")?,
                        '\t' => write!(f, "\\t")?,
                        '\r' => write!(f, "\\r")?,
                        other => write!(f, "{}", other)?,
                    }
                }
                write!(f, "'")
            }
            Expr::Var { name, var_type } => match var_type {
                Some(ty) => write!(f, "{}:{}", name, ty.annotation()),
                None => write!(f, "{}", name),
            },
            Expr::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Expr::Pair(fst, snd) => write!(f, "({}, {})", fst, snd),
            Expr::Call { name, args } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Expr::BinOp { op, left, right } => write!(f, "({} {} {})", left, op.symbol(), right),
        }
    }
}

/// Inverse of [`parse_arithmetic`]; `parse(stringify(ast))` is structurally
/// equal to `ast` for every form the grammar supports.
pub fn stringify_arithmetic(expr: &Expr) -> String {
    expr.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(text: &str) -> Expr {
        let ast = parse_arithmetic(text).unwrap();
        let printed = stringify_arithmetic(&ast);
        let reparsed = parse_arithmetic(&printed).unwrap();
        assert_eq!(ast, reparsed, "round-trip of '{}' via '{}'", text, printed);
        ast
    }

    #[test]
    fn parses_precedence() {
        let ast = roundtrip("1 + 2 * 3");
        match ast {
            Expr::BinOp { op: BinOp::Add, right, .. } => {
                assert!(matches!(*right, Expr::BinOp { op: BinOp::Mul, .. }));
            }
            other => panic!("unexpected ast {:?}", other),
        }
    }

    #[test]
    fn grouping_beats_precedence() {
        let ast = roundtrip("(1 + 2) * 3");
        assert!(matches!(ast, Expr::BinOp { op: BinOp::Mul, .. }));
    }

    #[test]
    fn parses_pair_literal() {
        let ast = roundtrip("(x, y + 1)");
        assert!(matches!(ast, Expr::Pair(..)));
    }

    #[test]
    fn parses_typed_variable_and_rolls_back_unknown_type() {
        assert_eq!(
            roundtrip("x:int"),
            Expr::Var {
                name: "x".into(),
                var_type: Some(TokenType::Int)
            }
        );
        // Unknown suffix word is not a type annotation; the ':' makes the
        // remainder unparsable, which the caller treats as a failed classify.
        assert!(parse_arithmetic("x:widget").is_err());
    }

    #[test]
    fn rejects_uppercase_identifiers() {
        let err = parse_arithmetic("Total + 1").unwrap_err();
        assert!(err.message.contains("lowercase"));
    }

    #[test]
    fn parses_function_calls_and_lists() {
        let ast = roundtrip("concat(substring(s, 0, 2), 'ab')");
        assert!(matches!(ast, Expr::Call { .. }));
        roundtrip("[1, x, [2, 3]]");
        roundtrip("[]");
    }

    #[test]
    fn string_escapes_round_trip() {
        let ast = roundtrip("'it\\'s\\n'");
        assert_eq!(ast, Expr::Str("it's\n".into()));
    }

    #[test]
    fn flags_disallowed_calls() {
        let ast = parse_arithmetic("1 + mystery(2)").unwrap();
        assert!(ast.has_disallowed_call());
        let ok = parse_arithmetic("1 + length([1])").unwrap();
        assert!(!ok.has_disallowed_call());
    }

    #[test]
    fn rejects_trailing_garbage() {
        assert!(parse_arithmetic("1 + 2 )").is_err());
        assert!(parse_arithmetic("x y").is_err());
    }
}
