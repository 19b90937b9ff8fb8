use crate::expr::{is_ident_part, parse_arithmetic, Expr, ParseError};
use crate::token::TokenType;
use std::fmt;

// --- Guard AST ---

/// One side of a comparison. Pairs nest terms rather than expressions so
/// literals like `(T, 1)` stay representable.
#[derive(Debug, Clone, PartialEq)]
pub enum GuardTerm {
    Bool(bool),
    Expr(Expr),
    Pair(Box<GuardTerm>, Box<GuardTerm>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

/// Boolean guard expression. Precedence, loosest first:
/// `iff`/`<->`, `implies`/`->`, `or`/`||`, `xor`/`^`, `and`/`&&`, `not`/`!`,
/// then comparisons and primaries. Operator words are case-insensitive.
#[derive(Debug, Clone, PartialEq)]
pub enum BoolExpr {
    Lit(bool),
    Var {
        name: String,
        var_type: Option<TokenType>,
    },
    Not(Box<BoolExpr>),
    And(Box<BoolExpr>, Box<BoolExpr>),
    Or(Box<BoolExpr>, Box<BoolExpr>),
    Xor(Box<BoolExpr>, Box<BoolExpr>),
    Implies(Box<BoolExpr>, Box<BoolExpr>),
    Iff(Box<BoolExpr>, Box<BoolExpr>),
    Cmp {
        op: CmpOp,
        left: GuardTerm,
        right: GuardTerm,
    },
    /// Boolean-valued allow-list call such as `isSubstringOf(s, t)`.
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

impl GuardTerm {
    fn collect_variables(&self, out: &mut Vec<String>) {
        match self {
            GuardTerm::Bool(_) => {}
            GuardTerm::Expr(expr) => expr.collect_variables(out),
            GuardTerm::Pair(fst, snd) => {
                fst.collect_variables(out);
                snd.collect_variables(out);
            }
        }
    }
}

impl BoolExpr {
    /// Variable names the guard reads, first occurrence order.
    pub fn collect_variables(&self, out: &mut Vec<String>) {
        match self {
            BoolExpr::Lit(_) => {}
            BoolExpr::Var { name, .. } => {
                if !out.iter().any(|n| n == name) {
                    out.push(name.clone());
                }
            }
            BoolExpr::Not(inner) => inner.collect_variables(out),
            BoolExpr::And(l, r)
            | BoolExpr::Or(l, r)
            | BoolExpr::Xor(l, r)
            | BoolExpr::Implies(l, r)
            | BoolExpr::Iff(l, r) => {
                l.collect_variables(out);
                r.collect_variables(out);
            }
            BoolExpr::Cmp { left, right, .. } => {
                left.collect_variables(out);
                right.collect_variables(out);
            }
            BoolExpr::Call { args, .. } => args.iter().for_each(|a| a.collect_variables(out)),
        }
    }
}

// --- Parsing ---

struct GuardParser {
    chars: Vec<char>,
    pos: usize,
}

const CMP_OPS: &[(&str, CmpOp)] = &[
    (">=", CmpOp::Ge),
    ("<=", CmpOp::Le),
    ("==", CmpOp::Eq),
    ("!=", CmpOp::Ne),
    (">", CmpOp::Gt),
    ("<", CmpOp::Lt),
];

const LOGIC_SYMS: &[&str] = &["&&", "||", "^", "->", "<->"];
const LOGIC_WORDS: &[&str] = &["and", "or", "xor", "implies", "iff"];

const BOOL_FUNCTIONS: &[&str] = &["isSubstringOf", "isSublistOf"];

pub fn parse_guard(input: &str) -> Result<BoolExpr, ParseError> {
    let mut parser = GuardParser {
        chars: input.trim().chars().collect(),
        pos: 0,
    };
    let ast = parser.parse_iff()?;
    parser.skip_ws();
    if parser.pos < parser.chars.len() {
        return Err(ParseError::new(
            format!("Unexpected token '{}'", parser.chars[parser.pos]),
            parser.pos,
        ));
    }
    Ok(ast)
}

impl GuardParser {
    fn skip_ws(&mut self) {
        while matches!(self.chars.get(self.pos), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn slice(&self, from: usize, to: usize) -> String {
        self.chars[from..to.min(self.chars.len())].iter().collect()
    }

    fn starts_with_at(&self, pos: usize, text: &str) -> bool {
        text.chars()
            .enumerate()
            .all(|(k, wc)| self.chars.get(pos + k).copied() == Some(wc))
    }

    fn word_boundary_at(&self, pos: usize, len: usize) -> bool {
        let before_ok = pos == 0
            || self
                .chars
                .get(pos - 1)
                .is_none_or(|c| !is_ident_part(*c));
        let after_ok = self
            .chars
            .get(pos + len)
            .is_none_or(|c| !is_ident_part(*c));
        before_ok && after_ok
    }

    fn word_at(&self, pos: usize, word: &str) -> bool {
        word.chars().enumerate().all(|(k, wc)| {
            self.chars
                .get(pos + k)
                .is_some_and(|c| c.eq_ignore_ascii_case(&wc))
        }) && self.word_boundary_at(pos, word.chars().count())
    }

    fn try_op(&mut self, symbol: &str, word: &str) -> bool {
        self.skip_ws();
        if self.starts_with_at(self.pos, symbol) {
            // '->' must not swallow the arrow inside '<->'.
            if symbol == "->" && self.pos > 0 && self.chars.get(self.pos - 1) == Some(&'<') {
                return false;
            }
            self.pos += symbol.chars().count();
            return true;
        }
        if self.word_at(self.pos, word) {
            self.pos += word.chars().count();
            return true;
        }
        false
    }

    fn parse_iff(&mut self) -> Result<BoolExpr, ParseError> {
        let mut node = self.parse_implies()?;
        while self.try_op("<->", "iff") {
            let right = self.parse_implies()?;
            node = BoolExpr::Iff(Box::new(node), Box::new(right));
        }
        Ok(node)
    }

    fn parse_implies(&mut self) -> Result<BoolExpr, ParseError> {
        let mut node = self.parse_or()?;
        while self.try_op("->", "implies") {
            let right = self.parse_or()?;
            node = BoolExpr::Implies(Box::new(node), Box::new(right));
        }
        Ok(node)
    }

    fn parse_or(&mut self) -> Result<BoolExpr, ParseError> {
        let mut node = self.parse_xor()?;
        while self.try_op("||", "or") {
            let right = self.parse_xor()?;
            node = BoolExpr::Or(Box::new(node), Box::new(right));
        }
        Ok(node)
    }

    fn parse_xor(&mut self) -> Result<BoolExpr, ParseError> {
        let mut node = self.parse_and()?;
        while self.try_op("^", "xor") {
            let right = self.parse_and()?;
            node = BoolExpr::Xor(Box::new(node), Box::new(right));
        }
        Ok(node)
    }

    fn parse_and(&mut self) -> Result<BoolExpr, ParseError> {
        let mut node = self.parse_not()?;
        while self.try_op("&&", "and") {
            let right = self.parse_not()?;
            node = BoolExpr::And(Box::new(node), Box::new(right));
        }
        Ok(node)
    }

    fn parse_not(&mut self) -> Result<BoolExpr, ParseError> {
        self.skip_ws();
        if self.try_op("!", "not") {
            // '!=' never reaches here: a comparison claims the whole primary.
            let inner = self.parse_not()?;
            return Ok(BoolExpr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<BoolExpr, ParseError> {
        self.skip_ws();
        let Some(&first) = self.chars.get(self.pos) else {
            return Err(ParseError::new("Unexpected end of input", self.pos));
        };

        if first == 'T' && self.word_boundary_at(self.pos, 1) {
            self.pos += 1;
            return Ok(BoolExpr::Lit(true));
        }
        if first == 'F' && self.word_boundary_at(self.pos, 1) {
            self.pos += 1;
            return Ok(BoolExpr::Lit(false));
        }
        if self.word_at(self.pos, "true") {
            self.pos += 4;
            return Ok(BoolExpr::Lit(true));
        }
        if self.word_at(self.pos, "false") {
            self.pos += 5;
            return Ok(BoolExpr::Lit(false));
        }

        for name in BOOL_FUNCTIONS {
            if self.starts_with_at(self.pos, name)
                && self.word_boundary_at(self.pos, name.len())
            {
                return self.parse_bool_call(name);
            }
        }

        if let Some(node) = self.try_parse_comparison()? {
            return Ok(node);
        }

        if first == '(' {
            self.pos += 1;
            let node = self.parse_iff()?;
            self.skip_ws();
            if self.chars.get(self.pos) != Some(&')') {
                return Err(ParseError::new("Expected ')'", self.pos));
            }
            self.pos += 1;
            return Ok(node);
        }

        self.parse_bool_var()
    }

    fn parse_bool_call(&mut self, name: &str) -> Result<BoolExpr, ParseError> {
        self.pos += name.chars().count();
        self.skip_ws();
        if self.chars.get(self.pos) != Some(&'(') {
            return Err(ParseError::new(
                format!("Expected '(' after {}", name),
                self.pos,
            ));
        }
        let args_start = self.pos + 1;
        let mut depth = 1usize;
        let mut k = args_start;
        while k < self.chars.len() && depth > 0 {
            match self.chars[k] {
                '(' => depth += 1,
                ')' => depth -= 1,
                _ => {}
            }
            k += 1;
        }
        if depth != 0 {
            return Err(ParseError::new(
                format!("Unterminated {} arguments", name),
                self.pos,
            ));
        }
        let inside = self.slice(args_start, k - 1);
        let parts = split_top_level_commas(&inside);
        if parts.len() != 2 {
            return Err(ParseError::new(
                format!("{} expects two arguments", name),
                args_start,
            ));
        }
        let args = parts
            .iter()
            .map(|p| parse_arithmetic(p))
            .collect::<Result<Vec<_>, _>>()?;
        self.pos = k;
        Ok(BoolExpr::Call {
            name: name.to_string(),
            args,
        })
    }

    /// Scans ahead for a comparison operator at the current nesting level,
    /// stopping at any top-level logic operator or unmatched ')'. The arrows
    /// are logic operators too, checked before the comparison symbols so the
    /// `<`/`>` inside `<->`/`->` are never misread. When an operator is found
    /// the primary is `left op right` with both sides parsed as terms.
    fn try_parse_comparison(&mut self) -> Result<Option<BoolExpr>, ParseError> {
        let mut depth = 0usize;
        let mut found: Option<(usize, &'static str, CmpOp)> = None;
        let mut j = self.pos;
        while j < self.chars.len() {
            let ch = self.chars[j];
            match ch {
                '(' => depth += 1,
                ')' => {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                }
                _ => {}
            }
            if depth != 0 {
                j += 1;
                continue;
            }
            if self.is_logic_op_at(j) {
                break;
            }
            if let Some(&(sym, op)) = CMP_OPS
                .iter()
                .find(|(sym, _)| self.starts_with_at(j, sym))
            {
                found = Some((j, sym, op));
                break;
            }
            j += 1;
        }

        let Some((op_index, sym, op)) = found else {
            return Ok(None);
        };

        let after_op = op_index + sym.len();
        let mut end = self.chars.len();
        let mut depth = 0usize;
        let mut k = after_op;
        while k < self.chars.len() {
            match self.chars[k] {
                '(' => depth += 1,
                ')' => {
                    if depth == 0 {
                        end = k;
                        break;
                    }
                    depth -= 1;
                }
                _ => {
                    if depth == 0 && self.is_logic_op_at(k) {
                        end = k;
                        break;
                    }
                }
            }
            k += 1;
        }

        let left_text = self.slice(self.pos, op_index);
        let right_text = self.slice(after_op, end);
        let left = parse_guard_term(left_text.trim(), self.pos)?;
        let right = parse_guard_term(right_text.trim(), after_op)?;
        self.pos = end;
        Ok(Some(BoolExpr::Cmp { op, left, right }))
    }

    fn is_logic_op_at(&self, pos: usize) -> bool {
        LOGIC_SYMS.iter().any(|sym| self.starts_with_at(pos, sym))
            || LOGIC_WORDS.iter().any(|word| self.word_at(pos, word))
    }

    fn parse_bool_var(&mut self) -> Result<BoolExpr, ParseError> {
        self.skip_ws();
        let start = self.pos;
        match self.chars.get(self.pos) {
            Some(c) if c.is_ascii_alphabetic() || *c == '_' => self.pos += 1,
            _ => return Err(ParseError::new("Expected identifier", self.pos)),
        }
        while matches!(self.chars.get(self.pos), Some(c) if is_ident_part(*c)) {
            self.pos += 1;
        }
        let name = self.slice(start, self.pos);
        if name.chars().next().is_some_and(|c| c.is_ascii_uppercase()) {
            return Err(ParseError::new(
                format!(
                    "Variable names must start with lowercase letter, got '{}'",
                    name
                ),
                start,
            ));
        }
        let save = self.pos;
        self.skip_ws();
        if self.chars.get(self.pos) == Some(&':') {
            self.pos += 1;
            self.skip_ws();
            let t_start = self.pos;
            while matches!(self.chars.get(self.pos), Some(c) if c.is_ascii_alphabetic()) {
                self.pos += 1;
            }
            let word = self.slice(t_start, self.pos);
            match TokenType::from_annotation(&word) {
                Some(ty) => {
                    return Ok(BoolExpr::Var {
                        name,
                        var_type: Some(ty),
                    })
                }
                None => self.pos = save,
            }
        } else {
            self.pos = save;
        }
        Ok(BoolExpr::Var {
            name,
            var_type: None,
        })
    }
}

fn split_top_level_commas(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for ch in text.chars() {
        match ch {
            '(' | '[' => {
                depth += 1;
                current.push(ch);
            }
            ')' | ']' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if depth == 0 => {
                parts.push(current.trim().to_string());
                current = String::new();
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

/// Parses one comparison side: a boolean literal, a pair of terms, or an
/// arithmetic expression.
fn parse_guard_term(text: &str, position: usize) -> Result<GuardTerm, ParseError> {
    let term = text.trim();
    if term == "T" || term.eq_ignore_ascii_case("true") {
        return Ok(GuardTerm::Bool(true));
    }
    if term == "F" || term.eq_ignore_ascii_case("false") {
        return Ok(GuardTerm::Bool(false));
    }
    if term.starts_with('(') && term.ends_with(')') {
        let inner = &term[1..term.len() - 1];
        let parts = split_top_level_commas(inner);
        if parts.len() == 2 && !parts[0].is_empty() && !parts[1].is_empty() {
            let fst = parse_guard_term(&parts[0], position)?;
            let snd = parse_guard_term(&parts[1], position)?;
            return Ok(GuardTerm::Pair(Box::new(fst), Box::new(snd)));
        }
    }
    match parse_arithmetic(term) {
        Ok(expr) => Ok(GuardTerm::Expr(expr)),
        Err(_) => Err(ParseError::new(
            format!("Unrecognized term '{}'", term),
            position,
        )),
    }
}

// --- Stringification ---

impl fmt::Display for GuardTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardTerm::Bool(v) => write!(f, "{}", if *v { "T" } else { "F" }),
            GuardTerm::Expr(expr) => write!(f, "{}", expr),
            GuardTerm::Pair(fst, snd) => write!(f, "({}, {})", fst, snd),
        }
    }
}

impl fmt::Display for BoolExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoolExpr::Lit(v) => write!(f, "{}", if *v { "T" } else { "F" }),
            BoolExpr::Var { name, var_type } => match var_type {
                Some(ty) => write!(f, "{}:{}", name, ty.annotation()),
                None => write!(f, "{}", name),
            },
            BoolExpr::Not(inner) => write!(f, "!{}", inner),
            BoolExpr::And(l, r) => write!(f, "({} && {})", l, r),
            BoolExpr::Or(l, r) => write!(f, "({} || {})", l, r),
            BoolExpr::Xor(l, r) => write!(f, "({} ^ {})", l, r),
            BoolExpr::Implies(l, r) => write!(f, "({} -> {})", l, r),
            BoolExpr::Iff(l, r) => write!(f, "({} <-> {})", l, r),
            BoolExpr::Cmp { op, left, right } => {
                write!(f, "{} {} {}", left, op.symbol(), right)
            }
            BoolExpr::Call { name, args } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

pub fn stringify_guard(guard: &BoolExpr) -> String {
    guard.to_string()
}
