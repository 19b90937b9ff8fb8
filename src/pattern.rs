use crate::expr::{is_ident_part, is_ident_start, Cursor, ParseError};
use crate::token::{Environment, Token, TokenType};
use std::fmt;

// --- Pattern AST ---

/// Structural pattern matched against a single token. Variables bind the
/// sub-value at their position; literals and shapes must match exactly.
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Int(i64),
    Bool(bool),
    Var {
        name: String,
        var_type: Option<TokenType>,
    },
    Pair(Box<Pattern>, Box<Pattern>),
    /// `(a, b, c)` with other than two elements. Matches a list token of the
    /// same length element-wise.
    Tuple(Vec<Pattern>),
    List(Vec<Pattern>),
}

// --- Parsing ---

pub fn parse_pattern(input: &str) -> Result<Pattern, ParseError> {
    let mut cur = Cursor::new(input);
    let pattern = parse_element(&mut cur)?;
    cur.skip_ws();
    if !cur.at_end() {
        return Err(cur.error(format!(
            "Unexpected character '{}'",
            cur.peek().unwrap_or_default()
        )));
    }
    Ok(pattern)
}

fn parse_element(cur: &mut Cursor) -> Result<Pattern, ParseError> {
    cur.skip_ws();
    match cur.peek() {
        None => Err(cur.error("Unexpected end of input")),
        Some('T') => {
            cur.bump();
            Ok(Pattern::Bool(true))
        }
        Some('F') => {
            cur.bump();
            Ok(Pattern::Bool(false))
        }
        Some('t') if cur.eat_keyword("true") => Ok(Pattern::Bool(true)),
        Some('f') if cur.eat_keyword("false") => Ok(Pattern::Bool(false)),
        Some(c) if c.is_ascii_digit() => Ok(Pattern::Int(cur.read_int_literal()?)),
        Some('[') => {
            let elements = parse_sequence(cur, '[', ']')?;
            Ok(Pattern::List(elements))
        }
        Some('(') => {
            let mut elements = parse_sequence(cur, '(', ')')?;
            if elements.len() == 2 {
                let snd = elements.pop().unwrap_or(Pattern::Int(0));
                let fst = elements.pop().unwrap_or(Pattern::Int(0));
                Ok(Pattern::Pair(Box::new(fst), Box::new(snd)))
            } else {
                Ok(Pattern::Tuple(elements))
            }
        }
        Some(c) if is_ident_start(c) => parse_variable(cur),
        Some(c) => Err(cur.error(format!("Unexpected character '{}'", c))),
    }
}

fn parse_sequence(cur: &mut Cursor, open: char, close: char) -> Result<Vec<Pattern>, ParseError> {
    cur.eat(open);
    let mut elements = Vec::new();
    loop {
        cur.skip_ws();
        if cur.eat(close) {
            return Ok(elements);
        }
        if cur.at_end() {
            return Err(cur.error(format!("Expected '{}'", close)));
        }
        elements.push(parse_element(cur)?);
        cur.skip_ws();
        cur.eat(',');
    }
}

fn parse_variable(cur: &mut Cursor) -> Result<Pattern, ParseError> {
    let start = cur.pos;
    let mut name = String::new();
    while matches!(cur.peek(), Some(c) if is_ident_part(c)) {
        if let Some(c) = cur.bump() {
            name.push(c);
        }
    }
    if name.is_empty() {
        return Err(ParseError::new("Expected identifier", start));
    }
    cur.skip_ws();
    if cur.eat(':') {
        cur.skip_ws();
        let word_start = cur.pos;
        let mut word = String::new();
        while matches!(cur.peek(), Some(c) if c.is_ascii_alphabetic()) {
            if let Some(c) = cur.bump() {
                word.push(c);
            }
        }
        // Unlike arithmetic expressions, an unknown type in a pattern is a
        // hard error rather than a rollback.
        let var_type = TokenType::from_annotation(&word)
            .ok_or_else(|| ParseError::new(format!("Unknown type '{}'", word), word_start))?;
        return Ok(Pattern::Var {
            name,
            var_type: Some(var_type),
        });
    }
    Ok(Pattern::Var {
        name,
        var_type: None,
    })
}

// --- Matching ---

/// Attempts to match `value` against `pattern`, merging new bindings into
/// `env`. Linear use of a variable is enforced with structural equality:
/// a name appearing twice must bind equal values, including values already
/// present in `env` from earlier arcs.
///
/// On failure `env` may hold partial bindings; callers match against a clone.
pub fn match_pattern(pattern: &Pattern, value: &Token, env: &mut Environment) -> bool {
    match pattern {
        Pattern::Int(expected) => value.as_int() == Some(*expected),
        Pattern::Bool(expected) => value.as_bool() == Some(*expected),
        Pattern::Var { name, var_type } => {
            if let Some(ty) = var_type {
                if value.token_type() != *ty {
                    return false;
                }
            }
            env.bind(name, value.clone())
        }
        Pattern::Pair(fst_pat, snd_pat) => match value {
            Token::Pair { fst, snd } => {
                match_pattern(fst_pat, fst, env) && match_pattern(snd_pat, snd, env)
            }
            _ => false,
        },
        Pattern::Tuple(patterns) | Pattern::List(patterns) => match value {
            Token::List(items) if items.len() == patterns.len() => patterns
                .iter()
                .zip(items)
                .all(|(p, item)| match_pattern(p, item, env)),
            _ => false,
        },
    }
}

// --- Helpers ---

/// Checks that every variable in the pattern carries a type annotation.
/// Returns a human-readable complaint for the first untyped one.
pub fn validate_pattern_typing(pattern: &Pattern) -> Option<String> {
    match pattern {
        Pattern::Var { name, var_type } => var_type.is_none().then(|| {
            format!(
                "Variable '{}' must be typed (e.g., {}:int, {}:bool, {}:pair)",
                name, name, name, name
            )
        }),
        Pattern::Pair(fst, snd) => {
            validate_pattern_typing(fst).or_else(|| validate_pattern_typing(snd))
        }
        Pattern::Tuple(elements) => elements.iter().find_map(validate_pattern_typing),
        Pattern::Int(_) | Pattern::Bool(_) | Pattern::List(_) => None,
    }
}

/// Fills in `default_type` for untyped variables in pair/tuple positions.
pub fn add_type_annotations(pattern: &Pattern, default_type: TokenType) -> Pattern {
    match pattern {
        Pattern::Var { name, var_type } => Pattern::Var {
            name: name.clone(),
            var_type: Some(var_type.unwrap_or(default_type)),
        },
        Pattern::Pair(fst, snd) => Pattern::Pair(
            Box::new(add_type_annotations(fst, default_type)),
            Box::new(add_type_annotations(snd, default_type)),
        ),
        Pattern::Tuple(elements) => Pattern::Tuple(
            elements
                .iter()
                .map(|e| add_type_annotations(e, default_type))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Variable names in pattern order, duplicates included.
pub fn extract_variables(pattern: &Pattern) -> Vec<String> {
    fn walk(pattern: &Pattern, out: &mut Vec<String>) {
        match pattern {
            Pattern::Var { name, .. } => out.push(name.clone()),
            Pattern::Pair(fst, snd) => {
                walk(fst, out);
                walk(snd, out);
            }
            Pattern::Tuple(elements) | Pattern::List(elements) => {
                elements.iter().for_each(|e| walk(e, out));
            }
            Pattern::Int(_) | Pattern::Bool(_) => {}
        }
    }
    let mut out = Vec::new();
    walk(pattern, &mut out);
    out
}

// --- Stringification ---

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Int(v) => write!(f, "{}", v),
            Pattern::Bool(v) => write!(f, "{}", if *v { "T" } else { "F" }),
            Pattern::Var { name, var_type } => match var_type {
                // Pattern annotations print capitalized: `x:Int`, `p:Pair`.
                Some(ty) => {
                    let ann = ty.annotation();
                    let mut chars = ann.chars();
                    match chars.next() {
                        Some(first) => {
                            write!(f, "{}:{}{}", name, first.to_ascii_uppercase(), chars.as_str())
                        }
                        None => write!(f, "{}", name),
                    }
                }
                None => write!(f, "{}", name),
            },
            Pattern::Pair(fst, snd) => write!(f, "({}, {})", fst, snd),
            Pattern::Tuple(elements) => {
                write!(f, "(")?;
                for (i, e) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", e)?;
                }
                write!(f, ")")
            }
            Pattern::List(elements) => {
                write!(f, "[")?;
                for (i, e) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", e)?;
                }
                write!(f, "]")
            }
        }
    }
}

pub fn stringify_pattern(pattern: &Pattern) -> String {
    pattern.to_string()
}
