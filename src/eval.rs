use crate::expr::{parse_arithmetic, BinOp, Expr};
use crate::guard::{BoolExpr, CmpOp, GuardTerm};
use crate::pattern::Pattern;
use crate::token::{Environment, Token};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("Unbound variable '{0}'")]
    UnboundVariable(String),
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Unknown function '{0}'")]
    UnknownFunction(String),
    #[error("{0}")]
    TypeMismatch(String),
    #[error("Malformed action '{0}'")]
    MalformedAction(String),
}

/// All integer arithmetic wraps to 32 bits, matching the editor's numeric
/// model. Division truncates toward zero.
fn trunc32(v: i64) -> i64 {
    v as i32 as i64
}

// --- Arithmetic Evaluation ---

pub fn evaluate_expr(expr: &Expr, env: &Environment) -> Result<Token, EvalError> {
    match expr {
        Expr::Int(v) => Ok(Token::Int(trunc32(*v))),
        Expr::Str(s) => Ok(Token::Str(s.clone())),
        Expr::List(items) => items
            .iter()
            .map(|e| evaluate_expr(e, env))
            .collect::<Result<Vec<_>, _>>()
            .map(Token::List),
        Expr::Pair(fst, snd) => Ok(Token::pair(
            evaluate_expr(fst, env)?,
            evaluate_expr(snd, env)?,
        )),
        Expr::Var { name, .. } => env
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::UnboundVariable(name.clone())),
        Expr::BinOp { op, left, right } => {
            let a = evaluate_expr(left, env)?;
            let b = evaluate_expr(right, env)?;
            let (Some(a), Some(b)) = (a.as_int(), b.as_int()) else {
                return Err(EvalError::TypeMismatch(
                    "Arithmetic operands must be ints".to_string(),
                ));
            };
            let result = match op {
                BinOp::Add => a.wrapping_add(b),
                BinOp::Sub => a.wrapping_sub(b),
                BinOp::Mul => a.wrapping_mul(b),
                BinOp::Div => {
                    if b == 0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    a.wrapping_div(b)
                }
            };
            Ok(Token::Int(trunc32(result)))
        }
        Expr::Call { name, args } => {
            let values = args
                .iter()
                .map(|a| evaluate_expr(a, env))
                .collect::<Result<Vec<_>, _>>()?;
            apply_function(name, values)
        }
    }
}

fn apply_function(name: &str, args: Vec<Token>) -> Result<Token, EvalError> {
    let arity_error = || EvalError::UnknownFunction(name.to_string());
    match (name, args.as_slice()) {
        ("concat", [Token::Str(a), Token::Str(b)]) => Ok(Token::Str(format!("{}{}", a, b))),
        ("concat", [Token::List(a), Token::List(b)]) => {
            let mut joined = a.clone();
            joined.extend(b.iter().cloned());
            Ok(Token::List(joined))
        }
        ("concat", args) if args.len() == 2 => Err(EvalError::TypeMismatch(
            "concat requires two strings or two lists".to_string(),
        )),
        ("substring", [Token::Str(s), Token::Int(start), Token::Int(len)]) => {
            Ok(Token::Str(js_substr(s, *start, *len)))
        }
        ("substring", args) if args.len() == 3 => Err(EvalError::TypeMismatch(
            "substring requires string, int, int".to_string(),
        )),
        ("length", [Token::Str(s)]) => Ok(Token::Int(s.chars().count() as i64)),
        ("length", [Token::List(items)]) => Ok(Token::Int(items.len() as i64)),
        ("length", args) if args.len() == 1 => Err(EvalError::TypeMismatch(
            "length requires string or list".to_string(),
        )),
        ("isSubstringOf", [Token::Str(sub), Token::Str(s)]) => Ok(Token::Bool(s.contains(sub))),
        ("isSubstringOf", args) if args.len() == 2 => Err(EvalError::TypeMismatch(
            "isSubstringOf requires two strings".to_string(),
        )),
        ("head", [Token::List(items)]) => items
            .first()
            .cloned()
            .ok_or_else(|| EvalError::TypeMismatch("head requires non-empty list".to_string())),
        ("head", args) if args.len() == 1 => Err(EvalError::TypeMismatch(
            "head requires non-empty list".to_string(),
        )),
        ("tail", [Token::List(items)]) => Ok(Token::List(
            items.iter().skip(1).cloned().collect(),
        )),
        ("tail", args) if args.len() == 1 => {
            Err(EvalError::TypeMismatch("tail requires list".to_string()))
        }
        ("append", [Token::List(items), element]) => {
            let mut extended = items.clone();
            extended.push(element.clone());
            Ok(Token::List(extended))
        }
        ("append", args) if args.len() == 2 => {
            Err(EvalError::TypeMismatch("append requires list".to_string()))
        }
        ("sublist", [Token::List(items), Token::Int(start), Token::Int(len)]) => {
            Ok(Token::List(js_slice(items, *start, *start + *len)))
        }
        ("sublist", args) if args.len() == 3 => Err(EvalError::TypeMismatch(
            "sublist requires list, int, int".to_string(),
        )),
        ("isSublistOf", [Token::List(sub), Token::List(items)]) => {
            Ok(Token::Bool(is_contiguous_sublist(sub, items)))
        }
        ("isSublistOf", args) if args.len() == 2 => Err(EvalError::TypeMismatch(
            "isSublistOf requires two lists".to_string(),
        )),
        ("fst", [Token::Pair { fst, .. }]) => Ok((**fst).clone()),
        ("fst", args) if args.len() == 1 => {
            Err(EvalError::TypeMismatch("fst requires pair".to_string()))
        }
        ("snd", [Token::Pair { snd, .. }]) => Ok((**snd).clone()),
        ("snd", args) if args.len() == 1 => {
            Err(EvalError::TypeMismatch("snd requires pair".to_string()))
        }
        _ => Err(arity_error()),
    }
}

/// `substr(start, len)` semantics: a negative start counts from the end,
/// the result is clamped to the string.
fn js_substr(s: &str, start: i64, len: i64) -> String {
    let chars: Vec<char> = s.chars().collect();
    let total = chars.len() as i64;
    let begin = if start < 0 {
        (total + start).max(0)
    } else {
        start.min(total)
    };
    let take = len.max(0).min(total - begin);
    chars[begin as usize..(begin + take) as usize]
        .iter()
        .collect()
}

/// `slice(start, end)` semantics: negative indices count from the end, an
/// inverted range is empty.
fn js_slice(items: &[Token], start: i64, end: i64) -> Vec<Token> {
    let total = items.len() as i64;
    let resolve = |idx: i64| {
        if idx < 0 {
            (total + idx).max(0)
        } else {
            idx.min(total)
        }
    };
    let begin = resolve(start);
    let finish = resolve(end);
    if finish <= begin {
        return Vec::new();
    }
    items[begin as usize..finish as usize].to_vec()
}

fn is_contiguous_sublist(sub: &[Token], items: &[Token]) -> bool {
    if sub.is_empty() {
        return true;
    }
    if sub.len() > items.len() {
        return false;
    }
    items.windows(sub.len()).any(|window| window == sub)
}

// --- Guard Evaluation ---

pub fn evaluate_guard(guard: &BoolExpr, env: &Environment) -> Result<bool, EvalError> {
    match guard {
        BoolExpr::Lit(v) => Ok(*v),
        BoolExpr::Var { name, .. } => {
            let value = env
                .get(name)
                .ok_or_else(|| EvalError::UnboundVariable(name.clone()))?;
            token_truthiness(value)
        }
        BoolExpr::Not(inner) => Ok(!evaluate_guard(inner, env)?),
        BoolExpr::And(l, r) => {
            if !evaluate_guard(l, env)? {
                Ok(false)
            } else {
                evaluate_guard(r, env)
            }
        }
        BoolExpr::Or(l, r) => {
            if evaluate_guard(l, env)? {
                Ok(true)
            } else {
                evaluate_guard(r, env)
            }
        }
        BoolExpr::Xor(l, r) => Ok(evaluate_guard(l, env)? != evaluate_guard(r, env)?),
        BoolExpr::Implies(l, r) => {
            let left = evaluate_guard(l, env)?;
            let right = evaluate_guard(r, env)?;
            Ok(!left || right)
        }
        BoolExpr::Iff(l, r) => Ok(evaluate_guard(l, env)? == evaluate_guard(r, env)?),
        BoolExpr::Cmp { op, left, right } => {
            let a = evaluate_guard_term(left, env)?;
            let b = evaluate_guard_term(right, env)?;
            compare_tokens(*op, &a, &b)
        }
        BoolExpr::Call { name, args } => {
            let values = args
                .iter()
                .map(|a| evaluate_expr(a, env))
                .collect::<Result<Vec<_>, _>>()?;
            match apply_function(name, values)? {
                Token::Bool(v) => Ok(v),
                _ => Err(EvalError::TypeMismatch(format!(
                    "{} is not a boolean function",
                    name
                ))),
            }
        }
    }
}

fn evaluate_guard_term(term: &GuardTerm, env: &Environment) -> Result<Token, EvalError> {
    match term {
        GuardTerm::Bool(v) => Ok(Token::Bool(*v)),
        GuardTerm::Expr(expr) => evaluate_expr(expr, env),
        GuardTerm::Pair(fst, snd) => Ok(Token::pair(
            evaluate_guard_term(fst, env)?,
            evaluate_guard_term(snd, env)?,
        )),
    }
}

fn token_truthiness(value: &Token) -> Result<bool, EvalError> {
    match value {
        Token::Bool(v) => Ok(*v),
        Token::Int(v) => Ok(*v != 0),
        Token::Pair { .. } => Ok(true),
        _ => Err(EvalError::TypeMismatch(
            "Non-bool binding in bool expression".to_string(),
        )),
    }
}

/// Equality is structural for every token shape. Ordering is defined for
/// ints (numeric) and strings (lexicographic) only.
fn compare_tokens(op: CmpOp, a: &Token, b: &Token) -> Result<bool, EvalError> {
    match op {
        CmpOp::Eq => Ok(a == b),
        CmpOp::Ne => Ok(a != b),
        _ => {
            let ordering = match (a, b) {
                (Token::Int(x), Token::Int(y)) => x.cmp(y),
                (Token::Str(x), Token::Str(y)) => x.cmp(y),
                _ => {
                    return Err(EvalError::TypeMismatch(format!(
                        "Cannot order {} and {}",
                        a, b
                    )))
                }
            };
            Ok(match op {
                CmpOp::Lt => ordering.is_lt(),
                CmpOp::Le => ordering.is_le(),
                CmpOp::Gt => ordering.is_gt(),
                CmpOp::Ge => ordering.is_ge(),
                CmpOp::Eq | CmpOp::Ne => unreachable!(),
            })
        }
    }
}

// --- Pattern Construction ---

/// Builds a token from a pattern used in output position: literals produce
/// themselves, variables look up the environment, pairs/tuples/lists build
/// composites. Tuple construction yields a list token.
pub fn evaluate_pattern_literal(pattern: &Pattern, env: &Environment) -> Result<Token, EvalError> {
    match pattern {
        Pattern::Int(v) => Ok(Token::Int(trunc32(*v))),
        Pattern::Bool(v) => Ok(Token::Bool(*v)),
        Pattern::Var { name, .. } => env
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::UnboundVariable(name.clone())),
        Pattern::Pair(fst, snd) => Ok(Token::pair(
            evaluate_pattern_literal(fst, env)?,
            evaluate_pattern_literal(snd, env)?,
        )),
        Pattern::Tuple(elements) | Pattern::List(elements) => elements
            .iter()
            .map(|e| evaluate_pattern_literal(e, env))
            .collect::<Result<Vec<_>, _>>()
            .map(Token::List),
    }
}

// --- Actions ---

/// Evaluates a transition's action text, a comma-separated assignment list
/// like `y = x + 1, z = x - 1`, against the firing environment. The results
/// are diagnostic only and never touch the marking.
pub fn evaluate_action(action: &str, env: &Environment) -> Result<Vec<(String, Token)>, EvalError> {
    let mut results = Vec::new();
    for clause in action.split(',') {
        let clause = clause.trim();
        if clause.is_empty() {
            continue;
        }
        let Some((name, rhs)) = clause.split_once('=') else {
            return Err(EvalError::MalformedAction(clause.to_string()));
        };
        let name = name.trim();
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(EvalError::MalformedAction(clause.to_string()));
        }
        let ast = parse_arithmetic(rhs.trim())
            .map_err(|_| EvalError::MalformedAction(clause.to_string()))?;
        let value = evaluate_expr(&ast, env)?;
        results.push((name.to_string(), value));
    }
    Ok(results)
}
