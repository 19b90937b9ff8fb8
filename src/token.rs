use serde::de::Error as DeError;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

// --- Token Value Model ---

/// A single algebraic token. Places hold ordered sequences of these; arc
/// bindings and guards bind them to variables.
///
/// The JSON wire format is the plain value for scalars and lists, and
/// `{"__pair__": true, "fst": ..., "snd": ...}` for pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Int(i64),
    Bool(bool),
    Str(String),
    Pair { fst: Box<Token>, snd: Box<Token> },
    List(Vec<Token>),
}

/// Runtime type of a token, used for `x:Int`-style typed bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    Int,
    Bool,
    Str,
    Pair,
    List,
}

impl TokenType {
    /// Parses a type annotation word (case-insensitive). Accepts the long
    /// form `boolean` as well, which older nets use in binding text.
    pub fn from_annotation(word: &str) -> Option<TokenType> {
        match word.to_ascii_lowercase().as_str() {
            "int" => Some(TokenType::Int),
            "bool" | "boolean" => Some(TokenType::Bool),
            "string" => Some(TokenType::Str),
            "pair" => Some(TokenType::Pair),
            "list" => Some(TokenType::List),
            _ => None,
        }
    }

    pub fn annotation(&self) -> &'static str {
        match self {
            TokenType::Int => "int",
            TokenType::Bool => "bool",
            TokenType::Str => "string",
            TokenType::Pair => "pair",
            TokenType::List => "list",
        }
    }
}

impl Token {
    pub fn pair(fst: Token, snd: Token) -> Token {
        Token::Pair {
            fst: Box::new(fst),
            snd: Box::new(snd),
        }
    }

    pub fn token_type(&self) -> TokenType {
        match self {
            Token::Int(_) => TokenType::Int,
            Token::Bool(_) => TokenType::Bool,
            Token::Str(_) => TokenType::Str,
            Token::Pair { .. } => TokenType::Pair,
            Token::List(_) => TokenType::List,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Token::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Token::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Int(v) => write!(f, "{}", v),
            Token::Bool(v) => write!(f, "{}", if *v { "T" } else { "F" }),
            Token::Str(s) => write!(f, "'{}'", s),
            Token::Pair { fst, snd } => write!(f, "({}, {})", fst, snd),
            Token::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

// --- Wire Format ---

impl Serialize for Token {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Token::Int(v) => serializer.serialize_i64(*v),
            Token::Bool(v) => serializer.serialize_bool(*v),
            Token::Str(s) => serializer.serialize_str(s),
            Token::Pair { fst, snd } => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("__pair__", &true)?;
                map.serialize_entry("fst", fst.as_ref())?;
                map.serialize_entry("snd", snd.as_ref())?;
                map.end()
            }
            Token::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Token {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Token, D::Error> {
        let value = Value::deserialize(deserializer)?;
        token_from_value(&value).map_err(D::Error::custom)
    }
}

fn token_from_value(value: &Value) -> Result<Token, String> {
    match value {
        Value::Bool(b) => Ok(Token::Bool(*b)),
        Value::Number(n) => n
            .as_i64()
            .map(Token::Int)
            .ok_or_else(|| format!("token numbers must be integers, got {}", n)),
        Value::String(s) => Ok(Token::Str(s.clone())),
        Value::Array(items) => items
            .iter()
            .map(token_from_value)
            .collect::<Result<Vec<_>, _>>()
            .map(Token::List),
        Value::Object(map) => {
            if map.get("__pair__").and_then(Value::as_bool) != Some(true) {
                return Err("token objects must carry \"__pair__\": true".to_string());
            }
            let fst = map
                .get("fst")
                .ok_or_else(|| "pair token is missing \"fst\"".to_string())?;
            let snd = map
                .get("snd")
                .ok_or_else(|| "pair token is missing \"snd\"".to_string())?;
            Ok(Token::pair(token_from_value(fst)?, token_from_value(snd)?))
        }
        Value::Null => Err("null is not a valid token".to_string()),
    }
}

// --- Variable Environment ---

/// Variable-to-token mapping accumulated during assignment search.
///
/// Insertion order is preserved: the weight-fallback production rule reads
/// "the first value of the environment", meaning the first variable bound.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Environment {
    entries: Vec<(String, Token)>,
}

impl Environment {
    pub fn new() -> Environment {
        Environment::default()
    }

    pub fn get(&self, name: &str) -> Option<&Token> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Binds `name` to `value`. Returns false (and leaves the environment
    /// untouched) when the name is already bound to a different value; a
    /// rebinding to an identical value is accepted.
    pub fn bind(&mut self, name: &str, value: Token) -> bool {
        match self.get(name) {
            Some(existing) => *existing == value,
            None => {
                self.entries.push((name.to_string(), value));
                true
            }
        }
    }

    pub fn first_value(&self) -> Option<&Token> {
        self.entries.first().map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Token)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
