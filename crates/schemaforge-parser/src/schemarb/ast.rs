//! Call tree for Rails schema files.

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Sym(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Nil,
    Array(Vec<Value>),
    Hash(Vec<(String, Value)>),
    /// `-> { ... }`; holds the body's source text
    Lambda(String),
    /// Any other expression, as written
    Expr(String),
}

impl Value {
    /// Text of a string or symbol
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Str(s) | Value::Sym(s) => Some(s),
            _ => None,
        }
    }
}

/// `do |params| ... end` or `{ |params| ... }`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub params: Vec<String>,
    pub body: Vec<Call>,
}

/// A method call such as `t.string "name", null: false`
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    /// Receiver path (`t`, `ActiveRecord::Schema[7.1]`), if any
    pub receiver: Option<String>,
    pub name: String,
    pub args: Vec<Value>,
    /// Keyword arguments in source order
    pub options: Vec<(String, Value)>,
    pub block: Option<Block>,
    pub start: usize,
}

impl Call {
    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Positional string arguments
    pub fn strings(&self) -> impl Iterator<Item = &str> {
        self.args.iter().filter_map(|arg| match arg {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        })
    }
}
