//! Expression tree for Drizzle schema modules.

#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    /// Literal text between substitutions
    pub quasis: Vec<String>,
    /// Source text between the backticks
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub key: String,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Ident(String),
    Str(String),
    Num(f64),
    Bool(bool),
    Null,
    Template(Template),
    TaggedTemplate { tag: Box<Expr>, template: Template },
    Call { callee: Box<Expr>, args: Vec<Expr> },
    Member { object: Box<Expr>, property: String },
    Object(Vec<Property>),
    Array(Vec<Expr>),
    Arrow { params: Vec<String>, body: Box<Expr> },
    New { callee: Box<Expr>, args: Vec<Expr> },
    Unary { op: String, operand: Box<Expr> },
    Binary { op: String, left: Box<Expr>, right: Box<Expr> },
    Conditional { test: Box<Expr>, consequent: Box<Expr>, alternate: Box<Expr> },
}

/// One `.name(args)` link of a method chain
#[derive(Debug, Clone, Copy)]
pub struct MethodCall<'a> {
    pub name: &'a str,
    pub args: &'a [Expr],
}

impl Expr {
    /// String value of a string literal or a template without substitutions
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Expr::Str(s) => Some(s),
            Expr::Template(t) if t.quasis.len() == 1 => Some(&t.raw),
            _ => None,
        }
    }

    pub fn as_ident(&self) -> Option<&str> {
        match self {
            Expr::Ident(name) => Some(name),
            _ => None,
        }
    }

    /// Property lookup on an object literal
    pub fn get(&self, key: &str) -> Option<&Expr> {
        match self {
            Expr::Object(props) => props.iter().find(|p| p.key == key).map(|p| &p.value),
            _ => None,
        }
    }

    /// `object.property` where the object is a plain identifier
    pub fn as_member_of_ident(&self) -> Option<(&str, &str)> {
        match self {
            Expr::Member { object, property } => object.as_ident().map(|o| (o, property.as_str())),
            _ => None,
        }
    }

    /// Split `root(...).a(...).b(...)` into the root expression and the
    /// chained calls in source order
    pub fn method_chain(&self) -> (&Expr, Vec<MethodCall<'_>>) {
        let mut methods = Vec::new();
        let mut current = self;
        while let Expr::Call { callee, args } = current {
            match callee.as_ref() {
                Expr::Member { object, property } if matches!(object.as_ref(), Expr::Call { .. }) => {
                    methods.push(MethodCall { name: property, args });
                    current = object;
                }
                _ => break,
            }
        }
        methods.reverse();
        (current, methods)
    }

    /// Callee and arguments of a call expression
    pub fn as_call(&self) -> Option<(&Expr, &[Expr])> {
        match self {
            Expr::Call { callee, args } => Some((callee, args)),
            _ => None,
        }
    }

    /// Body of an arrow function, or the expression itself
    pub fn arrow_body(&self) -> &Expr {
        match self {
            Expr::Arrow { body, .. } => body,
            other => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Const { name: String, exported: bool, init: Expr },
    ExportDefault(Expr),
}
