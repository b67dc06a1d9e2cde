//! Prisma Schema Language lexer and parser.
//!
//! Produces a thin syntax tree: blocks, fields and attributes with their
//! raw arguments. Interpretation happens in [`super::dmmf`].

use std::iter::Peekable;
use std::str::Chars;

/// PSL syntax failure
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("line {line}: {message}")]
pub struct PslError {
    pub message: String,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Str(String),
    Num(String),
    Doc(String),
    At,
    AtAt,
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Question,
    Equals,
    Dot,
    Newline,
}

struct PslLexer<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
}

impl<'a> PslLexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            line: 1,
        }
    }

    fn tokenize(mut self) -> Result<Vec<(Tok, usize)>, PslError> {
        let mut tokens = Vec::new();
        while let Some(&c) = self.chars.peek() {
            let line = self.line;
            let tok = match c {
                '\n' => {
                    self.chars.next();
                    self.line += 1;
                    Tok::Newline
                }
                c if c.is_whitespace() => {
                    self.chars.next();
                    continue;
                }
                '/' => {
                    self.chars.next();
                    if self.chars.next() != Some('/') {
                        return Err(PslError {
                            message: "unexpected '/'".to_string(),
                            line,
                        });
                    }
                    let doc = self.chars.peek() == Some(&'/');
                    if doc {
                        self.chars.next();
                    }
                    let mut text = String::new();
                    while let Some(&c) = self.chars.peek() {
                        if c == '\n' {
                            break;
                        }
                        text.push(c);
                        self.chars.next();
                    }
                    if !doc {
                        continue;
                    }
                    Tok::Doc(text.trim().to_string())
                }
                '"' => {
                    self.chars.next();
                    Tok::Str(self.read_string(line)?)
                }
                '@' => {
                    self.chars.next();
                    if self.chars.peek() == Some(&'@') {
                        self.chars.next();
                        Tok::AtAt
                    } else {
                        Tok::At
                    }
                }
                '{' => self.single(Tok::LBrace),
                '}' => self.single(Tok::RBrace),
                '(' => self.single(Tok::LParen),
                ')' => self.single(Tok::RParen),
                '[' => self.single(Tok::LBracket),
                ']' => self.single(Tok::RBracket),
                ',' => self.single(Tok::Comma),
                ':' => self.single(Tok::Colon),
                '?' => self.single(Tok::Question),
                '=' => self.single(Tok::Equals),
                '.' => self.single(Tok::Dot),
                c if c.is_ascii_digit() || c == '-' => {
                    let mut num = String::new();
                    while let Some(&c) = self.chars.peek() {
                        if c.is_ascii_digit() || c == '.' || c == '-' || c == 'e' || c == 'E' {
                            num.push(c);
                            self.chars.next();
                        } else {
                            break;
                        }
                    }
                    Tok::Num(num)
                }
                c if c.is_alphabetic() || c == '_' => {
                    let mut ident = String::new();
                    while let Some(&c) = self.chars.peek() {
                        if c.is_alphanumeric() || c == '_' {
                            ident.push(c);
                            self.chars.next();
                        } else {
                            break;
                        }
                    }
                    Tok::Ident(ident)
                }
                other => {
                    return Err(PslError {
                        message: format!("unexpected character '{}'", other),
                        line,
                    })
                }
            };
            tokens.push((tok, line));
        }
        Ok(tokens)
    }

    fn single(&mut self, tok: Tok) -> Tok {
        self.chars.next();
        tok
    }

    fn read_string(&mut self, line: usize) -> Result<String, PslError> {
        let mut value = String::new();
        while let Some(c) = self.chars.next() {
            match c {
                '"' => return Ok(value),
                '\\' => match self.chars.next() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some(other) => value.push(other),
                    None => break,
                },
                '\n' => break,
                c => value.push(c),
            }
        }
        Err(PslError {
            message: "unterminated string".to_string(),
            line,
        })
    }
}

/// Attribute argument value
#[derive(Debug, Clone, PartialEq)]
pub enum PslValue {
    String(String),
    Number(String),
    Boolean(bool),
    /// Bare identifier, possibly dotted (`Cascade`, `db.Uuid`)
    Ident(String),
    Function { name: String, args: Vec<PslArgument> },
    Array(Vec<PslValue>),
}

impl PslValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::Ident(s) => Some(s),
            _ => None,
        }
    }

    /// Names listed in an array such as `[a, b(sort: Desc)]`
    pub fn names(&self) -> Vec<String> {
        match self {
            Self::Array(items) => items
                .iter()
                .filter_map(|item| match item {
                    Self::Ident(name) | Self::Function { name, .. } => Some(name.clone()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PslArgument {
    pub name: Option<String>,
    pub value: PslValue,
}

/// `@name(args)` or `@@name(args)`
#[derive(Debug, Clone, PartialEq)]
pub struct PslAttribute {
    pub name: String,
    pub args: Vec<PslArgument>,
}

impl PslAttribute {
    /// Argument passed by name
    pub fn arg(&self, name: &str) -> Option<&PslValue> {
        self.args
            .iter()
            .find(|a| a.name.as_deref() == Some(name))
            .map(|a| &a.value)
    }

    pub fn positional(&self, index: usize) -> Option<&PslValue> {
        self.args
            .iter()
            .filter(|a| a.name.is_none())
            .nth(index)
            .map(|a| &a.value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PslField {
    pub name: String,
    pub type_name: String,
    pub optional: bool,
    pub list: bool,
    pub attributes: Vec<PslAttribute>,
    pub documentation: Option<String>,
}

impl PslField {
    pub fn attribute(&self, name: &str) -> Option<&PslAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PslModel {
    pub name: String,
    pub fields: Vec<PslField>,
    pub attributes: Vec<PslAttribute>,
    pub documentation: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PslEnum {
    pub name: String,
    pub values: Vec<String>,
    pub db_name: Option<String>,
    pub documentation: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PslSchema {
    pub models: Vec<PslModel>,
    pub enums: Vec<PslEnum>,
}

/// Parse Prisma Schema Language text
pub fn parse_schema(input: &str) -> Result<PslSchema, PslError> {
    let tokens = PslLexer::new(input).tokenize()?;
    PslParser { tokens, pos: 0 }.parse()
}

struct PslParser {
    tokens: Vec<(Tok, usize)>,
    pos: usize,
}

impl PslParser {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|(_, l)| *l)
            .unwrap_or(1)
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn error<T>(&self, message: impl Into<String>) -> Result<T, PslError> {
        Err(PslError {
            message: message.into(),
            line: self.line(),
        })
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Tok) -> Result<(), PslError> {
        if self.eat(&tok) {
            Ok(())
        } else {
            self.error(format!("expected {:?}, found {:?}", tok, self.peek()))
        }
    }

    fn ident(&mut self) -> Result<String, PslError> {
        match self.next() {
            Some(Tok::Ident(name)) => Ok(name),
            other => {
                self.pos = self.pos.saturating_sub(usize::from(other.is_some()));
                self.error(format!("expected identifier, found {:?}", other))
            }
        }
    }

    /// Dotted identifier such as `db.VarChar`
    fn dotted_ident(&mut self) -> Result<String, PslError> {
        let mut name = self.ident()?;
        while self.eat(&Tok::Dot) {
            name.push('.');
            name.push_str(&self.ident()?);
        }
        Ok(name)
    }

    fn skip_newlines(&mut self) {
        while self.eat(&Tok::Newline) {}
    }

    /// Consume doc comments and blank lines, returning the doc text
    fn take_docs(&mut self) -> Option<String> {
        let mut docs = Vec::new();
        loop {
            match self.peek() {
                Some(Tok::Newline) => self.pos += 1,
                Some(Tok::Doc(text)) => {
                    docs.push(text.clone());
                    self.pos += 1;
                }
                _ => break,
            }
        }
        (!docs.is_empty()).then(|| docs.join("\n"))
    }

    fn parse(mut self) -> Result<PslSchema, PslError> {
        let mut schema = PslSchema::default();
        loop {
            let documentation = self.take_docs();
            let keyword = match self.next() {
                None => return Ok(schema),
                Some(Tok::Ident(keyword)) => keyword,
                Some(other) => return self.error(format!("expected block declaration, found {:?}", other)),
            };
            match keyword.as_str() {
                "model" | "view" => {
                    let mut model = self.parse_model()?;
                    model.documentation = documentation;
                    schema.models.push(model);
                }
                "enum" => {
                    let mut value = self.parse_enum()?;
                    value.documentation = documentation;
                    schema.enums.push(value);
                }
                "datasource" | "generator" | "type" => {
                    self.ident()?;
                    self.skip_block()?;
                }
                other => return self.error(format!("unknown block type '{}'", other)),
            }
        }
    }

    fn skip_block(&mut self) -> Result<(), PslError> {
        self.expect(Tok::LBrace)?;
        let mut depth = 1;
        while let Some(tok) = self.next() {
            match tok {
                Tok::LBrace => depth += 1,
                Tok::RBrace => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                _ => {}
            }
        }
        self.error("unterminated block")
    }

    fn parse_model(&mut self) -> Result<PslModel, PslError> {
        let name = self.ident()?;
        self.expect(Tok::LBrace)?;

        let mut fields = Vec::new();
        let mut attributes = Vec::new();
        loop {
            let documentation = self.take_docs();
            match self.peek() {
                Some(Tok::RBrace) => {
                    self.pos += 1;
                    break;
                }
                Some(Tok::AtAt) => {
                    self.pos += 1;
                    attributes.push(self.parse_attribute_body()?);
                }
                Some(Tok::Ident(_)) => {
                    let mut field = self.parse_field()?;
                    field.documentation = documentation;
                    fields.push(field);
                }
                None => return self.error(format!("unterminated model {}", name)),
                other => return self.error(format!("unexpected {:?} in model {}", other, name)),
            }
            // trailing doc comment on the same line
            while matches!(self.peek(), Some(Tok::Doc(_))) {
                self.pos += 1;
            }
            if !matches!(self.peek(), Some(Tok::RBrace)) {
                self.expect(Tok::Newline)?;
            }
        }

        Ok(PslModel {
            name,
            fields,
            attributes,
            documentation: None,
        })
    }

    fn parse_field(&mut self) -> Result<PslField, PslError> {
        let name = self.ident()?;
        let type_name = self.dotted_ident()?;
        // Unsupported("...") carries its native type as an argument
        if self.peek() == Some(&Tok::LParen) {
            self.parse_arguments()?;
        }
        let list = if self.eat(&Tok::LBracket) {
            self.expect(Tok::RBracket)?;
            true
        } else {
            false
        };
        let optional = self.eat(&Tok::Question);

        let mut attributes = Vec::new();
        while self.eat(&Tok::At) {
            attributes.push(self.parse_attribute_body()?);
        }

        Ok(PslField {
            name,
            type_name,
            optional,
            list,
            attributes,
            documentation: None,
        })
    }

    fn parse_attribute_body(&mut self) -> Result<PslAttribute, PslError> {
        let name = self.dotted_ident()?;
        let args = if self.peek() == Some(&Tok::LParen) {
            self.parse_arguments()?
        } else {
            Vec::new()
        };
        Ok(PslAttribute { name, args })
    }

    fn parse_arguments(&mut self) -> Result<Vec<PslArgument>, PslError> {
        self.expect(Tok::LParen)?;
        let mut args = Vec::new();
        self.skip_newlines();
        if self.eat(&Tok::RParen) {
            return Ok(args);
        }
        loop {
            self.skip_newlines();
            let named = matches!(
                (self.peek(), self.tokens.get(self.pos + 1).map(|(t, _)| t)),
                (Some(Tok::Ident(_)), Some(Tok::Colon))
            );
            let name = if named {
                let name = self.ident()?;
                self.expect(Tok::Colon)?;
                Some(name)
            } else {
                None
            };
            let value = self.parse_value()?;
            args.push(PslArgument { name, value });
            self.skip_newlines();
            if self.eat(&Tok::Comma) {
                continue;
            }
            self.expect(Tok::RParen)?;
            return Ok(args);
        }
    }

    fn parse_value(&mut self) -> Result<PslValue, PslError> {
        match self.peek().cloned() {
            Some(Tok::Str(s)) => {
                self.pos += 1;
                Ok(PslValue::String(s))
            }
            Some(Tok::Num(n)) => {
                self.pos += 1;
                Ok(PslValue::Number(n))
            }
            Some(Tok::LBracket) => {
                self.pos += 1;
                let mut items = Vec::new();
                self.skip_newlines();
                if self.eat(&Tok::RBracket) {
                    return Ok(PslValue::Array(items));
                }
                loop {
                    self.skip_newlines();
                    items.push(self.parse_value()?);
                    self.skip_newlines();
                    if self.eat(&Tok::Comma) {
                        continue;
                    }
                    self.expect(Tok::RBracket)?;
                    return Ok(PslValue::Array(items));
                }
            }
            Some(Tok::Ident(_)) => {
                let name = self.dotted_ident()?;
                if self.peek() == Some(&Tok::LParen) {
                    let args = self.parse_arguments()?;
                    return Ok(PslValue::Function { name, args });
                }
                Ok(match name.as_str() {
                    "true" => PslValue::Boolean(true),
                    "false" => PslValue::Boolean(false),
                    _ => PslValue::Ident(name),
                })
            }
            other => self.error(format!("expected value, found {:?}", other)),
        }
    }

    fn parse_enum(&mut self) -> Result<PslEnum, PslError> {
        let name = self.ident()?;
        self.expect(Tok::LBrace)?;

        let mut values = Vec::new();
        let mut db_name = None;
        loop {
            self.take_docs();
            match self.peek() {
                Some(Tok::RBrace) => {
                    self.pos += 1;
                    break;
                }
                Some(Tok::AtAt) => {
                    self.pos += 1;
                    let attribute = self.parse_attribute_body()?;
                    if attribute.name == "map" {
                        db_name = attribute.positional(0).and_then(PslValue::as_str).map(str::to_string);
                    }
                }
                Some(Tok::Ident(_)) => {
                    let value = self.ident()?;
                    let mut mapped = None;
                    while self.eat(&Tok::At) {
                        let attribute = self.parse_attribute_body()?;
                        if attribute.name == "map" {
                            mapped = attribute.positional(0).and_then(PslValue::as_str).map(str::to_string);
                        }
                    }
                    values.push(mapped.unwrap_or(value));
                }
                None => return self.error(format!("unterminated enum {}", name)),
                other => return self.error(format!("unexpected {:?} in enum {}", other, name)),
            }
        }

        Ok(PslEnum {
            name,
            values,
            db_name,
            documentation: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_models_and_attributes() {
        let schema = parse_schema(
            r#"
            datasource db {
              provider = "postgresql"
              url      = env("DATABASE_URL")
            }

            /// A registered user
            model User {
              id    Int     @id @default(autoincrement())
              email String  @unique @db.VarChar(255)
              /// Display name
              name  String? @map("display_name")
              posts Post[]

              @@map("users")
              @@index([email, name(sort: Desc)], type: Hash)
            }
            "#,
        )
        .unwrap();

        let user = &schema.models[0];
        assert_eq!(user.name, "User");
        assert_eq!(user.documentation.as_deref(), Some("A registered user"));
        assert_eq!(user.fields.len(), 4);

        let email = &user.fields[1];
        assert!(email.attribute("unique").is_some());
        let native = email.attribute("db.VarChar").unwrap();
        assert_eq!(native.positional(0), Some(&PslValue::Number("255".into())));

        let name = &user.fields[2];
        assert!(name.optional);
        assert_eq!(name.documentation.as_deref(), Some("Display name"));

        assert!(user.fields[3].list);

        let index = user.attributes.iter().find(|a| a.name == "index").unwrap();
        assert_eq!(index.positional(0).unwrap().names(), vec!["email", "name"]);
        assert_eq!(index.arg("type"), Some(&PslValue::Ident("Hash".into())));
    }

    #[test]
    fn parses_relation_arguments() {
        let schema = parse_schema(
            "model Post {\n  author   User @relation(\"Authored\", fields: [authorId], references: [id], onDelete: Cascade)\n  authorId Int\n}\n",
        )
        .unwrap();
        let relation = schema.models[0].fields[0].attribute("relation").unwrap();
        assert_eq!(relation.positional(0), Some(&PslValue::String("Authored".into())));
        assert_eq!(relation.arg("fields").unwrap().names(), vec!["authorId"]);
        assert_eq!(relation.arg("onDelete"), Some(&PslValue::Ident("Cascade".into())));
    }

    #[test]
    fn parses_enums() {
        let schema = parse_schema("enum Role {\n  USER\n  ADMIN @map(\"admin\")\n  @@map(\"roles\")\n}\n").unwrap();
        assert_eq!(schema.enums[0].values, vec!["USER", "admin"]);
        assert_eq!(schema.enums[0].db_name.as_deref(), Some("roles"));
    }

    #[test]
    fn reports_syntax_errors_with_line() {
        let error = parse_schema("model User {\n  id Int @id\n  email String @default(\"x)\n}\n").unwrap_err();
        assert_eq!(error.line, 3);
    }
}
