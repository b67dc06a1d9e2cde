//! Recursive-descent parser for Drizzle schema modules.
//!
//! Only top-level `const` declarations and `export default` are turned
//! into statements. Everything else (imports, type aliases, functions)
//! is skipped token by token.

use super::ast::{Expr, Property, Statement, Template};
use super::lexer::{Lexer, Spanned, Token};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message} at offset {location}")]
pub struct JsSyntaxError {
    pub message: String,
    pub location: usize,
}

#[derive(Debug, Default)]
pub struct ModuleOutput {
    pub statements: Vec<Statement>,
    pub errors: Vec<JsSyntaxError>,
}

/// Parse a module into its top-level declarations
pub fn parse_module(source: &str) -> ModuleOutput {
    let (tokens, lex_error) = Lexer::new(source).tokenize();
    let mut parser = Parser {
        tokens,
        pos: 0,
        eof: source.len(),
    };
    let mut output = parser.parse_statements();
    if let Some(e) = lex_error {
        output.errors.push(JsSyntaxError {
            message: e.message,
            location: e.location,
        });
    }
    output
}

/// Parse a single expression
pub fn parse_expression(source: &str) -> Result<Expr, JsSyntaxError> {
    let (tokens, lex_error) = Lexer::new(source).tokenize();
    if let Some(e) = lex_error {
        return Err(JsSyntaxError {
            message: e.message,
            location: e.location,
        });
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        eof: source.len(),
    };
    let expr = parser.expression()?;
    match parser.peek() {
        None => Ok(expr),
        Some(_) => Err(parser.error("Unexpected token after expression")),
    }
}

type PResult<T> = Result<T, JsSyntaxError>;

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    eof: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn peek_nth(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n).map(|s| &s.token)
    }

    fn location(&self) -> usize {
        self.tokens.get(self.pos).map(|s| s.start).unwrap_or(self.eof)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|s| s.token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn at(&self, token: &Token) -> bool {
        self.peek() == Some(token)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.at(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_ident(&mut self, name: &str) -> bool {
        if self.peek().is_some_and(|t| t.is_ident(name)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> PResult<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(format!("Expected {:?}", token)))
        }
    }

    fn error(&self, message: impl Into<String>) -> JsSyntaxError {
        JsSyntaxError {
            message: message.into(),
            location: self.location(),
        }
    }

    fn parse_statements(&mut self) -> ModuleOutput {
        let mut output = ModuleOutput::default();
        let mut depth = 0usize;

        while let Some(token) = self.peek() {
            match token {
                Token::LBrace | Token::LParen | Token::LBracket => {
                    depth += 1;
                    self.pos += 1;
                }
                Token::RBrace | Token::RParen | Token::RBracket => {
                    depth = depth.saturating_sub(1);
                    self.pos += 1;
                }
                Token::Ident(word) if depth == 0 => {
                    let exported = word == "export";
                    let start = self.pos;
                    if exported {
                        self.pos += 1;
                        if self.eat_ident("default") {
                            match self.expression() {
                                Ok(expr) => output.statements.push(Statement::ExportDefault(expr)),
                                Err(e) => output.errors.push(e),
                            }
                            continue;
                        }
                    }
                    match self.declaration(exported) {
                        Ok(Some(statement)) => output.statements.push(statement),
                        Ok(None) => {
                            if self.pos == start {
                                self.pos += 1;
                            }
                        }
                        Err(e) => {
                            output.errors.push(e);
                            self.skip_statement();
                        }
                    }
                }
                _ => self.pos += 1,
            }
        }
        output
    }

    /// `(const|let|var) name [: Type] = expr`
    fn declaration(&mut self, exported: bool) -> PResult<Option<Statement>> {
        if !(self.eat_ident("const") || self.eat_ident("let") || self.eat_ident("var")) {
            return Ok(None);
        }
        let Some(Token::Ident(name)) = self.peek().cloned() else {
            // Destructuring patterns are not tracked
            return Ok(None);
        };
        self.pos += 1;
        if self.eat(&Token::Colon) {
            self.skip_type(&[Token::Assign]);
        }
        if !self.eat(&Token::Assign) {
            return Ok(None);
        }
        let init = self.expression()?;
        Ok(Some(Statement::Const { name, exported, init }))
    }

    fn skip_statement(&mut self) {
        let mut depth = 0usize;
        while let Some(token) = self.peek() {
            match token {
                Token::LBrace | Token::LParen | Token::LBracket => depth += 1,
                Token::RBrace | Token::RParen | Token::RBracket => {
                    if depth == 0 {
                        return;
                    }
                    depth -= 1;
                }
                Token::Semicolon if depth == 0 => {
                    self.pos += 1;
                    return;
                }
                _ => {}
            }
            self.pos += 1;
        }
    }

    /// Skip a type annotation up to one of `terminators` at nesting depth zero
    fn skip_type(&mut self, terminators: &[Token]) {
        let mut depth = 0usize;
        while let Some(token) = self.peek() {
            if depth == 0 && terminators.contains(token) {
                return;
            }
            match token {
                Token::LBrace | Token::LParen | Token::LBracket => depth += 1,
                Token::Op(op) if op == "<" => depth += 1,
                Token::RBrace | Token::RParen | Token::RBracket => {
                    if depth == 0 {
                        return;
                    }
                    depth -= 1;
                }
                Token::Op(op) if op == ">" => depth = depth.saturating_sub(1),
                Token::Semicolon if depth == 0 => return,
                _ => {}
            }
            self.pos += 1;
        }
    }

    fn expression(&mut self) -> PResult<Expr> {
        let test = self.binary(0)?;
        if self.eat(&Token::Question) {
            let consequent = self.expression()?;
            self.expect(&Token::Colon)?;
            let alternate = self.expression()?;
            return Ok(Expr::Conditional {
                test: Box::new(test),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
            });
        }
        Ok(test)
    }

    fn binary(&mut self, min_precedence: u8) -> PResult<Expr> {
        let mut left = self.unary()?;
        loop {
            let Some(Token::Op(op)) = self.peek() else {
                break;
            };
            let Some(precedence) = binary_precedence(op) else {
                break;
            };
            if precedence < min_precedence {
                break;
            }
            let op = op.clone();
            self.pos += 1;
            let right = self.binary(precedence + 1)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> PResult<Expr> {
        if let Some(Token::Op(op)) = self.peek() {
            if matches!(op.as_str(), "-" | "+" | "!" | "~") {
                let op = op.clone();
                self.pos += 1;
                let operand = self.unary()?;
                return Ok(match (op.as_str(), operand) {
                    ("-", Expr::Num(n)) => Expr::Num(-n),
                    ("+", Expr::Num(n)) => Expr::Num(n),
                    (_, operand) => Expr::Unary {
                        op,
                        operand: Box::new(operand),
                    },
                });
            }
        }
        if self.eat_ident("await") || self.eat_ident("typeof") {
            return self.unary();
        }
        self.postfix()
    }

    fn postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    let property = self.property_name()?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property,
                    };
                }
                Some(Token::Op(op)) if op == "?." => {
                    self.pos += 1;
                    if self.at(&Token::LParen) {
                        continue;
                    }
                    let property = self.property_name()?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property,
                    };
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let index = self.expression()?;
                    self.expect(&Token::RBracket)?;
                    let property = match index {
                        Expr::Str(s) => s,
                        Expr::Num(n) => n.to_string(),
                        _ => return Err(self.error("Unsupported computed member")),
                    };
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property,
                    };
                }
                Some(Token::LParen) => {
                    let args = self.arguments()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                    };
                }
                Some(Token::Template { .. }) => {
                    let Some(Token::Template { quasis, raw }) = self.advance() else {
                        break;
                    };
                    expr = Expr::TaggedTemplate {
                        tag: Box::new(expr),
                        template: Template { quasis, raw },
                    };
                }
                // Non-null assertion
                Some(Token::Op(op)) if op == "!" => self.pos += 1,
                Some(Token::Op(op)) if op == "<" && self.type_arguments_end().is_some() => {
                    if let Some(end) = self.type_arguments_end() {
                        self.pos = end;
                    }
                }
                Some(Token::Ident(word)) if word == "as" || word == "satisfies" => {
                    self.pos += 1;
                    self.skip_type(&[
                        Token::Comma,
                        Token::RParen,
                        Token::RBrace,
                        Token::RBracket,
                        Token::Semicolon,
                    ]);
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    /// Position after `<...>` when it is a generic argument list followed by a call
    fn type_arguments_end(&self) -> Option<usize> {
        let mut depth = 0usize;
        let mut i = self.pos;
        while let Some(spanned) = self.tokens.get(i) {
            match &spanned.token {
                Token::Op(op) if op == "<" => depth += 1,
                Token::Op(op) if op == ">" => {
                    depth -= 1;
                    if depth == 0 {
                        return matches!(self.tokens.get(i + 1).map(|s| &s.token), Some(Token::LParen))
                            .then_some(i + 1);
                    }
                }
                Token::Semicolon => return None,
                _ => {}
            }
            i += 1;
        }
        None
    }

    fn property_name(&mut self) -> PResult<String> {
        match self.advance() {
            Some(Token::Ident(name)) => Ok(name),
            _ => {
                self.pos = self.pos.saturating_sub(1);
                Err(self.error("Expected property name"))
            }
        }
    }

    fn arguments(&mut self) -> PResult<Vec<Expr>> {
        self.expect(&Token::LParen)?;
        let mut args = Vec::new();
        while !self.eat(&Token::RParen) {
            self.eat(&Token::Ellipsis);
            args.push(self.expression()?);
            if !self.eat(&Token::Comma) {
                self.expect(&Token::RParen)?;
                break;
            }
        }
        Ok(args)
    }

    fn primary(&mut self) -> PResult<Expr> {
        if self.is_arrow_start() {
            return self.arrow();
        }

        let location = self.location();
        match self.advance() {
            Some(Token::Str(s)) => Ok(Expr::Str(s)),
            Some(Token::Num(n)) => Ok(Expr::Num(n)),
            Some(Token::Template { quasis, raw }) => Ok(Expr::Template(Template { quasis, raw })),
            Some(Token::Ident(word)) => Ok(match word.as_str() {
                "true" => Expr::Bool(true),
                "false" => Expr::Bool(false),
                "null" => Expr::Null,
                "new" => {
                    let callee = self.new_callee()?;
                    let args = if self.at(&Token::LParen) {
                        self.arguments()?
                    } else {
                        Vec::new()
                    };
                    Expr::New {
                        callee: Box::new(callee),
                        args,
                    }
                }
                "async" if self.is_arrow_start() => return self.arrow(),
                _ => Expr::Ident(word),
            }),
            Some(Token::LParen) => {
                let expr = self.expression()?;
                self.expect(&Token::RParen)?;
                Ok(expr)
            }
            Some(Token::LBracket) => {
                let mut items = Vec::new();
                while !self.eat(&Token::RBracket) {
                    if self.eat(&Token::Comma) {
                        continue;
                    }
                    self.eat(&Token::Ellipsis);
                    items.push(self.expression()?);
                    if !self.eat(&Token::Comma) {
                        self.expect(&Token::RBracket)?;
                        break;
                    }
                }
                Ok(Expr::Array(items))
            }
            Some(Token::LBrace) => self.object(),
            _ => Err(JsSyntaxError {
                message: "Unexpected token".into(),
                location,
            }),
        }
    }

    fn new_callee(&mut self) -> PResult<Expr> {
        let mut callee = match self.advance() {
            Some(Token::Ident(name)) => Expr::Ident(name),
            _ => return Err(self.error("Expected constructor name")),
        };
        while self.eat(&Token::Dot) {
            let property = self.property_name()?;
            callee = Expr::Member {
                object: Box::new(callee),
                property,
            };
        }
        Ok(callee)
    }

    fn object(&mut self) -> PResult<Expr> {
        let mut props = Vec::new();
        while !self.eat(&Token::RBrace) {
            if self.eat(&Token::Ellipsis) {
                self.expression()?;
            } else {
                let key = match self.advance() {
                    Some(Token::Ident(name)) | Some(Token::Str(name)) => name,
                    Some(Token::Num(n)) => n.to_string(),
                    Some(Token::LBracket) => {
                        let key = self.expression()?;
                        self.expect(&Token::RBracket)?;
                        key.as_str().map(str::to_string).unwrap_or_default()
                    }
                    _ => {
                        self.pos = self.pos.saturating_sub(1);
                        return Err(self.error("Expected property key"));
                    }
                };
                let value = if self.eat(&Token::Colon) {
                    self.expression()?
                } else if self.at(&Token::LParen) {
                    // Method shorthand
                    let params = self.parameters()?;
                    let body = self.arrow_body()?;
                    Expr::Arrow {
                        params,
                        body: Box::new(body),
                    }
                } else {
                    Expr::Ident(key.clone())
                };
                props.push(Property { key, value });
            }
            if !self.eat(&Token::Comma) {
                self.expect(&Token::RBrace)?;
                break;
            }
        }
        Ok(Expr::Object(props))
    }

    /// True when the tokens at the cursor begin an arrow function
    fn is_arrow_start(&self) -> bool {
        let offset = usize::from(self.peek().is_some_and(|t| t.is_ident("async")));
        match (self.peek_nth(offset), self.peek_nth(offset + 1)) {
            (Some(Token::Ident(_)), Some(Token::Arrow)) => true,
            (Some(Token::LParen), _) => {
                let mut depth = 0usize;
                let mut i = self.pos + offset;
                while let Some(spanned) = self.tokens.get(i) {
                    match spanned.token {
                        Token::LParen => depth += 1,
                        Token::RParen => {
                            depth -= 1;
                            if depth == 0 {
                                return matches!(
                                    self.tokens.get(i + 1).map(|s| &s.token),
                                    Some(Token::Arrow) | Some(Token::Colon)
                                );
                            }
                        }
                        _ => {}
                    }
                    i += 1;
                }
                false
            }
            _ => false,
        }
    }

    fn arrow(&mut self) -> PResult<Expr> {
        self.eat_ident("async");
        let params = if let Some(Token::Ident(name)) = self.peek().cloned() {
            self.pos += 1;
            vec![name]
        } else {
            self.parameters()?
        };
        if self.eat(&Token::Colon) {
            self.skip_type(&[Token::Arrow]);
        }
        self.expect(&Token::Arrow)?;
        let body = self.arrow_body()?;
        Ok(Expr::Arrow {
            params,
            body: Box::new(body),
        })
    }

    /// `(a, b: T, { c }) ` → names of the simple parameters
    fn parameters(&mut self) -> PResult<Vec<String>> {
        self.expect(&Token::LParen)?;
        let mut params = Vec::new();
        let mut depth = 0usize;
        let mut expect_name = true;
        loop {
            match self.advance() {
                Some(Token::RParen) if depth == 0 => return Ok(params),
                Some(Token::LParen | Token::LBrace | Token::LBracket) => depth += 1,
                Some(Token::RParen | Token::RBrace | Token::RBracket) => depth = depth.saturating_sub(1),
                Some(Token::Comma) if depth == 0 => expect_name = true,
                Some(Token::Ident(name)) if depth == 0 && expect_name => {
                    params.push(name);
                    expect_name = false;
                }
                Some(_) => expect_name = false,
                None => return Err(self.error("Unterminated parameter list")),
            }
        }
    }

    /// Expression body, or the first `return` of a block body
    fn arrow_body(&mut self) -> PResult<Expr> {
        if !self.at(&Token::LBrace) {
            return self.expression();
        }
        self.pos += 1;
        let mut depth = 0usize;
        let mut result = None;
        while let Some(token) = self.peek() {
            match token {
                Token::LBrace | Token::LParen | Token::LBracket => depth += 1,
                Token::RBrace if depth == 0 => {
                    self.pos += 1;
                    return Ok(result.unwrap_or_else(|| Expr::Ident("undefined".into())));
                }
                Token::RBrace | Token::RParen | Token::RBracket => depth = depth.saturating_sub(1),
                Token::Ident(word) if word == "return" && depth == 0 && result.is_none() => {
                    self.pos += 1;
                    result = Some(self.expression()?);
                    continue;
                }
                _ => {}
            }
            self.pos += 1;
        }
        Err(self.error("Unterminated function body"))
    }
}

fn binary_precedence(op: &str) -> Option<u8> {
    Some(match op {
        "??" => 1,
        "||" => 2,
        "&&" => 3,
        "|" => 4,
        "^" => 5,
        "&" => 6,
        "==" | "!=" | "===" | "!==" => 7,
        "<" | ">" | "<=" | ">=" => 8,
        "+" | "-" => 10,
        "*" | "/" | "%" => 11,
        "**" => 12,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn call(callee: Expr, args: Vec<Expr>) -> Expr {
        Expr::Call {
            callee: Box::new(callee),
            args,
        }
    }

    fn member(object: Expr, property: &str) -> Expr {
        Expr::Member {
            object: Box::new(object),
            property: property.into(),
        }
    }

    fn ident(name: &str) -> Expr {
        Expr::Ident(name.into())
    }

    #[test]
    fn parses_column_chain() {
        let expr = parse_expression("varchar('email', { length: 255 }).notNull().unique()").unwrap();
        let (root, methods) = expr.method_chain();
        assert_eq!(
            root,
            &call(
                ident("varchar"),
                vec![
                    Expr::Str("email".into()),
                    Expr::Object(vec![Property {
                        key: "length".into(),
                        value: Expr::Num(255.0),
                    }]),
                ]
            )
        );
        let names: Vec<&str> = methods.iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["notNull", "unique"]);
    }

    #[test]
    fn parses_arrow_reference() {
        let expr = parse_expression("() => users.id").unwrap();
        assert_eq!(
            expr,
            Expr::Arrow {
                params: vec![],
                body: Box::new(member(ident("users"), "id")),
            }
        );
    }

    #[test]
    fn parses_block_arrow_with_return() {
        let expr = parse_expression("(table) => { return [index('a').on(table.a)]; }").unwrap();
        let Expr::Arrow { params, body } = expr else {
            panic!("expected arrow");
        };
        assert_eq!(params, vec!["table".to_string()]);
        assert!(matches!(*body, Expr::Array(ref items) if items.len() == 1));
    }

    #[test]
    fn parses_generics_and_casts() {
        let expr = parse_expression("json('meta').$type<{ a: string }>().default({} as Meta)").unwrap();
        let (_, methods) = expr.method_chain();
        let names: Vec<&str> = methods.iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["$type", "default"]);
        assert_eq!(methods[1].args, &[Expr::Object(vec![])]);
    }

    #[test]
    fn parses_tagged_template_and_negative_numbers() {
        assert_eq!(parse_expression("-1.5").unwrap(), Expr::Num(-1.5));
        let expr = parse_expression("sql`now()`").unwrap();
        assert!(matches!(expr, Expr::TaggedTemplate { ref template, .. } if template.raw == "now()"));
    }

    #[test]
    fn collects_top_level_declarations() {
        let output = parse_module(
            r#"
            import { mysqlTable, int } from 'drizzle-orm/mysql-core';
            type Row = { id: number };
            function helper() { const inner = 1; return inner; }
            export const users = mysqlTable('users', { id: int() });
            const local: Foo<Bar> = 'x';
            export default users;
            "#,
        );
        assert!(output.errors.is_empty(), "{:?}", output.errors);
        assert_eq!(output.statements.len(), 3);
        assert!(matches!(&output.statements[0], Statement::Const { name, exported: true, .. } if name == "users"));
        assert!(matches!(&output.statements[1], Statement::Const { name, exported: false, .. } if name == "local"));
        assert_eq!(output.statements[2], Statement::ExportDefault(ident("users")));
    }

    #[test]
    fn reports_errors_and_recovers() {
        let output = parse_module("const a = mysqlTable('a', { id: int( });\nconst b = 1;");
        assert_eq!(output.errors.len(), 1);
        assert!(matches!(&output.statements[..], [Statement::Const { name, .. }] if name == "b"));
    }
}
