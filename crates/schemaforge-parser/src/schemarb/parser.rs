//! Recursive-descent parser for Rails schema files.
//!
//! A schema file is a tree of method calls. Each statement is read as a
//! call with positional arguments, keyword options and an optional block;
//! a statement that does not fit is reported and skipped up to the end of
//! its line.

use super::ast::{Block, Call, Value};
use super::lexer::{Lexer, Spanned, Token};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message} at offset {location}")]
pub struct RubySyntaxError {
    pub message: String,
    pub location: usize,
}

#[derive(Debug, Default)]
pub struct ProgramOutput {
    pub calls: Vec<Call>,
    pub errors: Vec<RubySyntaxError>,
}

/// Parse a schema file into its top-level calls
pub fn parse_program(source: &str) -> ProgramOutput {
    let (tokens, lex_error) = Lexer::new(source).tokenize();
    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
        errors: Vec::new(),
    };

    let mut calls = Vec::new();
    loop {
        calls.extend(parser.statements());
        match parser.peek() {
            None => break,
            Some(_) => {
                let error = parser.error("Unexpected block terminator");
                parser.errors.push(error);
                parser.pos += 1;
            }
        }
    }

    let mut errors = parser.errors;
    if let Some(e) = lex_error {
        errors.push(RubySyntaxError {
            message: e.message,
            location: e.location,
        });
    }
    ProgramOutput { calls, errors }
}

type PResult<T> = Result<T, RubySyntaxError>;

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Spanned>,
    pos: usize,
    errors: Vec<RubySyntaxError>,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn location(&self) -> usize {
        self.offset_of(self.pos)
    }

    fn offset_of(&self, pos: usize) -> usize {
        self.tokens.get(pos).map(|s| s.start).unwrap_or(self.source.len())
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

    fn at_ident(&self, name: &str) -> bool {
        self.peek().is_some_and(|t| t.is_ident(name))
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.at(token) {
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

    fn error(&self, message: impl Into<String>) -> RubySyntaxError {
        RubySyntaxError {
            message: message.into(),
            location: self.location(),
        }
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek(), Some(Token::Newline)) || self.peek().is_some_and(|t| *t == Token::Op(";".into())) {
            self.pos += 1;
        }
    }

    /// At `end`, `}` or the end of input
    fn at_block_end(&self) -> bool {
        matches!(self.peek(), None | Some(Token::RBrace)) || self.at_ident("end")
    }

    fn at_statement_end(&self) -> bool {
        self.at_block_end()
            || matches!(self.peek(), Some(Token::Newline))
            || self.peek().is_some_and(|t| *t == Token::Op(";".into()))
    }

    /// Statements up to the next block terminator, which is left unread
    fn statements(&mut self) -> Vec<Call> {
        let mut calls = Vec::new();
        loop {
            self.skip_newlines();
            if self.at_block_end() {
                return calls;
            }
            match self.statement() {
                Ok(call) => calls.push(call),
                Err(e) => {
                    self.errors.push(e);
                    self.skip_line();
                }
            }
        }
    }

    /// Skip to the end of the current line, stepping over bracketed groups
    fn skip_line(&mut self) {
        let mut depth = 0usize;
        while let Some(token) = self.peek() {
            match token {
                Token::LParen | Token::LBracket | Token::LBrace => depth += 1,
                Token::RParen | Token::RBracket => depth = depth.saturating_sub(1),
                Token::RBrace if depth == 0 => return,
                Token::RBrace => depth -= 1,
                Token::Newline if depth == 0 => return,
                Token::Ident(i) if i == "end" && depth == 0 => return,
                _ => {}
            }
            self.pos += 1;
        }
    }

    fn statement(&mut self) -> PResult<Call> {
        let start = self.location();
        let mut path = self.path()?;
        let name = path.pop().unwrap_or_default();
        let receiver = if path.is_empty() { None } else { Some(path.join(".")) };

        let mut call = Call {
            receiver,
            name,
            args: Vec::new(),
            options: Vec::new(),
            block: None,
            start,
        };

        if self.eat(&Token::LParen) {
            self.arguments(&mut call, Some(&Token::RParen))?;
            self.expect(&Token::RParen)?;
        } else if !self.at_statement_end() && !self.at_ident("do") && !self.at(&Token::LBrace) {
            self.arguments(&mut call, None)?;
        }

        if self.at_ident("do") {
            self.pos += 1;
            call.block = Some(self.block_body(None)?);
        } else if self.eat(&Token::LBrace) {
            call.block = Some(self.block_body(Some(&Token::RBrace))?);
        }

        if self.at_statement_end() {
            Ok(call)
        } else {
            Err(self.error(format!("Unexpected token after {}", call.name)))
        }
    }

    /// `a::B[1].c.d`, split at dots
    fn path(&mut self) -> PResult<Vec<String>> {
        let mut parts = Vec::new();
        let mut current = self.ident()?;
        loop {
            if self.eat(&Token::Scope) {
                current.push_str("::");
                current.push_str(&self.ident()?);
            } else if self.at(&Token::LBracket) && self.attached() {
                let open = self.offset_of(self.pos);
                self.skip_group()?;
                let close = self.offset_of(self.pos);
                current.push_str(self.source[open..close].trim_end());
            } else if self.eat(&Token::Dot) {
                parts.push(std::mem::take(&mut current));
                current = self.ident()?;
            } else {
                break;
            }
        }
        parts.push(current);
        Ok(parts)
    }

    /// The current token follows the previous one without whitespace
    fn attached(&self) -> bool {
        let start = self.location();
        self.source[..start]
            .chars()
            .next_back()
            .is_some_and(|c| !c.is_whitespace())
    }

    fn ident(&mut self) -> PResult<String> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error("Expected a method name")),
        }
    }

    /// Skip one bracketed group starting at the current token
    fn skip_group(&mut self) -> PResult<()> {
        let mut depth = 0usize;
        let start = self.location();
        while let Some(token) = self.advance() {
            match token {
                Token::LParen | Token::LBracket | Token::LBrace => depth += 1,
                Token::RParen | Token::RBracket | Token::RBrace => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return Ok(());
                    }
                }
                _ => {}
            }
        }
        Err(RubySyntaxError {
            message: "Unclosed bracket".to_string(),
            location: start,
        })
    }

    /// Arguments up to `closing`, or to the end of the statement
    fn arguments(&mut self, call: &mut Call, closing: Option<&Token>) -> PResult<()> {
        loop {
            if closing.is_some() {
                self.skip_newlines();
            }
            let done = match closing {
                Some(token) => self.at(token),
                None => self.at_statement_end() || self.at_ident("do"),
            };
            if done {
                return Ok(());
            }

            self.argument(call)?;

            if !self.eat(&Token::Comma) {
                if closing.is_some() {
                    self.skip_newlines();
                }
                return Ok(());
            }
            self.skip_newlines();
        }
    }

    fn argument(&mut self, call: &mut Call) -> PResult<()> {
        if let Some(Token::Label(key)) = self.peek() {
            let key = key.clone();
            self.pos += 1;
            self.skip_newlines();
            let value = self.value()?;
            call.options.push((key, value));
            return Ok(());
        }

        let value = self.value()?;
        if self.eat(&Token::Rocket) {
            let key = value
                .as_text()
                .map(str::to_string)
                .ok_or_else(|| self.error("Expected a string or symbol key"))?;
            self.skip_newlines();
            let value = self.value()?;
            call.options.push((key, value));
        } else {
            call.args.push(value);
        }
        Ok(())
    }

    fn value(&mut self) -> PResult<Value> {
        let start = self.pos;
        let Some(token) = self.advance() else {
            return Err(self.error("Unexpected end of input"));
        };

        match token {
            Token::Str(s) => Ok(Value::Str(s)),
            Token::Sym(s) => Ok(Value::Sym(s)),
            Token::Int(i) => Ok(Value::Int(i)),
            Token::Float(f) => Ok(Value::Float(f)),
            Token::Minus => match self.advance() {
                Some(Token::Int(i)) => Ok(Value::Int(-i)),
                Some(Token::Float(f)) => Ok(Value::Float(-f)),
                _ => Err(RubySyntaxError {
                    message: "Expected a number after '-'".to_string(),
                    location: self.offset_of(start),
                }),
            },
            Token::Ident(i) if i == "true" => Ok(Value::Bool(true)),
            Token::Ident(i) if i == "false" => Ok(Value::Bool(false)),
            Token::Ident(i) if i == "nil" => Ok(Value::Nil),
            Token::LBracket => {
                let mut items = Vec::new();
                loop {
                    self.skip_newlines();
                    if self.eat(&Token::RBracket) {
                        return Ok(Value::Array(items));
                    }
                    items.push(self.value()?);
                    self.skip_newlines();
                    if !self.eat(&Token::Comma) {
                        self.expect(&Token::RBracket)?;
                        return Ok(Value::Array(items));
                    }
                }
            }
            Token::LBrace => {
                let mut pairs = Vec::new();
                loop {
                    self.skip_newlines();
                    if self.eat(&Token::RBrace) {
                        return Ok(Value::Hash(pairs));
                    }
                    let key = match self.advance() {
                        Some(Token::Label(key)) => key,
                        Some(Token::Str(key)) | Some(Token::Sym(key)) => {
                            self.expect(&Token::Rocket)?;
                            key
                        }
                        _ => return Err(self.error("Expected a hash key")),
                    };
                    self.skip_newlines();
                    pairs.push((key, self.value()?));
                    self.skip_newlines();
                    if !self.eat(&Token::Comma) {
                        self.expect(&Token::RBrace)?;
                        return Ok(Value::Hash(pairs));
                    }
                }
            }
            Token::Lambda => {
                if self.at(&Token::LParen) {
                    self.skip_group()?;
                }
                if !self.at(&Token::LBrace) {
                    return Err(self.error("Expected a lambda body"));
                }
                let open = self.pos;
                self.skip_group()?;
                let body_start = self.offset_of(open) + 1;
                let body_end = self.offset_of(self.pos - 1);
                Ok(Value::Lambda(self.source[body_start..body_end].trim().to_string()))
            }
            Token::Ident(_) => {
                loop {
                    if self.at(&Token::LParen) || self.at(&Token::LBracket) {
                        self.skip_group()?;
                    } else if matches!(self.peek(), Some(Token::Dot) | Some(Token::Scope)) {
                        self.pos += 1;
                        self.ident()?;
                    } else {
                        break;
                    }
                }
                let text = &self.source[self.offset_of(start)..self.offset_of(self.pos)];
                Ok(Value::Expr(text.trim().to_string()))
            }
            other => Err(RubySyntaxError {
                message: format!("Unexpected token {:?}", other),
                location: self.offset_of(start),
            }),
        }
    }

    /// Block parameters and statements; the opening token is already read
    fn block_body(&mut self, closing: Option<&Token>) -> PResult<Block> {
        let mut block = Block::default();
        if self.eat(&Token::Pipe) {
            while let Some(Token::Ident(param)) = self.peek() {
                block.params.push(param.clone());
                self.pos += 1;
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            self.expect(&Token::Pipe)?;
        }

        block.body = self.statements();

        match closing {
            Some(token) => self.expect(token)?,
            None if self.at_ident("end") => self.pos += 1,
            None => return Err(self.error("Expected end")),
        }
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn calls(source: &str) -> Vec<Call> {
        let output = parse_program(source);
        assert_eq!(output.errors, vec![]);
        output.calls
    }

    #[test]
    fn parses_nested_blocks() {
        let calls = calls(
            r#"
ActiveRecord::Schema[7.1].define(version: 2024_01_31_000000) do
  create_table "users", force: :cascade do |t|
    t.string "email", null: false
  end
end
"#,
        );

        assert_eq!(calls.len(), 1);
        let define = &calls[0];
        assert_eq!(define.receiver.as_deref(), Some("ActiveRecord::Schema[7.1]"));
        assert_eq!(define.name, "define");
        assert_eq!(define.option("version"), Some(&Value::Int(20240131000000)));

        let body = &define.block.as_ref().unwrap().body;
        let create = &body[0];
        assert_eq!(create.name, "create_table");
        assert_eq!(create.args, vec![Value::Str("users".into())]);
        assert_eq!(create.option("force"), Some(&Value::Sym("cascade".into())));

        let block = create.block.as_ref().unwrap();
        assert_eq!(block.params, vec!["t".to_string()]);
        assert_eq!(block.body[0].receiver.as_deref(), Some("t"));
        assert_eq!(block.body[0].name, "string");
        assert_eq!(block.body[0].option("null"), Some(&Value::Bool(false)));
    }

    #[test]
    fn parses_values() {
        let calls = calls(
            "t.index [\"a\", \"b\"], order: { a: :desc, \"b\" => :asc }, where: nil\n\
             t.datetime \"at\", default: -> { \"CURRENT_TIMESTAMP\" }, precision: -1\n\
             t.float \"ratio\", default: Float::INFINITY",
        );

        assert_eq!(
            calls[0].args,
            vec![Value::Array(vec![Value::Str("a".into()), Value::Str("b".into())])]
        );
        assert_eq!(
            calls[0].option("order"),
            Some(&Value::Hash(vec![
                ("a".into(), Value::Sym("desc".into())),
                ("b".into(), Value::Sym("asc".into())),
            ]))
        );
        assert_eq!(calls[0].option("where"), Some(&Value::Nil));
        assert_eq!(
            calls[1].option("default"),
            Some(&Value::Lambda("\"CURRENT_TIMESTAMP\"".into()))
        );
        assert_eq!(calls[1].option("precision"), Some(&Value::Int(-1)));
        assert_eq!(calls[2].option("default"), Some(&Value::Expr("Float::INFINITY".into())));
    }

    #[test]
    fn arguments_continue_after_commas() {
        let calls = calls("add_foreign_key \"posts\",\n  \"users\",\n  column: \"author_id\"\n");

        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].strings().collect::<Vec<_>>(), vec!["posts", "users"]);
        assert_eq!(calls[0].option("column"), Some(&Value::Str("author_id".into())));
    }

    #[test]
    fn bad_line_is_reported_and_skipped() {
        let output = parse_program("enable_extension \"x\"\nt.integer \"n\" + 1\ncreate_table \"a\"\n");

        assert_eq!(output.errors.len(), 1);
        assert_eq!(output.errors[0].location, 35);
        let names: Vec<_> = output.calls.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["enable_extension", "create_table"]);
    }

    #[test]
    fn stray_end_is_reported() {
        let output = parse_program("end\ncreate_table \"a\"");

        assert_eq!(output.errors.len(), 1);
        assert_eq!(output.calls.len(), 1);
    }

    #[test]
    fn unterminated_block_is_reported() {
        let output = parse_program("create_table \"a\" do |t|\n  t.string \"b\"\n");

        assert_eq!(output.errors[0].message, "Expected end");
        assert_eq!(output.calls, vec![]);
    }
}
