//! Lexer for the subset of Ruby written by the Rails schema dumper.

use std::iter::Peekable;
use std::str::CharIndices;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    /// `name:` hash key
    Label(String),
    Str(String),
    Sym(String),
    Int(i64),
    Float(f64),

    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Dot,
    /// `::`
    Scope,
    Pipe,
    /// `->`
    Lambda,
    /// `=>`
    Rocket,
    Minus,
    Newline,
    /// Any other operator
    Op(String),
}

impl Token {
    pub fn is_ident(&self, name: &str) -> bool {
        matches!(self, Token::Ident(i) if i == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub start: usize,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message} at offset {location}")]
pub struct LexError {
    pub message: String,
    pub location: usize,
}

pub struct Lexer<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
        }
    }

    /// Tokenize the whole input, returning the tokens read before any error
    pub fn tokenize(mut self) -> (Vec<Spanned>, Option<LexError>) {
        let mut tokens: Vec<Spanned> = Vec::new();
        loop {
            match self.next_token() {
                Ok(Some(token)) => {
                    let repeated_newline = token.token == Token::Newline
                        && tokens.last().map_or(true, |t| t.token == Token::Newline);
                    if !repeated_newline {
                        tokens.push(token);
                    }
                }
                Ok(None) => return (tokens, None),
                Err(e) => return (tokens, Some(e)),
            }
        }
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn peek_second(&self) -> Option<char> {
        let mut it = self.chars.clone();
        it.next();
        it.next().map(|(_, c)| c)
    }

    fn offset(&mut self) -> usize {
        self.chars.peek().map(|(i, _)| *i).unwrap_or(self.input.len())
    }

    fn error(&self, message: impl Into<String>, location: usize) -> LexError {
        LexError {
            message: message.into(),
            location,
        }
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek_char() {
                Some(c) if c.is_whitespace() && c != '\n' => {
                    self.chars.next();
                }
                Some('\\') if self.peek_second() == Some('\n') => {
                    self.chars.next();
                    self.chars.next();
                }
                Some('#') => {
                    while let Some(c) = self.peek_char() {
                        if c == '\n' {
                            break;
                        }
                        self.chars.next();
                    }
                }
                _ => return,
            }
        }
    }

    fn next_token(&mut self) -> Result<Option<Spanned>, LexError> {
        self.skip_trivia();
        let start = self.offset();
        let Some(c) = self.peek_char() else {
            return Ok(None);
        };

        let token = match c {
            '\n' => {
                self.chars.next();
                Token::Newline
            }
            '"' | '\'' => {
                self.chars.next();
                let value = self.read_string(c, start)?;
                if self.peek_char() == Some(':') && self.peek_second() != Some(':') {
                    self.chars.next();
                    Token::Label(value)
                } else {
                    Token::Str(value)
                }
            }
            ':' if self.peek_second() == Some(':') => {
                self.chars.next();
                self.chars.next();
                Token::Scope
            }
            ':' if matches!(self.peek_second(), Some('"') | Some('\'')) => {
                self.chars.next();
                let quote = self.peek_char().unwrap_or('"');
                self.chars.next();
                Token::Sym(self.read_string(quote, start)?)
            }
            ':' if self.peek_second().is_some_and(|c| c.is_alphabetic() || c == '_') => {
                self.chars.next();
                Token::Sym(self.read_word())
            }
            c if c.is_ascii_digit() => self.read_number(start)?,
            c if c.is_alphabetic() || c == '_' || c == '@' || c == '$' => {
                let word = self.read_word();
                if self.peek_char() == Some(':') && self.peek_second() != Some(':') {
                    self.chars.next();
                    Token::Label(word)
                } else {
                    Token::Ident(word)
                }
            }
            _ => self.read_punctuation(start)?,
        };

        Ok(Some(Spanned { token, start }))
    }

    fn read_word(&mut self) -> String {
        let mut word = String::new();
        while let Some(c) = self.peek_char() {
            if c.is_alphanumeric() || c == '_' || c == '@' || c == '$' {
                word.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        if let Some(c @ ('?' | '!')) = self.peek_char() {
            if self.peek_second() != Some('=') {
                word.push(c);
                self.chars.next();
            }
        }
        word
    }

    fn read_string(&mut self, quote: char, start: usize) -> Result<String, LexError> {
        let mut value = String::new();
        loop {
            match self.chars.next() {
                Some((_, '\\')) => match self.chars.next() {
                    Some((_, c)) if quote == '\'' => {
                        if c != '\'' && c != '\\' {
                            value.push('\\');
                        }
                        value.push(c);
                    }
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, 't')) => value.push('\t'),
                    Some((_, 'r')) => value.push('\r'),
                    Some((_, '0')) => value.push('\0'),
                    Some((_, other)) => value.push(other),
                    None => return Err(self.error("Unterminated string literal", start)),
                },
                Some((_, c)) if c == quote => return Ok(value),
                Some((_, c)) => value.push(c),
                None => return Err(self.error("Unterminated string literal", start)),
            }
        }
    }

    fn read_number(&mut self, start: usize) -> Result<Token, LexError> {
        let mut digits = String::new();
        let mut float = false;
        while let Some(c) = self.peek_char() {
            match c {
                '0'..='9' => digits.push(c),
                '_' => {}
                '.' if !float && self.peek_second().is_some_and(|d| d.is_ascii_digit()) => {
                    float = true;
                    digits.push(c);
                }
                'e' | 'E' if self.peek_second().is_some_and(|d| d.is_ascii_digit() || d == '-') => {
                    float = true;
                    digits.push(c);
                    self.chars.next();
                    if let Some(sign @ '-') = self.peek_char() {
                        digits.push(sign);
                        self.chars.next();
                    }
                    continue;
                }
                _ => break,
            }
            self.chars.next();
        }

        let invalid = || self.error(format!("Invalid number {digits}"), start);
        if float {
            digits.parse().map(Token::Float).map_err(|_| invalid())
        } else {
            digits.parse().map(Token::Int).map_err(|_| invalid())
        }
    }

    fn read_punctuation(&mut self, start: usize) -> Result<Token, LexError> {
        let input = self.input;
        let rest = &input[start..];
        let (token, len) = if rest.starts_with("->") {
            (Token::Lambda, 2)
        } else if rest.starts_with("=>") {
            (Token::Rocket, 2)
        } else if let Some(op) = ["==", "!=", "<=", ">=", "&&", "||", "**", "<<"]
            .iter()
            .find(|op| rest.starts_with(**op))
        {
            (Token::Op(op.to_string()), 2)
        } else {
            let Some(c) = rest.chars().next() else {
                return Err(self.error("Unexpected end of input", start));
            };
            let token = match c {
                '(' => Token::LParen,
                ')' => Token::RParen,
                '{' => Token::LBrace,
                '}' => Token::RBrace,
                '[' => Token::LBracket,
                ']' => Token::RBracket,
                ',' => Token::Comma,
                '.' => Token::Dot,
                '|' => Token::Pipe,
                '-' => Token::Minus,
                '+' | '*' | '/' | '%' | '<' | '>' | '=' | '!' | '&' | '?' | ':' | ';' | '^' | '~' => {
                    Token::Op(c.to_string())
                }
                other => return Err(self.error(format!("Unexpected character '{other}'"), start)),
            };
            (token, c.len_utf8())
        };
        for _ in rest[..len].chars() {
            self.chars.next();
        }
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tokens(input: &str) -> Vec<Token> {
        let (tokens, error) = Lexer::new(input).tokenize();
        assert_eq!(error, None);
        tokens.into_iter().map(|t| t.token).collect()
    }

    #[test]
    fn lexes_column_call() {
        assert_eq!(
            tokens("t.string \"name\", null: false, default: \"\" # name\n"),
            vec![
                Token::Ident("t".into()),
                Token::Dot,
                Token::Ident("string".into()),
                Token::Str("name".into()),
                Token::Comma,
                Token::Label("null".into()),
                Token::Ident("false".into()),
                Token::Comma,
                Token::Label("default".into()),
                Token::Str("".into()),
                Token::Newline,
            ]
        );
    }

    #[test]
    fn lexes_schema_header() {
        assert_eq!(
            tokens("ActiveRecord::Schema[7.1].define(version: 2024_01_31_000000) do |t|"),
            vec![
                Token::Ident("ActiveRecord".into()),
                Token::Scope,
                Token::Ident("Schema".into()),
                Token::LBracket,
                Token::Float(7.1),
                Token::RBracket,
                Token::Dot,
                Token::Ident("define".into()),
                Token::LParen,
                Token::Label("version".into()),
                Token::Int(20240131000000),
                Token::RParen,
                Token::Ident("do".into()),
                Token::Pipe,
                Token::Ident("t".into()),
                Token::Pipe,
            ]
        );
    }

    #[test]
    fn lexes_symbols_lambdas_and_rockets() {
        assert_eq!(
            tokens(":cascade :\"odd name\" -> { 'now()' } \"k\" => -1"),
            vec![
                Token::Sym("cascade".into()),
                Token::Sym("odd name".into()),
                Token::Lambda,
                Token::LBrace,
                Token::Str("now()".into()),
                Token::RBrace,
                Token::Str("k".into()),
                Token::Rocket,
                Token::Minus,
                Token::Int(1),
            ]
        );
    }

    #[test]
    fn blank_lines_collapse_to_one_newline() {
        assert_eq!(
            tokens("\n\na\n\n\nb"),
            vec![
                Token::Ident("a".into()),
                Token::Newline,
                Token::Ident("b".into()),
            ]
        );
    }

    #[test]
    fn single_quoted_strings_keep_backslashes() {
        assert_eq!(tokens(r"'a\nb\'c'"), vec![Token::Str("a\\nb'c".into())]);
    }

    #[test]
    fn reports_unterminated_string() {
        let (tokens, error) = Lexer::new("create_table \"users").tokenize();
        assert_eq!(tokens.len(), 1);
        assert_eq!(error.map(|e| e.location), Some(13));
    }
}
