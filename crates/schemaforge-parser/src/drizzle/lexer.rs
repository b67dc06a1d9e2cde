//! Lexer for the subset of TypeScript found in Drizzle schema files.

use std::iter::Peekable;
use std::str::CharIndices;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    /// Template literal; `raw` is the text between the backticks
    Template { quasis: Vec<String>, raw: String },

    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Semicolon,
    Dot,
    Ellipsis,
    Arrow,
    Question,
    Assign,
    /// Any other operator
    Op(String),
}

impl Token {
    pub fn is_ident(&self, name: &str) -> bool {
        matches!(self, Token::Ident(i) if i == name)
    }

    pub fn is_op(&self, op: &str) -> bool {
        matches!(self, Token::Op(o) if o == op)
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

const OPERATORS: &[&str] = &[
    "===", "!==", "**", "==", "!=", "<=", ">=", "&&", "||", "??", "?.", "++", "--", "+=", "-=", "*=",
    "/=", "<", ">", "+", "-", "*", "/", "%", "!", "&", "|", "^", "~", "@",
];

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
        let mut tokens = Vec::new();
        loop {
            match self.next_token() {
                Ok(Some(token)) => tokens.push(token),
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

    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            match self.peek_char() {
                Some(c) if c.is_whitespace() => {
                    self.chars.next();
                }
                Some('/') if self.peek_second() == Some('/') => {
                    for (_, c) in self.chars.by_ref() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                Some('/') if self.peek_second() == Some('*') => {
                    let start = self.offset();
                    self.chars.next();
                    self.chars.next();
                    loop {
                        match self.chars.next() {
                            Some((_, '*')) if self.peek_char() == Some('/') => {
                                self.chars.next();
                                break;
                            }
                            Some(_) => {}
                            None => return Err(self.error("Unterminated comment", start)),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn next_token(&mut self) -> Result<Option<Spanned>, LexError> {
        self.skip_trivia()?;
        let start = self.offset();
        let Some(c) = self.peek_char() else {
            return Ok(None);
        };

        let token = match c {
            '\'' | '"' => {
                self.chars.next();
                Token::Str(self.read_string(c, start)?)
            }
            '`' => {
                self.chars.next();
                self.read_template(start)?
            }
            c if c.is_ascii_digit() => self.read_number(start)?,
            '.' if self.peek_second().is_some_and(|c| c.is_ascii_digit()) => self.read_number(start)?,
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let mut ident = String::new();
                while let Some(c) = self.peek_char() {
                    if c.is_alphanumeric() || c == '_' || c == '$' {
                        ident.push(c);
                        self.chars.next();
                    } else {
                        break;
                    }
                }
                Token::Ident(ident)
            }
            _ => self.read_punctuation(start)?,
        };

        Ok(Some(Spanned { token, start }))
    }

    fn read_string(&mut self, quote: char, start: usize) -> Result<String, LexError> {
        let mut value = String::new();
        loop {
            match self.chars.next() {
                Some((_, '\\')) => match self.chars.next() {
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, 't')) => value.push('\t'),
                    Some((_, 'r')) => value.push('\r'),
                    Some((_, '\n')) => {}
                    Some((_, other)) => value.push(other),
                    None => return Err(self.error("Unterminated string literal", start)),
                },
                Some((_, c)) if c == quote => return Ok(value),
                Some((_, '\n')) | None => return Err(self.error("Unterminated string literal", start)),
                Some((_, c)) => value.push(c),
            }
        }
    }

    fn read_template(&mut self, start: usize) -> Result<Token, LexError> {
        let body_start = self.offset();
        let mut quasis = Vec::new();
        let mut current = String::new();

        loop {
            match self.chars.next() {
                Some((end, '`')) => {
                    quasis.push(current);
                    let raw = self.input[body_start..end].to_string();
                    return Ok(Token::Template { quasis, raw });
                }
                Some((_, '\\')) => {
                    current.push('\\');
                    if let Some((_, c)) = self.chars.next() {
                        current.push(c);
                    }
                }
                Some((_, '$')) if self.peek_char() == Some('{') => {
                    self.chars.next();
                    quasis.push(std::mem::take(&mut current));
                    self.skip_substitution(start)?;
                }
                Some((_, c)) => current.push(c),
                None => return Err(self.error("Unterminated template literal", start)),
            }
        }
    }

    /// Skip a `${ ... }` substitution body, including nested braces and strings
    fn skip_substitution(&mut self, start: usize) -> Result<(), LexError> {
        let mut depth = 1;
        loop {
            match self.chars.next() {
                Some((at, q @ ('\'' | '"'))) => {
                    self.read_string(q, at)?;
                }
                Some((at, '`')) => {
                    self.read_template(at)?;
                }
                Some((_, '{')) => depth += 1,
                Some((_, '}')) => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                Some(_) => {}
                None => return Err(self.error("Unterminated template literal", start)),
            }
        }
    }

    fn read_number(&mut self, start: usize) -> Result<Token, LexError> {
        let mut text = String::new();
        while let Some(c) = self.peek_char() {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' {
                if c != '_' {
                    text.push(c);
                }
                self.chars.next();
            } else {
                break;
            }
        }
        let text = text.trim_end_matches('n');
        let value = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
            i64::from_str_radix(hex, 16).ok().map(|v| v as f64)
        } else {
            text.parse::<f64>().ok()
        };
        value
            .map(Token::Num)
            .ok_or_else(|| self.error(format!("Invalid number literal {}", text), start))
    }

    fn read_punctuation(&mut self, start: usize) -> Result<Token, LexError> {
        let rest = &self.input[start..];
        let (token, len) = if rest.starts_with("...") {
            (Token::Ellipsis, 3)
        } else if rest.starts_with("=>") {
            (Token::Arrow, 2)
        } else if let Some(op) = OPERATORS.iter().find(|op| rest.starts_with(**op)) {
            if *op == "?." && rest[2..].starts_with(|c: char| c.is_ascii_digit()) {
                (Token::Question, 1)
            } else {
                (Token::Op(op.to_string()), op.len())
            }
        } else {
            let token = match rest.chars().next() {
                Some('(') => Token::LParen,
                Some(')') => Token::RParen,
                Some('{') => Token::LBrace,
                Some('}') => Token::RBrace,
                Some('[') => Token::LBracket,
                Some(']') => Token::RBracket,
                Some(',') => Token::Comma,
                Some(':') => Token::Colon,
                Some(';') => Token::Semicolon,
                Some('.') => Token::Dot,
                Some('?') => Token::Question,
                Some('=') => Token::Assign,
                Some(other) => return Err(self.error(format!("Unexpected character '{}'", other), start)),
                None => return Err(self.error("Unexpected end of input", start)),
            };
            (token, 1)
        };
        for _ in 0..len {
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
    fn lexes_declaration() {
        assert_eq!(
            tokens("export const users = mysqlTable('users', { id: int() });"),
            vec![
                Token::Ident("export".into()),
                Token::Ident("const".into()),
                Token::Ident("users".into()),
                Token::Assign,
                Token::Ident("mysqlTable".into()),
                Token::LParen,
                Token::Str("users".into()),
                Token::Comma,
                Token::LBrace,
                Token::Ident("id".into()),
                Token::Colon,
                Token::Ident("int".into()),
                Token::LParen,
                Token::RParen,
                Token::RBrace,
                Token::RParen,
                Token::Semicolon,
            ]
        );
    }

    #[test]
    fn lexes_arrows_comments_and_operators() {
        assert_eq!(
            tokens("// note\n() => a /* x */ === b?.c"),
            vec![
                Token::LParen,
                Token::RParen,
                Token::Arrow,
                Token::Ident("a".into()),
                Token::Op("===".into()),
                Token::Ident("b".into()),
                Token::Op("?.".into()),
                Token::Ident("c".into()),
            ]
        );
    }

    #[test]
    fn lexes_template_with_substitution() {
        assert_eq!(
            tokens("sql`${t.price} > 0`"),
            vec![
                Token::Ident("sql".into()),
                Token::Template {
                    quasis: vec!["".into(), " > 0".into()],
                    raw: "${t.price} > 0".into(),
                },
            ]
        );
    }

    #[test]
    fn reports_unterminated_string() {
        let (tokens, error) = Lexer::new("const a = 'oops").tokenize();
        assert_eq!(tokens.len(), 4);
        assert_eq!(error.map(|e| e.location), Some(10));
    }
}
