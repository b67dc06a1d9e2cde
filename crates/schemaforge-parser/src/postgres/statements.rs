//! Statement splitting on top of the sqlparser tokenizer.
//!
//! The document is tokenized once with the PostgreSQL dialect and split
//! at top-level semicolons. Each statement is parsed on its own so that
//! one malformed statement only costs that statement. Token locations are
//! translated back to byte offsets, which the converter needs to recover
//! CHECK bodies from the source text.

use sqlparser::ast::Statement;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::keywords::Keyword;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Location, Token, TokenWithSpan, Tokenizer, Word};
use tracing::debug;

/// A statement that could not be parsed
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message} at offset {location}")]
pub struct SqlSyntaxError {
    pub message: String,
    pub location: usize,
}

/// Byte offsets of `CHECK` keywords, grouped by the column definition or
/// table constraint they belong to, in declaration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckSites {
    pub columns: Vec<Vec<usize>>,
    pub constraints: Vec<Vec<usize>>,
}

impl CheckSites {
    pub fn column(&self, index: usize) -> &[usize] {
        self.columns.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn constraint(&self, index: usize) -> &[usize] {
        self.constraints.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    fn push(&mut self, element: Element<'_>, after_add: bool) {
        let words = if after_add {
            // `ALTER COLUMN x ADD ...` is not a new column or constraint
            let Some(add) = element.words.iter().position(|w| is_word(w, Keyword::ADD)) else {
                return;
            };
            if element.words[..add].iter().any(|w| is_word(w, Keyword::COLUMN)) {
                return;
            }
            &element.words[add + 1..]
        } else {
            &element.words[..]
        };

        match words.first() {
            None => {}
            Some(word) if TABLE_CONSTRAINT_KEYWORDS.iter().any(|k| is_word(word, *k)) => {
                self.constraints.push(element.checks)
            }
            Some(_) => self.columns.push(element.checks),
        }
    }
}

/// A parsed statement plus the source positions its AST does not keep
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedStatement {
    pub statement: Statement,
    /// Byte offset of the first token
    pub location: usize,
    pub checks: CheckSites,
}

/// Parsed statements plus per-statement failures
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseOutput {
    pub statements: Vec<ParsedStatement>,
    pub errors: Vec<SqlSyntaxError>,
}

/// Words that open a table constraint rather than a column definition
const TABLE_CONSTRAINT_KEYWORDS: &[Keyword] = &[
    Keyword::CONSTRAINT,
    Keyword::PRIMARY,
    Keyword::UNIQUE,
    Keyword::FOREIGN,
    Keyword::CHECK,
    Keyword::EXCLUDE,
];

/// Parse a DDL document.
///
/// With `isolate_statements` a failing statement is recorded and parsing
/// continues with the next one; without it parsing stops at the first
/// failure. Statements that do not touch tables, indexes or comments are
/// skipped when the parser does not understand them.
pub fn parse_statements(sql: &str, isolate_statements: bool) -> ParseOutput {
    let dialect = PostgreSqlDialect {};
    let lines = LineIndex::new(sql);
    let mut output = ParseOutput::default();

    let (tokens, lex_error) = match Tokenizer::new(&dialect, sql).tokenize_with_location() {
        Ok(tokens) => (tokens, None),
        Err(e) => {
            let location = lines.offset(e.location);
            // The statement holding a tokenizer error is incomplete; keep the ones before it
            let mut tokens = Tokenizer::new(&dialect, &sql[..location])
                .tokenize_with_location()
                .unwrap_or_default();
            let keep = tokens
                .iter()
                .rposition(|t| t.token == Token::SemiColon)
                .map_or(0, |i| i + 1);
            tokens.truncate(keep);
            let error = SqlSyntaxError {
                message: e.message,
                location,
            };
            (tokens, Some(error))
        }
    };

    for chunk in tokens.split(|t| t.token == Token::SemiColon) {
        let Some(first) = chunk.iter().find(|t| !is_trivia(&t.token)) else {
            continue;
        };
        let location = lines.offset(first.span.start);

        match parse_chunk(&dialect, chunk) {
            Ok(statement) => {
                let checks = check_sites(&statement, chunk, &lines);
                output.statements.push(ParsedStatement {
                    statement,
                    location,
                    checks,
                });
            }
            Err(message) if !is_schema_statement(chunk) => {
                debug!(location, %message, "skipping statement outside the schema");
            }
            Err(message) => {
                output.errors.push(SqlSyntaxError { message, location });
                if !isolate_statements {
                    return output;
                }
            }
        }
    }

    if let Some(e) = lex_error {
        output.errors.push(e);
    }

    output
}

fn parse_chunk(dialect: &PostgreSqlDialect, chunk: &[TokenWithSpan]) -> Result<Statement, String> {
    let mut parser = Parser::new(dialect).with_tokens_with_locations(strip_unsupported_clauses(chunk));
    let statement = parser.parse_statement().map_err(|e| e.to_string())?;

    let next = parser.peek_token();
    if next.token != Token::EOF {
        return Err(format!("Expected end of statement, found: {}", next.token));
    }
    Ok(statement)
}

/// Drop PostgreSQL clauses that carry nothing for the schema and that
/// sqlparser rejects: a trailing `NOT VALID` on ALTER TABLE and the
/// `ONLY` of `CREATE INDEX ... ON ONLY`
fn strip_unsupported_clauses(chunk: &[TokenWithSpan]) -> Vec<TokenWithSpan> {
    let mut tokens: Vec<TokenWithSpan> = chunk
        .iter()
        .filter(|t| !is_trivia(&t.token))
        .cloned()
        .collect();

    if let [.., not, valid] = tokens.as_slice() {
        if is_keyword(&not.token, Keyword::NOT) && is_keyword(&valid.token, Keyword::VALID) {
            tokens.truncate(tokens.len() - 2);
        }
    }

    if tokens.first().is_some_and(|t| is_keyword(&t.token, Keyword::CREATE)) {
        let only = tokens.windows(2).position(|pair| {
            is_keyword(&pair[0].token, Keyword::ON) && is_keyword(&pair[1].token, Keyword::ONLY)
        });
        if let Some(on) = only {
            tokens.remove(on + 1);
        }
    }

    tokens
}

/// Whether a statement creates or alters a table or index, or comments on one
fn is_schema_statement(chunk: &[TokenWithSpan]) -> bool {
    let keywords: Vec<Keyword> = chunk
        .iter()
        .filter(|t| !is_trivia(&t.token))
        .take(4)
        .map(|t| match &t.token {
            Token::Word(w) if w.quote_style.is_none() => w.keyword,
            _ => Keyword::NoKeyword,
        })
        .collect();

    match keywords.as_slice() {
        [Keyword::CREATE, rest @ ..] => rest
            .iter()
            .any(|k| matches!(k, Keyword::TABLE | Keyword::INDEX)),
        [Keyword::ALTER, Keyword::TABLE, ..] | [Keyword::COMMENT, Keyword::ON, ..] => true,
        _ => false,
    }
}

fn check_sites(statement: &Statement, chunk: &[TokenWithSpan], lines: &LineIndex<'_>) -> CheckSites {
    match statement {
        Statement::CreateTable(_) => collect_check_sites(chunk, lines, 1),
        Statement::AlterTable { .. } => collect_check_sites(chunk, lines, 0),
        _ => CheckSites::default(),
    }
}

/// Words and CHECK offsets of one comma-separated element
#[derive(Default)]
struct Element<'t> {
    words: Vec<&'t Word>,
    checks: Vec<usize>,
}

/// Walk the elements at `body_depth`: the parenthesized element list of
/// CREATE TABLE (depth 1) or the operation list of ALTER TABLE (depth 0)
fn collect_check_sites(chunk: &[TokenWithSpan], lines: &LineIndex<'_>, body_depth: usize) -> CheckSites {
    let after_add = body_depth == 0;
    let mut sites = CheckSites::default();
    let mut element = Element::default();
    let mut depth = 0usize;

    for token in chunk {
        match &token.token {
            Token::LParen => depth += 1,
            Token::RParen if body_depth > 0 && depth == body_depth => {
                sites.push(element, after_add);
                return sites;
            }
            Token::RParen => depth = depth.saturating_sub(1),
            Token::Comma if depth == body_depth => {
                sites.push(std::mem::take(&mut element), after_add);
            }
            Token::Word(word) if depth == body_depth => {
                if is_word(word, Keyword::CHECK) {
                    element.checks.push(lines.offset(token.span.start));
                }
                element.words.push(word);
            }
            _ => {}
        }
    }

    sites.push(element, after_add);
    sites
}

fn is_trivia(token: &Token) -> bool {
    matches!(token, Token::Whitespace(_))
}

fn is_word(word: &Word, keyword: Keyword) -> bool {
    word.quote_style.is_none() && word.keyword == keyword
}

fn is_keyword(token: &Token, keyword: Keyword) -> bool {
    matches!(token, Token::Word(w) if is_word(w, keyword))
}

/// Line/column to byte offset translation.
///
/// Tokenizer columns count characters, starting at 1.
struct LineIndex<'s> {
    source: &'s str,
    starts: Vec<usize>,
}

impl<'s> LineIndex<'s> {
    fn new(source: &'s str) -> Self {
        let starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { source, starts }
    }

    fn offset(&self, location: Location) -> usize {
        let line_start = (location.line as usize)
            .checked_sub(1)
            .and_then(|line| self.starts.get(line))
            .copied();
        let Some(start) = line_start else {
            return self.source.len();
        };
        let column = (location.column as usize).saturating_sub(1);
        self.source[start..]
            .char_indices()
            .nth(column)
            .map_or(self.source.len(), |(i, _)| start + i)
    }
}
