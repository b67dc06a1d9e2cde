//! CHECK body recovery from raw SQL text.
//!
//! The statement AST keeps CHECK constraints opaque, so the body is read
//! back from the source. This relies on `location` being a byte offset
//! into the same text the statement was parsed from: pass the original
//! document, never a reformatted or re-joined copy.

/// First balanced parenthesized group at or after `location`, parens
/// included. Quoted strings and identifiers inside the group are skipped
/// so that a `)` in a literal does not close it.
pub fn extract_check_body(sql: &str, location: usize) -> Option<&str> {
    let tail = sql.get(location..)?;
    let open = tail.find('(')?;
    let start = location + open;

    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (i, c) in sql[start..].char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&sql[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// `CHECK (...)` detail text for a constraint at `location`
pub fn check_detail(sql: &str, location: usize) -> Option<String> {
    extract_check_body(sql, location).map(|body| format!("CHECK {}", body))
}
