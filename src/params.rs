//! Placeholder rewriting
//!
//! Named placeholders (`:name`) are rewritten to positional `?` markers before a
//! query reaches the backend. Quoted literals are copied verbatim, so a colon
//! inside `'...'` or `"..."` never starts a placeholder.
//!
//! Reference: $PHP_SRC_PATH/ext/pdo/pdo_sql_parser.re

use indexmap::IndexMap;

/// Result of [`translate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslatedQuery {
    /// Query with every named placeholder replaced by `?`.
    pub sql: String,
    /// Placeholder name (without colon) -> 1-based position, in first-seen order.
    pub params: IndexMap<String, usize>,
    /// Position of each emitted `?`, in query order. A name used twice appears twice.
    pub occurrences: Vec<usize>,
    /// Positional `?` markers left in a query that also uses names.
    pub stray_positional: usize,
}

impl TranslatedQuery {
    pub fn has_named(&self) -> bool {
        !self.params.is_empty()
    }

    /// Named and positional placeholders in the same query.
    pub fn is_mixed(&self) -> bool {
        self.has_named() && self.stray_positional > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    Text(&'a str),
    Named(&'a str),
    Positional,
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Split a query into literal text and placeholders.
///
/// Inside a quoted literal a backslash escapes the next byte. Runs of two or
/// more `:` or `?` (casts, JSON operators) are plain text.
fn scan(query: &str) -> Vec<Segment<'_>> {
    let bytes = query.as_bytes();
    let mut segments = Vec::new();
    let mut quote: Option<u8> = None;
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];

        if let Some(q) = quote {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == q {
                quote = None;
            }
            i += 1;
            continue;
        }

        match b {
            b'\'' | b'"' => {
                quote = Some(b);
                i += 1;
            }
            b':' | b'?' => {
                let run = bytes[i..].iter().take_while(|&&c| c == b).count();
                if run > 1 {
                    i += run;
                    continue;
                }
                if b == b'?' {
                    segments.push(Segment::Text(&query[start..i]));
                    segments.push(Segment::Positional);
                    i += 1;
                    start = i;
                    continue;
                }
                let name_len = bytes[i + 1..]
                    .iter()
                    .take_while(|&&c| is_name_byte(c))
                    .count();
                if name_len == 0 {
                    i += 1;
                    continue;
                }
                segments.push(Segment::Text(&query[start..i]));
                segments.push(Segment::Named(&query[i + 1..i + 1 + name_len]));
                i += 1 + name_len;
                start = i;
            }
            _ => i += 1,
        }
    }

    if start < bytes.len() {
        segments.push(Segment::Text(&query[start..]));
    }
    segments.retain(|s| !matches!(s, Segment::Text("")));
    segments
}

/// Rewrite `:name` placeholders to `?` and record their positions.
///
/// Never fails. A query without named placeholders comes back unchanged with
/// an empty map.
pub fn translate(query: &str) -> TranslatedQuery {
    let segments = scan(query);
    if !segments.iter().any(|s| matches!(s, Segment::Named(_))) {
        return TranslatedQuery {
            sql: query.to_string(),
            ..TranslatedQuery::default()
        };
    }

    let mut out = TranslatedQuery {
        sql: String::with_capacity(query.len()),
        ..TranslatedQuery::default()
    };
    for segment in segments {
        match segment {
            Segment::Text(text) => out.sql.push_str(text),
            Segment::Positional => {
                out.stray_positional += 1;
                out.sql.push('?');
            }
            Segment::Named(name) => {
                let next = out.params.len() + 1;
                let position = *out.params.entry(name.to_string()).or_insert(next);
                out.occurrences.push(position);
                out.sql.push('?');
            }
        }
    }
    out
}

/// Replace each positional `?` with `marker(n)` (1-based), leaving literals and
/// named placeholders untouched. Used by backends with numbered markers (`$1`).
pub fn renumber_positional(sql: &str, mut marker: impl FnMut(usize) -> String) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut n = 0;
    for segment in scan(sql) {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Named(name) => {
                out.push(':');
                out.push_str(name);
            }
            Segment::Positional => {
                n += 1;
                out.push_str(&marker(n));
            }
        }
    }
    out
}

/// Number of positional `?` markers outside literals.
pub fn count_positional(sql: &str) -> usize {
    scan(sql)
        .iter()
        .filter(|s| matches!(s, Segment::Positional))
        .count()
}

/// Strip the optional leading colon from a bind name.
pub fn normalize_name(name: &str) -> &str {
    name.strip_prefix(':').unwrap_or(name)
}
