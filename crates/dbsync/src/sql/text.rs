//! Statement text normalization.
//!
//! Generated statements are collapsed to single spaces outside quoted
//! regions and terminated with exactly one semicolon, so the same change
//! always renders to the same text.

/// Collapse whitespace outside quotes, strip trailing whitespace and
/// semicolons, and terminate with `;`.
///
/// Single quotes, double quotes and backticks delimit quoted regions. Inside
/// a region a backslash escapes the next character and a doubled delimiter
/// stays inside the region.
pub fn normalize_statement(sql: &str) -> String {
    normalize_with(sql, true)
}

/// [`normalize_statement`] for dialects whose literals treat backslash as an
/// ordinary character (PostgreSQL with `standard_conforming_strings`).
pub fn normalize_standard_statement(sql: &str) -> String {
    normalize_with(sql, false)
}

fn normalize_with(sql: &str, backslash_escapes: bool) -> String {
    let mut out = String::with_capacity(sql.len() + 1);
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut pending_space = false;

    for ch in sql.chars() {
        if let Some(q) = quote {
            out.push(ch);
            if escaped {
                escaped = false;
            } else if backslash_escapes && ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }

        if ch.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        if matches!(ch, '\'' | '"' | '`') {
            quote = Some(ch);
        }
        out.push(ch);
    }

    let trimmed_len = out
        .trim_end_matches(|c: char| c == ';' || c.is_whitespace())
        .len();
    out.truncate(trimmed_len);
    out.push(';');
    out
}
