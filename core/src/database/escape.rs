//! Best-effort escaping for identifiers and literals that end up inside SQL text.
//!
//! This is not an injection boundary. Postgres values are always bound as
//! parameters; only Snowflake bulk loads render values as literals.

use std::borrow::Cow;

use tracing::warn;

/// Reserved SQL keywords that need quoting.
pub const RESERVED_KEYWORDS: &[&str] = &[
    "all", "alter", "and", "any", "as", "between", "by", "case", "check", "column", "connect",
    "constraint", "create", "cross", "current", "date", "default", "delete", "distinct", "drop",
    "else", "exists", "false", "following", "for", "from", "full", "grant", "group", "having",
    "ilike", "in", "increment", "index", "inner", "insert", "intersect", "into", "is", "join",
    "key", "lateral", "left", "like", "limit", "minus", "natural", "not", "null", "of", "on",
    "or", "order", "primary", "qualify", "regexp", "revoke", "right", "rlike", "row", "rows",
    "sample", "select", "set", "some", "start", "table", "tablesample", "then", "to", "trigger",
    "true", "try_cast", "union", "unique", "update", "user", "using", "values", "view", "when",
    "whenever", "where", "with",
];

/// Names Snowflake rejects as "invalid identifier" when left bare even though
/// they are not keywords.
pub const SNOWFLAKE_INVALID_BARE_IDENTIFIERS: &[&str] = &["product_class"];

/// Strips `;` from a name headed for generated SQL, warning when it does.
pub fn strip_semicolons(input: &str) -> Cow<'_, str> {
    if input.contains(';') {
        warn!("Removing suspicious semicolon from {} before insertion.", input);
        Cow::Owned(input.replace(';', ""))
    } else {
        Cow::Borrowed(input)
    }
}

pub fn is_reserved_keyword(identifier: &str) -> bool {
    let lowered = identifier.to_ascii_lowercase();
    RESERVED_KEYWORDS.contains(&lowered.as_str())
}

/// True when the identifier can appear unquoted: ASCII letters, digits and
/// underscores, not starting with a digit.
pub fn is_plain_identifier(identifier: &str) -> bool {
    let mut chars = identifier.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Wraps an identifier in double quotes, doubling embedded quotes.
pub fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Escapes a string for a single-quoted literal where backslash is the escape
/// character, then wraps it in quotes.
pub fn backslash_quoted_literal(input: &str) -> String {
    let escaped = input.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{}'", escaped)
}
