//! Dialects, identifier escaping and placeholder handling.
//!
//! The compiler always emits `?` placeholders. Dialects that use positional
//! placeholders get them renumbered once, on the final text, right before the
//! statement is handed to the row source.

use serde::{Deserialize, Serialize};

/// SQL dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// PostgreSQL: double-quoted identifiers, `$n` placeholders, `ILIKE`.
    #[serde(alias = "postgresql")]
    Postgres,
    /// MySQL / MariaDB: backtick identifiers, `?` placeholders.
    #[serde(alias = "mariadb")]
    MySql,
    /// SQLite: double-quoted identifiers, `?` placeholders.
    #[default]
    #[serde(alias = "sqlite3")]
    Sqlite,
}

impl Dialect {
    /// Character used to quote identifiers.
    pub fn quote_char(&self) -> char {
        match self {
            Self::MySql => '`',
            Self::Postgres | Self::Sqlite => '"',
        }
    }

    /// Get the parameter placeholder for a 1-based index.
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Self::Postgres => format!("${}", index),
            Self::MySql | Self::Sqlite => "?".to_string(),
        }
    }

    /// Whether placeholders must be renumbered before execution.
    pub fn uses_positional_placeholders(&self) -> bool {
        matches!(self, Self::Postgres)
    }

    /// Whether `INSERT ... RETURNING` is used to read generated keys.
    pub fn supports_returning(&self) -> bool {
        matches!(self, Self::Postgres)
    }

    /// Dialect name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
            Self::Sqlite => "sqlite",
        }
    }
}

/// Quote a single identifier segment, doubling embedded quote characters.
pub fn quote_segment(segment: &str, dialect: Dialect) -> String {
    let q = dialect.quote_char();
    let mut out = String::with_capacity(segment.len() + 2);
    out.push(q);
    for c in segment.chars() {
        if c == q {
            out.push(q);
        }
        out.push(c);
    }
    out.push(q);
    out
}

/// Whether `value` looks like an expression rather than a column reference.
fn is_expression(value: &str) -> bool {
    value.contains('(')
        || value.contains(')')
        || value.contains('"')
        || value.contains('`')
        || value.parse::<f64>().is_ok()
}

/// Escape a table or column reference for a dialect.
///
/// - `users.id` quotes each segment, `users.*` keeps the star.
/// - `email as contact` quotes the column; the alias passes through as written.
/// - Expressions (anything with parentheses or quotes, or a numeric literal)
///   and `*` pass through untouched.
///
/// ```rust
/// use quarry_query::sql::{escape_identifier, Dialect};
///
/// assert_eq!(escape_identifier("users.id", Dialect::Postgres), "\"users\".\"id\"");
/// assert_eq!(escape_identifier("users.*", Dialect::MySql), "`users`.*");
/// assert_eq!(escape_identifier("email as contact", Dialect::Sqlite), "\"email\" AS contact");
/// assert_eq!(escape_identifier("COUNT(*)", Dialect::Sqlite), "COUNT(*)");
/// ```
pub fn escape_identifier(value: &str, dialect: Dialect) -> String {
    let value = value.trim();
    if value == "*" || is_expression(value) {
        return value.to_string();
    }

    let alias_at = value
        .as_bytes()
        .windows(4)
        .position(|w| w.eq_ignore_ascii_case(b" as "));
    if let Some(pos) = alias_at {
        let (column, alias) = (&value[..pos], &value[pos + 4..]);
        return format!("{} AS {}", escape_identifier(column, dialect), alias.trim());
    }

    value
        .split('.')
        .map(|segment| {
            if segment == "*" {
                segment.to_string()
            } else {
                quote_segment(segment, dialect)
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Escape a table reference, keeping an optional alias unescaped.
pub fn escape_table(table: &str, alias: Option<&str>, dialect: Dialect) -> String {
    match alias {
        Some(alias) => format!("{} AS {}", escape_identifier(table, dialect), alias),
        None => escape_identifier(table, dialect),
    }
}

/// Rewrite `?` placeholders into `$1..$n`.
///
/// Question marks inside single-quoted literals or quoted identifiers are left
/// alone. Runs exactly once, on the fully rendered statement.
///
/// ```rust
/// use quarry_query::sql::renumber_placeholders;
///
/// let sql = renumber_placeholders("SELECT * FROM t WHERE a = ? AND b = '?' AND c IN (?, ?)");
/// assert_eq!(sql, "SELECT * FROM t WHERE a = $1 AND b = '?' AND c IN ($2, $3)");
/// ```
pub fn renumber_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut index = 0usize;
    let mut quote: Option<char> = None;

    for c in sql.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
                out.push(c);
            }
            None => match c {
                '\'' | '"' | '`' => {
                    quote = Some(c);
                    out.push(c);
                }
                '?' => {
                    index += 1;
                    out.push('$');
                    out.push_str(&index.to_string());
                }
                _ => out.push(c),
            },
        }
    }

    out
}

/// Prepare compiled text for a dialect: renumber placeholders if required.
pub fn finalize(sql: &str, dialect: Dialect) -> String {
    if dialect.uses_positional_placeholders() {
        renumber_placeholders(sql)
    } else {
        sql.to_string()
    }
}

/// Count the `?` placeholders outside quoted sections.
pub fn count_placeholders(sql: &str) -> usize {
    let mut count = 0;
    let mut quote: Option<char> = None;
    for c in sql.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' | '`' => quote = Some(c),
                '?' => count += 1,
                _ => {}
            },
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_quote_segment_doubles_quotes() {
        assert_eq!(quote_segment("has\"quote", Dialect::Postgres), "\"has\"\"quote\"");
        assert_eq!(quote_segment("tick`ed", Dialect::MySql), "`tick``ed`");
    }

    #[test]
    fn test_escape_identifier() {
        assert_eq!(escape_identifier("user", Dialect::Postgres), "\"user\"");
        assert_eq!(escape_identifier("user", Dialect::MySql), "`user`");
        assert_eq!(escape_identifier("*", Dialect::MySql), "*");
        assert_eq!(
            escape_identifier("posts.user_id", Dialect::Sqlite),
            "\"posts\".\"user_id\""
        );
    }

    #[test]
    fn test_escape_alias_passes_through() {
        assert_eq!(
            escape_identifier("users.email AS login", Dialect::Postgres),
            "\"users\".\"email\" AS login"
        );
        assert_eq!(escape_table("users", Some("u"), Dialect::MySql), "`users` AS u");
    }

    #[test]
    fn test_escape_expressions_pass_through() {
        assert_eq!(escape_identifier("LOWER(email)", Dialect::Postgres), "LOWER(email)");
        assert_eq!(escape_identifier("1", Dialect::Postgres), "1");
    }

    #[test]
    fn test_database_placeholder() {
        assert_eq!(Dialect::Postgres.placeholder(1), "$1");
        assert_eq!(Dialect::Postgres.placeholder(5), "$5");
        assert_eq!(Dialect::MySql.placeholder(1), "?");
        assert_eq!(Dialect::Sqlite.placeholder(1), "?");
    }

    #[test]
    fn test_renumber_skips_quoted() {
        let sql = "SELECT \"a?\" FROM t WHERE x = ? AND y = 'why?' AND z = ?";
        assert_eq!(
            renumber_placeholders(sql),
            "SELECT \"a?\" FROM t WHERE x = $1 AND y = 'why?' AND z = $2"
        );
        assert_eq!(count_placeholders(sql), 2);
    }

    #[test]
    fn test_finalize_only_for_postgres() {
        assert_eq!(finalize("a = ?", Dialect::MySql), "a = ?");
        assert_eq!(finalize("a = ?", Dialect::Postgres), "a = $1");
    }
}
