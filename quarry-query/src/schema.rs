//! Table blueprints compiled to per-dialect DDL.
//!
//! Only the `CREATE TABLE` / `DROP TABLE IF EXISTS` path that migration and
//! seed tooling calls into lives here; diffing and migration files do not.
//!
//! ```rust
//! use quarry_query::schema::Blueprint;
//! use quarry_query::Dialect;
//!
//! let table = Blueprint::new("posts")
//!     .increments("id")
//!     .string("title", 200)
//!     .text("body")
//!     .nullable()
//!     .integer("user_id")
//!     .timestamps()
//!     .soft_deletes();
//!
//! let sql = table.to_create_sql(Dialect::Sqlite);
//! assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"posts\""));
//! assert!(sql.contains("\"id\" INTEGER PRIMARY KEY AUTOINCREMENT"));
//! ```

use crate::filter::FilterValue;
use crate::sql::{quote_segment, Dialect};

/// Column storage type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Auto-incrementing 32-bit primary key.
    Increments,
    /// Auto-incrementing 64-bit primary key.
    BigIncrements,
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    BigInteger,
    /// Bounded string.
    String(u32),
    /// Unbounded text.
    Text,
    /// Boolean.
    Boolean,
    /// Double precision float.
    Float,
    /// Date and time without zone.
    Timestamp,
    /// JSON document.
    Json,
}

impl ColumnType {
    fn is_auto_increment(&self) -> bool {
        matches!(self, Self::Increments | Self::BigIncrements)
    }

    fn sql_type(&self, dialect: Dialect) -> String {
        match (self, dialect) {
            (Self::Increments, Dialect::Postgres) => "SERIAL PRIMARY KEY".into(),
            (Self::BigIncrements, Dialect::Postgres) => "BIGSERIAL PRIMARY KEY".into(),
            (Self::Increments, Dialect::MySql) => "INT AUTO_INCREMENT PRIMARY KEY".into(),
            (Self::BigIncrements, Dialect::MySql) => "BIGINT AUTO_INCREMENT PRIMARY KEY".into(),
            // SQLite only auto-increments an INTEGER rowid alias.
            (Self::Increments | Self::BigIncrements, Dialect::Sqlite) => {
                "INTEGER PRIMARY KEY AUTOINCREMENT".into()
            }
            (Self::Integer, Dialect::MySql) => "INT".into(),
            (Self::Integer, _) => "INTEGER".into(),
            (Self::BigInteger, Dialect::Sqlite) => "INTEGER".into(),
            (Self::BigInteger, _) => "BIGINT".into(),
            (Self::String(_), Dialect::Sqlite) => "TEXT".into(),
            (Self::String(len), _) => format!("VARCHAR({})", len),
            (Self::Text, _) => "TEXT".into(),
            (Self::Boolean, Dialect::Sqlite) => "INTEGER".into(),
            (Self::Boolean, _) => "BOOLEAN".into(),
            (Self::Float, Dialect::Sqlite) => "REAL".into(),
            (Self::Float, Dialect::MySql) => "DOUBLE".into(),
            (Self::Float, Dialect::Postgres) => "DOUBLE PRECISION".into(),
            (Self::Timestamp, Dialect::Postgres) => "TIMESTAMP".into(),
            (Self::Timestamp, Dialect::MySql) => "DATETIME".into(),
            (Self::Timestamp, Dialect::Sqlite) => "TEXT".into(),
            (Self::Json, Dialect::Postgres) => "JSONB".into(),
            (Self::Json, Dialect::MySql) => "JSON".into(),
            (Self::Json, Dialect::Sqlite) => "TEXT".into(),
        }
    }
}

/// One column in a blueprint.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Storage type.
    pub kind: ColumnType,
    /// Whether `NULL` is allowed.
    pub nullable: bool,
    /// Whether a `UNIQUE` constraint is added.
    pub unique: bool,
    /// Literal default.
    pub default: Option<FilterValue>,
}

impl ColumnDef {
    fn to_sql(&self, dialect: Dialect) -> String {
        let mut parts = vec![quote_segment(&self.name, dialect), self.kind.sql_type(dialect)];

        if !self.kind.is_auto_increment() {
            if !self.nullable {
                parts.push("NOT NULL".to_string());
            }
            if self.unique {
                parts.push("UNIQUE".to_string());
            }
        }

        if let Some(default) = &self.default {
            parts.push(format!("DEFAULT {}", literal(default, dialect)));
        }

        parts.join(" ")
    }
}

/// Render a value as an inline SQL literal for a `DEFAULT` clause.
fn literal(value: &FilterValue, dialect: Dialect) -> String {
    match value {
        FilterValue::Null => "NULL".to_string(),
        FilterValue::Bool(b) => match dialect {
            Dialect::Postgres => if *b { "TRUE" } else { "FALSE" }.to_string(),
            Dialect::MySql | Dialect::Sqlite => if *b { "1" } else { "0" }.to_string(),
        },
        FilterValue::Int(i) => i.to_string(),
        FilterValue::Float(f) => f.to_string(),
        FilterValue::String(s) => format!("'{}'", s.replace('\'', "''")),
        FilterValue::Json(j) => format!("'{}'", j.to_string().replace('\'', "''")),
        FilterValue::List(items) => {
            let json = serde_json::to_string(items).unwrap_or_default();
            format!("'{}'", json.replace('\'', "''"))
        }
    }
}

/// A table definition built column by column.
///
/// Modifiers (`nullable`, `unique`, `default`) apply to the most recently
/// added column and are ignored when no column exists yet.
#[derive(Debug, Clone, PartialEq)]
pub struct Blueprint {
    table: String,
    columns: Vec<ColumnDef>,
    if_not_exists: bool,
}

impl Blueprint {
    /// Start a blueprint for `table`. `IF NOT EXISTS` is on by default.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            if_not_exists: true,
        }
    }

    /// The table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// The columns, in declaration order.
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Toggle `IF NOT EXISTS`.
    pub fn if_not_exists(mut self, enabled: bool) -> Self {
        self.if_not_exists = enabled;
        self
    }

    /// Add a column of any type.
    pub fn column(mut self, name: impl Into<String>, kind: ColumnType) -> Self {
        self.columns.push(ColumnDef {
            name: name.into(),
            kind,
            nullable: false,
            unique: false,
            default: None,
        });
        self
    }

    /// Auto-incrementing integer primary key.
    pub fn increments(self, name: impl Into<String>) -> Self {
        self.column(name, ColumnType::Increments)
    }

    /// Auto-incrementing big integer primary key.
    pub fn big_increments(self, name: impl Into<String>) -> Self {
        self.column(name, ColumnType::BigIncrements)
    }

    /// Integer column.
    pub fn integer(self, name: impl Into<String>) -> Self {
        self.column(name, ColumnType::Integer)
    }

    /// Big integer column.
    pub fn big_integer(self, name: impl Into<String>) -> Self {
        self.column(name, ColumnType::BigInteger)
    }

    /// `VARCHAR(length)` column.
    pub fn string(self, name: impl Into<String>, length: u32) -> Self {
        self.column(name, ColumnType::String(length))
    }

    /// Text column.
    pub fn text(self, name: impl Into<String>) -> Self {
        self.column(name, ColumnType::Text)
    }

    /// Boolean column.
    pub fn boolean(self, name: impl Into<String>) -> Self {
        self.column(name, ColumnType::Boolean)
    }

    /// Float column.
    pub fn float(self, name: impl Into<String>) -> Self {
        self.column(name, ColumnType::Float)
    }

    /// Timestamp column.
    pub fn timestamp(self, name: impl Into<String>) -> Self {
        self.column(name, ColumnType::Timestamp)
    }

    /// JSON column.
    pub fn json(self, name: impl Into<String>) -> Self {
        self.column(name, ColumnType::Json)
    }

    /// Nullable `created_at` and `updated_at` timestamps.
    pub fn timestamps(self) -> Self {
        self.timestamp("created_at")
            .nullable()
            .timestamp("updated_at")
            .nullable()
    }

    /// Nullable `deleted_at` timestamp for soft deletes.
    pub fn soft_deletes(self) -> Self {
        self.timestamp("deleted_at").nullable()
    }

    /// Allow `NULL` in the last column.
    pub fn nullable(mut self) -> Self {
        if let Some(col) = self.columns.last_mut() {
            col.nullable = true;
        }
        self
    }

    /// Add a `UNIQUE` constraint to the last column.
    pub fn unique(mut self) -> Self {
        if let Some(col) = self.columns.last_mut() {
            col.unique = true;
        }
        self
    }

    /// Give the last column a literal default.
    pub fn default(mut self, value: impl Into<FilterValue>) -> Self {
        if let Some(col) = self.columns.last_mut() {
            col.default = Some(value.into());
        }
        self
    }

    /// Compile to `CREATE TABLE`.
    pub fn to_create_sql(&self, dialect: Dialect) -> String {
        let columns: Vec<String> = self.columns.iter().map(|c| c.to_sql(dialect)).collect();
        format!(
            "CREATE TABLE {}{} (\n    {}\n)",
            if self.if_not_exists { "IF NOT EXISTS " } else { "" },
            quote_segment(&self.table, dialect),
            columns.join(",\n    ")
        )
    }
}

/// Compile `DROP TABLE IF EXISTS`.
pub fn drop_if_exists_sql(table: &str, dialect: Dialect) -> String {
    format!("DROP TABLE IF EXISTS {}", quote_segment(table, dialect))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn users() -> Blueprint {
        Blueprint::new("users")
            .increments("id")
            .string("email", 255)
            .unique()
            .boolean("active")
            .default(true)
            .timestamps()
    }

    #[test]
    fn test_postgres_create() {
        assert_eq!(
            users().to_create_sql(Dialect::Postgres),
            "CREATE TABLE IF NOT EXISTS \"users\" (\n    \
             \"id\" SERIAL PRIMARY KEY,\n    \
             \"email\" VARCHAR(255) NOT NULL UNIQUE,\n    \
             \"active\" BOOLEAN NOT NULL DEFAULT TRUE,\n    \
             \"created_at\" TIMESTAMP,\n    \
             \"updated_at\" TIMESTAMP\n)"
        );
    }

    #[test]
    fn test_mysql_create() {
        let sql = users().if_not_exists(false).to_create_sql(Dialect::MySql);
        assert!(sql.starts_with("CREATE TABLE `users` ("));
        assert!(sql.contains("`id` INT AUTO_INCREMENT PRIMARY KEY"));
        assert!(sql.contains("`active` BOOLEAN NOT NULL DEFAULT 1"));
        assert!(sql.contains("`created_at` DATETIME"));
    }

    #[test]
    fn test_sqlite_types() {
        let sql = Blueprint::new("docs")
            .big_increments("id")
            .json("payload")
            .float("score")
            .default(0.5)
            .string("title", 10)
            .default("it's")
            .soft_deletes()
            .to_create_sql(Dialect::Sqlite);
        assert!(sql.contains("\"id\" INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(sql.contains("\"payload\" TEXT NOT NULL"));
        assert!(sql.contains("\"score\" REAL NOT NULL DEFAULT 0.5"));
        assert!(sql.contains("\"title\" TEXT NOT NULL DEFAULT 'it''s'"));
        assert!(sql.contains("\"deleted_at\" TEXT\n)"));
    }

    #[test]
    fn test_modifier_without_column_is_ignored() {
        let blueprint = Blueprint::new("empty").nullable().unique();
        assert!(blueprint.columns().is_empty());
    }

    #[test]
    fn test_drop_if_exists() {
        assert_eq!(drop_if_exists_sql("users", Dialect::MySql), "DROP TABLE IF EXISTS `users`");
    }
}
