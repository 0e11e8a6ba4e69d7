//! Statement builder for the CRUD protocol.
//!
//! Every value is bound as a `$n` parameter except [`RawValue`](crate::RawValue)s,
//! which are inlined verbatim, and nulls, which are written as an untyped
//! `NULL` so the server infers the column type. Identifiers are always
//! double-quoted.
//!
//! ```ignore
//! let stmt = query::select_where(&table, &fields! { "name" => "a" }, Joiner::And);
//! assert_eq!(stmt.sql(), r#"SELECT * FROM "widgets" WHERE "name" = $1"#);
//! ```

use crate::entity::Table;
use crate::error::DataError;
use crate::value::{adapt, Fields, Value};
use std::fmt;

/// How conditions are combined in `find_where` / `exists`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Joiner {
    #[default]
    And,
    Or,
}

impl Joiner {
    fn as_sql(self) -> &'static str {
        match self {
            Joiner::And => " AND ",
            Joiner::Or => " OR ",
        }
    }
}

/// SQL text plus its bound parameters, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sql: String,
    params: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn into_parts(self) -> (String, Vec<Value>) {
        (self.sql, self.params)
    }

    /// The statement with every placeholder replaced by its adapted literal.
    ///
    /// For logs and diagnostics; execution binds.
    pub fn render(&self) -> Result<String, DataError> {
        Ok(self.inline_params(|_| true)?.sql)
    }

    /// Replace the parameters selected by `inline` with their adapted
    /// literals and renumber the placeholders that stay bound.
    ///
    /// Placeholders inside quoted literals and identifiers are left alone.
    pub fn inline_params<F>(&self, inline: F) -> Result<Statement, DataError>
    where
        F: Fn(&Value) -> bool,
    {
        let mut sql = String::with_capacity(self.sql.len());
        let mut params = Vec::new();
        let mut renumbered: Vec<Option<usize>> = vec![None; self.params.len()];
        let mut chars = self.sql.chars().peekable();
        let mut in_quote = None;
        while let Some(c) = chars.next() {
            match (c, in_quote) {
                ('\'' | '"', None) => {
                    in_quote = Some(c);
                    sql.push(c);
                }
                (q, Some(open)) if q == open => {
                    in_quote = None;
                    sql.push(c);
                }
                ('$', None) => {
                    let mut digits = String::new();
                    while let Some(d) = chars.peek().copied() {
                        if !d.is_ascii_digit() {
                            break;
                        }
                        digits.push(d);
                        chars.next();
                    }
                    let Ok(index) = digits.parse::<usize>() else {
                        sql.push('$');
                        continue;
                    };
                    let slot = index
                        .checked_sub(1)
                        .filter(|i| *i < self.params.len())
                        .ok_or_else(|| {
                            DataError::Decode(format!("placeholder ${index} has no parameter"))
                        })?;
                    let value = &self.params[slot];
                    if inline(value) {
                        sql.push_str(&adapt(value)?);
                        continue;
                    }
                    let number = match renumbered[slot] {
                        Some(n) => n,
                        None => {
                            params.push(value.clone());
                            renumbered[slot] = Some(params.len());
                            params.len()
                        }
                    };
                    sql.push('$');
                    sql.push_str(&number.to_string());
                }
                _ => sql.push(c),
            }
        }
        Ok(Statement { sql, params })
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.render() {
            Ok(sql) => f.write_str(&sql),
            Err(_) => f.write_str(&self.sql),
        }
    }
}

/// Quote an identifier, doubling embedded quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote a possibly schema-qualified table name, one part at a time.
pub fn quote_table(name: &str) -> String {
    name.split('.').map(quote_ident).collect::<Vec<_>>().join(".")
}

/// Accumulates SQL and parameters, numbering placeholders as it goes.
#[derive(Debug, Default)]
struct SqlWriter {
    sql: String,
    params: Vec<Value>,
}

impl SqlWriter {
    fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    fn push(&mut self, s: &str) {
        self.sql.push_str(s);
    }

    /// Inline a raw value or null, otherwise bind it.
    fn push_value(&mut self, value: &Value) {
        match value {
            Value::Raw(raw) => self.sql.push_str(raw.as_sql()),
            Value::Null => self.sql.push_str("NULL"),
            other => {
                self.params.push(other.clone());
                self.sql.push_str(&format!("${}", self.params.len()));
            }
        }
    }

    /// `"col" = $n`, or `"col" IS NULL` for a null value.
    fn push_condition(&mut self, column: &str, value: &Value) {
        self.push(&quote_ident(column));
        if value.is_null() {
            self.push(" IS NULL");
        } else {
            self.push(" = ");
            self.push_value(value);
        }
    }

    fn push_conditions<'a>(
        &mut self,
        conditions: impl IntoIterator<Item = (&'a str, &'a Value)>,
        joiner: Joiner,
    ) {
        let mut first = true;
        for (column, value) in conditions {
            if first {
                self.push(" WHERE ");
                first = false;
            } else {
                self.push(joiner.as_sql());
            }
            self.push_condition(column, value);
        }
    }

    fn finish(self) -> Statement {
        Statement {
            sql: self.sql,
            params: self.params,
        }
    }
}

/// `INSERT INTO "t" ("c1", "c2") VALUES ($1, $2) RETURNING *`
///
/// With no fields: `INSERT INTO "t" DEFAULT VALUES RETURNING *`.
pub fn insert(table: &Table, fields: &Fields) -> Statement {
    let mut w = SqlWriter::new(format!("INSERT INTO {}", quote_table(table.name())));
    if fields.is_empty() {
        w.push(" DEFAULT VALUES RETURNING *");
        return w.finish();
    }
    let columns: Vec<_> = fields.keys().map(quote_ident).collect();
    w.push(&format!(" ({}) VALUES (", columns.join(", ")));
    for (i, (_, value)) in fields.iter().enumerate() {
        if i > 0 {
            w.push(", ");
        }
        w.push_value(value);
    }
    w.push(") RETURNING *");
    w.finish()
}

/// `UPDATE "t" SET "c1" = $1, "c2" = $2 WHERE "id" = $3 RETURNING *`
pub fn update(table: &Table, fields: &Fields, id: &Value) -> Statement {
    let mut w = SqlWriter::new(format!("UPDATE {} SET ", quote_table(table.name())));
    for (i, (column, value)) in fields.iter().enumerate() {
        if i > 0 {
            w.push(", ");
        }
        w.push(&quote_ident(column));
        w.push(" = ");
        w.push_value(value);
    }
    w.push(" WHERE ");
    w.push_condition(table.id_column(), id);
    w.push(" RETURNING *");
    w.finish()
}

/// `DELETE FROM "t" WHERE "id" = $1`
pub fn delete(table: &Table, id: &Value) -> Statement {
    let mut w = SqlWriter::new(format!("DELETE FROM {} WHERE ", quote_table(table.name())));
    w.push_condition(table.id_column(), id);
    w.finish()
}

/// `SELECT * FROM "t"`
pub fn select_all(table: &Table) -> Statement {
    Statement::new(format!("SELECT * FROM {}", quote_table(table.name())), Vec::new())
}

/// `SELECT * FROM "t" WHERE "id" = $1`
pub fn select_by_id(table: &Table, id: &Value) -> Statement {
    let mut w = SqlWriter::new(format!("SELECT * FROM {} WHERE ", quote_table(table.name())));
    w.push_condition(table.id_column(), id);
    w.finish()
}

/// `SELECT * FROM "t" WHERE "id" = $1 OR "id" = $2 ...`
///
/// Returns `None` for an empty id list; there is nothing to select.
pub fn select_many(table: &Table, ids: &[Value]) -> Option<Statement> {
    if ids.is_empty() {
        return None;
    }
    let mut w = SqlWriter::new(format!("SELECT * FROM {}", quote_table(table.name())));
    w.push_conditions(ids.iter().map(|id| (table.id_column(), id)), Joiner::Or);
    Some(w.finish())
}

/// `SELECT * FROM "t" WHERE "k1" = $1 AND "k2" = $2`
///
/// Empty conditions select every row.
pub fn select_where(table: &Table, conditions: &Fields, joiner: Joiner) -> Statement {
    let mut w = SqlWriter::new(format!("SELECT * FROM {}", quote_table(table.name())));
    w.push_conditions(conditions.iter(), joiner);
    w.finish()
}

/// `SELECT EXISTS(SELECT TRUE FROM "t" WHERE ...) AS "exists" LIMIT 1`
pub fn exists(table: &Table, conditions: &Fields, joiner: Joiner) -> Statement {
    let mut w = SqlWriter::new(format!(
        "SELECT EXISTS(SELECT TRUE FROM {}",
        quote_table(table.name())
    ));
    w.push_conditions(conditions.iter(), joiner);
    w.push(") AS \"exists\" LIMIT 1");
    w.finish()
}

/// `SELECT * FROM "routine"($1, $2, ...)`
pub fn call_routine(name: &str, args: &[Value]) -> Statement {
    let mut w = SqlWriter::new(format!("SELECT * FROM {}(", quote_table(name)));
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            w.push(", ");
        }
        w.push_value(arg);
    }
    w.push(")");
    w.finish()
}

/// Column names of a table, in declaration order.
///
/// A schema-qualified table filters on that schema, otherwise on the
/// schemas of the current search path.
pub fn column_catalog(table: &Table) -> Statement {
    let (schema, name) = split_qualified(table.name());
    let mut sql = String::from(
        "SELECT column_name::text AS column_name FROM information_schema.columns \
         WHERE table_catalog = current_database() AND table_name = $1",
    );
    let mut params = vec![Value::from(name)];
    match schema {
        Some(schema) => {
            sql.push_str(" AND table_schema = $2");
            params.push(Value::from(schema));
        }
        None => sql.push_str(" AND table_schema = ANY(current_schemas(false))"),
    }
    sql.push_str(" ORDER BY ordinal_position");
    Statement::new(sql, params)
}

/// Whether a routine with this name exists in the current database.
///
/// A schema-qualified name also filters on the schema.
pub fn routine_catalog(name: &str) -> Statement {
    let (schema, routine) = split_qualified(name);
    let mut sql = String::from(
        "SELECT EXISTS(SELECT TRUE FROM information_schema.routines \
         WHERE routine_catalog = current_database() AND routine_name = $1",
    );
    let mut params = vec![Value::from(routine)];
    if let Some(schema) = schema {
        sql.push_str(" AND routine_schema = $2");
        params.push(Value::from(schema));
    }
    sql.push_str(") AS \"exists\"");
    Statement::new(sql, params)
}

fn split_qualified(name: &str) -> (Option<&str>, &str) {
    match name.rsplit_once('.') {
        Some((schema, name)) => (Some(schema), name),
        None => (None, name),
    }
}
