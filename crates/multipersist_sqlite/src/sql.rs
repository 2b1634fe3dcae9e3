//! SQL rendering.
//!
//! Every statement carries positional `?` parameters; values never appear
//! in the text. Identifiers are always double-quoted. Each filter clause is
//! rendered in its own parentheses so that composition cannot change
//! precedence.

use crate::value::{column_type, to_sql};
use multipersist_core::{
    AttributeType, Clause, ClauseOperand, Cmp, EntityType, FilterExpr, OrderTerm, Query, Record,
    Value,
};
use rusqlite::types::Value as SqlValue;

/// Rendered SQL with its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// SQL text with `?` placeholders.
    pub sql: String,
    /// Parameters, in placeholder order.
    pub params: Vec<SqlValue>,
}

impl Statement {
    fn new() -> Self {
        Self {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    fn bind(&mut self, value: &Value) {
        self.sql.push('?');
        self.params.push(to_sql(value));
    }

    fn bind_raw(&mut self, value: SqlValue) {
        self.sql.push('?');
        self.params.push(value);
    }
}

/// Quotes an identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn column_list<'a>(names: impl IntoIterator<Item = &'a str>) -> String {
    names
        .into_iter()
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Renders a filter expression into `stmt`.
pub(crate) fn render_filter(expr: &FilterExpr, stmt: &mut Statement) {
    match expr {
        FilterExpr::True => stmt.push("(1 = 1)"),
        FilterExpr::False => stmt.push("(0 = 1)"),
        FilterExpr::Clause(clause) => render_clause(clause, stmt),
        FilterExpr::And(children) => render_junction(children, " AND ", stmt),
        FilterExpr::Or(children) => render_junction(children, " OR ", stmt),
    }
}

fn render_junction(children: &[FilterExpr], joiner: &str, stmt: &mut Statement) {
    stmt.push("(");
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            stmt.push(joiner);
        }
        render_filter(child, stmt);
    }
    stmt.push(")");
}

fn render_clause(clause: &Clause, stmt: &mut Statement) {
    let column = quote_ident(&clause.field);
    match (clause.cmp, &clause.operand) {
        (Cmp::IsNull, _) => stmt.push(&format!("({column} IS NULL)")),
        (Cmp::IsNotNull, _) => stmt.push(&format!("({column} IS NOT NULL)")),
        (Cmp::In, ClauseOperand::List(values)) if values.is_empty() => stmt.push("(0 = 1)"),
        // Nothing is excluded, but null still never matches `nin`.
        (Cmp::NotIn, ClauseOperand::List(values)) if values.is_empty() => {
            stmt.push(&format!("({column} IS NOT NULL)"));
        }
        (cmp @ (Cmp::In | Cmp::NotIn), ClauseOperand::List(values)) => {
            let keyword = if cmp == Cmp::In { "IN" } else { "NOT IN" };
            stmt.push(&format!("({column} {keyword} ("));
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    stmt.push(", ");
                }
                stmt.bind(value);
            }
            stmt.push("))");
        }
        (cmp, ClauseOperand::Value(value)) => {
            let op = match cmp {
                Cmp::Eq => "=",
                Cmp::Ne => "<>",
                Cmp::Lt => "<",
                Cmp::Lte => "<=",
                Cmp::Gt => ">",
                Cmp::Gte => ">=",
                Cmp::Like => "LIKE",
                Cmp::Regex => "REGEXP",
                _ => {
                    stmt.push("(0 = 1)");
                    return;
                }
            };
            stmt.push(&format!("({column} {op} "));
            stmt.bind(value);
            stmt.push(")");
        }
        _ => stmt.push("(0 = 1)"),
    }
}

fn render_where(filter: &FilterExpr, stmt: &mut Statement) {
    if !filter.is_true() {
        stmt.push(" WHERE ");
        render_filter(filter, stmt);
    }
}

/// Renders `ORDER BY`. `rowid` is the final key so ties come back in
/// insertion order.
fn render_order(order: &[OrderTerm], stmt: &mut Statement) {
    stmt.push(" ORDER BY ");
    for term in order {
        stmt.push(&format!("{} {}, ", quote_ident(&term.field), term.direction));
    }
    stmt.push("rowid ASC");
}

fn render_window(query: &Query, stmt: &mut Statement) {
    let clamp = |n: u64| i64::try_from(n).unwrap_or(i64::MAX);
    match (query.limit(), query.offset()) {
        (None, None) => {}
        (limit, offset) => {
            stmt.push(" LIMIT ");
            stmt.bind_raw(SqlValue::Integer(limit.map_or(-1, clamp)));
            if let Some(offset) = offset {
                stmt.push(" OFFSET ");
                stmt.bind_raw(SqlValue::Integer(clamp(offset)));
            }
        }
    }
}

/// Renders the body shared by every query statement:
/// `FROM t WHERE .. ORDER BY .. LIMIT ..`.
fn render_from(table: &str, query: &Query, stmt: &mut Statement) {
    stmt.push(&format!(" FROM {}", quote_ident(table)));
    render_where(query.filter(), stmt);
    render_order(query.order(), stmt);
    render_window(query, stmt);
}

/// `SELECT` of the projected (or all declared) columns.
pub fn select(ty: &EntityType, query: &Query) -> Statement {
    let mut stmt = Statement::new();
    let columns = match query.projection() {
        Some(fields) => column_list(fields.iter().map(String::as_str)),
        None => column_list(ty.attributes().iter().map(|a| a.name())),
    };
    stmt.push(&format!("SELECT {columns}"));
    render_from(ty.table_name(), query, &mut stmt);
    stmt
}

/// `COUNT` of the rows a query selects, honoring limit and offset.
pub fn count(ty: &EntityType, query: &Query) -> Statement {
    let mut stmt = Statement::new();
    stmt.push("SELECT COUNT(*) FROM (SELECT 1");
    render_from(ty.table_name(), query, &mut stmt);
    stmt.push(")");
    stmt
}

fn rowid_subquery(ty: &EntityType, query: &Query, stmt: &mut Statement) {
    stmt.push(" WHERE rowid IN (SELECT rowid");
    render_from(ty.table_name(), query, stmt);
    stmt.push(")");
}

/// Bulk `UPDATE` of the rows a query selects.
pub fn update_all(ty: &EntityType, query: &Query, values: &Record) -> Statement {
    let mut stmt = Statement::new();
    stmt.push(&format!("UPDATE {} SET ", quote_ident(ty.table_name())));
    render_assignments(values, &mut stmt);
    rowid_subquery(ty, query, &mut stmt);
    stmt
}

/// Bulk `DELETE` of the rows a query selects.
pub fn delete_all(ty: &EntityType, query: &Query) -> Statement {
    let mut stmt = Statement::new();
    stmt.push(&format!("DELETE FROM {}", quote_ident(ty.table_name())));
    rowid_subquery(ty, query, &mut stmt);
    stmt
}

fn render_assignments(values: &Record, stmt: &mut Statement) {
    for (i, (name, value)) in values.iter().enumerate() {
        if i > 0 {
            stmt.push(", ");
        }
        stmt.push(&format!("{} = ", quote_ident(name)));
        stmt.bind(value);
    }
}

/// `INSERT` of the given columns; `DEFAULT VALUES` when there are none.
pub fn insert(ty: &EntityType, values: &Record) -> Statement {
    let mut stmt = Statement::new();
    let table = quote_ident(ty.table_name());
    if values.is_empty() {
        stmt.push(&format!("INSERT INTO {table} DEFAULT VALUES"));
        return stmt;
    }
    let columns = column_list(values.keys().map(String::as_str));
    stmt.push(&format!("INSERT INTO {table} ({columns}) VALUES ("));
    for (i, value) in values.values().enumerate() {
        if i > 0 {
            stmt.push(", ");
        }
        stmt.bind(value);
    }
    stmt.push(")");
    stmt
}

/// How a single stored row is addressed.
#[derive(Debug, Clone, Copy)]
pub enum Locator<'a> {
    /// By primary key value.
    PrimaryKey(&'a str, &'a Value),
    /// By every persisted value; the first matching row.
    Values(&'a Record),
}

fn render_locator(ty: &EntityType, locator: Locator<'_>, stmt: &mut Statement) {
    match locator {
        Locator::PrimaryKey(column, value) => {
            stmt.push(&format!(" WHERE {} = ", quote_ident(column)));
            stmt.bind(value);
        }
        Locator::Values(record) => {
            stmt.push(&format!(
                " WHERE rowid = (SELECT rowid FROM {}",
                quote_ident(ty.table_name())
            ));
            for (i, (name, value)) in record.iter().enumerate() {
                stmt.push(if i == 0 { " WHERE " } else { " AND " });
                stmt.push(&format!("{} IS ", quote_ident(name)));
                stmt.bind(value);
            }
            stmt.push(" ORDER BY rowid LIMIT 1)");
        }
    }
}

/// `UPDATE` of one row.
pub fn update_one(ty: &EntityType, values: &Record, locator: Locator<'_>) -> Statement {
    let mut stmt = Statement::new();
    stmt.push(&format!("UPDATE {} SET ", quote_ident(ty.table_name())));
    render_assignments(values, &mut stmt);
    render_locator(ty, locator, &mut stmt);
    stmt
}

/// `DELETE` of one row.
pub fn delete_one(ty: &EntityType, locator: Locator<'_>) -> Statement {
    let mut stmt = Statement::new();
    stmt.push(&format!("DELETE FROM {}", quote_ident(ty.table_name())));
    render_locator(ty, locator, &mut stmt);
    stmt
}

/// Single-row `SELECT` by primary key.
pub fn lookup(ty: &EntityType, column: &str, value: &Value) -> Statement {
    let mut stmt = Statement::new();
    stmt.push(&format!(
        "SELECT {} FROM {} WHERE {} = ",
        column_list(ty.attributes().iter().map(|a| a.name())),
        quote_ident(ty.table_name()),
        quote_ident(column)
    ));
    stmt.bind(value);
    stmt.push(" LIMIT 1");
    stmt
}

/// `CREATE TABLE IF NOT EXISTS` followed by one `CREATE INDEX IF NOT
/// EXISTS` per indexed attribute.
pub fn create_schema(ty: &EntityType) -> Vec<String> {
    let table = ty.table_name();
    let columns: Vec<String> = ty
        .attributes()
        .iter()
        .map(|a| {
            let mut column = format!("{} {}", quote_ident(a.name()), column_type(a.ty()));
            if a.is_primary_key() {
                // INTEGER PRIMARY KEY aliases the rowid and is generated.
                if a.ty() == AttributeType::Integer {
                    column.push_str(" PRIMARY KEY");
                } else {
                    column.push_str(" PRIMARY KEY NOT NULL");
                }
            } else {
                if a.is_not_null() {
                    column.push_str(" NOT NULL");
                }
                if a.is_unique() {
                    column.push_str(" UNIQUE");
                }
            }
            column
        })
        .collect();

    let mut statements = vec![format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_ident(table),
        columns.join(", ")
    )];
    statements.extend(ty.indexed_attributes().map(|a| {
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
            quote_ident(&format!("idx_{table}_{}", a.name())),
            quote_ident(table),
            quote_ident(a.name())
        )
    }));
    statements
}

#[cfg(test)]
mod tests {
    use super::*;
    use multipersist_core::{Attribute, Document};

    fn person() -> EntityType {
        EntityType::builder("Person")
            .table("persons")
            .attribute(Attribute::new("id", AttributeType::Integer).primary_key())
            .attribute(Attribute::new("name", AttributeType::String).not_null())
            .attribute(Attribute::new("email", AttributeType::String).unique().indexed())
            .attribute(Attribute::new("age", AttributeType::Integer))
            .build()
            .unwrap()
    }

    fn filter(json: serde_json::Value) -> Statement {
        let doc = Document::from_json(&json).unwrap();
        let expr = multipersist_core::translate(&doc).unwrap();
        let mut stmt = Statement::new();
        render_filter(&expr, &mut stmt);
        stmt
    }

    #[test]
    fn quotes_identifiers() {
        assert_eq!(quote_ident("age"), "\"age\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn parenthesizes_every_clause() {
        let stmt = filter(serde_json::json!({
            "or": [{"age": {"gt": 22}, "city": "Seattle"}, {"age": 19}]
        }));
        assert_eq!(
            stmt.sql,
            "(((\"age\" > ?) AND (\"city\" = ?)) OR (\"age\" = ?))"
        );
        assert_eq!(
            stmt.params,
            [
                SqlValue::Integer(22),
                SqlValue::Text("Seattle".into()),
                SqlValue::Integer(19)
            ]
        );
    }

    #[test]
    fn membership_and_nulls() {
        assert_eq!(filter(serde_json::json!({"age": {"in": []}})).sql, "(0 = 1)");
        assert_eq!(
            filter(serde_json::json!({"age": {"nin": []}})).sql,
            "(\"age\" IS NOT NULL)"
        );
        assert_eq!(
            filter(serde_json::json!({"age": {"in": [1, 2]}})).sql,
            "(\"age\" IN (?, ?))"
        );
        assert_eq!(filter(serde_json::json!({"age": null})).sql, "(\"age\" IS NULL)");
        assert_eq!(
            filter(serde_json::json!({"name": {"regex": "^B"}})).sql,
            "(\"name\" REGEXP ?)"
        );
    }

    #[test]
    fn select_with_window() {
        let ty = person();
        let mut query = Query::default();
        assert_eq!(
            select(&ty, &query).sql,
            "SELECT \"id\", \"name\", \"email\", \"age\" FROM \"persons\" ORDER BY rowid ASC"
        );

        let people = multipersist_core::Binder::new()
            .bind(&ty, std::sync::Arc::new(multipersist_core::NullBackend::new()), false)
            .unwrap();
        let mut set = people.all();
        set.filter(serde_json::json!({"age": {"gte": 20}}))
            .unwrap()
            .order_by(("age", -1))
            .unwrap()
            .offset(2);
        query = set.query().clone();

        let stmt = select(&ty, &query);
        assert_eq!(
            stmt.sql,
            "SELECT \"id\", \"name\", \"email\", \"age\" FROM \"persons\" WHERE (\"age\" >= ?) \
             ORDER BY \"age\" DESC, rowid ASC LIMIT ? OFFSET ?"
        );
        assert_eq!(
            stmt.params,
            [SqlValue::Integer(20), SqlValue::Integer(-1), SqlValue::Integer(2)]
        );
        assert!(count(&ty, &query).sql.starts_with("SELECT COUNT(*) FROM (SELECT 1 FROM"));
    }

    #[test]
    fn schema_statements() {
        let statements = create_schema(&person());
        assert_eq!(
            statements[0],
            "CREATE TABLE IF NOT EXISTS \"persons\" (\"id\" INTEGER PRIMARY KEY, \
             \"name\" TEXT NOT NULL, \"email\" TEXT UNIQUE, \"age\" INTEGER)"
        );
        assert_eq!(
            statements[1],
            "CREATE INDEX IF NOT EXISTS \"idx_persons_email\" ON \"persons\" (\"email\")"
        );
    }

    #[test]
    fn single_row_writes() {
        let ty = person();
        let values: Record = [("name".to_string(), Value::from("Jo"))].into_iter().collect();
        let key = Value::Integer(4);
        let stmt = update_one(&ty, &values, Locator::PrimaryKey("id", &key));
        assert_eq!(stmt.sql, "UPDATE \"persons\" SET \"name\" = ? WHERE \"id\" = ?");

        let persisted: Record = [
            ("age".to_string(), Value::Null),
            ("name".to_string(), Value::from("Al")),
        ]
        .into_iter()
        .collect();
        let stmt = delete_one(&ty, Locator::Values(&persisted));
        assert_eq!(
            stmt.sql,
            "DELETE FROM \"persons\" WHERE rowid = (SELECT rowid FROM \"persons\" \
             WHERE \"age\" IS ? AND \"name\" IS ? ORDER BY rowid LIMIT 1)"
        );
        assert_eq!(stmt.params, [SqlValue::Null, SqlValue::Text("Al".into())]);

        assert_eq!(
            insert(&ty, &Record::new()).sql,
            "INSERT INTO \"persons\" DEFAULT VALUES"
        );
    }
}
