//! The SQLite backend.

use crate::config::{Location, SqliteConfig};
use crate::error::{SqliteError, SqliteResult};
use crate::sql::{self, Locator, Statement};
use crate::value::from_sql;
use multipersist_core::{
    AttributeType, Backend, BackendStats, ConnectedType, CoreError, CoreResult, Entity,
    EntityType, Query, Record, StatsSnapshot, ValidationErrors, Value, WriteOutcome, BLANK, TAKEN,
};
use parking_lot::Mutex;
use regex_lite::Regex;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Connection, ErrorCode};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// A backend storing each entity type in a SQLite table.
///
/// Filters, ordering and pagination are rendered to SQL and run by SQLite.
/// `regex` conditions use a `REGEXP` function registered on the
/// connection. UNIQUE and NOT NULL violations reported by SQLite become
/// instance errors (`has already been taken`, `can't be blank`).
///
/// # Thread Safety
///
/// The connection is guarded by a mutex; the backend can be shared across
/// threads and statements run one at a time.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use multipersist_core::{Attribute, AttributeType, Binder, EntityType};
/// use multipersist_sqlite::SqliteBackend;
///
/// let person = EntityType::builder("Person")
///     .attribute(Attribute::new("id", AttributeType::Integer).primary_key())
///     .attribute(Attribute::new("name", AttributeType::String).not_null())
///     .build()
///     .unwrap();
///
/// let backend = Arc::new(SqliteBackend::in_memory().unwrap());
/// let people = Binder::new().bind(&person, backend, true).unwrap();
///
/// let mut jenny = people.build([("name", "Jenny")]).unwrap();
/// assert!(jenny.save().unwrap());
/// assert_eq!(people.find(1).unwrap().unwrap().get("name"), jenny.get("name"));
/// ```
pub struct SqliteBackend {
    conn: Mutex<Connection>,
    config: SqliteConfig,
    stats: BackendStats,
}

impl SqliteBackend {
    /// Opens (or creates) a database with the given configuration.
    ///
    /// # Errors
    ///
    /// - `Missing` if the file does not exist and creation is disabled
    /// - `Io` if the parent directory cannot be created
    /// - `Sqlite` if the database cannot be opened or configured
    pub fn open(config: SqliteConfig) -> SqliteResult<Self> {
        let conn = match &config.location {
            Location::Memory => Connection::open_in_memory()?,
            Location::File(path) => {
                if !path.exists() {
                    if !config.create_if_missing {
                        return Err(SqliteError::Missing(path.display().to_string()));
                    }
                    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                Connection::open(path)?
            }
        };

        conn.busy_timeout(config.busy_timeout)?;
        conn.pragma_update(None, "foreign_keys", config.foreign_keys)?;
        if config.journal_wal && matches!(config.location, Location::File(_)) {
            let mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            debug!(%mode, "journal mode set");
        }
        register_functions(&conn)?;

        debug!(database = %config.describe(), "opened sqlite database");
        Ok(Self {
            conn: Mutex::new(conn),
            config,
            stats: BackendStats::new(),
        })
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot allocate the database.
    pub fn in_memory() -> SqliteResult<Self> {
        Self::open(SqliteConfig::default())
    }

    /// The configuration this backend was opened with.
    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    /// Current call counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// The `SELECT` statement a query renders to, for diagnostics.
    pub fn render_select(&self, ty: &ConnectedType, query: &Query) -> Statement {
        sql::select(ty.entity_type(), query)
    }

    fn execute(&self, stmt: &Statement) -> rusqlite::Result<usize> {
        trace!(sql = %stmt.sql, params = stmt.params.len(), "execute");
        let conn = self.conn.lock();
        let mut prepared = conn.prepare_cached(&stmt.sql)?;
        prepared.execute(params_from_iter(&stmt.params))
    }

    fn query_records(&self, ty: &EntityType, stmt: &Statement) -> SqliteResult<Vec<Record>> {
        trace!(sql = %stmt.sql, params = stmt.params.len(), "query");
        let conn = self.conn.lock();
        let mut prepared = conn.prepare_cached(&stmt.sql)?;
        let columns: Vec<(String, Option<AttributeType>)> = prepared
            .column_names()
            .into_iter()
            .map(|name| (name.to_string(), ty.attribute(name).map(|a| a.ty())))
            .collect();

        let mut rows = prepared.query(params_from_iter(&stmt.params))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Record::new();
            for (i, (name, attribute_type)) in columns.iter().enumerate() {
                let value = from_sql(name, *attribute_type, row.get_ref(i)?)?;
                record.insert(name.clone(), value);
            }
            records.push(record);
        }
        Ok(records)
    }

    fn query_count(&self, stmt: &Statement) -> SqliteResult<u64> {
        trace!(sql = %stmt.sql, params = stmt.params.len(), "count");
        let conn = self.conn.lock();
        let mut prepared = conn.prepare_cached(&stmt.sql)?;
        let n: i64 = prepared.query_row(params_from_iter(&stmt.params), |row| row.get(0))?;
        Ok(u64::try_from(n).unwrap_or(0))
    }

    /// Runs a single-record write, turning constraint violations into a
    /// rejection.
    fn write(&self, ty: &ConnectedType, stmt: &Statement) -> CoreResult<WriteOutcome> {
        match self.execute(stmt) {
            Ok(_) => Ok(WriteOutcome::Written),
            Err(err) => self.reject(ty, err),
        }
    }

    fn reject(&self, ty: &ConnectedType, err: rusqlite::Error) -> CoreResult<WriteOutcome> {
        match constraint_rejection(&err) {
            Some(errors) => {
                warn!(entity = %ty.name(), %errors, "constraint violation");
                self.stats.record_rejection();
                Ok(WriteOutcome::Rejected(errors))
            }
            None => Err(SqliteError::from(err).into()),
        }
    }

    fn locator<'a>(schema: &'a EntityType, entity: &'a Entity, persisted: &'a Record) -> Locator<'a> {
        match (schema.primary_key(), entity.persisted_primary_key_value()) {
            (Some(pk), Some(value)) => Locator::PrimaryKey(pk.name(), value),
            _ => Locator::Values(persisted),
        }
    }
}

impl fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("database", &self.config.describe())
            .finish_non_exhaustive()
    }
}

/// Maps `UNIQUE` / `NOT NULL` failures to per-attribute messages. Other
/// errors, including other constraint kinds, are not rejections.
fn constraint_rejection(err: &rusqlite::Error) -> Option<ValidationErrors> {
    let rusqlite::Error::SqliteFailure(failure, Some(message)) = err else {
        return None;
    };
    if failure.code != ErrorCode::ConstraintViolation {
        return None;
    }
    let (kind, columns) = message.split_once(" constraint failed: ")?;
    let reason = match kind {
        "UNIQUE" => TAKEN,
        "NOT NULL" => BLANK,
        _ => return None,
    };
    let mut errors = ValidationErrors::new();
    for column in columns.split(", ") {
        let name = column.rsplit_once('.').map_or(column, |(_, name)| name);
        errors.add(name, reason);
    }
    Some(errors)
}

/// Registers `regexp(pattern, value)`, which backs `value REGEXP pattern`.
/// Integers are matched on their decimal text and reals on the text SQLite
/// renders for them; blobs and nulls never match.
fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "regexp",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let pattern: Arc<Regex> = ctx.get_or_create_aux(0, |raw| {
                let text = raw.as_str().map_err(|e| rusqlite::Error::UserFunctionError(e.into()))?;
                Regex::new(text).map_err(|e| rusqlite::Error::UserFunctionError(e.into()))
            })?;
            let matched = match ctx.get_raw(1) {
                ValueRef::Text(bytes) => std::str::from_utf8(bytes).is_ok_and(|s| pattern.is_match(s)),
                ValueRef::Integer(n) => pattern.is_match(&n.to_string()),
                ValueRef::Real(f) => pattern.is_match(&Value::float_text(f)),
                ValueRef::Null | ValueRef::Blob(_) => false,
            };
            Ok(matched)
        },
    )
}

impl Backend for SqliteBackend {
    fn describe(&self) -> String {
        self.config.describe()
    }

    fn ensure_schema(&self, ty: &ConnectedType) -> CoreResult<()> {
        self.stats.record_schema_ensure();
        let statements = sql::create_schema(ty.entity_type());
        let conn = self.conn.lock();
        for statement in &statements {
            trace!(sql = %statement, "ensure schema");
            conn.execute_batch(statement).map_err(SqliteError::from)?;
        }
        debug!(entity = %ty.name(), "schema ensured");
        Ok(())
    }

    fn create_record(&self, entity: &mut Entity, ty: &ConnectedType) -> CoreResult<WriteOutcome> {
        self.stats.record_create();
        let schema = ty.entity_type();
        let values: Record = entity
            .record()
            .into_iter()
            .filter(|(_, value)| !value.is_null())
            .collect();

        let stmt = sql::insert(schema, &values);
        let inserted = {
            // The rowid must be read under the same lock as the insert.
            let conn = self.conn.lock();
            trace!(sql = %stmt.sql, params = stmt.params.len(), "insert");
            conn.prepare_cached(&stmt.sql)
                .and_then(|mut prepared| prepared.execute(params_from_iter(&stmt.params)))
                .map(|_| conn.last_insert_rowid())
        };
        let rowid = match inserted {
            Ok(rowid) => rowid,
            Err(err) => return self.reject(ty, err),
        };

        if let Some(pk) = schema.primary_key() {
            if pk.ty() == AttributeType::Integer && entity.get(pk.name()).is_some_and(Value::is_null) {
                entity.assign_primary_key_attribute(rowid)?;
            }
        }
        Ok(WriteOutcome::Written)
    }

    fn update_record(&self, entity: &mut Entity, ty: &ConnectedType) -> CoreResult<WriteOutcome> {
        self.stats.record_update();
        let changes = entity.changed_record();
        if changes.is_empty() {
            return Ok(WriteOutcome::Written);
        }
        let schema = ty.entity_type();
        let persisted = entity.persisted_record();
        let stmt = sql::update_one(schema, &changes, Self::locator(schema, entity, &persisted));
        self.write(ty, &stmt)
    }

    fn destroy_record(&self, entity: &Entity, ty: &ConnectedType) -> CoreResult<()> {
        self.stats.record_destroy();
        let schema = ty.entity_type();
        let persisted = entity.persisted_record();
        let stmt = sql::delete_one(schema, Self::locator(schema, entity, &persisted));
        self.execute(&stmt).map_err(SqliteError::from)?;
        Ok(())
    }

    fn lookup_by_primary_key(
        &self,
        value: &Value,
        ty: &ConnectedType,
    ) -> CoreResult<Option<Entity>> {
        self.stats.record_lookup();
        let schema = ty.entity_type();
        let pk = schema
            .primary_key()
            .ok_or_else(|| CoreError::no_primary_key(schema.name()))?;
        let stmt = sql::lookup(schema, pk.name(), value);
        let mut rows = self.query_records(schema, &stmt)?;
        Ok(rows.pop().map(|row| ty.materialize(row)))
    }

    fn count(&self, ty: &ConnectedType, query: &Query) -> CoreResult<u64> {
        self.stats.record_query();
        Ok(self.query_count(&sql::count(ty.entity_type(), query))?)
    }

    fn select(&self, ty: &ConnectedType, query: &Query) -> CoreResult<Vec<Record>> {
        self.stats.record_query();
        let schema = ty.entity_type();
        Ok(self.query_records(schema, &sql::select(schema, query))?)
    }

    fn update_all(&self, ty: &ConnectedType, query: &Query, values: &Record) -> CoreResult<u64> {
        self.stats.record_bulk_write();
        if values.is_empty() {
            return Ok(0);
        }
        let stmt = sql::update_all(ty.entity_type(), query, values);
        let n = self.execute(&stmt).map_err(SqliteError::from)?;
        Ok(n as u64)
    }

    fn delete_all(&self, ty: &ConnectedType, query: &Query) -> CoreResult<u64> {
        self.stats.record_bulk_write();
        let stmt = sql::delete_all(ty.entity_type(), query);
        let n = self.execute(&stmt).map_err(SqliteError::from)?;
        Ok(n as u64)
    }

    fn stats(&self) -> Option<StatsSnapshot> {
        Some(self.stats.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use multipersist_core::{Attribute, Binder};

    fn items(backend: Arc<SqliteBackend>) -> ConnectedType {
        let ty = EntityType::builder("Item")
            .attribute(Attribute::new("label", AttributeType::String).unique())
            .attribute(Attribute::new("qty", AttributeType::Integer))
            .build()
            .unwrap();
        Binder::new().bind(&ty, backend, true).unwrap()
    }

    #[test]
    fn describes_location() {
        let backend = SqliteBackend::in_memory().unwrap();
        assert_eq!(backend.describe(), "sqlite3::memory:");
        assert_eq!(format!("{backend:?}"), "SqliteBackend { database: \"sqlite3::memory:\", .. }");
    }

    #[test]
    fn missing_file_without_create() {
        let dir = tempfile::tempdir().unwrap();
        let config = SqliteConfig::file(dir.path().join("absent.db")).create_if_missing(false);
        assert!(matches!(SqliteBackend::open(config), Err(SqliteError::Missing(_))));
    }

    #[test]
    fn unique_violation_becomes_taken() {
        let items = items(Arc::new(SqliteBackend::in_memory().unwrap()));
        let mut a = items.build([("label", "bolt")]).unwrap();
        assert!(a.save().unwrap());
        let mut b = items.build([("label", "bolt")]).unwrap();
        assert!(!b.save().unwrap());
        assert_eq!(b.errors().get("label"), [TAKEN]);
        assert!(b.is_new_record());
    }

    #[test]
    fn rows_without_primary_key_are_located_by_value() {
        let items = items(Arc::new(SqliteBackend::in_memory().unwrap()));
        let mut a = items.build([("label", "nut")]).unwrap();
        a.save().unwrap();
        let mut b = items.build([("label", "washer")]).unwrap();
        b.save().unwrap();

        a.set("qty", 3).unwrap();
        assert!(a.save().unwrap());
        let nut = items.filter(serde_json::json!({"label": "nut"})).unwrap().first().unwrap().unwrap();
        assert_eq!(nut.get("qty"), Some(&Value::Integer(3)));

        assert!(b.destroy().unwrap());
        assert_eq!(items.all().count().unwrap(), 1);
    }

    #[test]
    fn regexp_function() {
        let backend = SqliteBackend::in_memory().unwrap();
        let conn = backend.conn.lock();
        let matched: bool = conn
            .query_row("SELECT 'Belinda' REGEXP '^B.*a$'", [], |row| row.get(0))
            .unwrap();
        assert!(matched);
        let numeric: bool = conn.query_row("SELECT 1979 REGEXP '^19'", [], |row| row.get(0)).unwrap();
        assert!(numeric);
        let null: bool = conn.query_row("SELECT NULL REGEXP 'x'", [], |row| row.get(0)).unwrap();
        assert!(!null);
        let real: bool = conn
            .query_row("SELECT 12.5 REGEXP '^12\\.5$'", [], |row| row.get(0))
            .unwrap();
        assert!(real);
        let rendered: String = conn
            .query_row("SELECT CAST(3.0 AS TEXT)", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rendered, Value::float_text(3.0));
    }

    #[test]
    fn constraint_messages_parse() {
        let failure = |message: &str| {
            rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
                Some(message.to_string()),
            )
        };
        let errors = constraint_rejection(&failure("NOT NULL constraint failed: persons.name")).unwrap();
        assert_eq!(errors.get("name"), [BLANK]);
        let errors = constraint_rejection(&failure("UNIQUE constraint failed: t.a, t.b")).unwrap();
        assert_eq!(errors.get("a"), [TAKEN]);
        assert_eq!(errors.get("b"), [TAKEN]);
        assert!(constraint_rejection(&failure("CHECK constraint failed: positive")).is_none());
    }
}
