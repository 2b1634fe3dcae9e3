//! Recordsets: composable queries over one connected type.

use crate::binder::ConnectedType;
use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use crate::query::document::IntoDocument;
use crate::query::filter::FilterExpr;
use crate::query::order::{merge, OrderSpec, OrderTerm};
use crate::query::translate::translate;
use crate::schema::ValidationErrors;
use crate::value::{Record, Value};
use std::mem;

/// The description a backend executes: filter, ordering, window and
/// projection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    filter: FilterExpr,
    order: Vec<OrderTerm>,
    limit: Option<u64>,
    offset: Option<u64>,
    projection: Option<Vec<String>>,
}

impl Query {
    /// Accumulated filter; `True` when unfiltered.
    pub fn filter(&self) -> &FilterExpr {
        &self.filter
    }

    /// Sort keys, highest priority first.
    pub fn order(&self) -> &[OrderTerm] {
        &self.order
    }

    /// Maximum number of records.
    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    /// Number of leading records to skip.
    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    /// Projected attributes; `None` means all.
    pub fn projection(&self) -> Option<&[String]> {
        self.projection.as_deref()
    }
}

/// A lazily executed query over one connected type.
///
/// Builder calls only change the description. Every terminal call runs
/// the query against the backend again, so a recordset can be reused.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use multipersist_core::{Attribute, AttributeType, Binder, EntityType, MemoryBackend};
/// use serde_json::json;
///
/// let person = EntityType::builder("Person")
///     .attribute(Attribute::new("name", AttributeType::String))
///     .attribute(Attribute::new("age", AttributeType::Integer))
///     .build()
///     .unwrap();
/// let people = Binder::new()
///     .bind(&person, Arc::new(MemoryBackend::new()), true)
///     .unwrap();
///
/// for (name, age) in [("George", 50), ("Harry", 19)] {
///     let mut p = people.new_entity();
///     p.set("name", name).unwrap();
///     p.set("age", age).unwrap();
///     p.save().unwrap();
/// }
///
/// let mut adults = people.all();
/// adults.filter(json!({"age": {"gte": 21}})).unwrap().order_by("name").unwrap();
/// assert_eq!(adults.count().unwrap(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct Recordset {
    connected: ConnectedType,
    query: Query,
}

impl Recordset {
    /// An unfiltered recordset over `connected`.
    pub fn new(connected: ConnectedType) -> Self {
        Self {
            connected,
            query: Query::default(),
        }
    }

    /// The connected type queried.
    pub fn connected_type(&self) -> &ConnectedType {
        &self.connected
    }

    /// The current query description.
    pub fn query(&self) -> &Query {
        &self.query
    }

    fn check_field(&self, name: &str) -> CoreResult<()> {
        self.connected.entity_type().require_index(name).map(|_| ())
    }

    fn translate_checked(&self, document: impl IntoDocument) -> CoreResult<FilterExpr> {
        let expr = translate(&document.into_document()?)?;
        for field in expr.fields() {
            self.check_field(field)?;
        }
        Ok(expr)
    }

    /// Narrows to records also matching `document`.
    ///
    /// # Errors
    ///
    /// Translation errors, and `UnknownAttribute` for undeclared fields.
    pub fn filter(&mut self, document: impl IntoDocument) -> CoreResult<&mut Self> {
        let expr = self.translate_checked(document)?;
        self.query.filter = mem::take(&mut self.query.filter).and(expr);
        Ok(self)
    }

    /// Same as [`Recordset::filter`].
    ///
    /// # Errors
    ///
    /// See [`Recordset::filter`].
    pub fn and(&mut self, document: impl IntoDocument) -> CoreResult<&mut Self> {
        self.filter(document)
    }

    /// Widens to records matching the current filter or `document`.
    ///
    /// An unfiltered recordset already matches everything and stays so.
    ///
    /// # Errors
    ///
    /// See [`Recordset::filter`].
    pub fn or(&mut self, document: impl IntoDocument) -> CoreResult<&mut Self> {
        let expr = self.translate_checked(document)?;
        self.query.filter = mem::take(&mut self.query.filter).or(expr);
        Ok(self)
    }

    /// Adds sort keys. A field given again moves to the lowest priority.
    ///
    /// # Errors
    ///
    /// `InvalidOrdering` for a direction other than 1 / -1, and
    /// `UnknownAttribute` for undeclared fields.
    pub fn order_by(&mut self, spec: impl Into<OrderSpec>) -> CoreResult<&mut Self> {
        let terms = spec.into().terms()?;
        for term in &terms {
            self.check_field(&term.field)?;
        }
        merge(&mut self.query.order, terms);
        Ok(self)
    }

    /// Caps the number of records. The last call wins.
    pub fn limit(&mut self, n: u64) -> &mut Self {
        self.query.limit = Some(n);
        self
    }

    /// Skips leading records. The last call wins.
    pub fn offset(&mut self, n: u64) -> &mut Self {
        self.query.offset = Some(n);
        self
    }

    /// Restricts loaded attributes to the union of all projections so far.
    ///
    /// # Errors
    ///
    /// `UnknownAttribute` for undeclared fields.
    pub fn project<I, S>(&mut self, names: I) -> CoreResult<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<String> = names.into_iter().map(|n| n.as_ref().to_string()).collect();
        if names.is_empty() {
            return Ok(self);
        }
        for name in &names {
            self.check_field(name)?;
        }
        let projection = self.query.projection.get_or_insert_with(Vec::new);
        for name in names {
            if !projection.contains(&name) {
                projection.push(name);
            }
        }
        Ok(self)
    }

    /// Loads all attributes again.
    pub fn project_all(&mut self) -> &mut Self {
        self.query.projection = None;
        self
    }

    /// Number of matching records, within limit and offset.
    ///
    /// # Errors
    ///
    /// Backend failures.
    pub fn count(&self) -> CoreResult<u64> {
        self.connected.backend().count(&self.connected, &self.query)
    }

    /// The first matching record.
    ///
    /// # Errors
    ///
    /// Backend failures.
    pub fn first(&self) -> CoreResult<Option<Entity>> {
        let mut query = self.query.clone();
        query.limit = Some(1);
        let rows = self.connected.backend().select(&self.connected, &query)?;
        Ok(rows
            .into_iter()
            .next()
            .map(|row| self.connected.materialize(row)))
    }

    /// Every matching record.
    ///
    /// # Errors
    ///
    /// Backend failures.
    pub fn all(&self) -> CoreResult<Vec<Entity>> {
        Ok(self.iter()?.collect())
    }

    /// Runs the query and iterates the results as persisted instances.
    ///
    /// The backend returns every selected row in one call; only
    /// materialization into instances is lazy. Each call runs the query
    /// again, so writes made after `iter` returns are not seen by that
    /// iterator but are seen by the next one.
    ///
    /// # Errors
    ///
    /// Backend failures.
    pub fn iter(&self) -> CoreResult<Entities> {
        let rows = self.connected.backend().select(&self.connected, &self.query)?;
        Ok(Entities {
            connected: self.connected.clone(),
            rows: rows.into_iter(),
        })
    }

    /// Assigns `values` on every matching record, bypassing validation and
    /// hooks. Returns the number of records changed.
    ///
    /// # Errors
    ///
    /// `UnknownAttribute` for undeclared names, `ValidationFailed` for
    /// values of the wrong type, and backend failures.
    pub fn update<I, K, V>(&self, values: I) -> CoreResult<u64>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let ty = self.connected.entity_type();
        let mut record = Record::new();
        let mut errors = ValidationErrors::new();
        for (name, value) in values {
            let index = ty.require_index(name.as_ref())?;
            let attribute = &ty.attributes()[index];
            let value = attribute.ty().cast(value.into());
            if !attribute.ty().accepts(&value) {
                errors.add(attribute.name(), format!("must be a {}", attribute.ty()));
            }
            record.insert(attribute.name().to_string(), value);
        }
        if !errors.is_empty() {
            return Err(CoreError::ValidationFailed {
                entity: ty.name().to_string(),
                errors,
            });
        }
        if record.is_empty() {
            return Ok(0);
        }
        self.connected
            .backend()
            .update_all(&self.connected, &self.query, &record)
    }

    /// Deletes every matching record, bypassing hooks. Returns the number
    /// of records deleted.
    ///
    /// # Errors
    ///
    /// Backend failures.
    pub fn delete(&self) -> CoreResult<u64> {
        self.connected
            .backend()
            .delete_all(&self.connected, &self.query)
    }
}

/// Iterator over query results, holding the fetched rows and
/// materializing one instance per `next`.
#[derive(Debug)]
pub struct Entities {
    connected: ConnectedType,
    rows: std::vec::IntoIter<Record>,
}

impl Iterator for Entities {
    type Item = Entity;

    fn next(&mut self) -> Option<Entity> {
        self.rows.next().map(|row| self.connected.materialize(row))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

impl ExactSizeIterator for Entities {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, NullBackend};
    use crate::binder::Binder;
    use crate::query::{Direction, Document};
    use crate::schema::{Attribute, AttributeType, EntityType};
    use serde_json::json;
    use std::sync::Arc;

    fn person_type() -> EntityType {
        EntityType::builder("Person")
            .table("persons")
            .attribute(Attribute::new("id", AttributeType::Integer).primary_key())
            .attribute(Attribute::new("name", AttributeType::String).not_null())
            .attribute(Attribute::new("age", AttributeType::Integer))
            .attribute(Attribute::new("city", AttributeType::String))
            .build()
            .unwrap()
    }

    fn seeded() -> ConnectedType {
        let people = Binder::new()
            .bind(&person_type(), Arc::new(MemoryBackend::new()), true)
            .unwrap();
        for (name, age, city) in [
            ("George", 50, "Seattle"),
            ("Margret", 20, "Seattle"),
            ("Bill", 20, "Seattle"),
            ("Belinda", 23, "Seattle"),
            ("Harry", 19, "Seattle"),
            ("Xavier", 79, "Detroit"),
        ] {
            let mut p = people
                .build([("name", Value::from(name)), ("age", age.into()), ("city", city.into())])
                .unwrap();
            assert!(p.save().unwrap());
        }
        people
    }

    fn names(rs: &Recordset) -> Vec<String> {
        rs.iter()
            .unwrap()
            .map(|e| e.get("name").and_then(Value::as_text).unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn builder_accumulates_description() {
        let people = Binder::new()
            .bind(&person_type(), Arc::new(NullBackend::new()), false)
            .unwrap();
        let mut rs = people.all();
        rs.filter(json!({"age": {"gt": 22}}))
            .unwrap()
            .order_by("age")
            .unwrap()
            .order_by(("name", 1))
            .unwrap()
            .order_by("age")
            .unwrap()
            .limit(10)
            .limit(5)
            .offset(2);

        let q = rs.query();
        assert_eq!(q.limit(), Some(5));
        assert_eq!(q.offset(), Some(2));
        assert_eq!(q.order()[0].field, "name");
        assert_eq!(q.order()[1].field, "age");
        assert_eq!(q.order()[1].direction, Direction::Ascending);
        assert_eq!(q.filter().fields(), ["age"]);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let people = seeded();
        let mut rs = people.all();
        assert!(matches!(
            rs.filter(json!({"email": "x"})),
            Err(CoreError::UnknownAttribute { .. })
        ));
        assert!(matches!(rs.order_by("email"), Err(CoreError::UnknownAttribute { .. })));
        assert!(matches!(rs.project(["email"]), Err(CoreError::UnknownAttribute { .. })));
        assert!(matches!(rs.update([("email", "x")]), Err(CoreError::UnknownAttribute { .. })));
        assert!(rs.query().filter().is_true());
    }

    #[test]
    fn filter_then_or() {
        let people = seeded();
        let mut rs = people.all();
        rs.filter(json!({"age": {"gt": 22}, "city": "Seattle"}))
            .unwrap()
            .or(json!({"age": 19}))
            .unwrap()
            .order_by("name")
            .unwrap();
        assert_eq!(names(&rs), ["Belinda", "George", "Harry"]);
    }

    #[test]
    fn or_on_unfiltered_set_keeps_everything() {
        let people = seeded();
        let mut rs = people.all();
        rs.or(json!({"age": 19})).unwrap();
        assert_eq!(rs.count().unwrap(), 6);
    }

    #[test]
    fn ordering_and_window() {
        let people = seeded();
        let mut rs = people.all();
        rs.order_by([("age", -1), ("name", 1)]).unwrap();
        assert_eq!(names(&rs), ["Xavier", "George", "Belinda", "Bill", "Margret", "Harry"]);

        rs.offset(1).limit(2);
        assert_eq!(names(&rs), ["George", "Belinda"]);
        assert_eq!(rs.count().unwrap(), 2);
        assert_eq!(
            rs.first().unwrap().unwrap().get("name"),
            Some(&Value::from("George"))
        );
    }

    #[test]
    fn projection_populates_only_selected_attributes() {
        let people = seeded();
        let mut rs = people.filter(Document::new().field("name", "Harry")).unwrap();
        rs.project(["name"]).unwrap().project(["age", "name"]).unwrap();
        assert_eq!(rs.query().projection(), Some(&["name".to_string(), "age".to_string()][..]));

        let harry = rs.first().unwrap().unwrap();
        assert_eq!(harry.get("age"), Some(&Value::Integer(19)));
        assert_eq!(harry.get("city"), Some(&Value::Null));
        assert!(harry.is_persisted());
        assert!(!harry.is_changed());

        rs.project_all();
        let harry = rs.first().unwrap().unwrap();
        assert_eq!(harry.get("city"), Some(&Value::from("Seattle")));
    }

    #[test]
    fn iteration_is_restartable() {
        let people = seeded();
        let rs = people.all();
        let first_pass: Vec<_> = rs.iter().unwrap().map(|e| e.record()).collect();
        let mut extra = people.build([("name", "Zed")]).unwrap();
        extra.save().unwrap();
        let second_pass = rs.iter().unwrap().count();
        assert_eq!(first_pass.len(), 6);
        assert_eq!(second_pass, 7);
    }

    #[test]
    fn iteration_reads_rows_at_call_time() {
        let people = seeded();
        let rs = people.all();
        let mut pass = rs.iter().unwrap();
        let first = pass.next().unwrap();
        people.build([("name", "Zed")]).unwrap().save().unwrap();
        assert_eq!(pass.len(), 5);
        assert_eq!(first.get("name"), Some(&Value::from("George")));
        assert_eq!(rs.iter().unwrap().len(), 7);
    }

    #[test]
    fn materialized_entities_are_clean() {
        let people = seeded();
        for e in people.all().all().unwrap() {
            assert!(e.is_persisted());
            assert!(e.changed().is_empty());
            assert!(e.connected_type().is_some());
        }
    }

    #[test]
    fn bulk_update_and_delete() {
        let people = seeded();
        let seattle = people.filter(json!({"city": "Seattle"})).unwrap();
        assert_eq!(seattle.update([("city", "Tacoma")]).unwrap(), 5);
        assert_eq!(people.filter(json!({"city": "Tacoma"})).unwrap().count().unwrap(), 5);

        let err = seattle.update([("age", "old")]).unwrap_err();
        assert!(matches!(err, CoreError::ValidationFailed { .. }));

        let young = people.filter(json!({"age": {"lt": 21}})).unwrap();
        assert_eq!(young.delete().unwrap(), 3);
        assert_eq!(people.all().count().unwrap(), 3);
    }

    #[test]
    fn saved_instance_round_trips() {
        let people = seeded();
        let found = people.find(4).unwrap().unwrap();
        assert_eq!(found.get("name"), Some(&Value::from("Belinda")));

        let mut belinda = found.clone();
        belinda.set("age", 24).unwrap();
        belinda.save().unwrap();
        let reloaded = people.find(4).unwrap().unwrap();
        assert_eq!(reloaded.record(), belinda.record());
        assert!(!reloaded.is_changed());
    }
}
