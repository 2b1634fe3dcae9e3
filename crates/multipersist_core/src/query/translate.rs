//! Condition document to filter expression translation.
//!
//! Translation is pure and recursive:
//!
//! - sibling keys are conjoined, and so are the operators of one field
//! - `or` holds documents that are disjoined; a one-element list is just
//!   that element
//! - a literal null means IS NULL, `ne` null means IS NOT NULL
//! - operator names and `or` may carry a leading `$`

use crate::error::{CoreError, CoreResult};
use crate::query::document::{is_or_key, Document, Node, Operand};
use crate::query::filter::{Cmp, ClauseOperand, FilterExpr};
use crate::value::Value;

/// Translates a condition document into a filter expression.
///
/// Keys other than `or` are field names; they are not checked against a
/// schema here.
///
/// # Errors
///
/// - `UnsupportedOperator` for an operator outside
///   `eq ne lt lte gt gte in nin like regex`
/// - `InvalidCondition` for empty `or` lists, empty operator maps, ordering
///   against null, non-list `in`/`nin` operands, non-text `like`/`regex`
///   operands and invalid regular expressions
///
/// # Example
///
/// ```rust
/// use multipersist_core::{translate, Document};
///
/// let doc = Document::new().op("age", "gt", 22).field("city", "Seattle");
/// let expr = translate(&doc).unwrap();
/// assert_eq!(expr.fields(), ["age", "city"]);
/// ```
pub fn translate(document: &Document) -> CoreResult<FilterExpr> {
    let mut parts = Vec::with_capacity(document.entries().len());
    for (key, node) in document.entries() {
        match node {
            Node::Documents(documents) if is_or_key(key) => {
                if documents.is_empty() {
                    return Err(CoreError::invalid_condition(format!("{key} needs at least one condition")));
                }
                let branches = documents
                    .iter()
                    .map(translate)
                    .collect::<CoreResult<Vec<_>>>()?;
                parts.push(FilterExpr::any(branches));
            }
            Node::Documents(_) => {
                return Err(CoreError::invalid_condition(format!(
                    "field {key} cannot hold nested conditions"
                )))
            }
            Node::Literal(value) => parts.push(FilterExpr::eq(key.as_str(), value.clone())),
            Node::Operators(ops) => {
                if ops.is_empty() {
                    return Err(CoreError::invalid_condition(format!("field {key} has an empty operator map")));
                }
                for (operator, operand) in ops {
                    parts.push(translate_operator(key, operator, operand)?);
                }
            }
        }
    }
    Ok(FilterExpr::all(parts))
}

fn translate_operator(field: &str, operator: &str, operand: &Operand) -> CoreResult<FilterExpr> {
    let name = operator.strip_prefix('$').unwrap_or(operator);
    let cmp = match name {
        "eq" => Cmp::Eq,
        "ne" => Cmp::Ne,
        "lt" => Cmp::Lt,
        "lte" => Cmp::Lte,
        "gt" => Cmp::Gt,
        "gte" => Cmp::Gte,
        "in" => Cmp::In,
        "nin" => Cmp::NotIn,
        "like" => Cmp::Like,
        "regex" => Cmp::Regex,
        _ => return Err(CoreError::unsupported_operator(field, operator)),
    };

    match (cmp, operand) {
        (Cmp::In, Operand::List(values)) => Ok(membership(field, values, false)),
        (Cmp::NotIn, Operand::List(values)) => Ok(membership(field, values, true)),
        (Cmp::In | Cmp::NotIn, Operand::Value(_)) => Err(CoreError::invalid_condition(format!(
            "{operator} on {field} expects a list"
        ))),
        (_, Operand::List(_)) => Err(CoreError::invalid_condition(format!(
            "{operator} on {field} does not take a list"
        ))),
        (Cmp::Eq, Operand::Value(value)) => Ok(FilterExpr::eq(field, value.clone())),
        (Cmp::Ne, Operand::Value(Value::Null)) => {
            Ok(FilterExpr::clause(field, Cmp::IsNotNull, ClauseOperand::None))
        }
        (_, Operand::Value(Value::Null)) => Err(CoreError::invalid_condition(format!(
            "{operator} on {field} cannot compare against null"
        ))),
        (Cmp::Like, Operand::Value(Value::Text(_))) => Ok(single(field, cmp, operand)),
        (Cmp::Regex, Operand::Value(Value::Text(pattern))) => {
            regex_lite::Regex::new(pattern).map_err(|e| {
                CoreError::invalid_condition(format!("invalid regex for {field}: {e}"))
            })?;
            Ok(single(field, cmp, operand))
        }
        (Cmp::Like | Cmp::Regex, Operand::Value(_)) => Err(CoreError::invalid_condition(format!(
            "{operator} on {field} expects a text pattern"
        ))),
        (_, Operand::Value(_)) => Ok(single(field, cmp, operand)),
    }
}

fn single(field: &str, cmp: Cmp, operand: &Operand) -> FilterExpr {
    match operand {
        Operand::Value(value) => FilterExpr::clause(field, cmp, ClauseOperand::Value(value.clone())),
        Operand::List(values) => FilterExpr::clause(field, cmp, ClauseOperand::List(values.clone())),
    }
}

/// `in` / `nin` with null-aware lists: a null member of `in` also matches
/// NULL; a null member of `nin` excludes it (which `nin` already does).
fn membership(field: &str, values: &[Value], negated: bool) -> FilterExpr {
    let has_null = values.iter().any(Value::is_null);
    let list: Vec<Value> = values.iter().filter(|v| !v.is_null()).cloned().collect();
    if negated {
        return FilterExpr::clause(field, Cmp::NotIn, ClauseOperand::List(list));
    }
    let within = FilterExpr::clause(field, Cmp::In, ClauseOperand::List(list));
    if has_null {
        FilterExpr::any([within, FilterExpr::clause(field, Cmp::IsNull, ClauseOperand::None)])
    } else {
        within
    }
}
