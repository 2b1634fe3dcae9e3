//! Filter expression trees.
//!
//! Translation produces a [`FilterExpr`] rather than a string; rendering to
//! a backend language (and its parenthesization) happens at the backend.

use crate::value::{Record, Value};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Comparison applied by a clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cmp {
    /// Equal.
    Eq,
    /// Not equal; null never matches.
    Ne,
    /// Less than.
    Lt,
    /// Less than or equal.
    Lte,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// Member of the operand list.
    In,
    /// Not a member of the operand list; null never matches.
    NotIn,
    /// SQL `LIKE` pattern (`%`, `_`), ASCII case-insensitive.
    Like,
    /// Regular expression search.
    Regex,
    /// Field is null.
    IsNull,
    /// Field is not null.
    IsNotNull,
}

/// Right-hand side of a clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClauseOperand {
    /// No operand (null tests).
    None,
    /// A single value.
    Value(Value),
    /// A list of values.
    List(Vec<Value>),
}

/// A single `field cmp operand` test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    /// Field name.
    pub field: String,
    /// Comparison.
    pub cmp: Cmp,
    /// Operand.
    pub operand: ClauseOperand,
}

impl Clause {
    /// Whether `record` satisfies this clause. Missing fields read as null.
    pub fn matches(&self, record: &Record) -> bool {
        self.evaluate(record, &Patterns::default())
    }

    fn evaluate(&self, record: &Record, patterns: &Patterns) -> bool {
        let actual = record.get(&self.field).unwrap_or(&Value::Null);
        match (&self.cmp, &self.operand) {
            (Cmp::IsNull, _) => actual.is_null(),
            (Cmp::IsNotNull, _) => !actual.is_null(),
            (Cmp::In, ClauseOperand::List(list)) => list.iter().any(|v| equal(actual, v)),
            (Cmp::NotIn, ClauseOperand::List(list)) => {
                !actual.is_null() && !list.iter().any(|v| equal(actual, v))
            }
            (Cmp::Like, ClauseOperand::Value(Value::Text(pattern))) => {
                text_of(actual).is_some_and(|text| like(pattern, &text))
            }
            (Cmp::Regex, ClauseOperand::Value(Value::Text(pattern))) => {
                text_of(actual).is_some_and(|text| patterns.is_match(pattern, &text))
            }
            (cmp, ClauseOperand::Value(expected)) => {
                let Some(ordering) = actual.filter_cmp(expected) else {
                    return false;
                };
                match cmp {
                    Cmp::Eq => ordering == Ordering::Equal,
                    Cmp::Ne => ordering != Ordering::Equal,
                    Cmp::Lt => ordering == Ordering::Less,
                    Cmp::Lte => ordering != Ordering::Greater,
                    Cmp::Gt => ordering == Ordering::Greater,
                    Cmp::Gte => ordering != Ordering::Less,
                    _ => false,
                }
            }
            _ => false,
        }
    }
}

fn equal(a: &Value, b: &Value) -> bool {
    a.filter_cmp(b) == Some(Ordering::Equal)
}

/// Text a value is matched as by `like` and `regex`, following the stored
/// form: booleans are 0/1, floats render as SQLite REAL text.
fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::Text(s) => Some(s.clone()),
        Value::DateTime(dt) => Some(Value::datetime_text(dt)),
        Value::Integer(n) => Some(n.to_string()),
        Value::Bool(b) => Some(i64::from(*b).to_string()),
        Value::Float(f) => Some(Value::float_text(*f)),
        Value::Null | Value::Bytes(_) => None,
    }
}

/// Regular expressions of a filter, compiled once per distinct pattern.
/// Invalid patterns are kept as `None` and match nothing.
#[derive(Debug, Default)]
struct Patterns(HashMap<String, Option<Regex>>);

impl Patterns {
    fn collect(expr: &FilterExpr) -> Self {
        let mut patterns = Self::default();
        patterns.visit(expr);
        patterns
    }

    fn visit(&mut self, expr: &FilterExpr) {
        match expr {
            FilterExpr::Clause(Clause {
                cmp: Cmp::Regex,
                operand: ClauseOperand::Value(Value::Text(pattern)),
                ..
            }) => {
                self.0
                    .entry(pattern.clone())
                    .or_insert_with(|| Regex::new(pattern).ok());
            }
            FilterExpr::And(children) | FilterExpr::Or(children) => {
                for child in children {
                    self.visit(child);
                }
            }
            _ => {}
        }
    }

    fn is_match(&self, pattern: &str, text: &str) -> bool {
        match self.0.get(pattern) {
            Some(compiled) => compiled.as_ref().is_some_and(|re| re.is_match(text)),
            None => Regex::new(pattern).is_ok_and(|re| re.is_match(text)),
        }
    }
}

/// A filter prepared for evaluation over many records.
#[derive(Debug)]
pub struct CompiledFilter<'a> {
    expr: &'a FilterExpr,
    patterns: Patterns,
}

impl CompiledFilter<'_> {
    /// Evaluates the filter against a record.
    pub fn matches(&self, record: &Record) -> bool {
        self.expr.evaluate(record, &self.patterns)
    }
}

/// `LIKE` matching: `%` any run, `_` one character, ASCII case folded.
fn like(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().map(|c| c.to_ascii_lowercase()).collect();
    let t: Vec<char> = text.chars().map(|c| c.to_ascii_lowercase()).collect();
    let (mut pi, mut ti) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while ti < t.len() {
        if pi < p.len() && (p[pi] == '_' || (p[pi] != '%' && p[pi] == t[ti])) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '%' {
            backtrack = Some((pi, ti));
            pi += 1;
        } else if let Some((bp, bt)) = backtrack {
            pi = bp + 1;
            ti = bt + 1;
            backtrack = Some((bp, bt + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|c| *c == '%')
}

/// A boolean filter over records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum FilterExpr {
    /// Matches every record.
    #[default]
    True,
    /// Matches no record.
    False,
    /// A single clause.
    Clause(Clause),
    /// All children match.
    And(Vec<FilterExpr>),
    /// At least one child matches.
    Or(Vec<FilterExpr>),
}

impl FilterExpr {
    /// A single clause.
    pub fn clause(field: impl Into<String>, cmp: Cmp, operand: ClauseOperand) -> Self {
        Self::Clause(Clause {
            field: field.into(),
            cmp,
            operand,
        })
    }

    /// `field == value`, or `field IS NULL` for null.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        match value.into() {
            Value::Null => Self::clause(field, Cmp::IsNull, ClauseOperand::None),
            value => Self::clause(field, Cmp::Eq, ClauseOperand::Value(value)),
        }
    }

    /// Conjunction, flattened. `True` children drop out; a `False` child
    /// makes the whole conjunction `False`.
    pub fn all(children: impl IntoIterator<Item = FilterExpr>) -> Self {
        let mut flat = Vec::new();
        for child in children {
            match child {
                Self::True => {}
                Self::False => return Self::False,
                Self::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Self::True,
            1 => flat.pop().unwrap_or_default(),
            _ => Self::And(flat),
        }
    }

    /// Disjunction, flattened. `False` children drop out; a `True` child
    /// makes the whole disjunction `True`. No children yields `False`.
    pub fn any(children: impl IntoIterator<Item = FilterExpr>) -> Self {
        let mut flat = Vec::new();
        for child in children {
            match child {
                Self::True => return Self::True,
                Self::False => {}
                Self::Or(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Self::False,
            1 => flat.pop().unwrap_or_default(),
            _ => Self::Or(flat),
        }
    }

    /// `self AND other`.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        Self::all([self, other])
    }

    /// `self OR other`.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        Self::any([self, other])
    }

    /// Whether this expression matches everything.
    pub fn is_true(&self) -> bool {
        matches!(self, Self::True)
    }

    /// Every field name referenced, in first-seen order.
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Clause(clause) => {
                if !out.contains(&clause.field.as_str()) {
                    out.push(&clause.field);
                }
            }
            Self::And(children) | Self::Or(children) => {
                for child in children {
                    child.collect_fields(out);
                }
            }
            Self::True | Self::False => {}
        }
    }

    /// Compiles the regular expressions of this filter once, for
    /// evaluation against many records.
    pub fn compile(&self) -> CompiledFilter<'_> {
        CompiledFilter {
            expr: self,
            patterns: Patterns::collect(self),
        }
    }

    /// Evaluates the expression against a single record.
    pub fn matches(&self, record: &Record) -> bool {
        self.compile().matches(record)
    }

    fn evaluate(&self, record: &Record, patterns: &Patterns) -> bool {
        match self {
            Self::True => true,
            Self::False => false,
            Self::Clause(clause) => clause.evaluate(record, patterns),
            Self::And(children) => children.iter().all(|c| c.evaluate(record, patterns)),
            Self::Or(children) => children.iter().any(|c| c.evaluate(record, patterns)),
        }
    }
}
