//! Typed predicate queries over rows

use std::cmp::Ordering;

use regex_lite::Regex;

use super::{Record, Value};

/// Comparison operator of a predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    In,
    /// SQL-style pattern: `%` matches any run, `_` matches one character
    Like,
    IsNull,
    IsNotNull,
    IsEmpty,
    IsNotEmpty,
}

/// `field <op> value`
#[derive(Debug, Clone)]
pub struct Predicate {
    pub field: String,
    pub op: Operator,
    pub value: Value,
    pattern: Option<Regex>,
}

impl Predicate {
    pub fn new(field: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        let value = value.into();
        let pattern = match (op, &value) {
            (Operator::Like, Value::Text(p)) => like_to_regex(p),
            _ => None,
        };
        Self { field: field.into(), op, value, pattern }
    }

    pub fn matches<R: Record>(&self, row: &R) -> bool {
        let actual = row.field(&self.field);
        match self.op {
            Operator::Eq => actual == self.value,
            Operator::Ne => actual != self.value,
            Operator::Gt => actual.compare(&self.value) == Some(Ordering::Greater),
            Operator::Ge => matches!(actual.compare(&self.value), Some(Ordering::Greater | Ordering::Equal)),
            Operator::Lt => actual.compare(&self.value) == Some(Ordering::Less),
            Operator::Le => matches!(actual.compare(&self.value), Some(Ordering::Less | Ordering::Equal)),
            Operator::In => match &self.value {
                Value::List(items) => items.contains(&actual),
                single => &actual == single,
            },
            Operator::Like => match (&self.pattern, actual.as_text()) {
                (Some(re), Some(text)) => re.is_match(text),
                _ => false,
            },
            Operator::IsNull => actual.is_null(),
            Operator::IsNotNull => !actual.is_null(),
            Operator::IsEmpty => actual.is_empty(),
            Operator::IsNotEmpty => !actual.is_empty(),
        }
    }
}

fn like_to_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');
    for ch in pattern.chars() {
        match ch {
            '%' => re.push_str(".*"),
            '_' => re.push('.'),
            other => re.push_str(&regex_lite::escape(&other.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

/// Sort key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

/// Filtered, ordered read over one table
///
/// Predicates are joined with AND unless [`Query::any`] switches to OR.
/// Rows without an explicit order come back in id order.
#[derive(Debug, Clone, Default)]
pub struct Query {
    predicates: Vec<Predicate>,
    disjunction: bool,
    order_by: Vec<OrderBy>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn eq(self, field: &str, v: impl Into<Value>) -> Self {
        self.with(Predicate::new(field, Operator::Eq, v))
    }

    pub fn ne(self, field: &str, v: impl Into<Value>) -> Self {
        self.with(Predicate::new(field, Operator::Ne, v))
    }

    pub fn gt(self, field: &str, v: impl Into<Value>) -> Self {
        self.with(Predicate::new(field, Operator::Gt, v))
    }

    pub fn ge(self, field: &str, v: impl Into<Value>) -> Self {
        self.with(Predicate::new(field, Operator::Ge, v))
    }

    pub fn lt(self, field: &str, v: impl Into<Value>) -> Self {
        self.with(Predicate::new(field, Operator::Lt, v))
    }

    pub fn le(self, field: &str, v: impl Into<Value>) -> Self {
        self.with(Predicate::new(field, Operator::Le, v))
    }

    pub fn is_in(self, field: &str, values: Vec<Value>) -> Self {
        self.with(Predicate::new(field, Operator::In, Value::List(values)))
    }

    pub fn like(self, field: &str, pattern: &str) -> Self {
        self.with(Predicate::new(field, Operator::Like, pattern))
    }

    pub fn is_null(self, field: &str) -> Self {
        self.with(Predicate::new(field, Operator::IsNull, Value::Null))
    }

    pub fn is_not_null(self, field: &str) -> Self {
        self.with(Predicate::new(field, Operator::IsNotNull, Value::Null))
    }

    pub fn is_empty(self, field: &str) -> Self {
        self.with(Predicate::new(field, Operator::IsEmpty, Value::Null))
    }

    pub fn is_not_empty(self, field: &str) -> Self {
        self.with(Predicate::new(field, Operator::IsNotEmpty, Value::Null))
    }

    /// Join predicates with OR instead of AND
    pub fn any(mut self) -> Self {
        self.disjunction = true;
        self
    }

    pub fn order_by(mut self, field: &str) -> Self {
        self.order_by.push(OrderBy { field: field.to_string(), descending: false });
        self
    }

    pub fn order_by_desc(mut self, field: &str) -> Self {
        self.order_by.push(OrderBy { field: field.to_string(), descending: true });
        self
    }

    pub fn matches<R: Record>(&self, row: &R) -> bool {
        if self.predicates.is_empty() {
            return true;
        }
        if self.disjunction {
            self.predicates.iter().any(|p| p.matches(row))
        } else {
            self.predicates.iter().all(|p| p.matches(row))
        }
    }

    /// An `Eq` predicate on one of `indexed` that every matching row must satisfy
    pub fn index_hint(&self, indexed: &[&str]) -> Option<(&str, &Value)> {
        if self.disjunction {
            return None;
        }
        self.predicates
            .iter()
            .find(|p| p.op == Operator::Eq && indexed.contains(&p.field.as_str()))
            .map(|p| (p.field.as_str(), &p.value))
    }

    /// Order rows by the requested keys, then by id
    pub fn sort<R: Record>(&self, rows: &mut [R]) {
        rows.sort_by(|a, b| {
            for key in &self.order_by {
                let ord = a
                    .field(&key.field)
                    .compare(&b.field(&key.field))
                    .unwrap_or(Ordering::Equal);
                let ord = if key.descending { ord.reverse() } else { ord };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            a.id().cmp(&b.id())
        });
    }
}
