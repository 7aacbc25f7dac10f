//! Parameterized filter queries.
//!
//! Predicates are written against named placeholders (`Branch eq @branch`)
//! and the values travel separately in a parameter map. Caller-supplied
//! strings therefore never become part of the predicate text, and a
//! backend never has to parse a quoted literal.
//!
//! The grammar is deliberately small:
//!
//! ```text
//! filter  := clause ( "and" clause )*
//! clause  := Field ( "eq" | "ge" ) "@" param
//! ```

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::entity::{Entity, EntityValue};
use crate::error::{BackendError, BackendResult};

/// Comparison operators understood by the filter language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ge,
}

impl Comparison {
    fn keyword(self) -> &'static str {
        match self {
            Comparison::Eq => "eq",
            Comparison::Ge => "ge",
        }
    }

    fn parse(token: &str) -> Option<Self> {
        match token {
            "eq" => Some(Comparison::Eq),
            "ge" => Some(Comparison::Ge),
            _ => None,
        }
    }
}

/// A filter predicate, its bound parameters, and an optional projection.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntityQuery {
    filter: String,
    parameters: BTreeMap<String, EntityValue>,
    select: Option<Vec<String>>,
}

impl EntityQuery {
    pub fn builder() -> QueryBuilder {
        QueryBuilder::default()
    }

    /// The predicate text. Contains only field names, operators and placeholders.
    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn parameters(&self) -> &BTreeMap<String, EntityValue> {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&EntityValue> {
        self.parameters.get(name)
    }

    pub fn select(&self) -> Option<&[String]> {
        self.select.as_deref()
    }
}

/// Builds an [`EntityQuery`] clause by clause.
#[derive(Debug, Default)]
pub struct QueryBuilder {
    clauses: Vec<String>,
    parameters: BTreeMap<String, EntityValue>,
    select: Option<Vec<String>>,
}

impl QueryBuilder {
    /// Add `field eq @param`.
    pub fn eq(self, field: &str, param: &str, value: impl Into<EntityValue>) -> Self {
        self.clause(field, Comparison::Eq, param, value.into())
    }

    /// Add `field ge @param`.
    pub fn ge(self, field: &str, param: &str, value: impl Into<EntityValue>) -> Self {
        self.clause(field, Comparison::Ge, param, value.into())
    }

    fn clause(mut self, field: &str, op: Comparison, param: &str, value: EntityValue) -> Self {
        self.clauses
            .push(format!("{field} {} @{param}", op.keyword()));
        self.parameters.insert(param.to_string(), value);
        self
    }

    /// Restrict returned properties to `fields`.
    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn build(self) -> EntityQuery {
        EntityQuery {
            filter: self.clauses.join(" and "),
            parameters: self.parameters,
            select: self.select,
        }
    }
}

#[derive(Debug, Clone)]
struct Clause {
    field: String,
    op: Comparison,
    value: EntityValue,
}

/// A filter checked against its parameters and ready to evaluate.
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    clauses: Vec<Clause>,
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl CompiledFilter {
    /// Parse the predicate and resolve every placeholder.
    ///
    /// An empty predicate matches every entity.
    pub fn compile(query: &EntityQuery) -> BackendResult<Self> {
        let tokens: Vec<&str> = query.filter.split_whitespace().collect();
        let mut clauses = Vec::new();
        let mut rest = tokens.as_slice();

        while !rest.is_empty() {
            let [field, op, param, tail @ ..] = rest else {
                return Err(BackendError::InvalidFilter(format!(
                    "incomplete clause in {:?}",
                    query.filter
                )));
            };
            if !is_identifier(field) {
                return Err(BackendError::InvalidFilter(format!(
                    "invalid field name {field:?}"
                )));
            }
            let op = Comparison::parse(op).ok_or_else(|| {
                BackendError::InvalidFilter(format!("unsupported operator {op:?}"))
            })?;
            let name = param
                .strip_prefix('@')
                .filter(|name| is_identifier(name))
                .ok_or_else(|| {
                    BackendError::InvalidFilter(format!(
                        "expected a named placeholder, found {param:?}"
                    ))
                })?;
            let value = query.parameters.get(name).cloned().ok_or_else(|| {
                BackendError::InvalidFilter(format!("no value bound for @{name}"))
            })?;
            clauses.push(Clause {
                field: field.to_string(),
                op,
                value,
            });

            rest = match tail {
                [] => tail,
                ["and", next @ ..] if !next.is_empty() => next,
                _ => {
                    return Err(BackendError::InvalidFilter(format!(
                        "expected 'and' between clauses in {:?}",
                        query.filter
                    )));
                }
            };
        }

        Ok(Self { clauses })
    }

    pub fn matches(&self, entity: &Entity) -> bool {
        self.clauses.iter().all(|clause| {
            let Some(actual) = entity.get(&clause.field) else {
                return false;
            };
            match (compare(&actual, &clause.value), clause.op) {
                (Some(Ordering::Equal), _) => true,
                (Some(Ordering::Greater), Comparison::Ge) => true,
                _ => false,
            }
        })
    }
}

/// Order two values of compatible types. Mixed types do not compare.
fn compare(left: &EntityValue, right: &EntityValue) -> Option<Ordering> {
    match (left, right) {
        (EntityValue::String(a), EntityValue::String(b)) => Some(a.cmp(b)),
        (EntityValue::Bool(a), EntityValue::Bool(b)) => Some(a.cmp(b)),
        (EntityValue::Int64(a), EntityValue::Int64(b)) => Some(a.cmp(b)),
        (EntityValue::Double(_) | EntityValue::Int64(_), EntityValue::Double(_) | EntityValue::Int64(_)) => {
            left.as_f64()?.partial_cmp(&right.as_f64()?)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(partition: &str, branch: &str, date: &str) -> Entity {
        Entity::new(partition, "rk")
            .with("Branch", branch)
            .with("Date", date)
            .with("bugs", 4.0)
    }

    #[test]
    fn builder_emits_placeholders_only() {
        let query = EntityQuery::builder()
            .eq("PartitionKey", "pk", "p_b")
            .ge("Date", "start_date", "2025-01-01")
            .build();
        assert_eq!(query.filter(), "PartitionKey eq @pk and Date ge @start_date");
        assert_eq!(query.parameter("pk"), Some(&EntityValue::from("p_b")));
    }

    #[test]
    fn eq_and_ge_clauses_evaluate() {
        let query = EntityQuery::builder()
            .eq("Branch", "branch", "main")
            .ge("Date", "start_date", "2025-01-10")
            .build();
        let filter = CompiledFilter::compile(&query).unwrap();

        assert!(filter.matches(&row("p", "main", "2025-01-10")));
        assert!(filter.matches(&row("p", "main", "2025-02-01")));
        assert!(!filter.matches(&row("p", "main", "2025-01-09")));
        assert!(!filter.matches(&row("p", "dev", "2025-02-01")));
    }

    #[test]
    fn adversarial_values_stay_data() {
        let hostile = "main' or PartitionKey eq 'hacked";
        let query = EntityQuery::builder().eq("Branch", "branch", hostile).build();
        assert!(!query.filter().contains(hostile));

        let filter = CompiledFilter::compile(&query).unwrap();
        assert!(!filter.matches(&row("hacked", "main", "2025-01-01")));
        assert!(filter.matches(&row("p", hostile, "2025-01-01")));
    }

    #[test]
    fn numeric_comparison_across_int_and_double() {
        let query = EntityQuery::builder().ge("bugs", "min", 4i64).build();
        let filter = CompiledFilter::compile(&query).unwrap();
        assert!(filter.matches(&row("p", "main", "2025-01-01")));
    }

    #[test]
    fn missing_field_or_type_mismatch_never_matches() {
        let query = EntityQuery::builder().eq("Absent", "x", "v").build();
        let filter = CompiledFilter::compile(&query).unwrap();
        assert!(!filter.matches(&row("p", "main", "2025-01-01")));

        let query = EntityQuery::builder().eq("bugs", "x", "4").build();
        let filter = CompiledFilter::compile(&query).unwrap();
        assert!(!filter.matches(&row("p", "main", "2025-01-01")));
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = CompiledFilter::compile(&EntityQuery::default()).unwrap();
        assert!(filter.matches(&row("p", "main", "2025-01-01")));
    }

    #[test]
    fn malformed_filters_are_rejected() {
        let cases = [
            "PartitionKey eq 'literal'",
            "PartitionKey eq @pk or RowKey eq @pk",
            "PartitionKey ne @pk",
            "PartitionKey eq",
            "PartitionKey eq @pk and",
            "Partition-Key eq @pk",
            "PartitionKey eq @unbound",
        ];
        for filter in cases {
            let query = EntityQuery {
                filter: filter.to_string(),
                parameters: BTreeMap::from([("pk".to_string(), EntityValue::from("p"))]),
                select: None,
            };
            assert!(
                matches!(CompiledFilter::compile(&query), Err(BackendError::InvalidFilter(_))),
                "{filter}"
            );
        }
    }
}
