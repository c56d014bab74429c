//! Wire-facing query types (`spec.md` §6) and [`compile`], which turns a
//! [`QuerySpec`] into the [`clause::Clause`] list [`resolver::Resolver`]
//! joins over.
//!
//! Generalises the teacher's `query/mod.rs` (`Query`/`Find`/`Predicate`
//! closures, built up with a fluent `.find(...).where(...)` API) to the
//! JSON-deserializable `QuerySpec`/`Clause`/`Term` shape `spec.md` §6 wires
//! over the network, compiled down to the `clause`/`pattern` types the
//! `resolver` and `assignment` modules already operate on.
//!
//! Dropped relative to the teacher: `query/aggregation.rs` and
//! `query/aggregator.rs` (`$find` aggregates — count/min/max/average/sum/
//! count-distinct). `spec.md` §1 defers aggregation as part of the
//! deferred full-SPARQL surface, and §6's `QuerySpec` has no aggregate
//! terms, so there is nothing left to generalise them onto.

pub mod assignment;
pub mod clause;
pub mod evaluator;
pub mod pattern;
pub mod projector;
pub mod resolver;

use std::collections::{HashMap, HashSet};

use serde::Deserialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::datom::Value;
use crate::ident::Ident;
use crate::resolver::ResourceResolver;
use crate::storage::ReadStorage;
use crate::wellknown::{expand, looks_like_resource_name};

use self::clause::Clause;
use self::pattern::{Pattern, Predicate};

/// The wire shape a caller submits a query in (`spec.md` §6).
#[derive(Debug, Clone, Deserialize)]
pub struct QuerySpec {
    #[serde(rename = "where")]
    pub where_: Vec<RawClause>,
    #[serde(default)]
    pub select: Option<Vec<String>>,
    #[serde(default)]
    pub prefixes: HashMap<String, String>,
}

pub type RawClause = Vec<Term>;

/// `spec.md` §6's `Term := "?var" | URI | CURIE | {?var: {Operator: Value}}`.
/// `?var`/`URI`/`CURIE` are indistinguishable at the JSON layer (all plain
/// strings); [`compile`] tells them apart by the leading `?`.
///
/// `Literal` catches the remaining wire shapes (a bare JSON number or
/// boolean dropped straight into a value position) that aren't covered by
/// `$eq`-style probes; [`compile_value_term`] routes it through the same
/// [`resolve_value_scalar`] every probe operand goes through. `Plain` and
/// `Probe` are tried first, so strings and maps still take those branches.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Term {
    Plain(String),
    Probe(HashMap<String, HashMap<Operator, JsonValue>>),
    Literal(JsonValue),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum Operator {
    #[serde(rename = "$eq")]
    Eq,
    #[serde(rename = "$ne")]
    Ne,
    #[serde(rename = "$gt")]
    Gt,
    #[serde(rename = "$gte")]
    Gte,
    #[serde(rename = "$lt")]
    Lt,
    #[serde(rename = "$lte")]
    Lte,
    #[serde(rename = "$in")]
    In,
}

#[derive(Debug, Error)]
pub enum QueryError<E> {
    #[error("malformed query: {0}")]
    InvalidQuery(String),
    #[error("unsupported predicate operator")]
    UnsupportedPredicate,
    #[error("ident {0} has no reverse mapping during materialisation")]
    UnresolvableIdent(Ident),
    #[error("storage error: {0}")]
    Storage(E),
}

/// Compiles `spec` into the [`Clause`] list [`resolver::Resolver`] joins
/// over (`spec.md` §4.7 step 1). `Ok(None)` means the query is well-formed
/// but can never match anything — a ground term failed to resolve to a
/// known [`Ident`] — which is success, not [`QueryError::InvalidQuery`]: an
/// AND of clauses where one ground position names a resource that was
/// never interned can never produce a row.
pub fn compile<S: ReadStorage>(
    storage: &S,
    resolver: &ResourceResolver,
    spec: &QuerySpec,
) -> Result<Option<Vec<Clause>>, QueryError<S::Error>> {
    if spec.where_.is_empty() {
        return Err(QueryError::InvalidQuery("`where` must have at least one clause".to_string()));
    }

    let mut clauses = Vec::with_capacity(spec.where_.len());
    for raw in &spec.where_ {
        let [entity_term, attribute_term, value_term] = <[Term; 3]>::try_from(raw.clone())
            .map_err(|_| QueryError::InvalidQuery("each clause must have exactly 3 terms".to_string()))?;

        let Some(entity) = compile_ident_term(storage, resolver, &spec.prefixes, &entity_term)? else {
            return Ok(None);
        };
        let Some(attribute) = compile_ident_term(storage, resolver, &spec.prefixes, &attribute_term)? else {
            return Ok(None);
        };
        let Some(value) = compile_value_term(storage, resolver, &spec.prefixes, &value_term)? else {
            return Ok(None);
        };
        clauses.push(Clause::new().with_entity(entity).with_attribute(attribute).with_value(value));
    }

    if let Some(select) = &spec.select {
        let free: HashSet<String> = clauses.iter().flat_map(Clause::free_variables).map(|name| name.to_string()).collect();
        for variable in select {
            if !free.contains(variable) {
                return Err(QueryError::InvalidQuery(format!("`select` references unbound variable `{variable}`")));
            }
        }
    }

    Ok(Some(clauses))
}

fn compile_ident_term<S: ReadStorage>(
    storage: &S,
    resolver: &ResourceResolver,
    prefixes: &HashMap<String, String>,
    term: &Term,
) -> Result<Option<Pattern<Ident>>, QueryError<S::Error>> {
    match term {
        Term::Plain(raw) if raw.starts_with('?') => Ok(Some(Pattern::variable(raw))),
        Term::Plain(raw) => Ok(resolve_resource(storage, resolver, prefixes, raw).map(Pattern::id)),
        Term::Probe(map) => {
            let (variable, predicates_raw) = single_entry(map)?;
            let mut predicates = Vec::with_capacity(predicates_raw.len());
            for (&operator, operand) in predicates_raw {
                let Some(predicate) = compile_ident_predicate(storage, resolver, prefixes, operator, operand)? else {
                    return Ok(None);
                };
                predicates.push(predicate);
            }
            Ok(Some(Pattern::probe(variable, predicates)))
        }
        Term::Literal(raw) => Err(QueryError::InvalidQuery(format!("expected a resource name, got `{raw}`"))),
    }
}

fn compile_value_term<S: ReadStorage>(
    storage: &S,
    resolver: &ResourceResolver,
    prefixes: &HashMap<String, String>,
    term: &Term,
) -> Result<Option<Pattern<Value>>, QueryError<S::Error>> {
    match term {
        Term::Plain(raw) if raw.starts_with('?') => Ok(Some(Pattern::variable(raw))),
        Term::Plain(raw) => {
            let resolved = resolve_value_scalar(storage, resolver, prefixes, &JsonValue::String(raw.clone()))?;
            Ok(resolved.map(Pattern::value))
        }
        Term::Probe(map) => {
            let (variable, predicates_raw) = single_entry(map)?;
            let mut predicates = Vec::with_capacity(predicates_raw.len());
            for (&operator, operand) in predicates_raw {
                let Some(predicate) = compile_value_predicate(storage, resolver, prefixes, operator, operand)? else {
                    return Ok(None);
                };
                predicates.push(predicate);
            }
            Ok(Some(Pattern::probe(variable, predicates)))
        }
        Term::Literal(raw) => {
            let resolved = resolve_value_scalar(storage, resolver, prefixes, raw)?;
            Ok(resolved.map(Pattern::value))
        }
    }
}

fn single_entry<E>(
    map: &HashMap<String, HashMap<Operator, JsonValue>>,
) -> Result<(&str, &HashMap<Operator, JsonValue>), QueryError<E>> {
    let mut iter = map.iter();
    let Some((variable, predicates)) = iter.next() else {
        return Err(QueryError::InvalidQuery("probe term binds no variable".to_string()));
    };
    if iter.next().is_some() {
        return Err(QueryError::InvalidQuery("probe term must bind exactly one variable".to_string()));
    }
    if predicates.is_empty() {
        return Err(QueryError::InvalidQuery(format!("probe term for `{variable}` carries no predicate")));
    }
    Ok((variable.as_str(), predicates))
}

fn resolve_resource<S: ReadStorage>(storage: &S, resolver: &ResourceResolver, prefixes: &HashMap<String, String>, name: &str) -> Option<Ident> {
    resolver.resolve(storage, &expand(name, prefixes))
}

fn resolve_ident_scalar<S: ReadStorage>(
    storage: &S,
    resolver: &ResourceResolver,
    prefixes: &HashMap<String, String>,
    raw: &JsonValue,
) -> Result<Option<Ident>, QueryError<S::Error>> {
    let name = raw
        .as_str()
        .ok_or_else(|| QueryError::InvalidQuery(format!("expected a resource name, got `{raw}`")))?;
    Ok(resolve_resource(storage, resolver, prefixes, name))
}

fn compile_ident_predicate<S: ReadStorage>(
    storage: &S,
    resolver: &ResourceResolver,
    prefixes: &HashMap<String, String>,
    operator: Operator,
    operand: &JsonValue,
) -> Result<Option<Predicate<Ident>>, QueryError<S::Error>> {
    if operator == Operator::In {
        let array = operand
            .as_array()
            .ok_or_else(|| QueryError::InvalidQuery("`$in` operand must be an array".to_string()))?;
        let mut idents = Vec::with_capacity(array.len());
        for item in array {
            match resolve_ident_scalar(storage, resolver, prefixes, item)? {
                Some(ident) => idents.push(ident),
                None => return Ok(None),
            }
        }
        return Ok(Some(Predicate::In(idents)));
    }
    let Some(ident) = resolve_ident_scalar(storage, resolver, prefixes, operand)? else {
        return Ok(None);
    };
    Ok(Some(match operator {
        Operator::Eq => Predicate::Eq(ident),
        Operator::Ne => Predicate::Ne(ident),
        Operator::Gt => Predicate::Gt(ident),
        Operator::Gte => Predicate::Gte(ident),
        Operator::Lt => Predicate::Lt(ident),
        Operator::Lte => Predicate::Lte(ident),
        Operator::In => unreachable!("handled above"),
    }))
}

/// Converts one JSON scalar into a [`Value`]: a string that expands into a
/// known resource resolves to its `Ident`, a string that parses as an
/// RFC 3339 instant or a bare `YYYY-MM-DD` date becomes `Value::Instant`,
/// and everything else is taken at face value.
fn resolve_value_scalar<S: ReadStorage>(
    storage: &S,
    resolver: &ResourceResolver,
    prefixes: &HashMap<String, String>,
    raw: &JsonValue,
) -> Result<Option<Value>, QueryError<S::Error>> {
    match raw {
        JsonValue::Bool(b) => Ok(Some(Value::Bool(*b))),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Some(Value::Int(i)))
            } else if let Some(f) = n.as_f64() {
                Ok(Some(Value::from(f)))
            } else {
                Err(QueryError::InvalidQuery(format!("unsupported number `{n}`")))
            }
        }
        JsonValue::String(s) => {
            let expanded = expand(s, prefixes);
            if looks_like_resource_name(&expanded) {
                return Ok(resolve_resource(storage, resolver, prefixes, s).map(Value::Ident));
            }
            Ok(Some(parse_instant(s).map(Value::instant).unwrap_or_else(|| Value::Str(s.clone()))))
        }
        other => Err(QueryError::InvalidQuery(format!("unsupported term `{other}`"))),
    }
}

fn compile_value_predicate<S: ReadStorage>(
    storage: &S,
    resolver: &ResourceResolver,
    prefixes: &HashMap<String, String>,
    operator: Operator,
    operand: &JsonValue,
) -> Result<Option<Predicate<Value>>, QueryError<S::Error>> {
    if operator == Operator::In {
        let array = operand
            .as_array()
            .ok_or_else(|| QueryError::InvalidQuery("`$in` operand must be an array".to_string()))?;
        let mut values = Vec::with_capacity(array.len());
        for item in array {
            match resolve_value_scalar(storage, resolver, prefixes, item)? {
                Some(value) => values.push(value),
                None => return Ok(None),
            }
        }
        return Ok(Some(Predicate::In(values)));
    }
    let Some(value) = resolve_value_scalar(storage, resolver, prefixes, operand)? else {
        return Ok(None);
    };
    Ok(Some(match operator {
        Operator::Eq => Predicate::Eq(value),
        Operator::Ne => Predicate::Ne(value),
        Operator::Gt => Predicate::Gt(value),
        Operator::Gte => Predicate::Gte(value),
        Operator::Lt => Predicate::Lt(value),
        Operator::Lte => Predicate::Lte(value),
        Operator::In => unreachable!("handled above"),
    }))
}

/// Parses an RFC 3339 instant, falling back to a bare `YYYY-MM-DD` date
/// taken at midnight UTC (`spec.md` S3's `2020-10-31` predicate bounds use
/// the shorter form).
fn parse_instant(raw: &str) -> Option<OffsetDateTime> {
    if let Ok(instant) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(instant);
    }
    let mut parts = raw.splitn(3, '-');
    let year = parts.next()?.parse::<i32>().ok()?;
    let month = parts.next()?.parse::<u8>().ok()?;
    let day = parts.next()?.parse::<u8>().ok()?;
    let month = time::Month::try_from(month).ok()?;
    let date = time::Date::from_calendar_date(year, month, day).ok()?;
    Some(date.midnight().assume_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datom::Datom;
    use crate::storage::memory::MemoryStorage;
    use crate::storage::WriteStorage;

    fn spec(json: serde_json::Value) -> QuerySpec {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn compiles_a_ground_attribute_and_literal_value_clause() {
        let mut storage = MemoryStorage::new();
        let (attribute, tx) = (Ident::generate(), Ident::generate());
        storage.save(&[Datom::assert(attribute, crate::wellknown::uri_ref(), "qudt:value", tx)]).unwrap();
        let resolver = ResourceResolver::new();

        let spec = spec(serde_json::json!({"where": [["?e", "qudt:value", 42]]}));
        let clauses = compile(&storage, &resolver, &spec).unwrap().unwrap();
        assert_eq!(1, clauses.len());
        assert_eq!(Pattern::id(attribute), clauses[0].attribute);
        assert_eq!(Pattern::value(42i64), clauses[0].value);
    }

    #[test]
    fn unresolvable_ground_term_compiles_to_an_empty_result_set() {
        let storage = MemoryStorage::new();
        let resolver = ResourceResolver::new();
        let spec = spec(serde_json::json!({"where": [["?e", "qudt:value", "?v"]]}));
        assert_eq!(None, compile(&storage, &resolver, &spec).unwrap());
    }

    #[test]
    fn select_referencing_an_unbound_variable_is_rejected() {
        let mut storage = MemoryStorage::new();
        let (attribute, tx) = (Ident::generate(), Ident::generate());
        storage.save(&[Datom::assert(attribute, crate::wellknown::uri_ref(), "qudt:value", tx)]).unwrap();
        let resolver = ResourceResolver::new();

        let spec = spec(serde_json::json!({"where": [["?e", "qudt:value", "?v"]], "select": ["?nope"]}));
        let result = compile(&storage, &resolver, &spec);
        assert!(matches!(result, Err(QueryError::InvalidQuery(_))));
    }

    #[test]
    fn probe_term_compiles_a_predicate_over_a_date_bound() {
        let mut storage = MemoryStorage::new();
        let (attribute, tx) = (Ident::generate(), Ident::generate());
        storage.save(&[Datom::assert(attribute, crate::wellknown::uri_ref(), "qudt:value", tx)]).unwrap();
        let resolver = ResourceResolver::new();

        let spec = spec(serde_json::json!({
            "where": [["?sv", "qudt:value", {"?dt": {"$gt": "2020-10-31", "$lt": "2020-11-02"}}]]
        }));
        let clauses = compile(&storage, &resolver, &spec).unwrap().unwrap();
        match &clauses[0].value {
            Pattern::Probe(name, predicates) => {
                assert_eq!("?dt", name);
                assert_eq!(2, predicates.len());
            }
            other => panic!("expected a probe pattern, got {other:?}"),
        }
    }

    #[test]
    fn malformed_clause_arity_is_rejected() {
        let storage = MemoryStorage::new();
        let resolver = ResourceResolver::new();
        let spec = spec(serde_json::json!({"where": [["?e", "qudt:value"]]}));
        assert!(matches!(compile(&storage, &resolver, &spec), Err(QueryError::InvalidQuery(_))));
    }
}
