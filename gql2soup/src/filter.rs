//! Compiles the `where` argument of a connection into a predicate.

use std::collections::BTreeMap;

use graphql_parser::query::{Text, Value as GqlValue};
use indexmap::IndexSet;
use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{failure, partition, CompileResult, PredicateError};
use crate::ir::PredicateContainer;
use crate::predicate::{
    combine_predicates, is_empty_predicate, reference_predicate, type_predicate,
    ComparisonOperator, CompoundOperator, Expression, NullOperator, Predicate,
};
use crate::schema::{
    field_path, get_field_info, FieldInfo, FieldLeaf, FilterKind, ObjectInfoMap,
    ReferenceFieldInfo,
};

lazy_static! {
    static ref DATE_ONLY: Regex = Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid date pattern");
}

/// Compiles `where`; `None` when the argument is absent.
pub fn parse_filter<'a, T: Text<'a>>(
    where_: Option<&GqlValue<'a, T>>,
    alias: &str,
    api_name: &str,
    schema: &ObjectInfoMap,
) -> CompileResult<Option<PredicateContainer>> {
    match where_ {
        None => Ok(None),
        Some(GqlValue::Object(object)) => filter_object(object, alias, api_name, schema).map(Some),
        Some(_) => failure(PredicateError::message(format!(
            "The where argument on {} must be an object.",
            api_name
        ))),
    }
}

fn filter_object<'a, T: Text<'a>>(
    object: &BTreeMap<T::Value, GqlValue<'a, T>>,
    alias: &str,
    api_name: &str,
    schema: &ObjectInfoMap,
) -> CompileResult<PredicateContainer> {
    let containers = partition(
        object
            .iter()
            .map(|(key, value)| filter_entry(key.as_ref(), value, alias, api_name, schema)),
    )?;
    Ok(merge_containers(containers, CompoundOperator::And))
}

fn filter_entry<'a, T: Text<'a>>(
    key: &str,
    value: &GqlValue<'a, T>,
    alias: &str,
    api_name: &str,
    schema: &ObjectInfoMap,
) -> CompileResult<PredicateContainer> {
    match key {
        "and" => compound_filter(CompoundOperator::And, key, value, alias, api_name, schema),
        "or" => compound_filter(CompoundOperator::Or, key, value, alias, api_name, schema),
        "not" => match value {
            GqlValue::Object(object) => {
                let inner = filter_object(object, alias, api_name, schema)?;
                // `not: {}` filters nothing, same as `{}`.
                if is_empty_predicate(&inner.predicate) {
                    return Ok(inner);
                }
                Ok(PredicateContainer {
                    predicate: Predicate::Not(Box::new(inner.predicate)),
                    ..inner
                })
            }
            _ => failure(PredicateError::message(
                "Operator not requires an object value.",
            )),
        },
        field_name => {
            let field = get_field_info(api_name, field_name, schema).ok_or_else(|| {
                vec![PredicateError::message(format!(
                    "Field {} for type {} not found.",
                    field_name, api_name
                ))]
            })?;
            match field.spanning(field_name) {
                Some(reference) => spanning_filter(reference, value, alias, api_name, schema),
                None => field_filter(field, field_name, value, alias, api_name),
            }
        }
    }
}

fn compound_filter<'a, T: Text<'a>>(
    operator: CompoundOperator,
    name: &str,
    value: &GqlValue<'a, T>,
    alias: &str,
    api_name: &str,
    schema: &ObjectInfoMap,
) -> CompileResult<PredicateContainer> {
    let GqlValue::List(entries) = value else {
        return failure(PredicateError::message(format!(
            "Operator {} requires a list of objects.",
            name
        )));
    };
    let containers = partition(entries.iter().map(|entry| match entry {
        GqlValue::Object(object) => filter_object(object, alias, api_name, schema),
        _ => failure(PredicateError::message(format!(
            "Every entry of operator {} must be an object.",
            name
        ))),
    }))?;
    Ok(merge_containers(containers, operator))
}

/// A filter on the fields of a referenced record, read through a new join alias.
fn spanning_filter<'a, T: Text<'a>>(
    reference: &ReferenceFieldInfo,
    value: &GqlValue<'a, T>,
    alias: &str,
    api_name: &str,
    schema: &ObjectInfoMap,
) -> CompileResult<PredicateContainer> {
    let GqlValue::Object(object) = value else {
        return failure(PredicateError::message(format!(
            "Filter on relationship {} of type {} must be an object.",
            reference.relationship_name, api_name
        )));
    };
    let target = reference.reference_to_api_name.as_str();
    if !schema.contains_key(target) {
        return failure(PredicateError::MissingObjectInfo(target.to_string()));
    }
    let join_alias = format!("{}.{}", alias, reference.relationship_name);
    let inner = filter_object(object, &join_alias, target, schema)?;

    let mut join_names = vec![join_alias.clone()];
    join_names.extend(inner.join_names);
    let mut join_predicates = vec![
        reference_predicate(alias, &join_alias, &reference.api_name),
        type_predicate(&join_alias, target),
    ];
    join_predicates.extend(inner.join_predicates);

    Ok(PredicateContainer {
        predicate: inner.predicate,
        join_names,
        join_predicates,
    })
}

fn field_filter<'a, T: Text<'a>>(
    field: &FieldInfo,
    field_name: &str,
    value: &GqlValue<'a, T>,
    alias: &str,
    api_name: &str,
) -> CompileResult<PredicateContainer> {
    let GqlValue::Object(operators) = value else {
        return failure(PredicateError::message(format!(
            "Filter on field {} of type {} must be an object of comparison operators.",
            field_name, api_name
        )));
    };
    let left = Expression::json_extract(alias, field_path(field.api_name(), FieldLeaf::Value));
    let kind = field.filter_kind();
    let predicates = partition(operators.iter().map(|(operator, value)| {
        comparison(field_name, kind, operator.as_ref(), value, &left)
    }))?;
    Ok(PredicateContainer {
        predicate: combine_predicates(predicates, CompoundOperator::And),
        join_names: vec![],
        join_predicates: vec![],
    })
}

fn comparison<'a, T: Text<'a>>(
    field_name: &str,
    kind: FilterKind,
    operator_name: &str,
    value: &GqlValue<'a, T>,
    left: &Expression,
) -> CompileResult<Predicate> {
    let operator = ComparisonOperator::from_name(operator_name).ok_or_else(|| {
        vec![PredicateError::message(format!(
            "Comparison operator {} is not supported on field {}.",
            operator_name, field_name
        ))]
    })?;

    if let GqlValue::Null = value {
        let null_operator = match operator {
            ComparisonOperator::Eq => NullOperator::Is,
            ComparisonOperator::Ne => NullOperator::IsNot,
            _ => {
                return failure(PredicateError::message(format!(
                    "Comparison operator {} does not accept null on field {}.",
                    operator_name, field_name
                )))
            }
        };
        return Ok(Predicate::NullComparison {
            left: left.clone(),
            operator: null_operator,
        });
    }

    if !is_operator_allowed(operator, kind) {
        return failure(PredicateError::message(format!(
            "Comparison operator {} is not supported for type {}.",
            operator_name, kind
        )));
    }

    let mismatch = || {
        vec![PredicateError::message(format!(
            "Comparison operator {} on field {} expects a {} value.",
            operator_name,
            field_name,
            expected_value(kind, operator)
        ))]
    };

    if operator.is_set_operator() {
        let GqlValue::List(items) = value else {
            return Err(mismatch());
        };
        let right = list_literal(kind, items).ok_or_else(mismatch)?;
        return Ok(Predicate::comparison(left.clone(), operator, right));
    }

    if kind == FilterKind::DateTime && operator == ComparisonOperator::Eq {
        if let GqlValue::String(date) = value {
            if DATE_ONLY.is_match(date) {
                return Ok(Predicate::Between {
                    expression: left.clone(),
                    start: Expression::DateTimeLiteral(format!("{}T00:00:00.000Z", date)),
                    end: Expression::DateTimeLiteral(format!("{}T23:59:59.999Z", date)),
                });
            }
        }
    }

    let right = scalar_literal(kind, value).ok_or_else(mismatch)?;
    Ok(Predicate::comparison(left.clone(), operator, right))
}

fn is_operator_allowed(operator: ComparisonOperator, kind: FilterKind) -> bool {
    match (operator, kind) {
        (ComparisonOperator::Eq | ComparisonOperator::Ne, _) => true,
        (_, FilterKind::Boolean) => false,
        (ComparisonOperator::Like, FilterKind::Text | FilterKind::Reference) => true,
        (ComparisonOperator::Like, _) => false,
        _ => true,
    }
}

fn expected_value(kind: FilterKind, operator: ComparisonOperator) -> String {
    if operator.is_set_operator() {
        format!("list of {}", kind)
    } else {
        kind.to_string()
    }
}

fn scalar_literal<'a, T: Text<'a>>(kind: FilterKind, value: &GqlValue<'a, T>) -> Option<Expression> {
    match (kind, value) {
        (FilterKind::Boolean, GqlValue::Boolean(b)) => Some(Expression::BooleanLiteral(*b)),
        (FilterKind::Int, GqlValue::Int(n)) => n.as_i64().map(Expression::IntLiteral),
        (FilterKind::Int, GqlValue::String(s)) => s.trim().parse().ok().map(Expression::IntLiteral),
        (FilterKind::Double, GqlValue::Int(n)) => {
            n.as_i64().map(|n| Expression::DoubleLiteral(n as f64))
        }
        (FilterKind::Double, GqlValue::Float(f)) => Some(Expression::DoubleLiteral(*f)),
        (FilterKind::Double, GqlValue::String(s)) => {
            s.trim().parse().ok().map(Expression::DoubleLiteral)
        }
        (FilterKind::Date, GqlValue::String(s)) => Some(Expression::DateLiteral(s.clone())),
        (FilterKind::DateTime, GqlValue::String(s)) => {
            Some(Expression::DateTimeLiteral(s.clone()))
        }
        (
            FilterKind::Text | FilterKind::Id | FilterKind::Reference | FilterKind::Time,
            GqlValue::String(s),
        ) => Some(Expression::StringLiteral(s.clone())),
        _ => None,
    }
}

fn list_literal<'a, T: Text<'a>>(kind: FilterKind, items: &[GqlValue<'a, T>]) -> Option<Expression> {
    match kind {
        FilterKind::Int | FilterKind::Double => items
            .iter()
            .map(|item| match scalar_literal(FilterKind::Double, item)? {
                Expression::DoubleLiteral(n) => Some(n),
                _ => None,
            })
            .collect::<Option<Vec<f64>>>()
            .map(Expression::NumberArray),
        FilterKind::Boolean => None,
        _ => items
            .iter()
            .map(|item| match item {
                GqlValue::String(s) => Some(s.clone()),
                _ => None,
            })
            .collect::<Option<Vec<String>>>()
            .map(Expression::StringArray),
    }
}

/// Combines the predicates of `containers` and unions their joins.
pub(crate) fn merge_containers(
    containers: Vec<PredicateContainer>,
    operator: CompoundOperator,
) -> PredicateContainer {
    let mut predicates = Vec::with_capacity(containers.len());
    let mut join_names = IndexSet::new();
    let mut join_predicates: Vec<Predicate> = Vec::new();
    for container in containers {
        predicates.push(container.predicate);
        join_names.extend(container.join_names);
        for predicate in container.join_predicates {
            if !join_predicates.contains(&predicate) {
                join_predicates.push(predicate);
            }
        }
    }
    PredicateContainer {
        predicate: combine_predicates(predicates, operator),
        join_names: join_names.into_iter().collect(),
        join_predicates,
    }
}
