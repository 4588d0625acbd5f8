//! Compiles the `orderBy` argument of a connection.

use std::collections::BTreeMap;

use graphql_parser::query::{Text, Value as GqlValue};

use crate::error::{collect, failure, partition, CompileResult, PredicateError};
use crate::ir::{OrderBy, OrderByContainer};
use crate::predicate::{reference_predicate, type_predicate, Expression};
use crate::schema::{field_path, get_field_info, FieldLeaf, ObjectInfoMap};

/// Compiles `orderBy` into one container per ordered field, in order.
///
/// A single object orders by its one field; a list orders by each entry in turn.
pub fn parse_order_by<'a, T: Text<'a>>(
    order_by: Option<&GqlValue<'a, T>>,
    alias: &str,
    api_name: &str,
    schema: &ObjectInfoMap,
) -> CompileResult<Vec<OrderByContainer>> {
    match order_by {
        None => Ok(vec![]),
        Some(GqlValue::Object(object)) => {
            order_by_container(object, alias, api_name, schema).map(|container| vec![container])
        }
        Some(GqlValue::List(entries)) => partition(entries.iter().map(|entry| match entry {
            GqlValue::Object(object) => order_by_container(object, alias, api_name, schema),
            _ => failure(PredicateError::message(format!(
                "Every orderBy entry on {} must be an object.",
                api_name
            ))),
        })),
        Some(_) => failure(PredicateError::message(format!(
            "The orderBy argument on {} must be an object or a list of objects.",
            api_name
        ))),
    }
}

fn order_by_container<'a, T: Text<'a>>(
    object: &BTreeMap<T::Value, GqlValue<'a, T>>,
    alias: &str,
    api_name: &str,
    schema: &ObjectInfoMap,
) -> CompileResult<OrderByContainer> {
    let mut entries = object.iter();
    let (field_name, value) = match (entries.next(), entries.next()) {
        (Some((key, value)), None) => (key.as_ref(), value),
        _ => {
            return failure(PredicateError::message(format!(
                "Each orderBy entry on {} must name exactly one field; use a list to order by several fields.",
                api_name
            )))
        }
    };
    let field = get_field_info(api_name, field_name, schema).ok_or_else(|| {
        vec![PredicateError::message(format!(
            "Field {} for type {} not found.",
            field_name, api_name
        ))]
    })?;
    let GqlValue::Object(options) = value else {
        return failure(PredicateError::message(format!(
            "orderBy on field {} of type {} must be an object.",
            field_name, api_name
        )));
    };

    if let Some(reference) = field.spanning(field_name) {
        let target = reference.reference_to_api_name.as_str();
        if !schema.contains_key(target) {
            return failure(PredicateError::MissingObjectInfo(target.to_string()));
        }
        let join_alias = format!("{}.{}", alias, reference.relationship_name);
        let inner = order_by_container(options, &join_alias, target, schema)?;

        let mut join_names = vec![join_alias.clone()];
        join_names.extend(inner.join_names);
        let mut join_predicates = vec![
            reference_predicate(alias, &join_alias, &reference.api_name),
            type_predicate(&join_alias, target),
        ];
        join_predicates.extend(inner.join_predicates);
        return Ok(OrderByContainer {
            order_by: inner.order_by,
            join_names,
            join_predicates,
        });
    }

    let mut errors = Vec::new();
    let mut asc = true;
    let mut nulls_first = false;
    for (key, option) in options {
        match key.as_ref() {
            "order" => {
                if let Some(value) = collect(enum_option(option, "order", "ASC", "DESC"), &mut errors) {
                    asc = value;
                }
            }
            "nulls" => {
                if let Some(value) = collect(enum_option(option, "nulls", "FIRST", "LAST"), &mut errors)
                {
                    nulls_first = value;
                }
            }
            other => errors.push(PredicateError::message(format!(
                "Unknown orderBy option {} on field {}.",
                other, field_name
            ))),
        }
    }
    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(OrderByContainer {
        order_by: OrderBy {
            asc,
            nulls_first,
            extract: Expression::json_extract(
                alias,
                field_path(field.api_name(), FieldLeaf::Value),
            ),
        },
        join_names: vec![],
        join_predicates: vec![],
    })
}

/// `true` for `when_true`, `false` for `when_false`.
fn enum_option<'a, T: Text<'a>>(
    value: &GqlValue<'a, T>,
    name: &str,
    when_true: &str,
    when_false: &str,
) -> CompileResult<bool> {
    match value {
        GqlValue::Enum(e) if e.as_ref() == when_true => Ok(true),
        GqlValue::Enum(e) if e.as_ref() == when_false => Ok(false),
        _ => failure(PredicateError::message(format!(
            "orderBy option {} must be {} or {}.",
            name, when_true, when_false
        ))),
    }
}
