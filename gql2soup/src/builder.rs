//! Walks a GraphQL document and builds the record query IR.

use graphql_parser::query::{
    Definition, Document, Field, OperationDefinition, Selection, SelectionSet, Text,
    Value as GqlValue,
};
use indexmap::IndexSet;
use tracing::{debug, trace};

use crate::error::{collect, failure, partition, CompileResult, PredicateError};
use crate::filter::parse_filter;
use crate::ir::{RecordQuery, RecordQueryField, RootQuery};
use crate::order_by::parse_order_by;
use crate::predicate::{
    combine_predicates, is_empty_predicate, reference_predicate, type_predicate, CompoundOperator,
    Expression, Predicate,
};
use crate::schema::{
    field_path, get_field_info, get_relationship_info, is_intrinsic_field, FieldLeaf,
    ObjectInfoMap,
};
use crate::scope::parse_scope;

const TYPENAME: &str = "__typename";

/// Everything the builder needs besides the document itself.
#[derive(Debug, Clone, Copy)]
pub struct ParserInput<'a> {
    pub object_info_map: &'a ObjectInfoMap,
    /// The current user, matched by the `MINE` and `ASSIGNEDTOME` scopes.
    pub user_id: &'a str,
}

/// Fields, predicates and joins a selection contributes to its record query.
///
/// A plain field contributes only fields; a spanning field also brings the
/// joins (and join predicates) its nested selections need.
#[derive(Debug, Default)]
struct SelectedFields {
    fields: Vec<RecordQueryField>,
    predicates: Vec<Predicate>,
    join_names: Vec<String>,
}

impl SelectedFields {
    fn merge(selections: Vec<SelectedFields>) -> SelectedFields {
        selections
            .into_iter()
            .fold(SelectedFields::default(), |mut merged, selection| {
                merged.fields.extend(selection.fields);
                merged.predicates.extend(selection.predicates);
                merged.join_names.extend(selection.join_names);
                merged
            })
    }
}

/// Compiles every connection under `uiapi { query { ... } }`.
pub fn transform<'a, T: Text<'a>>(
    document: &Document<'a, T>,
    input: &ParserInput,
) -> CompileResult<RootQuery> {
    let selection_sets = partition(document.definitions.iter().map(|definition| match definition {
        Definition::Operation(OperationDefinition::Query(query)) => Ok(&query.selection_set),
        Definition::Operation(OperationDefinition::SelectionSet(set)) => Ok(set),
        Definition::Operation(_) => failure(PredicateError::message(
            "Only query operations are supported.",
        )),
        Definition::Fragment(fragment) => failure(PredicateError::message(format!(
            "Fragment {} is not supported.",
            fragment.name.as_ref()
        ))),
    }))?;

    let connections = partition(selection_sets.into_iter().map(|set| {
        let query = find_field(set, "uiapi")
            .and_then(|uiapi| find_field(&uiapi.selection_set, "query"))
            .ok_or_else(|| {
                vec![PredicateError::message(
                    "Query must select uiapi { query { ... } }.",
                )]
            })?;
        partition(
            query
                .selection_set
                .items
                .iter()
                .filter_map(|selection| match selection {
                    Selection::Field(field) if field.name.as_ref() == TYPENAME => None,
                    Selection::Field(field) => Some(root_record_query(field, input)),
                    _ => Some(failure(PredicateError::message(
                        "Fragments are not supported in uiapi.query.",
                    ))),
                }),
        )
    }))?;

    let root = RootQuery {
        connections: connections.into_iter().flatten().collect(),
    };
    debug!(connections = root.connections.len(), "transformed query");
    Ok(root)
}

fn root_record_query<'a, T: Text<'a>>(
    field: &Field<'a, T>,
    input: &ParserInput,
) -> CompileResult<RecordQuery> {
    let api_name = field.name.as_ref();
    if !input.object_info_map.contains_key(api_name) {
        return failure(PredicateError::MissingObjectInfo(api_name.to_string()));
    }
    let alias = response_key(field).to_string();
    let extra = vec![type_predicate(&alias, api_name)];
    record_query(field, api_name, alias, extra, input)
}

/// Compiles one connection field of type `api_name` read through `alias`.
///
/// `extra_predicates` come first in the combined predicate; they anchor the
/// rows (type assertion, and for child connections the link to the parent).
pub fn record_query<'a, T: Text<'a>>(
    field: &Field<'a, T>,
    api_name: &str,
    alias: String,
    extra_predicates: Vec<Predicate>,
    input: &ParserInput,
) -> CompileResult<RecordQuery> {
    trace!(%alias, api_name, "compiling record query");
    let schema = input.object_info_map;
    let mut errors = Vec::new();

    let filter = collect(
        parse_filter(argument(field, "where"), &alias, api_name, schema),
        &mut errors,
    )
    .flatten();
    let scope = collect(
        parse_scope(argument(field, "scope"), &alias, api_name, schema, input.user_id),
        &mut errors,
    )
    .flatten();
    let order_by = collect(
        parse_order_by(argument(field, "orderBy"), &alias, api_name, schema),
        &mut errors,
    )
    .unwrap_or_default();
    let first = collect(parse_first(argument(field, "first"), api_name), &mut errors).flatten();
    let selected = collect(connection_fields(field, api_name, &alias, input), &mut errors);

    let (Some(selected), true) = (selected, errors.is_empty()) else {
        return Err(errors);
    };

    let mut predicates = extra_predicates;
    let mut join_names = IndexSet::new();
    if let Some(filter) = filter {
        predicates.extend(filter.join_predicates);
        if !is_empty_predicate(&filter.predicate) {
            predicates.push(filter.predicate);
        }
        join_names.extend(filter.join_names);
    }
    predicates.extend(scope);
    let mut order = Vec::with_capacity(order_by.len());
    for container in order_by {
        predicates.extend(container.join_predicates);
        join_names.extend(container.join_names);
        order.push(container.order_by);
    }
    predicates.extend(selected.predicates);
    join_names.extend(selected.join_names);

    let predicate = combine_predicates(predicates, CompoundOperator::And);
    Ok(RecordQuery {
        predicate: (!is_empty_predicate(&predicate)).then_some(predicate),
        fields: selected.fields,
        alias,
        api_name: api_name.to_string(),
        first,
        join_names: join_names.into_iter().collect(),
        order_by: order,
    })
}

fn connection_fields<'a, T: Text<'a>>(
    field: &Field<'a, T>,
    api_name: &str,
    alias: &str,
    input: &ParserInput,
) -> CompileResult<SelectedFields> {
    let node = find_field(&field.selection_set, "edges")
        .and_then(|edges| find_field(&edges.selection_set, "node"))
        .ok_or_else(|| {
            vec![PredicateError::message(format!(
                "Connection {} of type {} must select edges {{ node {{ ... }} }}.",
                response_key(field),
                api_name
            ))]
        })?;
    selections(&node.selection_set, api_name, alias, "node", input)
}

fn selections<'a, T: Text<'a>>(
    set: &SelectionSet<'a, T>,
    api_name: &str,
    alias: &str,
    path: &str,
    input: &ParserInput,
) -> CompileResult<SelectedFields> {
    let selected = partition(set.items.iter().filter_map(|selection| match selection {
        Selection::Field(field) if field.name.as_ref() == TYPENAME => None,
        Selection::Field(field) => Some(selection_to_query_field(
            field, api_name, alias, path, input,
        )),
        _ => Some(failure(PredicateError::message(format!(
            "Fragments are not supported in selections on {}.",
            api_name
        )))),
    }))?;
    Ok(SelectedFields::merge(selected))
}

/// Compiles one selection on a record of type `api_name`.
///
/// `path` is the JSON path of the enclosing object in the result, so the
/// field lands at `<path>.<response key>`.
fn selection_to_query_field<'a, T: Text<'a>>(
    field: &Field<'a, T>,
    api_name: &str,
    alias: &str,
    path: &str,
    input: &ParserInput,
) -> CompileResult<SelectedFields> {
    let schema = input.object_info_map;
    let name = field.name.as_ref();
    let path = format!("{}.{}", path, response_key(field));

    if let Some(info) = get_field_info(api_name, name, schema) {
        if let Some(reference) = info.spanning(name) {
            let target = reference.reference_to_api_name.as_str();
            if !schema.contains_key(target) {
                return failure(PredicateError::MissingObjectInfo(target.to_string()));
            }
            if field.selection_set.items.is_empty() {
                return failure(PredicateError::message(format!(
                    "Field {} of type {} must select subfields.",
                    name, api_name
                )));
            }
            let join_alias = format!("{}.{}", alias, reference.relationship_name);
            let inner = selections(&field.selection_set, target, &join_alias, &path, input)?;

            let mut predicates = vec![
                reference_predicate(alias, &join_alias, &reference.api_name),
                type_predicate(&join_alias, target),
            ];
            predicates.extend(inner.predicates);
            let mut join_names = vec![join_alias];
            join_names.extend(inner.join_names);
            return Ok(SelectedFields {
                fields: inner.fields,
                predicates,
                join_names,
            });
        }

        let field_name = info.api_name();
        if is_intrinsic_field(field_name) {
            if !field.selection_set.items.is_empty() {
                return failure(PredicateError::message(format!(
                    "Field {} of type {} does not take a selection.",
                    name, api_name
                )));
            }
            return Ok(SelectedFields {
                fields: vec![RecordQueryField::Scalar {
                    path,
                    extract: Expression::json_extract(alias, field_path(field_name, FieldLeaf::Value)),
                }],
                ..SelectedFields::default()
            });
        }
        return scalar_leaves(field, field_name, api_name, alias, &path);
    }

    if let Some(relationship) = get_relationship_info(api_name, name, schema) {
        let child_api_name = relationship.child_object_api_name.as_str();
        if !schema.contains_key(child_api_name) {
            return failure(PredicateError::MissingObjectInfo(child_api_name.to_string()));
        }
        let child_alias = format!("{}.{}", alias, relationship.relationship_name);
        let extra = vec![
            reference_predicate(&child_alias, alias, &relationship.field_name),
            type_predicate(&child_alias, child_api_name),
        ];
        let connection = record_query(field, child_api_name, child_alias, extra, input)?;
        return Ok(SelectedFields {
            fields: vec![RecordQueryField::Child {
                path: format!("{}.edges", path),
                connection,
            }],
            ..SelectedFields::default()
        });
    }

    failure(PredicateError::message(format!(
        "Field {} for type {} not found.",
        name, api_name
    )))
}

/// `Name { value displayValue }` becomes one scalar per selected leaf.
fn scalar_leaves<'a, T: Text<'a>>(
    field: &Field<'a, T>,
    field_name: &str,
    api_name: &str,
    alias: &str,
    path: &str,
) -> CompileResult<SelectedFields> {
    if field.selection_set.items.is_empty() {
        return failure(PredicateError::message(format!(
            "Field {} of type {} must select value or displayValue.",
            field_name, api_name
        )));
    }
    let fields = partition(field.selection_set.items.iter().filter_map(|selection| {
        let Selection::Field(leaf) = selection else {
            return Some(failure(PredicateError::message(format!(
                "Fragments are not supported on field {} of type {}.",
                field_name, api_name
            ))));
        };
        let leaf_name = leaf.name.as_ref();
        if leaf_name == TYPENAME {
            return None;
        }
        Some(match FieldLeaf::from_selection(leaf_name) {
            Some(kind) => Ok(RecordQueryField::Scalar {
                path: format!("{}.{}", path, response_key(leaf)),
                extract: Expression::json_extract(alias, field_path(field_name, kind)),
            }),
            None => failure(PredicateError::message(format!(
                "Field {} of type {} selects {}; expected value or displayValue.",
                field_name, api_name, leaf_name
            ))),
        })
    }))?;
    Ok(SelectedFields {
        fields,
        ..SelectedFields::default()
    })
}

fn parse_first<'a, T: Text<'a>>(
    first: Option<&GqlValue<'a, T>>,
    api_name: &str,
) -> CompileResult<Option<u64>> {
    match first {
        None => Ok(None),
        Some(GqlValue::Int(n)) => match n.as_i64().and_then(|n| u64::try_from(n).ok()) {
            Some(n) => Ok(Some(n)),
            None => failure(PredicateError::message(format!(
                "The first argument on {} must be a non-negative integer.",
                api_name
            ))),
        },
        Some(_) => failure(PredicateError::message(format!(
            "The first argument on {} must be a non-negative integer.",
            api_name
        ))),
    }
}

fn argument<'f, 'a, T: Text<'a>>(field: &'f Field<'a, T>, name: &str) -> Option<&'f GqlValue<'a, T>> {
    field
        .arguments
        .iter()
        .find(|(key, _)| key.as_ref() == name)
        .map(|(_, value)| value)
}

fn find_field<'s, 'a, T: Text<'a>>(set: &'s SelectionSet<'a, T>, name: &str) -> Option<&'s Field<'a, T>> {
    set.items.iter().find_map(|selection| match selection {
        Selection::Field(field) if field.name.as_ref() == name => Some(field),
        _ => None,
    })
}

fn response_key<'f, 'a, T: Text<'a>>(field: &'f Field<'a, T>) -> &'f str {
    field.alias.as_ref().unwrap_or(&field.name).as_ref()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::OrderBy;
    use crate::predicate::ComparisonOperator;
    use crate::schema::tests::object_info_map;
    use graphql_parser::query::parse_query;
    use pretty_assertions::assert_eq;

    fn compile(source: &str) -> CompileResult<RootQuery> {
        let document = parse_query::<&str>(source).expect("query to parse");
        let schema = object_info_map();
        let input = ParserInput {
            object_info_map: &schema,
            user_id: "005USER",
        };
        transform(&document, &input)
    }

    fn messages(errors: Vec<PredicateError>) -> Vec<String> {
        errors.iter().map(ToString::to_string).collect()
    }

    fn scalar(path: &str, alias: &str, extract: &str) -> RecordQueryField {
        RecordQueryField::Scalar {
            path: path.to_string(),
            extract: Expression::json_extract(alias, extract),
        }
    }

    fn name_eq(alias: &str, value: &str) -> Predicate {
        Predicate::comparison(
            Expression::json_extract(alias, "data.fields.Name.value"),
            ComparisonOperator::Eq,
            Expression::StringLiteral(value.to_string()),
        )
    }

    #[test]
    fn compiles_a_filtered_connection() -> Result<(), anyhow::Error> {
        let root = compile(
            r#"query {
                uiapi {
                    query {
                        Account(where: { Name: { eq: "Acme" } }) {
                            edges { node { Id Name { value displayValue } } }
                        }
                    }
                }
            }"#,
        )
        .map_err(|errors| anyhow::anyhow!("{:?}", errors))?;
        assert_eq!(
            root,
            RootQuery {
                connections: vec![RecordQuery {
                    predicate: Some(Predicate::Compound {
                        operator: CompoundOperator::And,
                        children: vec![type_predicate("Account", "Account"), name_eq("Account", "Acme")],
                    }),
                    fields: vec![
                        scalar("node.Id", "Account", "data.id"),
                        scalar("node.Name.value", "Account", "data.fields.Name.value"),
                        scalar(
                            "node.Name.displayValue",
                            "Account",
                            "data.fields.Name.displayValue"
                        ),
                    ],
                    alias: "Account".to_string(),
                    api_name: "Account".to_string(),
                    first: None,
                    join_names: vec![],
                    order_by: vec![],
                }]
            }
        );
        Ok(())
    }

    #[test]
    fn empty_where_matches_absent_where() {
        let with_empty = compile(r#"{ uiapi { query { Account(where: {}) { edges { node { Id } } } } } }"#);
        let without = compile(r#"{ uiapi { query { Account { edges { node { Id } } } } } }"#);
        assert_eq!(with_empty, without);
        let root = without.expect("query to compile");
        assert_eq!(
            root.connections[0].predicate,
            Some(type_predicate("Account", "Account"))
        );
    }

    #[test]
    fn empty_not_matches_absent_where() {
        let negated = compile(r#"{ uiapi { query { Account(where: { not: {} }) { edges { node { Id } } } } } }"#);
        let without = compile(r#"{ uiapi { query { Account { edges { node { Id } } } } } }"#);
        assert_eq!(negated, without);
    }

    #[test]
    fn reports_each_unknown_field() {
        let errors = compile(
            r#"{ uiapi { query { Account { edges { node { Bogus { value } Name { value } Nope { value } } } } } } }"#,
        )
        .expect_err("query to fail");
        assert_eq!(
            messages(errors),
            vec![
                "Field Bogus for type Account not found.".to_string(),
                "Field Nope for type Account not found.".to_string(),
            ]
        );
    }

    #[test]
    fn spanning_filter_joins_the_referenced_record() {
        let root = compile(
            r#"{ uiapi { query { Account(where: { Owner: { Name: { eq: "X" } } }) { edges { node { Id } } } } } }"#,
        )
        .expect("query to compile");
        let account = &root.connections[0];
        assert_eq!(account.join_names, vec!["Account.Owner".to_string()]);
        assert_eq!(
            account.predicate,
            Some(Predicate::Compound {
                operator: CompoundOperator::And,
                children: vec![
                    type_predicate("Account", "Account"),
                    reference_predicate("Account", "Account.Owner", "OwnerId"),
                    type_predicate("Account.Owner", "User"),
                    name_eq("Account.Owner", "X"),
                ],
            })
        );
    }

    #[test]
    fn spanning_selections_bubble_up_to_the_parent() {
        let root = compile(
            r#"{ uiapi { query { Account { edges { node {
                Owner { Name { value } Manager { Name { value } } }
                Name { value }
            } } } } } }"#,
        )
        .expect("query to compile");
        let account = &root.connections[0];
        assert_eq!(
            account.fields,
            vec![
                scalar("node.Owner.Name.value", "Account.Owner", "data.fields.Name.value"),
                scalar(
                    "node.Owner.Manager.Name.value",
                    "Account.Owner.Manager",
                    "data.fields.Name.value"
                ),
                scalar("node.Name.value", "Account", "data.fields.Name.value"),
            ]
        );
        assert_eq!(
            account.join_names,
            vec!["Account.Owner".to_string(), "Account.Owner.Manager".to_string()]
        );
        assert_eq!(
            account.predicate,
            Some(Predicate::Compound {
                operator: CompoundOperator::And,
                children: vec![
                    type_predicate("Account", "Account"),
                    reference_predicate("Account", "Account.Owner", "OwnerId"),
                    type_predicate("Account.Owner", "User"),
                    reference_predicate("Account.Owner", "Account.Owner.Manager", "ManagerId"),
                    type_predicate("Account.Owner.Manager", "User"),
                ],
            })
        );
    }

    #[test]
    fn spanning_filter_and_selection_share_one_join() {
        let root = compile(
            r#"{ uiapi { query { Account(where: { Owner: { Name: { eq: "X" } } }) {
                edges { node { Owner { Name { value } } } }
            } } } }"#,
        )
        .expect("query to compile");
        let account = &root.connections[0];
        assert_eq!(account.join_names, vec!["Account.Owner".to_string()]);
        let Some(Predicate::Compound { children, .. }) = &account.predicate else {
            panic!("expected a compound predicate");
        };
        assert_eq!(children.len(), 4);
    }

    #[test]
    fn child_relationships_become_nested_connections() {
        let root = compile(
            r#"{ uiapi { query { Account { edges { node {
                Id
                Contacts(first: 5) { edges { node { Name { value } } } }
            } } } } } }"#,
        )
        .expect("query to compile");
        let account = &root.connections[0];
        assert_eq!(account.join_names, Vec::<String>::new());
        let RecordQueryField::Child { path, connection } = &account.fields[1] else {
            panic!("expected a child connection");
        };
        assert_eq!(path, "node.Contacts.edges");
        assert_eq!(
            connection,
            &RecordQuery {
                predicate: Some(Predicate::Compound {
                    operator: CompoundOperator::And,
                    children: vec![
                        reference_predicate("Account.Contacts", "Account", "AccountId"),
                        type_predicate("Account.Contacts", "Contact"),
                    ],
                }),
                fields: vec![scalar(
                    "node.Name.value",
                    "Account.Contacts",
                    "data.fields.Name.value"
                )],
                alias: "Account.Contacts".to_string(),
                api_name: "Contact".to_string(),
                first: Some(5),
                join_names: vec![],
                order_by: vec![],
            }
        );
    }

    #[test]
    fn reads_scope_order_and_first() {
        let root = compile(
            r#"{ uiapi { query { Account(scope: MINE, first: 10, orderBy: { Owner: { Name: { order: DESC } } }) {
                edges { node { Id } }
            } } } }"#,
        )
        .expect("query to compile");
        let account = &root.connections[0];
        assert_eq!(account.first, Some(10));
        assert_eq!(account.join_names, vec!["Account.Owner".to_string()]);
        assert_eq!(
            account.order_by,
            vec![OrderBy {
                asc: false,
                nulls_first: false,
                extract: Expression::json_extract("Account.Owner", "data.fields.Name.value"),
            }]
        );
        assert_eq!(
            account.predicate,
            Some(Predicate::Compound {
                operator: CompoundOperator::And,
                children: vec![
                    type_predicate("Account", "Account"),
                    Predicate::comparison(
                        Expression::json_extract("Account", "data.fields.OwnerId.value"),
                        ComparisonOperator::Eq,
                        Expression::StringLiteral("005USER".to_string()),
                    ),
                    reference_predicate("Account", "Account.Owner", "OwnerId"),
                    type_predicate("Account.Owner", "User"),
                ],
            })
        );
    }

    #[test]
    fn mine_without_owner_reports_once() {
        let errors = compile(r#"{ uiapi { query { Lead(scope: MINE) { edges { node { Id } } } } } }"#)
            .expect_err("query to fail");
        assert_eq!(
            messages(errors),
            vec!["Scope MINE requires Lead to have an OwnerId field.".to_string()]
        );
    }

    #[test]
    fn collects_errors_across_arguments_and_connections() {
        let errors = compile(
            r#"{ uiapi { query {
                Account(first: -1, where: { Missing: { eq: 1 } }) { edges { node { Id } } }
                Opportunity { edges { node { Id } } }
            } } }"#,
        )
        .expect_err("query to fail");
        assert_eq!(
            messages(errors),
            vec![
                "Field Missing for type Account not found.".to_string(),
                "The first argument on Account must be a non-negative integer.".to_string(),
                "Missing object info for type Opportunity.".to_string(),
            ]
        );
    }

    #[test]
    fn rejects_malformed_documents() {
        let errors = compile(r#"{ Account { edges { node { Id } } } }"#).expect_err("query to fail");
        assert_eq!(
            messages(errors),
            vec!["Query must select uiapi { query { ... } }.".to_string()]
        );

        let errors = compile(r#"{ uiapi { query { Account { totalCount } } } }"#)
            .expect_err("query to fail");
        assert_eq!(
            messages(errors),
            vec!["Connection Account of type Account must select edges { node { ... } }.".to_string()]
        );

        let errors = compile(
            r#"query { uiapi { query { Account { edges { node { ...AccountFields } } } } } }
            fragment AccountFields on Account { Id }"#,
        )
        .expect_err("query to fail");
        assert_eq!(
            messages(errors),
            vec!["Fragment AccountFields is not supported.".to_string()]
        );
    }

    #[test]
    fn rejects_mismatched_field_shapes() {
        let errors = compile(
            r#"{ uiapi { query { Account { edges { node {
                Name
                Id { value }
                Owner
                IsActive { label }
            } } } } } }"#,
        )
        .expect_err("query to fail");
        assert_eq!(
            messages(errors),
            vec![
                "Field Name of type Account must select value or displayValue.".to_string(),
                "Field Id of type Account does not take a selection.".to_string(),
                "Field Owner of type Account must select subfields.".to_string(),
                "Field IsActive of type Account selects label; expected value or displayValue."
                    .to_string(),
            ]
        );
    }

    #[test]
    fn aliases_name_the_connection_and_fields() {
        let root = compile(
            r#"{ uiapi { query { accounts: Account { pageInfo { hasNextPage } edges { node { __typename key: Id } } } } } }"#,
        )
        .expect("query to compile");
        let accounts = &root.connections[0];
        assert_eq!(accounts.alias, "accounts");
        assert_eq!(accounts.api_name, "Account");
        assert_eq!(accounts.fields, vec![scalar("node.key", "accounts", "data.id")]);
    }
}
