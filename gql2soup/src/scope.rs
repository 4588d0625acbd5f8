//! Compiles the `scope` argument of a connection.

use graphql_parser::query::{Text, Value as GqlValue};

use crate::error::{failure, CompileResult, PredicateError};
use crate::predicate::{
    combine_predicates, reference_predicate, type_predicate, ComparisonOperator,
    CompoundOperator, Expression, Predicate,
};
use crate::schema::{field_path, get_field_info, FieldLeaf, ObjectInfoMap};

const OWNER_ID: &str = "OwnerId";
const SERVICE_APPOINTMENT: &str = "ServiceAppointment";

pub fn parse_scope<'a, T: Text<'a>>(
    scope: Option<&GqlValue<'a, T>>,
    alias: &str,
    api_name: &str,
    schema: &ObjectInfoMap,
    user_id: &str,
) -> CompileResult<Option<Predicate>> {
    let name = match scope {
        None => return Ok(None),
        Some(GqlValue::Enum(name)) => name.as_ref(),
        Some(_) => {
            return failure(PredicateError::message(format!(
                "The scope argument on {} must be an enum value.",
                api_name
            )))
        }
    };
    match name {
        "MINE" => {
            if get_field_info(api_name, OWNER_ID, schema).is_none() {
                return failure(PredicateError::message(format!(
                    "Scope MINE requires {} to have an {} field.",
                    api_name, OWNER_ID
                )));
            }
            Ok(Some(Predicate::comparison(
                Expression::json_extract(alias, field_path(OWNER_ID, FieldLeaf::Value)),
                ComparisonOperator::Eq,
                Expression::StringLiteral(user_id.to_string()),
            )))
        }
        "ASSIGNEDTOME" => {
            if api_name != SERVICE_APPOINTMENT {
                return failure(PredicateError::message(format!(
                    "Scope ASSIGNEDTOME is only supported for {}, not {}.",
                    SERVICE_APPOINTMENT, api_name
                )));
            }
            Ok(Some(assigned_to_me(alias, user_id)))
        }
        other => failure(PredicateError::message(format!(
            "Scope {} is not supported on {}.",
            other, api_name
        ))),
    }
}

/// Appointments with an assigned resource whose service resource is the user.
fn assigned_to_me(alias: &str, user_id: &str) -> Predicate {
    let assigned_resource = format!("{}.AssignedResource", alias);
    let service_resource = format!("{}.ServiceResource", alias);
    let predicate = combine_predicates(
        vec![
            reference_predicate(&assigned_resource, &service_resource, "ServiceResourceId"),
            reference_predicate(&assigned_resource, alias, "ServiceAppointmentId"),
            Predicate::comparison(
                Expression::json_extract(
                    &service_resource,
                    field_path("RelatedRecordId", FieldLeaf::Value),
                ),
                ComparisonOperator::Eq,
                Expression::StringLiteral(user_id.to_string()),
            ),
            type_predicate(&assigned_resource, "AssignedResource"),
            type_predicate(&service_resource, "ServiceResource"),
        ],
        CompoundOperator::And,
    );
    Predicate::Exists {
        alias: assigned_resource,
        join_names: vec![service_resource],
        predicate: Box::new(predicate),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::tests::argument;
    use crate::schema::tests::object_info_map;
    use pretty_assertions::assert_eq;

    fn compile(source: &'static str, api_name: &str) -> CompileResult<Option<Predicate>> {
        let schema = object_info_map();
        let value = argument(source, "scope");
        parse_scope(Some(&value), api_name, api_name, &schema, "005USER")
    }

    #[test]
    fn mine_filters_on_owner() {
        let predicate = compile(r#"{ Account(scope: MINE) { Id } }"#, "Account")
            .expect("scope to compile");
        assert_eq!(
            predicate,
            Some(Predicate::comparison(
                Expression::json_extract("Account", "data.fields.OwnerId.value"),
                ComparisonOperator::Eq,
                Expression::StringLiteral("005USER".into()),
            ))
        );
    }

    #[test]
    fn mine_requires_owner_id() {
        let errors = compile(r#"{ Lead(scope: MINE) { Id } }"#, "Lead").expect_err("scope to fail");
        assert_eq!(
            errors,
            vec![PredicateError::message(
                "Scope MINE requires Lead to have an OwnerId field."
            )]
        );
    }

    #[test]
    fn assigned_to_me_builds_an_existence_check() {
        let predicate = compile(
            r#"{ ServiceAppointment(scope: ASSIGNEDTOME) { Id } }"#,
            "ServiceAppointment",
        )
        .expect("scope to compile");
        let Some(Predicate::Exists {
            alias,
            join_names,
            predicate,
        }) = predicate
        else {
            panic!("expected an exists predicate");
        };
        assert_eq!(alias, "ServiceAppointment.AssignedResource");
        assert_eq!(join_names, vec!["ServiceAppointment.ServiceResource".to_string()]);
        let Predicate::Compound { operator, children } = *predicate else {
            panic!("expected a compound predicate");
        };
        assert_eq!(operator, CompoundOperator::And);
        assert_eq!(children.len(), 5);
        assert_eq!(
            children[1],
            reference_predicate(
                "ServiceAppointment.AssignedResource",
                "ServiceAppointment",
                "ServiceAppointmentId"
            )
        );
    }

    #[test]
    fn assigned_to_me_is_service_appointment_only() {
        let errors = compile(r#"{ Account(scope: ASSIGNEDTOME) { Id } }"#, "Account")
            .expect_err("scope to fail");
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn rejects_unknown_scopes() {
        let errors = compile(r#"{ Account(scope: EVERYTHING) { Id } }"#, "Account")
            .expect_err("scope to fail");
        assert_eq!(
            errors,
            vec![PredicateError::message("Scope EVERYTHING is not supported on Account.")]
        );
        let errors = compile(r#"{ Account(scope: "MINE") { Id } }"#, "Account")
            .expect_err("scope to fail");
        assert_eq!(
            errors,
            vec![PredicateError::message(
                "The scope argument on Account must be an enum value."
            )]
        );
    }
}
