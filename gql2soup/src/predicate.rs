//! Predicate and expression trees, and the algebra that combines them.

use crate::schema::{field_path, FieldLeaf, API_NAME_FIELD, ID_FIELD};

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Reads `path` from the record held by the self-join row `json_alias`.
    JsonExtract { json_alias: String, path: String },
    StringLiteral(String),
    IntLiteral(i64),
    DoubleLiteral(f64),
    BooleanLiteral(bool),
    StringArray(Vec<String>),
    NumberArray(Vec<f64>),
    DateLiteral(String),
    DateTimeLiteral(String),
    /// SQL `NULL` as an operand. `eq: null` and `ne: null` in a filter compile
    /// to `Predicate::NullComparison` instead.
    NullValue,
}

impl Expression {
    pub fn json_extract(json_alias: impl Into<String>, path: impl Into<String>) -> Self {
        Expression::JsonExtract {
            json_alias: json_alias.into(),
            path: path.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    Eq,
    Ne,
    Lt,
    Gt,
    Lte,
    Gte,
    Like,
    In,
    Nin,
}

impl ComparisonOperator {
    pub fn from_name(name: &str) -> Option<ComparisonOperator> {
        match name {
            "eq" => Some(ComparisonOperator::Eq),
            "ne" => Some(ComparisonOperator::Ne),
            "lt" => Some(ComparisonOperator::Lt),
            "gt" => Some(ComparisonOperator::Gt),
            "lte" => Some(ComparisonOperator::Lte),
            "gte" => Some(ComparisonOperator::Gte),
            "like" => Some(ComparisonOperator::Like),
            "in" => Some(ComparisonOperator::In),
            "nin" => Some(ComparisonOperator::Nin),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ComparisonOperator::Eq => "eq",
            ComparisonOperator::Ne => "ne",
            ComparisonOperator::Lt => "lt",
            ComparisonOperator::Gt => "gt",
            ComparisonOperator::Lte => "lte",
            ComparisonOperator::Gte => "gte",
            ComparisonOperator::Like => "like",
            ComparisonOperator::In => "in",
            ComparisonOperator::Nin => "nin",
        }
    }

    pub fn is_set_operator(self) -> bool {
        matches!(self, ComparisonOperator::In | ComparisonOperator::Nin)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompoundOperator {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullOperator {
    Is,
    IsNot,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Comparison {
        left: Expression,
        operator: ComparisonOperator,
        right: Expression,
    },
    Compound {
        operator: CompoundOperator,
        children: Vec<Predicate>,
    },
    Not(Box<Predicate>),
    NullComparison {
        left: Expression,
        operator: NullOperator,
    },
    Between {
        expression: Expression,
        start: Expression,
        end: Expression,
    },
    /// A correlated existence check. `join_names` are joined only inside the check.
    Exists {
        alias: String,
        join_names: Vec<String>,
        predicate: Box<Predicate>,
    },
}

impl Predicate {
    pub fn comparison(left: Expression, operator: ComparisonOperator, right: Expression) -> Self {
        Predicate::Comparison {
            left,
            operator,
            right,
        }
    }
}

/// Combines `predicates` under `operator`.
///
/// Children using the same operator are flattened into the result and
/// structural duplicates are dropped, keeping the first occurrence. A single
/// surviving predicate is returned without a compound wrapper.
pub fn combine_predicates(predicates: Vec<Predicate>, operator: CompoundOperator) -> Predicate {
    let mut children: Vec<Predicate> = Vec::with_capacity(predicates.len());
    let flattened = predicates.into_iter().flat_map(|predicate| match predicate {
        Predicate::Compound {
            operator: child_operator,
            children,
        } if child_operator == operator => children,
        other => vec![other],
    });
    for predicate in flattened {
        if !children.contains(&predicate) {
            children.push(predicate);
        }
    }
    if children.len() == 1 {
        if let Some(only) = children.pop() {
            return only;
        }
    }
    Predicate::Compound { operator, children }
}

/// An empty compound means "no filter", not "matches nothing".
pub fn is_empty_predicate(predicate: &Predicate) -> bool {
    matches!(predicate, Predicate::Compound { children, .. } if children.is_empty())
}

/// `from.<foreign_key_field> = to.Id`, the condition behind every join.
pub fn reference_predicate(from_alias: &str, to_alias: &str, foreign_key_field: &str) -> Predicate {
    Predicate::comparison(
        Expression::json_extract(from_alias, field_path(foreign_key_field, FieldLeaf::Value)),
        ComparisonOperator::Eq,
        Expression::json_extract(to_alias, field_path(ID_FIELD, FieldLeaf::Value)),
    )
}

/// Asserts the row joined as `alias` is a record of type `api_name`.
pub fn type_predicate(alias: &str, api_name: &str) -> Predicate {
    Predicate::comparison(
        Expression::json_extract(alias, field_path(API_NAME_FIELD, FieldLeaf::Value)),
        ComparisonOperator::Eq,
        Expression::StringLiteral(api_name.to_string()),
    )
}
