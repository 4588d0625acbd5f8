//! The intermediate representation handed from the query builder to SQL generation.

use crate::predicate::{Expression, Predicate};

#[derive(Debug, Clone, PartialEq)]
pub struct RootQuery {
    pub connections: Vec<RecordQuery>,
}

/// One connection block: the records of `api_name` read through the row scope `alias`.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordQuery {
    pub predicate: Option<Predicate>,
    pub fields: Vec<RecordQueryField>,
    pub alias: String,
    pub api_name: String,
    pub first: Option<u64>,
    /// Every alias besides `alias` that must be self-joined for `predicate`, `fields` and `order_by`.
    pub join_names: Vec<String>,
    pub order_by: Vec<OrderBy>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordQueryField {
    Scalar { path: String, extract: Expression },
    Child { path: String, connection: RecordQuery },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub asc: bool,
    pub nulls_first: bool,
    pub extract: Expression,
}

/// A compiled filter along with the joins it needs.
#[derive(Debug, Clone, PartialEq)]
pub struct PredicateContainer {
    pub predicate: Predicate,
    pub join_names: Vec<String>,
    pub join_predicates: Vec<Predicate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByContainer {
    pub order_by: OrderBy,
    pub join_names: Vec<String>,
    pub join_predicates: Vec<Predicate>,
}
