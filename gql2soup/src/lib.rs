pub mod builder;
pub mod config;
pub mod error;
pub mod filter;
pub mod ir;
pub mod order_by;
pub mod predicate;
pub mod schema;
pub mod scope;
pub mod sql;
pub mod store;

use anyhow::anyhow;
use graphql_parser::query::parse_query;
use tracing::debug;

pub use builder::{transform, ParserInput};
pub use config::SqlMappingInput;
pub use error::{CompileResult, PredicateError};
pub use ir::{RecordQuery, RecordQueryField, RootQuery};
pub use schema::ObjectInfoMap;
pub use sql::{record_query_to_sql, soup_indices, sql};
pub use store::SqlEvaluatingStore;

/// Parses `source`, compiles it against `input` and renders the SQL.
///
/// Compile errors are joined into one error, one message per line.
pub fn gql2soup(
    source: &str,
    input: &ParserInput,
    mapping: &SqlMappingInput,
) -> Result<String, anyhow::Error> {
    let document = parse_query::<&str>(source)?;
    let root = transform(&document, input).map_err(|errors| {
        anyhow!(errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n"))
    })?;
    debug!(connections = root.connections.len(), "compiled query");
    Ok(sql(&root, mapping))
}
