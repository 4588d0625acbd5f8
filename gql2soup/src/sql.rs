//! Renders the record query IR as one SQLite statement using the JSON1 functions.
//!
//! Every record query reads the soup table once per alias: the query alias
//! scans the record rows, and each join alias is a self-join of the whole
//! table whose condition lives in the `WHERE` clause. Each alias exposes its
//! record as the column `"<alias>.JSON"`.

use tracing::debug;

use crate::config::SqlMappingInput;
use crate::ir::{OrderBy, RecordQuery, RecordQueryField, RootQuery};
use crate::predicate::{ComparisonOperator, CompoundOperator, Expression, NullOperator, Predicate};

/// Keys of the rows holding record representations.
const RECORD_KEY_PATTERN: &str = "UiApi%3A%3ARecordRepresentation%";

/// A SQL string under construction.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SQL {
    pub sql: String,
}

impl SQL {
    pub fn new() -> SQL {
        SQL::default()
    }

    pub fn append_syntax(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    pub fn append_identifier(&mut self, name: &str) {
        self.sql.push('"');
        self.sql.push_str(&name.replace('"', "\"\""));
        self.sql.push('"');
    }

    pub fn append_string_literal(&mut self, value: &str) {
        self.sql.push('\'');
        self.sql.push_str(&value.replace('\'', "''"));
        self.sql.push('\'');
    }

    fn append_json_column(&mut self, alias: &str) {
        self.append_identifier(&format!("{}.JSON", alias));
    }

    fn append_json_path(&mut self, path: &str) {
        self.append_string_literal(&format!("$.{}", path));
    }

    fn append_separated<I, F>(&mut self, items: I, separator: &str, mut append: F)
    where
        I: IntoIterator,
        F: FnMut(&mut SQL, I::Item),
    {
        for (index, item) in items.into_iter().enumerate() {
            if index > 0 {
                self.append_syntax(separator);
            }
            append(self, item);
        }
    }
}

/// Renders the whole query; the result is a single row with a `json` column.
pub fn sql(root: &RootQuery, mapping: &SqlMappingInput) -> String {
    let mut sql = SQL::new();
    sql.append_syntax("SELECT json_set('{}'");
    for connection in &root.connections {
        sql.append_syntax(", ");
        sql.append_json_path(&format!("data.uiapi.query.{}.edges", connection.alias));
        sql.append_syntax(", json((");
        connection.to_sql(&mut sql, mapping);
        sql.append_syntax("))");
    }
    sql.append_syntax(") as json");
    debug!(length = sql.sql.len(), "rendered sql");
    sql.sql
}

/// Renders one connection as a subquery yielding a JSON array of edges.
pub fn record_query_to_sql(query: &RecordQuery, mapping: &SqlMappingInput) -> String {
    let mut sql = SQL::new();
    query.to_sql(&mut sql, mapping);
    sql.sql
}

/// Index statements that speed up the lookups the generated SQL performs.
///
/// Every statement is idempotent.
pub fn soup_indices(mapping: &SqlMappingInput) -> Vec<String> {
    let SqlMappingInput {
        soup_table,
        soup_column,
        key_column,
    } = mapping;
    vec![
        format!(
            "CREATE INDEX IF NOT EXISTS {soup_table}_{key_column}_idx ON {soup_table} ({key_column})"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {soup_table}_api_name_idx ON {soup_table} (json_extract({soup_column}, '$.data.apiName'))"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {soup_table}_id_idx ON {soup_table} (json_extract({soup_column}, '$.data.id'))"
        ),
    ]
}

/// `SELECT <alias columns> FROM <records> as '<alias>' join <soup> as '<join>' ...`
fn select_rows(alias: &str, join_names: &[String], mapping: &SqlMappingInput, sql: &mut SQL) {
    sql.append_syntax("SELECT ");
    let aliases = std::iter::once(alias).chain(join_names.iter().map(String::as_str));
    sql.append_separated(aliases, ", ", |sql, alias| {
        sql.append_identifier(alias);
        sql.append_syntax(".");
        sql.append_syntax(&mapping.soup_column);
        sql.append_syntax(" as ");
        sql.append_json_column(alias);
    });
    sql.append_syntax(&format!(
        " FROM (select * from {} where {} like '{}') as ",
        mapping.soup_table, mapping.key_column, RECORD_KEY_PATTERN
    ));
    sql.append_string_literal(alias);
    for join_name in join_names {
        sql.append_syntax(&format!(" join {} as ", mapping.soup_table));
        sql.append_string_literal(join_name);
    }
}

impl RecordQuery {
    pub fn to_sql(&self, sql: &mut SQL, mapping: &SqlMappingInput) {
        sql.append_syntax("SELECT json_group_array(json_set('{}'");
        for field in &self.fields {
            sql.append_syntax(", ");
            field.to_sql(sql, mapping);
        }
        sql.append_syntax(")) FROM (");
        select_rows(&self.alias, &self.join_names, mapping, sql);
        if let Some(predicate) = &self.predicate {
            sql.append_syntax(" WHERE ");
            predicate.to_sql(sql, mapping);
        }
        if !self.order_by.is_empty() {
            sql.append_syntax(" ORDER BY ");
            sql.append_separated(&self.order_by, ", ", |sql, order_by| order_by.to_sql(sql));
        }
        if let Some(first) = self.first {
            sql.append_syntax(&format!(" LIMIT {}", first));
        }
        sql.append_syntax(")");
    }
}

impl RecordQueryField {
    pub fn to_sql(&self, sql: &mut SQL, mapping: &SqlMappingInput) {
        match self {
            RecordQueryField::Scalar { path, extract } => {
                sql.append_json_path(path);
                sql.append_syntax(", (");
                extract.to_sql(sql);
                sql.append_syntax(")");
            }
            // json() keeps the nested array JSON instead of a quoted string.
            RecordQueryField::Child { path, connection } => {
                sql.append_json_path(path);
                sql.append_syntax(", json((");
                connection.to_sql(sql, mapping);
                sql.append_syntax("))");
            }
        }
    }
}

impl OrderBy {
    pub fn to_sql(&self, sql: &mut SQL) {
        self.extract.to_sql(sql);
        sql.append_syntax(if self.asc { " ASC" } else { " DESC" });
        sql.append_syntax(if self.nulls_first {
            " NULLS FIRST"
        } else {
            " NULLS LAST"
        });
    }
}

impl Predicate {
    pub fn to_sql(&self, sql: &mut SQL, mapping: &SqlMappingInput) {
        match self {
            Predicate::Comparison {
                left,
                operator,
                right,
            } => {
                left.to_sql(sql);
                sql.append_syntax(" ");
                operator.to_sql(sql);
                sql.append_syntax(" ");
                right.to_sql(sql);
            }
            Predicate::Compound { operator, children } if children.is_empty() => {
                sql.append_syntax(match operator {
                    CompoundOperator::And => "1",
                    CompoundOperator::Or => "0",
                });
            }
            Predicate::Compound { operator, children } => {
                let separator = match operator {
                    CompoundOperator::And => " AND ",
                    CompoundOperator::Or => " OR ",
                };
                sql.append_syntax("(");
                sql.append_separated(children, separator, |sql, child| child.to_sql(sql, mapping));
                sql.append_syntax(")");
            }
            Predicate::Not(child) => {
                sql.append_syntax("NOT (");
                child.to_sql(sql, mapping);
                sql.append_syntax(")");
            }
            Predicate::NullComparison { left, operator } => {
                left.to_sql(sql);
                sql.append_syntax(match operator {
                    NullOperator::Is => " IS NULL",
                    NullOperator::IsNot => " IS NOT NULL",
                });
            }
            Predicate::Between {
                expression,
                start,
                end,
            } => {
                expression.to_sql(sql);
                sql.append_syntax(" BETWEEN ");
                start.to_sql(sql);
                sql.append_syntax(" AND ");
                end.to_sql(sql);
            }
            Predicate::Exists {
                alias,
                join_names,
                predicate,
            } => {
                sql.append_syntax("EXISTS (");
                select_rows(alias, join_names, mapping, sql);
                sql.append_syntax(" WHERE ");
                predicate.to_sql(sql, mapping);
                sql.append_syntax(")");
            }
        }
    }
}

impl ComparisonOperator {
    pub fn to_sql(self, sql: &mut SQL) {
        sql.append_syntax(match self {
            ComparisonOperator::Eq => "=",
            ComparisonOperator::Ne => "!=",
            ComparisonOperator::Lt => "<",
            ComparisonOperator::Gt => ">",
            ComparisonOperator::Lte => "<=",
            ComparisonOperator::Gte => ">=",
            ComparisonOperator::Like => "like",
            ComparisonOperator::In => "IN",
            ComparisonOperator::Nin => "NOT IN",
        });
    }
}

impl Expression {
    pub fn to_sql(&self, sql: &mut SQL) {
        match self {
            Expression::JsonExtract { json_alias, path } => {
                sql.append_syntax("json_extract(");
                sql.append_json_column(json_alias);
                sql.append_syntax(", ");
                sql.append_json_path(path);
                sql.append_syntax(")");
            }
            Expression::StringLiteral(value)
            | Expression::DateLiteral(value)
            | Expression::DateTimeLiteral(value) => sql.append_string_literal(value),
            Expression::IntLiteral(value) => sql.append_syntax(&value.to_string()),
            Expression::DoubleLiteral(value) => sql.append_syntax(&double(*value)),
            Expression::BooleanLiteral(value) => {
                sql.append_syntax(if *value { "true" } else { "false" })
            }
            Expression::StringArray(values) => {
                sql.append_syntax("(");
                sql.append_separated(values, ", ", |sql, value| sql.append_string_literal(value));
                sql.append_syntax(")");
            }
            Expression::NumberArray(values) => {
                sql.append_syntax("(");
                sql.append_separated(values, ", ", |sql, value| sql.append_syntax(&double(*value)));
                sql.append_syntax(")");
            }
            Expression::NullValue => sql.append_syntax("NULL"),
        }
    }
}

/// SQLite has no literal for infinities or NaN.
fn double(value: f64) -> String {
    if value.is_finite() {
        format!("{:?}", value)
    } else {
        "NULL".to_string()
    }
}
