use serde::Deserialize;

/// Where the soup lives: the table, the column holding each record's JSON,
/// and the column holding its key.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SqlMappingInput {
    pub soup_table: String,
    pub soup_column: String,
    pub key_column: String,
}

impl Default for SqlMappingInput {
    fn default() -> Self {
        SqlMappingInput {
            soup_table: "soup".to_string(),
            soup_column: "data".to_string(),
            key_column: "key".to_string(),
        }
    }
}

impl SqlMappingInput {
    /// Reads `GQL2SOUP_SOUP_TABLE`, `GQL2SOUP_SOUP_COLUMN` and
    /// `GQL2SOUP_KEY_COLUMN`, falling back to the defaults for unset ones.
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed("GQL2SOUP_").from_env()
    }
}
