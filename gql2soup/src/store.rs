use async_trait::async_trait;

/// A host store able to run the SQL this crate generates against its soup.
#[async_trait]
pub trait SqlEvaluatingStore {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Whether the store can evaluate SQL at all; callers fall back to
    /// another resolution path when it cannot.
    fn is_eval_supported(&self) -> bool;

    /// Applies index statements. Statements already applied are skipped.
    async fn update_indices(&self, statements: &[String]) -> Result<(), Self::Error>;

    /// Runs `sql` with positional `params` and returns the single JSON result as text.
    async fn evaluate_sql(&self, sql: &str, params: &[String]) -> Result<String, Self::Error>;
}
