use tracing::debug;

use super::state::{ExpectedShape, ExtractorState, Position};
use crate::cursor::{AsyncResultCursor, DrainedResultSet, drain_current_async};
use crate::error::SqlMultisetError;
use crate::materialize::{
    Entity, convert_scalar, first_value, materialize_dynamic, materialize_typed,
};
use crate::metadata::MetadataResolver;
use crate::provider::AsyncSchemaProvider;
use crate::results::DataRow;
use crate::types::{FromRowValue, RowValues, TransactionContext};

/// Suspending counterpart of [`Extractor`](super::Extractor).
///
/// Every provider call (side connection, schema query, row reads, cursor advance) is awaited,
/// so the calling task never blocks its worker thread. Dropping the extractor without
/// [`dispose`](Self::dispose) leaves closing to the cursor's own `Drop`.
pub struct AsyncExtractor<'p, C, P>
where
    C: AsyncResultCursor,
    P: AsyncSchemaProvider + ?Sized,
{
    cursor: C,
    provider: &'p P,
    transaction: Option<TransactionContext>,
    resolver: MetadataResolver,
    state: ExtractorState,
}

impl<'p, C, P> AsyncExtractor<'p, C, P>
where
    C: AsyncResultCursor,
    P: AsyncSchemaProvider + ?Sized,
{
    pub fn new(cursor: C, provider: &'p P) -> Self {
        let state = ExtractorState::new(cursor.has_current());
        Self {
            cursor,
            provider,
            transaction: None,
            resolver: MetadataResolver::global(),
            state,
        }
    }

    #[must_use]
    pub fn with_transaction(mut self, transaction: TransactionContext) -> Self {
        self.transaction = Some(transaction);
        self
    }

    #[must_use]
    pub fn with_resolver(mut self, resolver: MetadataResolver) -> Self {
        self.resolver = resolver;
        self
    }

    #[must_use]
    pub fn with_expected_shapes(mut self, shapes: Vec<ExpectedShape>) -> Self {
        self.state.set_expected(shapes);
        self
    }

    #[must_use]
    pub fn position(&self) -> Position {
        self.state.position()
    }

    /// # Errors
    /// See [`Extractor::extract`](super::Extractor::extract).
    pub async fn extract<T: Entity>(&mut self) -> Result<Vec<T>, SqlMultisetError> {
        let index = self
            .state
            .require_current("extract", &ExpectedShape::typed::<T>())?;
        let descriptors = self
            .resolver
            .ensure_metadata_async::<T, P>(self.provider, self.transaction.as_ref())
            .await?;
        debug!(index, table = T::table_name(), "extracting typed result set");

        let drained = self.drain().await?;
        let entities = self.guard(materialize_typed::<T>(drained, &descriptors))?;
        self.advance().await?;
        Ok(entities)
    }

    /// # Errors
    /// See [`Extractor::extract_dynamic`](super::Extractor::extract_dynamic).
    pub async fn extract_dynamic(&mut self) -> Result<Vec<DataRow>, SqlMultisetError> {
        let index = self
            .state
            .require_current("extract_dynamic", &ExpectedShape::Dynamic)?;
        debug!(index, "extracting dynamic result set");
        let drained = self.drain().await?;
        let rows = materialize_dynamic(drained);
        self.advance().await?;
        Ok(rows)
    }

    /// # Errors
    /// See [`Extractor::extract_scalar`](super::Extractor::extract_scalar).
    pub async fn extract_scalar<V: FromRowValue>(
        &mut self,
    ) -> Result<Option<V>, SqlMultisetError> {
        let value = self.extract_scalar_value().await?;
        convert_scalar(value)
    }

    /// # Errors
    /// See [`Extractor::extract_scalar_value`](super::Extractor::extract_scalar_value).
    pub async fn extract_scalar_value(&mut self) -> Result<Option<RowValues>, SqlMultisetError> {
        let index = self
            .state
            .require_current("extract_scalar", &ExpectedShape::Scalar)?;
        debug!(index, "extracting scalar");
        let first = self.cursor.read_row().await;
        let first = self.guard(first)?;
        self.advance().await?;
        Ok(first_value(first))
    }

    /// # Errors
    /// See [`Extractor::next_result`](super::Extractor::next_result).
    pub async fn next_result(&mut self) -> Result<bool, SqlMultisetError> {
        if !self.state.check_advance()? {
            return Ok(false);
        }
        self.advance().await
    }

    /// # Errors
    /// See [`Extractor::dispose`](super::Extractor::dispose).
    pub async fn dispose(&mut self) -> Result<(), SqlMultisetError> {
        if !self.state.dispose() {
            return Ok(());
        }
        debug!("disposing extractor cursor");
        self.cursor.close().await
    }

    /// # Errors
    /// See [`Extractor::finish`](super::Extractor::finish).
    pub async fn finish(mut self) -> Result<(), SqlMultisetError> {
        let verified = self.state.verify_complete();
        self.dispose().await?;
        verified
    }

    async fn drain(&mut self) -> Result<DrainedResultSet, SqlMultisetError> {
        let drained = drain_current_async(&mut self.cursor).await;
        self.guard(drained)
    }

    async fn advance(&mut self) -> Result<bool, SqlMultisetError> {
        let more = self.cursor.next_result().await;
        let more = self.guard(more)?;
        self.state.advanced(more);
        Ok(more)
    }

    fn guard<R>(&mut self, result: Result<R, SqlMultisetError>) -> Result<R, SqlMultisetError> {
        if result.is_err() {
            self.state.fault();
        }
        result
    }
}
