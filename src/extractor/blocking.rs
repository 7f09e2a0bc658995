use tracing::{debug, warn};

use super::state::{ExpectedShape, ExtractorState, Position};
use crate::cursor::{DrainedResultSet, ResultCursor, drain_current};
use crate::error::SqlMultisetError;
use crate::materialize::{
    Entity, convert_scalar, first_value, materialize_dynamic, materialize_typed,
};
use crate::metadata::MetadataResolver;
use crate::provider::SchemaProvider;
use crate::results::DataRow;
use crate::types::{FromRowValue, RowValues, TransactionContext};

/// Reads the result sets of one batched command, one call per result set, in order.
///
/// The extractor owns the cursor. The provider (standing in for the primary connection) and
/// the transaction context are borrowed and only used to open side connections for schema
/// discovery.
pub struct Extractor<'p, C, P>
where
    C: ResultCursor,
    P: SchemaProvider + ?Sized,
{
    cursor: C,
    provider: &'p P,
    transaction: Option<TransactionContext>,
    resolver: MetadataResolver,
    state: ExtractorState,
}

impl<'p, C, P> Extractor<'p, C, P>
where
    C: ResultCursor,
    P: SchemaProvider + ?Sized,
{
    /// Wrap an open cursor; metadata goes to the process-wide cache.
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

    /// Declare the shapes the batch is expected to produce, in order. Each extraction is
    /// checked against this list before the cursor is touched.
    #[must_use]
    pub fn with_expected_shapes(mut self, shapes: Vec<ExpectedShape>) -> Self {
        self.state.set_expected(shapes);
        self
    }

    #[must_use]
    pub fn position(&self) -> Position {
        self.state.position()
    }

    /// Materialize the current result set as `T`, then advance.
    ///
    /// # Errors
    /// Returns `CursorState` outside a readable position, metadata errors from schema
    /// discovery (the position is kept), and read or materialization errors (the extractor
    /// becomes faulted).
    pub fn extract<T: Entity>(&mut self) -> Result<Vec<T>, SqlMultisetError> {
        let index = self
            .state
            .require_current("extract", &ExpectedShape::typed::<T>())?;
        let descriptors = self
            .resolver
            .ensure_metadata::<T, P>(self.provider, self.transaction.as_ref())?;
        debug!(index, table = T::table_name(), "extracting typed result set");

        let drained = self.drain()?;
        let entities = self.guard(materialize_typed::<T>(drained, &descriptors))?;
        self.advance()?;
        Ok(entities)
    }

    /// Materialize the current result set as dynamic rows, then advance.
    ///
    /// # Errors
    /// Returns `CursorState` outside a readable position and read errors from the cursor.
    pub fn extract_dynamic(&mut self) -> Result<Vec<DataRow>, SqlMultisetError> {
        let index = self
            .state
            .require_current("extract_dynamic", &ExpectedShape::Dynamic)?;
        debug!(index, "extracting dynamic result set");
        let drained = self.drain()?;
        let rows = materialize_dynamic(drained);
        self.advance()?;
        Ok(rows)
    }

    /// First column of the first row as `V`, then advance. An empty result set and a NULL
    /// value both yield `Ok(None)`.
    ///
    /// # Errors
    /// Returns `CursorState` outside a readable position, read errors from the cursor, and
    /// `Conversion` when the value does not fit `V`.
    pub fn extract_scalar<V: FromRowValue>(&mut self) -> Result<Option<V>, SqlMultisetError> {
        let value = self.extract_scalar_value()?;
        convert_scalar(value)
    }

    /// First column of the first row without conversion, then advance.
    ///
    /// # Errors
    /// Returns `CursorState` outside a readable position and read errors from the cursor.
    pub fn extract_scalar_value(&mut self) -> Result<Option<RowValues>, SqlMultisetError> {
        let index = self
            .state
            .require_current("extract_scalar", &ExpectedShape::Scalar)?;
        debug!(index, "extracting scalar");
        let first = self.cursor.read_row();
        let first = self.guard(first)?;
        self.advance()?;
        Ok(first_value(first))
    }

    /// Skip the current result set. Returns whether another result set follows; once the
    /// batch is exhausted this keeps returning `false`.
    ///
    /// # Errors
    /// Returns `CursorState` after dispose or a fault, and provider errors while advancing.
    pub fn next_result(&mut self) -> Result<bool, SqlMultisetError> {
        if !self.state.check_advance()? {
            return Ok(false);
        }
        self.advance()
    }

    /// Release the cursor. Later calls do nothing. The connection and transaction are left
    /// alone.
    ///
    /// # Errors
    /// Returns the provider error raised while closing the cursor.
    pub fn dispose(&mut self) -> Result<(), SqlMultisetError> {
        if !self.state.dispose() {
            return Ok(());
        }
        debug!("disposing extractor cursor");
        self.cursor.close()
    }

    /// Verify the expected shapes (if any) were all consumed, then dispose.
    ///
    /// # Errors
    /// Returns `ShapeMismatch` when fewer or more result sets were consumed than expected, or
    /// the error from [`dispose`](Self::dispose).
    pub fn finish(mut self) -> Result<(), SqlMultisetError> {
        let verified = self.state.verify_complete();
        self.dispose()?;
        verified
    }

    fn drain(&mut self) -> Result<DrainedResultSet, SqlMultisetError> {
        let drained = drain_current(&mut self.cursor);
        self.guard(drained)
    }

    fn advance(&mut self) -> Result<bool, SqlMultisetError> {
        let more = self.cursor.next_result();
        let more = self.guard(more)?;
        self.state.advanced(more);
        Ok(more)
    }

    /// Fault the extractor when `result` is an error.
    fn guard<R>(&mut self, result: Result<R, SqlMultisetError>) -> Result<R, SqlMultisetError> {
        if result.is_err() {
            self.state.fault();
        }
        result
    }
}

impl<C, P> Drop for Extractor<'_, C, P>
where
    C: ResultCursor,
    P: SchemaProvider + ?Sized,
{
    fn drop(&mut self) {
        if let Err(err) = self.dispose() {
            warn!(error = %err, "failed to close cursor on drop");
        }
    }
}
