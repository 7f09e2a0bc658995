//! Turning drained result sets into typed entities, dynamic rows or scalars.

use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::cursor::DrainedResultSet;
use crate::error::SqlMultisetError;
use crate::metadata::ColumnDescriptor;
use crate::results::DataRow;
use crate::types::{FromRowValue, RowValues, null_to_none};

/// A record type materialized from rows of one table.
///
/// ```rust
/// use sql_multiset::prelude::*;
///
/// struct User {
///     id: i64,
///     name: String,
/// }
///
/// impl Entity for User {
///     fn table_name() -> &'static str {
///         "users"
///     }
///
///     fn from_row(row: &EntityRow<'_>) -> Result<Self, SqlMultisetError> {
///         Ok(User {
///             id: row.get("id")?,
///             name: row.get("name")?,
///         })
///     }
/// }
/// ```
pub trait Entity: Sized + 'static {
    /// Table whose schema describes this entity.
    fn table_name() -> &'static str;

    /// Build one entity from a row whose values were already coerced through the table's
    /// column descriptors.
    ///
    /// # Errors
    /// Returns `SqlMultisetError` when a required column is missing or cannot be converted.
    fn from_row(row: &EntityRow<'_>) -> Result<Self, SqlMultisetError>;
}

/// One row handed to [`Entity::from_row`], together with the table's descriptors.
#[derive(Debug)]
pub struct EntityRow<'a> {
    row: &'a DataRow,
    descriptors: &'a [ColumnDescriptor],
}

impl<'a> EntityRow<'a> {
    #[must_use]
    pub fn new(row: &'a DataRow, descriptors: &'a [ColumnDescriptor]) -> Self {
        Self { row, descriptors }
    }

    #[must_use]
    pub fn row(&self) -> &DataRow {
        self.row
    }

    /// Descriptor of the table column named `column`, if the table has one.
    #[must_use]
    pub fn descriptor(&self, column: &str) -> Option<&ColumnDescriptor> {
        self.descriptors.iter().find(|d| d.matches(column))
    }

    /// Convert the value of `column`.
    ///
    /// # Errors
    /// Returns `SqlMultisetError::Materialize` if the column is absent from the result set and
    /// `SqlMultisetError::Conversion` if its value does not fit `V`.
    pub fn get<V: FromRowValue>(&self, column: &str) -> Result<V, SqlMultisetError> {
        let value = self.row.get(column).ok_or_else(|| {
            SqlMultisetError::Materialize(format!("column '{column}' not present in result set"))
        })?;
        V::from_row_value(value).map_err(|err| match err {
            SqlMultisetError::Conversion(msg) => {
                SqlMultisetError::Conversion(format!("column '{column}': {msg}"))
            }
            other => other,
        })
    }

    /// Like [`get`](Self::get), but a missing column or NULL yields `None`.
    ///
    /// # Errors
    /// Returns `SqlMultisetError::Conversion` if a present value does not fit `V`.
    pub fn get_opt<V: FromRowValue>(&self, column: &str) -> Result<Option<V>, SqlMultisetError> {
        match self.row.get(column) {
            None | Some(RowValues::Null) => Ok(None),
            Some(_) => self.get(column).map(Some),
        }
    }

    /// Deserialize the whole row through serde, using the row's JSON object form.
    ///
    /// # Errors
    /// Returns `SqlMultisetError::Materialize` if the row does not deserialize into `T`.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, SqlMultisetError> {
        serde_json::from_value(self.row.to_json()).map_err(|e| {
            SqlMultisetError::Materialize(format!(
                "cannot deserialize row into {}: {e}",
                std::any::type_name::<T>()
            ))
        })
    }
}

/// Map each result column to the table descriptor of the same name.
fn match_descriptors<'d>(
    columns: &[String],
    descriptors: &'d [ColumnDescriptor],
) -> Vec<Option<&'d ColumnDescriptor>> {
    columns
        .iter()
        .map(|col| descriptors.iter().find(|d| d.matches(col)))
        .collect()
}

/// Materialize every row of a drained result set as `T`.
///
/// # Errors
/// Returns `SqlMultisetError::Materialize` when the result set shares no column with `T`'s
/// table, or the first error raised by [`Entity::from_row`].
pub(crate) fn materialize_typed<T: Entity>(
    drained: DrainedResultSet,
    descriptors: &[ColumnDescriptor],
) -> Result<Vec<T>, SqlMultisetError> {
    let DrainedResultSet { columns, rows } = drained;
    let matched = match_descriptors(&columns, descriptors);
    if !columns.is_empty() && matched.iter().all(Option::is_none) {
        return Err(SqlMultisetError::Materialize(format!(
            "result set columns [{}] do not belong to table '{}'",
            columns.join(", "),
            T::table_name()
        )));
    }

    let columns: Arc<[String]> = columns.into();
    let mut entities = Vec::with_capacity(rows.len());
    for raw in rows {
        let values = raw
            .into_iter()
            .zip(matched.iter())
            .map(|(value, descriptor)| match descriptor {
                Some(d) => d.coerce(value),
                None => value,
            })
            .collect();
        let row = DataRow::new(Arc::clone(&columns), values);
        entities.push(T::from_row(&EntityRow::new(&row, descriptors))?);
    }
    Ok(entities)
}

/// Materialize every row of a drained result set as a [`DataRow`].
pub(crate) fn materialize_dynamic(drained: DrainedResultSet) -> Vec<DataRow> {
    let DrainedResultSet { columns, rows } = drained;
    let columns: Arc<[String]> = columns.into();
    rows.into_iter()
        .map(|values| DataRow::new(Arc::clone(&columns), values))
        .collect()
}

/// First column of the first row, with NULL mapped to `None`. A missing row is `None` too.
pub(crate) fn first_value(first_row: Option<Vec<RowValues>>) -> Option<RowValues> {
    first_row
        .and_then(|row| row.into_iter().next())
        .and_then(null_to_none)
}

/// Convert a scalar read by [`first_value`].
///
/// # Errors
/// Returns `SqlMultisetError::Conversion` if the value does not fit `V`.
pub(crate) fn convert_scalar<V: FromRowValue>(
    value: Option<RowValues>,
) -> Result<Option<V>, SqlMultisetError> {
    value.as_ref().map(V::from_row_value).transpose()
}
