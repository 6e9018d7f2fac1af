//! Conversion between grouped metrics records and flat field sequences.
//!
//! The flat form is what the pipeline feeds to the engine: the aggregate
//! block's fields first, in the canonical order of
//! [`LiftMetrics`](crate::metrics::LiftMetrics), followed by each subgroup
//! block's fields in the same order. Given the subgroup count, the mapping is
//! a bijection.

use crate::metrics::{FIELDS_PER_BLOCK, GroupedLiftMetrics, LiftMetrics};

/// A structural mismatch in a record batch or a flat field sequence.
///
/// Shape errors are detected before any secure operation is issued; a run
/// rejected for its shape has not leaked anything to the engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShapeError {
    /// A flat sequence does not have `16 * (1 + subgroup_count)` fields.
    #[error("flat sequence has {actual} fields, expected {expected}")]
    WrongLength {
        /// The length implied by the subgroup count.
        expected: usize,
        /// The length of the provided sequence.
        actual: usize,
    },
    /// Two input records of the same run disagree on their subgroup count.
    #[error("input records disagree on subgroup count: expected {expected}, found {actual}")]
    SubgroupMismatch {
        /// The subgroup count of the first record.
        expected: usize,
        /// The conflicting subgroup count.
        actual: usize,
    },
    /// The batch of input records is empty.
    #[error("cannot aggregate an empty batch of input records")]
    Empty,
}

/// Serializes a grouped record into its flat field sequence.
pub fn flatten<T>(record: GroupedLiftMetrics<T>) -> Vec<T> {
    let GroupedLiftMetrics { metrics, subgroups } = record;
    let mut fields = Vec::with_capacity(FIELDS_PER_BLOCK * (1 + subgroups.len()));
    fields.extend(<[T; FIELDS_PER_BLOCK]>::from(metrics));
    for subgroup in subgroups {
        fields.extend(<[T; FIELDS_PER_BLOCK]>::from(subgroup));
    }
    fields
}

/// Rebuilds a grouped record with `subgroup_count` subgroups from its flat
/// field sequence.
pub fn unflatten<T>(
    fields: Vec<T>,
    subgroup_count: usize,
) -> Result<GroupedLiftMetrics<T>, ShapeError> {
    let expected = FIELDS_PER_BLOCK * (1 + subgroup_count);
    if fields.len() != expected {
        return Err(ShapeError::WrongLength {
            expected,
            actual: fields.len(),
        });
    }
    let mut blocks = fields.into_iter();
    let mut next_block = || {
        let block: Vec<T> = blocks.by_ref().take(FIELDS_PER_BLOCK).collect();
        // infallible, the length was checked above
        <[T; FIELDS_PER_BLOCK]>::try_from(block)
            .map(LiftMetrics::from)
            .map_err(|block| ShapeError::WrongLength {
                expected: FIELDS_PER_BLOCK,
                actual: block.len(),
            })
    };
    let metrics = next_block()?;
    let mut subgroups = Vec::with_capacity(subgroup_count);
    for _ in 0..subgroup_count {
        subgroups.push(next_block()?);
    }
    Ok(GroupedLiftMetrics { metrics, subgroups })
}

/// Returns the subgroup count shared by all records in the batch.
///
/// Rejects an empty batch and any record whose subgroup count differs from
/// the first record's.
pub fn uniform_subgroup_count<T>(
    records: &[GroupedLiftMetrics<T>],
) -> Result<usize, ShapeError> {
    let Some(first) = records.first() else {
        return Err(ShapeError::Empty);
    };
    let expected = first.subgroups.len();
    for record in &records[1..] {
        if record.subgroups.len() != expected {
            return Err(ShapeError::SubgroupMismatch {
                expected,
                actual: record.subgroups.len(),
            });
        }
    }
    Ok(expected)
}
