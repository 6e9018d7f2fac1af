//! The lift metrics data model shared by all pipeline stages.
//!
//! The structs are generic over the field type `T` so that the same record
//! layout can carry plaintext `i64` values, engine secrets, or dual-encoded
//! share pairs, depending on where in the pipeline the record lives.

use serde::{Deserialize, Serialize};

/// The number of metric fields in a single [`LiftMetrics`] block.
pub const FIELDS_PER_BLOCK: usize = 16;

/// The public sentinel written into hidden or redacted fields.
///
/// The revealed output uses the literal integer `-1` for hidden fields, so a
/// genuine field value of `-1` would be indistinguishable from a hidden one.
/// All metrics are non-negative counts and amounts in practice, but this is
/// not enforced by the type.
pub const HIDDEN_METRIC: i64 = -1;

/// One block of lift measurement tallies for a test and a control group.
///
/// The field order below is the canonical order used by
/// [`flatten`](crate::mapper::flatten) and
/// [`unflatten`](crate::mapper::unflatten). The two population fields are
/// never hidden by the anonymization stage; the two squared fields are
/// unconditionally redacted before the record leaves the secure boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LiftMetrics<T> {
    /// Size of the test population.
    pub test_population: T,
    /// Size of the control population.
    pub control_population: T,
    /// Number of conversion events in the test group.
    pub test_conversions: T,
    /// Number of conversion events in the control group.
    pub control_conversions: T,
    /// Number of distinct converting users in the test group.
    pub test_converters: T,
    /// Number of distinct converting users in the control group.
    pub control_converters: T,
    /// Total conversion value in the test group.
    pub test_value: T,
    /// Total conversion value in the control group.
    pub control_value: T,
    /// Sum of squared conversion values in the test group.
    pub test_squared: T,
    /// Sum of squared conversion values in the control group.
    pub control_squared: T,
    /// Number of matched users in the test group.
    pub test_match_count: T,
    /// Number of matched users in the control group.
    pub control_match_count: T,
    /// Number of ad impressions in the test group.
    pub test_impressions: T,
    /// Number of ad impressions in the control group.
    pub control_impressions: T,
    /// Number of ad clicks in the test group.
    pub test_clicks: T,
    /// Number of ad clicks in the control group.
    pub control_clicks: T,
}

impl<T> LiftMetrics<T> {
    /// Applies `f` to every field, preserving the canonical field order.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> LiftMetrics<U> {
        LiftMetrics::from(<[T; FIELDS_PER_BLOCK]>::from(self).map(f))
    }
}

impl<T> From<LiftMetrics<T>> for [T; FIELDS_PER_BLOCK] {
    fn from(m: LiftMetrics<T>) -> Self {
        [
            m.test_population,
            m.control_population,
            m.test_conversions,
            m.control_conversions,
            m.test_converters,
            m.control_converters,
            m.test_value,
            m.control_value,
            m.test_squared,
            m.control_squared,
            m.test_match_count,
            m.control_match_count,
            m.test_impressions,
            m.control_impressions,
            m.test_clicks,
            m.control_clicks,
        ]
    }
}

impl<T> From<[T; FIELDS_PER_BLOCK]> for LiftMetrics<T> {
    fn from(fields: [T; FIELDS_PER_BLOCK]) -> Self {
        let [
            test_population,
            control_population,
            test_conversions,
            control_conversions,
            test_converters,
            control_converters,
            test_value,
            control_value,
            test_squared,
            control_squared,
            test_match_count,
            control_match_count,
            test_impressions,
            control_impressions,
            test_clicks,
            control_clicks,
        ] = fields;
        LiftMetrics {
            test_population,
            control_population,
            test_conversions,
            control_conversions,
            test_converters,
            control_converters,
            test_value,
            control_value,
            test_squared,
            control_squared,
            test_match_count,
            control_match_count,
            test_impressions,
            control_impressions,
            test_clicks,
            control_clicks,
        }
    }
}

/// An aggregate metrics block plus its ordered subgroup (breakdown) blocks.
///
/// Every input record of a single protocol run must have the same number of
/// subgroups in the same order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GroupedLiftMetrics<T> {
    /// The metrics over the whole population.
    pub metrics: LiftMetrics<T>,
    /// Metrics broken down by subgroup, e.g. by demographic or channel.
    pub subgroups: Vec<LiftMetrics<T>>,
}

impl<T> GroupedLiftMetrics<T> {
    /// Applies `f` to every field of the aggregate block and all subgroups.
    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> GroupedLiftMetrics<U> {
        GroupedLiftMetrics {
            metrics: self.metrics.map(&mut f),
            subgroups: self.subgroups.into_iter().map(|s| s.map(&mut f)).collect(),
        }
    }
}
