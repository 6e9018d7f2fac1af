//! The five sequential stages of the aggregation protocol.
//!
//! Decode reconciles each record's dual-encoded fields, aggregate sums all
//! records field-wise, anonymize gates every non-population field on the
//! k-anonymity threshold, redact overwrites the squared accumulators, and
//! reveal declassifies the result. Each stage consumes its input and produces
//! a new value; there are no retries and no backward transitions.
//!
//! No stage ever branches on secret data: all conditional logic is routed
//! through [`Engine::select`].

use crate::{
    engine::{Engine, SharePair, Visibility},
    game::{Error, Stage},
    mapper::{flatten, unflatten, uniform_subgroup_count},
    metrics::{GroupedLiftMetrics, HIDDEN_METRIC, LiftMetrics},
};

fn fault<E>(stage: Stage) -> impl Fn(E) -> Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    move |source| Error::Engine {
        stage,
        source: Box::new(source),
    }
}

/// Reconciles every input record's dual-encoded fields into flat sequences
/// of single secrets.
///
/// The batch shape is validated before any engine operation is issued.
/// Returns the decoded sequences and the common subgroup count.
pub(crate) async fn decode<E: Engine>(
    engine: &mut E,
    inputs: Vec<GroupedLiftMetrics<SharePair<E::Secret>>>,
) -> Result<(Vec<Vec<E::Secret>>, usize), Error> {
    let subgroup_count = uniform_subgroup_count(&inputs)?;
    let mut decoded = Vec::with_capacity(inputs.len());
    for record in inputs {
        let pairs = flatten(record);
        let mut fields = Vec::with_capacity(pairs.len());
        for SharePair(a, b) in &pairs {
            let field = engine
                .reconcile(a, b)
                .await
                .map_err(fault(Stage::Decode))?;
            fields.push(field);
        }
        decoded.push(fields);
    }
    Ok((decoded, subgroup_count))
}

/// Reduces the decoded sequences into one sequence via field-wise addition.
///
/// The engine's addition is associative and commutative, so the result is
/// independent of the record order.
pub(crate) async fn aggregate<E: Engine>(
    engine: &mut E,
    decoded: Vec<Vec<E::Secret>>,
) -> Result<Vec<E::Secret>, Error> {
    let mut records = decoded.into_iter();
    let Some(mut sums) = records.next() else {
        return Err(crate::mapper::ShapeError::Empty.into());
    };
    for record in records {
        for (sum, field) in sums.iter_mut().zip(&record) {
            *sum = engine
                .add(sum, field)
                .await
                .map_err(fault(Stage::Aggregate))?;
        }
    }
    Ok(sums)
}

/// Hides every non-population field of each block that fails the k-anonymity
/// threshold.
///
/// The gate is evaluated per block independently: a subgroup may be hidden
/// while the aggregate block is exposed, and vice versa.
pub(crate) async fn anonymize<E: Engine>(
    engine: &mut E,
    fields: Vec<E::Secret>,
    subgroup_count: usize,
    threshold: i64,
) -> Result<GroupedLiftMetrics<E::Secret>, Error> {
    let record = unflatten(fields, subgroup_count)?;
    let metrics = anonymize_block(engine, record.metrics, threshold)
        .await
        .map_err(fault(Stage::Anonymize))?;
    let mut subgroups = Vec::with_capacity(record.subgroups.len());
    for subgroup in record.subgroups {
        let subgroup = anonymize_block(engine, subgroup, threshold)
            .await
            .map_err(fault(Stage::Anonymize))?;
        subgroups.push(subgroup);
    }
    Ok(GroupedLiftMetrics { metrics, subgroups })
}

async fn anonymize_block<E: Engine>(
    engine: &mut E,
    block: LiftMetrics<E::Secret>,
    threshold: i64,
) -> Result<LiftMetrics<E::Secret>, E::Error> {
    let hidden = engine.constant(HIDDEN_METRIC);
    let level = engine.constant(threshold);
    let converters = engine
        .add(&block.test_converters, &block.control_converters)
        .await?;
    let condition = engine.greater_or_equal(&converters, &level).await?;

    let test_conversions = engine.select(&condition, &block.test_conversions, &hidden).await?;
    let control_conversions = engine.select(&condition, &block.control_conversions, &hidden).await?;
    let test_converters = engine.select(&condition, &block.test_converters, &hidden).await?;
    let control_converters = engine.select(&condition, &block.control_converters, &hidden).await?;
    let test_value = engine.select(&condition, &block.test_value, &hidden).await?;
    let control_value = engine.select(&condition, &block.control_value, &hidden).await?;
    let test_squared = engine.select(&condition, &block.test_squared, &hidden).await?;
    let control_squared = engine.select(&condition, &block.control_squared, &hidden).await?;
    let test_match_count = engine.select(&condition, &block.test_match_count, &hidden).await?;
    let control_match_count = engine.select(&condition, &block.control_match_count, &hidden).await?;
    let test_impressions = engine.select(&condition, &block.test_impressions, &hidden).await?;
    let control_impressions = engine.select(&condition, &block.control_impressions, &hidden).await?;
    let test_clicks = engine.select(&condition, &block.test_clicks, &hidden).await?;
    let control_clicks = engine.select(&condition, &block.control_clicks, &hidden).await?;

    Ok(LiftMetrics {
        // populations are never hidden
        test_population: block.test_population,
        control_population: block.control_population,
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
    })
}

/// Unconditionally overwrites the squared accumulators of every block.
///
/// The second moments are never intended to leave the secure boundary, even
/// when a block clears the anonymity threshold. Only public constants are
/// written, so this stage is non-interactive and cannot fault.
pub(crate) fn redact<E: Engine>(
    engine: &mut E,
    mut record: GroupedLiftMetrics<E::Secret>,
) -> GroupedLiftMetrics<E::Secret> {
    record.metrics.test_squared = engine.constant(HIDDEN_METRIC);
    record.metrics.control_squared = engine.constant(HIDDEN_METRIC);
    for subgroup in &mut record.subgroups {
        subgroup.test_squared = engine.constant(HIDDEN_METRIC);
        subgroup.control_squared = engine.constant(HIDDEN_METRIC);
    }
    record
}

/// Declassifies every field of the record to the given visibility scope.
pub(crate) async fn reveal<E: Engine>(
    engine: &mut E,
    record: GroupedLiftMetrics<E::Secret>,
    scope: Visibility,
) -> Result<GroupedLiftMetrics<i64>, Error> {
    let subgroup_count = record.subgroups.len();
    let fields = flatten(record);
    let mut revealed = Vec::with_capacity(fields.len());
    for field in &fields {
        let value = engine
            .reveal(field, scope)
            .await
            .map_err(fault(Stage::Reveal))?;
        revealed.push(value);
    }
    Ok(unflatten(revealed, subgroup_count)?)
}
