//! The orchestrating game: configuration plus the single [`play`] entry
//! point that drives the aggregation pipeline end to end.
//!
//! [`play`]: LiftAggregationGame::play

use std::fmt;

use tracing::debug;

use crate::{
    engine::{Engine, SharePair, Visibility},
    mapper::ShapeError,
    metrics::GroupedLiftMetrics,
    pipeline,
};

/// The pipeline stage during which an engine fault occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Reconciling the dual-encoded input records.
    Decode,
    /// Summing all records field-wise.
    Aggregate,
    /// Applying the k-anonymity gate.
    Anonymize,
    /// Overwriting the squared accumulators.
    Redact,
    /// Declassifying the result.
    Reveal,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            Stage::Decode => "decode",
            Stage::Aggregate => "aggregate",
            Stage::Anonymize => "anonymize",
            Stage::Redact => "redact",
            Stage::Reveal => "reveal",
        };
        f.write_str(stage)
    }
}

/// An error aborting an aggregation run.
///
/// Every failure is fatal to the current [`play`] invocation; no partial or
/// best-effort result is ever returned. Retries, if any, are the concern of
/// the harness managing the interactive session.
///
/// [`play`]: LiftAggregationGame::play
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The input batch or a flat sequence is malformed. Raised before any
    /// secure operation is issued.
    #[error(transparent)]
    Shape(#[from] ShapeError),
    /// A negative k-anonymity threshold was supplied at construction.
    #[error("invalid k-anonymity threshold {0}, must be non-negative")]
    InvalidThreshold(i64),
    /// The visibility scope names a party the engine session does not have.
    #[error("visibility scope names party {party}, but the session has {parties} parties")]
    UnknownParty {
        /// The party index named by the scope.
        party: usize,
        /// The number of parties in the engine session.
        parties: usize,
    },
    /// The secure-computation engine failed; surfaced unchanged as the
    /// source.
    #[error("engine fault during {stage} stage")]
    Engine {
        /// The pipeline stage that issued the failing operation.
        stage: Stage,
        /// The engine's own error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// A k-anonymous lift aggregation run over a secure-computation engine
/// session.
///
/// The game owns the engine session and its immutable run configuration: the
/// visibility scope the result is declassified to and the k-anonymity
/// threshold, the minimum combined test+control converter count a block
/// needs before its non-population fields are exposed.
#[derive(Debug)]
pub struct LiftAggregationGame<E> {
    engine: E,
    visibility: Visibility,
    threshold: i64,
}

impl<E: Engine> LiftAggregationGame<E> {
    /// The k-anonymity threshold used by [`LiftAggregationGame::new`].
    pub const DEFAULT_THRESHOLD: i64 = 100;

    /// Creates a game with the default k-anonymity threshold.
    pub fn new(engine: E, visibility: Visibility) -> Result<Self, Error> {
        Self::with_threshold(engine, visibility, Self::DEFAULT_THRESHOLD)
    }

    /// Creates a game with an explicit k-anonymity threshold.
    ///
    /// Rejects a negative threshold and a visibility scope naming a party
    /// outside the engine session.
    pub fn with_threshold(
        engine: E,
        visibility: Visibility,
        threshold: i64,
    ) -> Result<Self, Error> {
        if threshold < 0 {
            return Err(Error::InvalidThreshold(threshold));
        }
        if let Visibility::Party(party) = visibility {
            let parties = engine.parties();
            if party >= parties {
                return Err(Error::UnknownParty { party, parties });
            }
        }
        Ok(LiftAggregationGame {
            engine,
            visibility,
            threshold,
        })
    }

    /// The visibility scope the result is declassified to.
    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    /// The configured k-anonymity threshold.
    pub fn threshold(&self) -> i64 {
        self.threshold
    }

    /// Runs the full aggregation protocol over the given input records and
    /// returns the declassified result.
    ///
    /// Hidden and redacted fields read as the literal integer `-1` in the
    /// output. The result is independent of the order of `inputs`.
    pub async fn play(
        &mut self,
        inputs: Vec<GroupedLiftMetrics<SharePair<E::Secret>>>,
    ) -> Result<GroupedLiftMetrics<i64>, Error> {
        debug!(records = inputs.len(), "decoding metrics");
        let (decoded, subgroup_count) = pipeline::decode(&mut self.engine, inputs).await?;

        debug!("aggregating metrics");
        let aggregated = pipeline::aggregate(&mut self.engine, decoded).await?;

        debug!(threshold = self.threshold, "applying k-anonymity threshold");
        let anonymized =
            pipeline::anonymize(&mut self.engine, aggregated, subgroup_count, self.threshold)
                .await?;
        let redacted = pipeline::redact(&mut self.engine, anonymized);

        debug!(visibility = ?self.visibility, "revealing metrics");
        pipeline::reveal(&mut self.engine, redacted, self.visibility).await
    }

    /// Consumes the game and hands the engine session back to the caller.
    pub fn into_engine(self) -> E {
        self.engine
    }
}
