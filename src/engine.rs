//! The contract of the secure-computation engine this crate runs on.
//!
//! The engine owns everything cryptographic: the representation of secret
//! values, the interactive protocol that evaluates operations on them, key
//! management and the channels to the other parties. This crate only issues
//! operations against the [`Engine`] trait and never inspects a secret.
//!
//! Engine operations may perform interactive protocol rounds with the other
//! parties, so they are async; the pipeline awaits every operation to
//! completion before issuing the next one.

use std::future::Future;

use serde::{Deserialize, Serialize};

/// The scope of parties a secret value may be declassified to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    /// Every participating party learns the plaintext.
    Public,
    /// Only the party with the given index learns the plaintext.
    Party(usize),
}

/// The two engine encodings of one logical input value.
///
/// Each input record carries its fields dual-encoded; the decode stage of the
/// pipeline reconciles the two encodings into a single secret via
/// [`Engine::reconcile`].
#[derive(Debug, Clone)]
pub struct SharePair<S>(pub S, pub S);

/// A secure-computation engine session operating on secret 64-bit integers.
///
/// All operations are field-wise: one call operates on one logical metric
/// field and must not leak information about any other field. An engine
/// fault is fatal to the current run; this crate never retries.
pub trait Engine {
    /// A secret-encoded 64-bit integer.
    type Secret: Clone + Send + Sync;
    /// A secret boolean, as produced by [`Engine::greater_or_equal`].
    type Condition: Clone + Send + Sync;
    /// The error reported when a protocol, network or cryptographic step
    /// fails.
    type Error: std::error::Error + Send + Sync + 'static;

    /// The number of parties participating in this session.
    fn parties(&self) -> usize;

    /// Encodes a public constant known to all parties.
    ///
    /// Public constants are locally encodable in every mainstream sharing
    /// scheme, so this operation is infallible and non-interactive.
    fn constant(&mut self, value: i64) -> Self::Secret;

    /// Bitwise XOR of two secrets.
    fn xor(
        &mut self,
        a: &Self::Secret,
        b: &Self::Secret,
    ) -> impl Future<Output = Result<Self::Secret, Self::Error>> + Send;

    /// Wrapping addition of two secrets.
    fn add(
        &mut self,
        a: &Self::Secret,
        b: &Self::Secret,
    ) -> impl Future<Output = Result<Self::Secret, Self::Error>> + Send;

    /// Signed 64-bit comparison `a >= b`, yielding a secret boolean.
    fn greater_or_equal(
        &mut self,
        a: &Self::Secret,
        b: &Self::Secret,
    ) -> impl Future<Output = Result<Self::Condition, Self::Error>> + Send;

    /// Oblivious selection: `t` if `cond` is true, otherwise `f`.
    ///
    /// No party learns `cond`; there must be no observable control-flow
    /// difference between the two outcomes.
    fn select(
        &mut self,
        cond: &Self::Condition,
        t: &Self::Secret,
        f: &Self::Secret,
    ) -> impl Future<Output = Result<Self::Secret, Self::Error>> + Send;

    /// Declassifies a secret to the parties named by `scope`.
    ///
    /// Fails fatally when no interactive session is available.
    fn reveal(
        &mut self,
        value: &Self::Secret,
        scope: Visibility,
    ) -> impl Future<Output = Result<i64, Self::Error>> + Send;

    /// Combines the two encodings of one logical input value.
    ///
    /// The combinator is dictated by the engine's sharing scheme. The default
    /// is XOR, matching boolean/XOR sharing; an engine using e.g. additive
    /// shares overrides this with addition. The decode stage only ever calls
    /// `reconcile`, never a hard-coded combinator.
    fn reconcile(
        &mut self,
        a: &Self::Secret,
        b: &Self::Secret,
    ) -> impl Future<Output = Result<Self::Secret, Self::Error>> + Send {
        self.xor(a, b)
    }
}

/// A secret held by the [`PlaintextEngine`]. Not secret at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlainSecret(i64);

/// A condition held by the [`PlaintextEngine`]. Not secret at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlainCondition(bool);

/// The error raised by [`PlaintextEngine`] operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlainEngineError {
    /// The interactive session was closed before the operation.
    #[error("no interactive session available")]
    SessionClosed,
}

/// An insecure in-process engine evaluating every operation on plaintext.
///
/// This engine provides **no security whatsoever**: "secrets" are plain
/// integers held in local memory. It exists so the aggregation protocol can
/// be exercised in tests and local simulations without a real multi-party
/// session, similar in spirit to running an MPC protocol over in-memory
/// channels.
#[derive(Debug)]
pub struct PlaintextEngine {
    parties: usize,
    ops_issued: u64,
    session_open: bool,
}

impl PlaintextEngine {
    /// Creates an engine simulating a session between `parties` parties.
    pub fn new(parties: usize) -> Self {
        PlaintextEngine {
            parties,
            ops_issued: 0,
            session_open: true,
        }
    }

    /// Splits a plaintext value into a random pair of XOR shares.
    ///
    /// The pair reconciles back to `value` under the default XOR combinator.
    pub fn share(&mut self, value: i64) -> SharePair<PlainSecret> {
        let mask: i64 = rand::random();
        SharePair(PlainSecret(mask), PlainSecret(mask ^ value))
    }

    /// The number of engine operations issued so far.
    ///
    /// Useful to assert that a rejected run never reached the engine.
    pub fn ops_issued(&self) -> u64 {
        self.ops_issued
    }

    /// Closes the simulated interactive session; subsequent reveals fail.
    pub fn close_session(&mut self) {
        self.session_open = false;
    }
}

impl Engine for PlaintextEngine {
    type Secret = PlainSecret;
    type Condition = PlainCondition;
    type Error = PlainEngineError;

    fn parties(&self) -> usize {
        self.parties
    }

    fn constant(&mut self, value: i64) -> PlainSecret {
        self.ops_issued += 1;
        PlainSecret(value)
    }

    async fn xor(&mut self, a: &PlainSecret, b: &PlainSecret) -> Result<PlainSecret, PlainEngineError> {
        self.ops_issued += 1;
        Ok(PlainSecret(a.0 ^ b.0))
    }

    async fn add(&mut self, a: &PlainSecret, b: &PlainSecret) -> Result<PlainSecret, PlainEngineError> {
        self.ops_issued += 1;
        Ok(PlainSecret(a.0.wrapping_add(b.0)))
    }

    async fn greater_or_equal(
        &mut self,
        a: &PlainSecret,
        b: &PlainSecret,
    ) -> Result<PlainCondition, PlainEngineError> {
        self.ops_issued += 1;
        Ok(PlainCondition(a.0 >= b.0))
    }

    async fn select(
        &mut self,
        cond: &PlainCondition,
        t: &PlainSecret,
        f: &PlainSecret,
    ) -> Result<PlainSecret, PlainEngineError> {
        self.ops_issued += 1;
        Ok(if cond.0 { *t } else { *f })
    }

    async fn reveal(
        &mut self,
        value: &PlainSecret,
        _scope: Visibility,
    ) -> Result<i64, PlainEngineError> {
        self.ops_issued += 1;
        // A single-process simulation has only one view, so the value is
        // revealed regardless of the scope.
        if self.session_open {
            Ok(value.0)
        } else {
            Err(PlainEngineError::SessionClosed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn share_pairs_reconcile_to_the_shared_value() {
        let mut engine = PlaintextEngine::new(2);
        for value in [0, 1, -1, 42, i64::MAX, i64::MIN] {
            let SharePair(a, b) = engine.share(value);
            let combined = engine.reconcile(&a, &b).await.unwrap();
            assert_eq!(engine.reveal(&combined, Visibility::Public).await, Ok(value));
        }
    }

    #[tokio::test]
    async fn select_is_driven_by_the_condition() {
        let mut engine = PlaintextEngine::new(2);
        let t = engine.constant(7);
        let f = engine.constant(-1);
        let lo = engine.constant(99);
        let hi = engine.constant(100);

        let cond = engine.greater_or_equal(&hi, &hi).await.unwrap();
        assert_eq!(engine.select(&cond, &t, &f).await, Ok(t));

        let cond = engine.greater_or_equal(&lo, &hi).await.unwrap();
        assert_eq!(engine.select(&cond, &t, &f).await, Ok(f));
    }

    #[tokio::test]
    async fn reveal_fails_once_the_session_is_closed() {
        let mut engine = PlaintextEngine::new(2);
        let value = engine.constant(5);
        engine.close_session();
        assert_eq!(
            engine.reveal(&value, Visibility::Public).await,
            Err(PlainEngineError::SessionClosed)
        );
    }
}
