//! A secure multi-party aggregation protocol for advertising lift
//! measurement metrics.
//!
//! Several parties each hold a private, secret-encoded partial tally of
//! test/control population, conversions, value and click/impression counts.
//! This crate combines all parties' tallies into one aggregate, hides every
//! statistical breakdown whose combined converter count falls below a
//! configured k-anonymity threshold, permanently redacts the second-moment
//! accumulators, and declassifies the result to an authorized visibility
//! scope.
//!
//! The secure-computation engine itself (the representation of secret
//! values, the interactive protocol evaluating operations on them, key
//! management and transport) is not part of this crate. It is consumed
//! through the [`engine::Engine`] trait; all privacy-relevant conditional
//! logic is expressed as oblivious selection inside that engine, never as a
//! plaintext branch observable to participants.
//!
//! ## Main Components
//!
//! * [`metrics`]: the lift metrics data model, generic over the field type.
//! * [`mapper`]: conversion between grouped records and flat field
//!   sequences.
//! * [`engine`]: the engine contract, the [`engine::Visibility`] scope and
//!   an insecure in-process reference engine for tests and simulations.
//! * [`game`]: the [`game::LiftAggregationGame`] orchestrator with its
//!   single `play` entry point.
//!
//! ## Basic Usage
//!
//! Each participating party constructs a game over its engine session and
//! plays it with the ordered batch of dual-encoded input records:
//!
//! ```
//! use private_lift::{
//!     engine::{PlaintextEngine, Visibility},
//!     game::LiftAggregationGame,
//!     metrics::GroupedLiftMetrics,
//! };
//!
//! # async fn example() -> Result<(), private_lift::game::Error> {
//! let mut engine = PlaintextEngine::new(2);
//! let input_a = GroupedLiftMetrics::default().map(|v: i64| engine.share(v));
//! let input_b = GroupedLiftMetrics::default().map(|v: i64| engine.share(v));
//!
//! let mut game = LiftAggregationGame::new(engine, Visibility::Public)?;
//! let result = game.play(vec![input_a, input_b]).await?;
//! println!("aggregated lift metrics: {result:?}");
//! # Ok(())
//! # }
//! ```
//!
//! Hidden and redacted fields read as the literal integer `-1` in the
//! declassified output.
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod engine;
pub mod game;
pub mod mapper;
pub mod metrics;

mod pipeline;
