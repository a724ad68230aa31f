//! # Orders
//!
//! An [`Order`] is the unit of work that flows through the pipeline. It is a
//! plain `Copy` value: a generator builds it, moves it into the channel, and
//! exactly one worker takes ownership on the other side.
//!
//! ## Identity
//!
//! Ids are derived from the generator index and the per-generator sequence:
//!
//! ```text
//! id = generator_id * orders_per_generator + sequence
//! ```
//!
//! With 1-based generator indices this yields disjoint, contiguous id ranges
//! per generator (generator 1 owns `P..2P`, generator 2 owns `2P..3P`, ...).

/// A single unit of work emitted by a generator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Order {
    /// Unique within a run.
    pub id: u64,
    /// The 0-based sequence number within the emitting generator.
    pub value: u64,
}

impl Order {
    /// Builds the `sequence`-th order of generator `generator_id`.
    ///
    /// Callers are expected to have validated that the id fits in a `u64`
    /// (see the pipeline configuration).
    pub const fn new(generator_id: u64, sequence: u64, orders_per_generator: u64) -> Self {
        Self {
            id: generator_id * orders_per_generator + sequence,
            value: sequence,
        }
    }

    /// Returns the largest id a run of `num_generators` generators (indexed
    /// from 1) can produce, or `None` if it would overflow.
    pub fn max_id(num_generators: u64, orders_per_generator: u64) -> Option<u64> {
        if orders_per_generator == 0 || num_generators == 0 {
            return Some(0);
        }
        num_generators
            .checked_add(1)?
            .checked_mul(orders_per_generator)?
            .checked_sub(1)
    }
}
