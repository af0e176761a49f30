#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! All-or-nothing resource allocation for chords
//!
//! A [`Chord`] is the set of requests belonging to one unit of work. It is
//! either fully satisfied or holds nothing: acquisition picks a resource for
//! every request under the registry's allocation lock and only then acquires
//! them. Chords that cannot be satisfied at once queue on a
//! [`FairnessPolicy`] and block through a [`WaitStrategy`] until a retry
//! pass allocates them.

mod allocator;
mod chord;
pub mod clock;
pub mod fairness;
mod task;
pub mod wait;

pub use allocator::Allocator;
pub use chord::{Chord, ChordGuard, ChordId};
pub use clock::{Clock, ManualClock, SystemClock};
pub use fairness::{BestEffortFairness, FairnessPolicy, PassOutcome, StrictFifoFairness};
pub use task::Task;
pub use wait::{Backoff, PollWait, SignalWait, WaitStrategy};
