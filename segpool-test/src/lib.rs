//! Test utilities for segpool.
//!
//! -   `BurstyBuilder` runs steps in lock-step across threads, to flush out races.
//! -   `Gate` suspends a thread until another opens it, to script a precise interleaving.

mod bursty;
mod gate;

pub use bursty::{Bursty, BurstyBuilder};
pub use gate::Gate;
