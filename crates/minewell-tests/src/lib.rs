//! Cross-crate invariant test suite for Minewell.
//!
//! Runs complete products through `simulate` and checks the invariants the
//! engines promise for every month of every scenario, under generated price
//! and network paths as well as hand-built worked examples.

pub mod helpers;
