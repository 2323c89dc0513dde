//! Carthorse
//!
//! Cart domain models and pure pricing for the carthorse cart service: typed
//! identifiers, cart ownership and lifecycle, locked-in item snapshots, and the
//! aggregate computations derived from them.

pub mod cart;
pub mod ids;
pub mod money;
pub mod order;
pub mod pricing;
