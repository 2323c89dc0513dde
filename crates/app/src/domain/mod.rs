//! Carthorse Domain Concerns

pub mod carts;
