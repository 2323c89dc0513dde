//! Cart service application: persistence, remote lookups and the cart workflow.

pub mod config;
pub mod context;
pub mod database;
pub mod domain;
pub mod lookup;
pub mod orders;
pub mod telemetry;

#[cfg(test)]
mod test;
