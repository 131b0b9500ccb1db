//! Application layer: the services that orchestrate the domain over its ports.
//!
//! `LedgerEngine` wires them together and is the entry point used by the
//! interfaces.

pub mod balances;
pub mod confirmation;
pub mod engine;
pub mod gateway;
pub mod recorder;
pub mod release;
pub mod reports;
