//! Types shared between the vsmon check crates and the agent binary.

pub mod sink;
pub mod types;
