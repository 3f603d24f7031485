//! Types and primitives shared by the pulsemon agent and server.

pub mod hash;
pub mod retry;
pub mod types;
