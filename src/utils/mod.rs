//! Pure utility functions.
//!
//! Stateless helpers used by the client and the agent binary.

pub mod bootstrap;
pub mod net;
