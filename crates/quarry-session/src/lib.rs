//! # quarry-session
//!
//! Explicit session lifecycle. Every cache-touching call carries the
//! [`Session`](quarry_core::Session) value it acts for; nothing is inferred
//! from ambient state.

pub mod manager;

pub use manager::SessionManager;
