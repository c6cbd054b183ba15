//! # quarry-governor
//!
//! Admission control over memory, CPU, and concurrency slots.
//!
//! Requests that fit are granted at once; the rest wait in a priority queue
//! (lower number first, FIFO within a level) with promotion for long waits.
//! A grant is a scoped [`Reservation`] released on drop.

pub mod governor;
pub mod ledger;
pub mod request;

pub use governor::{Admission, ResourceGovernor, Reservation, Ticket};
pub use ledger::{GovernorLimits, LedgerSnapshot};
pub use request::ResourceRequest;
