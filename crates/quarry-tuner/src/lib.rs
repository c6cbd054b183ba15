//! # quarry-tuner
//!
//! Derives batch size, cache size, worker count, and chunking from the host
//! and from observed query/ingestion rates. Recommendations are advisory:
//! registered [`ITuningTarget`]s receive them only when auto-apply is on.

pub mod hardware;
pub mod recommend;
pub mod tuner;
pub mod workload;

pub use hardware::HardwareProfile;
pub use recommend::{classify, recommend, TuningRecommendations, WorkloadMode};
pub use tuner::{AdaptiveTuner, ITuningTarget, TunerHandle};
pub use workload::{WorkloadProfile, WorkloadRates};
