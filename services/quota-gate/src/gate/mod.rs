pub mod admission;
pub mod decision;
pub mod error;

pub use admission::AdmissionGate;
pub use decision::{QuotaDecision, QuotaStatus, Reservation};
pub use error::AdmissionError;

/// Default time a reservation stays releasable before the sweep forgets it.
pub const DEFAULT_RESERVATION_TTL_SECS: u64 = 600;
