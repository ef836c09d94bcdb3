pub mod facade;

pub use facade::{AccountUsage, ConsumerRank, DailyUsage, DaySummary, UsageReporter};

pub const DEFAULT_TOP_LIMIT: usize = 10;
pub const MAX_TOP_LIMIT: usize = 100;
