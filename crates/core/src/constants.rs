/// Decimal precision for valuation calculations
pub const DECIMAL_PRECISION: u32 = 6;

/// Schema version stamped on newly recorded events
pub const EVENT_SCHEMA_VERSION: u16 = 1;

/// Default number of return observations kept per rolling risk window
/// (roughly one trading year of daily returns)
pub const DEFAULT_RISK_WINDOW: usize = 252;

/// Default number of events between automatic aggregate snapshots
pub const DEFAULT_SNAPSHOT_EVERY: u64 = 100;

/// Default worker partitions per engine consumer
pub const DEFAULT_PARTITIONS: usize = 4;

/// Default bounded capacity of engine channels
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;
