/// Longest plate string accepted on the entry path.
pub const MAX_PLATE_LEN: usize = 32;

/// Upper bound on the configurable hourly rate.
pub const MAX_HOURLY_RATE: f64 = 100_000.0;

/// Upper bound on configured capacity.
pub const MAX_TOTAL_SPACES: u32 = 1_000_000;

/// Bounded capacity of the plate candidate channel between detection and voting.
pub const CANDIDATE_CHANNEL_CAPACITY: usize = 1024;

/// Bounded capacity of the controller request channel.
pub const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Bounded capacity of the voting decision channel.
pub const DECISION_CHANNEL_CAPACITY: usize = 16;

/// Candidates kept per voting window; further candidates are dropped until the window closes.
pub const MAX_CANDIDATES_PER_WINDOW: usize = 4096;
