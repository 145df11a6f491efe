use crate::model::Ms;

/// 1970-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;
/// 2100-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

/// A slot never exceeds one day.
pub const MAX_SLOT_DURATION_MINUTES: u32 = 24 * 60;

pub const MAX_FACILITIES: usize = 10_000;
pub const MAX_COURTS_PER_FACILITY: usize = 256;
pub const MAX_NAME_LEN: usize = 256;
pub const MAX_TOKEN_LEN: usize = 512;

/// Longest accepted request line on the wire, in bytes.
pub const MAX_LINE_LEN: usize = 64 * 1024;
