pub const CONFIG_SEED: &[u8] = b"config";
pub const VAULT_SEED: &[u8] = b"vault";
pub const BOUNTY_SEED: &[u8] = b"bounty";
pub const SUBMISSION_SEED: &[u8] = b"submission";

/// Platform fee charged on payout, in whole percent.
pub const DEFAULT_FEE_PERCENTAGE: u8 = 5;
pub const MAX_FEE_PERCENTAGE: u8 = 10;

// Upper bounds fix the size of every record account.
pub const MAX_TITLE_LEN: usize = 128;
pub const MAX_DESCRIPTION_LEN: usize = 1024;
pub const MAX_CATEGORY_LEN: usize = 64;
pub const MAX_REPORT_REFERENCE_LEN: usize = 256;
