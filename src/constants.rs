use std::num::NonZeroUsize;

// ENDPOINTS
pub const USERNAMES_URL: &str = "http://81.70.150.62:3000/api/usernames";
pub const CLAIM_URL: &str = "https://addplus.org/api/trpc/users.claimPoints";
pub const ORIGIN: &str = "https://addplus.org";

// FILES
pub const CONFIG_FILE_PATH: &str = "config.toml";
pub const ACCOUNTS_FILE_PATH: &str = "accounts.json";
pub const LEDGER_FILE_PATH: &str = "client_username.json";
pub const LOGS_DIR: &str = "logs";

// TIMEOUTS (seconds)
pub const FETCH_TIMEOUT_SECS: u64 = 10;
pub const CLAIM_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_WORKERS: NonZeroUsize = match NonZeroUsize::new(5) {
    Some(workers) => workers,
    None => unreachable!(),
};
