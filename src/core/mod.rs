pub mod error;
pub mod types;

pub use error::{BackupError, Result};
pub use types::{
    LEDGER_FILE, PAYLOAD_LOG_FILE, RunId, RunState, SENTINEL_FILE, Verdict,
};
