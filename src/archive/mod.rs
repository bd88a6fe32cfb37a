pub mod fs;
pub mod memory;
pub mod pruner;
pub mod recorder;
pub mod root;
pub mod store;

pub use fs::FsArchiveStore;
pub use memory::MemoryArchiveStore;
pub use pruner::{DIRECTORY_GRACE_PERIOD, PruneReport, RetentionPruner};
pub use recorder::OutcomeRecorder;
pub use root::{current_identity, ensure_writable};
pub use store::{ArchiveStore, LEDGER_BANNER, LedgerWriter, StoreLedger};
