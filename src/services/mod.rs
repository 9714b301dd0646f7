pub mod checkpoint;
pub mod importer;
pub mod job_ledger;
pub mod repository;
pub mod spotify;
pub mod sync;
pub mod token_vault;
pub mod tools;

pub use checkpoint::CheckpointStore;
pub use job_ledger::JobLedger;
pub use repository::MusicRepository;
pub use token_vault::TokenVault;
