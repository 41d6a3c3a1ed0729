pub mod memory;
pub mod model;
pub mod repo;

pub use memory::{MemoryStore, WalletTxGuard};
pub use repo::{AmlRepo, ApiKeyRepo, DeadLetterRepo, PartnerRepo, TransactionRepo, WalletRepo};
