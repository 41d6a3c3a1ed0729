pub mod engine;
pub mod request;

pub use engine::WalletEngine;
pub use request::{AdjustmentDirection, WalletOp, WalletOpRequest, WalletOpResult};
