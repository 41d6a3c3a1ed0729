pub mod ip_allowlist;
pub mod pipeline;

pub use ip_allowlist::ip_allowed;
pub use pipeline::{AuthPipeline, PartnerContext};
