//! ledger-core: Shared infrastructure for the ledger workspace.
pub mod error;
pub mod observability;
pub mod utils;

pub use async_trait;
pub use serde;
pub use serde_json;
pub use tokio;
pub use tracing;
