//! Services module for the ledger engine.

pub mod database;
pub mod invoices;
pub mod memory;
pub mod metrics;
pub mod payments;
pub mod serial_number;
pub mod store;

pub use database::PostgresStore;
pub use invoices::InvoiceService;
pub use memory::MemoryStore;
pub use metrics::{get_metrics, init_metrics};
pub use payments::PaymentService;
pub use serial_number::{SequenceNumbers, SerialNumberFormatter};
pub use store::{LedgerStore, LedgerTx};
