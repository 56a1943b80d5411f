//! Domain models for the ledger engine.

mod company;
mod exchange_rate_log;
mod invoice;
pub mod money;
mod payment;
mod sequence;

pub use company::CompanySettings;
pub use exchange_rate_log::ExchangeRateLog;
pub use invoice::{CreateInvoice, Invoice, InvoiceBalance, InvoiceStatus, PaidStatus, UpdateInvoice};
pub use payment::{CreatePayment, Payment, UpdatePayment};
pub use sequence::{DocumentKind, SerialNumberFormat};
