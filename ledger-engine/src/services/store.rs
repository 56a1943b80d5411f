//! Persistence interface consumed by the engine.
//!
//! The engine only ever mutates state through a [`LedgerTx`]: a storage
//! transaction that either commits as a whole or leaves everything
//! untouched. Rows read through `*_for_update` stay locked until the
//! transaction ends, which serializes concurrent reverse+apply cycles
//! against the same invoice.

use async_trait::async_trait;
use uuid::Uuid;

use ledger_core::error::AppError;

use crate::models::{
    CompanySettings, DocumentKind, ExchangeRateLog, Invoice, Payment,
};

/// Storage backend. Two implementations exist: PostgreSQL
/// ([`crate::services::PostgresStore`]) and in-memory
/// ([`crate::services::MemoryStore`]).
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Begin a transaction. Dropping the returned handle without calling
    /// [`LedgerTx::commit`] rolls every buffered write back.
    async fn begin(&self) -> Result<Box<dyn LedgerTx + Send>, AppError>;

    /// Company configuration lookup.
    async fn company_settings(&self, company_id: Uuid) -> Result<CompanySettings, AppError>;

    async fn find_invoice(
        &self,
        company_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, AppError>;

    async fn find_payment(
        &self,
        company_id: Uuid,
        payment_id: Uuid,
    ) -> Result<Option<Payment>, AppError>;

    /// Audit-entry read for a single document, oldest first.
    async fn list_exchange_rate_logs(
        &self,
        company_id: Uuid,
        document_id: Uuid,
    ) -> Result<Vec<ExchangeRateLog>, AppError>;
}

/// One storage transaction: atomic multi-row write support.
#[async_trait]
pub trait LedgerTx: Send {
    /// Load an invoice and hold an exclusive lock on it for the rest of
    /// the transaction.
    async fn invoice_for_update(
        &mut self,
        company_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, AppError>;

    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), AppError>;

    async fn save_invoice(&mut self, invoice: &Invoice) -> Result<(), AppError>;

    async fn delete_invoice(&mut self, company_id: Uuid, invoice_id: Uuid)
        -> Result<(), AppError>;

    /// Unlink every payment that references the invoice, leaving the
    /// payment rows themselves in place.
    async fn detach_invoice_payments(
        &mut self,
        company_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<(), AppError>;

    /// Load a payment and hold an exclusive lock on it for the rest of
    /// the transaction.
    async fn payment_for_update(
        &mut self,
        company_id: Uuid,
        payment_id: Uuid,
    ) -> Result<Option<Payment>, AppError>;

    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), AppError>;

    async fn save_payment(&mut self, payment: &Payment) -> Result<(), AppError>;

    async fn delete_payment(&mut self, company_id: Uuid, payment_id: Uuid)
        -> Result<(), AppError>;

    /// Bump and return the company-scoped counter for `kind`.
    /// Monotonic and gap-free: the counter row stays locked until the
    /// transaction ends.
    async fn next_sequence(
        &mut self,
        company_id: Uuid,
        kind: DocumentKind,
    ) -> Result<i64, AppError>;

    /// Bump and return the (company, customer)-scoped counter for `kind`.
    async fn next_customer_sequence(
        &mut self,
        company_id: Uuid,
        customer_id: Uuid,
        kind: DocumentKind,
    ) -> Result<i64, AppError>;

    async fn insert_exchange_rate_log(&mut self, entry: &ExchangeRateLog)
        -> Result<(), AppError>;

    async fn commit(self: Box<Self>) -> Result<(), AppError>;
}
