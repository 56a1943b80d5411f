//! In-memory storage backend.
//!
//! Used by the test suite and by embedded callers that do not need
//! durability. Transactions clone the store state, buffer writes on the
//! clone, and swap it back on commit while holding the store-wide mutex,
//! so concurrent engine calls serialize exactly like the row-locked
//! PostgreSQL backend, just at coarser granularity.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use ledger_core::error::AppError;

use crate::models::{
    CompanySettings, DocumentKind, ExchangeRateLog, Invoice, Payment,
};
use crate::services::store::{LedgerStore, LedgerTx};

#[derive(Debug, Clone, Default)]
struct State {
    companies: HashMap<Uuid, CompanySettings>,
    invoices: HashMap<Uuid, Invoice>,
    payments: HashMap<Uuid, Payment>,
    exchange_rate_logs: Vec<ExchangeRateLog>,
    counters: HashMap<(Uuid, Uuid, &'static str), i64>,
}

/// In-memory [`LedgerStore`].
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a company's configuration.
    pub async fn insert_company(&self, settings: CompanySettings) {
        let mut state = self.state.lock().await;
        state.companies.insert(settings.company_id, settings);
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTx + Send>, AppError> {
        let guard = self.state.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryTx { guard, work }))
    }

    async fn company_settings(&self, company_id: Uuid) -> Result<CompanySettings, AppError> {
        let state = self.state.lock().await;
        state
            .companies
            .get(&company_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Company {} not found", company_id)))
    }

    async fn find_invoice(
        &self,
        company_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .invoices
            .get(&invoice_id)
            .filter(|inv| inv.company_id == company_id)
            .cloned())
    }

    async fn find_payment(
        &self,
        company_id: Uuid,
        payment_id: Uuid,
    ) -> Result<Option<Payment>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .payments
            .get(&payment_id)
            .filter(|p| p.company_id == company_id)
            .cloned())
    }

    async fn list_exchange_rate_logs(
        &self,
        company_id: Uuid,
        document_id: Uuid,
    ) -> Result<Vec<ExchangeRateLog>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .exchange_rate_logs
            .iter()
            .filter(|log| log.company_id == company_id && log.document_id == document_id)
            .cloned()
            .collect())
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<State>,
    work: State,
}

impl MemoryTx {
    fn bump_counter(&mut self, key: (Uuid, Uuid, &'static str)) -> i64 {
        let value = self.work.counters.entry(key).or_insert(0);
        *value += 1;
        *value
    }
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn invoice_for_update(
        &mut self,
        company_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, AppError> {
        Ok(self
            .work
            .invoices
            .get(&invoice_id)
            .filter(|inv| inv.company_id == company_id)
            .cloned())
    }

    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), AppError> {
        self.work
            .invoices
            .insert(invoice.invoice_id, invoice.clone());
        Ok(())
    }

    async fn save_invoice(&mut self, invoice: &Invoice) -> Result<(), AppError> {
        self.work
            .invoices
            .insert(invoice.invoice_id, invoice.clone());
        Ok(())
    }

    async fn delete_invoice(
        &mut self,
        company_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<(), AppError> {
        if let Some(inv) = self.work.invoices.get(&invoice_id) {
            if inv.company_id == company_id {
                self.work.invoices.remove(&invoice_id);
            }
        }
        Ok(())
    }

    async fn detach_invoice_payments(
        &mut self,
        company_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<(), AppError> {
        for payment in self.work.payments.values_mut() {
            if payment.company_id == company_id && payment.invoice_id == Some(invoice_id) {
                payment.invoice_id = None;
            }
        }
        Ok(())
    }

    async fn payment_for_update(
        &mut self,
        company_id: Uuid,
        payment_id: Uuid,
    ) -> Result<Option<Payment>, AppError> {
        Ok(self
            .work
            .payments
            .get(&payment_id)
            .filter(|p| p.company_id == company_id)
            .cloned())
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), AppError> {
        self.work
            .payments
            .insert(payment.payment_id, payment.clone());
        Ok(())
    }

    async fn save_payment(&mut self, payment: &Payment) -> Result<(), AppError> {
        self.work
            .payments
            .insert(payment.payment_id, payment.clone());
        Ok(())
    }

    async fn delete_payment(
        &mut self,
        company_id: Uuid,
        payment_id: Uuid,
    ) -> Result<(), AppError> {
        if let Some(p) = self.work.payments.get(&payment_id) {
            if p.company_id == company_id {
                self.work.payments.remove(&payment_id);
            }
        }
        Ok(())
    }

    async fn next_sequence(
        &mut self,
        company_id: Uuid,
        kind: DocumentKind,
    ) -> Result<i64, AppError> {
        Ok(self.bump_counter((company_id, Uuid::nil(), kind.as_str())))
    }

    async fn next_customer_sequence(
        &mut self,
        company_id: Uuid,
        customer_id: Uuid,
        kind: DocumentKind,
    ) -> Result<i64, AppError> {
        Ok(self.bump_counter((company_id, customer_id, kind.as_str())))
    }

    async fn insert_exchange_rate_log(
        &mut self,
        entry: &ExchangeRateLog,
    ) -> Result<(), AppError> {
        self.work.exchange_rate_logs.push(entry.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        let MemoryTx { mut guard, work } = *self;
        *guard = work;
        Ok(())
    }
}
