//! Common test utilities for ledger-engine integration tests.

#![allow(dead_code)]

use std::str::FromStr;
use std::sync::Once;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;

use ledger_engine::models::{
    CompanySettings, CreateInvoice, CreatePayment, Invoice, Payment, SerialNumberFormat,
    UpdatePayment,
};
use ledger_engine::services::{InvoiceService, LedgerStore, MemoryStore, PaymentService};

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,ledger_engine=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).expect("valid decimal literal")
}

pub fn payment_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, 15).expect("valid date")
}

/// An engine wired to a fresh in-memory store with one company seeded.
pub struct TestEngine {
    pub store: MemoryStore,
    pub invoices: InvoiceService<MemoryStore>,
    pub payments: PaymentService<MemoryStore>,
    pub company_id: Uuid,
    pub base_currency_id: Uuid,
    pub customer_id: Uuid,
}

pub async fn spawn_engine() -> TestEngine {
    init_tracing();

    let store = MemoryStore::new();
    let company_id = Uuid::new_v4();
    let base_currency_id = Uuid::new_v4();

    store
        .insert_company(CompanySettings {
            company_id,
            base_currency_id,
            invoice_number_format: SerialNumberFormat::new("INV", 6),
            payment_number_format: SerialNumberFormat::new("PAY", 6),
            estimate_number_format: SerialNumberFormat::new("EST", 6),
        })
        .await;

    TestEngine {
        invoices: InvoiceService::new(store.clone()),
        payments: PaymentService::new(store.clone()),
        store,
        company_id,
        base_currency_id,
        customer_id: Uuid::new_v4(),
    }
}

impl TestEngine {
    /// Create a sent invoice in the company base currency.
    pub async fn create_sent_invoice(&self, total: &str) -> Invoice {
        self.create_invoice_with(total, "1", self.base_currency_id, true)
            .await
    }

    pub async fn create_invoice_with(
        &self,
        total: &str,
        exchange_rate: &str,
        currency_id: Uuid,
        send: bool,
    ) -> Invoice {
        self.invoices
            .create_invoice(
                self.company_id,
                CreateInvoice {
                    customer_id: self.customer_id,
                    currency_id,
                    exchange_rate: dec(exchange_rate),
                    total: dec(total),
                    send,
                    custom_fields: None,
                },
            )
            .await
            .expect("Failed to create invoice")
    }

    /// Create a payment linked to `invoice_id` in the base currency.
    pub async fn create_linked_payment(&self, invoice_id: Uuid, amount: &str) -> Payment {
        self.payments
            .create_payment(
                self.company_id,
                self.payment_input(Some(invoice_id), amount, "1", self.base_currency_id),
            )
            .await
            .expect("Failed to create payment")
    }

    pub fn payment_input(
        &self,
        invoice_id: Option<Uuid>,
        amount: &str,
        exchange_rate: &str,
        currency_id: Uuid,
    ) -> CreatePayment {
        CreatePayment {
            customer_id: Some(self.customer_id),
            currency_id,
            invoice_id,
            amount: dec(amount),
            exchange_rate: dec(exchange_rate),
            payment_date: payment_date(),
            notes: None,
            custom_fields: None,
        }
    }

    pub fn update_input_from(&self, payment: &Payment, invoice_id: Option<Uuid>, amount: &str) -> UpdatePayment {
        UpdatePayment {
            customer_id: payment.customer_id,
            currency_id: payment.currency_id,
            invoice_id,
            amount: dec(amount),
            exchange_rate: payment.exchange_rate,
            payment_date: payment.payment_date,
            notes: payment.notes.clone(),
            custom_fields: None,
        }
    }

    pub async fn invoice(&self, invoice_id: Uuid) -> Invoice {
        self.store
            .find_invoice(self.company_id, invoice_id)
            .await
            .expect("Failed to load invoice")
            .expect("Invoice missing")
    }

    pub async fn payment(&self, payment_id: Uuid) -> Option<Payment> {
        self.store
            .find_payment(self.company_id, payment_id)
            .await
            .expect("Failed to load payment")
    }
}
