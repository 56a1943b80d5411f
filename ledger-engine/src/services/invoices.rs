//! Invoice service: document creation, edits, deletion, and the
//! sent/viewed transitions that feed previous-status reconstruction.

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, instrument};
use uuid::Uuid;

use ledger_core::error::AppError;
use ledger_core::utils::public_hash;

use crate::models::{
    money, CreateInvoice, DocumentKind, ExchangeRateLog, Invoice, InvoiceStatus, PaidStatus,
    UpdateInvoice,
};
use crate::services::metrics::INVOICES_TOTAL;
use crate::services::serial_number::SerialNumberFormatter;
use crate::services::store::{LedgerStore, LedgerTx};

#[derive(Clone)]
pub struct InvoiceService<S> {
    store: S,
}

impl<S: LedgerStore> InvoiceService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Create an invoice with its full due amount outstanding.
    #[instrument(skip(self, input), fields(company_id = %company_id))]
    pub async fn create_invoice(
        &self,
        company_id: Uuid,
        input: CreateInvoice,
    ) -> Result<Invoice, AppError> {
        if input.total < Decimal::ZERO {
            return Err(AppError::InvalidAmount(anyhow::anyhow!(
                "invoice total cannot be negative (got {})",
                input.total
            )));
        }

        let settings = self.store.company_settings(company_id).await?;
        let mut tx = self.store.begin().await?;

        let formatter = SerialNumberFormatter::new(&settings, DocumentKind::Invoice)
            .for_customer(input.customer_id);
        let numbers = formatter.next_numbers(tx.as_mut()).await?;
        let customer_sequence_number = numbers.customer_sequence_number.unwrap_or_default();

        let status = if input.send {
            InvoiceStatus::Sent
        } else {
            InvoiceStatus::Draft
        };

        let invoice_id = Uuid::new_v4();
        let invoice = Invoice {
            invoice_id,
            company_id,
            customer_id: input.customer_id,
            currency_id: input.currency_id,
            status: status.as_str().to_string(),
            paid_status: PaidStatus::Unpaid.as_str().to_string(),
            sent: input.send,
            viewed: false,
            overdue: false,
            total: input.total,
            base_total: money::to_base(input.total, input.exchange_rate),
            due_amount: input.total,
            base_due_amount: money::to_base(input.total, input.exchange_rate),
            exchange_rate: input.exchange_rate,
            sequence_number: numbers.sequence_number,
            customer_sequence_number,
            unique_hash: public_hash("invoice", invoice_id),
            custom_fields: input.custom_fields,
            created_utc: Utc::now(),
        };
        tx.insert_invoice(&invoice).await?;

        self.maybe_log_exchange_rate(tx.as_mut(), &settings.base_currency_id, &invoice)
            .await?;

        tx.commit().await?;

        INVOICES_TOTAL
            .with_label_values(&[invoice.status.as_str()])
            .inc();

        info!(
            invoice_id = %invoice.invoice_id,
            sequence_number = %invoice.sequence_number,
            total = %invoice.total,
            "Invoice created"
        );

        Ok(invoice)
    }

    /// Edit an invoice's money fields. The amount already paid stays
    /// paid: the due amount is recomputed against the new total and the
    /// status re-derived.
    #[instrument(skip(self, input), fields(company_id = %company_id, invoice_id = %invoice_id))]
    pub async fn update_invoice(
        &self,
        company_id: Uuid,
        invoice_id: Uuid,
        input: UpdateInvoice,
    ) -> Result<Invoice, AppError> {
        let settings = self.store.company_settings(company_id).await?;
        let mut tx = self.store.begin().await?;

        let mut invoice = tx
            .invoice_for_update(company_id, invoice_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("Invoice {} not found", invoice_id))
            })?;

        let paid_so_far = invoice.total - invoice.due_amount;

        if paid_so_far > Decimal::ZERO && input.customer_id != invoice.customer_id {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "customer cannot be changed after a payment is added"
            )));
        }
        if input.total < paid_so_far {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "total invoice amount must be more than the paid amount"
            )));
        }

        let new_due = input.total - paid_so_far;

        invoice.customer_id = input.customer_id;
        invoice.currency_id = input.currency_id;
        invoice.exchange_rate = input.exchange_rate;
        invoice.total = input.total;
        invoice.base_total = money::to_base(input.total, input.exchange_rate);
        invoice.due_amount = new_due;
        invoice.base_due_amount = money::to_base(new_due, input.exchange_rate);

        // Derived against the new total, so a full outstanding amount
        // reads as unpaid again.
        let (status, paid_status, overdue) = invoice.derive_status(new_due)?;
        invoice.status = status.as_str().to_string();
        invoice.paid_status = paid_status.as_str().to_string();
        invoice.overdue = overdue;
        if let Some(custom_fields) = input.custom_fields {
            invoice.custom_fields = Some(custom_fields);
        }
        tx.save_invoice(&invoice).await?;

        self.maybe_log_exchange_rate(tx.as_mut(), &settings.base_currency_id, &invoice)
            .await?;

        tx.commit().await?;

        info!(invoice_id = %invoice.invoice_id, total = %invoice.total, "Invoice updated");

        Ok(invoice)
    }

    /// Delete invoices, unlinking their payments. Idempotent per id.
    #[instrument(skip(self), fields(company_id = %company_id, count = invoice_ids.len()))]
    pub async fn delete_invoices(
        &self,
        company_id: Uuid,
        invoice_ids: &[Uuid],
    ) -> Result<bool, AppError> {
        let mut tx = self.store.begin().await?;

        for &invoice_id in invoice_ids {
            if tx.invoice_for_update(company_id, invoice_id).await?.is_none() {
                continue;
            }
            tx.detach_invoice_payments(company_id, invoice_id).await?;
            tx.delete_invoice(company_id, invoice_id).await?;
        }

        tx.commit().await?;

        info!(count = invoice_ids.len(), "Invoices deleted");

        Ok(true)
    }

    /// Record that the invoice was sent to the recipient.
    #[instrument(skip(self), fields(company_id = %company_id, invoice_id = %invoice_id))]
    pub async fn mark_invoice_sent(
        &self,
        company_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Invoice, AppError> {
        let mut tx = self.store.begin().await?;

        let mut invoice = tx
            .invoice_for_update(company_id, invoice_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("Invoice {} not found", invoice_id))
            })?;

        invoice.sent = true;
        if invoice.status == InvoiceStatus::Draft.as_str() {
            invoice.status = InvoiceStatus::Sent.as_str().to_string();
        }
        tx.save_invoice(&invoice).await?;
        tx.commit().await?;

        Ok(invoice)
    }

    /// Record that the recipient viewed the invoice.
    #[instrument(skip(self), fields(company_id = %company_id, invoice_id = %invoice_id))]
    pub async fn mark_invoice_viewed(
        &self,
        company_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Invoice, AppError> {
        let mut tx = self.store.begin().await?;

        let mut invoice = tx
            .invoice_for_update(company_id, invoice_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("Invoice {} not found", invoice_id))
            })?;

        invoice.viewed = true;
        if invoice.status == InvoiceStatus::Sent.as_str() {
            invoice.status = InvoiceStatus::Viewed.as_str().to_string();
        }
        tx.save_invoice(&invoice).await?;
        tx.commit().await?;

        Ok(invoice)
    }

    async fn maybe_log_exchange_rate(
        &self,
        tx: &mut (dyn LedgerTx + Send),
        base_currency_id: &Uuid,
        invoice: &Invoice,
    ) -> Result<(), AppError> {
        if invoice.currency_id != *base_currency_id {
            let entry = ExchangeRateLog::new(
                invoice.company_id,
                DocumentKind::Invoice,
                invoice.invoice_id,
                invoice.currency_id,
                invoice.exchange_rate,
            );
            tx.insert_exchange_rate_log(&entry).await?;
        }
        Ok(())
    }
}
