//! Payment reconciliation engine.
//!
//! Entry point for payment create/update/delete. Every amount movement
//! against an invoice goes through the invoice's apply/reverse
//! operations inside one storage transaction: a payment's subtraction is
//! in effect against its linked invoice exactly once, or not at all.

use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use tracing::{info, instrument};
use uuid::Uuid;

use ledger_core::error::AppError;
use ledger_core::utils::public_hash;

use crate::models::{
    money, CreatePayment, DocumentKind, ExchangeRateLog, Invoice, InvoiceBalance, Payment,
    UpdatePayment,
};
use crate::services::metrics::{PAYMENTS_TOTAL, PAYMENT_AMOUNT_TOTAL};
use crate::services::serial_number::SerialNumberFormatter;
use crate::services::store::{LedgerStore, LedgerTx};

#[derive(Clone)]
pub struct PaymentService<S> {
    store: S,
}

impl<S: LedgerStore> PaymentService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Create a payment, applying its amount to the linked invoice (if
    /// any) and allocating sequence numbers, atomically.
    #[instrument(skip(self, input), fields(company_id = %company_id))]
    pub async fn create_payment(
        &self,
        company_id: Uuid,
        input: CreatePayment,
    ) -> Result<Payment, AppError> {
        if input.amount < rust_decimal::Decimal::ZERO {
            return Err(AppError::InvalidAmount(anyhow::anyhow!(
                "payment amount cannot be negative (got {})",
                input.amount
            )));
        }

        let settings = self.store.company_settings(company_id).await?;
        let mut tx = self.store.begin().await?;

        if let Some(invoice_id) = input.invoice_id {
            let mut invoice = tx
                .invoice_for_update(company_id, invoice_id)
                .await?
                .ok_or_else(|| {
                    AppError::NotFound(anyhow::anyhow!("Invoice {} not found", invoice_id))
                })?;
            let rate = invoice.exchange_rate;
            invoice.apply_payment(input.amount, rate)?;
            tx.save_invoice(&invoice).await?;
        }

        let mut formatter = SerialNumberFormatter::new(&settings, DocumentKind::Payment);
        if let Some(customer_id) = input.customer_id {
            formatter = formatter.for_customer(customer_id);
        }
        let numbers = formatter.next_numbers(tx.as_mut()).await?;

        let payment_id = Uuid::new_v4();
        let payment = Payment {
            payment_id,
            company_id,
            customer_id: input.customer_id,
            currency_id: input.currency_id,
            invoice_id: input.invoice_id,
            amount: input.amount,
            base_amount: money::to_base(input.amount, input.exchange_rate),
            exchange_rate: input.exchange_rate,
            payment_date: input.payment_date,
            notes: input.notes,
            sequence_number: numbers.sequence_number,
            customer_sequence_number: numbers.customer_sequence_number,
            unique_hash: public_hash("payment", payment_id),
            custom_fields: input.custom_fields,
            created_utc: Utc::now(),
        };
        tx.insert_payment(&payment).await?;

        self.maybe_log_exchange_rate(tx.as_mut(), &settings.base_currency_id, &payment)
            .await?;

        tx.commit().await?;

        PAYMENTS_TOTAL.with_label_values(&["created"]).inc();
        PAYMENT_AMOUNT_TOTAL
            .with_label_values(&[payment.currency_id.to_string().as_str()])
            .inc_by(payment.amount.to_f64().unwrap_or(0.0));

        info!(
            payment_id = %payment.payment_id,
            sequence_number = %payment.sequence_number,
            amount = %payment.amount,
            "Payment created"
        );

        Ok(payment)
    }

    /// Edit a payment. When the linked invoice or the amount changes,
    /// the old effect is reversed before the new one is applied, so
    /// exactly one subtraction of the current amount remains in effect.
    #[instrument(skip(self, input), fields(company_id = %company_id, payment_id = %payment_id))]
    pub async fn update_payment(
        &self,
        company_id: Uuid,
        payment_id: Uuid,
        input: UpdatePayment,
    ) -> Result<Payment, AppError> {
        if input.amount < rust_decimal::Decimal::ZERO {
            return Err(AppError::InvalidAmount(anyhow::anyhow!(
                "payment amount cannot be negative (got {})",
                input.amount
            )));
        }

        let settings = self.store.company_settings(company_id).await?;
        let mut tx = self.store.begin().await?;

        let mut payment = tx
            .payment_for_update(company_id, payment_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("Payment {} not found", payment_id))
            })?;

        if payment.invoice_id != input.invoice_id {
            if let Some(old_id) = payment.invoice_id {
                let mut old = tx
                    .invoice_for_update(company_id, old_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::NotFound(anyhow::anyhow!("Invoice {} not found", old_id))
                    })?;
                let rate = old.exchange_rate;
                old.reverse_payment(payment.amount, rate)?;
                tx.save_invoice(&old).await?;
            }
            if let Some(new_id) = input.invoice_id {
                let mut new_invoice = tx
                    .invoice_for_update(company_id, new_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::NotFound(anyhow::anyhow!("Invoice {} not found", new_id))
                    })?;
                let rate = new_invoice.exchange_rate;
                new_invoice.apply_payment(input.amount, rate)?;
                tx.save_invoice(&new_invoice).await?;
            }
        } else if let Some(invoice_id) = input.invoice_id {
            if payment.amount != input.amount {
                let mut invoice = tx
                    .invoice_for_update(company_id, invoice_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::NotFound(anyhow::anyhow!("Invoice {} not found", invoice_id))
                    })?;
                let rate = invoice.exchange_rate;
                invoice.reverse_payment(payment.amount, rate)?;
                invoice.apply_payment(input.amount, rate)?;
                tx.save_invoice(&invoice).await?;
            }
        }

        if payment.customer_id != input.customer_id {
            payment.customer_sequence_number = match input.customer_id {
                Some(customer_id) => {
                    let formatter = SerialNumberFormatter::new(&settings, DocumentKind::Payment)
                        .for_customer(customer_id);
                    Some(formatter.next_customer_number(tx.as_mut()).await?)
                }
                None => None,
            };
        }

        payment.customer_id = input.customer_id;
        payment.currency_id = input.currency_id;
        payment.invoice_id = input.invoice_id;
        payment.amount = input.amount;
        payment.base_amount = money::to_base(input.amount, input.exchange_rate);
        payment.exchange_rate = input.exchange_rate;
        payment.payment_date = input.payment_date;
        payment.notes = input.notes;
        if let Some(custom_fields) = input.custom_fields {
            payment.custom_fields = Some(custom_fields);
        }
        tx.save_payment(&payment).await?;

        self.maybe_log_exchange_rate(tx.as_mut(), &settings.base_currency_id, &payment)
            .await?;

        tx.commit().await?;

        PAYMENTS_TOTAL.with_label_values(&["updated"]).inc();

        info!(payment_id = %payment.payment_id, amount = %payment.amount, "Payment updated");

        Ok(payment)
    }

    /// Delete payments, reversing each one's effect on its linked
    /// invoice first. Idempotent per id: missing payments are skipped.
    /// The whole batch commits atomically.
    #[instrument(skip(self), fields(company_id = %company_id, count = payment_ids.len()))]
    pub async fn delete_payments(
        &self,
        company_id: Uuid,
        payment_ids: &[Uuid],
    ) -> Result<bool, AppError> {
        let mut tx = self.store.begin().await?;

        for &payment_id in payment_ids {
            let payment = match tx.payment_for_update(company_id, payment_id).await? {
                Some(payment) => payment,
                None => continue,
            };

            if let Some(invoice_id) = payment.invoice_id {
                // The invoice may have been deleted out from under the
                // payment; nothing left to reverse then.
                if let Some(mut invoice) = tx.invoice_for_update(company_id, invoice_id).await? {
                    let rate = invoice.exchange_rate;
                    invoice.reverse_payment(payment.amount, rate)?;
                    tx.save_invoice(&invoice).await?;
                }
            }

            tx.delete_payment(company_id, payment_id).await?;
            PAYMENTS_TOTAL.with_label_values(&["deleted"]).inc();
        }

        tx.commit().await?;

        info!(count = payment_ids.len(), "Payments deleted");

        Ok(true)
    }

    /// Balance summary for one invoice.
    #[instrument(skip(self), fields(company_id = %company_id, invoice_id = %invoice_id))]
    pub async fn invoice_balance(
        &self,
        company_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<InvoiceBalance, AppError> {
        let invoice: Invoice = self
            .store
            .find_invoice(company_id, invoice_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("Invoice {} not found", invoice_id))
            })?;

        Ok(InvoiceBalance {
            due_amount: invoice.due_amount,
            base_due_amount: invoice.base_due_amount,
            status: invoice.status,
            paid_status: invoice.paid_status,
        })
    }

    async fn maybe_log_exchange_rate(
        &self,
        tx: &mut (dyn LedgerTx + Send),
        base_currency_id: &Uuid,
        payment: &Payment,
    ) -> Result<(), AppError> {
        if payment.currency_id != *base_currency_id {
            let entry = ExchangeRateLog::new(
                payment.company_id,
                DocumentKind::Payment,
                payment.payment_id,
                payment.currency_id,
                payment.exchange_rate,
            );
            tx.insert_exchange_rate_log(&entry).await?;
        }
        Ok(())
    }
}
