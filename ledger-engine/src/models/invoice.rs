//! Invoice model and the ledger status-derivation rules.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use ledger_core::error::AppError;

use crate::models::money;

/// Invoice lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Viewed,
    Completed,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Viewed => "viewed",
            InvoiceStatus::Completed => "completed",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "sent" => InvoiceStatus::Sent,
            "viewed" => InvoiceStatus::Viewed,
            "completed" => InvoiceStatus::Completed,
            _ => InvoiceStatus::Draft,
        }
    }
}

/// Paid status, derived strictly from due_amount vs total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaidStatus {
    Unpaid,
    PartiallyPaid,
    Paid,
}

impl PaidStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaidStatus::Unpaid => "unpaid",
            PaidStatus::PartiallyPaid => "partially_paid",
            PaidStatus::Paid => "paid",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "partially_paid" => PaidStatus::PartiallyPaid,
            "paid" => PaidStatus::Paid,
            _ => PaidStatus::Unpaid,
        }
    }
}

/// Invoice document.
///
/// `due_amount` and its base-currency mirror move exclusively through
/// [`Invoice::apply_payment`] and [`Invoice::reverse_payment`]; `status`
/// and `paid_status` are set only by [`Invoice::derive_status`].
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub company_id: Uuid,
    pub customer_id: Uuid,
    pub currency_id: Uuid,
    pub status: String,
    pub paid_status: String,
    pub sent: bool,
    pub viewed: bool,
    pub overdue: bool,
    pub total: Decimal,
    pub base_total: Decimal,
    pub due_amount: Decimal,
    pub base_due_amount: Decimal,
    pub exchange_rate: Decimal,
    pub sequence_number: String,
    pub customer_sequence_number: String,
    pub unique_hash: String,
    pub custom_fields: Option<serde_json::Value>,
    pub created_utc: DateTime<Utc>,
}

impl Invoice {
    /// The status this invoice would have had absent any payment,
    /// reconstructed from the sent/viewed flags rather than from the
    /// mutable `status` field.
    pub fn previous_status(&self) -> InvoiceStatus {
        if self.viewed {
            InvoiceStatus::Viewed
        } else if self.sent {
            InvoiceStatus::Sent
        } else {
            InvoiceStatus::Draft
        }
    }

    /// Derive the lifecycle status, paid status and overdue flag the
    /// invoice must carry for a given due amount. Single source of truth
    /// for status: every amount-mutating operation goes through here.
    pub fn derive_status(
        &self,
        new_due_amount: Decimal,
    ) -> Result<(InvoiceStatus, PaidStatus, bool), AppError> {
        if new_due_amount < Decimal::ZERO {
            return Err(AppError::InvalidAmount(anyhow::anyhow!(
                "due amount cannot go negative (got {})",
                new_due_amount
            )));
        }

        if new_due_amount.is_zero() {
            // Fully settled documents do not retain their prior lifecycle
            // status, and cannot be overdue.
            Ok((InvoiceStatus::Completed, PaidStatus::Paid, false))
        } else if new_due_amount == self.total {
            Ok((self.previous_status(), PaidStatus::Unpaid, self.overdue))
        } else {
            Ok((
                self.previous_status(),
                PaidStatus::PartiallyPaid,
                self.overdue,
            ))
        }
    }

    /// Consume `amount` of the due amount, mirroring the movement into
    /// the base currency at `rate`. Fails with `InvalidAmount` before any
    /// mutation if the resulting due amount would be negative.
    pub fn apply_payment(&mut self, amount: Decimal, rate: Decimal) -> Result<(), AppError> {
        if amount < Decimal::ZERO {
            return Err(AppError::InvalidAmount(anyhow::anyhow!(
                "payment amount cannot be negative (got {})",
                amount
            )));
        }

        let new_due = self.due_amount - amount;
        let (status, paid_status, overdue) = self.derive_status(new_due)?;

        self.due_amount = new_due;
        self.base_due_amount -= money::to_base(amount, rate);
        self.set_status(status, paid_status, overdue);
        Ok(())
    }

    /// Undo a previously applied payment: the exact inverse of
    /// [`Invoice::apply_payment`] for the same amount and rate.
    pub fn reverse_payment(&mut self, amount: Decimal, rate: Decimal) -> Result<(), AppError> {
        if amount < Decimal::ZERO {
            return Err(AppError::InvalidAmount(anyhow::anyhow!(
                "payment amount cannot be negative (got {})",
                amount
            )));
        }

        let new_due = self.due_amount + amount;
        if new_due > self.total {
            return Err(AppError::InvalidAmount(anyhow::anyhow!(
                "due amount cannot exceed invoice total ({} > {})",
                new_due,
                self.total
            )));
        }
        let (status, paid_status, overdue) = self.derive_status(new_due)?;

        self.due_amount = new_due;
        self.base_due_amount += money::to_base(amount, rate);
        self.set_status(status, paid_status, overdue);
        Ok(())
    }

    fn set_status(&mut self, status: InvoiceStatus, paid_status: PaidStatus, overdue: bool) {
        self.status = status.as_str().to_string();
        self.paid_status = paid_status.as_str().to_string();
        self.overdue = overdue;
    }
}

/// Balance summary exposed to collaborators.
#[derive(Debug, Clone, Serialize)]
pub struct InvoiceBalance {
    pub due_amount: Decimal,
    pub base_due_amount: Decimal,
    pub status: String,
    pub paid_status: String,
}

/// Input for creating an invoice.
#[derive(Debug, Clone)]
pub struct CreateInvoice {
    pub customer_id: Uuid,
    pub currency_id: Uuid,
    pub exchange_rate: Decimal,
    pub total: Decimal,
    pub send: bool,
    pub custom_fields: Option<serde_json::Value>,
}

/// Input for updating an invoice.
#[derive(Debug, Clone)]
pub struct UpdateInvoice {
    pub customer_id: Uuid,
    pub currency_id: Uuid,
    pub exchange_rate: Decimal,
    pub total: Decimal,
    pub custom_fields: Option<serde_json::Value>,
}
