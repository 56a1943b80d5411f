//! Payment model.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A single monetary settlement, optionally linked to one invoice.
///
/// When `invoice_id` is set, this payment's `amount` has been subtracted
/// exactly once from that invoice's due amount. The reconciliation
/// engine keeps that subtraction in effect across edits and reverses it
/// on deletion.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub payment_id: Uuid,
    pub company_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub currency_id: Uuid,
    pub invoice_id: Option<Uuid>,
    pub amount: Decimal,
    pub base_amount: Decimal,
    pub exchange_rate: Decimal,
    pub payment_date: NaiveDate,
    pub notes: Option<String>,
    pub sequence_number: String,
    pub customer_sequence_number: Option<String>,
    pub unique_hash: String,
    pub custom_fields: Option<serde_json::Value>,
    pub created_utc: DateTime<Utc>,
}

/// Input for creating a payment.
#[derive(Debug, Clone)]
pub struct CreatePayment {
    pub customer_id: Option<Uuid>,
    pub currency_id: Uuid,
    pub invoice_id: Option<Uuid>,
    pub amount: Decimal,
    pub exchange_rate: Decimal,
    pub payment_date: NaiveDate,
    pub notes: Option<String>,
    pub custom_fields: Option<serde_json::Value>,
}

/// Input for updating a payment.
#[derive(Debug, Clone)]
pub struct UpdatePayment {
    pub customer_id: Option<Uuid>,
    pub currency_id: Uuid,
    pub invoice_id: Option<Uuid>,
    pub amount: Decimal,
    pub exchange_rate: Decimal,
    pub payment_date: NaiveDate,
    pub notes: Option<String>,
    pub custom_fields: Option<serde_json::Value>,
}
