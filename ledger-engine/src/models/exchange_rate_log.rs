//! Exchange rate audit log entries.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::sequence::DocumentKind;

/// Immutable snapshot of the exchange rate a document carried when it
/// was written in a currency other than the company's base currency.
/// Entries are append-only historical facts; no update or delete exists.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExchangeRateLog {
    pub exchange_rate_log_id: Uuid,
    pub company_id: Uuid,
    pub document_type: String,
    pub document_id: Uuid,
    pub currency_id: Uuid,
    pub exchange_rate: Decimal,
    pub recorded_utc: DateTime<Utc>,
}

impl ExchangeRateLog {
    pub fn new(
        company_id: Uuid,
        document_type: DocumentKind,
        document_id: Uuid,
        currency_id: Uuid,
        exchange_rate: Decimal,
    ) -> Self {
        Self {
            exchange_rate_log_id: Uuid::new_v4(),
            company_id,
            document_type: document_type.as_str().to_string(),
            document_id,
            currency_id,
            exchange_rate,
            recorded_utc: Utc::now(),
        }
    }
}
