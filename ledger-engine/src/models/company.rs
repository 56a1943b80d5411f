//! Per-company configuration consumed by the engine.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::sequence::{DocumentKind, SerialNumberFormat};

/// Company configuration: reporting currency and serial number formats
/// per document kind. Resolved once per engine call; the engine never
/// reads ambient request state for company scoping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanySettings {
    pub company_id: Uuid,
    pub base_currency_id: Uuid,
    pub invoice_number_format: SerialNumberFormat,
    pub payment_number_format: SerialNumberFormat,
    pub estimate_number_format: SerialNumberFormat,
}

impl CompanySettings {
    pub fn number_format(&self, kind: DocumentKind) -> &SerialNumberFormat {
        match kind {
            DocumentKind::Invoice => &self.invoice_number_format,
            DocumentKind::Payment => &self.payment_number_format,
            DocumentKind::Estimate => &self.estimate_number_format,
        }
    }
}
