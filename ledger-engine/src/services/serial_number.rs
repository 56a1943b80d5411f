//! Serial number allocation and formatting.

use uuid::Uuid;

use ledger_core::error::AppError;

use crate::models::{CompanySettings, DocumentKind};
use crate::services::store::LedgerTx;

/// Allocated numbers for one document.
#[derive(Debug, Clone)]
pub struct SequenceNumbers {
    pub sequence_number: String,
    pub customer_sequence_number: Option<String>,
}

/// Allocates the next document-scoped and customer-scoped sequence
/// numbers for a company and renders them through the company's
/// configured format. Allocation happens inside the caller's storage
/// transaction, so numbers stay monotonic and gap-free per scope.
#[derive(Debug)]
pub struct SerialNumberFormatter<'a> {
    settings: &'a CompanySettings,
    kind: DocumentKind,
    customer_id: Option<Uuid>,
}

impl<'a> SerialNumberFormatter<'a> {
    pub fn new(settings: &'a CompanySettings, kind: DocumentKind) -> Self {
        Self {
            settings,
            kind,
            customer_id: None,
        }
    }

    pub fn for_customer(mut self, customer_id: Uuid) -> Self {
        self.customer_id = Some(customer_id);
        self
    }

    /// Allocate the company-scoped number and, when a customer is
    /// attached, the customer-scoped number.
    pub async fn next_numbers(
        &self,
        tx: &mut (dyn LedgerTx + Send),
    ) -> Result<SequenceNumbers, AppError> {
        let format = self.settings.number_format(self.kind);
        let value = tx
            .next_sequence(self.settings.company_id, self.kind)
            .await?;
        let sequence_number = format.render(value);

        let customer_sequence_number = match self.customer_id {
            Some(_) => Some(self.next_customer_number(tx).await?),
            None => None,
        };

        Ok(SequenceNumbers {
            sequence_number,
            customer_sequence_number,
        })
    }

    /// Allocate only the customer-scoped number. Used when an edit
    /// re-attaches a document to a different customer; the company-scoped
    /// number never changes after creation.
    pub async fn next_customer_number(
        &self,
        tx: &mut (dyn LedgerTx + Send),
    ) -> Result<String, AppError> {
        let customer_id = self.customer_id.ok_or_else(|| {
            AppError::BadRequest(anyhow::anyhow!("no customer attached to the document"))
        })?;
        let format = self.settings.number_format(self.kind);
        let value = tx
            .next_customer_sequence(self.settings.company_id, customer_id, self.kind)
            .await?;
        Ok(format.render(value))
    }
}
