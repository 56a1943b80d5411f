//! PostgreSQL storage backend.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, Postgres};
use sqlx::Transaction;
use tracing::{info, instrument};
use uuid::Uuid;

use ledger_core::error::AppError;

use crate::models::{
    CompanySettings, DocumentKind, ExchangeRateLog, Invoice, Payment, SerialNumberFormat,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::{LedgerStore, LedgerTx};

const INVOICE_COLUMNS: &str = "invoice_id, company_id, customer_id, currency_id, status, paid_status, \
    sent, viewed, overdue, total, base_total, due_amount, base_due_amount, exchange_rate, \
    sequence_number, customer_sequence_number, unique_hash, custom_fields, created_utc";

const PAYMENT_COLUMNS: &str = "payment_id, company_id, customer_id, currency_id, invoice_id, \
    amount, base_amount, exchange_rate, payment_date, notes, sequence_number, \
    customer_sequence_number, unique_hash, custom_fields, created_utc";

/// Map a sqlx error onto the engine error kinds. Lock and serialization
/// failures become `Conflict` so callers can retry the whole operation.
fn map_db_err(context: &str, e: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(ref db_err) = e {
        if matches!(db_err.code().as_deref(), Some("40001" | "40P01" | "55P03")) {
            return AppError::Conflict(anyhow::anyhow!("{}: {}", context, e));
        }
    }
    AppError::DatabaseError(anyhow::anyhow!("{}: {}", context, e))
}

/// PostgreSQL [`LedgerStore`] over a connection pool.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "ledger-engine"))]
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Create or replace a company's configuration row.
    #[instrument(skip(self, settings), fields(company_id = %settings.company_id))]
    pub async fn upsert_company(&self, settings: &CompanySettings) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["upsert_company"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO companies (
                company_id, base_currency_id,
                invoice_prefix, invoice_width,
                payment_prefix, payment_width,
                estimate_prefix, estimate_width
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (company_id)
            DO UPDATE SET base_currency_id = EXCLUDED.base_currency_id,
                invoice_prefix = EXCLUDED.invoice_prefix,
                invoice_width = EXCLUDED.invoice_width,
                payment_prefix = EXCLUDED.payment_prefix,
                payment_width = EXCLUDED.payment_width,
                estimate_prefix = EXCLUDED.estimate_prefix,
                estimate_width = EXCLUDED.estimate_width
            "#,
        )
        .bind(settings.company_id)
        .bind(settings.base_currency_id)
        .bind(&settings.invoice_number_format.prefix)
        .bind(settings.invoice_number_format.width as i32)
        .bind(&settings.payment_number_format.prefix)
        .bind(settings.payment_number_format.width as i32)
        .bind(&settings.estimate_number_format.prefix)
        .bind(settings.estimate_number_format.width as i32)
        .execute(&self.pool)
        .await
        .map_err(|e| map_db_err("Failed to upsert company", e))?;

        timer.observe_duration();
        Ok(())
    }
}

/// Flat row for the companies table; folded into [`CompanySettings`].
#[derive(sqlx::FromRow)]
struct CompanyRow {
    company_id: Uuid,
    base_currency_id: Uuid,
    invoice_prefix: String,
    invoice_width: i32,
    payment_prefix: String,
    payment_width: i32,
    estimate_prefix: String,
    estimate_width: i32,
}

impl From<CompanyRow> for CompanySettings {
    fn from(row: CompanyRow) -> Self {
        CompanySettings {
            company_id: row.company_id,
            base_currency_id: row.base_currency_id,
            invoice_number_format: SerialNumberFormat::new(
                row.invoice_prefix,
                row.invoice_width as usize,
            ),
            payment_number_format: SerialNumberFormat::new(
                row.payment_prefix,
                row.payment_width as usize,
            ),
            estimate_number_format: SerialNumberFormat::new(
                row.estimate_prefix,
                row.estimate_width as usize,
            ),
        }
    }
}

#[async_trait]
impl LedgerStore for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTx + Send>, AppError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_db_err("Failed to begin transaction", e))?;
        Ok(Box::new(PostgresTx { tx }))
    }

    #[instrument(skip(self), fields(company_id = %company_id))]
    async fn company_settings(&self, company_id: Uuid) -> Result<CompanySettings, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["company_settings"])
            .start_timer();

        let row = sqlx::query_as::<_, CompanyRow>(
            r#"
            SELECT company_id, base_currency_id,
                invoice_prefix, invoice_width,
                payment_prefix, payment_width,
                estimate_prefix, estimate_width
            FROM companies
            WHERE company_id = $1
            "#,
        )
        .bind(company_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_db_err("Failed to load company settings", e))?;

        timer.observe_duration();

        row.map(CompanySettings::from)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Company {} not found", company_id)))
    }

    #[instrument(skip(self), fields(company_id = %company_id, invoice_id = %invoice_id))]
    async fn find_invoice(
        &self,
        company_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_invoice"])
            .start_timer();

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {} FROM invoices WHERE company_id = $1 AND invoice_id = $2",
            INVOICE_COLUMNS
        ))
        .bind(company_id)
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_db_err("Failed to find invoice", e))?;

        timer.observe_duration();

        Ok(invoice)
    }

    #[instrument(skip(self), fields(company_id = %company_id, payment_id = %payment_id))]
    async fn find_payment(
        &self,
        company_id: Uuid,
        payment_id: Uuid,
    ) -> Result<Option<Payment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_payment"])
            .start_timer();

        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {} FROM payments WHERE company_id = $1 AND payment_id = $2",
            PAYMENT_COLUMNS
        ))
        .bind(company_id)
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_db_err("Failed to find payment", e))?;

        timer.observe_duration();

        Ok(payment)
    }

    #[instrument(skip(self), fields(company_id = %company_id, document_id = %document_id))]
    async fn list_exchange_rate_logs(
        &self,
        company_id: Uuid,
        document_id: Uuid,
    ) -> Result<Vec<ExchangeRateLog>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_exchange_rate_logs"])
            .start_timer();

        let logs = sqlx::query_as::<_, ExchangeRateLog>(
            r#"
            SELECT exchange_rate_log_id, company_id, document_type, document_id,
                currency_id, exchange_rate, recorded_utc
            FROM exchange_rate_logs
            WHERE company_id = $1 AND document_id = $2
            ORDER BY recorded_utc
            "#,
        )
        .bind(company_id)
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_db_err("Failed to list exchange rate logs", e))?;

        timer.observe_duration();

        Ok(logs)
    }
}

struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTx for PostgresTx {
    async fn invoice_for_update(
        &mut self,
        company_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, AppError> {
        sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {} FROM invoices WHERE company_id = $1 AND invoice_id = $2 FOR UPDATE",
            INVOICE_COLUMNS
        ))
        .bind(company_id)
        .bind(invoice_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_db_err("Failed to lock invoice", e))
    }

    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), AppError> {
        sqlx::query(&format!(
            r#"
            INSERT INTO invoices ({})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            "#,
            INVOICE_COLUMNS
        ))
        .bind(invoice.invoice_id)
        .bind(invoice.company_id)
        .bind(invoice.customer_id)
        .bind(invoice.currency_id)
        .bind(&invoice.status)
        .bind(&invoice.paid_status)
        .bind(invoice.sent)
        .bind(invoice.viewed)
        .bind(invoice.overdue)
        .bind(invoice.total)
        .bind(invoice.base_total)
        .bind(invoice.due_amount)
        .bind(invoice.base_due_amount)
        .bind(invoice.exchange_rate)
        .bind(&invoice.sequence_number)
        .bind(&invoice.customer_sequence_number)
        .bind(&invoice.unique_hash)
        .bind(&invoice.custom_fields)
        .bind(invoice.created_utc)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_db_err("Failed to insert invoice", e))?;
        Ok(())
    }

    async fn save_invoice(&mut self, invoice: &Invoice) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE invoices
            SET customer_id = $3,
                currency_id = $4,
                status = $5,
                paid_status = $6,
                sent = $7,
                viewed = $8,
                overdue = $9,
                total = $10,
                base_total = $11,
                due_amount = $12,
                base_due_amount = $13,
                exchange_rate = $14,
                customer_sequence_number = $15,
                custom_fields = $16
            WHERE company_id = $1 AND invoice_id = $2
            "#,
        )
        .bind(invoice.company_id)
        .bind(invoice.invoice_id)
        .bind(invoice.customer_id)
        .bind(invoice.currency_id)
        .bind(&invoice.status)
        .bind(&invoice.paid_status)
        .bind(invoice.sent)
        .bind(invoice.viewed)
        .bind(invoice.overdue)
        .bind(invoice.total)
        .bind(invoice.base_total)
        .bind(invoice.due_amount)
        .bind(invoice.base_due_amount)
        .bind(invoice.exchange_rate)
        .bind(&invoice.customer_sequence_number)
        .bind(&invoice.custom_fields)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_db_err("Failed to save invoice", e))?;
        Ok(())
    }

    async fn delete_invoice(
        &mut self,
        company_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<(), AppError> {
        sqlx::query("DELETE FROM invoices WHERE company_id = $1 AND invoice_id = $2")
            .bind(company_id)
            .bind(invoice_id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_db_err("Failed to delete invoice", e))?;
        Ok(())
    }

    async fn detach_invoice_payments(
        &mut self,
        company_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE payments SET invoice_id = NULL WHERE company_id = $1 AND invoice_id = $2",
        )
        .bind(company_id)
        .bind(invoice_id)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_db_err("Failed to detach payments", e))?;
        Ok(())
    }

    async fn payment_for_update(
        &mut self,
        company_id: Uuid,
        payment_id: Uuid,
    ) -> Result<Option<Payment>, AppError> {
        sqlx::query_as::<_, Payment>(&format!(
            "SELECT {} FROM payments WHERE company_id = $1 AND payment_id = $2 FOR UPDATE",
            PAYMENT_COLUMNS
        ))
        .bind(company_id)
        .bind(payment_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_db_err("Failed to lock payment", e))
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), AppError> {
        sqlx::query(&format!(
            r#"
            INSERT INTO payments ({})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
            PAYMENT_COLUMNS
        ))
        .bind(payment.payment_id)
        .bind(payment.company_id)
        .bind(payment.customer_id)
        .bind(payment.currency_id)
        .bind(payment.invoice_id)
        .bind(payment.amount)
        .bind(payment.base_amount)
        .bind(payment.exchange_rate)
        .bind(payment.payment_date)
        .bind(&payment.notes)
        .bind(&payment.sequence_number)
        .bind(&payment.customer_sequence_number)
        .bind(&payment.unique_hash)
        .bind(&payment.custom_fields)
        .bind(payment.created_utc)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_db_err("Failed to insert payment", e))?;
        Ok(())
    }

    async fn save_payment(&mut self, payment: &Payment) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE payments
            SET customer_id = $3,
                currency_id = $4,
                invoice_id = $5,
                amount = $6,
                base_amount = $7,
                exchange_rate = $8,
                payment_date = $9,
                notes = $10,
                customer_sequence_number = $11,
                custom_fields = $12
            WHERE company_id = $1 AND payment_id = $2
            "#,
        )
        .bind(payment.company_id)
        .bind(payment.payment_id)
        .bind(payment.customer_id)
        .bind(payment.currency_id)
        .bind(payment.invoice_id)
        .bind(payment.amount)
        .bind(payment.base_amount)
        .bind(payment.exchange_rate)
        .bind(payment.payment_date)
        .bind(&payment.notes)
        .bind(&payment.customer_sequence_number)
        .bind(&payment.custom_fields)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_db_err("Failed to save payment", e))?;
        Ok(())
    }

    async fn delete_payment(
        &mut self,
        company_id: Uuid,
        payment_id: Uuid,
    ) -> Result<(), AppError> {
        sqlx::query("DELETE FROM payments WHERE company_id = $1 AND payment_id = $2")
            .bind(company_id)
            .bind(payment_id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_db_err("Failed to delete payment", e))?;
        Ok(())
    }

    async fn next_sequence(
        &mut self,
        company_id: Uuid,
        kind: DocumentKind,
    ) -> Result<i64, AppError> {
        // Company-scoped counters use the nil UUID as the customer slot.
        self.bump_counter(company_id, Uuid::nil(), kind).await
    }

    async fn next_customer_sequence(
        &mut self,
        company_id: Uuid,
        customer_id: Uuid,
        kind: DocumentKind,
    ) -> Result<i64, AppError> {
        self.bump_counter(company_id, customer_id, kind).await
    }

    async fn insert_exchange_rate_log(
        &mut self,
        entry: &ExchangeRateLog,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO exchange_rate_logs (
                exchange_rate_log_id, company_id, document_type, document_id,
                currency_id, exchange_rate, recorded_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.exchange_rate_log_id)
        .bind(entry.company_id)
        .bind(&entry.document_type)
        .bind(entry.document_id)
        .bind(entry.currency_id)
        .bind(entry.exchange_rate)
        .bind(entry.recorded_utc)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_db_err("Failed to insert exchange rate log", e))?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_db_err("Failed to commit transaction", e))
    }
}

impl PostgresTx {
    /// Bump a counter with an atomic upsert; the RETURNING value is
    /// allocated under the counter row's lock, so concurrent allocations
    /// for the same scope serialize without gaps.
    async fn bump_counter(
        &mut self,
        company_id: Uuid,
        customer_id: Uuid,
        kind: DocumentKind,
    ) -> Result<i64, AppError> {
        sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO sequence_counters (company_id, customer_id, kind, value)
            VALUES ($1, $2, $3, 1)
            ON CONFLICT (company_id, customer_id, kind)
            DO UPDATE SET value = sequence_counters.value + 1
            RETURNING value
            "#,
        )
        .bind(company_id)
        .bind(customer_id)
        .bind(kind.as_str())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_db_err("Failed to allocate sequence number", e))
    }
}
