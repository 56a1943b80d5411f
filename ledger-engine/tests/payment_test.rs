//! Payment reconciliation integration tests.

mod common;

use common::{dec, spawn_engine};
use ledger_core::error::AppError;
use ledger_engine::services::LedgerStore;
use uuid::Uuid;

#[tokio::test]
async fn full_payment_completes_invoice() {
    let engine = spawn_engine().await;
    let invoice = engine.create_sent_invoice("100").await;
    assert_eq!(invoice.status, "sent");

    engine.create_linked_payment(invoice.invoice_id, "100").await;

    let invoice = engine.invoice(invoice.invoice_id).await;
    assert_eq!(invoice.due_amount, dec("0"));
    assert_eq!(invoice.status, "completed");
    assert_eq!(invoice.paid_status, "paid");
}

#[tokio::test]
async fn partial_then_final_payment() {
    let engine = spawn_engine().await;
    let invoice = engine.create_sent_invoice("100").await;

    engine.create_linked_payment(invoice.invoice_id, "40").await;
    let after_partial = engine.invoice(invoice.invoice_id).await;
    assert_eq!(after_partial.due_amount, dec("60"));
    assert_eq!(after_partial.status, "sent");
    assert_eq!(after_partial.paid_status, "partially_paid");

    engine.create_linked_payment(invoice.invoice_id, "60").await;
    let settled = engine.invoice(invoice.invoice_id).await;
    assert_eq!(settled.due_amount, dec("0"));
    assert_eq!(settled.status, "completed");
    assert_eq!(settled.paid_status, "paid");
}

#[tokio::test]
async fn delete_restores_base_currency_mirror() {
    let engine = spawn_engine().await;
    let currency_id = Uuid::new_v4();
    let invoice = engine
        .create_invoice_with("200", "1.2", currency_id, true)
        .await;
    assert_eq!(invoice.base_due_amount, dec("240.00"));

    // One prior payment of 100, in the invoice currency.
    engine
        .payments
        .create_payment(
            engine.company_id,
            engine.payment_input(Some(invoice.invoice_id), "100", "1.2", currency_id),
        )
        .await
        .expect("Failed to create first payment");

    let payment = engine
        .payments
        .create_payment(
            engine.company_id,
            engine.payment_input(Some(invoice.invoice_id), "50", "1.2", currency_id),
        )
        .await
        .expect("Failed to create second payment");

    let after = engine.invoice(invoice.invoice_id).await;
    assert_eq!(after.due_amount, dec("50"));
    assert_eq!(after.base_due_amount, dec("60.00"));

    let deleted = engine
        .payments
        .delete_payments(engine.company_id, &[payment.payment_id])
        .await
        .expect("Failed to delete payment");
    assert!(deleted);

    let restored = engine.invoice(invoice.invoice_id).await;
    assert_eq!(restored.due_amount, dec("100"));
    assert_eq!(restored.base_due_amount, dec("120.00"));
    assert_eq!(restored.status, "sent");
    assert_eq!(restored.paid_status, "partially_paid");
}

#[tokio::test]
async fn update_moves_payment_between_invoices() {
    let engine = spawn_engine().await;
    let invoice_a = engine.create_sent_invoice("100").await;
    let invoice_b = engine.create_sent_invoice("100").await;

    let payment = engine.create_linked_payment(invoice_a.invoice_id, "30").await;
    assert_eq!(engine.invoice(invoice_a.invoice_id).await.due_amount, dec("70"));

    engine
        .payments
        .update_payment(
            engine.company_id,
            payment.payment_id,
            engine.update_input_from(&payment, Some(invoice_b.invoice_id), "30"),
        )
        .await
        .expect("Failed to update payment");

    let a = engine.invoice(invoice_a.invoice_id).await;
    let b = engine.invoice(invoice_b.invoice_id).await;
    assert_eq!(a.due_amount, dec("100"));
    assert_eq!(a.paid_status, "unpaid");
    assert_eq!(a.status, "sent");
    assert_eq!(b.due_amount, dec("70"));
    assert_eq!(b.paid_status, "partially_paid");
}

#[tokio::test]
async fn update_amount_on_same_invoice_reverses_then_applies() {
    let engine = spawn_engine().await;
    let invoice = engine.create_sent_invoice("100").await;
    let payment = engine.create_linked_payment(invoice.invoice_id, "40").await;

    engine
        .payments
        .update_payment(
            engine.company_id,
            payment.payment_id,
            engine.update_input_from(&payment, Some(invoice.invoice_id), "100"),
        )
        .await
        .expect("Failed to update payment");

    let invoice = engine.invoice(invoice.invoice_id).await;
    assert_eq!(invoice.due_amount, dec("0"));
    assert_eq!(invoice.status, "completed");
    assert_eq!(invoice.paid_status, "paid");
}

#[tokio::test]
async fn update_clearing_invoice_runs_only_the_reversal() {
    let engine = spawn_engine().await;
    let invoice = engine.create_sent_invoice("100").await;
    let payment = engine.create_linked_payment(invoice.invoice_id, "40").await;

    let updated = engine
        .payments
        .update_payment(
            engine.company_id,
            payment.payment_id,
            engine.update_input_from(&payment, None, "40"),
        )
        .await
        .expect("Failed to update payment");

    assert_eq!(updated.invoice_id, None);
    let invoice = engine.invoice(invoice.invoice_id).await;
    assert_eq!(invoice.due_amount, dec("100"));
    assert_eq!(invoice.paid_status, "unpaid");
}

#[tokio::test]
async fn overpayment_fails_and_leaves_invoice_untouched() {
    let engine = spawn_engine().await;
    let invoice = engine.create_sent_invoice("100").await;
    engine.create_linked_payment(invoice.invoice_id, "60").await;

    let err = engine
        .payments
        .create_payment(
            engine.company_id,
            engine.payment_input(Some(invoice.invoice_id), "70", "1", engine.base_currency_id),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidAmount(_)));

    let invoice = engine.invoice(invoice.invoice_id).await;
    assert_eq!(invoice.due_amount, dec("40"));
    assert_eq!(invoice.paid_status, "partially_paid");
}

#[tokio::test]
async fn negative_amount_is_rejected_before_any_mutation() {
    let engine = spawn_engine().await;
    let invoice = engine.create_sent_invoice("100").await;

    let err = engine
        .payments
        .create_payment(
            engine.company_id,
            engine.payment_input(Some(invoice.invoice_id), "-5", "1", engine.base_currency_id),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidAmount(_)));

    assert_eq!(engine.invoice(invoice.invoice_id).await.due_amount, dec("100"));
}

#[tokio::test]
async fn create_against_missing_invoice_persists_nothing() {
    let engine = spawn_engine().await;

    let err = engine
        .payments
        .create_payment(
            engine.company_id,
            engine.payment_input(Some(Uuid::new_v4()), "10", "1", engine.base_currency_id),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    // The failed transaction must not have burned a sequence number.
    let payment = engine
        .payments
        .create_payment(
            engine.company_id,
            engine.payment_input(None, "10", "1", engine.base_currency_id),
        )
        .await
        .expect("Failed to create payment");
    assert_eq!(payment.sequence_number, "PAY-000001");
}

#[tokio::test]
async fn unlinked_payment_touches_no_invoice() {
    let engine = spawn_engine().await;
    let invoice = engine.create_sent_invoice("100").await;

    let payment = engine
        .payments
        .create_payment(
            engine.company_id,
            engine.payment_input(None, "25", "1", engine.base_currency_id),
        )
        .await
        .expect("Failed to create payment");

    assert_eq!(payment.invoice_id, None);
    assert_eq!(engine.invoice(invoice.invoice_id).await.due_amount, dec("100"));
}

#[tokio::test]
async fn delete_is_idempotent_per_id() {
    let engine = spawn_engine().await;
    let invoice = engine.create_sent_invoice("100").await;
    let payment = engine.create_linked_payment(invoice.invoice_id, "40").await;

    let missing = Uuid::new_v4();
    assert!(engine
        .payments
        .delete_payments(engine.company_id, &[payment.payment_id, missing])
        .await
        .expect("Failed to delete payments"));

    // Deleting again is a no-op, not an error.
    assert!(engine
        .payments
        .delete_payments(engine.company_id, &[payment.payment_id])
        .await
        .expect("Failed to re-delete payments"));

    let invoice = engine.invoice(invoice.invoice_id).await;
    assert_eq!(invoice.due_amount, dec("100"));
    assert!(engine.payment(payment.payment_id).await.is_none());
}

#[tokio::test]
async fn conservation_holds_across_mixed_operations() {
    let engine = spawn_engine().await;
    let invoice = engine.create_sent_invoice("500").await;

    let p1 = engine.create_linked_payment(invoice.invoice_id, "120").await;
    let p2 = engine.create_linked_payment(invoice.invoice_id, "80").await;
    let p3 = engine.create_linked_payment(invoice.invoice_id, "50").await;

    // total - due == sum of currently linked payments
    let inv = engine.invoice(invoice.invoice_id).await;
    assert_eq!(inv.total - inv.due_amount, dec("250"));

    engine
        .payments
        .update_payment(
            engine.company_id,
            p2.payment_id,
            engine.update_input_from(&p2, Some(invoice.invoice_id), "200"),
        )
        .await
        .expect("Failed to update payment");

    let inv = engine.invoice(invoice.invoice_id).await;
    assert_eq!(inv.total - inv.due_amount, dec("370"));

    engine
        .payments
        .delete_payments(engine.company_id, &[p1.payment_id])
        .await
        .expect("Failed to delete payment");

    let inv = engine.invoice(invoice.invoice_id).await;
    assert_eq!(inv.total - inv.due_amount, dec("250"));

    engine
        .payments
        .delete_payments(engine.company_id, &[p2.payment_id, p3.payment_id])
        .await
        .expect("Failed to delete payments");

    let inv = engine.invoice(invoice.invoice_id).await;
    assert_eq!(inv.due_amount, inv.total);
    assert_eq!(inv.paid_status, "unpaid");
    assert_eq!(inv.status, "sent");
}

#[tokio::test]
async fn foreign_currency_payment_appends_audit_entry() {
    let engine = spawn_engine().await;
    let foreign = Uuid::new_v4();

    let payment = engine
        .payments
        .create_payment(
            engine.company_id,
            engine.payment_input(None, "10", "1.35", foreign),
        )
        .await
        .expect("Failed to create payment");

    let logs = engine
        .store
        .list_exchange_rate_logs(engine.company_id, payment.payment_id)
        .await
        .expect("Failed to list logs");
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].document_type, "payment");
    assert_eq!(logs[0].exchange_rate, dec("1.35"));
    assert_eq!(payment.base_amount, dec("13.50"));
}

#[tokio::test]
async fn base_currency_payment_appends_no_audit_entry() {
    let engine = spawn_engine().await;

    let payment = engine
        .payments
        .create_payment(
            engine.company_id,
            engine.payment_input(None, "10", "1", engine.base_currency_id),
        )
        .await
        .expect("Failed to create payment");

    let logs = engine
        .store
        .list_exchange_rate_logs(engine.company_id, payment.payment_id)
        .await
        .expect("Failed to list logs");
    assert!(logs.is_empty());
}

#[tokio::test]
async fn customer_change_reallocates_customer_sequence() {
    let engine = spawn_engine().await;
    let payment = engine
        .payments
        .create_payment(
            engine.company_id,
            engine.payment_input(None, "10", "1", engine.base_currency_id),
        )
        .await
        .expect("Failed to create payment");
    assert_eq!(payment.customer_sequence_number.as_deref(), Some("PAY-000001"));

    let other_customer = Uuid::new_v4();
    let mut input = engine.update_input_from(&payment, None, "10");
    input.customer_id = Some(other_customer);

    let updated = engine
        .payments
        .update_payment(engine.company_id, payment.payment_id, input)
        .await
        .expect("Failed to update payment");

    assert_eq!(updated.customer_id, Some(other_customer));
    assert_eq!(updated.customer_sequence_number.as_deref(), Some("PAY-000001"));
    // Company-scoped number never changes after creation.
    assert_eq!(updated.sequence_number, payment.sequence_number);
}

#[tokio::test]
async fn custom_fields_are_attached_and_updated() {
    let engine = spawn_engine().await;

    let mut input = engine.payment_input(None, "10", "1", engine.base_currency_id);
    input.custom_fields = Some(serde_json::json!({"reference": "wire-401"}));
    let payment = engine
        .payments
        .create_payment(engine.company_id, input)
        .await
        .expect("Failed to create payment");
    assert_eq!(
        payment.custom_fields,
        Some(serde_json::json!({"reference": "wire-401"}))
    );

    let mut update = engine.update_input_from(&payment, None, "10");
    update.custom_fields = Some(serde_json::json!({"reference": "wire-402"}));
    let updated = engine
        .payments
        .update_payment(engine.company_id, payment.payment_id, update)
        .await
        .expect("Failed to update payment");
    assert_eq!(
        updated.custom_fields,
        Some(serde_json::json!({"reference": "wire-402"}))
    );

    // Updates without a payload keep the stored fields.
    let updated = engine
        .payments
        .update_payment(
            engine.company_id,
            payment.payment_id,
            engine.update_input_from(&updated, None, "10"),
        )
        .await
        .expect("Failed to update payment");
    assert_eq!(
        updated.custom_fields,
        Some(serde_json::json!({"reference": "wire-402"}))
    );
}

#[tokio::test]
async fn invoice_balance_reports_current_state() {
    let engine = spawn_engine().await;
    let invoice = engine.create_sent_invoice("100").await;
    engine.create_linked_payment(invoice.invoice_id, "40").await;

    let balance = engine
        .payments
        .invoice_balance(engine.company_id, invoice.invoice_id)
        .await
        .expect("Failed to read balance");
    assert_eq!(balance.due_amount, dec("60"));
    assert_eq!(balance.base_due_amount, dec("60.00"));
    assert_eq!(balance.status, "sent");
    assert_eq!(balance.paid_status, "partially_paid");

    let err = engine
        .payments
        .invoice_balance(engine.company_id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}
