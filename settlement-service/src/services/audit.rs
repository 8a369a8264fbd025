//! Settlement audit sweep.
//!
//! The reconciler updates `Payment` and `Order` in two steps without a
//! spanning transaction, so a crash between them can leave a completed
//! payment against an order still awaiting payment. The sweep scans completed
//! payments and re-applies the idempotent forward transition.

use crate::services::metrics::record_audit_repair;
use crate::services::repository::{OrderStore, OrderTransition, PaymentStore};
use anyhow::Result;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct AuditReport {
    pub scanned: usize,
    pub repaired: usize,
    /// Completed payments whose order does not exist. Alertable anomalies,
    /// never auto-repaired.
    pub orphaned: usize,
}

pub async fn run_settlement_audit(
    payments: &dyn PaymentStore,
    orders: &dyn OrderStore,
) -> Result<AuditReport> {
    let completed = payments.completed_payments().await?;
    let mut report = AuditReport {
        scanned: completed.len(),
        ..AuditReport::default()
    };

    for payment in completed {
        // Same order-resolution invariant as the reconciler: the merchant
        // reference doubles as the order id when none was recorded.
        let order_id = payment
            .order_id
            .clone()
            .unwrap_or_else(|| payment.reference.clone());

        match orders.mark_paid(&order_id).await? {
            OrderTransition::Advanced => {
                tracing::warn!(
                    order_id = %order_id,
                    reference = %payment.reference,
                    "Audit sweep repaired a missed order transition"
                );
                record_audit_repair();
                report.repaired += 1;
            }
            OrderTransition::AlreadySettled => {}
            OrderTransition::NotFound => {
                tracing::error!(
                    order_id = %order_id,
                    reference = %payment.reference,
                    "Completed payment has no matching order"
                );
                report.orphaned += 1;
            }
        }
    }

    Ok(report)
}
