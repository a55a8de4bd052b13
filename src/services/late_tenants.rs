use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::{
    models::{InvoiceRow, LeaseRow, PaymentRow},
    services::currency::round_cents,
};

const PAYMENT_HISTORY_LIMIT: usize = 12;

/// Everything the report needs, already fetched in batch.
#[derive(Debug, Clone, Copy)]
pub struct LateTenantInput<'a> {
    pub leases: &'a [LeaseRow],
    pub invoices: &'a [InvoiceRow],
    pub payments: &'a [PaymentRow],
    pub tenant_names: &'a HashMap<String, String>,
    pub property_labels: &'a HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LateInvoiceEntry {
    pub invoice_id: String,
    pub due_date: NaiveDate,
    pub days_late: i64,
    pub amount_late: f64,
    pub balance_due: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PaymentEntry {
    pub payment_id: String,
    pub payment_date: NaiveDate,
    pub amount: f64,
    pub payment_type: Option<String>,
    pub invoice_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LateTenantRow {
    pub lease_id: String,
    pub tenant_id: Option<String>,
    pub tenant_name: String,
    pub property_id: Option<String>,
    pub property_label: String,
    pub rent_amount: f64,
    pub rent_cadence: Option<String>,
    pub days_late: i64,
    pub earliest_late_due_date: NaiveDate,
    pub total_owed_late: f64,
    pub total_late_fees: f64,
    pub total_late_periods: usize,
    pub total_unpaid: f64,
    pub late_invoices: Vec<LateInvoiceEntry>,
    pub last_payment_date: Option<NaiveDate>,
    pub payment_history: Vec<PaymentEntry>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LateTenantSummary {
    pub late_lease_count: usize,
    pub total_late_owed: f64,
    pub total_all_owed: f64,
    pub severe_late_count: usize,
    pub average_days_late: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LateTenantReport {
    pub as_of: NaiveDate,
    pub severe_after_days: i64,
    pub summary: LateTenantSummary,
    pub data: Vec<LateTenantRow>,
}

/// Classifies each active lease's invoices as of `today`:
/// unpaid = OPEN with a positive balance, late = unpaid and due before today.
/// Leases with no late invoice are left out of the rows but their unpaid
/// balance still counts toward `total_all_owed`.
pub fn aggregate_late_tenants(
    today: NaiveDate,
    severe_after_days: i64,
    input: &LateTenantInput<'_>,
) -> LateTenantReport {
    let mut invoices_by_lease: HashMap<&str, Vec<&InvoiceRow>> = HashMap::new();
    for invoice in input.invoices {
        invoices_by_lease
            .entry(invoice.lease_id.as_str())
            .or_default()
            .push(invoice);
    }

    let mut payments_by_lease: HashMap<&str, Vec<&PaymentRow>> = HashMap::new();
    for payment in input.payments {
        if let Some(lease_id) = payment.lease_id.as_deref() {
            payments_by_lease.entry(lease_id).or_default().push(payment);
        }
    }

    let mut rows = Vec::new();
    let mut total_all_owed = 0.0;

    for lease in input.leases.iter().filter(|lease| lease.is_active()) {
        let in_window = invoices_by_lease
            .get(lease.id.as_str())
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .copied()
            .filter(|invoice| {
                invoice.due_date <= today
                    && lease
                        .lease_start_date
                        .map_or(true, |start| invoice.due_date >= start)
            });

        let unpaid = in_window.filter(|invoice| invoice.is_unpaid()).collect::<Vec<_>>();
        let total_unpaid = unpaid.iter().map(|invoice| invoice.balance_due).sum::<f64>();
        total_all_owed += total_unpaid;

        let mut late = unpaid
            .iter()
            .copied()
            .filter(|invoice| invoice.due_date < today)
            .collect::<Vec<_>>();
        if late.is_empty() {
            continue;
        }
        late.sort_by_key(|invoice| invoice.due_date);

        let earliest_late_due_date = late[0].due_date;
        let late_invoices = late
            .iter()
            .map(|invoice| LateInvoiceEntry {
                invoice_id: invoice.id.clone(),
                due_date: invoice.due_date,
                days_late: (today - invoice.due_date).num_days(),
                amount_late: invoice.amount_late,
                balance_due: invoice.balance_due,
            })
            .collect::<Vec<_>>();

        let mut history = payments_by_lease
            .get(lease.id.as_str())
            .cloned()
            .unwrap_or_default();
        history.sort_by(|left, right| right.payment_date.cmp(&left.payment_date));
        let payment_history = history
            .iter()
            .take(PAYMENT_HISTORY_LIMIT)
            .map(|payment| PaymentEntry {
                payment_id: payment.id.clone(),
                payment_date: payment.payment_date,
                amount: payment.amount,
                payment_type: payment.payment_type.clone(),
                invoice_id: payment.invoice_id.clone(),
            })
            .collect::<Vec<_>>();

        rows.push(LateTenantRow {
            lease_id: lease.id.clone(),
            tenant_id: lease.tenant_id.clone(),
            tenant_name: lease
                .tenant_id
                .as_ref()
                .and_then(|id| input.tenant_names.get(id))
                .cloned()
                .unwrap_or_default(),
            property_id: lease.property_id.clone(),
            property_label: lease
                .property_id
                .as_ref()
                .and_then(|id| input.property_labels.get(id))
                .cloned()
                .unwrap_or_default(),
            rent_amount: lease.rent_amount,
            rent_cadence: lease.cadence().map(|cadence| cadence.as_str().to_string()),
            days_late: (today - earliest_late_due_date).num_days(),
            earliest_late_due_date,
            total_owed_late: round_cents(late.iter().map(|invoice| invoice.balance_due).sum()),
            total_late_fees: round_cents(late.iter().map(|invoice| invoice.amount_late).sum()),
            total_late_periods: late.len(),
            total_unpaid: round_cents(total_unpaid),
            late_invoices,
            last_payment_date: history.first().map(|payment| payment.payment_date),
            payment_history,
        });
    }

    rows.sort_by(|left, right| {
        right
            .total_owed_late
            .total_cmp(&left.total_owed_late)
            .then_with(|| right.days_late.cmp(&left.days_late))
            .then_with(|| left.lease_id.cmp(&right.lease_id))
    });

    let late_lease_count = rows.len();
    let average_days_late = if late_lease_count == 0 {
        0
    } else {
        let total_days = rows.iter().map(|row| row.days_late).sum::<i64>();
        (total_days as f64 / late_lease_count as f64).round() as i64
    };

    LateTenantReport {
        as_of: today,
        severe_after_days,
        summary: LateTenantSummary {
            late_lease_count,
            total_late_owed: round_cents(rows.iter().map(|row| row.total_owed_late).sum()),
            total_all_owed: round_cents(total_all_owed),
            severe_late_count: rows
                .iter()
                .filter(|row| row.days_late >= severe_after_days)
                .count(),
            average_days_late,
        },
        data: rows,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::{Duration, NaiveDate};
    use serde_json::json;

    use super::{aggregate_late_tenants, LateTenantInput};
    use crate::models::{InvoiceRow, LeaseRow, PaymentRow};

    fn report(
        leases: &[LeaseRow],
        invoices: &[InvoiceRow],
        payments: &[PaymentRow],
        tenant_names: &HashMap<String, String>,
    ) -> super::LateTenantReport {
        aggregate_late_tenants(
            today(),
            30,
            &LateTenantInput {
                leases,
                invoices,
                payments,
                tenant_names,
                property_labels: &HashMap::new(),
            },
        )
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 4, 20).expect("valid date")
    }

    fn lease(id: &str, status: &str) -> LeaseRow {
        serde_json::from_value(json!({
            "id": id,
            "tenant_id": format!("tenant-{id}"),
            "property_id": format!("property-{id}"),
            "rent_amount": "1000.00",
            "rent_cadence": "Monthly",
            "lease_start_date": "2026-01-01",
            "status": status
        }))
        .expect("lease row")
    }

    fn invoice(
        id: &str,
        lease_id: &str,
        days_before_today: i64,
        balance_due: f64,
        amount_late: f64,
        status: &str,
    ) -> InvoiceRow {
        let due_date = today() - Duration::days(days_before_today);
        serde_json::from_value(json!({
            "id": id,
            "lease_id": lease_id,
            "due_date": due_date.to_string(),
            "amount_rent": 1000,
            "amount_late": amount_late,
            "balance_due": balance_due,
            "status": status
        }))
        .expect("invoice row")
    }

    fn payment(id: &str, lease_id: &str, date: &str, amount: f64) -> PaymentRow {
        serde_json::from_value(json!({
            "id": id,
            "lease_id": lease_id,
            "payment_date": date,
            "amount": amount,
            "payment_type": "cash"
        }))
        .expect("payment row")
    }

    #[test]
    fn reports_single_late_invoice() {
        let leases = vec![lease("a", "active"), lease("paid", "active")];
        let invoices = vec![
            invoice("inv-1", "a", 10, 500.0, 50.0, "OPEN"),
            invoice("inv-2", "paid", 10, 0.0, 0.0, "PAID"),
        ];
        let tenant_names = HashMap::from([("tenant-a".to_string(), "Dana Reyes".to_string())]);
        let report = report(&leases, &invoices, &[], &tenant_names);

        assert_eq!(report.data.len(), 1);
        let row = &report.data[0];
        assert_eq!(row.lease_id, "a");
        assert_eq!(row.tenant_name, "Dana Reyes");
        assert_eq!(row.days_late, 10);
        assert_eq!(row.total_owed_late, 500.0);
        assert_eq!(row.total_late_fees, 50.0);
        assert_eq!(row.total_late_periods, 1);
        assert_eq!(row.rent_cadence.as_deref(), Some("monthly"));
        assert_eq!(report.summary.total_all_owed, 500.0);
        assert_eq!(report.summary.late_lease_count, 1);
        assert_eq!(report.summary.average_days_late, 10);
        assert_eq!(report.summary.severe_late_count, 0);
    }

    #[test]
    fn invoice_due_today_is_owed_but_not_late() {
        let leases = vec![lease("a", "active")];
        let invoices = vec![invoice("inv-1", "a", 0, 1000.0, 0.0, "OPEN")];
        let report = report(&leases, &invoices, &[], &HashMap::new());
        assert!(report.data.is_empty());
        assert_eq!(report.summary.total_all_owed, 1000.0);
        assert_eq!(report.summary.average_days_late, 0);
    }

    #[test]
    fn ignores_void_future_and_pre_lease_invoices() {
        let leases = vec![lease("a", "active"), lease("gone", "inactive")];
        let invoices = vec![
            invoice("void", "a", 20, 1000.0, 0.0, "VOID"),
            invoice("future", "a", -5, 1000.0, 0.0, "OPEN"),
            invoice("before-start", "a", 200, 1000.0, 0.0, "OPEN"),
            invoice("inactive", "gone", 40, 1000.0, 0.0, "OPEN"),
        ];
        let report = report(&leases, &invoices, &[], &HashMap::new());
        assert!(report.data.is_empty());
        assert_eq!(report.summary.total_all_owed, 0.0);
    }

    #[test]
    fn aggregates_and_sorts_by_amount_owed() {
        let leases = vec![lease("small", "active"), lease("big", "active")];
        let invoices = vec![
            invoice("s-1", "small", 45, 200.0, 25.0, "OPEN"),
            invoice("b-1", "big", 31, 1000.0, 50.0, "OPEN"),
            invoice("b-2", "big", 3, 1000.0, 0.0, "OPEN"),
            invoice("b-3", "big", 0, 1000.0, 0.0, "OPEN"),
        ];
        let payments = vec![
            payment("p-1", "big", "2026-02-01", 1000.0),
            payment("p-2", "big", "2026-03-03", 400.0),
        ];
        let report = report(&leases, &invoices, &payments, &HashMap::new());

        assert_eq!(report.data.len(), 2);
        let big = &report.data[0];
        assert_eq!(big.lease_id, "big");
        assert_eq!(big.days_late, 31);
        assert_eq!(big.total_owed_late, 2000.0);
        assert_eq!(big.total_late_periods, 2);
        assert_eq!(big.total_unpaid, 3000.0);
        assert_eq!(big.last_payment_date.map(|d| d.to_string()).as_deref(), Some("2026-03-03"));
        assert_eq!(big.payment_history.len(), 2);
        assert_eq!(big.payment_history[0].payment_id, "p-2");
        assert_eq!(report.data[1].lease_id, "small");

        assert_eq!(report.summary.total_late_owed, 2200.0);
        assert_eq!(report.summary.total_all_owed, 3200.0);
        assert_eq!(report.summary.severe_late_count, 2);
        assert_eq!(report.summary.average_days_late, 38);
    }
}
