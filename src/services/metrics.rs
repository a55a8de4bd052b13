use std::collections::HashSet;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::{
    models::{InvoiceRow, LeaseRow, PaymentRow, PropertyRow, TenantRow},
    services::{
        currency::{round_cents, to_usd},
        income::{monthly_income, IncomeContext},
        invoice_balance::InvoiceStatus,
    },
};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DashboardMetrics {
    pub as_of: NaiveDate,
    pub total_properties: usize,
    pub occupied_properties: usize,
    pub vacant_properties: usize,
    pub occupancy_rate: f64,
    pub active_leases: usize,
    pub active_tenants: usize,
    pub expected_monthly_income: f64,
    pub expected_monthly_income_display: String,
    pub potential_vacant_rent: f64,
    pub potential_vacant_rent_display: String,
    pub total_outstanding: f64,
    pub total_outstanding_display: String,
    pub collected_this_month: f64,
    pub collected_this_month_display: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PropertyProfit {
    pub property_id: String,
    pub property_label: String,
    pub occupied: bool,
    pub monthly_income: f64,
    pub monthly_expenses: f64,
    pub monthly_profit: f64,
    pub annual_profit: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProfitTotals {
    pub monthly_income: f64,
    pub monthly_expenses: f64,
    pub monthly_profit: f64,
    pub annual_profit: f64,
    pub monthly_profit_display: String,
    pub annual_profit_display: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProfitMetrics {
    pub as_of: NaiveDate,
    pub totals: ProfitTotals,
    pub data: Vec<PropertyProfit>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Occupancy {
    pub property_id: String,
    pub date: NaiveDate,
    pub occupied: bool,
    pub lease_id: Option<String>,
}

fn covering_leases<'a>(
    leases: &'a [LeaseRow],
    date: NaiveDate,
) -> impl Iterator<Item = &'a LeaseRow> + 'a {
    leases.iter().filter(move |lease| lease.covers(date))
}

/// A property is occupied on `date` iff an active lease covers it.
pub fn property_occupancy(property_id: &str, date: NaiveDate, leases: &[LeaseRow]) -> Occupancy {
    let lease = covering_leases(leases, date)
        .find(|lease| lease.property_id.as_deref() == Some(property_id));
    Occupancy {
        property_id: property_id.to_string(),
        date,
        occupied: lease.is_some(),
        lease_id: lease.map(|lease| lease.id.clone()),
    }
}

pub fn dashboard_metrics(
    as_of: NaiveDate,
    properties: &[PropertyRow],
    leases: &[LeaseRow],
    tenants: &[TenantRow],
    invoices: &[InvoiceRow],
    payments: &[PaymentRow],
) -> DashboardMetrics {
    // ── Occupancy ──
    let occupied_ids = covering_leases(leases, as_of)
        .filter_map(|lease| lease.property_id.as_deref())
        .collect::<HashSet<_>>();
    let total_properties = properties.len();
    let occupied_properties = properties
        .iter()
        .filter(|property| occupied_ids.contains(property.id.as_str()))
        .count();
    let vacant_properties = total_properties - occupied_properties;
    let occupancy_rate = if total_properties > 0 {
        round4(occupied_properties as f64 / total_properties as f64)
    } else {
        0.0
    };

    // ── Income ──
    let expected_monthly_income = round_cents(
        covering_leases(leases, as_of)
            .map(|lease| monthly_income(lease.rent_amount, lease.cadence(), IncomeContext::Dashboard))
            .sum(),
    );
    let potential_vacant_rent = round_cents(
        properties
            .iter()
            .filter(|property| !occupied_ids.contains(property.id.as_str()))
            .map(|property| property.rent_value)
            .sum(),
    );

    // ── Receivables ──
    let total_outstanding = round_cents(
        invoices
            .iter()
            .filter(|invoice| invoice.status() == Some(InvoiceStatus::Open))
            .map(|invoice| invoice.balance_due)
            .sum(),
    );
    let collected_this_month = round_cents(
        payments
            .iter()
            .filter(|payment| {
                payment.payment_date.year() == as_of.year()
                    && payment.payment_date.month() == as_of.month()
            })
            .map(|payment| payment.amount)
            .sum(),
    );

    DashboardMetrics {
        as_of,
        total_properties,
        occupied_properties,
        vacant_properties,
        occupancy_rate,
        active_leases: leases.iter().filter(|lease| lease.is_active()).count(),
        active_tenants: tenants.iter().filter(|tenant| tenant.is_active).count(),
        expected_monthly_income,
        expected_monthly_income_display: to_usd(expected_monthly_income),
        potential_vacant_rent,
        potential_vacant_rent_display: to_usd(potential_vacant_rent),
        total_outstanding,
        total_outstanding_display: to_usd(total_outstanding),
        collected_this_month,
        collected_this_month_display: to_usd(collected_this_month),
    }
}

/// Per-property income less carrying costs, with the profit-report cadence
/// factors. Insurance and tax are annual figures.
pub fn profit_metrics(
    as_of: NaiveDate,
    properties: &[PropertyRow],
    leases: &[LeaseRow],
) -> ProfitMetrics {
    let data = properties
        .iter()
        .map(|property| {
            let mut occupied = false;
            let income = covering_leases(leases, as_of)
                .filter(|lease| lease.property_id.as_deref() == Some(property.id.as_str()))
                .inspect(|_| occupied = true)
                .map(|lease| {
                    monthly_income(lease.rent_amount, lease.cadence(), IncomeContext::ProfitMetrics)
                })
                .sum::<f64>();
            let expenses = (property.insurance_premium + property.property_tax) / 12.0;
            let profit = income - expenses;
            PropertyProfit {
                property_id: property.id.clone(),
                property_label: property.label(),
                occupied,
                monthly_income: round_cents(income),
                monthly_expenses: round_cents(expenses),
                monthly_profit: round_cents(profit),
                annual_profit: round_cents(profit * 12.0),
            }
        })
        .collect::<Vec<_>>();

    let monthly_income = round_cents(data.iter().map(|row| row.monthly_income).sum());
    let monthly_expenses = round_cents(data.iter().map(|row| row.monthly_expenses).sum());
    let monthly_profit = round_cents(monthly_income - monthly_expenses);
    let annual_profit = round_cents(data.iter().map(|row| row.annual_profit).sum());

    ProfitMetrics {
        as_of,
        totals: ProfitTotals {
            monthly_income,
            monthly_expenses,
            monthly_profit,
            annual_profit,
            monthly_profit_display: to_usd(monthly_profit),
            annual_profit_display: to_usd(annual_profit),
        },
        data,
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
