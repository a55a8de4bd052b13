pub mod cadence;
pub mod currency;
pub mod income;
pub mod invoice_balance;
pub mod late_tenants;
pub mod ledger;
pub mod metrics;
