use crate::services::cadence::{normalize_cadence, RentCadence};

/// Which report is asking. The dashboard and the profit report have always
/// used different weekly/biweekly factors; both are kept as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncomeContext {
    Dashboard,
    ProfitMetrics,
}

impl IncomeContext {
    fn weekly_factor(self) -> f64 {
        match self {
            Self::Dashboard => 4.0,
            Self::ProfitMetrics => 4.33,
        }
    }

    fn biweekly_factor(self) -> f64 {
        match self {
            Self::Dashboard => 2.0,
            Self::ProfitMetrics => 2.17,
        }
    }
}

/// Monthly-equivalent rent for a canonical cadence. Unknown cadence is
/// treated as monthly.
pub fn monthly_income(rent: f64, cadence: Option<RentCadence>, context: IncomeContext) -> f64 {
    match cadence {
        Some(RentCadence::Weekly) => rent * context.weekly_factor(),
        Some(RentCadence::Biweekly) => rent * context.biweekly_factor(),
        Some(RentCadence::Monthly) | None => rent,
    }
}

/// Same as [`monthly_income`] for a raw cadence descriptor.
pub fn monthly_income_raw(rent: f64, raw_cadence: Option<&str>, context: IncomeContext) -> f64 {
    monthly_income(rent, normalize_cadence(raw_cadence), context)
}
