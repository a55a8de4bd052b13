use serde::{Deserialize, Serialize};

/// Canonical rent billing frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RentCadence {
    Weekly,
    Biweekly,
    Monthly,
}

impl RentCadence {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::Biweekly => "biweekly",
            Self::Monthly => "monthly",
        }
    }
}

const WEEKLY_PATTERNS: &[&str] = &["weekly", "week"];
const BIWEEKLY_PATTERNS: &[&str] = &["biweekly", "bi weekly", "every 2 weeks", "fortnight"];
const MONTHLY_PATTERNS: &[&str] = &["monthly", "month", "mo", "mth"];

/// Maps a free-text cadence ("Bi-Weekly", " every_2_weeks ", "mo") onto a
/// canonical period. Families are checked weekly, biweekly, monthly; the first
/// match wins. Absent or unrecognized text yields `None`.
pub fn normalize_cadence(raw: Option<&str>) -> Option<RentCadence> {
    let cleaned = clean_cadence_text(raw?);
    if cleaned.is_empty() {
        return None;
    }

    let families = [
        (WEEKLY_PATTERNS, RentCadence::Weekly),
        (BIWEEKLY_PATTERNS, RentCadence::Biweekly),
        (MONTHLY_PATTERNS, RentCadence::Monthly),
    ];
    families
        .iter()
        .find(|(patterns, _)| patterns.contains(&cleaned.as_str()))
        .map(|(_, cadence)| *cadence)
}

fn clean_cadence_text(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::{normalize_cadence, RentCadence};

    #[test]
    fn recognizes_weekly_family() {
        assert_eq!(normalize_cadence(Some("WEEKLY")), Some(RentCadence::Weekly));
        assert_eq!(normalize_cadence(Some("  week ")), Some(RentCadence::Weekly));
    }

    #[test]
    fn recognizes_biweekly_with_any_separator() {
        for raw in [
            "bi-weekly",
            "bi_weekly",
            "Bi Weekly",
            "biweekly",
            "every 2 weeks",
            "Every-2-Weeks",
            "every   2\tweeks",
            "fortnight",
        ] {
            assert_eq!(
                normalize_cadence(Some(raw)),
                Some(RentCadence::Biweekly),
                "{raw}"
            );
        }
    }

    #[test]
    fn recognizes_monthly_abbreviations() {
        for raw in ["monthly", "Month", "mo", "MTH", " mth "] {
            assert_eq!(
                normalize_cadence(Some(raw)),
                Some(RentCadence::Monthly),
                "{raw}"
            );
        }
    }

    #[test]
    fn unknown_or_absent_is_none() {
        assert_eq!(normalize_cadence(Some("xyz")), None);
        assert_eq!(normalize_cadence(Some("   ")), None);
        assert_eq!(normalize_cadence(Some("quarterly")), None);
        assert_eq!(normalize_cadence(None), None);
    }

    #[test]
    fn canonical_names_round_trip() {
        for cadence in [
            RentCadence::Weekly,
            RentCadence::Biweekly,
            RentCadence::Monthly,
        ] {
            assert_eq!(normalize_cadence(Some(cadence.as_str())), Some(cadence));
        }
    }
}
