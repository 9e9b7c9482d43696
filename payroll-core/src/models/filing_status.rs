use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilingStatus {
    Single,
    MarriedFilingJointly,
    MarriedFilingSeparately,
    HeadOfHousehold,
}

impl FilingStatus {
    /// Every filing status, in schedule order.
    pub const ALL: [FilingStatus; 4] = [
        Self::Single,
        Self::MarriedFilingJointly,
        Self::MarriedFilingSeparately,
        Self::HeadOfHousehold,
    ];

    /// Short code used in rate-table files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "S",
            Self::MarriedFilingJointly => "MFJ",
            Self::MarriedFilingSeparately => "MFS",
            Self::HeadOfHousehold => "HOH",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::MarriedFilingJointly => "married_filing_jointly",
            Self::MarriedFilingSeparately => "married_filing_separately",
            Self::HeadOfHousehold => "head_of_household",
        }
    }

    /// Accepts either the short code (`"MFJ"`) or the long snake-case name
    /// (`"married_filing_jointly"`).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "S" | "single" => Some(Self::Single),
            "MFJ" | "married_filing_jointly" => Some(Self::MarriedFilingJointly),
            "MFS" | "married_filing_separately" => Some(Self::MarriedFilingSeparately),
            "HOH" | "head_of_household" => Some(Self::HeadOfHousehold),
            _ => None,
        }
    }
}

impl std::fmt::Display for FilingStatus {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_short_codes_and_names() {
        for status in FilingStatus::ALL {
            assert_eq!(FilingStatus::parse(status.as_str()), Some(status));
            assert_eq!(FilingStatus::parse(status.name()), Some(status));
        }
    }

    #[test]
    fn parse_rejects_unknown_values() {
        assert_eq!(FilingStatus::parse("QSS"), None);
        assert_eq!(FilingStatus::parse("widowed"), None);
        assert_eq!(FilingStatus::parse(""), None);
    }
}
