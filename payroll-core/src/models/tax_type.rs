use serde::{Deserialize, Serialize};

/// Categories of rate data held in a rate table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxKind {
    Federal,
    State,
    Local,
    Fica,
    Futa,
    Suta,
    Sdi,
    Pfml,
}

impl TaxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Federal => "federal",
            Self::State => "state",
            Self::Local => "local",
            Self::Fica => "fica",
            Self::Futa => "futa",
            Self::Suta => "suta",
            Self::Sdi => "sdi",
            Self::Pfml => "pfml",
        }
    }

    /// Wage-base tax types covered by this kind. Empty for income-tax kinds.
    pub fn wage_base_types(&self) -> &'static [TaxType] {
        match self {
            Self::Fica => &[TaxType::SocialSecurity, TaxType::Medicare],
            Self::Futa => &[TaxType::Futa],
            Self::Suta => &[TaxType::Suta],
            Self::Sdi => &[TaxType::Sdi],
            Self::Pfml => &[TaxType::Pfml],
            Self::Federal | Self::State | Self::Local => &[],
        }
    }
}

impl std::fmt::Display for TaxKind {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payroll levies computed against an annual wage base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxType {
    SocialSecurity,
    Medicare,
    Futa,
    Suta,
    Sdi,
    Pfml,
}

impl TaxType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SocialSecurity => "social_security",
            Self::Medicare => "medicare",
            Self::Futa => "futa",
            Self::Suta => "suta",
            Self::Sdi => "sdi",
            Self::Pfml => "pfml",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "social_security" => Some(Self::SocialSecurity),
            "medicare" => Some(Self::Medicare),
            "futa" => Some(Self::Futa),
            "suta" => Some(Self::Suta),
            "sdi" => Some(Self::Sdi),
            "pfml" => Some(Self::Pfml),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaxType {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which party owes a levy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxSide {
    Employee,
    Employer,
}

impl TaxSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Employee => "employee",
            Self::Employer => "employer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "employee" => Some(Self::Employee),
            "employer" => Some(Self::Employer),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaxSide {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
