use serde::{Deserialize, Serialize};

/// Two-letter uppercase postal code for a state (or `DC`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StateCode(String);

impl StateCode {
    /// Parses a state code, normalising case and surrounding whitespace.
    ///
    /// Returns `None` unless the input is exactly two ASCII letters.
    pub fn parse(s: &str) -> Option<Self> {
        let trimmed = s.trim();
        if trimmed.len() == 2 && trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
            Some(Self(trimmed.to_ascii_uppercase()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for StateCode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("'{value}' is not a two-letter state code"))
    }
}

impl From<StateCode> for String {
    fn from(code: StateCode) -> Self {
        code.0
    }
}

impl std::fmt::Display for StateCode {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A taxing authority.
///
/// The textual form is `US` for the federal government, the two-letter
/// postal code for a state, and the rate-table code (e.g. `PA-PHL`) for a
/// locality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Jurisdiction {
    Federal,
    State(StateCode),
    Local(String),
}

impl Jurisdiction {
    pub const FEDERAL_CODE: &'static str = "US";

    pub fn parse(code: &str) -> Self {
        let trimmed = code.trim();
        if trimmed.eq_ignore_ascii_case(Self::FEDERAL_CODE) || trimmed.eq_ignore_ascii_case("FED") {
            return Self::Federal;
        }
        match StateCode::parse(trimmed) {
            Some(state) => Self::State(state),
            None => Self::Local(trimmed.to_ascii_uppercase()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Self::Federal => Self::FEDERAL_CODE,
            Self::State(state) => state.as_str(),
            Self::Local(code) => code,
        }
    }
}

impl From<StateCode> for Jurisdiction {
    fn from(state: StateCode) -> Self {
        Self::State(state)
    }
}

impl From<String> for Jurisdiction {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<Jurisdiction> for String {
    fn from(jurisdiction: Jurisdiction) -> Self {
        jurisdiction.code().to_string()
    }
}

impl std::fmt::Display for Jurisdiction {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.write_str(self.code())
    }
}
