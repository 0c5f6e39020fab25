//! User profile types collected by the intake form.
//!
//! The profile is submitted once per session and never mutated afterwards.
//! Field names serialize as camelCase to match the frontend form payload.

use serde::{Deserialize, Serialize};

/// Gender identity options offered by the intake form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GenderIdentity {
    Male,
    Female,
    #[serde(rename = "Non-Binary")]
    NonBinary,
}

impl std::fmt::Display for GenderIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Male => write!(f, "Male"),
            Self::Female => write!(f, "Female"),
            Self::NonBinary => write!(f, "Non-Binary"),
        }
    }
}

/// Self-reported anxiety level (three steps on the form).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnxietyLevel {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for AnxietyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "Low"),
            Self::Medium => write!(f, "Medium"),
            Self::High => write!(f, "High"),
        }
    }
}

/// Two-step anxiety scale used for response-generation calls only.
///
/// The upstream model takes a coarser input space than the form: Medium and
/// High both collapse to High. The three-step value is kept for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiAnxietyLevel {
    Low,
    High,
}

impl From<AnxietyLevel> for ApiAnxietyLevel {
    fn from(level: AnxietyLevel) -> Self {
        match level {
            AnxietyLevel::Low => Self::Low,
            AnxietyLevel::Medium | AnxietyLevel::High => Self::High,
        }
    }
}

impl std::fmt::Display for ApiAnxietyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "Low"),
            Self::High => write!(f, "High"),
        }
    }
}

/// Breakup circumstances, as offered by the intake form (closed set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakupType {
    #[serde(rename = "Mutual")]
    Mutual,
    #[serde(rename = "Ghosted")]
    Ghosted,
    #[serde(rename = "Cheated On")]
    CheatedOn,
    #[serde(rename = "Death of Partner")]
    DeathOfPartner,
    #[serde(rename = "Divorce")]
    Divorce,
    #[serde(rename = "Grew Apart Over Time")]
    GrewApartOverTime,
    #[serde(rename = "It's Complicated")]
    ItsComplicated,
    #[serde(rename = "Mutual but Painful")]
    MutualButPainful,
    #[serde(rename = "One-sided Breakup")]
    OneSided,
    #[serde(rename = "Trust Issues")]
    TrustIssues,
    #[serde(rename = "Long-distance Relationship Ended")]
    LongDistanceEnded,
    #[serde(rename = "Parental or Family Pressure")]
    FamilyPressure,
    #[serde(rename = "Religious or Cultural Differences")]
    ReligiousOrCultural,
    #[serde(rename = "Abusive Relationship")]
    Abusive,
    #[serde(rename = "Manipulative or Controlling Partner")]
    ManipulativePartner,
    #[serde(rename = "Sudden and Unexpected Breakup")]
    SuddenAndUnexpected,
    #[serde(rename = "Breakup Due to Gender/Sexual Identity Conflict")]
    IdentityConflict,
    #[serde(rename = "Mental Health Struggles in Relationship")]
    MentalHealthStruggles,
    #[serde(rename = "Health-Related Breakup")]
    HealthRelated,
    #[serde(rename = "Financial Strain")]
    FinancialStrain,
    #[serde(rename = "Career or Relocation Conflict")]
    CareerOrRelocation,
    #[serde(rename = "Legal or Custody-related Separation")]
    LegalOrCustody,
    #[serde(rename = "First Love Ended")]
    FirstLoveEnded,
    #[serde(rename = "Breakup via Text or Social Media")]
    ViaTextOrSocialMedia,
    #[serde(rename = "Peer Pressure or Social Influence")]
    PeerPressure,
}

impl std::fmt::Display for BreakupType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Display matches the serialized form label.
        let s = serde_json::to_string(self).unwrap_or_default();
        write!(f, "{}", s.trim_matches('"'))
    }
}

/// The full intake profile, immutable for the lifetime of the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub age: u32,
    pub gender_identity: GenderIdentity,
    pub ethnicity: String,
    /// Self-assessed vulnerability, 0-10.
    pub vulnerable_score: u8,
    pub anxiety_level: AnxietyLevel,
    pub breakup_type: BreakupType,
    pub background: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anxiety_collapse() {
        assert_eq!(ApiAnxietyLevel::from(AnxietyLevel::Low), ApiAnxietyLevel::Low);
        assert_eq!(ApiAnxietyLevel::from(AnxietyLevel::Medium), ApiAnxietyLevel::High);
        assert_eq!(ApiAnxietyLevel::from(AnxietyLevel::High), ApiAnxietyLevel::High);
    }

    #[test]
    fn test_breakup_type_labels_roundtrip() {
        for label in [
            "Ghosted",
            "Cheated On",
            "It's Complicated",
            "Breakup Due to Gender/Sexual Identity Conflict",
            "Peer Pressure or Social Influence",
        ] {
            let json = format!("\"{}\"", label);
            let parsed: BreakupType = serde_json::from_str(&json).expect(label);
            assert_eq!(parsed.to_string(), label);
        }
    }

    #[test]
    fn test_profile_deserializes_camel_case() {
        let json = serde_json::json!({
            "age": 30,
            "genderIdentity": "Female",
            "ethnicity": "British",
            "vulnerableScore": 4,
            "anxietyLevel": "Medium",
            "breakupType": "Ghosted",
            "background": "Recently ghosted after two years."
        });
        let profile: UserProfile = serde_json::from_value(json).unwrap();
        assert_eq!(profile.age, 30);
        assert_eq!(profile.anxiety_level, AnxietyLevel::Medium);
        assert_eq!(profile.breakup_type, BreakupType::Ghosted);
    }
}
