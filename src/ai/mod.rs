//! AI collaborator boundary: typed inputs/outputs, an explicit error-kind
//! contract, and the `TherapyModel` trait the orchestrator drives.
//!
//! All "hard" reasoning happens on the other side of this trait; the crate
//! only sequences calls and translates results into session state.

pub mod openai;

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::session::profile::{ApiAnxietyLevel, BreakupType, GenderIdentity, UserProfile};
use crate::session::transcript::Sender;

// ---------------------------------------------------------------------------
// Collaborator outputs
// ---------------------------------------------------------------------------

/// Output of the recommendation collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TherapyRecommendation {
    pub recommendations: String,
    #[serde(default)]
    pub identified_therapeutic_needs: Vec<String>,
}

/// Output of the style-adaptation collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptedStyle {
    pub adapted_language: String,
}

/// Output of the response-generation collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmpatheticReply {
    pub response: String,
    #[serde(default)]
    pub detected_sentiment: Option<String>,
    pub updated_empathy_level: i64,
}

// ---------------------------------------------------------------------------
// Response-generation input
// ---------------------------------------------------------------------------

/// One prior transcript entry, compacted to a role/text pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Sender,
    pub text: String,
}

/// Context sent on each response-generation call.
///
/// Carries the profile with the anxiety scale collapsed to two levels
/// (Medium maps to High for this call only), the new message, the current
/// empathy level, and at most the last four transcript entries.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyContext {
    pub age: u32,
    pub gender_identity: GenderIdentity,
    pub ethnicity: String,
    pub vulnerable_score: u8,
    pub anxiety_level: ApiAnxietyLevel,
    pub breakup_type: BreakupType,
    pub background: String,
    pub current_message: String,
    pub empathy_level: i64,
    pub chat_history: Vec<HistoryEntry>,
}

// ---------------------------------------------------------------------------
// Error contract
// ---------------------------------------------------------------------------

/// Error kinds at the AI collaborator boundary.
///
/// Classification happens from HTTP status codes at the client, so callers
/// match on kinds rather than sniffing message text.
#[derive(Debug, Clone)]
pub enum AiError {
    /// The upstream service is saturated (429 / 503 / 529). Worth retrying
    /// shortly; callers show distinct wording for this case.
    Overloaded { status: u16, message: String },
    /// Invalid or missing credential (401 / 403).
    Unauthorized(String),
    /// Transport-level failure (DNS, connect, timeout).
    Network(String),
    /// Any other non-success response from the service.
    Api { status: u16, message: String },
    /// The service responded, but not with the structure we asked for.
    InvalidResponse(String),
}

impl AiError {
    /// Classify a non-success HTTP response.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            429 | 503 | 529 => Self::Overloaded { status, message },
            401 | 403 => Self::Unauthorized(message),
            _ => Self::Api { status, message },
        }
    }

    pub fn is_overloaded(&self) -> bool {
        matches!(self, Self::Overloaded { .. })
    }
}

impl std::fmt::Display for AiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Overloaded { status, message } => {
                write!(f, "AI service overloaded ({}): {}", status, message)
            }
            Self::Unauthorized(msg) => write!(f, "AI service authorization failed: {}", msg),
            Self::Network(msg) => write!(f, "AI service network error: {}", msg),
            Self::Api { status, message } => {
                write!(f, "AI service error ({}): {}", status, message)
            }
            Self::InvalidResponse(msg) => write!(f, "AI service returned invalid data: {}", msg),
        }
    }
}

impl std::error::Error for AiError {}

// ---------------------------------------------------------------------------
// TherapyModel trait
// ---------------------------------------------------------------------------

/// Boxed future alias for the dyn-compatible async methods below.
pub type AiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, AiError>> + Send + 'a>>;

/// The three AI collaborators behind one seam (dyn-compatible).
///
/// Tests substitute a scripted implementation; production uses the
/// OpenAI-compatible HTTP client in [`openai`].
pub trait TherapyModel: Send + Sync {
    /// Recommendation collaborator: therapy recommendations plus a list of
    /// identified therapeutic needs for the given profile.
    fn personalize(&self, profile: &UserProfile) -> AiFuture<'_, TherapyRecommendation>;

    /// Style-adaptation collaborator: communication style and techniques
    /// adapted to the profile and any additional free-text context.
    fn adapt_style(&self, profile: &UserProfile, additional_context: &str)
        -> AiFuture<'_, AdaptedStyle>;

    /// Response-generation collaborator: one empathetic reply for the
    /// given conversation context.
    fn respond(&self, context: &ReplyContext) -> AiFuture<'_, EmpatheticReply>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overloaded_statuses() {
        for status in [429u16, 503, 529] {
            let err = AiError::from_status(status, "busy".into());
            assert!(err.is_overloaded(), "status {} should classify as overloaded", status);
        }
    }

    #[test]
    fn test_unauthorized_statuses() {
        for status in [401u16, 403] {
            let err = AiError::from_status(status, "no".into());
            assert!(matches!(err, AiError::Unauthorized(_)));
        }
    }

    #[test]
    fn test_other_statuses_are_generic() {
        let err = AiError::from_status(500, "boom".into());
        assert!(matches!(err, AiError::Api { status: 500, .. }));
        assert!(!err.is_overloaded());
    }

    #[test]
    fn test_reply_parses_without_sentiment() {
        let json = serde_json::json!({
            "response": "I hear you.",
            "updatedEmpathyLevel": 2
        });
        let reply: EmpatheticReply = serde_json::from_value(json).unwrap();
        assert_eq!(reply.detected_sentiment, None);
        assert_eq!(reply.updated_empathy_level, 2);
    }
}
