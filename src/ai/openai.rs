//! OpenAI-compatible chat-completions client for the three AI collaborators.
//!
//! Each flow sends a system prompt that pins the output to a JSON object,
//! then parses the assistant message content into the typed output structs.

use serde_json::Value;
use tracing::{debug, info};

use super::{
    AdaptedStyle, AiError, AiFuture, EmpatheticReply, ReplyContext, TherapyModel,
    TherapyRecommendation,
};
use crate::session::profile::UserProfile;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Shared persona instructions for every flow.
const PERSONA: &str = "You are EmpathyAI, a warm, professional therapy companion. \
Use British English with appropriate medical terminology. Draw on CBT, IPT, and \
grief-counselling techniques as the user's situation calls for.";

/// HTTP client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiTherapyModel {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiTherapyModel {
    pub fn new(api_key: &str, base_url: Option<&str>, model: Option<&str>) -> Self {
        Self {
            api_key: api_key.to_string(),
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: model.unwrap_or(DEFAULT_MODEL).to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// POST one chat completion and return the assistant message parsed as JSON.
    async fn chat_json(&self, system: &str, user: String) -> Result<Value, AiError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "response_format": { "type": "json_object" },
        });

        let url = format!("{}/chat/completions", self.base_url);
        debug!(url = %url, model = %self.model, "Chat completion request");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AiError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(AiError::from_status(status.as_u16(), text));
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| AiError::InvalidResponse(format!("response body: {}", e)))?;

        extract_message_json(&json)
    }
}

/// Pull `choices[0].message.content` out of a completion response and parse
/// it as a JSON object.
fn extract_message_json(completion: &Value) -> Result<Value, AiError> {
    let content = completion["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| AiError::InvalidResponse("missing message content".into()))?;
    serde_json::from_str(content)
        .map_err(|e| AiError::InvalidResponse(format!("message content is not JSON: {}", e)))
}

fn profile_summary(profile: &UserProfile) -> String {
    format!(
        "Age: {}\nGender identity: {}\nEthnicity: {}\nVulnerability score (0-10): {}\n\
         Anxiety level: {}\nBreakup type: {}\nBackground: {}",
        profile.age,
        profile.gender_identity,
        profile.ethnicity,
        profile.vulnerable_score,
        profile.anxiety_level,
        profile.breakup_type,
        profile.background,
    )
}

impl TherapyModel for OpenAiTherapyModel {
    fn personalize(&self, profile: &UserProfile) -> AiFuture<'_, TherapyRecommendation> {
        let user = format!(
            "Produce personalised therapy recommendations for this profile:\n\n{}",
            profile_summary(profile)
        );
        Box::pin(async move {
            let system = format!(
                "{} Reply with a JSON object: {{\"recommendations\": string, \
                 \"identifiedTherapeuticNeeds\": string[]}}. The recommendations are \
                 2-3 short paragraphs; the needs are 2-4 concise focus areas.",
                PERSONA
            );
            let json = self.chat_json(&system, user).await?;
            let out: TherapyRecommendation = serde_json::from_value(json)
                .map_err(|e| AiError::InvalidResponse(format!("recommendation shape: {}", e)))?;
            info!(needs = out.identified_therapeutic_needs.len(), "Personalization complete");
            Ok(out)
        })
    }

    fn adapt_style(
        &self,
        profile: &UserProfile,
        additional_context: &str,
    ) -> AiFuture<'_, AdaptedStyle> {
        let user = format!(
            "Describe how you will adapt your language and therapeutic techniques \
             for this person.\n\n{}\n\nAdditional context: {}",
            profile_summary(profile),
            additional_context
        );
        Box::pin(async move {
            let system = format!(
                "{} Reply with a JSON object: {{\"adaptedLanguage\": string}} — one \
                 short paragraph describing the communication style and techniques \
                 you will use.",
                PERSONA
            );
            let json = self.chat_json(&system, user).await?;
            serde_json::from_value(json)
                .map_err(|e| AiError::InvalidResponse(format!("adapted style shape: {}", e)))
        })
    }

    fn respond(&self, context: &ReplyContext) -> AiFuture<'_, EmpatheticReply> {
        let payload = serde_json::to_string(context).unwrap_or_default();
        Box::pin(async move {
            let system = format!(
                "{} You receive the session context as JSON: profile fields, the \
                 user's current message, your current empathy level (0-5), and up \
                 to the last four transcript entries. Reply with a JSON object: \
                 {{\"response\": string, \"detectedSentiment\": string, \
                 \"updatedEmpathyLevel\": integer}}. Keep the response to a few \
                 sentences; raise the empathy level gradually as rapport builds.",
                PERSONA
            );
            let json = self.chat_json(&system, payload).await?;
            serde_json::from_value(json)
                .map_err(|e| AiError::InvalidResponse(format!("reply shape: {}", e)))
        })
    }
}
