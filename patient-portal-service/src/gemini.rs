use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::Client;
use rig::client::CompletionClient;
use rig::completion::{Chat, Message};
use rig::providers::gemini;
use serde_json::{Value, json};
use tracing::info;

use portal_core::{AiGateway, GatewayError, Speaker, Turn};

pub const GEMINI_MODEL: &str = "gemini-2.5-flash";

const GENERATE_CONTENT_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models";

const SYSTEM_PROMPT: &str = r#"You are a medical AI assistant for a patient portal.
Your goal is to gather information from the patient to prepare a summary for the doctor.

RULES:
1. Be empathetic, professional, and clear.
2. When a patient describes symptoms, ask one or two relevant follow-up questions.
3. DO NOT provide a medical diagnosis. Say "This sounds like something the doctor should review." instead.
4. When the patient asks for a summary (types SUMMARIZE), stop chatting and output a STRICT JSON object
   with exactly these keys: chief_complaint, symptoms, duration, severity, aggravating_factors,
   alleviating_factors, medications, allergies, past_medical_history, priority_score, summary_note.
   priority_score is an integer from 1 (routine) to 10 (emergency). Use "N/A" for anything unknown.
   Output only the JSON object, without markdown fences."#;

const TRANSCRIPTION_PROMPT: &str =
    "Listen to this audio and transcribe exactly what is said. Return only the transcript text.";

/// Gemini-backed [`AiGateway`]. Conversational replies go through a rig agent;
/// transcription posts inline base64 audio straight to the REST API, which rig
/// has no surface for.
pub struct GeminiGateway {
    api_key: String,
    http: Client,
}

impl GeminiGateway {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            http: Client::new(),
        }
    }
}

fn to_rig_history(history: &[Turn]) -> Vec<Message> {
    history
        .iter()
        .map(|turn| match turn.sender {
            Speaker::Patient => Message::user(turn.text.clone()),
            Speaker::Assistant => Message::assistant(turn.text.clone()),
        })
        .collect()
}

/// The rig error chain does not expose the HTTP status directly, so transient
/// overload is recognized from the provider's error text.
fn classify(message: String) -> GatewayError {
    let lowered = message.to_lowercase();
    if lowered.contains("503")
        || lowered.contains("429")
        || lowered.contains("overloaded")
        || lowered.contains("unavailable")
        || lowered.contains("resource has been exhausted")
    {
        GatewayError::Overloaded(message)
    } else {
        GatewayError::Request(message)
    }
}

#[async_trait]
impl AiGateway for GeminiGateway {
    async fn generate_reply(
        &self,
        history: &[Turn],
        new_message: &str,
    ) -> Result<String, GatewayError> {
        let client = gemini::Client::new(&self.api_key);
        let agent = client
            .agent(GEMINI_MODEL)
            .preamble(SYSTEM_PROMPT)
            .temperature(0.7)
            .build();

        let chat_history = to_rig_history(history);
        info!(turns = chat_history.len(), "requesting assistant reply");
        agent
            .chat(new_message, chat_history)
            .await
            .map_err(|err| classify(err.to_string()))
    }

    async fn transcribe(&self, audio: &[u8], mime_type: &str) -> Result<String, GatewayError> {
        let body = json!({
            "contents": [{
                "parts": [
                    { "text": TRANSCRIPTION_PROMPT },
                    {
                        "inline_data": {
                            "mime_type": mime_type,
                            "data": STANDARD.encode(audio)
                        }
                    }
                ]
            }]
        });

        let response = self
            .http
            .post(format!(
                "{GENERATE_CONTENT_URL}/{GEMINI_MODEL}:generateContent?key={}",
                self.api_key
            ))
            .json(&body)
            .send()
            .await
            .map_err(|err| GatewayError::Request(err.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::SERVICE_UNAVAILABLE
            || status == reqwest::StatusCode::TOO_MANY_REQUESTS
        {
            return Err(GatewayError::Overloaded(format!(
                "transcription returned {status}"
            )));
        }
        if !status.is_success() {
            return Err(GatewayError::Request(format!(
                "transcription returned {status}"
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|err| GatewayError::MalformedResponse(err.to_string()))?;

        payload["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(|text| text.trim().to_string())
            .ok_or_else(|| {
                GatewayError::MalformedResponse("no text in transcription response".to_string())
            })
    }
}
