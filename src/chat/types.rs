//! Wire types for the Gemini `generateContent` API

use serde::{Deserialize, Serialize};

/// One turn of conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// A piece of content; only text parts are produced or consumed here
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Content {
    fn with_role(role: Option<&str>, text: &str) -> Self {
        Self {
            role: role.map(ToString::to_string),
            parts: vec![Part {
                text: Some(text.to_string()),
            }],
        }
    }

    /// System instruction content (no role)
    #[must_use]
    pub fn system(text: &str) -> Self {
        Self::with_role(None, text)
    }

    /// User turn
    #[must_use]
    pub fn user(text: &str) -> Self {
        Self::with_role(Some("user"), text)
    }

    /// Model turn
    #[must_use]
    pub fn model(text: &str) -> Self {
        Self::with_role(Some("model"), text)
    }

    /// Concatenated text of all parts
    #[must_use]
    pub fn text(&self) -> String {
        self.parts.iter().filter_map(|p| p.text.as_deref()).collect()
    }
}

/// Tool declaration attached to a request
#[derive(Debug, Clone, Default, Serialize)]
pub struct Tool {
    pub google_search: GoogleSearch,
}

/// Grounding with Google Search; carries no options
#[derive(Debug, Clone, Default, Serialize)]
pub struct GoogleSearch {}

/// Request body for `streamGenerateContent`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest<'a> {
    pub system_instruction: &'a Content,
    pub contents: &'a [Content],
    #[serde(skip_serializing_if = "no_tools")]
    pub tools: &'a [Tool],
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn no_tools(tools: &&[Tool]) -> bool {
    tools.is_empty()
}

/// One streamed response event
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Error object the API may send in place of a response
#[derive(Debug, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: Option<String>,
}

impl GenerateContentResponse {
    /// Text of the first candidate, if any
    #[must_use]
    pub fn text(&self) -> Option<String> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(Content::text)
            .filter(|t| !t.is_empty())
    }
}
