use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: MessageContent::Text(text.into()),
        }
    }

    /// User turn carrying an inline base64 image plus an instruction text.
    pub fn user_with_image(image_data_uri: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: MessageContent::Parts(vec![
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image_data_uri.into(),
                    },
                },
                ContentPart::Text { text: text.into() },
            ]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Per-call settings: which model, sampling, and how long to wait.
#[derive(Debug, Clone)]
pub struct CallConfig {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl From<&crate::config::ModelEntry> for CallConfig {
    fn from(entry: &crate::config::ModelEntry) -> Self {
        Self {
            model: entry.model.clone(),
            temperature: entry.temperature,
            max_tokens: entry.max_tokens,
            timeout: Duration::from_secs(entry.timeout_secs),
        }
    }
}
