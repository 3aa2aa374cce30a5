//! Conversation types shared by prompt assembly and the model transport.
//!
//! The serialized shape matches the chat-completions wire format, so a
//! `Message` can be embedded in a request payload as-is.

use serde::{Deserialize, Serialize};

/// Speaker of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// Inline image reference. `url` holds a `data:` URI produced by the image codec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// One ordered part of a message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image(data_uri: impl Into<String>) -> Self {
        Self::ImageUrl {
            image_url: ImageUrl {
                url: data_uri.into(),
            },
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::ImageUrl { .. } => None,
        }
    }
}

/// A single conversation message sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentPart>,
}

impl Message {
    pub fn user(content: Vec<ContentPart>) -> Self {
        Self {
            role: Role::User,
            content,
        }
    }

    /// Empty system message placed in front of every request.
    pub fn empty_system() -> Self {
        Self {
            role: Role::System,
            content: vec![ContentPart::text("")],
        }
    }

    /// Concatenated text parts, in order.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentPart::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Image URLs attached to this message, in order.
    pub fn image_urls(&self) -> Vec<&str> {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::ImageUrl { image_url } => Some(image_url.url.as_str()),
                ContentPart::Text { .. } => None,
            })
            .collect()
    }
}
