//! Entry types for the conversation log handed over by the host.
//!
//! Entries are the immutable units of conversation the host delivers on each
//! turn-completion and compaction-request event. Five roles form a closed
//! set: human, agent, tool call, tool result, and prior summary. Each uses
//! content appropriate to that role and is matched exhaustively during
//! segmentation instead of probed structurally.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::EntryId;

// ─────────────────────────────────────────────────────────────────────────────
// Content
// ─────────────────────────────────────────────────────────────────────────────

/// One part of a structured entry body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    /// Plain text.
    #[serde(rename = "text")]
    Text {
        /// The text itself.
        text: String,
    },
    /// Binary media the engine cannot carry; rendered as a placeholder.
    #[serde(rename = "media")]
    Media {
        /// MIME type of the original attachment.
        #[serde(rename = "mediaType")]
        media_type: String,
    },
}

/// Body of an entry: either a plain string or structured parts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntryContent {
    /// Simple text.
    Text(String),
    /// Structured content parts.
    Parts(Vec<ContentPart>),
}

impl EntryContent {
    /// Flatten to plain text. Media parts become `[media: <type>]` placeholders.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text { text } => text.clone(),
                    ContentPart::Media { media_type } => format!("[media: {media_type}]"),
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

impl From<&str> for EntryContent {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<String> for EntryContent {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Entry kinds
// ─────────────────────────────────────────────────────────────────────────────

/// Entry payload, discriminated by the `role` tag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role")]
pub enum EntryKind {
    /// Human-originated message.
    #[serde(rename = "human")]
    Human {
        /// Message body.
        content: EntryContent,
    },
    /// Agent (model) text output.
    #[serde(rename = "agent")]
    Agent {
        /// Message body.
        content: EntryContent,
    },
    /// Tool invocation emitted by the agent.
    #[serde(rename = "toolCall")]
    ToolCall {
        /// Invocation ID the result will answer to.
        #[serde(rename = "callId")]
        call_id: String,
        /// Tool name.
        name: String,
        /// Tool arguments (JSON object).
        arguments: Map<String, Value>,
    },
    /// Result answering a prior tool invocation.
    #[serde(rename = "toolResult")]
    ToolResult {
        /// ID of the invocation this result answers.
        #[serde(rename = "callId")]
        call_id: String,
        /// Result body.
        content: EntryContent,
        /// Whether the tool execution errored.
        #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
    /// Compressed history injected by an earlier compaction round.
    #[serde(rename = "summary")]
    Summary {
        /// Summary body.
        content: EntryContent,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Entry
// ─────────────────────────────────────────────────────────────────────────────

/// One immutable unit of conversation, as delivered by the host.
///
/// The ID is host-assigned and stable for the lifetime of the session; it is
/// what the compaction handler returns as a resume marker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Host-assigned identifier.
    pub id: EntryId,
    /// Role-discriminated payload.
    #[serde(flatten)]
    pub kind: EntryKind,
}

impl Entry {
    /// Create a human entry from plain text.
    #[must_use]
    pub fn human(id: impl Into<EntryId>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: EntryKind::Human {
                content: EntryContent::Text(text.into()),
            },
        }
    }

    /// Create an agent entry from plain text.
    #[must_use]
    pub fn agent(id: impl Into<EntryId>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: EntryKind::Agent {
                content: EntryContent::Text(text.into()),
            },
        }
    }

    /// Create a tool call entry.
    #[must_use]
    pub fn tool_call(
        id: impl Into<EntryId>,
        call_id: impl Into<String>,
        name: impl Into<String>,
        arguments: Map<String, Value>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: EntryKind::ToolCall {
                call_id: call_id.into(),
                name: name.into(),
                arguments,
            },
        }
    }

    /// Create a tool result entry from plain text.
    #[must_use]
    pub fn tool_result(
        id: impl Into<EntryId>,
        call_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: EntryKind::ToolResult {
                call_id: call_id.into(),
                content: EntryContent::Text(text.into()),
                is_error: None,
            },
        }
    }

    /// Create a prior-summary entry from plain text.
    #[must_use]
    pub fn summary(id: impl Into<EntryId>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: EntryKind::Summary {
                content: EntryContent::Text(text.into()),
            },
        }
    }

    /// Returns `true` if this is a human entry.
    #[must_use]
    pub fn is_human(&self) -> bool {
        matches!(self.kind, EntryKind::Human { .. })
    }

    /// Returns `true` if this is a tool call entry.
    #[must_use]
    pub fn is_tool_call(&self) -> bool {
        matches!(self.kind, EntryKind::ToolCall { .. })
    }

    /// Returns `true` if this is a tool result entry.
    #[must_use]
    pub fn is_tool_result(&self) -> bool {
        matches!(self.kind, EntryKind::ToolResult { .. })
    }

    /// Returns `true` if this is a tool call or tool result entry.
    ///
    /// Tool traffic must never straddle a block boundary; the segmenter
    /// treats contiguous runs of it as one atomic unit.
    #[must_use]
    pub fn is_tool_traffic(&self) -> bool {
        self.is_tool_call() || self.is_tool_result()
    }

    /// Short role name for logging.
    #[must_use]
    pub fn role_name(&self) -> &'static str {
        match self.kind {
            EntryKind::Human { .. } => "human",
            EntryKind::Agent { .. } => "agent",
            EntryKind::ToolCall { .. } => "toolCall",
            EntryKind::ToolResult { .. } => "toolResult",
            EntryKind::Summary { .. } => "summary",
        }
    }

    /// Deterministic labeled rendering of this entry.
    ///
    /// This is the text every downstream consumer sees: segmentation budgets,
    /// content hashing, raw archiving, and compression input all operate on
    /// the same rendering. Each entry renders with a role label and ends with
    /// a blank line, so concatenating renderings reproduces the span.
    #[must_use]
    pub fn render(&self) -> String {
        match &self.kind {
            EntryKind::Human { content } => format!("**User:**\n{}\n\n", content.to_text()),
            EntryKind::Agent { content } => {
                format!("**Assistant:**\n{}\n\n", content.to_text())
            }
            EntryKind::ToolCall {
                name, arguments, ..
            } => {
                let args = Value::Object(arguments.clone()).to_string();
                format!("[Tool: {name} - {args}]\n\n")
            }
            EntryKind::ToolResult {
                content, is_error, ..
            } => {
                if is_error.unwrap_or(false) {
                    format!("[Result (error): {}]\n\n", content.to_text())
                } else {
                    format!("[Result: {}]\n\n", content.to_text())
                }
            }
            EntryKind::Summary { content } => {
                format!("**Summary:**\n{}\n\n", content.to_text())
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn human_serde_uses_role_tag() {
        let entry = Entry::human("e1", "hello");
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["role"], "human");
        assert_eq!(value["id"], "e1");
        assert_eq!(value["content"], "hello");
    }

    #[test]
    fn tool_result_serde_uses_camel_case() {
        let entry = Entry::tool_result("e2", "call-1", "ok");
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["role"], "toolResult");
        assert_eq!(value["callId"], "call-1");
        assert!(value.get("isError").is_none());
    }

    #[test]
    fn deserializes_plain_text_content() {
        let entry: Entry =
            serde_json::from_value(json!({"id": "e3", "role": "agent", "content": "done"}))
                .unwrap();
        assert_eq!(entry.role_name(), "agent");
    }

    #[test]
    fn deserializes_part_list_content() {
        let entry: Entry = serde_json::from_value(json!({
            "id": "e4",
            "role": "human",
            "content": [
                {"type": "text", "text": "look at this"},
                {"type": "media", "mediaType": "image/png"}
            ]
        }))
        .unwrap();
        let EntryKind::Human { content } = &entry.kind else {
            panic!("expected human entry");
        };
        assert_eq!(content.to_text(), "look at this\n[media: image/png]");
    }

    #[test]
    fn render_labels_roles() {
        let human = Entry::human("e1", "question");
        assert_eq!(human.render(), "**User:**\nquestion\n\n");

        let agent = Entry::agent("e2", "answer");
        assert_eq!(agent.render(), "**Assistant:**\nanswer\n\n");
    }

    #[test]
    fn render_tool_call_includes_arguments() {
        let mut args = Map::new();
        let _ = args.insert("path".to_owned(), json!("/tmp/a.txt"));
        let entry = Entry::tool_call("e5", "call-1", "read_file", args);
        assert_eq!(
            entry.render(),
            "[Tool: read_file - {\"path\":\"/tmp/a.txt\"}]\n\n"
        );
    }

    #[test]
    fn render_marks_errored_results() {
        let entry = Entry {
            id: EntryId::from("e6"),
            kind: EntryKind::ToolResult {
                call_id: "call-1".to_owned(),
                content: EntryContent::from("boom"),
                is_error: Some(true),
            },
        };
        assert_eq!(entry.render(), "[Result (error): boom]\n\n");
    }

    #[test]
    fn tool_traffic_classification() {
        let mut args = Map::new();
        let _ = args.insert("cmd".to_owned(), json!("ls"));
        assert!(Entry::tool_call("a", "c1", "bash", args).is_tool_traffic());
        assert!(Entry::tool_result("b", "c1", "ok").is_tool_traffic());
        assert!(!Entry::human("c", "hi").is_tool_traffic());
        assert!(!Entry::summary("d", "earlier").is_tool_traffic());
    }
}
