//! Append-only transcript of displayed conversation entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// Author of a transcript entry or remote message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The person chatting
    User,
    /// The hosted assistant
    Assistant,
}

/// Reference to a file known to the session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileReference {
    /// Display name
    pub name: String,
    /// Remote id; `None` when the upload never reached the service
    pub remote_id: Option<String>,
}

impl FileReference {
    /// Reference to a file that exists remotely
    pub fn remote(name: impl Into<String>, remote_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            remote_id: Some(remote_id.into()),
        }
    }

    /// Reference to a file that was never uploaded
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            remote_id: None,
        }
    }
}

/// One displayable piece of an entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Markdown text
    Text {
        /// Text value
        text: String,
    },
    /// Inline image (chart)
    Image {
        /// Image file
        file: FileReference,
    },
    /// Downloadable file
    File {
        /// Downloadable file
        file: FileReference,
    },
}

impl ContentPart {
    /// Text part
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    /// Text of this part, if it is text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentPart::Text { text } => Some(text),
            _ => None,
        }
    }

    /// File referenced by this part, if any
    pub fn file(&self) -> Option<&FileReference> {
        match self {
            ContentPart::Image { file } | ContentPart::File { file } => Some(file),
            ContentPart::Text { .. } => None,
        }
    }
}

/// A displayed transcript item; immutable once appended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEntry {
    seq: u64,
    role: Role,
    parts: Vec<ContentPart>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorKind>,
    created_at: DateTime<Utc>,
}

impl TranscriptEntry {
    /// Position in the transcript, starting at 1
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Author
    pub fn role(&self) -> Role {
        self.role
    }

    /// Ordered content
    pub fn parts(&self) -> &[ContentPart] {
        &self.parts
    }

    /// Error marker for synthetic failure entries
    pub fn error(&self) -> Option<ErrorKind> {
        self.error
    }

    /// Append time
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// All text parts joined with blank lines
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(ContentPart::as_text)
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Files referenced by this entry
    pub fn files(&self) -> impl Iterator<Item = &FileReference> {
        self.parts.iter().filter_map(ContentPart::file)
    }
}

/// Ordered, append-only sequence of entries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    /// Create an empty transcript
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry and return it
    pub fn append(
        &mut self,
        role: Role,
        parts: Vec<ContentPart>,
        error: Option<ErrorKind>,
    ) -> &TranscriptEntry {
        let seq = self.entries.last().map(|e| e.seq + 1).unwrap_or(1);
        self.entries.push(TranscriptEntry {
            seq,
            role,
            parts,
            error,
            created_at: Utc::now(),
        });
        &self.entries[self.entries.len() - 1]
    }

    /// All entries in order
    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    /// Most recent entry
    pub fn last(&self) -> Option<&TranscriptEntry> {
        self.entries.last()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_assigns_increasing_seq() {
        let mut transcript = Transcript::new();
        transcript.append(Role::User, vec![ContentPart::text("hi")], None);
        transcript.append(Role::Assistant, vec![ContentPart::text("hello")], None);
        let seqs: Vec<u64> = transcript.entries().iter().map(|e| e.seq()).collect();
        assert_eq!(seqs, vec![1, 2]);
    }

    #[test]
    fn test_entry_text_skips_files() {
        let mut transcript = Transcript::new();
        let entry = transcript.append(
            Role::User,
            vec![
                ContentPart::text("Summarize columns"),
                ContentPart::File {
                    file: FileReference::remote("data.csv", "file-1"),
                },
            ],
            None,
        );
        assert_eq!(entry.text(), "Summarize columns");
        assert_eq!(entry.files().count(), 1);
    }

    #[test]
    fn test_entry_serializes_for_display() {
        let mut transcript = Transcript::new();
        transcript.append(
            Role::Assistant,
            vec![ContentPart::text("boom")],
            Some(ErrorKind::RunFailed),
        );
        let json = serde_json::to_value(transcript.last().unwrap()).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["error"], "run_failed");
        assert_eq!(json["parts"][0]["type"], "text");
    }
}
