//! Per-user conversation state

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::transcript::{FileReference, Transcript};

/// A file the user uploaded in this session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    /// File name as uploaded
    pub name: String,
    /// Remote id returned by the upload
    pub remote_id: String,
    /// Local copy of the contents
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    /// Reference suitable for a transcript part
    pub fn reference(&self) -> FileReference {
        FileReference::remote(&self.name, &self.remote_id)
    }
}

/// One conversation, owned by the hosting layer and lent to the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    id: String,
    assistant_id: String,
    pub(crate) thread_id: Option<String>,
    pub(crate) transcript: Transcript,
    pub(crate) uploaded_files: Vec<UploadedFile>,
    /// Id of the last remote message already reflected in the transcript
    #[serde(skip)]
    pub(crate) message_cursor: Option<String>,
    /// Run started on the thread that has not been seen reaching a terminal status
    #[serde(skip)]
    pub(crate) active_run: Option<String>,
    #[serde(skip)]
    pub(crate) file_cache: HashMap<String, Vec<u8>>,
}

impl Session {
    /// Create an empty session bound to an assistant
    pub fn new(id: impl Into<String>, assistant_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            assistant_id: assistant_id.into(),
            thread_id: None,
            transcript: Transcript::new(),
            uploaded_files: Vec::new(),
            message_cursor: None,
            active_run: None,
            file_cache: HashMap::new(),
        }
    }

    /// Session token
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Assistant runs are started against
    pub fn assistant_id(&self) -> &str {
        &self.assistant_id
    }

    /// Remote thread, once the first turn created it
    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    /// Displayed conversation
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Run still outstanding on the thread, if any
    pub fn active_run(&self) -> Option<&str> {
        self.active_run.as_deref()
    }

    /// Files uploaded so far
    pub fn uploaded_files(&self) -> &[UploadedFile] {
        &self.uploaded_files
    }

    /// Whether bytes for a remote file are held locally
    pub fn is_cached(&self, remote_id: &str) -> bool {
        self.file_cache.contains_key(remote_id)
            || self.uploaded_files.iter().any(|f| f.remote_id == remote_id)
    }

    /// Locally held bytes for a remote file
    pub fn cached_bytes(&self, remote_id: &str) -> Option<&[u8]> {
        self.file_cache
            .get(remote_id)
            .map(Vec::as_slice)
            .or_else(|| {
                self.uploaded_files
                    .iter()
                    .find(|f| f.remote_id == remote_id)
                    .map(|f| f.bytes.as_slice())
            })
    }

    /// Name of a file referenced anywhere in the transcript
    pub fn file_name(&self, remote_id: &str) -> Option<&str> {
        self.transcript
            .entries()
            .iter()
            .flat_map(|e| e.files())
            .find(|f| f.remote_id.as_deref() == Some(remote_id))
            .map(|f| f.name.as_str())
    }

    /// Discard thread, transcript and files, keeping the token and assistant
    pub fn reset(self) -> Self {
        Self::new(self.id, self.assistant_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentPart, Role};

    #[test]
    fn test_new_session_is_empty() {
        let session = Session::new("s-1", "asst-1");
        assert_eq!(session.id(), "s-1");
        assert_eq!(session.assistant_id(), "asst-1");
        assert!(session.thread_id().is_none());
        assert!(session.transcript().is_empty());
    }

    #[test]
    fn test_reset_keeps_identity() {
        let mut session = Session::new("s-1", "asst-1");
        session.thread_id = Some("thread-1".into());
        session
            .transcript
            .append(Role::User, vec![ContentPart::text("hi")], None);
        session.file_cache.insert("file-1".into(), vec![1, 2, 3]);
        session.active_run = Some("run-1".into());

        let session = session.reset();
        assert!(session.active_run().is_none());
        assert_eq!(session.id(), "s-1");
        assert!(session.thread_id().is_none());
        assert_eq!(session.transcript().len(), 0);
        assert!(!session.is_cached("file-1"));
    }

    #[test]
    fn test_uploaded_bytes_count_as_cached() {
        let mut session = Session::new("s-1", "asst-1");
        session.uploaded_files.push(UploadedFile {
            name: "data.csv".into(),
            remote_id: "file-1".into(),
            bytes: b"a,b\n1,2\n".to_vec(),
        });
        assert!(session.is_cached("file-1"));
        assert_eq!(session.cached_bytes("file-1"), Some(&b"a,b\n1,2\n"[..]));
    }
}
