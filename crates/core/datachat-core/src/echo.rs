//! Echo chat: repeats the user's text without touching the remote service

use crate::types::{ContentPart, Role, Session, TranscriptEntry};
use crate::{DataChatError, Result};

/// Record the user's text and an assistant entry echoing it back
pub fn echo_turn<'a>(session: &'a mut Session, text: &str) -> Result<&'a TranscriptEntry> {
    if text.trim().is_empty() {
        return Err(DataChatError::invalid_turn("Say something to echo"));
    }
    session
        .transcript
        .append(Role::User, vec![ContentPart::text(text)], None);
    Ok(session.transcript.append(
        Role::Assistant,
        vec![ContentPart::text(format!("Echo: {text}"))],
        None,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_echo_appends_pair() {
        let mut session = Session::new("s-1", "asst-1");
        let reply = echo_turn(&mut session, "hello").unwrap();
        assert_eq!(reply.text(), "Echo: hello");
        assert_eq!(reply.seq(), 2);
        assert_eq!(session.transcript().len(), 2);
    }

    #[test]
    fn test_echo_rejects_blank() {
        let mut session = Session::new("s-1", "asst-1");
        assert!(echo_turn(&mut session, " ").is_err());
        assert!(session.transcript().is_empty());
    }
}
