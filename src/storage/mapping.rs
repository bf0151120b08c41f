//! Row ⇄ domain type conversions for the conversation memory store.
//!
//! Pure functions only — no I/O. [`crate::storage::sqlite_store`] calls these to turn
//! `sqlx::Row`s into [`AgentMessage`]s and back, keeping the conversion logic testable without
//! a database.

use chrono::{DateTime, Utc};

use crate::conductor::domain_types::{AgentMessage, MessageType, Participant};
use crate::domain_types::Provider;

/// Errors produced while mapping a stored row back into an [`AgentMessage`]. Distinct from
/// I/O errors, which are `sqlx::Error` and handled at the call site.
#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("unknown participant: {0}")]
    UnknownParticipant(String),
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),
    #[error("invalid context/metadata JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

/// Stable string form of a [`Participant`], used as a SQL column value.
#[must_use]
pub fn participant_to_str(p: Participant) -> String {
    match p {
        Participant::Orchestrator => "orchestrator".to_string(),
        Participant::Agent(provider) => provider.as_str().to_string(),
    }
}

/// Parses the string form written by [`participant_to_str`].
pub fn participant_from_str(s: &str) -> Result<Participant, MappingError> {
    if s == "orchestrator" {
        return Ok(Participant::Orchestrator);
    }
    let provider = match s {
        "deepseek" => Provider::DeepSeek,
        "perplexity" => Provider::Perplexity,
        "qwen" => Provider::Qwen,
        "openai" => Provider::OpenAi,
        "anthropic" => Provider::Anthropic,
        "ollama" => Provider::Ollama,
        other => return Err(MappingError::UnknownParticipant(other.to_string())),
    };
    Ok(Participant::Agent(provider))
}

/// Stable string form of a [`MessageType`].
#[must_use]
pub fn message_type_to_str(t: MessageType) -> &'static str {
    match t {
        MessageType::Query => "query",
        MessageType::Response => "response",
        MessageType::ConsensusRequest => "consensus_request",
        MessageType::Validation => "validation",
        MessageType::Completion => "completion",
        MessageType::Error => "error",
    }
}

/// Parses the string form written by [`message_type_to_str`].
pub fn message_type_from_str(s: &str) -> Result<MessageType, MappingError> {
    Ok(match s {
        "query" => MessageType::Query,
        "response" => MessageType::Response,
        "consensus_request" => MessageType::ConsensusRequest,
        "validation" => MessageType::Validation,
        "completion" => MessageType::Completion,
        "error" => MessageType::Error,
        other => return Err(MappingError::UnknownMessageType(other.to_string())),
    })
}

/// One flattened row of `conversation_messages`, ready for bind parameters or produced by a
/// `sqlx::Row` read. Keeping this as a plain struct lets the conversion to/from
/// [`AgentMessage`] be tested without touching `sqlx`.
pub struct MessageRow {
    pub message_id: String,
    pub conversation_id: String,
    pub from_agent: String,
    pub to_agent: String,
    pub message_type: String,
    pub content: String,
    pub context_json: String,
    pub iteration: i64,
    pub max_iterations: i64,
    pub confidence_score: f64,
    pub timestamp_utc: String,
    pub metadata_json: String,
}

/// Converts a domain [`AgentMessage`] into its row form, pairing it with the monotonic
/// `sequence` the caller assigns (arrival order within the conversation).
#[must_use]
pub fn message_to_row(message: &AgentMessage) -> MessageRow {
    MessageRow {
        message_id: message.message_id.to_string(),
        conversation_id: message.conversation_id.clone(),
        from_agent: participant_to_str(message.from_agent),
        to_agent: participant_to_str(message.to_agent),
        message_type: message_type_to_str(message.message_type).to_string(),
        content: message.content.clone(),
        context_json: serde_json::to_string(&message.context).unwrap_or_default(),
        iteration: i64::from(message.iteration),
        max_iterations: i64::from(message.max_iterations),
        confidence_score: message.confidence_score,
        timestamp_utc: message.timestamp.to_rfc3339(),
        metadata_json: serde_json::to_string(&message.metadata).unwrap_or_default(),
    }
}

/// Converts a stored row back into an [`AgentMessage`].
///
/// # Errors
///
/// Returns [`MappingError`] if a participant, message type, JSON blob, or timestamp fails to
/// parse — this indicates the stored row predates a schema/enum change, not a runtime bug.
pub fn row_to_message(row: &MessageRow) -> Result<AgentMessage, MappingError> {
    let message_id = uuid::Uuid::parse_str(&row.message_id)
        .map_err(|e| MappingError::InvalidTimestamp(e.to_string()))?;
    let timestamp: DateTime<Utc> = DateTime::parse_from_rfc3339(&row.timestamp_utc)
        .map_err(|e| MappingError::InvalidTimestamp(e.to_string()))?
        .with_timezone(&Utc);

    Ok(AgentMessage {
        message_id,
        from_agent: participant_from_str(&row.from_agent)?,
        to_agent: participant_from_str(&row.to_agent)?,
        message_type: message_type_from_str(&row.message_type)?,
        content: row.content.clone(),
        conversation_id: row.conversation_id.clone(),
        context: serde_json::from_str(&row.context_json)?,
        iteration: u32::try_from(row.iteration).unwrap_or(0),
        max_iterations: u32::try_from(row.max_iterations).unwrap_or(0),
        confidence_score: row.confidence_score,
        timestamp,
        metadata: serde_json::from_str(&row.metadata_json)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conductor::domain_types::AgentMessage;

    #[test]
    fn participant_round_trips() {
        for p in [
            Participant::Orchestrator,
            Participant::Agent(Provider::DeepSeek),
            Participant::Agent(Provider::Anthropic),
        ] {
            let s = participant_to_str(p);
            assert_eq!(participant_from_str(&s).unwrap(), p);
        }
    }

    #[test]
    fn message_type_round_trips() {
        for t in [
            MessageType::Query,
            MessageType::Response,
            MessageType::ConsensusRequest,
            MessageType::Validation,
            MessageType::Completion,
            MessageType::Error,
        ] {
            let s = message_type_to_str(t);
            assert_eq!(message_type_from_str(s).unwrap(), t);
        }
    }

    #[test]
    fn message_round_trips_through_row() {
        let message = AgentMessage::new(
            Participant::Orchestrator,
            Participant::Agent(Provider::DeepSeek),
            MessageType::Query,
            "hello",
            "conv-1",
            0,
            5,
        );
        let row = message_to_row(&message);
        let restored = row_to_message(&row).unwrap();
        assert_eq!(restored.message_id, message.message_id);
        assert_eq!(restored.content, message.content);
        assert_eq!(restored.conversation_id, message.conversation_id);
        assert_eq!(restored.from_agent, message.from_agent);
        assert_eq!(restored.to_agent, message.to_agent);
    }

    #[test]
    fn unknown_participant_is_rejected() {
        assert!(participant_from_str("grok").is_err());
    }
}
