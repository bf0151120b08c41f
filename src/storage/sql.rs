//! Pure SQL string constants for the conversation memory store.
//!
//! Table creation is handled by the migration system (`migrations/001_create_conversation_messages.sql`,
//! `migrations/002_create_conductor_events.sql`), run by [`crate::database::DatabaseConnection::initialize`].

pub const INSERT_MESSAGE: &str = r"
INSERT OR REPLACE INTO conversation_messages (
    message_id, conversation_id, from_agent, to_agent, message_type, content,
    context_json, iteration, max_iterations, confidence_score, timestamp_utc,
    metadata_json, sequence
) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?);
";

pub const SELECT_CONVERSATION: &str = r"
SELECT message_id, conversation_id, from_agent, to_agent, message_type, content,
       context_json, iteration, max_iterations, confidence_score, timestamp_utc,
       metadata_json
FROM conversation_messages
WHERE conversation_id = ?
ORDER BY sequence ASC;
";

pub const MAX_SEQUENCE_FOR_CONVERSATION: &str = r"
SELECT COALESCE(MAX(sequence), -1) FROM conversation_messages WHERE conversation_id = ?;
";

pub const DELETE_CONVERSATION: &str = r"
DELETE FROM conversation_messages WHERE conversation_id = ?;
";

pub const INSERT_EVENT: &str = r"
INSERT INTO conductor_events (event_name, payload_json, recorded_at_utc) VALUES (?, ?, ?);
";
