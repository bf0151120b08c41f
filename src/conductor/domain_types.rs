//! Domain types for the Agent-to-Agent Conductor (spec §4.5)

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain_types::Provider;

/// Sender or recipient of an [`AgentMessage`]: either the conductor itself, initiating a turn,
/// or one of the provider agents participating in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "provider", rename_all = "snake_case")]
pub enum Participant {
    Orchestrator,
    Agent(Provider),
}

impl std::fmt::Display for Participant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Orchestrator => write!(f, "orchestrator"),
            Self::Agent(p) => write!(f, "{p}"),
        }
    }
}

/// Discriminator for [`AgentMessage`], replacing the original's inheritance tree of
/// dataclass-style messages with a single tagged sum (§9's design note).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Query,
    Response,
    ConsensusRequest,
    Validation,
    Completion,
    Error,
}

/// One message exchanged between the conductor and a provider agent, or between two agents via
/// the conductor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    pub message_id: Uuid,
    pub from_agent: Participant,
    pub to_agent: Participant,
    pub message_type: MessageType,
    pub content: String,
    pub conversation_id: String,
    pub context: HashMap<String, Value>,
    pub iteration: u32,
    pub max_iterations: u32,
    pub confidence_score: f64,
    pub timestamp: DateTime<Utc>,
    pub metadata: HashMap<String, Value>,
}

impl AgentMessage {
    #[must_use]
    pub fn new(
        from_agent: Participant,
        to_agent: Participant,
        message_type: MessageType,
        content: impl Into<String>,
        conversation_id: impl Into<String>,
        iteration: u32,
        max_iterations: u32,
    ) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            from_agent,
            to_agent,
            message_type,
            content: content.into(),
            conversation_id: conversation_id.into(),
            context: HashMap::new(),
            iteration,
            max_iterations,
            confidence_score: 0.0,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_context(mut self, context: HashMap<String, Value>) -> Self {
        self.context = context;
        self
    }
}

/// Which next-recipient rule a [`crate::conductor::patterns::Conductor::multi_turn_conversation`]
/// run follows (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommunicationPattern {
    /// Each response is fed back to the *other* participant.
    Sequential,
    /// The recipient alternates between the two participants regardless of sender.
    Collaborative,
}

/// One agent's answer within a [`ConsensusResult`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndividualResponse {
    pub agent: String,
    pub content: String,
    pub confidence: f64,
}

/// Result of [`crate::conductor::patterns::Conductor::parallel_consensus`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub question: String,
    pub consensus: String,
    pub individual_responses: Vec<IndividualResponse>,
    pub confidence_score: f64,
    pub conversation_id: String,
}

/// One round of [`crate::conductor::patterns::Conductor::iterative_improvement`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationLogEntry {
    pub iteration: u32,
    pub improvement: String,
    pub validation: String,
    pub confidence: f64,
}

/// Result of [`crate::conductor::patterns::Conductor::iterative_improvement`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterativeImprovementResult {
    pub final_content: String,
    pub final_confidence: f64,
    pub iterations: Vec<IterationLogEntry>,
    pub conversation_id: String,
}

/// One agent's verdict within a [`ValidationResult`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub agent: Provider,
    pub success: bool,
    pub content: String,
    pub verdict: Verdict,
    pub critical_issues: bool,
    pub latency_ms: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Validated,
    NotValidated,
}

/// Result of [`crate::conductor::validation::validate_implementation`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub validated: bool,
    pub rolled_back: bool,
    pub validations: Vec<ValidationSummary>,
}
