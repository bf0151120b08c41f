//! Agent-to-Agent Conductor (spec §4.5): conversation patterns, consensus, iterative
//! improvement, and implementation validation built on top of the Router.

pub mod confidence;
pub mod config;
pub mod domain_types;
pub mod loop_detection;
pub mod patterns;
pub mod traits;
pub mod validation;

pub use config::{ConductorConfig, MaxConversationAgeSecs};
pub use confidence::{calculate_consensus_confidence, extract_confidence_score};
pub use domain_types::{
    AgentMessage, CommunicationPattern, ConsensusResult, IndividualResponse, IterationLogEntry,
    IterativeImprovementResult, MessageType, Participant, Verdict, ValidationResult,
    ValidationSummary,
};
pub use loop_detection::{InMemoryLoopDetector, LoopDetector, RedisLoopDetector};
pub use patterns::Conductor;
pub use traits::{ConductorError, MemoryStore};
pub use validation::validate_implementation;
