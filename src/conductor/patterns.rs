//! Conversation orchestration patterns built on top of the Router (spec §4.5)
//!
//! Grounded on `original_source/backend/agents/agent_to_agent_communicator.py`'s
//! `AgentToAgentCommunicator`: `route_message`, `multi_turn_conversation`, `parallel_consensus`,
//! `iterative_improvement`. Per-agent handler methods (`_handle_deepseek_message`, etc.) are
//! generalized into one `dispatch_to_agent` that goes through the crate's `Router` trait instead
//! of hardcoding two providers, since this crate's Router already owns channel selection.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use serde_json::json;

use super::config::ConductorConfig;
use super::confidence::calculate_consensus_confidence;
use super::domain_types::{
    AgentMessage, CommunicationPattern, ConsensusResult, IndividualResponse,
    IterationLogEntry, IterativeImprovementResult, MessageType, Participant,
};
use super::loop_detection::LoopDetector;
use super::traits::{ConductorError, MemoryStore};
use crate::domain_types::{CorrelationId, Provider, TaskType};
use crate::router::domain_types::{AgentRequest, ExtraKwargs, RequestContext};
use crate::router::traits::Router;

/// Baseline confidence assigned to a successful agent reply, absent any other signal. Extends
/// the original's two hardcoded values (DeepSeek 0.9, Perplexity 0.85) to every provider this
/// crate supports.
fn baseline_confidence(provider: Provider) -> f64 {
    match provider {
        Provider::DeepSeek => 0.9,
        Provider::Perplexity | Provider::OpenAi | Provider::Anthropic => 0.85,
        Provider::Qwen => 0.8,
        Provider::Ollama => 0.7,
    }
}

/// Coordinates multi-agent conversations, consensus gathering, and iterative refinement on top
/// of the Router.
pub struct Conductor {
    router: Arc<dyn Router>,
    memory: Arc<dyn MemoryStore>,
    loop_detector: Arc<dyn LoopDetector>,
    config: ConductorConfig,
    conversation_cache: DashMap<String, Vec<AgentMessage>>,
}

impl Conductor {
    #[must_use]
    pub fn new(
        router: Arc<dyn Router>,
        memory: Arc<dyn MemoryStore>,
        loop_detector: Arc<dyn LoopDetector>,
        config: ConductorConfig,
    ) -> Self {
        Self {
            router,
            memory,
            loop_detector,
            config,
            conversation_cache: DashMap::new(),
        }
    }

    /// Routes one message to its recipient, recording history and best-effort telemetry.
    /// Fails only with `LoopDetected`; per-agent call failures are returned as a message of
    /// type `error`, matching the original's exception-to-message conversion.
    pub async fn route_message(&self, message: AgentMessage) -> Result<AgentMessage, ConductorError> {
        self.loop_detector
            .check_and_mark(&message.conversation_id, message.iteration, &message.from_agent.to_string())
            .await?;

        let response = match message.to_agent {
            Participant::Orchestrator => {
                Self::create_error_message(&message, "cannot route to the orchestrator")
            }
            Participant::Agent(provider) => self.dispatch_to_agent(&message, provider).await,
        };

        self.record_history(&message, &response).await;

        let payload = json!({
            "from": message.from_agent.to_string(),
            "to": message.to_agent.to_string(),
            "message_type": format!("{:?}", message.message_type),
            "response_type": format!("{:?}", response.message_type),
            "confidence": response.confidence_score,
            "conversation_id": message.conversation_id,
            "iteration": message.iteration,
        });
        self.memory.record_event("communicator_route", payload).await;

        Ok(response)
    }

    async fn dispatch_to_agent(&self, message: &AgentMessage, provider: Provider) -> AgentMessage {
        let task_type = message
            .context
            .get("task_type")
            .and_then(|v| v.as_str())
            .and_then(|s| TaskType::try_new(s.to_string()).ok())
            .unwrap_or_else(|| TaskType::try_new("analyze".to_string()).expect("static value"));

        let request = AgentRequest {
            correlation_id: CorrelationId::generate(),
            provider,
            task_type,
            prompt: message.content.clone(),
            model: None,
            temperature: None,
            max_tokens: None,
            extra: ExtraKwargs::default(),
            context: RequestContext {
                use_file_access: message
                    .context
                    .get("use_file_access")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false),
                from_tool_bridge: false,
                timeout_override_secs: message
                    .context
                    .get("timeout_override")
                    .and_then(|v| v.as_u64()),
            },
        };

        let response = self.router.send_request(request, None).await;

        if response.success {
            let mut metadata = HashMap::new();
            metadata.insert("channel".to_string(), json!(response.channel));
            metadata.insert("latency_ms".to_string(), json!(response.latency_ms));
            if let Some(index) = response.api_key_index {
                metadata.insert("api_key_index".to_string(), json!(index));
            }

            let mut reply = AgentMessage::new(
                Participant::Agent(provider),
                message.from_agent,
                MessageType::Response,
                response.content,
                message.conversation_id.clone(),
                message.iteration + 1,
                message.max_iterations,
            )
            .with_context(message.context.clone());
            reply.confidence_score = baseline_confidence(provider);
            reply.metadata = metadata;
            reply
        } else {
            Self::create_error_message(message, response.error.as_deref().unwrap_or("unknown agent error"))
        }
    }

    fn create_error_message(original: &AgentMessage, error: &str) -> AgentMessage {
        let mut message = AgentMessage::new(
            Participant::Orchestrator,
            original.from_agent,
            MessageType::Error,
            format!("Error: {error}"),
            original.conversation_id.clone(),
            original.iteration,
            original.max_iterations,
        )
        .with_context(original.context.clone());
        message
            .metadata
            .insert("error_details".to_string(), json!(error));
        message
    }

    async fn record_history(&self, request: &AgentMessage, response: &AgentMessage) {
        self.memory.store_message(&request.conversation_id, request).await;
        self.memory.store_message(&request.conversation_id, response).await;

        let mut history = self
            .conversation_cache
            .entry(request.conversation_id.clone())
            .or_default();
        history.push(request.clone());
        history.push(response.clone());
        let cap = self.config.conversation_cache_size;
        if history.len() > cap {
            let excess = history.len() - cap;
            history.drain(0..excess);
        }
    }

    fn should_end_conversation(response: &AgentMessage, history: &[AgentMessage]) -> bool {
        if matches!(response.message_type, MessageType::Completion | MessageType::Error) {
            return true;
        }
        if response.iteration >= response.max_iterations {
            return true;
        }
        if history.len() >= 3 {
            let last_three = &history[history.len() - 3..];
            let prefixes: Vec<String> = last_three
                .iter()
                .map(|m| m.content.chars().take(100).collect::<String>())
                .collect();
            if prefixes.iter().all(|p| *p == prefixes[0]) {
                return true;
            }
        }
        false
    }

    fn determine_next_message(
        response: &AgentMessage,
        pattern: CommunicationPattern,
        participants: (Provider, Provider),
    ) -> AgentMessage {
        let Participant::Agent(from) = response.from_agent else {
            return response.clone();
        };
        let next_agent = match pattern {
            // Alternates by turn parity, independent of which participant actually sent
            // `response` — "regardless of sender" per spec §4.5, as opposed to Sequential's
            // sender-relative "feed to the other agent".
            CommunicationPattern::Collaborative => {
                if response.iteration % 2 == 0 { participants.1 } else { participants.0 }
            }
            CommunicationPattern::Sequential => {
                if from != participants.0 { participants.0 } else { participants.1 }
            }
        };

        AgentMessage::new(
            Participant::Orchestrator,
            Participant::Agent(next_agent),
            MessageType::Query,
            response.content.clone(),
            response.conversation_id.clone(),
            response.iteration + 1,
            response.max_iterations,
        )
        .with_context(response.context.clone())
    }

    /// Runs a bounded sequence of turns between two participants, alternating recipients per
    /// `pattern`, until a completion/error message, the iteration cap, or a 3-in-a-row repeated
    /// response (the loop guard of spec §4.5) ends the conversation.
    pub async fn multi_turn_conversation(
        &self,
        initial_message: AgentMessage,
        participants: (Provider, Provider),
        max_turns: u32,
        pattern: CommunicationPattern,
    ) -> Result<Vec<AgentMessage>, ConductorError> {
        let mut history = vec![initial_message.clone()];
        let mut current_message = initial_message;

        for _ in 0..max_turns {
            let response = self.route_message(current_message).await?;
            history.push(response.clone());

            if Self::should_end_conversation(&response, &history) {
                break;
            }
            if response.iteration >= response.max_iterations {
                break;
            }

            current_message = Self::determine_next_message(&response, pattern, participants);
        }

        Ok(history)
    }

    /// Sends `question` to every agent in `agents` concurrently and combines the results into a
    /// single consensus (spec §4.5 "Parallel consensus", §8 scenario 5).
    pub async fn parallel_consensus(
        &self,
        question: &str,
        agents: &[Provider],
        context: HashMap<String, serde_json::Value>,
    ) -> Result<ConsensusResult, ConductorError> {
        let conversation_id = uuid::Uuid::new_v4().to_string();

        let futures = agents.iter().enumerate().map(|(idx, agent)| {
            // Each branch gets its own loop-detection scope: the detector keys on exactly
            // `(conversation_id, iteration)`, and every branch here starts at iteration 1, so
            // sharing `conversation_id` across branches would make the first `route_message` to
            // land mark the key and every other concurrent branch fail with `LoopDetected`.
            // Scoped by index rather than agent identity since `agents` may repeat a provider.
            let branch_conversation_id = format!("{conversation_id}:{idx}");
            let message = AgentMessage::new(
                Participant::Orchestrator,
                Participant::Agent(*agent),
                MessageType::ConsensusRequest,
                question,
                branch_conversation_id,
                1,
                1,
            )
            .with_context(context.clone());
            self.route_message(message)
        });

        let responses: Vec<AgentMessage> = join_all(futures)
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;

        let scores: Vec<f64> = responses.iter().map(|r| r.confidence_score).collect();
        let contents: Vec<String> = responses.iter().map(|r| r.content.clone()).collect();
        let confidence = calculate_consensus_confidence(&scores, &contents);

        let individual: Vec<IndividualResponse> = responses
            .iter()
            .map(|r| IndividualResponse {
                agent: r.from_agent.to_string(),
                content: r.content.clone(),
                confidence: r.confidence_score,
            })
            .collect();
        let consensus = responses
            .iter()
            .map(|r| format!("{}: {}", r.from_agent, r.content))
            .collect::<Vec<_>>()
            .join("\n\n");

        Ok(ConsensusResult {
            question: question.to_string(),
            consensus,
            individual_responses: individual,
            confidence_score: confidence,
            conversation_id,
        })
    }

    /// Alternates an improver/validator pair for up to `max_iterations` rounds, extracting a
    /// confidence score from each validator reply and stopping early once it reaches
    /// `min_confidence` (spec §4.5 "Iterative improvement", §8 scenario 4).
    pub async fn iterative_improvement(
        &self,
        initial_task: &str,
        improver: Provider,
        validator: Provider,
        max_iterations: u32,
        min_confidence: f64,
    ) -> Result<IterativeImprovementResult, ConductorError> {
        let conversation_id = uuid::Uuid::new_v4().to_string();
        let mut current_content = initial_task.to_string();
        let mut iteration_log = Vec::new();
        let mut final_confidence = 0.0;

        for iteration in 1..=max_iterations {
            let improvement_message = AgentMessage::new(
                Participant::Orchestrator,
                Participant::Agent(improver),
                MessageType::Query,
                current_content.clone(),
                conversation_id.clone(),
                iteration,
                max_iterations,
            );
            let improvement = self.route_message(improvement_message).await?;

            let validation_message = AgentMessage::new(
                Participant::Orchestrator,
                Participant::Agent(validator),
                MessageType::Validation,
                improvement.content.clone(),
                conversation_id.clone(),
                iteration + 1,
                max_iterations,
            );
            let validation = self.route_message(validation_message).await?;

            let confidence = super::confidence::extract_confidence_score(&validation.content);
            iteration_log.push(IterationLogEntry {
                iteration,
                improvement: improvement.content.clone(),
                validation: validation.content.clone(),
                confidence,
            });

            current_content = improvement.content;
            final_confidence = confidence;

            if confidence >= min_confidence {
                break;
            }
        }

        Ok(IterativeImprovementResult {
            final_content: current_content,
            final_confidence,
            iterations: iteration_log,
            conversation_id,
        })
    }

    /// Point-in-time snapshot of the in-memory conversation cache (last `conversation_cache_size`
    /// messages), independent of whatever `MemoryStore` persists.
    #[must_use]
    pub fn cached_conversation(&self, conversation_id: &str) -> Vec<AgentMessage> {
        self.conversation_cache
            .get(conversation_id)
            .map(|v| v.clone())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for Conductor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conductor").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::conductor::loop_detection::InMemoryLoopDetector;
    use crate::router::domain_types::Channel;

    struct NoOpMemoryStore;

    #[async_trait]
    impl MemoryStore for NoOpMemoryStore {
        async fn store_message(&self, _conversation_id: &str, _message: &AgentMessage) {}
        async fn get_conversation(&self, _conversation_id: &str) -> Vec<AgentMessage> {
            Vec::new()
        }
        async fn clear_conversation(&self, _conversation_id: &str) {}
        async fn record_event(&self, _event_name: &str, _payload: serde_json::Value) {}
    }

    /// Always replies with fixed content, regardless of the provider or prompt — used to drive
    /// the loop-guard test.
    struct FixedReplyRouter(&'static str);

    #[async_trait]
    impl Router for FixedReplyRouter {
        async fn send_request(&self, request: AgentRequest, _preferred: Option<Channel>) -> crate::router::domain_types::AgentResponse {
            crate::router::domain_types::AgentResponse {
                correlation_id: request.correlation_id,
                success: true,
                content: self.0.to_string(),
                error: None,
                model: None,
                tokens_used: None,
                cost_usd: None,
                latency_ms: 1,
                api_key_index: None,
                channel: Channel::DirectApi,
                from_cache: false,
            }
        }
    }

    /// Replies with a fixed canned answer keyed by provider — used for the consensus test.
    struct PerProviderRouter(HashMap<Provider, &'static str>);

    #[async_trait]
    impl Router for PerProviderRouter {
        async fn send_request(&self, request: AgentRequest, _preferred: Option<Channel>) -> crate::router::domain_types::AgentResponse {
            let content = self.0.get(&request.provider).copied().unwrap_or("");
            crate::router::domain_types::AgentResponse {
                correlation_id: request.correlation_id,
                success: true,
                content: content.to_string(),
                error: None,
                model: None,
                tokens_used: None,
                cost_usd: None,
                latency_ms: 1,
                api_key_index: None,
                channel: Channel::DirectApi,
                from_cache: false,
            }
        }
    }

    /// Replies with queued validator confidences, regardless of prompt — used for the
    /// iterative-improvement test.
    struct ScriptedValidatorRouter {
        validator: Provider,
        validation_replies: Mutex<VecDeque<&'static str>>,
    }

    #[async_trait]
    impl Router for ScriptedValidatorRouter {
        async fn send_request(&self, request: AgentRequest, _preferred: Option<Channel>) -> crate::router::domain_types::AgentResponse {
            let content = if request.provider == self.validator {
                self.validation_replies
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or("0.5")
                    .to_string()
            } else {
                format!("improved: {}", request.prompt)
            };
            crate::router::domain_types::AgentResponse {
                correlation_id: request.correlation_id,
                success: true,
                content,
                error: None,
                model: None,
                tokens_used: None,
                cost_usd: None,
                latency_ms: 1,
                api_key_index: None,
                channel: Channel::DirectApi,
                from_cache: false,
            }
        }
    }

    fn conductor(router: Arc<dyn Router>) -> Conductor {
        Conductor::new(
            router,
            Arc::new(NoOpMemoryStore),
            Arc::new(InMemoryLoopDetector::new()),
            ConductorConfig::testing(),
        )
    }

    #[tokio::test]
    async fn route_message_builds_response_with_baseline_confidence() {
        let c = conductor(Arc::new(FixedReplyRouter("hello")));
        let message = AgentMessage::new(
            Participant::Orchestrator,
            Participant::Agent(Provider::DeepSeek),
            MessageType::Query,
            "hi",
            "conv-1",
            1,
            5,
        );
        let response = c.route_message(message).await.unwrap();
        assert_eq!(response.content, "hello");
        assert!((response.confidence_score - 0.9).abs() < 1e-9);
        assert_eq!(response.message_type, MessageType::Response);
    }

    #[tokio::test]
    async fn failed_agent_call_becomes_error_message() {
        struct FailingRouter;
        #[async_trait]
        impl Router for FailingRouter {
            async fn send_request(&self, request: AgentRequest, _preferred: Option<Channel>) -> crate::router::domain_types::AgentResponse {
                crate::router::domain_types::AgentResponse::failure(
                    request.correlation_id,
                    Channel::DirectApi,
                    "boom",
                    5,
                )
            }
        }

        let c = conductor(Arc::new(FailingRouter));
        let message = AgentMessage::new(
            Participant::Orchestrator,
            Participant::Agent(Provider::DeepSeek),
            MessageType::Query,
            "hi",
            "conv-2",
            1,
            5,
        );
        let response = c.route_message(message).await.unwrap();
        assert_eq!(response.message_type, MessageType::Error);
        assert!(response.content.contains("boom"));
    }

    #[tokio::test]
    async fn loop_guard_ends_conversation_on_repeated_content() {
        let c = conductor(Arc::new(FixedReplyRouter("same")));
        let initial = AgentMessage::new(
            Participant::Orchestrator,
            Participant::Agent(Provider::DeepSeek),
            MessageType::Query,
            "same",
            "conv-3",
            1,
            10,
        );
        let history = c
            .multi_turn_conversation(initial, (Provider::DeepSeek, Provider::Perplexity), 10, CommunicationPattern::Sequential)
            .await
            .unwrap();
        assert_eq!(history.len(), 3);
    }

    #[tokio::test]
    async fn parallel_consensus_matches_scenario_5() {
        let mut replies = HashMap::new();
        replies.insert(Provider::DeepSeek, "A");
        replies.insert(Provider::Perplexity, "B");
        let c = conductor(Arc::new(PerProviderRouter(replies)));

        let result = c
            .parallel_consensus(
                "what is the answer?",
                &[Provider::DeepSeek, Provider::DeepSeek, Provider::Perplexity],
                HashMap::new(),
            )
            .await
            .unwrap();

        assert!((result.confidence_score - 0.8333333333333333).abs() < 1e-9);
        assert_eq!(result.individual_responses.len(), 3);
    }

    #[tokio::test]
    async fn iterative_improvement_ends_early_per_scenario_4() {
        let router = ScriptedValidatorRouter {
            validator: Provider::Perplexity,
            validation_replies: Mutex::new(VecDeque::from(["contains 0.72", "contains 0.85"])),
        };
        let c = conductor(Arc::new(router));

        let result = c
            .iterative_improvement("draft", Provider::DeepSeek, Provider::Perplexity, 5, 0.8)
            .await
            .unwrap();

        assert_eq!(result.iterations.len(), 2);
        assert!((result.final_confidence - 0.85).abs() < 1e-9);
    }
}
