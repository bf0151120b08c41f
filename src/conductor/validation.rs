//! Two-validator implementation review pipeline with backup rollback (spec §4.5 "Validation
//! pipeline")
//!
//! Grounded on `original_source/backend/agents/agent_to_agent_communicator.py`'s
//! `validate_implementation`/`_summarize_validation_response`/`_rollback_to_backup`.

use std::path::Path;

use futures::future::join_all;
use serde_json::json;
use tracing::{error, warn};

use super::domain_types::{ValidationResult, ValidationSummary, Verdict};
use super::traits::MemoryStore;
use crate::domain_types::{CorrelationId, Provider, TaskType};
use crate::router::domain_types::{AgentRequest, ExtraKwargs, RequestContext};
use crate::router::traits::Router;

const VALIDATION_KEYWORDS: [&str; 4] = ["validated", "safe to apply", "looks good", "approved"];
const CRITICAL_KEYWORDS: [&str; 6] = [
    "critical syntax",
    "syntax error",
    "unsafe",
    "do not apply",
    "fatal",
    "rollback",
];

fn summarize(agent: Provider, success: bool, content: &str, latency_ms: u64, error: Option<String>) -> ValidationSummary {
    let text = content.trim();
    let lower = text.to_lowercase();
    let validated = success && VALIDATION_KEYWORDS.iter().any(|k| lower.contains(k));
    let critical = CRITICAL_KEYWORDS.iter().any(|k| lower.contains(k));
    let verdict = if validated && !critical { Verdict::Validated } else { Verdict::NotValidated };

    ValidationSummary {
        agent,
        success,
        content: text.chars().take(1000).collect(),
        verdict,
        critical_issues: critical,
        latency_ms,
        error,
    }
}

/// Copies `backup_file` over `target_file` off the async event loop (spec §4.5: "off-thread,
/// non-blocking to the event loop").
async fn rollback_to_backup(backup_file: &Path, target_file: &Path) -> bool {
    if !backup_file.exists() {
        warn!(backup_file = %backup_file.display(), "backup file missing for rollback");
        return false;
    }
    let backup_file = backup_file.to_path_buf();
    let target_file = target_file.to_path_buf();
    let result = tokio::task::spawn_blocking(move || std::fs::copy(&backup_file, &target_file)).await;
    match result {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            error!(error = %e, "rollback failed");
            false
        }
        Err(e) => {
            error!(error = %e, "rollback task panicked");
            false
        }
    }
}

/// Runs `validation_prompt` against both `validators` in parallel, summarizes each verdict by
/// keyword heuristic, and rolls back `target_file` from `backup_file` if either validator flags
/// a critical issue. Telemetry is written best-effort through `memory`.
pub async fn validate_implementation(
    router: &dyn Router,
    memory: &dyn MemoryStore,
    implementation_content: &str,
    validation_prompt: &str,
    validators: (Provider, Provider),
    backup_file: Option<&Path>,
    target_file: Option<&Path>,
) -> ValidationResult {
    let excerpt: String = implementation_content.chars().take(5000).collect();
    let prompt = format!("{validation_prompt}\n\n```\n{excerpt}\n```");

    let requests = [validators.0, validators.1].map(|provider| AgentRequest {
        correlation_id: CorrelationId::generate(),
        provider,
        task_type: TaskType::try_new("review".to_string()).expect("static value"),
        prompt: prompt.clone(),
        model: None,
        temperature: None,
        max_tokens: None,
        extra: ExtraKwargs::default(),
        context: RequestContext {
            use_file_access: false,
            from_tool_bridge: false,
            timeout_override_secs: Some(300),
        },
    });

    let responses = join_all(requests.into_iter().map(|request| {
        let provider = request.provider;
        async move {
            let response = router.send_request(request, None).await;
            summarize(
                provider,
                response.success,
                if response.success { &response.content } else { "" },
                response.latency_ms,
                response.error,
            )
        }
    }))
    .await;

    let validated = responses.iter().all(|r| r.verdict == Verdict::Validated) && !responses.iter().any(|r| r.critical_issues);

    let rolled_back = if responses.iter().any(|r| r.critical_issues) {
        match (backup_file, target_file) {
            (Some(backup), Some(target)) => rollback_to_backup(backup, target).await,
            _ => false,
        }
    } else {
        false
    };

    memory
        .record_event(
            "phase6_validation",
            json!({
                "validated": validated,
                "rolled_back": rolled_back,
                "validations": responses.iter().map(|r| json!({
                    "agent": r.agent.as_str(),
                    "verdict": format!("{:?}", r.verdict),
                    "critical_issues": r.critical_issues,
                })).collect::<Vec<_>>(),
            }),
        )
        .await;

    ValidationResult {
        validated,
        rolled_back,
        validations: responses,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validated_keyword_without_critical_is_validated() {
        let summary = summarize(Provider::DeepSeek, true, "Looks good, approved.", 10, None);
        assert_eq!(summary.verdict, Verdict::Validated);
        assert!(!summary.critical_issues);
    }

    #[test]
    fn critical_keyword_overrides_validation() {
        let summary = summarize(Provider::DeepSeek, true, "approved but fatal issue found", 10, None);
        assert_eq!(summary.verdict, Verdict::NotValidated);
        assert!(summary.critical_issues);
    }

    #[test]
    fn failed_call_is_not_validated() {
        let summary = summarize(Provider::DeepSeek, false, "", 10, Some("timeout".to_string()));
        assert_eq!(summary.verdict, Verdict::NotValidated);
    }
}
