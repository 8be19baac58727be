//! One analysis run: sample events, call the model, recover the report
//!
//! A run makes at most two model calls. If the first response cannot be
//! turned into a report, the prompt is rebuilt in its compact form and the
//! call is repeated once. If that also fails, the raw second response is
//! saved for inspection and the run fails.

use crate::config::Config;
use crate::error::PipelineError;
use crate::events::{shrink_events, Event};
use crate::llm::prompts::{system_prompt, user_prompt, PromptProfile};
use crate::llm::{recover_wrapper, ModelBackend, ModelCaller, RecoveryStage};
use crate::report::Report;
use crate::util::write_atomic;
use std::path::PathBuf;
use tracing::{error, info, warn};

/// A finished report and how it was obtained
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub report: Report,
    pub stage: RecoveryStage,
    /// True when the compact retry produced the report
    pub compacted: bool,
    /// Events actually sent to the model
    pub events_sent: usize,
}

enum Attempt {
    Recovered(Report, RecoveryStage),
    Unrecoverable { raw: String, reason: String },
}

pub struct Pipeline<B> {
    caller: ModelCaller<B>,
    model: String,
    max_retries: u32,
    max_events: usize,
    language: String,
    diagnostic_path: PathBuf,
}

impl<B: ModelBackend> Pipeline<B> {
    pub fn new(backend: B, config: &Config) -> Self {
        Self {
            caller: ModelCaller::from_config(backend, config),
            model: config.model_name.clone(),
            max_retries: config.max_retries,
            max_events: config.max_events,
            language: config.language.clone(),
            diagnostic_path: config.diagnostic_path.clone(),
        }
    }

    pub fn caller(&self) -> &ModelCaller<B> {
        &self.caller
    }

    pub async fn run(&self, events: &[Event]) -> Result<PipelineOutcome, PipelineError> {
        let sampled = shrink_events(events, self.max_events);
        info!(
            total = events.len(),
            sent = sampled.len(),
            model = %self.model,
            "starting analysis"
        );

        let reason = match self.attempt(&sampled, PromptProfile::Full).await? {
            Attempt::Recovered(report, stage) => {
                return Ok(PipelineOutcome {
                    report,
                    stage,
                    compacted: false,
                    events_sent: sampled.len(),
                })
            }
            Attempt::Unrecoverable { reason, .. } => reason,
        };
        warn!(%reason, "response unrecoverable, retrying with compact prompt");

        match self.attempt(&sampled, PromptProfile::Compact).await? {
            Attempt::Recovered(report, stage) => Ok(PipelineOutcome {
                report,
                stage,
                compacted: true,
                events_sent: sampled.len(),
            }),
            Attempt::Unrecoverable { raw, reason } => {
                write_atomic(&self.diagnostic_path, &raw).map_err(|error| {
                    PipelineError::Artifact {
                        path: self.diagnostic_path.clone(),
                        error,
                    }
                })?;
                error!(
                    %reason,
                    artifact = %self.diagnostic_path.display(),
                    "compact retry also unrecoverable"
                );
                Err(PipelineError::ResponseRecovery {
                    artifact: self.diagnostic_path.clone(),
                })
            }
        }
    }

    async fn attempt(
        &self,
        events: &[Event],
        profile: PromptProfile,
    ) -> Result<Attempt, PipelineError> {
        let system = system_prompt(profile, &self.language);
        let user = user_prompt(events, profile)?;
        let raw = self
            .caller
            .call(&system, &user, &self.model, self.max_retries)
            .await?;

        let recovered = match recover_wrapper(&raw) {
            Ok(recovered) => recovered,
            Err(failure) => {
                return Ok(Attempt::Unrecoverable {
                    raw,
                    reason: failure.to_string(),
                })
            }
        };

        let stage = recovered.stage;
        match recovered.wrapper.into_report() {
            Ok(report) => {
                for warning in report.shape_warnings() {
                    warn!(%warning, "report shape differs from request");
                }
                Ok(Attempt::Recovered(report, stage))
            }
            Err(err) => Ok(Attempt::Unrecoverable {
                raw,
                reason: format!("report fields invalid: {}", err),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BackendError, ModelCallError};
    use crate::llm::models::FLASH_MODEL;
    use crate::llm::prompts::NO_FENCES_RULE;
    use crate::llm::test_support::ScriptedBackend;
    use serde_json::json;
    use std::fs;
    use std::path::Path;

    fn report_json() -> serde_json::Value {
        json!({
            "story": "Defenders held B twice.",
            "coaching": {
                "strengths": ["Crossfires", "Retake util"],
                "mistakes": [
                    {"issue": "Stacked A", "fix": "Play default"},
                    {"issue": "No info", "fix": "Use recon"}
                ],
                "checklist": ["Call plant", "Hold off-angles", "Trade fast"]
            },
            "highlights": [{"ts": "2024-05-01T12:10:00Z", "label": "Ninja defuse", "actor": "Enemy3"}],
            "metrics": {"kills": 9, "plants": 2, "defuses": 2, "rounds": 4}
        })
    }

    fn test_config(dir: &Path) -> Config {
        Config {
            google_api_key: Some("test".to_string()),
            model_name: FLASH_MODEL.to_string(),
            diagnostic_path: dir.join("raw.txt"),
            ..Config::default()
        }
    }

    fn events(n: usize) -> Vec<Event> {
        (0..n)
            .map(|i| {
                let ts = format!("2024-05-01T12:{:02}:{:02}Z", i / 60, i % 60);
                Event::new(Some(ts.as_str()), "You", "kill", format!("Enemy{}", i % 5 + 1))
            })
            .collect()
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let dir = tempfile::tempdir().unwrap();
        let raw = json!({"json": report_json()}).to_string();
        let pipeline = Pipeline::new(ScriptedBackend::new(vec![Ok(raw)]), &test_config(dir.path()));

        let outcome = pipeline.run(&events(5)).await.unwrap();
        assert_eq!(outcome.stage, RecoveryStage::Direct);
        assert!(!outcome.compacted);
        assert_eq!(outcome.report.metrics.defuses, 2);
        assert_eq!(pipeline.caller().backend().requests().len(), 1);
        assert!(!dir.path().join("raw.txt").exists());
    }

    #[tokio::test]
    async fn test_unrecoverable_first_response_triggers_compact_retry() {
        let dir = tempfile::tempdir().unwrap();
        let fenced = format!("```json\n{}\n```", report_json());
        let backend = ScriptedBackend::new(vec![
            Ok("I could not produce JSON this time.".to_string()),
            Ok(fenced),
        ]);
        let pipeline = Pipeline::new(backend, &test_config(dir.path()));

        let outcome = pipeline.run(&events(5)).await.unwrap();
        assert!(outcome.compacted);
        assert_eq!(outcome.stage, RecoveryStage::FirstBlock);
        assert_eq!(outcome.report.story, "Defenders held B twice.");

        let requests = pipeline.caller().backend().requests();
        assert_eq!(requests.len(), 2);
        assert!(!requests[0].system.contains(NO_FENCES_RULE));
        assert!(requests[1].system.contains(NO_FENCES_RULE));
        assert!(requests[1].user.contains("story: 2 paragraphs"));
    }

    #[tokio::test]
    async fn test_second_failure_writes_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(vec![
            Ok("{\"json\": ".to_string()),
            Ok("{\"json\": [\"still broken".to_string()),
        ]);
        let pipeline = Pipeline::new(backend, &test_config(dir.path()));

        let err = pipeline.run(&events(3)).await.unwrap_err();
        let artifact = dir.path().join("raw.txt");
        match err {
            PipelineError::ResponseRecovery { artifact: path } => assert_eq!(path, artifact),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(
            fs::read_to_string(&artifact).unwrap(),
            "{\"json\": [\"still broken"
        );
        assert_eq!(pipeline.caller().backend().requests().len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_report_fields_count_as_recovery_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut broken = report_json();
        broken["coaching"] = json!("be better");
        let backend = ScriptedBackend::new(vec![
            Ok(json!({"json": broken}).to_string()),
            Ok(json!({"json": report_json()}).to_string()),
        ]);
        let pipeline = Pipeline::new(backend, &test_config(dir.path()));

        let outcome = pipeline.run(&events(3)).await.unwrap();
        assert!(outcome.compacted);
        assert_eq!(outcome.report.coaching.checklist.len(), 3);
    }

    #[tokio::test]
    async fn test_empty_metrics_trigger_compact_retry() {
        let dir = tempfile::tempdir().unwrap();
        let mut partial = report_json();
        partial["metrics"] = json!({});
        let backend = ScriptedBackend::new(vec![
            Ok(json!({"json": partial}).to_string()),
            Ok(json!({"json": report_json()}).to_string()),
        ]);
        let pipeline = Pipeline::new(backend, &test_config(dir.path()));

        let outcome = pipeline.run(&events(3)).await.unwrap();
        assert!(outcome.compacted);
        assert_eq!(outcome.report.metrics.kills, 9);
        assert_eq!(pipeline.caller().backend().requests().len(), 2);
    }

    #[tokio::test]
    async fn test_model_failure_on_compact_call_writes_no_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(vec![
            Ok("not json at all".to_string()),
            Err(BackendError::Http {
                status: 500,
                body: "internal".to_string(),
            }),
        ]);
        let pipeline = Pipeline::new(backend, &test_config(dir.path()));

        let err = pipeline.run(&events(3)).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ModelCall(ModelCallError::Backend { .. })
        ));
        assert_eq!(pipeline.caller().backend().requests().len(), 2);
        assert!(!dir.path().join("raw.txt").exists());
    }

    #[tokio::test]
    async fn test_truncated_response_is_repaired_without_retry() {
        let dir = tempfile::tempdir().unwrap();
        let full = json!({"json": report_json()}).to_string();
        let cut = full.strip_suffix('}').unwrap().to_string();
        let pipeline = Pipeline::new(ScriptedBackend::new(vec![Ok(cut)]), &test_config(dir.path()));

        let outcome = pipeline.run(&events(3)).await.unwrap();
        assert_eq!(outcome.stage, RecoveryStage::Repair);
        assert!(!outcome.compacted);
    }

    #[tokio::test]
    async fn test_model_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(vec![Err(BackendError::Http {
            status: 403,
            body: "permission denied".to_string(),
        })]);
        let pipeline = Pipeline::new(backend, &test_config(dir.path()));

        let err = pipeline.run(&events(3)).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ModelCall(ModelCallError::Backend { .. })
        ));
    }

    #[tokio::test]
    async fn test_prompt_carries_sampled_events_only() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            max_events: 6,
            ..test_config(dir.path())
        };
        let raw = json!({"json": report_json()}).to_string();
        let pipeline = Pipeline::new(ScriptedBackend::new(vec![Ok(raw)]), &config);

        let outcome = pipeline.run(&events(50)).await.unwrap();
        assert_eq!(outcome.events_sent, 6);
        let user = &pipeline.caller().backend().requests()[0].user;
        assert_eq!(user.matches("\"action\": \"kill\"").count(), 6);
    }
}
