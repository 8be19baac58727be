use super::client::ModelBackend;
use super::models::ModelRequest;
use crate::error::BackendError;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Replays canned responses in order and records every request it sees.
pub(crate) struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<String, BackendError>>>,
    seen: Mutex<Vec<SeenRequest>>,
}

#[derive(Debug, Clone)]
pub(crate) struct SeenRequest {
    pub model: String,
    pub system: String,
    pub user: String,
}

impl ScriptedBackend {
    pub(crate) fn new(replies: Vec<Result<String, BackendError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn requests(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }

    pub(crate) fn models(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.model).collect()
    }
}

impl ModelBackend for ScriptedBackend {
    async fn generate(&self, request: &ModelRequest<'_>) -> Result<String, BackendError> {
        self.seen.lock().unwrap().push(SeenRequest {
            model: request.model.to_string(),
            system: request.system.to_string(),
            user: request.user.to_string(),
        });
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(BackendError::Decode("script exhausted".to_string())))
    }
}
