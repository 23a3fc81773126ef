//! A scripted stand-in for the language-model completion service.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use meridian_contracts::error::{MeridianError, MeridianResult};
use meridian_core::traits::{CompletionRequest, CompletionService};

/// Indicative price of one reasoning call.
pub const COST_PER_CALL_USD: f64 = 0.003;

pub const FINALIZE_REPLY: &str =
    r#"{"thought":"the available results answer the query","action":"finalize","params":{}}"#;

/// Replays canned replies in order. The last reply repeats once the script
/// runs out.
pub struct ScriptedCompletion {
    replies: Mutex<Vec<String>>,
    prompts: Mutex<Vec<CompletionRequest>>,
    calls: AtomicU32,
}

impl ScriptedCompletion {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicU32::new(0),
        }
    }

    /// A service that always finalizes.
    pub fn finalizing() -> Self {
        Self::new([FINALIZE_REPLY])
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every request received so far.
    pub fn prompts(&self) -> Vec<CompletionRequest> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

fn poisoned() -> MeridianError {
    MeridianError::AgentFailed {
        agent_id: "completion".to_string(),
        reason: "script lock poisoned".to_string(),
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(&self, request: &CompletionRequest) -> MeridianResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().map_err(|_| poisoned())?.push(request.clone());

        let mut replies = self.replies.lock().map_err(|_| poisoned())?;
        match replies.len() {
            0 => Ok(FINALIZE_REPLY.to_string()),
            1 => Ok(replies[0].clone()),
            _ => Ok(replies.remove(0)),
        }
    }

    fn cost_per_call_usd(&self) -> f64 {
        COST_PER_CALL_USD
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CompletionRequest {
        CompletionRequest {
            system_prompt: "s".into(),
            user_prompt: "u".into(),
        }
    }

    #[tokio::test]
    async fn replays_then_repeats_last() {
        let script = ScriptedCompletion::new(["a", "b"]);
        assert_eq!(script.complete(&request()).await.unwrap(), "a");
        assert_eq!(script.complete(&request()).await.unwrap(), "b");
        assert_eq!(script.complete(&request()).await.unwrap(), "b");
        assert_eq!(script.calls(), 3);
        assert_eq!(script.prompts().len(), 3);
    }

    #[tokio::test]
    async fn empty_script_finalizes() {
        let script = ScriptedCompletion::new(Vec::<String>::new());
        assert_eq!(script.complete(&request()).await.unwrap(), FINALIZE_REPLY);
    }
}
