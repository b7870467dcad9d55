#[derive(Debug, thiserror::Error)]
pub enum GrammarError {
    #[error("grammar worker timed out")]
    Timeout,
    #[error("grammar worker call failed: {0}")]
    Failed(String),
}

/// Grammar correction for the source language only. Failures always fall
/// through to the pre-correction text at the call site, never here.
#[async_trait::async_trait]
pub trait GrammarWorker: Send + Sync {
    async fn correct_partial(&self, text: &str) -> Result<String, GrammarError>;
    async fn correct_final(&self, text: &str) -> Result<String, GrammarError>;
}

/// A grammar worker that applies a fixed, scripted correction (or none),
/// for dispatch/session tests.
pub struct ScriptedGrammarWorker {
    correction: Option<String>,
}

impl ScriptedGrammarWorker {
    pub fn passthrough() -> Self {
        Self { correction: None }
    }

    pub fn always_returns(correction: impl Into<String>) -> Self {
        Self { correction: Some(correction.into()) }
    }
}

#[async_trait::async_trait]
impl GrammarWorker for ScriptedGrammarWorker {
    async fn correct_partial(&self, text: &str) -> Result<String, GrammarError> {
        Ok(self.correction.clone().unwrap_or_else(|| text.to_string()))
    }

    async fn correct_final(&self, text: &str) -> Result<String, GrammarError> {
        Ok(self.correction.clone().unwrap_or_else(|| text.to_string()))
    }
}
