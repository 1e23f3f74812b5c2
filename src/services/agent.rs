//! Agent dispatch: fill the prompt for a request and run it through the
//! generative backend.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::{debug, warn};

use crate::error::{AgentError, GenerationError};
use crate::models::{GenerationConfig, Request};
use crate::services::generation::{GenerationOptions, GenerativeBackend, retry_policy};
use crate::services::prompts::PromptRegistry;

/// Turns a [`Request`] into backend output.
///
/// Every failure (invalid parameters, template errors, backend errors,
/// timeouts and panics inside the backend) comes back as an [`AgentError`].
pub struct AgentDispatcher {
    backend: Arc<dyn GenerativeBackend>,
    registry: PromptRegistry,
    options: GenerationOptions,
    timeout: Option<Duration>,
}

impl AgentDispatcher {
    pub fn new(backend: Arc<dyn GenerativeBackend>) -> Self {
        Self {
            backend,
            registry: PromptRegistry::builtin(),
            options: GenerationOptions::default(),
            timeout: None,
        }
    }

    pub fn from_config(backend: Arc<dyn GenerativeBackend>, config: &GenerationConfig) -> Self {
        Self::new(backend)
            .with_options(GenerationOptions::from(config))
            // Every attempt and every backoff between attempts fits under the limit.
            .with_timeout(
                retry_policy(config).worst_case(Duration::from_secs(config.timeout_secs)),
            )
    }

    pub fn with_registry(mut self, registry: PromptRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn backend(&self) -> &Arc<dyn GenerativeBackend> {
        &self.backend
    }

    /// Build the prompt a request would send, without calling the backend.
    pub fn render(&self, request: &Request) -> Result<String, AgentError> {
        let kind = request.kind();
        request
            .params
            .validate()
            .map_err(|cause| AgentError::new(kind, cause))?;

        let template = self
            .registry
            .get(kind)
            .ok_or_else(|| AgentError::new(kind, "no prompt template registered"))?;

        template
            .fill(&request.params.slots())
            .map_err(|e| AgentError::new(kind, e.to_string()))
    }

    /// Fill the request's template and return the backend's output verbatim.
    pub async fn dispatch(&self, request: &Request) -> Result<String, AgentError> {
        let kind = request.kind();
        let prompt = self.render(request)?;
        debug!(request = %request.id, %kind, prompt_chars = prompt.len(), "dispatching");

        let call = AssertUnwindSafe(self.backend.generate(&prompt, &self.options)).catch_unwind();
        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => Ok(Err(GenerationError::Timeout(limit.as_secs()))),
            },
            None => call.await,
        };

        match outcome {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => {
                warn!(request = %request.id, %kind, error = %e, "generation failed");
                Err(AgentError::new(kind, e.to_string()))
            }
            Err(_) => {
                warn!(request = %request.id, %kind, "generative backend panicked");
                Err(AgentError::new(kind, "generative backend panicked"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Difficulty, RequestKind, RequestParams};
    use crate::services::prompts::PromptTemplate;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records prompts and answers with a fixed prefix.
    #[derive(Default)]
    struct EchoBackend {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl GenerativeBackend for EchoBackend {
        async fn generate(
            &self,
            prompt: &str,
            _options: &GenerationOptions,
        ) -> Result<String, GenerationError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(format!("echo:{}", prompt.len()))
        }

        fn model(&self) -> &str {
            "echo"
        }
    }

    struct FailingBackend;

    #[async_trait]
    impl GenerativeBackend for FailingBackend {
        async fn generate(
            &self,
            _prompt: &str,
            _options: &GenerationOptions,
        ) -> Result<String, GenerationError> {
            Err(GenerationError::ConnectionError("connection refused".to_string()))
        }

        fn model(&self) -> &str {
            "failing"
        }
    }

    struct SlowBackend;

    #[async_trait]
    impl GenerativeBackend for SlowBackend {
        async fn generate(
            &self,
            _prompt: &str,
            _options: &GenerationOptions,
        ) -> Result<String, GenerationError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("late".to_string())
        }

        fn model(&self) -> &str {
            "slow"
        }
    }

    struct PanickingBackend;

    #[async_trait]
    impl GenerativeBackend for PanickingBackend {
        async fn generate(
            &self,
            _prompt: &str,
            _options: &GenerationOptions,
        ) -> Result<String, GenerationError> {
            panic!("model state corrupted")
        }

        fn model(&self) -> &str {
            "panicking"
        }
    }

    #[tokio::test]
    async fn test_dispatch_returns_output_verbatim() {
        let backend = Arc::new(EchoBackend::default());
        let dispatcher = AgentDispatcher::new(backend.clone());
        let request = Request::new(RequestParams::explain("What is osmosis?"));

        let text = dispatcher.dispatch(&request).await.unwrap();
        let prompts = backend.prompts.lock().unwrap();
        assert_eq!(text, format!("echo:{}", prompts[0].len()));
        assert!(prompts[0].contains("What is osmosis?"));
    }

    #[tokio::test]
    async fn test_quiz_prompt_is_filled() {
        let backend = Arc::new(EchoBackend::default());
        let dispatcher = AgentDispatcher::new(backend.clone());
        let request = Request::new(RequestParams::quiz("Krebs cycle", 4, Difficulty::Hard));

        dispatcher.dispatch(&request).await.unwrap();
        let prompt = backend.prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("Write 4 multiple-choice"));
        assert!(prompt.contains("Difficulty: hard"));
    }

    #[tokio::test]
    async fn test_backend_failure_is_agent_error() {
        let dispatcher = AgentDispatcher::new(Arc::new(FailingBackend));
        let request = Request::new(RequestParams::summarize("Some notes"));

        let err = dispatcher.dispatch(&request).await.unwrap_err();
        assert_eq!(err.kind, RequestKind::Summarize);
        assert!(err.cause.contains("connection refused"));
    }

    #[tokio::test]
    async fn test_invalid_params_never_reach_backend() {
        let backend = Arc::new(EchoBackend::default());
        let dispatcher = AgentDispatcher::new(backend.clone());
        let request = Request::new(RequestParams::quiz("content", 0, Difficulty::Easy));

        let err = dispatcher.dispatch(&request).await.unwrap_err();
        assert_eq!(err.kind, RequestKind::Quiz);
        assert!(backend.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_is_agent_error() {
        let dispatcher =
            AgentDispatcher::new(Arc::new(SlowBackend)).with_timeout(Duration::from_millis(50));
        let request = Request::new(RequestParams::explain("slow"));

        let err = dispatcher.dispatch(&request).await.unwrap_err();
        assert!(err.cause.contains("timed out"));
    }

    #[tokio::test]
    async fn test_panic_is_agent_error() {
        let dispatcher = AgentDispatcher::new(Arc::new(PanickingBackend));
        let request = Request::new(RequestParams::rag_answer("q", "ctx"));

        let err = dispatcher.dispatch(&request).await.unwrap_err();
        assert_eq!(err.kind, RequestKind::RagAnswer);
        assert!(err.cause.contains("panicked"));
    }

    #[tokio::test]
    async fn test_custom_registry_template() {
        let backend = Arc::new(EchoBackend::default());
        let mut registry = PromptRegistry::builtin();
        registry.register(
            RequestKind::Summarize,
            PromptTemplate::new("TL;DR {notes}").unwrap(),
        );
        let dispatcher = AgentDispatcher::new(backend.clone()).with_registry(registry);
        let request = Request::new(RequestParams::summarize("cells divide"));

        assert_eq!(dispatcher.render(&request).unwrap(), "TL;DR cells divide");
        dispatcher.dispatch(&request).await.unwrap();
        assert_eq!(backend.prompts.lock().unwrap()[0], "TL;DR cells divide");
    }

    #[test]
    fn test_config_timeout_leaves_room_for_backoff() {
        let config = GenerationConfig {
            timeout_secs: 10,
            max_retries: 3,
            ..Default::default()
        };
        let dispatcher = AgentDispatcher::from_config(Arc::new(EchoBackend::default()), &config);
        // 3 x 10s attempts, then 200ms and 400ms waits, each with up to 50ms jitter
        assert_eq!(dispatcher.timeout, Some(Duration::from_millis(30_700)));
    }
}
