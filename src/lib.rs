pub mod config;
pub mod context;
pub mod error;
pub mod inference;
pub mod server;
pub mod tools;
pub mod types;

use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub use config::{ChatConfig, ConfigError};
pub use context::{Conversation, DEFAULT_SYSTEM_PROMPT};
pub use error::{InferenceError, OrchestratorError};
pub use inference::{InferenceProvider, OpenAiProvider};
pub use tools::{ToolError, ToolHandler, ToolRegistry, ToolResult};
pub use types::{
    InferenceRequest, InferenceResponse, Message, Role, ToolDeclaration, ToolInvocationRequest,
    Usage,
};

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub model: String,
    pub max_tokens: u32,
    /// Upper bound on model calls per turn.
    pub max_iterations: usize,
    /// Applied separately to each model call and each tool call.
    pub iteration_timeout: Option<Duration>,
    pub system_prompt: Option<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            model: "anthropic/claude-3.5-sonnet".into(),
            max_tokens: 1024,
            max_iterations: 8,
            iteration_timeout: Some(Duration::from_secs(60)),
            system_prompt: Some(DEFAULT_SYSTEM_PROMPT.into()),
        }
    }
}

/// Result of one orchestration turn.
#[derive(Debug, Clone)]
pub struct Completion {
    /// The provider's final response envelope, untouched.
    pub response: Value,
    /// Content of the final assistant message.
    pub text: Option<String>,
    /// Model calls made, including the final one.
    pub iterations: usize,
    pub usage: Usage,
    /// Everything the model saw, plus its final answer.
    pub history: Vec<Message>,
}

/// Drives one user submission to a final assistant message, executing the
/// tool calls the model asks for along the way. Stateless between turns, so a
/// single instance can serve concurrent requests.
pub struct Orchestrator {
    provider: Box<dyn InferenceProvider>,
    tools: ToolRegistry,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        provider: impl InferenceProvider + 'static,
        tools: ToolRegistry,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            provider: Box::new(provider),
            tools,
            config,
        }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run a turn over `messages`. The caller's history is never modified.
    pub async fn complete(&self, messages: &[Message]) -> Result<Completion, OrchestratorError> {
        self.run_loop(messages, None).await
    }

    /// Same as [`complete`](Self::complete), abandoning the turn once `cancel` fires.
    pub async fn complete_with_cancel(
        &self,
        messages: &[Message],
        cancel: CancellationToken,
    ) -> Result<Completion, OrchestratorError> {
        self.run_loop(messages, Some(&cancel)).await
    }

    async fn run_loop(
        &self,
        history: &[Message],
        cancel: Option<&CancellationToken>,
    ) -> Result<Completion, OrchestratorError> {
        let mut conversation = Conversation::new(history, self.config.system_prompt.as_deref());
        let declarations = self.tools.describe();
        let mut usage = Usage::default();

        for iteration in 0..self.config.max_iterations {
            if cancel.is_some_and(|c| c.is_cancelled()) {
                info!(iteration, "turn cancelled");
                return Err(OrchestratorError::Cancelled);
            }

            info!(iteration, messages = conversation.len(), "model call");
            let request = conversation.build_request(
                &self.config.model,
                self.config.max_tokens,
                declarations.clone(),
            );
            let response = self.infer(request, cancel).await?;
            usage.accumulate(&response.usage);

            // Only the first requested call is acted on per iteration.
            let Some(call) = response.message.tool_invocations.first().cloned() else {
                info!(iterations = iteration + 1, "turn finished");
                let text = response.message.content.clone();
                conversation.record_response(response.message);
                return Ok(Completion {
                    response: response.raw,
                    text,
                    iterations: iteration + 1,
                    usage,
                    history: conversation.into_messages(),
                });
            };

            // The result could never reach the model, so skip the side effect.
            if iteration + 1 == self.config.max_iterations {
                warn!(tool = %call.name, call_id = %call.id, "tool call left unexecuted");
                break;
            }

            info!(iteration, tool = %call.name, call_id = %call.id, "executing tool");
            let result = self.run_tool(&call, cancel).await?;
            let encoded = result
                .to_json()
                .map_err(|e| OrchestratorError::Encode(e.to_string()))?;
            conversation.record_tool_round(response.message, &call.id, encoded);
        }

        warn!(
            max_iterations = self.config.max_iterations,
            "tool loop hit iteration limit"
        );
        Err(OrchestratorError::IterationLimit(
            self.config.max_iterations,
        ))
    }

    async fn infer(
        &self,
        request: InferenceRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<InferenceResponse, OrchestratorError> {
        let inference = async {
            let result = match self.config.iteration_timeout {
                Some(limit) => tokio::time::timeout(limit, self.provider.infer(request))
                    .await
                    .map_err(|_| OrchestratorError::Timeout(limit))?,
                None => self.provider.infer(request).await,
            };
            Ok::<_, OrchestratorError>(result?)
        };

        match cancel {
            Some(cancel) => tokio::select! {
                result = inference => result,
                _ = cancel.cancelled() => {
                    info!("turn cancelled during model call");
                    Err(OrchestratorError::Cancelled)
                }
            },
            None => inference.await,
        }
    }

    async fn run_tool(
        &self,
        call: &ToolInvocationRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<ToolResult, OrchestratorError> {
        let execution = async {
            let execution = self.tools.execute(&call.name, &call.arguments);
            match self.config.iteration_timeout {
                Some(limit) => tokio::time::timeout(limit, execution)
                    .await
                    .unwrap_or_else(|_| {
                        warn!(tool = %call.name, ?limit, "tool timed out");
                        ToolResult::failure(
                            &call.name,
                            ToolError::execution(
                                format!("Tool {} timed out", call.name),
                                format!("no result after {limit:?}"),
                            ),
                        )
                    }),
                None => execution.await,
            }
        };

        match cancel {
            Some(cancel) => tokio::select! {
                result = execution => Ok(result),
                _ = cancel.cancelled() => {
                    info!(tool = %call.name, "turn cancelled during tool call");
                    Err(OrchestratorError::Cancelled)
                }
            },
            None => Ok(execution.await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Map};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::Mutex;

    // --- Mock Provider ---

    struct MockProvider {
        responses: Mutex<VecDeque<Result<InferenceResponse, InferenceError>>>,
        requests: Arc<Mutex<Vec<InferenceRequest>>>,
    }

    impl MockProvider {
        fn new(responses: Vec<InferenceResponse>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().map(Ok).collect()),
                requests: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn failing(error: InferenceError) -> Self {
            Self {
                responses: Mutex::new(VecDeque::from([Err(error)])),
                requests: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn requests(&self) -> Arc<Mutex<Vec<InferenceRequest>>> {
            self.requests.clone()
        }
    }

    #[async_trait]
    impl InferenceProvider for MockProvider {
        async fn infer(
            &self,
            request: InferenceRequest,
        ) -> Result<InferenceResponse, InferenceError> {
            self.requests.lock().await.push(request);
            self.responses
                .lock()
                .await
                .pop_front()
                .unwrap_or(Err(InferenceError::Request(
                    "no more mock responses".into(),
                )))
        }
    }

    /// Deterministic: asks for a word count of the last user message, then
    /// answers with whatever the tool returned.
    struct ScriptedProvider;

    #[async_trait]
    impl InferenceProvider for ScriptedProvider {
        async fn infer(
            &self,
            request: InferenceRequest,
        ) -> Result<InferenceResponse, InferenceError> {
            let last = request
                .messages
                .last()
                .cloned()
                .unwrap_or_else(|| Message::user(""));
            if last.role == Role::Tool {
                let count = last.content.unwrap_or_default();
                return Ok(final_response(&format!("Your text has {count} words.")));
            }
            let text = last.content.unwrap_or_default();
            let call = ("call_wc", "count_words", json!({ "text": text }));
            Ok(tool_response(vec![call]))
        }
    }

    struct SlowProvider;

    #[async_trait]
    impl InferenceProvider for SlowProvider {
        async fn infer(
            &self,
            _request: InferenceRequest,
        ) -> Result<InferenceResponse, InferenceError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(final_response("too late"))
        }
    }

    // --- Tools ---

    struct CountingTool(Arc<AtomicUsize>);

    #[async_trait]
    impl ToolHandler for CountingTool {
        async fn call(&self, _arguments: &Map<String, Value>) -> Result<Value, ToolError> {
            Ok(json!(self.0.fetch_add(1, Ordering::SeqCst) + 1))
        }
    }

    struct SleepyTool;

    #[async_trait]
    impl ToolHandler for SleepyTool {
        async fn call(&self, _arguments: &Map<String, Value>) -> Result<Value, ToolError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(json!("never"))
        }
    }

    // --- Helpers ---

    fn final_response(text: &str) -> InferenceResponse {
        let raw = json!({
            "id": "gen-final",
            "choices": [{
                "finish_reason": "stop",
                "message": {"role": "assistant", "content": text}
            }]
        });
        InferenceResponse {
            message: Message::assistant(text),
            finish_reason: Some("stop".into()),
            usage: Usage {
                input_tokens: 10,
                output_tokens: 5,
            },
            raw,
        }
    }

    fn tool_response(calls: Vec<(&str, &str, Value)>) -> InferenceResponse {
        let invocations: Vec<ToolInvocationRequest> = calls
            .into_iter()
            .map(|(id, name, args)| ToolInvocationRequest {
                id: id.into(),
                name: name.into(),
                arguments: args.as_object().cloned().unwrap_or_default(),
            })
            .collect();
        let message = Message {
            content: None,
            ..Message::assistant("")
        }
        .with_tool_invocations(invocations);
        let raw = json!({"choices": [{"finish_reason": "tool_calls", "message": message}]});
        InferenceResponse {
            message,
            finish_reason: Some("tool_calls".into()),
            usage: Usage {
                input_tokens: 20,
                output_tokens: 15,
            },
            raw,
        }
    }

    fn test_config(max_iterations: usize) -> OrchestratorConfig {
        OrchestratorConfig {
            model: "test-model".into(),
            max_tokens: 1024,
            max_iterations,
            iteration_timeout: None,
            system_prompt: None,
        }
    }

    fn builtin_tools() -> ToolRegistry {
        ToolRegistry::builtin("http://127.0.0.1:1")
    }

    /// Every assistant tool request is immediately followed by its result.
    fn assert_paired(history: &[Message]) {
        for (i, msg) in history.iter().enumerate() {
            for call in &msg.tool_invocations {
                let next = history.get(i + 1).expect("tool result after request");
                assert_eq!(next.role, Role::Tool);
                assert_eq!(next.tool_invocation_id.as_deref(), Some(call.id.as_str()));
            }
        }
    }

    // --- Tests ---

    #[tokio::test]
    async fn final_answer_without_tools() {
        let provider = MockProvider::new(vec![final_response("Hello!")]);
        let orchestrator = Orchestrator::new(provider, builtin_tools(), test_config(8));

        let result = orchestrator
            .complete(&[Message::user("Say hello")])
            .await
            .unwrap();
        assert_eq!(result.text.as_deref(), Some("Hello!"));
        assert_eq!(result.iterations, 1);
        assert_eq!(
            result.response["choices"][0]["message"]["content"],
            "Hello!"
        );
        assert_eq!(result.response["id"], "gen-final");
        assert_eq!(result.history.len(), 2);
    }

    #[tokio::test]
    async fn tool_round_trip_returns_synthesized_answer() {
        let provider = MockProvider::new(vec![
            tool_response(vec![("call_1", "count_words", json!({"text": "a b c"}))]),
            final_response("That text has 3 words."),
        ]);
        let requests = provider.requests();
        let orchestrator = Orchestrator::new(provider, builtin_tools(), test_config(8));

        let result = orchestrator
            .complete(&[Message::user("How many words in 'a b c'?")])
            .await
            .unwrap();

        assert_eq!(result.text.as_deref(), Some("That text has 3 words."));
        assert_ne!(result.text.as_deref(), Some("3"));
        assert_eq!(result.iterations, 2);
        assert_eq!(result.usage.input_tokens, 30);
        assert_eq!(result.usage.output_tokens, 20);

        let requests = requests.lock().await;
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].messages.len(), 1);
        assert_eq!(requests[0].tools.len(), 4);

        let second = &requests[1].messages;
        assert_eq!(second.len(), 3);
        assert_eq!(second[1].role, Role::Assistant);
        assert_eq!(second[1].tool_invocations[0].id, "call_1");
        assert_eq!(second[2].role, Role::Tool);
        assert_eq!(second[2].tool_invocation_id.as_deref(), Some("call_1"));
        assert_eq!(second[2].content.as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn replaying_a_request_is_idempotent() {
        let orchestrator = Orchestrator::new(ScriptedProvider, builtin_tools(), test_config(8));
        let history = vec![Message::user("one two three four")];

        let first = orchestrator.complete(&history).await.unwrap();
        let second = orchestrator.complete(&history).await.unwrap();

        assert_eq!(first.text.as_deref(), Some("Your text has 4 words."));
        assert_eq!(first.response, second.response);
        assert_eq!(first.history, second.history);
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn only_first_tool_call_is_executed() {
        let calls = Arc::new(AtomicUsize::new(0));
        let tools = ToolRegistry::new().add(
            ToolDeclaration::new("tick", "counts calls", json!({"type": "object"})),
            CountingTool(calls.clone()),
        );
        let provider = MockProvider::new(vec![
            tool_response(vec![
                ("call_a", "tick", json!({})),
                ("call_b", "tick", json!({})),
                ("call_c", "tick", json!({})),
            ]),
            final_response("ticked"),
        ]);
        let orchestrator = Orchestrator::new(provider, tools, test_config(8));

        let result = orchestrator
            .complete(&[Message::user("tick")])
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let tool_messages: Vec<_> = result
            .history
            .iter()
            .filter(|m| m.role == Role::Tool)
            .collect();
        assert_eq!(tool_messages.len(), 1);
        assert_eq!(
            tool_messages[0].tool_invocation_id.as_deref(),
            Some("call_a")
        );
        assert_paired(&result.history);
    }

    #[tokio::test]
    async fn history_keeps_requests_paired_across_rounds() {
        let provider = MockProvider::new(vec![
            tool_response(vec![(
                "c1",
                "analyze_sentiment",
                json!({"text": "I love it"}),
            )]),
            tool_response(vec![
                ("c2", "count_words", json!({"text": "I love it"})),
                ("c3", "get_current_datetime", json!({})),
            ]),
            final_response("Positive, three words."),
        ]);
        let orchestrator = Orchestrator::new(provider, builtin_tools(), test_config(8));

        let result = orchestrator
            .complete(&[Message::user("analyze")])
            .await
            .unwrap();
        assert_eq!(result.iterations, 3);
        assert_eq!(result.history.len(), 6);
        assert_paired(&result.history);
    }

    #[tokio::test]
    async fn tool_errors_are_fed_back_to_the_model() {
        let provider = MockProvider::new(vec![
            tool_response(vec![("call_x", "no_such_tool", json!({}))]),
            tool_response(vec![("call_y", "count_words", json!({}))]),
            final_response("Sorry, I could not do that."),
        ]);
        let requests = provider.requests();
        let orchestrator = Orchestrator::new(provider, builtin_tools(), test_config(8));

        let result = orchestrator
            .complete(&[Message::user("do it")])
            .await
            .unwrap();
        assert_eq!(result.text.as_deref(), Some("Sorry, I could not do that."));

        let requests = requests.lock().await;
        let unknown = requests[1].messages.last().unwrap();
        let unknown = unknown.content.as_deref().unwrap();
        let unknown: Value = serde_json::from_str(unknown).unwrap();
        assert_eq!(unknown["error"], "Failed to execute tool no_such_tool");
        assert_eq!(unknown["details"], "unknown tool: no_such_tool");

        let missing = requests[2].messages.last().unwrap();
        let missing = missing.content.as_deref().unwrap();
        assert!(missing.contains("missing required argument: text"));
    }

    #[tokio::test]
    async fn iteration_limit_is_enforced() {
        let responses = (0..5)
            .map(|i| {
                let id = format!("call_{i}");
                tool_response(vec![(id.as_str(), "count_words", json!({"text": "x"}))])
            })
            .collect();
        let provider = MockProvider::new(responses);
        let requests = provider.requests();
        let orchestrator = Orchestrator::new(provider, builtin_tools(), test_config(3));

        let err = orchestrator
            .complete(&[Message::user("loop")])
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::IterationLimit(3)));
        assert_eq!(requests.lock().await.len(), 3);
    }

    #[tokio::test]
    async fn tool_requested_on_last_iteration_is_not_run() {
        let calls = Arc::new(AtomicUsize::new(0));
        let tools = ToolRegistry::new().add(
            ToolDeclaration::new("tick", "counts calls", json!({"type": "object"})),
            CountingTool(calls.clone()),
        );
        let provider = MockProvider::new(vec![
            tool_response(vec![("call_1", "tick", json!({}))]),
            tool_response(vec![("call_2", "tick", json!({}))]),
        ]);
        let orchestrator = Orchestrator::new(provider, tools, test_config(2));

        let err = orchestrator
            .complete(&[Message::user("tick")])
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::IterationLimit(2)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn api_error_propagates() {
        let provider = MockProvider::failing(InferenceError::ApiError {
            status: 429,
            body: "rate limited".into(),
        });
        let orchestrator = Orchestrator::new(provider, builtin_tools(), test_config(8));

        let err = orchestrator
            .complete(&[Message::user("hi")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("429"));
        assert!(matches!(
            err,
            OrchestratorError::Inference(InferenceError::ApiError { status: 429, .. })
        ));
    }

    #[tokio::test]
    async fn slow_model_call_times_out() {
        let config = OrchestratorConfig {
            iteration_timeout: Some(Duration::from_millis(20)),
            ..test_config(8)
        };
        let orchestrator = Orchestrator::new(SlowProvider, builtin_tools(), config);

        let err = orchestrator
            .complete(&[Message::user("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Timeout(_)));
    }

    #[tokio::test]
    async fn slow_tool_becomes_error_result() {
        let tools = ToolRegistry::new().add(
            ToolDeclaration::new("sleepy", "never returns", json!({"type": "object"})),
            SleepyTool,
        );
        let provider = MockProvider::new(vec![
            tool_response(vec![("call_s", "sleepy", json!({}))]),
            final_response("The tool took too long."),
        ]);
        let requests = provider.requests();
        let config = OrchestratorConfig {
            iteration_timeout: Some(Duration::from_millis(20)),
            ..test_config(8)
        };
        let orchestrator = Orchestrator::new(provider, tools, config);

        let result = orchestrator
            .complete(&[Message::user("sleep")])
            .await
            .unwrap();
        assert_eq!(result.iterations, 2);
        let requests = requests.lock().await;
        let fed_back = requests[1].messages[2].content.as_deref().unwrap();
        assert!(fed_back.contains("Tool sleepy timed out"));
    }

    #[tokio::test]
    async fn cancellation_before_first_call() {
        let provider = MockProvider::new(vec![final_response("should not reach")]);
        let requests = provider.requests();
        let orchestrator = Orchestrator::new(provider, builtin_tools(), test_config(8));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = orchestrator
            .complete_with_cancel(&[Message::user("hi")], cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Cancelled));
        assert!(requests.lock().await.is_empty());
    }

    #[tokio::test]
    async fn cancellation_during_model_call() {
        let orchestrator = Orchestrator::new(SlowProvider, builtin_tools(), test_config(8));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = orchestrator
            .complete_with_cancel(&[Message::user("hi")], cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Cancelled));
    }

    #[tokio::test]
    async fn cancellation_during_tool_call() {
        let tools = ToolRegistry::new().add(
            ToolDeclaration::new("sleepy", "never returns", json!({"type": "object"})),
            SleepyTool,
        );
        let provider = MockProvider::new(vec![
            tool_response(vec![("call_s", "sleepy", json!({}))]),
            final_response("should not reach"),
        ]);
        let requests = provider.requests();
        let orchestrator = Orchestrator::new(provider, tools, test_config(8));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let err = orchestrator
            .complete_with_cancel(&[Message::user("sleep")], cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(requests.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn system_prompt_is_sent_first() {
        let provider = MockProvider::new(vec![final_response("ok")]);
        let requests = provider.requests();
        let config = OrchestratorConfig {
            system_prompt: Some("Use markdown.".into()),
            ..test_config(8)
        };
        let orchestrator = Orchestrator::new(provider, builtin_tools(), config);

        orchestrator.complete(&[Message::user("hi")]).await.unwrap();
        let requests = requests.lock().await;
        assert_eq!(requests[0].messages[0], Message::system("Use markdown."));
        assert_eq!(requests[0].messages[1], Message::user("hi"));
    }
}
