//! The satisfaction-driven agent loop.
//!
//! One call to [`AgentLoop::run_turn`] handles one user message end to end:
//! discover tools from the configured providers, sample the model, execute
//! any function calls it emits, and repeat until the model signals
//! satisfaction or the iteration budget runs out. Failures along the way
//! become data the model can react to, never errors thrown at the channel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use relayclaw_config::AppConfig;
use relayclaw_core::completion::{CompletionClient, CompletionRequest};
use relayclaw_core::message::Message;
use relayclaw_core::tool::{FunctionCall, FunctionResult, ToolDeclaration};
use relayclaw_mcp::{filter_arguments, McpSession, RouteTarget, SessionOptions, ToolRouter};
use tracing::{debug, info, warn};

use crate::prompt;

/// Marker the model appends when the user's request is fully addressed.
pub const SATISFIED_MARKER: &str = "[SATISFIED]";

/// Marker the model appends on internal reasoning turns.
pub const CLARIFY_MARKER: &str = "[CLARIFY]";

/// Fallback reply when the loop exhausts its budget without an answer.
const EXHAUSTED_APOLOGY: &str =
    "I apologize, but I couldn't generate a response. Please try rephrasing your question.";

/// The outcome of one conversation turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Channel-visible reply text (pre post-processing)
    pub text: String,

    /// Whether the model reached a satisfied terminal state
    pub satisfied: bool,

    /// Sampling calls spent on this turn
    pub iterations: u32,
}

/// Drives the sample/execute cycle for one user at a time.
pub struct AgentLoop {
    /// The completion backend
    client: Arc<dyn CompletionClient>,

    /// Application configuration (model, providers, budgets)
    config: AppConfig,
}

impl AgentLoop {
    pub fn new(client: Arc<dyn CompletionClient>, config: AppConfig) -> Self {
        Self { client, config }
    }

    fn session_options(&self) -> SessionOptions {
        SessionOptions {
            connect_timeout: Duration::from_secs(self.config.agent.connect_timeout_secs),
            call_timeout: Duration::from_secs(self.config.agent.tool_timeout_secs),
        }
    }

    /// Run one conversation turn.
    ///
    /// `history` is the already-windowed prior conversation; `credential`
    /// is the user's tool-provider token, if any. The returned text has not
    /// yet been through channel post-processing.
    pub async fn run_turn(
        &self,
        history: &[Message],
        user_message: &str,
        credential: Option<&str>,
    ) -> TurnOutcome {
        let declarations = self.discover_tools(credential).await;
        let router = ToolRouter::from_declarations(&declarations);
        let by_name: HashMap<&str, &ToolDeclaration> = declarations
            .iter()
            .map(|d| (d.name.as_str(), d))
            .collect();

        info!(
            tools = declarations.len(),
            history = history.len(),
            "Starting conversation turn"
        );

        let mut contents = vec![
            Message::user(prompt::build_system_prompt(
                self.config.system_prompt_override.as_deref(),
            )),
            Message::model(prompt::SYSTEM_ACK),
        ];
        contents.extend(history.iter().cloned());
        contents.push(Message::user(user_message));

        let max_iterations = self.config.agent.max_iterations;
        let mut iterations = 0;

        while iterations < max_iterations {
            iterations += 1;
            debug!(iteration = iterations, "Sampling");

            let request = CompletionRequest {
                contents: contents.clone(),
                tools: declarations.clone(),
                temperature: self.config.temperature,
                max_output_tokens: self.config.max_output_tokens,
            };

            let sampling_timeout =
                Duration::from_secs(self.config.agent.sampling_timeout_secs);
            let reply = match tokio::time::timeout(
                sampling_timeout,
                self.client.generate(request),
            )
            .await
            {
                Ok(Ok(reply)) => reply,
                Ok(Err(e)) => {
                    warn!(iteration = iterations, error = %e, "Sampling failed");
                    continue;
                }
                Err(_) => {
                    warn!(
                        iteration = iterations,
                        timeout_secs = sampling_timeout.as_secs(),
                        "Sampling timed out"
                    );
                    continue;
                }
            };

            if !reply.function_calls.is_empty() {
                if reply.text.is_some() {
                    // Calls take precedence over any text or marker in the
                    // same reply; the marker gets its say next iteration.
                    debug!("Reply carried text alongside function calls; text discarded");
                }
                let calls = reply.function_calls;
                info!(calls = calls.len(), "Executing function calls");

                let results = self
                    .execute_calls(&calls, &router, &by_name, credential)
                    .await;
                let joined = results
                    .iter()
                    .map(FunctionResult::render)
                    .collect::<Vec<_>>()
                    .join("\n");

                contents.push(Message::model(format!(
                    "I'll execute {} function(s) for you.",
                    calls.len()
                )));
                contents.push(Message::user(format!("Function results:\n{joined}")));
                continue;
            }

            let text = match reply.text.as_deref().map(str::trim) {
                Some(t) if !t.is_empty() => t.to_string(),
                _ => {
                    warn!(iteration = iterations, "Empty sample");
                    continue;
                }
            };

            if text.contains(SATISFIED_MARKER) {
                let cleaned = strip_marker(&text, SATISFIED_MARKER);
                info!(iterations, "Turn satisfied");
                return TurnOutcome {
                    text: cleaned,
                    satisfied: true,
                    iterations,
                };
            }

            if text.contains(CLARIFY_MARKER) {
                // Internal reasoning turn; never shown to the user.
                let cleaned = strip_marker(&text, CLARIFY_MARKER);
                debug!(iteration = iterations, "Clarification turn");
                contents.push(Message::model(cleaned));
                continue;
            }

            // Plain text with no marker is a direct answer.
            info!(iterations, "Turn answered without marker");
            return TurnOutcome {
                text,
                satisfied: true,
                iterations,
            };
        }

        warn!(iterations, "Iteration budget exhausted");
        TurnOutcome {
            text: EXHAUSTED_APOLOGY.to_string(),
            satisfied: false,
            iterations,
        }
    }

    /// Connect to each enabled provider and collect its tool declarations.
    ///
    /// A provider that fails to connect or list contributes zero tools;
    /// the turn proceeds with whatever the rest offered.
    async fn discover_tools(&self, credential: Option<&str>) -> Vec<ToolDeclaration> {
        let options = self.session_options();
        let discoveries = self.config.enabled_providers().map(|provider| async move {
            match McpSession::connect(provider, credential, options).await {
                Ok(mut session) => {
                    let tools = session.list_tools().await;
                    session.close().await;
                    tools
                }
                Err(e) => {
                    warn!(provider = %provider.id, error = %e, "Tool provider unavailable");
                    Vec::new()
                }
            }
        });
        join_all(discoveries).await.into_iter().flatten().collect()
    }

    /// Dispatch one iteration's function calls.
    ///
    /// Calls are grouped by owning provider; each group shares one session,
    /// groups run concurrently. Every call produces a result in input
    /// order, failures included.
    async fn execute_calls(
        &self,
        calls: &[FunctionCall],
        router: &ToolRouter,
        declarations: &HashMap<&str, &ToolDeclaration>,
        credential: Option<&str>,
    ) -> Vec<FunctionResult> {
        let mut results: Vec<Option<FunctionResult>> = vec![None; calls.len()];
        let mut grouped: Vec<(String, Vec<usize>)> = Vec::new();

        for (i, call) in calls.iter().enumerate() {
            match router.route(&call.name) {
                RouteTarget::Routed(provider_id) => {
                    match grouped.iter_mut().find(|(id, _)| *id == provider_id) {
                        Some((_, indices)) => indices.push(i),
                        None => grouped.push((provider_id, vec![i])),
                    }
                }
                RouteTarget::Unknown => {
                    warn!(tool = %call.name, "Model requested an unknown tool");
                    results[i] = Some(FunctionResult::error(
                        &call.name,
                        format!(
                            "Error executing function: no connected provider offers '{}'",
                            call.name
                        ),
                    ));
                }
            }
        }

        let options = self.session_options();
        let batches = grouped.into_iter().map(|(provider_id, indices)| {
            let provider = self.config.providers.iter().find(|p| p.id == provider_id);
            async move {
                let mut out = Vec::with_capacity(indices.len());
                let Some(provider) = provider else {
                    for i in indices {
                        out.push((
                            i,
                            FunctionResult::error(
                                &calls[i].name,
                                format!(
                                    "Error executing function: provider '{provider_id}' is not configured"
                                ),
                            ),
                        ));
                    }
                    return out;
                };

                match McpSession::connect(provider, credential, options).await {
                    Ok(mut session) => {
                        for i in indices {
                            let call = &calls[i];
                            let arguments = match declarations.get(call.name.as_str()) {
                                Some(decl) => {
                                    filter_arguments(&call.arguments, &decl.original_schema)
                                }
                                None => call.arguments.clone(),
                            };
                            out.push((i, session.call_tool(&call.name, arguments).await));
                        }
                        session.close().await;
                    }
                    Err(e) => {
                        for i in indices {
                            out.push((
                                i,
                                FunctionResult::error(
                                    &calls[i].name,
                                    format!("Error executing function: {e}"),
                                ),
                            ));
                        }
                    }
                }
                out
            }
        });

        for (i, result) in join_all(batches).await.into_iter().flatten() {
            results[i] = Some(result);
        }

        results
            .into_iter()
            .enumerate()
            .map(|(i, r)| {
                r.unwrap_or_else(|| {
                    FunctionResult::error(
                        &calls[i].name,
                        "Error executing function: no result produced",
                    )
                })
            })
            .collect()
    }
}

/// Remove every occurrence of `marker` and trim the remainder.
fn strip_marker(text: &str, marker: &str) -> String {
    text.replace(marker, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use relayclaw_core::completion::CompletionReply;
    use relayclaw_core::error::ProviderError;
    use std::sync::Mutex;

    /// Completion client that replays a fixed script and records requests.
    struct ScriptedClient {
        replies: Mutex<Vec<Result<CompletionReply, ProviderError>>>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedClient {
        fn new(replies: Vec<Result<CompletionReply, ProviderError>>) -> Self {
            Self {
                replies: Mutex::new(replies),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn sample_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn request(&self, n: usize) -> CompletionRequest {
            self.requests.lock().unwrap()[n].clone()
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionReply, ProviderError> {
            self.requests.lock().unwrap().push(request);
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                return Err(ProviderError::EmptyReply);
            }
            replies.remove(0)
        }
    }

    fn text_reply(text: &str) -> Result<CompletionReply, ProviderError> {
        Ok(CompletionReply {
            text: Some(text.to_string()),
            function_calls: vec![],
        })
    }

    fn call_reply(name: &str, text: Option<&str>) -> Result<CompletionReply, ProviderError> {
        Ok(CompletionReply {
            text: text.map(str::to_string),
            function_calls: vec![FunctionCall {
                name: name.to_string(),
                arguments: serde_json::Map::new(),
            }],
        })
    }

    fn agent_with(replies: Vec<Result<CompletionReply, ProviderError>>) -> (Arc<ScriptedClient>, AgentLoop) {
        let client = Arc::new(ScriptedClient::new(replies));
        let config = AppConfig::default();
        (client.clone(), AgentLoop::new(client, config))
    }

    #[tokio::test]
    async fn satisfied_marker_stops_at_first_iteration() {
        let (client, agent) = agent_with(vec![text_reply("Done! [SATISFIED]")]);

        let outcome = agent.run_turn(&[], "create the repo", None).await;

        assert_eq!(outcome.text, "Done!");
        assert!(outcome.satisfied);
        assert_eq!(outcome.iterations, 1);
        assert_eq!(client.sample_count(), 1);
    }

    #[tokio::test]
    async fn plain_text_is_a_final_answer() {
        let (_, agent) = agent_with(vec![text_reply("Rust is a systems language.")]);

        let outcome = agent.run_turn(&[], "what is rust", None).await;

        assert!(outcome.satisfied);
        assert_eq!(outcome.text, "Rust is a systems language.");
    }

    #[tokio::test]
    async fn clarifications_never_reach_the_channel() {
        let (client, agent) = agent_with(vec![
            text_reply("First I should check the branch. [CLARIFY]"),
            text_reply("All merged. [SATISFIED]"),
        ]);

        let outcome = agent.run_turn(&[], "merge it", None).await;

        assert_eq!(outcome.text, "All merged.");
        assert_eq!(outcome.iterations, 2);
        // The clarification text fed the next sample as a model turn.
        let second = client.request(1);
        assert!(second
            .contents
            .iter()
            .any(|m| m.content == "First I should check the branch."));
    }

    #[tokio::test]
    async fn exhausts_after_exactly_max_iterations_of_clarification() {
        let replies = (0..6).map(|i| text_reply(&format!("step {i} [CLARIFY]"))).collect();
        let (client, agent) = agent_with(replies);

        let outcome = agent.run_turn(&[], "do the thing", None).await;

        assert!(!outcome.satisfied);
        assert_eq!(outcome.iterations, 5);
        assert_eq!(client.sample_count(), 5);
        assert!(outcome.text.contains("apologize"));
    }

    #[tokio::test]
    async fn function_calls_take_precedence_over_markers() {
        let (client, agent) = agent_with(vec![
            call_reply("deploy", Some("Done! [SATISFIED]")),
            text_reply("Deployed. [SATISFIED]"),
        ]);

        let outcome = agent.run_turn(&[], "deploy it", None).await;

        // The first reply's marker was deferred; the call executed (as an
        // unknown-tool error, since no providers are configured) and its
        // result went back to the model.
        assert_eq!(outcome.text, "Deployed.");
        assert_eq!(outcome.iterations, 2);
        let second = client.request(1);
        let results_turn = second
            .contents
            .iter()
            .find(|m| m.content.starts_with("Function results:"))
            .expect("results turn present");
        assert!(results_turn.content.contains("deploy:"));
        assert!(results_turn.content.contains("no connected provider"));
    }

    #[tokio::test]
    async fn failed_samples_retry_within_budget() {
        let (client, agent) = agent_with(vec![
            Err(ProviderError::Network("connection reset".into())),
            text_reply(""),
            text_reply("Recovered. [SATISFIED]"),
        ]);

        let outcome = agent.run_turn(&[], "hello", None).await;

        assert_eq!(outcome.text, "Recovered.");
        assert_eq!(outcome.iterations, 3);
        assert_eq!(client.sample_count(), 3);
    }

    #[tokio::test]
    async fn history_precedes_current_message() {
        let (client, agent) = agent_with(vec![text_reply("ok [SATISFIED]")]);
        let history = vec![Message::user("earlier"), Message::model("noted")];

        agent.run_turn(&history, "now this", None).await;

        let request = client.request(0);
        let contents: Vec<&str> = request.contents.iter().map(|m| m.content.as_str()).collect();
        let earlier = contents.iter().position(|c| *c == "earlier").unwrap();
        let current = contents.iter().position(|c| *c == "now this").unwrap();
        assert!(earlier < current);
        // System prompt pair leads the conversation.
        assert!(contents[0].contains("[SATISFIED]"));
    }

    #[test]
    fn strip_marker_trims_remainder() {
        assert_eq!(strip_marker("Done! [SATISFIED]", SATISFIED_MARKER), "Done!");
        assert_eq!(strip_marker("[CLARIFY] thinking", CLARIFY_MARKER), "thinking");
    }
}
