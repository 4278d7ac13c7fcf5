//! Scoped stdio session to one subprocess tool provider.
//!
//! Speaks line-delimited JSON-RPC 2.0 (the framing of the reference MCP
//! stdio servers). A session's lifetime is exactly one logical unit of
//! work: one tool-discovery call, or one batch of tool invocations for one
//! loop iteration. `close()` runs on every exit path; `kill_on_drop`
//! backstops the paths that never reach it.

use std::process::Stdio;
use std::time::Duration;

use relayclaw_config::ToolProviderConfig;
use relayclaw_core::error::McpError;
use relayclaw_core::tool::{FunctionResult, ToolDeclaration};
use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, warn};

/// MCP protocol revision this client speaks.
const PROTOCOL_VERSION: &str = "2024-11-05";

/// Timeouts applied to session setup and to each request/response pair.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub connect_timeout: Duration,
    pub call_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            call_timeout: Duration::from_secs(60),
        }
    }
}

/// An open session to one tool provider subprocess.
#[derive(Debug)]
pub struct McpSession {
    provider_id: String,
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
    call_timeout: Duration,
}

impl McpSession {
    /// Spawn the provider process and perform the `initialize` handshake.
    ///
    /// `credential` is injected into the subprocess environment under the
    /// provider's configured `credential_env` name.
    pub async fn connect(
        config: &ToolProviderConfig,
        credential: Option<&str>,
        options: SessionOptions,
    ) -> Result<Self, McpError> {
        let mut command = Command::new(&config.command);
        command
            .args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        if let (Some(var), Some(token)) = (config.credential_env.as_deref(), credential) {
            command.env(var, token);
        }

        let mut child = command.spawn().map_err(|e| McpError::Unavailable {
            provider_id: config.id.clone(),
            reason: format!("failed to launch {}: {e}", config.command),
        })?;

        let stdin = child.stdin.take().ok_or_else(|| McpError::Unavailable {
            provider_id: config.id.clone(),
            reason: "no stdin handle on child process".into(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| McpError::Unavailable {
            provider_id: config.id.clone(),
            reason: "no stdout handle on child process".into(),
        })?;

        let mut session = Self {
            provider_id: config.id.clone(),
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 0,
            call_timeout: options.call_timeout,
        };

        let handshake = async {
            session
                .request(
                    "initialize",
                    json!({
                        "protocolVersion": PROTOCOL_VERSION,
                        "capabilities": {},
                        "clientInfo": {
                            "name": "relayclaw",
                            "version": env!("CARGO_PKG_VERSION"),
                        },
                    }),
                )
                .await?;
            session.notify("notifications/initialized").await
        };

        match tokio::time::timeout(options.connect_timeout, handshake).await {
            Ok(Ok(())) => {
                debug!(provider = %session.provider_id, "MCP session initialized");
                Ok(session)
            }
            Ok(Err(e)) => {
                session.close().await;
                Err(e)
            }
            Err(_) => {
                session.close().await;
                Err(McpError::Unavailable {
                    provider_id: config.id.clone(),
                    reason: format!(
                        "initialize handshake timed out after {}s",
                        options.connect_timeout.as_secs()
                    ),
                })
            }
        }
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    /// List the provider's tools as declarations ready for the model.
    ///
    /// Never raises: any connection, protocol, or provider-side failure
    /// logs and returns an empty sequence, making a failed provider
    /// equivalent to "provider offers zero tools".
    pub async fn list_tools(&mut self) -> Vec<ToolDeclaration> {
        let result = match self.timed_request("tools/list", json!({})).await {
            Ok(result) => result,
            Err(e) => {
                warn!(provider = %self.provider_id, error = %e, "tool discovery failed");
                return Vec::new();
            }
        };

        let Some(tools) = result.get("tools").and_then(Value::as_array) else {
            warn!(provider = %self.provider_id, "tools/list result missing tools array");
            return Vec::new();
        };

        let mut declarations = Vec::new();
        for tool in tools {
            let Some(name) = tool.get("name").and_then(Value::as_str) else {
                continue;
            };
            let original_schema = tool
                .get("inputSchema")
                .cloned()
                .unwrap_or_else(|| json!({"type": "object"}));
            declarations.push(ToolDeclaration {
                name: name.to_string(),
                description: tool
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                parameters: crate::sanitize::sanitize_schema(&original_schema),
                original_schema,
                provider_id: self.provider_id.clone(),
            });
        }

        debug!(
            provider = %self.provider_id,
            count = declarations.len(),
            "discovered tools"
        );
        declarations
    }

    /// Execute one tool call within this session.
    ///
    /// Execution failures are data, not control flow: every outcome —
    /// provider error, timeout, unparseable reply — comes back as a
    /// `FunctionResult` so the loop controller always has something to
    /// feed the model.
    pub async fn call_tool(&mut self, name: &str, arguments: Map<String, Value>) -> FunctionResult {
        let params = json!({
            "name": name,
            "arguments": Value::Object(arguments),
        });

        let result = match self.timed_request("tools/call", params).await {
            Ok(result) => result,
            Err(e) => {
                warn!(provider = %self.provider_id, tool = %name, error = %e, "tool call failed");
                return FunctionResult::error(name, format!("Error executing function: {e}"));
            }
        };

        let text = extract_content_text(&result);

        // MCP tool-level failures arrive as a normal result with isError set
        if result.get("isError").and_then(Value::as_bool) == Some(true) {
            return FunctionResult::error(
                name,
                if text.is_empty() {
                    "Error executing function: provider reported failure".into()
                } else {
                    text
                },
            );
        }

        if text.is_empty() {
            return FunctionResult::ok(name, "Function executed successfully but returned no content.");
        }

        FunctionResult::ok(name, reformat_if_json(&text))
    }

    /// Kill the provider process. Safe to call more than once.
    pub async fn close(&mut self) {
        let _ = self.child.start_kill();
        let _ = self.child.wait().await;
    }

    /// One request/response pair boxed with the per-call timeout.
    async fn timed_request(&mut self, method: &str, params: Value) -> Result<Value, McpError> {
        let timeout_secs = self.call_timeout.as_secs();
        match tokio::time::timeout(self.call_timeout, self.request(method, params)).await {
            Ok(result) => result,
            Err(_) => Err(McpError::Timeout {
                tool: method.to_string(),
                timeout_secs,
            }),
        }
    }

    /// Send a request and read frames until the matching response arrives.
    /// Server-initiated notifications and requests are skipped.
    async fn request(&mut self, method: &str, params: Value) -> Result<Value, McpError> {
        self.next_id += 1;
        let id = self.next_id;

        let frame = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        self.write_frame(&frame).await?;

        loop {
            let message = self.read_frame().await?;

            if message.get("id").and_then(Value::as_u64) != Some(id)
                || message.get("method").is_some()
            {
                continue;
            }

            if let Some(error) = message.get("error") {
                let reason = error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string();
                return Err(McpError::Protocol {
                    provider_id: self.provider_id.clone(),
                    reason,
                });
            }

            return Ok(message.get("result").cloned().unwrap_or(Value::Null));
        }
    }

    /// Fire a notification (no id, no response expected).
    async fn notify(&mut self, method: &str) -> Result<(), McpError> {
        let frame = json!({ "jsonrpc": "2.0", "method": method });
        self.write_frame(&frame).await
    }

    async fn write_frame(&mut self, frame: &Value) -> Result<(), McpError> {
        let mut line = serde_json::to_vec(frame).map_err(|e| McpError::Protocol {
            provider_id: self.provider_id.clone(),
            reason: e.to_string(),
        })?;
        line.push(b'\n');

        let io_err = |e: std::io::Error| McpError::Protocol {
            provider_id: self.provider_id.clone(),
            reason: format!("write failed: {e}"),
        };
        self.stdin.write_all(&line).await.map_err(io_err)?;
        self.stdin.flush().await.map_err(io_err)?;
        Ok(())
    }

    async fn read_frame(&mut self) -> Result<Value, McpError> {
        loop {
            let mut line = String::new();
            let n = self
                .reader
                .read_line(&mut line)
                .await
                .map_err(|e| McpError::Protocol {
                    provider_id: self.provider_id.clone(),
                    reason: format!("read failed: {e}"),
                })?;

            if n == 0 {
                return Err(McpError::Protocol {
                    provider_id: self.provider_id.clone(),
                    reason: "provider closed its stdout".into(),
                });
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str(trimmed) {
                Ok(value) => return Ok(value),
                // Providers sometimes leak banners to stdout before speaking
                // JSON-RPC; skip anything that isn't a frame.
                Err(_) => continue,
            }
        }
    }
}

/// Join the `text` items of an MCP content array.
fn extract_content_text(result: &Value) -> String {
    result
        .get("content")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter(|item| item.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|item| item.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default()
}

/// Re-serialize JSON payloads for readability; pass raw text through.
fn reformat_if_json(text: &str) -> String {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| text.to_string()),
        Err(_) => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extract_text_joins_items() {
        let result = json!({
            "content": [
                {"type": "text", "text": "line one"},
                {"type": "image", "data": "..."},
                {"type": "text", "text": "line two"}
            ]
        });
        assert_eq!(extract_content_text(&result), "line one\nline two");
    }

    #[test]
    fn extract_text_handles_missing_content() {
        assert_eq!(extract_content_text(&json!({})), "");
    }

    #[test]
    fn json_payload_is_prettified() {
        let out = reformat_if_json(r#"{"name":"demo","stars":3}"#);
        assert!(out.contains("\n"));
        assert!(out.contains("\"name\": \"demo\""));
    }

    #[test]
    fn non_json_payload_passes_through() {
        assert_eq!(reformat_if_json("plain result text"), "plain result text");
    }

    // Integration-style tests against a scripted provider. `cat` is not a
    // JSON-RPC server, but /bin/sh can fake one well enough to exercise
    // connect, discovery, invocation, and failure paths.

    fn fake_provider(script: &str) -> ToolProviderConfig {
        ToolProviderConfig {
            id: "fake".into(),
            command: "/bin/sh".into(),
            args: vec!["-c".into(), script.into()],
            env: Default::default(),
            credential_env: None,
            enabled: true,
        }
    }

    /// A provider that answers initialize, tools/list, and tools/call in
    /// order, ignoring request bodies.
    const SCRIPTED: &str = r#"
read line
echo '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05"}}'
read line
read line
echo '{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"getRepo","description":"Fetch a repo","inputSchema":{"type":"object","additionalProperties":false,"required":["owner"],"properties":{"owner":{"type":"string"}}}}]}}'
read line
echo '{"jsonrpc":"2.0","id":3,"result":{"content":[{"type":"text","text":"{\"name\":\"demo\"}"}]}}'
sleep 1
"#;

    #[tokio::test]
    async fn scripted_discovery_and_call() {
        let config = fake_provider(SCRIPTED);
        let mut session = McpSession::connect(&config, None, SessionOptions::default())
            .await
            .expect("connect should succeed");

        let tools = session.list_tools().await;
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "getRepo");
        assert_eq!(tools[0].provider_id, "fake");
        // sanitized copy lost the marker, original kept it
        assert!(tools[0].parameters.get("additionalProperties").is_none());
        assert!(tools[0].original_schema.get("additionalProperties").is_some());

        let result = session.call_tool("getRepo", Map::new()).await;
        assert!(result.success);
        assert!(result.text.contains("\"name\": \"demo\""));

        session.close().await;
    }

    #[tokio::test]
    async fn unavailable_provider_is_an_error() {
        let config = ToolProviderConfig {
            id: "ghost".into(),
            command: "/nonexistent/definitely-not-a-binary".into(),
            args: vec![],
            env: Default::default(),
            credential_env: None,
            enabled: true,
        };
        let err = McpSession::connect(&config, None, SessionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn handshake_timeout_degrades_to_unavailable() {
        // Provider that never answers
        let config = fake_provider("sleep 30");
        let options = SessionOptions {
            connect_timeout: Duration::from_millis(200),
            call_timeout: Duration::from_millis(200),
        };
        let err = McpSession::connect(&config, None, options).await.unwrap_err();
        assert!(matches!(err, McpError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn discovery_failure_returns_empty() {
        // Answers the handshake, then exits before tools/list
        let script = r#"
read line
echo '{"jsonrpc":"2.0","id":1,"result":{}}'
"#;
        let config = fake_provider(script);
        let mut session = McpSession::connect(&config, None, SessionOptions::default())
            .await
            .expect("connect should succeed");
        assert!(session.list_tools().await.is_empty());
        session.close().await;
    }

    #[tokio::test]
    async fn tool_error_becomes_error_result() {
        let script = r#"
read line
echo '{"jsonrpc":"2.0","id":1,"result":{}}'
read line
read line
echo '{"jsonrpc":"2.0","id":2,"result":{"isError":true,"content":[{"type":"text","text":"repo not found"}]}}'
sleep 1
"#;
        let config = fake_provider(script);
        let mut session = McpSession::connect(&config, None, SessionOptions::default())
            .await
            .expect("connect should succeed");
        let result = session.call_tool("getRepo", Map::new()).await;
        assert!(!result.success);
        assert!(result.text.contains("repo not found"));
        session.close().await;
    }
}
