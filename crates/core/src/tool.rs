//! Tool-calling value objects.
//!
//! A `ToolDeclaration` is what the model is shown so it can decide whether
//! and how to invoke a tool; a `FunctionCall` is what it emits back; a
//! `FunctionResult` is what the tool provider answers with. Declarations
//! are built fresh each loop invocation — provider processes are
//! short-lived, so caching them across turns would describe tools that no
//! longer exist.

use serde::{Deserialize, Serialize};

/// A tool made available to the model for one loop invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDeclaration {
    /// Tool name — unique across all connected providers within one
    /// invocation (first-registered provider wins on collision).
    pub name: String,

    /// Description of what the tool does (sent to the model).
    pub description: String,

    /// Parameter schema with completion-API-unsupported keys stripped.
    pub parameters: serde_json::Value,

    /// The provider's schema as declared, kept for argument filtering
    /// (the `required` list must come from the unsanitized original).
    pub original_schema: serde_json::Value,

    /// The tool provider that owns this tool.
    pub provider_id: String,
}

/// A function call emitted by the model. Not trusted as-is: arguments go
/// through the argument filter before dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Name of the tool the model wants to invoke
    pub name: String,

    /// Raw arguments mapping as produced by the model
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

/// The outcome of dispatching one function call.
///
/// Failures are data: an error result carries descriptive text the loop
/// controller feeds back to the model, exactly like a success would.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResult {
    /// The call this result answers
    pub call_name: String,

    /// Text payload — pretty JSON when the provider's reply parses,
    /// raw text otherwise, or an error description.
    pub text: String,

    /// Whether the call executed successfully
    pub success: bool,
}

impl FunctionResult {
    pub fn ok(call_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            call_name: call_name.into(),
            text: text.into(),
            success: true,
        }
    }

    pub fn error(call_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            call_name: call_name.into(),
            text: text.into(),
            success: false,
        }
    }

    /// Render for the synthetic user turn that carries results back to the
    /// model: `name: payload`.
    pub fn render(&self) -> String {
        format!("{}: {}", self.call_name, self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn declaration_keeps_both_schemas() {
        let decl = ToolDeclaration {
            name: "createFile".into(),
            description: "Create a file in a repository".into(),
            parameters: json!({"type": "object"}),
            original_schema: json!({"type": "object", "additionalProperties": false}),
            provider_id: "github".into(),
        };
        assert!(decl.parameters.get("additionalProperties").is_none());
        assert!(decl.original_schema.get("additionalProperties").is_some());
    }

    #[test]
    fn result_render_includes_call_name() {
        let res = FunctionResult::ok("getRepo", "{\n  \"name\": \"demo\"\n}");
        assert!(res.render().starts_with("getRepo: "));
    }

    #[test]
    fn error_result_is_not_success() {
        let res = FunctionResult::error("deploy", "Error executing function: timeout");
        assert!(!res.success);
        assert!(res.text.contains("timeout"));
    }

    #[test]
    fn function_call_roundtrip() {
        let call = FunctionCall {
            name: "createRepo".into(),
            arguments: json!({"name": "demo", "private": true})
                .as_object()
                .unwrap()
                .clone(),
        };
        let json = serde_json::to_string(&call).unwrap();
        let back: FunctionCall = serde_json::from_str(&json).unwrap();
        assert_eq!(back, call);
    }
}
