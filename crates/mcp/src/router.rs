//! Tool routing: which provider owns a tool name.
//!
//! Built once per loop invocation from the union of all connected
//! providers' declarations. Routing never invents a default — an unmapped
//! name is an explicit `Unknown` the caller must surface as an error-text
//! function result.

use std::collections::HashMap;

use relayclaw_core::tool::ToolDeclaration;
use tracing::warn;

/// The outcome of routing one tool name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteTarget {
    /// The provider that owns the tool
    Routed(String),
    /// No connected provider declared this name
    Unknown,
}

/// Maps tool names to owning provider ids.
#[derive(Debug, Default)]
pub struct ToolRouter {
    routes: HashMap<String, String>,
}

impl ToolRouter {
    /// Build the routing table from declarations in registration order.
    ///
    /// When two providers declare the same name, the first-registered
    /// provider wins; the collision is logged so the ambiguity is visible.
    pub fn from_declarations<'a>(declarations: impl IntoIterator<Item = &'a ToolDeclaration>) -> Self {
        let mut routes: HashMap<String, String> = HashMap::new();
        for decl in declarations {
            if let Some(existing) = routes.get(&decl.name) {
                warn!(
                    tool = %decl.name,
                    kept = %existing,
                    ignored = %decl.provider_id,
                    "duplicate tool name; first-registered provider wins"
                );
                continue;
            }
            routes.insert(decl.name.clone(), decl.provider_id.clone());
        }
        Self { routes }
    }

    /// Resolve a tool name to its owning provider.
    pub fn route(&self, name: &str) -> RouteTarget {
        match self.routes.get(name) {
            Some(provider_id) => RouteTarget::Routed(provider_id.clone()),
            None => RouteTarget::Unknown,
        }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decl(name: &str, provider: &str) -> ToolDeclaration {
        ToolDeclaration {
            name: name.into(),
            description: String::new(),
            parameters: json!({"type": "object"}),
            original_schema: json!({"type": "object"}),
            provider_id: provider.into(),
        }
    }

    #[test]
    fn routes_to_owning_provider() {
        let decls = vec![decl("createRepo", "github"), decl("deploy", "railway")];
        let router = ToolRouter::from_declarations(&decls);
        assert_eq!(router.route("deploy"), RouteTarget::Routed("railway".into()));
        assert_eq!(router.route("createRepo"), RouteTarget::Routed("github".into()));
    }

    #[test]
    fn unknown_name_is_not_defaulted() {
        let decls = vec![decl("createRepo", "github")];
        let router = ToolRouter::from_declarations(&decls);
        assert_eq!(router.route("hallucinated"), RouteTarget::Unknown);
    }

    #[test]
    fn duplicate_name_prefers_first_registered() {
        let decls = vec![decl("deploy", "github"), decl("deploy", "railway")];
        let router = ToolRouter::from_declarations(&decls);
        assert_eq!(router.route("deploy"), RouteTarget::Routed("github".into()));
        assert_eq!(router.len(), 1);
    }

    #[test]
    fn empty_declarations_empty_router() {
        let empty: Vec<ToolDeclaration> = vec![];
        let router = ToolRouter::from_declarations(&empty);
        assert!(router.is_empty());
        assert_eq!(router.route("anything"), RouteTarget::Unknown);
    }
}
