//! The session's tool surface.
//!
//! Exactly one client function exists today (`navigate`), so dispatch is a
//! closed enum rather than open-ended string matching. Unknown tool names
//! are answered with an error result instead of being dropped, so the model
//! can recover in-conversation.

use serde_json::json;

use crate::error::LiveError;
use crate::types::{FunctionCall, FunctionDeclaration, FunctionResponse};

pub(crate) const NAVIGATE_TOOL: &str = "navigate";

/// A tool call the session knows how to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolInvocation {
    /// Open an app screen by path.
    Navigate { page: String },
}

impl ToolInvocation {
    /// Interprets a wire function call. Presence of the `page` argument is
    /// the only validation performed on navigation targets.
    pub fn parse(call: &FunctionCall) -> Result<Self, LiveError> {
        match call.name.as_str() {
            NAVIGATE_TOOL => {
                let page = call
                    .args
                    .get("page")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| {
                        LiveError::Api("navigate call is missing the page argument".to_string())
                    })?;
                Ok(ToolInvocation::Navigate {
                    page: page.to_string(),
                })
            }
            other => Err(LiveError::Api(format!("unsupported tool: {}", other))),
        }
    }
}

/// Declaration advertised in the session setup.
pub(crate) fn navigation_declaration(paths_hint: &str) -> FunctionDeclaration {
    FunctionDeclaration {
        name: NAVIGATE_TOOL.to_string(),
        description: Some("Navigate the user to a specific page in the app.".to_string()),
        parameters: json!({
            "type": "OBJECT",
            "properties": {
                "page": {
                    "type": "STRING",
                    "description": format!("The path to navigate to. Valid options: {}.", paths_hint),
                }
            },
            "required": ["page"],
        }),
    }
}

/// Confirmation sent back once navigation was handed to the embedder,
/// keyed by the original call id.
pub(crate) fn navigation_confirmation(call: &FunctionCall, page: &str) -> FunctionResponse {
    FunctionResponse {
        id: call.id.clone(),
        name: call.name.clone(),
        response: json!({ "result": format!("Navigated to {}", page) }),
    }
}

/// Error result for calls the session cannot execute.
pub(crate) fn failure_response(call: &FunctionCall, error: &LiveError) -> FunctionResponse {
    FunctionResponse {
        id: call.id.clone(),
        name: call.name.clone(),
        response: json!({ "error": error.to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(name: &str, args: serde_json::Value) -> FunctionCall {
        FunctionCall {
            id: Some("fc-1".to_string()),
            name: name.to_string(),
            args,
        }
    }

    #[test]
    fn parses_navigate_with_page() {
        let invocation =
            ToolInvocation::parse(&call(NAVIGATE_TOOL, json!({ "page": "/medications" }))).unwrap();
        assert_eq!(
            invocation,
            ToolInvocation::Navigate {
                page: "/medications".to_string()
            }
        );
    }

    #[test]
    fn rejects_navigate_without_page() {
        let err = ToolInvocation::parse(&call(NAVIGATE_TOOL, json!({}))).unwrap_err();
        assert!(matches!(err, LiveError::Api(_)));
    }

    #[test]
    fn rejects_unknown_tool_names() {
        let err = ToolInvocation::parse(&call("set_reminder", json!({ "at": "9am" }))).unwrap_err();
        assert!(err.to_string().contains("unsupported tool"));
    }

    #[test]
    fn confirmation_references_the_original_call() {
        let call = call(NAVIGATE_TOOL, json!({ "page": "/medications" }));
        let response = navigation_confirmation(&call, "/medications");
        assert_eq!(response.id.as_deref(), Some("fc-1"));
        assert_eq!(response.name, NAVIGATE_TOOL);
        assert_eq!(response.response["result"], "Navigated to /medications");
    }

    #[test]
    fn declaration_requires_the_page_argument() {
        let decl = navigation_declaration("\"/dashboard\", \"/medications\"");
        assert_eq!(decl.name, NAVIGATE_TOOL);
        assert_eq!(decl.parameters["required"][0], "page");
    }
}
