//! Search-phrase derivation.
//!
//! Every tool is represented in the vector store by a *search phrase*. The
//! default is a fixed template; optionally a chat model rewrites each tool
//! into a short imperative description, which tends to separate similarly
//! named tools better. The template embeds the server name so that queries
//! mentioning a server rank its tools higher.

use tracing::warn;

use crate::providers::ChatProvider;
use toolgate_mcp::ToolDescriptor;

/// System prompt for LLM-assisted phrase generation.
const PHRASE_SYSTEM_PROMPT: &str = "You rewrite tool catalog entries into search phrases. \
Answer with the phrase only, no preamble and no quotes.";

/// Default user prompt template; `{tool_block}` is substituted.
pub const DEFAULT_PHRASE_PROMPT: &str = "Rewrite the following tool entry as a 2-3 sentence \
imperative phrase describing what the tool does and when to use it. Mention the server and \
tool name exactly once, at the end.\n\n{tool_block}";

/// The templated phrase used when no chat model is configured (and as the
/// per-tool fallback when one fails).
pub fn heuristic_phrase(server_name: &str, tool: &ToolDescriptor) -> String {
    format!(
        "\"{name}\" that is used for \"{description}\". \"{name}\" is available from the server: {server}.",
        name = tool.name,
        description = tool.description,
        server = server_name,
    )
}

/// The tool summary handed to the chat model.
fn tool_block(server_name: &str, tool: &ToolDescriptor) -> String {
    let mut block = format!(
        "Server: {}\nTool: {}\nDescription: {}\n",
        server_name, tool.name, tool.description
    );
    if !tool.parameters.is_empty() {
        let names: Vec<&str> = tool.parameters.iter().map(|p| p.name.as_str()).collect();
        block.push_str(&format!("Parameters: {}\n", names.join(", ")));
    }
    block
}

/// Generate a phrase for every `(server, tool)` pair, in order.
///
/// When `chat` is `Some`, all phrases are produced before any embedding is
/// requested so the backend is not asked to juggle both models at once. A
/// failed generation falls back to the heuristic phrase for that tool only.
pub async fn generate_phrases(
    chat: Option<&dyn ChatProvider>,
    prompt_template: Option<&str>,
    temperature: f32,
    tools: &[(String, ToolDescriptor)],
) -> Vec<String> {
    let Some(chat) = chat else {
        return tools
            .iter()
            .map(|(server, tool)| heuristic_phrase(server, tool))
            .collect();
    };

    let template = prompt_template.unwrap_or(DEFAULT_PHRASE_PROMPT);
    let mut phrases = Vec::with_capacity(tools.len());
    for (server, tool) in tools {
        let user = template.replace("{tool_block}", &tool_block(server, tool));
        match chat.complete(PHRASE_SYSTEM_PROMPT, &user, temperature).await {
            Ok(phrase) if !phrase.trim().is_empty() => phrases.push(phrase),
            Ok(_) => {
                warn!(server = %server, tool = %tool.name, "empty phrase, using template");
                phrases.push(heuristic_phrase(server, tool));
            }
            Err(e) => {
                warn!(
                    server = %server,
                    tool = %tool.name,
                    error = %e,
                    "phrase generation failed, using template"
                );
                phrases.push(heuristic_phrase(server, tool));
            }
        }
    }
    phrases
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::error::{GatewayError, GatewayResult};

    fn tool(name: &str, description: &str) -> ToolDescriptor {
        let mut descriptor = ToolDescriptor::from_declared(name);
        descriptor.description = description.to_string();
        descriptor
    }

    #[test]
    fn test_heuristic_template() {
        let phrase = heuristic_phrase("Serena", &tool("write_memory", "save a note"));
        assert_eq!(
            phrase,
            "\"write_memory\" that is used for \"save a note\". \"write_memory\" is available from the server: Serena."
        );
    }

    struct ScriptedChat {
        fail_on: Option<usize>,
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl ChatProvider for ScriptedChat {
        async fn complete(&self, _: &str, user: &str, _: f32) -> GatewayResult<String> {
            let call = self
                .calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if self.fail_on == Some(call) {
                return Err(GatewayError::PhraseGeneration("backend down".to_string()));
            }
            assert!(user.contains("Server:"));
            Ok(format!("rewritten {}", call))
        }
    }

    #[tokio::test]
    async fn test_llm_phrases_in_order() {
        let chat = ScriptedChat {
            fail_on: None,
            calls: Default::default(),
        };
        let tools = vec![
            ("a".to_string(), tool("t1", "one")),
            ("b".to_string(), tool("t2", "two")),
        ];
        let phrases = generate_phrases(Some(&chat), None, 0.2, &tools).await;
        assert_eq!(phrases, vec!["rewritten 0", "rewritten 1"]);
    }

    #[tokio::test]
    async fn test_llm_failure_falls_back_per_tool() {
        let chat = ScriptedChat {
            fail_on: Some(0),
            calls: Default::default(),
        };
        let tools = vec![
            ("a".to_string(), tool("t1", "one")),
            ("b".to_string(), tool("t2", "two")),
        ];
        let phrases = generate_phrases(Some(&chat), None, 0.2, &tools).await;
        assert_eq!(phrases[0], heuristic_phrase("a", &tools[0].1));
        assert_eq!(phrases[1], "rewritten 1");
    }

    #[tokio::test]
    async fn test_no_chat_uses_template() {
        let tools = vec![("a".to_string(), tool("t1", "one"))];
        let phrases = generate_phrases(None, None, 0.2, &tools).await;
        assert_eq!(phrases[0], heuristic_phrase("a", &tools[0].1));
    }

    #[tokio::test]
    async fn test_custom_prompt_template() {
        struct EchoChat;
        #[async_trait]
        impl ChatProvider for EchoChat {
            async fn complete(&self, _: &str, user: &str, _: f32) -> GatewayResult<String> {
                Ok(user.to_string())
            }
        }
        let tools = vec![("a".to_string(), tool("t1", "one"))];
        let phrases =
            generate_phrases(Some(&EchoChat), Some("XX {tool_block} YY"), 0.2, &tools).await;
        assert!(phrases[0].starts_with("XX Server: a"));
        assert!(phrases[0].ends_with("YY"));
    }
}
