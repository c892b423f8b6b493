use tracing::warn;

use crate::types::{InferenceRequest, Message, Role, ToolDeclaration};

/// Formatting conventions and tool etiquette sent ahead of every conversation.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
    You are a helpful assistant in a chat interface that renders Markdown. \
    Format answers with short paragraphs, bullet lists and `code` where it helps, \
    and render links as [title](url). \
    Only call a tool when the user's request explicitly calls for what that tool does; \
    otherwise answer directly.";

/// History for one orchestration turn. Owned copy of the caller's messages;
/// the only mutation is appending a complete tool round.
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    /// Start from the caller's history, prefixed with `system_prompt` unless
    /// the history already opens with a system message.
    pub fn new(history: &[Message], system_prompt: Option<&str>) -> Self {
        let mut messages = Vec::with_capacity(history.len() + 1);
        if let Some(prompt) = system_prompt {
            if history.first().map(|m| m.role) != Some(Role::System) {
                messages.push(Message::system(prompt));
            }
        }
        messages.extend_from_slice(history);
        Self { messages }
    }

    pub fn build_request(
        &self,
        model: &str,
        max_tokens: u32,
        tools: Vec<ToolDeclaration>,
    ) -> InferenceRequest {
        InferenceRequest {
            model: model.to_string(),
            max_tokens,
            messages: self.messages.clone(),
            tools,
        }
    }

    /// Append the assistant's request and the matching tool result.
    ///
    /// The assistant message is narrowed to the invocation that was answered,
    /// so every recorded invocation is immediately followed by its result.
    pub fn record_tool_round(
        &mut self,
        mut assistant: Message,
        executed_id: &str,
        result_json: String,
    ) {
        let before = assistant.tool_invocations.len();
        assistant.tool_invocations.retain(|call| call.id == executed_id);
        assistant.tool_invocations.truncate(1);
        if assistant.tool_invocations.len() != before {
            warn!(
                dropped = before.saturating_sub(assistant.tool_invocations.len()),
                "only the first tool call of a response is executed"
            );
        }
        assistant.role = Role::Assistant;
        self.messages.push(assistant);
        self.messages.push(Message::tool(executed_id, result_json));
    }

    /// Append the model's final answer.
    pub fn record_response(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
