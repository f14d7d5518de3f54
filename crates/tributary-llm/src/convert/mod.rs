//! Conversion between canonical types and vendor wire formats
//!
//! Each submodule handles conversions for one vendor protocol.

pub mod anthropic;
pub mod coze;
pub mod dashscope;
pub mod dify;
pub mod fastgpt;
pub mod google;
pub mod minimax;
pub mod openai;
pub mod spark;
pub mod tiangong;
pub mod wenxin;

use crate::types::{FunctionDelta, Message, Role, ToolCall, ToolCallDelta, ToolType};

/// Single delta carrying a complete tool call
///
/// Used by vendors that deliver tool calls whole rather than in fragments.
pub(crate) fn whole_tool_call(index: u32, call: &ToolCall) -> ToolCallDelta {
    ToolCallDelta {
        index,
        id: Some(call.id.clone()),
        call_type: Some(ToolType::Function),
        function: Some(FunctionDelta {
            name: Some(call.function.name.clone()),
            arguments: Some(call.function.arguments.clone()),
        }),
    }
}

/// Role/text pairs for vendors that only accept plain-text turns
///
/// Tool turns are sent as user text and assistant tool calls as their
/// JSON-encoded arguments, since these vendors have no tool message type.
pub(crate) fn plain_turns(messages: &[Message]) -> Vec<(&'static str, String)> {
    messages
        .iter()
        .map(|msg| {
            let role = match msg.role {
                Role::System => "system",
                Role::User | Role::Tool => "user",
                Role::Assistant => "assistant",
            };
            let text = match (&msg.tool_calls, msg.content.as_text()) {
                (Some(calls), text) if text.is_empty() => calls
                    .iter()
                    .map(|c| format!("{}({})", c.function.name, c.function.arguments))
                    .collect::<Vec<_>>()
                    .join("\n"),
                (_, text) => text,
            };
            (role, text)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_turns_render_tool_traffic_as_text() {
        let messages = vec![
            Message::system("s"),
            Message::assistant_tool_calls(vec![ToolCall::function("c1", "lookup", "{\"q\":1}")]),
            Message::tool("c1", "42"),
        ];
        let turns = plain_turns(&messages);
        assert_eq!(turns[0], ("system", "s".to_owned()));
        assert_eq!(turns[1], ("assistant", "lookup({\"q\":1})".to_owned()));
        assert_eq!(turns[2], ("user", "42".to_owned()));
    }

    #[test]
    fn whole_tool_call_carries_name_and_arguments() {
        let delta = whole_tool_call(2, &ToolCall::function("id", "f", "{}"));
        assert_eq!(delta.index, 2);
        assert_eq!(delta.function.unwrap().arguments.as_deref(), Some("{}"));
    }
}
