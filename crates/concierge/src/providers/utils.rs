use anyhow::Result;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};

use super::errors::ProviderError;
use crate::errors::AgentError;
use crate::models::content::{Content, ImageContent};
use crate::models::message::{Message, MessageContent, RawToolCall};
use crate::models::role::Role;
use crate::models::tool::{Tool, ToolCall};

lazy_static! {
    static ref INVALID_NAME_CHARS: Regex = Regex::new(r"[^a-zA-Z0-9_-]").unwrap();
    static ref VALID_NAME: Regex = Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap();
}

/// Stand-in name for an errored tool request that kept no record of the original call
const UNKNOWN_TOOL: &str = "unknown_tool";

/// Sent in place of a tool result that had nothing to show
pub const EMPTY_TOOL_OUTPUT: &str = "(no output)";

/// Convert internal Message format to OpenAI's API message specification
pub fn messages_to_openai_spec(messages: &[Message]) -> Vec<Value> {
    let mut messages_spec = Vec::new();

    for message in messages {
        let mut converted = json!({
            "role": message.role
        });

        let mut output = Vec::new();
        let mut text: Option<String> = None;

        for content in &message.content {
            match content {
                MessageContent::Text(part) => {
                    text.get_or_insert_with(String::new).push_str(&part.text);
                }
                MessageContent::ToolRequest(request) => {
                    let (name, arguments) = match (&request.tool_call, &request.raw) {
                        (Ok(tool_call), _) => {
                            (tool_call.name.clone(), tool_call.arguments.to_string())
                        }
                        (Err(_), Some(raw)) => (raw.name.clone(), raw.arguments.clone()),
                        (Err(_), None) => (UNKNOWN_TOOL.to_string(), "{}".to_string()),
                    };
                    // Errored requests are replayed as sent; the matching tool response
                    // carries the error back to the model
                    let name = match sanitize_function_name(&name) {
                        name if name.is_empty() => UNKNOWN_TOOL.to_string(),
                        name => name,
                    };
                    let tool_call_spec = json!({
                        "id": request.id,
                        "type": "function",
                        "function": {
                            "name": name,
                            "arguments": arguments,
                        }
                    });

                    if let Some(calls) = converted
                        .get_mut("tool_calls")
                        .and_then(Value::as_array_mut)
                    {
                        calls.push(tool_call_spec);
                    } else {
                        converted["tool_calls"] = json!([tool_call_spec]);
                    }
                }
                MessageContent::ToolResponse(response) => {
                    match &response.tool_result {
                        Ok(contents) => {
                            // Images can't ride along in a tool message, so they go in a
                            // follow-up user message and leave a placeholder behind
                            let mut tool_content = Vec::new();
                            let mut image_messages = Vec::new();

                            for content in contents {
                                match content {
                                    Content::Image(image) => {
                                        tool_content.push(Content::text("This tool result included an image that is uploaded in the next message."));
                                        image_messages.push(json!({
                                            "role": "user",
                                            "content": [convert_image(image)]
                                        }));
                                    }
                                    _ => {
                                        tool_content.push(content.clone());
                                    }
                                }
                            }

                            let tool_content = if tool_content.is_empty() {
                                json!(EMPTY_TOOL_OUTPUT)
                            } else {
                                json!(tool_content)
                            };
                            output.push(json!({
                                "role": "tool",
                                "content": tool_content,
                                "tool_call_id": response.id
                            }));
                            output.extend(image_messages);
                        }
                        Err(e) => {
                            // A tool result error is shown as output so the model can interpret the error message
                            output.push(json!({
                                "role": "tool",
                                "content": format!("The tool call returned the following error:\n{}", e),
                                "tool_call_id": response.id
                            }));
                        }
                    }
                }
            }
        }

        if let Some(text) = text {
            converted["content"] = json!(text);
        }
        if converted.get("content").is_some() || converted.get("tool_calls").is_some() {
            output.insert(0, converted);
        }
        messages_spec.extend(output);
    }

    messages_spec
}

/// Convert an image content into an OpenAI image_url part
pub fn convert_image(image: &ImageContent) -> Value {
    json!({
        "type": "image_url",
        "image_url": {
            "url": format!("data:{};base64,{}", image.mime_type, image.data)
        }
    })
}

/// Convert internal Tool format to OpenAI's API tool specification
pub fn tools_to_openai_spec(tools: &[Tool]) -> Result<Vec<Value>> {
    let mut tool_names = std::collections::HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        if !tool_names.insert(&tool.name) {
            anyhow::bail!("Duplicate tool name: {}", tool.name);
        }

        result.push(json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.input_schema,
            }
        }));
    }

    Ok(result)
}

/// Convert OpenAI's API response to internal Message format
pub fn openai_response_to_message(response: Value) -> Result<Message, ProviderError> {
    let original = response
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .cloned()
        .ok_or_else(|| ProviderError::MalformedResponse("no choices in response".into()))?;
    let mut content = Vec::new();

    if let Some(text) = original.get("content").and_then(|t| t.as_str()) {
        content.push(MessageContent::text(text));
    }

    if let Some(tool_calls) = original.get("tool_calls").and_then(|t| t.as_array()) {
        for tool_call in tool_calls {
            let id = tool_call["id"].as_str().unwrap_or_default().to_string();
            let function_name = tool_call["function"]["name"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            let arguments = tool_call["function"]["arguments"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            let raw = RawToolCall {
                name: function_name.clone(),
                arguments: arguments.clone(),
            };

            if !is_valid_function_name(&function_name) {
                let error = AgentError::ToolNotFound(format!(
                    "The provided function name '{}' had invalid characters, it must match this regex [a-zA-Z0-9_-]+",
                    function_name
                ));
                content.push(MessageContent::rejected_tool_request(id, raw, error));
                continue;
            }

            // Models send "" for tools that take no arguments
            let arguments = if arguments.trim().is_empty() {
                "{}".to_string()
            } else {
                arguments
            };

            match serde_json::from_str::<Value>(&arguments) {
                Ok(params) => {
                    content.push(MessageContent::tool_request(
                        id,
                        Ok(ToolCall::new(&function_name, params)),
                    ));
                }
                Err(e) => {
                    let error = AgentError::InvalidParameters(format!(
                        "Could not interpret tool use parameters for id {}: {}",
                        id, e
                    ));
                    content.push(MessageContent::rejected_tool_request(id, raw, error));
                }
            }
        }
    }

    Ok(Message {
        role: Role::Assistant,
        created: chrono::Utc::now().timestamp(),
        content,
    })
}

fn sanitize_function_name(name: &str) -> String {
    INVALID_NAME_CHARS.replace_all(name, "_").to_string()
}

fn is_valid_function_name(name: &str) -> bool {
    VALID_NAME.is_match(name)
}

pub fn check_openai_context_length_error(error: &Value) -> Option<ProviderError> {
    let code = error.get("code")?.as_str()?;
    if code == "context_length_exceeded" || code == "string_above_max_length" {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown error")
            .to_string();
        Some(ProviderError::ContextLengthExceeded(message))
    } else {
        None
    }
}
