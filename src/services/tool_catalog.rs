//! MAIL tool schema generation.
//!
//! Produces the function-tool descriptors agents are driven with, in either
//! the chat-completions dialect (`{"type":"function","function":{...}}`) or
//! the responses dialect (name and parameters at the top level). The
//! `target` parameter of messaging tools is an enum while the swarm is
//! closed, and free-form (documented with `name@swarm` syntax) once
//! interswarm messaging is enabled.

use serde_json::{json, Value};

/// Which provider dialect to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolStyle {
    #[default]
    Completions,
    Responses,
}

fn tool_schema(name: &str, description: &str, parameters: Value, style: ToolStyle) -> Value {
    match style {
        ToolStyle::Completions => json!({
            "type": "function",
            "function": {
                "name": name,
                "description": description,
                "parameters": parameters,
            },
        }),
        ToolStyle::Responses => json!({
            "type": "function",
            "name": name,
            "description": description,
            "parameters": parameters,
        }),
    }
}

fn target_property(targets: &[String], enable_interswarm: bool) -> Value {
    let mut description = format!(
        "The target recipient agent for the message. Must be one of: {}",
        targets.join(", ")
    );
    if enable_interswarm {
        description.push_str(" (supports interswarm format: agent-name@swarm-name)");
        json!({ "type": "string", "description": description })
    } else {
        json!({ "type": "string", "description": description, "enum": targets })
    }
}

fn messaging_parameters(targets: &[String], enable_interswarm: bool) -> Value {
    json!({
        "type": "object",
        "properties": {
            "target": target_property(targets, enable_interswarm),
            "subject": { "type": "string", "description": "The subject of the message." },
            "message": { "type": "string", "description": "The message content to send." },
        },
        "required": ["target", "subject", "message"],
        "additionalProperties": false,
    })
}

/// `send_request`: message a specific agent.
pub fn request_tool(targets: &[String], enable_interswarm: bool, style: ToolStyle) -> Value {
    tool_schema(
        "send_request",
        "Send a message to a specific target recipient agent.",
        messaging_parameters(targets, enable_interswarm),
        style,
    )
}

/// `send_response`: answer a specific agent.
pub fn response_tool(targets: &[String], enable_interswarm: bool, style: ToolStyle) -> Value {
    tool_schema(
        "send_response",
        "Send a message to a specific target recipient agent.",
        messaging_parameters(targets, enable_interswarm),
        style,
    )
}

/// `send_interrupt`: preempt a specific agent.
pub fn interrupt_tool(targets: &[String], enable_interswarm: bool, style: ToolStyle) -> Value {
    tool_schema(
        "send_interrupt",
        "Interrupt a specific target recipient agent.",
        messaging_parameters(targets, enable_interswarm),
        style,
    )
}

/// `send_broadcast`: message every local agent.
pub fn broadcast_tool(style: ToolStyle) -> Value {
    tool_schema(
        "send_broadcast",
        "Broadcast a message to all possible recipient agents.",
        json!({
            "type": "object",
            "properties": {
                "subject": { "type": "string", "description": "The subject of the broadcast." },
                "message": { "type": "string", "description": "The message content to send." },
            },
            "required": ["subject", "message"],
            "additionalProperties": false,
        }),
        style,
    )
}

/// `send_interswarm_broadcast`: fan a broadcast out to remote swarms.
pub fn interswarm_broadcast_tool(style: ToolStyle) -> Value {
    tool_schema(
        "send_interswarm_broadcast",
        "Broadcast a message to all known swarms.",
        json!({
            "type": "object",
            "properties": {
                "subject": { "type": "string", "description": "The subject of the broadcast." },
                "message": { "type": "string", "description": "The message content to send." },
                "target_swarms": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "List of target swarm names. If empty, broadcasts to all known swarms.",
                },
            },
            "required": ["subject", "message"],
            "additionalProperties": false,
        }),
        style,
    )
}

/// `discover_swarms`: register swarms from discovery endpoints.
pub fn swarm_discovery_tool(style: ToolStyle) -> Value {
    tool_schema(
        "discover_swarms",
        "Discover and register new swarms from discovery endpoints.",
        json!({
            "type": "object",
            "properties": {
                "discovery_urls": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "List of URLs to discover swarms from.",
                },
            },
            "required": ["discovery_urls"],
            "additionalProperties": false,
        }),
        style,
    )
}

/// `acknowledge_broadcast`: store the broadcast in memory, emit nothing.
pub fn acknowledge_broadcast_tool(style: ToolStyle) -> Value {
    tool_schema(
        "acknowledge_broadcast",
        "Store the received broadcast in memory, do not respond.",
        json!({
            "type": "object",
            "properties": {
                "note": {
                    "type": ["string", "null"],
                    "description": "Optional note to include in internal memory only.",
                },
            },
            "additionalProperties": false,
        }),
        style,
    )
}

/// `ignore_broadcast`: drop the broadcast entirely.
pub fn ignore_broadcast_tool(style: ToolStyle) -> Value {
    tool_schema(
        "ignore_broadcast",
        "Ignore the received broadcast. No memory, no response.",
        json!({
            "type": "object",
            "properties": {
                "reason": {
                    "type": ["string", "null"],
                    "description": "Optional internal reason for ignoring (not sent).",
                },
            },
            "additionalProperties": false,
        }),
        style,
    )
}

/// `task_complete`: terminate the current task.
pub fn task_complete_tool(style: ToolStyle) -> Value {
    tool_schema(
        "task_complete",
        "Indicate that a task has been completed. This will end the current loop, and should always be the last tool called.",
        json!({
            "type": "object",
            "properties": {
                "finish_message": {
                    "type": "string",
                    "description": "The message to broadcast to all agents to indicate that the task has been completed.",
                },
            },
            "required": ["finish_message"],
            "additionalProperties": false,
        }),
        style,
    )
}

/// The baseline tool set every agent receives.
pub fn mail_tools(targets: &[String], enable_interswarm: bool, style: ToolStyle) -> Vec<Value> {
    vec![
        request_tool(targets, enable_interswarm, style),
        response_tool(targets, enable_interswarm, style),
        acknowledge_broadcast_tool(style),
        ignore_broadcast_tool(style),
    ]
}

/// Supervisor-privileged additions.
pub fn supervisor_tools(
    targets: &[String],
    can_complete_tasks: bool,
    enable_interswarm: bool,
    style: ToolStyle,
) -> Vec<Value> {
    let mut tools = vec![
        interrupt_tool(targets, enable_interswarm, style),
        broadcast_tool(style),
    ];

    if enable_interswarm {
        tools.push(interswarm_broadcast_tool(style));
        tools.push(swarm_discovery_tool(style));
    }

    if can_complete_tasks {
        tools.push(task_complete_tool(style));
    }

    tools
}

#[cfg(test)]
mod tests {
    use super::*;

    fn targets() -> Vec<String> {
        vec!["analyst".to_string(), "math".to_string()]
    }

    #[test]
    fn test_completions_shape() {
        let tool = request_tool(&targets(), false, ToolStyle::Completions);
        assert_eq!(tool["type"], "function");
        assert_eq!(tool["function"]["name"], "send_request");
        assert!(tool["function"]["parameters"]["properties"]["target"].is_object());
    }

    #[test]
    fn test_responses_shape() {
        let tool = request_tool(&targets(), false, ToolStyle::Responses);
        assert_eq!(tool["type"], "function");
        assert_eq!(tool["name"], "send_request");
        assert!(tool["parameters"]["properties"]["target"].is_object());
    }

    #[test]
    fn test_target_enum_when_interswarm_disabled() {
        let tool = request_tool(&targets(), false, ToolStyle::Completions);
        let target = &tool["function"]["parameters"]["properties"]["target"];
        assert_eq!(target["enum"], serde_json::json!(["analyst", "math"]));
    }

    #[test]
    fn test_target_free_form_when_interswarm_enabled() {
        let tool = request_tool(&targets(), true, ToolStyle::Completions);
        let target = &tool["function"]["parameters"]["properties"]["target"];
        assert!(target.get("enum").is_none());
        assert!(target["description"]
            .as_str()
            .unwrap()
            .contains("agent-name@swarm-name"));
    }

    #[test]
    fn test_supervisor_tool_set() {
        let names = |tools: &[Value]| -> Vec<String> {
            tools
                .iter()
                .map(|tool| tool["function"]["name"].as_str().unwrap().to_string())
                .collect()
        };

        let basic = supervisor_tools(&targets(), true, false, ToolStyle::Completions);
        assert_eq!(
            names(&basic),
            vec!["send_interrupt", "send_broadcast", "task_complete"]
        );

        let federated = supervisor_tools(&targets(), true, true, ToolStyle::Completions);
        assert_eq!(
            names(&federated),
            vec![
                "send_interrupt",
                "send_broadcast",
                "send_interswarm_broadcast",
                "discover_swarms",
                "task_complete",
            ]
        );

        let no_complete = supervisor_tools(&targets(), false, false, ToolStyle::Completions);
        assert_eq!(names(&no_complete), vec!["send_interrupt", "send_broadcast"]);
    }

    #[test]
    fn test_mail_tools_baseline() {
        let tools = mail_tools(&targets(), false, ToolStyle::Completions);
        assert_eq!(tools.len(), 4);
        assert_eq!(tools[2]["function"]["name"], "acknowledge_broadcast");
        assert_eq!(tools[3]["function"]["name"], "ignore_broadcast");
    }
}
