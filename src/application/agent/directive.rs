use serde_json::Value;

/// What the reasoning step asked for on this turn. Anything that is not a
/// well-formed tool call is treated as a final-answer candidate and judged
/// against the output contract.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentDirective {
    CallTool { tool: String, arguments: Value },
    Final { payload: Value },
}

pub fn parse_directive(content: &str) -> AgentDirective {
    let Some(value) = extract_json(content) else {
        return AgentDirective::Final {
            payload: Value::String(content.to_string()),
        };
    };

    if let Value::Object(map) = &value {
        if map.get("action").and_then(Value::as_str) == Some("call_tool") {
            if let Some(tool) = map.get("tool").and_then(Value::as_str) {
                return AgentDirective::CallTool {
                    tool: tool.to_string(),
                    arguments: map.get("input").cloned().unwrap_or(Value::Null),
                };
            }
        }
        if map.get("action").and_then(Value::as_str) == Some("final") {
            let payload = match map.get("response") {
                Some(Value::String(text)) => {
                    extract_json(text).unwrap_or_else(|| Value::String(text.clone()))
                }
                Some(other) => other.clone(),
                None => value.clone(),
            };
            return AgentDirective::Final { payload };
        }
    }

    AgentDirective::Final { payload: value }
}

/// Pull a JSON value out of a model utterance, tolerating code fences and
/// surrounding prose.
pub fn extract_json(content: &str) -> Option<Value> {
    let trimmed = content.trim();

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    if trimmed.starts_with("```") {
        let stripped = trimmed.trim_start_matches("```json");
        let stripped = stripped.trim_start_matches("```JSON");
        let stripped = stripped.trim_start_matches("```");
        if let Some(end) = stripped.rfind("```") {
            let slice = &stripped[..end];
            if let Ok(value) = serde_json::from_str::<Value>(slice.trim()) {
                return Some(value);
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            let candidate = &trimmed[start..=end];
            if let Ok(value) = serde_json::from_str::<Value>(candidate) {
                return Some(value);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_tool_call_with_input() {
        let directive =
            parse_directive(r#"{"action":"call_tool","tool":"list_emails","input":{"count":5}}"#);
        assert_eq!(
            directive,
            AgentDirective::CallTool {
                tool: "list_emails".into(),
                arguments: json!({ "count": 5 }),
            }
        );
    }

    #[test]
    fn tool_call_without_tool_name_falls_back_to_final() {
        let directive = parse_directive(r#"{"action":"call_tool"}"#);
        assert!(matches!(directive, AgentDirective::Final { .. }));
    }

    #[test]
    fn final_action_unwraps_embedded_json_string() {
        let directive =
            parse_directive(r#"{"action":"final","response":"{\"emails\":[]}"}"#);
        assert_eq!(
            directive,
            AgentDirective::Final {
                payload: json!({ "emails": [] }),
            }
        );
    }

    #[test]
    fn bare_report_object_is_final() {
        let directive = parse_directive(r#"{"emails":[]}"#);
        assert_eq!(
            directive,
            AgentDirective::Final {
                payload: json!({ "emails": [] }),
            }
        );
    }

    #[test]
    fn fenced_json_is_unwrapped() {
        let directive = parse_directive("```json\n{\"emails\":[]}\n```");
        assert_eq!(
            directive,
            AgentDirective::Final {
                payload: json!({ "emails": [] }),
            }
        );
    }

    #[test]
    fn prose_becomes_a_final_string_payload() {
        let directive = parse_directive("I could not find any emails.");
        assert_eq!(
            directive,
            AgentDirective::Final {
                payload: Value::String("I could not find any emails.".into()),
            }
        );
    }
}
