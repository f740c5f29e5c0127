use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Progress event types emitted over the lifetime of a crew run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    AgentAdded,
    TaskAdded,
    AgentStarted,
    AgentThinking,
    AgentAction,
    AgentCompleted,
    AgentCommunication,
    CrewRunning,
    CrewCompleted,
    CrewError,
    StepUpdate,
    Error,
}

/// A single timestamped progress record. The payload carries free-form
/// per-kind fields and is flattened into the JSON object on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrewEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: serde_json::Value,
}

impl CrewEvent {
    pub fn new(kind: EventKind, payload: serde_json::Value) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Agent name carried in the payload, if any
    pub fn agent(&self) -> Option<&str> {
        self.payload.get("agent").and_then(|v| v.as_str())
    }

    pub fn agent_added(agent: &str, role: &str) -> Self {
        Self::new(
            EventKind::AgentAdded,
            json!({
                "agent": agent,
                "role": role,
                "message": format!("Agent added: {}", agent),
            }),
        )
    }

    pub fn task_added(description: &str, agent: &str) -> Self {
        let summary = truncate(description, 50);
        Self::new(
            EventKind::TaskAdded,
            json!({
                "task": summary,
                "agent": agent,
                "message": format!("Task added: {}...", summary),
            }),
        )
    }

    pub fn agent_started(agent: &str, task_description: &str) -> Self {
        Self::new(
            EventKind::AgentStarted,
            json!({
                "agent": agent,
                "task": truncate(task_description, 100),
                "message": format!("{} started working", agent),
            }),
        )
    }

    pub fn agent_thinking(agent: &str, thought: &str) -> Self {
        Self::new(
            EventKind::AgentThinking,
            json!({
                "agent": agent,
                "thought": truncate(thought, 200),
                "message": format!("{} is thinking...", agent),
            }),
        )
    }

    pub fn agent_action(agent: &str, action: &str, tool: Option<&str>) -> Self {
        Self::new(
            EventKind::AgentAction,
            json!({
                "agent": agent,
                "action": action,
                "tool": tool,
                "message": format!("{}: {}", agent, action),
            }),
        )
    }

    pub fn agent_completed(agent: &str, output: &str) -> Self {
        Self::new(
            EventKind::AgentCompleted,
            json!({
                "agent": agent,
                "output": truncate(output, 500),
                "message": format!("{} completed its task", agent),
            }),
        )
    }

    pub fn agent_communication(from_agent: &str, to_agent: &str, content: &str) -> Self {
        Self::new(
            EventKind::AgentCommunication,
            json!({
                "from": from_agent,
                "to": to_agent,
                "content": truncate(content, 200),
                "message": format!("{} -> {}", from_agent, to_agent),
            }),
        )
    }

    pub fn crew_running(agents_count: usize, tasks_count: usize, topic: &str) -> Self {
        Self::new(
            EventKind::CrewRunning,
            json!({
                "agents_count": agents_count,
                "tasks_count": tasks_count,
                "topic": topic,
                "message": "Crew started working",
            }),
        )
    }

    pub fn crew_completed(result_length: usize) -> Self {
        Self::new(
            EventKind::CrewCompleted,
            json!({
                "result_length": result_length,
                "message": "All tasks completed",
            }),
        )
    }

    pub fn crew_error(error: &str) -> Self {
        Self::new(
            EventKind::CrewError,
            json!({
                "error": error,
                "message": format!("Error: {}", error),
            }),
        )
    }

    pub fn step_update(step: u8, message: &str) -> Self {
        Self::new(
            EventKind::StepUpdate,
            json!({
                "step": step,
                "message": message,
            }),
        )
    }

    pub fn error(message: &str) -> Self {
        Self::new(EventKind::Error, json!({ "message": message }))
    }
}

/// Truncate on a char boundary, used for event payload summaries
pub fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
