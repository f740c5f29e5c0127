use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::crew::{AgentDefinition, TaskDefinition};
use crate::error::{CrewError, Result};
use crate::events::CrewEvent;

pub type SessionId = Uuid;

/// Fixed wizard steps a session walks through
pub const STEP_CREATED: u8 = 1;
pub const STEP_AGENTS_DEFINED: u8 = 2;
pub const STEP_MODEL_SELECTED: u8 = 3;
pub const STEP_TASKS_DEFINED: u8 = 4;
pub const STEP_RUNNING: u8 = 5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Created,
    AgentsDefined,
    ModelSelected,
    TasksDefined,
    Running,
    Completed,
    Error,
}

/// One crew definition plus its run history, addressed by an opaque id.
/// Lives in memory for the process lifetime; never persisted.
#[derive(Debug, Serialize)]
pub struct Session {
    pub id: SessionId,
    pub status: SessionStatus,
    pub agents: Vec<AgentDefinition>,
    pub tasks: Vec<TaskDefinition>,
    pub model: String,
    pub api_key: Option<String>,
    pub current_step: u8,
    pub logs: Vec<CrewEvent>,
    pub result: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Handle to the in-flight background run. Cancellation is not
    /// supported today; the handle is retained so it could be.
    #[serde(skip)]
    pub run_handle: Option<tokio::task::JoinHandle<()>>,
}

impl Clone for Session {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            status: self.status.clone(),
            agents: self.agents.clone(),
            tasks: self.tasks.clone(),
            model: self.model.clone(),
            api_key: self.api_key.clone(),
            current_step: self.current_step,
            logs: self.logs.clone(),
            result: self.result.clone(),
            started_at: self.started_at,
            completed_at: self.completed_at,
            run_handle: None,
        }
    }
}

impl Session {
    fn new(id: SessionId) -> Self {
        Self {
            id,
            status: SessionStatus::Created,
            agents: Vec::new(),
            tasks: Vec::new(),
            model: String::new(),
            api_key: None,
            current_step: STEP_CREATED,
            logs: Vec::new(),
            result: None,
            started_at: None,
            completed_at: None,
            run_handle: None,
        }
    }

    /// Advance to a definition step. The step counter reflects the highest
    /// step reached; re-issuing an earlier step updates the data but never
    /// regresses status or counter.
    fn advance_definition_step(&mut self, step: u8, status: SessionStatus) {
        if self.current_step < step {
            self.current_step = step;
            self.status = status;
        }
    }

    pub fn set_agents(&mut self, agents: Vec<AgentDefinition>) {
        self.agents = agents;
        self.advance_definition_step(STEP_AGENTS_DEFINED, SessionStatus::AgentsDefined);
    }

    pub fn set_model(&mut self, model: String) {
        self.model = model;
        self.advance_definition_step(STEP_MODEL_SELECTED, SessionStatus::ModelSelected);
    }

    pub fn set_tasks(&mut self, tasks: Vec<TaskDefinition>) {
        self.tasks = tasks;
        self.advance_definition_step(STEP_TASKS_DEFINED, SessionStatus::TasksDefined);
    }

    /// Transition to running. Rejected unless both agents and tasks have
    /// been defined.
    pub fn start(&mut self) -> Result<()> {
        if self.agents.is_empty() || self.tasks.is_empty() {
            return Err(CrewError::Precondition(
                "Cannot start a run before agents and tasks are defined".to_string(),
            )
            .into());
        }
        if self.status == SessionStatus::Running {
            return Err(
                CrewError::Precondition("A run is already in progress".to_string()).into(),
            );
        }

        self.status = SessionStatus::Running;
        self.current_step = STEP_RUNNING;
        self.started_at = Some(Utc::now());
        self.completed_at = None;
        self.result = None;
        self.logs.clear();
        Ok(())
    }

    pub fn complete(&mut self, result: String) {
        self.status = SessionStatus::Completed;
        self.result = Some(result);
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: &str) {
        self.status = SessionStatus::Error;
        self.completed_at = Some(Utc::now());
        self.logs.push(CrewEvent::error(error));
    }

    pub fn push_log(&mut self, event: CrewEvent) {
        self.logs.push(event);
    }
}

/// In-memory session table. Each session sits behind its own lock so
/// mutations for one id are serialized while different sessions stay
/// fully independent; the outer map lock is only held for insert/lookup.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<SessionId, Arc<RwLock<Session>>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self) -> SessionId {
        let id = Uuid::new_v4();
        let session = Arc::new(RwLock::new(Session::new(id)));
        self.sessions.write().await.insert(id, session);
        info!("Created session {}", id);
        id
    }

    pub async fn get(&self, id: SessionId) -> Result<Arc<RwLock<Session>>> {
        let sessions = self.sessions.read().await;
        sessions
            .get(&id)
            .cloned()
            .ok_or_else(|| CrewError::SessionNotFound(id.to_string()).into())
    }

    /// Point-in-time copy of a session record (run handle excluded)
    pub async fn snapshot(&self, id: SessionId) -> Result<Session> {
        let session = self.get(id).await?;
        let session = session.read().await;
        Ok(session.clone())
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(name: &str) -> AgentDefinition {
        AgentDefinition {
            name: name.to_string(),
            role: "role".to_string(),
            goal: "goal".to_string(),
            backstory: "story".to_string(),
            tools: vec![],
        }
    }

    fn task(agent_name: &str) -> TaskDefinition {
        TaskDefinition {
            description: "Summarize {topic}".to_string(),
            expected_output: "a summary".to_string(),
            agent_name: agent_name.to_string(),
        }
    }

    #[tokio::test]
    async fn test_step_sequence_is_monotonic() {
        let store = SessionStore::new();
        let id = store.create().await;
        let handle = store.get(id).await.unwrap();
        let mut session = handle.write().await;

        assert_eq!(session.current_step, STEP_CREATED);
        assert_eq!(session.status, SessionStatus::Created);

        session.set_agents(vec![agent("Researcher")]);
        assert_eq!(session.current_step, STEP_AGENTS_DEFINED);

        session.set_model("m1".to_string());
        assert_eq!(session.current_step, STEP_MODEL_SELECTED);

        session.set_tasks(vec![task("Researcher")]);
        assert_eq!(session.current_step, STEP_TASKS_DEFINED);

        session.start().unwrap();
        assert_eq!(session.current_step, STEP_RUNNING);
        assert_eq!(session.status, SessionStatus::Running);
        assert!(session.started_at.is_some());
    }

    #[tokio::test]
    async fn test_reissuing_earlier_step_does_not_regress() {
        let store = SessionStore::new();
        let id = store.create().await;
        let handle = store.get(id).await.unwrap();
        let mut session = handle.write().await;

        session.set_agents(vec![agent("Researcher")]);
        session.set_model("m1".to_string());
        session.set_tasks(vec![task("Researcher")]);

        // redefining agents after the model step keeps the counter at 4
        session.set_agents(vec![agent("Researcher"), agent("Writer")]);
        assert_eq!(session.current_step, STEP_TASKS_DEFINED);
        assert_eq!(session.status, SessionStatus::TasksDefined);
        assert_eq!(session.agents.len(), 2);
    }

    #[tokio::test]
    async fn test_start_requires_agents_and_tasks() {
        let store = SessionStore::new();
        let id = store.create().await;
        let handle = store.get(id).await.unwrap();
        let mut session = handle.write().await;

        // nothing defined
        assert!(session.start().is_err());

        // agents only
        session.set_agents(vec![agent("Researcher")]);
        let err = session.start().unwrap_err();
        assert!(err.to_string().contains("Precondition"));

        // both defined
        session.set_tasks(vec![task("Researcher")]);
        assert!(session.start().is_ok());
    }

    #[tokio::test]
    async fn test_start_clears_previous_run_state() {
        let store = SessionStore::new();
        let id = store.create().await;
        let handle = store.get(id).await.unwrap();
        let mut session = handle.write().await;

        session.set_agents(vec![agent("Researcher")]);
        session.set_tasks(vec![task("Researcher")]);
        session.start().unwrap();
        session.push_log(CrewEvent::crew_running(1, 1, "Rust"));
        session.complete("result".to_string());

        session.start().unwrap();
        assert!(session.logs.is_empty());
        assert!(session.result.is_none());
        assert!(session.completed_at.is_none());
    }

    #[tokio::test]
    async fn test_fail_appends_trailing_error_log() {
        let store = SessionStore::new();
        let id = store.create().await;
        let handle = store.get(id).await.unwrap();
        let mut session = handle.write().await;

        session.set_agents(vec![agent("Researcher")]);
        session.set_tasks(vec![task("Researcher")]);
        session.start().unwrap();
        session.fail("model exploded");

        assert_eq!(session.status, SessionStatus::Error);
        let last = session.logs.last().unwrap();
        assert_eq!(last.payload["message"], "model exploded");
    }

    #[tokio::test]
    async fn test_get_unknown_session() {
        let store = SessionStore::new();
        let err = store.get(Uuid::new_v4()).await.unwrap_err();
        assert!(err.to_string().contains("Session not found"));
    }

    #[tokio::test]
    async fn test_snapshot_is_independent_copy() {
        let store = SessionStore::new();
        let id = store.create().await;

        {
            let handle = store.get(id).await.unwrap();
            let mut session = handle.write().await;
            session.set_model("m1".to_string());
        }

        let snapshot = store.snapshot(id).await.unwrap();
        assert_eq!(snapshot.model, "m1");
        assert!(snapshot.run_handle.is_none());
    }
}
