use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::config::Config;
use crate::crew::{AgentDefinition, CrewEngine, TaskDefinition};
use crate::error::{CrewError, Result};
use crate::events::{CrewEvent, EventKind};
use crate::llm::LlmClient;
use crate::session::{
    Session, SessionId, SessionStore, STEP_AGENTS_DEFINED, STEP_MODEL_SELECTED, STEP_TASKS_DEFINED,
};
use crate::sink::EventSink;
use crate::tools::ToolRegistry;

/// Final result view of a session
#[derive(Debug, Serialize)]
pub struct SessionResult {
    pub status: crate::session::SessionStatus,
    pub result: Option<String>,
    pub logs: Vec<CrewEvent>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Per-agent activity counts derived from the session log
#[derive(Debug, Serialize)]
pub struct AgentStats {
    pub name: String,
    pub role: String,
    pub tasks_completed: usize,
    pub messages_sent: usize,
}

#[derive(Debug, Serialize)]
pub struct SessionStats {
    pub session_id: SessionId,
    pub status: crate::session::SessionStatus,
    pub total_agents: usize,
    pub total_tasks: usize,
    pub agent_stats: Vec<AgentStats>,
    pub total_logs: usize,
}

/// Ties the session store, event sink, tool registry and the model client
/// together behind the request/response boundary. Runs execute on
/// background tasks so no request handler ever blocks on one.
pub struct CrewService {
    store: SessionStore,
    sink: EventSink,
    llm: Arc<dyn LlmClient>,
    registry: Arc<ToolRegistry>,
    config: Config,
}

impl CrewService {
    pub fn new(config: Config, llm: Arc<dyn LlmClient>) -> Self {
        let registry = Arc::new(ToolRegistry::standard(&config.tools));
        Self {
            store: SessionStore::new(),
            sink: EventSink::new(),
            llm,
            registry,
            config,
        }
    }

    pub fn sink(&self) -> &EventSink {
        &self.sink
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn create_session(&self) -> SessionId {
        self.store.create().await
    }

    pub async fn session_snapshot(&self, id: SessionId) -> Result<Session> {
        self.store.snapshot(id).await
    }

    pub async fn set_agents(&self, id: SessionId, agents: Vec<AgentDefinition>) -> Result<usize> {
        for agent in &agents {
            agent.validate()?;
        }

        let count = agents.len();
        let session = self.store.get(id).await?;
        session.write().await.set_agents(agents);

        self.sink
            .broadcast(CrewEvent::step_update(
                STEP_AGENTS_DEFINED,
                "Agents defined",
            ))
            .await;
        Ok(count)
    }

    pub async fn set_model(&self, id: SessionId, model_id: String) -> Result<String> {
        let model = if model_id.trim().is_empty() {
            self.config.llm.default_model.clone()
        } else {
            model_id
        };

        let session = self.store.get(id).await?;
        session.write().await.set_model(model.clone());

        self.sink
            .broadcast(CrewEvent::step_update(
                STEP_MODEL_SELECTED,
                &format!("Model selected: {}", model),
            ))
            .await;
        Ok(model)
    }

    pub async fn set_tasks(&self, id: SessionId, tasks: Vec<TaskDefinition>) -> Result<usize> {
        let session = self.store.get(id).await?;

        // every task must reference an agent already defined in this
        // session; a dangling reference rejects the whole submission
        {
            let session = session.read().await;
            for task in &tasks {
                task.validate()?;
                if !session
                    .agents
                    .iter()
                    .any(|a| a.name == task.agent_name)
                {
                    return Err(CrewError::UnknownAgent(task.agent_name.clone()).into());
                }
            }
        }

        let count = tasks.len();
        session.write().await.set_tasks(tasks);

        self.sink
            .broadcast(CrewEvent::step_update(STEP_TASKS_DEFINED, "Tasks defined"))
            .await;
        Ok(count)
    }

    pub async fn set_api_key(&self, id: SessionId, api_key: String) -> Result<()> {
        let session = self.store.get(id).await?;
        session.write().await.api_key = Some(api_key);
        Ok(())
    }

    /// Probe the model backend with the given credential. Independent of
    /// any session state.
    pub async fn validate_api_key(&self, api_key: &str) -> (bool, String) {
        let probe = self
            .llm
            .generate(
                &self.config.llm.default_model,
                Some(api_key),
                "Say 'OK'",
                0.0,
            )
            .await;

        match probe {
            Ok(_) => (true, "API key is valid".to_string()),
            Err(e) => (false, format!("API key is invalid: {}", e)),
        }
    }

    /// Start a crew run for the session. Returns as soon as the background
    /// task is spawned; progress is observable via the event stream and
    /// the session snapshot.
    pub async fn start_run(&self, id: SessionId, topic: String) -> Result<()> {
        let session_handle = self.store.get(id).await?;
        let mut session = session_handle.write().await;
        session.start()?;

        let agents = session.agents.clone();
        let tasks = session.tasks.clone();
        let model = if session.model.is_empty() {
            self.config.llm.default_model.clone()
        } else {
            session.model.clone()
        };
        let api_key = session.api_key.clone().or(self.config.llm.api_key.clone());

        info!(
            "Starting run for session {} with {} agents, {} tasks, model {}",
            id,
            agents.len(),
            tasks.len(),
            model
        );

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let engine = CrewEngine::new(model, self.llm.clone(), self.registry.clone(), events_tx)
            .with_api_key(api_key)
            .with_temperature(self.config.llm.temperature)
            .with_output_dir(self.config.output.directory.clone());

        // forwarder: every engine event goes into the session log and out
        // to the live connection, in emission order
        let store = self.store.clone();
        let sink = self.sink.clone();
        let forward_task = tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                if let Ok(session) = store.get(id).await {
                    session.write().await.push_log(event.clone());
                }
                sink.send(id, event).await;
            }
        });

        let store = self.store.clone();
        let run_task = tokio::spawn(async move {
            let outcome = run_crew(engine, agents, tasks, &topic).await;

            // wait for the forwarder to drain so the log is complete
            // before the terminal status lands
            if let Err(e) = forward_task.await {
                error!("Event forwarder for session {} panicked: {}", id, e);
            }

            match store.get(id).await {
                Ok(session) => {
                    let mut session = session.write().await;
                    match outcome {
                        Ok(result) => {
                            info!("Session {} run completed", id);
                            session.complete(result);
                        }
                        Err(e) => {
                            error!("Session {} run failed: {}", id, e);
                            session.fail(&e.to_string());
                        }
                    }
                }
                Err(e) => error!("Session {} vanished during run: {}", id, e),
            }
        });

        session.run_handle = Some(run_task);
        Ok(())
    }

    pub async fn session_result(&self, id: SessionId) -> Result<SessionResult> {
        let session = self.store.snapshot(id).await?;
        Ok(SessionResult {
            status: session.status,
            result: session.result,
            logs: session.logs,
            started_at: session.started_at,
            completed_at: session.completed_at,
        })
    }

    /// Per-agent counts derived by filtering the log by agent name and
    /// event type
    pub async fn session_stats(&self, id: SessionId) -> Result<SessionStats> {
        let session = self.store.snapshot(id).await?;

        let agent_stats = session
            .agents
            .iter()
            .map(|agent| {
                let tasks_completed = session
                    .logs
                    .iter()
                    .filter(|log| {
                        log.kind == EventKind::AgentCompleted
                            && log.agent() == Some(agent.name.as_str())
                    })
                    .count();
                let messages_sent = session
                    .logs
                    .iter()
                    .filter(|log| {
                        log.kind == EventKind::AgentCommunication
                            && log.payload.get("from").and_then(|v| v.as_str())
                                == Some(agent.name.as_str())
                    })
                    .count();

                AgentStats {
                    name: agent.name.clone(),
                    role: agent.role.clone(),
                    tasks_completed,
                    messages_sent,
                }
            })
            .collect();

        Ok(SessionStats {
            session_id: session.id,
            status: session.status,
            total_agents: session.agents.len(),
            total_tasks: session.tasks.len(),
            agent_stats,
            total_logs: session.logs.len(),
        })
    }
}

/// Build the crew from the session's definitions and run it
async fn run_crew(
    mut engine: CrewEngine,
    agents: Vec<AgentDefinition>,
    tasks: Vec<TaskDefinition>,
    topic: &str,
) -> Result<String> {
    for agent in agents {
        engine.add_agent(agent)?;
    }
    for task in tasks {
        engine.add_task(task)?;
    }
    engine.run(topic).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::session::SessionStatus;
    use async_trait::async_trait;
    use std::time::Duration;

    struct StubLlm {
        fail: bool,
    }

    #[async_trait]
    impl LlmClient for StubLlm {
        async fn generate(
            &self,
            _model: &str,
            _api_key: Option<&str>,
            prompt: &str,
            _temperature: f32,
        ) -> Result<String> {
            if self.fail {
                return Err(CrewError::Execution("backend down".to_string()).into());
            }
            Ok(format!("answer for: {}", crate::events::truncate(prompt, 60)))
        }
    }

    fn test_service(fail: bool) -> CrewService {
        let mut config = Config::default();
        config.output.directory = std::env::temp_dir().join(format!(
            "crew-studio-test-{}",
            uuid::Uuid::new_v4()
        ));
        std::fs::create_dir_all(&config.output.directory).unwrap();
        CrewService::new(config, Arc::new(StubLlm { fail }))
    }

    fn agent(name: &str) -> AgentDefinition {
        AgentDefinition {
            name: name.to_string(),
            role: format!("{} role", name),
            goal: "goal".to_string(),
            backstory: "story".to_string(),
            tools: vec![],
        }
    }

    fn task(description: &str, agent_name: &str) -> TaskDefinition {
        TaskDefinition {
            description: description.to_string(),
            expected_output: "a summary".to_string(),
            agent_name: agent_name.to_string(),
        }
    }

    async fn wait_for_terminal_status(service: &CrewService, id: SessionId) -> Session {
        for _ in 0..100 {
            let snapshot = service.session_snapshot(id).await.unwrap();
            if matches!(
                snapshot.status,
                SessionStatus::Completed | SessionStatus::Error
            ) {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("run did not reach a terminal status");
    }

    #[tokio::test]
    async fn test_full_scenario_completes() {
        let service = test_service(false);
        let id = service.create_session().await;

        service
            .set_agents(id, vec![agent("Researcher")])
            .await
            .unwrap();
        service
            .set_tasks(id, vec![task("Summarize {topic}", "Researcher")])
            .await
            .unwrap();
        service.set_model(id, "m1".to_string()).await.unwrap();
        service
            .start_run(id, "Quantum Computing".to_string())
            .await
            .unwrap();

        let session = wait_for_terminal_status(&service, id).await;
        assert_eq!(session.status, SessionStatus::Completed);
        assert!(!session.result.as_deref().unwrap().is_empty());
        assert!(session.completed_at.is_some());

        // the preview event carries the substituted description
        let started = session
            .logs
            .iter()
            .find(|log| log.kind == EventKind::AgentStarted)
            .unwrap();
        assert_eq!(started.payload["task"], "Summarize Quantum Computing");

        // definition events precede crew_running; crew_completed is terminal
        let kinds: Vec<EventKind> = session.logs.iter().map(|l| l.kind).collect();
        let running_pos = kinds
            .iter()
            .position(|k| *k == EventKind::CrewRunning)
            .unwrap();
        assert!(kinds[..running_pos]
            .iter()
            .any(|k| *k == EventKind::AgentAdded));
        assert_eq!(*kinds.last().unwrap(), EventKind::CrewCompleted);
    }

    #[tokio::test]
    async fn test_dangling_task_reference_rejected() {
        let service = test_service(false);
        let id = service.create_session().await;

        service
            .set_agents(id, vec![agent("Researcher")])
            .await
            .unwrap();
        let err = service
            .set_tasks(id, vec![task("Do something", "Ghost")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Agent not found: Ghost"));

        let snapshot = service.session_snapshot(id).await.unwrap();
        assert_eq!(snapshot.tasks.len(), 0);
        assert_eq!(snapshot.current_step, STEP_AGENTS_DEFINED);
    }

    #[tokio::test]
    async fn test_start_before_definitions_rejected() {
        let service = test_service(false);
        let id = service.create_session().await;

        let err = service.start_run(id, "Rust".to_string()).await.unwrap_err();
        assert!(err.to_string().contains("Precondition failed"));

        let snapshot = service.session_snapshot(id).await.unwrap();
        assert_eq!(snapshot.status, SessionStatus::Created);
    }

    #[tokio::test]
    async fn test_failed_run_marks_session_errored() {
        let service = test_service(true);
        let id = service.create_session().await;

        service
            .set_agents(id, vec![agent("Researcher")])
            .await
            .unwrap();
        service
            .set_tasks(id, vec![task("Summarize {topic}", "Researcher")])
            .await
            .unwrap();
        service.start_run(id, "Rust".to_string()).await.unwrap();

        let session = wait_for_terminal_status(&service, id).await;
        assert_eq!(session.status, SessionStatus::Error);
        assert!(session.result.is_none());

        // trailing human-readable error entry, preceded by crew_error
        let last = session.logs.last().unwrap();
        assert_eq!(last.kind, EventKind::Error);
        assert!(session
            .logs
            .iter()
            .any(|log| log.kind == EventKind::CrewError));
    }

    #[tokio::test]
    async fn test_events_stream_to_connected_observer() {
        let service = test_service(false);
        let id = service.create_session().await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        service.sink().connect(id, tx).await;

        service
            .set_agents(id, vec![agent("Researcher")])
            .await
            .unwrap();
        service
            .set_tasks(id, vec![task("Summarize {topic}", "Researcher")])
            .await
            .unwrap();
        service.start_run(id, "Rust".to_string()).await.unwrap();
        wait_for_terminal_status(&service, id).await;

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(event.kind);
        }

        // step updates from the definition calls, then the run events in
        // emission order ending with crew_completed
        assert!(kinds.contains(&EventKind::StepUpdate));
        assert_eq!(*kinds.last().unwrap(), EventKind::CrewCompleted);
    }

    #[tokio::test]
    async fn test_stats_derived_from_logs() {
        let service = test_service(false);
        let id = service.create_session().await;

        service
            .set_agents(id, vec![agent("Researcher"), agent("Writer")])
            .await
            .unwrap();
        service
            .set_tasks(
                id,
                vec![
                    task("Research {topic}", "Researcher"),
                    task("Write about {topic}", "Writer"),
                ],
            )
            .await
            .unwrap();
        service.start_run(id, "Rust".to_string()).await.unwrap();
        wait_for_terminal_status(&service, id).await;

        let stats = service.session_stats(id).await.unwrap();
        assert_eq!(stats.total_agents, 2);
        assert_eq!(stats.total_tasks, 2);

        let researcher = stats
            .agent_stats
            .iter()
            .find(|s| s.name == "Researcher")
            .unwrap();
        assert_eq!(researcher.tasks_completed, 1);
        assert_eq!(researcher.messages_sent, 1);

        let writer = stats.agent_stats.iter().find(|s| s.name == "Writer").unwrap();
        assert_eq!(writer.tasks_completed, 1);
        assert_eq!(writer.messages_sent, 0);
    }

    #[tokio::test]
    async fn test_validate_api_key() {
        let service = test_service(false);
        let (valid, message) = service.validate_api_key("some-key").await;
        assert!(valid);
        assert_eq!(message, "API key is valid");

        let failing = test_service(true);
        let (valid, message) = failing.validate_api_key("some-key").await;
        assert!(!valid);
        assert!(message.contains("API key is invalid"));
    }

    #[tokio::test]
    async fn test_run_handle_retained_on_session() {
        let service = test_service(false);
        let id = service.create_session().await;

        service
            .set_agents(id, vec![agent("Researcher")])
            .await
            .unwrap();
        service
            .set_tasks(id, vec![task("Summarize {topic}", "Researcher")])
            .await
            .unwrap();
        service.start_run(id, "Rust".to_string()).await.unwrap();

        let handle = service.store().get(id).await.unwrap();
        assert!(handle.read().await.run_handle.is_some());
        wait_for_terminal_status(&service, id).await;
    }
}
