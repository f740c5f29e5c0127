use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{CrewError, Result};
use crate::events::{truncate, CrewEvent};
use crate::llm::LlmClient;
use crate::tools::{Tool, ToolRegistry};

/// Placeholder token substituted with the run topic in task descriptions
const TOPIC_PLACEHOLDER: &str = "{topic}";

/// Persona and capabilities of one worker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentDefinition {
    pub name: String,
    pub role: String,
    pub goal: String,
    pub backstory: String,
    #[serde(default)]
    pub tools: Vec<String>,
}

impl AgentDefinition {
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("name", &self.name),
            ("role", &self.role),
            ("goal", &self.goal),
            ("backstory", &self.backstory),
        ] {
            if value.trim().is_empty() {
                return Err(CrewError::Configuration(format!(
                    "Agent field '{}' cannot be empty",
                    field
                ))
                .into());
            }
        }
        Ok(())
    }
}

/// One unit of work, bound to an agent by name
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskDefinition {
    pub description: String,
    pub expected_output: String,
    pub agent_name: String,
}

impl TaskDefinition {
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("description", &self.description),
            ("expected_output", &self.expected_output),
            ("agent_name", &self.agent_name),
        ] {
            if value.trim().is_empty() {
                return Err(CrewError::Configuration(format!(
                    "Task field '{}' cannot be empty",
                    field
                ))
                .into());
            }
        }
        Ok(())
    }
}

/// An agent with its tool identifiers resolved to live capabilities
struct CrewAgent {
    definition: AgentDefinition,
    tools: Vec<Arc<dyn Tool>>,
}

/// A task bound to its resolved agent
struct TaskSlot {
    definition: TaskDefinition,
    agent_index: usize,
}

/// Builds agents and tasks from definitions and drives them through a
/// strictly sequential run, emitting progress events onto a channel as it
/// goes. The consumer side of the channel decides what to do with them.
pub struct CrewEngine {
    agents: Vec<CrewAgent>,
    tasks: Vec<TaskSlot>,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    llm: Arc<dyn LlmClient>,
    registry: Arc<ToolRegistry>,
    output_dir: PathBuf,
    events: mpsc::UnboundedSender<CrewEvent>,
}

impl CrewEngine {
    pub fn new(
        model: String,
        llm: Arc<dyn LlmClient>,
        registry: Arc<ToolRegistry>,
        events: mpsc::UnboundedSender<CrewEvent>,
    ) -> Self {
        Self {
            agents: Vec::new(),
            tasks: Vec::new(),
            model,
            api_key: None,
            temperature: 0.5,
            llm,
            registry,
            output_dir: PathBuf::from("."),
            events,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_output_dir(mut self, output_dir: PathBuf) -> Self {
        self.output_dir = output_dir;
        self
    }

    fn emit(&self, event: CrewEvent) {
        // a dropped consumer must not interrupt the run
        if self.events.send(event).is_err() {
            debug!("Event channel closed, discarding event");
        }
    }

    /// Add an agent from its definition, resolving tool identifiers
    pub fn add_agent(&mut self, definition: AgentDefinition) -> Result<()> {
        definition.validate()?;

        let tools = self.registry.resolve(&definition.tools);
        info!(
            "Adding agent {} with {} tools",
            definition.name,
            tools.len()
        );

        self.emit(CrewEvent::agent_added(&definition.name, &definition.role));
        self.agents.push(CrewAgent { definition, tools });
        Ok(())
    }

    /// Add a task, binding it to a previously added agent by name
    pub fn add_task(&mut self, definition: TaskDefinition) -> Result<()> {
        definition.validate()?;

        let agent_index = self
            .agents
            .iter()
            .position(|a| a.definition.name == definition.agent_name)
            .ok_or_else(|| CrewError::UnknownAgent(definition.agent_name.clone()))?;

        info!(
            "Adding task for agent {}: {}",
            definition.agent_name,
            truncate(&definition.description, 50)
        );

        self.emit(CrewEvent::task_added(
            &definition.description,
            &definition.agent_name,
        ));
        self.tasks.push(TaskSlot {
            definition,
            agent_index,
        });
        Ok(())
    }

    /// Run all tasks sequentially and return the final task's output.
    /// Emits crew_running before execution, crew_completed on success and
    /// crew_error (then propagates) on failure.
    pub async fn run(&mut self, topic: &str) -> Result<String> {
        if self.agents.is_empty() || self.tasks.is_empty() {
            return Err(
                CrewError::Precondition("No agents or tasks defined".to_string()).into(),
            );
        }

        // substitute the topic placeholder once, before execution starts
        for slot in &mut self.tasks {
            if slot.definition.description.contains(TOPIC_PLACEHOLDER) {
                slot.definition.description =
                    slot.definition.description.replace(TOPIC_PLACEHOLDER, topic);
            }
        }

        // the last task's output lands in a per-run artifact
        let output_file = self
            .output_dir
            .join(format!("output_{}.md", Utc::now().format("%Y%m%d_%H%M%S")));

        self.emit(CrewEvent::crew_running(
            self.agents.len(),
            self.tasks.len(),
            topic,
        ));

        // best-effort progress preview; the executor below does not expose
        // per-step hooks, so this is informative only
        for slot in &self.tasks {
            let agent = &self.agents[slot.agent_index];
            self.emit(CrewEvent::agent_started(
                &agent.definition.name,
                &slot.definition.description,
            ));
        }

        match self.execute_sequential().await {
            Ok(result) => {
                if let Err(e) = std::fs::write(&output_file, &result) {
                    warn!("Failed to write run artifact {:?}: {}", output_file, e);
                } else {
                    info!("Run artifact written to {:?}", output_file);
                }

                self.emit(CrewEvent::crew_completed(result.len()));
                Ok(result)
            }
            Err(e) => {
                self.emit(CrewEvent::crew_error(&e.to_string()));
                Err(e)
            }
        }
    }

    /// Walk the task list in order. Each task's output becomes context for
    /// the next one.
    async fn execute_sequential(&self) -> Result<String> {
        let mut context = String::new();
        let mut previous_agent: Option<&str> = None;

        for slot in &self.tasks {
            let agent = &self.agents[slot.agent_index];
            let name = agent.definition.name.as_str();

            if let Some(prev) = previous_agent {
                if prev != name && !context.is_empty() {
                    self.emit(CrewEvent::agent_communication(prev, name, &context));
                }
            }

            let research = self.gather_research(agent, &slot.definition).await;
            let prompt = Self::build_prompt(&agent.definition, &slot.definition, &context, &research);

            self.emit(CrewEvent::agent_thinking(name, &slot.definition.description));
            let output = self
                .llm
                .generate(
                    &self.model,
                    self.api_key.as_deref(),
                    &prompt,
                    self.temperature,
                )
                .await?;

            self.emit(CrewEvent::agent_completed(name, &output));
            context = output;
            previous_agent = Some(name);
        }

        Ok(context)
    }

    /// Invoke each of the agent's tools on the task description. Tool
    /// failures are already textual output, so this never aborts the run.
    async fn gather_research(&self, agent: &CrewAgent, task: &TaskDefinition) -> String {
        let mut sections = Vec::new();
        for tool in &agent.tools {
            self.emit(CrewEvent::agent_action(
                &agent.definition.name,
                &format!("Using {}", tool.name()),
                Some(tool.id()),
            ));
            let output = tool.invoke(&task.description).await;
            sections.push(format!("### {}\n{}", tool.name(), output));
        }
        sections.join("\n\n")
    }

    fn build_prompt(
        agent: &AgentDefinition,
        task: &TaskDefinition,
        context: &str,
        research: &str,
    ) -> String {
        let mut prompt = format!(
            "You are {}.\nGoal: {}\nBackstory: {}\n\nTask: {}\nExpected output: {}\n",
            agent.role, agent.goal, agent.backstory, task.description, task.expected_output
        );
        if !context.is_empty() {
            prompt.push_str(&format!("\nContext from the previous task:\n{}\n", context));
        }
        if !research.is_empty() {
            prompt.push_str(&format!("\nResearch material:\n{}\n", research));
        }
        prompt.push_str("\nProduce only the requested output.");
        prompt
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Current task descriptions, post any placeholder substitution
    pub fn task_descriptions(&self) -> Vec<String> {
        self.tasks
            .iter()
            .map(|t| t.definition.description.clone())
            .collect()
    }
}
