pub mod engine;


pub use engine::{AgentDefinition, CrewEngine, TaskDefinition};
