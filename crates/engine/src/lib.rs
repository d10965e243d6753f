//! `engine` crate — workflow definitions, validation, the execution pipeline,
//! scheduling and event dispatch.

pub mod clock;
pub mod dag;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod models;
pub mod postgres;
pub mod recorder;
pub mod schedule;
pub mod scheduler;
pub mod service;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use dag::{validate_action_graph, validate_definition};
pub use dispatcher::EventDispatcher;
pub use error::{DefinitionError, EngineError, StoreError};
pub use executor::{EngineConfig, WorkflowEngine};
pub use models::{
    ActionDefinition, DefinitionPatch, LogStatus, NewWorkflow, RunStatus, Trigger,
    WorkflowDefinition, WorkflowLog, WorkflowRun,
};
pub use postgres::{PgDefinitionRegistry, PgRunStore};
pub use recorder::RunHandle;
pub use schedule::{CronSchedule, ScheduleError};
pub use scheduler::Scheduler;
pub use service::WorkflowService;
pub use store::{DefinitionRegistry, InMemoryDefinitionRegistry, InMemoryRunStore, RunStore};
