//! `actions` crate — the `ActionHandler` trait, the built-in handlers and the
//! registry the engine dispatches through.
//!
//! Handlers never talk to the outside world directly. Every side effect goes
//! through a collaborator trait ([`NotificationSender`], [`EmailSender`],
//! [`TaskCreator`], [`HttpClient`]) so embedders decide how delivery happens.

pub mod collaborators;
pub mod error;
pub mod handlers;
pub mod mock;
pub mod registry;
pub mod traits;
pub mod types;

pub use collaborators::{
    Collaborators, EmailMessage, EmailSender, HttpClient, HttpRequest, HttpResponse,
    LogEmailSender, LogNotificationSender, LogTaskCreator, NewTask, Notification,
    NotificationSender, ReqwestHttpClient, TaskCreator, TaskPriority,
};
pub use error::ActionError;
pub use registry::ActionRegistry;
pub use traits::{ActionHandler, RunContext};
pub use types::ActionType;
