pub mod cli;
pub mod client;
pub mod error;
pub mod models;
pub mod server;
pub mod services;
pub mod utils;

pub use cli::{Cli, Commands};
pub use error::{AgentError, AppError};
pub use models::{Config, OutputFormat, Request, RequestKind, RequestParams, Response};
pub use services::StudyAssistant;
