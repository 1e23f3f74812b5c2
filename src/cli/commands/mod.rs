mod config;
mod index;
mod search;
mod serve;
mod status;
mod study;

pub use config::ConfigCommand;
pub use index::IndexCommand;
pub use search::SearchArgs;
pub use serve::ServeArgs;
pub use study::{AskArgs, ExplainArgs, QuizArgs, SummarizeArgs};

pub use config::handle_config;
pub use index::handle_index;
pub use search::handle_search;
pub use serve::handle_serve;
pub use status::handle_status;
pub use study::{handle_ask, handle_explain, handle_quiz, handle_summarize};
