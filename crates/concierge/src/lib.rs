pub mod agent;
pub mod errors;
pub mod extract;
pub mod models;
pub mod prompt_template;
pub mod providers;
pub mod responder;
pub mod support;
pub mod systems;
pub mod transcript;

pub use support::{ChatOutcome, SupportAgent};
