pub mod admission;
pub mod error;
pub mod events;
pub mod launcher;
pub mod orchestrator;
pub mod parser;
pub mod registry;
pub mod url_parser;
