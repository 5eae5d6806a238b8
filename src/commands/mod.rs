pub mod downloads;
pub mod settings;
