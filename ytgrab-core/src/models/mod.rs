pub mod job;
pub mod quality;
pub mod session;
pub mod settings;
