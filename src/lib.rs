// Library surface for headless/integration tests and reuse.
// Keep this lean to avoid coupling to bin-only types in main.rs.
pub mod answers;
pub mod app_dirs;
pub mod config;
pub mod error;
pub mod history;
pub mod input;
pub mod logging;
pub mod question;
pub mod runtime;
pub mod session;
pub mod submission;
pub mod timer;
