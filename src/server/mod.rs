//! Server module
//!
//! - `config`: configuration structures and layered loading
//! - `providers`: model-backend resolution and registration
//! - `task_handler`: the executor shared by both dispatch paths
//! - `background_tasks`: dead-letter sweep startup
//! - `init`: component wiring and the main run loop

mod background_tasks;
pub mod config;
mod init;
mod providers;
mod task_handler;

pub use config::{load_config, AppConfig};
pub use init::run;
