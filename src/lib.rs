pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod installer;
pub mod lock;
pub mod logging;
pub mod process_monitor;
pub mod prompt;
pub mod restore;
pub mod scanner;
pub mod source;
pub mod watcher;

pub use error::{FontSwapError, Result};
