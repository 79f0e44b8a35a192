pub mod audit;
pub mod clock;
pub mod config;
pub mod daemon_lock;
pub mod datetree;
pub mod format;
pub mod parser;
pub mod paths;
pub mod runner;
pub mod scheduler;
pub mod state;
pub mod util;
pub mod watcher;
