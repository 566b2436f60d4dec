pub mod config;
pub mod demo;
pub mod executor;
pub mod monitor;
pub mod process;
pub mod registry;
pub mod runner;
pub mod worker;

pub use config::WorkerConfig;
pub use executor::{Executor, ExecutorSettings};
pub use monitor::Monitor;
pub use registry::{Callable, CallableRegistry, CallableResult};
pub use runner::run_task;
pub use worker::Worker;
