//! # LibOneBot Runtime
//!
//! Orchestration layer for LibOneBot implementations.
//!
//! This crate provides what sits around the protocol core in a real
//! program:
//!
//! - Layered configuration with figment: TOML file, `LIBONEBOT_*`
//!   environment variables, programmatic overrides ([`config`])
//! - Logging setup on top of `tracing-subscriber` ([`logging`])
//! - A runner that starts the implementation and shuts it down on
//!   Ctrl+C or SIGTERM ([`runner`])
//!
//! # Example
//!
//! ```rust,ignore
//! use libonebot_core::model::ImplInfo;
//! use libonebot_runtime::{config::ConfigLoader, logging, runner};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::new().load()?;
//!     logging::init_from_config(&config.logging);
//!
//!     let ob = config
//!         .builder(ImplInfo::new("my-impl", "0.1.0"))?
//!         .action(schema, handler)
//!         .build()?;
//!
//!     runner::run(&ob).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runner;

pub use config::{ConfigLoader, ConnectionConfig, LoggingConfig, RuntimeConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::LoggingBuilder;
pub use runner::{run, run_until};
