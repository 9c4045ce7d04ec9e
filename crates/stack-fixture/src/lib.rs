//! Docker Compose Stack Fixture
//!
//! This crate owns the lifecycle of a multi-service backing stack for one
//! end-to-end test session: start the stack with `docker compose up --build
//! --wait`, poll the application's health endpoint until it answers 200, hand
//! a `StackHandle` to dependent tests, and run `docker compose down` exactly
//! once when the session ends, whether the tests passed, failed, or panicked.
//!
//! # Features
//!
//! - `test-utils`: scripted command runner and health check for tests that
//!   must not touch docker
//! - `e2e`: docker-backed end-to-end tests
//!
//! # Configuration
//!
//! | Variable | Default |
//! |----------|---------|
//! | `TEST_PORT` | `8002` |
//! | `COMPOSE_BIN` | `docker` |
//! | `COMPOSE_FILE_BASE` | `docker-compose.dev.yml` |
//! | `COMPOSE_FILE_OVERRIDE` | `docker-compose.test.override.yml` |
//! | `READY_TIMEOUT_SECONDS` | `120` |
//! | `READY_INTERVAL_SECONDS` | `5` |
//! | `READY_REQUEST_TIMEOUT_SECONDS` | `5` |
//!
//! Values may also come from a `.env` file in the project root.
//!
//! # Usage
//!
//! ```no_run
//! use stack_fixture::compose::ProcessRunner;
//! use stack_fixture::config::{EnvMode, StackConfig};
//! use stack_fixture::stack::{locate_project_root, run_session};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = StackConfig::from_env()?;
//! let root = locate_project_root(&config, Path::new(env!("CARGO_MANIFEST_DIR")))?;
//! let config = StackConfig::load(&StackConfig::dotenv_path(&root), EnvMode::Override)?;
//!
//! run_session(&config, &root, Arc::new(ProcessRunner), |handle| async move {
//!     let body = reqwest::get(handle.base_url()).await;
//!     assert!(body.is_ok());
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

pub mod compose;
pub mod config;
pub mod project;
pub mod readiness;
pub mod stack;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use compose::{CommandRunner, ComposeCommand, ComposeFiles, ProcessRunner};
pub use config::{EnvMode, StackConfig};
pub use readiness::{wait_for_ready, HealthCheck, HttpHealthCheck, ReadinessPolicy};
pub use stack::{run_session, ComposeStack, StackError, StackHandle};
