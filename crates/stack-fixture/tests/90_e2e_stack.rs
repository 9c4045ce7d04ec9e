//! End-to-end session against the real Docker Compose stack.
//!
//! Requires docker with the compose plugin and the compose files at the
//! project root (found by walking up from this crate). Run with:
//!
//! ```bash
//! cargo test -p stack-fixture --features e2e -- --nocapture
//! ```

#![cfg(feature = "e2e")]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use serial_test::serial;
use stack_fixture::compose::ProcessRunner;
use stack_fixture::config::{EnvMode, StackConfig};
use stack_fixture::stack::{locate_project_root, run_session};
use std::path::Path;
use std::sync::Arc;

#[tokio::test]
#[serial]
async fn test_full_stack_session() {
    let defaults = StackConfig::from_env().expect("environment config should be valid");
    let root = locate_project_root(&defaults, Path::new(env!("CARGO_MANIFEST_DIR")))
        .expect("compose files should exist above the crate");
    let config = StackConfig::load(&StackConfig::dotenv_path(&root), EnvMode::Override)
        .expect("config should load");

    run_session(&config, &root, Arc::new(ProcessRunner), |handle| async move {
        let client = reqwest::Client::new();

        let health = client
            .get(handle.health_url())
            .send()
            .await
            .expect("health endpoint should respond");
        assert_eq!(health.status(), 200);

        let page = client
            .get(handle.base_url())
            .send()
            .await
            .expect("application should respond");
        assert!(
            page.status().is_success(),
            "base URL returned {}",
            page.status()
        );
    })
    .await
    .expect("stack session should complete and tear down cleanly");
}
