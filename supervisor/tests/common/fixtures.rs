//! Test fixtures and data for supervisor tests
//!
//! This module provides consistent test data and fixtures used across all test suites.

use std::path::Path;
use std::time::Duration;

use clap::Parser;
use shared::{Progress, UpdateInfo};
use supervisor::{Args, SupervisorConfig};

/// Standard test data and fixtures
pub struct TestFixtures;

impl TestFixtures {
    /// Standard configuration values
    pub const BACKEND_PATH: &'static str = "/opt/qbox/qbox-backend";
    pub const BACKEND_PORT: u16 = 18080;
    pub const REPOSITORY: &'static str = "qbox-app/qbox";
    pub const NEXT_VERSION: &'static str = "9.0.0";

    /// Configuration rooted in `data_dir` with short health timeouts
    pub fn config(data_dir: &Path) -> SupervisorConfig {
        let port = Self::BACKEND_PORT.to_string();
        let args = Args::try_parse_from([
            "qbox-supervisor",
            "--data-dir",
            data_dir.to_str().unwrap(),
            "--backend-path",
            Self::BACKEND_PATH,
            "--port",
            port.as_str(),
            "--update-repository",
            Self::REPOSITORY,
            "--health-timeout-ms",
            "3000",
            "--health-poll-ms",
            "100",
        ])
        .unwrap();

        let mut config = SupervisorConfig::from_args(args).unwrap();
        config.health.readiness_interval = Duration::from_millis(50);
        config.health.readiness_timeout = Duration::from_millis(500);
        config
    }

    /// A release newer than anything the tests run as
    pub fn update_info() -> UpdateInfo {
        UpdateInfo {
            version: Self::NEXT_VERSION.to_string(),
            release_date: "2026-10-01T08:00:00Z".to_string(),
            release_name: Some("QBox 9".to_string()),
            release_notes: Some("Query history sync".to_string()),
        }
    }

    /// Progress samples for a 4 KiB download
    pub fn progress_samples() -> Vec<Progress> {
        [1024, 2048, 4096]
            .into_iter()
            .map(|transferred| Progress::from_transfer(transferred, 4096, Duration::from_millis(250)))
            .collect()
    }
}
