//! Service-specific tests
//!
//! Each real service has its own test file. These talk to real processes,
//! files and (mocked) HTTP servers, so they live apart from the pure unit
//! tests next to each module.

#[cfg(unix)]
mod process_management;

// Common test utilities for services
pub mod common {
    use std::time::Duration;
    use tokio::time::timeout;

    /// Standard timeout for async operations in tests
    pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    /// Helper to run async operations with timeout
    pub async fn with_timeout<T, F>(future: F) -> Result<T, tokio::time::error::Elapsed>
    where
        F: std::future::Future<Output = T>,
    {
        timeout(TEST_TIMEOUT, future).await
    }

    /// Poll `condition` every 20 ms until it holds or the standard timeout passes
    pub async fn eventually<F: FnMut() -> bool>(mut condition: F) -> bool {
        with_timeout(async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .is_ok()
    }
}
