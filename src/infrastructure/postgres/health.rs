//! Periodic PostgreSQL health checks

use std::time::Duration;

use tokio::task::JoinHandle;

use super::PostgresPool;

/// Background task pinging the pool on a fixed period until the pool closes.
pub struct HealthChecker {
    pool: PostgresPool,
    period: Duration,
}

impl HealthChecker {
    pub fn new(pool: PostgresPool, period: Duration) -> Self {
        Self { pool, period }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run the health check loop
    pub async fn run(self) {
        let shutdown = self.pool.closed_token();
        let mut timer = tokio::time::interval(self.period);

        // Skip immediate first tick
        timer.tick().await;

        tracing::debug!(
            period_secs = self.period.as_secs(),
            "PostgreSQL health checker started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = timer.tick() => self.check().await,
            }
        }

        tracing::debug!("PostgreSQL health checker stopped");
    }

    async fn check(&self) {
        match tokio::time::timeout(self.period, self.pool.ping()).await {
            Ok(Ok(())) => tracing::debug!(
                pool_size = self.pool.size(),
                idle_connections = self.pool.num_idle(),
                "PostgreSQL health check passed"
            ),
            Ok(Err(e)) => tracing::warn!(error = %e, "PostgreSQL health check failed"),
            Err(_) => tracing::warn!(
                timeout_secs = self.period.as_secs(),
                "PostgreSQL health check timed out"
            ),
        }
    }
}
