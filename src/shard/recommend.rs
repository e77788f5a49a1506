//! Recommended shard count
//!
//! Discord advertises how many shards a bot should run on
//! `GET /gateway/bot`. The orchestrator bounds the request with a timeout
//! and falls back to a single shard on any failure.

use crate::error::FleetError;

use std::future::Future;
use std::time::Duration;
use twilight_http::Client;

/// Source of the recommended shard count
pub trait ShardCountSource: Send + Sync {
    fn recommended_shards(&self) -> impl Future<Output = Result<u32, FleetError>> + Send;
}

/// Asks Discord through Twilight HTTP
pub struct GatewayShardCount {
    client: Client,
}

impl GatewayShardCount {
    pub fn new(token: String, timeout: Duration) -> Self {
        let client = Client::builder().token(token).timeout(timeout).build();
        Self { client }
    }
}

impl ShardCountSource for GatewayShardCount {
    async fn recommended_shards(&self) -> Result<u32, FleetError> {
        let response = self
            .client
            .gateway()
            .authed()
            .await
            .map_err(|e| FleetError::ShardCountQuery(Box::new(e)))?;

        let info = response
            .model()
            .await
            .map_err(|e| FleetError::ShardCountQuery(Box::new(e)))?;

        Ok(info.shards)
    }
}

/// Fixed count, for operators who pin the shard count and for tests
#[derive(Debug, Clone, Copy)]
pub struct FixedShardCount(pub u32);

impl ShardCountSource for FixedShardCount {
    async fn recommended_shards(&self) -> Result<u32, FleetError> {
        Ok(self.0)
    }
}
