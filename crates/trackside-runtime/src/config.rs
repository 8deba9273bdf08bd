//! Resolved connection and console settings.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use trackside_core::analytics::TimeRange;
use trackside_sync::{ApiClient, ApiConfig, RpcConfig};

use crate::cli::{ConnectionOpts, ConsoleOpts};

impl ConnectionOpts {
    /// RPC socket endpoint, `ws://host:port/ws`.
    pub fn ws_url(&self) -> String {
        format!("ws://{}:{}/ws", self.host, self.port)
    }

    pub fn api_base(&self) -> String {
        match &self.api_base {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => format!("http://{}:{}", self.host, self.port),
        }
    }

    pub fn rpc_config(&self) -> RpcConfig {
        RpcConfig::new(self.ws_url(), self.token.clone())
    }

    pub fn api_config(&self) -> ApiConfig {
        let mut config = ApiConfig::new(self.api_base());
        config.api_key = self.api_key.clone().filter(|key| !key.is_empty());
        config
    }

    pub fn api_client(&self) -> anyhow::Result<Arc<ApiClient>> {
        let client = ApiClient::new(self.api_config()).context("building HTTP client")?;
        Ok(Arc::new(client))
    }
}

#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    pub rpc: RpcConfig,
    pub api: ApiConfig,
    pub hints_cooldown: Duration,
    pub hints_interval: Duration,
    pub kpi_interval: Duration,
    pub time_range: TimeRange,
    pub since: u64,
    pub audit_limit: u32,
}

impl ConsoleConfig {
    pub fn new(conn: &ConnectionOpts, opts: &ConsoleOpts) -> Self {
        Self {
            rpc: conn.rpc_config(),
            api: conn.api_config(),
            hints_cooldown: Duration::from_millis(opts.hints_cooldown_ms),
            // Zero would make tokio's interval panic.
            hints_interval: Duration::from_secs(opts.hints_interval_secs.max(1)),
            kpi_interval: Duration::from_secs(opts.kpi_interval_secs.max(1)),
            time_range: opts.time_range,
            since: opts.since,
            audit_limit: opts.audit_limit,
        }
    }
}
