//! 配置管理模块
//! 支持从环境变量和配置文件加载配置

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::infrastructure::pbkdf2::{KdfParams, MAX_ITERATIONS, MIN_PRODUCTION_ITERATIONS};

/// 应用配置结构体
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub kdf: KdfConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub reconciliation: ReconciliationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 存储后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Postgres,
}

/// 存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

/// 私钥加密的 KDF 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KdfConfig {
    pub iterations: u32,
}

/// 兑换服务商配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
    /// EVM 链ID → 服务商网络名（TOML 键只能是字符串）
    #[serde(default = "default_network_map")]
    pub network_map: BTreeMap<String, String>,
}

/// 后台对账配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "text"
}

fn default_network_map() -> BTreeMap<String, String> {
    [
        ("1", "eth"),
        ("56", "bsc"),
        ("137", "polygon"),
        ("43114", "avalanche"),
        ("10", "optimism"),
        ("42161", "arbitrum"),
    ]
    .into_iter()
    .map(|(id, name)| (id.to_string(), name.to_string()))
    .collect()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: match std::env::var("STORE_BACKEND").as_deref() {
                Ok("postgres") | Ok("postgresql") => StoreBackend::Postgres,
                _ => StoreBackend::Memory,
            },
            url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://postgres@localhost:5432/ironvault".into()),
            max_connections: std::env::var("DB_MAX_CONNS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(16),
            min_connections: std::env::var("DB_MIN_CONNS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            acquire_timeout_secs: std::env::var("DB_ACQ_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
        }
    }
}

impl Default for KdfConfig {
    fn default() -> Self {
        Self {
            iterations: std::env::var("KDF_ITERATIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(MIN_PRODUCTION_ITERATIONS),
        }
    }
}

impl KdfConfig {
    pub fn params(&self) -> KdfParams {
        KdfParams {
            iterations: self.iterations,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: std::env::var("CHANGENOW_BASE_URL")
                .unwrap_or_else(|_| "https://api.changenow.io".into()),
            api_key: std::env::var("CHANGENOW_API_KEY").unwrap_or_default(),
            timeout_secs: std::env::var("GATEWAY_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
            network_map: default_network_map(),
        }
    }
}

impl GatewayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            enabled: std::env::var("RECONCILIATION_ENABLED")
                .ok()
                .map(|v| v == "1")
                .unwrap_or(true),
            interval_secs: std::env::var("RECONCILIATION_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".into()),
        }
    }
}

impl Config {
    /// 从环境变量加载配置（会先读取 .env）
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Ok(Self {
            store: StoreConfig::default(),
            kdf: KdfConfig::default(),
            gateway: GatewayConfig::default(),
            reconciliation: ReconciliationConfig::default(),
            logging: LoggingConfig::default(),
        })
    }

    /// 从配置文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;

        Ok(config)
    }

    /// 从环境变量和配置文件合并加载（配置文件优先级更高）
    pub fn from_env_and_file<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let mut config = Self::from_env()?;

        if let Some(path) = path {
            if path.as_ref().exists() {
                // 文件中缺失的段落回落到环境变量默认值
                config = Self::from_file(path)?;
            }
        }

        Ok(config)
    }

    /// 组件运行所需的最低约束（手动组装时同样检查）
    pub fn validate_runtime(&self) -> Result<()> {
        if self.gateway.timeout_secs == 0 {
            anyhow::bail!("GATEWAY_TIMEOUT_SECS must be greater than 0");
        }
        if self.reconciliation.interval_secs == 0 {
            anyhow::bail!("RECONCILIATION_INTERVAL_SECS must be greater than 0");
        }
        Ok(())
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<()> {
        if self.store.backend == StoreBackend::Postgres
            && !self.store.url.starts_with("postgres://")
            && !self.store.url.starts_with("postgresql://")
        {
            anyhow::bail!("DATABASE_URL must start with postgres:// or postgresql://");
        }

        if self.kdf.iterations < MIN_PRODUCTION_ITERATIONS || self.kdf.iterations > MAX_ITERATIONS {
            anyhow::bail!(
                "KDF_ITERATIONS must be between {} and {}",
                MIN_PRODUCTION_ITERATIONS,
                MAX_ITERATIONS
            );
        }

        self.validate_runtime()?;
        if !self.gateway.base_url.starts_with("http://")
            && !self.gateway.base_url.starts_with("https://")
        {
            anyhow::bail!("CHANGENOW_BASE_URL must be an http(s) URL");
        }
        for chain_id in self.gateway.network_map.keys() {
            chain_id
                .parse::<u64>()
                .with_context(|| format!("network_map key is not a chain id: {}", chain_id))?;
        }
        if self.gateway.api_key.is_empty() {
            tracing::warn!("CHANGENOW_API_KEY is not set, exchange calls will be rejected");
        }

        // 验证日志级别
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!("LOG_LEVEL must be one of: {:?}", valid_levels);
        }

        // 验证日志格式
        if self.logging.format != "json" && self.logging.format != "text" {
            anyhow::bail!("LOG_FORMAT must be 'json' or 'text'");
        }

        Ok(())
    }
}
