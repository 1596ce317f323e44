//! 应用运行配置加载。

use domain::{DeviceEndpoint, GasType};
use gds_poller::{PollerConfig, RegisterWindow};
use gds_protocol::ModbusTcpConfig;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// 被轮询设备及其（可选的）气体类型。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointEntry {
    pub endpoint: DeviceEndpoint,
    pub gas_type: Option<GasType>,
}

/// 端点文件中的一项：裸地址字符串，或带端口/从站号/气体类型的对象。
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FileEntry {
    Address(String),
    Detailed {
        address: String,
        port: Option<u16>,
        unit_id: Option<u8>,
        gas_type: Option<String>,
    },
}

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub endpoints: Vec<EndpointEntry>,
    pub modbus_port: u16,
    pub unit_id: u8,
    pub poll_interval_ms: u64,
    pub connect_attempts: u32,
    pub connect_backoff_ms: u64,
    pub reconnect_attempts: u32,
    pub reconnect_backoff_ms: u64,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub stop_timeout_ms: u64,
    pub drain_interval_ms: u64,
    pub window: RegisterWindow,
}

impl AppConfig {
    /// 从环境变量读取配置。
    ///
    /// `GDS_ENDPOINTS` 与 `GDS_ENDPOINTS_FILE` 至少要提供一个端点。
    pub fn from_env() -> Result<Self, ConfigError> {
        let modbus_port = read_u16_with_default("GDS_MODBUS_PORT", DeviceEndpoint::DEFAULT_PORT)?;
        let unit_id = read_u8_with_default("GDS_UNIT_ID", DeviceEndpoint::DEFAULT_UNIT_ID)?;

        let mut endpoints = Vec::new();
        if let Some(path) = read_optional("GDS_ENDPOINTS_FILE") {
            endpoints.extend(load_endpoint_file(Path::new(&path), modbus_port, unit_id)?);
        }
        if let Some(list) = read_optional("GDS_ENDPOINTS") {
            endpoints.extend(
                parse_endpoint_list(&list, modbus_port, unit_id)
                    .map_err(|message| ConfigError::Invalid("GDS_ENDPOINTS".to_string(), message))?,
            );
        }
        let endpoints = dedup_endpoints(endpoints);
        if endpoints.is_empty() {
            return Err(ConfigError::Missing(
                "GDS_ENDPOINTS or GDS_ENDPOINTS_FILE".to_string(),
            ));
        }

        let poll_interval_ms = read_u64_with_default("GDS_POLL_INTERVAL_MS", 200)?;
        let connect_attempts = read_u32_with_default("GDS_CONNECT_ATTEMPTS", 5)?;
        let connect_backoff_ms = read_u64_with_default("GDS_CONNECT_BACKOFF_MS", 2000)?;
        let reconnect_attempts = read_u32_with_default("GDS_RECONNECT_ATTEMPTS", 5)?;
        let reconnect_backoff_ms = read_u64_with_default("GDS_RECONNECT_BACKOFF_MS", 2000)?;
        let connect_timeout_ms = read_u64_with_default("GDS_CONNECT_TIMEOUT_MS", 3000)?;
        let read_timeout_ms = read_u64_with_default("GDS_READ_TIMEOUT_MS", 3000)?;
        let stop_timeout_ms = read_u64_with_default("GDS_STOP_TIMEOUT_MS", 5000)?;
        let drain_interval_ms = read_u64_with_default("GDS_DRAIN_INTERVAL_MS", 100)?;

        if poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "GDS_POLL_INTERVAL_MS".to_string(),
                "0".to_string(),
            ));
        }
        if drain_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "GDS_DRAIN_INTERVAL_MS".to_string(),
                "0".to_string(),
            ));
        }
        if connect_attempts == 0 {
            return Err(ConfigError::Invalid(
                "GDS_CONNECT_ATTEMPTS".to_string(),
                "0".to_string(),
            ));
        }

        let base_register = read_u32_with_default("GDS_WINDOW_BASE_REGISTER", 40001)?;
        let count = read_u16_with_default("GDS_WINDOW_COUNT", 11)?;
        let window = dashboard_window(base_register, count)?;

        Ok(Self {
            endpoints,
            modbus_port,
            unit_id,
            poll_interval_ms,
            connect_attempts,
            connect_backoff_ms,
            reconnect_attempts,
            reconnect_backoff_ms,
            connect_timeout_ms,
            read_timeout_ms,
            stop_timeout_ms,
            drain_interval_ms,
            window,
        })
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            poll_interval_ms: self.poll_interval_ms,
            connect_attempts: self.connect_attempts,
            connect_backoff_ms: self.connect_backoff_ms,
            reconnect_attempts: self.reconnect_attempts,
            reconnect_backoff_ms: self.reconnect_backoff_ms,
            connect_timeout_ms: self.connect_timeout_ms,
            stop_timeout_ms: self.stop_timeout_ms,
            window: self.window,
        }
    }

    pub fn tcp_config(&self) -> ModbusTcpConfig {
        ModbusTcpConfig {
            connect_timeout_ms: self.connect_timeout_ms,
            read_timeout_ms: self.read_timeout_ms,
        }
    }
}

/// 解析逗号分隔的 `host[:port]` 列表；未写端口的项使用 `default_port`。
pub fn parse_endpoint_list(
    list: &str,
    default_port: u16,
    unit_id: u8,
) -> Result<Vec<EndpointEntry>, String> {
    list.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            Ok(EndpointEntry {
                endpoint: parse_endpoint(item, default_port)?.with_unit_id(unit_id),
                gas_type: None,
            })
        })
        .collect()
}

/// 读取端点文件（JSON 数组）。
pub fn load_endpoint_file(
    path: &Path,
    default_port: u16,
    unit_id: u8,
) -> Result<Vec<EndpointEntry>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_endpoint_file(&content, default_port, unit_id).map_err(|message| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    })
}

/// 解析端点文件内容。
pub fn parse_endpoint_file(
    content: &str,
    default_port: u16,
    unit_id: u8,
) -> Result<Vec<EndpointEntry>, String> {
    let entries: Vec<FileEntry> = serde_json::from_str(content).map_err(|e| e.to_string())?;
    entries
        .into_iter()
        .map(|entry| match entry {
            FileEntry::Address(address) => Ok(EndpointEntry {
                endpoint: parse_endpoint(&address, default_port)?.with_unit_id(unit_id),
                gas_type: None,
            }),
            FileEntry::Detailed {
                address,
                port,
                unit_id: entry_unit,
                gas_type,
            } => {
                let mut endpoint = parse_endpoint(&address, default_port)?
                    .with_unit_id(entry_unit.unwrap_or(unit_id));
                if let Some(port) = port {
                    endpoint = endpoint.with_port(port);
                }
                let gas_type = gas_type
                    .map(|value| value.parse::<GasType>())
                    .transpose()?;
                Ok(EndpointEntry { endpoint, gas_type })
            }
        })
        .collect()
}

fn parse_endpoint(item: &str, default_port: u16) -> Result<DeviceEndpoint, String> {
    let endpoint: DeviceEndpoint = item.parse().map_err(|e| format!("{e}"))?;
    if has_explicit_port(item) {
        Ok(endpoint)
    } else {
        Ok(endpoint.with_port(default_port))
    }
}

fn has_explicit_port(item: &str) -> bool {
    let item = item.trim();
    if item.starts_with('[') {
        return item.contains("]:");
    }
    item.matches(':').count() == 1
}

/// 去重并保持首次出现的顺序。
fn dedup_endpoints(entries: Vec<EndpointEntry>) -> Vec<EndpointEntry> {
    let mut unique: Vec<EndpointEntry> = Vec::with_capacity(entries.len());
    for entry in entries {
        if !unique.iter().any(|seen| seen.endpoint == entry.endpoint) {
            unique.push(entry);
        }
    }
    unique
}

fn read_u32_with_default(key: &str, default: u32) -> Result<u32, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u32>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u16_with_default(key: &str, default: u16) -> Result<u16, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u16>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u8_with_default(key: &str, default: u8) -> Result<u8, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u8>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => None,
    }
}

/// 轮询窗口：起始地址可配置，长度必须等于看板布局的 11 个寄存器。
fn dashboard_window(base_register: u32, count: u16) -> Result<RegisterWindow, ConfigError> {
    if count != RegisterWindow::dashboard().count {
        return Err(ConfigError::Invalid(
            "GDS_WINDOW_COUNT".to_string(),
            count.to_string(),
        ));
    }
    RegisterWindow::from_register(base_register, count).map_err(|err| {
        ConfigError::Invalid("GDS_WINDOW_BASE_REGISTER".to_string(), err.to_string())
    })
}
