//! Modbus TCP 客户端实现
//!
//! 基于 tokio-modbus 连接从设备并读取保持寄存器。
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! let config = ModbusTcpConfig::default();
//! let mut client = ModbusTcpClient::new(DeviceEndpoint::new("192.168.1.100"), config);
//! client.connect().await?;
//! let registers = client.read_holding_registers(0, 11).await?;
//! ```

use crate::client::{ClientFactory, ModbusClient};
use crate::error::ProtocolError;
use async_trait::async_trait;
use domain::DeviceEndpoint;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::timeout;
use tokio_modbus::prelude::*;
use tracing::{debug, info, warn};

/// Modbus TCP 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModbusTcpConfig {
    /// 单次连接超时（毫秒）
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// 单次读取超时（毫秒）
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
}

fn default_connect_timeout() -> u64 {
    3000
}

fn default_read_timeout() -> u64 {
    3000
}

impl Default for ModbusTcpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout(),
            read_timeout_ms: default_read_timeout(),
        }
    }
}

impl ModbusTcpConfig {
    /// 从 JSON 配置字符串解析
    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(json).map_err(|e| ProtocolError::ConfigParse(e.to_string()))
    }

    fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Modbus TCP 客户端
pub struct ModbusTcpClient {
    endpoint: DeviceEndpoint,
    config: ModbusTcpConfig,
    ctx: Option<tokio_modbus::client::Context>,
}

impl ModbusTcpClient {
    pub fn new(endpoint: DeviceEndpoint, config: ModbusTcpConfig) -> Self {
        Self {
            endpoint,
            config,
            ctx: None,
        }
    }

    pub fn endpoint(&self) -> &DeviceEndpoint {
        &self.endpoint
    }

    /// 解析端点地址（参数按值传入，不跨 await 借用 `self`）。
    async fn resolve(host_port: String, limit: Duration) -> Result<SocketAddr, ProtocolError> {
        let mut addrs = timeout(limit, tokio::net::lookup_host(host_port.clone()))
            .await
            .map_err(|_| ProtocolError::Timeout(format!("resolve {}", host_port)))??;
        addrs
            .next()
            .ok_or_else(|| ProtocolError::Connection(format!("no address for {}", host_port)))
    }
}

#[async_trait]
impl ModbusClient for ModbusTcpClient {
    async fn connect(&mut self) -> Result<(), ProtocolError> {
        self.close().await;

        let addr = Self::resolve(self.endpoint.host_port(), self.config.connect_timeout()).await?;
        let slave = Slave(self.endpoint.unit_id());
        let ctx = timeout(self.config.connect_timeout(), tcp::connect_slave(addr, slave))
            .await
            .map_err(|_| ProtocolError::Timeout(format!("connect {}", addr)))?
            .map_err(|e| ProtocolError::Connection(e.to_string()))?;

        info!(target: "gds.protocol", endpoint = %self.endpoint, %addr, "modbus_connected");
        self.ctx = Some(ctx);
        Ok(())
    }

    async fn read_holding_registers(
        &mut self,
        offset: u16,
        count: u16,
    ) -> Result<Vec<u16>, ProtocolError> {
        let read_timeout = self.config.read_timeout();
        let ctx = self.ctx.as_mut().ok_or(ProtocolError::NotConnected)?;

        let result = match timeout(read_timeout, ctx.read_holding_registers(offset, count)).await {
            Err(_) => Err(ProtocolError::Timeout(format!(
                "read {} registers at offset {}",
                count, offset
            ))),
            Ok(Err(e)) => Err(ProtocolError::Modbus(e.to_string())),
            Ok(Ok(Err(code))) => Err(ProtocolError::Exception(format!("{:?}", code))),
            Ok(Ok(Ok(registers))) => Ok(registers),
        };

        match &result {
            Ok(registers) => {
                debug!(
                    target: "gds.protocol",
                    endpoint = %self.endpoint,
                    offset = offset,
                    count = count,
                    values = ?registers,
                    "read modbus registers"
                );
            }
            Err(ProtocolError::Exception(_)) => {}
            Err(err) => {
                // 传输层已不可用，丢弃上下文，后续只能重新连接。
                warn!(
                    target: "gds.protocol",
                    endpoint = %self.endpoint,
                    error = %err,
                    "modbus_transport_lost"
                );
                self.ctx = None;
            }
        }
        result
    }

    async fn close(&mut self) {
        if let Some(mut ctx) = self.ctx.take() {
            if let Err(err) = ctx.disconnect().await {
                debug!(
                    target: "gds.protocol",
                    endpoint = %self.endpoint,
                    error = %err,
                    "modbus_disconnect_failed"
                );
            }
            info!(target: "gds.protocol", endpoint = %self.endpoint, "modbus_closed");
        }
    }

    fn is_connected(&self) -> bool {
        self.ctx.is_some()
    }
}

/// 为每个端点创建 [`ModbusTcpClient`]。
#[derive(Debug, Clone, Default)]
pub struct ModbusTcpClientFactory {
    config: ModbusTcpConfig,
}

impl ModbusTcpClientFactory {
    pub fn new(config: ModbusTcpConfig) -> Self {
        Self { config }
    }
}

impl ClientFactory for ModbusTcpClientFactory {
    fn create(&self, endpoint: &DeviceEndpoint) -> Box<dyn ModbusClient> {
        Box::new(ModbusTcpClient::new(endpoint.clone(), self.config.clone()))
    }
}
