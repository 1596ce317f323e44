//! # 协议通信能力模块
//!
//! 为设备轮询提供 Modbus 客户端能力：
//! - **ModbusClient**：连接、读取保持寄存器、关闭（轮询核心依赖的契约）
//! - **ModbusTcpClient**：基于 tokio-modbus 的 TCP 实现
//!
//! ## 架构设计
//!
//! ```text
//! PollerSupervisor
//!       │  ClientFactory::create(endpoint)
//!       ▼
//! DevicePoller ──owns──► Box<dyn ModbusClient>
//!                               │
//!                               ▼
//!                        ModbusTcpClient (tokio-modbus)
//! ```
//!
//! ## 配置格式
//!
//! ```json
//! { "connect_timeout_ms": 3000, "read_timeout_ms": 3000 }
//! ```
//!
//! 寄存器寻址：逻辑寄存器号 - 40001 = 读调用使用的零基偏移。

mod client;
mod error;
mod modbus_tcp;

pub use client::{ClientFactory, ModbusClient};
pub use error::ProtocolError;
pub use modbus_tcp::{ModbusTcpClient, ModbusTcpClientFactory, ModbusTcpConfig};
