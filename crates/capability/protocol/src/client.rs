//! Modbus 客户端能力抽象
//!
//! 轮询核心只依赖此契约，不实现 Modbus 帧、CRC 或传输。

use crate::error::ProtocolError;
use async_trait::async_trait;
use domain::DeviceEndpoint;

/// Modbus 客户端能力。
///
/// 连接句柄由单个轮询器独占，不在轮询器之间共享。
#[async_trait]
pub trait ModbusClient: Send {
    /// 建立（或重建）连接。
    async fn connect(&mut self) -> Result<(), ProtocolError>;

    /// 读取保持寄存器，`offset` 为零基偏移（逻辑寄存器号 - 40001）。
    async fn read_holding_registers(
        &mut self,
        offset: u16,
        count: u16,
    ) -> Result<Vec<u16>, ProtocolError>;

    /// 关闭连接；可重复调用。
    async fn close(&mut self);

    fn is_connected(&self) -> bool;
}

/// 客户端工厂：每次启动轮询器都创建一个全新的连接句柄。
pub trait ClientFactory: Send + Sync {
    fn create(&self, endpoint: &DeviceEndpoint) -> Box<dyn ModbusClient>;
}
