//! 协议错误类型定义

/// 协议通信错误
///
/// 对轮询器而言，除 `ConfigParse` 外均视为传输故障，走同一条断线重连路径。
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// 连接错误
    #[error("connection error: {0}")]
    Connection(String),

    /// IO 错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Modbus 传输错误
    #[error("modbus error: {0}")]
    Modbus(String),

    /// 设备返回的 Modbus 异常帧
    #[error("modbus exception: {0}")]
    Exception(String),

    /// 超时错误
    #[error("timeout: {0}")]
    Timeout(String),

    /// 未连接
    #[error("not connected")]
    NotConnected,

    /// 配置解析错误
    #[error("config parse error: {0}")]
    ConfigParse(String),
}
