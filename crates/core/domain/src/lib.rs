pub mod data;
pub mod event;
pub mod gas;

pub use data::{DashboardReading, DetectorError, DisplayValue, LampState, PollSample, StatusWord};
pub use event::PollEvent;
pub use gas::GasType;

use std::fmt;
use std::str::FromStr;

/// 被轮询设备的身份：地址 + 端口 + 从站号。
///
/// 一旦为某个端点创建了轮询器即不可变，并唯一标识一个轮询槽位。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceEndpoint {
    address: String,
    port: u16,
    unit_id: u8,
}

impl DeviceEndpoint {
    pub const DEFAULT_PORT: u16 = 502;
    pub const DEFAULT_UNIT_ID: u8 = 1;

    /// 使用默认端口 502 与从站号 1 构造端点。
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            port: Self::DEFAULT_PORT,
            unit_id: Self::DEFAULT_UNIT_ID,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_unit_id(mut self, unit_id: u8) -> Self {
        self.unit_id = unit_id;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn unit_id(&self) -> u8 {
        self.unit_id
    }

    /// `host:port` 形式，IPv6 地址自动加方括号。
    pub fn host_port(&self) -> String {
        if self.address.contains(':') && !self.address.starts_with('[') {
            format!("[{}]:{}", self.address, self.port)
        } else {
            format!("{}:{}", self.address, self.port)
        }
    }
}

impl fmt::Display for DeviceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.host_port(), self.unit_id)
    }
}

/// 端点字符串解析错误。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointParseError {
    input: String,
    reason: &'static str,
}

impl EndpointParseError {
    fn new(input: &str, reason: &'static str) -> Self {
        Self {
            input: input.to_string(),
            reason,
        }
    }
}

impl fmt::Display for EndpointParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid endpoint {:?}: {}", self.input, self.reason)
    }
}

impl std::error::Error for EndpointParseError {}

impl FromStr for DeviceEndpoint {
    type Err = EndpointParseError;

    /// 接受 `host`、`host:port`、`[v6]:port` 与裸 IPv6 地址。
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let value = input.trim();
        if value.is_empty() {
            return Err(EndpointParseError::new(input, "empty address"));
        }

        if let Some(rest) = value.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| EndpointParseError::new(input, "unterminated '['"))?;
            if host.is_empty() {
                return Err(EndpointParseError::new(input, "empty address"));
            }
            let endpoint = Self::new(host);
            return match tail.strip_prefix(':') {
                Some(port) => Ok(endpoint.with_port(parse_port(input, port)?)),
                None if tail.is_empty() => Ok(endpoint),
                None => Err(EndpointParseError::new(input, "unexpected text after ']'")),
            };
        }

        match value.matches(':').count() {
            0 => Ok(Self::new(value)),
            1 => {
                let (host, port) = value
                    .split_once(':')
                    .ok_or_else(|| EndpointParseError::new(input, "missing port"))?;
                if host.is_empty() {
                    return Err(EndpointParseError::new(input, "empty address"));
                }
                Ok(Self::new(host).with_port(parse_port(input, port)?))
            }
            // 裸 IPv6 地址，无端口。
            _ => Ok(Self::new(value)),
        }
    }
}

fn parse_port(input: &str, port: &str) -> Result<u16, EndpointParseError> {
    port.trim()
        .parse::<u16>()
        .map_err(|_| EndpointParseError::new(input, "invalid port"))
}
