use gds_decode::{DASHBOARD_WINDOW_LEN, DecodeError, register_offset};
use std::time::Duration;

/// 一次读取的保持寄存器窗口。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterWindow {
    /// 零基偏移。
    pub base_offset: u16,
    pub count: u16,
}

impl RegisterWindow {
    /// 看板窗口：40001 ~ 40011。
    pub fn dashboard() -> Self {
        Self {
            base_offset: 0,
            count: DASHBOARD_WINDOW_LEN as u16,
        }
    }

    /// 由厂商文档中的逻辑寄存器号构造。
    pub fn from_register(register: u32, count: u16) -> Result<Self, DecodeError> {
        Ok(Self {
            base_offset: register_offset(register)?,
            count,
        })
    }
}

impl Default for RegisterWindow {
    fn default() -> Self {
        Self::dashboard()
    }
}

/// 轮询参数。
///
/// 连接超时、退避间隔、重试上限三者相互独立。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerConfig {
    pub poll_interval_ms: u64,
    pub connect_attempts: u32,
    pub connect_backoff_ms: u64,
    pub reconnect_attempts: u32,
    pub reconnect_backoff_ms: u64,
    /// 单次连接尝试的超时。
    pub connect_timeout_ms: u64,
    /// stop 时等待任务退出的上限。
    pub stop_timeout_ms: u64,
    pub window: RegisterWindow,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 200,
            connect_attempts: 5,
            connect_backoff_ms: 2000,
            reconnect_attempts: 5,
            reconnect_backoff_ms: 2000,
            connect_timeout_ms: 3000,
            stop_timeout_ms: 5000,
            window: RegisterWindow::dashboard(),
        }
    }
}

impl PollerConfig {
    pub(crate) fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub(crate) fn connect_backoff(&self) -> Duration {
        Duration::from_millis(self.connect_backoff_ms)
    }

    pub(crate) fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    pub(crate) fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub(crate) fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}
