use crate::DeviceEndpoint;
use crate::data::PollSample;

/// 轮询器发往结果汇（UI / 日志消费者）的类型化事件。
///
/// 每一次状态迁移都有对应事件，消费者无需直接读取轮询器内部状态。
#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    /// 一次成功读取并解码。
    SampleReady {
        endpoint: DeviceEndpoint,
        sample: PollSample,
    },
    /// 检测到断线；`cleared` 为清空后的显示样本。
    Disconnected {
        endpoint: DeviceEndpoint,
        consecutive_disconnects: u64,
        cleared: PollSample,
    },
    /// 第 `attempt` 次自动重连（从 1 开始）。
    ReconnectAttempt {
        endpoint: DeviceEndpoint,
        attempt: u32,
        max_attempts: u32,
    },
    ReconnectSucceeded {
        endpoint: DeviceEndpoint,
    },
    /// 自动重连次数耗尽，设备不再轮询，直到外部重新启动。
    ReconnectExhausted {
        endpoint: DeviceEndpoint,
        attempts: u32,
    },
    /// 解码契约被破坏（寄存器窗口长度不符），轮询器终止。
    PollerFaulted {
        endpoint: DeviceEndpoint,
        reason: String,
    },
}

impl PollEvent {
    pub fn endpoint(&self) -> &DeviceEndpoint {
        match self {
            Self::SampleReady { endpoint, .. }
            | Self::Disconnected { endpoint, .. }
            | Self::ReconnectAttempt { endpoint, .. }
            | Self::ReconnectSucceeded { endpoint }
            | Self::ReconnectExhausted { endpoint, .. }
            | Self::PollerFaulted { endpoint, .. } => endpoint,
        }
    }

    /// 事件名（用于日志）。
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SampleReady { .. } => "sample_ready",
            Self::Disconnected { .. } => "disconnected",
            Self::ReconnectAttempt { .. } => "reconnect_attempt",
            Self::ReconnectSucceeded { .. } => "reconnect_succeeded",
            Self::ReconnectExhausted { .. } => "reconnect_exhausted",
            Self::PollerFaulted { .. } => "poller_faulted",
        }
    }
}
