use crate::poller::PollerPhase;
use domain::DeviceEndpoint;

/// 轮询器错误。
#[derive(Debug, thiserror::Error)]
pub enum PollerError {
    /// 首次连接重试耗尽，未进入轮询。
    #[error("failed to connect to {endpoint} after {attempts} attempts")]
    ConnectExhausted {
        endpoint: DeviceEndpoint,
        attempts: u32,
    },
    #[error("poller for {0} was stopped while connecting")]
    StoppedWhileConnecting(DeviceEndpoint),
    #[error("poller for {endpoint} cannot start from phase {phase:?}")]
    InvalidPhase {
        endpoint: DeviceEndpoint,
        phase: PollerPhase,
    },
}
