//! # 设备轮询能力模块
//!
//! 每台设备一个独立的 tokio 任务，负责：
//! - **连接**：首次连接最多重试 N 次，每次之间固定退避
//! - **轮询**：固定节拍读取寄存器窗口、解码、发布样本（节拍自校正）
//! - **断线重连**：检测传输故障 → 清空显示 → 有界自动重连 → 耗尽后放弃
//! - **监管**：`PollerSupervisor` 保证每个端点至多一个活动轮询器
//!
//! ## 状态迁移
//!
//! ```text
//! Idle ──► Connecting ──► Polling ⇄ Reconnecting ──► Failed
//!              │              │            │
//!              ▼              ▼            ▼
//!            Idle          Faulted      Stopped（仅外部 stop）
//! ```
//!
//! ## 事件流
//!
//! ```text
//! DevicePoller (N 个任务) ──publish──► EventSink (mpsc) ──drain──► 消费者（单一执行上下文）
//! ```

mod cadence;
mod config;
mod error;
mod poller;
mod sink;
mod supervisor;

pub use cadence::Cadence;
pub use config::{PollerConfig, RegisterWindow};
pub use error::PollerError;
pub use poller::{DevicePoller, DisconnectLedger, PollerPhase, PollerStatus, StopOutcome};
pub use sink::{ChannelSink, EventDrain, EventSink, event_channel};
pub use supervisor::{PollerSupervisor, StartOutcome};
