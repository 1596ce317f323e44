//! 看板模型：每台设备的最新视图，只由消费者在 drain 时更新。

use domain::{DashboardReading, DeviceEndpoint, GasType, LampState, PollEvent};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// 重连提示。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconnectLabel {
    #[default]
    Hidden,
    Attempt { attempt: u32, max_attempts: u32 },
    Succeeded,
    Failed,
}

impl ReconnectLabel {
    pub fn text(&self) -> String {
        match self {
            Self::Hidden => String::new(),
            Self::Attempt {
                attempt,
                max_attempts,
            } => format!("Reconnect: {}/{}", attempt, max_attempts),
            Self::Succeeded => "Reconnect: OK".to_string(),
            Self::Failed => "Reconnect: Failed".to_string(),
        }
    }
}

/// 单台设备的看板视图。
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceView {
    pub gas_type: GasType,
    pub connected: bool,
    pub reading: DashboardReading,
    pub consecutive_disconnects: u64,
    pub reconnect: ReconnectLabel,
    pub fault: Option<String>,
    pub samples: u64,
    pub last_received_at_ms: Option<i64>,
}

impl DeviceView {
    fn new(gas_type: GasType) -> Self {
        Self {
            gas_type,
            connected: false,
            reading: DashboardReading::cleared(),
            consecutive_disconnects: 0,
            reconnect: ReconnectLabel::Hidden,
            fault: None,
            samples: 0,
            last_received_at_ms: None,
        }
    }

    pub fn lamps(&self) -> LampState {
        self.reading.lamps()
    }

    /// 浓度条比例；错误码或空白时为 0。
    pub fn gauge(&self) -> f64 {
        match self.reading.display {
            domain::DisplayValue::Reading(value) => self.gas_type.fraction_of_full_scale(value),
            _ => 0.0,
        }
    }

    /// 单行文本摘要（用于日志输出）。
    pub fn summary(&self) -> String {
        let lamps = self.lamps();
        let mut line = format!(
            "[{}] {:<6} AL1:{} AL2:{} PWR:{} FUT:{} {:>3}% {:>3}s",
            self.reading.display.text(),
            self.gas_type.as_str(),
            on_off(lamps.alarm1),
            on_off(lamps.alarm2),
            on_off(lamps.power),
            on_off(lamps.fault),
            self.reading.progress_percent,
            self.reading.remaining_seconds,
        );
        if self.consecutive_disconnects > 0 {
            let _ = write!(line, " disconnects={}", self.consecutive_disconnects);
        }
        let label = self.reconnect.text();
        if !label.is_empty() {
            let _ = write!(line, " {}", label);
        }
        if let Some(fault) = &self.fault {
            let _ = write!(line, " fault={}", fault);
        }
        line
    }
}

fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "--" }
}

/// 全部设备的看板。
#[derive(Debug, Default)]
pub struct DeviceBoard {
    devices: BTreeMap<DeviceEndpoint, DeviceView>,
}

impl DeviceBoard {
    pub fn new(entries: impl IntoIterator<Item = (DeviceEndpoint, GasType)>) -> Self {
        let devices = entries
            .into_iter()
            .map(|(endpoint, gas_type)| (endpoint, DeviceView::new(gas_type)))
            .collect();
        Self { devices }
    }

    pub fn get(&self, endpoint: &DeviceEndpoint) -> Option<&DeviceView> {
        self.devices.get(endpoint)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DeviceEndpoint, &DeviceView)> {
        self.devices.iter()
    }

    /// 应用一条事件；未登记的端点按默认气体类型加入。
    pub fn apply(&mut self, event: &PollEvent) {
        let view = self
            .devices
            .entry(event.endpoint().clone())
            .or_insert_with(|| DeviceView::new(GasType::default()));

        match event {
            PollEvent::SampleReady { sample, .. } => {
                view.connected = true;
                view.reading = sample.reading;
                view.fault = None;
                view.samples += 1;
                view.last_received_at_ms = Some(sample.received_at_ms);
            }
            PollEvent::Disconnected {
                consecutive_disconnects,
                cleared,
                ..
            } => {
                view.connected = false;
                view.reading = cleared.reading;
                view.consecutive_disconnects = *consecutive_disconnects;
            }
            PollEvent::ReconnectAttempt {
                attempt,
                max_attempts,
                ..
            } => {
                view.reconnect = ReconnectLabel::Attempt {
                    attempt: *attempt,
                    max_attempts: *max_attempts,
                };
            }
            PollEvent::ReconnectSucceeded { .. } => {
                view.reconnect = ReconnectLabel::Succeeded;
            }
            PollEvent::ReconnectExhausted { .. } => {
                view.connected = false;
                view.reading = DashboardReading::cleared();
                view.reconnect = ReconnectLabel::Failed;
            }
            PollEvent::PollerFaulted { reason, .. } => {
                view.connected = false;
                view.reading = DashboardReading::cleared();
                view.fault = Some(reason.clone());
            }
        }
    }
}
