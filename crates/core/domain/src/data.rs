use std::time::Instant;

/// 一次成功读取的结果（看板窗口）。
///
/// 只保留每台设备的最新值；历史由下游消费者自行保存。
#[derive(Debug, Clone, PartialEq)]
pub struct PollSample {
    /// 窗口起始偏移（逻辑寄存器号 - 40001）。
    pub base_offset: u16,
    /// 原始寄存器值；清空样本为空。
    pub registers: Vec<u16>,
    /// 单调时钟时间戳。
    pub taken_at: Instant,
    /// 接收时间戳（毫秒）。
    pub received_at_ms: i64,
    pub reading: DashboardReading,
}

impl PollSample {
    /// 断线时下发的清空样本：所有状态位为假、显示空白、进度为 0。
    pub fn cleared(base_offset: u16) -> Self {
        Self {
            base_offset,
            registers: Vec::new(),
            taken_at: Instant::now(),
            received_at_ms: now_epoch_ms(),
            reading: DashboardReading::cleared(),
        }
    }

    pub fn is_cleared(&self) -> bool {
        self.registers.is_empty() && self.reading == DashboardReading::cleared()
    }
}

/// 看板窗口（11 个寄存器）解码出的领域事实。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DashboardReading {
    pub alarm1_on: bool,
    pub alarm2_on: bool,
    /// register[7] 的 bit0..3。
    pub error_bits: u8,
    pub display: DisplayValue,
    pub progress_percent: u8,
    pub remaining_seconds: u8,
}

impl DashboardReading {
    pub fn cleared() -> Self {
        Self {
            alarm1_on: false,
            alarm2_on: false,
            error_bits: 0,
            display: DisplayValue::Blank,
            progress_percent: 0,
            remaining_seconds: 0,
        }
    }

    pub fn alarm_active(&self) -> bool {
        self.alarm1_on || self.alarm2_on
    }

    /// AL1 / AL2 / PWR / FUT 指示灯。
    pub fn lamps(&self) -> LampState {
        if self.display == DisplayValue::Blank {
            return LampState::default();
        }
        LampState {
            alarm1: self.alarm1_on,
            alarm2: self.alarm2_on,
            power: true,
            fault: self.display.blinks(),
        }
    }
}

/// 指示灯状态。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LampState {
    pub alarm1: bool,
    pub alarm2: bool,
    pub power: bool,
    pub fault: bool,
}

/// 四位数码管上的主显示内容。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayValue {
    /// 气体浓度（register[4] 的十进制值）。
    Reading(u16),
    /// 错误/提示码。
    Error(DetectorError),
    /// 空白（断线或未连接）。
    Blank,
}

impl DisplayValue {
    /// 四字符显示文本：读数右对齐并消去前导零，错误码按表输出。
    pub fn text(&self) -> String {
        match self {
            Self::Reading(value) => format!("{:>4}", value),
            Self::Error(error) => error.code().to_string(),
            Self::Blank => "    ".to_string(),
        }
    }

    /// 含 `E` 的错误码需要闪烁显示。
    pub fn blinks(&self) -> bool {
        match self {
            Self::Error(error) => error.code().contains('E'),
            _ => false,
        }
    }
}

/// register[7] bit0..3 对应的显示码。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetectorError {
    /// bit0：传感器故障。
    Sensor,
    /// bit1：通信故障。
    Communication,
    /// bit2：电源故障。
    Power,
    /// bit3：校准中（提示，不闪烁）。
    Calibration,
}

impl DetectorError {
    pub const ALL: [DetectorError; 4] = [
        DetectorError::Sensor,
        DetectorError::Communication,
        DetectorError::Power,
        DetectorError::Calibration,
    ];

    /// 按位号查表；仅 0..=3 有效。
    pub fn from_bit(bit: u8) -> Option<Self> {
        Self::ALL.get(usize::from(bit)).copied()
    }

    pub fn bit(&self) -> u8 {
        match self {
            Self::Sensor => 0,
            Self::Communication => 1,
            Self::Power => 2,
            Self::Calibration => 3,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Sensor => "E-01",
            Self::Communication => "E-02",
            Self::Power => "E-03",
            Self::Calibration => "CAL ",
        }
    }
}

/// 升级状态寄存器（单个 16 位状态字）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusWord {
    pub raw: u16,
    pub upgrade_success: bool,
    pub upgrade_fail: bool,
    pub upgrading: bool,
    pub rollback_success: bool,
    pub rollback_fail: bool,
    pub rollbacking: bool,
    /// bit8..15。
    pub error_code: u8,
}

/// 获取当前时间戳（毫秒）
pub fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
