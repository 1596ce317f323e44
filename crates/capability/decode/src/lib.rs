//! # 寄存器解码能力模块
//!
//! 纯函数：把原始 16 位寄存器值转换为领域事实，无 I/O、无状态。
//!
//! ## 看板窗口（11 个寄存器，40001 ~ 40011）
//!
//! ```text
//! register[0]   bit6 = AL1, bit7 = AL2
//! register[4]   浓度读数（十进制显示）
//! register[7]   bit0..3 = 错误位，最低置位决定显示码
//! register[10]  低字节 = 进度 %，高字节 = 剩余秒数
//! ```
//!
//! ## 升级状态字（单个寄存器）
//!
//! ```text
//! bit0 升级成功  bit1 升级失败  bit2 升级中
//! bit4 回滚成功  bit5 回滚失败  bit6 回滚中
//! bit8..15 错误码
//! ```

use domain::{DashboardReading, DetectorError, DisplayValue, StatusWord};

/// 厂商文档中保持寄存器的起始编号。
pub const HOLDING_REGISTER_BASE: u32 = 40001;

/// 看板窗口长度。
pub const DASHBOARD_WINDOW_LEN: usize = 11;

/// 状态字窗口长度。
pub const STATUS_WINDOW_LEN: usize = 1;

const ALARM1_BIT: u16 = 1 << 6;
const ALARM2_BIT: u16 = 1 << 7;
const ERROR_BITS_MASK: u16 = 0x000F;

/// 解码错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// 窗口长度与所请求的解码不符（调用方/配置缺陷，不可重试）。
    #[error("malformed input: expected {expected} registers, got {actual}")]
    MalformedInput { expected: usize, actual: usize },
    #[error("register {0} is outside the holding register range 40001..=105536")]
    InvalidRegister(u32),
}

/// 解码方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoding {
    Dashboard,
    StatusWord,
}

impl Decoding {
    pub fn window_len(&self) -> usize {
        match self {
            Self::Dashboard => DASHBOARD_WINDOW_LEN,
            Self::StatusWord => STATUS_WINDOW_LEN,
        }
    }
}

/// 逻辑寄存器号转零基偏移：`register - 40001`。
pub fn register_offset(register: u32) -> Result<u16, DecodeError> {
    register
        .checked_sub(HOLDING_REGISTER_BASE)
        .and_then(|offset| u16::try_from(offset).ok())
        .ok_or(DecodeError::InvalidRegister(register))
}

/// 解码看板窗口。
pub fn decode_dashboard(registers: &[u16]) -> Result<DashboardReading, DecodeError> {
    ensure_len(registers, Decoding::Dashboard)?;

    let status = registers[0];
    let error_bits = (registers[7] & ERROR_BITS_MASK) as u8;
    let display = match lowest_error(error_bits) {
        Some(error) => DisplayValue::Error(error),
        None => DisplayValue::Reading(registers[4]),
    };
    let progress = registers[10];

    Ok(DashboardReading {
        alarm1_on: status & ALARM1_BIT != 0,
        alarm2_on: status & ALARM2_BIT != 0,
        error_bits,
        display,
        progress_percent: (progress & 0xFF) as u8,
        remaining_seconds: ((progress >> 8) & 0xFF) as u8,
    })
}

/// 解码升级状态字。
pub fn decode_status_word(registers: &[u16]) -> Result<StatusWord, DecodeError> {
    ensure_len(registers, Decoding::StatusWord)?;

    let raw = registers[0];
    let bit = |n: u16| raw & (1 << n) != 0;
    Ok(StatusWord {
        raw,
        upgrade_success: bit(0),
        upgrade_fail: bit(1),
        upgrading: bit(2),
        rollback_success: bit(4),
        rollback_fail: bit(5),
        rollbacking: bit(6),
        error_code: (raw >> 8) as u8,
    })
}

/// 最低置位的错误位（仅看 bit0..3）。
pub fn lowest_error(error_bits: u8) -> Option<DetectorError> {
    let masked = error_bits & 0x0F;
    if masked == 0 {
        return None;
    }
    DetectorError::from_bit(masked.trailing_zeros() as u8)
}

fn ensure_len(registers: &[u16], decoding: Decoding) -> Result<(), DecodeError> {
    let expected = decoding.window_len();
    if registers.len() != expected {
        return Err(DecodeError::MalformedInput {
            expected,
            actual: registers.len(),
        });
    }
    Ok(())
}
