use std::time::Duration;

/// 自校正节拍：每轮只睡剩余时间，处理超时则立即进入下一轮。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    interval: Duration,
}

impl Cadence {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// 本轮耗时 `elapsed` 后还需等待的时间；不足一个周期返回 `None`。
    pub fn remaining(&self, elapsed: Duration) -> Option<Duration> {
        self.interval
            .checked_sub(elapsed)
            .filter(|rest| !rest.is_zero())
    }
}
