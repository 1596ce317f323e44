//! 结果汇：多生产者（每个轮询器一个）、单消费者。
//!
//! 轮询器只入队，不直接触碰消费者状态；消费者在自己的执行上下文里定时 drain。

use domain::PollEvent;
use tokio::sync::mpsc;
use tracing::debug;

/// 事件汇，发布即返回（fire-and-forget）。
pub trait EventSink: Send + Sync {
    fn publish(&self, event: PollEvent);
}

/// 基于无界 mpsc 的事件汇，单一队列保证同一设备的 FIFO 顺序。
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<PollEvent>,
}

impl EventSink for ChannelSink {
    fn publish(&self, event: PollEvent) {
        if let Err(err) = self.tx.send(event) {
            debug!(target: "gds.poller", kind = err.0.kind(), "event_dropped_consumer_gone");
        }
    }
}

/// 消费端。
#[derive(Debug)]
pub struct EventDrain {
    rx: mpsc::UnboundedReceiver<PollEvent>,
}

impl EventDrain {
    /// 取出当前已入队的全部事件，不等待。
    pub fn drain(&mut self) -> Vec<PollEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// 等待下一个事件；所有生产者都已释放时返回 `None`。
    pub async fn recv(&mut self) -> Option<PollEvent> {
        self.rx.recv().await
    }
}

/// 创建一对事件汇与消费端。
pub fn event_channel() -> (ChannelSink, EventDrain) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelSink { tx }, EventDrain { rx })
}
