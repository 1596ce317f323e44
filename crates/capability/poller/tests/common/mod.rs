#![allow(dead_code)]

use async_trait::async_trait;
use domain::{DeviceEndpoint, PollEvent};
use gds_poller::EventDrain;
use gds_protocol::{ClientFactory, ModbusClient, ProtocolError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 脚本化的设备行为：计划耗尽后使用默认值。
#[derive(Debug)]
pub struct Script {
    pub connect_plan: VecDeque<bool>,
    pub connect_default: bool,
    pub read_plan: VecDeque<bool>,
    pub read_default: bool,
    pub read_delay: Option<Duration>,
    pub connect_delay: Option<Duration>,
    /// 接下来若干次读取以 Modbus 异常应答，连接保持不断。
    pub exception_reads: usize,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            connect_plan: VecDeque::new(),
            connect_default: true,
            read_plan: VecDeque::new(),
            read_default: true,
            read_delay: None,
            connect_delay: None,
            exception_reads: 0,
        }
    }
}

#[derive(Debug, Default)]
pub struct Stats {
    pub created: AtomicUsize,
    pub live: AtomicUsize,
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
}

impl Stats {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// 当前处于已连接状态的句柄数。
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Default)]
pub struct MockFactory {
    pub script: Arc<Mutex<Script>>,
    pub stats: Arc<Stats>,
}

impl MockFactory {
    pub fn new(script: Script) -> Self {
        Self {
            script: Arc::new(Mutex::new(script)),
            stats: Arc::new(Stats::default()),
        }
    }

    pub fn update(&self, f: impl FnOnce(&mut Script)) {
        f(&mut self.script.lock().unwrap());
    }
}

impl ClientFactory for MockFactory {
    fn create(&self, _endpoint: &DeviceEndpoint) -> Box<dyn ModbusClient> {
        self.stats.created.fetch_add(1, Ordering::SeqCst);
        Box::new(MockClient {
            script: self.script.clone(),
            stats: self.stats.clone(),
            connected: false,
        })
    }
}

pub struct MockClient {
    script: Arc<Mutex<Script>>,
    stats: Arc<Stats>,
    connected: bool,
}

impl MockClient {
    fn drop_connection(&mut self) {
        if self.connected {
            self.connected = false;
            self.stats.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl ModbusClient for MockClient {
    async fn connect(&mut self) -> Result<(), ProtocolError> {
        self.drop_connection();
        self.stats.connects.fetch_add(1, Ordering::SeqCst);
        let delay = self.script.lock().unwrap().connect_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let ok = {
            let mut script = self.script.lock().unwrap();
            let default = script.connect_default;
            script.connect_plan.pop_front().unwrap_or(default)
        };
        if !ok {
            return Err(ProtocolError::Connection("connection refused".to_string()));
        }
        self.connected = true;
        self.stats.live.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn read_holding_registers(
        &mut self,
        _offset: u16,
        count: u16,
    ) -> Result<Vec<u16>, ProtocolError> {
        let delay = self.script.lock().unwrap().read_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if !self.connected {
            return Err(ProtocolError::NotConnected);
        }
        let exception = {
            let mut script = self.script.lock().unwrap();
            let pending = script.exception_reads > 0;
            if pending {
                script.exception_reads -= 1;
            }
            pending
        };
        if exception {
            return Err(ProtocolError::Exception("IllegalDataAddress".to_string()));
        }
        let ok = {
            let mut script = self.script.lock().unwrap();
            let default = script.read_default;
            script.read_plan.pop_front().unwrap_or(default)
        };
        if !ok {
            self.drop_connection();
            return Err(ProtocolError::Modbus("broken pipe".to_string()));
        }
        Ok((0..count).map(|i| if i == 4 { 123 } else { 0 }).collect())
    }

    async fn close(&mut self) {
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
        self.drop_connection();
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

impl Drop for MockClient {
    fn drop(&mut self) {
        self.drop_connection();
    }
}

pub fn endpoint() -> DeviceEndpoint {
    DeviceEndpoint::new("192.168.1.50")
}

/// 等待下一个事件（暂停时钟下自动推进）。
pub async fn next_event(drain: &mut EventDrain) -> PollEvent {
    tokio::time::timeout(Duration::from_secs(120), drain.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// 收集事件直到（并包含）第一个满足条件的事件。
pub async fn collect_until(
    drain: &mut EventDrain,
    mut done: impl FnMut(&PollEvent) -> bool,
) -> Vec<PollEvent> {
    let mut events = Vec::new();
    loop {
        let event = next_event(drain).await;
        let finished = done(&event);
        events.push(event);
        if finished {
            return events;
        }
    }
}

pub fn reconnect_attempts(events: &[PollEvent]) -> Vec<u32> {
    events
        .iter()
        .filter_map(|event| match event {
            PollEvent::ReconnectAttempt { attempt, .. } => Some(*attempt),
            _ => None,
        })
        .collect()
}
