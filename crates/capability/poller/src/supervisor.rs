//! 轮询器监管：端点 → 轮询器的唯一映射。

use crate::config::PollerConfig;
use crate::error::PollerError;
use crate::poller::{DevicePoller, DisconnectLedger, PollerStatus, StopOutcome};
use crate::sink::EventSink;
use domain::DeviceEndpoint;
use gds_protocol::ClientFactory;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

/// start 的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// 已有活动轮询器，本次调用无副作用。
    AlreadyRunning,
}

#[derive(Default)]
struct Slots {
    pollers: HashMap<DeviceEndpoint, Arc<DevicePoller>>,
    /// 断线计数独立于轮询器实例保存。
    ledgers: HashMap<DeviceEndpoint, Arc<DisconnectLedger>>,
}

/// 每个端点至多一个活动轮询器。
///
/// 映射的检查与插入在同一把锁内完成；连接等耗时操作在锁外进行。
pub struct PollerSupervisor {
    factory: Arc<dyn ClientFactory>,
    sink: Arc<dyn EventSink>,
    config: PollerConfig,
    slots: Mutex<Slots>,
}

impl PollerSupervisor {
    pub fn new(
        factory: Arc<dyn ClientFactory>,
        sink: Arc<dyn EventSink>,
        config: PollerConfig,
    ) -> Self {
        Self {
            factory,
            sink,
            config,
            slots: Mutex::new(Slots::default()),
        }
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 启动端点的轮询器（幂等）。
    ///
    /// 已有活动轮询器时返回 [`StartOutcome::AlreadyRunning`]；
    /// 首次连接耗尽时映射中不留下该端点。
    pub async fn start(&self, endpoint: DeviceEndpoint) -> Result<StartOutcome, PollerError> {
        let poller = {
            let mut slots = self.slots();
            if let Some(existing) = slots.pollers.get(&endpoint) {
                if !existing.phase().is_terminal() {
                    info!(target: "gds.poller", endpoint = %endpoint, "poller_already_running");
                    return Ok(StartOutcome::AlreadyRunning);
                }
            }

            let ledger = slots.ledgers.entry(endpoint.clone()).or_default().clone();
            if ledger.reset_after_failure() {
                info!(
                    target: "gds.poller",
                    endpoint = %endpoint,
                    "disconnect_ledger_reset_after_manual_reconnect"
                );
            }

            let poller = Arc::new(DevicePoller::new(
                endpoint.clone(),
                self.config.clone(),
                ledger,
            ));
            slots.pollers.insert(endpoint.clone(), poller.clone());
            poller
        };

        let client = self.factory.create(&endpoint);
        match poller.start(client, self.sink.clone()).await {
            Ok(()) => Ok(StartOutcome::Started),
            Err(err) => {
                self.remove_if_same(&endpoint, &poller);
                warn!(
                    target: "gds.poller",
                    endpoint = %endpoint,
                    error = %err,
                    "poller_start_failed"
                );
                Err(err)
            }
        }
    }

    /// 停止端点的轮询器并移出映射；不存在时返回 [`StopOutcome::NotRunning`]。
    pub async fn stop(&self, endpoint: &DeviceEndpoint) -> StopOutcome {
        let existing = self.slots().pollers.get(endpoint).cloned();
        let Some(poller) = existing else {
            return StopOutcome::NotRunning;
        };
        let outcome = poller.stop().await;
        self.remove_if_same(endpoint, &poller);
        outcome
    }

    /// 停止全部轮询器（进程退出时调用）。
    pub async fn stop_all(&self) -> Vec<(DeviceEndpoint, StopOutcome)> {
        let mut outcomes = Vec::new();
        for endpoint in self.endpoints() {
            let outcome = self.stop(&endpoint).await;
            outcomes.push((endpoint, outcome));
        }
        outcomes
    }

    pub fn status(&self, endpoint: &DeviceEndpoint) -> Option<PollerStatus> {
        self.slots().pollers.get(endpoint).map(|poller| poller.status())
    }

    /// 已登记的端点（有序）。
    pub fn endpoints(&self) -> Vec<DeviceEndpoint> {
        let mut endpoints: Vec<DeviceEndpoint> = self.slots().pollers.keys().cloned().collect();
        endpoints.sort();
        endpoints
    }

    /// 断线计数（轮询器被移除后依然保留）。
    pub fn consecutive_disconnects(&self, endpoint: &DeviceEndpoint) -> u64 {
        self.slots()
            .ledgers
            .get(endpoint)
            .map(|ledger| ledger.consecutive_disconnects())
            .unwrap_or(0)
    }

    /// 移除已进入终态（Failed / Faulted / Stopped）的轮询器，返回被移除的端点。
    pub fn reap_finished(&self) -> Vec<DeviceEndpoint> {
        let mut slots = self.slots();
        let finished: Vec<DeviceEndpoint> = slots
            .pollers
            .iter()
            .filter(|(_, poller)| poller.phase().is_terminal())
            .map(|(endpoint, _)| endpoint.clone())
            .collect();
        for endpoint in &finished {
            slots.pollers.remove(endpoint);
        }
        finished
    }

    fn remove_if_same(&self, endpoint: &DeviceEndpoint, poller: &Arc<DevicePoller>) {
        let mut slots = self.slots();
        if slots
            .pollers
            .get(endpoint)
            .is_some_and(|current| Arc::ptr_eq(current, poller))
        {
            slots.pollers.remove(endpoint);
        }
    }
}
