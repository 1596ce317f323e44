//! 单设备轮询器：连接 → 轮询 → 断线检测 → 有界重连 → 放弃。

use crate::cadence::Cadence;
use crate::config::PollerConfig;
use crate::error::PollerError;
use crate::sink::EventSink;
use domain::{DeviceEndpoint, PollEvent, PollSample};
use domain::data::now_epoch_ms;
use gds_decode::{DecodeError, decode_dashboard};
use gds_protocol::{ModbusClient, ProtocolError};
use gds_telemetry::{
    record_connect, record_connect_failure, record_decode_fault, record_disconnect,
    record_poll_latency_ms, record_reconnect_attempt, record_reconnect_exhausted,
    record_reconnect_succeeded, record_sample, record_stop_timeout,
};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, error, info, warn};

/// 轮询器所处阶段。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerPhase {
    Idle,
    Connecting,
    Polling,
    Reconnecting,
    /// 自动重连耗尽。
    Failed,
    /// 解码契约违例。
    Faulted,
    /// 外部 stop。
    Stopped,
}

impl PollerPhase {
    /// 不再轮询、可被新的轮询器替换。
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Faulted | Self::Stopped)
    }
}

/// stop 的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// 轮询器不存在（仅由监管者返回）。
    NotRunning,
    Stopped,
    /// 任务未在时限内退出，已强制取消；连接随任务一起释放。
    TimedOut,
}

/// 跨轮询器实例保留的断线计数。
///
/// `consecutive_disconnects` 只在检测到断线时增加，只有「自动重连失败后的手动重连」会清零。
#[derive(Debug, Default)]
pub struct DisconnectLedger {
    consecutive_disconnects: AtomicU64,
    auto_reconnect_failed: AtomicBool,
}

impl DisconnectLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn consecutive_disconnects(&self) -> u64 {
        self.consecutive_disconnects.load(Ordering::SeqCst)
    }

    pub fn auto_reconnect_failed(&self) -> bool {
        self.auto_reconnect_failed.load(Ordering::SeqCst)
    }

    fn record_disconnect(&self) -> u64 {
        self.consecutive_disconnects.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn mark_auto_reconnect_failed(&self) {
        self.auto_reconnect_failed.store(true, Ordering::SeqCst);
    }

    /// 手动重连：若之前自动重连已失败，清零计数并返回 true。
    pub(crate) fn reset_after_failure(&self) -> bool {
        if self.auto_reconnect_failed.swap(false, Ordering::SeqCst) {
            self.consecutive_disconnects.store(0, Ordering::SeqCst);
            return true;
        }
        false
    }
}

/// 轮询器状态快照。
#[derive(Debug, Clone, PartialEq)]
pub struct PollerStatus {
    pub endpoint: DeviceEndpoint,
    pub phase: PollerPhase,
    pub consecutive_disconnects: u64,
    pub reconnect_attempt: u32,
    pub auto_reconnect_failed: bool,
    pub last_sample: Option<PollSample>,
}

struct PollerShared {
    /// 阶段经 watch 发布，stop 可以等待 start 离开 `Connecting`。
    phase: watch::Sender<PollerPhase>,
    reconnect_attempt: AtomicU32,
    last_sample: Mutex<Option<PollSample>>,
    ledger: Arc<DisconnectLedger>,
}

impl PollerShared {
    fn phase(&self) -> PollerPhase {
        *self.phase.borrow()
    }

    fn set_phase(&self, phase: PollerPhase) {
        self.phase.send_replace(phase);
    }

    /// 仅当处于 `Idle` 时切换到 `Connecting`；否则返回当前阶段。
    fn claim_connecting(&self) -> Result<(), PollerPhase> {
        let mut current = PollerPhase::Idle;
        let claimed = self.phase.send_if_modified(|phase| {
            current = *phase;
            if *phase != PollerPhase::Idle {
                return false;
            }
            *phase = PollerPhase::Connecting;
            true
        });
        if claimed { Ok(()) } else { Err(current) }
    }

    fn set_last_sample(&self, sample: Option<PollSample>) {
        *self
            .last_sample
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = sample;
    }

    fn last_sample(&self) -> Option<PollSample> {
        self.last_sample
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// 单设备轮询器。
///
/// 连接句柄在连接成功后移交给轮询任务独占；任何退出路径都会关闭它。
pub struct DevicePoller {
    endpoint: DeviceEndpoint,
    config: PollerConfig,
    shared: Arc<PollerShared>,
    stop_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl DevicePoller {
    pub fn new(
        endpoint: DeviceEndpoint,
        config: PollerConfig,
        ledger: Arc<DisconnectLedger>,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        let (phase, _) = watch::channel(PollerPhase::Idle);
        Self {
            endpoint,
            config,
            shared: Arc::new(PollerShared {
                phase,
                reconnect_attempt: AtomicU32::new(0),
                last_sample: Mutex::new(None),
                ledger,
            }),
            stop_tx,
            task: Mutex::new(None),
        }
    }

    pub fn endpoint(&self) -> &DeviceEndpoint {
        &self.endpoint
    }

    pub fn phase(&self) -> PollerPhase {
        self.shared.phase()
    }

    pub fn status(&self) -> PollerStatus {
        PollerStatus {
            endpoint: self.endpoint.clone(),
            phase: self.shared.phase(),
            consecutive_disconnects: self.shared.ledger.consecutive_disconnects(),
            reconnect_attempt: self.shared.reconnect_attempt.load(Ordering::SeqCst),
            auto_reconnect_failed: self.shared.ledger.auto_reconnect_failed(),
            last_sample: self.shared.last_sample(),
        }
    }

    /// 首次连接（有界重试），成功后启动轮询任务。
    ///
    /// 重试耗尽时同步返回 [`PollerError::ConnectExhausted`]，阶段回到 `Idle`。
    pub async fn start(
        &self,
        mut client: Box<dyn ModbusClient>,
        sink: Arc<dyn EventSink>,
    ) -> Result<(), PollerError> {
        if let Err(phase) = self.shared.claim_connecting() {
            return Err(PollerError::InvalidPhase {
                endpoint: self.endpoint.clone(),
                phase,
            });
        }

        let mut stop_rx = self.stop_tx.subscribe();
        let attempts = self.config.connect_attempts;
        let mut connected = false;
        for attempt in 1..=attempts {
            if *stop_rx.borrow() {
                break;
            }
            match timeout(self.config.connect_timeout(), client.connect()).await {
                Ok(Ok(())) => {
                    connected = true;
                    break;
                }
                Ok(Err(err)) => {
                    warn!(
                        target: "gds.poller",
                        endpoint = %self.endpoint,
                        attempt = attempt,
                        max_attempts = attempts,
                        error = %err,
                        "poller_connect_attempt_failed"
                    );
                }
                Err(_) => {
                    warn!(
                        target: "gds.poller",
                        endpoint = %self.endpoint,
                        attempt = attempt,
                        max_attempts = attempts,
                        timeout_ms = self.config.connect_timeout_ms,
                        "poller_connect_attempt_timed_out"
                    );
                }
            }
            if attempt < attempts
                && sleep_or_stop(&mut stop_rx, self.config.connect_backoff()).await
            {
                break;
            }
        }

        if !connected {
            client.close().await;
            if *stop_rx.borrow() {
                self.shared.set_phase(PollerPhase::Stopped);
                return Err(PollerError::StoppedWhileConnecting(self.endpoint.clone()));
            }
            self.shared.set_phase(PollerPhase::Idle);
            record_connect_failure();
            error!(
                target: "gds.poller",
                endpoint = %self.endpoint,
                attempts = attempts,
                "poller_connect_exhausted"
            );
            return Err(PollerError::ConnectExhausted {
                endpoint: self.endpoint.clone(),
                attempts,
            });
        }

        if *stop_rx.borrow() {
            client.close().await;
            self.shared.set_phase(PollerPhase::Stopped);
            return Err(PollerError::StoppedWhileConnecting(self.endpoint.clone()));
        }

        record_connect();
        info!(target: "gds.poller", endpoint = %self.endpoint, "poller_connected");

        let worker = PollWorker {
            endpoint: self.endpoint.clone(),
            config: self.config.clone(),
            client,
            sink,
            shared: self.shared.clone(),
            stop_rx,
        };
        // 句柄与阶段在同一把锁内发布：stop 看到 Polling 时必然也能取到句柄。
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        self.shared.set_phase(PollerPhase::Polling);
        *task = Some(tokio::spawn(worker.run()));
        Ok(())
    }

    /// 协作式停止：发出停止信号，有界等待任务退出。
    ///
    /// 仍在首次连接时，先等待 start 收尾（关闭连接或交出任务句柄）。
    /// 超时后仍然取消任务并释放连接，不会遗留槽位。
    pub async fn stop(&self) -> StopOutcome {
        self.stop_tx.send_replace(true);
        let deadline = Instant::now() + self.config.stop_timeout();

        let mut phase_rx = self.shared.phase.subscribe();
        let settled = timeout_at(
            deadline,
            phase_rx.wait_for(|phase| *phase != PollerPhase::Connecting),
        )
        .await
        .is_ok();

        let handle = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let outcome = match handle {
            None if settled => StopOutcome::Stopped,
            None => {
                self.stop_timed_out();
                StopOutcome::TimedOut
            }
            Some(mut handle) => match timeout_at(deadline, &mut handle).await {
                Ok(_) => StopOutcome::Stopped,
                Err(_) => {
                    self.stop_timed_out();
                    handle.abort();
                    // 等待取消完成，任务内的连接随之释放。
                    let _ = handle.await;
                    StopOutcome::TimedOut
                }
            },
        };

        self.shared.set_phase(PollerPhase::Stopped);
        info!(
            target: "gds.poller",
            endpoint = %self.endpoint,
            outcome = ?outcome,
            "poller_stopped"
        );
        outcome
    }

    fn stop_timed_out(&self) {
        record_stop_timeout();
        warn!(
            target: "gds.poller",
            endpoint = %self.endpoint,
            timeout_ms = self.config.stop_timeout_ms,
            "poller_did_not_exit_in_time"
        );
    }
}

enum PollExit {
    Stopped,
    Transport(ProtocolError),
    Decode(DecodeError),
}

enum ReconnectOutcome {
    Reconnected,
    Stopped,
    Exhausted,
}

enum WorkerExit {
    Stopped,
    Exhausted,
    Faulted(DecodeError),
}

struct PollWorker {
    endpoint: DeviceEndpoint,
    config: PollerConfig,
    client: Box<dyn ModbusClient>,
    sink: Arc<dyn EventSink>,
    shared: Arc<PollerShared>,
    stop_rx: watch::Receiver<bool>,
}

impl PollWorker {
    async fn run(mut self) {
        let exit = loop {
            match self.poll_until_fault().await {
                PollExit::Stopped => break WorkerExit::Stopped,
                PollExit::Decode(err) => break WorkerExit::Faulted(err),
                PollExit::Transport(err) => {
                    self.handle_disconnection(&err);
                    match self.reconnect().await {
                        ReconnectOutcome::Reconnected => continue,
                        ReconnectOutcome::Stopped => break WorkerExit::Stopped,
                        ReconnectOutcome::Exhausted => break WorkerExit::Exhausted,
                    }
                }
            }
        };

        self.client.close().await;

        match exit {
            WorkerExit::Stopped => {
                self.shared.set_phase(PollerPhase::Stopped);
                debug!(target: "gds.poller", endpoint = %self.endpoint, "poller_loop_exited");
            }
            WorkerExit::Exhausted => {
                let attempts = self.config.reconnect_attempts;
                record_reconnect_exhausted();
                self.shared.ledger.mark_auto_reconnect_failed();
                self.shared.set_phase(PollerPhase::Failed);
                error!(
                    target: "gds.poller",
                    endpoint = %self.endpoint,
                    attempts = attempts,
                    "poller_reconnect_exhausted"
                );
                self.sink.publish(PollEvent::ReconnectExhausted {
                    endpoint: self.endpoint.clone(),
                    attempts,
                });
            }
            WorkerExit::Faulted(err) => {
                record_decode_fault();
                self.shared.set_phase(PollerPhase::Faulted);
                error!(
                    target: "gds.poller",
                    endpoint = %self.endpoint,
                    error = %err,
                    "poller_decode_fault"
                );
                self.sink.publish(PollEvent::PollerFaulted {
                    endpoint: self.endpoint.clone(),
                    reason: err.to_string(),
                });
            }
        }
    }

    fn stop_requested(&self) -> bool {
        *self.stop_rx.borrow()
    }

    /// 固定节拍轮询，直到停止或出现故障。
    async fn poll_until_fault(&mut self) -> PollExit {
        let cadence = Cadence::new(self.config.poll_interval());
        let window = self.config.window;

        loop {
            if self.stop_requested() {
                return PollExit::Stopped;
            }
            let started = Instant::now();

            if !self.client.is_connected() {
                return PollExit::Transport(ProtocolError::NotConnected);
            }
            let registers = match self
                .client
                .read_holding_registers(window.base_offset, window.count)
                .await
            {
                Ok(registers) => registers,
                // 停止期间的读失败不算断线。
                Err(_) if self.stop_requested() => return PollExit::Stopped,
                Err(err) => return PollExit::Transport(err),
            };
            if self.stop_requested() {
                return PollExit::Stopped;
            }

            let reading = match decode_dashboard(&registers) {
                Ok(reading) => reading,
                Err(err) => return PollExit::Decode(err),
            };
            let sample = PollSample {
                base_offset: window.base_offset,
                registers,
                taken_at: std::time::Instant::now(),
                received_at_ms: now_epoch_ms(),
                reading,
            };
            self.shared.set_last_sample(Some(sample.clone()));
            record_sample();
            self.sink.publish(PollEvent::SampleReady {
                endpoint: self.endpoint.clone(),
                sample,
            });

            let elapsed = started.elapsed();
            record_poll_latency_ms(elapsed.as_millis() as u64);
            match cadence.remaining(elapsed) {
                Some(rest) => {
                    if sleep_or_stop(&mut self.stop_rx, rest).await {
                        return PollExit::Stopped;
                    }
                }
                // 处理超过一个周期：不睡眠，但让出执行权。
                None => tokio::task::yield_now().await,
            }
        }
    }

    fn handle_disconnection(&mut self, err: &ProtocolError) {
        let disconnects = self.shared.ledger.record_disconnect();
        record_disconnect();
        self.shared.set_last_sample(None);
        warn!(
            target: "gds.poller",
            endpoint = %self.endpoint,
            consecutive_disconnects = disconnects,
            error = %err,
            "poller_disconnected"
        );
        self.sink.publish(PollEvent::Disconnected {
            endpoint: self.endpoint.clone(),
            consecutive_disconnects: disconnects,
            cleared: PollSample::cleared(self.config.window.base_offset),
        });
    }

    /// 有界自动重连：每次先退避，再计数、通知、尝试。
    async fn reconnect(&mut self) -> ReconnectOutcome {
        self.shared.set_phase(PollerPhase::Reconnecting);
        self.shared.reconnect_attempt.store(0, Ordering::SeqCst);
        let max_attempts = self.config.reconnect_attempts;

        for attempt in 1..=max_attempts {
            if sleep_or_stop(&mut self.stop_rx, self.config.reconnect_backoff()).await {
                return ReconnectOutcome::Stopped;
            }

            self.shared.reconnect_attempt.store(attempt, Ordering::SeqCst);
            record_reconnect_attempt();
            info!(
                target: "gds.poller",
                endpoint = %self.endpoint,
                attempt = attempt,
                max_attempts = max_attempts,
                "poller_reconnect_attempt"
            );
            self.sink.publish(PollEvent::ReconnectAttempt {
                endpoint: self.endpoint.clone(),
                attempt,
                max_attempts,
            });

            let result = timeout(self.config.connect_timeout(), self.client.connect()).await;
            if self.stop_requested() {
                return ReconnectOutcome::Stopped;
            }
            match result {
                Ok(Ok(())) => {
                    record_reconnect_succeeded();
                    self.shared.set_phase(PollerPhase::Polling);
                    info!(
                        target: "gds.poller",
                        endpoint = %self.endpoint,
                        attempt = attempt,
                        "poller_reconnected"
                    );
                    self.sink.publish(PollEvent::ReconnectSucceeded {
                        endpoint: self.endpoint.clone(),
                    });
                    return ReconnectOutcome::Reconnected;
                }
                Ok(Err(err)) => {
                    warn!(
                        target: "gds.poller",
                        endpoint = %self.endpoint,
                        attempt = attempt,
                        error = %err,
                        "poller_reconnect_attempt_failed"
                    );
                }
                Err(_) => {
                    warn!(
                        target: "gds.poller",
                        endpoint = %self.endpoint,
                        attempt = attempt,
                        timeout_ms = self.config.connect_timeout_ms,
                        "poller_reconnect_attempt_timed_out"
                    );
                }
            }
        }

        ReconnectOutcome::Exhausted
    }
}

/// 睡眠 `duration`，期间收到停止信号则提前返回 true。
async fn sleep_or_stop(stop_rx: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    if *stop_rx.borrow() {
        return true;
    }
    let stopped = tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = stop_rx.wait_for(|stop| *stop) => true,
    };
    stopped || *stop_rx.borrow()
}
