//! 多设备气体探测器轮询看板（无界面运行时）。
//!
//! 每台设备一个轮询任务，事件汇入单一队列，由本进程主循环定时 drain 并更新看板。

mod board;

use board::DeviceBoard;
use domain::{DeviceEndpoint, PollEvent};
use gds_config::AppConfig;
use gds_poller::{PollerSupervisor, StartOutcome, event_channel};
use gds_protocol::ModbusTcpClientFactory;
use gds_telemetry::{init_tracing, metrics};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// 看板摘要输出间隔。
const REPORT_INTERVAL: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于现场直接启动
    dotenvy::dotenv().ok();
    // 从环境变量加载运行配置
    let config = AppConfig::from_env()?;
    // 初始化结构化日志
    init_tracing();

    let (sink, mut drain) = event_channel();
    let factory = Arc::new(ModbusTcpClientFactory::new(config.tcp_config()));
    let supervisor = Arc::new(PollerSupervisor::new(
        factory,
        Arc::new(sink),
        config.poller_config(),
    ));
    let mut board = DeviceBoard::new(
        config
            .endpoints
            .iter()
            .map(|entry| (entry.endpoint.clone(), entry.gas_type.unwrap_or_default())),
    );

    info!(
        target: "gds.monitor",
        devices = config.endpoints.len(),
        poll_interval_ms = config.poll_interval_ms,
        "monitor_starting"
    );

    // 首次连接可能耗时数秒，各设备并行启动，互不阻塞。
    for entry in &config.endpoints {
        spawn_start(supervisor.clone(), entry.endpoint.clone());
    }

    let mut drain_tick = tokio::time::interval(Duration::from_millis(config.drain_interval_ms));
    let mut report_tick = tokio::time::interval(REPORT_INTERVAL);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                if let Err(err) = result {
                    error!(target: "gds.monitor", error = %err, "shutdown_signal_failed");
                }
                break;
            }
            _ = drain_tick.tick() => {
                let events = drain.drain();
                if apply_events(&mut board, &events) {
                    let reaped = supervisor.reap_finished();
                    if !reaped.is_empty() {
                        info!(
                            target: "gds.monitor",
                            count = reaped.len(),
                            "finished_pollers_reaped"
                        );
                    }
                }
            }
            _ = report_tick.tick() => {
                report(&board);
            }
        }
    }

    info!(target: "gds.monitor", "monitor_stopping");
    for (endpoint, outcome) in supervisor.stop_all().await {
        info!(
            target: "gds.monitor",
            endpoint = %endpoint,
            outcome = ?outcome,
            "poller_stop_outcome"
        );
    }
    apply_events(&mut board, &drain.drain());
    report(&board);

    let snapshot = metrics().snapshot();
    info!(
        target: "gds.monitor",
        samples = snapshot.samples,
        disconnects = snapshot.disconnects,
        reconnect_attempts = snapshot.reconnect_attempts,
        reconnects_exhausted = snapshot.reconnects_exhausted,
        "monitor_stopped"
    );
    Ok(())
}

fn spawn_start(supervisor: Arc<PollerSupervisor>, endpoint: DeviceEndpoint) {
    tokio::spawn(async move {
        match supervisor.start(endpoint.clone()).await {
            Ok(StartOutcome::Started) => {
                info!(target: "gds.monitor", endpoint = %endpoint, "device_online");
            }
            Ok(StartOutcome::AlreadyRunning) => {
                debug!(target: "gds.monitor", endpoint = %endpoint, "device_already_polled");
            }
            Err(err) => {
                warn!(
                    target: "gds.monitor",
                    endpoint = %endpoint,
                    error = %err,
                    "device_start_failed"
                );
            }
        }
    });
}

/// 把一批事件应用到看板；出现终止事件时返回 true。
fn apply_events(board: &mut DeviceBoard, events: &[PollEvent]) -> bool {
    let mut finished = false;
    for event in events {
        match event {
            PollEvent::SampleReady { .. } => {
                debug!(
                    target: "gds.monitor",
                    endpoint = %event.endpoint(),
                    kind = event.kind(),
                    "event_received"
                );
            }
            PollEvent::ReconnectExhausted { .. } | PollEvent::PollerFaulted { .. } => {
                finished = true;
                warn!(
                    target: "gds.monitor",
                    endpoint = %event.endpoint(),
                    kind = event.kind(),
                    "event_received"
                );
            }
            _ => {
                info!(
                    target: "gds.monitor",
                    endpoint = %event.endpoint(),
                    kind = event.kind(),
                    "event_received"
                );
            }
        }
        board.apply(event);
    }
    finished
}

fn report(board: &DeviceBoard) {
    for (endpoint, view) in board.iter() {
        info!(
            target: "gds.monitor",
            endpoint = %endpoint,
            connected = view.connected,
            samples = view.samples,
            "{}",
            view.summary()
        );
    }
}
