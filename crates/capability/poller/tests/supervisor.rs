mod common;

use common::{MockFactory, Script, collect_until, endpoint, next_event, reconnect_attempts};
use domain::PollEvent;
use gds_poller::{
    EventDrain, PollerConfig, PollerError, PollerPhase, PollerSupervisor, RegisterWindow,
    StartOutcome, StopOutcome, event_channel,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn supervisor(factory: &MockFactory, config: PollerConfig) -> (PollerSupervisor, EventDrain) {
    let (sink, drain) = event_channel();
    let supervisor = PollerSupervisor::new(Arc::new(factory.clone()), Arc::new(sink), config);
    (supervisor, drain)
}

fn is_sample(event: &PollEvent) -> bool {
    matches!(event, PollEvent::SampleReady { .. })
}

#[tokio::test(start_paused = true)]
async fn reconnect_exhaustion_fails_once_and_allows_fresh_start() {
    let factory = MockFactory::new(Script::default());
    let (supervisor, mut drain) = supervisor(&factory, PollerConfig::default());

    assert_eq!(
        supervisor.start(endpoint()).await.unwrap(),
        StartOutcome::Started
    );
    collect_until(&mut drain, is_sample).await;

    factory.update(|script| {
        script.read_default = false;
        script.connect_default = false;
    });
    let events = collect_until(&mut drain, |event| {
        matches!(event, PollEvent::ReconnectExhausted { .. })
    })
    .await;

    assert_eq!(reconnect_attempts(&events), vec![1, 2, 3, 4, 5]);
    assert!(events.iter().any(|event| matches!(
        event,
        PollEvent::Disconnected { consecutive_disconnects: 1, cleared, .. } if cleared.is_cleared()
    )));
    assert!(matches!(
        events.last(),
        Some(PollEvent::ReconnectExhausted { attempts: 5, .. })
    ));

    let status = supervisor.status(&endpoint()).unwrap();
    assert_eq!(status.phase, PollerPhase::Failed);
    assert!(status.auto_reconnect_failed);
    assert_eq!(status.reconnect_attempt, 5);
    assert_eq!(status.last_sample, None);
    assert_eq!(factory.stats.live(), 0);

    // 之后不再有任何事件。
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(drain.drain().is_empty());

    // 手动重连：新的连接句柄，断线计数清零。
    factory.update(|script| {
        script.read_default = true;
        script.connect_default = true;
    });
    assert_eq!(
        supervisor.start(endpoint()).await.unwrap(),
        StartOutcome::Started
    );
    assert_eq!(factory.stats.created(), 2);
    let status = supervisor.status(&endpoint()).unwrap();
    assert_eq!(status.phase, PollerPhase::Polling);
    assert_eq!(status.consecutive_disconnects, 0);
    assert!(!status.auto_reconnect_failed);

    supervisor.stop_all().await;
    assert_eq!(factory.stats.live(), 0);
}

#[tokio::test(start_paused = true)]
async fn reconnect_succeeds_on_third_attempt() {
    let factory = MockFactory::new(Script {
        connect_plan: [true, false, false, true].into(),
        read_plan: [true, false].into(),
        ..Script::default()
    });
    let (supervisor, mut drain) = supervisor(&factory, PollerConfig::default());
    supervisor.start(endpoint()).await.unwrap();

    let events = collect_until(&mut drain, |event| {
        matches!(event, PollEvent::ReconnectSucceeded { .. })
    })
    .await;
    assert_eq!(reconnect_attempts(&events), vec![1, 2, 3]);

    // 重连后回到正常轮询。
    let after = collect_until(&mut drain, is_sample).await;
    assert_eq!(reconnect_attempts(&after), Vec::<u32>::new());
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(reconnect_attempts(&drain.drain()), Vec::<u32>::new());

    let status = supervisor.status(&endpoint()).unwrap();
    assert_eq!(status.phase, PollerPhase::Polling);
    assert_eq!(status.consecutive_disconnects, 1);
    assert!(status.last_sample.is_some());

    supervisor.stop_all().await;
}

#[tokio::test(start_paused = true)]
async fn start_is_idempotent() {
    let factory = MockFactory::new(Script::default());
    let (supervisor, _drain) = supervisor(&factory, PollerConfig::default());

    assert_eq!(
        supervisor.start(endpoint()).await.unwrap(),
        StartOutcome::Started
    );
    assert_eq!(
        supervisor.start(endpoint()).await.unwrap(),
        StartOutcome::AlreadyRunning
    );
    assert_eq!(factory.stats.created(), 1);
    assert_eq!(supervisor.endpoints(), vec![endpoint()]);

    // 同一地址、不同从站号是不同的设备。
    let other = endpoint().with_unit_id(2);
    assert_eq!(
        supervisor.start(other.clone()).await.unwrap(),
        StartOutcome::Started
    );
    assert_eq!(supervisor.endpoints(), vec![endpoint(), other]);

    supervisor.stop_all().await;
}

#[tokio::test(start_paused = true)]
async fn stop_while_reconnecting_emits_no_more_attempts() {
    let factory = MockFactory::new(Script::default());
    let (supervisor, mut drain) = supervisor(&factory, PollerConfig::default());
    supervisor.start(endpoint()).await.unwrap();
    collect_until(&mut drain, is_sample).await;

    factory.update(|script| {
        script.read_default = false;
        script.connect_default = false;
    });
    collect_until(&mut drain, |event| {
        matches!(event, PollEvent::ReconnectAttempt { attempt: 2, .. })
    })
    .await;

    assert_eq!(supervisor.stop(&endpoint()).await, StopOutcome::Stopped);
    assert!(supervisor.status(&endpoint()).is_none());
    assert!(supervisor.endpoints().is_empty());
    assert_eq!(factory.stats.live(), 0);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(reconnect_attempts(&drain.drain()).is_empty());

    assert_eq!(supervisor.stop(&endpoint()).await, StopOutcome::NotRunning);
}

#[tokio::test(start_paused = true)]
async fn samples_follow_fixed_cadence() {
    let factory = MockFactory::new(Script::default());
    let (supervisor, mut drain) = supervisor(&factory, PollerConfig::default());
    supervisor.start(endpoint()).await.unwrap();

    let mut stamps = Vec::new();
    while stamps.len() < 5 {
        if is_sample(&next_event(&mut drain).await) {
            stamps.push(Instant::now());
        }
    }
    for pair in stamps.windows(2) {
        let gap = pair[1] - pair[0];
        assert!(
            gap >= Duration::from_millis(195) && gap <= Duration::from_millis(205),
            "gap {gap:?}"
        );
    }

    supervisor.stop_all().await;
}

#[tokio::test(start_paused = true)]
async fn slow_reads_start_next_cycle_immediately() {
    let factory = MockFactory::new(Script {
        read_delay: Some(Duration::from_millis(250)),
        ..Script::default()
    });
    let (supervisor, mut drain) = supervisor(&factory, PollerConfig::default());
    supervisor.start(endpoint()).await.unwrap();

    let mut stamps = Vec::new();
    while stamps.len() < 4 {
        if is_sample(&next_event(&mut drain).await) {
            stamps.push(Instant::now());
        }
    }
    for pair in stamps.windows(2) {
        let gap = pair[1] - pair[0];
        assert!(
            gap >= Duration::from_millis(245) && gap <= Duration::from_millis(255),
            "gap {gap:?}"
        );
    }

    supervisor.stop_all().await;
}

#[tokio::test(start_paused = true)]
async fn initial_connect_exhaustion_leaves_no_slot() {
    let factory = MockFactory::new(Script {
        connect_default: false,
        ..Script::default()
    });
    let (supervisor, mut drain) = supervisor(&factory, PollerConfig::default());

    let started = Instant::now();
    let err = supervisor.start(endpoint()).await.unwrap_err();
    assert!(matches!(err, PollerError::ConnectExhausted { attempts: 5, .. }));
    // 5 次尝试之间 4 次退避，最后一次失败后不再等待。
    let elapsed = started.elapsed();
    assert!(
        elapsed >= Duration::from_secs(8) && elapsed < Duration::from_millis(8050),
        "elapsed {elapsed:?}"
    );

    assert!(supervisor.endpoints().is_empty());
    assert_eq!(factory.stats.connects.load(std::sync::atomic::Ordering::SeqCst), 5);
    assert_eq!(factory.stats.live(), 0);
    assert!(drain.drain().is_empty());
}

#[tokio::test(start_paused = true)]
async fn wrong_window_length_faults_without_disconnect() {
    let factory = MockFactory::new(Script::default());
    let config = PollerConfig {
        window: RegisterWindow {
            base_offset: 0,
            count: 10,
        },
        ..PollerConfig::default()
    };
    let (supervisor, mut drain) = supervisor(&factory, config);
    supervisor.start(endpoint()).await.unwrap();

    let event = next_event(&mut drain).await;
    assert!(matches!(event, PollEvent::PollerFaulted { .. }), "{event:?}");

    let status = supervisor.status(&endpoint()).unwrap();
    assert_eq!(status.phase, PollerPhase::Faulted);
    assert_eq!(status.consecutive_disconnects, 0);
    assert_eq!(factory.stats.live(), 0);

    assert_eq!(supervisor.reap_finished(), vec![endpoint()]);
    assert!(supervisor.endpoints().is_empty());
}

#[tokio::test(start_paused = true)]
async fn disconnect_count_survives_manual_restart() {
    let factory = MockFactory::new(Script {
        read_plan: [true, false].into(),
        ..Script::default()
    });
    let (supervisor, mut drain) = supervisor(&factory, PollerConfig::default());
    supervisor.start(endpoint()).await.unwrap();
    collect_until(&mut drain, |event| {
        matches!(event, PollEvent::ReconnectSucceeded { .. })
    })
    .await;
    assert_eq!(supervisor.consecutive_disconnects(&endpoint()), 1);

    supervisor.stop(&endpoint()).await;
    assert_eq!(supervisor.consecutive_disconnects(&endpoint()), 1);

    supervisor.start(endpoint()).await.unwrap();
    let status = supervisor.status(&endpoint()).unwrap();
    assert_eq!(status.consecutive_disconnects, 1);

    supervisor.stop_all().await;
}

#[tokio::test(start_paused = true)]
async fn stop_timeout_still_releases_connection() {
    let factory = MockFactory::new(Script {
        read_delay: Some(Duration::from_secs(60)),
        ..Script::default()
    });
    let (supervisor, _drain) = supervisor(&factory, PollerConfig::default());
    supervisor.start(endpoint()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(factory.stats.live(), 1);

    let started = Instant::now();
    let outcomes = supervisor.stop_all().await;
    assert_eq!(outcomes, vec![(endpoint(), StopOutcome::TimedOut)]);
    let elapsed = started.elapsed();
    assert!(
        elapsed >= Duration::from_secs(5) && elapsed < Duration::from_millis(5050),
        "elapsed {elapsed:?}"
    );
    assert_eq!(factory.stats.live(), 0);
    assert!(supervisor.endpoints().is_empty());
}

#[tokio::test(start_paused = true)]
async fn read_failing_after_stop_is_not_a_disconnect() {
    let factory = MockFactory::new(Script {
        read_delay: Some(Duration::from_secs(1)),
        read_plan: [false].into(),
        ..Script::default()
    });
    let (supervisor, mut drain) = supervisor(&factory, PollerConfig::default());
    supervisor.start(endpoint()).await.unwrap();

    // 读取进行到一半时停止，随后这次读取失败。
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(supervisor.stop(&endpoint()).await, StopOutcome::Stopped);

    let events = drain.drain();
    assert!(
        !events
            .iter()
            .any(|event| matches!(event, PollEvent::Disconnected { .. })),
        "{events:?}"
    );
    assert!(reconnect_attempts(&events).is_empty());
    assert_eq!(supervisor.consecutive_disconnects(&endpoint()), 0);
    assert_eq!(factory.stats.live(), 0);
}

#[tokio::test(start_paused = true)]
async fn exception_reply_takes_reconnect_path() {
    let factory = MockFactory::new(Script::default());
    let (supervisor, mut drain) = supervisor(&factory, PollerConfig::default());
    supervisor.start(endpoint()).await.unwrap();
    collect_until(&mut drain, is_sample).await;

    // 从站以异常码应答，TCP 连接本身仍然可用。
    factory.update(|script| script.exception_reads = 1);
    let events = collect_until(&mut drain, |event| {
        matches!(event, PollEvent::ReconnectSucceeded { .. })
    })
    .await;

    assert_eq!(events.len(), 3, "{events:?}");
    assert!(matches!(
        events[0],
        PollEvent::Disconnected {
            consecutive_disconnects: 1,
            ..
        }
    ));
    assert!(matches!(
        events[1],
        PollEvent::ReconnectAttempt { attempt: 1, .. }
    ));
    assert!(matches!(events[2], PollEvent::ReconnectSucceeded { .. }));
    assert_eq!(factory.stats.connects.load(std::sync::atomic::Ordering::SeqCst), 2);
    assert_eq!(factory.stats.live(), 1);

    collect_until(&mut drain, is_sample).await;
    assert_eq!(
        supervisor.status(&endpoint()).unwrap().phase,
        PollerPhase::Polling
    );

    supervisor.stop_all().await;
    assert_eq!(factory.stats.live(), 0);
}

#[tokio::test(start_paused = true)]
async fn stop_during_initial_connect_waits_for_it() {
    let factory = MockFactory::new(Script {
        connect_delay: Some(Duration::from_secs(2)),
        ..Script::default()
    });
    let (supervisor, mut drain) = supervisor(&factory, PollerConfig::default());
    let supervisor = Arc::new(supervisor);
    let starting = tokio::spawn({
        let supervisor = supervisor.clone();
        async move { supervisor.start(endpoint()).await }
    });

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(
        supervisor.status(&endpoint()).unwrap().phase,
        PollerPhase::Connecting
    );

    let stopped_at = Instant::now();
    assert_eq!(supervisor.stop(&endpoint()).await, StopOutcome::Stopped);
    // stop 返回前，进行中的连接已经结束并被关闭。
    let waited = stopped_at.elapsed();
    assert!(
        waited >= Duration::from_millis(1500) && waited < Duration::from_millis(1550),
        "waited {waited:?}"
    );
    assert_eq!(factory.stats.live(), 0);
    assert!(supervisor.endpoints().is_empty());

    let err = starting.await.unwrap().unwrap_err();
    assert!(matches!(err, PollerError::StoppedWhileConnecting(_)));
    assert_eq!(factory.stats.connects.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert!(drain.drain().is_empty());
}
