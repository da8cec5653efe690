#![allow(clippy::unwrap_used)]
// Reconnect, grace-period and command behaviour of ConnectionManager,
// driven by a scripted connector under paused time.

mod common;

use std::sync::Arc;
use std::time::Duration;

use fieldlink_api::Error;
use fieldlink_core::{
    ConnectionManager, ConnectionState, CoreError, CurtainCommand, DeviceEndpoint, DeviceRegistry,
    DeviceType, FanCommand, LinkStatus, MAX_HISTORY_HOURS, ManagerConfig, NoticeKind,
    TelemetryStore,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::time::Instant;
use url::Url;

use common::{
    ScriptedConnector, Step, broken_session, drain, notices, session, wait_for_event,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn endpoint(device_type: DeviceType) -> DeviceEndpoint {
    DeviceEndpoint::with_url(
        "10.0.0.42",
        device_type,
        Url::parse("ws://10.0.0.42/ws").unwrap(),
    )
}

fn manager(device_type: DeviceType, connector: &Arc<ScriptedConnector>) -> ConnectionManager {
    ConnectionManager::spawn(
        endpoint(device_type),
        ManagerConfig::default(),
        Arc::clone(connector),
        TelemetryStore::disabled(),
    )
}

async fn connected(manager: &ConnectionManager) {
    let mut state = manager.connection_state();
    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == ConnectionState::Connected),
    )
    .await
    .unwrap()
    .unwrap();
}

fn refusals(n: usize) -> impl Iterator<Item = Step> {
    (0..n).map(|_| Step::Refuse)
}

// ── Grace period ────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_unreachable_device_notifies_once_on_seventh_attempt() {
    let connector = Arc::new(ScriptedConnector::refusing());
    let manager = manager(DeviceType::Curtain, &connector);
    let mut events = manager.subscribe();
    let start = Instant::now();

    manager.connect();
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(manager.state(), ConnectionState::GracePeriod);
    assert!(notices(&drain(&mut events), NoticeKind::LinkLost).is_empty());

    tokio::time::sleep(Duration::from_secs(31)).await;
    let attempts = connector.attempts();
    assert_eq!(attempts.len(), 7);
    assert_eq!(attempts[6] - start, Duration::from_secs(30));

    let lost = notices(&drain(&mut events), NoticeKind::LinkLost);
    assert_eq!(lost.len(), 1);
    assert_eq!(
        lost[0].text,
        "Unknown network error: connection failed: refused on attempt 7"
    );
    assert_eq!(manager.state(), ConnectionState::Failed);

    // Retries continue on the same cadence without re-notifying.
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.attempts().len(), 19);
    assert!(notices(&drain(&mut events), NoticeKind::LinkLost).is_empty());
    assert_eq!(manager.state(), ConnectionState::Failed);

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_recovery_after_failure_notifies_once() {
    let (live, handle) = session();
    let connector = Arc::new(ScriptedConnector::new(
        refusals(7).chain([Step::Accept(live)]),
    ));
    let manager = manager(DeviceType::Curtain, &connector);
    let mut events = manager.subscribe();

    manager.connect();
    tokio::time::sleep(Duration::from_secs(36)).await;

    let seen = drain(&mut events);
    assert_eq!(notices(&seen, NoticeKind::LinkLost).len(), 1);
    let restored = notices(&seen, NoticeKind::LinkRestored);
    assert_eq!(restored.len(), 1);
    assert!(seen.iter().any(|e| e.status == LinkStatus::Reconnected));
    assert_eq!(manager.state(), ConnectionState::Connected);

    // A fresh drop starts a new episode: quiet until its own grace period.
    handle.fail(Error::Dropped("connection reset".into()));
    tokio::time::sleep(Duration::from_secs(10)).await;
    let seen = drain(&mut events);
    assert!(notices(&seen, NoticeKind::LinkLost).is_empty());
    assert!(notices(&seen, NoticeKind::LinkRestored).is_empty());
    assert_eq!(manager.state(), ConnectionState::GracePeriod);
    assert!(handle.is_closed());

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_within_grace_period_is_silent() {
    let (live, _handle) = session();
    let connector = Arc::new(ScriptedConnector::new(
        refusals(2).chain([Step::Accept(live)]),
    ));
    let manager = manager(DeviceType::Pump, &connector);
    let mut events = manager.subscribe();

    manager.connect();
    tokio::time::sleep(Duration::from_secs(60)).await;

    let seen = drain(&mut events);
    assert!(seen.iter().all(|e| e.notice.is_none()));
    assert_eq!(
        seen.iter().filter(|e| e.status == LinkStatus::Error).count(),
        2
    );
    assert_eq!(connector.attempts().len(), 3);
    assert_eq!(manager.state(), ConnectionState::Connected);

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_timeout_translation_uses_failure_cause() {
    struct TimingOut;

    impl fieldlink_api::Connector for TimingOut {
        type Session = common::MockSession;

        async fn open(&self, _url: &Url) -> Result<common::MockSession, Error> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Err(Error::OpenTimeout)
        }
    }

    let manager = ConnectionManager::spawn(
        endpoint(DeviceType::Fan),
        ManagerConfig::default(),
        Arc::new(TimingOut),
        TelemetryStore::disabled(),
    );
    let mut events = manager.subscribe();
    manager.connect();

    let event = wait_for_event(&mut events, |e| e.notice.is_some()).await;
    let notice = event.notice.unwrap();
    assert_eq!(notice.kind, NoticeKind::LinkLost);
    assert!(notice.text.starts_with("Could not connect to the device"));

    manager.shutdown().await;
}

// ── Desired state ───────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_disconnect_closes_session_and_stops_retrying() {
    let (live, handle) = session();
    let connector = Arc::new(ScriptedConnector::accepting(live));
    let manager = manager(DeviceType::Curtain, &connector);
    let mut events = manager.subscribe();

    manager.connect();
    connected(&manager).await;

    manager.disconnect();
    let event = wait_for_event(&mut events, |e| e.status == LinkStatus::Disconnected).await;
    assert!(event.notice.is_none());
    assert!(handle.is_closed());
    assert_eq!(manager.state(), ConnectionState::Disconnected);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(connector.attempts().len(), 1);

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_during_backoff_ends_episode() {
    let connector = Arc::new(ScriptedConnector::refusing());
    let manager = manager(DeviceType::Curtain, &connector);
    let mut events = manager.subscribe();

    manager.connect();
    tokio::time::sleep(Duration::from_secs(12)).await;
    manager.disconnect();
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(connector.attempts().len(), 3);
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert!(notices(&drain(&mut events), NoticeKind::LinkLost).is_empty());

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_reconnect_loop() {
    let connector = Arc::new(ScriptedConnector::refusing());
    let manager = manager(DeviceType::Fan, &connector);

    manager.connect();
    tokio::time::sleep(Duration::from_secs(7)).await;
    manager.shutdown().await;
    let attempts = connector.attempts().len();

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.attempts().len(), attempts);
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert!(!manager.is_running());
}

// ── Frames ──────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_frames_update_snapshot_in_order() {
    let (live, handle) = session();
    let connector = Arc::new(ScriptedConnector::accepting(live));
    let manager = manager(DeviceType::Fan, &connector);
    let mut events = manager.subscribe();

    manager.connect();
    connected(&manager).await;

    handle.push(r#"{"fan":2,"param":"speed","value":80}"#);
    handle.push(r#"{"fan":1,"param":"speed","value":42}"#);
    wait_for_event(&mut events, |e| e.state.get_in("fan1", "speed").is_some()).await;

    let snapshot = manager.snapshot();
    assert_eq!(snapshot.get_in("fan1", "speed"), Some(&json!(42)));
    assert_eq!(snapshot.get_in("fan2", "speed"), Some(&json!(80)));
    assert_eq!(snapshot.scope("system").map(|s| s.len()), Some(0));

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_malformed_frame_keeps_state_and_session() {
    let (live, handle) = session();
    let connector = Arc::new(ScriptedConnector::accepting(live));
    let manager = manager(DeviceType::Curtain, &connector);
    let mut events = manager.subscribe();

    manager.connect();
    connected(&manager).await;

    handle.push(r#"{"state":"STOPPED","position_percent":20}"#);
    wait_for_event(&mut events, |e| !e.state.is_empty()).await;
    let before = manager.snapshot();

    handle.push("{truncated");
    let event = wait_for_event(&mut events, |e| e.notice.is_some()).await;
    assert_eq!(event.notice.unwrap().kind, NoticeKind::Protocol);
    assert_eq!(*manager.snapshot(), *before);
    assert_eq!(manager.state(), ConnectionState::Connected);
    assert_eq!(connector.attempts().len(), 1);

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_equipment_fault_is_published_once() {
    let (live, handle) = session();
    let connector = Arc::new(ScriptedConnector::accepting(live));
    let manager = manager(DeviceType::Curtain, &connector);
    let mut events = manager.subscribe();

    manager.connect();
    connected(&manager).await;

    handle.push(r#"{"vfd_active":true,"vfd_error":0}"#);
    handle.push(r#"{"vfd_active":true,"vfd_error":12}"#);
    handle.push(r#"{"vfd_active":true,"vfd_error":12}"#);
    handle.push(r#"{"vfd_active":true,"vfd_error":0,"done":true}"#);

    let mut faults = Vec::new();
    loop {
        let event = wait_for_event(&mut events, |_| true).await;
        if let Some(notice) = &event.notice {
            assert_eq!(notice.kind, NoticeKind::Fault);
            faults.push(notice.text.clone());
        }
        if event.state.get("done").is_some() {
            break;
        }
    }
    assert_eq!(faults.len(), 1);
    assert!(faults[0].contains("12"));

    manager.shutdown().await;
}

// ── Commands ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_command_while_offline_is_rejected_not_queued() {
    let (live, handle) = session();
    let connector = Arc::new(ScriptedConnector::new(
        refusals(1).chain([Step::Accept(live)]),
    ));
    let manager = manager(DeviceType::Curtain, &connector);
    let mut events = manager.subscribe();

    let err = manager.send(CurtainCommand::Open).await.unwrap_err();
    assert!(matches!(err, CoreError::CommandRejected { .. }));

    let seen = drain(&mut events);
    let rejected = notices(&seen, NoticeKind::CommandRejected);
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].text, "device offline, command not sent");
    assert!(seen.iter().all(|e| e.status == LinkStatus::Error));

    // Still refused while in the grace period.
    manager.connect();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(matches!(
        manager.curtain().unwrap().stop().await,
        Err(CoreError::CommandRejected { .. })
    ));

    // Nothing replayed once the link comes up.
    connected(&manager).await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(handle.sent().is_empty());

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_commands_are_written_in_wire_format() {
    let (live, handle) = session();
    let connector = Arc::new(ScriptedConnector::accepting(live));
    let manager = manager(DeviceType::Fan, &connector);

    manager.connect();
    connected(&manager).await;

    let fan = manager.fan().unwrap();
    fan.set_speed(1, 42).await.unwrap();
    fan.set_auto(true).await.unwrap();

    assert_eq!(
        handle.sent(),
        vec![
            r#"{"cmd":"speed","fan":1,"value":42}"#.to_owned(),
            r#"{"cmd":"auto","fan":0,"value":1}"#.to_owned(),
        ]
    );

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_write_failure_is_reported_as_command_failed() {
    let (live, _handle) = broken_session();
    let connector = Arc::new(ScriptedConnector::accepting(live));
    let manager = manager(DeviceType::Curtain, &connector);
    let mut events = manager.subscribe();

    manager.connect();
    connected(&manager).await;

    let err = manager.send(CurtainCommand::Goto { value: 30 }).await.unwrap_err();
    assert!(matches!(err, CoreError::CommandFailed { .. }));

    let event = wait_for_event(&mut events, |e| e.notice.is_some()).await;
    let notice = event.notice.unwrap();
    assert_eq!(notice.kind, NoticeKind::CommandFailed);
    assert_eq!(notice.text, "failed to send command: send failed: broken pipe");
    assert_eq!(manager.state(), ConnectionState::Connected);

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_commands_must_match_device_type() {
    let connector = Arc::new(ScriptedConnector::refusing());
    let manager = manager(DeviceType::Curtain, &connector);

    let err = manager.send(FanCommand::Start { fan: 1 }).await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidCommand { .. }));
    assert!(matches!(manager.pump(), Err(CoreError::Unsupported { .. })));
    assert!(matches!(
        manager.set_history_period(2).await,
        Err(CoreError::Unsupported { .. })
    ));

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_out_of_range_history_period_is_rejected_and_task_survives() {
    let connector = Arc::new(ScriptedConnector::refusing());
    let manager = manager(DeviceType::Pump, &connector);
    let mut events = manager.subscribe();

    for hours in [0, MAX_HISTORY_HOURS + 1, u32::MAX] {
        let err = manager.set_history_period(hours).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidCommand { .. }), "{hours}: {err:?}");
    }

    manager.set_history_period(MAX_HISTORY_HOURS).await.unwrap();
    let event = wait_for_event(&mut events, |e| {
        e.state.history().is_some_and(|h| h.period_hours() == MAX_HISTORY_HOURS)
    })
    .await;
    assert!(event.state.history().unwrap().is_empty());

    manager.set_history_period(2).await.unwrap();
    assert!(manager.is_running());
    assert_eq!(manager.snapshot().history().map(|h| h.period_hours()), Some(2));

    manager.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_oversized_configured_history_is_clamped() {
    let manager = ConnectionManager::spawn(
        endpoint(DeviceType::Pump),
        ManagerConfig {
            history_hours: u32::MAX,
            ..ManagerConfig::default()
        },
        Arc::new(ScriptedConnector::refusing()),
        TelemetryStore::disabled(),
    );

    let history = manager.snapshot().history().cloned().unwrap();
    assert_eq!(history.period_hours(), MAX_HISTORY_HOURS);
    manager.set_history_period(1).await.unwrap();

    manager.shutdown().await;
}

// ── Registry ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_registry_holds_one_manager_per_device_and_fans_in_events() {
    let (curtain, _c) = session();
    let (fan, _f) = session();
    let registry = DeviceRegistry::new(
        ScriptedConnector::new([Step::Accept(curtain), Step::Accept(fan)]),
        ManagerConfig::default(),
        TelemetryStore::disabled(),
    );
    let mut events = registry.subscribe();

    registry
        .register(DeviceEndpoint::from_ip("10.0.0.1", DeviceType::Curtain).unwrap())
        .unwrap();
    registry
        .register(DeviceEndpoint::from_ip("10.0.0.2", DeviceType::Fan).unwrap())
        .unwrap();
    let duplicate =
        registry.register(DeviceEndpoint::from_ip("10.0.0.1", DeviceType::Pump).unwrap());
    assert!(matches!(duplicate, Err(CoreError::DeviceExists { .. })));
    assert_eq!(registry.len(), 2);

    registry.connect_all();
    tokio::time::sleep(Duration::from_secs(1)).await;

    let connected: Vec<String> = drain(&mut events)
        .into_iter()
        .filter(|e| e.status == LinkStatus::Connected)
        .map(|e| e.device_id.to_string())
        .collect();
    assert_eq!(connected.len(), 2);
    assert!(connected.contains(&"10.0.0.1".to_owned()));
    assert!(connected.contains(&"10.0.0.2".to_owned()));

    assert_eq!(registry.managers()[0].device_id().as_str(), "10.0.0.1");
    assert!(registry.get(&"10.0.0.3".into()).is_none());

    registry.shutdown().await;
    assert!(registry.is_empty());
}
