use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc::UnboundedReceiver;

use super::*;
use crate::provider::{ControlCommand, SnapshotStore};
use crate::providers::{ChannelControl, MemorySnapshotStore, StaticTrackProvider};
use crate::types::{
    CarUpdate, Chat, CollisionKind, CollisionWithCar, CollisionWithEnvironment, LapCompleted,
    SessionCarInfo, SessionInfo, Vec3, Version,
};
use crate::weather::{WeatherConditions, WeatherTransition};
use crate::{ErrorCategory, RaceControlError};

struct Harness {
    controller: Arc<RaceControl>,
    commands: UnboundedReceiver<ControlCommand>,
    store: Arc<MemorySnapshotStore>,
}

fn tracks() -> StaticTrackProvider {
    let info = |name: &str| TrackInfo { name: name.into(), country: "Belgium".into(), ..TrackInfo::default() };
    StaticTrackProvider::new()
        .with_track("spa", "", info("Spa-Francorchamps"), Some(TrackMap::default()))
        .with_track("magione", "", info("Magione"), None)
}

fn harness_with_store(store: Arc<MemorySnapshotStore>) -> Harness {
    harness_with(RaceControlConfig::default(), store)
}

fn harness_with(config: RaceControlConfig, store: Arc<MemorySnapshotStore>) -> Harness {
    let _ = tracing_subscriber::fmt::try_init();
    let (control, commands) = ChannelControl::new();
    let controller = RaceControl::new(
        config,
        Arc::new(tracks()),
        store.clone(),
        Arc::new(control),
    );
    Harness { controller, commands, store }
}

fn harness() -> Harness {
    harness_with_store(Arc::new(MemorySnapshotStore::new()))
}

fn session(kind: SessionInfoKind, session_type: SessionType, track: &str, name: &str) -> Message {
    Message::SessionInfo(SessionInfo {
        kind,
        version: 4,
        session_index: 0,
        current_session_index: 0,
        session_count: 3,
        server_name: "Friday Night Club".into(),
        track: track.into(),
        track_layout: String::new(),
        name: name.into(),
        session_type,
        time: 30,
        laps: 0,
        wait_time: 60,
        ambient_temp: 22,
        road_temp: 31,
        weather_graphics: "3_clear".into(),
        elapsed_ms: 0,
    })
}

fn practice() -> Message {
    session(SessionInfoKind::New, SessionType::Practice, "spa", "Practice")
}

fn car_info(kind: ConnectionKind, car_id: u8, guid: &str) -> Message {
    Message::SessionCarInfo(SessionCarInfo {
        kind,
        car_id,
        driver_name: format!("Driver {guid}"),
        driver_guid: guid.into(),
        car_model: "ks_porsche_911_gt3_r_2016".into(),
        car_skin: "00_orange".into(),
    })
}

fn connect(car_id: u8, guid: &str) -> Message {
    car_info(ConnectionKind::Connect, car_id, guid)
}

fn disconnect(car_id: u8, guid: &str) -> Message {
    car_info(ConnectionKind::Disconnect, car_id, guid)
}

fn lap(car_id: u8, lap_time_ms: u32) -> Message {
    Message::LapCompleted(LapCompleted { car_id, lap_time_ms, cuts: 0 })
}

fn guids(drivers: &[crate::types::Driver]) -> Vec<String> {
    drivers.iter().map(|driver| driver.guid().to_string()).collect()
}

async fn next_chat(commands: &mut UnboundedReceiver<ControlCommand>) -> ControlCommand {
    loop {
        match commands.recv().await {
            Some(ControlCommand::GetSessionInfo) => continue,
            Some(command) => return command,
            None => panic!("control channel closed"),
        }
    }
}

#[tokio::test]
async fn zero_lap_disconnect_leaves_no_trace() {
    let h = harness();
    h.controller.process(practice()).await.unwrap();
    h.controller.process(connect(1, "a")).await.unwrap();
    assert!(h.controller.process(disconnect(1, "a")).await.unwrap());

    let state = h.controller.state();
    assert!(state.connected.is_empty());
    assert!(state.disconnected.is_empty());
    assert!(state.car_ids.is_empty());
}

#[tokio::test]
async fn reconnect_preserves_lap_history() {
    let h = harness();
    h.controller.process(practice()).await.unwrap();
    h.controller.process(connect(1, "a")).await.unwrap();
    h.controller.process(lap(1, 92_000)).await.unwrap();
    h.controller.process(lap(1, 90_500)).await.unwrap();
    h.controller.process(disconnect(1, "a")).await.unwrap();

    let state = h.controller.state();
    assert_eq!(guids(&state.disconnected), ["a"]);

    h.controller.process(connect(6, "a")).await.unwrap();
    let state = h.controller.state();
    let driver = state.connected_driver(&"a".into()).unwrap();
    assert_eq!(driver.total_laps, 2);
    assert_eq!(driver.best_lap(), Some(Duration::from_millis(90_500)));
    assert_eq!(driver.car_info.car_id, 6);
    assert!(state.disconnected.is_empty());
}

#[tokio::test]
async fn looped_practice_keeps_driver_records() {
    let h = harness();
    h.controller.process(practice()).await.unwrap();
    h.controller.process(connect(1, "a")).await.unwrap();
    h.controller.process(lap(1, 88_000)).await.unwrap();
    let before = Utc::now();

    h.controller.process(practice()).await.unwrap();

    let state = h.controller.state();
    let driver = state.connected_driver(&"a".into()).unwrap();
    assert_eq!(driver.total_laps, 1);
    assert_eq!(driver.best_lap(), Some(Duration::from_millis(88_000)));
    assert!(driver.last_lap_completed().unwrap() >= before);
}

#[tokio::test]
async fn different_session_clears_records() {
    let h = harness();
    h.controller.process(practice()).await.unwrap();
    h.controller.process(connect(1, "a")).await.unwrap();
    h.controller.process(connect(2, "b")).await.unwrap();
    h.controller.process(lap(1, 88_000)).await.unwrap();
    h.controller.process(lap(2, 89_000)).await.unwrap();
    h.controller.process(disconnect(2, "b")).await.unwrap();

    h.controller
        .process(session(SessionInfoKind::New, SessionType::Race, "spa", "Race"))
        .await
        .unwrap();

    let state = h.controller.state();
    assert!(state.disconnected.is_empty());
    let driver = state.connected_driver(&"a".into()).unwrap();
    assert_eq!(driver.total_laps, 0);
    assert_eq!(driver.best_lap(), None);
    assert_eq!(driver.position, 0);
    assert_eq!(state.session.unwrap().session_type, SessionType::Race);
}

#[tokio::test]
async fn race_standings_follow_laps_and_time() {
    let h = harness();
    h.controller
        .process(session(SessionInfoKind::New, SessionType::Race, "spa", "Race"))
        .await
        .unwrap();
    for (car_id, guid) in [(0, "A"), (1, "B"), (2, "C")] {
        h.controller.process(connect(car_id, guid)).await.unwrap();
    }

    for (car_id, secs) in [(0, 1), (1, 2), (2, 3), (0, 1), (2, 3), (1, 5)] {
        h.controller.process(lap(car_id, secs * 1_000)).await.unwrap();
    }

    let state = h.controller.state();
    assert_eq!(guids(&state.connected), ["A", "C", "B"]);
    assert_eq!(state.connected[0].split, "0s");
    let positions: Vec<u32> = state.connected.iter().map(|d| d.position).collect();
    assert_eq!(positions, [1, 2, 3]);
}

#[tokio::test]
async fn unknown_disconnect_is_an_inconsistency() {
    let h = harness();
    h.controller.process(practice()).await.unwrap();
    h.controller.process(connect(1, "a")).await.unwrap();
    let before = h.controller.state();

    let error = h.controller.process(disconnect(9, "nobody")).await.unwrap_err();
    assert!(matches!(error, RaceControlError::DisconnectWithoutConnect { car_id: 9, .. }));
    assert_eq!(error.category(), ErrorCategory::Inconsistency);
    assert_eq!(h.controller.state(), before);

    // `handle` swallows the failure and keeps going.
    h.controller.handle(disconnect(9, "nobody")).await;
    h.controller.handle(lap(1, 91_000)).await;
    assert_eq!(h.controller.state().connected[0].total_laps, 1);
}

#[tokio::test]
async fn events_for_unmapped_cars_are_rejected() {
    let h = harness();
    h.controller.process(practice()).await.unwrap();

    for message in [
        lap(4, 90_000),
        Message::ClientLoaded(crate::types::ClientLoaded { car_id: 4 }),
        Message::CarUpdate(CarUpdate {
            car_id: 4,
            pos: Vec3::default(),
            velocity: Vec3::new(10.0, 0.0, 0.0),
            gear: 3,
            engine_rpm: 6_000,
            normalised_spline_pos: 0.1,
        }),
    ] {
        let error = h.controller.process(message).await.unwrap_err();
        assert!(matches!(error, RaceControlError::UnknownCar { car_id: 4, .. }));
    }
}

#[tokio::test]
async fn second_weather_transition_is_refused() {
    let h = harness();
    let conditions = |graphics: &str| WeatherConditions {
        graphics: graphics.into(),
        ambient_temp: 18.0,
        road_temp: 24.0,
        wind_speed: 3.0,
        wind_direction: 180.0,
    };
    let transition = |to: &str| WeatherTransition {
        from: conditions("3_clear"),
        to: conditions(to),
        duration: Duration::from_secs(3_600),
    };

    h.controller.start_weather_transition(transition("7_heavy_clouds")).unwrap();
    let first = h.controller.weather_progress().unwrap();

    let error = h.controller.start_weather_transition(transition("1_heavy_fog")).unwrap_err();
    assert!(matches!(error, RaceControlError::AlreadyTransitioning));
    assert_eq!(error.category(), ErrorCategory::Policy);
    assert_eq!(h.controller.weather_progress().unwrap(), first);
}

#[tokio::test]
async fn snapshot_restores_standings_after_restart() {
    let store = Arc::new(MemorySnapshotStore::new());
    let h = harness_with_store(store.clone());
    h.controller.process(practice()).await.unwrap();
    h.controller.process(connect(1, "a")).await.unwrap();
    h.controller.process(connect(2, "b")).await.unwrap();
    h.controller.process(lap(1, 80_000)).await.unwrap();
    h.controller.process(lap(1, 79_000)).await.unwrap();
    h.controller.process(lap(2, 81_000)).await.unwrap();

    h.controller.source_stopped().await;
    assert!(h.controller.state().connected.is_empty());
    let saved = h.store.load().await.unwrap().unwrap();
    assert_eq!(saved.drivers.len(), 2);
    drop(h);

    let restarted = harness_with_store(store);
    restarted.controller.process(practice()).await.unwrap();

    let state = restarted.controller.state();
    for (guid, saved_driver) in &saved.drivers {
        let restored = state.disconnected_driver(guid).unwrap();
        assert_eq!(restored.total_laps, saved_driver.total_laps);
        assert_eq!(restored.best_lap(), saved_driver.best_lap());
    }
}

#[tokio::test]
async fn snapshot_of_other_session_is_ignored() {
    let store = Arc::new(MemorySnapshotStore::new());
    let h = harness_with_store(store.clone());
    h.controller.process(practice()).await.unwrap();
    h.controller.process(connect(1, "a")).await.unwrap();
    h.controller.process(lap(1, 80_000)).await.unwrap();
    h.controller.source_stopped().await;

    let restarted = harness_with_store(store);
    restarted
        .controller
        .process(session(SessionInfoKind::New, SessionType::Qualifying, "spa", "Qualifying"))
        .await
        .unwrap();
    assert!(restarted.controller.state().disconnected.is_empty());
}

#[tokio::test]
async fn track_metadata_failure_aborts_transition() {
    let h = harness();
    let error = h
        .controller
        .process(session(SessionInfoKind::New, SessionType::Race, "monza", "Race"))
        .await
        .unwrap_err();
    assert!(error.is_fatal());
    assert!(h.controller.state().session.is_none());

    // Missing map only degrades.
    h.controller
        .process(session(SessionInfoKind::New, SessionType::Race, "magione", "Race"))
        .await
        .unwrap();
    let state = h.controller.state();
    assert_eq!(state.track_info.unwrap().name, "Magione");
    assert!(state.track_map.is_none());
}

#[tokio::test]
async fn unchanged_session_update_is_not_broadcast() {
    let h = harness();
    h.controller.process(practice()).await.unwrap();

    let update = session(SessionInfoKind::Update, SessionType::Practice, "spa", "Practice");
    assert!(!h.controller.process(update.clone()).await.unwrap());

    let Message::SessionInfo(mut info) = update else { unreachable!() };
    info.road_temp = 35;
    assert!(h.controller.process(Message::SessionInfo(info)).await.unwrap());
    assert_eq!(h.controller.state().session.unwrap().road_temp, 35);
}

#[tokio::test]
async fn clients_receive_state_then_events() {
    let h = harness();
    h.controller.process(practice()).await.unwrap();
    let mut client = h.controller.subscribe().unwrap();
    assert_eq!(h.controller.client_count(), 1);

    h.controller.process(connect(3, "c")).await.unwrap();
    h.controller
        .process(Message::CarUpdate(CarUpdate {
            car_id: 3,
            pos: Vec3::new(1.0, 2.0, 3.0),
            velocity: Vec3::new(30.0, 0.0, 40.0),
            gear: 5,
            engine_rpm: 8_000,
            normalised_spline_pos: 0.5,
        }))
        .await
        .unwrap();

    let mut frames = Vec::new();
    for _ in 0..3 {
        let frame = tokio::time::timeout(Duration::from_secs(1), client.frames.recv())
            .await
            .unwrap()
            .unwrap();
        frames.push(serde_json::from_str::<serde_json::Value>(&frame).unwrap());
    }

    assert_eq!(frames[0]["event_type"], "race_control");
    assert_eq!(frames[0]["message"]["session"]["track"], "spa");
    assert_eq!(frames[1]["event_type"], "new_connection");
    assert_eq!(frames[1]["message"]["connected"][0]["car_info"]["driver_guid"], "c");
    assert_eq!(frames[2]["event_type"], "car_update");
    assert_eq!(frames[2]["message"]["car_id"], 3);

    let state = h.controller.state();
    let car = state.connected[0].current_car().unwrap();
    assert_eq!(car.top_speed_this_lap, 50.0);
}

#[tokio::test]
async fn collisions_are_logged_on_the_reporter() {
    let h = harness();
    h.controller.process(practice()).await.unwrap();
    h.controller.process(connect(1, "a")).await.unwrap();
    h.controller.process(connect(2, "b")).await.unwrap();

    let hit = |other_car_id| {
        Message::CollisionWithCar(CollisionWithCar {
            car_id: 1,
            other_car_id,
            impact_speed: 23.5,
            world_pos: Vec3::default(),
            rel_pos: Vec3::default(),
        })
    };
    h.controller.process(hit(2)).await.unwrap();
    h.controller.process(hit(17)).await.unwrap();
    h.controller
        .process(Message::CollisionWithEnvironment(CollisionWithEnvironment {
            car_id: 1,
            impact_speed: 61.0,
            world_pos: Vec3::default(),
            rel_pos: Vec3::default(),
        }))
        .await
        .unwrap();

    let state = h.controller.state();
    let a = state.connected_driver(&"a".into()).unwrap();
    assert_eq!(a.collisions.len(), 3);
    assert_eq!(a.collisions[0].other_driver, Some("b".into()));
    assert_eq!(a.collisions[1].other_driver, None);
    assert_eq!(a.collisions[2].kind, CollisionKind::Environment);
    assert!(state.connected_driver(&"b".into()).unwrap().collisions.is_empty());
}

#[tokio::test]
async fn silent_drivers_time_out() {
    let h = harness();
    h.controller.process(practice()).await.unwrap();
    h.controller.process(connect(1, "a")).await.unwrap();
    h.controller.process(connect(2, "b")).await.unwrap();
    h.controller.process(lap(2, 84_000)).await.unwrap();

    let now = Utc::now();
    assert_eq!(h.controller.sweep_timeouts_at(now + chrono::Duration::minutes(1)).await, 0);
    assert_eq!(h.controller.sweep_timeouts_at(now + chrono::Duration::minutes(6)).await, 2);

    let state = h.controller.state();
    assert!(state.connected.is_empty());
    assert_eq!(guids(&state.disconnected), ["b"]);
}

#[tokio::test]
async fn timeout_sweep_waits_for_dispatch() {
    let h = harness();
    h.controller.process(practice()).await.unwrap();
    h.controller.process(connect(3, "x")).await.unwrap();

    let dispatching = h.controller.dispatch.lock().await;
    let controller = h.controller.clone();
    let later = Utc::now() + chrono::Duration::minutes(6);
    let sweep = tokio::spawn(async move { controller.sweep_timeouts_at(later).await });

    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(!sweep.is_finished());
    assert_eq!(guids(&h.controller.state().connected), ["x"]);

    drop(dispatching);
    assert_eq!(sweep.await.unwrap(), 1);
    assert!(h.controller.registry().car_ids().is_empty());
}

#[tokio::test(start_paused = true)]
async fn periodic_sweep_evicts_and_broadcasts() {
    let h = harness();
    h.controller.process(practice()).await.unwrap();
    h.controller.process(connect(1, "a")).await.unwrap();
    h.controller.process(connect(2, "b")).await.unwrap();
    h.controller
        .registry()
        .connected_driver(&"a".into())
        .unwrap()
        .lock()
        .connected_at = Utc::now() - chrono::Duration::minutes(10);

    let mut client = h.controller.subscribe().unwrap();
    client.frames.recv().await.unwrap();

    let wait = h.controller.config().timeout_sweep_interval + Duration::from_secs(1);
    let frame = tokio::time::timeout(wait, async {
        loop {
            let frame = client.frames.recv().await.unwrap();
            if frame.starts_with(r#"{"event_type":"connection_closed""#) {
                break frame;
            }
        }
    })
    .await
    .unwrap();

    let state: serde_json::Value = serde_json::from_str(&frame).unwrap();
    let connected = state["message"]["connected"].as_array().unwrap();
    assert_eq!(connected.len(), 1);
    assert_eq!(guids(&h.controller.state().connected), ["b"]);
}

#[tokio::test]
async fn chat_commands_answer_privately() {
    let mut h = harness();
    h.controller.process(practice()).await.unwrap();
    h.controller.process(connect(3, "c")).await.unwrap();
    h.controller.process(lap(3, 80_000)).await.unwrap();

    let chat = |message: &str| Message::Chat(Chat { car_id: 3, message: message.into() });
    assert!(!h.controller.process(chat("nice pass")).await.unwrap());
    h.controller.process(chat("/rc best")).await.unwrap();

    assert_eq!(
        next_chat(&mut h.commands).await,
        ControlCommand::SendChat { car_id: 3, message: "Best lap 1:20.000".into() }
    );
}

#[tokio::test]
async fn admin_operations_target_connected_drivers() {
    let mut h = harness();
    h.controller.process(practice()).await.unwrap();
    h.controller.process(connect(5, "e")).await.unwrap();

    h.controller.send_chat(&"e".into(), "box this lap").await.unwrap();
    assert_eq!(
        next_chat(&mut h.commands).await,
        ControlCommand::SendChat { car_id: 5, message: "box this lap".into() }
    );

    h.controller.kick(&"e".into()).await.unwrap();
    assert_eq!(next_chat(&mut h.commands).await, ControlCommand::KickUser { car_id: 5 });

    h.controller.broadcast_chat("green flag").await.unwrap();
    assert_eq!(
        next_chat(&mut h.commands).await,
        ControlCommand::BroadcastChat { message: "green flag".into() }
    );

    h.controller.next_session().await.unwrap();
    assert_eq!(next_chat(&mut h.commands).await, ControlCommand::NextSession);
    h.controller.restart_session().await.unwrap();
    assert_eq!(next_chat(&mut h.commands).await, ControlCommand::RestartSession);

    let error = h.controller.kick(&"ghost".into()).await.unwrap_err();
    assert!(matches!(error, RaceControlError::DriverNotConnected { .. }));
}

#[tokio::test(start_paused = true)]
async fn version_starts_session_info_poll() {
    let mut h = harness();
    assert!(h.controller.process(Message::Version(Version { protocol: 4 })).await.unwrap());

    for _ in 0..2 {
        assert_eq!(h.commands.recv().await, Some(ControlCommand::GetSessionInfo));
    }
}

#[tokio::test]
async fn state_updates_follow_broadcasts() {
    use futures::StreamExt;

    let h = harness();
    let mut updates = h.controller.state_updates(UpdateRate::Native);
    assert!(updates.next().await.unwrap().session.is_none());

    h.controller.process(practice()).await.unwrap();
    let state = updates.next().await.unwrap();
    assert_eq!(state.session.as_ref().unwrap().name, "Practice");
}
