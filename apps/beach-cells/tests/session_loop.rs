use std::sync::Arc;
use std::time::Duration;

use beach_cells::client::surface::HeadlessSurface;
use beach_cells::config::ClientConfig;
use beach_cells::protocol::{ServerMessage, encode_toggle_report, pack_bits};
use beach_cells::session::{ABORTED_NOTICE, CellSession, ConnectionState, UiEvent};
use beach_cells::transport::mock::MockConnector;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep};

fn config(max_retries: u32) -> ClientConfig {
    let mut config = ClientConfig::with_server("http://127.0.0.1:8000").unwrap();
    config.max_retries = max_retries;
    config
}

fn session(mock: &MockConnector, max_retries: u32) -> CellSession<HeadlessSurface> {
    CellSession::new(
        &config(max_retries),
        Arc::new(mock.clone()),
        HeadlessSurface::new(16, 4),
    )
    .unwrap()
}

async fn wait_for_opens(mock: &MockConnector, count: usize) {
    while mock.open_count() < count {
        sleep(Duration::from_millis(1)).await;
    }
}

async fn settle() {
    sleep(Duration::from_millis(40)).await;
}

#[test_timeout::tokio_timeout_test(paused)]
async fn reconnects_with_linear_backoff_then_aborts() {
    let mock = MockConnector::new();
    let mut session = session(&mock, 3);
    let (ui_tx, ui_rx) = mpsc::unbounded_channel();

    let driver = async {
        wait_for_opens(&mock, 1).await;
        let mut waits = Vec::new();
        for attempt in 1..=3 {
            let dropped_at = Instant::now();
            assert!(mock.hang_up());
            wait_for_opens(&mock, attempt + 1).await;
            waits.push(Instant::now() - dropped_at);
        }
        assert!(mock.hang_up());
        settle().await;
        // no fourth retry is ever scheduled
        sleep(Duration::from_secs(5)).await;
        let opens = mock.open_count();
        ui_tx.send(UiEvent::Quit).unwrap();
        (waits, opens)
    };

    let (outcome, (waits, opens)) = tokio::join!(session.run(ui_rx), driver);
    outcome.unwrap();

    for (wait, expected_ms) in waits.iter().zip([300u64, 600, 900]) {
        let expected = Duration::from_millis(expected_ms);
        assert!(
            *wait >= expected && *wait < expected + Duration::from_millis(20),
            "waited {wait:?}, expected about {expected:?}"
        );
    }
    assert_eq!(opens, 4);
    assert_eq!(session.connection().state(), ConnectionState::Aborted);
    assert_eq!(session.status().notice, Some(ABORTED_NOTICE));
    assert_eq!(session.surface().last_status().unwrap().connection, "aborted");
}

#[test_timeout::tokio_timeout_test(paused)]
async fn applies_server_frames_and_reports_clicks() {
    let mock = MockConnector::new().auto_open();
    let mut session = session(&mock, 3);
    let (ui_tx, ui_rx) = mpsc::unbounded_channel();

    let driver = async {
        wait_for_opens(&mock, 1).await;
        let mut cells = vec![false; 40];
        cells[1] = true;
        mock.deliver(ServerMessage::init_from_bits(&cells).encode());
        mock.deliver(ServerMessage::toggled(2, true).unwrap().encode());
        mock.deliver(ServerMessage::diff(&[1, 3], false).unwrap().encode());
        mock.deliver(Bytes::from_static(&[0b111_000_00, 0xAA]));
        mock.deliver(ServerMessage::diff(&[7, 9], true).unwrap().encode());
        settle().await;

        // second column, second row of a 4-wide grid
        ui_tx.send(UiEvent::Click { x: 5, y: 1 }).unwrap();
        ui_tx.send(UiEvent::Toggle { index: 0x100_0000, value: true }).unwrap();
        settle().await;
        ui_tx.send(UiEvent::Quit).unwrap();
    };

    let (outcome, ()) = tokio::join!(session.run(ui_rx), driver);
    outcome.unwrap();

    let store = session.store();
    assert_eq!(store.initial_len(), 40);
    let set: Vec<usize> = (0..store.size()).filter(|&i| store.get(i)).collect();
    assert_eq!(set, vec![2, 5, 7, 9]);
    assert_eq!(session.dropped_frames(), 1);
    assert_eq!(mock.sent(), vec![Bytes::copy_from_slice(&encode_toggle_report(5, true).unwrap())]);

    let visible = session.surface().visible_cells();
    assert_eq!(visible.len(), 16);
    assert_eq!(visible[5], (5, true));
    assert_eq!(visible[9], (9, true));
    let status = session.surface().last_status().unwrap();
    assert_eq!((status.checked, status.total), (4, 40));
}

#[test_timeout::tokio_timeout_test(paused)]
async fn quit_cancels_pending_reconnect() {
    let mock = MockConnector::new().auto_open();
    let mut session = session(&mock, 5);
    let (ui_tx, ui_rx) = mpsc::unbounded_channel();

    let driver = async {
        wait_for_opens(&mock, 1).await;
        settle().await;
        mock.hang_up();
        sleep(Duration::from_millis(100)).await;
        ui_tx.send(UiEvent::Quit).unwrap();
    };
    let (outcome, ()) = tokio::join!(session.run(ui_rx), driver);
    outcome.unwrap();

    assert_eq!(session.connection().state(), ConnectionState::Aborted);
    assert!(session.retry_deadline().is_none());
    sleep(Duration::from_secs(2)).await;
    assert_eq!(mock.open_count(), 1);
}

#[test_timeout::tokio_timeout_test(paused)]
async fn scroll_bursts_collapse_into_one_remap() {
    let mock = MockConnector::new().auto_open();
    let mut session = session(&mock, 3);
    let (ui_tx, ui_rx) = mpsc::unbounded_channel();

    let driver = async {
        wait_for_opens(&mock, 1).await;
        mock.deliver(ServerMessage::init(pack_bits(&[true; 400]), 0).encode());
        settle().await;
        for offset in [10, 20, 30, 40, 50] {
            ui_tx.send(UiEvent::Scroll { offset }).unwrap();
        }
        settle().await;
        ui_tx.send(UiEvent::Resize { width: 8, height: 2 }).unwrap();
        settle().await;
        ui_tx.send(UiEvent::Quit).unwrap();
    };
    let (outcome, ()) = tokio::join!(session.run(ui_rx), driver);
    outcome.unwrap();

    let viewport = session.viewport();
    assert!(viewport.coalesced_requests() >= 4);
    assert_eq!(viewport.columns(), 2);
    assert_eq!(viewport.offset(), 50);
    assert_eq!(viewport.slots().len(), 4);
    assert_eq!(viewport.slots()[0].index, 100);
    assert_eq!(session.surface().visible_cells()[0], (100, true));
}
