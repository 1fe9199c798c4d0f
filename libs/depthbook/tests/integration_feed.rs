//! Integration tests for the depth feed over an in-memory venue

mod common;

use common::{
    binance_update, collect_errors, event_time, eventually, fast_bootstrap, fast_connection,
    snapshot, ScriptedSnapshots,
};
use crossbeam_channel::unbounded;
use depthbook::{
    Binance, DepthError, DepthFeed, InstrumentKey, InstrumentStatus, SnapshotSource,
};
use feedsocket::{ChannelAcceptor, ChannelPeer, ChannelTransport, ConnectionState};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(2);

fn btc() -> InstrumentKey {
    InstrumentKey::new("BTC", "USDT")
}

fn eth() -> InstrumentKey {
    InstrumentKey::new("ETH", "USDT")
}

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

async fn connect(acceptor: &mut ChannelAcceptor) -> ChannelPeer {
    tokio::time::timeout(WAIT, acceptor.accept())
        .await
        .expect("no connection")
        .expect("transport closed")
}

async fn next_text(peer: &mut ChannelPeer) -> String {
    tokio::time::timeout(WAIT, peer.recv_text())
        .await
        .expect("no frame")
        .expect("peer closed")
}

#[tokio::test]
async fn test_snapshot_then_bridging_delta() {
    let (transport, mut acceptor) = ChannelTransport::new();
    let source = Arc::new(ScriptedSnapshots::new().script(
        "BTCUSDT",
        vec![Ok(snapshot(500, &[("100.00", "2")], &[("100.10", "1")]))],
    ));
    let (updates_tx, updates) = unbounded();

    let feed = DepthFeed::builder(Binance::spot().with_endpoint("mem://binance"))
        .shared_snapshot_source(source.clone())
        .transport(transport)
        .connection(fast_connection())
        .bootstrap(fast_bootstrap(3))
        .updates(updates_tx)
        .build()
        .unwrap();

    feed.start().await.unwrap();
    let mut peer = connect(&mut acceptor).await;

    feed.subscribe(&btc()).await.unwrap();
    let request = next_text(&mut peer).await;
    assert!(request.contains("SUBSCRIBE"));
    assert!(request.contains("btcusdt@depth@100ms"));

    assert!(matches!(feed.snapshot(&btc()), Err(DepthError::NotReady(_))));
    assert_eq!(feed.status(&btc()).unwrap(), InstrumentStatus::Pending);

    peer.push_text(binance_update(
        "BTCUSDT",
        501,
        501,
        &[("100.00", "0")],
        &[("100.10", "3")],
    ));

    assert!(
        eventually(WAIT, || feed
            .snapshot(&btc())
            .is_ok_and(|depth| depth.sequence == 501))
        .await
    );

    let depth = feed.snapshot(&btc()).unwrap();
    assert!(depth.bids.is_empty());
    assert_eq!(depth.asks.len(), 1);
    assert_eq!(depth.asks[0].price, dec("100.10"));
    assert_eq!(depth.asks[0].quantity, 3.0);
    assert_eq!(depth.event_time_ms, event_time(501));
    assert_eq!(source.calls("BTCUSDT"), 1);

    let token = updates.recv_timeout(WAIT).unwrap();
    assert_eq!(token, format!("BTC-USDT:{}", event_time(501)));

    feed.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_no_update_token_until_a_delta_applies() {
    let (transport, mut acceptor) = ChannelTransport::new();
    let source = Arc::new(ScriptedSnapshots::new().script(
        "BTCUSDT",
        vec![Ok(snapshot(510, &[("100.00", "2")], &[("100.10", "1")]))],
    ));
    let (updates_tx, updates) = unbounded();

    let feed = DepthFeed::builder(Binance::spot().with_endpoint("mem://binance"))
        .shared_snapshot_source(source.clone())
        .transport(transport)
        .connection(fast_connection())
        .bootstrap(fast_bootstrap(3))
        .updates(updates_tx)
        .build()
        .unwrap();

    feed.start().await.unwrap();
    let mut peer = connect(&mut acceptor).await;
    feed.subscribe(&btc()).await.unwrap();
    assert!(next_text(&mut peer).await.contains("btcusdt@depth@100ms"));

    // Older than the snapshot, skipped on replay
    peer.push_text(binance_update("BTCUSDT", 501, 501, &[("100.00", "9")], &[]));

    assert!(
        eventually(WAIT, || feed
            .status(&btc())
            .is_ok_and(|s| s == InstrumentStatus::Live { sequence: 510 }))
        .await
    );
    tokio::time::sleep(Duration::from_millis(50)).await;

    let depth = feed.snapshot(&btc()).unwrap();
    assert_eq!(depth.event_time_ms, 0);
    assert_eq!(depth.bids[0].quantity, 2.0);
    assert!(updates.try_recv().is_err());

    peer.push_text(binance_update("BTCUSDT", 511, 511, &[("100.00", "3")], &[]));
    let token = updates.recv_timeout(WAIT).unwrap();
    assert_eq!(token, format!("BTC-USDT:{}", event_time(511)));
    assert!(updates.try_recv().is_err());

    feed.stop().await;
}

#[tokio::test]
async fn test_deltas_during_fetch_are_replayed() {
    let (transport, mut acceptor) = ChannelTransport::new();
    let (source, release) = ScriptedSnapshots::gated();
    let source = Arc::new(source.script(
        "BTCUSDT",
        vec![Ok(snapshot(200, &[("99.00", "1")], &[("101.00", "1")]))],
    ));

    let feed = DepthFeed::builder(Binance::spot().with_endpoint("mem://binance"))
        .shared_snapshot_source(source.clone())
        .transport(transport)
        .connection(fast_connection())
        .bootstrap(fast_bootstrap(3))
        .build()
        .unwrap();

    feed.subscribe(&btc()).await.unwrap();
    feed.start().await.unwrap();
    let mut peer = connect(&mut acceptor).await;
    assert!(next_text(&mut peer).await.contains("btcusdt@depth@100ms"));

    // Fetch is held open while these arrive
    peer.push_text(binance_update("BTCUSDT", 190, 195, &[("98.00", "5")], &[]));
    peer.push_text(binance_update("BTCUSDT", 196, 201, &[("99.00", "4")], &[]));
    peer.push_text(binance_update("BTCUSDT", 202, 203, &[], &[("101.00", "0")]));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(source.calls("BTCUSDT"), 0);
    assert_eq!(feed.status(&btc()).unwrap(), InstrumentStatus::Pending);
    release.send(()).unwrap();

    assert!(
        eventually(WAIT, || feed
            .status(&btc())
            .is_ok_and(|s| s == InstrumentStatus::Live { sequence: 203 }))
        .await
    );

    let depth = feed.snapshot(&btc()).unwrap();
    // 190..=195 is older than the snapshot and must not resurrect 98.00
    assert_eq!(depth.bids.len(), 1);
    assert_eq!(depth.bids[0].price, dec("99.00"));
    assert_eq!(depth.bids[0].quantity, 4.0);
    assert!(depth.asks.is_empty());

    let stats = feed.stats(&btc()).unwrap();
    assert_eq!(stats.deltas_skipped, 1);
    assert_eq!(stats.deltas_applied, 2);
    assert_eq!(stats.bootstraps, 1);

    feed.stop().await;
}

#[tokio::test]
async fn test_gap_triggers_single_resync() {
    let (transport, mut acceptor) = ChannelTransport::new();
    let source = Arc::new(ScriptedSnapshots::new().script(
        "BTCUSDT",
        vec![
            Ok(snapshot(100, &[("50.00", "1")], &[])),
            Ok(snapshot(108, &[("51.00", "2")], &[])),
        ],
    ));
    let (on_error, errors) = collect_errors();

    let feed = DepthFeed::builder(Binance::spot().with_endpoint("mem://binance"))
        .shared_snapshot_source(source.clone())
        .transport(transport)
        .connection(fast_connection())
        .bootstrap(fast_bootstrap(3))
        .on_error(on_error)
        .build()
        .unwrap();

    feed.start().await.unwrap();
    let mut peer = connect(&mut acceptor).await;
    feed.subscribe(&btc()).await.unwrap();
    next_text(&mut peer).await;

    peer.push_text(binance_update("BTCUSDT", 99, 100, &[], &[]));
    peer.push_text(binance_update("BTCUSDT", 101, 101, &[("50.50", "1")], &[]));
    assert!(
        eventually(WAIT, || feed
            .status(&btc())
            .is_ok_and(|s| s == InstrumentStatus::Live { sequence: 101 }))
        .await
    );

    // 102..=104 never arrive
    peer.push_text(binance_update("BTCUSDT", 105, 106, &[], &[]));
    peer.push_text(binance_update("BTCUSDT", 107, 108, &[], &[]));
    peer.push_text(binance_update("BTCUSDT", 109, 110, &[("51.50", "3")], &[]));

    assert!(
        eventually(WAIT, || feed
            .status(&btc())
            .is_ok_and(|s| s == InstrumentStatus::Live { sequence: 110 }))
        .await
    );
    assert_eq!(source.calls("BTCUSDT"), 2);

    let gaps: Vec<_> = errors
        .lock()
        .iter()
        .filter_map(|e| match e {
            DepthError::SequenceGap { expected, got, .. } => Some((*expected, *got)),
            _ => None,
        })
        .collect();
    assert_eq!(gaps, vec![(102, 105)]);

    let depth = feed.snapshot(&btc()).unwrap();
    let bids: Vec<_> = depth.bids.iter().map(|l| l.price).collect();
    assert_eq!(bids, vec![dec("51.50"), dec("51.00")]);
    assert_eq!(feed.stats(&btc()).unwrap().gaps, 1);

    feed.stop().await;
}

#[tokio::test]
async fn test_bootstrap_exhaustion_halts_one_instrument() {
    let (transport, mut acceptor) = ChannelTransport::new();
    let source = Arc::new(
        ScriptedSnapshots::new()
            .script("BTCUSDT", vec![Err(DepthError::Snapshot("HTTP 500".into()))])
            .script("ETHUSDT", vec![Ok(snapshot(10, &[("2000.00", "1")], &[]))]),
    );
    let (on_error, errors) = collect_errors();

    let feed = DepthFeed::builder(Binance::spot().with_endpoint("mem://binance"))
        .shared_snapshot_source(source.clone())
        .transport(transport)
        .connection(fast_connection())
        .bootstrap(fast_bootstrap(2))
        .on_error(on_error)
        .build()
        .unwrap();

    feed.start().await.unwrap();
    let mut peer = connect(&mut acceptor).await;
    feed.subscribe(&btc()).await.unwrap();
    feed.subscribe(&eth()).await.unwrap();
    next_text(&mut peer).await;
    next_text(&mut peer).await;

    peer.push_text(binance_update("BTCUSDT", 1, 1, &[], &[]));
    peer.push_text(binance_update("ETHUSDT", 11, 11, &[], &[]));

    assert!(
        eventually(WAIT, || feed
            .status(&btc())
            .is_ok_and(|s| s == InstrumentStatus::Halted))
        .await
    );
    assert!(
        eventually(WAIT, || feed
            .status(&eth())
            .is_ok_and(|s| s == InstrumentStatus::Live { sequence: 11 }))
        .await
    );
    assert!(matches!(feed.snapshot(&btc()), Err(DepthError::Halted(_))));
    assert_eq!(source.calls("BTCUSDT"), 2);

    {
        let errors = errors.lock();
        let fatal: Vec<_> = errors.iter().filter(|e| e.is_fatal()).collect();
        assert_eq!(fatal.len(), 1);
        assert!(matches!(
            fatal[0],
            DepthError::BootstrapExhausted { attempts: 2, .. }
        ));
    }

    // A halted book ignores traffic; the connection stays up for the others
    peer.push_text(binance_update("BTCUSDT", 2, 2, &[("1.00", "1")], &[]));
    peer.push_text(binance_update("ETHUSDT", 12, 12, &[("2001.00", "1")], &[]));
    assert!(
        eventually(WAIT, || feed
            .status(&eth())
            .is_ok_and(|s| s == InstrumentStatus::Live { sequence: 12 }))
        .await
    );
    assert_eq!(feed.stats(&btc()).unwrap().deltas_dropped, 1);
    assert_eq!(source.calls("BTCUSDT"), 2);
    assert_eq!(feed.connection_state(), ConnectionState::Live);

    feed.stop().await;
}

#[tokio::test]
async fn test_unsubscribe_discards_book() {
    let (transport, mut acceptor) = ChannelTransport::new();
    let source = Arc::new(
        ScriptedSnapshots::new().script("BTCUSDT", vec![Ok(snapshot(5, &[("10.00", "1")], &[]))]),
    );

    let feed = DepthFeed::builder(Binance::spot().with_endpoint("mem://binance"))
        .shared_snapshot_source(source.clone())
        .transport(transport)
        .connection(fast_connection())
        .bootstrap(fast_bootstrap(3))
        .build()
        .unwrap();

    feed.start().await.unwrap();
    let mut peer = connect(&mut acceptor).await;
    feed.subscribe(&btc()).await.unwrap();
    next_text(&mut peer).await;

    peer.push_text(binance_update("BTCUSDT", 6, 6, &[], &[]));
    assert!(eventually(WAIT, || feed.snapshot(&btc()).is_ok()).await);

    feed.unsubscribe(&btc()).await.unwrap();
    let request = next_text(&mut peer).await;
    assert!(request.contains("UNSUBSCRIBE"));
    assert!(matches!(
        feed.snapshot(&btc()),
        Err(DepthError::UnknownInstrument(_))
    ));
    assert!(feed.instruments().is_empty());

    // Late traffic for the old symbol is ignored
    peer.push_text(binance_update("BTCUSDT", 7, 7, &[], &[]));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(feed.instruments().is_empty());
    assert_eq!(source.calls("BTCUSDT"), 1);

    assert!(matches!(
        feed.unsubscribe(&btc()).await,
        Err(DepthError::UnknownInstrument(_))
    ));

    feed.stop().await;
}

#[tokio::test]
async fn test_books_survive_reconnect() {
    let (transport, mut acceptor) = ChannelTransport::new();
    let source = Arc::new(
        ScriptedSnapshots::new().script("BTCUSDT", vec![Ok(snapshot(40, &[("10.00", "1")], &[]))]),
    );

    let feed = DepthFeed::builder(Binance::spot().with_endpoint("mem://binance"))
        .shared_snapshot_source(source.clone())
        .transport(transport)
        .connection(fast_connection())
        .bootstrap(fast_bootstrap(3))
        .build()
        .unwrap();

    feed.start().await.unwrap();
    let mut first = connect(&mut acceptor).await;
    feed.subscribe(&btc()).await.unwrap();
    next_text(&mut first).await;

    first.push_text(binance_update("BTCUSDT", 41, 41, &[("10.00", "2")], &[]));
    assert!(
        eventually(WAIT, || feed
            .status(&btc())
            .is_ok_and(|s| s == InstrumentStatus::Live { sequence: 41 }))
        .await
    );

    first.hang_up();
    let mut second = connect(&mut acceptor).await;
    assert!(next_text(&mut second).await.contains("btcusdt@depth@100ms"));

    assert_eq!(feed.snapshot(&btc()).unwrap().sequence, 41);

    second.push_text(binance_update("BTCUSDT", 42, 42, &[("10.00", "3")], &[]));
    assert!(
        eventually(WAIT, || feed
            .snapshot(&btc())
            .is_ok_and(|depth| depth.sequence == 42 && depth.bids[0].quantity == 3.0))
        .await
    );
    assert_eq!(source.calls("BTCUSDT"), 1);
    assert!(feed.metrics().sessions >= 2);

    feed.stop().await;
}

#[tokio::test]
async fn test_malformed_frame_is_dropped() {
    let (transport, mut acceptor) = ChannelTransport::new();
    let source = Arc::new(
        ScriptedSnapshots::new().script("BTCUSDT", vec![Ok(snapshot(1, &[("10.00", "1")], &[]))]),
    );
    let (on_error, errors) = collect_errors();

    let feed = DepthFeed::builder(Binance::spot().with_endpoint("mem://binance"))
        .shared_snapshot_source(source.clone())
        .transport(transport)
        .connection(fast_connection())
        .bootstrap(fast_bootstrap(3))
        .on_error(on_error)
        .build()
        .unwrap();

    feed.start().await.unwrap();
    let mut peer = connect(&mut acceptor).await;
    feed.subscribe(&btc()).await.unwrap();
    next_text(&mut peer).await;

    peer.push_text(r#"{"e":"depthUpdate","s":"BTCUSDT","U":"x"}"#);
    peer.push_text(r#"{"result":null,"id":1}"#);
    peer.push_text(binance_update("BTCUSDT", 2, 2, &[], &[]));

    assert!(
        eventually(WAIT, || feed
            .status(&btc())
            .is_ok_and(|s| s == InstrumentStatus::Live { sequence: 2 }))
        .await
    );
    assert!(errors.lock().is_empty());
    assert_eq!(feed.connection_state(), ConnectionState::Live);

    feed.stop().await;
}

#[tokio::test]
async fn test_stop_discards_everything() {
    let (transport, mut acceptor) = ChannelTransport::new();
    let (source, release) = ScriptedSnapshots::gated();
    let source = Arc::new(source.script("BTCUSDT", vec![Ok(snapshot(1, &[], &[]))]));
    let (on_error, errors) = collect_errors();

    let feed = DepthFeed::builder(Binance::spot().with_endpoint("mem://binance"))
        .shared_snapshot_source(source.clone())
        .transport(transport)
        .connection(fast_connection())
        .bootstrap(fast_bootstrap(3))
        .on_error(on_error)
        .build()
        .unwrap();

    feed.start().await.unwrap();
    let mut peer = connect(&mut acceptor).await;
    feed.subscribe(&btc()).await.unwrap();
    next_text(&mut peer).await;

    // Bootstrap is in flight when stop lands
    peer.push_text(binance_update("BTCUSDT", 2, 2, &[], &[]));
    tokio::time::sleep(Duration::from_millis(50)).await;

    feed.stop().await;
    release.send(()).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(feed.instruments().is_empty());
    assert!(matches!(
        feed.snapshot(&btc()),
        Err(DepthError::UnknownInstrument(_))
    ));
    assert!(feed.subscribe(&btc()).await.is_err());
    assert!(feed.start().await.is_err());
    assert!(errors.lock().iter().all(|e| !e.is_fatal()));

    // Idempotent
    feed.stop().await;
}

#[tokio::test]
async fn test_snapshot_is_an_independent_copy() {
    let (transport, mut acceptor) = ChannelTransport::new();
    let source = Arc::new(ScriptedSnapshots::new().script(
        "BTCUSDT",
        vec![Ok(snapshot(
            300,
            &[("99.50", "1"), ("99.00", "2"), ("98.00", "3")],
            &[("100.50", "1"), ("101.00", "2")],
        ))],
    ));

    let feed = DepthFeed::builder(Binance::spot().with_endpoint("mem://binance"))
        .shared_snapshot_source(source as Arc<dyn SnapshotSource>)
        .transport(transport)
        .connection(fast_connection())
        .bootstrap(fast_bootstrap(3))
        .build()
        .unwrap();

    feed.start().await.unwrap();
    let mut peer = connect(&mut acceptor).await;
    feed.subscribe(&btc()).await.unwrap();
    next_text(&mut peer).await;

    peer.push_text(binance_update("BTCUSDT", 301, 301, &[], &[]));
    assert!(eventually(WAIT, || feed.snapshot(&btc()).is_ok()).await);

    let before = feed.snapshot(&btc()).unwrap();
    let bids: Vec<_> = before.bids.iter().map(|l| l.price).collect();
    assert_eq!(bids, vec![dec("99.50"), dec("99.00"), dec("98.00")]);
    let asks: Vec<_> = before.asks.iter().map(|l| l.price).collect();
    assert_eq!(asks, vec![dec("100.50"), dec("101.00")]);
    assert_eq!(before.best_bid().unwrap().price, dec("99.50"));
    assert_eq!(before.spread(), Some(dec("1.00")));

    peer.push_text(binance_update("BTCUSDT", 302, 302, &[("99.50", "0")], &[]));
    assert!(
        eventually(WAIT, || feed
            .snapshot(&btc())
            .is_ok_and(|depth| depth.sequence == 302))
        .await
    );

    // The earlier copy is unaffected by later deltas
    assert_eq!(before.bids.len(), 3);
    assert_eq!(feed.snapshot(&btc()).unwrap().bids.len(), 2);

    feed.stop().await;
}
