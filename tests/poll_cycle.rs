//! Full poll cycles against an in-process fake inverter.

mod common;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::FakeDevice;
use ensolarx_modbus::{
    CoordinatorConfig, CycleEvent, DataType, DescriptorOutcome, DescriptorTable, ModbusClient,
    ModbusError, PollCoordinator, Reading, RegisterBank, RegisterDescriptor, WordOrder,
};
use tokio_test::{assert_err, assert_ok};

fn table() -> DescriptorTable {
    DescriptorTable::from_records(vec![
        RegisterDescriptor::new("battery_voltage", 17, DataType::Uint16)
            .with_scale(0.1, Some(1))
            .with_unit("V"),
        RegisterDescriptor::new("battery_current", 18, DataType::Int16).with_scale(0.1, Some(1)),
        RegisterDescriptor::new("pv_energy_total", 200, DataType::Uint32).with_word_swap(true),
    ])
    .unwrap()
}

fn holding() -> HashMap<u16, u16> {
    let [lo, hi] = WordOrder::LowFirst.split(0x0001_0002);
    HashMap::from([(17, 523), (18, 0xFFF6), (200, lo), (201, hi)])
}

fn coordinator(device: &FakeDevice, table: DescriptorTable) -> PollCoordinator {
    let config = CoordinatorConfig::new("127.0.0.1", device.port, 18)
        .with_timeout(Duration::from_millis(300))
        .with_retry(2, Duration::from_millis(10));
    PollCoordinator::new(config, table).unwrap()
}

#[tokio::test]
async fn test_cycle_decodes_all_registers() {
    let online = Arc::new(AtomicBool::new(true));
    let device = FakeDevice::with_registers(holding(), HashMap::new(), online).await;
    let mut coordinator = coordinator(&device, table());

    let snapshot = assert_ok!(coordinator.poll_cycle().await);
    assert_eq!(snapshot.get("battery_voltage"), Some(Reading::Float(52.3)));
    assert_eq!(snapshot.get("17"), Some(Reading::Float(52.3)));
    assert_eq!(snapshot.get("battery_current"), Some(Reading::Float(-1.0)));
    assert_eq!(snapshot.get("pv_energy_total"), Some(Reading::Int(0x0001_0002)));
    assert_eq!(snapshot.get("200"), Some(Reading::Int(0x0001_0002)));
    assert_eq!(snapshot.len(), 3);

    assert_eq!(
        snapshot.to_json()["battery_voltage"],
        serde_json::json!(52.3)
    );
    assert_eq!(device.connections(), 1);
}

#[tokio::test]
async fn test_unchanged_device_gives_equal_snapshots() {
    let online = Arc::new(AtomicBool::new(true));
    let device = FakeDevice::with_registers(holding(), HashMap::new(), online).await;
    let mut coordinator = coordinator(&device, table());

    let first = assert_ok!(coordinator.poll_cycle().await);
    let second = assert_ok!(coordinator.poll_cycle().await);
    assert_eq!(*first, *second);
    assert_eq!(second.cycle(), 2);
}

#[tokio::test]
async fn test_input_bank_fallback() {
    let online = Arc::new(AtomicBool::new(true));
    let input = HashMap::from([(30, 1234)]);
    let device = FakeDevice::with_registers(HashMap::new(), input, online).await;

    let table = DescriptorTable::from_records(vec![RegisterDescriptor::new(
        "grid_frequency",
        30,
        DataType::Uint16,
    )])
    .unwrap();
    let mut coordinator = coordinator(&device, table);
    let mut events = coordinator.handle().subscribe();

    let snapshot = assert_ok!(coordinator.poll_cycle().await);
    assert_eq!(snapshot.get("grid_frequency"), Some(Reading::Int(1234)));

    let functions: Vec<u8> = device.requests().iter().map(|r| r.function).collect();
    assert_eq!(functions, vec![0x03, 0x03, 0x04]);

    let event = assert_ok!(events.recv().await);
    let diagnostic = event.report().diagnostic("grid_frequency").unwrap();
    assert_eq!(diagnostic.tried, vec!["holding[1w]", "holding[1w]", "input[1w]"]);
    assert!(matches!(
        diagnostic.primary_error,
        Some(ModbusError::Exception { code: 0x02, .. })
    ));
    assert_eq!(diagnostic.outcome, DescriptorOutcome::Decoded);
}

#[tokio::test]
async fn test_both_banks_fail_reports_both_errors() {
    let online = Arc::new(AtomicBool::new(true));
    let device = FakeDevice::with_registers(holding(), HashMap::new(), online).await;

    let table = DescriptorTable::from_records(vec![
        RegisterDescriptor::new("battery_voltage", 17, DataType::Uint16),
        RegisterDescriptor::new("bms_state", 87, DataType::Uint16).with_bank(RegisterBank::Input),
    ])
    .unwrap();
    let mut coordinator = coordinator(&device, table);
    let mut events = coordinator.handle().subscribe();

    // input 87 missing, holding 87 missing too
    let snapshot = assert_ok!(coordinator.poll_cycle().await);
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot.get("bms_state"), None);

    let event = assert_ok!(events.recv().await);
    let diagnostic = event.report().diagnostic("bms_state").unwrap();
    assert_eq!(
        diagnostic.tried,
        vec!["input[1w]", "input[1w]", "holding[1w]", "holding[1w]"]
    );
    assert!(diagnostic.primary_error.is_some());
    assert!(diagnostic.fallback_error.is_some());
    assert_eq!(diagnostic.outcome, DescriptorOutcome::Absent);

    let line = diagnostic.to_string();
    assert!(line.contains("bms_state addr=87 dtype=uint16"), "{}", line);
    assert!(line.contains("DeviceExceptionError"), "{}", line);
    assert!(line.contains("unit_id=18"), "{}", line);
}

#[tokio::test]
async fn test_device_outage_backfills_then_recovers() {
    let online = Arc::new(AtomicBool::new(true));
    let device =
        FakeDevice::with_registers(holding(), HashMap::new(), Arc::clone(&online)).await;
    let mut coordinator = coordinator(&device, table());
    let mut events = coordinator.handle().subscribe();

    let first = assert_ok!(coordinator.poll_cycle().await);
    assert_ok!(events.recv().await);

    online.store(false, Ordering::SeqCst);
    let during = assert_ok!(coordinator.poll_cycle().await);
    assert_eq!(*first, *during);
    match assert_ok!(events.recv().await) {
        CycleEvent::Updated { report, .. } => {
            assert_eq!(report.backfilled, 3);
            assert_eq!(report.decoded, 0);
            assert_eq!(report.error_count(), 3);
        }
        other => panic!("unexpected event {:?}", other),
    }

    online.store(true, Ordering::SeqCst);
    let after = assert_ok!(coordinator.poll_cycle().await);
    assert_eq!(*first, *after);
    match assert_ok!(events.recv().await) {
        CycleEvent::Updated { report, .. } => assert_eq!(report.decoded, 3),
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_device_fails_cycle() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let config = CoordinatorConfig::new("127.0.0.1", port, 18)
        .with_timeout(Duration::from_millis(200))
        .with_retry(2, Duration::from_millis(10));
    let mut coordinator = PollCoordinator::new(config, table()).unwrap();
    let handle = coordinator.handle();

    let err = assert_err!(coordinator.poll_cycle().await);
    assert_eq!(err, ModbusError::CycleFailed { failures: 3 });
    assert!(handle.current_snapshot().is_none());
}

#[tokio::test]
async fn test_cancelled_cycle_keeps_registers_aligned() {
    let first = Arc::new(AtomicBool::new(true));
    let device = FakeDevice::start(move |req| {
        let reply = req.registers(&[req.address * 100]);
        if first.swap(false, Ordering::SeqCst) {
            reply.after(Duration::from_millis(300))
        } else {
            reply
        }
    })
    .await;

    let table = DescriptorTable::from_records(vec![
        RegisterDescriptor::new("one", 1, DataType::Uint16),
        RegisterDescriptor::new("two", 2, DataType::Uint16),
    ])
    .unwrap();
    let config = CoordinatorConfig::new("127.0.0.1", device.port, 18)
        .with_timeout(Duration::from_secs(2))
        .with_retry(2, Duration::from_millis(10));
    let mut coordinator = PollCoordinator::new(config, table).unwrap();

    let cancelled =
        tokio::time::timeout(Duration::from_millis(100), coordinator.poll_cycle()).await;
    assert!(cancelled.is_err());
    assert!(coordinator.handle().current_snapshot().is_none());

    let snapshot = assert_ok!(coordinator.poll_cycle().await);
    assert_eq!(snapshot.get("one"), Some(Reading::Int(100)));
    assert_eq!(snapshot.get("two"), Some(Reading::Int(200)));
}

#[tokio::test]
async fn test_unavailable_float_gives_equal_snapshots() {
    let device = FakeDevice::start(|req| req.registers(&[0xFFFF, 0xFFFF])).await;
    let table = DescriptorTable::from_records(vec![RegisterDescriptor::new(
        "grid_frequency",
        40,
        DataType::Float32,
    )])
    .unwrap();
    let mut coordinator = coordinator(&device, table);

    let first = assert_ok!(coordinator.poll_cycle().await);
    let second = assert_ok!(coordinator.poll_cycle().await);
    assert!(first.get("grid_frequency").unwrap().as_f64().is_nan());
    assert_eq!(*first, *second);
}

#[tokio::test]
async fn test_connection_failure_skips_rest_of_cycle() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let config = CoordinatorConfig::new("127.0.0.1", port, 18)
        .with_timeout(Duration::from_millis(200))
        .with_retry(2, Duration::from_millis(10));
    let mut coordinator = PollCoordinator::new(config, table()).unwrap();
    let mut events = coordinator.handle().subscribe();

    assert_err!(coordinator.poll_cycle().await);
    let event = assert_ok!(events.recv().await);
    let report = event.report();
    assert_eq!(report.diagnostic("battery_voltage").unwrap().tried, vec!["holding[1w]"]);
    for name in ["battery_current", "pv_energy_total"] {
        let diagnostic = report.diagnostic(name).unwrap();
        assert!(diagnostic.tried.is_empty(), "{:?}", diagnostic.tried);
        assert!(matches!(
            diagnostic.primary_error,
            Some(ModbusError::Connection { .. })
        ));
    }
    assert_eq!(coordinator.client().get_stats().connects, 0);
}
