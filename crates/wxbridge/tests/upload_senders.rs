//! Upload senders against localhost stand-ins: the APRS-IS exchange on
//! a raw socket and the two query-string services.

mod common;

use std::time::Duration;

use common::{capture_one_connection, populated_registry, StubService};
use wxbridge::units::{RainCollector, UnitPreferences};
use wxbridge::upload::{
    CwopSender, PwsSender, SendError, Sender, SenderSettings, SenderStatus, SenderVariant,
    SourceReadings, WundergroundSender, SOFTWARE_TYPE,
};

fn default_readings(registry: &wxbridge::SensorRegistry) -> SourceReadings<'_> {
    SourceReadings::new(
        registry,
        101,
        201,
        UnitPreferences::default(),
        RainCollector::HundredthInch,
    )
}

#[tokio::test]
async fn cwop_exchange_sends_login_then_packet() {
    let _ = env_logger::builder().is_test(true).try_init();
    let (port, capture) = capture_one_connection().await;

    let registry = populated_registry();
    let sender = CwopSender::new("KTEST", Some("127.0.0.1"), Some(port), 45.5, -122.33)
        .with_pause(Duration::from_millis(20));
    sender.send_update(&default_readings(&registry)).await.unwrap();

    let captured = capture.await.unwrap();
    assert!(captured.starts_with(&format!("user KTEST pass -1 vers {}\r\n", SOFTWARE_TYPE)));
    assert!(captured.contains("KTEST>APRS,TCPIP*:@"));
    assert!(captured.contains("4530.00N/12219.80W_"));
    assert!(captured.contains("270/010g015t073r000p025P025h40b09837"));
    assert!(captured.ends_with("\r\n"));
}

#[tokio::test]
async fn cwop_connect_failure_is_a_request_error() {
    let _ = env_logger::builder().is_test(true).try_init();
    // Reserve a port and close it again so the connect is refused.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let registry = populated_registry();
    let sender = CwopSender::new("KTEST", Some("127.0.0.1"), Some(port), 45.5, -122.33)
        .with_pause(Duration::from_millis(1));
    let err = sender
        .send_update(&default_readings(&registry))
        .await
        .unwrap_err();
    assert!(matches!(err, SendError::Io(_)));
    assert_eq!(SenderStatus::classify(&err), SenderStatus::RequestError);
}

#[tokio::test]
async fn wunderground_accepts_on_success_marker() {
    let _ = env_logger::builder().is_test(true).try_init();
    let stub = StubService::repeat("success\n", 1).await;

    let registry = populated_registry();
    let sender =
        WundergroundSender::new("KTEST", "secret", Some("127.0.0.1"), Some(stub.port)).unwrap();
    sender.send_update(&default_readings(&registry)).await.unwrap();

    let requests = stub.requests();
    assert_eq!(requests.len(), 1);
    let line = &requests[0];
    assert!(line.starts_with("GET /weatherstation/updateweatherstation.php?"));
    assert!(line.contains("ID=KTEST"));
    assert!(line.contains("PASSWORD=secret"));
    assert!(line.contains("action=updateraw"));
    assert!(line.contains("tempf=72.5"));
    assert!(line.contains("dewptf=54.3"));
    assert!(line.contains("baromin=29.05"));
    assert!(line.contains("humidity=40"));
    assert!(line.contains("windspeedmph=8.0"));
    assert!(line.contains("winddir=265"));
    // Gusts were never cached for the 10-minute window keys.
    assert!(!line.contains("windgustmph"));
}

#[tokio::test]
async fn wunderground_rejection_is_a_data_error() {
    let _ = env_logger::builder().is_test(true).try_init();
    let stub = StubService::repeat("INVALIDPASSWORDID|Password and/or id are incorrect", 1).await;

    let registry = populated_registry();
    let sender =
        WundergroundSender::new("KTEST", "wrong", Some("127.0.0.1"), Some(stub.port)).unwrap();
    let err = sender
        .send_update(&default_readings(&registry))
        .await
        .unwrap_err();
    match &err {
        SendError::Provider(body) => assert!(body.contains("INVALIDPASSWORDID")),
        other => panic!("expected Provider error, got {:?}", other),
    }
    assert_eq!(SenderStatus::classify(&err), SenderStatus::DataError);
}

#[tokio::test]
async fn pws_accepts_on_logged_marker() {
    let _ = env_logger::builder().is_test(true).try_init();
    let stub = StubService::repeat("Data Logged and posted in METAR block.\n", 1).await;

    let registry = populated_registry();
    let sender =
        PwsSender::new("MYSTATION", "secret", Some("127.0.0.1"), Some(stub.port)).unwrap();
    sender.send_update(&default_readings(&registry)).await.unwrap();

    let requests = stub.requests();
    assert_eq!(requests.len(), 1);
    let line = &requests[0];
    assert!(line.starts_with("GET /pwsupdate/pwsupdate.php?"));
    assert!(line.contains("ID=MYSTATION"));
    assert!(line.contains("rainin=0.00"));
    assert!(line.contains("dailyrainin=0.25"));
}

#[tokio::test]
async fn sender_wrapper_schedules_and_reports_ok() {
    let _ = env_logger::builder().is_test(true).try_init();
    let stub = StubService::repeat("success\n", 1).await;

    let registry = populated_registry();
    let settings = SenderSettings {
        name: "KTEST (Weather Underground)".to_string(),
        update_interval: Duration::from_secs(600),
        iss_lsid: 101,
        baro_lsid: 201,
        units: UnitPreferences::default(),
        collector: RainCollector::HundredthInch,
    };
    let variant = SenderVariant::Wunderground(
        WundergroundSender::new("KTEST", "secret", Some("127.0.0.1"), Some(stub.port)).unwrap(),
    );
    let mut sender = Sender::new(settings, variant);

    let status = sender.maybe_send(5000, &registry).await;
    assert_eq!(status, SenderStatus::Ok);
    assert_eq!(sender.status(), SenderStatus::Ok);
    assert_eq!(sender.next_update(), 5600);
    assert_eq!(stub.request_count(), 1);
}
