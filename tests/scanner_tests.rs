mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{StallingDialer, StallingResolver, TimedDialer};
use nettools_rs::error::ScanError;
use nettools_rs::normalize::{normalize_request, RawScanRequest};
use nettools_rs::scanner::{scan, scan_with_cancel, scan_with_dialer, ScanConfig};
use nettools_rs::types::{PortStatus, ScanPlan, ScanReport};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

fn fast_config(batch_size: usize) -> ScanConfig {
    ScanConfig::new(batch_size, Duration::from_millis(500))
}

async fn listener() -> (TcpListener, u16) {
    let l = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = l.local_addr().expect("addr").port();
    (l, port)
}

fn assert_well_formed(report: &ScanReport, plan: &ScanPlan) {
    let ports: Vec<u16> = report.results.iter().map(|r| r.port).collect();
    let expected: Vec<u16> = (plan.start_port..=plan.end_port).collect();
    assert_eq!(ports, expected, "contiguous, ascending, no duplicates");

    let mut cursor = report.results.iter();
    for open in &report.open_ports {
        assert_eq!(open.status, PortStatus::Open);
        assert!(
            cursor.any(|r| r == open),
            "open port {} missing from results or out of order",
            open.port
        );
    }
    let open_in_results = report.results.iter().filter(|r| r.status.is_open()).count();
    assert_eq!(open_in_results, report.open_ports.len());
}

#[tokio::test]
async fn listening_port_is_open() {
    let (_l, port) = listener().await;
    let plan = ScanPlan {
        host: "127.0.0.1".into(),
        start_port: port,
        end_port: port,
    };
    let report = scan(&plan, &fast_config(50)).await.expect("scan ok");

    assert_eq!(report.host, "127.0.0.1");
    assert_eq!(report.scanned, format!("{port}-{port}"));
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.open_ports.len(), 1);
    assert_eq!(report.open_ports[0].port, port);
}

#[tokio::test]
async fn results_are_ordered_across_batches() {
    let (_l, port) = listener().await;
    let plan = ScanPlan {
        host: "127.0.0.1".into(),
        start_port: port - 4,
        end_port: port + 4,
    };
    // 9 ports in batches of 2 -> 5 batches
    let report = scan(&plan, &fast_config(2)).await.expect("scan ok");

    assert_eq!(report.results.len(), 9);
    assert_well_formed(&report, &plan);
    assert!(report.open_ports.iter().any(|r| r.port == port));
    assert_eq!(report.results[4].status, PortStatus::Open);
}

#[tokio::test]
async fn closed_port_has_no_service_label() {
    // Bind then drop to get a port that is almost certainly closed.
    let (l, port) = listener().await;
    drop(l);
    let plan = ScanPlan {
        host: "127.0.0.1".into(),
        start_port: port,
        end_port: port,
    };
    let report = scan(&plan, &fast_config(50)).await.expect("scan ok");
    assert_eq!(report.results[0].status, PortStatus::Closed);
    assert_eq!(report.results[0].service, "");
    assert!(report.open_ports.is_empty());
}

#[tokio::test]
async fn unresolvable_host_reports_every_port_closed() {
    let plan = ScanPlan {
        host: "no-such-host.invalid".into(),
        start_port: 20,
        end_port: 30,
    };
    let report = scan(&plan, &fast_config(50)).await.expect("scan ok");
    assert_eq!(report.results.len(), 11);
    assert!(report.results.iter().all(|r| r.status == PortStatus::Closed));
    assert!(report.open_ports.is_empty());
}

#[tokio::test]
async fn repeated_scans_agree() {
    let (_l, port) = listener().await;
    let plan = ScanPlan {
        host: "127.0.0.1".into(),
        start_port: port,
        end_port: port + 2,
    };
    let cfg = fast_config(50);
    let first = scan(&plan, &cfg).await.expect("scan ok");
    let second = scan(&plan, &cfg).await.expect("scan ok");
    assert_eq!(first.open_ports, second.open_ports);
}

#[tokio::test]
async fn cancelled_scan_is_aborted() {
    let plan = ScanPlan {
        host: "127.0.0.1".into(),
        start_port: 1,
        end_port: 201,
    };
    let cancel = CancellationToken::new();
    cancel.cancel();
    let res = scan_with_cancel(&plan, &fast_config(50), cancel).await;
    assert!(matches!(res, Err(ScanError::Aborted)));
}

#[tokio::test]
async fn url_like_request_scans_clean_host() {
    let (_l, port) = listener().await;
    let req = RawScanRequest {
        host: Some(format!("http://127.0.0.1:{port}/status?x=1")),
        start_port: Some(json!(port.to_string())),
        end_port: Some(json!(port)),
    };
    let plan = normalize_request(&req).expect("valid request");
    let report = scan(&plan, &fast_config(50)).await.expect("scan ok");
    assert_eq!(report.host, "127.0.0.1");
    assert_eq!(report.open_ports.len(), 1);
}

#[tokio::test]
async fn cancel_mid_batch_aborts_in_flight_connects() {
    let dialer = Arc::new(StallingDialer::default());
    let in_flight = Arc::clone(&dialer.in_flight);
    let plan = ScanPlan {
        host: "127.0.0.1".into(),
        start_port: 1,
        end_port: 120,
    };
    let cancel = CancellationToken::new();
    let task = tokio::spawn({
        let cancel = cancel.clone();
        async move { scan_with_dialer(&plan, &fast_config(50), cancel, dialer).await }
    });

    tokio::time::timeout(Duration::from_secs(2), async {
        while in_flight.load(Ordering::SeqCst) < 50 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("first batch never filled");
    assert_eq!(in_flight.load(Ordering::SeqCst), 50, "only one batch at a time");

    cancel.cancel();
    let res = tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("scan did not stop after cancel")
        .expect("scan task panicked");
    assert!(matches!(res, Err(ScanError::Aborted)));

    tokio::time::timeout(Duration::from_secs(1), async {
        while in_flight.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("connect attempts still running after cancel");
}

#[tokio::test]
async fn cancel_during_name_resolution_aborts() {
    let plan = ScanPlan {
        host: "slow.example".into(),
        start_port: 1,
        end_port: 10,
    };
    let cancel = CancellationToken::new();
    let task = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            scan_with_dialer(&plan, &fast_config(50), cancel, Arc::new(StallingResolver)).await
        }
    });

    tokio::time::sleep(Duration::from_millis(30)).await;
    cancel.cancel();
    let res = tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("scan did not stop after cancel")
        .expect("scan task panicked");
    assert!(matches!(res, Err(ScanError::Aborted)));
}

#[tokio::test]
async fn batches_cap_concurrency_and_run_in_sequence() {
    let dialer = Arc::new(TimedDialer::new(Duration::from_millis(15)));
    let plan = ScanPlan {
        host: "127.0.0.1".into(),
        start_port: 100,
        end_port: 122,
    };
    let report = scan_with_dialer(
        &plan,
        &fast_config(5),
        CancellationToken::new(),
        dialer.clone(),
    )
    .await
    .expect("scan ok");

    assert_well_formed(&report, &plan);
    let open: Vec<u16> = report.open_ports.iter().map(|r| r.port).collect();
    assert_eq!(open, vec![105, 112, 119]);
    assert_eq!(dialer.peak.load(Ordering::SeqCst), 5);

    let attempts = dialer.attempts.lock().unwrap().clone();
    assert_eq!(attempts.len(), 23);
    // 23 ports in batches of 5 -> 5 batches, the last holding 3 ports
    let batch_of = |port: u16| usize::from(port - plan.start_port) / 5;
    for n in 0..4 {
        let last_end = attempts
            .iter()
            .filter(|a| batch_of(a.port) == n)
            .map(|a| a.finished)
            .max()
            .unwrap();
        let next_start = attempts
            .iter()
            .filter(|a| batch_of(a.port) == n + 1)
            .map(|a| a.started)
            .min()
            .unwrap();
        assert!(
            next_start >= last_end,
            "batch {} started before batch {n} finished",
            n + 1
        );
    }
}
