use nettools_rs::normalize::{clean_host, normalize_request, RawScanRequest};
use serde_json::json;

fn request(body: serde_json::Value) -> RawScanRequest {
    serde_json::from_value(body).expect("deserialize")
}

#[test]
fn huge_range_is_capped_at_201_ports() {
    let plan = normalize_request(&request(json!({
        "host": "127.0.0.1", "startPort": 1, "endPort": 10000
    })))
    .expect("valid");
    assert_eq!((plan.start_port, plan.end_port), (1, 201));
    assert_eq!(plan.port_count(), 201);
}

#[test]
fn out_of_bounds_ports_are_clamped() {
    let plan = normalize_request(&request(json!({
        "host": "127.0.0.1", "startPort": 65500, "endPort": 70000
    })))
    .expect("valid");
    assert_eq!(plan.end_port, 65535);

    let plan = normalize_request(&request(json!({
        "host": "127.0.0.1", "startPort": -10, "endPort": 20
    })))
    .expect("valid");
    assert_eq!(plan.start_port, 1);
}

#[test]
fn form_strings_and_defaults() {
    let plan = normalize_request(&request(json!({
        "host": "example.com", "startPort": "20", "endPort": "25"
    })))
    .expect("valid");
    assert_eq!((plan.start_port, plan.end_port), (20, 25));

    let plan = normalize_request(&request(json!({ "host": "example.com" }))).expect("valid");
    assert_eq!((plan.start_port, plan.end_port), (1, 201));
}

#[test]
fn url_host_normalizes() {
    assert_eq!(clean_host("https://example.com:443/path").unwrap(), "example.com");
}

#[test]
fn blank_host_rejected() {
    assert!(normalize_request(&request(json!({ "host": "   " }))).is_err());
}
