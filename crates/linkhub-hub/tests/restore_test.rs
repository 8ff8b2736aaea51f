//! Restart-time bulk restoration tests

mod support;

use std::sync::Arc;

use linkhub_store::LinkConfigRecord;

use support::{test_hub, test_hub_in, FakeRuntime};

fn stored_record(name: &str) -> LinkConfigRecord {
    LinkConfigRecord {
        name: name.to_string(),
        domain_regex: format!("^({}\\.example\\.com)$", name),
        remote_pub_key: format!("REMOTE-{}", name),
        link_wg_key: format!("PRIV-{}", name),
        link_wg_pubkey: format!("PUB-{}", name),
        wg_port: Some(40001),
        udp_proxy_port: Some(40002),
        udp_proxy_port_2: Some(40003),
    }
}

#[tokio::test]
async fn test_first_run_creates_record_directory() {
    let hub = test_hub(FakeRuntime::new());
    assert!(!hub.service.store().base_dir().exists());

    let report = hub.service.start_or_restore().await.unwrap();

    assert!(hub.service.store().base_dir().exists());
    assert!(report.restored.is_empty());
    assert!(report.failed.is_empty());
}

#[tokio::test]
async fn test_restore_recreates_lost_container_with_stored_ports() {
    // First life: persist a record, then simulate host restart with
    // container loss (fresh runtime, same record directory).
    let first = test_hub(FakeRuntime::new());
    first.service.start_or_restore().await.unwrap();
    first.service.store().write(&stored_record("alice")).unwrap();

    let restarted = test_hub_in(first.temp, Arc::new(FakeRuntime::new()));
    let report = restarted.service.start_or_restore().await.unwrap();

    assert_eq!(report.restored, vec!["alice"]);
    assert!(report.failed.is_empty());
    assert!(restarted.runtime.contains("alice"));

    // The recreated container pinned the stored host ports instead of
    // letting the host assign new ones, and reused the stored keypair.
    let specs = restarted.runtime.run_specs();
    assert_eq!(specs.len(), 1);
    let ports: std::collections::HashMap<_, _> = specs[0]
        .ports
        .iter()
        .map(|p| (p.container_port.as_str(), p.host_port))
        .collect();
    assert_eq!(ports.get("18521/udp"), Some(&Some(40001)));
    assert_eq!(restarted.keygen.generated(), 0);

    let record = restarted.service.store().read("alice").unwrap();
    assert_eq!(record.wg_port, Some(40001));
    assert_eq!(record.link_wg_pubkey, "PUB-alice");
}

#[tokio::test]
async fn test_restore_skips_links_whose_container_survived() {
    let first = test_hub(FakeRuntime::new());
    first.service.start_or_restore().await.unwrap();
    first
        .service
        .provision_link("alice", &["alice.example.com".to_string()], "PUBKEYX")
        .await
        .unwrap();

    // Restart against the same runtime: the container survived and the
    // record matches, so nothing is recreated.
    let runtime = Arc::clone(&first.runtime);
    let runs_before = runtime.run_count();
    let restarted = test_hub_in(first.temp, runtime);
    let report = restarted.service.start_or_restore().await.unwrap();

    assert_eq!(report.restored, vec!["alice"]);
    assert_eq!(restarted.runtime.run_count(), runs_before);
    assert!(restarted.runtime.removed().is_empty());
}

#[tokio::test]
async fn test_one_failing_link_does_not_abort_the_rest() {
    let first = test_hub(FakeRuntime::new());
    first.service.start_or_restore().await.unwrap();
    first.service.store().write(&stored_record("alpha")).unwrap();
    first.service.store().write(&stored_record("bravo")).unwrap();
    first.service.store().write(&stored_record("charlie")).unwrap();

    let runtime = Arc::new(FakeRuntime::new());
    runtime.fail_find_for("bravo");
    let restarted = test_hub_in(first.temp, runtime);

    let report = restarted.service.start_or_restore().await.unwrap();

    assert_eq!(report.restored, vec!["alpha", "charlie"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "bravo");
    assert!(restarted.runtime.contains("alpha"));
    assert!(restarted.runtime.contains("charlie"));
}
