//! Registry behavior across provider lifecycles and boot races.

mod support;

use std::sync::mpsc;
use std::time::Duration;

use serde_json::json;
use sharingway::{Provider, ProviderStatus, Registry, Subscriber};
use support::{test_config, unique_name, wait_for};

#[test]
fn registered_provider_is_listed_with_metadata() {
    let name = unique_name("listed");
    let capabilities = vec!["temperature".to_string(), "humidity".to_string()];
    let mut provider =
        Provider::with_config(&name, "a weather sensor", &capabilities, test_config())
            .expect("construct provider");
    provider.initialize(None).expect("initialize");

    let registry = Registry::with_config(test_config()).expect("attach registry");
    let entry = registry
        .list()
        .into_iter()
        .find(|p| p.name == name)
        .expect("provider listed");

    assert_eq!(entry.status, ProviderStatus::Online);
    assert_eq!(entry.description, "a weather sensor");
    assert_eq!(entry.capabilities, capabilities);
    assert!(entry.last_update > 0);
    assert!(entry.last_heartbeat > 0);
}

#[test]
fn shutdown_marks_entry_offline_but_keeps_it() {
    let name = unique_name("keeps");
    let mut provider =
        Provider::with_config(&name, "short-lived", &[], test_config()).expect("construct");
    provider.initialize(None).expect("initialize");
    provider.publish(&json!({"v": 1})).expect("publish");
    provider.shutdown();

    let registry = Registry::with_config(test_config()).expect("attach registry");
    let entry = registry
        .list()
        .into_iter()
        .find(|p| p.name == name)
        .expect("entry survives shutdown");
    assert_eq!(entry.status, ProviderStatus::Offline);
}

#[test]
fn restarted_provider_reports_online_to_status_handler() {
    let name = unique_name("restart");

    // First incarnation comes and goes.
    let mut first =
        Provider::with_config(&name, "incarnation 1", &[], test_config()).expect("construct");
    first.initialize(None).expect("initialize");
    first.shutdown();

    let mut subscriber = Subscriber::with_config(test_config());
    subscriber.initialize().expect("initialize subscriber");
    let (tx, rx) = mpsc::channel::<(String, ProviderStatus)>();
    subscriber.set_status_handler(Box::new(move |provider, status| {
        let _ = tx.send((provider.to_string(), status));
    }));

    // Second incarnation registers again; the registry pulse must surface
    // the name as online to the status handler.
    let mut second =
        Provider::with_config(&name, "incarnation 2", &[], test_config()).expect("reconstruct");
    second.initialize(None).expect("reinitialize");

    let observed = wait_for(&rx, Duration::from_secs(3), |(n, status)| {
        n == &name && *status == ProviderStatus::Online
    });
    assert!(observed.is_some(), "status handler saw the provider online");

    let entry = second_registry_entry(&name);
    assert_eq!(entry, ProviderStatus::Online);
}

fn second_registry_entry(name: &str) -> ProviderStatus {
    let registry = Registry::with_config(test_config()).expect("attach registry");
    registry
        .list()
        .into_iter()
        .find(|p| p.name == name)
        .expect("entry present")
        .status
}

#[test]
fn concurrent_initialize_is_race_free() {
    // Two "processes" bootstrap the registry at once; both must succeed and
    // leave the document decodable.
    let mut handles = Vec::new();
    for _ in 0..2 {
        handles.push(std::thread::spawn(|| {
            let registry = Registry::with_config(test_config())?;
            registry.initialize()?;
            Ok::<_, sharingway::Error>(registry)
        }));
    }

    let registries: Vec<Registry> = handles
        .into_iter()
        .map(|h| h.join().expect("no panic").expect("initialize succeeded"))
        .collect();

    for registry in &registries {
        // A decodable (possibly empty) map; listing must not error out.
        let _ = registry.list();
        // And re-initializing is a no-op success.
        registry.initialize().expect("idempotent initialize");
    }
}

#[test]
fn update_status_on_unknown_name_is_not_found() {
    let registry = Registry::with_config(test_config()).expect("attach registry");
    registry.initialize().expect("initialize");

    match registry.update_status(&unique_name("ghost"), ProviderStatus::Error) {
        Err(sharingway::Error::NotFound(_)) => {}
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[test]
fn remove_deletes_the_entry() {
    let name = unique_name("removed");
    let registry = Registry::with_config(test_config()).expect("attach registry");
    registry.initialize().expect("initialize");
    registry
        .register(&name, "to be removed", &[])
        .expect("register");

    assert!(registry.list().iter().any(|p| p.name == name));
    registry.remove(&name).expect("remove");
    assert!(!registry.list().iter().any(|p| p.name == name));

    // Removing an absent name still succeeds.
    registry.remove(&name).expect("remove absent");
}

#[test]
fn stale_heartbeats_can_be_listed_as_offline() {
    use sharingway::Config;

    let name = unique_name("stale");
    let registry = Registry::with_config(test_config()).expect("attach registry");
    registry.initialize().expect("initialize");
    registry.register(&name, "going quiet", &[]).expect("register");

    let strict = Registry::with_config(Config {
        stale_after: Some(Duration::from_millis(50)),
        ..test_config()
    })
    .expect("attach strict registry");

    std::thread::sleep(Duration::from_millis(120));
    let entry = strict
        .list()
        .into_iter()
        .find(|p| p.name == name)
        .expect("entry present");
    assert_eq!(
        entry.status,
        ProviderStatus::Offline,
        "heartbeat older than the threshold reads as offline"
    );
}
