//! Failure-path behavior: oversize documents, operations out of order,
//! unknown names.

mod support;

use serde_json::json;
use sharingway::{Error, Provider, SharedRegion, Subscriber};
use support::{test_config, unique_name};

#[test]
fn oversize_publish_fails_and_keeps_prior_snapshot() {
    let name = unique_name("oversize");
    let mut provider =
        Provider::with_config(&name, "small channel", &[], test_config()).expect("construct");
    // Small channel so the test does not shuffle a megabyte around.
    provider.initialize(Some(8192)).expect("initialize");

    provider.publish(&json!({"keep": true})).expect("small publish");

    let blob = json!({ "data": "z".repeat(9000) });
    match provider.publish(&blob) {
        Err(Error::Oversize { capacity, .. }) => assert_eq!(capacity, 8192),
        other => panic!("expected Oversize, got {other:?}"),
    }

    // Prior snapshot is untouched.
    let ns = sharingway::Namespace::new(sharingway::NamespacePolicy::Disable);
    let region = SharedRegion::attach(&ns, &name, 8192).expect("attach region");
    assert_eq!(region.read().expect("read"), Some(json!({"keep": true})));
}

#[test]
fn publish_before_initialize_is_not_initialized() {
    let name = unique_name("early-publish");
    let provider =
        Provider::with_config(&name, "never initialized", &[], test_config()).expect("construct");

    assert!(!provider.is_online());
    match provider.publish(&json!({"x": 1})) {
        Err(Error::NotInitialized) => {}
        other => panic!("expected NotInitialized, got {other:?}"),
    }
}

#[test]
fn subscribe_before_initialize_is_not_initialized() {
    let subscriber = Subscriber::with_config(test_config());
    match subscriber.subscribe(&unique_name("too-soon")) {
        Err(Error::NotInitialized) => {}
        other => panic!("expected NotInitialized, got {other:?}"),
    }
}

#[test]
fn unsubscribe_unknown_name_is_not_found() {
    let mut subscriber = Subscriber::with_config(test_config());
    subscriber.initialize().expect("initialize");

    match subscriber.unsubscribe("never-subscribed") {
        Err(Error::NotFound(name)) => assert_eq!(name, "never-subscribed"),
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[test]
fn available_providers_works_without_initialize() {
    let name = unique_name("discoverable");
    let mut provider =
        Provider::with_config(&name, "discover me", &[], test_config()).expect("construct");
    provider.initialize(None).expect("initialize");

    // Uninitialized subscriber falls back to a throwaway registry handle.
    let subscriber = Subscriber::with_config(test_config());
    let listed = subscriber.available_providers();
    assert!(listed.iter().any(|p| p.name == name));
}

#[test]
fn provider_name_accessor_roundtrips() {
    let name = unique_name("named");
    let provider =
        Provider::with_config(&name, "has a name", &[], test_config()).expect("construct");
    assert_eq!(provider.name(), name);
}
