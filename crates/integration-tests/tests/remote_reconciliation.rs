//! Reconciliation of the device cart with a signed-in user's remote cart.
//!
//! Run with: cargo test -p storehouse-integration-tests

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use storehouse_cart::{AdditiveMerge, DEFAULT_STORAGE_KEY, DeviceStore, SyncOperation};
use storehouse_core::{Cart, ProductId, UserId};
use storehouse_integration_tests::{TestContext, cart};

fn user() -> UserId {
    UserId::new("cust_42")
}

#[tokio::test]
async fn test_unavailable_remote_returns_device_cart_unmodified() {
    let ctx = TestContext::signed_in("cust_42");
    ctx.write_device_payload(r#"{"a":2}"#).unwrap();
    ctx.remote.set_offline(true);
    let sync = ctx.synchronizer();

    let loaded = sync.load_user_cart().await;

    assert_eq!(loaded, cart(&[("a", 2)]));
    assert_eq!(
        ctx.device.get(DEFAULT_STORAGE_KEY).unwrap().as_deref(),
        Some(r#"{"a":2}"#)
    );
    assert_eq!(ctx.failures().len(), 1);
    assert_eq!(ctx.failures()[0].operation, SyncOperation::Probe);
}

#[tokio::test]
async fn test_first_login_seeds_remote_from_device() {
    let ctx = TestContext::signed_in("cust_42");
    ctx.write_device_payload(r#"{"a":2}"#).unwrap();
    let sync = ctx.synchronizer();

    let loaded = sync.load_user_cart().await;

    assert_eq!(loaded, cart(&[("a", 2)]));
    assert_eq!(ctx.remote.cart_for(&user()), Some(cart(&[("a", 2)])));
    assert!(ctx.failures().is_empty());
}

#[tokio::test]
async fn test_existing_remote_record_overwrites_device() {
    let ctx = TestContext::signed_in("cust_42");
    ctx.write_device_payload(r#"{"a":2}"#).unwrap();
    ctx.remote.insert_cart(&user(), &cart(&[("b", 1)]));
    let sync = ctx.synchronizer();

    let loaded = sync.load_user_cart().await;

    assert_eq!(loaded, cart(&[("b", 1)]));
    assert_eq!(sync.get_cart(), cart(&[("b", 1)]));
    assert_eq!(
        Cart::from_json(&ctx.device.get(DEFAULT_STORAGE_KEY).unwrap().unwrap()).unwrap(),
        cart(&[("b", 1)])
    );
}

#[tokio::test]
async fn test_additive_merge_sums_and_pushes() {
    let ctx = TestContext::signed_in("cust_42");
    ctx.write_device_payload(r#"{"a":2,"b":1}"#).unwrap();
    ctx.remote.insert_cart(&user(), &cart(&[("b", 1), ("c", 3)]));
    let sync = ctx.synchronizer_with(Arc::new(AdditiveMerge));

    let loaded = sync.load_user_cart().await;

    let expected = cart(&[("a", 2), ("b", 2), ("c", 3)]);
    assert_eq!(loaded, expected);
    assert_eq!(ctx.remote.cart_for(&user()), Some(expected));
}

#[tokio::test]
async fn test_additive_merge_repeated_activation_keeps_cart() {
    let ctx = TestContext::signed_in("cust_42");
    ctx.write_device_payload(r#"{"a":2,"b":1}"#).unwrap();
    ctx.remote.insert_cart(&user(), &cart(&[("b", 1)]));
    let sync = ctx.synchronizer_with(Arc::new(AdditiveMerge));

    let loaded = sync.load_user_cart().await;
    let first = sync.on_activation().await;
    let second = sync.on_activation().await;

    let expected = cart(&[("a", 2), ("b", 2)]);
    assert_eq!(loaded, expected);
    assert_eq!(first, expected);
    assert_eq!(second, expected);
    assert_eq!(ctx.remote.cart_for(&user()), Some(expected.clone()));

    // A fresh page load on the same device reads the stored baseline
    let reloaded = ctx.synchronizer_with(Arc::new(AdditiveMerge));
    assert_eq!(reloaded.on_activation().await, expected);
    assert!(ctx.failures().is_empty());
}

#[tokio::test]
async fn test_last_writer_wins_repeated_activation_keeps_cart() {
    let ctx = TestContext::signed_in("cust_42");
    ctx.write_device_payload(r#"{"a":2,"b":1}"#).unwrap();
    ctx.remote.insert_cart(&user(), &cart(&[("b", 1)]));
    let sync = ctx.synchronizer();

    let loaded = sync.load_user_cart().await;
    let first = sync.on_activation().await;
    let second = sync.on_activation().await;

    assert_eq!(loaded, cart(&[("b", 1)]));
    assert_eq!(first, loaded);
    assert_eq!(second, loaded);
    assert_eq!(ctx.remote.cart_for(&user()), Some(loaded));
    assert_eq!(ctx.remote.upsert_count(), 0);
}

#[tokio::test]
async fn test_additive_merge_counts_each_device_edit_once() {
    let laptop = TestContext::signed_in("cust_42");
    let phone = laptop.another_device();
    let laptop_sync = laptop.synchronizer_with(Arc::new(AdditiveMerge));
    let phone_sync = phone.synchronizer_with(Arc::new(AdditiveMerge));

    laptop_sync.add_to_cart(ProductId::new("a"), 1);
    laptop_sync.flush().await;
    assert_eq!(phone_sync.load_user_cart().await, cart(&[("a", 1)]));

    phone_sync.add_to_cart(ProductId::new("b"), 1);
    phone_sync.flush().await;

    let expected = cart(&[("a", 1), ("b", 1)]);
    for _ in 0..2 {
        assert_eq!(laptop_sync.on_activation().await, expected);
        assert_eq!(phone_sync.on_activation().await, expected);
    }
    assert_eq!(laptop.remote.cart_for(&user()), Some(expected));
}

#[tokio::test]
async fn test_missing_table_is_provisioned_on_first_write() {
    let ctx = TestContext::signed_in("cust_42");
    ctx.remote.set_table_missing(true);
    let sync = ctx.synchronizer();

    sync.add_to_cart(ProductId::new("a"), 1);
    sync.flush().await;

    assert_eq!(ctx.remote.provision_count(), 1);
    assert_eq!(ctx.remote.upsert_count(), 2);
    assert_eq!(ctx.remote.cart_for(&user()), Some(cart(&[("a", 1)])));
    assert!(ctx.failures().is_empty());
}

#[tokio::test]
async fn test_background_push_failure_reaches_hook() {
    let ctx = TestContext::signed_in("cust_42");
    ctx.remote.set_offline(true);
    let sync = ctx.synchronizer();

    let returned = sync.add_to_cart(ProductId::new("a"), 1);
    sync.flush().await;

    assert_eq!(returned, cart(&[("a", 1)]));
    assert_eq!(sync.get_cart(), cart(&[("a", 1)]));
    let failures = ctx.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].operation, SyncOperation::Upsert);
    assert_eq!(failures[0].user, Some(user()));
}

#[tokio::test]
async fn test_remote_recovers_after_outage() {
    let ctx = TestContext::signed_in("cust_42");
    ctx.remote.set_offline(true);
    let sync = ctx.synchronizer();
    sync.add_to_cart(ProductId::new("a"), 1);
    sync.flush().await;

    ctx.remote.set_offline(false);
    sync.add_to_cart(ProductId::new("a"), 1);
    sync.flush().await;

    assert_eq!(ctx.remote.cart_for(&user()), Some(cart(&[("a", 2)])));
}

#[tokio::test]
async fn test_anonymous_session_never_touches_remote() {
    let ctx = TestContext::new();
    let sync = ctx.synchronizer();

    sync.add_to_cart(ProductId::new("a"), 1);
    sync.load_user_cart().await;
    sync.flush().await;

    assert!(ctx.user().is_none());
    assert_eq!(ctx.remote.fetch_count(), 0);
    assert_eq!(ctx.remote.upsert_count(), 0);
}

#[tokio::test]
async fn test_cross_device_continuity() {
    // Two devices, one user: the second device picks up the first's cart
    let laptop = TestContext::signed_in("cust_42");
    let phone = laptop.another_device();

    let laptop_sync = laptop.synchronizer();
    laptop_sync.add_to_cart(ProductId::new("a"), 3);
    laptop_sync.flush().await;

    let phone_sync = phone.synchronizer();
    phone.write_device_payload(r#"{"stale":1}"#).unwrap();
    assert_eq!(phone_sync.load_user_cart().await, cart(&[("a", 3)]));
}
