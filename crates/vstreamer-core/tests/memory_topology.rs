// crates/vstreamer-core/tests/memory_topology.rs
// ============================================================================
// Module: Memory Topology Tests
// Description: Watch delivery contract of the in-memory topology.
// Purpose: Validate initial delivery, ordering, and error pass-through.
// Dependencies: vstreamer-core, tokio
// ============================================================================

//! ## Overview
//! Registers recording callbacks with [`vstreamer_core::MemoryTopology`] and
//! checks what each watcher observes.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only panic-based assertions are permitted."
)]

mod common;

use std::sync::Arc;
use std::sync::Mutex;

use common::customer_document;
use common::customer_orders_document;
use vstreamer_core::MemoryTopology;
use vstreamer_core::RoutingCallback;
use vstreamer_core::RoutingNotification;
use vstreamer_core::TopologyError;
use vstreamer_core::TopologyWatch;

fn recorder() -> (RoutingCallback, Arc<Mutex<Vec<RoutingNotification>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let target = Arc::clone(&seen);
    let callback: RoutingCallback = Arc::new(move |notification| {
        target.lock().unwrap().push(notification);
    });
    (callback, seen)
}

#[tokio::test]
async fn watch_delivers_current_document_before_returning() {
    let topology = MemoryTopology::new().with_document("zone1", customer_document());
    let (callback, seen) = recorder();
    topology.watch_routing("zone1", callback).await;
    assert_eq!(*seen.lock().unwrap(), vec![Ok(customer_document())]);
}

#[tokio::test]
async fn watch_on_unknown_cell_reports_no_node() {
    let topology = MemoryTopology::new();
    let (callback, seen) = recorder();
    topology.watch_routing("zone9", callback).await;
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].as_ref().unwrap_err().is_no_node());
}

#[tokio::test]
async fn later_changes_arrive_in_publish_order() {
    let topology = MemoryTopology::new();
    let (callback, seen) = recorder();
    topology.watch_routing("zone1", callback).await;

    topology.publish("zone1", customer_document());
    topology.publish_error("zone1", TopologyError::Unavailable("flap".to_string()));
    topology.publish("zone1", customer_orders_document());
    topology.remove("zone1");

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 5);
    assert_eq!(seen[1], Ok(customer_document()));
    assert_eq!(seen[2], Err(TopologyError::Unavailable("flap".to_string())));
    assert_eq!(seen[3], Ok(customer_orders_document()));
    assert_eq!(
        seen[4],
        Err(TopologyError::NoNode {
            cell: "zone1".to_string()
        })
    );
}

#[tokio::test]
async fn transient_errors_do_not_replace_stored_document() {
    let topology = MemoryTopology::new().with_document("zone1", customer_document());
    assert_eq!(topology.publish_error("zone1", TopologyError::Unavailable("flap".to_string())), 0);
    let (callback, seen) = recorder();
    topology.watch_routing("zone1", callback).await;
    assert_eq!(*seen.lock().unwrap(), vec![Ok(customer_document())]);
}

#[tokio::test]
async fn cells_are_independent() {
    let topology = MemoryTopology::new();
    let (zone1, seen1) = recorder();
    let (zone2, seen2) = recorder();
    topology.watch_routing("zone1", zone1).await;
    topology.watch_routing("zone2", zone2).await;
    assert_eq!(topology.publish("zone2", customer_document()), 1);
    assert_eq!(seen1.lock().unwrap().len(), 1);
    assert_eq!(seen2.lock().unwrap().len(), 2);
}
