//! Behavioural tests for the line-oriented serve loop.
//!
//! Request limits are configured through the bootstrap steps.

use std::cell::RefCell;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use serde_json::{Value, json};

use crate::serve::ServeError;

use super::support::{self, BridgeWorld, HealthEvent};

#[fixture]
fn world() -> RefCell<BridgeWorld> {
    support::world()
}

#[given("a bootstrapped bridge")]
fn given_bootstrapped_bridge(world: &RefCell<BridgeWorld>) {
    world.borrow_mut().bootstrap();
}

#[given("a bootstrapped bridge without a checksum loader")]
fn given_bridge_without_checksums(world: &RefCell<BridgeWorld>) {
    world.borrow_mut().bootstrap_without_checksums();
}

#[given("the host queues a \"{method}\" request")]
fn given_request_queued(world: &RefCell<BridgeWorld>, method: String) {
    world
        .borrow_mut()
        .queue_request(method.trim_matches('"'), Value::Null);
}

#[given("the host queues a malformed line")]
fn given_malformed_line(world: &RefCell<BridgeWorld>) {
    world.borrow_mut().queue_line(b"{\"id\": 1, \"jtlrpc\": ");
}

#[given("the host queues a request padded to {size} bytes")]
fn given_padded_request(world: &RefCell<BridgeWorld>, size: usize) {
    let padding = "x".repeat(size);
    world
        .borrow_mut()
        .queue_request("product.pull", json!({ "filters": { "padding": padding } }));
}

#[when("the bridge serves the queued lines")]
fn when_bridge_serves(world: &RefCell<BridgeWorld>) {
    world.borrow_mut().serve();
}

#[then("{count} response lines are written")]
fn then_response_lines(world: &RefCell<BridgeWorld>, count: usize) {
    let lines = world.borrow().response_lines();
    assert_eq!(lines.len(), count, "unexpected responses: {lines:?}");
}

#[then("response line {index} carries a result")]
fn then_line_has_result(world: &RefCell<BridgeWorld>, index: usize) {
    let line = response_line(world, index);
    assert!(line.get("result").is_some(), "expected a result: {line}");
    assert!(line.get("error").is_none(), "unexpected error: {line}");
}

#[then("response line {index} carries error code {code}")]
fn then_line_has_error(world: &RefCell<BridgeWorld>, index: usize, code: i64) {
    let line = response_line(world, index);
    assert_eq!(line.pointer("/error/code"), Some(&json!(code)), "line: {line}");
}

#[then("the serve summary counts {packets} packets and {rejected} rejections")]
fn then_summary_counts(world: &RefCell<BridgeWorld>, packets: usize, rejected: usize) {
    let world = world.borrow();
    let summary = match world.serve_result() {
        Ok(summary) => *summary,
        Err(error) => panic!("serve failed: {error}"),
    };
    assert_eq!((summary.packets, summary.rejected), (packets, rejected));
}

#[then("serving fails with a configuration error")]
fn then_serving_fails(world: &RefCell<BridgeWorld>) {
    let world = world.borrow();
    assert!(
        matches!(world.serve_result(), Err(ServeError::Configuration { .. })),
        "unexpected serve result: {:?}",
        world.serve_result()
    );
}

#[then("the reporter recorded a serve failure")]
fn then_reporter_serve_failure(world: &RefCell<BridgeWorld>) {
    let events = world.borrow().reporter.events();
    assert!(
        events
            .iter()
            .any(|event| matches!(event, HealthEvent::ServeFailed(_))),
        "serve failure event missing: {events:?}"
    );
}

fn response_line(world: &RefCell<BridgeWorld>, index: usize) -> Value {
    let lines = world.borrow().response_lines();
    index
        .checked_sub(1)
        .and_then(|position| lines.get(position).cloned())
        .unwrap_or_else(|| panic!("no response line {index}: {lines:?}"))
}

#[scenario(path = "tests/features/serve_loop.feature")]
fn serve_loop(#[from(world)] world: RefCell<BridgeWorld>) {
    drop(world);
}
