//! Unit tests for packet dispatch.

use std::sync::{Arc, Mutex};

use mockall::mock;
use rstest::{fixture, rstest};
use serde_json::{Value, json};

use super::*;
use crate::checksum::{ChecksumKey, ChecksumType};
use crate::error::{HandlerError, HookError, codes};
use crate::handler::StaticTokenValidator;
use crate::hooks::HookSink;
use crate::memory::{MemoryPrimaryKeyMapper, SharedChecksumStore};
use crate::model::{Identity, ModelType, decode_models};
use crate::protocol::RequestId;
use crate::test_support::TestProduct;

mock! {
    Endpoint {}

    impl EndpointHandler for Endpoint {
        fn can_handle(&self, action: Action) -> bool;
        fn decode_models(&self, params: Value) -> Result<Vec<BoxedModel>, serde_json::Error>;
        fn handle(&mut self, request: ActionRequest) -> Result<ActionResult, HandlerError>;
    }
}

/// Product endpoint backed by a fixed catalogue.
struct Catalogue {
    products: Vec<TestProduct>,
}

impl EndpointHandler for Catalogue {
    fn can_handle(&self, action: Action) -> bool {
        matches!(action, Action::Pull | Action::Push | Action::Delete | Action::Statistic)
    }

    fn decode_models(&self, params: Value) -> Result<Vec<BoxedModel>, serde_json::Error> {
        decode_models::<TestProduct>(params)
    }

    fn handle(&mut self, request: ActionRequest) -> Result<ActionResult, HandlerError> {
        let output = match (request.method.action(), request.params) {
            (Action::Pull, ActionParams::Filter(filter)) => {
                let limit = filter.limit.map_or(usize::MAX, |limit| limit as usize);
                ActionOutput::Models(
                    self.products
                        .iter()
                        .take(limit)
                        .cloned()
                        .map(|product| Box::new(product) as BoxedModel)
                        .collect(),
                )
            }
            (Action::Push | Action::Delete, ActionParams::Models(models)) => ActionOutput::Models(models),
            (Action::Statistic, _) => ActionOutput::Value(json!({
                "controllerName": "product",
                "available": self.products.len()
            })),
            _ => return Ok(ActionResult::unhandled()),
        };
        Ok(ActionResult::handled(output))
    }
}

#[derive(Clone, Default)]
struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    fn names(&self) -> Vec<String> {
        self.0.lock().expect("event log").clone()
    }
}

impl HookSink for EventLog {
    fn name(&self) -> &str {
        "event-log"
    }

    fn notify(&mut self, event: &HookEvent<'_>) -> Result<(), HookError> {
        self.0.lock().expect("event log").push(event.name());
        Ok(())
    }
}

struct Harness {
    dispatcher: Dispatcher,
    store: SharedChecksumStore,
    events: EventLog,
}

impl Harness {
    fn single(&mut self, method: &str, params: Value) -> RpcResponse {
        match self
            .dispatcher
            .dispatch(Packet::Single(RpcRequest::new(1_i64, method, params)))
            .expect("dispatch")
        {
            Packet::Single(response) => response,
            Packet::Batch(_) => panic!("single request must yield a single response"),
        }
    }
}

fn catalogue() -> Catalogue {
    Catalogue {
        products: vec![
            TestProduct::new(Identity::from_endpoint("p-1")).with_checksum(ChecksumType::Record, "a"),
            TestProduct::new(Identity::from_endpoint("p-2")).with_checksum(ChecksumType::Record, "b"),
        ],
    }
}

fn complete_builder(store: &SharedChecksumStore) -> DispatcherBuilder {
    Dispatcher::builder()
        .endpoint("product", catalogue())
        .default_primary_key_mapper(MemoryPrimaryKeyMapper::new())
        .checksum_loader(store.clone())
        .token_validator(StaticTokenValidator::new("s3cret"))
}

#[fixture]
fn harness() -> Harness {
    let store = SharedChecksumStore::new();
    let events = EventLog::default();
    let dispatcher = complete_builder(&store).hook(events.clone()).build();
    Harness {
        dispatcher,
        store,
        events,
    }
}

fn record_key(endpoint_id: &str) -> ChecksumKey {
    ChecksumKey::new(ModelType::Product, endpoint_id, ChecksumType::Record)
}

#[rstest]
fn pull_links_identities_and_checksums(mut harness: Harness) {
    let response = harness.single("product.pull", json!({ "limit": 10 }));

    let result = response.result().expect("pull result");
    assert_eq!(
        result,
        &json!([
            {
                "id": { "endpoint": "p-1", "host": "1" },
                "name": "widget",
                "checksums": [{
                    "foreignKey": { "endpoint": null, "host": null },
                    "type": "record",
                    "host": "a",
                    "hasChanged": true
                }]
            },
            {
                "id": { "endpoint": "p-2", "host": "2" },
                "name": "widget",
                "checksums": [{
                    "foreignKey": { "endpoint": null, "host": null },
                    "type": "record",
                    "host": "b",
                    "hasChanged": true
                }]
            }
        ])
    );
    assert_eq!(
        harness.store.get(&record_key("p-1")).expect("get"),
        Some(String::from("a"))
    );
}

#[rstest]
fn repeated_pull_reports_unchanged_checksums(mut harness: Harness) {
    harness.single("product.pull", Value::Null);

    let response = harness.single("product.pull", Value::Null);

    let flags: Vec<&Value> = response
        .result()
        .and_then(Value::as_array)
        .expect("products")
        .iter()
        .filter_map(|product| product.pointer("/checksums/0/hasChanged"))
        .collect();
    assert_eq!(flags, [&json!(false), &json!(false)]);
}

#[rstest]
fn hooks_fire_in_pipeline_order(mut harness: Harness) {
    harness.single("product.pull", json!({ "limit": 1 }));

    assert_eq!(
        harness.events.names(),
        [
            "rpc.product.before.pull",
            "product.before.pull",
            "product.after.pull",
            "rpc.product.after.pull",
        ]
    );
}

#[rstest]
fn pushed_models_are_linked_before_the_handler_sees_them(mut harness: Harness) {
    let response = harness.single(
        "product.push",
        json!([{ "id": { "endpoint": "", "host": "77" }, "name": "gadget" }]),
    );

    let pushed = response
        .result()
        .and_then(|result| result.pointer("/0/id"))
        .expect("pushed identity");
    assert_eq!(pushed, &json!({ "endpoint": null, "host": "77" }));
    assert_eq!(
        harness.events.names(),
        [
            "rpc.product.before.push",
            "product.before.push",
            "product.after.push",
            "rpc.product.after.push",
        ]
    );
}

#[rstest]
fn delete_removes_checksums_and_identity_links(mut harness: Harness) {
    harness.single("product.pull", Value::Null);
    assert_eq!(harness.store.len().expect("len"), 2);

    let response = harness.single(
        "product.delete",
        json!([{ "id": { "endpoint": "p-1" }, "checksums": [{ "type": "record", "host": "a" }] }]),
    );

    assert!(response.error().is_none());
    assert_eq!(harness.store.get(&record_key("p-1")).expect("get"), None);
    assert_eq!(harness.store.len().expect("len"), 1);

    let repulled = harness.single("product.pull", json!({ "limit": 1 }));
    assert_eq!(
        repulled
            .result()
            .and_then(|result| result.pointer("/0/id/host")),
        Some(&json!("3"))
    );
}

/// Product endpoint echoing pushes and acknowledging deletes with a bare flag.
struct Acknowledger;

impl EndpointHandler for Acknowledger {
    fn can_handle(&self, action: Action) -> bool {
        matches!(action, Action::Push | Action::Delete)
    }

    fn decode_models(&self, params: Value) -> Result<Vec<BoxedModel>, serde_json::Error> {
        decode_models::<TestProduct>(params)
    }

    fn handle(&mut self, request: ActionRequest) -> Result<ActionResult, HandlerError> {
        Ok(match (request.method.action(), request.params) {
            (Action::Push, ActionParams::Models(models)) => {
                ActionResult::handled(ActionOutput::Models(models))
            }
            (Action::Delete, _) => ActionResult::handled(ActionOutput::Bool(true)),
            _ => ActionResult::unhandled(),
        })
    }
}

fn acknowledging_dispatcher(store: &SharedChecksumStore) -> Dispatcher {
    Dispatcher::builder()
        .endpoint("product", Acknowledger)
        .default_primary_key_mapper(MemoryPrimaryKeyMapper::new())
        .checksum_loader(store.clone())
        .token_validator(StaticTokenValidator::new("s3cret"))
        .build()
}

fn dispatch_one(dispatcher: &mut Dispatcher, method: &str, params: Value) -> RpcResponse {
    match dispatcher
        .dispatch(Packet::Single(RpcRequest::new(1_i64, method, params)))
        .expect("dispatch")
    {
        Packet::Single(response) => response,
        Packet::Batch(_) => panic!("single request must yield a single response"),
    }
}

fn deleted_product() -> Value {
    json!([{ "id": { "endpoint": "p-9", "host": "9" }, "checksums": [{ "type": "record", "host": "zz" }] }])
}

#[test]
fn delete_never_persists_checksums() {
    let store = SharedChecksumStore::new();
    let mut dispatcher = acknowledging_dispatcher(&store);

    let response = dispatch_one(&mut dispatcher, "product.delete", deleted_product());

    assert_eq!(response.result(), Some(&json!({ "result": true })));
    assert_eq!(store.len().expect("len"), 0);
}

#[test]
fn delete_answered_with_a_flag_releases_checksums_and_links() {
    let store = SharedChecksumStore::new();
    let mut dispatcher = acknowledging_dispatcher(&store);
    dispatch_one(&mut dispatcher, "product.push", deleted_product());
    assert_eq!(
        store.get(&record_key("p-9")).expect("get"),
        Some(String::from("zz"))
    );

    let response = dispatch_one(&mut dispatcher, "product.delete", deleted_product());

    assert_eq!(response.result(), Some(&json!({ "result": true })));
    assert_eq!(store.len().expect("len"), 0);
    let repushed = dispatch_one(
        &mut dispatcher,
        "product.push",
        json!([{ "id": { "endpoint": "p-9" } }]),
    );
    assert_eq!(
        repushed.result().and_then(|result| result.pointer("/0/id/host")),
        Some(&json!("1"))
    );
}

#[rstest]
fn batch_isolates_a_malformed_method(mut harness: Harness) {
    let packet = Packet::Batch(vec![
        RpcRequest::new(1_i64, "product.statistic", Value::Null),
        RpcRequest::new(2_i64, "product..pull", Value::Null),
        RpcRequest::new(3_i64, "product.pull", json!({ "limit": 1 })),
    ]);

    let Packet::Batch(responses) = harness.dispatcher.dispatch(packet).expect("dispatch") else {
        panic!("batch must yield a batch");
    };

    let ids: Vec<&RequestId> = responses.iter().map(|response| &response.id).collect();
    assert_eq!(ids, [&RequestId::Number(1), &RequestId::Number(2), &RequestId::Number(3)]);
    let [first, second, third] = responses.as_slice() else {
        panic!("expected three responses");
    };
    assert_eq!(
        first.result(),
        Some(&json!({ "controllerName": "product", "available": 2 }))
    );
    assert_eq!(second.error().map(|error| error.code), Some(codes::INVALID_REQUEST));
    assert_eq!(second.error().map(|error| error.message.as_str()), Some("Invalid Request"));
    assert_eq!(third.result().and_then(Value::as_array).map(Vec::len), Some(1));
}

#[rstest]
#[case::unknown_controller("category.pull", codes::METHOD_NOT_FOUND)]
#[case::unsupported_action("product.identify", codes::METHOD_NOT_FOUND)]
#[case::unknown_action("product.fetch", codes::INVALID_REQUEST)]
fn routing_failures_become_error_envelopes(
    mut harness: Harness,
    #[case] method: &str,
    #[case] expected: i32,
) {
    let response = harness.single(method, Value::Null);

    assert_eq!(response.error().map(|error| error.code), Some(expected));
    assert_eq!(response.id, RequestId::Number(1));
}

#[rstest]
fn undecodable_params_are_invalid_params(mut harness: Harness) {
    let response = harness.single("product.push", json!([{ "name": 12 }]));

    assert_eq!(response.error().map(|error| error.code), Some(codes::INVALID_PARAMS));
}

#[rstest]
fn core_auth_is_served_before_the_endpoint(mut harness: Harness) {
    let accepted = harness.single("core.connector.auth", json!({ "token": "s3cret" }));
    let rejected = harness.single("core.connector.auth", json!({ "token": "nope" }));

    assert_eq!(accepted.result(), Some(&json!({ "result": true })));
    assert_eq!(
        rejected.error().map(|error| error.code),
        Some(codes::AUTHENTICATION_FAILED)
    );
}

#[rstest]
fn core_methods_without_core_handler_fall_through() {
    let store = SharedChecksumStore::new();
    let mut connector = MockEndpoint::new();
    connector
        .expect_can_handle()
        .returning(|action| action == Action::Identify);
    connector.expect_handle().returning(|_| {
        Ok(ActionResult::handled(ActionOutput::Value(
            json!({ "platform": "shop", "protocolVersion": crate::protocol::PROTOCOL_VERSION }),
        )))
    });
    let mut dispatcher = complete_builder(&store).endpoint("connector", connector).build();

    let Packet::Single(response) = dispatcher
        .dispatch(Packet::Single(RpcRequest::new(4_i64, "core.connector.identify", Value::Null)))
        .expect("dispatch")
    else {
        panic!("single response expected");
    };

    assert_eq!(
        response.result().and_then(|result| result.get("protocolVersion")),
        Some(&json!(7))
    );
}

#[test]
fn declined_and_failing_handlers_map_to_their_codes() {
    let store = SharedChecksumStore::new();
    let mut declining = MockEndpoint::new();
    declining.expect_can_handle().return_const(true);
    declining
        .expect_handle()
        .returning(|_| Ok(ActionResult::unhandled()));
    let mut failing = MockEndpoint::new();
    failing.expect_can_handle().return_const(true);
    failing
        .expect_handle()
        .returning(|_| Err(HandlerError::new("database offline")));
    let mut dispatcher = complete_builder(&store)
        .endpoint("category", declining)
        .endpoint("manufacturer", failing)
        .build();

    let Packet::Batch(responses) = dispatcher
        .dispatch(Packet::Batch(vec![
            RpcRequest::new(1_i64, "category.finish", Value::Null),
            RpcRequest::new(2_i64, "manufacturer.finish", Value::Null),
        ]))
        .expect("dispatch")
    else {
        panic!("batch expected");
    };

    let observed: Vec<Option<i32>> = responses
        .iter()
        .map(|response| response.error().map(|error| error.code))
        .collect();
    assert_eq!(observed, [Some(codes::UNHANDLED), Some(codes::INTERNAL_ERROR)]);
}

#[test]
fn value_level_errors_skip_reconciliation() {
    let store = SharedChecksumStore::new();
    let mut endpoint = MockEndpoint::new();
    endpoint.expect_can_handle().return_const(true);
    endpoint.expect_handle().returning(|_| {
        Ok(ActionResult {
            output: ActionOutput::Model(Box::new(
                TestProduct::new(Identity::from_endpoint("x")).with_checksum(ChecksumType::Record, "z"),
            )),
            error: Some(RpcErrorObject::new(-1, "partial failure")),
            handled: true,
        })
    });
    let mut dispatcher = complete_builder(&store).endpoint("image", endpoint).build();

    let Packet::Single(response) = dispatcher
        .dispatch(Packet::Single(RpcRequest::new(1_i64, "image.finish", Value::Null)))
        .expect("dispatch")
    else {
        panic!("single response expected");
    };

    assert_eq!(
        response.error(),
        Some(&RpcErrorObject::new(-1, "partial failure"))
    );
    assert_eq!(store.len().expect("len"), 0);
}

#[rstest]
#[case::no_endpoint(
    Dispatcher::builder()
        .default_primary_key_mapper(MemoryPrimaryKeyMapper::new())
        .checksum_loader(SharedChecksumStore::new())
        .token_validator(StaticTokenValidator::new("t")),
    ConfigurationError::NoEndpointHandler
)]
#[case::no_mapper(
    Dispatcher::builder()
        .endpoint("product", catalogue())
        .checksum_loader(SharedChecksumStore::new())
        .token_validator(StaticTokenValidator::new("t")),
    ConfigurationError::NoPrimaryKeyMapper
)]
#[case::no_checksum_loader(
    Dispatcher::builder()
        .endpoint("product", catalogue())
        .default_primary_key_mapper(MemoryPrimaryKeyMapper::new())
        .token_validator(StaticTokenValidator::new("t")),
    ConfigurationError::NoChecksumLoader
)]
#[case::no_authentication(
    Dispatcher::builder()
        .endpoint("product", catalogue())
        .default_primary_key_mapper(MemoryPrimaryKeyMapper::new())
        .checksum_loader(SharedChecksumStore::new()),
    ConfigurationError::NoAuthentication
)]
fn missing_collaborators_abort_the_whole_packet(
    #[case] builder: DispatcherBuilder,
    #[case] expected: ConfigurationError,
) {
    let events = EventLog::default();
    let mut dispatcher = builder.hook(events.clone()).build();

    let error = dispatcher
        .dispatch(Packet::Batch(vec![
            RpcRequest::new(1_i64, "category.pull", Value::Null),
            RpcRequest::new(2_i64, "product.pull", Value::Null),
        ]))
        .expect_err("configuration error");

    assert_eq!(error, expected);
    assert!(events.names().is_empty());
}

#[rstest]
fn foreign_envelope_versions_are_fatal(mut harness: Harness) {
    let mut request = RpcRequest::new(1_i64, "product.pull", Value::Null);
    request.jtlrpc = String::from("1.0");

    let error = harness
        .dispatcher
        .dispatch(Packet::Batch(vec![
            RpcRequest::new(2_i64, "product.pull", Value::Null),
            request,
        ]))
        .expect_err("version mismatch");

    assert_eq!(
        error,
        ConfigurationError::VersionMismatch {
            expected: String::from("2.0"),
            found: String::from("1.0"),
        }
    );
    assert!(harness.events.names().is_empty());
    assert_eq!(harness.store.len().expect("len"), 0);
}
