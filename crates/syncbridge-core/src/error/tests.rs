//! Unit tests for error code mapping and messages.

use std::io;

use rstest::rstest;

use super::*;

fn linker_error() -> LinkerError {
    LinkerError::NoMapper {
        model_type: ModelType::Product,
    }
}

fn checksum_error() -> ChecksumStoreError {
    ChecksumStoreError {
        operation: "read",
        model_type: ModelType::Product,
        endpoint_id: String::from("7"),
        source: StoreError::new("disk full"),
    }
}

#[rstest]
#[case(
    DispatchError::protocol(MethodError::Malformed { name: String::from("x") }),
    codes::INVALID_REQUEST
)]
#[case(DispatchError::method_not_found("product.pull"), codes::METHOD_NOT_FOUND)]
#[case(DispatchError::unhandled("product.pull"), codes::UNHANDLED)]
#[case(DispatchError::internal(HandlerError::new("boom")), codes::INTERNAL_ERROR)]
#[case(DispatchError::Linker(linker_error()), codes::INTERNAL_ERROR)]
#[case(DispatchError::ChecksumStore(checksum_error()), codes::INTERNAL_ERROR)]
fn dispatch_errors_map_to_codes(#[case] error: DispatchError, #[case] expected: i32) {
    assert_eq!(error.code(), expected);
}

#[test]
fn invalid_params_carries_decoder_message() {
    let decode = serde_json::from_str::<u32>("\"nope\"").expect_err("decode should fail");
    let error = DispatchError::invalid_params(&decode);

    assert_eq!(error.code(), codes::INVALID_PARAMS);
    assert!(error.to_string().starts_with("Invalid params: "));
}

#[test]
fn protocol_error_reads_invalid_request() {
    let error = DispatchError::protocol(MethodError::Malformed {
        name: String::from("nope"),
    });
    assert_eq!(error.to_string(), "Invalid Request");
}

#[test]
fn store_error_keeps_its_source() {
    let error = StoreError::with_source("cannot open", io::Error::other("denied"));

    assert_eq!(error.message(), "cannot open");
    let source = std::error::Error::source(&error).expect("source should be kept");
    assert_eq!(source.to_string(), "denied");
}

#[test]
fn checksum_store_error_names_operation_and_entity() {
    assert_eq!(
        checksum_error().to_string(),
        "checksum store failed to read Product '7': disk full"
    );
}

#[test]
fn conflict_messages_name_both_partners() {
    let error = LinkerError::HostConflict {
        model_type: ModelType::Category,
        host: String::from("10"),
        endpoint: String::from("b"),
        linked_endpoint: String::from("a"),
    };
    assert_eq!(
        error.to_string(),
        "host id '10' of Category is linked to endpoint id 'a', not 'b'"
    );
}
