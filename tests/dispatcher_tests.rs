#![allow(clippy::unwrap_used, clippy::expect_used)]

//! End-to-end dispatch tests.
//!
//! # Test Coverage
//!
//! - Root, sub-resource method and locator matching
//! - 404 / 405 / 406 / 415 answers and the implicit OPTIONS and HEAD handling
//! - Request entity reading and response entity writing
//! - Exception mapping, including unmapped checked and unchecked faults
//! - Base path handling and the locator depth limit

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use http::{header, Method, StatusCode};
use restdispatch::error::{ApplicationError, FaultClass, RUNTIME};
use restdispatch::model::{Reply, ResourceClass, Returned};
use restdispatch::providers::{ExceptionMapper, Provider, ProviderInstance, NO_MAPPER_MESSAGE};
use restdispatch::{Dispatcher, DispatcherConfig, Request};

#[test]
fn test_root_resource_method() {
    let dispatcher = common::dispatcher();
    let response = dispatcher.handle(Request::get("/widgets"));
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.text(), Some("all widgets"));
    assert_eq!(
        response.content_type().map(|m| m.without_params().to_string()),
        Some("text/plain".to_string())
    );
}

#[test]
fn test_literal_beats_template() {
    let dispatcher = common::dispatcher();
    assert_eq!(
        dispatcher.handle(Request::get("/widgets/special")).text(),
        Some("special widget")
    );
    assert_eq!(
        dispatcher.handle(Request::get("/widgets/42")).text(),
        Some("widget 42")
    );
}

#[test]
fn test_trailing_slash_and_encoding() {
    let dispatcher = common::dispatcher();
    assert_eq!(
        dispatcher.handle(Request::get("/widgets/42/")).text(),
        Some("widget 42")
    );
    assert_eq!(
        dispatcher.handle(Request::get("/widgets/big%20one")).text(),
        Some("widget big one")
    );
}

#[test]
fn test_matrix_parameters() {
    let dispatcher = common::dispatcher();
    let response = dispatcher.handle(Request::get("/widgets/7/colour;colour=red"));
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.text(), Some("red"));

    let response = dispatcher.handle(Request::get("/widgets/7/colour"));
    assert_eq!(response.status, StatusCode::NO_CONTENT);
    assert!(response.body.is_empty());
}

#[test]
fn test_unknown_root_is_404() {
    let dispatcher = common::dispatcher();
    assert_eq!(
        dispatcher.handle(Request::get("/gadgets")).status,
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        dispatcher.handle(Request::get("/")).status,
        StatusCode::NOT_FOUND
    );
}

#[test]
fn test_unknown_sub_resource_is_404() {
    let dispatcher = common::dispatcher();
    assert_eq!(
        dispatcher.handle(Request::get("/widgets/7/parts/9")).status,
        StatusCode::NOT_FOUND
    );
}

#[test]
fn test_delete_without_entity_is_204() {
    let dispatcher = common::dispatcher();
    let response = dispatcher.handle(Request::delete("/widgets/7"));
    assert_eq!(response.status, StatusCode::NO_CONTENT);
    assert!(response.body.is_empty());
}

#[test]
fn test_method_not_allowed_lists_allow() {
    let dispatcher = common::dispatcher();
    let response = dispatcher.handle(Request::put("/widgets/7"));
    assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(
        response.allowed_methods(),
        vec![Method::GET, Method::DELETE, Method::HEAD, Method::OPTIONS]
    );
}

#[test]
fn test_options_answered_from_declared_methods() {
    let dispatcher = common::dispatcher();
    let response = dispatcher.handle(Request::new(Method::OPTIONS, "/widgets/7"));
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.header(&header::ALLOW),
        Some("GET, DELETE, HEAD, OPTIONS")
    );
    assert!(response.body.is_empty());
}

#[test]
fn test_head_runs_get_without_body() {
    let dispatcher = common::dispatcher();
    let response = dispatcher.handle(Request::new(Method::HEAD, "/widgets/7"));
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.is_empty());
    assert!(response.content_type().is_some());
}

#[test]
fn test_head_body_kept_when_configured() {
    let config = DispatcherConfig {
        strip_head_body: false,
        ..DispatcherConfig::default()
    };
    let dispatcher = common::dispatcher_with(config);
    let response = dispatcher.handle(Request::new(Method::HEAD, "/widgets/7"));
    assert_eq!(response.text(), Some("widget 7"));
}

#[test]
fn test_accept_selects_method() {
    let dispatcher = common::dispatcher();

    let json = dispatcher.handle(Request::get("/widgets/7/details").accept("application/json"));
    assert_eq!(json.status, StatusCode::OK);
    assert_eq!(
        json.header(&header::CONTENT_TYPE),
        Some("application/json")
    );
    let body: serde_json::Value = serde_json::from_slice(&json.body).unwrap();
    assert_eq!(body["id"], "7");

    let xml = dispatcher.handle(Request::get("/widgets/7/details").accept("text/xml"));
    assert_eq!(xml.status, StatusCode::OK);
    assert_eq!(xml.header(&header::CONTENT_TYPE), Some("text/xml"));
    assert_eq!(xml.text(), Some("<widget id=\"7\"/>"));
}

#[test]
fn test_accept_order_breaks_ties() {
    let dispatcher = common::dispatcher();
    let response = dispatcher
        .handle(Request::get("/widgets/7/details").accept("text/xml, application/json"));
    assert_eq!(response.header(&header::CONTENT_TYPE), Some("text/xml"));
}

#[test]
fn test_not_acceptable() {
    let dispatcher = common::dispatcher();
    let response = dispatcher.handle(Request::get("/widgets/7/details").accept("image/png"));
    assert_eq!(response.status, StatusCode::NOT_ACCEPTABLE);
}

#[test]
fn test_content_type_selects_method() {
    let dispatcher = common::dispatcher();

    let response = dispatcher.handle(
        Request::post("/widgets")
            .content_type("application/json")
            .body(r#"{"name":"sprocket"}"#),
    );
    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.header(&header::LOCATION), Some("/widgets/new"));
    let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(body["name"], "sprocket");

    let response = dispatcher.handle(
        Request::post("/widgets")
            .content_type("text/plain")
            .body("sprocket"),
    );
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.text(), Some("text sprocket"));
}

#[test]
fn test_unsupported_media_type() {
    let dispatcher = common::dispatcher();
    let response = dispatcher.handle(
        Request::post("/widgets")
            .content_type("image/png")
            .body(vec![0x89, 0x50]),
    );
    assert_eq!(response.status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[test]
fn test_content_type_ignored_without_entity() {
    let dispatcher = common::dispatcher();
    let response = dispatcher.handle(Request::get("/widgets/7/payload").content_type("text/plain"));
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.text(), Some("payload of 7"));

    let response = dispatcher.handle(
        Request::get("/widgets/7/payload")
            .content_type("text/plain")
            .body("seven"),
    );
    assert_eq!(response.status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[test]
fn test_all_accept_entries_refused() {
    let dispatcher = common::dispatcher();
    let response = dispatcher.handle(Request::get("/widgets/1").accept("text/plain;q=0"));
    assert_eq!(response.status, StatusCode::NOT_ACCEPTABLE);

    let response = dispatcher.handle(Request::get("/widgets/1/details").accept("application/json;q=0"));
    assert_eq!(response.status, StatusCode::NOT_ACCEPTABLE);
}

#[test]
fn test_malformed_json_body() {
    let dispatcher = common::dispatcher();
    let response = dispatcher.handle(
        Request::post("/widgets")
            .content_type("application/json")
            .body("{not json"),
    );
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[test]
fn test_locator_chain() {
    let dispatcher = common::dispatcher();
    assert_eq!(
        dispatcher.handle(Request::get("/library/books/123")).text(),
        Some("book 123")
    );
    assert_eq!(
        dispatcher
            .handle(Request::get("/library/books/123/chapters/4"))
            .text(),
        Some("chapter 4 of 123")
    );
}

#[test]
fn test_matched_uris_recorded_most_recent_first() {
    let dispatcher = common::dispatcher();
    let response = dispatcher.handle(Request::get("/library/books/123/matched"));
    assert_eq!(
        response.text(),
        Some("library/books/123/matched | library/books/123 | library")
    );
}

#[test]
fn test_locator_segment_belongs_to_locating_resource() {
    let dispatcher = common::dispatcher();
    let response = dispatcher.handle(Request::get("/library/books/123/owners"));
    assert_eq!(response.text(), Some("Book | Library | Library"));
}

#[test]
fn test_literal_root_beats_template_root() {
    fn item(path: &str, name: &'static str) -> Arc<ResourceClass> {
        ResourceClass::builder::<()>(name)
            .path(path)
            .factory(|_| Ok(()))
            .get("", move |_, _| Ok(Returned::entity(name.to_string())))
            .build()
            .unwrap()
    }

    let templated = item("/items/{id}", "ItemById");
    let special = item("/items/special", "SpecialItem");
    for order in [[&templated, &special], [&special, &templated]] {
        let dispatcher = Dispatcher::new(DispatcherConfig::default());
        for class in order {
            assert!(dispatcher.add_root_resource_class(class));
        }
        assert_eq!(
            dispatcher.handle(Request::get("/items/special")).text(),
            Some("SpecialItem")
        );
        assert_eq!(
            dispatcher.handle(Request::get("/items/42")).text(),
            Some("ItemById")
        );
    }
}

#[test]
fn test_locator_without_methods_is_404() {
    let dispatcher = common::dispatcher();
    assert_eq!(
        dispatcher.handle(Request::get("/library")).status,
        StatusCode::NOT_FOUND
    );
}

#[test]
fn test_locator_depth_limit() {
    let dispatcher = common::dispatcher();
    assert_eq!(
        dispatcher.handle(Request::get("/loop/a/b/c")).text(),
        Some("bottom")
    );

    let config = DispatcherConfig {
        max_locator_depth: 2,
        ..DispatcherConfig::default()
    };
    let dispatcher = common::dispatcher_with(config);
    assert_eq!(
        dispatcher.handle(Request::get("/loop/a/b")).text(),
        Some("bottom")
    );
    assert_eq!(
        dispatcher.handle(Request::get("/loop/a/b/c")).status,
        StatusCode::INTERNAL_SERVER_ERROR
    );
}

#[test]
fn test_base_path() {
    let config = DispatcherConfig {
        base_path: "/api/".into(),
        ..DispatcherConfig::default()
    };
    let dispatcher = common::dispatcher_with(config);
    assert_eq!(
        dispatcher.handle(Request::get("/api/widgets/3")).text(),
        Some("widget 3")
    );
    assert_eq!(
        dispatcher.handle(Request::get("/widgets/3")).status,
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        dispatcher.handle(Request::get("/apiwidgets/3")).status,
        StatusCode::NOT_FOUND
    );
}

#[test]
fn test_web_application_fault_carries_reply() {
    let dispatcher = common::dispatcher();
    let response = dispatcher.handle(Request::get("/faults/teapot"));
    assert_eq!(response.status, StatusCode::IM_A_TEAPOT);
    assert_eq!(response.text(), Some("short and stout"));
    assert_eq!(
        response.content_type().map(|m| m.without_params().to_string()),
        Some("text/plain".to_string())
    );
}

#[test]
fn test_unmapped_checked_fault_is_500_with_message() {
    let dispatcher = common::dispatcher();
    let response = dispatcher.handle(Request::get("/faults/io"));
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.text(), Some(NO_MAPPER_MESSAGE));
}

#[test]
fn test_unmapped_unchecked_fault_escapes() {
    let dispatcher = common::dispatcher();
    let err = dispatcher
        .try_handle(Request::get("/faults/state"))
        .expect_err("unchecked fault escapes");
    assert_eq!(err.message(), "bad state");

    let err = dispatcher
        .try_handle(Request::get("/faults/fatal"))
        .expect_err("fatal fault escapes");
    assert_eq!(err.class().name(), "fatal");

    let response = dispatcher.handle(Request::get("/faults/state"));
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.body.is_empty());
}

struct RuntimeMapper;

impl ExceptionMapper for RuntimeMapper {
    fn fault_class(&self) -> &'static FaultClass {
        &RUNTIME
    }

    fn to_reply(&self, error: ApplicationError) -> Option<Reply> {
        Some(Reply::new(StatusCode::CONFLICT).entity(format!("mapped: {}", error.message())))
    }
}

#[test]
fn test_mapper_found_through_fault_lineage() {
    let dispatcher = common::dispatcher();
    assert!(dispatcher.add_provider_instance(
        "runtime-mapper",
        ProviderInstance::exception_mapper(RuntimeMapper),
        false
    ));

    let response = dispatcher.handle(Request::get("/faults/state"));
    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(response.text(), Some("mapped: bad state"));

    let response = dispatcher.handle(Request::get("/faults/argument"));
    assert_eq!(response.text(), Some("mapped: bad argument"));

    // web-application faults keep their closer mapper
    assert_eq!(
        dispatcher.handle(Request::get("/faults/teapot")).status,
        StatusCode::IM_A_TEAPOT
    );
}

struct DecliningMapper;

impl ExceptionMapper for DecliningMapper {
    fn fault_class(&self) -> &'static FaultClass {
        &RUNTIME
    }

    fn to_reply(&self, _error: ApplicationError) -> Option<Reply> {
        None
    }
}

#[test]
fn test_mapper_without_reply_is_500() {
    let dispatcher = common::dispatcher();
    assert!(dispatcher.add_provider(
        Provider::singleton("declining", ProviderInstance::exception_mapper(DecliningMapper)),
        false
    ));
    let response = dispatcher.handle(Request::get("/faults/state"));
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[test]
fn test_resource_instantiated_per_request() {
    let calls = Arc::new(AtomicUsize::new(0));
    let dispatcher = common::dispatcher();
    assert!(dispatcher.add_root_resource_class(&common::counted(Arc::clone(&calls))));
    for _ in 0..3 {
        assert_eq!(
            dispatcher.handle(Request::get("/counted")).status,
            StatusCode::OK
        );
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn test_http_request_conversion() {
    let dispatcher = common::dispatcher();
    let request = http::Request::builder()
        .method(Method::GET)
        .uri("/widgets/9?verbose=true")
        .header(header::ACCEPT, "text/plain")
        .body(Vec::new())
        .unwrap();
    let response = dispatcher.handle(Request::from(request)).into_http();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.body().as_slice(), b"widget 9");
}
