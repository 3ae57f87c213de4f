#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Response media type negotiation and variant selection through the dispatcher.

use std::sync::Arc;

use http::{header, HeaderValue, StatusCode};
use restdispatch::error::ApplicationError;
use restdispatch::media::Variant;
use restdispatch::model::{MethodDef, Reply, Representation, ResourceClass, Returned};
use restdispatch::{Dispatcher, DispatcherConfig, MediaType, Request};

struct Greeting;

fn mt(s: &str) -> MediaType {
    s.parse().unwrap()
}

fn greeting() -> Arc<ResourceClass> {
    ResourceClass::builder::<Greeting>("Greeting")
        .path("/greeting")
        .factory(|_| Ok(Greeting))
        .handle(
            MethodDef::new(http::Method::GET).produces(&["application/json", "text/plain"]),
            |_, _| Ok(Returned::entity("hello".to_string())),
        )
        .get("localized", |_, inv| {
            let variants = [
                Variant::media(mt("text/plain")).with_language("en"),
                Variant::media(mt("text/plain")).with_language("fr"),
                Variant::media(mt("text/html")).with_language("en"),
            ];
            let Some(selected) = inv.context().select_variant(&variants) else {
                return Err(ApplicationError::status(StatusCode::NOT_ACCEPTABLE));
            };
            let language = selected.variant.language.clone().unwrap_or_default();
            let text = if language == "fr" { "bonjour" } else { "hello" };
            let body = if selected.variant.media_type == Some(mt("text/html")) {
                format!("<p>{text}</p>")
            } else {
                text.to_string()
            };
            let mut reply = Reply::ok()
                .payload(restdispatch::model::Payload::Representation(Representation::new(
                    selected.variant.media_type.clone(),
                    body,
                )))
                .header(
                    header::CONTENT_LANGUAGE,
                    HeaderValue::from_str(&language).unwrap_or(HeaderValue::from_static("en")),
                );
            if !selected.vary.is_empty() {
                let vary = selected.vary.join(", ");
                if let Ok(value) = HeaderValue::from_str(&vary) {
                    reply = reply.header(header::VARY, value);
                }
            }
            Ok(reply.into())
        })
        .get("legacy", |_, _| {
            Ok(Representation::new(Some(mt("text/plain; charset=KOI8-R")), "legacy").into())
        })
        .get("explicit", |_, _| {
            Ok(Reply::ok()
                .media_type(mt("text/csv"))
                .entity("a,b".to_string())
                .into())
        })
        .get("bytes", |_, _| Ok(Returned::entity(vec![1_u8, 2, 3])))
        .build()
        .unwrap()
}

fn dispatcher() -> Dispatcher {
    let dispatcher = Dispatcher::new(DispatcherConfig::default());
    assert!(dispatcher.add_root_resource_class(&greeting()));
    dispatcher
}

fn content_type(dispatcher: &Dispatcher, request: Request) -> Option<String> {
    dispatcher
        .handle(request)
        .content_type()
        .map(|m| m.without_params().to_string())
}

#[test]
fn test_first_declared_concrete_type_for_wildcard_accept() {
    let dispatcher = dispatcher();
    assert_eq!(
        content_type(&dispatcher, Request::get("/greeting")),
        Some("application/json".to_string())
    );
    assert_eq!(
        content_type(&dispatcher, Request::get("/greeting").accept("*/*")),
        Some("application/json".to_string())
    );
}

#[test]
fn test_quality_orders_accepted_types() {
    let dispatcher = dispatcher();
    assert_eq!(
        content_type(
            &dispatcher,
            Request::get("/greeting").accept("application/json;q=0.5, text/plain")
        ),
        Some("text/plain".to_string())
    );
    assert_eq!(
        content_type(&dispatcher, Request::get("/greeting").accept("text/*")),
        Some("text/plain".to_string())
    );
}

#[test]
fn test_unacceptable_accept() {
    let dispatcher = dispatcher();
    let response = dispatcher.handle(Request::get("/greeting").accept("image/*"));
    assert_eq!(response.status, StatusCode::NOT_ACCEPTABLE);
}

#[test]
fn test_variant_selection_by_language() {
    let dispatcher = dispatcher();

    let response = dispatcher.handle(
        Request::get("/greeting/localized")
            .accept("text/plain")
            .header_str(header::ACCEPT_LANGUAGE, "fr, en;q=0.5"),
    );
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.text(), Some("bonjour"));
    assert_eq!(response.header(&header::CONTENT_LANGUAGE), Some("fr"));
    assert_eq!(
        response.header(&header::VARY),
        Some("Accept, Accept-Language")
    );

    let response = dispatcher.handle(
        Request::get("/greeting/localized")
            .accept("text/html")
            .header_str(header::ACCEPT_LANGUAGE, "fr;q=0.2, en"),
    );
    assert_eq!(response.text(), Some("<p>hello</p>"));
}

#[test]
fn test_variant_selection_none_acceptable() {
    let dispatcher = dispatcher();
    let response = dispatcher.handle(
        Request::get("/greeting/localized")
            .accept("text/plain")
            .header_str(header::ACCEPT_LANGUAGE, "de"),
    );
    assert_eq!(response.status, StatusCode::NOT_ACCEPTABLE);
}

#[test]
fn test_representation_charset_relabelled() {
    let dispatcher = dispatcher();
    let response = dispatcher.handle(Request::get("/greeting/legacy"));
    assert_eq!(response.text(), Some("legacy"));
    let media = response.content_type().unwrap();
    assert_eq!(media.without_params().to_string(), "text/plain");
    assert_eq!(media.charset(), Some("UTF-8"));
}

#[test]
fn test_explicit_reply_media_type_wins() {
    let dispatcher = dispatcher();
    let response = dispatcher.handle(Request::get("/greeting/explicit").accept("text/plain"));
    assert_eq!(response.header(&header::CONTENT_TYPE), Some("text/csv"));
    assert_eq!(response.text(), Some("a,b"));
}

#[test]
fn test_bytes_default_to_octet_stream() {
    let dispatcher = dispatcher();
    let response = dispatcher.handle(Request::get("/greeting/bytes"));
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.header(&header::CONTENT_TYPE),
        Some("application/octet-stream")
    );
    assert_eq!(response.body, vec![1, 2, 3]);
}
