#![allow(dead_code)]

//! Resource classes shared by the integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use http::{header, HeaderValue, Method, StatusCode};
use restdispatch::error::{ApplicationError, FATAL, INVALID_ARGUMENT, INVALID_STATE, IO};
use restdispatch::model::{MethodDef, Reply, ResourceClass, ResourceObject, Returned};
use restdispatch::{Dispatcher, DispatcherConfig};

/// `/widgets` with literal, templated and media-typed methods.
pub struct Widgets;

pub fn widgets() -> Arc<ResourceClass> {
    ResourceClass::builder::<Widgets>("Widgets")
        .path("/widgets")
        .factory(|_| Ok(Widgets))
        .get("", |_, _| Ok(Returned::entity("all widgets".to_string())))
        .get("{id}", |_, inv| {
            let id = inv.context().path_param("id").unwrap_or_default();
            Ok(Returned::entity(format!("widget {id}")))
        })
        .get("special", |_, _| Ok(Returned::entity("special widget".to_string())))
        .get("{id}/colour", |_, inv| {
            let colour = inv.context().matrix_param("colour");
            Ok(Returned::optional(colour))
        })
        .handle(
            MethodDef::new(Method::GET)
                .path("{id}/details")
                .produces(&["application/json"]),
            |_, inv| {
                let id = inv.context().path_param("id").unwrap_or_default();
                Ok(Returned::entity(serde_json::json!({ "id": id, "kind": "json" })))
            },
        )
        .handle(
            MethodDef::new(Method::GET)
                .path("{id}/details")
                .produces(&["text/xml"]),
            |_, inv| {
                let id = inv.context().path_param("id").unwrap_or_default();
                Ok(Returned::entity(format!("<widget id=\"{id}\"/>")))
            },
        )
        .handle(
            MethodDef::new(Method::GET)
                .path("{id}/payload")
                .consumes(&["application/json"]),
            |_, inv| {
                let id = inv.context().path_param("id").unwrap_or_default();
                Ok(Returned::entity(format!("payload of {id}")))
            },
        )
        .handle(
            MethodDef::new(Method::POST).consumes(&["application/json"]),
            |_, inv| {
                let body: Option<serde_json::Value> = inv.read_entity()?;
                let reply = Reply::new(StatusCode::CREATED)
                    .header(header::LOCATION, HeaderValue::from_static("/widgets/new"))
                    .entity(body.unwrap_or(serde_json::Value::Null));
                Ok(reply.into())
            },
        )
        .handle(
            MethodDef::new(Method::POST).consumes(&["text/plain"]),
            |_, inv| {
                let body: Option<String> = inv.read_entity()?;
                Ok(Returned::entity(format!("text {}", body.unwrap_or_default())))
            },
        )
        .delete("{id}", |_, _| Ok(Returned::Nothing))
        .build()
        .expect("widgets class")
}

/// `/library/books/{isbn}/chapters/{n}` resolved through two locators.
pub struct Library;

pub struct Book {
    pub isbn: String,
}

pub struct Chapter {
    pub isbn: String,
    pub number: String,
}

pub fn chapter_class() -> Arc<ResourceClass> {
    ResourceClass::builder::<Chapter>("Chapter")
        .get("", |chapter, _| {
            Ok(Returned::entity(format!("chapter {} of {}", chapter.number, chapter.isbn)))
        })
        .build()
        .expect("chapter class")
}

pub fn book_class() -> Arc<ResourceClass> {
    let chapter = chapter_class();
    ResourceClass::builder::<Book>("Book")
        .get("", |book, _| Ok(Returned::entity(format!("book {}", book.isbn))))
        .get("matched", |_, inv| {
            let uris: Vec<&str> = inv.context().matched_uris().collect();
            Ok(Returned::entity(uris.join(" | ")))
        })
        .get("owners", |_, inv| {
            let owners: Vec<&str> = inv.context().matched_resources().collect();
            Ok(Returned::entity(owners.join(" | ")))
        })
        .locator("chapters/{n}", move |book, inv| {
            let number = inv.context().path_param("n").unwrap_or_default();
            ResourceObject::new(
                &chapter,
                Chapter {
                    isbn: book.isbn.clone(),
                    number,
                },
            )
        })
        .build()
        .expect("book class")
}

pub fn library() -> Arc<ResourceClass> {
    let book = book_class();
    ResourceClass::builder::<Library>("Library")
        .path("/library")
        .factory(|_| Ok(Library))
        .locator("books/{isbn}", move |_, inv| {
            let isbn = inv.context().path_param("isbn").unwrap_or_default();
            ResourceObject::new(&book, Book { isbn })
        })
        .build()
        .expect("library class")
}

/// `/loop/...` whose locator always returns another instance of itself.
pub struct Looping;

pub fn looping() -> Arc<ResourceClass> {
    let slot: Arc<std::sync::OnceLock<Arc<ResourceClass>>> = Arc::new(std::sync::OnceLock::new());
    let inner = Arc::clone(&slot);
    let class = ResourceClass::builder::<Looping>("Looping")
        .path("/loop")
        .factory(|_| Ok(Looping))
        .get("", |_, _| Ok(Returned::entity("bottom".to_string())))
        .locator("{step}", move |_, _| match inner.get() {
            Some(class) => ResourceObject::new(class, Looping),
            None => Err(ApplicationError::new(&INVALID_STATE, "class not ready")),
        })
        .build()
        .expect("looping class");
    assert!(slot.set(Arc::clone(&class)).is_ok());
    class
}

/// `/faults/{kind}` raising a fault of the named class.
pub struct Faults;

pub fn faults() -> Arc<ResourceClass> {
    ResourceClass::builder::<Faults>("Faults")
        .path("/faults")
        .factory(|_| Ok(Faults))
        .get("state", |_, _| Err(ApplicationError::new(&INVALID_STATE, "bad state")))
        .get("argument", |_, _| {
            Err(ApplicationError::new(&INVALID_ARGUMENT, "bad argument"))
        })
        .get("io", |_, _| Err(ApplicationError::new(&IO, "disk gone")))
        .get("fatal", |_, _| Err(ApplicationError::new(&FATAL, "out of memory")))
        .get("teapot", |_, _| {
            Err(ApplicationError::web(
                Reply::new(StatusCode::IM_A_TEAPOT).entity("short and stout".to_string()),
            ))
        })
        .build()
        .expect("faults class")
}

/// Counts factory calls so tests can check per-request instantiation.
pub struct Counted;

pub fn counted(calls: Arc<AtomicUsize>) -> Arc<ResourceClass> {
    ResourceClass::builder::<Counted>("Counted")
        .path("/counted")
        .factory(move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Counted)
        })
        .get("", |_, _| Ok(Returned::entity("counted".to_string())))
        .build()
        .expect("counted class")
}

/// A dispatcher with the shared resources registered.
pub fn dispatcher() -> Dispatcher {
    dispatcher_with(DispatcherConfig::default())
}

pub fn dispatcher_with(config: DispatcherConfig) -> Dispatcher {
    let dispatcher = Dispatcher::new(config);
    for class in [widgets(), library(), looping(), faults()] {
        assert!(dispatcher.add_root_resource_class(&class));
    }
    dispatcher
}
