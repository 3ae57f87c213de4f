//! # restdispatch
//!
//! **restdispatch** routes HTTP requests to annotated-style resource classes: it matches URI
//! templates, walks sub-resource locators, negotiates media types and converts whatever a
//! resource method returns into a response through pluggable entity providers.
//!
//! ## Overview
//!
//! The crate is transport-agnostic. A connector turns its native request into a
//! [`Request`](dispatcher::Request), hands it to [`Dispatcher::handle`](dispatcher::Dispatcher::handle)
//! and writes back the [`Response`](dispatcher::Response).
//!
//! ## Architecture
//!
//! - **[`path`]** - URI template compilation, matching and ranking of competing templates
//! - **[`model`]** - Resource classes, resource methods, sub-resource locators and return values
//! - **[`media`]** - Media types, `Accept*` preferences and content negotiation
//! - **[`providers`]** - Message body readers/writers, exception mappers and context resolvers
//! - **[`dispatcher`]** - The three-phase dispatch and response conversion
//! - **[`error`]** - Fault classes, application errors and dispatch failures
//! - **[`config`]** - Dispatcher settings from YAML/JSON and the environment
//! - **[`telemetry`]** - Optional `tracing` subscriber setup
//!
//! ### Dispatch Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Conn as Connector
//!     participant D as Dispatcher
//!     participant Root as Root resource
//!     participant Loc as Sub-resource locators
//!     participant M as Resource method
//!     participant P as Providers
//!
//!     Conn->>D: handle(Request)
//!     D->>Root: rank matching root templates, instantiate best
//!     loop while path remains
//!         D->>Loc: rank sub-resource methods and locators
//!         Loc-->>D: next resource object
//!     end
//!     D->>M: filter by method, Content-Type, Accept; invoke best
//!     M-->>D: Returned / Reply / ApplicationError
//!     D->>P: negotiate media type, pick writer or exception mapper
//!     P-->>D: body bytes
//!     D-->>Conn: Response
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use restdispatch::{Dispatcher, DispatcherConfig, Request, ResourceClass, Returned};
//!
//! struct Widgets;
//!
//! let widgets = ResourceClass::builder::<Widgets>("Widgets")
//!     .path("/widgets")
//!     .factory(|_| Ok(Widgets))
//!     .get("{id}", |_, inv| {
//!         let id = inv.context().path_param("id").unwrap_or_default();
//!         Ok(Returned::entity(format!("widget {id}")))
//!     })
//!     .build()
//!     .unwrap();
//!
//! let dispatcher = Dispatcher::new(DispatcherConfig::default());
//! dispatcher.add_root_resource_class(&widgets);
//!
//! let response = dispatcher.handle(Request::get("/widgets/7").accept("text/plain"));
//! assert_eq!(response.status, 200);
//! assert_eq!(response.text(), Some("widget 7"));
//! ```
//!
//! ## Logging
//!
//! Every dispatch runs inside a `dispatch` span carrying the request id, method and path.
//! Phase decisions are logged at `debug`, rejected registrations and client errors at `warn`,
//! and server-side failures at `error`. See [`telemetry`] for a ready-made subscriber.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod ids;
pub mod media;
pub mod model;
pub mod path;
pub mod providers;
pub mod telemetry;

pub use config::DispatcherConfig;
pub use dispatcher::{CallContext, Dispatcher, Invocation, Request, Response, RoleChecker};
pub use error::{ApplicationError, DispatchError, FaultClass};
pub use media::MediaType;
pub use model::{MethodDef, Reply, ResourceClass, ResourceObject, Returned};
pub use providers::{Provider, ProviderInstance, Providers};
