//! # Dispatcher Module
//!
//! Routes a request to a resource method, invokes it and converts the result into a response.
//!
//! ## Overview
//!
//! Dispatch runs in three phases over the request path, each consuming a prefix of it:
//!
//! 1. **Root resource**: the registered root classes whose template matches are ranked and the
//!    best one is instantiated through its factory.
//! 2. **Sub-resources**: while path remains, sub-resource methods (complete match) and
//!    sub-resource locators (prefix match) of the current object compete. A winning locator
//!    returns the next resource object; a winning method ends the phase.
//! 3. **Resource method**: the methods matching the rest of the path are filtered by HTTP
//!    method, request `Content-Type` and `Accept`, and the best one is invoked.
//!
//! Any failure becomes an [`ApplicationError`](crate::error::ApplicationError) and goes through
//! exception mapping before it is converted like any other reply.
//!
//! ## Example
//!
//! ```rust
//! use restdispatch::config::DispatcherConfig;
//! use restdispatch::dispatcher::{Dispatcher, Request};
//! use restdispatch::model::{ResourceClass, Returned};
//!
//! struct Hello;
//!
//! let class = ResourceClass::builder::<Hello>("Hello")
//!     .path("/hello")
//!     .factory(|_| Ok(Hello))
//!     .get("", |_, _| Ok(Returned::entity("hi".to_string())))
//!     .build()
//!     .unwrap();
//!
//! let dispatcher = Dispatcher::new(DispatcherConfig::default());
//! assert!(dispatcher.add_root_resource_class(&class));
//!
//! let response = dispatcher.handle(Request::get("/hello"));
//! assert_eq!(response.status, 200);
//! assert_eq!(response.text(), Some("hi"));
//! ```

mod context;
mod convert;
mod core;
mod request;

pub use context::{CallContext, Invocation, RoleChecker};
pub use core::Dispatcher;
pub use request::{Request, Response};
