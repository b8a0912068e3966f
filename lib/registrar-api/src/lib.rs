//! Route registrar data model
//!
//! This library defines the values exchanged between the registrar and the router:
//! - RouteDescriptor: one routable endpoint and its routing metadata
//! - BusServerDescriptor: one message bus broker and its credentials
//! - PrivateInstanceId: identity of this process for one registration session
//! - AdvertisementMessage: the JSON payload published on the register/unregister subjects

pub mod advertisement;
pub mod message_bus;
pub mod route;

pub use advertisement::AdvertisementMessage;
pub use message_bus::BusServerDescriptor;
pub use route::{PrivateInstanceId, RouteDescriptor, RouteValidationError};
