//! Storage-agnostic core of the discovery and synchronization service:
//! identifier and version types, the entity model, wire DTOs, the geo
//! coverer, and the async store traits the persistence layer implements.

pub mod api;
pub mod auth;
pub mod error;
pub mod geo;
pub mod ids;
pub mod isa;
pub mod subscription;
pub mod time;
pub mod version;
pub mod wire;

pub use api::{IsaApi, SubscriptionApi};
pub use error::{DssError, DssResult};
pub use geo::Coverer;
pub use ids::{Id, Owner};
pub use isa::IdentificationServiceArea;
pub use subscription::{Subscriber, Subscription};
pub use time::Timestamp;
pub use version::Version;
