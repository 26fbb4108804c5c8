//! Domain models for request and response payloads

pub mod filters;
pub mod item;
pub mod permission;
pub mod price;
pub mod token;
pub mod user;

pub use filters::{Filters, Metadata};
pub use item::{Item, ItemPatch};
pub use permission::Permissions;
pub use price::Price;
pub use token::{Scope, Token};
pub use user::User;
