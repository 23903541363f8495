//! rusty-blog/crates/rb-core/src/lib.rs
//!
//! The central domain logic and interface definitions for Rusty-Blog.

pub mod auth;
pub mod error;
pub mod models;
pub mod service;
pub mod slug;
pub mod thread;
pub mod traits;
pub mod views;
pub mod votes;

// Re-exporting for easier access in other crates
pub use error::*;
pub use models::*;
pub use service::BlogService;
pub use traits::*;
pub use views::*;
