//! Request model
//!
//! Requests are built with [`RequestBuilder`], carry a typed parser and an
//! event listener, and are shared with the dispatchers through their
//! type-independent [`RequestCore`].

pub mod builder;
pub mod core;
pub mod parser;
pub mod types;

pub use builder::{Request, RequestBuilder};
pub use self::core::{LocalResponseHook, PrepareHook, RequestCore, RequestHandle};
pub use parser::{decode_text, BytesParser, JsonParser, ResponseParser, TextParser};
pub use types::{Body, Method, Priority};
