//! Network layer: headers, responses and the exchange executor

pub mod executor;
pub mod headers;
pub mod response;

pub use executor::NetworkExecutor;
pub use headers::Headers;
pub use response::{parse_charset, NetworkResponse};
