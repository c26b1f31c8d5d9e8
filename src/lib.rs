pub mod config;
pub mod country;
pub mod http;
pub mod runtime;
