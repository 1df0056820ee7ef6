pub mod config;
pub mod logging;

pub mod cache;
pub mod catalog;
pub mod checksum;
pub mod error;
pub mod fetch;
pub mod request;
pub mod resolver;
pub mod retry;
pub mod storage;

pub use error::AcquireError;
