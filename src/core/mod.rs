// Core modules implementing the request validation pipeline.
pub mod cache;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod metadata;
pub mod mutability;
pub mod necessity;
pub mod reducer;
pub mod request;
pub mod value;
