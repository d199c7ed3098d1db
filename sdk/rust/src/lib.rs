//! Client for the storage relay HTTP API.

pub mod client;

pub use client::{SetValueResponse, StorageClient, StorageClientError};
