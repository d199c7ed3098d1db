//! Storage relay library: read, write and watch a single on-chain value.

pub mod blockchain;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod storage;

pub use config::schema::AppConfig;
pub use error::{InteractorError, InteractorResult};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use storage::{ChangeEvent, ContractBinding, EventStream, StorageBinding, ValueInteractor};
