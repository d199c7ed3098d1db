//! Storage value subsystem.
//!
//! # Data Flow
//! ```text
//! read:   interactor → binding.read() → eth_call get()
//! write:  interactor ─lock─▶ transactor.prepare() → binding.write() → wait_until_mined()
//! watch:  binding.subscribe_changes() (websocket or monitor.rs polling)
//!         + binding.filter_changes() backfill
//!         → events.rs EventStream (ordered, de-duplicated)
//! deploy: deploy.rs creation tx → contract address file
//! ```

pub mod binding;
pub mod deploy;
pub mod events;
pub mod interactor;
pub mod monitor;

pub use binding::{ContractBinding, SimpleStorage, StorageBinding};
pub use events::{ChangeEvent, ChangeSubscription, EventStream, SubscriptionFeed};
pub use interactor::{InteractorSettings, ValueInteractor};
