//! bucketq: named, persistent FIFO queues over a fjall keyspace.
//!
//! ```no_run
//! use bucketq::Store;
//!
//! # fn main() -> Result<(), bucketq::QueueError> {
//! let store = Store::open_path("jobs.bq")?;
//! store.register("emails")?;
//! store.append("emails", "hello")?;
//! store.append_bulk("emails", &["a", "b", "a"])?;
//!
//! if let Some(handle) = store.peek("emails")? {
//!     // process handle.value(), then acknowledge
//!     handle.dispose()?;
//! }
//! let next = store.pop_once("emails")?;
//! # drop(next);
//! store.close()
//! # }
//! ```

pub mod error;
pub mod id;
pub mod namespace;
pub mod observability;
pub mod store;
pub mod store_dst;

pub use error::{ConfigError, QueueError, StorageError};
pub use id::{IdGenerator, RecordId};
pub use namespace::CollectionId;
pub use store::{BackingLocation, BulkAppend, Disposable, Record, Store, StoreConfig, SyncPolicy};
pub use store_dst::{
    run_store_batch, summarize_store_batch, StoreDSTConfig, StoreDSTHarness, StoreDSTResult,
};
