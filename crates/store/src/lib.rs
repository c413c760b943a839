//! Transactional persistence for the storefront.
//!
//! [`Store`] is the single seam between the services and storage. Each of its
//! methods is one atomic unit of work; [`InMemoryStore`] serializes them behind
//! one lock, [`PostgresStore`] runs them as row-locking transactions.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use query::{LedgerQuery, OrderQuery, ProductQuery};
pub use store::{LedgerStream, Store};
