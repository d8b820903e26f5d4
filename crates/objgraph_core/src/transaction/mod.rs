//! Transactions and the hierarchy that owns them.

mod client;
mod commit;
pub(crate) mod hierarchy;
mod loading;
mod modification;
mod scope;

pub use client::ClientTransaction;
pub use hierarchy::TransactionHierarchy;
pub use scope::TransactionScope;
