pub mod local_store;
mod rows;
pub mod store_provider;

pub use local_store::{DbPool, LocalStore, StoreTransaction};
pub use store_provider::LocalStoreProvider;
