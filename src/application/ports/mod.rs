pub mod connectivity;
pub mod remote_store;

pub use connectivity::ConnectivitySource;
pub use remote_store::{RemoteDataStore, RemoteStoreError};
