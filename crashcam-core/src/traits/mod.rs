pub mod crypto_provider;
pub mod fragment_watcher;
pub mod persist_callback;
pub mod storage_gateway;
