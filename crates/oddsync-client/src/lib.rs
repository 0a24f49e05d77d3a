// Library root: re-exports all modules so integration tests and the binary
// can reach the sync engine's public API.

pub mod api;
pub mod connection;
pub mod engine;
pub mod reconcile;
pub mod router;
pub mod store;
pub mod transport;
pub mod visibility;

#[cfg(test)]
mod test_support;
