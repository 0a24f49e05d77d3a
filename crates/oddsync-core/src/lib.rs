// Library root: wire models, push protocol, configuration, and the pure
// win-detection logic shared by the sync client.

pub mod config;
pub mod model;
pub mod protocol;
pub mod wins;
