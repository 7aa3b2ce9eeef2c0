// Library root: re-exports all modules so integration tests can drive the
// application without a socket.

pub mod app;
pub mod protocol;
pub mod ws_server;
