//! WebSocket gateway: authenticates a connection, then turns client commands
//! into live messaging subscriptions whose updates are pushed as events.

pub mod connection;
pub mod session;

pub use connection::handle_connection;
pub use session::Session;
