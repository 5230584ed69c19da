pub mod client;
pub mod common;
pub mod game;
pub mod groups;
pub mod index;
pub mod poems;
pub mod protocol;
pub mod server;
pub mod transport;
