pub mod dispatcher;
pub mod perf;
pub mod state;

pub use dispatcher::Server;
pub use state::ServerConfig;
