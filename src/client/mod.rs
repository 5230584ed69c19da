pub mod machine;

pub use machine::{ClientSm, ClientState, Reaction};
