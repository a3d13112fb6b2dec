pub mod channel;
pub mod config;
pub mod errors;
pub mod gate;
pub mod job;
pub mod pipeline;
pub mod script;
pub mod store;
pub mod ui;
