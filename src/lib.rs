pub mod charts;
pub mod data;
pub mod logging;
pub mod server;
pub mod state;
