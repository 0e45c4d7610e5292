pub mod api;
pub mod config;
pub mod housekeeping;
pub mod sse;
pub mod ws;
