//! Ad activity analytics — channel-based non-blocking logger with a
//! ClickHouse batch writer.

pub mod logger;

pub use logger::ActivityLogger;
