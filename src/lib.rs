//! Tracking core of the Mora browser extension. Attributes the time spent in the browser to the
//! domain being looked at, groups it into sessions and keeps distracting sites away while focus
//! mode runs.
//!
//! `mora-host` runs the core as a native messaging host next to the extension, `mora` reads what
//! it stored from a terminal.

pub mod browser;
pub mod categories;
pub mod cli;
pub mod fs;
pub mod host;
pub mod report;
pub mod storage;
pub mod tracking;
pub mod utils;
