//! Integration test harness for dskit.
//!
//! Every test opens a fresh in-memory client through the public client
//! builder, the same path an application takes.

pub mod test_util;
