//! Locked file primitives shared by the on-disk store backends.

pub mod operations;
