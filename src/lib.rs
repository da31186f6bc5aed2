//! Concurrent TCP request/response load generator.
//!
//! The `volley` binary drives N workers, each owning one connection and
//! performing M framed exchanges; `volley-echo` is a matching echo server.

pub mod codec;
pub mod driver;
pub mod echo;
pub mod model;
pub mod protocol;
pub mod stats;
pub mod worker;
