//! Adapters implementing the domain ports against concrete infrastructure.

pub mod dispatcher;
pub mod http;
pub mod redis;
