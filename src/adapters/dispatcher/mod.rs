//! Executor dispatcher adapters.

pub mod fake;

pub use fake::FakeExecutorDispatcher;
