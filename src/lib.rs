//! wegent-control-plane — agent-execution control plane: sandbox
//! lifecycle, heartbeat/crash detection, execution running, and the
//! callback plane between executor containers and the manager.

pub mod adapters;
pub mod domain;
pub mod infrastructure;
pub mod services;

