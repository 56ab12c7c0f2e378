//! Metrics collection.
//!
//! # Metrics
//! - `prefork_admission_in_use` (gauge): admission slots held in this process
//! - `prefork_connections_accepted_total` (counter)
//! - `prefork_accept_errors_total` (counter)
//! - `prefork_heartbeats_total` (counter): liveness ticks seen by the manager
//! - `prefork_workers_spawned_total` (counter)
//! - `prefork_worker_exits_total` (counter): labelled `outcome=clean|error`

use metrics::{counter, gauge};

pub fn admission_acquired() {
    gauge!("prefork_admission_in_use").increment(1.0);
}

pub fn admission_released() {
    gauge!("prefork_admission_in_use").decrement(1.0);
}

pub fn connection_accepted() {
    counter!("prefork_connections_accepted_total").increment(1);
}

pub fn accept_failed() {
    counter!("prefork_accept_errors_total").increment(1);
}

pub fn heartbeat_received() {
    counter!("prefork_heartbeats_total").increment(1);
}

pub fn worker_spawned() {
    counter!("prefork_workers_spawned_total").increment(1);
}

pub fn worker_exited(clean: bool) {
    let outcome = if clean { "clean" } else { "error" };
    counter!("prefork_worker_exits_total", "outcome" => outcome).increment(1);
}
