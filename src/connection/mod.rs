mod log;
mod monitor;
mod state;

pub use log::{
  EventLog, EVENT_RETENTION_DAYS, LATENCY_RETENTION_HOURS, MAX_EVENTS, MAX_LATENCY_POINTS,
};
pub use monitor::{
  ConnectionMonitor, HealthProbe, MonitorHandle, MonitorSettings, MonitorStatus, WakeOutcome,
};
pub use state::{ConnectionEvent, ConnectionState, EventKind, LatencyPoint};
