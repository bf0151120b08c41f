//! Distributed Task Dispatcher (spec §4.4): durable stream delivery, load balancing, dynamic
//! worker scaling, and service health monitoring.

pub mod config;
pub mod domain_types;
pub mod health_monitor;
pub mod load_balancer;
pub mod priority_queue;
pub mod redis_stream;
pub mod scaler;
pub mod stream;
pub mod traits;

pub use config::{
    DispatcherConfig, HealthMonitorConfig, LoadBalancerConfig, ScalingConfig, StreamConfig,
};
pub use domain_types::{
    DeadLetterEntry, EntryId, FailoverEvent, Fields, HealthCheckResult, HealthStatus,
    LoadBalancingStrategy, PendingEntry, PriorityTask, ScalingEvent, ScalingEventType,
    StreamEntry, WorkerMetrics, WorkerState,
};
pub use health_monitor::{FailoverHandler, HealthCheck, HealthMonitor};
pub use load_balancer::LoadBalancer;
pub use priority_queue::TaskPriorityQueue;
pub use redis_stream::RedisStreamStore;
pub use scaler::{Scaler, WorkerRegistry};
pub use stream::InMemoryStreamStore;
pub use traits::{DispatcherError, RawStreamStore, RetryOutcome, StreamStore};
