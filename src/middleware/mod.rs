// Middleware for resilient upstream calls

pub mod circuit_breaker;

pub use circuit_breaker::{BreakerPolicy, CircuitBreaker, CircuitState};
