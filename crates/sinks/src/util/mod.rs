//! Shared utilities for writers
//!
//! - **compressor_pool**: Reusable deflate encoders for rotating file writers
//! - **rate_limited_logger**: At most one log line per interval on hot paths

pub mod compressor_pool;
pub mod rate_limited_logger;

pub use compressor_pool::{
    CompressorPool, CompressorPoolMetrics, CompressorPoolMetricsHandle, FILE_BUFFER_SIZE,
    FileSink, PooledCompressor,
};
pub use rate_limited_logger::{DEFAULT_LOG_INTERVAL, MAX_DATA_LOG_LENGTH, RateLimitedLogger};
