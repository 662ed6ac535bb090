//! Queue engine: the producer that feeds the work queue and the consumer
//! that drains it.

pub mod consumer;
pub mod producer;

pub use consumer::{Consumer, ConsumerConfig};
pub use producer::{Producer, Submission};
