//! Queue consumption and per-headline processing.
//!
//! Each consumed message runs through [`Processor::process`]: check the
//! store for the URL, classify the headline text, insert. All four
//! terminal outcomes acknowledge the delivery; only step failures
//! (store or classifier errors after retries) send a message back for
//! redelivery.

mod consumer;
mod processor;

pub use consumer::{run_consumer, ConsumerStats};
pub use processor::{Outcome, ProcessError, Processor};
