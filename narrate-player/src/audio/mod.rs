//! Audio references, resolution and outputs

pub mod output;
pub mod resolver;

pub use output::{AudioOutput, ClockOutput, ClockOutputFactory, OutputEvent, OutputFactory};
pub use resolver::{AudioHandle, AudioResolver, FileResolver, FileStamp, ResolverCache};
