//! Streaming playback scheduling and narration highlighting

pub mod chunk_buffer;
pub mod highlight;
pub mod narration;
pub mod scheduler;
pub mod session;
pub mod state;

pub use chunk_buffer::{ChunkBuffer, ChunkDescriptor, InsertOutcome};
pub use highlight::{HighlightDriver, HighlightState};
pub use narration::{NarrationPlayer, NarrationStatus};
pub use scheduler::{spawn_scheduler, SchedulerConfig, SchedulerHandle};
pub use session::{ArrivalOutcome, Effect, PlaybackSession};
pub use state::{PlayerStatus, SentenceInfo};
