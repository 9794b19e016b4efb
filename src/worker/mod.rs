mod asset_registry;
mod backfill;
mod checkpoint;
mod live;
mod outbox;

pub use asset_registry::AssetRegistry;
pub use backfill::{BackfillCoordinator, BackfillStats};
pub use checkpoint::CheckpointFile;
pub use live::{emit_once, run_emitter, LivePipeline};
pub use outbox::{BatchQueue, Outbox};
