//! Block decoding: raw extrinsics and events in, priced domain records out.

mod block_index;
mod bridge;
mod classifier;
mod liquidity;
pub mod value;

pub use block_index::BlockIndex;
pub use bridge::network_for;
pub use classifier::Classifier;
