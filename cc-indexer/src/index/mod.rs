mod block;
mod delta;
mod indexer;
mod mempool;

pub use block::*;
pub use delta::*;
pub use indexer::*;
pub use mempool::*;
