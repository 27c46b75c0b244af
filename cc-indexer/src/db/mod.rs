mod helper;
mod state;
mod types;
mod undo;

pub use state::*;
pub use types::*;
pub use undo::*;
