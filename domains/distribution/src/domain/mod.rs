//! Distribution domain entities, state machine and pure transformations

pub mod entities;
pub mod payload;
pub mod rewrite;
pub mod slug;
pub mod state;
