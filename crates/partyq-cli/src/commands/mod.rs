pub mod add;
pub mod common;
pub mod completions;
pub mod list;
pub mod note;
pub mod party;
pub mod queue;
pub mod renormalize;
