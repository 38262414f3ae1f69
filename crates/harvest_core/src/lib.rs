//! Harvest core: pure pagination state machine and table coalescing.
mod effect;
mod msg;
mod state;
mod table;
mod update;
mod view_model;

pub use effect::{Effect, Pause};
pub use msg::Msg;
pub use state::{PaginationState, Phase, Resume};
pub use table::{HarvestAccumulator, PageResult, Record, SparseTable};
pub use update::update;
pub use view_model::PaginationView;
