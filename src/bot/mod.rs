pub mod logbook;
pub mod position;
pub mod worker;

pub use logbook::Logbook;
pub use position::{Position, PositionStore};
pub use worker::{spawn_worker, WorkerContext, WorkerHandle};
