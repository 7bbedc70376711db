pub mod models;
pub mod pii;

pub use models::events::{OccupancyEvent, OccupancyEventKind};
pub use pii::Masked;
