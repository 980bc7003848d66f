mod entity;
mod error;
pub mod heading;
mod sample;

pub use entity::EntityState;
pub use error::HistoryError;
pub use heading::Heading;
pub use sample::{decode_history, LatLng, PositionSample};
