//! Domain types for the radar core.

pub mod bar;
pub mod calendar;
pub mod instrument;
pub mod series;
pub mod signal;
pub mod snapshot;

pub use bar::Bar;
pub use calendar::TradingCalendar;
pub use instrument::{Instrument, InstrumentError, InstrumentId, ListingStatus};
pub use series::{Series, SeriesError};
pub use signal::{DetectorKind, Direction, Evidence, PatternSignal};
pub use snapshot::{LiveSnapshot, ReferencePoint};
