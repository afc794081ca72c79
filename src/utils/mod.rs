pub mod clock;
pub mod encoding;
pub mod logging;

pub use clock::{Clock, SystemClock};
