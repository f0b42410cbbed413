pub mod bus;
pub mod clock;

pub use bus::BusTransport;
pub use clock::{Clock, MonotonicClock};
