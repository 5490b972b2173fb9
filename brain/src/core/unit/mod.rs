mod degree_celsius;
mod percent;
mod watt;

pub use degree_celsius::DegreeCelsius;
pub use percent::Percent;
pub use watt::Watt;
