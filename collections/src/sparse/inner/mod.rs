mod bitmask;

pub use bitmask::Core;
