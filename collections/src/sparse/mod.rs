mod inner;
pub mod ring;

pub use ring::Ring;
