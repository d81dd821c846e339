pub mod channel;
pub mod keycodes;
pub mod tools;
