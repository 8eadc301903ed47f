#[macro_use]
extern crate bitflags;

pub mod devices;
pub mod error;
pub mod settings;
