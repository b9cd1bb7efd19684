#[cfg(not(any(target_os = "linux", target_os = "android")))]
compile_error!("conty only works on linux or android");

#[macro_use] extern crate lazy_static;

pub mod cache;
pub mod config;
pub mod env;
pub mod errors;
pub mod handoff;
pub mod image;
pub mod launcher;
pub mod utils;

pub use crate::{
    config::Config,
    handoff::Handoff,
    image::{Header, Marker, SelfImage, StubLayout},
};
