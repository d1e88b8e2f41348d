#[cfg(not(any(target_os = "linux", target_os = "android")))]
compile_error!("minibox only works on linux or android");

pub mod container;
pub mod errors;
pub mod image;
pub mod manifest;
pub mod registry;
pub mod rootfs;

pub use crate::{
    container::{Container, ContainerBuilder, ExitStatus},
    image::ImageReference,
    manifest::Manifest,
};
