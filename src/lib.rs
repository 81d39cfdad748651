#![no_std]

pub mod config;
pub mod critical;
pub mod error;
mod list;
pub mod ports;
pub mod semaphore;
pub mod task_manager;
pub mod timer;

#[cfg(feature = "c-library")]
pub mod c_api;

use ports::{Port, PortTrait};

/// One-time system initialization: prepares the port's heap. Call once
/// before creating tasks or semaphores.
pub fn init_system() {
    Port::init_heap();
}
