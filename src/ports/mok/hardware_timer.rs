//! Mok tick source. Nothing fires by itself; tests advance time by
//! calling the kernel's tick entry point directly.

/// Mok hardware timer setup.
pub fn setup_hardware_timer(_tick_hz: u32) {}

/// Mok start of the tick source.
pub fn start_tick() {}
