//! Diagnostics console for the Cortex-M4 port, carried over defmt. The
//! application supplies the transport (RTT, SWO, or a UART logger).

/// Drain buffered diagnostics. The idle reaper calls this once per loop.
pub fn flush() {
    defmt::flush();
}

pub fn note_overflow() {
    defmt::error!("task stack overflow detected; task terminated");
}
