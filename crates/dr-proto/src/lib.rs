//! Shared data-model types for gulps, visibilities, and polarization
//! products, independent of any particular pipeline stage.

mod geometry;
mod gulp;
pub mod label;
mod monitor;
mod pol;
mod shutdown;

pub use dr_ring::{SequenceHeader, CHAN_BW, FS};
pub use geometry::{
    baseline_index, conjugate_double, uv_distance, uvw_to_wavelengths, zenith_uvw_meters, AntennaLayout, FixedLayout,
};
pub use gulp::{normalize, norm_factor, Gulp, RawGulp};
pub use monitor::{LoggingMonitorSink, MonitorPoint, MonitorSink};
pub use pol::Pol;
pub use shutdown::ShutdownEvent;

/// `B = nstand*(nstand+1)/2`, the number of baselines including autos.
pub const fn baseline_count(nstand: u32) -> u32 {
    SequenceHeader::baseline_count(nstand)
}

/// Baseline index of the autocorrelation of stand `i` among `nstand`
/// stands, per spec §4.5: `i*(2*(nstand-1)+1-i)/2 + i`.
pub const fn auto_baseline_index(i: u32, nstand: u32) -> u32 {
    i * (2 * (nstand - 1) + 1 - i) / 2 + i
}
