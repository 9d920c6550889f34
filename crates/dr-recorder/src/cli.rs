use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;

/// Online data-recorder pipeline for a correlator's visibility output
/// (spec §6 "CLI surface").
#[derive(Debug, Parser)]
#[command(name = "dr-recorder", about = "Correlator visibility data-recorder pipeline")]
pub struct Cli {
    /// UDP listen address for the capture producer.
    #[arg(long, default_value = "0.0.0.0")]
    pub address: IpAddr,

    /// UDP listen port for the capture producer.
    #[arg(long, default_value_t = 10_000)]
    pub port: u16,

    /// Replay a canned sky model instead of listening on the wire.
    #[arg(long)]
    pub offline: bool,

    /// Optional `.npy` sky-model file for `--offline` mode.
    #[arg(long)]
    pub sky_model: Option<PathBuf>,

    /// Expected channel count: sizes the live-capture ring up front and,
    /// in `--offline` mode, shapes the synthesized sequence header.
    #[arg(long, default_value_t = 128)]
    pub nchan: u32,

    /// Samples averaged into one integration; only meaningful for
    /// `--offline` mode's synthesized header (live capture derives its
    /// own `navg` from the wire).
    #[arg(long, default_value_t = 24)]
    pub navg: i32,

    /// First channel index; only meaningful for `--offline` mode's
    /// synthesized header.
    #[arg(long, default_value_t = 1_000)]
    pub chan0: i64,

    /// Comma-separated list of CPU core ids, one per stage thread, in the
    /// order Capture, Writer, Statistics, Spectra, Baseline, Imager,
    /// Quota, Command.
    #[arg(long, value_delimiter = ',', default_value = "0,1,2,3,4,5,6,7")]
    pub cores: Vec<usize>,

    /// Number of integrations assembled into a single gulp.
    #[arg(long, default_value_t = 24)]
    pub gulp_size: usize,

    /// Route log output to this file instead of stdout.
    #[arg(long)]
    pub logfile: Option<PathBuf>,

    /// Raise the default log level to DEBUG.
    #[arg(long)]
    pub debug: bool,

    /// Directory measurement-set output is written to.
    #[arg(long, default_value = "./recordings")]
    pub record_directory: PathBuf,

    /// Quota string, e.g. `"1w 2d 3:30"` (weeks, days, hours:minutes).
    #[arg(long)]
    pub record_directory_quota: Option<String>,

    /// Fast mode: shorter integrations, wider per-channel bandwidth,
    /// larger `nint_per_file`.
    #[arg(long)]
    pub quick: bool,

    /// Integrations per output measurement-set file.
    #[arg(long, default_value_t = 1)]
    pub nint_per_file: u32,

    /// Skip tar-archiving the measurement set after close.
    #[arg(long)]
    pub no_tar: bool,

    /// Daemonize: fork into the background after startup.
    #[arg(long)]
    pub fork: bool,

    /// Enable the imager diagnostic stage.
    #[arg(long)]
    pub image: bool,

    /// Directory of `*.bcal` calibration tables.
    #[arg(long)]
    pub cal_dir: Option<PathBuf>,

    /// Name of the station this recorder is attached to.
    #[arg(long, default_value = "ovro")]
    pub station: String,

    /// Number of antenna stands in the fixed layout used for uvw geometry.
    #[arg(long, default_value_t = 48)]
    pub nstand: u32,
}

impl Cli {
    /// `nint_per_file` floor enforced for fast mode (spec §6 "`fast` mode
    /// uses `nint_per_file >= 10`").
    pub fn effective_nint_per_file(&self) -> u32 {
        if self.quick {
            self.nint_per_file.max(10)
        } else {
            self.nint_per_file.max(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_mode_floors_nint_per_file_at_ten() {
        let cli = Cli::parse_from(["dr-recorder", "--quick", "--nint-per-file", "2"]);
        assert_eq!(cli.effective_nint_per_file(), 10);
    }

    #[test]
    fn slow_mode_floors_nint_per_file_at_one() {
        let cli = Cli::parse_from(["dr-recorder", "--nint-per-file", "0"]);
        assert_eq!(cli.effective_nint_per_file(), 1);
    }
}
