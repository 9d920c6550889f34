//! Online data-recorder pipeline binary (spec §5, §6): wires the capture
//! producer, recording queue, writer, diagnostic stages, quota manager,
//! and command processor into one true-parallel, thread-per-stage
//! pipeline, each stage pinned to a configured CPU core.

mod cli;
mod command;
mod layout;
mod logging;
mod mcs;
mod sink;

use anyhow::Context;
use clap::Parser;
use cli::Cli;
use command::{CommandStage, NullCommandSource};
use dr_capture::{CaptureProducer, GulpProducer, OfflineProducer};
use dr_imager::{CalCache, ImagerStage};
use dr_monitor::{BaselineStage, SpectraStage, StatisticsStage};
use dr_proto::{AntennaLayout, LoggingMonitorSink, MonitorSink, SequenceHeader, ShutdownEvent};
use dr_queue::{MeasurementSetSink, RecordingQueue};
use dr_quota::{Quota, QuotaManager};
use dr_ring::{FillLevelQueue, Ring, RingConfig};
use dr_writer::{ArchivingSink, WriterStage};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Polling cadence for both the quota scan and the command processor;
/// the spec leaves both implementation-defined (§4.9 "scan period
/// implementation-defined").
const QUOTA_POLL_INTERVAL: Duration = Duration::from_secs(60);
const COMMAND_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Bounded join deadline before a forced exit, per spec §9's "prefer a
/// bounded join with a forced-exit fallback rather than replicate the
/// [source's] kill literally".
const JOIN_DEADLINE: Duration = Duration::from_secs(10);

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _logging_guard = logging::init(cli.debug, cli.logfile.as_deref());

    let mcs_id = mcs::mcs_identifier(cli.address, cli.port, cli.quick);
    info!(mcs_id, offline = cli.offline, port = cli.port, "starting dr-recorder");

    std::fs::create_dir_all(&cli.record_directory).context("failed to create recording directory")?;

    let shutdown = ShutdownEvent::new();
    install_signal_handlers(Arc::clone(&shutdown)).context("failed to install signal handlers")?;

    let quota = match cli.record_directory_quota.as_deref() {
        Some(value) => {
            let seconds = dr_queue::quota_size(value).map_err(anyhow::Error::msg)?;
            Some(Quota::Duration(Duration::from_secs(seconds)))
        }
        None => None,
    };

    let queue = Arc::new(RecordingQueue::new());
    let fill = Arc::new(FillLevelQueue::new());
    let monitor: Arc<dyn MonitorSink> = Arc::new(LoggingMonitorSink);
    let layout: Arc<dyn AntennaLayout> = Arc::new(layout::default_layout(cli.nstand));

    let nbl = SequenceHeader::baseline_count(cli.nstand);
    let ring: Arc<Ring<dr_proto::RawGulp>> = Ring::new(RingConfig::default());

    let mut handles: Vec<std::thread::JoinHandle<anyhow::Result<()>>> = Vec::new();
    let core = |idx: usize| cli.cores.get(idx).copied();

    // --- Capture or Offline producer (core 0) ---
    let shutdown_c = Arc::clone(&shutdown);
    let ring_c = Arc::clone(&ring);
    let fill_c = Arc::clone(&fill);
    if cli.offline {
        let nstand = cli.nstand;
        let nchan = cli.nchan;
        let navg = cli.navg;
        let chan0 = cli.chan0;
        let fast = cli.quick;
        let gulp_size = cli.gulp_size;
        let sky_model = cli.sky_model.clone();
        ring.resize(offline_ring_config(gulp_size, nbl, nchan)).context("failed to size ring for offline mode")?;
        handles.push(spawn_stage(core(0), "capture", move || {
            let mut producer = OfflineProducer::new(sky_model, nstand, nchan, navg, chan0, fast, gulp_size, ring_c, fill_c)?;
            producer.run(&shutdown_c).map_err(anyhow::Error::from)
        }));
    } else {
        let addr = SocketAddr::new(cli.address, cli.port);
        let fast = cli.quick;
        let gulp_size = cli.gulp_size;
        let nchan = cli.nchan;
        let mut producer = CaptureProducer::new(addr, gulp_size, fast, Arc::clone(&ring), Arc::clone(&fill))
            .context("failed to bind capture socket")?;
        ring.resize(producer.recommended_ring_config(nbl, nchan)).context("failed to size ring for capture mode")?;
        handles.push(spawn_stage(core(0), "capture", move || producer.run(&shutdown_c).map_err(anyhow::Error::from)));
    }

    // --- Writer (core 1) ---
    let writer_reader = ring.read(true);
    let station = cli.station.clone();
    let fast = cli.quick;
    let no_tar = cli.no_tar;
    let nint_per_file = cli.effective_nint_per_file();
    let record_directory = cli.record_directory.clone();
    let make_sink: Arc<dyn Fn(&str) -> Box<dyn MeasurementSetSink> + Send + Sync> = Arc::new(move |name: &str| {
        let path = record_directory.join(name);
        let raw = sink::RawVisibilitySink::new(path, nint_per_file);
        if no_tar {
            Box::new(raw) as Box<dyn MeasurementSetSink>
        } else {
            Box::new(ArchivingSink::new(raw)) as Box<dyn MeasurementSetSink>
        }
    });
    {
        let queue = Arc::clone(&queue);
        let fill = Arc::clone(&fill);
        let monitor = Arc::clone(&monitor);
        let shutdown = Arc::clone(&shutdown);
        handles.push(spawn_stage(core(1), "writer", move || {
            let stage = WriterStage::new(writer_reader, queue, fill, monitor, station, fast);
            stage.run(&shutdown).map_err(anyhow::Error::from)
        }));
    }

    // --- Statistics (core 2) ---
    {
        let reader = ring.read(false);
        let monitor = Arc::clone(&monitor);
        let shutdown = Arc::clone(&shutdown);
        handles.push(spawn_stage(core(2), "statistics", move || {
            StatisticsStage::new(reader, monitor).run(&shutdown).map_err(anyhow::Error::from)
        }));
    }

    // --- Spectra (core 3) ---
    {
        let reader = ring.read(false);
        let monitor = Arc::clone(&monitor);
        let shutdown = Arc::clone(&shutdown);
        handles.push(spawn_stage(core(3), "spectra", move || {
            SpectraStage::new(reader, monitor).run(&shutdown).map_err(anyhow::Error::from)
        }));
    }

    // --- Baseline (core 4) ---
    {
        let reader = ring.read(false);
        let monitor = Arc::clone(&monitor);
        let layout = Arc::clone(&layout);
        let shutdown = Arc::clone(&shutdown);
        handles.push(spawn_stage(core(4), "baseline", move || {
            BaselineStage::new(reader, monitor, layout).run(&shutdown).map_err(anyhow::Error::from)
        }));
    }

    // --- Imager (core 5), only if --image was requested ---
    if cli.image {
        let reader = ring.read(false);
        let monitor = Arc::clone(&monitor);
        let layout = Arc::clone(&layout);
        let cal = CalCache::new(cli.cal_dir.clone());
        let shutdown = Arc::clone(&shutdown);
        handles.push(spawn_stage(core(5), "imager", move || {
            ImagerStage::new(reader, monitor, layout, cal).run(&shutdown).map_err(anyhow::Error::from)
        }));
    }

    // --- Quota manager (core 6) ---
    if let Some(quota) = quota {
        let directory = cli.record_directory.clone();
        let queue = Arc::clone(&queue);
        let shutdown = Arc::clone(&shutdown);
        handles.push(spawn_stage(core(6), "quota", move || {
            QuotaManager::new(directory, quota, QUOTA_POLL_INTERVAL).run(&queue, &shutdown).map_err(anyhow::Error::from)
        }));
    }

    // --- Command processor (core 7) ---
    {
        let queue = Arc::clone(&queue);
        let shutdown = Arc::clone(&shutdown);
        let make_sink = Arc::clone(&make_sink);
        handles.push(spawn_stage(core(7), "command", move || {
            let stage = CommandStage::new(Box::new(NullCommandSource), queue, make_sink, COMMAND_POLL_INTERVAL);
            stage.run(&shutdown).map_err(anyhow::Error::from)
        }));
    }

    join_with_deadline(handles, JOIN_DEADLINE);
    info!("dr-recorder shut down cleanly");
    Ok(())
}

fn spawn_stage(core_id: Option<usize>, name: &'static str, body: impl FnOnce() -> anyhow::Result<()> + Send + 'static) -> std::thread::JoinHandle<anyhow::Result<()>> {
    std::thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            if let Some(id) = core_id {
                if !core_affinity::set_for_current(core_affinity::CoreId { id }) {
                    tracing::warn!(stage = name, core = id, "failed to set core affinity");
                }
            }
            let result = body();
            if let Err(e) = &result {
                tracing::error!(stage = name, error = %e, "stage exited with an error");
            }
            result
        })
        .expect("failed to spawn stage thread")
}

/// Joins every stage thread, but does not wait past `deadline` total: a
/// thread that fails to join in time is abandoned rather than retried
/// indefinitely (spec §9 Open Question on the source's hard `kill -9`).
fn join_with_deadline(handles: Vec<std::thread::JoinHandle<anyhow::Result<()>>>, deadline: Duration) {
    let start = std::time::Instant::now();
    for handle in handles {
        let remaining = deadline.saturating_sub(start.elapsed());
        if remaining.is_zero() {
            tracing::warn!("join deadline exceeded; abandoning remaining stage threads");
            break;
        }
        // `JoinHandle` has no timed join; polling `is_finished` approximates
        // one without pulling in an extra dependency for this single use.
        let poll_deadline = std::time::Instant::now() + remaining;
        while !handle.is_finished() && std::time::Instant::now() < poll_deadline {
            std::thread::sleep(Duration::from_millis(50));
        }
        if handle.is_finished() {
            if let Ok(Err(e)) = handle.join() {
                tracing::error!(error = %e, "stage thread reported an error on join");
            }
        } else {
            tracing::warn!("stage thread did not finish within the join deadline");
        }
    }
}

fn install_signal_handlers(shutdown: Arc<ShutdownEvent>) -> std::io::Result<()> {
    let term_flag = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&term_flag))?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&term_flag))?;
    std::thread::spawn(move || {
        while !term_flag.load(Ordering::Relaxed) {
            std::thread::sleep(Duration::from_millis(100));
        }
        info!("received shutdown signal");
        shutdown.set();
    });
    Ok(())
}

/// Sizing estimate for the offline producer's ring, mirroring
/// `CaptureProducer::recommended_ring_config`'s formula.
fn offline_ring_config(ntime_gulp: usize, nbl: u32, nchan: u32) -> RingConfig {
    let bytes = ntime_gulp * nbl as usize * nchan as usize * 4 * 8;
    RingConfig::new(bytes.max(1), 4)
}
