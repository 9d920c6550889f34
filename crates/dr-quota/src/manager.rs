use crate::QuotaError;
use dr_proto::ShutdownEvent;
use dr_queue::RecordingQueue;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Either unit the operator can configure the recording directory's
/// quota in (spec §4.9 "total bytes (or total time span)"). The CLI's
/// `--record-directory-quota` string (`dr_queue::quota_size`) only ever
/// produces a duration today, so [`Quota::Bytes`] exists for API
/// completeness and direct construction; see DESIGN.md.
#[derive(Debug, Clone, Copy)]
pub enum Quota {
    Bytes(u64),
    Duration(Duration),
}

/// One directory entry discovered by a scan: its total size on disk and
/// its modification time, used both for byte totals and for oldest-first
/// ordering.
struct Entry {
    path: PathBuf,
    bytes: u64,
    mtime: SystemTime,
}

/// Periodically scans the recording directory and evicts the oldest
/// *complete* recordings when the configured quota is exceeded, without
/// ever touching the currently-active operation's files (spec §4.9).
pub struct QuotaManager {
    directory: PathBuf,
    quota: Quota,
    poll_interval: Duration,
}

impl QuotaManager {
    pub fn new(directory: PathBuf, quota: Quota, poll_interval: Duration) -> Self {
        Self { directory, quota, poll_interval }
    }

    /// Runs the scan loop until `shutdown` fires. Entirely independent of
    /// the writer's own progress: a slow or stalled scan never blocks a
    /// gulp from being written (spec §4.9 "must not block the writer").
    pub fn run(self, queue: &RecordingQueue, shutdown: &ShutdownEvent) -> Result<(), QuotaError> {
        while !shutdown.is_set() {
            match self.scan_once(queue) {
                Ok(deleted) if deleted > 0 => tracing::info!(deleted, "quota eviction removed recordings"),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "quota scan failed"),
            }
            sleep_in_chunks(self.poll_interval, shutdown);
        }
        Ok(())
    }

    /// Scans the directory once, deleting oldest-first until the
    /// configured quota is satisfied. Returns the number of paths
    /// deleted. Never deletes a path belonging to the currently-active
    /// recording op.
    pub fn scan_once(&self, queue: &RecordingQueue) -> Result<usize, QuotaError> {
        if !self.directory.exists() {
            return Ok(0);
        }

        let active = active_paths(queue);
        let mut entries = scan_directory(&self.directory)?;
        entries.sort_by_key(|e| e.mtime);

        let mut deleted = 0;
        while over_quota(&entries, self.quota) {
            let Some(idx) = entries.iter().position(|e| !active.contains(&e.path)) else {
                // everything left belongs to the active op; quota stays
                // over until it finishes, by design.
                break;
            };
            let victim = entries.remove(idx);
            remove_path(&victim.path)?;
            deleted += 1;
        }

        Ok(deleted)
    }
}

fn active_paths(queue: &RecordingQueue) -> Vec<PathBuf> {
    queue.with_active(unix_now(), |op| op.output_paths()).unwrap_or_default()
}

fn unix_now() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
}

fn scan_directory(dir: &Path) -> Result<Vec<Entry>, QuotaError> {
    let mut entries = Vec::new();
    let read_dir = std::fs::read_dir(dir).map_err(|e| QuotaError::Scan { path: dir.display().to_string(), source: e })?;
    for item in read_dir {
        let item = item.map_err(|e| QuotaError::Scan { path: dir.display().to_string(), source: e })?;
        let path = item.path();
        let bytes = dir_size(&path)?;
        let mtime = item
            .metadata()
            .and_then(|m| m.modified())
            .map_err(|e| QuotaError::Scan { path: path.display().to_string(), source: e })?;
        entries.push(Entry { path, bytes, mtime });
    }
    Ok(entries)
}

/// Recursively sums a path's size; measurement sets may be directories
/// (the CASA table convention) rather than single files.
fn dir_size(path: &Path) -> Result<u64, QuotaError> {
    let metadata = std::fs::metadata(path).map_err(|e| QuotaError::Scan { path: path.display().to_string(), source: e })?;
    if !metadata.is_dir() {
        return Ok(metadata.len());
    }
    let mut total = 0u64;
    let read_dir = std::fs::read_dir(path).map_err(|e| QuotaError::Scan { path: path.display().to_string(), source: e })?;
    for item in read_dir {
        let item = item.map_err(|e| QuotaError::Scan { path: path.display().to_string(), source: e })?;
        total += dir_size(&item.path())?;
    }
    Ok(total)
}

fn over_quota(entries: &[Entry], quota: Quota) -> bool {
    if entries.is_empty() {
        return false;
    }
    match quota {
        Quota::Bytes(limit) => entries.iter().map(|e| e.bytes).sum::<u64>() > limit,
        Quota::Duration(limit) => {
            let oldest = entries.iter().map(|e| e.mtime).min().expect("non-empty");
            let newest = entries.iter().map(|e| e.mtime).max().expect("non-empty");
            newest.duration_since(oldest).unwrap_or_default() > limit
        }
    }
}

fn remove_path(path: &Path) -> Result<(), QuotaError> {
    let metadata = std::fs::metadata(path).map_err(|e| QuotaError::Delete { path: path.display().to_string(), source: e })?;
    let result = if metadata.is_dir() { std::fs::remove_dir_all(path) } else { std::fs::remove_file(path) };
    result.map_err(|e| QuotaError::Delete { path: path.display().to_string(), source: e })
}

fn sleep_in_chunks(total: Duration, shutdown: &ShutdownEvent) {
    const STEP: Duration = Duration::from_millis(200);
    let mut remaining = total;
    while remaining > Duration::ZERO && !shutdown.is_set() {
        let chunk = remaining.min(STEP);
        std::thread::sleep(chunk);
        remaining -= chunk;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dr_queue::MeasurementSetSink;
    use std::fs;

    struct NullSink;
    impl MeasurementSetSink for NullSink {
        fn start(&mut self, _meta: &dr_queue::RecordingMeta) -> Result<(), dr_queue::SinkError> {
            Ok(())
        }
        fn write(&mut self, _time_tag: i64, _gulp: &dr_proto::Gulp, _fill_level: f32) -> Result<(), dr_queue::SinkError> {
            Ok(())
        }
        fn stop(&mut self) -> Result<(), dr_queue::SinkError> {
            Ok(())
        }
        fn output_paths(&self) -> Vec<PathBuf> {
            vec![]
        }
    }

    fn factory(_: &str) -> Box<dyn MeasurementSetSink> {
        Box::new(NullSink)
    }

    #[test]
    fn bytes_quota_deletes_oldest_first_until_under_limit() {
        let dir = tempfile::tempdir().unwrap();
        for (name, size) in [("a.ms", 100), ("b.ms", 100), ("c.ms", 100)] {
            let path = dir.path().join(name);
            fs::write(&path, vec![0u8; size]).unwrap();
            std::thread::sleep(Duration::from_millis(5));
        }

        let queue = RecordingQueue::new();
        let _ = queue.enqueue(0.0, 0.0, "x-{start}.ms", factory); // never active: window empty

        let manager = QuotaManager::new(dir.path().to_path_buf(), Quota::Bytes(150), Duration::from_secs(60));
        let deleted = manager.scan_once(&queue).unwrap();

        assert_eq!(deleted, 2);
        assert!(!dir.path().join("a.ms").exists());
        assert!(!dir.path().join("b.ms").exists());
        assert!(dir.path().join("c.ms").exists());
    }

    #[test]
    fn never_deletes_the_active_recording() {
        let dir = tempfile::tempdir().unwrap();
        let active_path = dir.path().join("active.ms");
        fs::write(&active_path, vec![0u8; 500]).unwrap();

        let queue = RecordingQueue::new();
        let id = queue.enqueue(0.0, 1_000_000_000.0, "active-{start}.ms", move |_name| {
            struct ActiveSink(PathBuf);
            impl MeasurementSetSink for ActiveSink {
                fn start(&mut self, _meta: &dr_queue::RecordingMeta) -> Result<(), dr_queue::SinkError> {
                    Ok(())
                }
                fn write(&mut self, _time_tag: i64, _gulp: &dr_proto::Gulp, _fill_level: f32) -> Result<(), dr_queue::SinkError> {
                    Ok(())
                }
                fn stop(&mut self) -> Result<(), dr_queue::SinkError> {
                    Ok(())
                }
                fn output_paths(&self) -> Vec<PathBuf> {
                    vec![self.0.clone()]
                }
            }
            Box::new(ActiveSink(active_path.clone()))
        });
        queue
            .with_active(unix_now(), |op| {
                op.start(&dr_queue::RecordingMeta {
                    station: "ovro".into(),
                    chan0: 0,
                    navg: 24,
                    nchan: 1,
                    chan_bw: 23_925.78125,
                    npol: 4,
                    pols: [dr_proto::Pol::Xx, dr_proto::Pol::Xy, dr_proto::Pol::Yx, dr_proto::Pol::Yy],
                })
            })
            .expect("op scheduled to cover now")
            .unwrap();
        let _ = id;

        let manager = QuotaManager::new(dir.path().to_path_buf(), Quota::Bytes(0), Duration::from_secs(60));
        let deleted = manager.scan_once(&queue).unwrap();

        assert_eq!(deleted, 0);
        assert!(dir.path().join("active.ms").exists());
    }
}
