use dr_proto::Gulp;
use dr_queue::{MeasurementSetSink, RecordingMeta, SinkError};
use std::path::PathBuf;

/// Wraps another sink and, on `stop`, tars up everything it produced into
/// a single `.tar` file alongside it (spec §4.4 "optionally tar-archived
/// after close"). The inner sink is the external measurement-set library
/// adapter; this decorator only owns the archival step.
pub struct ArchivingSink<S> {
    inner: S,
}

impl<S: MeasurementSetSink> ArchivingSink<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    fn archive(&self) -> std::io::Result<PathBuf> {
        let paths = self.inner.output_paths();
        let Some(first) = paths.first() else {
            return Err(std::io::Error::new(std::io::ErrorKind::NotFound, "nothing to archive"));
        };
        let archive_path = first.with_extension("tar");
        let file = std::fs::File::create(&archive_path)?;
        let mut builder = tar::Builder::new(file);
        for path in &paths {
            let name = path.file_name().ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "output path has no file name")
            })?;
            builder.append_path_with_name(path, name)?;
        }
        builder.finish()?;
        Ok(archive_path)
    }
}

impl<S: MeasurementSetSink> MeasurementSetSink for ArchivingSink<S> {
    fn start(&mut self, meta: &RecordingMeta) -> Result<(), SinkError> {
        self.inner.start(meta)
    }

    fn write(&mut self, time_tag: i64, gulp: &Gulp, fill_level: f32) -> Result<(), SinkError> {
        self.inner.write(time_tag, gulp, fill_level)
    }

    fn stop(&mut self) -> Result<(), SinkError> {
        self.inner.stop()?;
        match self.archive() {
            Ok(path) => {
                tracing::info!(path = %path.display(), "archived measurement set");
                Ok(())
            }
            Err(e) => Err(SinkError::Io(format!("archival failed: {e}"))),
        }
    }

    fn output_paths(&self) -> Vec<PathBuf> {
        self.inner.output_paths()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FileSink {
        path: PathBuf,
        started: bool,
    }

    impl MeasurementSetSink for FileSink {
        fn start(&mut self, _meta: &RecordingMeta) -> Result<(), SinkError> {
            std::fs::write(&self.path, b"ms contents").map_err(|e| SinkError::Io(e.to_string()))?;
            self.started = true;
            Ok(())
        }
        fn write(&mut self, _time_tag: i64, _gulp: &Gulp, _fill_level: f32) -> Result<(), SinkError> {
            Ok(())
        }
        fn stop(&mut self) -> Result<(), SinkError> {
            Ok(())
        }
        fn output_paths(&self) -> Vec<PathBuf> {
            if self.started {
                vec![self.path.clone()]
            } else {
                vec![]
            }
        }
    }

    #[test]
    fn stop_produces_a_tar_file_next_to_the_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rec.ms");
        let mut sink = ArchivingSink::new(FileSink { path: path.clone(), started: false });

        let meta = RecordingMeta {
            station: "ovro".into(),
            chan0: 0,
            navg: 24,
            nchan: 1,
            chan_bw: 23_925.78125,
            npol: 4,
            pols: dr_proto::Pol::ALL,
        };
        sink.start(&meta).unwrap();
        sink.stop().unwrap();

        assert!(path.with_extension("tar").exists());
    }
}
