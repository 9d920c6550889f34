use dr_proto::Gulp;
use dr_queue::{MeasurementSetSink, RecordingMeta, SinkError};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

/// Stand-in for the external measurement-set serialization library (spec
/// §1 "out of scope: the measurement-set serialization library"): writes
/// normalized visibilities as a sequence of flat binary files, one per
/// `nint_per_file` integrations, so the rest of the pipeline (archiving,
/// quota eviction, end-to-end file-count scenarios) has something real to
/// drive. Each file starts with a one-line text header of the recording
/// metadata, followed by `(time_tag: i64, fill_level: f32, samples: [f32;
/// re, im] row-major over [T, B, C, P])` records, one per `write` call.
pub struct RawVisibilitySink {
    base_path: PathBuf,
    nint_per_file: u32,
    file_index: u32,
    integrations_in_file: u32,
    writer: Option<BufWriter<File>>,
    output_paths: Vec<PathBuf>,
}

impl RawVisibilitySink {
    pub fn new(base_path: PathBuf, nint_per_file: u32) -> Self {
        Self {
            base_path,
            nint_per_file: nint_per_file.max(1),
            file_index: 0,
            integrations_in_file: 0,
            writer: None,
            output_paths: Vec::new(),
        }
    }

    fn roll_path(&self) -> PathBuf {
        let mut path = self.base_path.clone();
        let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        let filename = match path.extension().map(|e| e.to_string_lossy().into_owned()) {
            Some(ext) => format!("{stem}.{:04}.{ext}", self.file_index),
            None => format!("{stem}.{:04}", self.file_index),
        };
        path.set_file_name(filename);
        path
    }

    fn roll(&mut self) -> Result<(), SinkError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().map_err(|e| SinkError::Io(e.to_string()))?;
        }
        let path = self.roll_path();
        let file = File::create(&path).map_err(|e| SinkError::Io(e.to_string()))?;
        self.output_paths.push(path);
        self.writer = Some(BufWriter::new(file));
        self.integrations_in_file = 0;
        self.file_index += 1;
        Ok(())
    }
}

impl MeasurementSetSink for RawVisibilitySink {
    fn start(&mut self, meta: &RecordingMeta) -> Result<(), SinkError> {
        self.roll()?;
        let writer = self.writer.as_mut().expect("just rolled");
        writeln!(
            writer,
            "station={} chan0={} navg={} nchan={} chan_bw={} npol={}",
            meta.station, meta.chan0, meta.navg, meta.nchan, meta.chan_bw, meta.npol
        )
        .map_err(|e| SinkError::Io(e.to_string()))
    }

    fn write(&mut self, time_tag: i64, gulp: &Gulp, fill_level: f32) -> Result<(), SinkError> {
        let [ntime, ..] = gulp.shape();
        if self.integrations_in_file >= self.nint_per_file {
            self.roll()?;
        }
        let writer = self.writer.as_mut().ok_or_else(|| SinkError::Io("write called before start".into()))?;
        writer.write_all(&time_tag.to_le_bytes()).map_err(|e| SinkError::Io(e.to_string()))?;
        writer.write_all(&fill_level.to_le_bytes()).map_err(|e| SinkError::Io(e.to_string()))?;
        for sample in gulp.data.iter() {
            writer.write_all(&sample.re.to_le_bytes()).map_err(|e| SinkError::Io(e.to_string()))?;
            writer.write_all(&sample.im.to_le_bytes()).map_err(|e| SinkError::Io(e.to_string()))?;
        }
        self.integrations_in_file += ntime.max(1) as u32;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SinkError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().map_err(|e| SinkError::Io(e.to_string()))?;
        }
        Ok(())
    }

    fn output_paths(&self) -> Vec<PathBuf> {
        self.output_paths.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;
    use num_complex::Complex;

    fn meta() -> RecordingMeta {
        RecordingMeta {
            station: "ovro".into(),
            chan0: 1_000,
            navg: 24,
            nchan: 4,
            chan_bw: 23_925.78125,
            npol: 4,
            pols: dr_proto::Pol::ALL,
        }
    }

    #[test]
    fn rolls_over_after_nint_per_file_integrations() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = RawVisibilitySink::new(dir.path().join("rec-0.dat"), 2);
        sink.start(&meta()).unwrap();

        let gulp = Gulp { data: Array4::from_elem((1, 1, 1, 1), Complex::new(1.0f32, 0.0)) };
        for i in 0..4 {
            sink.write(i, &gulp, 1.0).unwrap();
        }
        sink.stop().unwrap();

        // 4 single-integration gulps at nint_per_file=2: start() opens
        // file 0, writes 0/1 fill it to capacity, write 2 rolls to file 1
        // (which then takes writes 2/3).
        assert_eq!(sink.output_paths().len(), 2);
        for path in sink.output_paths() {
            assert!(path.exists());
        }
    }

    #[test]
    fn write_before_start_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = RawVisibilitySink::new(dir.path().join("rec-0.dat"), 2);
        let gulp = Gulp { data: Array4::from_elem((1, 1, 1, 1), Complex::new(0.0f32, 0.0)) };
        assert!(sink.write(0, &gulp, 1.0).is_err());
    }
}
