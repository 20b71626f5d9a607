use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Scalar series names written by the estimator, one value each per
/// `log_summary` call.
pub const LOSS_TAG: &str = "loss";
pub const SCORE_TAG: &str = "score";
pub const MAX_Q_TAG: &str = "batch_max_q";
pub const MEAN_Q_TAG: &str = "batch_mean_q";

/// Append-only sink for per-episode scalar metrics.
///
/// Injected into the estimator at construction so callers (and tests) can
/// substitute their own sink.
pub trait SummaryWriter {
    /// Append one scalar to the named series, keyed by episode index.
    fn add_scalar(&mut self, tag: &str, value: f32, episode: u64) -> io::Result<()>;

    /// Flush buffered records to the underlying sink.
    fn flush(&mut self) -> io::Result<()>;
}

#[derive(serde::Serialize)]
struct ScalarRecord<'a> {
    episode: u64,
    tag: &'a str,
    value: f32,
}

/// File-backed summary writer: one JSON object per line, appended in order.
pub struct JsonlSummaryWriter {
    out: BufWriter<File>,
}

impl JsonlSummaryWriter {
    /// Open (or create) the summary stream at `path`, creating parent
    /// directories as needed. Existing records are kept; new ones append.
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(JsonlSummaryWriter {
            out: BufWriter::new(file),
        })
    }
}

impl SummaryWriter for JsonlSummaryWriter {
    fn add_scalar(&mut self, tag: &str, value: f32, episode: u64) -> io::Result<()> {
        let record = ScalarRecord {
            episode,
            tag,
            value,
        };
        let line = serde_json::to_string(&record).map_err(io::Error::from)?;
        writeln!(self.out, "{}", line)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

/// In-memory summary writer that records every scalar it receives.
///
/// Used by tests to assert on what the estimator logged.
#[derive(Default)]
pub struct RecordingSummaryWriter {
    pub scalars: Vec<(u64, String, f32)>,
    pub flushes: usize,
}

impl SummaryWriter for RecordingSummaryWriter {
    fn add_scalar(&mut self, tag: &str, value: f32, episode: u64) -> io::Result<()> {
        self.scalars.push((episode, tag.to_string(), value));
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flushes += 1;
        Ok(())
    }
}
