//! Tab-separated log of scalar quantities.

use crate::output::{Frame, LogQuantity, OutputMode, OutputWriter, open_output};
use crate::{MdError, Result};
use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Writes one row of named quantities every `period` steps.
///
/// The first line is a header: `timestep` followed by the quantity names.
/// Appending to a non-empty file requires the same header, and rows for
/// steps the file already holds are skipped.
pub struct LogWriter {
    path: PathBuf,
    out: BufWriter<File>,
    period: u64,
    quantities: Vec<LogQuantity>,
    last_step: Option<u64>,
}

impl LogWriter {
    pub fn create(
        path: impl AsRef<Path>,
        period: u64,
        quantities: Vec<LogQuantity>,
        mode: OutputMode,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if period == 0 {
            return Err(MdError::config("log: period must be at least 1"));
        }
        if quantities.is_empty() {
            return Err(MdError::config("log: no quantities requested"));
        }
        let (mut file, continuing) = open_output(&path, mode)?;
        let header = header_line(&quantities);

        let mut last_step = None;
        if continuing {
            let existing = scan_log(&mut file).map_err(|e| MdError::output(&path, e))?;
            if existing.header != header {
                return Err(MdError::config(format!(
                    "log: cannot append columns '{}' to {} with columns '{}'",
                    header.replace('\t', " "),
                    path.display(),
                    existing.header.replace('\t', " ")
                )));
            }
            // Drop a partially written trailing row
            file.set_len(existing.len)
                .map_err(|e| MdError::output(&path, e))?;
            file.seek(SeekFrom::End(0))
                .map_err(|e| MdError::output(&path, e))?;
            last_step = existing.last_step;
        }

        let mut writer = Self {
            path,
            out: BufWriter::new(file),
            period,
            quantities,
            last_step,
        };
        if !continuing {
            writeln!(writer.out, "{header}").map_err(|e| MdError::output(&writer.path, e))?;
        }
        Ok(writer)
    }

    pub fn quantities(&self) -> &[LogQuantity] {
        &self.quantities
    }

    /// Last step with a row on file.
    pub fn last_step(&self) -> Option<u64> {
        self.last_step
    }
}

fn header_line(quantities: &[LogQuantity]) -> String {
    let mut line = String::from("timestep");
    for q in quantities {
        line.push('\t');
        line.push_str(q.name());
    }
    line
}

/// Complete contents of an existing log.
struct ExistingLog {
    header: String,
    last_step: Option<u64>,
    /// Length up to the last complete line.
    len: u64,
}

fn scan_log(file: &mut File) -> std::io::Result<ExistingLog> {
    file.seek(SeekFrom::Start(0))?;
    let mut text = String::new();
    file.read_to_string(&mut text)?;
    let complete = text.rfind('\n').map_or(0, |i| i + 1);
    let mut lines = text[..complete].lines();
    let header = lines.next().unwrap_or_default().to_string();
    let last_step = lines
        .rev()
        .find_map(|l| l.split('\t').next()?.parse::<u64>().ok());
    Ok(ExistingLog {
        header,
        last_step,
        len: complete as u64,
    })
}

impl OutputWriter for LogWriter {
    fn path(&self) -> &Path {
        &self.path
    }

    fn period(&self) -> u64 {
        self.period
    }

    fn write(&mut self, frame: &Frame<'_>) -> Result<()> {
        if self.last_step.is_some_and(|last| frame.step <= last) {
            log::debug!(
                "log: step {} already recorded in {}, skipping",
                frame.step,
                self.path.display()
            );
            return Ok(());
        }
        let mut row = frame.step.to_string();
        for q in &self.quantities {
            row.push('\t');
            row.push_str(&format!("{:.10e}", q.value(frame)));
        }
        writeln!(self.out, "{row}").map_err(|e| MdError::output(&self.path, e))?;
        self.last_step = Some(frame.step);
        self.flush()
    }

    fn flush(&mut self) -> Result<()> {
        self.out
            .flush()
            .map_err(|e| MdError::output(&self.path, e))
    }
}
