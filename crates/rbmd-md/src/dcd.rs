//! CHARMM DCD trajectory output.
//!
//! Little-endian, Fortran unformatted records. The header stores the frame
//! count, the step of the first frame and the step interval, so frame `k`
//! belongs to step `start + k * period`. Each frame carries a unit-cell record
//! followed by single-precision x, y and z coordinate records.

use crate::output::{Frame, OutputMode, OutputWriter, open_output};
use crate::{MdError, Result};
use rbmd_math::Vec3;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const HEADER_BYTES: u64 = 92 + 172 + 12;
const NSET_OFFSET: u64 = 8;
const NSTEP_OFFSET: u64 = 20;

fn frame_bytes(natoms: u32) -> u64 {
    56 + 3 * (8 + 4 * natoms as u64)
}

/// Header fields of a DCD file.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DcdHeader {
    pub n_frames: u32,
    pub start_step: u64,
    pub period: u64,
    pub natoms: u32,
    pub dt: f32,
}

/// Trajectory writer producing DCD files.
pub struct DcdWriter {
    path: PathBuf,
    out: BufWriter<File>,
    period: u64,
    dt: f32,
    header: Option<DcdHeader>,
}

impl DcdWriter {
    /// Open `path` for writing every `period` steps. `dt` is recorded in the
    /// header for readers that convert frames to time.
    pub fn create(path: impl AsRef<Path>, period: u64, dt: f64, mode: OutputMode) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if period == 0 {
            return Err(MdError::config("dcd: period must be at least 1"));
        }
        header_int("period", period)?;
        let (mut file, continuing) = open_output(&path, mode)?;

        let header = if continuing {
            let header = read_header(&mut file).map_err(|e| MdError::output(&path, e))?;
            if header.period != period {
                return Err(MdError::config(format!(
                    "dcd: cannot append to {} written with period {} using period {period}",
                    path.display(),
                    header.period
                )));
            }
            // Drop a partially written trailing frame
            let end = HEADER_BYTES + header.n_frames as u64 * frame_bytes(header.natoms);
            file.set_len(end).map_err(|e| MdError::output(&path, e))?;
            file.seek(SeekFrom::End(0))
                .map_err(|e| MdError::output(&path, e))?;
            log::info!(
                "dcd: appending to {} after {} frames",
                path.display(),
                header.n_frames
            );
            Some(header)
        } else {
            None
        };

        Ok(Self {
            path,
            out: BufWriter::new(file),
            period,
            dt: dt as f32,
            header,
        })
    }

    pub fn n_frames(&self) -> u32 {
        self.header.map_or(0, |h| h.n_frames)
    }

    /// Header of an empty trajectory starting at step `start`.
    fn write_header(&mut self, start: i32, period: i32, natoms: i32) -> std::io::Result<()> {
        let w = &mut self.out;
        w.write_all(&84i32.to_le_bytes())?;
        w.write_all(b"CORD")?;
        let mut icntrl = [0i32; 20];
        icntrl[1] = start;
        icntrl[2] = period;
        icntrl[3] = start;
        icntrl[9] = self.dt.to_bits() as i32;
        icntrl[10] = 1;
        icntrl[19] = 24;
        for v in icntrl {
            w.write_all(&v.to_le_bytes())?;
        }
        w.write_all(&84i32.to_le_bytes())?;

        w.write_all(&164i32.to_le_bytes())?;
        w.write_all(&2i32.to_le_bytes())?;
        for title in ["Created by rbmd", "rigid-body molecular dynamics"] {
            let mut line = [b' '; 80];
            line[..title.len()].copy_from_slice(title.as_bytes());
            w.write_all(&line)?;
        }
        w.write_all(&164i32.to_le_bytes())?;

        w.write_all(&4i32.to_le_bytes())?;
        w.write_all(&natoms.to_le_bytes())?;
        w.write_all(&4i32.to_le_bytes())?;
        Ok(())
    }

    fn write_frame(&mut self, frame: &Frame<'_>) -> std::io::Result<()> {
        let w = &mut self.out;
        let l = frame.sim_box.lengths();
        // Unit cell: a, cos(gamma), b, cos(beta), cos(alpha), c
        w.write_all(&48i32.to_le_bytes())?;
        for v in [l.x, 0.0, l.y, 0.0, 0.0, l.z] {
            w.write_all(&v.to_le_bytes())?;
        }
        w.write_all(&48i32.to_le_bytes())?;

        let marker = (4 * frame.particles.len()) as i32;
        for d in 0..3 {
            w.write_all(&marker.to_le_bytes())?;
            for x in &frame.particles.pos {
                w.write_all(&(x[d] as f32).to_le_bytes())?;
            }
            w.write_all(&marker.to_le_bytes())?;
        }
        Ok(())
    }

    /// Patch the frame count and last step in the header.
    fn update_header(&mut self, n_frames: i32, last_step: i32) -> std::io::Result<()> {
        self.out.seek(SeekFrom::Start(NSET_OFFSET))?;
        self.out.write_all(&n_frames.to_le_bytes())?;
        self.out.seek(SeekFrom::Start(NSTEP_OFFSET))?;
        self.out.write_all(&last_step.to_le_bytes())?;
        self.out.seek(SeekFrom::End(0))?;
        Ok(())
    }
}

impl OutputWriter for DcdWriter {
    fn path(&self) -> &Path {
        &self.path
    }

    fn period(&self) -> u64 {
        self.period
    }

    fn write(&mut self, frame: &Frame<'_>) -> Result<()> {
        let step = header_int("step", frame.step)?;
        let natoms_field = header_int("particle count", frame.particles.len() as u64)?;
        let natoms = natoms_field as u32;
        header_int("coordinate record length", 4 * natoms as u64)?;
        let mut header = match self.header {
            Some(h) => h,
            None => {
                let period = header_int("period", self.period)?;
                self.write_header(step, period, natoms_field)
                    .map_err(|e| MdError::output(&self.path, e))?;
                let h = DcdHeader {
                    n_frames: 0,
                    start_step: frame.step,
                    period: self.period,
                    natoms,
                    dt: self.dt,
                };
                self.header = Some(h);
                h
            }
        };

        if header.natoms != natoms {
            return Err(MdError::config(format!(
                "dcd: {} holds {} particles, frame has {natoms}",
                self.path.display(),
                header.natoms
            )));
        }
        let expected = header.start_step + header.n_frames as u64 * header.period;
        if header.n_frames > 0 && frame.step < expected {
            // Restarting from a step the file already holds
            log::debug!(
                "dcd: step {} already recorded in {}, skipping",
                frame.step,
                self.path.display()
            );
            return Ok(());
        }
        if frame.step != expected {
            log::warn!(
                "dcd: frame at step {} recorded where step {expected} is expected",
                frame.step
            );
        }

        let n_frames = header_int("frame count", header.n_frames as u64 + 1)?;
        self.write_frame(frame)
            .map_err(|e| MdError::output(&self.path, e))?;
        header.n_frames += 1;
        self.update_header(n_frames, step)
            .map_err(|e| MdError::output(&self.path, e))?;
        self.header = Some(header);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.out
            .flush()
            .map_err(|e| MdError::output(&self.path, e))
    }
}

/// DCD header fields are signed 32-bit integers.
fn header_int(what: &str, value: u64) -> Result<i32> {
    i32::try_from(value).map_err(|_| {
        MdError::config(format!(
            "dcd: {what} {value} does not fit the 32-bit header field"
        ))
    })
}

fn read_i32(r: &mut impl Read) -> std::io::Result<i32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(i32::from_le_bytes(b))
}

fn invalid(msg: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, msg.to_string())
}

fn read_header(file: &mut File) -> std::io::Result<DcdHeader> {
    file.seek(SeekFrom::Start(0))?;
    let mut r = BufReader::new(&mut *file);
    if read_i32(&mut r)? != 84 {
        return Err(invalid("not a DCD file: bad first record marker"));
    }
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if &magic != b"CORD" {
        return Err(invalid("not a DCD file: missing CORD magic"));
    }
    let mut icntrl = [0i32; 20];
    for v in icntrl.iter_mut() {
        *v = read_i32(&mut r)?;
    }
    read_i32(&mut r)?;

    let title_len = read_i32(&mut r)?;
    let mut skip = vec![0u8; title_len.max(0) as usize + 4];
    r.read_exact(&mut skip)?;

    read_i32(&mut r)?;
    let natoms = read_i32(&mut r)?;
    read_i32(&mut r)?;

    Ok(DcdHeader {
        n_frames: icntrl[0].max(0) as u32,
        start_step: icntrl[1].max(0) as u64,
        period: icntrl[2].max(0) as u64,
        natoms: natoms.max(0) as u32,
        dt: f32::from_bits(icntrl[9] as u32),
    })
}

/// One trajectory frame read back from a DCD file.
#[derive(Clone, Debug)]
pub struct DcdFrame {
    pub step: u64,
    pub box_lengths: Vec3,
    pub positions: Vec<Vec3>,
}

/// Sequential reader for files produced by [`DcdWriter`].
pub struct DcdReader {
    header: DcdHeader,
    input: BufReader<File>,
    next: u32,
}

impl DcdReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path).map_err(|e| MdError::output(path, e))?;
        let header = read_header(&mut file).map_err(|e| MdError::output(path, e))?;
        file.seek(SeekFrom::Start(HEADER_BYTES))
            .map_err(|e| MdError::output(path, e))?;
        Ok(Self {
            header,
            input: BufReader::new(file),
            next: 0,
        })
    }

    pub fn header(&self) -> &DcdHeader {
        &self.header
    }

    /// Read the next frame, or `None` after the last one.
    pub fn next_frame(&mut self) -> Result<Option<DcdFrame>> {
        if self.next >= self.header.n_frames {
            return Ok(None);
        }
        let frame = self.read_frame()?;
        self.next += 1;
        Ok(Some(frame))
    }

    /// Read all remaining frames.
    pub fn frames(&mut self) -> Result<Vec<DcdFrame>> {
        let mut out = Vec::new();
        while let Some(f) = self.next_frame()? {
            out.push(f);
        }
        Ok(out)
    }

    fn read_frame(&mut self) -> Result<DcdFrame> {
        let r = &mut self.input;
        let n = self.header.natoms as usize;

        read_i32(r)?;
        let mut cell = [0f64; 6];
        for v in cell.iter_mut() {
            let mut b = [0u8; 8];
            r.read_exact(&mut b)?;
            *v = f64::from_le_bytes(b);
        }
        read_i32(r)?;

        let mut positions = vec![Vec3::zeros(); n];
        for d in 0..3 {
            read_i32(r)?;
            for x in positions.iter_mut() {
                let mut b = [0u8; 4];
                r.read_exact(&mut b)?;
                x[d] = f32::from_le_bytes(b) as f64;
            }
            read_i32(r)?;
        }

        Ok(DcdFrame {
            step: self.header.start_step + self.next as u64 * self.header.period,
            box_lengths: Vec3::new(cell[0], cell[2], cell[5]),
            positions,
        })
    }
}
