//! SEG-Y reader and writer.
//!
//! This module provides:
//! - Parsing of the textual, binary and trace headers of a SEG-Y file
//! - Extraction of two configurable integer header words (inline/crossline)
//! - Sequential decoding of trace samples into `f32`
//! - A small rev-1 writer used to synthesize survey files
//!
//! Byte positions follow the SEG-Y convention: 1-based, relative to the start
//! of the 240-byte trace header.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Size of the textual (EBCDIC/ASCII) file header.
pub const TEXT_HEADER_LEN: usize = 3200;

/// Size of the binary file header.
pub const BINARY_HEADER_LEN: usize = 400;

/// Size of each trace header.
pub const TRACE_HEADER_LEN: usize = 240;

/// Default byte position of the inline number in trace headers.
pub const DEFAULT_INLINE_BYTE: u16 = 189;

/// Default byte position of the crossline number in trace headers.
pub const DEFAULT_CROSSLINE_BYTE: u16 = 193;

// Offsets inside the binary header (0-based, relative to its start).
const BIN_SAMPLE_INTERVAL: usize = 16;
const BIN_SAMPLES_PER_TRACE: usize = 20;
const BIN_FORMAT_CODE: usize = 24;
const BIN_REVISION: usize = 300;
const BIN_FIXED_LENGTH: usize = 302;
const BIN_EXTENDED_HEADERS: usize = 304;

// Offsets inside the trace header (0-based).
const TRACE_SEQUENCE_LINE: usize = 0;
const TRACE_SAMPLE_COUNT: usize = 114;
const TRACE_SAMPLE_INTERVAL: usize = 116;

/// Errors that can occur while reading or writing SEG-Y files.
#[derive(Error, Debug)]
pub enum SegyError {
    #[error("IO error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("file '{0}' is too short to hold SEG-Y headers")]
    Truncated(PathBuf),

    #[error("unsupported data sample format code {0}")]
    UnsupportedFormat(i16),

    #[error("file '{path}' holds no traces")]
    EmptyTraceSet { path: PathBuf },

    #[error("trace length is zero samples in '{0}'")]
    ZeroSamples(PathBuf),

    #[error("payload of {payload} bytes is not a multiple of the {trace_len}-byte trace length")]
    RaggedTraces { payload: u64, trace_len: u64 },

    #[error("invalid header byte position {0}: must be within 1..=237")]
    InvalidByteOffset(u16),

    #[error("inline and crossline byte positions must differ (both are {0})")]
    DuplicateByteOffset(u16),

    #[error("trace index {index} out of range ({count} traces)")]
    TraceOutOfRange { index: usize, count: usize },

    #[error("trace {index} holds {found} samples, expected {expected}")]
    SampleCountMismatch {
        index: usize,
        found: usize,
        expected: usize,
    },
}

/// Result type for SEG-Y operations.
pub type Result<T> = std::result::Result<T, SegyError>;

/// Byte order of the binary parts of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    BigEndian,
    LittleEndian,
}

impl ByteOrder {
    fn i16(self, bytes: &[u8]) -> i16 {
        let raw = [bytes[0], bytes[1]];
        match self {
            ByteOrder::BigEndian => i16::from_be_bytes(raw),
            ByteOrder::LittleEndian => i16::from_le_bytes(raw),
        }
    }

    fn u32(self, bytes: &[u8]) -> u32 {
        let raw = [bytes[0], bytes[1], bytes[2], bytes[3]];
        match self {
            ByteOrder::BigEndian => u32::from_be_bytes(raw),
            ByteOrder::LittleEndian => u32::from_le_bytes(raw),
        }
    }

    fn i32(self, bytes: &[u8]) -> i32 {
        self.u32(bytes) as i32
    }

    fn put_i16(self, out: &mut [u8], value: i16) {
        let raw = match self {
            ByteOrder::BigEndian => value.to_be_bytes(),
            ByteOrder::LittleEndian => value.to_le_bytes(),
        };
        out[..2].copy_from_slice(&raw);
    }

    fn put_u32(self, out: &mut [u8], value: u32) {
        let raw = match self {
            ByteOrder::BigEndian => value.to_be_bytes(),
            ByteOrder::LittleEndian => value.to_le_bytes(),
        };
        out[..4].copy_from_slice(&raw);
    }
}

/// Data sample encoding declared in the binary header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// Code 1: 4-byte IBM hexadecimal floating point.
    IbmFloat32,
    /// Code 2: 4-byte two's complement integer.
    Int32,
    /// Code 3: 2-byte two's complement integer.
    Int16,
    /// Code 5: 4-byte IEEE floating point.
    IeeeFloat32,
    /// Code 8: 1-byte two's complement integer.
    Int8,
}

impl SampleFormat {
    /// Map a binary-header format code to a sample format.
    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            1 => Some(Self::IbmFloat32),
            2 => Some(Self::Int32),
            3 => Some(Self::Int16),
            5 => Some(Self::IeeeFloat32),
            8 => Some(Self::Int8),
            _ => None,
        }
    }

    /// The binary-header code of this format.
    pub fn code(self) -> i16 {
        match self {
            Self::IbmFloat32 => 1,
            Self::Int32 => 2,
            Self::Int16 => 3,
            Self::IeeeFloat32 => 5,
            Self::Int8 => 8,
        }
    }

    /// Bytes used by one sample.
    #[inline]
    pub fn sample_size(self) -> usize {
        match self {
            Self::IbmFloat32 | Self::Int32 | Self::IeeeFloat32 => 4,
            Self::Int16 => 2,
            Self::Int8 => 1,
        }
    }

    fn decode(self, order: ByteOrder, bytes: &[u8]) -> f32 {
        match self {
            Self::IbmFloat32 => ibm_to_f32(order.u32(bytes)),
            Self::IeeeFloat32 => f32::from_bits(order.u32(bytes)),
            Self::Int32 => order.i32(bytes) as f32,
            Self::Int16 => order.i16(bytes) as f32,
            Self::Int8 => bytes[0] as i8 as f32,
        }
    }
}

/// Convert a 32-bit IBM System/360 float to IEEE `f32`.
pub fn ibm_to_f32(bits: u32) -> f32 {
    let mantissa = bits & 0x00ff_ffff;
    if mantissa == 0 {
        return 0.0;
    }
    let sign = if bits >> 31 == 0 { 1.0 } else { -1.0 };
    let exponent = ((bits >> 24) & 0x7f) as i32 - 64;
    let fraction = mantissa as f64 / 16_777_216.0;
    (sign * fraction * 16f64.powi(exponent)) as f32
}

/// Convert an IEEE `f32` to a 32-bit IBM System/360 float.
///
/// Values outside the IBM range saturate; precision loss follows the
/// 24-bit hexadecimal mantissa.
pub fn f32_to_ibm(value: f32) -> u32 {
    if value == 0.0 || !value.is_finite() {
        return 0;
    }
    let sign: u32 = if value < 0.0 { 0x8000_0000 } else { 0 };
    let mut fraction = (value as f64).abs();
    let mut exponent: i32 = 64;

    while fraction >= 1.0 {
        fraction /= 16.0;
        exponent += 1;
    }
    while fraction < 1.0 / 16.0 {
        fraction *= 16.0;
        exponent -= 1;
    }

    let mut mantissa = (fraction * 16_777_216.0).round() as u32;
    if mantissa >= 1 << 24 {
        mantissa >>= 4;
        exponent += 1;
    }

    if exponent > 127 {
        return sign | 0x7fff_ffff;
    }
    if exponent < 0 {
        return 0;
    }

    sign | ((exponent as u32) << 24) | mantissa
}

/// A validated pair of trace-header byte positions for the two survey axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderFields {
    inline_byte: u16,
    crossline_byte: u16,
}

impl HeaderFields {
    /// Build a field pair, rejecting positions that do not fit a 4-byte word.
    pub fn new(inline_byte: u16, crossline_byte: u16) -> Result<Self> {
        for byte in [inline_byte, crossline_byte] {
            if byte == 0 || byte as usize + 3 > TRACE_HEADER_LEN {
                return Err(SegyError::InvalidByteOffset(byte));
            }
        }
        if inline_byte == crossline_byte {
            return Err(SegyError::DuplicateByteOffset(inline_byte));
        }
        Ok(Self {
            inline_byte,
            crossline_byte,
        })
    }

    #[inline]
    pub fn inline_byte(&self) -> u16 {
        self.inline_byte
    }

    #[inline]
    pub fn crossline_byte(&self) -> u16 {
        self.crossline_byte
    }

    fn inline_range(&self) -> std::ops::Range<usize> {
        let start = self.inline_byte as usize - 1;
        start..start + 4
    }

    fn crossline_range(&self) -> std::ops::Range<usize> {
        let start = self.crossline_byte as usize - 1;
        start..start + 4
    }
}

impl Default for HeaderFields {
    fn default() -> Self {
        Self {
            inline_byte: DEFAULT_INLINE_BYTE,
            crossline_byte: DEFAULT_CROSSLINE_BYTE,
        }
    }
}

/// The parts of the binary file header this crate relies on.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryHeader {
    /// Sample interval in microseconds.
    pub sample_interval: i16,
    /// Samples per trace.
    pub samples_per_trace: usize,
    /// Data sample format.
    pub format: SampleFormat,
    /// SEG-Y revision number (raw 16-bit value, 0x0100 for rev 1).
    pub revision: u16,
    /// Number of extended textual headers following the binary header.
    pub extended_headers: usize,
}

/// An open SEG-Y file.
#[derive(Debug)]
pub struct SegyFile {
    path: PathBuf,
    reader: BufReader<File>,
    text_header: Vec<u8>,
    binary_header: BinaryHeader,
    byte_order: ByteOrder,
    data_start: u64,
    trace_count: usize,
}

impl SegyFile {
    /// Open a SEG-Y file and parse its file headers.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, declares an unknown sample
    /// format, holds no traces, or has a payload that is not a whole number of
    /// traces.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let io_err = |source| SegyError::Io {
            path: path.clone(),
            source,
        };

        let file = File::open(&path).map_err(io_err)?;
        let file_len = file.metadata().map_err(io_err)?.len();
        if file_len < (TEXT_HEADER_LEN + BINARY_HEADER_LEN) as u64 {
            return Err(SegyError::Truncated(path));
        }

        let mut reader = BufReader::with_capacity(256 * 1024, file);
        let mut text_header = vec![0u8; TEXT_HEADER_LEN];
        reader.read_exact(&mut text_header).map_err(io_err)?;
        let mut binary = [0u8; BINARY_HEADER_LEN];
        reader.read_exact(&mut binary).map_err(io_err)?;

        let (byte_order, format) = detect_byte_order(&binary)?;
        let binary_header = BinaryHeader {
            sample_interval: byte_order.i16(&binary[BIN_SAMPLE_INTERVAL..]),
            samples_per_trace: byte_order.i16(&binary[BIN_SAMPLES_PER_TRACE..]) as u16 as usize,
            format,
            revision: byte_order.i16(&binary[BIN_REVISION..]) as u16,
            extended_headers: if byte_order.i16(&binary[BIN_REVISION..]) as u16 >= 0x0100 {
                byte_order.i16(&binary[BIN_EXTENDED_HEADERS..]).max(0) as usize
            } else {
                0
            },
        };

        if binary_header.samples_per_trace == 0 {
            return Err(SegyError::ZeroSamples(path));
        }

        let data_start = (TEXT_HEADER_LEN
            + BINARY_HEADER_LEN
            + binary_header.extended_headers * TEXT_HEADER_LEN) as u64;
        if file_len < data_start {
            return Err(SegyError::Truncated(path));
        }

        let trace_len = trace_len(&binary_header) as u64;
        let payload = file_len - data_start;
        if payload % trace_len != 0 {
            return Err(SegyError::RaggedTraces { payload, trace_len });
        }
        let trace_count = (payload / trace_len) as usize;
        if trace_count == 0 {
            return Err(SegyError::EmptyTraceSet { path });
        }

        reader.seek(SeekFrom::Start(data_start)).map_err(io_err)?;

        Ok(Self {
            path,
            reader,
            text_header,
            binary_header,
            byte_order,
            data_start,
            trace_count,
        })
    }

    /// Path the file was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw textual header bytes.
    pub fn text_header(&self) -> &[u8] {
        &self.text_header
    }

    pub fn binary_header(&self) -> &BinaryHeader {
        &self.binary_header
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// Number of traces in the file.
    #[inline]
    pub fn trace_count(&self) -> usize {
        self.trace_count
    }

    /// Number of samples in every trace.
    #[inline]
    pub fn samples_per_trace(&self) -> usize {
        self.binary_header.samples_per_trace
    }

    fn trace_len(&self) -> usize {
        trace_len(&self.binary_header)
    }

    fn seek_trace(&mut self, index: usize) -> Result<()> {
        let offset = self.data_start + (index * self.trace_len()) as u64;
        self.reader
            .seek(SeekFrom::Start(offset))
            .map_err(|source| SegyError::Io {
                path: self.path.clone(),
                source,
            })?;
        Ok(())
    }

    /// Read the (inline, crossline) words of every trace header, in file order.
    pub fn read_header_pairs(&mut self, fields: HeaderFields) -> Result<Vec<(i32, i32)>> {
        self.seek_trace(0)?;
        let skip = (self.trace_len() - TRACE_HEADER_LEN) as i64;
        let order = self.byte_order;
        let mut header = [0u8; TRACE_HEADER_LEN];
        let mut pairs = Vec::with_capacity(self.trace_count);

        for _ in 0..self.trace_count {
            self.reader
                .read_exact(&mut header)
                .and_then(|_| self.reader.seek_relative(skip))
                .map_err(|source| SegyError::Io {
                    path: self.path.clone(),
                    source,
                })?;
            pairs.push((
                order.i32(&header[fields.inline_range()]),
                order.i32(&header[fields.crossline_range()]),
            ));
        }

        Ok(pairs)
    }

    /// Read the samples of a single trace.
    pub fn read_trace(&mut self, index: usize) -> Result<Vec<f32>> {
        if index >= self.trace_count {
            return Err(SegyError::TraceOutOfRange {
                index,
                count: self.trace_count,
            });
        }
        self.seek_trace(index)?;
        let mut samples = vec![0f32; self.samples_per_trace()];
        let mut raw = vec![0u8; self.trace_len()];
        self.read_next_into(&mut raw, &mut samples)?;
        Ok(samples)
    }

    /// Iterate over every trace in file order.
    pub fn traces(&mut self) -> Result<Traces<'_>> {
        self.seek_trace(0)?;
        let raw = vec![0u8; self.trace_len()];
        Ok(Traces {
            file: self,
            raw,
            next: 0,
        })
    }

    fn read_next_into(&mut self, raw: &mut [u8], samples: &mut [f32]) -> Result<()> {
        self.reader
            .read_exact(raw)
            .map_err(|source| SegyError::Io {
                path: self.path.clone(),
                source,
            })?;
        let format = self.binary_header.format;
        let width = format.sample_size();
        for (sample, chunk) in samples
            .iter_mut()
            .zip(raw[TRACE_HEADER_LEN..].chunks_exact(width))
        {
            *sample = format.decode(self.byte_order, chunk);
        }
        Ok(())
    }
}

/// Sequential trace iterator returned by [`SegyFile::traces`].
pub struct Traces<'a> {
    file: &'a mut SegyFile,
    raw: Vec<u8>,
    next: usize,
}

impl Iterator for Traces<'_> {
    type Item = Result<Vec<f32>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.file.trace_count {
            return None;
        }
        self.next += 1;
        let mut samples = vec![0f32; self.file.samples_per_trace()];
        Some(
            self.file
                .read_next_into(&mut self.raw, &mut samples)
                .map(|_| samples),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.file.trace_count - self.next;
        (left, Some(left))
    }
}

fn trace_len(header: &BinaryHeader) -> usize {
    TRACE_HEADER_LEN + header.samples_per_trace * header.format.sample_size()
}

fn detect_byte_order(binary: &[u8]) -> Result<(ByteOrder, SampleFormat)> {
    let be = ByteOrder::BigEndian.i16(&binary[BIN_FORMAT_CODE..]);
    if let Some(format) = SampleFormat::from_code(be) {
        return Ok((ByteOrder::BigEndian, format));
    }
    let le = ByteOrder::LittleEndian.i16(&binary[BIN_FORMAT_CODE..]);
    match SampleFormat::from_code(le) {
        Some(format) => Ok((ByteOrder::LittleEndian, format)),
        None => Err(SegyError::UnsupportedFormat(be)),
    }
}

/// Layout of a SEG-Y file produced by [`SegyWriter`].
#[derive(Debug, Clone)]
pub struct SegyLayout {
    pub samples_per_trace: usize,
    /// Sample interval in microseconds.
    pub sample_interval: i16,
    /// Only the float formats are written.
    pub format: SampleFormat,
    pub byte_order: ByteOrder,
    pub fields: HeaderFields,
}

impl SegyLayout {
    pub fn new(samples_per_trace: usize) -> Self {
        Self {
            samples_per_trace,
            sample_interval: 4000,
            format: SampleFormat::IeeeFloat32,
            byte_order: ByteOrder::BigEndian,
            fields: HeaderFields::default(),
        }
    }
}

/// Streaming rev-1 SEG-Y writer.
pub struct SegyWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    layout: SegyLayout,
    written: usize,
}

impl SegyWriter {
    /// Create the file and write its textual and binary headers.
    pub fn create<P: AsRef<Path>>(path: P, layout: SegyLayout) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !matches!(
            layout.format,
            SampleFormat::IeeeFloat32 | SampleFormat::IbmFloat32
        ) {
            return Err(SegyError::UnsupportedFormat(layout.format.code()));
        }
        if layout.samples_per_trace == 0 || layout.samples_per_trace > u16::MAX as usize {
            return Err(SegyError::ZeroSamples(path));
        }

        let file = File::create(&path).map_err(|source| SegyError::Io {
            path: path.clone(),
            source,
        })?;
        let mut writer = BufWriter::new(file);

        let mut text = vec![b' '; TEXT_HEADER_LEN];
        for (line, chunk) in text.chunks_mut(80).enumerate() {
            let card = format!("C{:2} seismic-prep", line + 1);
            chunk[..card.len()].copy_from_slice(card.as_bytes());
        }

        let order = layout.byte_order;
        let mut binary = [0u8; BINARY_HEADER_LEN];
        order.put_i16(&mut binary[BIN_SAMPLE_INTERVAL..], layout.sample_interval);
        order.put_i16(
            &mut binary[BIN_SAMPLES_PER_TRACE..],
            layout.samples_per_trace as u16 as i16,
        );
        order.put_i16(&mut binary[BIN_FORMAT_CODE..], layout.format.code());
        order.put_i16(&mut binary[BIN_REVISION..], 0x0100);
        order.put_i16(&mut binary[BIN_FIXED_LENGTH..], 1);

        writer
            .write_all(&text)
            .and_then(|_| writer.write_all(&binary))
            .map_err(|source| SegyError::Io {
                path: path.clone(),
                source,
            })?;

        Ok(Self {
            path,
            writer,
            layout,
            written: 0,
        })
    }

    /// Append one trace located at (inline, crossline).
    pub fn write_trace(&mut self, inline: i32, crossline: i32, samples: &[f32]) -> Result<()> {
        if samples.len() != self.layout.samples_per_trace {
            return Err(SegyError::SampleCountMismatch {
                index: self.written,
                found: samples.len(),
                expected: self.layout.samples_per_trace,
            });
        }

        let order = self.layout.byte_order;
        let fields = self.layout.fields;
        let mut header = [0u8; TRACE_HEADER_LEN];
        order.put_u32(
            &mut header[TRACE_SEQUENCE_LINE..],
            (self.written + 1) as u32,
        );
        order.put_i16(
            &mut header[TRACE_SAMPLE_COUNT..],
            self.layout.samples_per_trace as u16 as i16,
        );
        order.put_i16(
            &mut header[TRACE_SAMPLE_INTERVAL..],
            self.layout.sample_interval,
        );
        order.put_u32(&mut header[fields.inline_range()], inline as u32);
        order.put_u32(&mut header[fields.crossline_range()], crossline as u32);

        let mut body = vec![0u8; samples.len() * 4];
        for (chunk, &value) in body.chunks_exact_mut(4).zip(samples) {
            let bits = match self.layout.format {
                SampleFormat::IbmFloat32 => f32_to_ibm(value),
                _ => value.to_bits(),
            };
            order.put_u32(chunk, bits);
        }

        self.writer
            .write_all(&header)
            .and_then(|_| self.writer.write_all(&body))
            .map_err(|source| SegyError::Io {
                path: self.path.clone(),
                source,
            })?;
        self.written += 1;
        Ok(())
    }

    /// Flush buffered data and return the number of traces written.
    pub fn finish(mut self) -> Result<usize> {
        self.writer.flush().map_err(|source| SegyError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(self.written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_grid(path: &Path, layout: SegyLayout, inlines: i32, xlines: i32) {
        let ns = layout.samples_per_trace;
        let mut writer = SegyWriter::create(path, layout).unwrap();
        for il in 0..inlines {
            for xl in 0..xlines {
                let trace: Vec<f32> = (0..ns)
                    .map(|k| (il * 100 + xl) as f32 + k as f32 * 0.5)
                    .collect();
                writer.write_trace(10 + il, 100 + xl, &trace).unwrap();
            }
        }
        assert_eq!(writer.finish().unwrap(), (inlines * xlines) as usize);
    }

    #[test]
    fn test_ibm_known_values() {
        assert_eq!(ibm_to_f32(0xC276_A000), -118.625);
        assert_eq!(ibm_to_f32(0x4110_0000), 1.0);
        assert_eq!(ibm_to_f32(0), 0.0);
        assert_eq!(f32_to_ibm(-118.625), 0xC276_A000);
        assert_eq!(f32_to_ibm(1.0), 0x4110_0000);
    }

    #[test]
    fn test_ibm_roundtrip_exact_values() {
        for value in [0.5f32, -3.25, 1024.0, 0.0625, -7.75, 123456.0] {
            assert_eq!(ibm_to_f32(f32_to_ibm(value)), value);
        }
    }

    #[test]
    fn test_header_fields_validation() {
        assert!(HeaderFields::new(189, 193).is_ok());
        assert!(HeaderFields::new(237, 1).is_ok());
        assert!(matches!(
            HeaderFields::new(0, 193),
            Err(SegyError::InvalidByteOffset(0))
        ));
        assert!(matches!(
            HeaderFields::new(189, 238),
            Err(SegyError::InvalidByteOffset(238))
        ));
        assert!(matches!(
            HeaderFields::new(189, 189),
            Err(SegyError::DuplicateByteOffset(189))
        ));
    }

    #[test]
    fn test_write_then_read_headers_and_traces() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("grid.segy");
        write_grid(&path, SegyLayout::new(6), 3, 4);

        let mut segy = SegyFile::open(&path).unwrap();
        assert_eq!(segy.trace_count(), 12);
        assert_eq!(segy.samples_per_trace(), 6);
        assert_eq!(segy.byte_order(), ByteOrder::BigEndian);
        assert_eq!(segy.binary_header().format, SampleFormat::IeeeFloat32);

        let pairs = segy.read_header_pairs(HeaderFields::default()).unwrap();
        assert_eq!(pairs[0], (10, 100));
        assert_eq!(pairs[1], (10, 101));
        assert_eq!(pairs[4], (11, 100));
        assert_eq!(pairs[11], (12, 103));

        let trace = segy.read_trace(5).unwrap();
        assert_eq!(trace[0], 101.0);
        assert_eq!(trace[2], 102.0);

        let all: Vec<Vec<f32>> = segy.traces().unwrap().map(|t| t.unwrap()).collect();
        assert_eq!(all.len(), 12);
        assert_eq!(all[5], trace);
    }

    #[test]
    fn test_custom_byte_positions() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("custom.segy");
        let mut layout = SegyLayout::new(2);
        layout.fields = HeaderFields::new(9, 21).unwrap();
        write_grid(&path, layout, 2, 2);

        let mut segy = SegyFile::open(&path).unwrap();
        let pairs = segy
            .read_header_pairs(HeaderFields::new(9, 21).unwrap())
            .unwrap();
        assert_eq!(pairs, vec![(10, 100), (10, 101), (11, 100), (11, 101)]);
    }

    #[test]
    fn test_ibm_and_little_endian_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ibm_le.segy");
        let mut layout = SegyLayout::new(4);
        layout.format = SampleFormat::IbmFloat32;
        layout.byte_order = ByteOrder::LittleEndian;
        write_grid(&path, layout, 2, 3);

        let mut segy = SegyFile::open(&path).unwrap();
        assert_eq!(segy.byte_order(), ByteOrder::LittleEndian);
        assert_eq!(segy.binary_header().format, SampleFormat::IbmFloat32);
        let trace = segy.read_trace(4).unwrap();
        assert_eq!(trace, vec![101.0, 101.5, 102.0, 102.5]);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = SegyFile::open("/nonexistent/volume.segy").unwrap_err();
        assert!(matches!(err, SegyError::Io { .. }));
    }

    #[test]
    fn test_headers_without_traces_is_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.segy");
        SegyWriter::create(&path, SegyLayout::new(4))
            .unwrap()
            .finish()
            .unwrap();

        let err = SegyFile::open(&path).unwrap_err();
        assert!(matches!(err, SegyError::EmptyTraceSet { .. }));
    }

    #[test]
    fn test_truncated_trace_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ragged.segy");
        write_grid(&path, SegyLayout::new(4), 1, 2);
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.truncate(bytes.len() - 3);
        std::fs::write(&path, bytes).unwrap();

        let err = SegyFile::open(&path).unwrap_err();
        assert!(matches!(err, SegyError::RaggedTraces { .. }));
    }

    #[test]
    fn test_unknown_format_code() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.segy");
        let mut bytes = vec![0u8; TEXT_HEADER_LEN + BINARY_HEADER_LEN];
        bytes[TEXT_HEADER_LEN + BIN_SAMPLES_PER_TRACE + 1] = 4;
        bytes[TEXT_HEADER_LEN + BIN_FORMAT_CODE + 1] = 9;
        std::fs::write(&path, bytes).unwrap();

        let err = SegyFile::open(&path).unwrap_err();
        assert!(matches!(err, SegyError::UnsupportedFormat(_)));
    }
}
