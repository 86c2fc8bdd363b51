//! XDF (Extensible Data Format) stream loader
//!
//! XDF is the file format used by Lab Streaming Layer (LSL) for multi-stream
//! recordings: a magic string followed by tagged chunks. Stream headers carry
//! XML descriptors, sample chunks carry per-sample timestamps and values, and
//! clock-offset chunks allow the recorder's clock drift to be removed.
//!
//! The whole file is parsed in one pass into [`RawStream`]s.

use crate::error::{Result, XdfError};
use crate::mmap_utils::mmap_file;
use crate::profile_scope;
use crate::types::{ChannelFormat, FileHeader, LoadedFile, RawStream, SampleData, StreamInfo};
use byteorder::{LittleEndian, ReadBytesExt};
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::Event;
use quick_xml::Reader as XmlReader;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::Path;

pub const XDF_MAGIC: &[u8; 4] = b"XDF:";

// XDF chunk tags
pub const CHUNK_FILE_HEADER: u16 = 1;
pub const CHUNK_STREAM_HEADER: u16 = 2;
pub const CHUNK_SAMPLES: u16 = 3;
pub const CHUNK_CLOCK_OFFSET: u16 = 4;
pub const CHUNK_BOUNDARY: u16 = 5;
pub const CHUNK_STREAM_FOOTER: u16 = 6;

/// Gaps longer than this (seconds) start a new dejitter segment
const DEJITTER_GAP_SECONDS: f64 = 1.0;
/// Gaps longer than this many nominal sample intervals start a new segment
const DEJITTER_GAP_SAMPLES: f64 = 500.0;

/// Source of parsed streams for the iterators
pub trait StreamLoader {
    /// Load a recording, keeping only the named streams when `select` is given
    fn load(&self, path: &Path, select: Option<&[String]>) -> Result<LoadedFile>;
}

/// Timestamp post-processing applied once all chunks are read
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadOptions {
    /// Apply the least-squares fit of the clock-offset chunks
    pub synchronize_clocks: bool,
    /// Replace the timestamps of regular streams by a per-segment line fit
    pub dejitter_timestamps: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            synchronize_clocks: true,
            dejitter_timestamps: false,
        }
    }
}

/// File-backed XDF loader
#[derive(Debug, Clone, Default)]
pub struct XdfLoader {
    options: LoadOptions,
}

impl XdfLoader {
    pub fn new(synchronize_clocks: bool) -> Self {
        Self {
            options: LoadOptions {
                synchronize_clocks,
                ..LoadOptions::default()
            },
        }
    }

    pub fn with_dejitter_timestamps(mut self, dejitter_timestamps: bool) -> Self {
        self.options.dejitter_timestamps = dejitter_timestamps;
        self
    }
}

impl StreamLoader for XdfLoader {
    fn load(&self, path: &Path, select: Option<&[String]>) -> Result<LoadedFile> {
        profile_scope!(format!("load {}", path.display()));
        let mmap = mmap_file(path)?;
        parse_xdf(&mmap, select, self.options)
    }
}

/// Convenience wrapper around [`XdfLoader`]
pub fn load_xdf(path: &Path, select: Option<&[String]>) -> Result<LoadedFile> {
    XdfLoader::default().load(path, select)
}

/// Per-stream accumulator used while walking the chunks
struct StreamBuilder {
    info: StreamInfo,
    timestamps: Vec<f64>,
    numeric: Vec<f64>,
    int64: Vec<i64>,
    text: Vec<String>,
    clock_times: Vec<f64>,
    clock_values: Vec<f64>,
    last_timestamp: f64,
}

impl StreamBuilder {
    fn new(info: StreamInfo) -> Self {
        Self {
            info,
            timestamps: Vec::new(),
            numeric: Vec::new(),
            int64: Vec::new(),
            text: Vec::new(),
            clock_times: Vec::new(),
            clock_values: Vec::new(),
            last_timestamp: 0.0,
        }
    }

    fn sample_interval(&self) -> f64 {
        if self.info.is_irregular() {
            0.0
        } else {
            1.0 / self.info.nominal_srate
        }
    }

    fn finish(self, options: LoadOptions) -> Result<RawStream> {
        let rows = self.timestamps.len();
        let channels = self.info.channel_count;
        let data = match self.info.channel_format {
            ChannelFormat::String => SampleData::text(rows, channels, self.text)?,
            ChannelFormat::Int64 => SampleData::int64(rows, channels, self.int64)?,
            _ => SampleData::numeric(rows, channels, self.numeric)?,
        };

        let mut timestamps = self.timestamps;
        if options.synchronize_clocks {
            if let Some((intercept, slope)) = clock_fit(&self.clock_times, &self.clock_values) {
                log::debug!(
                    "Stream '{}': clock correction intercept={:.6} slope={:.3e}",
                    self.info.name,
                    intercept,
                    slope
                );
                for t in timestamps.iter_mut() {
                    *t += intercept + slope * *t;
                }
            }
        }

        if options.dejitter_timestamps && !self.info.is_irregular() {
            let segments = dejitter(&mut timestamps, self.info.nominal_srate);
            log::debug!(
                "Stream '{}': dejittered {} samples in {} segments",
                self.info.name,
                timestamps.len(),
                segments
            );
        }

        RawStream::new(self.info, data, timestamps)
    }
}

/// Replace timestamps by a line fitted against the sample index, one fit per
/// segment between large gaps. Returns the number of segments.
pub fn dejitter(timestamps: &mut [f64], nominal_srate: f64) -> usize {
    if timestamps.is_empty() || nominal_srate <= 0.0 {
        return 0;
    }
    let max_gap = DEJITTER_GAP_SECONDS.max(DEJITTER_GAP_SAMPLES / nominal_srate);

    let mut segments = 0;
    let mut start = 0;
    while start < timestamps.len() {
        let mut stop = start + 1;
        while stop < timestamps.len() && timestamps[stop] - timestamps[stop - 1] <= max_gap {
            stop += 1;
        }

        let indices: Vec<f64> = (start..stop).map(|i| i as f64).collect();
        if let Some((intercept, slope)) = clock_fit(&indices, &timestamps[start..stop]) {
            for (t, i) in timestamps[start..stop].iter_mut().zip(&indices) {
                *t = intercept + slope * i;
            }
        }
        segments += 1;
        start = stop;
    }
    segments
}

/// Least-squares line through `(x, y)` pairs, as `(intercept, slope)`.
/// Used for the clock offsets and for dejittering.
pub fn clock_fit(times: &[f64], values: &[f64]) -> Option<(f64, f64)> {
    let n = times.len().min(values.len());
    match n {
        0 => None,
        1 => Some((values[0], 0.0)),
        _ => {
            let mean_t = times[..n].iter().sum::<f64>() / n as f64;
            let mean_v = values[..n].iter().sum::<f64>() / n as f64;
            let mut cov = 0.0;
            let mut var = 0.0;
            for (t, v) in times[..n].iter().zip(&values[..n]) {
                cov += (t - mean_t) * (v - mean_v);
                var += (t - mean_t) * (t - mean_t);
            }
            if var == 0.0 {
                return Some((mean_v, 0.0));
            }
            let slope = cov / var;
            Some((mean_v - slope * mean_t, slope))
        }
    }
}

/// Read an XDF variable-length integer: one width byte (1, 4 or 8) then the value
fn read_varlen<R: Read>(reader: &mut R) -> Result<u64> {
    match reader.read_u8()? {
        1 => Ok(reader.read_u8()? as u64),
        4 => Ok(reader.read_u32::<LittleEndian>()? as u64),
        8 => Ok(reader.read_u64::<LittleEndian>()?),
        width => Err(XdfError::ParseError(format!(
            "Invalid variable-length integer width: {}",
            width
        ))),
    }
}

fn is_eof(err: &XdfError) -> bool {
    matches!(err, XdfError::IoError(e) if e.kind() == std::io::ErrorKind::UnexpectedEof)
}

/// Parse an in-memory XDF recording
pub fn parse_xdf(
    bytes: &[u8],
    select: Option<&[String]>,
    options: LoadOptions,
) -> Result<LoadedFile> {
    if bytes.len() < XDF_MAGIC.len() || &bytes[..XDF_MAGIC.len()] != XDF_MAGIC {
        return Err(XdfError::ParseError(
            "Invalid XDF file: missing magic string".to_string(),
        ));
    }

    let mut header = FileHeader::default();
    let mut builders: Vec<StreamBuilder> = Vec::new();
    let mut by_id: HashMap<u32, usize> = HashMap::new();
    let mut skipped_ids: Vec<u32> = Vec::new();

    let mut pos = XDF_MAGIC.len();
    while pos < bytes.len() {
        let mut chunk_header = Cursor::new(&bytes[pos..]);
        let chunk_len = match read_varlen(&mut chunk_header) {
            Ok(len) => len as usize,
            Err(e) if is_eof(&e) => {
                log::warn!("XDF file ended inside a chunk header at byte {}", pos);
                break;
            }
            Err(e) => return Err(e),
        };

        let start = pos + chunk_header.position() as usize;
        let end = match start.checked_add(chunk_len) {
            Some(end) if end <= bytes.len() => end,
            _ => {
                log::warn!(
                    "XDF file truncated: chunk at byte {} declares {} bytes, {} available",
                    pos,
                    chunk_len,
                    bytes.len() - start
                );
                break;
            }
        };
        if chunk_len < 2 {
            return Err(XdfError::ParseError(format!(
                "Chunk at byte {} is too short to hold a tag",
                pos
            )));
        }

        let tag = u16::from_le_bytes([bytes[start], bytes[start + 1]]);
        let content = &bytes[start + 2..end];

        match tag {
            CHUNK_FILE_HEADER => {
                let xml = String::from_utf8_lossy(content).into_owned();
                header.version = parse_file_header_version(&xml)?;
                log::debug!("XDF file header version: {:?}", header.version);
                header.xml = xml;
            }
            CHUNK_STREAM_HEADER => {
                let (stream_id, body) = split_stream_id(content, "stream header")?;
                let info = parse_stream_header(stream_id, &String::from_utf8_lossy(body))?;
                let wanted = select.map_or(true, |names| names.iter().any(|n| *n == info.name));
                if !wanted {
                    log::debug!("Skipping unselected stream '{}' (ID: {})", info.name, stream_id);
                    skipped_ids.push(stream_id);
                } else if by_id.contains_key(&stream_id) {
                    log::warn!("Duplicate header for stream ID {}, keeping the first", stream_id);
                } else {
                    log::info!("Found XDF stream: {} (ID: {})", info.name, stream_id);
                    by_id.insert(stream_id, builders.len());
                    builders.push(StreamBuilder::new(info));
                }
            }
            CHUNK_SAMPLES => {
                let (stream_id, body) = split_stream_id(content, "samples")?;
                match by_id.get(&stream_id) {
                    Some(&idx) => parse_samples(body, &mut builders[idx])?,
                    None if skipped_ids.contains(&stream_id) => {}
                    None => {
                        return Err(XdfError::ParseError(format!(
                            "Samples chunk for undeclared stream ID {}",
                            stream_id
                        )))
                    }
                }
            }
            CHUNK_CLOCK_OFFSET => {
                let (stream_id, body) = split_stream_id(content, "clock offset")?;
                if let Some(&idx) = by_id.get(&stream_id) {
                    let mut reader = Cursor::new(body);
                    let collection_time = reader.read_f64::<LittleEndian>().map_err(|e| {
                        XdfError::ParseError(format!("Malformed clock offset chunk: {}", e))
                    })?;
                    let offset_value = reader.read_f64::<LittleEndian>().map_err(|e| {
                        XdfError::ParseError(format!("Malformed clock offset chunk: {}", e))
                    })?;
                    builders[idx].clock_times.push(collection_time);
                    builders[idx].clock_values.push(offset_value);
                }
            }
            CHUNK_BOUNDARY => {
                log::debug!("Boundary chunk");
            }
            CHUNK_STREAM_FOOTER => {
                log::debug!("Stream footer chunk");
            }
            _ => {
                log::warn!("Unknown chunk type: {}", tag);
            }
        }

        pos = end;
    }

    let streams = builders
        .into_iter()
        .map(|b| b.finish(options))
        .collect::<Result<Vec<_>>>()?;

    log::info!("Loaded {} XDF streams", streams.len());
    Ok(LoadedFile { streams, header })
}

fn split_stream_id<'a>(content: &'a [u8], kind: &str) -> Result<(u32, &'a [u8])> {
    if content.len() < 4 {
        return Err(XdfError::ParseError(format!(
            "{} chunk is too short to hold a stream ID",
            kind
        )));
    }
    let stream_id = u32::from_le_bytes([content[0], content[1], content[2], content[3]]);
    Ok((stream_id, &content[4..]))
}

fn parse_samples(body: &[u8], builder: &mut StreamBuilder) -> Result<()> {
    let stream_id = builder.info.stream_id;
    let malformed =
        |e: XdfError| XdfError::ParseError(format!("Stream {}: malformed samples chunk: {}", stream_id, e));

    let mut reader = Cursor::new(body);
    let num_samples = read_varlen(&mut reader).map_err(malformed)?;
    let format = builder.info.channel_format;
    let channels = builder.info.channel_count;
    let interval = builder.sample_interval();

    for _ in 0..num_samples {
        let timestamp = match reader.read_u8().map_err(|e| malformed(e.into()))? {
            8 => reader
                .read_f64::<LittleEndian>()
                .map_err(|e| malformed(e.into()))?,
            0 => builder.last_timestamp + interval,
            width => {
                return Err(malformed(XdfError::ParseError(format!(
                    "invalid timestamp width {}",
                    width
                ))))
            }
        };
        builder.last_timestamp = timestamp;
        builder.timestamps.push(timestamp);

        for _ in 0..channels {
            match format {
                ChannelFormat::String => {
                    let len = read_varlen(&mut reader).map_err(malformed)?;
                    let remaining = body.len() as u64 - reader.position();
                    if len > remaining {
                        return Err(malformed(XdfError::ParseError(format!(
                            "string length {} exceeds the {} bytes left",
                            len, remaining
                        ))));
                    }
                    let mut buf = vec![0u8; len as usize];
                    reader.read_exact(&mut buf).map_err(|e| malformed(e.into()))?;
                    builder.text.push(String::from_utf8_lossy(&buf).into_owned());
                }
                ChannelFormat::Int64 => {
                    let value = reader
                        .read_i64::<LittleEndian>()
                        .map_err(|e| malformed(e.into()))?;
                    builder.int64.push(value);
                }
                _ => {
                    let value =
                        read_numeric(&mut reader, format).map_err(|e| malformed(e.into()))?;
                    builder.numeric.push(value);
                }
            }
        }
    }

    Ok(())
}

/// Read one value of a format that widens to `f64` without loss
fn read_numeric<R: Read>(reader: &mut R, format: ChannelFormat) -> std::io::Result<f64> {
    Ok(match format {
        ChannelFormat::Float32 => reader.read_f32::<LittleEndian>()? as f64,
        ChannelFormat::Double64 => reader.read_f64::<LittleEndian>()?,
        ChannelFormat::Int8 => reader.read_i8()? as f64,
        ChannelFormat::Int16 => reader.read_i16::<LittleEndian>()? as f64,
        ChannelFormat::Int32 => reader.read_i32::<LittleEndian>()? as f64,
        ChannelFormat::Int64 | ChannelFormat::String => {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} values are not read as f64", format.as_str()),
            ))
        }
    })
}

/// Walk an XML document, calling `on_text(path, text)` for every element's text
fn walk_xml(xml: &str, mut on_text: impl FnMut(&[&str], String)) -> Result<()> {
    let mut reader = XmlReader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut path: Vec<String> = Vec::new();
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                path.push(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                text.clear();
            }
            Ok(Event::Text(e)) => {
                text.push_str(&String::from_utf8_lossy(&e));
            }
            Ok(Event::GeneralRef(e)) => {
                let name = String::from_utf8_lossy(&e).into_owned();
                if let Ok(Some(ch)) = e.resolve_char_ref() {
                    text.push(ch);
                } else if let Some(resolved) = resolve_predefined_entity(&name) {
                    text.push_str(resolved);
                }
            }
            Ok(Event::End(_)) => {
                let refs: Vec<&str> = path.iter().map(String::as_str).collect();
                on_text(&refs, std::mem::take(&mut text));
                path.pop();
            }
            Ok(Event::Empty(e)) => {
                path.push(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                let refs: Vec<&str> = path.iter().map(String::as_str).collect();
                on_text(&refs, String::new());
                path.pop();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(XdfError::ParseError(format!(
                    "XML parse error at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
    }

    Ok(())
}

fn parse_file_header_version(xml: &str) -> Result<Option<String>> {
    let mut version = None;
    walk_xml(xml, |path, text| {
        if matches!(path, ["info", "version"]) {
            version = Some(text);
        }
    })?;
    Ok(version)
}

/// Parse the `<info>` descriptor of a stream header chunk
pub fn parse_stream_header(stream_id: u32, xml: &str) -> Result<StreamInfo> {
    let mut name = None;
    let mut stream_type = String::new();
    let mut channel_count = None;
    let mut nominal_srate = String::new();
    let mut channel_format = None;
    let mut source_id = String::new();
    let mut labels: Vec<String> = Vec::new();

    walk_xml(xml, |path, text| match path {
        ["info", "name"] => name = Some(text),
        ["info", "type"] => stream_type = text,
        ["info", "channel_count"] => channel_count = Some(text),
        ["info", "nominal_srate"] => nominal_srate = text,
        ["info", "channel_format"] => channel_format = Some(text),
        ["info", "source_id"] => source_id = text,
        ["info", "desc", "channels", "channel", "label"] => labels.push(text),
        _ => {}
    })?;

    let name = name.ok_or_else(|| {
        XdfError::ParseError(format!("Stream {} header has no <name>", stream_id))
    })?;

    let channel_count = channel_count
        .as_deref()
        .unwrap_or("")
        .trim()
        .parse::<usize>()
        .map_err(|_| {
            XdfError::ParseError(format!(
                "Stream '{}' has an invalid <channel_count>: {:?}",
                name, channel_count
            ))
        })?;

    let channel_format = match channel_format.as_deref() {
        None => ChannelFormat::Float32,
        Some(raw) => ChannelFormat::from_str(raw).ok_or_else(|| {
            XdfError::UnsupportedFormat(format!(
                "Stream '{}' uses channel_format '{}'",
                name, raw
            ))
        })?,
    };

    let nominal_srate = nominal_srate.trim().parse::<f64>().unwrap_or(0.0);

    Ok(StreamInfo {
        stream_id,
        name,
        stream_type,
        channel_count,
        nominal_srate,
        channel_format,
        source_id,
        channel_labels: labels,
    })
}
