/// XDF file writer
///
/// Emits the same chunk layout the loader reads: magic string, file header,
/// stream headers, sample chunks with explicit timestamps, clock offsets and
/// stream footers.
use crate::error::{Result, XdfError};
use crate::loader::{
    CHUNK_CLOCK_OFFSET, CHUNK_FILE_HEADER, CHUNK_SAMPLES, CHUNK_STREAM_FOOTER,
    CHUNK_STREAM_HEADER, XDF_MAGIC,
};
use crate::types::{ChannelFormat, RawStream, SampleData, StreamInfo};
use byteorder::{LittleEndian, WriteBytesExt};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Samples per chunk used by [`write_streams`]
const SAMPLES_PER_CHUNK: usize = 1000;

pub struct XdfWriter<W: Write> {
    writer: W,
}

impl XdfWriter<BufWriter<File>> {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        Self::new(BufWriter::new(file))
    }
}

impl<W: Write> XdfWriter<W> {
    /// Write the magic string and the file header
    pub fn new(mut writer: W) -> Result<Self> {
        writer.write_all(XDF_MAGIC)?;
        let header = b"<?xml version=\"1.0\"?><info><version>1.0</version></info>";
        write_chunk(&mut writer, CHUNK_FILE_HEADER, header)?;
        Ok(Self { writer })
    }

    pub fn write_stream_header(&mut self, info: &StreamInfo) -> Result<()> {
        let xml = stream_header_xml(info)?;
        let mut content = Vec::with_capacity(xml.len() + 4);
        content.write_u32::<LittleEndian>(info.stream_id)?;
        content.extend_from_slice(&xml);
        write_chunk(&mut self.writer, CHUNK_STREAM_HEADER, &content)
    }

    /// Write one samples chunk; every sample carries its timestamp
    pub fn write_samples(
        &mut self,
        info: &StreamInfo,
        timestamps: &[f64],
        data: &SampleData,
    ) -> Result<()> {
        if timestamps.len() != data.len() {
            return Err(XdfError::InvalidParameter(format!(
                "{} timestamps for {} samples",
                timestamps.len(),
                data.len()
            )));
        }
        if data.channel_count() != info.channel_count {
            return Err(XdfError::InvalidParameter(format!(
                "stream '{}' declares {} channels, data has {}",
                info.name,
                info.channel_count,
                data.channel_count()
            )));
        }
        if !data.matches_format(info.channel_format) {
            return Err(XdfError::InvalidParameter(format!(
                "sample data does not match the {} format of stream '{}'",
                info.channel_format.as_str(),
                info.name
            )));
        }

        let mut content = Vec::new();
        content.write_u32::<LittleEndian>(info.stream_id)?;
        write_varlen(&mut content, timestamps.len() as u64)?;

        for (row, &timestamp) in timestamps.iter().enumerate() {
            content.write_u8(8)?;
            content.write_f64::<LittleEndian>(timestamp)?;
            match data {
                SampleData::Numeric(values) => {
                    for &value in values.row(row) {
                        write_numeric(&mut content, info.channel_format, value)?;
                    }
                }
                SampleData::Int64(values) => {
                    for &value in values.row(row) {
                        content.write_i64::<LittleEndian>(value)?;
                    }
                }
                SampleData::Text(values) => {
                    for value in values.row(row) {
                        write_varlen(&mut content, value.len() as u64)?;
                        content.write_all(value.as_bytes())?;
                    }
                }
            }
        }

        write_chunk(&mut self.writer, CHUNK_SAMPLES, &content)
    }

    pub fn write_clock_offset(
        &mut self,
        stream_id: u32,
        collection_time: f64,
        offset: f64,
    ) -> Result<()> {
        let mut content = Vec::with_capacity(20);
        content.write_u32::<LittleEndian>(stream_id)?;
        content.write_f64::<LittleEndian>(collection_time)?;
        content.write_f64::<LittleEndian>(offset)?;
        write_chunk(&mut self.writer, CHUNK_CLOCK_OFFSET, &content)
    }

    pub fn write_stream_footer(&mut self, stream: &RawStream) -> Result<()> {
        let xml = format!(
            "<?xml version=\"1.0\"?><info><first_timestamp>{}</first_timestamp><last_timestamp>{}</last_timestamp><sample_count>{}</sample_count></info>",
            stream.first_timestamp().unwrap_or(0.0),
            stream.last_timestamp().unwrap_or(0.0),
            stream.len()
        );
        let mut content = Vec::with_capacity(xml.len() + 4);
        content.write_u32::<LittleEndian>(stream.info.stream_id)?;
        content.extend_from_slice(xml.as_bytes());
        write_chunk(&mut self.writer, CHUNK_STREAM_FOOTER, &content)
    }

    /// Append raw bytes, e.g. to produce a deliberately damaged file
    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes)?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Write a whole recording: headers first, then samples, then footers
pub fn write_streams(path: &Path, streams: &[RawStream]) -> Result<()> {
    let mut writer = XdfWriter::create(path)?;

    for stream in streams {
        writer.write_stream_header(&stream.info)?;
    }

    for stream in streams {
        let mut start = 0;
        while start < stream.len() {
            let end = (start + SAMPLES_PER_CHUNK).min(stream.len());
            writer.write_samples(
                &stream.info,
                &stream.timestamps[start..end],
                &stream.data.row_range(start..end),
            )?;
            start = end;
        }
    }

    for stream in streams {
        writer.write_stream_footer(stream)?;
    }

    writer.finish()?;
    log::debug!("Wrote {} streams to {}", streams.len(), path.display());
    Ok(())
}

fn write_chunk<W: Write>(writer: &mut W, tag: u16, content: &[u8]) -> Result<()> {
    write_varlen(writer, content.len() as u64 + 2)?;
    writer.write_u16::<LittleEndian>(tag)?;
    writer.write_all(content)?;
    Ok(())
}

/// Smallest of the 1, 4 and 8 byte encodings that fits
fn write_varlen<W: Write>(writer: &mut W, value: u64) -> Result<()> {
    if value <= u8::MAX as u64 {
        writer.write_u8(1)?;
        writer.write_u8(value as u8)?;
    } else if value <= u32::MAX as u64 {
        writer.write_u8(4)?;
        writer.write_u32::<LittleEndian>(value as u32)?;
    } else {
        writer.write_u8(8)?;
        writer.write_u64::<LittleEndian>(value)?;
    }
    Ok(())
}

fn write_numeric<W: Write>(writer: &mut W, format: ChannelFormat, value: f64) -> Result<()> {
    match format {
        ChannelFormat::Float32 => writer.write_f32::<LittleEndian>(value as f32)?,
        ChannelFormat::Double64 => writer.write_f64::<LittleEndian>(value)?,
        ChannelFormat::Int8 => writer.write_i8(value as i8)?,
        ChannelFormat::Int16 => writer.write_i16::<LittleEndian>(value as i16)?,
        ChannelFormat::Int32 => writer.write_i32::<LittleEndian>(value as i32)?,
        ChannelFormat::Int64 | ChannelFormat::String => {
            return Err(XdfError::InvalidParameter(format!(
                "f64 data for a {} stream",
                format.as_str()
            )))
        }
    }
    Ok(())
}

fn write_text_element<W: Write>(writer: &mut Writer<W>, name: &str, text: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn stream_header_xml(info: &StreamInfo) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut xml = Writer::new(&mut buffer);

    xml.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    xml.write_event(Event::Start(BytesStart::new("info")))?;

    write_text_element(&mut xml, "name", &info.name)?;
    write_text_element(&mut xml, "type", &info.stream_type)?;
    write_text_element(&mut xml, "channel_count", &info.channel_count.to_string())?;
    write_text_element(&mut xml, "nominal_srate", &info.nominal_srate.to_string())?;
    write_text_element(&mut xml, "channel_format", info.channel_format.as_str())?;
    write_text_element(&mut xml, "source_id", &info.source_id)?;

    if !info.channel_labels.is_empty() {
        xml.write_event(Event::Start(BytesStart::new("desc")))?;
        xml.write_event(Event::Start(BytesStart::new("channels")))?;
        for label in &info.channel_labels {
            xml.write_event(Event::Start(BytesStart::new("channel")))?;
            write_text_element(&mut xml, "label", label)?;
            xml.write_event(Event::End(BytesEnd::new("channel")))?;
        }
        xml.write_event(Event::End(BytesEnd::new("channels")))?;
        xml.write_event(Event::End(BytesEnd::new("desc")))?;
    }

    xml.write_event(Event::End(BytesEnd::new("info")))?;
    Ok(buffer)
}
