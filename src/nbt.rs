//! Named Binary Tag codec covering the tag types chunk and level files use.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;
use std::collections::HashMap;
use std::io::{self, Read, Write};

/// Nesting deeper than this is rejected while reading.
const MAX_DEPTH: usize = 512;

pub type Compound = HashMap<String, Tag>;

#[derive(Debug, Clone, PartialEq)]
pub enum Tag {
    End,
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    ByteArray(Vec<i8>),
    String(String),
    List(Vec<Tag>),
    Compound(Compound),
    IntArray(Vec<i32>),
    LongArray(Vec<i64>),
}

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

fn read_len<R: Read>(reader: &mut R) -> io::Result<usize> {
    let length = reader.read_i32::<BigEndian>()?;
    if length < 0 {
        return Err(invalid(format!("Negative length: {}", length)));
    }
    Ok(length as usize)
}

fn read_utf8<R: Read>(reader: &mut R) -> io::Result<String> {
    let length = reader.read_u16::<BigEndian>()?;
    let mut bytes = vec![0u8; length as usize];
    reader.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|e| invalid(e.to_string()))
}

fn write_utf8<W: Write>(writer: &mut W, value: &str) -> io::Result<()> {
    let length = u16::try_from(value.len())
        .map_err(|_| invalid(format!("String of {} bytes is too long", value.len())))?;
    writer.write_u16::<BigEndian>(length)?;
    writer.write_all(value.as_bytes())
}

impl Tag {
    pub fn get_type_id(&self) -> u8 {
        match self {
            Tag::End => 0,
            Tag::Byte(_) => 1,
            Tag::Short(_) => 2,
            Tag::Int(_) => 3,
            Tag::Long(_) => 4,
            Tag::Float(_) => 5,
            Tag::Double(_) => 6,
            Tag::ByteArray(_) => 7,
            Tag::String(_) => 8,
            Tag::List(_) => 9,
            Tag::Compound(_) => 10,
            Tag::IntArray(_) => 11,
            Tag::LongArray(_) => 12,
        }
    }

    /// Reads one named tag. A bare `TAG_End` yields an empty name.
    pub fn read<R: Read>(reader: &mut R) -> io::Result<(String, Tag)> {
        Self::read_named(reader, 0)
    }

    fn read_named<R: Read>(reader: &mut R, depth: usize) -> io::Result<(String, Tag)> {
        let type_id = reader.read_u8()?;
        if type_id == 0 {
            return Ok((String::new(), Tag::End));
        }
        let name = read_utf8(reader)?;
        let tag = Tag::read_payload(reader, type_id, depth)?;
        Ok((name, tag))
    }

    fn read_payload<R: Read>(reader: &mut R, type_id: u8, depth: usize) -> io::Result<Tag> {
        if depth > MAX_DEPTH {
            return Err(invalid(format!("Nesting deeper than {}", MAX_DEPTH)));
        }

        let tag = match type_id {
            0 => Tag::End,
            1 => Tag::Byte(reader.read_i8()?),
            2 => Tag::Short(reader.read_i16::<BigEndian>()?),
            3 => Tag::Int(reader.read_i32::<BigEndian>()?),
            4 => Tag::Long(reader.read_i64::<BigEndian>()?),
            5 => Tag::Float(reader.read_f32::<BigEndian>()?),
            6 => Tag::Double(reader.read_f64::<BigEndian>()?),
            7 => {
                let mut bytes = vec![0u8; read_len(reader)?];
                reader.read_exact(&mut bytes)?;
                Tag::ByteArray(bytes.into_iter().map(|b| b as i8).collect())
            }
            8 => Tag::String(read_utf8(reader)?),
            9 => {
                let element_type = reader.read_u8()?;
                let length = read_len(reader)?;
                // Cap the up-front allocation; a lying length fails on read instead.
                let mut list = Vec::with_capacity(length.min(4096));
                for _ in 0..length {
                    list.push(Tag::read_payload(reader, element_type, depth + 1)?);
                }
                Tag::List(list)
            }
            10 => {
                let mut compound = Compound::new();
                loop {
                    let (name, tag) = Tag::read_named(reader, depth + 1)?;
                    if let Tag::End = tag {
                        break;
                    }
                    compound.insert(name, tag);
                }
                Tag::Compound(compound)
            }
            11 => {
                let length = read_len(reader)?;
                let mut ints = Vec::with_capacity(length.min(4096));
                for _ in 0..length {
                    ints.push(reader.read_i32::<BigEndian>()?);
                }
                Tag::IntArray(ints)
            }
            12 => {
                let length = read_len(reader)?;
                let mut longs = Vec::with_capacity(length.min(4096));
                for _ in 0..length {
                    longs.push(reader.read_i64::<BigEndian>()?);
                }
                Tag::LongArray(longs)
            }
            _ => return Err(invalid(format!("Invalid tag type: {}", type_id))),
        };
        Ok(tag)
    }

    pub fn write<W: Write>(&self, writer: &mut W, name: &str) -> io::Result<()> {
        writer.write_u8(self.get_type_id())?;
        if !matches!(self, Tag::End) {
            write_utf8(writer, name)?;
        }
        self.write_payload(writer)
    }

    fn write_payload<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        match self {
            Tag::End => Ok(()),
            Tag::Byte(v) => writer.write_i8(*v),
            Tag::Short(v) => writer.write_i16::<BigEndian>(*v),
            Tag::Int(v) => writer.write_i32::<BigEndian>(*v),
            Tag::Long(v) => writer.write_i64::<BigEndian>(*v),
            Tag::Float(v) => writer.write_f32::<BigEndian>(*v),
            Tag::Double(v) => writer.write_f64::<BigEndian>(*v),
            Tag::ByteArray(v) => {
                writer.write_i32::<BigEndian>(v.len() as i32)?;
                let bytes: Vec<u8> = v.iter().map(|&b| b as u8).collect();
                writer.write_all(&bytes)
            }
            Tag::String(v) => write_utf8(writer, v),
            Tag::List(v) => {
                // Empty lists are typed TAG_End.
                let element_type = v.first().map_or(0, Tag::get_type_id);
                if v.iter().any(|tag| tag.get_type_id() != element_type) {
                    return Err(invalid("List elements must share one tag type".to_owned()));
                }
                writer.write_u8(element_type)?;
                writer.write_i32::<BigEndian>(v.len() as i32)?;
                for tag in v {
                    tag.write_payload(writer)?;
                }
                Ok(())
            }
            Tag::Compound(v) => {
                for (name, tag) in v {
                    tag.write(writer, name)?;
                }
                writer.write_u8(0)
            }
            Tag::IntArray(v) => {
                writer.write_i32::<BigEndian>(v.len() as i32)?;
                for &i in v {
                    writer.write_i32::<BigEndian>(i)?;
                }
                Ok(())
            }
            Tag::LongArray(v) => {
                writer.write_i32::<BigEndian>(v.len() as i32)?;
                for &l in v {
                    writer.write_i64::<BigEndian>(l)?;
                }
                Ok(())
            }
        }
    }

    pub fn compound<'a, I>(entries: I) -> Tag
    where
        I: IntoIterator<Item = (&'a str, Tag)>,
    {
        Tag::Compound(
            entries
                .into_iter()
                .map(|(key, value)| (key.to_owned(), value))
                .collect(),
        )
    }

    /// Looks up `key` when this tag is a compound.
    pub fn get(&self, key: &str) -> Option<&Tag> {
        self.as_compound()?.get(key)
    }

    pub fn as_compound(&self) -> Option<&Compound> {
        match self {
            Tag::Compound(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Vec<Tag>> {
        match self {
            Tag::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&String> {
        match self {
            Tag::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_long_array(&self) -> Option<&[i64]> {
        match self {
            Tag::LongArray(longs) => Some(longs),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Tag::Long(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Tag::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_i8(&self) -> Option<i8> {
        match self {
            Tag::Byte(n) => Some(*n),
            _ => None,
        }
    }
}

/// A whole NBT document: one named root tag, optionally gzip or zlib framed.
pub struct NbtFile {
    pub name: String,
    pub root: Tag,
}

impl NbtFile {
    pub fn new(name: String, root: Tag) -> Self {
        NbtFile { name, root }
    }

    pub fn read<R: Read>(reader: &mut R) -> io::Result<Self> {
        let (name, root) = Tag::read(reader)?;
        Ok(NbtFile { name, root })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.root.write(writer, &self.name)
    }

    pub fn read_gzip<R: Read>(reader: R) -> io::Result<Self> {
        Self::read(&mut GzDecoder::new(reader))
    }

    pub fn write_gzip<W: Write>(&self, writer: W) -> io::Result<W> {
        let mut encoder = GzEncoder::new(writer, Compression::default());
        self.write(&mut encoder)?;
        encoder.finish()
    }

    pub fn read_zlib<R: Read>(reader: R) -> io::Result<Self> {
        Self::read(&mut ZlibDecoder::new(reader))
    }

    pub fn write_zlib<W: Write>(&self, writer: W) -> io::Result<W> {
        let mut encoder = ZlibEncoder::new(writer, Compression::default());
        self.write(&mut encoder)?;
        encoder.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_compound() -> Tag {
        let mut section = Compound::new();
        section.insert("Y".to_string(), Tag::Byte(-4));
        section.insert("data".to_string(), Tag::LongArray(vec![1, -1, i64::MAX]));

        let mut compound = Compound::new();
        compound.insert("xPos".to_string(), Tag::Int(-12));
        compound.insert("Status".to_string(), Tag::String("minecraft:full".to_string()));
        compound.insert("sections".to_string(), Tag::List(vec![Tag::Compound(section)]));
        compound.insert("PostProcessing".to_string(), Tag::List(vec![]));
        Tag::Compound(compound)
    }

    #[test]
    fn test_compound_read_write() {
        let tag = sample_compound();
        let mut buffer = Vec::new();
        tag.write(&mut buffer, "").unwrap();

        let (name, read_tag) = Tag::read(&mut Cursor::new(buffer)).unwrap();
        assert_eq!(name, "");
        assert_eq!(read_tag, tag);
    }

    #[test]
    fn test_scalar_encoding_is_big_endian() {
        let mut buffer = Vec::new();
        Tag::Int(0x01020304).write(&mut buffer, "a").unwrap();
        assert_eq!(buffer, vec![3, 0, 1, b'a', 1, 2, 3, 4]);
    }

    #[test]
    fn test_get_walks_compound() {
        let tag = sample_compound();
        assert_eq!(tag.get("xPos").and_then(Tag::as_i32), Some(-12));
        assert!(tag.get("missing").is_none());
        assert!(Tag::Int(1).get("xPos").is_none());
    }

    #[test]
    fn test_empty_list_is_typed_end() {
        let mut buffer = Vec::new();
        Tag::List(vec![]).write(&mut buffer, "").unwrap();
        // type, empty name, element type, length
        assert_eq!(buffer, vec![9, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_mixed_list_is_rejected() {
        let list = Tag::List(vec![Tag::Int(1), Tag::String("x".to_string())]);
        assert!(list.write(&mut Vec::new(), "").is_err());
    }

    #[test]
    fn test_negative_length_is_rejected() {
        let bytes = vec![12, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF];
        let err = Tag::read(&mut Cursor::new(bytes)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_truncated_input_fails() {
        let mut buffer = Vec::new();
        sample_compound().write(&mut buffer, "").unwrap();
        buffer.truncate(buffer.len() / 2);
        assert!(Tag::read(&mut Cursor::new(buffer)).is_err());
    }

    #[test]
    fn test_invalid_tag_type() {
        let bytes = vec![42, 0, 0];
        assert!(Tag::read(&mut Cursor::new(bytes)).is_err());
    }

    #[test]
    fn test_gzip_and_zlib_framing() {
        let file = NbtFile::new("".to_string(), sample_compound());

        let gzip = file.write_gzip(Vec::new()).unwrap();
        assert_eq!(&gzip[..2], &[0x1f, 0x8b]);
        let read = NbtFile::read_gzip(Cursor::new(gzip)).unwrap();
        assert_eq!(read.root, file.root);

        let zlib = file.write_zlib(Vec::new()).unwrap();
        assert_eq!(zlib[0], 0x78);
        let read = NbtFile::read_zlib(Cursor::new(zlib)).unwrap();
        assert_eq!(read.root, file.root);
    }
}
