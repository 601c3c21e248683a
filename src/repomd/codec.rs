// src/repomd/codec.rs

//! repomd.xml reader and writer
//!
//! Decoding is forward compatible: unknown elements and attributes are
//! skipped at any depth. Encoding always produces the same canonical layout
//! (declaration, fixed namespaces, two-space indentation, entries in
//! insertion order), so `encode(decode(encode(m)))` is byte-identical to
//! `encode(m)`.

use super::{Checksum, ChecksumType, RepoDatabase, RepoMetadata};
use crate::error::{Error, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::io::Write;
use std::str::FromStr;
use tracing::debug;

/// Default namespace of the repomd root element
pub const NS_REPO: &str = "http://linux.duke.edu/metadata/repo";

/// Namespace bound to the `rpm` prefix
pub const NS_RPM: &str = "http://linux.duke.edu/metadata/rpm";

const ROOT: &str = "repomd";

fn malformed(message: impl Into<String>) -> Error {
    Error::MalformedManifest(message.into())
}

/// Decode a repomd.xml document
pub fn decode(bytes: &[u8]) -> Result<RepoMetadata> {
    let xml = std::str::from_utf8(bytes)
        .map_err(|e| malformed(format!("document is not valid UTF-8: {}", e)))?;

    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    reader.check_end_names(true);

    let mut parser = ManifestParser::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = local_name(e.local_name().as_ref())?;
                parser.start(&name, &e)?;
                parser.path.push(name);
            }
            Ok(Event::Empty(e)) => {
                let name = local_name(e.local_name().as_ref())?;
                parser.start(&name, &e)?;
                parser.end(&name)?;
            }
            Ok(Event::End(e)) => {
                let name = local_name(e.local_name().as_ref())?;
                if parser.path.pop().as_deref() != Some(name.as_str()) {
                    return Err(malformed(format!("unexpected closing tag </{}>", name)));
                }
                parser.end(&name)?;
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|e| malformed(format!("invalid text content: {}", e)))?;
                parser.text(&text)?;
            }
            Ok(Event::CData(e)) => {
                let raw = e.into_inner();
                parser.text(&String::from_utf8_lossy(&raw))?;
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(malformed(format!(
                    "XML error at position {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    parser.finish()
}

fn local_name(raw: &[u8]) -> Result<String> {
    std::str::from_utf8(raw)
        .map(str::to_string)
        .map_err(|e| malformed(format!("invalid element name: {}", e)))
}

fn attribute(e: &BytesStart, key: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| malformed(format!("invalid attribute: {}", e)))?;
        if attr.key.as_ref() == key {
            let value = attr
                .unescape_value()
                .map_err(|e| malformed(format!("invalid attribute value: {}", e)))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn parse_number<T: FromStr>(field: &str, text: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    text.trim()
        .parse()
        .map_err(|e| malformed(format!("invalid {} '{}': {}", field, text, e)))
}

/// Partially read `<data>` element
#[derive(Default)]
struct DataBuilder {
    data_type: String,
    location: Option<String>,
    timestamp: i64,
    size: u64,
    checksum: Option<Checksum>,
    open_size: u64,
    open_checksum: Option<Checksum>,
    database_version: u32,
}

impl DataBuilder {
    fn build(self) -> Result<RepoDatabase> {
        let location = self.location.ok_or_else(|| {
            malformed(format!("data entry '{}' has no location", self.data_type))
        })?;

        Ok(RepoDatabase {
            data_type: self.data_type,
            location,
            timestamp: self.timestamp,
            size: self.size,
            checksum: self.checksum,
            open_size: self.open_size,
            open_checksum: self.open_checksum,
            database_version: self.database_version,
        })
    }
}

/// Event-driven state for `decode`
///
/// `path` holds the local names of the currently open elements. Depth 1 is
/// the child level of `<repomd>`, depth 2 the child level of `<data>`.
#[derive(Default)]
struct ManifestParser {
    path: Vec<String>,
    seen_root: bool,
    revision: u64,
    databases: Vec<RepoDatabase>,
    current: Option<DataBuilder>,
    checksum_type: Option<ChecksumType>,
    text: String,
}

impl ManifestParser {
    fn in_data(&self) -> bool {
        self.path.len() == 2 && self.current.is_some()
    }

    fn start(&mut self, name: &str, e: &BytesStart) -> Result<()> {
        self.text.clear();

        match self.path.len() {
            0 => {
                if self.seen_root {
                    return Err(malformed("content after the root element"));
                }
                if name != ROOT {
                    return Err(malformed(format!(
                        "expected <{}> root element, found <{}>",
                        ROOT, name
                    )));
                }
                self.seen_root = true;
            }
            1 if name == "data" => {
                let data_type = attribute(e, b"type")?
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| malformed("data element without a type attribute"))?;
                self.current = Some(DataBuilder {
                    data_type,
                    ..Default::default()
                });
            }
            _ if self.in_data() => match name {
                "location" => {
                    let href = attribute(e, b"href")?.filter(|h| !h.is_empty());
                    if let Some(db) = self.current.as_mut() {
                        let href = href.ok_or_else(|| {
                            malformed(format!(
                                "location of '{}' has no href attribute",
                                db.data_type
                            ))
                        })?;
                        db.location = Some(href);
                    }
                }
                "checksum" | "open-checksum" => {
                    let algorithm = attribute(e, b"type")?
                        .ok_or_else(|| malformed(format!("<{}> without a type attribute", name)))?;
                    self.checksum_type = Some(ChecksumType::parse(&algorithm));
                }
                _ => {}
            },
            _ => {}
        }
        Ok(())
    }

    fn text(&mut self, text: &str) -> Result<()> {
        if self.path.is_empty() {
            return Err(malformed("text outside of the root element"));
        }
        self.text.push_str(text);
        Ok(())
    }

    fn end(&mut self, name: &str) -> Result<()> {
        let text = std::mem::take(&mut self.text);

        match self.path.len() {
            1 if name == "revision" => {
                self.revision = parse_number("revision", &text)?;
            }
            1 if name == "data" => {
                if let Some(builder) = self.current.take() {
                    let db = builder.build()?;
                    debug!("Decoded data entry '{}' at {}", db.data_type, db.location);
                    self.databases.push(db);
                }
            }
            _ if self.in_data() => {
                let Some(db) = self.current.as_mut() else {
                    return Ok(());
                };
                match name {
                    "timestamp" => db.timestamp = parse_number(name, &text)?,
                    "size" => db.size = parse_number(name, &text)?,
                    "open-size" => db.open_size = parse_number(name, &text)?,
                    "database_version" => db.database_version = parse_number(name, &text)?,
                    "checksum" | "open-checksum" => {
                        let algorithm = self.checksum_type.take().ok_or_else(|| {
                            malformed(format!("<{}> without a type attribute", name))
                        })?;
                        // An empty digest counts as absent; entry validation
                        // rejects it unless the matching size is zero.
                        let digest = text.trim();
                        let checksum =
                            (!digest.is_empty()).then(|| Checksum::new(algorithm, digest));
                        if name == "checksum" {
                            db.checksum = checksum;
                        } else {
                            db.open_checksum = checksum;
                        }
                    }
                    _ => {}
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn finish(self) -> Result<RepoMetadata> {
        if !self.path.is_empty() {
            return Err(malformed(format!(
                "unexpected end of document inside <{}>",
                self.path.join("><")
            )));
        }
        if !self.seen_root {
            return Err(malformed("document has no <repomd> element"));
        }
        RepoMetadata::new(self.revision, self.databases)
    }
}

pub(super) fn write_document<W: Write>(md: &RepoMetadata, out: W) -> Result<()> {
    let mut writer = Writer::new_with_indent(out, b' ', 2);
    write_events(&mut writer, md).map_err(|e| match e {
        quick_xml::Error::Io(io) => Error::Io(std::io::Error::new(io.kind(), io.to_string())),
        other => Error::Io(std::io::Error::other(other.to_string())),
    })?;
    writer.get_mut().write_all(b"\n")?;
    Ok(())
}

fn write_events<W: Write>(writer: &mut Writer<W>, md: &RepoMetadata) -> quick_xml::Result<()> {
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let root = BytesStart::new(ROOT).with_attributes([("xmlns", NS_REPO), ("xmlns:rpm", NS_RPM)]);
    writer.write_event(Event::Start(root))?;
    write_text(writer, "revision", &md.revision().to_string())?;

    for db in md.databases() {
        let data = BytesStart::new("data").with_attributes([("type", db.data_type.as_str())]);
        writer.write_event(Event::Start(data))?;

        let location = BytesStart::new("location").with_attributes([("href", db.location.as_str())]);
        writer.write_event(Event::Empty(location))?;
        write_text(writer, "timestamp", &db.timestamp.to_string())?;
        write_text(writer, "size", &db.size.to_string())?;
        if let Some(checksum) = &db.checksum {
            write_checksum(writer, "checksum", checksum)?;
        }
        write_text(writer, "open-size", &db.open_size.to_string())?;
        if let Some(checksum) = &db.open_checksum {
            write_checksum(writer, "open-checksum", checksum)?;
        }
        write_text(writer, "database_version", &db.database_version.to_string())?;

        writer.write_event(Event::End(BytesEnd::new("data")))?;
    }

    writer.write_event(Event::End(BytesEnd::new(ROOT)))?;
    Ok(())
}

fn write_text<W: Write>(writer: &mut Writer<W>, name: &str, text: &str) -> quick_xml::Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn write_checksum<W: Write>(
    writer: &mut Writer<W>,
    name: &str,
    checksum: &Checksum,
) -> quick_xml::Result<()> {
    let start = BytesStart::new(name).with_attributes([("type", checksum.algorithm.as_str())]);
    writer.write_event(Event::Start(start))?;
    writer.write_event(Event::Text(BytesText::new(&checksum.digest)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}
