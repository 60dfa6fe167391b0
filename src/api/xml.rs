//! XML documents of the wire protocol

use anyhow::Result;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event as XmlEvent};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;

use crate::model::{Event, PackageManifest};
use crate::resolve::PackageIndex;
use crate::util::file_stem;

type XmlWriter = Writer<Vec<u8>>;

fn writer() -> XmlWriter {
    Writer::new_with_indent(Vec::new(), b' ', 2)
}

fn finish(writer: XmlWriter) -> Result<String> {
    let mut out = String::from_utf8(writer.into_inner())?;
    out.push('\n');
    Ok(out)
}

fn text_element(writer: &mut XmlWriter, tag: &str, text: &str) -> Result<()> {
    writer.write_event(XmlEvent::Start(BytesStart::new(tag)))?;
    writer.write_event(XmlEvent::Text(BytesText::new(text)))?;
    writer.write_event(XmlEvent::End(BytesEnd::new(tag)))?;
    Ok(())
}

/// `<directory>` listing the packages and link aliases of a project
pub fn project_directory(manifest: &PackageManifest) -> Result<String> {
    let mut writer = writer();
    writer.write_event(XmlEvent::Start(BytesStart::new("directory")))?;
    for name in manifest.names() {
        let mut entry = BytesStart::new("entry");
        entry.push_attribute(("name", name));
        writer.write_event(XmlEvent::Empty(entry))?;
    }
    writer.write_event(XmlEvent::End(BytesEnd::new("directory")))?;
    finish(writer)
}

/// `<directory name srcmd5 rev vrev>` listing the files of a package
pub fn package_directory(index: &PackageIndex) -> Result<String> {
    let mut writer = writer();
    let rev = index.rev.to_string();
    let mut root = BytesStart::new("directory");
    root.push_attribute(("name", index.name.as_str()));
    root.push_attribute(("srcmd5", index.srcmd5.as_str()));
    root.push_attribute(("rev", rev.as_str()));
    if let Some(vrev) = &index.vrev {
        root.push_attribute(("vrev", vrev.as_str()));
    }
    writer.write_event(XmlEvent::Start(root))?;

    for file in &index.entries {
        let size = file.size.to_string();
        let mtime = file.mtime.to_string();
        let mut entry = BytesStart::new("entry");
        entry.push_attribute(("name", file.name.as_str()));
        entry.push_attribute(("size", size.as_str()));
        entry.push_attribute(("mtime", mtime.as_str()));
        entry.push_attribute(("md5", file.md5.as_str()));
        writer.write_event(XmlEvent::Empty(entry))?;
    }

    writer.write_event(XmlEvent::End(BytesEnd::new("directory")))?;
    finish(writer)
}

/// `<events next>` carrying a batch of events
pub fn events(next: u64, events: &[Event]) -> Result<String> {
    let mut writer = writer();
    let next = next.to_string();
    let mut root = BytesStart::new("events");
    root.push_attribute(("next", next.as_str()));
    writer.write_event(XmlEvent::Start(root))?;

    for event in events {
        let mut element = BytesStart::new("event");
        element.push_attribute(("type", event.kind.as_str()));
        writer.write_event(XmlEvent::Start(element))?;
        text_element(&mut writer, "project", &event.project)?;
        if let Some(package) = &event.package {
            text_element(&mut writer, "package", package)?;
        }
        writer.write_event(XmlEvent::End(BytesEnd::new("event")))?;
    }

    writer.write_event(XmlEvent::End(BytesEnd::new("events")))?;
    finish(writer)
}

/// `<events next sync="lost"/>`
pub fn sync_lost(next: u64) -> Result<String> {
    let mut writer = writer();
    let next = next.to_string();
    let mut root = BytesStart::new("events");
    root.push_attribute(("next", next.as_str()));
    root.push_attribute(("sync", "lost"));
    writer.write_event(XmlEvent::Empty(root))?;
    finish(writer)
}

/// Keep only `<binary>` elements whose `attr` stem is one of `wanted`
pub fn filter_binaries(xml: &str, attr: &str, wanted: &[String]) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut writer = writer();

    let keep = |element: &BytesStart<'_>| -> Result<bool> {
        let Some(value) = element.try_get_attribute(attr)? else {
            return Ok(false);
        };
        let value = value.unescape_value()?;
        Ok(wanted.iter().any(|w| w == file_stem(&value)))
    };

    loop {
        match reader.read_event()? {
            XmlEvent::Empty(e) if e.name().as_ref() == b"binary" => {
                if keep(&e)? {
                    writer.write_event(XmlEvent::Empty(e))?;
                }
            }
            XmlEvent::Start(e) if e.name().as_ref() == b"binary" => {
                if keep(&e)? {
                    writer.write_event(XmlEvent::Start(e))?;
                } else {
                    reader.read_to_end(e.name())?;
                }
            }
            XmlEvent::Eof => break,
            event => writer.write_event(event)?,
        }
    }

    finish(writer)
}

/// An empty listing document such as `<binarylist/>`
pub fn empty_listing(root: &str) -> Result<String> {
    let mut writer = writer();
    writer.write_event(XmlEvent::Empty(BytesStart::new(root)))?;
    finish(writer)
}
