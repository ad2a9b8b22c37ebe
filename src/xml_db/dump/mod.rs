mod entry;
mod group;
mod meta;

use std::borrow::Cow;
use std::io::Write;

use base64::{engine::general_purpose as base64_engine, Engine as _};
use uuid::Uuid;
use xml::{
    writer::{EventWriter, XmlEvent as WriterEvent},
    EmitterConfig,
};

use crate::{
    crypt::ciphers::Cipher,
    db::{
        Color, CustomData, CustomDataItem, Database, DeletedObject, DeletedObjects, HeaderAttachment,
        Times, TriState,
    },
    format::DatabaseVersion,
    xml_db::get_epoch_baseline,
};

/// Everything the XML writer needs besides the tree itself: the inner stream
/// cipher (which must be driven in document order), the target format
/// version, and the KDBX3-only extras that get embedded into `Meta`.
pub(crate) struct DumpContext<'a> {
    pub(crate) inner_cipher: &'a mut dyn Cipher,
    pub(crate) version: DatabaseVersion,
    pub(crate) header_hash: Option<Vec<u8>>,
    pub(crate) binaries: &'a [HeaderAttachment],
}

impl DumpContext<'_> {
    pub(crate) fn is_kdbx3(&self) -> bool {
        matches!(self.version, DatabaseVersion::KDB3(_))
    }
}

/// Format a timestamp suitable for the target XML database version
pub(crate) fn format_xml_timestamp(timestamp: &chrono::NaiveDateTime, kdbx3: bool) -> String {
    if kdbx3 {
        // KDBX3 stores ISO-8601 strings in UTC
        timestamp.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    } else {
        // KDBX4 stores seconds since 0001-01-01, Base64 encoded
        let timestamp = timestamp.and_utc().timestamp() - get_epoch_baseline().and_utc().timestamp();
        let timestamp_bytes = i64::to_le_bytes(timestamp);
        base64_engine::STANDARD.encode(timestamp_bytes)
    }
}

fn is_valid_xml_char(c: char) -> bool {
    matches!(c,
        '\u{9}' | '\u{A}' | '\u{D}'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

/// Remove code points that may not appear in an XML 1.0 document, such as
/// control characters
pub(crate) fn strip_invalid_xml_chars(s: &str) -> Cow<'_, str> {
    if s.chars().all(is_valid_xml_char) {
        Cow::Borrowed(s)
    } else {
        Cow::Owned(s.chars().filter(|c| is_valid_xml_char(*c)).collect())
    }
}

pub(crate) fn dump(
    db: &Database,
    ctx: &mut DumpContext<'_>,
    writer: &mut dyn Write,
) -> Result<(), xml::writer::Error> {
    let mut xml_writer = EmitterConfig::new().perform_indent(false).create_writer(writer);

    db.dump_xml(&mut xml_writer, ctx)?;

    Ok(())
}

/// A trait that denotes an inner KeePass database object can be stored into an XML database.
///
/// Using an `xml::writer::EventWriter` and a dump context, emit a series of
/// `XmlEvent`s to the writer to build up the XML document.
pub(crate) trait DumpXml {
    fn dump_xml<E: std::io::Write>(
        &self,
        writer: &mut EventWriter<E>,
        ctx: &mut DumpContext<'_>,
    ) -> Result<(), xml::writer::Error>;

    fn normalize_empty_elements(&self) -> bool {
        false
    }
}

impl DumpXml for &chrono::NaiveDateTime {
    fn dump_xml<E: std::io::Write>(
        &self,
        writer: &mut EventWriter<E>,
        ctx: &mut DumpContext<'_>,
    ) -> Result<(), xml::writer::Error> {
        writer.write(WriterEvent::characters(&format_xml_timestamp(
            self,
            ctx.is_kdbx3(),
        )))
    }
}

impl DumpXml for bool {
    fn dump_xml<E: std::io::Write>(
        &self,
        writer: &mut EventWriter<E>,
        _ctx: &mut DumpContext<'_>,
    ) -> Result<(), xml::writer::Error> {
        writer.write(WriterEvent::characters(if *self { "True" } else { "False" }))
    }
}

impl DumpXml for TriState {
    fn dump_xml<E: std::io::Write>(
        &self,
        writer: &mut EventWriter<E>,
        _ctx: &mut DumpContext<'_>,
    ) -> Result<(), xml::writer::Error> {
        writer.write(WriterEvent::characters(self.as_xml_str()))
    }
}

impl DumpXml for usize {
    fn dump_xml<E: std::io::Write>(
        &self,
        writer: &mut EventWriter<E>,
        _ctx: &mut DumpContext<'_>,
    ) -> Result<(), xml::writer::Error> {
        writer.write(WriterEvent::characters(&format!("{}", self)))
    }
}

impl DumpXml for isize {
    fn dump_xml<E: std::io::Write>(
        &self,
        writer: &mut EventWriter<E>,
        _ctx: &mut DumpContext<'_>,
    ) -> Result<(), xml::writer::Error> {
        writer.write(WriterEvent::characters(&format!("{}", self)))
    }
}

impl DumpXml for &str {
    fn dump_xml<E: std::io::Write>(
        &self,
        writer: &mut EventWriter<E>,
        _ctx: &mut DumpContext<'_>,
    ) -> Result<(), xml::writer::Error> {
        writer.write(WriterEvent::characters(strip_invalid_xml_chars(self).as_ref()))
    }

    fn normalize_empty_elements(&self) -> bool {
        self.is_empty()
    }
}

impl DumpXml for &String {
    fn dump_xml<E: std::io::Write>(
        &self,
        writer: &mut EventWriter<E>,
        _ctx: &mut DumpContext<'_>,
    ) -> Result<(), xml::writer::Error> {
        writer.write(WriterEvent::characters(strip_invalid_xml_chars(self).as_ref()))
    }

    fn normalize_empty_elements(&self) -> bool {
        self.is_empty()
    }
}

impl DumpXml for &Uuid {
    fn dump_xml<E: std::io::Write>(
        &self,
        writer: &mut EventWriter<E>,
        _ctx: &mut DumpContext<'_>,
    ) -> Result<(), xml::writer::Error> {
        let b64 = base64_engine::STANDARD.encode(self.as_bytes());
        writer.write(WriterEvent::characters(&b64))
    }
}

impl DumpXml for &Color {
    fn dump_xml<E: std::io::Write>(
        &self,
        writer: &mut EventWriter<E>,
        _ctx: &mut DumpContext<'_>,
    ) -> Result<(), xml::writer::Error> {
        writer.write(WriterEvent::characters(&self.to_string()))
    }
}

/// Convenience type for simplified serialization of single-value elements.
pub(crate) struct SimpleTag<S: AsRef<str>, D: DumpXml>(pub S, pub D);

impl<S: AsRef<str>, D: DumpXml> DumpXml for SimpleTag<S, D> {
    fn dump_xml<E: std::io::Write>(
        &self,
        writer: &mut EventWriter<E>,
        ctx: &mut DumpContext<'_>,
    ) -> Result<(), xml::writer::Error> {
        writer.write(WriterEvent::start_element(self.0.as_ref()))?;
        if !self.1.normalize_empty_elements() {
            self.1.dump_xml(writer, ctx)?;
        }
        writer.write(WriterEvent::end_element())?;
        Ok(())
    }
}

impl DumpXml for Database {
    fn dump_xml<E: std::io::Write>(
        &self,
        writer: &mut EventWriter<E>,
        ctx: &mut DumpContext<'_>,
    ) -> Result<(), xml::writer::Error> {
        writer.write(WriterEvent::start_element("KeePassFile"))?;

        self.meta.dump_xml(writer, ctx)?;

        writer.write(WriterEvent::start_element("Root"))?;

        self.root.dump_xml(writer, ctx)?;

        self.deleted_objects.dump_xml(writer, ctx)?;

        writer.write(WriterEvent::end_element())?; // Root

        writer.write(WriterEvent::end_element())?; // KeePassFile

        Ok(())
    }
}

impl DumpXml for Times {
    fn dump_xml<E: std::io::Write>(
        &self,
        writer: &mut EventWriter<E>,
        ctx: &mut DumpContext<'_>,
    ) -> Result<(), xml::writer::Error> {
        writer.write(WriterEvent::start_element("Times"))?;
        for (time_name, time) in &self.times {
            SimpleTag(time_name, time).dump_xml(writer, ctx)?;
        }

        SimpleTag("Expires", self.expires).dump_xml(writer, ctx)?;
        SimpleTag("UsageCount", self.usage_count).dump_xml(writer, ctx)?;

        writer.write(WriterEvent::end_element())?;

        Ok(())
    }
}

impl DumpXml for CustomData {
    fn dump_xml<E: std::io::Write>(
        &self,
        writer: &mut EventWriter<E>,
        ctx: &mut DumpContext<'_>,
    ) -> Result<(), xml::writer::Error> {
        writer.write(WriterEvent::start_element("CustomData"))?;

        for (key, item) in &self.items {
            writer.write(WriterEvent::start_element("Item"))?;

            SimpleTag("Key", key).dump_xml(writer, ctx)?;
            item.dump_xml(writer, ctx)?;

            writer.write(WriterEvent::end_element())?;
        }

        writer.write(WriterEvent::end_element())?;

        Ok(())
    }
}

impl DumpXml for CustomDataItem {
    fn dump_xml<E: std::io::Write>(
        &self,
        writer: &mut EventWriter<E>,
        ctx: &mut DumpContext<'_>,
    ) -> Result<(), xml::writer::Error> {
        if let Some(ref value) = self.value {
            value.dump_xml(writer, ctx)?;
        }

        if let Some(ref value) = self.last_modification_time {
            SimpleTag("LastModificationTime", value).dump_xml(writer, ctx)?;
        }

        Ok(())
    }
}

impl DumpXml for DeletedObjects {
    fn dump_xml<E: std::io::Write>(
        &self,
        writer: &mut EventWriter<E>,
        ctx: &mut DumpContext<'_>,
    ) -> Result<(), xml::writer::Error> {
        writer.write(WriterEvent::start_element("DeletedObjects"))?;

        for object in &self.objects {
            object.dump_xml(writer, ctx)?;
        }

        writer.write(WriterEvent::end_element())?;
        Ok(())
    }
}

impl DumpXml for DeletedObject {
    fn dump_xml<E: std::io::Write>(
        &self,
        writer: &mut EventWriter<E>,
        ctx: &mut DumpContext<'_>,
    ) -> Result<(), xml::writer::Error> {
        writer.write(WriterEvent::start_element("DeletedObject"))?;

        SimpleTag("UUID", &self.uuid).dump_xml(writer, ctx)?;
        SimpleTag("DeletionTime", &self.deletion_time).dump_xml(writer, ctx)?;

        writer.write(WriterEvent::end_element())?;
        Ok(())
    }
}

#[cfg(test)]
mod dump_tests {
    use super::strip_invalid_xml_chars;

    #[test]
    fn invalid_xml_chars_are_stripped() {
        assert_eq!(strip_invalid_xml_chars("plain text"), "plain text");
        assert_eq!(strip_invalid_xml_chars("tab\tand\nnewline\r"), "tab\tand\nnewline\r");
        assert_eq!(strip_invalid_xml_chars("nul\u{0}byte"), "nulbyte");
        assert_eq!(strip_invalid_xml_chars("bell\u{7}"), "bell");
        assert_eq!(strip_invalid_xml_chars("ffff\u{FFFF}"), "ffff");
        assert_eq!(strip_invalid_xml_chars("emoji \u{1F511} stays"), "emoji \u{1F511} stays");
    }
}
