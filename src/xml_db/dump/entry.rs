use base64::{engine::general_purpose as base64_engine, Engine as _};
use xml::writer::{EventWriter, XmlEvent as WriterEvent};

use crate::{
    db::{Attachment, AutoType, AutoTypeAssociation, Entry, History, Value},
    xml_db::dump::{DumpContext, DumpXml, SimpleTag},
};

impl DumpXml for Entry {
    fn dump_xml<E: std::io::Write>(
        &self,
        writer: &mut EventWriter<E>,
        ctx: &mut DumpContext<'_>,
    ) -> Result<(), xml::writer::Error> {
        writer.write(WriterEvent::start_element("Entry"))?;

        SimpleTag("UUID", &self.uuid).dump_xml(writer, ctx)?;

        SimpleTag("Tags", &self.tags.join(";")).dump_xml(writer, ctx)?;

        for (field_name, field_value) in &self.fields {
            writer.write(WriterEvent::start_element("String"))?;

            SimpleTag("Key", field_name).dump_xml(writer, ctx)?;
            field_value.dump_xml(writer, ctx)?;

            writer.write(WriterEvent::end_element())?; // String
        }

        for attachment in &self.attachments {
            attachment.dump_xml(writer, ctx)?;
        }

        self.custom_data.dump_xml(writer, ctx)?;

        if let Some(ref value) = self.autotype {
            value.dump_xml(writer, ctx)?;
        }

        self.times.dump_xml(writer, ctx)?;

        if let Some(value) = self.icon_id {
            SimpleTag("IconID", value).dump_xml(writer, ctx)?;
        }

        if let Some(ref value) = self.custom_icon_uuid {
            SimpleTag("CustomIconUUID", value).dump_xml(writer, ctx)?;
        }

        if let Some(ref value) = self.foreground_color {
            SimpleTag("ForegroundColor", value).dump_xml(writer, ctx)?;
        }

        if let Some(ref value) = self.background_color {
            SimpleTag("BackgroundColor", value).dump_xml(writer, ctx)?;
        }

        if let Some(ref value) = self.override_url {
            SimpleTag("OverrideURL", value).dump_xml(writer, ctx)?;
        }

        if let Some(value) = self.quality_check {
            SimpleTag("QualityCheck", value).dump_xml(writer, ctx)?;
        }

        if let Some(ref value) = self.previous_parent_group {
            SimpleTag("PreviousParentGroup", value).dump_xml(writer, ctx)?;
        }

        if let Some(ref value) = self.history {
            value.dump_xml(writer, ctx)?;
        }

        writer.write(WriterEvent::end_element())?; // Entry

        Ok(())
    }
}

impl DumpXml for Value {
    fn dump_xml<E: std::io::Write>(
        &self,
        writer: &mut EventWriter<E>,
        ctx: &mut DumpContext<'_>,
    ) -> Result<(), xml::writer::Error> {
        match self {
            Value::Bytes(b) => {
                let encoded = base64_engine::STANDARD.encode(b);
                SimpleTag("Value", &encoded).dump_xml(writer, ctx)
            }
            Value::Unprotected(s) => SimpleTag("Value", s).dump_xml(writer, ctx),
            Value::Protected(p) => {
                writer.write(WriterEvent::start_element("Value").attr("Protected", "True"))?;

                let encrypted_value = ctx.inner_cipher.encrypt(p.unsecure());

                let protected_value = base64_engine::STANDARD.encode(encrypted_value);

                writer.write(WriterEvent::characters(&protected_value))?;

                writer.write(WriterEvent::end_element())?;
                Ok(())
            }
        }
    }
}

impl DumpXml for Attachment {
    fn dump_xml<E: std::io::Write>(
        &self,
        writer: &mut EventWriter<E>,
        ctx: &mut DumpContext<'_>,
    ) -> Result<(), xml::writer::Error> {
        writer.write(WriterEvent::start_element("Binary"))?;

        SimpleTag("Key", &self.key).dump_xml(writer, ctx)?;

        let ref_id = format!("{}", self.ref_id);
        writer.write(WriterEvent::start_element("Value").attr("Ref", &ref_id))?;
        writer.write(WriterEvent::end_element())?; // Value

        writer.write(WriterEvent::end_element())?; // Binary
        Ok(())
    }
}

impl DumpXml for AutoType {
    fn dump_xml<E: std::io::Write>(
        &self,
        writer: &mut EventWriter<E>,
        ctx: &mut DumpContext<'_>,
    ) -> Result<(), xml::writer::Error> {
        writer.write(WriterEvent::start_element("AutoType"))?;

        SimpleTag("Enabled", self.enabled).dump_xml(writer, ctx)?;

        SimpleTag("DataTransferObfuscation", self.obfuscation).dump_xml(writer, ctx)?;

        if let Some(ref value) = self.sequence {
            SimpleTag("DefaultSequence", value).dump_xml(writer, ctx)?;
        }

        for assoc in &self.associations {
            assoc.dump_xml(writer, ctx)?;
        }

        writer.write(WriterEvent::end_element())?;
        Ok(())
    }
}

impl DumpXml for AutoTypeAssociation {
    fn dump_xml<E: std::io::Write>(
        &self,
        writer: &mut EventWriter<E>,
        ctx: &mut DumpContext<'_>,
    ) -> Result<(), xml::writer::Error> {
        writer.write(WriterEvent::start_element("Association"))?;

        if let Some(ref value) = self.window {
            SimpleTag("Window", value).dump_xml(writer, ctx)?;
        }

        if let Some(ref value) = self.sequence {
            SimpleTag("KeystrokeSequence", value).dump_xml(writer, ctx)?;
        }

        writer.write(WriterEvent::end_element())?;
        Ok(())
    }
}

impl DumpXml for History {
    fn dump_xml<E: std::io::Write>(
        &self,
        writer: &mut EventWriter<E>,
        ctx: &mut DumpContext<'_>,
    ) -> Result<(), xml::writer::Error> {
        writer.write(WriterEvent::start_element("History"))?;

        for entry in &self.entries {
            entry.dump_xml(writer, ctx)?;
        }

        writer.write(WriterEvent::end_element())?;
        Ok(())
    }
}
