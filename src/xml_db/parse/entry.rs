use std::iter::Peekable;

use base64::{engine::general_purpose as base64_engine, Engine as _};
use secstr::SecStr;
use uuid::Uuid;

use crate::{
    crypt::ciphers::Cipher,
    db::{Attachment, AutoType, AutoTypeAssociation, Color, CustomData, Entry, History, Times, Value},
    xml_db::parse::{FromXml, IgnoreSubfield, SimpleTag, SimpleXmlEvent, XmlParseError},
};

impl FromXml for Entry {
    type Parses = Self;

    fn from_xml<I: Iterator<Item = SimpleXmlEvent>>(
        iterator: &mut Peekable<I>,
        inner_cipher: &mut dyn Cipher,
    ) -> Result<Self::Parses, XmlParseError> {
        let open_tag = iterator.next().ok_or(XmlParseError::Eof)?;
        if !matches!(open_tag, SimpleXmlEvent::Start(ref tag, _) if tag == "Entry") {
            return Err(XmlParseError::BadEvent {
                expected: "Open entry tag",
                event: open_tag,
            });
        }

        // start from a fresh entry so that even a malformed document cannot
        // produce a nil UUID
        let mut out = Self::new();

        while let Some(event) = iterator.peek() {
            match event {
                SimpleXmlEvent::Start(name, _) => match &name[..] {
                    "UUID" => {
                        out.uuid = SimpleTag::<Uuid>::from_xml(iterator, inner_cipher)?.value;
                    }
                    "Tags" => {
                        if let Some(tags) = SimpleTag::<Option<String>>::from_xml(iterator, inner_cipher)?.value
                        {
                            out.tags = tags
                                .split(|c| c == ';' || c == ',')
                                .map(|x| x.to_owned())
                                .collect();
                            out.tags.sort();
                        }
                    }
                    "String" => {
                        let field = StringField::from_xml(iterator, inner_cipher)?;
                        if let Some(value) = field.value {
                            out.fields.insert(field.key, value);
                        }
                    }
                    "Binary" => {
                        let field = BinaryField::from_xml(iterator, inner_cipher)?;
                        out.attachments.push(Attachment {
                            key: field.key,
                            ref_id: field.identifier.parse()?,
                        });
                    }
                    "CustomData" => {
                        out.custom_data = CustomData::from_xml(iterator, inner_cipher)?;
                    }
                    "AutoType" => {
                        out.autotype = Some(AutoType::from_xml(iterator, inner_cipher)?);
                    }
                    "Times" => {
                        out.times = Times::from_xml(iterator, inner_cipher)?;
                    }
                    "IconID" => {
                        out.icon_id = Some(SimpleTag::<usize>::from_xml(iterator, inner_cipher)?.value);
                    }
                    "CustomIconUUID" => {
                        out.custom_icon_uuid =
                            SimpleTag::<Option<Uuid>>::from_xml(iterator, inner_cipher)?.value;
                    }
                    "ForegroundColor" => {
                        out.foreground_color =
                            SimpleTag::<Option<Color>>::from_xml(iterator, inner_cipher)?.value;
                    }
                    "BackgroundColor" => {
                        out.background_color =
                            SimpleTag::<Option<Color>>::from_xml(iterator, inner_cipher)?.value;
                    }
                    "OverrideURL" => {
                        out.override_url =
                            SimpleTag::<Option<String>>::from_xml(iterator, inner_cipher)?.value;
                    }
                    "QualityCheck" => {
                        out.quality_check =
                            SimpleTag::<Option<bool>>::from_xml(iterator, inner_cipher)?.value;
                    }
                    "PreviousParentGroup" => {
                        out.previous_parent_group =
                            SimpleTag::<Option<Uuid>>::from_xml(iterator, inner_cipher)?.value;
                    }
                    "History" => {
                        out.history = Some(History::from_xml(iterator, inner_cipher)?);
                    }
                    _ => {
                        tracing::warn!("Unknown Entry element: {}", name);
                        IgnoreSubfield::from_xml(iterator, inner_cipher)?;
                    }
                },
                SimpleXmlEvent::End(name) if name == "Entry" => break,
                _ => {
                    return Err(XmlParseError::BadEvent {
                        expected: "start tag or close entry",
                        event: event.clone(),
                    })
                }
            }
        }

        // no need to check for the correct closing tag - checked by XmlReader
        let _close_tag = iterator.next().ok_or(XmlParseError::Eof)?;

        Ok(out)
    }
}

#[derive(Debug, Default)]
struct StringField {
    key: String,
    value: Option<Value>,
}

impl FromXml for StringField {
    type Parses = StringField;

    fn from_xml<I: Iterator<Item = SimpleXmlEvent>>(
        iterator: &mut Peekable<I>,
        inner_cipher: &mut dyn Cipher,
    ) -> Result<Self::Parses, XmlParseError> {
        let open_tag = iterator.next().ok_or(XmlParseError::Eof)?;
        if !matches!(open_tag, SimpleXmlEvent::Start(ref tag, _) if tag == "String") {
            return Err(XmlParseError::BadEvent {
                expected: "Open string tag",
                event: open_tag,
            });
        }

        let mut out = Self::default();

        while let Some(event) = iterator.peek() {
            match event {
                SimpleXmlEvent::Start(name, _) => match &name[..] {
                    "Key" => {
                        out.key = SimpleTag::<String>::from_xml(iterator, inner_cipher)?.value;
                    }
                    "Value" => {
                        let value = Value::from_xml(iterator, inner_cipher)?;
                        if !value.is_empty() {
                            out.value = Some(value)
                        }
                    }
                    _ => {
                        IgnoreSubfield::from_xml(iterator, inner_cipher)?;
                    }
                },
                SimpleXmlEvent::End(name) if name == "String" => break,
                _ => {
                    return Err(XmlParseError::BadEvent {
                        expected: "start tag or close String",
                        event: event.clone(),
                    })
                }
            }
        }

        // no need to check for the correct closing tag - checked by XmlReader
        let _close_tag = iterator.next().ok_or(XmlParseError::Eof)?;

        Ok(out)
    }
}

struct BinaryField {
    key: String,
    identifier: String,
}

impl FromXml for BinaryField {
    type Parses = Self;

    fn from_xml<I: Iterator<Item = SimpleXmlEvent>>(
        iterator: &mut Peekable<I>,
        inner_cipher: &mut dyn Cipher,
    ) -> Result<Self::Parses, XmlParseError> {
        let open_tag = iterator.next().ok_or(XmlParseError::Eof)?;
        if !matches!(open_tag, SimpleXmlEvent::Start(ref tag, _) if tag == "Binary") {
            return Err(XmlParseError::BadEvent {
                expected: "Open Binary tag",
                event: open_tag,
            });
        }

        let key = SimpleTag::<String>::from_xml(iterator, inner_cipher)?.value;

        let value_event = iterator.next().ok_or(XmlParseError::Eof)?;
        let identifier = if let SimpleXmlEvent::Start(ref name, ref attributes) = value_event {
            if name != "Value" {
                return Err(XmlParseError::BadEvent {
                    expected: "Open Value tag",
                    event: value_event,
                });
            }

            attributes
                .get("Ref")
                .ok_or_else(|| XmlParseError::BadEvent {
                    expected: "Value tag with Ref attribute",
                    event: value_event.clone(),
                })?
                .to_string()
        } else {
            return Err(XmlParseError::BadEvent {
                expected: "Open Value tag",
                event: value_event,
            });
        };

        let close_value_tag = iterator.next().ok_or(XmlParseError::Eof)?;
        if !matches!(close_value_tag, SimpleXmlEvent::End(ref tag) if tag == "Value") {
            return Err(XmlParseError::BadEvent {
                expected: "Close Value tag",
                event: close_value_tag,
            });
        }

        // no need to check for the correct closing tag - checked by XmlReader
        let _close_tag = iterator.next().ok_or(XmlParseError::Eof)?;

        Ok(BinaryField { key, identifier })
    }
}

impl FromXml for Value {
    type Parses = Value;

    fn from_xml<I: Iterator<Item = SimpleXmlEvent>>(
        iterator: &mut Peekable<I>,
        inner_cipher: &mut dyn Cipher,
    ) -> Result<Self::Parses, XmlParseError> {
        let open_tag = iterator.next().ok_or(XmlParseError::Eof)?;

        if let SimpleXmlEvent::Start(ref tag, ref attributes) = open_tag {
            if tag == "Value" {
                let protected: bool = attributes
                    .get("Protected")
                    .map(|v| v.to_lowercase().parse::<bool>())
                    .unwrap_or(Ok(false))?;

                let content = Option::<String>::from_xml(iterator, inner_cipher)?.unwrap_or_default();

                let value = if protected {
                    let buf = base64_engine::STANDARD.decode(&content)?;
                    let buf_decrypted = inner_cipher
                        .decrypt(&buf)
                        .map_err(crate::error::CryptographyError::from)?;
                    let value = String::from_utf8_lossy(&buf_decrypted).to_string();
                    Value::Protected(SecStr::from(value))
                } else {
                    Value::Unprotected(content)
                };

                // no need to check for the correct closing tag - checked by XmlReader
                let _close_tag = iterator.next().ok_or(XmlParseError::Eof)?;

                return Ok(value);
            }
        }
        Err(XmlParseError::BadEvent {
            expected: "Open value tag",
            event: open_tag,
        })
    }
}

impl FromXml for AutoType {
    type Parses = Self;

    fn from_xml<I: Iterator<Item = SimpleXmlEvent>>(
        iterator: &mut Peekable<I>,
        inner_cipher: &mut dyn Cipher,
    ) -> Result<Self::Parses, XmlParseError> {
        let open_tag = iterator.next().ok_or(XmlParseError::Eof)?;
        if !matches!(open_tag, SimpleXmlEvent::Start(ref tag, _) if tag == "AutoType") {
            return Err(XmlParseError::BadEvent {
                expected: "Open AutoType tag",
                event: open_tag,
            });
        }

        let mut out = AutoType::default();

        while let Some(event) = iterator.peek() {
            match event {
                SimpleXmlEvent::Start(name, _) => match &name[..] {
                    "Enabled" => {
                        out.enabled = SimpleTag::<bool>::from_xml(iterator, inner_cipher)?.value;
                    }
                    "DefaultSequence" => {
                        out.sequence = SimpleTag::<Option<String>>::from_xml(iterator, inner_cipher)?.value;
                    }
                    "DataTransferObfuscation" => {
                        out.obfuscation = SimpleTag::<Option<usize>>::from_xml(iterator, inner_cipher)?
                            .value
                            .unwrap_or_default();
                    }
                    "Association" => {
                        let ata = AutoTypeAssociation::from_xml(iterator, inner_cipher)?;
                        out.associations.push(ata);
                    }
                    _ => {
                        IgnoreSubfield::from_xml(iterator, inner_cipher)?;
                    }
                },
                SimpleXmlEvent::End(name) if name == "AutoType" => break,
                _ => {
                    return Err(XmlParseError::BadEvent {
                        expected: "start tag or close AutoType",
                        event: event.clone(),
                    })
                }
            }
        }

        // no need to check for the correct closing tag - checked by XmlReader
        let _close_tag = iterator.next().ok_or(XmlParseError::Eof)?;

        Ok(out)
    }
}

impl FromXml for AutoTypeAssociation {
    type Parses = Self;

    fn from_xml<I: Iterator<Item = SimpleXmlEvent>>(
        iterator: &mut Peekable<I>,
        inner_cipher: &mut dyn Cipher,
    ) -> Result<Self::Parses, XmlParseError> {
        let open_tag = iterator.next().ok_or(XmlParseError::Eof)?;
        if !matches!(open_tag, SimpleXmlEvent::Start(ref tag, _) if tag == "Association") {
            return Err(XmlParseError::BadEvent {
                expected: "Open Association tag",
                event: open_tag,
            });
        }

        let mut out = Self::default();

        while let Some(event) = iterator.peek() {
            match event {
                SimpleXmlEvent::Start(name, _) => match &name[..] {
                    "Window" => {
                        out.window = SimpleTag::<Option<String>>::from_xml(iterator, inner_cipher)?.value;
                    }
                    "KeystrokeSequence" => {
                        out.sequence = SimpleTag::<Option<String>>::from_xml(iterator, inner_cipher)?.value;
                    }
                    _ => {
                        IgnoreSubfield::from_xml(iterator, inner_cipher)?;
                    }
                },
                SimpleXmlEvent::End(name) if name == "Association" => break,
                _ => {
                    return Err(XmlParseError::BadEvent {
                        expected: "start tag or close Association",
                        event: event.clone(),
                    })
                }
            }
        }

        // no need to check for the correct closing tag - checked by XmlReader
        let _close_tag = iterator.next().ok_or(XmlParseError::Eof)?;

        Ok(out)
    }
}

impl FromXml for History {
    type Parses = Self;

    fn from_xml<I: Iterator<Item = SimpleXmlEvent>>(
        iterator: &mut Peekable<I>,
        inner_cipher: &mut dyn Cipher,
    ) -> Result<Self::Parses, XmlParseError> {
        let open_tag = iterator.next().ok_or(XmlParseError::Eof)?;
        if !matches!(open_tag, SimpleXmlEvent::Start(ref tag, _) if tag == "History") {
            return Err(XmlParseError::BadEvent {
                expected: "Open History tag",
                event: open_tag,
            });
        }

        let mut entries = Vec::new();

        while let Some(event) = iterator.peek() {
            match event {
                SimpleXmlEvent::Start(name, _) => match &name[..] {
                    "Entry" => {
                        let entry = Entry::from_xml(iterator, inner_cipher)?;
                        entries.push(entry);
                    }
                    _ => {
                        IgnoreSubfield::from_xml(iterator, inner_cipher)?;
                    }
                },
                SimpleXmlEvent::End(name) if name == "History" => break,
                _ => {
                    return Err(XmlParseError::BadEvent {
                        expected: "start tag or close History",
                        event: event.clone(),
                    })
                }
            }
        }

        // no need to check for the correct closing tag - checked by XmlReader
        let _close_tag = iterator.next().ok_or(XmlParseError::Eof)?;

        Ok(Self { entries })
    }
}

#[cfg(test)]
mod entry_parse_tests {
    use super::*;
    use crate::xml_db::parse::parse_test::parse_test_xml;

    #[test]
    fn entry_with_all_simple_fields() -> Result<(), XmlParseError> {
        let entry = parse_test_xml::<Entry>(
            "<Entry>\
                <UUID>4H0inlNiTEeXtl7J2qLxlQ==</UUID>\
                <IconID>42</IconID>\
                <ForegroundColor>#C0FFEE</ForegroundColor>\
                <BackgroundColor>#1C1357</BackgroundColor>\
                <OverrideURL>https://example.com/</OverrideURL>\
                <QualityCheck>False</QualityCheck>\
                <Tags>b;a</Tags>\
                <String><Key>Title</Key><Value>Demo</Value></String>\
            </Entry>",
        )?;

        assert_eq!(entry.icon_id, Some(42));
        assert_eq!(entry.foreground_color, Some("#C0FFEE".parse().unwrap()));
        assert_eq!(entry.background_color, Some("#1C1357".parse().unwrap()));
        assert_eq!(entry.override_url.as_deref(), Some("https://example.com/"));
        assert_eq!(entry.quality_check, Some(false));
        assert_eq!(entry.tags, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(entry.get_title(), Some("Demo"));

        Ok(())
    }

    #[test]
    fn entry_with_attachment_reference() -> Result<(), XmlParseError> {
        let entry = parse_test_xml::<Entry>(
            "<Entry>\
                <Binary><Key>hello.txt</Key><Value Ref=\"3\"/></Binary>\
            </Entry>",
        )?;

        assert_eq!(entry.attachments.len(), 1);
        assert_eq!(entry.attachments[0].key, "hello.txt");
        assert_eq!(entry.attachments[0].ref_id, 3);

        Ok(())
    }

    #[test]
    fn unknown_elements_are_skipped() -> Result<(), XmlParseError> {
        let entry = parse_test_xml::<Entry>(
            "<Entry><SomePluginElement><Inner>x</Inner></SomePluginElement>\
             <String><Key>Title</Key><Value>kept</Value></String></Entry>",
        )?;

        assert_eq!(entry.get_title(), Some("kept"));
        Ok(())
    }

    #[test]
    fn history_entries_have_no_history() -> Result<(), XmlParseError> {
        let entry = parse_test_xml::<Entry>(
            "<Entry>\
                <String><Key>Title</Key><Value>current</Value></String>\
                <History>\
                    <Entry><String><Key>Title</Key><Value>old</Value></String></Entry>\
                </History>\
            </Entry>",
        )?;

        let history = entry.history.expect("history should be parsed");
        assert_eq!(history.entries.len(), 1);
        assert_eq!(history.entries[0].get_title(), Some("old"));
        assert!(history.entries[0].history.is_none());

        Ok(())
    }
}
