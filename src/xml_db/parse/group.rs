use std::iter::Peekable;

use uuid::Uuid;

use crate::{
    crypt::ciphers::Cipher,
    db::{CustomData, Entry, Group, Node, Times, TriState},
    xml_db::parse::{FromXml, IgnoreSubfield, SimpleTag, SimpleXmlEvent, XmlParseError},
};

impl FromXml for Group {
    type Parses = Self;

    fn from_xml<I: Iterator<Item = SimpleXmlEvent>>(
        iterator: &mut Peekable<I>,
        inner_cipher: &mut dyn Cipher,
    ) -> Result<Self::Parses, XmlParseError> {
        let open_tag = iterator.next().ok_or(XmlParseError::Eof)?;
        if !matches!(open_tag, SimpleXmlEvent::Start(ref tag, _) if tag == "Group") {
            return Err(XmlParseError::BadEvent {
                expected: "Open Group tag",
                event: open_tag,
            });
        }

        // start from a fresh group so that even a malformed document cannot
        // produce a nil UUID
        let mut out = Self::new("");

        while let Some(event) = iterator.peek() {
            match event {
                SimpleXmlEvent::Start(name, _) => match &name[..] {
                    "UUID" => {
                        out.uuid = SimpleTag::<Uuid>::from_xml(iterator, inner_cipher)?.value;
                    }
                    "Name" => {
                        out.name = SimpleTag::<String>::from_xml(iterator, inner_cipher)?.value;
                    }
                    "Notes" => {
                        out.notes = SimpleTag::<Option<String>>::from_xml(iterator, inner_cipher)?.value;
                    }
                    "IconID" => {
                        out.icon_id = Some(SimpleTag::<usize>::from_xml(iterator, inner_cipher)?.value);
                    }
                    "CustomIconUUID" => {
                        out.custom_icon_uuid =
                            SimpleTag::<Option<Uuid>>::from_xml(iterator, inner_cipher)?.value;
                    }
                    "Times" => {
                        out.times = Times::from_xml(iterator, inner_cipher)?;
                    }
                    "IsExpanded" => {
                        out.is_expanded = SimpleTag::<bool>::from_xml(iterator, inner_cipher)?.value;
                    }
                    "DefaultAutoTypeSequence" => {
                        out.default_autotype_sequence =
                            SimpleTag::<Option<String>>::from_xml(iterator, inner_cipher)?.value;
                    }
                    "EnableAutoType" => {
                        out.enable_autotype = SimpleTag::<Option<TriState>>::from_xml(iterator, inner_cipher)?
                            .value
                            .unwrap_or_default();
                    }
                    "EnableSearching" => {
                        out.enable_searching =
                            SimpleTag::<Option<TriState>>::from_xml(iterator, inner_cipher)?
                                .value
                                .unwrap_or_default();
                    }
                    "LastTopVisibleEntry" => {
                        out.last_top_visible_entry =
                            SimpleTag::<Option<Uuid>>::from_xml(iterator, inner_cipher)?.value;
                    }
                    "PreviousParentGroup" => {
                        out.previous_parent_group =
                            SimpleTag::<Option<Uuid>>::from_xml(iterator, inner_cipher)?.value;
                    }
                    "CustomData" => {
                        out.custom_data = CustomData::from_xml(iterator, inner_cipher)?;
                    }
                    "Entry" => {
                        let entry = Entry::from_xml(iterator, inner_cipher)?;
                        out.children.push(Node::Entry(entry));
                    }
                    "Group" => {
                        let group = Group::from_xml(iterator, inner_cipher)?;
                        out.children.push(Node::Group(group));
                    }
                    _ => {
                        tracing::warn!("Unknown Group element: {}", name);
                        IgnoreSubfield::from_xml(iterator, inner_cipher)?;
                    }
                },
                SimpleXmlEvent::End(name) if name == "Group" => break,
                _ => {
                    return Err(XmlParseError::BadEvent {
                        expected: "start tag or close Group",
                        event: event.clone(),
                    })
                }
            }
        }

        let close_tag = iterator.next().ok_or(XmlParseError::Eof)?;
        if !matches!(close_tag, SimpleXmlEvent::End(ref tag) if tag == "Group") {
            return Err(XmlParseError::BadEvent {
                expected: "Close Group tag",
                event: close_tag,
            });
        }

        Ok(out)
    }
}

#[cfg(test)]
mod group_parse_tests {
    use super::*;
    use crate::xml_db::parse::parse_test::parse_test_xml;

    #[test]
    fn group_with_tri_states_and_children() -> Result<(), XmlParseError> {
        let group = parse_test_xml::<Group>(
            "<Group>\
                <UUID>4H0inlNiTEeXtl7J2qLxlQ==</UUID>\
                <Name>General</Name>\
                <Notes>some notes</Notes>\
                <IconID>48</IconID>\
                <IsExpanded>True</IsExpanded>\
                <EnableAutoType>null</EnableAutoType>\
                <EnableSearching>false</EnableSearching>\
                <Group><Name>Sub</Name></Group>\
                <Entry><String><Key>Title</Key><Value>inner</Value></String></Entry>\
            </Group>",
        )?;

        assert_eq!(group.name, "General");
        assert_eq!(group.notes.as_deref(), Some("some notes"));
        assert_eq!(group.icon_id, Some(48));
        assert!(group.is_expanded);
        assert_eq!(group.enable_autotype, TriState::Inherit);
        assert_eq!(group.enable_searching, TriState::Disable);
        assert_eq!(group.children.len(), 2);

        Ok(())
    }

    #[test]
    fn empty_tri_state_tag_means_inherit() -> Result<(), XmlParseError> {
        let group = parse_test_xml::<Group>("<Group><EnableAutoType></EnableAutoType></Group>")?;
        assert_eq!(group.enable_autotype, TriState::Inherit);
        Ok(())
    }
}
