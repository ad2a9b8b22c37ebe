pub(crate) mod dump;
pub(crate) mod parse;

/// In KDBX4, timestamps are stored as seconds, Base64 encoded, since 0001-01-01 00:00:00.
/// This function returns the epoch baseline used by KDBX for date serialization.
pub(crate) fn get_epoch_baseline() -> chrono::NaiveDateTime {
    chrono::NaiveDateTime::parse_from_str("0001-01-01T00:00:00", "%Y-%m-%dT%H:%M:%S").unwrap_or_default()
}

#[cfg(test)]
mod xml_db_tests {
    use crate::{
        config::{DatabaseConfig, InnerCipherConfig},
        db::{Database, Entry},
        format::DatabaseVersion,
        xml_db::dump::DumpContext,
    };

    fn dump_two_entry_document(key: &[u8]) -> String {
        let mut db = Database::new(DatabaseConfig::default());

        let mut first = Entry::new();
        first.set_unprotected("Title", "first");
        first.set_protected("Password", "alpha-secret-1");
        db.root.add_child(first);

        let mut second = Entry::new();
        second.set_unprotected("Title", "second");
        second.set_protected("Password", "beta-secret-2");
        db.root.add_child(second);

        let mut inner_cipher = InnerCipherConfig::ChaCha20.get_cipher(key).unwrap();
        let mut ctx = DumpContext {
            inner_cipher: &mut *inner_cipher,
            version: DatabaseVersion::KDB4(1),
            header_hash: None,
            binaries: &[],
        };

        let mut xml = Vec::new();
        crate::xml_db::dump::dump(&db, &mut ctx, &mut xml).unwrap();

        String::from_utf8(xml).unwrap()
    }

    fn passwords_in_document_order(xml: &str, key: &[u8]) -> Vec<(String, String)> {
        let mut inner_cipher = InnerCipherConfig::ChaCha20.get_cipher(key).unwrap();
        let content = crate::xml_db::parse::parse(xml.as_bytes(), &mut *inner_cipher).unwrap();

        content
            .root
            .group
            .children
            .iter()
            .map(|node| match node {
                crate::db::Node::Entry(e) => (
                    e.get_title().unwrap_or_default().to_string(),
                    e.get_password().unwrap_or_default().to_string(),
                ),
                _ => panic!("only entries expected"),
            })
            .collect()
    }

    /// The keystream masking protected values is consumed in document order;
    /// decrypting the same elements in a different order yields garbage.
    #[test]
    fn protected_values_depend_on_document_order() {
        let key = [7u8; 64];

        let xml = dump_two_entry_document(&key);

        // reading in the original order decrypts correctly
        let values = passwords_in_document_order(&xml, &key);
        assert_eq!(values[0], ("first".to_string(), "alpha-secret-1".to_string()));
        assert_eq!(values[1], ("second".to_string(), "beta-secret-2".to_string()));

        // swap the two Entry elements without re-encrypting
        let first_start = xml.find("<Entry>").unwrap();
        let first_end = xml.find("</Entry>").unwrap() + "</Entry>".len();
        let second_start = xml[first_end..].find("<Entry>").unwrap() + first_end;
        let second_end = xml[first_end..].find("</Entry>").unwrap() + first_end + "</Entry>".len();

        let swapped = format!(
            "{}{}{}{}{}",
            &xml[..first_start],
            &xml[second_start..second_end],
            &xml[first_end..second_start],
            &xml[first_start..first_end],
            &xml[second_end..]
        );

        let values = passwords_in_document_order(&swapped, &key);

        // the titles swapped, but the protected values decrypt to garbage
        // because the keystream no longer lines up
        assert_eq!(values[0].0, "second");
        assert_eq!(values[1].0, "first");
        assert_ne!(values[0].1, "beta-secret-2");
        assert_ne!(values[1].1, "alpha-secret-1");
    }
}
