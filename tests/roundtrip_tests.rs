use kdbx_core::{
    config::{CompressionConfig, DatabaseConfig, DatabaseVersion, InnerCipherConfig, KdfConfig, OuterCipherConfig},
    fields, Attachment, AutoType, AutoTypeAssociation, CustomDataItem, Database, DatabaseKey, DeletedObject,
    Entry, Group, History, Icon, MemoryProtection, NodeRef, TriState, Value,
};

fn full_featured_database(config: DatabaseConfig) -> Database {
    let mut db = Database::new(config);

    db.meta.generator = Some("kdbx-core-tests".to_string());
    db.meta.database_name = Some("Round trip fixture".to_string());
    db.meta.database_name_changed = Some("2021-06-01T13:37:00".parse().unwrap());
    db.meta.database_description = Some("A database with every feature in use".to_string());
    db.meta.default_username = Some("jdoe".to_string());
    db.meta.maintenance_history_days = Some(365);
    db.meta.color = Some("#C0FFEE".parse().unwrap());
    db.meta.master_key_change_rec = Some(-1);
    db.meta.master_key_change_force = Some(42);
    db.meta.memory_protection = Some(MemoryProtection::default());
    db.meta.recyclebin_enabled = Some(true);
    db.meta.recyclebin_uuid = Some(uuid::Uuid::new_v4());
    db.meta.history_max_items = Some(10);
    db.meta.history_max_size = Some(1024 * 1024);
    db.meta.custom_icons.icons.push(Icon {
        uuid: uuid::Uuid::new_v4(),
        data: vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A],
        name: Some("fav icon".to_string()),
        last_modification_time: Some("2022-02-02T02:02:02".parse().unwrap()),
    });
    db.meta.custom_data.items.insert(
        "KPXC_DECRYPTION_TIME_PREFERENCE".to_string(),
        CustomDataItem {
            value: Some(Value::Unprotected("1000".to_string())),
            last_modification_time: Some("2022-03-03T03:03:03".parse().unwrap()),
        },
    );

    let attachment_ref = db.add_binary(b"some attached bytes".to_vec(), false);

    let mut subgroup = Group::new("Email accounts");
    subgroup.notes = Some("all the mail".to_string());
    subgroup.icon_id = Some(19);
    subgroup.is_expanded = true;
    subgroup.enable_autotype = TriState::Enable;
    subgroup.enable_searching = TriState::Disable;
    subgroup.default_autotype_sequence = Some("{USERNAME}{TAB}{PASSWORD}{ENTER}".to_string());

    let mut entry = Entry::new();
    entry.set_unprotected(fields::TITLE, "Mail");
    entry.set_unprotected(fields::USERNAME, "jdoe@example.com");
    entry.set_protected(fields::PASSWORD, "correct horse battery staple");
    entry.set_unprotected(fields::URL, "https://mail.example.com/");
    entry.tags = vec!["mail".to_string()];
    entry.icon_id = Some(12);
    entry.foreground_color = Some("#102030".parse().unwrap());
    entry.background_color = Some("#A0B0C0".parse().unwrap());
    entry.override_url = Some("cmd://firefox {URL}".to_string());
    entry.quality_check = Some(true);
    entry.attachments.push(Attachment {
        key: "notes.txt".to_string(),
        ref_id: attachment_ref,
    });
    entry.autotype = Some(AutoType {
        enabled: true,
        obfuscation: 0,
        sequence: Some("{USERNAME}{TAB}{PASSWORD}{ENTER}".to_string()),
        associations: vec![AutoTypeAssociation {
            window: Some("Sign in*".to_string()),
            sequence: Some("{PASSWORD}{ENTER}".to_string()),
        }],
    });
    entry.custom_data.items.insert(
        "plugin:setting".to_string(),
        CustomDataItem {
            value: Some(Value::Unprotected("on".to_string())),
            last_modification_time: None,
        },
    );

    let mut old_version = entry.clone();
    old_version.set_unprotected(fields::TITLE, "Mail (old)");
    let mut history = History::default();
    history.add_entry(old_version);
    entry.history = Some(history);

    subgroup.add_child(entry);
    db.root.add_child(subgroup);

    let mut second = Entry::new();
    second.set_unprotected(fields::TITLE, "Second entry");
    second.set_protected(fields::PASSWORD, "another secret");
    db.root.add_child(second);

    db.deleted_objects.objects.push(DeletedObject {
        uuid: uuid::Uuid::new_v4(),
        deletion_time: "2020-01-01T00:00:00".parse().unwrap(),
    });

    db
}

fn roundtrip(db: &Database, key: &DatabaseKey) -> Database {
    let mut buffer = Vec::new();
    db.save(&mut buffer, key.clone()).expect("save should succeed");
    Database::parse(&buffer, key.clone()).expect("load should succeed")
}

#[test]
fn kdbx4_full_featured_roundtrip() {
    let db = full_featured_database(DatabaseConfig::default());
    let key = DatabaseKey::new().with_password("test-password");

    let loaded = roundtrip(&db, &key);

    assert_eq!(loaded, db);

    let entry = match loaded.root.get(&["Email accounts", "Mail"]) {
        Some(NodeRef::Entry(e)) => e,
        _ => panic!("entry not found"),
    };
    assert_eq!(entry.get_password(), Some("correct horse battery staple"));
    assert_eq!(
        loaded.get_binary(entry.attachments[0].ref_id),
        Some(&b"some attached bytes"[..])
    );

    let history = entry.history.as_ref().expect("history survives");
    assert_eq!(history.entries[0].get_title(), Some("Mail (old)"));
}

#[test]
fn kdbx3_full_featured_roundtrip() {
    let config = DatabaseConfig {
        version: DatabaseVersion::KDB3(1),
        outer_cipher_config: OuterCipherConfig::AES256,
        compression_config: CompressionConfig::GZip,
        inner_cipher_config: InnerCipherConfig::Salsa20,
        kdf_config: KdfConfig::Aes { rounds: 6000 },
        public_custom_data: None,
    };

    let db = full_featured_database(config);
    let key = DatabaseKey::new().with_password("test-password");

    let loaded = roundtrip(&db, &key);

    assert_eq!(loaded, db);
}

#[test]
fn roundtrip_with_password_and_keyfile() {
    let db = full_featured_database(DatabaseConfig::default());

    let key = DatabaseKey::new()
        .with_password("test-password")
        .with_keyfile(&mut &b"keyfile contents"[..])
        .unwrap();

    let loaded = roundtrip(&db, &key);
    assert_eq!(loaded, db);

    // neither factor alone opens the database
    let mut buffer = Vec::new();
    db.save(&mut buffer, key.clone()).unwrap();

    assert!(Database::parse(&buffer, DatabaseKey::new().with_password("test-password")).is_err());
    assert!(Database::parse(
        &buffer,
        DatabaseKey::new().with_keyfile(&mut &b"keyfile contents"[..]).unwrap()
    )
    .is_err());
}

#[test]
fn timestamps_roundtrip_to_the_second() {
    let mut db = Database::new(DatabaseConfig::default());

    let mut entry = Entry::new();
    entry.set_unprotected(fields::TITLE, "times");
    entry.times.expires = true;
    entry.times.usage_count = 17;
    entry.times.set_expiry("2037-12-31T23:59:59".parse().unwrap());
    entry.times.set_creation("2001-09-09T01:46:40".parse().unwrap());
    let expiry = *entry.times.get_expiry().unwrap();
    let creation = *entry.times.get_creation().unwrap();
    db.root.add_child(entry);

    let key = DatabaseKey::new().with_password("t");
    let loaded = roundtrip(&db, &key);

    let entry = match loaded.root.get(&["times"]) {
        Some(NodeRef::Entry(e)) => e,
        _ => panic!("entry not found"),
    };

    assert!(entry.times.expires);
    assert_eq!(entry.times.usage_count, 17);
    assert_eq!(entry.times.get_expiry(), Some(&expiry));
    assert_eq!(entry.times.get_creation(), Some(&creation));
}
