use kdbx_core::{config::DatabaseConfig, fields, Database, DatabaseKey, Entry, Group};

#[test]
fn deleted_objects_roundtrip() {
    let mut db = Database::new(DatabaseConfig::default());

    let mut group = Group::new("To be deleted");
    let mut entry = Entry::new();
    entry.set_unprotected(fields::TITLE, "doomed");
    let entry_uuid = entry.uuid;
    group.add_child(entry);
    let group_uuid = group.uuid;
    db.root.add_child(group);

    // delete the entry, then its group
    db.delete_node(&entry_uuid).expect("entry should be deleted");
    db.delete_node(&group_uuid).expect("group should be deleted");

    assert!(db.root.children.is_empty());
    assert_eq!(db.deleted_objects.objects.len(), 2);

    let key = DatabaseKey::new().with_password("delete-me");

    let mut buffer = Vec::new();
    db.save(&mut buffer, key.clone()).unwrap();
    let loaded = Database::parse(&buffer, key).unwrap();

    assert_eq!(loaded, db);
    assert!(loaded.deleted_objects.contains(entry_uuid));
    assert!(loaded.deleted_objects.contains(group_uuid));
}

#[test]
fn deletion_times_are_preserved_to_the_second() {
    let mut db = Database::new(DatabaseConfig::default());

    let entry = Entry::new();
    let entry_uuid = entry.uuid;
    db.root.add_child(entry);
    db.delete_node(&entry_uuid);

    let deletion_time = db.deleted_objects.objects[0].deletion_time;

    let key = DatabaseKey::new().with_password("delete-me");

    let mut buffer = Vec::new();
    db.save(&mut buffer, key.clone()).unwrap();
    let loaded = Database::parse(&buffer, key).unwrap();

    assert_eq!(loaded.deleted_objects.objects[0].deletion_time, deletion_time);
}
