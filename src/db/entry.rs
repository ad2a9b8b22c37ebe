use std::collections::HashMap;

use chrono::NaiveDateTime;
use secstr::SecStr;
use uuid::Uuid;

use crate::db::{Color, CustomData, Times};

/// A database entry containing several key-value fields.
#[derive(Debug, Default, Eq, PartialEq, Clone)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize))]
pub struct Entry {
    pub uuid: Uuid,
    pub fields: HashMap<String, Value>,

    /// References into the shared binary pool, in insertion order
    pub attachments: Vec<Attachment>,

    pub autotype: Option<AutoType>,
    pub tags: Vec<String>,

    pub times: Times,

    pub custom_data: CustomData,

    pub icon_id: Option<usize>,
    pub custom_icon_uuid: Option<Uuid>,

    pub foreground_color: Option<Color>,
    pub background_color: Option<Color>,

    pub override_url: Option<String>,

    /// Whether password quality checks and reports apply to this entry
    /// (KDBX 4.1)
    pub quality_check: Option<bool>,

    /// The group this entry was relocated from (KDBX 4.1)
    pub previous_parent_group: Option<Uuid>,

    pub history: Option<History>,
}

impl Entry {
    pub fn new() -> Entry {
        Entry {
            uuid: Uuid::new_v4(),
            times: Times::new(),
            ..Default::default()
        }
    }
}

impl<'a> Entry {
    /// Get a field by name, taking care of unprotecting Protected values automatically
    pub fn get(&'a self, key: &str) -> Option<&'a str> {
        match self.fields.get(key) {
            Some(&Value::Bytes(_)) => None,
            Some(&Value::Protected(ref pv)) => std::str::from_utf8(pv.unsecure()).ok(),
            Some(&Value::Unprotected(ref uv)) => Some(uv),
            None => None,
        }
    }

    /// Get a bytes field by name
    pub fn get_bytes(&'a self, key: &str) -> Option<&'a [u8]> {
        match self.fields.get(key) {
            Some(&Value::Bytes(ref b)) => Some(b),
            _ => None,
        }
    }

    /// Set a field to an unprotected string value
    pub fn set_unprotected(&mut self, key: &str, value: &str) {
        self.fields
            .insert(key.to_string(), Value::Unprotected(value.to_string()));
    }

    /// Set a field to a protected string value, masked by the inner stream
    /// cipher when stored
    pub fn set_protected(&mut self, key: &str, value: &str) {
        self.fields
            .insert(key.to_string(), Value::Protected(value.into()));
    }

    pub fn get_uuid(&'a self) -> &'a Uuid {
        &self.uuid
    }

    /// Get a timestamp field by name
    ///
    /// Returning the chrono::NaiveDateTime which does not include timezone
    /// or UTC offset because KeePass clients typically store timestamps
    /// relative to the local time on the machine writing the data without
    /// including accurate UTC offset or timezone information.
    pub fn get_time(&self, key: &str) -> Option<&NaiveDateTime> {
        self.times.get(key)
    }

    /// Convenience method for getting the time that the entry expires.
    /// This value is usually only meaningful/useful when expires == true
    pub fn get_expiry_time(&self) -> Option<&NaiveDateTime> {
        self.times.get_expiry()
    }

    /// Convenience method for getting the value of the 'Title' field
    pub fn get_title(&'a self) -> Option<&'a str> {
        self.get(crate::db::fields::TITLE)
    }

    /// Convenience method for getting the value of the 'UserName' field
    pub fn get_username(&'a self) -> Option<&'a str> {
        self.get(crate::db::fields::USERNAME)
    }

    /// Convenience method for getting the value of the 'Password' field
    pub fn get_password(&'a self) -> Option<&'a str> {
        self.get(crate::db::fields::PASSWORD)
    }

    /// Convenience method for getting the value of the 'URL' field
    pub fn get_url(&'a self) -> Option<&'a str> {
        self.get(crate::db::fields::URL)
    }

    /// Adds the current version of the entry to the entry's history
    /// and updates the last modification timestamp.
    /// The history will only be updated if the entry has
    /// uncommited changes.
    ///
    /// Returns whether or not a new history entry was added.
    pub fn update_history(&mut self) -> bool {
        if self.history.is_none() {
            self.history = Some(History::default());
        }

        if !self.has_uncommited_changes() {
            return false;
        }

        let mut new_history_entry = self.clone();
        new_history_entry.history.take();

        if let Some(history) = self.history.as_mut() {
            history.add_entry(new_history_entry);
        }

        self.times.set_last_modification(Times::now());
        true
    }

    /// Truncate the history to at most `max_items` snapshots, discarding the
    /// oldest ones
    pub fn truncate_history(&mut self, max_items: usize) {
        if let Some(history) = self.history.as_mut() {
            history.entries.truncate(max_items);
        }
    }

    /// Determines if the entry was modified since the last
    /// history update.
    fn has_uncommited_changes(&self) -> bool {
        if let Some(history) = self.history.as_ref() {
            if history.entries.is_empty() {
                return true;
            }

            let mut sanitized_entry = self.clone();
            sanitized_entry
                .times
                .set_last_modification(NaiveDateTime::default());
            sanitized_entry.history.take();

            if let Some(last_history_entry) = history.entries.first() {
                let mut last_history_entry = last_history_entry.clone();
                last_history_entry
                    .times
                    .set_last_modification(NaiveDateTime::default());
                last_history_entry.history.take();

                if sanitized_entry.eq(&last_history_entry) {
                    return false;
                }
            }
        }
        true
    }
}

/// A value that can be a raw string, byte array, or protected memory region
#[derive(Debug, Eq, PartialEq, Clone)]
pub enum Value {
    Bytes(Vec<u8>),
    Unprotected(String),
    Protected(SecStr),
}

impl Value {
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Bytes(b) => b.is_empty(),
            Value::Unprotected(u) => u.is_empty(),
            Value::Protected(p) => p.unsecure().is_empty(),
        }
    }
}

#[cfg(feature = "serialization")]
impl serde::Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Value::Bytes(b) => serializer.serialize_bytes(b),
            Value::Unprotected(u) => serializer.serialize_str(u),
            Value::Protected(p) => {
                serializer.serialize_str(String::from_utf8_lossy(p.unsecure()).as_ref())
            }
        }
    }
}

/// A named reference from an entry to a slot of the shared binary pool
#[derive(Debug, Default, Eq, PartialEq, Clone)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize))]
pub struct Attachment {
    /// The file name of the attachment
    pub key: String,

    /// The index into the binary pool
    pub ref_id: usize,
}

/// An AutoType setting associated with an Entry
#[derive(Debug, Default, Eq, PartialEq, Clone)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize))]
pub struct AutoType {
    pub enabled: bool,

    /// The obfuscation level for data transfer, 0 meaning none
    pub obfuscation: usize,

    pub sequence: Option<String>,

    pub associations: Vec<AutoTypeAssociation>,
}

/// A window association of an AutoType setting
#[derive(Debug, Default, Eq, PartialEq, Clone)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize))]
pub struct AutoTypeAssociation {
    pub window: Option<String>,
    pub sequence: Option<String>,
}

/// Previous versions of an entry, as snapshots taken before modifications.
///
/// The most recent snapshot comes first. History entries do not have history
/// of their own.
#[derive(Debug, Default, Eq, PartialEq, Clone)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize))]
pub struct History {
    pub entries: Vec<Entry>,
}

impl History {
    pub fn add_entry(&mut self, mut entry: Entry) {
        // history entries do not themselves have history
        entry.history.take();
        self.entries.insert(0, entry);
    }

    pub fn get_entries(&self) -> &Vec<Entry> {
        &self.entries
    }
}

#[cfg(test)]
mod entry_tests {
    use super::{Entry, Value};
    use secstr::SecStr;

    #[test]
    fn byte_values() {
        let mut entry = Entry::new();
        entry
            .fields
            .insert("a-bytes".to_string(), Value::Bytes(vec![1, 2, 3]));

        entry
            .fields
            .insert("a-unprotected".to_string(), Value::Unprotected("asdf".to_string()));

        entry
            .fields
            .insert("a-protected".to_string(), Value::Protected(SecStr::new("asdf".as_bytes().to_vec())));

        assert_eq!(entry.get_bytes("a-bytes"), Some(&[1, 2, 3][..]));
        assert_eq!(entry.get_bytes("a-unprotected"), None);
        assert_eq!(entry.get_bytes("a-protected"), None);

        assert_eq!(entry.get("a-bytes"), None);

        assert!(!entry.fields["a-bytes"].is_empty());
    }

    #[test]
    fn update_history() {
        let mut entry = Entry::new();

        entry.set_unprotected("Title", "first");
        assert!(entry.update_history());
        assert_eq!(entry.history.as_ref().map(|h| h.entries.len()), Some(1));

        // no change, no new snapshot
        assert!(!entry.update_history());
        assert_eq!(entry.history.as_ref().map(|h| h.entries.len()), Some(1));

        entry.set_unprotected("Title", "second");
        assert!(entry.update_history());
        assert_eq!(entry.history.as_ref().map(|h| h.entries.len()), Some(2));

        // newest snapshot comes first and has no history of its own
        let newest = &entry.history.as_ref().unwrap().entries[0];
        assert_eq!(newest.get_title(), Some("second"));
        assert!(newest.history.is_none());

        entry.set_unprotected("Title", "third");
        assert!(entry.update_history());
        entry.truncate_history(2);
        assert_eq!(entry.history.as_ref().map(|h| h.entries.len()), Some(2));
    }

    #[test]
    fn protected_fields_read_back_as_str() {
        let mut entry = Entry::new();
        entry.set_protected("otp", "otpauth://totp/x:y?secret=AAAA");
        assert_eq!(entry.get("otp"), Some("otpauth://totp/x:y?secret=AAAA"));
    }
}
