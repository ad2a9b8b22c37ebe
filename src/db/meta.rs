use chrono::NaiveDateTime;
use uuid::Uuid;

use crate::db::{Color, CustomData};

/// Database metadata
#[derive(Debug, Default, Eq, PartialEq, Clone)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize))]
pub struct Meta {
    /// The program that wrote the database
    pub generator: Option<String>,

    pub database_name: Option<String>,
    pub database_name_changed: Option<NaiveDateTime>,

    pub database_description: Option<String>,
    pub database_description_changed: Option<NaiveDateTime>,

    pub default_username: Option<String>,
    pub default_username_changed: Option<NaiveDateTime>,

    pub maintenance_history_days: Option<usize>,

    pub color: Option<Color>,

    pub master_key_changed: Option<NaiveDateTime>,
    pub master_key_change_rec: Option<isize>,
    pub master_key_change_force: Option<isize>,

    pub memory_protection: Option<MemoryProtection>,

    pub custom_icons: CustomIcons,

    pub recyclebin_enabled: Option<bool>,
    pub recyclebin_uuid: Option<Uuid>,
    pub recyclebin_changed: Option<NaiveDateTime>,

    pub entry_templates_group: Option<Uuid>,
    pub entry_templates_group_changed: Option<NaiveDateTime>,

    pub last_selected_group: Option<Uuid>,
    pub last_top_visible_group: Option<Uuid>,

    pub history_max_items: Option<usize>,
    pub history_max_size: Option<usize>,

    pub settings_changed: Option<NaiveDateTime>,

    /// The XML representation of the binary pool, only present in KDBX3
    /// files. The format layer moves these into the shared pool on the
    /// `Database` after reading.
    #[cfg_attr(feature = "serialization", serde(skip))]
    pub(crate) binaries: BinaryAttachments,

    /// The header hash element of KDBX3 files; verified and cleared by the
    /// format layer on reading.
    #[cfg_attr(feature = "serialization", serde(skip))]
    pub(crate) header_hash: Option<Vec<u8>>,

    pub custom_data: CustomData,
}

/// Which of the standard fields of an entry should be protected by the inner
/// stream cipher
#[derive(Debug, Eq, PartialEq, Clone)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize))]
pub struct MemoryProtection {
    pub protect_title: bool,
    pub protect_username: bool,
    pub protect_password: bool,
    pub protect_url: bool,
    pub protect_notes: bool,
}

impl Default for MemoryProtection {
    fn default() -> Self {
        Self {
            protect_title: false,
            protect_username: false,
            protect_password: true,
            protect_url: false,
            protect_notes: false,
        }
    }
}

/// The binary pool as represented in the XML of KDBX3 files
#[derive(Debug, Default, Eq, PartialEq, Clone)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize))]
pub struct BinaryAttachments {
    pub binaries: Vec<BinaryAttachment>,
}

/// A single slot of the XML binary pool
#[derive(Debug, Default, Eq, PartialEq, Clone)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize))]
pub struct BinaryAttachment {
    pub identifier: Option<String>,
    pub compressed: bool,
    pub content: Vec<u8>,
}

/// Icons embedded in the database
#[derive(Debug, Default, Eq, PartialEq, Clone)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize))]
pub struct CustomIcons {
    pub icons: Vec<Icon>,
}

/// An icon embedded in the database
#[derive(Debug, Default, Eq, PartialEq, Clone)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize))]
pub struct Icon {
    pub uuid: Uuid,

    /// The raw image bytes
    pub data: Vec<u8>,

    /// A display name (KDBX 4.1)
    pub name: Option<String>,

    /// When the icon was last changed (KDBX 4.1)
    pub last_modification_time: Option<NaiveDateTime>,
}
