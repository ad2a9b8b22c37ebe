use std::collections::VecDeque;
use std::str::FromStr;

use uuid::Uuid;

use crate::db::{
    entry::Entry,
    node::{Node, NodeIter, NodeRef, NodeRefMut},
    CustomData, Times,
};

/// A setting that is either inherited from the parent group or explicitly
/// overridden
#[derive(Debug, Default, Eq, PartialEq, Clone, Copy)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize))]
pub enum TriState {
    /// Use the setting of the parent group
    #[default]
    Inherit,
    Enable,
    Disable,
}

impl FromStr for TriState {
    type Err = std::str::ParseBoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "null" => Ok(TriState::Inherit),
            other => Ok(if other.parse::<bool>()? {
                TriState::Enable
            } else {
                TriState::Disable
            }),
        }
    }
}

impl TriState {
    pub(crate) fn as_xml_str(&self) -> &'static str {
        match self {
            TriState::Inherit => "null",
            TriState::Enable => "true",
            TriState::Disable => "false",
        }
    }
}

/// A database group with child groups and entries
#[derive(Debug, Default, Eq, PartialEq, Clone)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize))]
pub struct Group {
    /// The unique identifier of the group
    pub uuid: Uuid,

    /// The name of the group
    pub name: String,

    /// Notes for the group
    pub notes: Option<String>,

    /// ID of the group's icon
    pub icon_id: Option<usize>,

    /// UUID for a custom group icon
    pub custom_icon_uuid: Option<Uuid>,

    /// The list of child nodes (Groups or Entries)
    pub children: Vec<Node>,

    /// The list of time fields for this group
    pub times: Times,

    // Custom Data
    pub custom_data: CustomData,

    /// Whether the group is expanded in the user interface
    pub is_expanded: bool,

    /// Default autotype sequence
    pub default_autotype_sequence: Option<String>,

    /// Whether autotype is enabled for entries of this group
    pub enable_autotype: TriState,

    /// Whether this group shows up in search results
    pub enable_searching: TriState,

    /// UUID for the last top visible entry
    pub last_top_visible_entry: Option<Uuid>,

    /// The group this group was relocated from (KDBX 4.1)
    pub previous_parent_group: Option<Uuid>,
}

impl Group {
    pub fn new(name: &str) -> Group {
        Group {
            name: name.to_string(),
            times: Times::new(),
            uuid: Uuid::new_v4(),
            ..Default::default()
        }
    }

    /// Add a child node (an entry or a group) to this group.
    ///
    /// The group takes ownership of the node.
    pub fn add_child(&mut self, node: impl Into<Node>) {
        self.children.push(node.into());
    }

    /// Recursively get a Group or Entry reference by specifying a path of
    /// names relative to the current Group
    pub fn get<'a>(&'a self, path: &[&str]) -> Option<NodeRef<'a>> {
        if path.is_empty() {
            Some(NodeRef::Group(self))
        } else if path.len() == 1 {
            let head = path[0];
            self.children.iter().find_map(|n| match n {
                Node::Group(g) if g.name == head => Some(n.to_ref()),
                Node::Entry(e) if e.get_title() == Some(head) => Some(n.to_ref()),
                _ => None,
            })
        } else {
            let head = path[0];
            let tail = &path[1..path.len()];

            let head_group = self.children.iter().find_map(|n| match n {
                Node::Group(g) if g.name == head => Some(g),
                _ => None,
            })?;

            head_group.get(tail)
        }
    }

    /// Recursively get a mutable reference to a Group or Entry by specifying
    /// a path of names relative to the current Group
    pub fn get_mut<'a>(&'a mut self, path: &[&str]) -> Option<NodeRefMut<'a>> {
        if path.is_empty() {
            Some(NodeRefMut::Group(self))
        } else if path.len() == 1 {
            let head = path[0];
            self.children
                .iter_mut()
                .filter(|n| match n {
                    Node::Group(g) => g.name == head,
                    Node::Entry(e) => e.get_title() == Some(head),
                })
                .map(|n| n.to_ref_mut())
                .next()
        } else {
            let head = path[0];
            let tail = &path[1..path.len()];

            let head_group = self.children.iter_mut().find_map(|n| match n {
                Node::Group(g) if g.name == head => Some(g),
                _ => None,
            })?;

            head_group.get_mut(tail)
        }
    }

    /// Remove the node with the given UUID from this group or any of its
    /// descendants, returning it.
    pub fn remove_node(&mut self, uuid: &Uuid) -> Option<Node> {
        let position = self.children.iter().position(|n| match n {
            Node::Group(g) => g.uuid == *uuid,
            Node::Entry(e) => e.uuid == *uuid,
        });

        if let Some(position) = position {
            return Some(self.children.remove(position));
        }

        for node in self.children.iter_mut() {
            if let Node::Group(g) = node {
                if let Some(removed) = g.remove_node(uuid) {
                    return Some(removed);
                }
            }
        }

        None
    }

    /// Find an entry anywhere in this group's subtree by UUID
    pub fn find_entry_by_uuid<'a>(&'a self, uuid: &Uuid) -> Option<&'a Entry> {
        self.iter().find_map(|n| match n {
            NodeRef::Entry(e) if e.uuid == *uuid => Some(e),
            _ => None,
        })
    }

    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn get_uuid(&self) -> &Uuid {
        &self.uuid
    }

    /// Iterate over all the nodes of the subtree rooted at this group,
    /// breadth-first, starting with this group itself
    pub fn iter(&self) -> NodeIter<'_> {
        let mut queue: VecDeque<NodeRef<'_>> = VecDeque::new();
        queue.push_back(NodeRef::Group(self));
        NodeIter::new(queue)
    }
}

impl<'a> IntoIterator for &'a Group {
    type Item = NodeRef<'a>;
    type IntoIter = NodeIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod group_tests {
    use super::{Group, TriState};
    use crate::db::{Entry, Node, NodeRef};

    fn sample_tree() -> Group {
        let mut root = Group::new("Root");

        let mut general = Group::new("General");
        let mut entry = Entry::new();
        entry.set_unprotected("Title", "Sample Entry");
        general.add_child(entry);

        root.add_child(general);
        root.add_child(Group::new("Empty"));
        root
    }

    #[test]
    fn get_by_path() {
        let root = sample_tree();

        assert!(matches!(root.get(&[]), Some(NodeRef::Group(g)) if g.name == "Root"));
        assert!(matches!(root.get(&["General"]), Some(NodeRef::Group(g)) if g.name == "General"));

        if let Some(NodeRef::Entry(e)) = root.get(&["General", "Sample Entry"]) {
            assert_eq!(e.get_title(), Some("Sample Entry"));
        } else {
            panic!("expected to find the entry");
        }

        assert!(root.get(&["General", "Nope"]).is_none());
        assert!(root.get(&["Nope"]).is_none());
    }

    #[test]
    fn remove_node_by_uuid() {
        let mut root = sample_tree();

        let entry_uuid = match root.get(&["General", "Sample Entry"]) {
            Some(NodeRef::Entry(e)) => e.uuid,
            _ => panic!("expected to find the entry"),
        };

        let removed = root.remove_node(&entry_uuid).expect("node should be removed");
        assert!(matches!(removed, Node::Entry(_)));
        assert!(root.get(&["General", "Sample Entry"]).is_none());
        assert!(root.remove_node(&entry_uuid).is_none());
    }

    #[test]
    fn iteration_visits_every_node() {
        let root = sample_tree();
        // Root, General, Empty, Sample Entry
        assert_eq!(root.iter().count(), 4);
    }

    #[test]
    fn tri_state_parsing() {
        assert_eq!("null".parse::<TriState>().unwrap(), TriState::Inherit);
        assert_eq!("Null".parse::<TriState>().unwrap(), TriState::Inherit);
        assert_eq!("true".parse::<TriState>().unwrap(), TriState::Enable);
        assert_eq!("False".parse::<TriState>().unwrap(), TriState::Disable);
        assert!("maybe".parse::<TriState>().is_err());
    }
}
