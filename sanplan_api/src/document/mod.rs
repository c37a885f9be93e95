//! # Declarative project document
//!
//! The resolver never looks at raw XML. It walks an arena tree of elements,
//! each tagged with a [`NodeKind`] recognised from its tag name, and navigates
//! with a small set of walk functions modelled after the axes the topology
//! description relies on: children, ancestors, ancestor-or-self chains,
//! descendants and preceding siblings.

use std::str::FromStr;

use strum_macros::EnumString;

mod defaults;
mod switches;
mod xml;

pub use defaults::Defaults;
pub use switches::SwitchRegistry;

/// Index of an element within a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

/// Element kinds understood by the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum NodeKind {
    Project,
    Prefix,
    Code,
    ShortName,
    LongName,
    RevHistory,
    Revision,
    MajorNumber,
    MinorNumber,
    Date,
    AuthorInitials,
    RevRemark,
    Reviewer,
    ReviewDate,
    Site,
    Host,
    Platform,
    OperatingSystem,
    Location,
    Description,
    #[strum(serialize = "iscsi_initiator")]
    IscsiInitiator,
    DrHost,
    Interface,
    SwitchName,
    SwitchPort,
    HostPort,
    IpAddr,
    Netmask,
    #[strum(serialize = "vlan_number")]
    VlanNumber,
    Vlan,
    Network,
    Filer,
    Vfiler,
    PrimaryIp,
    AliasIp,
    VlanIp,
    Protocol,
    Aggregate,
    Volume,
    VolumeSet,
    UsableStorage,
    DataStorage,
    SnapStorage,
    SnapSetRef,
    SnapVaultSetRef,
    SnapMirrorSetRef,
    SnapVaultMirrorSetRef,
    #[strum(serialize = "option")]
    VolumeOption,
    AutoSize,
    AutoDelete,
    Qtree,
    Export,
    MountOption,
    Lun,
    MapTo,
    Igroup,
    Member,
    SnapVaultSet,
    SnapVault,
    SnapSchedule,
    SnapVaultSchedule,
    SnapMirrorSet,
    SnapMirror,
    Minute,
    Hour,
    DayOfMonth,
    DayOfWeek,
    Database,
    OnHost,
    Nas,
    /// Any element the resolver does not interpret.
    #[strum(disabled)]
    Unrecognized,
}

impl NodeKind {
    /// Recognises a tag name; unknown tags map to [`NodeKind::Unrecognized`].
    pub fn from_tag(tag: &str) -> Self {
        NodeKind::from_str(tag).unwrap_or(NodeKind::Unrecognized)
    }
}

#[derive(Debug, Clone)]
struct Node {
    tag: String,
    kind: NodeKind,
    attributes: Vec<(String, String)>,
    text: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Arena of elements. The first element pushed is the root.
#[derive(Debug, Clone, Default)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Document {
    /// Parses an XML project document.
    pub fn from_xml(text: &str) -> Result<Self, crate::error::SanplanError> {
        xml::parse(text)
    }

    /// Appends a new element under `parent`, or creates the root when `parent`
    /// is `None`.
    pub fn push_element(
        &mut self,
        parent: Option<NodeId>,
        tag: &str,
        attributes: Vec<(String, String)>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            tag: tag.to_owned(),
            kind: NodeKind::from_tag(tag),
            attributes,
            text: String::new(),
            parent,
            children: Vec::new(),
        });
        if let Some(parent) = parent {
            self.nodes[parent.0].children.push(id);
        }
        id
    }

    /// Appends character data to an element.
    pub fn append_text(&mut self, id: NodeId, text: &str) {
        self.nodes[id.0].text.push_str(text);
    }

    /// Returns the root element, if any element exists.
    pub fn root(&self) -> Option<NodeId> {
        (!self.nodes.is_empty()).then_some(NodeId(0))
    }

    pub fn tag(&self, id: NodeId) -> &str {
        &self.nodes[id.0].tag
    }

    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.nodes[id.0].kind
    }

    /// Trimmed character data of the element.
    pub fn text(&self, id: NodeId) -> &str {
        self.nodes[id.0].text.trim()
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.nodes[id.0]
            .attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// True when the attribute is present and set to `yes`, ignoring case.
    pub fn attr_is_yes(&self, id: NodeId, name: &str) -> bool {
        self.attr(id, name)
            .is_some_and(|value| value.eq_ignore_ascii_case("yes"))
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[id.0].children.iter().copied()
    }

    pub fn children_of_kind(
        &self,
        id: NodeId,
        kind: NodeKind,
    ) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id).filter(move |child| self.kind(*child) == kind)
    }

    pub fn first_child(&self, id: NodeId, kind: NodeKind) -> Option<NodeId> {
        self.children_of_kind(id, kind).next()
    }

    /// Text of the first child of the given kind.
    pub fn child_text(&self, id: NodeId, kind: NodeKind) -> Option<&str> {
        self.first_child(id, kind).map(|child| self.text(child))
    }

    /// Ancestors of an element, nearest first. The element itself is excluded.
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            document: self,
            next: self.parent(id),
        }
    }

    pub fn nearest_ancestor(&self, id: NodeId, kind: NodeKind) -> Option<NodeId> {
        self.ancestors(id).find(|ancestor| self.kind(*ancestor) == kind)
    }

    /// The element and all of its ancestors, outermost first.
    pub fn ancestor_or_self_chain(&self, id: NodeId) -> Vec<NodeId> {
        let mut chain: Vec<NodeId> = self.ancestors(id).collect();
        chain.reverse();
        chain.push(id);
        chain
    }

    /// Value of the attribute on the element or its nearest ancestor that
    /// declares it.
    pub fn inherited_attr(&self, id: NodeId, name: &str) -> Option<&str> {
        std::iter::once(id)
            .chain(self.ancestors(id))
            .find_map(|node| self.attr(node, name))
    }

    /// The element and its descendants of the given kind, in document order.
    pub fn descendants_or_self(&self, id: NodeId, kind: NodeKind) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            if self.kind(node) == kind {
                found.push(node);
            }
            stack.extend(self.nodes[node.0].children.iter().rev());
        }
        found
    }

    /// Siblings declared before the element, nearest first.
    pub fn preceding_siblings(&self, id: NodeId) -> Vec<NodeId> {
        let Some(parent) = self.parent(id) else {
            return Vec::new();
        };
        let siblings = &self.nodes[parent.0].children;
        let position = siblings
            .iter()
            .position(|sibling| *sibling == id)
            .unwrap_or(0);
        siblings[..position].iter().rev().copied().collect()
    }
}

/// Iterator over the ancestors of an element.
pub struct Ancestors<'a> {
    document: &'a Document,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.document.parent(current);
        Some(current)
    }
}
