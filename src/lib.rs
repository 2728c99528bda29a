use serde::{Deserialize, Serialize};

pub mod api;
pub mod edges;
#[cfg(feature = "http")]
pub mod http;
pub mod index;
pub mod layout;
pub mod mutation;
pub mod render;
pub mod roles;
pub mod utils;

pub use api::*;
pub use edges::*;
#[cfg(feature = "http")]
pub use http::*;
pub use index::*;
pub use layout::*;
pub use mutation::*;
pub use render::*;
pub use roles::*;
pub use utils::*;

pub const CENTER_X: f32 = 400.0;
pub const CENTER_Y: f32 = 300.0;
pub const GAP_Y: f32 = 140.0;
pub const UNIT_GAP: f32 = 120.0;
pub const SPOUSE_GAP: f32 = 90.0;
pub const ANCHOR_OFFSET: f32 = 50.0;
pub const OVERFLOW_GAP: f32 = GAP_Y * 2.0;
pub const MAX_ANCESTOR_DEPTH: usize = 32;
pub const NODE_WIDTH: f32 = 80.0;
pub const NODE_HEIGHT: f32 = 90.0;
pub const NODE_TEXT_LINE_HEIGHT: f32 = 16.0;
pub const LAYOUT_MARGIN: f32 = 80.0;
pub const SELF_LABELS: &[&str] = &["self", "본인"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Husband,
    Wife,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

/// One participant of the family tree, in the backend's wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub name: String,
    pub gender: Gender,
    pub side: Side,
    #[serde(default)]
    pub relation_type: String,
    /// 0 is the couple, positive values are ancestors, negative values descendants.
    #[serde(default)]
    pub generation: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spouse_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sibling_of: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// A placed member, shaped for a generic node/edge diagram surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeNode {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub data: Member,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeKind {
    ParentChild,
    Spouse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub kind: EdgeKind,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FamilyTree {
    pub nodes: Vec<TreeNode>,
    pub edges: Vec<TreeEdge>,
}

/// Where a "register self" action starts when there is no base member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPoint {
    pub side: Side,
    pub generation: i32,
}

/// What a caller should show for a member collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum ChartView {
    Empty { entry_points: [EntryPoint; 2] },
    Tree(FamilyTree),
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Husband => Side::Wife,
            Side::Wife => Side::Husband,
        }
    }

    /// Horizontal expansion direction away from the couple.
    pub fn direction(self) -> f32 {
        match self {
            Side::Husband => -1.0,
            Side::Wife => 1.0,
        }
    }
}

impl Gender {
    pub fn opposite(self) -> Gender {
        match self {
            Gender::Male => Gender::Female,
            Gender::Female => Gender::Male,
        }
    }
}

impl Default for Gender {
    fn default() -> Self {
        Gender::Male
    }
}

impl EdgeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EdgeKind::ParentChild => "parent-child",
            EdgeKind::Spouse => "spouse",
        }
    }
}

impl Member {
    pub fn parent_ref(&self) -> Option<&str> {
        non_empty(self.parent_id.as_deref())
    }

    pub fn spouse_ref(&self) -> Option<&str> {
        non_empty(self.spouse_id.as_deref())
    }

    pub fn sibling_ref(&self) -> Option<&str> {
        non_empty(self.sibling_of.as_deref())
    }

    pub fn is_self_label(&self) -> bool {
        let label = self.relation_type.trim();
        SELF_LABELS
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(label))
    }
}

impl FamilyTree {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&TreeNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn position(&self, id: &str) -> Option<Point> {
        self.node(id).map(|node| Point {
            x: node.x,
            y: node.y,
        })
    }

    pub fn edges_of_kind(&self, kind: EdgeKind) -> impl Iterator<Item = &TreeEdge> {
        self.edges.iter().filter(move |edge| edge.kind == kind)
    }
}

impl ChartView {
    pub fn empty() -> Self {
        ChartView::Empty {
            entry_points: [
                EntryPoint {
                    side: Side::Husband,
                    generation: 0,
                },
                EntryPoint {
                    side: Side::Wife,
                    generation: 0,
                },
            ],
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|id| !id.trim().is_empty())
}
