use serde::{Deserialize, Serialize};

use crate::*;

/// The two generation-0 members each side of the chart grows from.
#[derive(Debug, Clone, Copy, Default)]
pub struct Anchors<'a> {
    pub husband: Option<&'a Member>,
    pub wife: Option<&'a Member>,
}

impl<'a> Anchors<'a> {
    pub fn resolve(index: &RelationshipIndex<'a>) -> Self {
        Self {
            husband: find_anchor(index, Side::Husband),
            wife: find_anchor(index, Side::Wife),
        }
    }

    pub fn get(&self, side: Side) -> Option<&'a Member> {
        match side {
            Side::Husband => self.husband,
            Side::Wife => self.wife,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a Member> {
        self.husband.into_iter().chain(self.wife)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.iter().any(|anchor| anchor.id == id)
    }
}

fn find_anchor<'a>(index: &RelationshipIndex<'a>, side: Side) -> Option<&'a Member> {
    let couple: Vec<&'a Member> = index
        .roster()
        .filter(|member| member.generation == 0 && member.side == side)
        .collect();
    couple
        .iter()
        .find(|member| member.is_self_label())
        .or_else(|| couple.iter().find(|member| member.sibling_ref().is_none()))
        .copied()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Parent,
    Child,
    Sibling,
    Spouse,
    /// Registers one of the two anchors; only offered when nothing exists yet.
    #[serde(rename = "self")]
    Anchor,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Parent => "parent",
            ActionKind::Child => "child",
            ActionKind::Sibling => "sibling",
            ActionKind::Spouse => "spouse",
            ActionKind::Anchor => "self",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            ActionKind::Parent => "Add parent",
            ActionKind::Child => "Add child",
            ActionKind::Sibling => "Add sibling",
            ActionKind::Spouse => "Add spouse",
            ActionKind::Anchor => "Register",
        }
    }

    pub fn target_generation(self, base_generation: i32) -> i32 {
        match self {
            ActionKind::Parent => base_generation.saturating_add(1),
            ActionKind::Child => base_generation.saturating_sub(1),
            ActionKind::Sibling | ActionKind::Spouse | ActionKind::Anchor => base_generation,
        }
    }
}

impl std::str::FromStr for ActionKind {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> anyhow::Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "parent" => Ok(ActionKind::Parent),
            "child" => Ok(ActionKind::Child),
            "sibling" => Ok(ActionKind::Sibling),
            "spouse" => Ok(ActionKind::Spouse),
            "self" | "anchor" => Ok(ActionKind::Anchor),
            other => anyhow::bail!(
                "unsupported action '{other}'; expected parent, child, sibling, spouse or self"
            ),
        }
    }
}

/// Everything the add-relative form needs before the user types a name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelativeTarget {
    pub kind: ActionKind,
    pub base: Option<Member>,
    pub side: Side,
    pub generation: i32,
    pub relation_options: Vec<&'static str>,
    pub default_gender: Gender,
}

pub fn resolve_target(
    kind: ActionKind,
    base: Option<&Member>,
    entry: Option<EntryPoint>,
) -> Result<RelativeTarget, MutationError> {
    let (side, generation) = match (kind, base) {
        (ActionKind::Anchor, Some(base)) => {
            return Err(MutationError::UnexpectedBase(base.id.clone()));
        }
        (ActionKind::Anchor, None) => {
            let entry = entry.unwrap_or(EntryPoint {
                side: Side::Husband,
                generation: 0,
            });
            (entry.side, entry.generation)
        }
        (_, None) => return Err(MutationError::MissingBase(kind)),
        (ActionKind::Parent, Some(base)) if base.parent_ref().is_some() => {
            return Err(MutationError::AlreadyLinked {
                id: base.id.clone(),
                link: "parent",
            });
        }
        (ActionKind::Spouse, Some(base)) if base.spouse_ref().is_some() => {
            return Err(MutationError::AlreadyLinked {
                id: base.id.clone(),
                link: "spouse",
            });
        }
        (ActionKind::Spouse, Some(base)) if base.generation == 0 => {
            (base.side.opposite(), base.generation)
        }
        (_, Some(base)) => (base.side, kind.target_generation(base.generation)),
    };

    let default_gender = match (kind, base) {
        (ActionKind::Spouse, Some(base)) => base.gender.opposite(),
        _ => Gender::Male,
    };

    Ok(RelativeTarget {
        kind,
        base: base.cloned(),
        side,
        generation,
        relation_options: relation_options(kind, generation, side).to_vec(),
        default_gender,
    })
}

/// Relation labels offered for a new member, most likely first.
pub fn relation_options(kind: ActionKind, generation: i32, side: Side) -> &'static [&'static str] {
    match kind {
        ActionKind::Anchor => &["self"],
        ActionKind::Parent => match (generation, side) {
            (i32::MIN..=1, Side::Husband) => &["father", "mother"],
            (i32::MIN..=1, Side::Wife) => &["father-in-law", "mother-in-law"],
            (2, _) => &["grandfather", "grandmother"],
            _ => &["great-grandfather", "great-grandmother"],
        },
        ActionKind::Child => {
            if generation <= -2 {
                &["grandson", "granddaughter"]
            } else {
                &["son", "daughter"]
            }
        }
        ActionKind::Sibling => match (generation, side) {
            (0, _) => &[
                "elder brother",
                "elder sister",
                "younger brother",
                "younger sister",
            ],
            (1, Side::Husband) => &["uncle", "paternal aunt"],
            (1, Side::Wife) => &["maternal uncle", "maternal aunt"],
            _ => &["brother", "sister"],
        },
        ActionKind::Spouse => &["spouse"],
    }
}
