use std::collections::HashMap;

use tracing::warn;

use crate::*;

/// Lookup helpers over a snapshot of the member collection.
///
/// Ids resolve last-wins when the snapshot carries duplicates.
#[derive(Debug, Clone)]
pub struct RelationshipIndex<'a> {
    members: &'a [Member],
    by_id: HashMap<&'a str, &'a Member>,
}

impl<'a> RelationshipIndex<'a> {
    pub fn new(members: &'a [Member]) -> Self {
        let mut by_id: HashMap<&'a str, &'a Member> = HashMap::with_capacity(members.len());
        for member in members {
            if by_id.insert(member.id.as_str(), member).is_some() {
                warn!(member = %member.id, "duplicate member id; later record wins");
            }
        }
        Self { members, by_id }
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn by_id(&self, id: &str) -> Option<&'a Member> {
        self.by_id.get(id).copied()
    }

    pub fn spouse_of(&self, member: &Member) -> Option<&'a Member> {
        member.spouse_ref().and_then(|id| self.by_id(id))
    }

    pub fn parent_of(&self, member: &Member) -> Option<&'a Member> {
        member.parent_ref().and_then(|id| self.by_id(id))
    }

    pub fn children_of(&self, id: &str) -> Vec<&'a Member> {
        self.roster()
            .filter(|member| member.parent_ref() == Some(id))
            .collect()
    }

    pub fn siblings_of(&self, member: &Member) -> Vec<&'a Member> {
        let Some(parent_id) = member.parent_ref() else {
            return self
                .roster()
                .filter(|candidate| candidate.sibling_ref() == Some(member.id.as_str()))
                .collect();
        };

        let parent_spouse = self
            .by_id(parent_id)
            .and_then(|parent| self.spouse_of(parent));
        let parent_spouse_id = parent_spouse.map(|spouse| spouse.id.as_str());

        self.roster()
            .filter(|candidate| {
                if candidate.id == member.id || Some(candidate.id.as_str()) == parent_spouse_id {
                    return false;
                }
                let candidate_parent = candidate.parent_ref();
                candidate_parent == Some(parent_id)
                    || (parent_spouse_id.is_some() && candidate_parent == parent_spouse_id)
            })
            .collect()
    }

    /// The partner of `member` in either direction of the spouse link.
    pub fn partner_of(&self, member: &Member) -> Option<&'a Member> {
        if let Some(spouse) = self.spouse_of(member) {
            if spouse.id != member.id {
                return Some(spouse);
            }
        }
        self.roster().find(|candidate| {
            candidate.id != member.id && candidate.spouse_ref() == Some(member.id.as_str())
        })
    }

    /// Members in input order, skipping records shadowed by a later duplicate id.
    pub fn roster(&self) -> impl Iterator<Item = &'a Member> + '_ {
        self.members.iter().filter(move |member| {
            self.by_id
                .get(member.id.as_str())
                .is_some_and(|winner| std::ptr::eq(*winner, *member))
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    pub(crate) fn member(id: &str, side: Side, generation: i32, relation: &str) -> Member {
        Member {
            id: id.to_string(),
            name: id.to_string(),
            gender: Gender::Male,
            side,
            relation_type: relation.to_string(),
            generation,
            parent_id: None,
            spouse_id: None,
            sibling_of: None,
            birth_date: None,
            memo: None,
        }
    }

    pub(crate) fn with_parent(mut member: Member, parent: &str) -> Member {
        member.parent_id = Some(parent.to_string());
        member
    }

    pub(crate) fn with_spouse(mut member: Member, spouse: &str) -> Member {
        member.spouse_id = Some(spouse.to_string());
        member
    }

    pub(crate) fn female(mut member: Member) -> Member {
        member.gender = Gender::Female;
        member
    }

    fn ids(members: &[&Member]) -> Vec<String> {
        members.iter().map(|member| member.id.clone()).collect()
    }

    fn family() -> Vec<Member> {
        vec![
            with_parent(member("me", Side::Husband, 0, "self"), "dad"),
            with_spouse(member("dad", Side::Husband, 1, "father"), "mom"),
            female(with_spouse(member("mom", Side::Husband, 1, "mother"), "dad")),
            with_parent(member("bro", Side::Husband, 0, "elder brother"), "dad"),
            female(with_parent(member("sis", Side::Husband, 0, "younger sister"), "mom")),
            member("lonely", Side::Wife, 0, "self"),
            {
                let mut cousin = member("cousin", Side::Wife, 0, "sister");
                cousin.sibling_of = Some("lonely".to_string());
                cousin
            },
        ]
    }

    #[test]
    fn resolves_direct_links() {
        let members = family();
        let index = RelationshipIndex::new(&members);
        let me = index.by_id("me").unwrap();

        assert_eq!(index.parent_of(me).map(|m| m.id.as_str()), Some("dad"));
        let dad = index.by_id("dad").unwrap();
        assert_eq!(index.spouse_of(dad).map(|m| m.id.as_str()), Some("mom"));
        assert_eq!(ids(&index.children_of("dad")), vec!["me", "bro"]);
        assert!(index.by_id("ghost").is_none());
    }

    #[test]
    fn siblings_include_children_of_the_parents_spouse() {
        let members = family();
        let index = RelationshipIndex::new(&members);
        let me = index.by_id("me").unwrap();

        assert_eq!(ids(&index.siblings_of(me)), vec!["bro", "sis"]);
    }

    #[test]
    fn sibling_relation_is_symmetric_for_shared_parents() {
        let members = family();
        let index = RelationshipIndex::new(&members);

        for a in index.roster().filter(|m| m.parent_ref().is_some()) {
            for b in index.siblings_of(a) {
                if b.parent_ref() == a.parent_ref() {
                    let back = index.siblings_of(b);
                    assert!(
                        back.iter().any(|m| m.id == a.id),
                        "{} should list {} as a sibling",
                        b.id,
                        a.id
                    );
                }
            }
        }
    }

    #[test]
    fn parentless_members_use_declared_siblings() {
        let members = family();
        let index = RelationshipIndex::new(&members);
        let lonely = index.by_id("lonely").unwrap();

        assert_eq!(ids(&index.siblings_of(lonely)), vec!["cousin"]);
    }

    #[test]
    fn duplicate_ids_resolve_to_the_last_record() {
        let mut members = family();
        let mut replacement = member("bro", Side::Husband, 0, "elder brother");
        replacement.name = "Renamed".to_string();
        members.push(replacement);
        let index = RelationshipIndex::new(&members);

        assert_eq!(index.by_id("bro").map(|m| m.name.as_str()), Some("Renamed"));
        assert_eq!(index.len(), 7);
        assert_eq!(index.roster().filter(|m| m.id == "bro").count(), 1);
    }

    #[test]
    fn empty_references_are_treated_as_absent() {
        let mut lone = member("x", Side::Husband, 0, "self");
        lone.parent_id = Some(String::new());
        lone.spouse_id = Some("  ".to_string());
        let members = vec![lone];
        let index = RelationshipIndex::new(&members);
        let x = index.by_id("x").unwrap();

        assert!(index.parent_of(x).is_none());
        assert!(index.spouse_of(x).is_none());
        assert!(index.siblings_of(x).is_empty());
    }

    #[test]
    fn partner_lookup_tolerates_one_sided_links() {
        let members = vec![
            member("a", Side::Husband, 1, "father"),
            female(with_spouse(member("b", Side::Husband, 1, "mother"), "a")),
        ];
        let index = RelationshipIndex::new(&members);

        let a = index.by_id("a").unwrap();
        assert!(index.spouse_of(a).is_none());
        assert_eq!(index.partner_of(a).map(|m| m.id.as_str()), Some("b"));
    }
}
