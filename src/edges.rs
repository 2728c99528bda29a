use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::*;

/// Order-independent identity of a connection between two members.
pub fn edge_identifier(kind: EdgeKind, a: &str, b: &str) -> String {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    format!("{}:{}-{}", kind.as_str(), low, high)
}

/// Derives parent-child and spouse edges from the links of placed members.
///
/// Parent-child edges point from parent to child. Spouse edges start at the
/// endpoint with the smaller x so mutual links collapse into one edge.
pub fn synthesize_edges(
    index: &RelationshipIndex<'_>,
    positions: &HashMap<String, Point>,
) -> Vec<TreeEdge> {
    let mut edges = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for member in index.roster() {
        let Some(child_point) = positions.get(&member.id) else {
            continue;
        };

        if let Some(parent_id) = member.parent_ref() {
            match index.by_id(parent_id) {
                Some(parent) if parent.id != member.id && positions.contains_key(&parent.id) => {
                    let id = edge_identifier(EdgeKind::ParentChild, &parent.id, &member.id);
                    if seen.insert(id.clone()) {
                        edges.push(TreeEdge {
                            id,
                            source: parent.id.clone(),
                            target: member.id.clone(),
                            kind: EdgeKind::ParentChild,
                        });
                    }
                }
                _ => debug!(member = %member.id, parent = %parent_id, "no parent edge emitted"),
            }
        }

        if let Some(spouse_id) = member.spouse_ref() {
            let spouse = index
                .by_id(spouse_id)
                .filter(|spouse| spouse.id != member.id)
                .and_then(|spouse| positions.get(&spouse.id).map(|point| (spouse, *point)));
            let Some((spouse, spouse_point)) = spouse else {
                debug!(member = %member.id, spouse = %spouse_id, "no spouse edge emitted");
                continue;
            };

            let id = edge_identifier(EdgeKind::Spouse, &member.id, &spouse.id);
            if !seen.insert(id.clone()) {
                continue;
            }
            let member_first = child_point.x < spouse_point.x
                || (child_point.x == spouse_point.x && member.id <= spouse.id);
            let (source, target) = if member_first {
                (member.id.clone(), spouse.id.clone())
            } else {
                (spouse.id.clone(), member.id.clone())
            };
            edges.push(TreeEdge {
                id,
                source,
                target,
                kind: EdgeKind::Spouse,
            });
        }
    }

    edges
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::tests::{female, member, with_parent, with_spouse};
    use crate::layout::tests::sample_family;
    use pretty_assertions::assert_eq;

    fn kinds(tree: &FamilyTree, kind: EdgeKind) -> Vec<(String, String)> {
        tree.edges_of_kind(kind)
            .map(|edge| (edge.source.clone(), edge.target.clone()))
            .collect()
    }

    #[test]
    fn mutual_spouse_links_produce_one_edge() {
        let members = vec![
            with_parent(member("husband", Side::Husband, 0, "self"), "father"),
            with_spouse(member("father", Side::Husband, 1, "father"), "mother"),
            female(with_spouse(member("mother", Side::Husband, 1, "mother"), "father")),
        ];
        let tree = layout_members(&members);

        assert_eq!(
            kinds(&tree, EdgeKind::Spouse),
            vec![("father".to_string(), "mother".to_string())]
        );
        assert_eq!(
            kinds(&tree, EdgeKind::ParentChild),
            vec![("father".to_string(), "husband".to_string())]
        );
        assert_eq!(tree.edges.len(), 2);
    }

    #[test]
    fn spouse_edges_start_at_the_left_endpoint() {
        let members = vec![
            female(with_spouse(member("w", Side::Wife, 0, "self"), "h")),
            with_spouse(member("h", Side::Husband, 0, "self"), "w"),
        ];
        let tree = layout_members(&members);
        let spouse: Vec<&TreeEdge> = tree.edges_of_kind(EdgeKind::Spouse).collect();

        assert_eq!(spouse.len(), 1);
        assert_eq!(spouse[0].source, "h");
        assert_eq!(spouse[0].target, "w");
        assert_eq!(spouse[0].id, "spouse:h-w");
    }

    #[test]
    fn dangling_and_self_references_emit_nothing() {
        let mut me = with_spouse(member("me", Side::Husband, 0, "self"), "me");
        me.parent_id = Some("missing".to_string());
        let tree = layout_members(&[me]);

        assert!(tree.edges.is_empty());
    }

    #[test]
    fn edge_ids_are_unique_and_order_independent() {
        assert_eq!(
            edge_identifier(EdgeKind::Spouse, "b", "a"),
            edge_identifier(EdgeKind::Spouse, "a", "b")
        );
        assert_ne!(
            edge_identifier(EdgeKind::Spouse, "a", "b"),
            edge_identifier(EdgeKind::ParentChild, "a", "b")
        );

        let tree = layout_members(&sample_family());
        let ids: HashSet<&str> = tree.edges.iter().map(|edge| edge.id.as_str()).collect();
        assert_eq!(ids.len(), tree.edges.len());
    }

    #[test]
    fn sample_family_edges() {
        let tree = layout_members(&sample_family());

        assert_eq!(tree.edges_of_kind(EdgeKind::ParentChild).count(), 11);
        let mut spouses: Vec<String> = tree
            .edges_of_kind(EdgeKind::Spouse)
            .map(|edge| edge.id.clone())
            .collect();
        spouses.sort();
        assert_eq!(
            spouses,
            vec!["spouse:h-w", "spouse:hf-hm", "spouse:hgf-hgm", "spouse:hu-hua"]
        );
        for edge in tree.edges_of_kind(EdgeKind::Spouse) {
            let source = tree.position(&edge.source).unwrap();
            let target = tree.position(&edge.target).unwrap();
            assert!(source.x <= target.x, "{} is reversed", edge.id);
        }
    }

    #[test]
    fn unplaced_endpoints_are_skipped() {
        let members = vec![
            with_parent(member("kid", Side::Husband, -1, "son"), "dad"),
            member("dad", Side::Husband, 0, "self"),
        ];
        let index = RelationshipIndex::new(&members);
        let mut positions = HashMap::new();
        positions.insert("kid".to_string(), Point { x: 0.0, y: 0.0 });

        assert!(synthesize_edges(&index, &positions).is_empty());
    }
}
