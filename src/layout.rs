use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::*;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub center_x: f32,
    pub center_y: f32,
    pub gap_y: f32,
    pub unit_gap: f32,
    pub spouse_gap: f32,
    pub anchor_offset: f32,
    pub overflow_gap: f32,
    pub max_ancestor_depth: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            center_x: CENTER_X,
            center_y: CENTER_Y,
            gap_y: GAP_Y,
            unit_gap: UNIT_GAP,
            spouse_gap: SPOUSE_GAP,
            anchor_offset: ANCHOR_OFFSET,
            overflow_gap: OVERFLOW_GAP,
            max_ancestor_depth: MAX_ANCESTOR_DEPTH,
        }
    }
}

impl LayoutConfig {
    pub fn row_y(&self, generation: i32) -> f32 {
        self.center_y - generation as f32 * self.gap_y
    }

    pub fn anchor_x(&self, side: Side) -> f32 {
        self.center_x + side.direction() * self.anchor_offset
    }
}

/// Lays out `members`, or reports the empty state when there is nothing to draw.
pub fn chart(members: &[Member]) -> ChartView {
    chart_with(members, &LayoutConfig::default())
}

pub fn chart_with(members: &[Member], config: &LayoutConfig) -> ChartView {
    if members.is_empty() {
        return ChartView::empty();
    }
    ChartView::Tree(layout_members_with(members, config))
}

pub fn layout_members(members: &[Member]) -> FamilyTree {
    layout_members_with(members, &LayoutConfig::default())
}

pub fn layout_members_with(members: &[Member], config: &LayoutConfig) -> FamilyTree {
    let index = RelationshipIndex::new(members);
    let positions = compute_positions(&index, config);
    let edges = synthesize_edges(&index, &positions);

    let nodes: Vec<TreeNode> = index
        .roster()
        .filter_map(|member| {
            positions.get(&member.id).map(|point| TreeNode {
                id: member.id.clone(),
                x: point.x,
                y: point.y,
                data: member.clone(),
            })
        })
        .collect();

    debug!(nodes = nodes.len(), edges = edges.len(), "family layout computed");

    FamilyTree { nodes, edges }
}

/// Places every member of `index`; the result holds one point per unique id.
pub fn compute_positions(
    index: &RelationshipIndex<'_>,
    config: &LayoutConfig,
) -> HashMap<String, Point> {
    let mut pass = LayoutPass::new(index, config);
    pass.run();
    pass.positions
}

#[derive(Debug, Clone, Copy)]
struct Slot<'a> {
    primary: &'a Member,
    partner: Option<&'a Member>,
}

impl Slot<'_> {
    fn span(&self, spouse_gap: f32) -> f32 {
        if self.partner.is_some() { spouse_gap } else { 0.0 }
    }
}

struct LayoutPass<'p, 'a> {
    index: &'p RelationshipIndex<'a>,
    config: &'p LayoutConfig,
    anchors: Anchors<'a>,
    lineage: HashMap<Side, Vec<&'a Member>>,
    ancestor_ids: HashMap<Side, HashSet<&'a str>>,
    center_extent: BTreeMap<i32, (f32, f32)>,
    positions: HashMap<String, Point>,
}

impl<'p, 'a> LayoutPass<'p, 'a> {
    fn new(index: &'p RelationshipIndex<'a>, config: &'p LayoutConfig) -> Self {
        Self {
            index,
            config,
            anchors: Anchors::resolve(index),
            lineage: HashMap::new(),
            ancestor_ids: HashMap::new(),
            center_extent: BTreeMap::new(),
            positions: HashMap::new(),
        }
    }

    fn run(&mut self) {
        if self.index.is_empty() {
            return;
        }

        for side in [Side::Husband, Side::Wife] {
            let Some(anchor) = self.anchors.get(side) else {
                continue;
            };
            self.place(anchor, self.config.anchor_x(side), self.config.row_y(0));

            let chain = self.ancestor_chain(anchor);
            self.ancestor_ids
                .insert(side, chain.iter().map(|member| member.id.as_str()).collect());
            let mut lineage = vec![anchor];
            lineage.extend(chain);
            self.lineage.insert(side, lineage);
        }

        let reached = self.reachable_from_anchors();
        let center = self.central_descendants();
        let center_ids: HashSet<&str> = center.iter().map(|member| member.id.as_str()).collect();
        self.place_center_rows(&center);

        let mut buckets: BTreeMap<(Side, i32), Vec<&'a Member>> = BTreeMap::new();
        for member in self.index.roster() {
            let id = member.id.as_str();
            if !reached.contains(id) || center_ids.contains(id) || self.anchors.contains(id) {
                continue;
            }
            buckets
                .entry((member.side, member.generation))
                .or_default()
                .push(member);
        }

        for ((side, generation), bucket) in buckets {
            let sorted = self.sort_bucket(side, generation, bucket);
            let slots = self.index_slots(&sorted);
            self.place_side_row(side, generation, &slots);
        }

        self.place_overflow();
    }

    fn place(&mut self, member: &Member, x: f32, y: f32) {
        self.positions
            .entry(member.id.clone())
            .or_insert(Point { x, y });
    }

    /// Direct ancestors above `anchor`, nearest first.
    fn ancestor_chain(&self, anchor: &'a Member) -> Vec<&'a Member> {
        let mut chain = Vec::new();
        let mut visited: HashSet<&str> = HashSet::from([anchor.id.as_str()]);
        let mut current = anchor;

        while let Some(parent) = self.index.parent_of(current) {
            if chain.len() >= self.config.max_ancestor_depth {
                warn!(
                    member = %anchor.id,
                    depth = chain.len(),
                    "ancestor chain exceeds maximum depth; truncating"
                );
                break;
            }
            if !visited.insert(parent.id.as_str()) {
                warn!(member = %parent.id, "parent links form a cycle; stopping ancestor walk");
                break;
            }
            chain.push(parent);
            current = parent;
        }

        chain
    }

    /// Ids connected to an anchor through any parent, spouse or sibling link.
    fn reachable_from_anchors(&self) -> HashSet<&'a str> {
        let mut adjacency: HashMap<&'a str, Vec<&'a str>> = HashMap::new();
        for member in self.index.roster() {
            let links = [member.parent_ref(), member.spouse_ref(), member.sibling_ref()];
            for target in links.into_iter().flatten() {
                let Some(target) = self.index.by_id(target) else {
                    debug!(member = %member.id, reference = %target, "dangling relation ignored");
                    continue;
                };
                adjacency
                    .entry(member.id.as_str())
                    .or_default()
                    .push(target.id.as_str());
                adjacency
                    .entry(target.id.as_str())
                    .or_default()
                    .push(member.id.as_str());
            }
        }

        let mut reached: HashSet<&'a str> = HashSet::new();
        let mut queue: VecDeque<&'a str> = VecDeque::new();
        for anchor in self.anchors.iter() {
            if reached.insert(anchor.id.as_str()) {
                queue.push_back(anchor.id.as_str());
            }
        }

        while let Some(id) = queue.pop_front() {
            for &next in adjacency.get(id).into_iter().flatten() {
                if reached.insert(next) {
                    queue.push_back(next);
                }
            }
        }

        reached
    }

    /// Descendants of either anchor, in discovery order, plus their same-generation partners.
    fn central_descendants(&self) -> Vec<&'a Member> {
        let mut visited: HashSet<&'a str> = HashSet::new();
        let mut queue: VecDeque<&'a Member> = VecDeque::new();
        let mut center = Vec::new();

        for anchor in self.anchors.iter() {
            if visited.insert(anchor.id.as_str()) {
                queue.push_back(anchor);
            }
        }

        while let Some(member) = queue.pop_front() {
            let mut next: Vec<&'a Member> = self
                .index
                .children_of(&member.id)
                .into_iter()
                .filter(|child| child.generation < 0)
                .collect();
            if member.generation < 0 {
                if let Some(partner) = self.index.partner_of(member) {
                    if partner.generation == member.generation {
                        next.push(partner);
                    }
                }
            }

            for candidate in next {
                if visited.insert(candidate.id.as_str()) {
                    center.push(candidate);
                    queue.push_back(candidate);
                }
            }
        }

        center
    }

    fn place_center_rows(&mut self, center: &[&'a Member]) {
        let mut rows: BTreeMap<i32, Vec<&'a Member>> = BTreeMap::new();
        for &member in center {
            rows.entry(member.generation).or_default().push(member);
        }

        for (generation, mut row) in rows.into_iter().rev() {
            let keys: HashMap<&str, f32> = row
                .iter()
                .map(|member| (member.id.as_str(), self.lineage_x(member)))
                .collect();
            row.sort_by(|a, b| {
                keys[a.id.as_str()]
                    .total_cmp(&keys[b.id.as_str()])
                    .then_with(|| a.id.cmp(&b.id))
            });

            let slots = self.index_slots(&row);
            let spouse_gap = self.config.spouse_gap;
            let total: f32 = slots.iter().map(|slot| slot.span(spouse_gap)).sum::<f32>()
                + self.config.unit_gap * slots.len().saturating_sub(1) as f32;
            let start = self.config.center_x - total / 2.0;
            let y = self.config.row_y(generation);

            let mut cursor = start;
            for slot in &slots {
                let far = self.place_slot(slot, cursor, 1.0, y);
                cursor = far + self.config.unit_gap;
            }
            self.center_extent.insert(generation, (start, start + total));
        }
    }

    /// Horizontal key that keeps a center-row member under its already placed parents.
    fn lineage_x(&self, member: &Member) -> f32 {
        let parent_x = |candidate: &Member| {
            candidate
                .parent_ref()
                .and_then(|id| self.positions.get(id))
                .map(|point| point.x)
        };
        parent_x(member)
            .or_else(|| {
                self.index
                    .partner_of(member)
                    .and_then(|partner| parent_x(partner))
            })
            .unwrap_or(self.config.center_x)
    }

    fn sort_bucket(&self, side: Side, generation: i32, bucket: Vec<&'a Member>) -> Vec<&'a Member> {
        let mut ranked: Vec<(u8, &'a Member)> = bucket
            .into_iter()
            .map(|member| (self.priority(member, side, generation), member))
            .collect();
        ranked.sort_by(|(pa, a), (pb, b)| pa.cmp(pb).then_with(|| a.id.cmp(&b.id)));
        ranked.into_iter().map(|(_, member)| member).collect()
    }

    /// 0 direct ancestor, 1 partner of the lineage, 2 sibling of the lineage,
    /// 3 sibling of a lineage partner, 4 anything else.
    fn priority(&self, member: &Member, side: Side, generation: i32) -> u8 {
        if self
            .ancestor_ids
            .get(&side)
            .is_some_and(|ids| ids.contains(member.id.as_str()))
        {
            return 0;
        }

        let lineage: Vec<&Member> = self
            .lineage
            .get(&side)
            .into_iter()
            .flatten()
            .copied()
            .filter(|ancestor| ancestor.generation == generation)
            .collect();

        if lineage.iter().any(|ancestor| are_partners(ancestor, member)) {
            1
        } else if lineage.iter().any(|ancestor| are_siblings(ancestor, member)) {
            2
        } else if lineage
            .iter()
            .filter_map(|ancestor| self.index.partner_of(ancestor))
            .any(|partner| are_siblings(partner, member))
        {
            3
        } else {
            4
        }
    }

    /// Pairs each member with a partner from the same row.
    fn index_slots(&self, sorted: &[&'a Member]) -> Vec<Slot<'a>> {
        let mut processed: HashSet<&str> = HashSet::new();
        let mut slots = Vec::with_capacity(sorted.len());

        for &member in sorted {
            if !processed.insert(member.id.as_str()) {
                continue;
            }
            let open = |candidate: &&&'a Member| {
                candidate.id != member.id && !processed.contains(candidate.id.as_str())
            };
            let partner = sorted
                .iter()
                .filter(open)
                .find(|candidate| member.spouse_ref() == Some(candidate.id.as_str()))
                .or_else(|| {
                    sorted
                        .iter()
                        .filter(open)
                        .find(|candidate| candidate.spouse_ref() == Some(member.id.as_str()))
                })
                .copied();
            if let Some(partner) = partner {
                processed.insert(partner.id.as_str());
            }
            slots.push(Slot {
                primary: member,
                partner,
            });
        }

        slots
    }

    /// Places a slot starting at `near_x`, returning the x of its far end.
    fn place_slot(&mut self, slot: &Slot<'a>, near_x: f32, direction: f32, y: f32) -> f32 {
        let Some(partner) = slot.partner else {
            self.place(slot.primary, near_x, y);
            return near_x;
        };

        let far_x = near_x + direction * self.config.spouse_gap;
        if slot.primary.gender != partner.gender {
            let (male, female) = if slot.primary.gender == Gender::Male {
                (slot.primary, partner)
            } else {
                (partner, slot.primary)
            };
            self.place(male, near_x.min(far_x), y);
            self.place(female, near_x.max(far_x), y);
        } else {
            self.place(slot.primary, near_x, y);
            self.place(partner, far_x, y);
        }
        far_x
    }

    fn place_side_row(&mut self, side: Side, generation: i32, slots: &[Slot<'a>]) {
        let direction = side.direction();
        let anchor_x = self.config.anchor_x(side);
        let mut cursor = if generation == 0 {
            anchor_x + direction * self.config.unit_gap
        } else {
            anchor_x
        };

        if let Some(&(min_x, max_x)) = self.center_extent.get(&generation) {
            cursor = match side {
                Side::Husband => cursor.min(min_x - self.config.unit_gap),
                Side::Wife => cursor.max(max_x + self.config.unit_gap),
            };
        }

        let y = self.config.row_y(generation);
        for slot in slots {
            let far = self.place_slot(slot, cursor, direction, y);
            cursor = far + direction * self.config.unit_gap;
        }
    }

    /// Rows below the tree for members no anchor reaches, one per generation.
    fn place_overflow(&mut self) {
        let orphans: Vec<&'a Member> = self
            .index
            .roster()
            .filter(|member| !self.positions.contains_key(&member.id))
            .collect();
        if orphans.is_empty() {
            return;
        }

        warn!(
            count = orphans.len(),
            "members are disconnected from both anchors; placing them in overflow rows"
        );

        let top = self
            .positions
            .values()
            .map(|point| point.y)
            .reduce(f32::max)
            .map_or(self.config.center_y, |lowest| lowest + self.config.overflow_gap);

        let mut rows: BTreeMap<i32, Vec<&'a Member>> = BTreeMap::new();
        for member in orphans {
            rows.entry(member.generation).or_default().push(member);
        }
        let Some(&highest) = rows.keys().next_back() else {
            return;
        };

        for (generation, row) in rows {
            let rows_below = i64::from(highest) - i64::from(generation);
            let y = top + rows_below as f32 * self.config.gap_y;
            let span = self.config.unit_gap * row.len().saturating_sub(1) as f32;
            let start = self.config.center_x - span / 2.0;
            for (column, member) in row.into_iter().enumerate() {
                self.place(member, start + column as f32 * self.config.unit_gap, y);
            }
        }
    }
}

fn are_partners(a: &Member, b: &Member) -> bool {
    a.id != b.id
        && (a.spouse_ref() == Some(b.id.as_str()) || b.spouse_ref() == Some(a.id.as_str()))
}

fn are_siblings(a: &Member, b: &Member) -> bool {
    if a.id == b.id {
        return false;
    }
    let shared_parent = a.parent_ref().is_some() && a.parent_ref() == b.parent_ref();
    let declared = b.sibling_ref() == Some(a.id.as_str())
        || a.sibling_ref() == Some(b.id.as_str())
        || (a.sibling_ref().is_some() && a.sibling_ref() == b.sibling_ref());
    shared_parent || declared
}
