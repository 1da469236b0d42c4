//! Binary tree placement and tree read-models.
//!
//! New members are placed *under their sponsor*, never from the global root. The search is breadth-first, so the
//! sponsor's subtree fills level by level, left before right. Every slot claim is a conditional write in the backend:
//! if another placement takes the slot first, the node is re-read and the search carries on from there.
use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    fmt::Debug,
};

use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{ChildSide, Member, MemberId, MemberStatus},
    traits::{ReferralGraph, ReferralGraphError},
};

/// Parent-chain walks give up after this many hops.
pub const MAX_TREE_DEPTH: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub parent_id: MemberId,
    pub side: ChildSide,
    /// Levels below the sponsor. A direct child of the sponsor has depth 1.
    pub depth: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub id: MemberId,
    pub name: String,
    pub status: MemberStatus,
    pub left: Option<Box<TreeNode>>,
    pub right: Option<Box<TreeNode>>,
}

impl TreeNode {
    fn leaf(member: Member) -> Self {
        Self { id: member.id, name: member.name, status: member.status, left: None, right: None }
    }

    /// The number of nodes in this subtree, including this one.
    pub fn size(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.left.as_deref());
            stack.extend(node.right.as_deref());
        }
        count
    }
}

pub struct PlacementApi<B> {
    db: B,
}

impl<B> Debug for PlacementApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PlacementApi")
    }
}

impl<B> PlacementApi<B>
where B: ReferralGraph
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    /// Places `member_id` into the first open slot of the sponsor's subtree, in breadth-first order.
    pub async fn place(&self, member_id: MemberId, sponsor_id: MemberId) -> Result<Placement, ReferralGraphError> {
        if member_id == sponsor_id {
            return Err(ReferralGraphError::SelfPlacement(member_id));
        }
        let member = self.fetch(member_id).await?;
        if member.binary_parent_id.is_some() {
            return Err(ReferralGraphError::AlreadyPlaced(member_id));
        }
        let sponsor = self.fetch(sponsor_id).await?;
        let mut visited = HashSet::from([member_id, sponsor_id]);
        let mut queue = VecDeque::from([(sponsor, 0u32)]);
        while let Some((mut node, depth)) = queue.pop_front() {
            while let Some(side) = node.open_slot() {
                if self.db.attach_child(node.id, member_id, side).await? {
                    let depth = depth + 1;
                    info!("🌳️ Member #{member_id} placed {side} of #{} ({depth} levels below #{sponsor_id})", node.id);
                    return Ok(Placement { parent_id: node.id, side, depth });
                }
                debug!("🌳️ Lost the {side} slot of #{} to a concurrent placement. Re-reading the node", node.id);
                node = self.fetch(node.id).await?;
            }
            for child_id in node.children() {
                if !visited.insert(child_id) {
                    warn!("🌳️ Member #{child_id} appears twice under sponsor #{sponsor_id}. Skipping it");
                    continue;
                }
                match self.db.fetch_member(child_id).await? {
                    Some(child) => queue.push_back((child, depth + 1)),
                    None => warn!("🌳️ #{} points to child #{child_id}, which does not exist", node.id),
                }
            }
        }
        Err(ReferralGraphError::NoOpenSlot(sponsor_id))
    }

    /// Fetches the binary subtree rooted at `root_id`, down to `max_depth` levels below the root.
    ///
    /// Returns `None` if the root does not exist. Children that are missing, or that were already seen elsewhere in
    /// the tree, are left out.
    pub async fn build_subtree(
        &self,
        root_id: MemberId,
        max_depth: u32,
    ) -> Result<Option<TreeNode>, ReferralGraphError> {
        let Some(root) = self.db.fetch_member(root_id).await? else {
            return Ok(None);
        };
        let mut order = vec![root.id];
        let mut frontier = vec![root.clone()];
        let mut members = HashMap::from([(root.id, root)]);
        let mut visited = HashSet::from([root_id]);
        for _ in 0..max_depth.min(MAX_TREE_DEPTH) {
            let next_ids =
                frontier.iter().flat_map(Member::children).filter(|id| visited.insert(*id)).collect::<Vec<_>>();
            if next_ids.is_empty() {
                break;
            }
            frontier = self.db.fetch_members(&next_ids).await?;
            for m in &frontier {
                order.push(m.id);
                members.insert(m.id, m.clone());
            }
        }
        // Assemble bottom-up: every child is built before its parent
        let mut built = HashMap::<MemberId, TreeNode>::with_capacity(order.len());
        for id in order.into_iter().rev() {
            let Some(member) = members.remove(&id) else { continue };
            let left = member.left_child_id.and_then(|c| built.remove(&c)).map(Box::new);
            let right = member.right_child_id.and_then(|c| built.remove(&c)).map(Box::new);
            let mut node = TreeNode::leaf(member);
            node.left = left;
            node.right = right;
            built.insert(id, node);
        }
        Ok(built.remove(&root_id))
    }

    /// Counts binary-tree descendants of `root_id` per level, for levels `1..=max_levels`.
    ///
    /// Counting stops after the first empty level, which is included in the result with a count of zero.
    pub async fn collect_downline_by_level(
        &self,
        root_id: MemberId,
        max_levels: u32,
    ) -> Result<BTreeMap<u32, usize>, ReferralGraphError> {
        let root = self.fetch(root_id).await?;
        let mut counts = BTreeMap::new();
        let mut visited = HashSet::from([root_id]);
        let mut frontier = vec![root];
        for level in 1..=max_levels.min(MAX_TREE_DEPTH) {
            let ids = frontier.iter().flat_map(Member::children).filter(|id| visited.insert(*id)).collect::<Vec<_>>();
            frontier = if ids.is_empty() { Vec::new() } else { self.db.fetch_members(&ids).await? };
            counts.insert(level, frontier.len());
            if frontier.is_empty() {
                break;
            }
        }
        trace!("🌳️ Downline of #{root_id}: {counts:?}");
        Ok(counts)
    }

    /// The number of binary-parent hops from `member_id` up to the root of its tree. A root has depth zero.
    pub async fn depth_from_root(&self, member_id: MemberId) -> Result<u32, ReferralGraphError> {
        let mut current = self.fetch(member_id).await?;
        let mut visited = HashSet::from([member_id]);
        let mut depth = 0;
        while let Some(parent_id) = current.binary_parent_id {
            if depth >= MAX_TREE_DEPTH || !visited.insert(parent_id) {
                warn!("🌳️ Gave up walking up the tree from #{member_id} at #{parent_id} after {depth} hops");
                break;
            }
            let Some(parent) = self.db.fetch_member(parent_id).await? else {
                warn!("🌳️ Binary parent #{parent_id} of #{} does not exist", current.id);
                break;
            };
            depth += 1;
            current = parent;
        }
        Ok(depth)
    }

    async fn fetch(&self, id: MemberId) -> Result<Member, ReferralGraphError> {
        self.db.fetch_member(id).await?.ok_or(ReferralGraphError::MemberNotFound(id))
    }
}
