//! Dynamic AABB tree and the move-buffer broad-phase built on it.
//!
//! Leaves store fattened boxes: the true box grown by a margin and stretched
//! along the proxy's last displacement. A proxy is only re-inserted when its
//! true box leaves the fat one.

use glam::Vec2;

use super::{
    aabb::Aabb,
    queries::{RayCastInput, RayCastOutput},
};
use crate::{config::AABB_MULTIPLIER, utils::math};

/// Sentinel for "no node".
pub const NULL_NODE: usize = usize::MAX;

#[derive(Debug, Clone)]
struct TreeNode<T> {
    /// Fat AABB for leaves, enclosing box for internal nodes.
    aabb: Aabb,
    parent: usize,
    child1: usize,
    child2: usize,
    /// Leaf = 0, free node = -1.
    height: i32,
    user_data: Option<T>,
}

impl<T> TreeNode<T> {
    fn is_leaf(&self) -> bool {
        self.child1 == NULL_NODE
    }
}

/// Height-balanced binary tree of fattened AABBs.
#[derive(Debug, Clone)]
pub struct DynamicTree<T> {
    nodes: Vec<TreeNode<T>>,
    root: usize,
    free_list: Vec<usize>,
    proxy_count: usize,
    margin: f32,
}

impl<T: Copy> DynamicTree<T> {
    pub fn new(margin: f32) -> Self {
        Self {
            nodes: Vec::new(),
            root: NULL_NODE,
            free_list: Vec::new(),
            proxy_count: 0,
            margin,
        }
    }

    fn allocate_node(&mut self) -> usize {
        let node = TreeNode {
            aabb: Aabb::default(),
            parent: NULL_NODE,
            child1: NULL_NODE,
            child2: NULL_NODE,
            height: 0,
            user_data: None,
        };
        if let Some(id) = self.free_list.pop() {
            self.nodes[id] = node;
            id
        } else {
            self.nodes.push(node);
            self.nodes.len() - 1
        }
    }

    fn free_node(&mut self, id: usize) {
        self.nodes[id].height = -1;
        self.nodes[id].user_data = None;
        self.free_list.push(id);
    }

    /// Adds a leaf for `aabb` and returns its proxy id.
    pub fn create_proxy(&mut self, aabb: &Aabb, user_data: T) -> usize {
        let id = self.allocate_node();
        self.nodes[id].aabb = aabb.fattened(self.margin);
        self.nodes[id].user_data = Some(user_data);
        self.insert_leaf(id);
        self.proxy_count += 1;
        id
    }

    /// Panics if `proxy_id` is not a live leaf.
    pub fn destroy_proxy(&mut self, proxy_id: usize) {
        assert!(self.is_live_leaf(proxy_id), "invalid proxy id {proxy_id}");
        self.remove_leaf(proxy_id);
        self.free_node(proxy_id);
        self.proxy_count -= 1;
    }

    /// Refits a proxy after its shape moved.
    ///
    /// Returns true when the proxy had to be re-inserted, i.e. `aabb` escaped
    /// the stored fat box.
    pub fn move_proxy(&mut self, proxy_id: usize, aabb: &Aabb, displacement: Vec2) -> bool {
        assert!(self.is_live_leaf(proxy_id), "invalid proxy id {proxy_id}");

        if self.nodes[proxy_id].aabb.contains(aabb) {
            return false;
        }

        self.remove_leaf(proxy_id);
        self.nodes[proxy_id].aabb = aabb
            .fattened(self.margin)
            .displaced(displacement * AABB_MULTIPLIER);
        self.insert_leaf(proxy_id);
        true
    }

    pub fn user_data(&self, proxy_id: usize) -> T {
        match self.nodes[proxy_id].user_data {
            Some(data) => data,
            None => panic!("proxy {proxy_id} carries no user data"),
        }
    }

    pub fn fat_aabb(&self, proxy_id: usize) -> Aabb {
        self.nodes[proxy_id].aabb
    }

    pub fn proxy_count(&self) -> usize {
        self.proxy_count
    }

    fn is_live_leaf(&self, id: usize) -> bool {
        self.nodes
            .get(id)
            .map(|n| n.height == 0 && n.is_leaf() && n.user_data.is_some())
            .unwrap_or(false)
    }

    fn insert_leaf(&mut self, leaf: usize) {
        if self.root == NULL_NODE {
            self.root = leaf;
            self.nodes[leaf].parent = NULL_NODE;
            return;
        }

        // Find the best sibling by the perimeter heuristic.
        let leaf_aabb = self.nodes[leaf].aabb;
        let mut index = self.root;
        while !self.nodes[index].is_leaf() {
            let node = &self.nodes[index];
            let (child1, child2) = (node.child1, node.child2);

            let area = node.aabb.perimeter();
            let combined_area = node.aabb.union(&leaf_aabb).perimeter();

            // Cost of a new parent for this node and the leaf.
            let cost = 2.0 * combined_area;
            // Minimum cost of pushing the leaf further down.
            let inheritance_cost = 2.0 * (combined_area - area);

            let descend_cost = |child: usize| {
                let c = &self.nodes[child];
                let grown = leaf_aabb.union(&c.aabb).perimeter();
                if c.is_leaf() {
                    grown + inheritance_cost
                } else {
                    grown - c.aabb.perimeter() + inheritance_cost
                }
            };
            let cost1 = descend_cost(child1);
            let cost2 = descend_cost(child2);

            if cost < cost1 && cost < cost2 {
                break;
            }
            index = if cost1 < cost2 { child1 } else { child2 };
        }

        let sibling = index;
        let old_parent = self.nodes[sibling].parent;
        let new_parent = self.allocate_node();
        self.nodes[new_parent].parent = old_parent;
        self.nodes[new_parent].aabb = leaf_aabb.union(&self.nodes[sibling].aabb);
        self.nodes[new_parent].height = self.nodes[sibling].height + 1;
        self.nodes[new_parent].child1 = sibling;
        self.nodes[new_parent].child2 = leaf;
        self.nodes[sibling].parent = new_parent;
        self.nodes[leaf].parent = new_parent;

        if old_parent != NULL_NODE {
            if self.nodes[old_parent].child1 == sibling {
                self.nodes[old_parent].child1 = new_parent;
            } else {
                self.nodes[old_parent].child2 = new_parent;
            }
        } else {
            self.root = new_parent;
        }

        let parent = self.nodes[leaf].parent;
        self.refit_from(parent);
    }

    fn remove_leaf(&mut self, leaf: usize) {
        if leaf == self.root {
            self.root = NULL_NODE;
            return;
        }

        let parent = self.nodes[leaf].parent;
        let grand_parent = self.nodes[parent].parent;
        let sibling = if self.nodes[parent].child1 == leaf {
            self.nodes[parent].child2
        } else {
            self.nodes[parent].child1
        };

        if grand_parent != NULL_NODE {
            if self.nodes[grand_parent].child1 == parent {
                self.nodes[grand_parent].child1 = sibling;
            } else {
                self.nodes[grand_parent].child2 = sibling;
            }
            self.nodes[sibling].parent = grand_parent;
            self.free_node(parent);
            self.refit_from(grand_parent);
        } else {
            self.root = sibling;
            self.nodes[sibling].parent = NULL_NODE;
            self.free_node(parent);
        }
        self.nodes[leaf].parent = NULL_NODE;
    }

    /// Rebalances and refits every ancestor starting at `index`.
    fn refit_from(&mut self, mut index: usize) {
        while index != NULL_NODE {
            index = self.balance(index);

            let child1 = self.nodes[index].child1;
            let child2 = self.nodes[index].child2;
            self.nodes[index].height = 1 + self.nodes[child1].height.max(self.nodes[child2].height);
            self.nodes[index].aabb = self.nodes[child1].aabb.union(&self.nodes[child2].aabb);

            index = self.nodes[index].parent;
        }
    }

    fn replace_child(&mut self, parent: usize, old: usize, new: usize) {
        if parent == NULL_NODE {
            self.root = new;
        } else if self.nodes[parent].child1 == old {
            self.nodes[parent].child1 = new;
        } else {
            self.nodes[parent].child2 = new;
        }
    }

    /// Performs a left or right rotation if `ia` is imbalanced. Returns the new subtree root.
    fn balance(&mut self, ia: usize) -> usize {
        if self.nodes[ia].is_leaf() || self.nodes[ia].height < 2 {
            return ia;
        }

        let ib = self.nodes[ia].child1;
        let ic = self.nodes[ia].child2;
        let balance = self.nodes[ic].height - self.nodes[ib].height;

        if balance > 1 {
            // Rotate C up.
            let i_f = self.nodes[ic].child1;
            let i_g = self.nodes[ic].child2;

            self.nodes[ic].child1 = ia;
            self.nodes[ic].parent = self.nodes[ia].parent;
            self.nodes[ia].parent = ic;
            let grand = self.nodes[ic].parent;
            self.replace_child(grand, ia, ic);

            let (keep, moved) = if self.nodes[i_f].height > self.nodes[i_g].height {
                (i_f, i_g)
            } else {
                (i_g, i_f)
            };
            self.nodes[ic].child2 = keep;
            self.nodes[ia].child2 = moved;
            self.nodes[moved].parent = ia;

            self.nodes[ia].aabb = self.nodes[ib].aabb.union(&self.nodes[moved].aabb);
            self.nodes[ic].aabb = self.nodes[ia].aabb.union(&self.nodes[keep].aabb);
            self.nodes[ia].height = 1 + self.nodes[ib].height.max(self.nodes[moved].height);
            self.nodes[ic].height = 1 + self.nodes[ia].height.max(self.nodes[keep].height);
            return ic;
        }

        if balance < -1 {
            // Rotate B up.
            let i_d = self.nodes[ib].child1;
            let i_e = self.nodes[ib].child2;

            self.nodes[ib].child1 = ia;
            self.nodes[ib].parent = self.nodes[ia].parent;
            self.nodes[ia].parent = ib;
            let grand = self.nodes[ib].parent;
            self.replace_child(grand, ia, ib);

            let (keep, moved) = if self.nodes[i_d].height > self.nodes[i_e].height {
                (i_d, i_e)
            } else {
                (i_e, i_d)
            };
            self.nodes[ib].child2 = keep;
            self.nodes[ia].child1 = moved;
            self.nodes[moved].parent = ia;

            self.nodes[ia].aabb = self.nodes[ic].aabb.union(&self.nodes[moved].aabb);
            self.nodes[ib].aabb = self.nodes[ia].aabb.union(&self.nodes[keep].aabb);
            self.nodes[ia].height = 1 + self.nodes[ic].height.max(self.nodes[moved].height);
            self.nodes[ib].height = 1 + self.nodes[ia].height.max(self.nodes[keep].height);
            return ib;
        }

        ia
    }

    /// Height of the tree; an empty tree has height 0.
    pub fn height(&self) -> i32 {
        if self.root == NULL_NODE {
            0
        } else {
            self.nodes[self.root].height
        }
    }

    /// Largest child height difference over all internal nodes.
    pub fn max_balance(&self) -> i32 {
        self.nodes
            .iter()
            .filter(|n| n.height > 1)
            .map(|n| (self.nodes[n.child2].height - self.nodes[n.child1].height).abs())
            .max()
            .unwrap_or(0)
    }

    /// Sum of node perimeters over the root perimeter.
    pub fn area_ratio(&self) -> f32 {
        if self.root == NULL_NODE {
            return 0.0;
        }
        let root_area = self.nodes[self.root].aabb.perimeter();
        let total: f32 = self
            .nodes
            .iter()
            .filter(|n| n.height >= 0)
            .map(|n| n.aabb.perimeter())
            .sum();
        total / root_area
    }

    /// Calls `callback` with every proxy whose fat AABB overlaps `aabb`.
    /// Returning `false` stops the query.
    pub fn query<F>(&self, aabb: &Aabb, mut callback: F)
    where
        F: FnMut(usize) -> bool,
    {
        let mut stack = Vec::with_capacity(64);
        stack.push(self.root);
        while let Some(id) = stack.pop() {
            if id == NULL_NODE {
                continue;
            }
            let node = &self.nodes[id];
            if !node.aabb.overlaps(aabb) {
                continue;
            }
            if node.is_leaf() {
                if !callback(id) {
                    return;
                }
            } else {
                stack.push(node.child1);
                stack.push(node.child2);
            }
        }
    }

    /// Casts a ray against the fat boxes.
    ///
    /// `callback` gets the clipped input and a proxy id and returns the new
    /// max fraction: `0` terminates, the current max fraction keeps going, a
    /// smaller value clips the ray.
    pub fn ray_cast<F>(&self, input: &RayCastInput, mut callback: F)
    where
        F: FnMut(&RayCastInput, usize) -> f32,
    {
        let p1 = input.p1;
        let p2 = input.p2;
        let r = (p2 - p1).normalize_or_zero();
        if r == Vec2::ZERO {
            return;
        }

        // Separating axis for the segment.
        let v = math::cross_sv(1.0, r);
        let abs_v = v.abs();

        let mut max_fraction = input.max_fraction;
        let segment_aabb = |fraction: f32| {
            let t = p1 + (p2 - p1) * fraction;
            Aabb::new(p1.min(t), p1.max(t))
        };
        let mut bounds = segment_aabb(max_fraction);

        let mut stack = Vec::with_capacity(64);
        stack.push(self.root);
        while let Some(id) = stack.pop() {
            if id == NULL_NODE {
                continue;
            }
            let node = &self.nodes[id];
            if !node.aabb.overlaps(&bounds) {
                continue;
            }

            let c = node.aabb.center();
            let h = node.aabb.extents();
            let separation = v.dot(p1 - c).abs() - abs_v.dot(h);
            if separation > 0.0 {
                continue;
            }

            if node.is_leaf() {
                let sub_input = RayCastInput {
                    p1,
                    p2,
                    max_fraction,
                };
                let value = callback(&sub_input, id);
                if value == 0.0 {
                    return;
                }
                if value > 0.0 && value < max_fraction {
                    max_fraction = value;
                    bounds = segment_aabb(max_fraction);
                }
            } else {
                stack.push(node.child1);
                stack.push(node.child2);
            }
        }
    }

    /// Ray against one proxy's fat box.
    pub fn ray_cast_proxy(&self, proxy_id: usize, input: &RayCastInput) -> Option<RayCastOutput> {
        self.nodes[proxy_id].aabb.ray_cast(input)
    }

    /// Checks parent links, heights and enclosing boxes. Panics on corruption.
    pub fn validate(&self) {
        if self.root != NULL_NODE {
            assert_eq!(self.nodes[self.root].parent, NULL_NODE);
            self.validate_node(self.root);
        }
        let free = self.nodes.iter().filter(|n| n.height < 0).count();
        assert_eq!(free, self.free_list.len());
        let leaves = self
            .nodes
            .iter()
            .filter(|n| n.height == 0 && n.user_data.is_some())
            .count();
        assert_eq!(leaves, self.proxy_count);
    }

    fn validate_node(&self, index: usize) {
        let node = &self.nodes[index];
        if node.is_leaf() {
            assert_eq!(node.height, 0);
            assert_eq!(node.child2, NULL_NODE);
            return;
        }
        let (c1, c2) = (node.child1, node.child2);
        assert_eq!(self.nodes[c1].parent, index);
        assert_eq!(self.nodes[c2].parent, index);
        assert_eq!(
            node.height,
            1 + self.nodes[c1].height.max(self.nodes[c2].height)
        );
        let enclosing = self.nodes[c1].aabb.union(&self.nodes[c2].aabb);
        assert_eq!(node.aabb, enclosing);
        self.validate_node(c1);
        self.validate_node(c2);
    }
}

/// Tree plus the buffer of proxies that moved since the last pair update.
#[derive(Debug, Clone)]
pub struct BroadPhase<T> {
    tree: DynamicTree<T>,
    move_buffer: Vec<usize>,
}

impl<T: Copy> BroadPhase<T> {
    pub fn new(margin: f32) -> Self {
        Self {
            tree: DynamicTree::new(margin),
            move_buffer: Vec::new(),
        }
    }

    pub fn tree(&self) -> &DynamicTree<T> {
        &self.tree
    }

    pub fn create_proxy(&mut self, aabb: &Aabb, user_data: T) -> usize {
        let id = self.tree.create_proxy(aabb, user_data);
        self.move_buffer.push(id);
        id
    }

    pub fn destroy_proxy(&mut self, proxy_id: usize) {
        self.move_buffer.retain(|id| *id != proxy_id);
        self.tree.destroy_proxy(proxy_id);
    }

    /// Returns true when the proxy was re-inserted.
    pub fn move_proxy(&mut self, proxy_id: usize, aabb: &Aabb, displacement: Vec2) -> bool {
        let moved = self.tree.move_proxy(proxy_id, aabb, displacement);
        if moved {
            self.move_buffer.push(proxy_id);
        }
        moved
    }

    /// Forces the proxy's pairs to be re-examined on the next update.
    pub fn touch_proxy(&mut self, proxy_id: usize) {
        self.move_buffer.push(proxy_id);
    }

    pub fn test_overlap(&self, proxy_a: usize, proxy_b: usize) -> bool {
        self.tree
            .fat_aabb(proxy_a)
            .overlaps(&self.tree.fat_aabb(proxy_b))
    }

    pub fn user_data(&self, proxy_id: usize) -> T {
        self.tree.user_data(proxy_id)
    }

    pub fn fat_aabb(&self, proxy_id: usize) -> Aabb {
        self.tree.fat_aabb(proxy_id)
    }

    pub fn proxy_count(&self) -> usize {
        self.tree.proxy_count()
    }

    pub fn move_count(&self) -> usize {
        self.move_buffer.len()
    }

    /// Drains the move buffer and returns every overlapping pair involving a
    /// moved proxy, as sorted `(lower, higher)` proxy ids without duplicates.
    pub fn update_pairs(&mut self) -> Vec<(usize, usize)> {
        let mut pairs = Vec::new();
        for &query_id in &self.move_buffer {
            let fat = self.tree.fat_aabb(query_id);
            self.tree.query(&fat, |proxy_id| {
                if proxy_id != query_id {
                    pairs.push((proxy_id.min(query_id), proxy_id.max(query_id)));
                }
                true
            });
        }
        self.move_buffer.clear();

        pairs.sort_unstable();
        pairs.dedup();
        pairs
    }

    pub fn query<F>(&self, aabb: &Aabb, callback: F)
    where
        F: FnMut(usize) -> bool,
    {
        self.tree.query(aabb, callback);
    }

    pub fn ray_cast<F>(&self, input: &RayCastInput, callback: F)
    where
        F: FnMut(&RayCastInput, usize) -> f32,
    {
        self.tree.ray_cast(input, callback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Small deterministic generator so the tests need no extra crates.
    struct Lcg(u64);

    impl Lcg {
        fn next_f32(&mut self) -> f32 {
            self.0 = self
                .0
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            ((self.0 >> 33) as f32) / (1u64 << 31) as f32
        }

        fn aabb(&mut self) -> Aabb {
            let c = Vec2::new(self.next_f32() * 100.0, self.next_f32() * 100.0);
            let h = Vec2::new(0.2 + self.next_f32(), 0.2 + self.next_f32());
            Aabb::from_center(c, h)
        }
    }

    fn brute_force(tree: &DynamicTree<u32>, live: &[usize], query: &Aabb) -> Vec<usize> {
        let mut out: Vec<usize> = live
            .iter()
            .copied()
            .filter(|id| tree.fat_aabb(*id).overlaps(query))
            .collect();
        out.sort_unstable();
        out
    }

    #[test]
    fn query_matches_brute_force_after_churn() {
        let mut rng = Lcg(7);
        let mut tree = DynamicTree::new(0.1);
        let mut live = Vec::new();
        for i in 0..256u32 {
            live.push(tree.create_proxy(&rng.aabb(), i));
        }
        for _ in 0..64 {
            let victim = live.remove((rng.next_f32() * live.len() as f32) as usize % live.len());
            tree.destroy_proxy(victim);
        }
        for id in live.clone() {
            let aabb = rng.aabb();
            tree.move_proxy(id, &aabb, Vec2::new(0.5, -0.5));
        }
        tree.validate();

        for _ in 0..32 {
            let query = rng.aabb().fattened(5.0);
            let mut found = Vec::new();
            tree.query(&query, |id| {
                found.push(id);
                true
            });
            found.sort_unstable();
            assert_eq!(found, brute_force(&tree, &live, &query));
        }
    }

    #[test]
    fn height_stays_logarithmic_for_sorted_inserts() {
        let mut tree = DynamicTree::new(0.1);
        for i in 0..256u32 {
            let c = Vec2::new(i as f32 * 2.0, 0.0);
            tree.create_proxy(&Aabb::from_center(c, Vec2::splat(0.5)), i);
        }
        tree.validate();
        assert!(tree.height() <= 3 * 8, "height {}", tree.height());
        assert!(tree.area_ratio() > 1.0);
    }

    #[test]
    fn small_moves_stay_inside_fat_box() {
        let mut tree = DynamicTree::new(0.1);
        let aabb = Aabb::from_center(Vec2::ZERO, Vec2::splat(0.5));
        let id = tree.create_proxy(&aabb, 0u32);
        let nudged = aabb.displaced(Vec2::new(0.05, 0.0));
        assert!(!tree.move_proxy(id, &nudged, Vec2::new(0.05, 0.0)));
        let far = Aabb::from_center(Vec2::new(3.0, 0.0), Vec2::splat(0.5));
        assert!(tree.move_proxy(id, &far, Vec2::new(3.0, 0.0)));
        assert!(tree.fat_aabb(id).contains(&far));
        // Stretched along the displacement.
        assert!(tree.fat_aabb(id).max.x > far.max.x + 1.0);
    }

    #[test]
    fn ray_cast_visits_only_hit_leaves() {
        let mut tree = DynamicTree::new(0.0);
        let a = tree.create_proxy(&Aabb::from_center(Vec2::new(5.0, 0.0), Vec2::ONE), 1u32);
        let _b = tree.create_proxy(&Aabb::from_center(Vec2::new(5.0, 10.0), Vec2::ONE), 2u32);
        let mut visited = Vec::new();
        let input = RayCastInput::new(Vec2::ZERO, Vec2::new(10.0, 0.0));
        tree.ray_cast(&input, |sub, id| {
            visited.push(id);
            sub.max_fraction
        });
        assert_eq!(visited, vec![a]);
    }

    #[test]
    fn update_pairs_reports_each_pair_once() {
        let mut bp = BroadPhase::new(0.1);
        let a = bp.create_proxy(&Aabb::from_center(Vec2::ZERO, Vec2::ONE), 'a');
        let b = bp.create_proxy(&Aabb::from_center(Vec2::new(1.5, 0.0), Vec2::ONE), 'b');
        let _c = bp.create_proxy(&Aabb::from_center(Vec2::new(9.0, 0.0), Vec2::ONE), 'c');
        assert_eq!(bp.update_pairs(), vec![(a.min(b), a.max(b))]);
        assert_eq!(bp.move_count(), 0);
        assert!(bp.update_pairs().is_empty());
        bp.touch_proxy(b);
        assert_eq!(bp.update_pairs().len(), 1);
    }
}
