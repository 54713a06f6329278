//! Octree palette construction.
//!
//! Colors are inserted once each, weighted by their histogram count; channel
//! sums accumulate along the whole root-to-leaf path so interior nodes always
//! hold their subtree totals. Reduction collapses interior nodes deepest level
//! first, smallest subtree count first (node id breaks ties), until the leaf
//! count fits the budget. Palette order is a fixed depth-first traversal.

const MAX_DEPTH: usize = 8;

#[derive(Clone)]
struct Node {
    r: u64,
    g: u64,
    b: u64,
    count: u64,
    children: [Option<usize>; 8],
    leaf: bool,
}

impl Node {
    fn new() -> Self {
        Self {
            r: 0,
            g: 0,
            b: 0,
            count: 0,
            children: [None; 8],
            leaf: false,
        }
    }
}

struct Octree {
    nodes: Vec<Node>,
    leaf_count: usize,
    // Interior node ids grouped by depth, 0..MAX_DEPTH.
    interior: Vec<Vec<usize>>,
}

impl Octree {
    fn new() -> Self {
        Self {
            nodes: vec![Node::new()],
            leaf_count: 0,
            interior: vec![Vec::new(); MAX_DEPTH],
        }
    }

    fn insert(&mut self, rgb: [u8; 3], count: u64) {
        let mut id = 0usize;
        for depth in 0..=MAX_DEPTH {
            let node = &mut self.nodes[id];
            node.r += rgb[0] as u64 * count;
            node.g += rgb[1] as u64 * count;
            node.b += rgb[2] as u64 * count;
            node.count += count;

            if depth == MAX_DEPTH {
                if !node.leaf {
                    node.leaf = true;
                    self.leaf_count += 1;
                }
                return;
            }

            let shift = 7 - depth;
            let branch = ((rgb[0] as usize >> shift) & 1) << 2
                | ((rgb[1] as usize >> shift) & 1) << 1
                | ((rgb[2] as usize >> shift) & 1);
            id = match self.nodes[id].children[branch] {
                Some(child) => child,
                None => {
                    let child = self.nodes.len();
                    self.nodes.push(Node::new());
                    if self.nodes[id].children.iter().all(Option::is_none) {
                        self.interior[depth].push(id);
                    }
                    self.nodes[id].children[branch] = Some(child);
                    child
                }
            };
        }
    }

    fn reduce(&mut self, max_colors: usize) {
        for depth in (0..MAX_DEPTH).rev() {
            if self.leaf_count <= max_colors {
                return;
            }
            let mut order = std::mem::take(&mut self.interior[depth]);
            order.sort_unstable_by_key(|&id| (self.nodes[id].count, id));
            for id in order {
                if self.leaf_count <= max_colors {
                    break;
                }
                self.collapse(id);
            }
        }
    }

    /// Fold a node's children into it. Only called bottom-up, so every child
    /// is already a leaf.
    fn collapse(&mut self, id: usize) {
        let children = std::mem::replace(&mut self.nodes[id].children, [None; 8]);
        let merged = children.iter().flatten().count();
        self.nodes[id].leaf = true;
        self.leaf_count -= merged - 1;
    }

    fn palette(&self) -> Vec<[u8; 3]> {
        let mut out = Vec::with_capacity(self.leaf_count);
        self.visit(0, &mut out);
        out
    }

    fn visit(&self, id: usize, out: &mut Vec<[u8; 3]>) {
        let node = &self.nodes[id];
        if node.leaf {
            let n = node.count;
            out.push([
                ((node.r + n / 2) / n) as u8,
                ((node.g + n / 2) / n) as u8,
                ((node.b + n / 2) / n) as u8,
            ]);
            return;
        }
        for child in node.children.iter().flatten() {
            self.visit(*child, out);
        }
    }
}

pub(crate) fn build_palette(histogram: &[([u8; 3], u64)], max_colors: usize) -> Vec<[u8; 3]> {
    let mut tree = Octree::new();
    for &(rgb, count) in histogram {
        tree.insert(rgb, count);
    }
    tree.reduce(max_colors);
    tree.palette()
}
