//! Tidy tree placement (Buchheim, Jünger and Leipert's linear-time Walker)
//!
//! Works on an arena of [`WalkNode`]s indexed by pre-order position. The
//! output is a `breadth` coordinate per node (spread axis, before scaling)
//! normalized to fill `[0, breadth_extent]` the same way d3's `tree` layout
//! does when given a size. The depth axis is assigned by the caller.

/// Sibling/cousin gap policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Separation {
    /// Same parent 1, otherwise 2
    Flat,
    /// Flat gap divided by the depth of the left node
    DepthWeighted,
}

impl Separation {
    fn gap(&self, nodes: &[WalkNode], a: usize, b: usize) -> f64 {
        let base = if nodes[a].parent == nodes[b].parent { 1.0 } else { 2.0 };
        match self {
            Separation::Flat => base,
            Separation::DepthWeighted => base / (nodes[a].depth.max(1) as f64),
        }
    }
}

/// Shape of the hierarchy to lay out
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    /// Parent index per node; the root (index 0) has `None`
    pub parent: Vec<Option<usize>>,
    /// Ordered child indices per node
    pub children: Vec<Vec<usize>>,
    pub depth: Vec<usize>,
}

#[derive(Debug, Clone)]
struct WalkNode {
    parent: Option<usize>,
    children: Vec<usize>,
    depth: usize,
    /// Index among siblings
    number: usize,
    /// Ancestor pointer used by apportion
    ancestor: usize,
    default_ancestor: Option<usize>,
    prelim: f64,
    modifier: f64,
    change: f64,
    shift: f64,
    thread: Option<usize>,
}

/// Place every node along the spread axis
///
/// Returns one breadth value per node in `[0, extent]`.
pub fn place(shape: &Shape, separation: Separation, extent: f64) -> Vec<f64> {
    let n = shape.parent.len();
    if n == 0 {
        return Vec::new();
    }

    // Index `n` is a virtual parent of the root so the walks need no special case.
    let virtual_root = n;
    let mut nodes: Vec<WalkNode> = (0..=n)
        .map(|i| WalkNode {
            parent: if i == n { None } else { Some(shape.parent[i].unwrap_or(virtual_root)) },
            children: if i == n { vec![0] } else { shape.children[i].clone() },
            depth: if i == n { 0 } else { shape.depth[i] },
            number: 0,
            ancestor: i,
            default_ancestor: None,
            prelim: 0.0,
            modifier: 0.0,
            change: 0.0,
            shift: 0.0,
            thread: None,
        })
        .collect();
    for p in 0..=n {
        let kids = nodes[p].children.clone();
        for (i, c) in kids.into_iter().enumerate() {
            nodes[c].number = i;
        }
    }

    for v in post_order(&nodes, 0) {
        first_walk(&mut nodes, v, separation);
    }
    nodes[virtual_root].modifier = -nodes[0].prelim;

    let mut x = vec![0.0; n];
    for v in pre_order(&nodes, 0) {
        let parent = nodes[v].parent.unwrap_or(virtual_root);
        let parent_mod = nodes[parent].modifier;
        x[v] = nodes[v].prelim + parent_mod;
        nodes[v].modifier += parent_mod;
    }

    normalize(&nodes, &x, separation, extent)
}

fn normalize(nodes: &[WalkNode], x: &[f64], separation: Separation, extent: f64) -> Vec<f64> {
    let mut left = 0;
    let mut right = 0;
    for v in pre_order(nodes, 0) {
        if x[v] < x[left] {
            left = v;
        }
        if x[v] > x[right] {
            right = v;
        }
    }
    let s = if left == right {
        1.0
    } else {
        separation.gap(nodes, left, right) / 2.0
    };
    let tx = s - x[left];
    let kx = extent / (x[right] + s + tx);
    x.iter().map(|xi| (xi + tx) * kx).collect()
}

fn post_order(nodes: &[WalkNode], root: usize) -> Vec<usize> {
    let mut stack = vec![root];
    let mut visited = Vec::new();
    while let Some(v) = stack.pop() {
        visited.push(v);
        stack.extend(nodes[v].children.iter().copied());
    }
    visited.reverse();
    visited
}

fn pre_order(nodes: &[WalkNode], root: usize) -> Vec<usize> {
    let mut stack = vec![root];
    let mut visited = Vec::new();
    while let Some(v) = stack.pop() {
        visited.push(v);
        stack.extend(nodes[v].children.iter().rev().copied());
    }
    visited
}

fn left_sibling(nodes: &[WalkNode], v: usize) -> Option<usize> {
    let parent = nodes[v].parent?;
    let number = nodes[v].number;
    (number > 0).then(|| nodes[parent].children[number - 1])
}

fn next_left(nodes: &[WalkNode], v: usize) -> Option<usize> {
    nodes[v].children.first().copied().or(nodes[v].thread)
}

fn next_right(nodes: &[WalkNode], v: usize) -> Option<usize> {
    nodes[v].children.last().copied().or(nodes[v].thread)
}

fn first_walk(nodes: &mut [WalkNode], v: usize, separation: Separation) {
    let w = left_sibling(nodes, v);
    if !nodes[v].children.is_empty() {
        execute_shifts(nodes, v);
        let first = nodes[v].children[0];
        let last = nodes[v].children[nodes[v].children.len() - 1];
        let midpoint = (nodes[first].prelim + nodes[last].prelim) / 2.0;
        match w {
            Some(w) => {
                nodes[v].prelim = nodes[w].prelim + separation.gap(nodes, v, w);
                nodes[v].modifier = nodes[v].prelim - midpoint;
            }
            None => nodes[v].prelim = midpoint,
        }
    } else if let Some(w) = w {
        nodes[v].prelim = nodes[w].prelim + separation.gap(nodes, v, w);
    }

    if let Some(parent) = nodes[v].parent {
        let fallback = nodes[parent].default_ancestor.unwrap_or(nodes[parent].children[0]);
        let ancestor = apportion(nodes, v, w, fallback, separation);
        nodes[parent].default_ancestor = Some(ancestor);
    }
}

fn execute_shifts(nodes: &mut [WalkNode], v: usize) {
    let mut shift = 0.0;
    let mut change = 0.0;
    let children = nodes[v].children.clone();
    for &w in children.iter().rev() {
        nodes[w].prelim += shift;
        nodes[w].modifier += shift;
        change += nodes[w].change;
        shift += nodes[w].shift + change;
    }
}

fn move_subtree(nodes: &mut [WalkNode], wm: usize, wp: usize, shift: f64) {
    let change = shift / (nodes[wp].number as f64 - nodes[wm].number as f64);
    nodes[wp].change -= change;
    nodes[wp].shift += shift;
    nodes[wm].change += change;
    nodes[wp].prelim += shift;
    nodes[wp].modifier += shift;
}

fn next_ancestor(nodes: &[WalkNode], vim: usize, v: usize, ancestor: usize) -> usize {
    let candidate = nodes[vim].ancestor;
    if nodes[candidate].parent == nodes[v].parent {
        candidate
    } else {
        ancestor
    }
}

fn apportion(
    nodes: &mut [WalkNode],
    v: usize,
    w: Option<usize>,
    mut ancestor: usize,
    separation: Separation,
) -> usize {
    let Some(w) = w else {
        return ancestor;
    };
    let Some(parent) = nodes[v].parent else {
        return ancestor;
    };

    let mut vip = v;
    let mut vop = v;
    let mut vim = w;
    let mut vom = nodes[parent].children[0];
    let mut sip = nodes[vip].modifier;
    let mut sop = nodes[vop].modifier;
    let mut sim = nodes[vim].modifier;
    let mut som = nodes[vom].modifier;

    let (mut next_im, mut next_ip) = (next_right(nodes, vim), next_left(nodes, vip));
    while let (Some(im), Some(ip)) = (next_im, next_ip) {
        vim = im;
        vip = ip;
        // Outer contours always extend at least as far as the inner ones.
        vom = next_left(nodes, vom).unwrap_or(vom);
        vop = next_right(nodes, vop).unwrap_or(vop);
        nodes[vop].ancestor = v;
        let shift = nodes[vim].prelim + sim - nodes[vip].prelim - sip + separation.gap(nodes, vim, vip);
        if shift > 0.0 {
            let wm = next_ancestor(nodes, vim, v, ancestor);
            move_subtree(nodes, wm, v, shift);
            sip += shift;
            sop += shift;
        }
        sim += nodes[vim].modifier;
        sip += nodes[vip].modifier;
        som += nodes[vom].modifier;
        sop += nodes[vop].modifier;
        next_im = next_right(nodes, vim);
        next_ip = next_left(nodes, vip);
    }

    if let Some(im) = next_im {
        if next_right(nodes, vop).is_none() {
            nodes[vop].thread = Some(im);
            nodes[vop].modifier += sim - sop;
        }
    }
    if let Some(ip) = next_ip {
        if next_left(nodes, vom).is_none() {
            nodes[vom].thread = Some(ip);
            nodes[vom].modifier += sip - som;
            ancestor = v;
        }
    }
    ancestor
}
