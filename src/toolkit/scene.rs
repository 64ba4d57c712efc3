//! Compositor-owned scene graph.
//!
//! A hierarchical render tree: tree nodes group, buffer nodes carry a
//! client surface, rect nodes carry a solid color. Sibling order is
//! z-order (last child paints on top), and hit-testing walks the tree
//! top-down so the topmost node wins.

use super::ToplevelId;
use anyhow::{anyhow, Result};
use std::collections::HashMap;

/// Identity of one scene node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) u64);

/// What a node contributes to the composed image.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Grouping node, no content of its own
    Tree,
    /// A client surface's committed pixels
    Buffer {
        toplevel: ToplevelId,
        width: u32,
        height: u32,
    },
    /// A solid-color region (backgrounds, placeholders)
    Rect { width: u32, height: u32, color: u32 },
}

#[derive(Debug)]
struct Node {
    parent: Option<NodeId>,
    /// Children in paint order: last paints (and hit-tests) on top
    children: Vec<NodeId>,
    x: i32,
    y: i32,
    kind: NodeKind,
    /// Opaque owner tag resolved by the orchestration layer (a view id)
    data: Option<u64>,
}

/// One item of the flattened paint list, in back-to-front order.
#[derive(Debug, Clone, PartialEq)]
pub enum PaintItem {
    Rect {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        color: u32,
    },
    Surface {
        toplevel: ToplevelId,
        x: i32,
        y: i32,
    },
}

/// The scene graph. One per server; outputs consume it, views attach
/// subtrees to it.
#[derive(Debug)]
pub struct Scene {
    nodes: HashMap<NodeId, Node>,
    root: NodeId,
    next_id: u64,
}

impl Scene {
    pub fn new() -> Self {
        let root = NodeId(1);
        let mut nodes = HashMap::new();
        nodes.insert(
            root,
            Node {
                parent: None,
                children: Vec::new(),
                x: 0,
                y: 0,
                kind: NodeKind::Tree,
                data: None,
            },
        );
        Self {
            nodes,
            root,
            next_id: 2,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    fn insert(&mut self, parent: NodeId, kind: NodeKind) -> Result<NodeId> {
        if !self.nodes.contains_key(&parent) {
            return Err(anyhow!("scene parent node {:?} does not exist", parent));
        }
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            Node {
                parent: Some(parent),
                children: Vec::new(),
                x: 0,
                y: 0,
                kind,
                data: None,
            },
        );
        self.nodes.get_mut(&parent).unwrap().children.push(id);
        Ok(id)
    }

    /// Create a grouping subtree under `parent`.
    pub fn create_tree(&mut self, parent: NodeId) -> Result<NodeId> {
        self.insert(parent, NodeKind::Tree)
    }

    /// Create a buffer node carrying `toplevel`'s surface content.
    pub fn create_buffer(
        &mut self,
        parent: NodeId,
        toplevel: ToplevelId,
        width: u32,
        height: u32,
    ) -> Result<NodeId> {
        self.insert(
            parent,
            NodeKind::Buffer {
                toplevel,
                width,
                height,
            },
        )
    }

    /// Create a solid-color rect node.
    pub fn create_rect(
        &mut self,
        parent: NodeId,
        width: u32,
        height: u32,
        color: u32,
    ) -> Result<NodeId> {
        self.insert(
            parent,
            NodeKind::Rect {
                width,
                height,
                color,
            },
        )
    }

    /// Position a node relative to its parent.
    pub fn set_position(&mut self, id: NodeId, x: i32, y: i32) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.x = x;
            node.y = y;
        }
    }

    /// Tag a node with its owning entity so hit-tests can resolve back.
    pub fn set_data(&mut self, id: NodeId, data: u64) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.data = Some(data);
        }
    }

    /// Move a node to the top of its siblings' z-order.
    pub fn raise_to_top(&mut self, id: NodeId) {
        let parent = match self.nodes.get(&id).and_then(|n| n.parent) {
            Some(p) => p,
            None => return,
        };
        if let Some(pnode) = self.nodes.get_mut(&parent) {
            pnode.children.retain(|c| *c != id);
            pnode.children.push(id);
        }
    }

    /// Destroy a node and its entire subtree.
    pub fn destroy(&mut self, id: NodeId) {
        if id == self.root {
            return;
        }
        if let Some(node) = self.nodes.get(&id) {
            if let Some(parent) = node.parent {
                if let Some(pnode) = self.nodes.get_mut(&parent) {
                    pnode.children.retain(|c| *c != id);
                }
            }
        }
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            if let Some(node) = self.nodes.remove(&cur) {
                stack.extend(node.children);
            }
        }
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Keep buffer nodes in sync with a surface's committed size.
    pub fn update_buffer_size(&mut self, toplevel: ToplevelId, width: u32, height: u32) {
        for node in self.nodes.values_mut() {
            if let NodeKind::Buffer {
                toplevel: t,
                width: w,
                height: h,
            } = &mut node.kind
            {
                if *t == toplevel {
                    *w = width;
                    *h = height;
                }
            }
        }
    }

    /// Top-down hit test. Returns the topmost node with content under
    /// (x, y) and the node-local coordinates of the hit.
    pub fn node_at(&self, x: f64, y: f64) -> Option<(NodeId, f64, f64)> {
        self.hit(self.root, x, y)
    }

    fn hit(&self, id: NodeId, px: f64, py: f64) -> Option<(NodeId, f64, f64)> {
        let node = self.nodes.get(&id)?;
        let lx = px - node.x as f64;
        let ly = py - node.y as f64;

        // Children are painted after (on top of) the node's own content.
        for child in node.children.iter().rev() {
            if let Some(hit) = self.hit(*child, lx, ly) {
                return Some(hit);
            }
        }

        let (w, h) = match node.kind {
            NodeKind::Tree => return None,
            NodeKind::Buffer { width, height, .. } => (width, height),
            NodeKind::Rect { width, height, .. } => (width, height),
        };
        if lx >= 0.0 && ly >= 0.0 && lx < w as f64 && ly < h as f64 {
            return Some((id, lx, ly));
        }
        None
    }

    /// Hit test that resolves back to an owning view: only buffer nodes
    /// count, and the owner tag is searched upward from the hit node.
    pub fn view_at(&self, x: f64, y: f64) -> Option<(u64, f64, f64)> {
        let (node, sx, sy) = self.node_at(x, y)?;
        match self.nodes.get(&node)?.kind {
            NodeKind::Buffer { .. } => {}
            // A hit on a background rect or other non-buffer content
            // means "no view".
            _ => return None,
        }
        let mut cur = Some(node);
        while let Some(id) = cur {
            let n = self.nodes.get(&id)?;
            if let Some(data) = n.data {
                return Some((data, sx, sy));
            }
            cur = n.parent;
        }
        None
    }

    /// Flatten the scene into back-to-front paint order with absolute
    /// coordinates.
    pub fn paint_list(&self) -> Vec<PaintItem> {
        let mut items = Vec::new();
        self.collect(self.root, 0, 0, &mut items);
        items
    }

    fn collect(&self, id: NodeId, ox: i32, oy: i32, items: &mut Vec<PaintItem>) {
        let node = match self.nodes.get(&id) {
            Some(n) => n,
            None => return,
        };
        let ax = ox + node.x;
        let ay = oy + node.y;
        match node.kind {
            NodeKind::Tree => {}
            NodeKind::Buffer { toplevel, .. } => items.push(PaintItem::Surface {
                toplevel,
                x: ax,
                y: ay,
            }),
            NodeKind::Rect {
                width,
                height,
                color,
            } => items.push(PaintItem::Rect {
                x: ax,
                y: ay,
                width,
                height,
                color,
            }),
        }
        for child in &node.children {
            self.collect(*child, ax, ay, items);
        }
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}
