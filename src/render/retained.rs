//! Retained-tree rendering backend.
//!
//! Keeps a map of nodes holding content + placement - the analog of a
//! retained scene graph or element tree where mutations persist between
//! frames and `present` has nothing left to do. Because the whole tree is
//! inspectable it doubles as the reference backend for tests.

use std::collections::HashMap;

use log::trace;

use super::{Placement, Renderer, SurfaceContent, SurfaceId};

/// One retained surface.
#[derive(Clone, Debug)]
pub struct RetainedNode {
    pub content: SurfaceContent,
    pub placement: Placement,
}

impl Default for RetainedNode {
    fn default() -> Self {
        Self {
            content: SurfaceContent::Empty,
            placement: Placement {
                visible: false,
                ..Placement::default()
            },
        }
    }
}

/// Renderer that retains every surface as a tree node.
pub struct RetainedRenderer {
    nodes: HashMap<SurfaceId, RetainedNode>,
    next_id: SurfaceId,
    target: (u32, u32),
    presented: u64,
}

impl RetainedRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            nodes: HashMap::new(),
            next_id: 1,
            target: (width, height),
            presented: 0,
        }
    }

    /// Inspect a node (tests, debugging).
    pub fn node(&self, id: SurfaceId) -> Option<&RetainedNode> {
        self.nodes.get(&id)
    }

    /// Visible nodes sorted by stacking order, bottom first.
    pub fn visible_nodes(&self) -> Vec<(SurfaceId, &RetainedNode)> {
        let mut nodes: Vec<(SurfaceId, &RetainedNode)> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.placement.visible)
            .map(|(id, n)| (*id, n))
            .collect();
        nodes.sort_by_key(|(_, n)| n.placement.z);
        nodes
    }

    pub fn present_count(&self) -> u64 {
        self.presented
    }
}

impl Renderer for RetainedRenderer {
    fn create_surface(&mut self) -> SurfaceId {
        let id = self.next_id;
        self.next_id += 1;
        self.nodes.insert(id, RetainedNode::default());
        trace!("retained surface {id} created");
        id
    }

    fn destroy_surface(&mut self, id: SurfaceId) {
        if self.nodes.remove(&id).is_some() {
            trace!("retained surface {id} destroyed");
        }
    }

    fn set_content(&mut self, id: SurfaceId, content: SurfaceContent) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.content = content;
        }
    }

    fn set_placement(&mut self, id: SurfaceId, placement: Placement) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.placement = placement;
        }
    }

    fn set_visible(&mut self, id: SurfaceId, visible: bool) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.placement.visible = visible;
        }
    }

    fn reset_surface(&mut self, id: SurfaceId) {
        if let Some(node) = self.nodes.get_mut(&id) {
            *node = RetainedNode::default();
        }
    }

    fn resize_target(&mut self, width: u32, height: u32) {
        self.target = (width.max(1), height.max(1));
    }

    fn target_size(&self) -> (u32, u32) {
        self.target
    }

    fn present(&mut self) -> anyhow::Result<()> {
        // The tree is the output; nothing to flush.
        self.presented += 1;
        Ok(())
    }

    fn surface_count(&self) -> usize {
        self.nodes.len()
    }
}
