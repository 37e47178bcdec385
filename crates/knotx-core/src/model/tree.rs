use serde::{Deserialize, Serialize};

use super::{Edge, EdgeIdentifier, Knot, KnotData, KnotId, OrderedEdges, Properties};
use crate::filter::Filter;

/// Self-contained snapshot of a (sub)tree
///
/// The unit of bulk import/export and of delta application. Contains no
/// references into storage: every edge carries its child knot inline.
/// A knot with `knot_data == None` is a bare placeholder created while a
/// delta transaction is still filling in the tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeKnot {
    pub id: KnotId,
    #[serde(default)]
    pub version: i64,
    pub knot_data: Option<KnotData>,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub children: Vec<TreeEdge>,
}

/// Edge of a [`TreeKnot`], nesting its target inline
///
/// `child == None` marks a placeholder whose edge record has not arrived yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEdge {
    pub edge_identifier: EdgeIdentifier,
    #[serde(default)]
    pub version: i64,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub properties: Properties,
    pub live: bool,
    pub percentage: u8,
    pub child: Option<Box<TreeKnot>>,
}

impl TreeKnot {
    pub fn placeholder(id: impl Into<KnotId>) -> Self {
        Self {
            id: id.into(),
            version: 0,
            knot_data: None,
            properties: Properties::new(),
            children: Vec::new(),
        }
    }

    /// Snapshot of a knot without children attached yet
    pub fn from_knot(knot: &Knot) -> Self {
        Self {
            id: knot.id.clone(),
            version: knot.version,
            knot_data: Some(knot.data.clone()),
            properties: knot.properties.clone(),
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, edge: TreeEdge) -> Self {
        self.children.push(edge);
        self.sort_children();
        self
    }

    pub fn is_placeholder(&self) -> bool {
        self.knot_data.is_none()
    }

    /// Storage record for this node; `None` for a placeholder
    pub fn to_knot(&self) -> Option<Knot> {
        let data = self.knot_data.clone()?;
        let mut edges = OrderedEdges::new();
        edges.extend(self.children.iter().map(|c| c.edge_identifier.clone()));
        Some(Knot {
            id: self.id.clone(),
            version: self.version,
            data,
            edges,
            properties: self.properties.clone(),
        })
    }

    /// Keep children in the same order [`OrderedEdges`] would give them
    pub fn sort_children(&mut self) {
        self.children
            .sort_by_key(|c| (c.edge_identifier.priority, c.edge_identifier.sequence));
    }

    pub fn find_knot(&self, id: &str) -> Option<&TreeKnot> {
        if self.id == id {
            return Some(self);
        }
        self.children
            .iter()
            .filter_map(|edge| edge.child.as_deref())
            .find_map(|child| child.find_knot(id))
    }

    pub fn find_knot_mut(&mut self, id: &str) -> Option<&mut TreeKnot> {
        if self.id == id {
            return Some(self);
        }
        self.children
            .iter_mut()
            .filter_map(|edge| edge.child.as_deref_mut())
            .find_map(|child| child.find_knot_mut(id))
    }

    pub fn find_edge(&self, edge_id: &str) -> Option<&TreeEdge> {
        self.children.iter().find_map(|edge| {
            if edge.edge_identifier.id == edge_id {
                Some(edge)
            } else {
                edge.child.as_deref().and_then(|c| c.find_edge(edge_id))
            }
        })
    }

    pub fn find_edge_mut(&mut self, edge_id: &str) -> Option<&mut TreeEdge> {
        self.children.iter_mut().find_map(|edge| {
            if edge.edge_identifier.id == edge_id {
                Some(edge)
            } else {
                edge.child
                    .as_deref_mut()
                    .and_then(|c| c.find_edge_mut(edge_id))
            }
        })
    }

    /// Apply `update` to every occurrence of knot `id`
    ///
    /// A snapshot repeats shared sub-DAGs, so one id may occur several times.
    /// An updated knot's own subtree is not searched further. Returns the
    /// number of occurrences updated.
    pub fn update_knots(&mut self, id: &str, update: &mut dyn FnMut(&mut TreeKnot)) -> usize {
        if self.id == id {
            update(self);
            return 1;
        }
        let mut hits = 0;
        for edge in &mut self.children {
            if let Some(child) = edge.child.as_deref_mut() {
                hits += child.update_knots(id, update);
            }
        }
        hits
    }

    /// Apply `update` to every occurrence of edge `edge_id`, re-sorting owners
    pub fn update_edges(&mut self, edge_id: &str, update: &mut dyn FnMut(&mut TreeEdge)) -> usize {
        let mut hits = 0;
        let mut direct = false;
        for edge in &mut self.children {
            if edge.edge_identifier.id == edge_id {
                update(edge);
                hits += 1;
                direct = true;
            } else if let Some(child) = edge.child.as_deref_mut() {
                hits += child.update_edges(edge_id, update);
            }
        }
        if direct {
            self.sort_children();
        }
        hits
    }

    /// Knot that directly owns `edge_id`
    pub fn find_edge_owner(&self, edge_id: &str) -> Option<&TreeKnot> {
        if self
            .children
            .iter()
            .any(|edge| edge.edge_identifier.id == edge_id)
        {
            return Some(self);
        }
        self.children
            .iter()
            .filter_map(|edge| edge.child.as_deref())
            .find_map(|child| child.find_edge_owner(edge_id))
    }

    /// Every knot id in the tree, depth-first, repeats included
    pub fn knot_ids(&self) -> Vec<KnotId> {
        let mut out = Vec::new();
        self.walk(
            &mut |knot: &TreeKnot| out.push(knot.id.clone()),
            &mut |_: &TreeEdge| {},
        );
        out
    }

    /// Every edge id in the tree, depth-first
    pub fn edge_ids(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.walk(&mut |_: &TreeKnot| {}, &mut |edge: &TreeEdge| {
            out.push(edge.edge_identifier.id.clone())
        });
        out
    }

    /// Pre-order traversal: a knot, then for each edge the edge and its child
    pub fn walk(&self, on_knot: &mut dyn FnMut(&TreeKnot), on_edge: &mut dyn FnMut(&TreeEdge)) {
        on_knot(self);
        for edge in &self.children {
            on_edge(edge);
            if let Some(child) = edge.child.as_deref() {
                child.walk(on_knot, on_edge);
            }
        }
    }

    /// Copy with every version zeroed, for observational comparison
    pub fn strip_versions(&self) -> TreeKnot {
        let mut copy = self.clone();
        copy.zero_versions();
        copy
    }

    fn zero_versions(&mut self) {
        self.version = 0;
        for edge in &mut self.children {
            edge.version = 0;
            edge.edge_identifier.sequence = 0;
            if let Some(child) = edge.child.as_deref_mut() {
                child.zero_versions();
            }
        }
    }
}

impl TreeEdge {
    /// Edge whose record has not been supplied yet
    pub fn placeholder(edge_identifier: EdgeIdentifier) -> Self {
        Self {
            edge_identifier,
            version: 0,
            filters: Vec::new(),
            properties: Properties::new(),
            live: true,
            percentage: 100,
            child: None,
        }
    }

    /// Snapshot of an edge record with its child attached
    pub fn from_edge(edge: &Edge, child: TreeKnot) -> Self {
        Self {
            edge_identifier: edge.identifier.clone(),
            version: edge.version,
            filters: edge.filters.clone(),
            properties: edge.properties.clone(),
            live: edge.live,
            percentage: edge.percentage,
            child: Some(Box::new(child)),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.child.is_none()
    }

    pub fn target(&self) -> Option<&str> {
        self.child.as_deref().map(|c| c.id.as_str())
    }

    /// Storage record for this edge; `None` until a child is attached
    pub fn to_edge(&self) -> Option<Edge> {
        let target = self.target()?.to_string();
        Some(Edge {
            identifier: self.edge_identifier.clone(),
            target,
            filters: self.filters.clone(),
            live: self.live,
            percentage: self.percentage,
            properties: self.properties.clone(),
            version: self.version,
        })
    }

    /// Overwrite every field except the child from an edge record
    pub fn overwrite_from(&mut self, edge: &Edge) {
        self.edge_identifier = edge.identifier.clone();
        self.version = edge.version;
        self.filters = edge.filters.clone();
        self.properties = edge.properties.clone();
        self.live = edge.live;
        self.percentage = edge.percentage;
    }
}
