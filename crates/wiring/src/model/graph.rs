use std::collections::HashMap;

use crate::error::WiringError;
use crate::wires::SolderType;

/// What a vertex of the wiring graph stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VertexKind {
    Scheduler,
    /// A plain function soldered to an output wire.
    Sink,
    Heartbeat,
}

#[derive(Debug)]
struct Vertex {
    name: String,
    kind: VertexKind,
    insertion_is_blocking: bool,
}

#[derive(Debug)]
struct Edge {
    from: usize,
    to: usize,
    label: String,
    solder_type: SolderType,
}

/// Arena of everything soldered together in a model. Only consulted by the
/// start-time sanity checks; forwarding never looks at it.
#[derive(Debug, Default)]
pub(crate) struct WiringGraph {
    vertices: Vec<Vertex>,
    index: HashMap<String, usize>,
    edges: Vec<Edge>,
}

impl WiringGraph {
    pub(crate) fn add_scheduler(
        &mut self,
        name: &str,
        insertion_is_blocking: bool,
    ) -> Result<(), WiringError> {
        if self.index.contains_key(name) {
            return Err(WiringError::DuplicateName(name.to_string()));
        }
        self.push_vertex(name, VertexKind::Scheduler, insertion_is_blocking);
        Ok(())
    }

    pub(crate) fn ensure_vertex(&mut self, name: &str, kind: VertexKind) -> usize {
        match self.index.get(name) {
            Some(&i) => i,
            None => self.push_vertex(name, kind, false),
        }
    }

    fn push_vertex(&mut self, name: &str, kind: VertexKind, insertion_is_blocking: bool) -> usize {
        let i = self.vertices.len();
        self.vertices.push(Vertex {
            name: name.to_string(),
            kind,
            insertion_is_blocking,
        });
        self.index.insert(name.to_string(), i);
        i
    }

    pub(crate) fn add_edge(
        &mut self,
        from: &str,
        from_kind: VertexKind,
        to: &str,
        to_kind: VertexKind,
        label: &str,
        solder_type: SolderType,
    ) {
        let from = self.ensure_vertex(from, from_kind);
        let to = self.ensure_vertex(to, to_kind);
        self.edges.push(Edge {
            from,
            to,
            label: label.to_string(),
            solder_type,
        });
    }

    pub(crate) fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Human-readable edge list, `from -[label/type]-> to`.
    pub(crate) fn describe_edges(&self) -> Vec<String> {
        self.edges
            .iter()
            .map(|e| {
                format!(
                    "{} -[{}/{}]-> {}",
                    self.vertices[e.from].name, e.label, e.solder_type, self.vertices[e.to].name
                )
            })
            .collect()
    }

    /// Groups of schedulers that can block each other in a loop: strongly
    /// connected components of the subgraph made of `PUT` edges between
    /// schedulers whose insertion may block. Each group is sorted by name.
    pub(crate) fn cyclical_backpressure(&self) -> Vec<Vec<String>> {
        let blocking = |i: usize| {
            let v = &self.vertices[i];
            v.kind == VertexKind::Scheduler && v.insertion_is_blocking
        };

        let mut adjacency = vec![Vec::new(); self.vertices.len()];
        let mut self_loop = vec![false; self.vertices.len()];
        for edge in &self.edges {
            if edge.solder_type == SolderType::Put && blocking(edge.from) && blocking(edge.to) {
                adjacency[edge.from].push(edge.to);
                if edge.from == edge.to {
                    self_loop[edge.from] = true;
                }
            }
        }

        let mut tarjan = Tarjan::new(&adjacency);
        for v in 0..self.vertices.len() {
            if tarjan.indices[v].is_none() {
                tarjan.visit(v);
            }
        }

        let mut cycles: Vec<Vec<String>> = tarjan
            .components
            .into_iter()
            .filter(|c| c.len() > 1 || self_loop[c[0]])
            .map(|c| {
                let mut names: Vec<String> =
                    c.into_iter().map(|i| self.vertices[i].name.clone()).collect();
                names.sort();
                names
            })
            .collect();
        cycles.sort();
        cycles
    }
}

// ── Tarjan's strongly connected components ───────────────────────────

struct Tarjan<'a> {
    adjacency: &'a [Vec<usize>],
    next_index: usize,
    indices: Vec<Option<usize>>,
    low_links: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    components: Vec<Vec<usize>>,
}

impl<'a> Tarjan<'a> {
    fn new(adjacency: &'a [Vec<usize>]) -> Self {
        let n = adjacency.len();
        Self {
            adjacency,
            next_index: 0,
            indices: vec![None; n],
            low_links: vec![0; n],
            on_stack: vec![false; n],
            stack: Vec::new(),
            components: Vec::new(),
        }
    }

    fn visit(&mut self, v: usize) {
        self.indices[v] = Some(self.next_index);
        self.low_links[v] = self.next_index;
        self.next_index += 1;
        self.stack.push(v);
        self.on_stack[v] = true;

        let adjacency = self.adjacency;
        for &w in &adjacency[v] {
            match self.indices[w] {
                None => {
                    self.visit(w);
                    self.low_links[v] = self.low_links[v].min(self.low_links[w]);
                }
                Some(index) if self.on_stack[w] => {
                    self.low_links[v] = self.low_links[v].min(index);
                }
                Some(_) => {}
            }
        }

        if Some(self.low_links[v]) == self.indices[v] {
            let mut component = Vec::new();
            while let Some(w) = self.stack.pop() {
                self.on_stack[w] = false;
                component.push(w);
                if w == v {
                    break;
                }
            }
            self.components.push(component);
        }
    }
}
