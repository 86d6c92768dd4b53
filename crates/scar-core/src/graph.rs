use crate::entity::{Arc, Entity, EntityView, Node};
use crate::id::{ArcId, NodeId, VertexId};
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BinaryHeap};
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur during graph operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    #[error("arc endpoint {0:?} is not registered")]
    UnregisteredEndpoint(NodeId),
    #[error("an arc from {origin:?} to {destination:?} already exists")]
    DuplicateArc { origin: NodeId, destination: NodeId },
    #[error("vertex not found: {0:?}")]
    UnknownVertex(VertexId),
    #[error("no path from {origin:?} to {destination:?}")]
    NoPath {
        origin: VertexId,
        destination: VertexId,
    },
    #[error("negative cycle reachable from {0:?}")]
    NegativeCycle(VertexId),
    #[error("no edge from {from:?} to {to:?}")]
    MissingEdge { from: VertexId, to: VertexId },
}

// ---------------------------------------------------------------------------
// Objectives
// ---------------------------------------------------------------------------

/// The routing criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Objective {
    /// Minimise total mean processing time.
    Time,
    /// Maximise total cashflow (minimise total cost).
    Cashflow,
}

/// Weighted adjacency: one map of `destination -> weight` per vertex.
pub type Adjacency = Vec<BTreeMap<VertexId, f64>>;

// ---------------------------------------------------------------------------
// Shortest-path primitive
// ---------------------------------------------------------------------------

/// Finds a minimum-weight path in a weighted directed graph.
pub trait PathFinder {
    /// Return the vertices of a minimum-weight path from `origin` to
    /// `destination`, both included.
    fn shortest_path(
        &self,
        graph: &[BTreeMap<VertexId, f64>],
        origin: VertexId,
        destination: VertexId,
    ) -> Result<Vec<VertexId>, GraphError>;
}

/// Dijkstra that re-expands a vertex whenever its distance improves.
///
/// On graphs with only non-negative weights this is plain Dijkstra. Negative
/// edges (revenue-bearing entities in the cashflow graph) are handled
/// correctly as long as no negative cycle is reachable; a vertex relaxed
/// more than `|V|` times is reported as `NegativeCycle`. Ties resolve to the
/// lower vertex id.
#[derive(Debug, Clone, Copy, Default)]
pub struct LabelCorrectingDijkstra;

#[derive(Debug, Clone, Copy)]
struct Frontier {
    cost: f64,
    vertex: VertexId,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cost
            .total_cmp(&other.cost)
            .then_with(|| self.vertex.cmp(&other.vertex))
    }
}

impl PathFinder for LabelCorrectingDijkstra {
    fn shortest_path(
        &self,
        graph: &[BTreeMap<VertexId, f64>],
        origin: VertexId,
        destination: VertexId,
    ) -> Result<Vec<VertexId>, GraphError> {
        let n = graph.len();
        for v in [origin, destination] {
            if v.index() >= n {
                return Err(GraphError::UnknownVertex(v));
            }
        }

        let mut dist: Vec<Option<f64>> = vec![None; n];
        let mut prev: Vec<Option<VertexId>> = vec![None; n];
        let mut relaxations = vec![0usize; n];
        let mut heap = BinaryHeap::new();

        dist[origin.index()] = Some(0.0);
        heap.push(Reverse(Frontier {
            cost: 0.0,
            vertex: origin,
        }));

        while let Some(Reverse(Frontier { cost, vertex })) = heap.pop() {
            if dist[vertex.index()].is_some_and(|d| cost > d) {
                continue;
            }
            for (&next, &weight) in &graph[vertex.index()] {
                let candidate = cost + weight;
                if dist[next.index()].is_none_or(|d| candidate < d) {
                    relaxations[next.index()] += 1;
                    if relaxations[next.index()] > n {
                        warn!(?origin, ?next, "negative cycle detected while routing");
                        return Err(GraphError::NegativeCycle(origin));
                    }
                    dist[next.index()] = Some(candidate);
                    prev[next.index()] = Some(vertex);
                    heap.push(Reverse(Frontier {
                        cost: candidate,
                        vertex: next,
                    }));
                }
            }
        }

        if dist[destination.index()].is_none() {
            return Err(GraphError::NoPath {
                origin,
                destination,
            });
        }

        let mut path = vec![destination];
        let mut cursor = destination;
        while cursor != origin {
            let Some(p) = prev[cursor.index()] else {
                break;
            };
            path.push(p);
            cursor = p;
            if path.len() > n {
                return Err(GraphError::NegativeCycle(origin));
            }
        }
        path.reverse();
        Ok(path)
    }
}

// ---------------------------------------------------------------------------
// Route reports
// ---------------------------------------------------------------------------

/// One candidate route evaluated under both objectives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteOption {
    pub path: Vec<VertexId>,
    /// Total mean processing time along the path.
    pub time: f64,
    /// Net per-unit cashflow along the path.
    pub cashflow: f64,
}

/// The fastest and the most profitable route between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteOptions {
    pub best_cashflow: RouteOption,
    pub fastest: RouteOption,
}

// ---------------------------------------------------------------------------
// RoutingGraph
// ---------------------------------------------------------------------------

/// Two parallel weighted graphs over the same vertices, kept in sync with
/// live entity parameters.
///
/// Each node contributes the edge `inbound -> outbound`; each arc the edge
/// `origin.outbound -> destination.inbound`. The time graph stores mean
/// processing times. The cost graph stores the *negated* per-unit cashflow
/// of every edge, so minimising it maximises cashflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingGraph {
    time: Adjacency,
    cost: Adjacency,
    /// Resolves `(origin.outbound, destination.inbound)` back to the arc.
    arcs: Vec<BTreeMap<VertexId, ArcId>>,
    next_arc_id: u32,
}

impl RoutingGraph {
    /// Create a new, empty routing graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of vertices (two per node).
    pub fn vertex_count(&self) -> usize {
        self.time.len()
    }

    /// Number of arcs registered so far.
    pub fn arc_count(&self) -> usize {
        self.next_arc_id as usize
    }

    /// Whether `node` was issued by this graph.
    pub fn contains_node(&self, node: NodeId) -> bool {
        node.0 % 2 == 0 && node.outbound().index() < self.vertex_count()
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Assign the node its two vertices and insert its internal edge.
    ///
    /// The caller guarantees the node is not registered yet.
    pub fn register_node(&mut self, node: &mut Node) -> NodeId {
        let id = NodeId(self.vertex_count() as u32);
        node.assign_id(id);
        for table in [&mut self.time, &mut self.cost] {
            table.push(BTreeMap::new());
            table.push(BTreeMap::new());
        }
        self.arcs.push(BTreeMap::new());
        self.arcs.push(BTreeMap::new());
        self.write_node_edges(id, node);
        debug!(node = id.0, "registered node");
        id
    }

    /// Assign the arc an id and insert its edge. Both endpoints must already
    /// be registered, and at most one arc may join an ordered node pair.
    pub fn register_arc(&mut self, arc: &mut Arc) -> Result<ArcId, GraphError> {
        let (origin, destination) = (arc.origin(), arc.destination());
        for endpoint in [origin, destination] {
            if !self.contains_node(endpoint) {
                return Err(GraphError::UnregisteredEndpoint(endpoint));
            }
        }
        if self.arc_between(origin.outbound(), destination.inbound()).is_some() {
            return Err(GraphError::DuplicateArc {
                origin,
                destination,
            });
        }

        let id = ArcId(self.next_arc_id);
        self.next_arc_id += 1;
        arc.assign_id(id);
        self.arcs[origin.outbound().index()].insert(destination.inbound(), id);
        self.write_arc_edges(arc);
        debug!(arc = id.0, from = origin.0, to = destination.0, "registered arc");
        Ok(id)
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Overwrite the edge owned by `entity` from its live parameters.
    ///
    /// This is the only path that changes weights after registration.
    /// Unregistered entities own no edge and are ignored.
    pub fn apply_parameter_change(&mut self, entity: EntityView<'_>) {
        match entity {
            EntityView::Node(node) => {
                if let Some(id) = node.id() {
                    self.write_node_edges(id, node);
                    debug!(node = id.0, "refreshed node weights");
                }
            }
            EntityView::Arc(arc) => {
                if let Some(id) = arc.id() {
                    self.write_arc_edges(arc);
                    debug!(arc = id.0, "refreshed arc weights");
                }
            }
        }
    }

    fn write_node_edges(&mut self, id: NodeId, node: &Node) {
        self.write_edge(id.inbound(), id.outbound(), node);
    }

    fn write_arc_edges(&mut self, arc: &Arc) {
        self.write_edge(arc.origin().outbound(), arc.destination().inbound(), arc);
    }

    fn write_edge(&mut self, from: VertexId, to: VertexId, entity: &dyn Entity) {
        let p = entity.params();
        self.time[from.index()].insert(to, p.avg_time);
        self.cost[from.index()].insert(to, -p.cashflow_per_unit);
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// The adjacency for an objective.
    pub fn adjacency(&self, objective: Objective) -> &[BTreeMap<VertexId, f64>] {
        match objective {
            Objective::Time => &self.time,
            Objective::Cashflow => &self.cost,
        }
    }

    /// Raw stored weight of the edge `from -> to`.
    pub fn weight(&self, from: VertexId, to: VertexId, objective: Objective) -> Option<f64> {
        self.adjacency(objective)
            .get(from.index())
            .and_then(|edges| edges.get(&to))
            .copied()
    }

    /// The arc joining an outbound vertex to an inbound vertex.
    pub fn arc_between(&self, from: VertexId, to: VertexId) -> Option<ArcId> {
        self.arcs
            .get(from.index())
            .and_then(|targets| targets.get(&to))
            .copied()
    }

    /// Minimum-weight vertex path from `origin`'s inbound vertex to
    /// `destination`'s inbound vertex using the default path finder.
    pub fn shortest_path(
        &self,
        origin: NodeId,
        destination: NodeId,
        objective: Objective,
    ) -> Result<Vec<VertexId>, GraphError> {
        self.shortest_path_with(&LabelCorrectingDijkstra, origin, destination, objective)
    }

    /// Same as [`shortest_path`](Self::shortest_path) with a caller-supplied
    /// path finder.
    pub fn shortest_path_with(
        &self,
        finder: &dyn PathFinder,
        origin: NodeId,
        destination: NodeId,
        objective: Objective,
    ) -> Result<Vec<VertexId>, GraphError> {
        for node in [origin, destination] {
            if !self.contains_node(node) {
                return Err(GraphError::UnknownVertex(node.inbound()));
            }
        }
        finder.shortest_path(
            self.adjacency(objective),
            origin.inbound(),
            destination.inbound(),
        )
    }

    /// Sum of edge weights along `path`, in objective terms: total time for
    /// [`Objective::Time`], net cashflow for [`Objective::Cashflow`].
    pub fn path_weight(&self, path: &[VertexId], objective: Objective) -> Result<f64, GraphError> {
        let mut total = 0.0;
        for hop in path.windows(2) {
            let (from, to) = (hop[0], hop[1]);
            total += self
                .weight(from, to, objective)
                .ok_or(GraphError::MissingEdge { from, to })?;
        }
        Ok(match objective {
            Objective::Time => total,
            Objective::Cashflow => -total,
        })
    }

    /// The most profitable and the fastest route, each evaluated under both
    /// objectives.
    pub fn route_options(
        &self,
        origin: NodeId,
        destination: NodeId,
    ) -> Result<RouteOptions, GraphError> {
        let evaluate = |objective| -> Result<RouteOption, GraphError> {
            let path = self.shortest_path(origin, destination, objective)?;
            Ok(RouteOption {
                time: self.path_weight(&path, Objective::Time)?,
                cashflow: self.path_weight(&path, Objective::Cashflow)?,
                path,
            })
        };
        Ok(RouteOptions {
            best_cashflow: evaluate(Objective::Cashflow)?,
            fastest: evaluate(Objective::Time)?,
        })
    }

    /// Iterate every edge as `(from, to, time, cost)` in vertex order.
    pub fn edges(&self) -> impl Iterator<Item = (VertexId, VertexId, f64, f64)> + '_ {
        self.time.iter().enumerate().flat_map(move |(i, targets)| {
            targets.iter().map(move |(&to, &time)| {
                let from = VertexId(i as u32);
                let cost = self.cost[i].get(&to).copied().unwrap_or(0.0);
                (from, to, time, cost)
            })
        })
    }
}
