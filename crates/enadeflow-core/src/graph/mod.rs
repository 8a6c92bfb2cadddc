//! Dependency graph: the validated DAG of task specs for one run.
//!
//! Design:
//! - The builder collects tasks and edges, then `build()` validates everything
//!   in one pass: duplicate ids, dangling edge endpoints, undeclared or
//!   doubly-bound inputs, and cycles (Kahn's algorithm). Nothing executes
//!   before a graph exists, so a malformed pipeline can never start.
//! - Adjacency is kept as parent lists per task (who must I wait for), which
//!   is the only direction the executor queries.

pub mod retry;
pub mod run_state;
pub mod spec;

pub use retry::RetryPolicy;
pub use run_state::{RunState, TaskRecord};
pub use spec::{Edge, EdgeKind, Precondition, TaskInputs, TaskKind, TaskRun, TaskSpec};

use std::collections::{HashMap, HashSet, VecDeque};

use crate::domain::TaskId;
use crate::error::PipelineError;

/// A validated DAG of tasks.
pub struct Graph {
    tasks: HashMap<TaskId, TaskSpec>,

    /// Insertion order, for deterministic iteration and dispatch.
    order: Vec<TaskId>,

    /// DATA parents: task -> (producer, input name it binds).
    data_parents: HashMap<TaskId, Vec<(TaskId, String)>>,

    /// ORDER_ONLY parents: task -> tasks that must be terminal first.
    order_parents: HashMap<TaskId, Vec<TaskId>>,
}

impl Graph {
    pub fn builder() -> GraphBuilder {
        GraphBuilder::new()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn task(&self, id: &TaskId) -> Option<&TaskSpec> {
        self.tasks.get(id)
    }

    /// Task ids in insertion order.
    pub fn task_ids(&self) -> impl Iterator<Item = &TaskId> {
        self.order.iter()
    }

    pub fn data_parents(&self, id: &TaskId) -> &[(TaskId, String)] {
        self.data_parents.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn order_parents(&self, id: &TaskId) -> &[TaskId] {
        self.order_parents.get(id).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("tasks", &self.order)
            .finish()
    }
}

/// Collects tasks and edges; all validation happens in [`GraphBuilder::build`].
#[derive(Default)]
pub struct GraphBuilder {
    tasks: Vec<TaskSpec>,
    edges: Vec<Edge>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task(mut self, task: TaskSpec) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn edge(mut self, edge: Edge) -> Self {
        self.edges.push(edge);
        self
    }

    pub fn build(self) -> Result<Graph, PipelineError> {
        let mut tasks = HashMap::new();
        let mut order = Vec::with_capacity(self.tasks.len());
        for task in self.tasks {
            if tasks.contains_key(&task.id) {
                return Err(PipelineError::Graph(format!("duplicate task id {}", task.id)));
            }
            order.push(task.id.clone());
            tasks.insert(task.id.clone(), task);
        }

        let mut data_parents: HashMap<TaskId, Vec<(TaskId, String)>> = HashMap::new();
        let mut order_parents: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
        let mut bound: HashSet<(TaskId, String)> = HashSet::new();

        for edge in &self.edges {
            for endpoint in [&edge.from, &edge.to] {
                if !tasks.contains_key(endpoint) {
                    return Err(PipelineError::Graph(format!(
                        "edge {} -> {} references unknown task {endpoint}",
                        edge.from, edge.to
                    )));
                }
            }
            match &edge.kind {
                EdgeKind::Data { input } => {
                    let target = &tasks[&edge.to];
                    if !target.inputs.iter().any(|i| i == input) {
                        return Err(PipelineError::Graph(format!(
                            "task {} does not declare input {input:?} bound by edge from {}",
                            edge.to, edge.from
                        )));
                    }
                    if !bound.insert((edge.to.clone(), input.clone())) {
                        return Err(PipelineError::Graph(format!(
                            "input {input:?} of task {} is bound twice",
                            edge.to
                        )));
                    }
                    data_parents
                        .entry(edge.to.clone())
                        .or_default()
                        .push((edge.from.clone(), input.clone()));
                }
                EdgeKind::OrderOnly => {
                    order_parents
                        .entry(edge.to.clone())
                        .or_default()
                        .push(edge.from.clone());
                }
            }
        }

        detect_cycle(&order, &self.edges)?;

        Ok(Graph {
            tasks,
            order,
            data_parents,
            order_parents,
        })
    }
}

/// Kahn's algorithm: peel zero-indegree tasks; anything left sits on a cycle.
fn detect_cycle(order: &[TaskId], edges: &[Edge]) -> Result<(), PipelineError> {
    let mut indegree: HashMap<&TaskId, usize> = order.iter().map(|id| (id, 0)).collect();
    let mut children: HashMap<&TaskId, Vec<&TaskId>> = HashMap::new();
    for edge in edges {
        *indegree.entry(&edge.to).or_default() += 1;
        children.entry(&edge.from).or_default().push(&edge.to);
    }

    let mut ready: VecDeque<&TaskId> = order
        .iter()
        .filter(|id| indegree[*id] == 0)
        .collect();
    let mut seen = 0usize;
    while let Some(id) = ready.pop_front() {
        seen += 1;
        for &child in children.get(id).into_iter().flatten() {
            let degree = indegree
                .get_mut(child)
                .expect("edge endpoints are validated before cycle detection");
            *degree -= 1;
            if *degree == 0 {
                ready.push_back(child);
            }
        }
    }

    if seen < order.len() {
        let mut stuck: Vec<&str> = order
            .iter()
            .filter(|id| indegree[*id] > 0)
            .map(TaskId::as_str)
            .collect();
        stuck.sort_unstable();
        return Err(PipelineError::Graph(format!(
            "dependency cycle involving tasks: {}",
            stuck.join(", ")
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskValue;
    use async_trait::async_trait;

    struct Noop;

    #[async_trait]
    impl TaskRun for Noop {
        async fn run(&self, _inputs: &TaskInputs) -> Result<TaskValue, PipelineError> {
            Ok(TaskValue::Unit)
        }
    }

    fn pure(id: &str) -> TaskSpec {
        TaskSpec::pure(id, Noop)
    }

    fn graph_err(result: Result<Graph, PipelineError>) -> String {
        match result {
            Err(PipelineError::Graph(msg)) => msg,
            Err(other) => panic!("expected graph error, got {other}"),
            Ok(_) => panic!("expected graph error, got a graph"),
        }
    }

    #[test]
    fn linear_chain_builds() {
        let graph = Graph::builder()
            .task(pure("a"))
            .task(pure("b").with_inputs(&["x"]))
            .edge(Edge::data("a", "b", "x"))
            .build()
            .unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.data_parents(&TaskId::new("b")).len(), 1);
        assert!(graph.data_parents(&TaskId::new("a")).is_empty());
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        // a -> b -> d, a -> c -> d
        let graph = Graph::builder()
            .task(pure("a"))
            .task(pure("b").with_inputs(&["in"]))
            .task(pure("c").with_inputs(&["in"]))
            .task(pure("d").with_inputs(&["left", "right"]))
            .edge(Edge::data("a", "b", "in"))
            .edge(Edge::data("a", "c", "in"))
            .edge(Edge::data("b", "d", "left"))
            .edge(Edge::data("c", "d", "right"))
            .build();
        assert!(graph.is_ok());
    }

    #[test]
    fn cycle_fails_before_execution() {
        let msg = graph_err(
            Graph::builder()
                .task(pure("a").with_inputs(&["x"]))
                .task(pure("b").with_inputs(&["y"]))
                .edge(Edge::data("a", "b", "y"))
                .edge(Edge::data("b", "a", "x"))
                .build(),
        );
        assert!(msg.contains("cycle"), "unexpected message: {msg}");
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let msg = graph_err(
            Graph::builder()
                .task(pure("a"))
                .edge(Edge::order_only("a", "a"))
                .build(),
        );
        assert!(msg.contains("cycle"));
    }

    #[test]
    fn order_only_edges_participate_in_cycle_detection() {
        let msg = graph_err(
            Graph::builder()
                .task(pure("a"))
                .task(pure("b"))
                .edge(Edge::order_only("a", "b"))
                .edge(Edge::order_only("b", "a"))
                .build(),
        );
        assert!(msg.contains("cycle"));
    }

    #[test]
    fn unknown_edge_endpoint_is_rejected() {
        let msg = graph_err(
            Graph::builder()
                .task(pure("a"))
                .edge(Edge::order_only("a", "ghost"))
                .build(),
        );
        assert!(msg.contains("ghost"));
    }

    #[test]
    fn undeclared_input_is_rejected() {
        let msg = graph_err(
            Graph::builder()
                .task(pure("a"))
                .task(pure("b"))
                .edge(Edge::data("a", "b", "x"))
                .build(),
        );
        assert!(msg.contains("does not declare"));
    }

    #[test]
    fn doubly_bound_input_is_rejected() {
        let msg = graph_err(
            Graph::builder()
                .task(pure("a"))
                .task(pure("b"))
                .task(pure("c").with_inputs(&["x"]))
                .edge(Edge::data("a", "c", "x"))
                .edge(Edge::data("b", "c", "x"))
                .build(),
        );
        assert!(msg.contains("bound twice"));
    }

    #[test]
    fn duplicate_task_id_is_rejected() {
        let msg = graph_err(Graph::builder().task(pure("a")).task(pure("a")).build());
        assert!(msg.contains("duplicate"));
    }

    #[test]
    fn task_ids_keep_insertion_order() {
        let graph = Graph::builder()
            .task(pure("z"))
            .task(pure("a"))
            .task(pure("m"))
            .build()
            .unwrap();
        let ids: Vec<&str> = graph.task_ids().map(TaskId::as_str).collect();
        assert_eq!(ids, vec!["z", "a", "m"]);
    }
}
