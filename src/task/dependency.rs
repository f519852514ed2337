use std::{collections::HashSet, sync::Arc};

use tracing::debug;

use super::Unit;
use crate::{
    builtin::Interrupt,
    error::{ColonyError, Result},
    graph::{Graph, Node},
};

/// Computes the order a run executes in.
///
/// Implementations must place every name after all of its transitive
/// dependencies, list each name once, and fail with
/// [`ColonyError::DependencyNotFound`] or [`ColonyError::CircularDependency`]
/// before anything runs.
pub trait Resolver: Send + Sync {
    fn resolve(&self, root: &Node, graph: &mut Graph) -> Result<Vec<String>>;
}

impl<F> Resolver for F
where
    F: Fn(&Node, &mut Graph) -> Result<Vec<String>> + Send + Sync,
{
    fn resolve(&self, root: &Node, graph: &mut Graph) -> Result<Vec<String>> {
        self(root, graph)
    }
}

/// The default resolver, see [`resolve`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DepthFirst;

impl Resolver for DepthFirst {
    fn resolve(&self, root: &Node, graph: &mut Graph) -> Result<Vec<String>> {
        resolve(root, graph)
    }
}

/// Linearizes the closure of `root`'s dependencies, depth first, keeping
/// declared dependency order. `root` itself comes last.
pub fn resolve(root: &Node, graph: &Graph) -> Result<Vec<String>> {
    let mut resolution = Resolution::default();
    resolution.visit(root, graph)?;
    debug!(order = ?resolution.resolved, "resolved dependencies");
    Ok(resolution.resolved)
}

#[derive(Default)]
struct Resolution {
    seen: HashSet<String>,
    done: HashSet<String>,
    path: Vec<String>,
    resolved: Vec<String>,
}

impl Resolution {
    fn visit(&mut self, node: &Node, graph: &Graph) -> Result<()> {
        self.seen.insert(node.name.clone());
        self.path.push(node.name.clone());

        for dep in &node.deps {
            if self.done.contains(dep) {
                continue;
            }

            if self.seen.contains(dep) {
                let start = self.path.iter().position(|name| name == dep).unwrap_or(0);
                let mut path = self.path[start..].to_vec();
                path.push(dep.clone());
                return Err(ColonyError::CircularDependency { path });
            }

            let Some(dep_node) = graph.get(dep) else {
                return Err(ColonyError::DependencyNotFound {
                    task: node.name.clone(),
                    dependency: dep.clone(),
                });
            };

            self.visit(dep_node, graph)?;
        }

        self.path.pop();
        self.done.insert(node.name.clone());
        self.resolved.push(node.name.clone());
        Ok(())
    }
}

/// Wraps another resolver so that every run also listens for an interrupt.
///
/// The listener is registered under `name` and placed first in the order,
/// so an interrupt flows through the same cleanup as a task failure.
pub struct WithInterrupt<R = DepthFirst> {
    inner: R,
    name: String,
    listener: Arc<Interrupt>,
}

impl WithInterrupt<DepthFirst> {
    /// Listens for Ctrl-C.
    pub fn new() -> Self {
        Self::with_listener(DepthFirst, Interrupt::ctrl_c())
    }
}

impl Default for WithInterrupt<DepthFirst> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Resolver> WithInterrupt<R> {
    pub fn with_listener(inner: R, listener: Interrupt) -> Self {
        Self {
            inner,
            name: "interrupt".to_string(),
            listener: Arc::new(listener),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Whether `node` is the listener a previous resolve inserted.
    fn is_listener(&self, node: &Node) -> bool {
        match &node.unit {
            Unit::Plain(task) => {
                Arc::as_ptr(task) as *const () == Arc::as_ptr(&self.listener) as *const ()
            }
            Unit::LongRunning(_) => false,
        }
    }
}

impl<R: Resolver> Resolver for WithInterrupt<R> {
    fn resolve(&self, root: &Node, graph: &mut Graph) -> Result<Vec<String>> {
        if let Some(node) = graph.get(&self.name) {
            if !self.is_listener(node) {
                return Err(ColonyError::Config(format!(
                    "Task '{}' clashes with the interrupt listener",
                    self.name
                )));
            }
        }
        graph.insert(Node::new(
            self.name.clone(),
            Unit::Plain(self.listener.clone()),
            Vec::new(),
        ));

        let mut resolved = self.inner.resolve(root, graph)?;
        resolved.retain(|name| name != &self.name);
        resolved.insert(0, self.name.clone());
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::noop;

    fn node(name: &str, deps: &[&str]) -> Node {
        Node::new(
            name,
            Unit::Plain(Arc::new(noop())),
            deps.iter().map(|d| d.to_string()).collect(),
        )
    }

    fn graph(nodes: &[(&str, &[&str])]) -> Graph {
        let mut graph = Graph::new();
        for (name, deps) in nodes {
            graph.insert(node(name, deps));
        }
        graph
    }

    fn position(order: &[String], name: &str) -> usize {
        order.iter().position(|n| n == name).unwrap()
    }

    #[test]
    fn orders_dependencies_first() {
        let graph = graph(&[
            ("world", &["bar", "foo"]),
            ("foo", &[]),
            ("bar", &["foo"]),
        ]);

        let order = resolve(&Node::root(&["world"]), &graph).unwrap();
        assert_eq!(order, vec!["foo", "bar", "world", ""]);
    }

    #[test]
    fn every_dependency_precedes_its_dependent() {
        let nodes: &[(&str, &[&str])] = &[
            ("a", &[]),
            ("b", &["a"]),
            ("c", &["a"]),
            ("d", &["b", "c"]),
            ("e", &["d", "a"]),
            ("f", &["c"]),
        ];
        let graph = graph(nodes);

        let order = resolve(&Node::root(&["e", "f"]), &graph).unwrap();

        for (name, deps) in nodes {
            for dep in *deps {
                assert!(position(&order, dep) < position(&order, name));
            }
        }
        let unique: HashSet<&String> = order.iter().collect();
        assert_eq!(unique.len(), order.len());
    }

    #[test]
    fn only_resolves_requested_closure() {
        let graph = graph(&[("a", &[]), ("b", &["a"]), ("other", &[])]);

        let order = resolve(&Node::root(&["b"]), &graph).unwrap();
        assert_eq!(order, vec!["a", "b", ""]);
    }

    #[test]
    fn missing_dependency() {
        let graph = graph(&[("baz", &["quz"])]);

        let err = resolve(&Node::root(&["baz"]), &graph).unwrap_err();
        match err {
            ColonyError::DependencyNotFound { task, dependency } => {
                assert_eq!(task, "baz");
                assert_eq!(dependency, "quz");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_target() {
        let graph = graph(&[("a", &[])]);

        let err = resolve(&Node::root(&["nope"]), &graph).unwrap_err();
        assert!(matches!(err, ColonyError::DependencyNotFound { .. }));
    }

    #[test]
    fn mutual_dependency_is_circular() {
        let graph = graph(&[("foo", &["bar"]), ("bar", &["foo"])]);

        let err = resolve(&Node::root(&["bar"]), &graph).unwrap_err();
        match err {
            ColonyError::CircularDependency { path } => {
                assert_eq!(path, vec!["bar", "foo", "bar"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn self_dependency_is_circular() {
        let graph = graph(&[("loop", &["loop"])]);

        let err = resolve(&Node::root(&["loop"]), &graph).unwrap_err();
        assert!(matches!(err, ColonyError::CircularDependency { .. }));
    }

    #[test]
    fn diamond_is_not_circular() {
        let graph = graph(&[
            ("top", &["left", "right"]),
            ("left", &["base"]),
            ("right", &["base"]),
            ("base", &[]),
        ]);

        let order = resolve(&Node::root(&["top"]), &graph).unwrap();
        assert_eq!(order, vec!["base", "left", "right", "top", ""]);
    }

    #[test]
    fn resolution_is_deterministic() {
        let graph = graph(&[("c", &["a", "b"]), ("b", &["a"]), ("a", &[])]);
        let root = Node::root(&["c", "b"]);

        assert_eq!(
            resolve(&root, &graph).unwrap(),
            resolve(&root, &graph).unwrap()
        );
    }

    #[test]
    fn interrupt_listener_runs_first() {
        let mut graph = graph(&[("a", &[]), ("b", &["a"])]);
        let resolver = WithInterrupt::new().named("abort");

        let order = resolver.resolve(&Node::root(&["b"]), &mut graph).unwrap();
        assert_eq!(order, vec!["abort", "a", "b", ""]);
        assert!(graph.contains("abort"));
    }

    #[test]
    fn interrupt_listener_is_reinserted_on_every_resolve() {
        let mut graph = graph(&[("a", &[])]);
        let resolver = WithInterrupt::new();

        let first = resolver.resolve(&Node::root(&["a"]), &mut graph).unwrap();
        let second = resolver.resolve(&Node::root(&["a"]), &mut graph).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn task_named_like_the_listener_is_rejected() {
        let mut graph = graph(&[("interrupt", &[]), ("build", &["interrupt"])]);
        let resolver = WithInterrupt::new();

        let err = resolver
            .resolve(&Node::root(&["build"]), &mut graph)
            .unwrap_err();
        assert!(matches!(err, ColonyError::Config(ref msg) if msg.contains("interrupt")));
        assert!(!resolver.is_listener(graph.get("interrupt").unwrap()));
    }

    #[test]
    fn closures_are_resolvers() {
        let mut graph = graph(&[("a", &[])]);
        let resolver = |root: &Node, graph: &mut Graph| -> Result<Vec<String>> {
            let mut order = resolve(root, graph)?;
            order.insert(0, "extra".to_string());
            Ok(order)
        };

        let order = resolver.resolve(&Node::root(&["a"]), &mut graph).unwrap();
        assert_eq!(order, vec!["extra", "a", ""]);
    }
}
