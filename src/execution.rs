use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    error::{ColonyError, Result},
    graph::{Graph, Node, ROOT},
    task::{Context, DepthFirst, LongRunning, Resolver, Task, Unit},
};

/// What a finished worker reports to the coordinator.
#[derive(Debug)]
enum Outcome {
    /// Every requested target completed.
    Finished,
    Failed(ColonyError),
}

impl Outcome {
    fn into_result(self) -> Result<()> {
        match self {
            Outcome::Finished => Ok(()),
            Outcome::Failed(err) => Err(err),
        }
    }
}

/// How a node's worker exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Completion {
    Succeeded,
    Failed,
    /// Exited without running its task: cancelled, or a dependency did not
    /// succeed.
    Skipped,
}

/// One-shot completion signal of a node.
struct DoneSignal {
    tx: watch::Sender<Option<Completion>>,
}

impl DoneSignal {
    fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Fires the signal. Only the first call has any effect.
    fn fire(&self, completion: Completion) {
        self.tx.send_if_modified(|state| {
            if state.is_some() {
                return false;
            }
            *state = Some(completion);
            true
        });
    }

    async fn wait(&self) -> Completion {
        let mut rx = self.tx.subscribe();
        match rx.wait_for(Option::is_some).await {
            Ok(state) => (*state).unwrap_or(Completion::Skipped),
            Err(_) => Completion::Skipped,
        }
    }
}

/// Per-node state for a single run.
struct Record {
    name: String,
    token: CancellationToken,
    teardown: Option<Arc<dyn LongRunning>>,
    cancelled: AtomicBool,
    done: DoneSignal,
}

impl Record {
    fn new(node: &Node) -> Self {
        Self {
            name: node.name.clone(),
            token: CancellationToken::new(),
            teardown: node.unit.teardown(),
            cancelled: AtomicBool::new(false),
            done: DoneSignal::new(),
        }
    }

    /// Runs the teardown of a long-running task, then cancels the context.
    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(task) = &self.teardown {
            debug!(task = %self.name, "tearing down");
            task.teardown();
        }
        self.token.cancel();
    }
}

/// Records of a run, in resolved order.
type Records = Arc<Vec<Arc<Record>>>;

/// Fires the done-signal when a worker exits. A worker that unwinds without
/// settling its outcome is reported as panicked.
struct DoneGuard {
    record: Arc<Record>,
    results: mpsc::UnboundedSender<Outcome>,
    settled: bool,
}

impl DoneGuard {
    fn settle(mut self, completion: Completion) {
        self.settled = true;
        self.record.done.fire(completion);
    }
}

impl Drop for DoneGuard {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let _ = self.results.send(Outcome::Failed(ColonyError::Panicked {
            task: self.record.name.clone(),
        }));
        self.record.done.fire(Completion::Failed);
    }
}

/// Registers tasks and runs them in dependency order.
pub struct Runner {
    graph: Graph,
    resolver: Box<dyn Resolver>,
    /// A registration that was refused, reported by the next resolve.
    rejected: Option<String>,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    pub fn new() -> Self {
        Self {
            graph: Graph::new(),
            resolver: Box::new(DepthFirst),
            rejected: None,
        }
    }

    pub fn with_resolver(mut self, resolver: impl Resolver + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    pub fn task(&mut self, name: &str, task: impl Task + 'static, deps: &[&str]) -> &mut Self {
        self.register(name, Unit::Plain(Arc::new(task)), deps)
    }

    /// Registers a task whose teardown runs whenever the run ends.
    pub fn long_task(
        &mut self,
        name: &str,
        task: impl LongRunning + 'static,
        deps: &[&str],
    ) -> &mut Self {
        self.register(name, Unit::LongRunning(Arc::new(task)), deps)
    }

    /// Adds a task to the graph. An empty name is reserved for the root and
    /// makes the next `resolve` or `start` fail.
    pub fn register(&mut self, name: &str, unit: Unit, deps: &[&str]) -> &mut Self {
        if name == ROOT {
            warn!("refusing to register a task with an empty name");
            self.rejected = Some("Task names must not be empty".to_string());
            return self;
        }
        let deps = deps.iter().map(|d| d.to_string()).collect();
        self.graph.insert(Node::new(name, unit, deps));
        self
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// The order `start` would run `targets` in, ending with the root.
    pub fn resolve(&mut self, targets: &[&str]) -> Result<Vec<String>> {
        if let Some(reason) = &self.rejected {
            return Err(ColonyError::Config(reason.clone()));
        }
        let root = Node::root(targets);
        self.graph.insert(root.clone());
        let mut resolved = self.resolver.resolve(&root, &mut self.graph)?;
        if !resolved.iter().any(|name| name == ROOT) {
            resolved.push(ROOT.to_string());
        }
        self.check_order(&resolved)?;
        Ok(resolved)
    }

    /// Every name must be registered, appear once, and come after all of
    /// its dependencies.
    fn check_order(&self, resolved: &[String]) -> Result<()> {
        let mut seen: HashSet<&str> = HashSet::with_capacity(resolved.len());
        for name in resolved {
            let node = self.node(name)?;
            if let Some(dep) = node.deps.iter().find(|dep| !seen.contains(dep.as_str())) {
                return Err(ColonyError::DependencyNotFound {
                    task: name.clone(),
                    dependency: dep.clone(),
                });
            }
            if !seen.insert(name.as_str()) {
                return Err(ColonyError::DuplicateTask { task: name.clone() });
            }
        }
        Ok(())
    }

    /// Runs `targets` and everything they depend on.
    ///
    /// Returns the first error any task reported, after every started task
    /// has been cancelled in reverse order.
    pub async fn start(&mut self, targets: &[&str]) -> Result<()> {
        let resolved = self.resolve(targets)?;

        let mut by_name: HashMap<&str, Arc<Record>> = HashMap::with_capacity(resolved.len());
        let mut workers = Vec::with_capacity(resolved.len());
        for name in &resolved {
            let node = self.node(name)?;
            let deps = node
                .deps
                .iter()
                .map(|dep| {
                    by_name.get(dep.as_str()).cloned().ok_or_else(|| {
                        ColonyError::DependencyNotFound {
                            task: name.clone(),
                            dependency: dep.clone(),
                        }
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            let record = Arc::new(Record::new(node));
            by_name.insert(name.as_str(), Arc::clone(&record));
            workers.push((node.clone(), record, deps));
        }
        let root = by_name
            .get(ROOT)
            .cloned()
            .ok_or_else(|| ColonyError::Config("Run order has no root".to_string()))?;

        let records: Records = Arc::new(workers.iter().map(|(_, r, _)| Arc::clone(r)).collect());
        let (tx, rx) = mpsc::unbounded_channel();
        for (node, record, deps) in workers {
            tokio::spawn(work(node, record, deps, tx.clone()));
        }
        drop(tx);

        clean(records, root, rx).await
    }

    fn node(&self, name: &str) -> Result<&Node> {
        self.graph
            .get(name)
            .ok_or_else(|| ColonyError::DependencyNotFound {
                task: ROOT.to_string(),
                dependency: name.to_string(),
            })
    }
}

async fn work(
    node: Node,
    record: Arc<Record>,
    deps: Vec<Arc<Record>>,
    results: mpsc::UnboundedSender<Outcome>,
) {
    let guard = DoneGuard {
        record: Arc::clone(&record),
        results: results.clone(),
        settled: false,
    };

    for dep in &deps {
        tokio::select! {
            biased;
            _ = record.token.cancelled() => {
                debug!(task = %node.name, "cancelled while waiting for dependencies");
                return guard.settle(Completion::Skipped);
            }
            completion = dep.done.wait() => {
                if completion != Completion::Succeeded {
                    debug!(task = %node.name, dependency = %dep.name, "dependency did not succeed, skipping");
                    return guard.settle(Completion::Skipped);
                }
            }
        }
    }

    if record.token.is_cancelled() {
        return guard.settle(Completion::Skipped);
    }

    if !node.is_root() {
        debug!(task = %node.name, "starting");
    }

    match node.unit.start(Context::new(record.token.clone())).await {
        Ok(()) => {
            if node.is_root() {
                let _ = results.send(Outcome::Finished);
            } else {
                debug!(task = %node.name, "finished");
            }
            guard.settle(Completion::Succeeded);
        }
        Err(source) => {
            if record.token.is_cancelled() {
                debug!(task = %node.name, error = %source, "task failed after cancellation");
            } else {
                warn!(task = %node.name, error = %source, "task failed");
            }
            let _ = results.send(Outcome::Failed(ColonyError::Task {
                task: node.name.clone(),
                source,
            }));
            guard.settle(Completion::Failed);
        }
    }
}

enum State {
    Idle,
    Sweeping {
        outcome: Outcome,
        sweep: JoinHandle<()>,
    },
}

/// Waits for the first outcome, tears everything down once, and returns it.
async fn clean(
    records: Records,
    root: Arc<Record>,
    mut results: mpsc::UnboundedReceiver<Outcome>,
) -> Result<()> {
    let mut state = State::Idle;

    loop {
        state = match state {
            State::Idle => tokio::select! {
                biased;
                Some(outcome) = results.recv() => {
                    if let Outcome::Failed(err) = &outcome {
                        debug!(error = %err, "first failure, cleaning up");
                    }
                    let sweep = tokio::spawn(sweep(Arc::clone(&records)));
                    State::Sweeping { outcome, sweep }
                }
                _ = root.done.wait() => {
                    info!("run completed");
                    return Ok(());
                }
            },
            State::Sweeping { outcome, sweep } => {
                if let Err(err) = sweep.await {
                    warn!(error = %err, "cleanup did not finish");
                }
                while let Ok(Outcome::Failed(err)) = results.try_recv() {
                    debug!(error = %err, "discarding error reported during cleanup");
                }
                if matches!(outcome, Outcome::Finished) {
                    info!("run completed");
                }
                return outcome.into_result();
            }
        };
    }
}

/// Cancels every node in reverse order, one at a time, waiting for each to
/// exit before moving on to its dependencies.
async fn sweep(records: Records) {
    for record in records.iter().rev() {
        record.cancel();
        record.done.wait().await;
    }
    debug!("cleanup finished");
}
