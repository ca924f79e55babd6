//! Threaded element and node loops.
//!
//! A loop is described by an implementation of [`ThreadedElementLoop`] or
//! [`ThreadedNodeLoop`]: a set of hooks called by the [`LoopDriver`] while it walks a
//! [`StoredRange`]. The driver splits the range recursively until the pieces are no larger
//! than the grain size, runs each piece in its own execution context on the thread pool and
//! joins sibling contexts pairwise as they finish.
//!
//! Per piece the hooks are called in this order:
//!
//! - `pre` once,
//! - for each entity, in range order, while the loop should keep going:
//!   - `pre_element`/`pre_node`, which may skip the entity,
//!   - `subdomain_changed` if the entity's subdomain (or, for nodes, set of subdomains)
//!     differs from the previous entity processed by this context,
//!   - `on_element`/`on_node`,
//!   - `on_boundary` once per `(side, boundary id)` of the element, or `on_boundary_node`
//!     once per boundary id of the node,
//!   - `post_element`/`post_node`,
//! - `post` once.
//!
//! An error returned by any per-entity hook is recorded in the context and aborts the
//! processing of that entity only: later hooks for the entity (in particular the scatter
//! in `post_element`) are not called, and the context moves on to the next entity. Once all
//! contexts have been joined, the recorded failures surface as a single
//! [`LoopError::ComputationFailed`].
use crate::config::{FailurePolicy, LoopConfig};
use crate::error::{FailureLog, LoopError};
use crate::mesh::{ElementHandle, MeshTopology, NodeHandle};
use crate::reduction::Reduce;
use crate::{BoundaryId, StoredRange, SubdomainId};
use log::{debug, trace, warn};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};

/// Hooks of a loop over elements.
///
/// The implementing type holds everything shared by all contexts (read-only inputs and
/// synchronized outputs). Mutable scratch data lives in [`Context`](Self::Context), which
/// is created for every piece of the split range and owned by exactly one thread.
pub trait ThreadedElementLoop: Sync {
    type Context: Send;

    /// Creates the context of a new piece of the range.
    fn create_context(&self) -> Self::Context;

    fn pre(&self, _ctx: &mut Self::Context) {}

    /// Returns `false` to skip the element.
    fn pre_element(&self, _ctx: &mut Self::Context, _element: ElementHandle) -> bool {
        true
    }

    fn subdomain_changed(&self, _ctx: &mut Self::Context, _subdomain: SubdomainId) -> eyre::Result<()> {
        Ok(())
    }

    fn on_element(&self, ctx: &mut Self::Context, element: ElementHandle) -> eyre::Result<()>;

    fn on_boundary(
        &self,
        _ctx: &mut Self::Context,
        _element: ElementHandle,
        _side: usize,
        _boundary: BoundaryId,
    ) -> eyre::Result<()> {
        Ok(())
    }

    fn post_element(&self, _ctx: &mut Self::Context, _element: ElementHandle) -> eyre::Result<()> {
        Ok(())
    }

    fn post(&self, _ctx: &mut Self::Context) {}

    /// Merges the context of a sibling piece. Must be associative and commutative.
    fn join(&self, _ctx: &mut Self::Context, _other: Self::Context) {}

    /// Checked before each element. Returning `false` stops this context early.
    fn keep_going(&self, _ctx: &Self::Context) -> bool {
        true
    }
}

/// Hooks of a loop over nodes. See [`ThreadedElementLoop`].
pub trait ThreadedNodeLoop: Sync {
    type Context: Send;

    fn create_context(&self) -> Self::Context;

    fn pre(&self, _ctx: &mut Self::Context) {}

    fn pre_node(&self, _ctx: &mut Self::Context, _node: NodeHandle) -> bool {
        true
    }

    /// Called when the set of subdomains adjacent to the node differs from the previous node.
    fn subdomain_changed(&self, _ctx: &mut Self::Context, _subdomains: &[SubdomainId]) -> eyre::Result<()> {
        Ok(())
    }

    fn on_node(&self, ctx: &mut Self::Context, node: NodeHandle) -> eyre::Result<()>;

    fn on_boundary_node(&self, _ctx: &mut Self::Context, _node: NodeHandle, _boundary: BoundaryId) -> eyre::Result<()> {
        Ok(())
    }

    fn post_node(&self, _ctx: &mut Self::Context, _node: NodeHandle) -> eyre::Result<()> {
        Ok(())
    }

    fn post(&self, _ctx: &mut Self::Context) {}

    fn join(&self, _ctx: &mut Self::Context, _other: Self::Context) {}

    fn keep_going(&self, _ctx: &Self::Context) -> bool {
        true
    }
}

/// The joined result of a loop execution.
#[derive(Debug)]
pub struct LoopOutcome<C> {
    pub context: C,
    /// Number of entities processed to completion.
    pub completed: usize,
    pub failures: FailureLog,
}

impl<C> LoopOutcome<C> {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Returns the joined context, or the aggregated failure if any entity failed.
    pub fn into_result(self) -> Result<C, LoopError> {
        match self.failures.into_error() {
            None => Ok(self.context),
            Some(error) => Err(error),
        }
    }
}

/// Common interface of element and node loops, used internally by the driver.
trait EntityVisitor: Sync {
    type Entity: Copy + Send + Sync + Debug;
    type Context: Send;

    fn create_context(&self) -> Self::Context;
    fn pre(&self, ctx: &mut Self::Context);
    /// Returns `Ok(false)` if the entity was skipped.
    fn process(&self, ctx: &mut Self::Context, entity: Self::Entity) -> eyre::Result<bool>;
    fn post(&self, ctx: &mut Self::Context);
    fn join(&self, ctx: &mut Self::Context, other: Self::Context);
    fn keep_going(&self, ctx: &Self::Context) -> bool;
    fn entity_id(entity: Self::Entity) -> usize;
}

struct ElementContext<C> {
    inner: C,
    current_subdomain: Option<SubdomainId>,
}

struct ElementVisitor<'a, L> {
    mesh: &'a dyn MeshTopology,
    body: &'a L,
}

impl<'a, L: ThreadedElementLoop> EntityVisitor for ElementVisitor<'a, L> {
    type Entity = ElementHandle;
    type Context = ElementContext<L::Context>;

    fn create_context(&self) -> Self::Context {
        ElementContext {
            inner: self.body.create_context(),
            current_subdomain: None,
        }
    }

    fn pre(&self, ctx: &mut Self::Context) {
        ctx.current_subdomain = None;
        self.body.pre(&mut ctx.inner);
    }

    fn process(&self, ctx: &mut Self::Context, element: ElementHandle) -> eyre::Result<bool> {
        if !self.body.pre_element(&mut ctx.inner, element) {
            return Ok(false);
        }

        if ctx.current_subdomain != Some(element.subdomain) {
            trace!("Entering subdomain {} at element {}", element.subdomain, element.id);
            // Only remember the subdomain once setup succeeded, so that a failed setup is
            // retried on the next element
            ctx.current_subdomain = None;
            self.body.subdomain_changed(&mut ctx.inner, element.subdomain)?;
            ctx.current_subdomain = Some(element.subdomain);
        }

        self.body.on_element(&mut ctx.inner, element)?;
        for &(side, boundary) in self.mesh.element_boundary_sides(element.id) {
            self.body.on_boundary(&mut ctx.inner, element, side, boundary)?;
        }
        self.body.post_element(&mut ctx.inner, element)?;
        Ok(true)
    }

    fn post(&self, ctx: &mut Self::Context) {
        self.body.post(&mut ctx.inner);
    }

    fn join(&self, ctx: &mut Self::Context, other: Self::Context) {
        self.body.join(&mut ctx.inner, other.inner);
    }

    fn keep_going(&self, ctx: &Self::Context) -> bool {
        self.body.keep_going(&ctx.inner)
    }

    fn entity_id(element: ElementHandle) -> usize {
        element.id
    }
}

struct NodeContext<C> {
    inner: C,
    current_subdomains: Option<Vec<SubdomainId>>,
}

struct NodeVisitor<'a, L> {
    mesh: &'a dyn MeshTopology,
    body: &'a L,
}

impl<'a, L: ThreadedNodeLoop> EntityVisitor for NodeVisitor<'a, L> {
    type Entity = NodeHandle;
    type Context = NodeContext<L::Context>;

    fn create_context(&self) -> Self::Context {
        NodeContext {
            inner: self.body.create_context(),
            current_subdomains: None,
        }
    }

    fn pre(&self, ctx: &mut Self::Context) {
        ctx.current_subdomains = None;
        self.body.pre(&mut ctx.inner);
    }

    fn process(&self, ctx: &mut Self::Context, node: NodeHandle) -> eyre::Result<bool> {
        if !self.body.pre_node(&mut ctx.inner, node) {
            return Ok(false);
        }

        let subdomains = self.mesh.node_subdomains(node.id);
        if ctx.current_subdomains.as_deref() != Some(subdomains) {
            trace!("Entering subdomains {:?} at node {}", subdomains, node.id);
            let mut current = ctx.current_subdomains.take().unwrap_or_default();
            self.body.subdomain_changed(&mut ctx.inner, subdomains)?;
            current.clear();
            current.extend_from_slice(subdomains);
            ctx.current_subdomains = Some(current);
        }

        self.body.on_node(&mut ctx.inner, node)?;
        for &boundary in self.mesh.node_boundaries(node.id) {
            self.body.on_boundary_node(&mut ctx.inner, node, boundary)?;
        }
        self.body.post_node(&mut ctx.inner, node)?;
        Ok(true)
    }

    fn post(&self, ctx: &mut Self::Context) {
        self.body.post(&mut ctx.inner);
    }

    fn join(&self, ctx: &mut Self::Context, other: Self::Context) {
        self.body.join(&mut ctx.inner, other.inner);
    }

    fn keep_going(&self, ctx: &Self::Context) -> bool {
        self.body.keep_going(&ctx.inner)
    }

    fn entity_id(node: NodeHandle) -> usize {
        node.id
    }
}

/// State of one execution context, as seen by the driver.
struct ContextState<C> {
    ctx: C,
    completed: usize,
    failures: FailureLog,
}

/// Cooperative cancellation shared by all contexts of one loop execution.
struct LoopControl {
    policy: FailurePolicy,
    stop: AtomicBool,
}

impl LoopControl {
    fn new(policy: FailurePolicy) -> Self {
        Self {
            policy,
            stop: AtomicBool::new(false),
        }
    }

    fn keep_going(&self) -> bool {
        !self.stop.load(Ordering::Relaxed)
    }

    fn signal_failure(&self) {
        if self.policy == FailurePolicy::StopAll {
            self.stop.store(true, Ordering::Relaxed);
        }
    }
}

/// Executes loops over stored ranges, serially or on a dedicated thread pool.
pub struct LoopDriver {
    config: LoopConfig,
    // None for the serial path
    pool: Option<ThreadPool>,
}

impl Debug for LoopDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopDriver")
            .field("config", &self.config)
            .field("num_threads", &self.num_threads())
            .finish()
    }
}

impl LoopDriver {
    pub fn new(config: LoopConfig) -> Result<Self, LoopError> {
        let pool = if config.is_serial() {
            None
        } else {
            let pool = ThreadPoolBuilder::new()
                .num_threads(config.num_threads)
                .thread_name(|i| format!("meshloop-worker-{}", i))
                .build()
                .map_err(|err| LoopError::ThreadPool(err.to_string()))?;
            Some(pool)
        };
        Ok(Self { config, pool })
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    pub fn num_threads(&self) -> usize {
        self.pool
            .as_ref()
            .map(|pool| pool.current_num_threads())
            .unwrap_or(1)
    }

    /// Runs an element loop over `range`.
    ///
    /// The grain size of the configuration overrides the grain size of the range.
    pub fn run_elements<L: ThreadedElementLoop>(
        &self,
        mesh: &dyn MeshTopology,
        range: &StoredRange<ElementHandle>,
        body: &L,
    ) -> LoopOutcome<L::Context> {
        debug!(
            "Starting element loop over {} elements on {} threads",
            range.len(),
            self.num_threads()
        );
        let visitor = ElementVisitor { mesh, body };
        let state = self.drive(&visitor, range);
        debug!(
            "Element loop finished: {} elements completed, {} failed",
            state.completed,
            state.failures.count()
        );
        LoopOutcome {
            context: state.ctx.inner,
            completed: state.completed,
            failures: state.failures,
        }
    }

    /// Runs a node loop over `range`.
    pub fn run_nodes<L: ThreadedNodeLoop>(
        &self,
        mesh: &dyn MeshTopology,
        range: &StoredRange<NodeHandle>,
        body: &L,
    ) -> LoopOutcome<L::Context> {
        debug!(
            "Starting node loop over {} nodes on {} threads",
            range.len(),
            self.num_threads()
        );
        let visitor = NodeVisitor { mesh, body };
        let state = self.drive(&visitor, range);
        debug!(
            "Node loop finished: {} nodes completed, {} failed",
            state.completed,
            state.failures.count()
        );
        LoopOutcome {
            context: state.ctx.inner,
            completed: state.completed,
            failures: state.failures,
        }
    }

    fn drive<V: EntityVisitor>(&self, visitor: &V, range: &StoredRange<V::Entity>) -> ContextState<V::Context> {
        let control = LoopControl::new(self.config.failure_policy);
        let range = range.clone().with_grain_size(self.config.grain_size);
        match &self.pool {
            // The serial path never splits, so the summation order is exactly that of a
            // single loop over the range
            None => run_leaf(visitor, &range, &control),
            Some(pool) => pool.install(|| run_split(visitor, range, &control)),
        }
    }
}

fn run_split<V: EntityVisitor>(visitor: &V, range: StoredRange<V::Entity>, control: &LoopControl) -> ContextState<V::Context> {
    if range.is_divisible() {
        let (left, right) = range.split();
        let (mut a, b) = rayon::join(
            || run_split(visitor, left, control),
            || run_split(visitor, right, control),
        );
        visitor.join(&mut a.ctx, b.ctx);
        a.completed += b.completed;
        a.failures.join(b.failures);
        a
    } else {
        run_leaf(visitor, &range, control)
    }
}

fn run_leaf<V: EntityVisitor>(visitor: &V, range: &StoredRange<V::Entity>, control: &LoopControl) -> ContextState<V::Context> {
    let mut state = ContextState {
        ctx: visitor.create_context(),
        completed: 0,
        failures: FailureLog::default(),
    };

    visitor.pre(&mut state.ctx);
    for &entity in range.iter() {
        if !control.keep_going() || !visitor.keep_going(&state.ctx) {
            break;
        }
        match visitor.process(&mut state.ctx, entity) {
            Ok(true) => state.completed += 1,
            Ok(false) => {}
            Err(err) => {
                let id = V::entity_id(entity);
                warn!("Computation failed on entity {}: {:#}", id, err);
                state.failures.record(id, &err);
                control.signal_failure();
            }
        }
    }
    visitor.post(&mut state.ctx);
    state
}
