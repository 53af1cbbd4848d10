//! rtsvg deferred: values that become known only after their inputs do.
//!
//! A [`DeferredGraph`] is declared up front from constants, pending leaves
//! and pure combinators, then resolved exactly once. Resolution walks the
//! graph in topological order: a combinator runs once, and only when every
//! input has a value. A node downstream of an unsupplied leaf is left
//! unresolved and its combinator is never invoked.
//!
//! Edges only ever point from an existing node to a newer one, except for
//! [`DeferredGraph::bind`], which is therefore the single place a cycle could
//! appear; it is rejected there.

#![forbid(unsafe_code)]

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

use petgraph::algo::{has_path_connecting, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value as Json;
use tracing::{debug, trace};

#[derive(Debug, thiserror::Error)]
pub enum DeferredError {
    #[error("binding `{node}` to `{upstream}` would create a dependency cycle")]
    Cycle { node: String, upstream: String },
    #[error("deferred value `{0}` is already defined")]
    AlreadyDefined(String),
    #[error("deferred value `{0}` is not resolved")]
    Unresolved(String),
    #[error("handle #{0} does not belong to this graph")]
    UnknownNode(usize),
    #[error("encoding `{label}`: {source}")]
    Encode { label: String, #[source] source: serde_json::Error },
    #[error("decoding `{label}`: {source}")]
    Decode { label: String, #[source] source: serde_json::Error },
}

pub type Result<T> = std::result::Result<T, DeferredError>;

static NEXT_GRAPH: AtomicU64 = AtomicU64::new(1);

/// Typed handle to a node of a [`DeferredGraph`]. Only valid against the
/// graph that issued it (and that graph's [`Resolution`]).
pub struct Deferred<T> {
    graph: u64,
    id: NodeIndex,
    _ty: PhantomData<fn() -> T>,
}

impl<T> Deferred<T> {
    fn new(graph: u64, id: NodeIndex) -> Self { Self { graph, id, _ty: PhantomData } }
    pub fn index(&self) -> usize { self.id.index() }
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self { *self }
}

impl<T> Copy for Deferred<T> {}

impl<T> PartialEq for Deferred<T> {
    fn eq(&self, other: &Self) -> bool { self.graph == other.graph && self.id == other.id }
}

impl<T> Eq for Deferred<T> {}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Deferred#{}.{}", self.graph, self.id.index())
    }
}

type Combine = Box<dyn FnOnce(&[Json]) -> Result<Json>>;

enum Node {
    Ready(Json),
    Pending,
    /// Bound to its single input.
    Follow,
    Derived(Combine),
}

struct Slot {
    node: Node,
    inputs: Vec<NodeIndex>,
}

/// Append-only dataflow graph. Edges run input -> dependent.
pub struct DeferredGraph {
    graph: u64,
    dag: DiGraph<String, ()>,
    slots: Vec<Slot>,
}

impl Default for DeferredGraph {
    fn default() -> Self { Self::new() }
}

fn encode<T: Serialize>(label: &str, v: &T) -> Result<Json> {
    serde_json::to_value(v).map_err(|source| DeferredError::Encode { label: label.to_string(), source })
}

fn decode<T: DeserializeOwned>(label: &str, v: &Json) -> Result<T> {
    serde_json::from_value(v.clone()).map_err(|source| DeferredError::Decode { label: label.to_string(), source })
}

impl DeferredGraph {
    pub fn new() -> Self {
        Self { graph: NEXT_GRAPH.fetch_add(1, Ordering::Relaxed), dag: DiGraph::new(), slots: Vec::new() }
    }

    pub fn len(&self) -> usize { self.slots.len() }
    pub fn is_empty(&self) -> bool { self.slots.is_empty() }

    /// Node of `handle`, if it was issued by this graph.
    fn node_of<T>(&self, handle: &Deferred<T>) -> Result<NodeIndex> {
        if handle.graph != self.graph || handle.id.index() >= self.slots.len() {
            return Err(DeferredError::UnknownNode(handle.index()));
        }
        Ok(handle.id)
    }

    fn label(&self, id: NodeIndex) -> Result<String> {
        self.dag.node_weight(id).cloned().ok_or(DeferredError::UnknownNode(id.index()))
    }

    fn push<T>(&mut self, label: &str, node: Node, inputs: Vec<NodeIndex>) -> Result<Deferred<T>> {
        let id = self.dag.add_node(label.to_string());
        for input in &inputs {
            let _ = self.dag.add_edge(*input, id, ());
        }
        self.slots.push(Slot { node, inputs });
        Ok(Deferred::new(self.graph, id))
    }

    /// A value known at declaration time.
    pub fn constant<T: Serialize>(&mut self, label: &str, value: T) -> Result<Deferred<T>> {
        let v = encode(label, &value)?;
        self.push(label, Node::Ready(v), Vec::new())
    }

    /// A leaf whose value arrives later through [`supply`](Self::supply) or [`bind`](Self::bind).
    pub fn pending<T>(&mut self, label: &str) -> Deferred<T> {
        let id = self.dag.add_node(label.to_string());
        self.slots.push(Slot { node: Node::Pending, inputs: Vec::new() });
        Deferred::new(self.graph, id)
    }

    /// Provide the value of a pending leaf.
    pub fn supply<T: Serialize>(&mut self, handle: &Deferred<T>, value: T) -> Result<()> {
        let id = self.node_of(handle)?;
        let label = self.label(id)?;
        let v = encode(&label, &value)?;
        let slot = &mut self.slots[id.index()];
        if !matches!(slot.node, Node::Pending) {
            return Err(DeferredError::AlreadyDefined(label));
        }
        slot.node = Node::Ready(v);
        Ok(())
    }

    /// Make a pending leaf take the value of `upstream` once that resolves.
    /// Fails with [`DeferredError::Cycle`] if `upstream` already depends on `handle`.
    pub fn bind<T>(&mut self, handle: &Deferred<T>, upstream: &Deferred<T>) -> Result<()> {
        let (node, up) = (self.node_of(handle)?, self.node_of(upstream)?);
        let label = self.label(node)?;
        let up_label = self.label(up)?;
        if !matches!(self.slots[node.index()].node, Node::Pending) {
            return Err(DeferredError::AlreadyDefined(label));
        }
        if node == up || has_path_connecting(&self.dag, node, up, None) {
            return Err(DeferredError::Cycle { node: label, upstream: up_label });
        }
        let _ = self.dag.add_edge(up, node, ());
        let slot = &mut self.slots[node.index()];
        slot.node = Node::Follow;
        slot.inputs = vec![up];
        Ok(())
    }

    pub fn map<A, R, F>(&mut self, label: &str, a: &Deferred<A>, f: F) -> Result<Deferred<R>>
    where
        A: DeserializeOwned + 'static,
        R: Serialize + 'static,
        F: FnOnce(A) -> R + 'static,
    {
        let name = label.to_string();
        let combine: Combine = Box::new(move |args| {
            let a = decode::<A>(&name, &args[0])?;
            encode(&name, &f(a))
        });
        let inputs = vec![self.node_of(a)?];
        self.push(label, Node::Derived(combine), inputs)
    }

    pub fn all2<A, B, R, F>(&mut self, label: &str, a: &Deferred<A>, b: &Deferred<B>, f: F) -> Result<Deferred<R>>
    where
        A: DeserializeOwned + 'static,
        B: DeserializeOwned + 'static,
        R: Serialize + 'static,
        F: FnOnce(A, B) -> R + 'static,
    {
        let name = label.to_string();
        let combine: Combine = Box::new(move |args| {
            let a = decode::<A>(&name, &args[0])?;
            let b = decode::<B>(&name, &args[1])?;
            encode(&name, &f(a, b))
        });
        let inputs = vec![self.node_of(a)?, self.node_of(b)?];
        self.push(label, Node::Derived(combine), inputs)
    }

    pub fn all3<A, B, C, R, F>(
        &mut self,
        label: &str,
        a: &Deferred<A>,
        b: &Deferred<B>,
        c: &Deferred<C>,
        f: F,
    ) -> Result<Deferred<R>>
    where
        A: DeserializeOwned + 'static,
        B: DeserializeOwned + 'static,
        C: DeserializeOwned + 'static,
        R: Serialize + 'static,
        F: FnOnce(A, B, C) -> R + 'static,
    {
        let name = label.to_string();
        let combine: Combine = Box::new(move |args| {
            let a = decode::<A>(&name, &args[0])?;
            let b = decode::<B>(&name, &args[1])?;
            let c = decode::<C>(&name, &args[2])?;
            encode(&name, &f(a, b, c))
        });
        let inputs = vec![self.node_of(a)?, self.node_of(b)?, self.node_of(c)?];
        self.push(label, Node::Derived(combine), inputs)
    }

    /// Evaluate every node whose inputs are all available. Consumes the graph,
    /// so no combinator can run twice.
    pub fn resolve(self) -> Result<Resolution> {
        let order = toposort(&self.dag, None).map_err(|c| {
            let l = self.dag[c.node_id()].clone();
            DeferredError::Cycle { node: l.clone(), upstream: l }
        })?;
        let DeferredGraph { graph, dag, slots } = self;
        let labels: Vec<String> = dag.node_weights().cloned().collect();
        let mut slots: Vec<Option<Slot>> = slots.into_iter().map(Some).collect();
        let mut values: Vec<Option<Json>> = vec![None; labels.len()];
        let mut invoked = 0usize;

        for id in order {
            let Some(slot) = slots[id.index()].take() else { continue };
            let value = match slot.node {
                Node::Ready(v) => Some(v),
                Node::Pending => None,
                Node::Follow => slot.inputs.first().and_then(|i| values[i.index()].clone()),
                Node::Derived(f) => {
                    let args: Option<Vec<Json>> = slot.inputs.iter().map(|i| values[i.index()].clone()).collect();
                    match args {
                        Some(args) => {
                            invoked += 1;
                            Some(f(&args)?)
                        }
                        None => None,
                    }
                }
            };
            if value.is_none() {
                trace!(node = %labels[id.index()], "left unresolved");
            }
            values[id.index()] = value;
        }

        let resolved = values.iter().filter(|v| v.is_some()).count();
        debug!(nodes = labels.len(), resolved, invoked, "deferred graph resolved");
        Ok(Resolution { graph, labels, values })
    }
}

/// Values produced by [`DeferredGraph::resolve`].
#[derive(Debug, Clone)]
pub struct Resolution {
    graph: u64,
    labels: Vec<String>,
    values: Vec<Option<Json>>,
}

impl Resolution {
    pub fn is_resolved<T>(&self, handle: &Deferred<T>) -> bool {
        handle.graph == self.graph && matches!(self.values.get(handle.index()), Some(Some(_)))
    }

    pub fn require<T: DeserializeOwned>(&self, handle: &Deferred<T>) -> Result<T> {
        self.get(handle)?.ok_or_else(|| DeferredError::Unresolved(self.labels[handle.index()].clone()))
    }

    /// `Ok(None)` if the node never resolved. Foreign handles and values that
    /// fail to decode are still errors.
    pub fn get<T: DeserializeOwned>(&self, handle: &Deferred<T>) -> Result<Option<T>> {
        let i = handle.index();
        if handle.graph != self.graph {
            return Err(DeferredError::UnknownNode(i));
        }
        let label = self.labels.get(i).ok_or(DeferredError::UnknownNode(i))?;
        match &self.values[i] {
            Some(v) => decode(label, v).map(Some),
            None => Ok(None),
        }
    }

    pub fn resolved_count(&self) -> usize { self.values.iter().filter(|v| v.is_some()).count() }
}
