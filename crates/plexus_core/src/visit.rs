//! Items related to observing traversals of a [`NetworkGraph`](crate::NetworkGraph).

use crate::graph::NodeId;

/// For types used to observe graph traversals without modifying them.
///
/// Depth-first traversals call [`Visitor::visit_pre`] upon discovering a node
/// and [`Visitor::visit_post`] once all of its successors are finished.
/// Breadth-first traversals only call [`Visitor::visit_pre`].
pub trait Visitor<P: ?Sized> {
    /// Called when a node is first reached.
    fn visit_pre(&mut self, _ctx: Ctx<'_, P>) {}
    /// Called when a node is finished.
    fn visit_post(&mut self, _ctx: Ctx<'_, P>) {}
}

/// The context provided for each node during a traversal.
#[derive(Debug)]
pub struct Ctx<'a, P: ?Sized> {
    id: NodeId,
    processor: &'a P,
    stamp: u32,
}

/// Collects the nodes passed to each callback in the order they were visited.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Record {
    pub pre: Vec<NodeId>,
    pub post: Vec<NodeId>,
}

impl<'a, P: ?Sized> Ctx<'a, P> {
    /// Create a `Ctx` instance. Exclusively for use by traversals.
    pub(crate) fn new(id: NodeId, processor: &'a P, stamp: u32) -> Self {
        Self {
            id,
            processor,
            stamp,
        }
    }

    /// The id of the node within its graph.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The processor wrapped by the node.
    pub fn processor(&self) -> &'a P {
        self.processor
    }

    /// The discovery or finish time during a depth-first traversal, or the
    /// distance to the nearest root during a breadth-first traversal.
    pub fn stamp(&self) -> u32 {
        self.stamp
    }
}

impl<'a, P: ?Sized> Clone for Ctx<'a, P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, P: ?Sized> Copy for Ctx<'a, P> {}

/// The unit visitor observes nothing.
impl<P: ?Sized> Visitor<P> for () {}

impl<P: ?Sized> Visitor<P> for Record {
    fn visit_pre(&mut self, ctx: Ctx<'_, P>) {
        self.pre.push(ctx.id());
    }

    fn visit_post(&mut self, ctx: Ctx<'_, P>) {
        self.post.push(ctx.id());
    }
}

impl<'v, P: ?Sized, V> Visitor<P> for &'v mut V
where
    V: ?Sized + Visitor<P>,
{
    fn visit_pre(&mut self, ctx: Ctx<'_, P>) {
        (**self).visit_pre(ctx)
    }

    fn visit_post(&mut self, ctx: Ctx<'_, P>) {
        (**self).visit_post(ctx)
    }
}
