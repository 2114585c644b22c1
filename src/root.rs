//! Root stepper - the mounted application root.
//!
//! A [`Root`] owns everything one mount point needs between passes: the
//! live root node, the last virtual tree, the root dispatch context, and
//! the side table and foreign handler the morph engine reads. Each call to
//! [`Root::step`] runs exactly one reconciliation pass. Deciding when to
//! step is up to the host.
//!
//! # Example
//!
//! ```ignore
//! let mut doc = Document::new();
//! let mount = doc.create_element("div", None);
//! let mut root = Root::mount(mount, |msg| queue.borrow_mut().push(msg), Config::default());
//!
//! root.step(&mut doc, view(&model))?;
//! ```

use std::rc::Rc;
use std::time::Instant;

use tracing::{debug, info_span, warn};

use crate::config::{Config, Strategy};
use crate::dom::{DispatchContext, DomResult, Document};
use crate::reconcile::{
    DefaultForeignHandler, ForeignHandler, Morph, SideTable, VNodeStore, apply, diff, render,
    virtualize, virtualize_into,
};
use crate::types::{Message, NodeId};
use crate::vdom::Html;

pub struct Root<S = SideTable, H = DefaultForeignHandler> {
    node: NodeId,
    current: Option<Html>,
    context: Rc<DispatchContext>,
    store: S,
    foreign: H,
    config: Config,
    passes: u64,
}

impl Root {
    /// Mount on `node`, delivering decoded messages to `sink`.
    pub fn mount(node: NodeId, sink: impl Fn(Message) + 'static, config: Config) -> Self {
        Self::with_parts(
            node,
            DispatchContext::root(sink),
            SideTable::new(),
            DefaultForeignHandler,
            config,
        )
    }
}

impl<S: VNodeStore, H: ForeignHandler> Root<S, H> {
    pub fn with_parts(
        node: NodeId,
        context: Rc<DispatchContext>,
        store: S,
        foreign: H,
        config: Config,
    ) -> Self {
        Self {
            node,
            current: None,
            context,
            store,
            foreign,
            config,
            passes: 0,
        }
    }

    /// The live root. Changes when a pass replaces the root node.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// The virtual tree of the last pass.
    pub fn current(&self) -> Option<&Html> {
        self.current.as_ref()
    }

    pub fn context(&self) -> &Rc<DispatchContext> {
        &self.context
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Bring the live tree in line with `next`.
    pub fn step(&mut self, doc: &mut Document, next: Html) -> DomResult<NodeId> {
        let _span = self
            .config
            .time_label
            .as_deref()
            .map(|label| info_span!("vdom_pass", label).entered());
        let started = Instant::now();

        let previous = self.node;
        let node = match self.config.strategy {
            Strategy::Morph => self.step_morph(doc, &next)?,
            Strategy::DiffPatch => self.step_diff(doc, &next)?,
        };
        if node != previous && doc.is_alive(previous) && doc.parent(previous).is_none() {
            doc.discard(previous)?;
        }

        self.node = node;
        self.current = Some(next);
        self.passes += 1;
        if self.config.time_label.is_some() {
            debug!(
                pass = self.passes,
                elapsed_us = started.elapsed().as_micros() as u64,
                "pass complete"
            );
        }
        Ok(node)
    }

    fn step_morph(&mut self, doc: &mut Document, next: &Html) -> DomResult<NodeId> {
        if self.passes == 0 && self.config.adopt_existing {
            let read = virtualize_into(doc, &mut self.store, self.node, &mut |_, _| true);
            if read.is_none() {
                warn!(node = %self.node, "mount node cannot be adopted");
            }
        }
        Morph::new(doc, &mut self.store, &mut self.foreign).run(self.node, next, &self.context)
    }

    fn step_diff(&mut self, doc: &mut Document, next: &Html) -> DomResult<NodeId> {
        let old = match self.current.take() {
            Some(old) => Some(old),
            None => virtualize(doc, self.node),
        };
        let Some(old) = old else {
            // Nothing to diff against, so render and swap in.
            let fresh = render(doc, next, &self.context)?;
            if let Some(parent) = doc.parent(self.node) {
                doc.replace_child(parent, fresh, self.node)?;
            }
            return Ok(fresh);
        };
        let patches = diff(&old, next);
        debug!(patches = patches.len(), "diffed");
        apply(doc, self.node, &old, patches, &self.context)
    }
}
