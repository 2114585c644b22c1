//! Event model - handlers, dispatch contexts and delivery.
//!
//! A listener on a live node holds a handler plus the dispatch context it
//! was bound under. When the handler decodes a message, the context chain
//! maps it through every enclosing tagger (innermost first) and finally
//! hands it to the root sink.
//!
//! Contexts are shared and mutable in place: retagging a context changes
//! what every listener bound under it produces, without touching the
//! listeners themselves.

use std::any::type_name;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::{error, trace, warn};

use super::document::Document;
use super::error::DomResult;
use crate::types::{Message, NodeId, Sink};

// =============================================================================
// Events
// =============================================================================

/// An event travelling through the document.
pub struct Event {
    name: String,
    value: Option<String>,
    target: Cell<Option<NodeId>>,
    propagation_stopped: Cell<bool>,
    default_prevented: Cell<bool>,
}

impl Event {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
            target: Cell::new(None),
            propagation_stopped: Cell::new(false),
            default_prevented: Cell::new(false),
        }
    }

    /// Attach a payload, e.g. the current value of an input.
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn target(&self) -> Option<NodeId> {
        self.target.get()
    }

    pub fn stop_propagation(&self) {
        self.propagation_stopped.set(true);
    }

    pub fn prevent_default(&self) {
        self.default_prevented.set(true);
    }

    pub fn is_propagation_stopped(&self) -> bool {
        self.propagation_stopped.get()
    }

    pub fn is_default_prevented(&self) -> bool {
        self.default_prevented.get()
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("name", &self.name)
            .field("value", &self.value)
            .field("target", &self.target.get())
            .finish()
    }
}

/// What happened to an event after dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventOutcome {
    pub propagation_stopped: bool,
    pub default_prevented: bool,
}

// =============================================================================
// Handlers
// =============================================================================

pub type Decoder<T> = Rc<dyn Fn(&Event) -> Option<T>>;

/// Result of a [`Handler::Custom`] decoder.
pub struct CustomOutcome {
    pub message: Message,
    pub stop_propagation: bool,
    pub prevent_default: bool,
}

/// The four handler kinds. A decoder returning `None` means the event is
/// ignored.
#[derive(Clone)]
pub enum Handler {
    Normal(Decoder<Message>),
    MayStopPropagation(Decoder<(Message, bool)>),
    MayPreventDefault(Decoder<(Message, bool)>),
    Custom(Decoder<CustomOutcome>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    Normal,
    MayStopPropagation,
    MayPreventDefault,
    Custom,
}

impl Handler {
    /// Plain handler producing a message of type `T`.
    pub fn normal<T: 'static>(decode: impl Fn(&Event) -> Option<T> + 'static) -> Self {
        Handler::Normal(Rc::new(move |event| {
            decode(event).map(|m| Box::new(m) as Message)
        }))
    }

    pub fn kind(&self) -> HandlerKind {
        match self {
            Handler::Normal(_) => HandlerKind::Normal,
            Handler::MayStopPropagation(_) => HandlerKind::MayStopPropagation,
            Handler::MayPreventDefault(_) => HandlerKind::MayPreventDefault,
            Handler::Custom(_) => HandlerKind::Custom,
        }
    }

    /// Handlers that can never prevent the default action are registered
    /// passive.
    pub fn is_passive(&self) -> bool {
        matches!(
            self.kind(),
            HandlerKind::Normal | HandlerKind::MayStopPropagation
        )
    }

    /// Same kind and the very same decoder.
    pub fn same_decoder(&self, other: &Handler) -> bool {
        match (self, other) {
            (Handler::Normal(a), Handler::Normal(b)) => Rc::ptr_eq(a, b),
            (Handler::MayStopPropagation(a), Handler::MayStopPropagation(b))
            | (Handler::MayPreventDefault(a), Handler::MayPreventDefault(b)) => Rc::ptr_eq(a, b),
            (Handler::Custom(a), Handler::Custom(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    fn decode(&self, event: &Event) -> Option<CustomOutcome> {
        let outcome = |message, stop, prevent| CustomOutcome {
            message,
            stop_propagation: stop,
            prevent_default: prevent,
        };
        match self {
            Handler::Normal(d) => d(event).map(|m| outcome(m, false, false)),
            Handler::MayStopPropagation(d) => d(event).map(|(m, stop)| outcome(m, stop, false)),
            Handler::MayPreventDefault(d) => {
                d(event).map(|(m, prevent)| outcome(m, false, prevent))
            }
            Handler::Custom(d) => d(event),
        }
    }

    /// The same handler with `mapper` applied to every decoded message.
    pub fn map(&self, mapper: Mapper) -> Handler {
        match self {
            Handler::Normal(d) => {
                let d = d.clone();
                Handler::Normal(Rc::new(move |e| d(e).map(|m| mapper.apply(m))))
            }
            Handler::MayStopPropagation(d) => {
                let d = d.clone();
                Handler::MayStopPropagation(Rc::new(move |e| {
                    d(e).map(|(m, stop)| (mapper.apply(m), stop))
                }))
            }
            Handler::MayPreventDefault(d) => {
                let d = d.clone();
                Handler::MayPreventDefault(Rc::new(move |e| {
                    d(e).map(|(m, prevent)| (mapper.apply(m), prevent))
                }))
            }
            Handler::Custom(d) => {
                let d = d.clone();
                Handler::Custom(Rc::new(move |e| {
                    d(e).map(|o| CustomOutcome {
                        message: mapper.apply(o.message),
                        ..o
                    })
                }))
            }
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}(..)", self.kind())
    }
}

/// A handler plus its capture flag, as stored in an element's facts.
#[derive(Clone, Debug)]
pub struct EventHandler {
    pub handler: Handler,
    pub use_capture: bool,
}

impl EventHandler {
    pub fn new(handler: Handler) -> Self {
        Self {
            handler,
            use_capture: false,
        }
    }

    pub fn capture(mut self) -> Self {
        self.use_capture = true;
        self
    }

    /// Whether a registered listener for `self` can take `other`'s decoder
    /// without being re-registered.
    pub fn same_registration(&self, other: &EventHandler) -> bool {
        self.use_capture == other.use_capture && self.handler.kind() == other.handler.kind()
    }

    pub fn is_equivalent(&self, other: &EventHandler) -> bool {
        self.use_capture == other.use_capture && self.handler.same_decoder(&other.handler)
    }
}

// =============================================================================
// Mappers and Dispatch Contexts
// =============================================================================

/// Type-erased message transformation applied by a tagger.
#[derive(Clone)]
pub struct Mapper(Rc<dyn Fn(Message) -> Message>);

impl Mapper {
    /// Mapper from `A` messages to `B` messages.
    ///
    /// A message of any other type passes through unchanged and is logged;
    /// it means a tagger was placed around a subtree of a different type.
    pub fn new<A: 'static, B: 'static>(f: impl Fn(A) -> B + 'static) -> Self {
        Mapper(Rc::new(move |message: Message| match message.downcast::<A>() {
            Ok(a) => Box::new(f(*a)) as Message,
            Err(message) => {
                error!(
                    expected = type_name::<A>(),
                    "tagger received a message of an unexpected type"
                );
                message
            }
        }))
    }

    pub fn erased(f: impl Fn(Message) -> Message + 'static) -> Self {
        Mapper(Rc::new(f))
    }

    pub fn apply(&self, message: Message) -> Message {
        (self.0)(message)
    }

    pub fn ptr_eq(&self, other: &Mapper) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Mapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mapper({:p})", Rc::as_ptr(&self.0) as *const ())
    }
}

#[derive(Clone)]
enum Link {
    Root(Sink),
    Tagged {
        mappers: Vec<Mapper>,
        parent: Rc<DispatchContext>,
    },
}

/// One link in the chain from a listener to the application.
pub struct DispatchContext {
    link: RefCell<Link>,
}

impl DispatchContext {
    pub fn root(sink: impl Fn(Message) + 'static) -> Rc<Self> {
        Rc::new(Self {
            link: RefCell::new(Link::Root(Rc::new(sink))),
        })
    }

    /// Context for a tagger chain. `mappers` run innermost last in the
    /// list, i.e. they are stored outermost first.
    pub fn tagged(mappers: Vec<Mapper>, parent: Rc<DispatchContext>) -> Rc<Self> {
        Rc::new(Self {
            link: RefCell::new(Link::Tagged { mappers, parent }),
        })
    }

    pub fn is_root(&self) -> bool {
        matches!(*self.link.borrow(), Link::Root(_))
    }

    pub fn mappers(&self) -> Vec<Mapper> {
        match &*self.link.borrow() {
            Link::Root(_) => Vec::new(),
            Link::Tagged { mappers, .. } => mappers.clone(),
        }
    }

    pub fn parent(&self) -> Option<Rc<DispatchContext>> {
        match &*self.link.borrow() {
            Link::Root(_) => None,
            Link::Tagged { parent, .. } => Some(parent.clone()),
        }
    }

    /// Replace the mappers, keeping the parent.
    pub fn retag(&self, mappers: Vec<Mapper>) {
        match &mut *self.link.borrow_mut() {
            Link::Root(_) => warn!("ignoring retag of a root dispatch context"),
            Link::Tagged { mappers: current, .. } => *current = mappers,
        }
    }

    /// Replace both the mappers and the parent.
    pub fn relink(&self, mappers: Vec<Mapper>, parent: Rc<DispatchContext>) {
        if std::ptr::eq(self, Rc::as_ptr(&parent)) {
            warn!("ignoring relink of a dispatch context onto itself");
            return;
        }
        *self.link.borrow_mut() = Link::Tagged { mappers, parent };
    }

    /// Number of links above this one.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut next = self.parent();
        while let Some(ctx) = next {
            depth += 1;
            next = ctx.parent();
        }
        depth
    }

    /// Map `message` up the chain and deliver it to the root sink.
    pub fn send(&self, message: Message) {
        let mut message = message;
        let mut link = self.link.borrow().clone();
        loop {
            match link {
                Link::Root(sink) => {
                    sink(message);
                    return;
                }
                Link::Tagged { mappers, parent } => {
                    for mapper in mappers.iter().rev() {
                        message = mapper.apply(message);
                    }
                    link = parent.link.borrow().clone();
                }
            }
        }
    }
}

impl fmt::Debug for DispatchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.link.borrow() {
            Link::Root(_) => f.write_str("DispatchContext::Root"),
            Link::Tagged { mappers, .. } => f
                .debug_struct("DispatchContext::Tagged")
                .field("mappers", &mappers.len())
                .field("depth", &self.depth())
                .finish(),
        }
    }
}

// =============================================================================
// Listeners
// =============================================================================

struct ListenerState {
    handler: EventHandler,
    context: Rc<DispatchContext>,
}

/// A registered listener. Cloning shares the registration.
#[derive(Clone)]
pub struct Listener {
    state: Rc<RefCell<ListenerState>>,
    use_capture: bool,
    passive: bool,
}

impl Listener {
    pub fn new(handler: EventHandler, context: Rc<DispatchContext>) -> Self {
        let use_capture = handler.use_capture;
        let passive = handler.handler.is_passive();
        Self {
            state: Rc::new(RefCell::new(ListenerState { handler, context })),
            use_capture,
            passive,
        }
    }

    pub fn handler(&self) -> EventHandler {
        self.state.borrow().handler.clone()
    }

    /// Swap the decoder of an existing registration.
    pub fn set_handler(&self, handler: EventHandler) {
        self.state.borrow_mut().handler = handler;
    }

    pub fn context(&self) -> Rc<DispatchContext> {
        self.state.borrow().context.clone()
    }

    pub fn set_context(&self, context: Rc<DispatchContext>) {
        self.state.borrow_mut().context = context;
    }

    pub fn use_capture(&self) -> bool {
        self.use_capture
    }

    pub fn is_passive(&self) -> bool {
        self.passive
    }

    fn fire(&self, event: &Event) {
        let (handler, context) = {
            let state = self.state.borrow();
            (state.handler.handler.clone(), state.context.clone())
        };
        let Some(outcome) = handler.decode(event) else {
            trace!(event = event.name(), "decoder ignored event");
            return;
        };
        if outcome.stop_propagation {
            event.stop_propagation();
        }
        if outcome.prevent_default && !self.passive {
            event.prevent_default();
        }
        context.send(outcome.message);
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("use_capture", &self.use_capture)
            .field("passive", &self.passive)
            .finish()
    }
}

// =============================================================================
// Dispatch
// =============================================================================

impl Document {
    /// Fire `event` at `target`: capture listeners from the root down, then
    /// bubbling listeners from the target up.
    pub fn dispatch_event(&self, target: NodeId, event: &Event) -> DomResult<EventOutcome> {
        self.kind(target)?;
        event.target.set(Some(target));
        let path = self.ancestors(target);

        let phases = [(true, path.iter().rev().collect::<Vec<_>>()), (false, path.iter().collect())];
        'phases: for (capture, nodes) in phases {
            for &node in nodes {
                if let Some(listener) = self
                    .listener(node, event.name())
                    .filter(|l| l.use_capture() == capture)
                    .cloned()
                {
                    listener.fire(event);
                }
                if event.is_propagation_stopped() {
                    break 'phases;
                }
            }
        }

        Ok(EventOutcome {
            propagation_stopped: event.is_propagation_stopped(),
            default_prevented: event.is_default_prevented(),
        })
    }
}
