//! Facts - the attributes, styles, properties and listeners of an element.
//!
//! An element is constructed from an ordered list of [`Fact`]s. The list is
//! normalized into a [`Facts`] table (one map per category) where later
//! entries win, except `class`/`className`, which accumulate.

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::dom::{Event, EventHandler, Handler, Mapper, PropValue};
use crate::types::Message;

use super::sanitize;

// =============================================================================
// Facts
// =============================================================================

/// One entry of an element's fact list.
#[derive(Clone, Debug)]
pub enum Fact {
    Event { key: String, handler: EventHandler },
    Style { key: String, value: String },
    Property { key: String, value: PropValue },
    Attribute { key: String, value: String },
    AttributeNs {
        namespace: String,
        key: String,
        value: String,
    },
    /// Sets the element namespace when the constructor did not.
    Namespace(String),
}

impl Fact {
    /// Apply `mapper` to the messages of an event fact. Other facts are
    /// returned unchanged.
    pub fn map_message(self, mapper: Mapper) -> Fact {
        match self {
            Fact::Event { key, handler } => Fact::Event {
                key,
                handler: EventHandler {
                    handler: handler.handler.map(mapper),
                    use_capture: handler.use_capture,
                },
            },
            other => other,
        }
    }
}

pub fn style(key: impl Into<String>, value: impl Into<String>) -> Fact {
    Fact::Style {
        key: key.into(),
        value: value.into(),
    }
}

/// Attribute fact. `on*` and `formAction` keys are renamed and
/// `javascript:` URIs are dropped.
pub fn attribute(key: &str, value: &str) -> Fact {
    Fact::Attribute {
        key: sanitize::no_on_or_form_action(key),
        value: sanitize::no_javascript_uri(value),
    }
}

pub fn attribute_ns(namespace: &str, key: &str, value: &str) -> Fact {
    Fact::AttributeNs {
        namespace: namespace.to_owned(),
        key: sanitize::no_on_or_form_action(key),
        value: sanitize::no_javascript_uri(value),
    }
}

/// Property fact. `innerHTML` and `formAction` are renamed.
pub fn property(key: &str, value: impl Into<PropValue>) -> Fact {
    Fact::Property {
        key: sanitize::no_inner_html_or_form_action(key),
        value: value.into(),
    }
}

pub fn class(name: &str) -> Fact {
    attribute("class", name)
}

pub fn namespace(namespace: impl Into<String>) -> Fact {
    Fact::Namespace(namespace.into())
}

/// Listener fact with an explicit handler kind.
pub fn on_with(event: impl Into<String>, handler: EventHandler) -> Fact {
    Fact::Event {
        key: event.into(),
        handler,
    }
}

/// Bubbling listener producing `T` messages.
pub fn on<T: 'static>(
    event: impl Into<String>,
    decode: impl Fn(&Event) -> Option<T> + 'static,
) -> Fact {
    on_with(event, EventHandler::new(Handler::normal(decode)))
}

/// Listener that always produces a clone of `message`.
pub fn on_message<T: Clone + 'static>(event: impl Into<String>, message: T) -> Fact {
    on(event, move |_| Some(message.clone()))
}

/// Listener whose decoder may also stop propagation.
pub fn on_stoppable(
    event: impl Into<String>,
    decode: impl Fn(&Event) -> Option<(Message, bool)> + 'static,
) -> Fact {
    on_with(
        event,
        EventHandler::new(Handler::MayStopPropagation(Rc::new(decode))),
    )
}

/// Namespaced attribute value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NsValue {
    pub namespace: String,
    pub value: String,
}

/// Normalized fact table.
#[derive(Clone, Debug, Default)]
pub struct Facts {
    pub events: BTreeMap<String, EventHandler>,
    pub styles: BTreeMap<String, String>,
    pub properties: BTreeMap<String, PropValue>,
    pub attributes: BTreeMap<String, String>,
    pub ns_attributes: BTreeMap<String, NsValue>,
}

impl Facts {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
            && self.styles.is_empty()
            && self.properties.is_empty()
            && self.attributes.is_empty()
            && self.ns_attributes.is_empty()
    }

    pub fn kinds(&self) -> FactKinds {
        let mut kinds = FactKinds::empty();
        kinds.set(FactKinds::EVENTS, !self.events.is_empty());
        kinds.set(FactKinds::STYLES, !self.styles.is_empty());
        kinds.set(FactKinds::PROPERTIES, !self.properties.is_empty());
        kinds.set(FactKinds::ATTRIBUTES, !self.attributes.is_empty());
        kinds.set(FactKinds::NS_ATTRIBUTES, !self.ns_attributes.is_empty());
        kinds
    }
}

/// Output of [`normalize`].
#[derive(Clone, Debug, Default)]
pub struct Normalized {
    pub facts: Facts,
    pub namespace: Option<String>,
}

fn accumulate(current: Option<String>, next: String) -> String {
    match current {
        Some(current) if !current.is_empty() => format!("{current} {next}"),
        _ => next,
    }
}

/// Normalize a fact list. Later facts win, except that the `class`
/// attribute and the `className` property join with a single space.
pub fn normalize(list: impl IntoIterator<Item = Fact>) -> Normalized {
    let mut out = Normalized::default();
    let facts = &mut out.facts;
    for fact in list {
        match fact {
            Fact::Event { key, handler } => {
                facts.events.insert(key, handler);
            }
            Fact::Style { key, value } => {
                facts.styles.insert(key, value);
            }
            Fact::Property { key, value } => {
                let value = match (key.as_str(), value) {
                    ("className", PropValue::String(name)) => {
                        let current = match facts.properties.remove("className") {
                            Some(PropValue::String(s)) => Some(s),
                            _ => None,
                        };
                        PropValue::String(accumulate(current, name))
                    }
                    (_, value) => value,
                };
                facts.properties.insert(key, value);
            }
            Fact::Attribute { key, value } => {
                let value = if key == "class" {
                    accumulate(facts.attributes.remove("class"), value)
                } else {
                    value
                };
                facts.attributes.insert(key, value);
            }
            Fact::AttributeNs {
                namespace,
                key,
                value,
            } => {
                facts.ns_attributes.insert(key, NsValue { namespace, value });
            }
            Fact::Namespace(ns) => out.namespace = Some(ns),
        }
    }
    out
}

// =============================================================================
// Facts Diff
// =============================================================================

bitflags::bitflags! {
    /// Fact categories, used to skip untouched categories when applying.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FactKinds: u8 {
        const EVENTS = 1 << 0;
        const STYLES = 1 << 1;
        const PROPERTIES = 1 << 2;
        const ATTRIBUTES = 1 << 3;
        const NS_ATTRIBUTES = 1 << 4;
    }
}

/// Change to one namespaced attribute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NsChange {
    Set(NsValue),
    Remove { namespace: String },
}

/// Per-category fact changes. `None` means "remove this key".
#[derive(Clone, Debug, Default)]
pub struct FactsDiff {
    pub events: BTreeMap<String, Option<EventHandler>>,
    pub styles: BTreeMap<String, Option<String>>,
    pub properties: BTreeMap<String, Option<PropValue>>,
    pub attributes: BTreeMap<String, Option<String>>,
    pub ns_attributes: BTreeMap<String, NsChange>,
}

impl FactsDiff {
    pub fn kinds(&self) -> FactKinds {
        let mut kinds = FactKinds::empty();
        kinds.set(FactKinds::EVENTS, !self.events.is_empty());
        kinds.set(FactKinds::STYLES, !self.styles.is_empty());
        kinds.set(FactKinds::PROPERTIES, !self.properties.is_empty());
        kinds.set(FactKinds::ATTRIBUTES, !self.attributes.is_empty());
        kinds.set(FactKinds::NS_ATTRIBUTES, !self.ns_attributes.is_empty());
        kinds
    }

    pub fn is_empty(&self) -> bool {
        self.kinds().is_empty()
    }
}

fn diff_map<V: Clone>(
    old: &BTreeMap<String, V>,
    new: &BTreeMap<String, V>,
    same: impl Fn(&str, &V, &V) -> bool,
) -> BTreeMap<String, Option<V>> {
    let mut out = BTreeMap::new();
    for (key, old_value) in old {
        match new.get(key) {
            None => {
                out.insert(key.clone(), None);
            }
            Some(new_value) if !same(key, old_value, new_value) => {
                out.insert(key.clone(), Some(new_value.clone()));
            }
            Some(_) => {}
        }
    }
    for (key, new_value) in new {
        if !old.contains_key(key) {
            out.insert(key.clone(), Some(new_value.clone()));
        }
    }
    out
}

/// Compute the changes that turn `old` into `new`, or `None` if there are
/// none.
///
/// The `value` property is always reported when present, since the live
/// value may have been changed by the user. Appliers write it only when it
/// differs from what the node holds.
pub fn diff_facts(old: &Facts, new: &Facts) -> Option<FactsDiff> {
    let diff = FactsDiff {
        events: diff_map(&old.events, &new.events, |_, a, b| a.is_equivalent(b)),
        styles: diff_map(&old.styles, &new.styles, |_, a, b| a == b),
        properties: diff_map(&old.properties, &new.properties, |key, a, b| {
            key != "value" && a == b
        }),
        attributes: diff_map(&old.attributes, &new.attributes, |_, a, b| a == b),
        ns_attributes: diff_ns(&old.ns_attributes, &new.ns_attributes),
    };
    (!diff.is_empty()).then_some(diff)
}

fn diff_ns(
    old: &BTreeMap<String, NsValue>,
    new: &BTreeMap<String, NsValue>,
) -> BTreeMap<String, NsChange> {
    let mut out = BTreeMap::new();
    for (key, old_value) in old {
        match new.get(key) {
            None => {
                out.insert(
                    key.clone(),
                    NsChange::Remove {
                        namespace: old_value.namespace.clone(),
                    },
                );
            }
            Some(new_value) if new_value != old_value => {
                out.insert(key.clone(), NsChange::Set(new_value.clone()));
            }
            Some(_) => {}
        }
    }
    for (key, new_value) in new {
        if !old.contains_key(key) {
            out.insert(key.clone(), NsChange::Set(new_value.clone()));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_later_fact_wins() {
        let n = normalize([
            attribute("id", "a"),
            style("color", "red"),
            attribute("id", "b"),
            style("color", "blue"),
        ]);
        assert_eq!(n.facts.attributes["id"], "b");
        assert_eq!(n.facts.styles["color"], "blue");
    }

    #[test]
    fn test_class_accumulates() {
        let n = normalize([class("a"), attribute("id", "x"), class("b")]);
        assert_eq!(n.facts.attributes["class"], "a b");

        let n = normalize([property("className", "a"), property("className", "b")]);
        assert_eq!(
            n.facts.properties["className"],
            PropValue::String("a b".into())
        );
    }

    #[test]
    fn test_namespace_fact() {
        let n = normalize([namespace(crate::types::SVG_NAMESPACE), attribute("r", "4")]);
        assert_eq!(n.namespace.as_deref(), Some(crate::types::SVG_NAMESPACE));
    }

    #[test]
    fn test_sanitized_keys() {
        let n = normalize([
            attribute("onclick", "steal()"),
            attribute("href", "  java\nscript:alert(1)"),
            property("innerHTML", "<b>"),
        ]);
        assert_eq!(n.facts.attributes["data-onclick"], "steal()");
        assert_eq!(n.facts.attributes["href"], "");
        assert!(n.facts.properties.contains_key("data-innerHTML"));
    }

    #[test]
    fn test_diff_facts_removals_and_changes() {
        let old = normalize([attribute("id", "a"), style("color", "red")]).facts;
        let new = normalize([attribute("id", "b"), attribute("title", "t")]).facts;
        let diff = diff_facts(&old, &new).unwrap();

        assert_eq!(diff.attributes["id"], Some("b".into()));
        assert_eq!(diff.attributes["title"], Some("t".into()));
        assert_eq!(diff.styles["color"], None);
        assert_eq!(diff.kinds(), FactKinds::ATTRIBUTES | FactKinds::STYLES);
    }

    #[test]
    fn test_diff_facts_equal_is_none() {
        let old = normalize([attribute("id", "a"), style("color", "red")]).facts;
        let new = normalize([attribute("id", "a"), style("color", "red")]).facts;
        assert!(diff_facts(&old, &new).is_none());
    }

    #[test]
    fn test_value_property_always_reported() {
        let old = normalize([property("value", "x")]).facts;
        let new = normalize([property("value", "x")]).facts;
        let diff = diff_facts(&old, &new).unwrap();
        assert_eq!(diff.properties["value"], Some(PropValue::String("x".into())));
    }

    #[test]
    fn test_ns_removal_keeps_namespace() {
        let old = normalize([attribute_ns("xlink", "href", "#a")]).facts;
        let diff = diff_facts(&old, &Facts::default()).unwrap();
        assert_eq!(
            diff.ns_attributes["href"],
            NsChange::Remove {
                namespace: "xlink".into()
            }
        );
    }

    #[test]
    fn test_event_identity() {
        let shared = on_message("click", 1u8);
        let old = normalize([shared.clone()]).facts;
        let same = normalize([shared]).facts;
        assert!(diff_facts(&old, &same).is_none());

        let fresh = normalize([on_message("click", 1u8)]).facts;
        assert!(diff_facts(&old, &fresh).unwrap().events["click"].is_some());
    }
}
