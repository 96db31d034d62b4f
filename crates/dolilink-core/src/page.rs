//! In-memory page document with opaque node handles.
//!
//! The engine never touches a live browser DOM. The host mirrors the page
//! into a [`PageDocument`]: an arena of elements addressed by [`NodeId`],
//! with attributes, text content, capture-phase click listeners, and a
//! structural-change event stream that the change watcher subscribes to.
//!
//! Detached nodes are kept in the arena so a stale handle can be detected
//! (and reported as a failure) instead of dangling. Attribute-only changes
//! emit no events; only child-list changes do.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::rules::LinkFields;

/// Tag name of link elements.
pub const LINK_TAG: &str = "a";

/// Opaque handle to a document node.
///
/// Handles are never reused; a handle stays valid for lookups after its
/// node is detached from the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

/// Identity of an installed click listener, used to remove exactly that
/// listener and no other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Mouse button that triggered a click.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    /// The primary (usually left) button.
    Primary,
    /// The auxiliary (usually middle/wheel) button.
    Auxiliary,
    /// The secondary (usually right) button.
    Secondary,
}

/// A click event dispatched to a node's listeners.
#[derive(Debug, Clone)]
pub struct ClickEvent {
    /// The button that triggered the click.
    pub button: MouseButton,
    /// Whether the ctrl key was held.
    pub ctrl: bool,
    /// Whether the meta key was held.
    pub meta: bool,
    /// Whether the shift key was held.
    pub shift: bool,
    /// Whether the alt key was held.
    pub alt: bool,
    default_prevented: bool,
    propagation_stopped: bool,
    requested_navigation: Option<String>,
}

impl ClickEvent {
    /// Creates a plain primary-button click with no modifiers.
    pub fn primary() -> Self {
        Self {
            button: MouseButton::Primary,
            ctrl: false,
            meta: false,
            shift: false,
            alt: false,
            default_prevented: false,
            propagation_stopped: false,
            requested_navigation: None,
        }
    }

    /// Sets the triggering button.
    pub fn with_button(mut self, button: MouseButton) -> Self {
        self.button = button;
        self
    }

    /// Sets the ctrl modifier.
    pub fn with_ctrl(mut self, ctrl: bool) -> Self {
        self.ctrl = ctrl;
        self
    }

    /// Sets the meta modifier.
    pub fn with_meta(mut self, meta: bool) -> Self {
        self.meta = meta;
        self
    }

    /// Sets the shift modifier.
    pub fn with_shift(mut self, shift: bool) -> Self {
        self.shift = shift;
        self
    }

    /// Sets the alt modifier.
    pub fn with_alt(mut self, alt: bool) -> Self {
        self.alt = alt;
        self
    }

    /// Marks the default action as already prevented, as an earlier handler
    /// in the dispatch chain would.
    pub fn with_default_prevented(mut self) -> Self {
        self.default_prevented = true;
        self
    }

    /// Returns true if any modifier key was held.
    pub fn has_modifier(&self) -> bool {
        self.ctrl || self.meta || self.shift || self.alt
    }

    /// Prevents the default action.
    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    /// Returns true if the default action has been prevented.
    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }

    /// Stops the event from reaching later listeners.
    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    /// Returns true if propagation has been stopped.
    pub fn propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }

    /// Requests a same-document navigation to the given href.
    pub fn request_navigation(&mut self, href: impl Into<String>) {
        self.requested_navigation = Some(href.into());
    }
}

/// A click listener installed on a node.
///
/// Listeners run in install order (capture phase) and receive the event
/// plus the node's current href attribute.
pub type ClickListener = Arc<dyn Fn(&mut ClickEvent, Option<&str>) + Send + Sync>;

/// A navigation produced by a click.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    /// The destination href.
    pub href: String,
    /// The target browsing context, `None` meaning the current one.
    pub target: Option<String>,
}

impl Navigation {
    /// Returns true if this navigation stays in the current browsing
    /// context.
    pub fn is_same_tab(&self) -> bool {
        self.target.is_none()
    }
}

/// Outcome of dispatching a click to a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickOutcome {
    /// Whether any listener prevented the default action.
    pub default_prevented: bool,
    /// The navigation that resulted, if any.
    pub navigation: Option<Navigation>,
}

/// Structural change notifications emitted by the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentEvent {
    /// A subtree rooted at the given node became attached to the document.
    SubtreeAttached {
        /// Root of the attached subtree.
        root: NodeId,
    },
    /// A subtree rooted at the given node was detached from the document.
    SubtreeDetached {
        /// Root of the detached subtree.
        root: NodeId,
    },
}

struct Node {
    tag: String,
    attrs: HashMap<String, String>,
    text: String,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
    listeners: Vec<(ListenerId, ClickListener)>,
}

impl Node {
    fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: HashMap::new(),
            text: String::new(),
            children: Vec::new(),
            parent: None,
            listeners: Vec::new(),
        }
    }
}

/// The mirrored page.
pub struct PageDocument {
    nodes: HashMap<NodeId, Node>,
    root: NodeId,
    next_node: u64,
    next_listener: u64,
    subscribers: Vec<UnboundedSender<DocumentEvent>>,
    navigations: Vec<Navigation>,
}

impl fmt::Debug for PageDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageDocument")
            .field("nodes", &self.nodes.len())
            .field("links", &self.links().len())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl Default for PageDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl PageDocument {
    /// Creates an empty document with a root element.
    pub fn new() -> Self {
        let root = NodeId(1);
        let mut nodes = HashMap::new();
        nodes.insert(root, Node::new("html"));
        Self {
            nodes,
            root,
            next_node: 2,
            next_listener: 1,
            subscribers: Vec::new(),
            navigations: Vec::new(),
        }
    }

    /// Returns the root node.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Creates a new, initially detached element.
    pub fn create_element(&mut self, tag: impl Into<String>) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        self.nodes.insert(id, Node::new(tag));
        id
    }

    /// Returns true if the node exists in the arena (attached or not).
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Returns true if the node is reachable from the root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = id;
        loop {
            if current == self.root {
                return true;
            }
            match self.nodes.get(&current).and_then(|n| n.parent) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// Appends `child` under `parent`.
    ///
    /// Fails (returns false) if either node is unknown, if `child` already
    /// has a parent, or if `child` is the root. Emits a
    /// [`DocumentEvent::SubtreeAttached`] when the subtree becomes
    /// reachable from the root.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        if child == self.root || child == parent || !self.nodes.contains_key(&parent) {
            return false;
        }
        match self.nodes.get_mut(&child) {
            Some(node) if node.parent.is_none() => node.parent = Some(parent),
            _ => return false,
        }
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children.push(child);
        }
        if self.is_attached(child) {
            self.emit(DocumentEvent::SubtreeAttached { root: child });
        }
        true
    }

    /// Detaches the subtree rooted at `id` from its parent.
    ///
    /// The nodes stay in the arena so handles into the subtree remain
    /// lookup-able but report as not attached. The root cannot be removed.
    pub fn remove(&mut self, id: NodeId) -> bool {
        if id == self.root || !self.nodes.contains_key(&id) {
            return false;
        }
        let was_attached = self.is_attached(id);
        let parent = match self.nodes.get_mut(&id) {
            Some(node) => node.parent.take(),
            None => None,
        };
        if let Some(parent) = parent {
            if let Some(parent_node) = self.nodes.get_mut(&parent) {
                parent_node.children.retain(|c| *c != id);
            }
        }
        if was_attached {
            self.emit(DocumentEvent::SubtreeDetached { root: id });
        }
        true
    }

    /// Returns the node's tag name.
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.nodes.get(&id).map(|n| n.tag.as_str())
    }

    /// Returns an attribute value.
    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.nodes
            .get(&id)
            .and_then(|n| n.attrs.get(name))
            .map(String::as_str)
    }

    /// Sets an attribute. Attribute changes emit no document events.
    pub fn set_attr(&mut self, id: NodeId, name: impl Into<String>, value: impl Into<String>) -> bool {
        match self.nodes.get_mut(&id) {
            Some(node) => {
                node.attrs.insert(name.into(), value.into());
                true
            }
            None => false,
        }
    }

    /// Removes an attribute, returning true if it was present.
    pub fn remove_attr(&mut self, id: NodeId, name: &str) -> bool {
        self.nodes
            .get_mut(&id)
            .map(|n| n.attrs.remove(name).is_some())
            .unwrap_or(false)
    }

    /// Sets the node's own text.
    pub fn set_text(&mut self, id: NodeId, text: impl Into<String>) -> bool {
        match self.nodes.get_mut(&id) {
            Some(node) => {
                node.text = text.into();
                true
            }
            None => false,
        }
    }

    /// Returns the concatenated text of the node and its descendants, in
    /// document order.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        if let Some(node) = self.nodes.get(&id) {
            out.push_str(&node.text);
            for child in &node.children {
                self.collect_text(*child, out);
            }
        }
    }

    /// Returns all attached link elements (`a` with an href attribute) in
    /// document order.
    pub fn links(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_links(self.root, &mut out);
        out
    }

    fn collect_links(&self, id: NodeId, out: &mut Vec<NodeId>) {
        if let Some(node) = self.nodes.get(&id) {
            if node.tag == LINK_TAG && node.attrs.contains_key("href") {
                out.push(id);
            }
            for child in &node.children {
                self.collect_links(*child, out);
            }
        }
    }

    /// Returns true if the node is a link element or contains one.
    pub fn contains_link_element(&self, id: NodeId) -> bool {
        match self.nodes.get(&id) {
            Some(node) => {
                node.tag == LINK_TAG
                    || node
                        .children
                        .iter()
                        .any(|child| self.contains_link_element(*child))
            }
            None => false,
        }
    }

    /// Captures the matchable fields of a node.
    pub fn link_fields(&self, id: NodeId) -> Option<LinkFields> {
        let node = self.nodes.get(&id)?;
        Some(LinkFields {
            href: node.attrs.get("href").cloned().unwrap_or_default(),
            title: node.attrs.get("title").cloned().unwrap_or_default(),
            text: self.text_content(id),
        })
    }

    /// Convenience: creates a link element with href and text and appends
    /// it under `parent`.
    pub fn append_link(&mut self, parent: NodeId, href: &str, text: &str) -> NodeId {
        let link = self.create_element(LINK_TAG);
        self.set_attr(link, "href", href);
        self.set_text(link, text);
        self.append_child(parent, link);
        link
    }

    /// Installs a capture-phase click listener on a node.
    pub fn add_click_listener(&mut self, id: NodeId, listener: ClickListener) -> Option<ListenerId> {
        let node = self.nodes.get_mut(&id)?;
        let listener_id = ListenerId(self.next_listener);
        self.next_listener += 1;
        node.listeners.push((listener_id, listener));
        Some(listener_id)
    }

    /// Removes exactly the listener with the given identity.
    pub fn remove_click_listener(&mut self, id: NodeId, listener: ListenerId) -> bool {
        match self.nodes.get_mut(&id) {
            Some(node) => {
                let before = node.listeners.len();
                node.listeners.retain(|(lid, _)| *lid != listener);
                node.listeners.len() != before
            }
            None => false,
        }
    }

    /// Returns the number of click listeners installed on a node.
    pub fn listener_count(&self, id: NodeId) -> usize {
        self.nodes.get(&id).map(|n| n.listeners.len()).unwrap_or(0)
    }

    /// Dispatches a click to an attached node.
    ///
    /// Listeners run in install order until one stops propagation. If no
    /// listener prevented the default action and the node carries a
    /// non-empty href, the default navigation (honoring the node's
    /// `target` attribute) is recorded; a listener-requested navigation is
    /// recorded as same-document instead.
    pub fn dispatch_click(&mut self, id: NodeId, mut event: ClickEvent) -> Option<ClickOutcome> {
        if !self.is_attached(id) {
            return None;
        }
        let node = self.nodes.get(&id)?;
        let href = node.attrs.get("href").cloned();
        let target = node.attrs.get("target").cloned();
        let listeners: Vec<ClickListener> =
            node.listeners.iter().map(|(_, l)| Arc::clone(l)).collect();

        for listener in listeners {
            if event.propagation_stopped {
                break;
            }
            listener(&mut event, href.as_deref());
        }

        let navigation = if let Some(requested) = event.requested_navigation.clone() {
            Some(Navigation {
                href: requested,
                target: None,
            })
        } else if !event.default_prevented {
            match href {
                Some(h) if !h.is_empty() => Some(Navigation {
                    href: h,
                    target,
                }),
                _ => None,
            }
        } else {
            None
        };

        if let Some(nav) = &navigation {
            self.navigations.push(nav.clone());
        }

        Some(ClickOutcome {
            default_prevented: event.default_prevented,
            navigation,
        })
    }

    /// Returns the most recent navigation, if any.
    pub fn last_navigation(&self) -> Option<&Navigation> {
        self.navigations.last()
    }

    /// Subscribes to structural change events.
    pub fn subscribe(&mut self) -> UnboundedReceiver<DocumentEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    fn emit(&mut self, event: DocumentEvent) {
        self.subscribers.retain(|tx| tx.send(event).is_ok());
    }
}
