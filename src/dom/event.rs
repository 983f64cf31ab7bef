//! EventTarget registration and the capture/target/bubble dispatch path,
//! with composed-path construction and shadow retargeting.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use log::trace;

use crate::dom::{
    Document, DomError, DomResult, LocalName, NodeData, NodeId,
};

/// A host callback invoked during dispatch. Closure capture carries any
/// listener context; identity for removal is the `Rc` pointer.
pub type ListenerFn = Rc<dyn Fn(&mut Document, &mut Event)>;

/// Options accepted by [`Document::add_event_listener`].
#[derive(Clone, Default)]
pub struct ListenerOpts {
    pub capture: bool,
    pub once: bool,
    pub passive: bool,
    pub signal: Option<AbortSignal>,
}

#[derive(Clone)]
pub(crate) struct Listener {
    pub(crate) etype: LocalName,
    pub(crate) callback: ListenerFn,
    pub(crate) capture: bool,
    pub(crate) once: bool,
    pub(crate) passive: bool,
    pub(crate) signal: Option<AbortSignal>,
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("etype", &self.etype)
            .field("capture", &self.capture)
            .field("once", &self.once)
            .field("passive", &self.passive)
            .finish()
    }
}

/// A value-level cancellation capability for listener registration.
#[derive(Clone, Debug, Default)]
pub struct AbortSignal {
    aborted: Rc<Cell<bool>>,
}

impl AbortSignal {
    pub fn aborted(&self) -> bool {
        self.aborted.get()
    }
}

/// Fires an [`AbortSignal`]; registered listeners are removed before
/// their next invocation.
#[derive(Debug, Default)]
pub struct AbortController {
    signal: AbortSignal,
}

impl AbortController {
    pub fn new() -> AbortController {
        AbortController::default()
    }

    pub fn signal(&self) -> AbortSignal {
        self.signal.clone()
    }

    pub fn abort(&self) {
        self.signal.aborted.set(true);
    }
}

/// Dispatch phase, exposed through [`Event::event_phase`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EventPhase {
    None,
    Capturing,
    AtTarget,
    Bubbling,
}

/// Construction options for [`Event::new`].
#[derive(Copy, Clone, Debug, Default)]
pub struct EventInit {
    pub bubbles: bool,
    pub cancelable: bool,
    pub composed: bool,
}

/// An event value dispatched through the tree.
pub struct Event {
    etype: LocalName,
    bubbles: bool,
    cancelable: bool,
    composed: bool,
    is_trusted: bool,
    target: Option<NodeId>,
    current_target: Option<NodeId>,
    phase: EventPhase,
    pub(crate) dispatching: bool,
    stop_propagation: bool,
    stop_immediate: bool,
    canceled: bool,
    in_passive: bool,
    path: Vec<NodeId>,
}

impl Event {
    pub fn new(etype: &str, init: EventInit) -> Event {
        Event {
            etype: LocalName::from(etype),
            bubbles: init.bubbles,
            cancelable: init.cancelable,
            composed: init.composed,
            is_trusted: false,
            target: None,
            current_target: None,
            phase: EventPhase::None,
            dispatching: false,
            stop_propagation: false,
            stop_immediate: false,
            canceled: false,
            in_passive: false,
            path: Vec::new(),
        }
    }

    pub fn event_type(&self) -> &str {
        &self.etype
    }

    pub fn bubbles(&self) -> bool {
        self.bubbles
    }

    pub fn cancelable(&self) -> bool {
        self.cancelable
    }

    pub fn composed(&self) -> bool {
        self.composed
    }

    pub fn is_trusted(&self) -> bool {
        self.is_trusted
    }

    /// The (possibly retargeted) event target for the current listener.
    pub fn target(&self) -> Option<NodeId> {
        self.target
    }

    pub fn current_target(&self) -> Option<NodeId> {
        self.current_target
    }

    pub fn event_phase(&self) -> EventPhase {
        self.phase
    }

    /// Halt propagation after the current node's listeners run.
    pub fn stop_propagation(&mut self) {
        self.stop_propagation = true;
    }

    /// Halt propagation immediately, skipping remaining listeners on the
    /// current node.
    pub fn stop_immediate_propagation(&mut self) {
        self.stop_propagation = true;
        self.stop_immediate = true;
    }

    /// Set the canceled flag, when the event is cancelable and the
    /// current listener is not passive.
    pub fn prevent_default(&mut self) {
        if self.cancelable && !self.in_passive {
            self.canceled = true;
        }
    }

    pub fn default_prevented(&self) -> bool {
        self.canceled
    }

    /// The propagation path of the in-flight dispatch, innermost first;
    /// empty outside dispatch.
    pub fn composed_path(&self) -> &[NodeId] {
        &self.path
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("type", &self.etype)
            .field("bubbles", &self.bubbles)
            .field("composed", &self.composed)
            .field("phase", &self.phase)
            .field("canceled", &self.canceled)
            .finish()
    }
}

/// EventTarget registration and dispatch.
impl Document {
    /// Register a listener. Listeners on one node fire in registration
    /// order; duplicate `(type, callback, capture)` registrations are
    /// ignored.
    pub fn add_event_listener(
        &mut self,
        target: NodeId,
        etype: &str,
        callback: ListenerFn,
        opts: ListenerOpts)
    {
        let etype = LocalName::from(etype);
        let listeners = &mut self[target].rare_mut().listeners;
        let dup = listeners.iter().any(|l| {
            l.etype == etype
                && l.capture == opts.capture
                && Rc::ptr_eq(&l.callback, &callback)
        });
        if dup {
            return;
        }
        listeners.push(Listener {
            etype,
            callback,
            capture: opts.capture,
            once: opts.once,
            passive: opts.passive,
            signal: opts.signal,
        });
    }

    /// Remove a listener by `(type, callback, capture)` identity.
    pub fn remove_event_listener(
        &mut self,
        target: NodeId,
        etype: &str,
        callback: &ListenerFn,
        capture: bool)
    {
        let etype = LocalName::from(etype);
        if let Some(r) = self[target].rare.as_mut() {
            r.listeners.retain(|l| {
                !(l.etype == etype
                    && l.capture == capture
                    && Rc::ptr_eq(&l.callback, callback))
            });
        }
    }

    /// Dispatch an event at `target`: capture from the root, at-target,
    /// then bubble, with shadow-boundary path truncation and target
    /// retargeting.
    ///
    /// Returns `Ok(false)` iff a listener canceled the event.
    pub fn dispatch_event(&mut self, target: NodeId, event: &mut Event)
        -> DomResult<bool>
    {
        if event.dispatching {
            return Err(DomError::InvalidState);
        }
        event.dispatching = true;
        event.stop_propagation = false;
        event.stop_immediate = false;

        // Path from target to root, stopping at the first shadow root
        // when the event is not composed.
        let mut path: Vec<NodeId> = Vec::new();
        let mut cur = Some(target);
        while let Some(n) = cur {
            path.push(n);
            cur = match self[n].parent {
                Some(p) => Some(p),
                None => match &self[n].data {
                    NodeData::Shadow(s) if event.composed => Some(s.host),
                    _ => None,
                },
            };
        }
        let adjusted: Vec<NodeId> = path.iter()
            .map(|n| self.retarget(target, *n))
            .collect();
        event.path = path.clone();
        trace!("dispatch {:?}: path len {}", event.etype, path.len());

        // Capture phase, root towards target.
        'capture: for i in (1..path.len()).rev() {
            event.phase = EventPhase::Capturing;
            if !self.invoke_listeners(path[i], adjusted[i], event, true) {
                break 'capture;
            }
        }
        // Target phase.
        if !event.stop_propagation {
            event.phase = EventPhase::AtTarget;
            self.invoke_listeners(path[0], adjusted[0], event, false);
        }
        // Bubble phase, target towards root.
        if event.bubbles && !event.stop_propagation {
            'bubble: for i in 1..path.len() {
                event.phase = EventPhase::Bubbling;
                if !self.invoke_listeners(path[i], adjusted[i], event, false)
                {
                    break 'bubble;
                }
            }
        }

        event.dispatching = false;
        event.phase = EventPhase::None;
        event.current_target = None;
        event.stop_propagation = false;
        event.stop_immediate = false;
        event.path.clear();
        Ok(!event.canceled)
    }

    // Invoke the node's listeners for the current phase. `capture_only`
    // selects capture listeners (capture phase); at-target and bubble
    // pass false. At-target additionally runs capture listeners, per the
    // phase rules. Returns false when propagation must halt.
    fn invoke_listeners(
        &mut self,
        node: NodeId,
        adjusted_target: NodeId,
        event: &mut Event,
        capture_only: bool)
        -> bool
    {
        let at_target = event.phase == EventPhase::AtTarget;
        let snapshot: Vec<Listener> = match self[node].rare.as_ref() {
            Some(r) => r.listeners.iter()
                .filter(|l| l.etype == event.etype)
                .filter(|l| at_target || l.capture == capture_only)
                .cloned()
                .collect(),
            None => return true,
        };
        if snapshot.is_empty() {
            return true;
        }
        event.current_target = Some(node);
        event.target = Some(adjusted_target);
        for l in snapshot {
            if let Some(sig) = &l.signal {
                if sig.aborted() {
                    self.remove_event_listener(
                        node, &l.etype, &l.callback, l.capture);
                    continue;
                }
            }
            // A listener removed by an earlier callback in this list must
            // not fire.
            let still = self[node].rare.as_ref()
                .map(|r| r.listeners.iter().any(|x| {
                    x.etype == l.etype
                        && x.capture == l.capture
                        && Rc::ptr_eq(&x.callback, &l.callback)
                }))
                .unwrap_or(false);
            if !still {
                continue;
            }
            if l.once {
                self.remove_event_listener(
                    node, &l.etype, &l.callback, l.capture);
            }
            event.in_passive = l.passive;
            (l.callback)(self, event);
            event.in_passive = false;
            if event.stop_immediate {
                return false;
            }
        }
        !event.stop_propagation
    }

    /// Retarget `target` against `observer`: the nearest shadow-including
    /// ancestor of `target` whose tree also contains `observer`.
    pub(crate) fn retarget(&self, target: NodeId, observer: NodeId)
        -> NodeId
    {
        let mut a = target;
        loop {
            let root = self.plain_root(a);
            let is_shadow = self[root].is_shadow_root();
            if !is_shadow || self.is_host_including_ancestor(root, observer) {
                return a;
            }
            a = match &self[root].data {
                NodeData::Shadow(s) => s.host,
                _ => return a,
            };
        }
    }
}
