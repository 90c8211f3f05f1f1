//! Listener registry and multicast dispatch.
//!
//! Listeners are kept per [`EventKind`] in registration order and are never removed. A
//! dispatch works on a snapshot of the list, so a listener may subscribe new listeners or
//! trigger further events without disturbing the dispatch in progress.

use std::{cell::RefCell, fmt, rc::Rc};

use rustc_hash::FxHashMap;
use strum::IntoEnumIterator;

use crate::{
    error::{Result, RuntimeError},
    event::{Event, EventKind, ALL},
    interpreter::Interpreter,
    value::Value,
};

/// A subscriber. `Some` asks the hook to use the returned value in place of the original
/// one; the kinds that do not support replacement ignore it.
pub type Listener = Rc<dyn Fn(&mut Interpreter, &Event) -> Result<Option<Value>>>;

#[derive(Default)]
pub struct ListenerRegistry {
    listeners: FxHashMap<EventKind, Vec<Listener>>,
}

impl ListenerRegistry {
    pub fn add(&mut self, kind: EventKind, listener: Listener) {
        self.listeners.entry(kind).or_default().push(listener);
    }

    pub fn listeners(&self, kind: EventKind) -> &[Listener] {
        self.listeners.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn len(&self, kind: EventKind) -> usize {
        self.listeners(kind).len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.values().all(Vec::is_empty)
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for kind in EventKind::iter() {
            map.entry(&kind, &self.len(kind));
        }
        map.finish()
    }
}

/// Shared handle to a [`ListenerRegistry`].
#[derive(Clone, Debug, Default)]
pub struct EventBus {
    registry: Rc<RefCell<ListenerRegistry>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for the kind named `target`, or for every kind when `target` is
    /// `"all"`.
    pub fn subscribe(&self, target: &str, listener: Listener) -> Result<()> {
        if target == ALL {
            let mut registry = self.registry.borrow_mut();
            for kind in EventKind::iter() {
                registry.add(kind, listener.clone());
            }
            return Ok(());
        }
        let kind = target
            .parse::<EventKind>()
            .map_err(|_| RuntimeError::UnknownEvent(target.to_string()))?;
        self.on(kind, listener);
        Ok(())
    }

    pub fn on(&self, kind: EventKind, listener: Listener) {
        trace!(%kind, "subscribing listener");
        self.registry.borrow_mut().add(kind, listener);
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.registry.borrow().len(kind)
    }

    /// Deliver `event` to every listener of its kind, in registration order.
    ///
    /// Returns the first registered listener's result; results of later listeners are
    /// dropped.
    pub fn dispatch(&self, interpreter: &mut Interpreter, event: &Event) -> Result<Option<Value>> {
        let listeners = self.registry.borrow().listeners(event.kind()).to_vec();
        let mut listeners = listeners.into_iter();
        let Some(first) = listeners.next() else {
            return Ok(None);
        };
        let result = first(interpreter, event)?;
        for listener in listeners {
            listener(interpreter, event)?;
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alloc() -> Event {
        Event::Alloc {
            object: Value::Null,
            tag: "{}".to_string(),
            location: "t.js@1.0-1.2".to_string(),
        }
    }

    fn recording(
        log: &Rc<RefCell<Vec<&'static str>>>,
        name: &'static str,
        result: Option<f64>,
    ) -> Listener {
        let log = log.clone();
        Rc::new(move |_: &mut Interpreter, _: &Event| {
            log.borrow_mut().push(name);
            Ok(result.map(Value::Number))
        })
    }

    #[test]
    fn test_dispatch_without_listeners() {
        let bus = EventBus::new();
        let mut interpreter = Interpreter::new();
        assert_eq!(bus.dispatch(&mut interpreter, &alloc()).unwrap(), None);
    }

    #[test]
    fn test_multicast_order_and_result() {
        let bus = EventBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        bus.subscribe("alloc", recording(&log, "first", Some(1.0))).unwrap();
        bus.subscribe("alloc", recording(&log, "second", Some(2.0))).unwrap();
        bus.subscribe("propRead", recording(&log, "other", None)).unwrap();

        let mut interpreter = Interpreter::new();
        let result = bus.dispatch(&mut interpreter, &alloc()).unwrap();
        assert_eq!(result, Some(Value::Number(1.0)));
        assert_eq!(*log.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn test_subscribe_all() {
        let bus = EventBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        bus.subscribe(ALL, recording(&log, "all", None)).unwrap();
        for kind in EventKind::iter() {
            assert_eq!(bus.listener_count(kind), 1);
        }
    }

    #[test]
    fn test_unknown_event() {
        let bus = EventBus::new();
        let listener: Listener = Rc::new(|_: &mut Interpreter, _: &Event| Ok(None));
        let err = bus.subscribe("propDelete", listener).unwrap_err();
        assert!(matches!(err, RuntimeError::UnknownEvent(name) if name == "propDelete"));
    }

    #[test]
    fn test_reentrant_subscription() {
        let bus = EventBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let inner_bus = bus.clone();
        let inner_log = log.clone();
        bus.on(
            EventKind::Alloc,
            Rc::new(move |_: &mut Interpreter, _: &Event| {
                inner_bus.on(EventKind::Alloc, recording(&inner_log, "late", None));
                Ok(None)
            }),
        );

        let mut interpreter = Interpreter::new();
        bus.dispatch(&mut interpreter, &alloc()).unwrap();
        assert!(log.borrow().is_empty());
        bus.dispatch(&mut interpreter, &alloc()).unwrap();
        assert_eq!(*log.borrow(), vec!["late"]);
        assert_eq!(bus.listener_count(EventKind::Alloc), 3);
    }
}
