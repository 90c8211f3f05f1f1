use std::{cell::RefCell, collections::BTreeMap, fmt, rc::Rc};

use strum::IntoEnumIterator;

use super::Consumer;
use crate::{
    error::Result,
    event::{Event, EventKind, ALL},
    interpreter::Interpreter,
    registry::EventBus,
};

/// Counts events per kind.
#[derive(Clone, Debug, Default)]
pub struct EventCounter {
    counts: Rc<RefCell<BTreeMap<EventKind, u64>>>,
}

impl EventCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, kind: EventKind) -> u64 {
        self.counts.borrow().get(&kind).copied().unwrap_or_default()
    }

    pub fn total(&self) -> u64 {
        self.counts.borrow().values().sum()
    }

    /// Counts of every kind, zero included.
    pub fn snapshot(&self) -> BTreeMap<EventKind, u64> {
        EventKind::iter().map(|kind| (kind, self.count(kind))).collect()
    }

    fn record(&self, kind: EventKind) {
        *self.counts.borrow_mut().entry(kind).or_default() += 1;
    }
}

impl Consumer for EventCounter {
    fn attach(&self, bus: &EventBus, _interpreter: &mut Interpreter) -> Result<()> {
        let counter = self.clone();
        bus.subscribe(
            ALL,
            Rc::new(move |_: &mut Interpreter, event: &Event| {
                counter.record(event.kind());
                Ok(None)
            }),
        )
    }
}

impl fmt::Display for EventCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.snapshot();
        let width = snapshot.keys().map(|kind| kind.as_ref().len()).max().unwrap_or_default();
        for (i, (kind, count)) in snapshot.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{:<width$}  {count}", kind.as_ref())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_counts_every_kind() {
        let bus = EventBus::new();
        let mut interpreter = Interpreter::new();
        let counter = EventCounter::new();
        counter.attach(&bus, &mut interpreter).unwrap();

        let read = Event::PropRead { object: Value::Null, key: "k".into(), location: "l".into() };
        bus.dispatch(&mut interpreter, &read).unwrap();
        bus.dispatch(&mut interpreter, &read).unwrap();
        let defined = Event::FunctionDefined { function: Value::Null, location: "l".into() };
        bus.dispatch(&mut interpreter, &defined).unwrap();

        assert_eq!(counter.count(EventKind::PropRead), 2);
        assert_eq!(counter.count(EventKind::FunctionDefined), 1);
        assert_eq!(counter.count(EventKind::Alloc), 0);
        assert_eq!(counter.total(), 3);
        assert_eq!(counter.snapshot().len(), 10);
        assert!(counter.to_string().contains("propRead         2"));
    }
}
