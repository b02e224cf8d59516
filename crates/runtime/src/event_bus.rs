/// An event tagged with its position in the bus' total order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequenced<E> {
    pub seq: u64,
    pub event: E,
}

/// Ordered, drainable event queue.
///
/// Producers (e.g. a rendering surface signalling "style finished loading")
/// `emit`; the single consumer `drain`s and feeds events to its transition
/// function. Sequence numbers are never reused, even across drains.
#[derive(Debug)]
pub struct EventBus<E> {
    next_seq: u64,
    events: Vec<Sequenced<E>>,
}

impl<E> EventBus<E> {
    pub fn new() -> Self {
        Self {
            next_seq: 0,
            events: Vec::new(),
        }
    }

    pub fn emit(&mut self, event: E) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.events.push(Sequenced { seq, event });
        seq
    }

    pub fn events(&self) -> &[Sequenced<E>] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn drain(&mut self) -> Vec<Sequenced<E>> {
        std::mem::take(&mut self.events)
    }
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::EventBus;

    #[test]
    fn records_events_in_order() {
        let mut bus = EventBus::new();
        bus.emit("load");
        bus.emit("style.load");
        let kinds: Vec<_> = bus.events().iter().map(|e| e.event).collect();
        assert_eq!(kinds, vec!["load", "style.load"]);
        assert_eq!(bus.events()[1].seq, 1);
    }

    #[test]
    fn drain_clears_events_but_keeps_sequence() {
        let mut bus = EventBus::new();
        bus.emit(1u8);
        let drained = bus.drain();
        assert_eq!(drained.len(), 1);
        assert!(bus.is_empty());
        assert_eq!(bus.emit(2u8), 1);
    }
}
