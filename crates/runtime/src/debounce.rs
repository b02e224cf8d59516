/// Trailing-edge debouncer driven by caller-supplied timestamps (ms).
///
/// `push` replaces any pending value; `poll` yields the latest value once no
/// new value has arrived for `quiet_ms`.
#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    quiet_ms: u64,
    pending: Option<(T, u64)>,
    coalesced: u64,
}

impl<T> Debouncer<T> {
    pub fn new(quiet_ms: u64) -> Self {
        Self {
            quiet_ms,
            pending: None,
            coalesced: 0,
        }
    }

    pub fn quiet_ms(&self) -> u64 {
        self.quiet_ms
    }

    pub fn push(&mut self, value: T, now_ms: u64) {
        if self.pending.is_some() {
            self.coalesced += 1;
        }
        self.pending = Some((value, now_ms));
    }

    /// Returns the pending value if the quiet window has elapsed.
    pub fn poll(&mut self, now_ms: u64) -> Option<T> {
        let (_, at) = self.pending.as_ref()?;
        if now_ms.saturating_sub(*at) < self.quiet_ms {
            return None;
        }
        self.pending.take().map(|(v, _)| v)
    }

    /// Earliest time at which `poll` can yield.
    pub fn deadline_ms(&self) -> Option<u64> {
        self.pending.as_ref().map(|(_, at)| at + self.quiet_ms)
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Number of values dropped because a newer one replaced them.
    pub fn coalesced(&self) -> u64 {
        self.coalesced
    }
}
