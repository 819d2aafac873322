//! Plain observer list for change notifications.
//!
//! Producers (digital lines, the tag detector) own a [`Listeners`] and call
//! [`Listeners::notify`] on every state transition.  Subscribers are boxed
//! closures run in subscription order on the reactor thread.

pub struct Listeners<T> {
    subs: Vec<Box<dyn FnMut(&T)>>,
}

impl<T> Default for Listeners<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Listeners<T> {
    pub fn new() -> Self {
        Self { subs: Vec::new() }
    }

    pub fn subscribe(&mut self, f: impl FnMut(&T) + 'static) {
        self.subs.push(Box::new(f));
    }

    pub fn notify(&mut self, value: &T) {
        for f in &mut self.subs {
            f(value);
        }
    }

    pub fn len(&self) -> usize {
        self.subs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subs.is_empty()
    }
}

impl<T> core::fmt::Debug for Listeners<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Listeners({})", self.subs.len())
    }
}
