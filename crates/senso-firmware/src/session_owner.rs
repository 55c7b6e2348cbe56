//! The narrow view of the Senso handle the updater is allowed to touch.
//! Keeps the updater from reaching into the handle's internals: it may only
//! disconnect the active session and flip the in-progress flag.

pub trait SessionOwner: Send + Sync {
    fn disconnect(&self);
    fn is_updating(&self) -> bool;
    fn set_updating(&self, updating: bool);
}
