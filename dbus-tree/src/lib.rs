//! Object-tree dispatch engine for D-Bus services.
//!
//! [`Tree`] owns the [`NodeStore`] and the re-entrancy bookkeeping
//! (`nodes_modified`, `iteration_counter`) described in the module docs of
//! [`node`] and [`dispatch`]. Everything runs on one thread: registration
//! methods borrow the store just long enough to mutate it, and dispatch
//! drops its borrow before calling into any user handler, so a handler that
//! calls back into `add_object_vtable` (etc.) from within its own
//! invocation works the way the original's single-threaded `sd_bus` does.

pub mod access;
pub mod credentials;
pub mod dispatch;
pub mod enumerator;
pub mod error;
pub mod node;
pub mod signals;
pub mod stdiface;
pub mod vtable;

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::sync::Arc;

use dbus::strings::{Interface as IfaceName, Path};

pub use crate::credentials::{Capability, Credentials, CredentialsProvider, CredsMask, NullCredentials};
pub use crate::error::{EmitError, MethodErr, MethodResult, RegistrationError};
pub use crate::node::{CallbackFn, EnumeratorFn, Finder, MethodInfo, PropInfo, UserData};
pub use crate::vtable::{Flags, VtableEntry};

use crate::node::{NodeStore, RESERVED_INTERFACES};

/// The object tree. One instance per bus connection (spec §5: "exactly one
/// dispatcher per bus connection").
pub struct Tree {
    store: RefCell<NodeStore>,
    nodes_modified: Cell<bool>,
    iteration_counter: Cell<u64>,
    trusted: Cell<bool>,
    creds: Box<dyn CredentialsProvider>,
}

impl Tree {
    /// A tree with no credentials provider configured (`trusted` calls only —
    /// any non-trusted, non-`UNPRIVILEGED` access check will fail to query
    /// credentials via [`NullCredentials`]).
    pub fn new() -> Tree {
        Tree::with_credentials(Box::new(NullCredentials))
    }

    pub fn with_credentials(creds: Box<dyn CredentialsProvider>) -> Tree {
        Tree {
            store: RefCell::new(NodeStore::default()),
            nodes_modified: Cell::new(false),
            iteration_counter: Cell::new(0),
            trusted: Cell::new(false),
            creds,
        }
    }

    /// Mark this tree as bus-trusted: all access checks short-circuit to
    /// allow (spec §4.3 step 1). Used for e.g. a private peer-to-peer
    /// connection where the remote end is already fully trusted.
    pub fn trusted(self, trusted: bool) -> Tree {
        self.trusted.set(trusted);
        self
    }

    pub fn is_trusted(&self) -> bool { self.trusted.get() }

    pub(crate) fn store(&self) -> Ref<NodeStore> { self.store.borrow() }
    pub(crate) fn store_mut(&self) -> RefMut<NodeStore> { self.store.borrow_mut() }
    pub(crate) fn creds(&self) -> &dyn CredentialsProvider { &*self.creds }

    pub(crate) fn mark_modified(&self) { self.nodes_modified.set(true); }
    pub(crate) fn nodes_modified(&self) -> bool { self.nodes_modified.get() }
    pub(crate) fn clear_modified(&self) { self.nodes_modified.set(false); }

    pub(crate) fn bump_iteration(&self) -> u64 {
        let next = self.iteration_counter.get() + 1;
        self.iteration_counter.set(next);
        next
    }
    pub(crate) fn iteration(&self) -> u64 { self.iteration_counter.get() }

    // --- Registration API (spec §6) ---

    pub fn add_object(&self, path: &Path<'static>, handler: Arc<CallbackFn>, userdata: Option<UserData>) {
        self.store_mut().add_object(path, handler, userdata, false);
        self.mark_modified();
    }

    pub fn remove_object<F: Fn(&node::NodeCallback) -> bool>(&self, path: &Path<'static>, pred: F) -> bool {
        let removed = self.store_mut().remove_object(path, false, pred);
        if removed { self.mark_modified(); }
        removed
    }

    pub fn add_fallback(&self, prefix: &Path<'static>, handler: Arc<CallbackFn>, userdata: Option<UserData>) {
        self.store_mut().add_object(prefix, handler, userdata, true);
        self.mark_modified();
    }

    pub fn remove_fallback<F: Fn(&node::NodeCallback) -> bool>(&self, prefix: &Path<'static>, pred: F) -> bool {
        let removed = self.store_mut().remove_object(prefix, true, pred);
        if removed { self.mark_modified(); }
        removed
    }

    pub fn add_object_vtable(
        &self, path: &Path<'static>, interface: IfaceName<'static>, entries: Arc<Vec<VtableEntry>>,
        userdata: Option<UserData>,
    ) -> Result<(), RegistrationError> {
        self.store_mut().add_vtable(path, interface, entries, userdata, false, None)?;
        self.mark_modified();
        Ok(())
    }

    pub fn add_fallback_vtable(
        &self, path: &Path<'static>, interface: IfaceName<'static>, entries: Arc<Vec<VtableEntry>>,
        userdata: Option<UserData>, find: Option<Finder>,
    ) -> Result<(), RegistrationError> {
        self.store_mut().add_vtable(path, interface, entries, userdata, true, find)?;
        self.mark_modified();
        Ok(())
    }

    pub fn remove_vtable(&self, path: &Path<'static>, interface: &IfaceName<'static>, entries: &Arc<Vec<VtableEntry>>) -> bool {
        let removed = self.store_mut().remove_vtable(path, interface, entries);
        if removed { self.mark_modified(); }
        removed
    }

    pub fn add_node_enumerator(&self, path: &Path<'static>, callback: Arc<EnumeratorFn>) {
        self.store_mut().add_node_enumerator(path, callback);
        self.mark_modified();
    }

    pub fn remove_node_enumerator(&self, path: &Path<'static>) -> bool {
        let removed = self.store_mut().remove_node_enumerator(path);
        if removed { self.mark_modified(); }
        removed
    }

    pub fn add_object_manager(&self, path: &Path<'static>) -> bool {
        let added = self.store_mut().add_object_manager(path);
        if added { self.mark_modified(); }
        added
    }

    pub fn remove_object_manager(&self, path: &Path<'static>) -> bool {
        let removed = self.store_mut().remove_object_manager(path);
        if removed { self.mark_modified(); }
        removed
    }

    /// `emit_properties_changed_strv` (spec §4.8, §9 open question). Returns
    /// `Ok(messages)` with exactly one signal as soon as any vtable matched;
    /// `Err(MethodErr::unknown_object)`-shaped `ENOENT` if none ever did, on
    /// any restart attempt.
    pub fn emit_properties_changed_strv(&self, path: &Path<'static>, interface: &IfaceName<'static>, names: &[&str]) -> Result<Vec<dbus::Message>, EmitError> {
        signals::properties_changed(self, path, interface, names)
    }

    pub fn emit_interfaces_added_strv(&self, path: &Path<'static>, interfaces: &[&str]) -> Result<Vec<dbus::Message>, EmitError> {
        signals::interfaces_added(self, path, interfaces)
    }

    pub fn emit_interfaces_removed_strv(&self, path: &Path<'static>, interfaces: &[&str]) -> Vec<dbus::Message> {
        signals::interfaces_removed(path, interfaces)
    }

    /// `process_object` (spec §4.2): locate and run the handler(s) for an
    /// incoming method call, returning zero or more reply/error messages.
    pub fn process_object(&self, msg: &dbus::Message) -> Vec<dbus::Message> {
        dispatch::process_object(self, msg)
    }
}

impl Default for Tree {
    fn default() -> Tree { Tree::new() }
}

pub(crate) fn is_reserved(name: &IfaceName<'static>) -> bool {
    RESERVED_INTERFACES.contains(&&***name)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::vtable::VtableEntry;
    use dbus::strings::{Member, Signature};

    #[test]
    fn tree_defaults_to_untrusted() {
        let t = Tree::new();
        assert!(!t.is_trusted());
    }

    #[test]
    fn add_object_vtable_rejects_reserved_interface() {
        let t = Tree::new();
        let entries = Arc::new(vec![VtableEntry::Start { element_size: 1, flags: Flags::empty() }]);
        let err = t.add_object_vtable(
            &Path::new("/x").unwrap(),
            IfaceName::new("org.freedesktop.DBus.Introspectable").unwrap(),
            entries, None,
        ).unwrap_err();
        assert_eq!(err, RegistrationError::ReservedInterface("org.freedesktop.DBus.Introspectable".into()));
    }

    #[test]
    fn add_object_vtable_marks_modified() {
        let t = Tree::new();
        let entries = Arc::new(vec![
            VtableEntry::Start { element_size: 2, flags: Flags::empty() },
            VtableEntry::Method {
                member: Member::new("M").unwrap(),
                in_sig: Signature::new("").unwrap(),
                out_sig: Signature::new("").unwrap(),
                handler: Some(Arc::new(|_| Ok(vec![]))),
                flags: Flags::empty(),
            },
        ]);
        assert!(!t.nodes_modified());
        t.add_object_vtable(&Path::new("/x").unwrap(), IfaceName::new("com.x.I").unwrap(), entries, None).unwrap();
        assert!(t.nodes_modified());
    }
}
