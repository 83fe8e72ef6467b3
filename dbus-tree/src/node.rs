//! The Node Store and Registration API (spec §3, §4.1).
//!
//! Nodes are kept in a flat `HashMap<Path, Node>` rather than as an intrusive
//! tree of parent/child pointers: the fallback-prefix scan in the dispatch
//! engine only ever needs to ask "is there a node registered at this *string*
//! prefix of the path", and static children for introspection only need to
//! ask "which registered paths start with this prefix" — both are answered
//! directly by iterating the map, so no node needs to exist merely to anchor
//! its descendants. A `Node` exists exactly when spec §3's invariant says it
//! should: when at least one of its callback/vtable/enumerator lists is
//! non-empty, or it's marked as an object manager.

use std::any::Any;
use std::cell::Cell;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use dbus::Message;
use dbus::strings::{Interface as IfaceName, Member, Path};

use crate::error::RegistrationError;
use crate::vtable::VtableEntry;

/// Opaque per-registration data. Replaces the original's `void *userdata`;
/// handlers receive it and downcast with `Any` rather than doing pointer
/// arithmetic.
pub type UserData = Arc<dyn Any + Send + Sync>;

/// Maps an incoming path to concrete userdata for a fallback vtable, the way
/// `find` does in the original — this is what turns one fallback registration
/// into per-object fan-out. Returns `None` when this vtable does not in fact
/// cover the given path.
pub type Finder = Arc<dyn Fn(&Path<'static>) -> Option<UserData> + Send + Sync>;

pub type CallbackFn = dyn Fn(&Message, &UserData) -> i32 + Send + Sync;
pub type EnumeratorFn = dyn Fn(&Path<'static>) -> Vec<Path<'static>> + Send + Sync;

fn no_data() -> UserData { Arc::new(()) }

pub struct NodeCallback {
    pub handler: Arc<CallbackFn>,
    pub userdata: UserData,
    pub is_fallback: bool,
    pub(crate) last_iteration: Cell<u64>,
}

pub struct NodeVtable {
    pub interface: IfaceName<'static>,
    pub entries: Arc<Vec<VtableEntry>>,
    pub userdata: UserData,
    pub find: Option<Finder>,
    pub is_fallback: bool,
}

impl NodeVtable {
    /// Resolve userdata for `path`: via `find` if present, else the vtable's
    /// own userdata (spec §4.1 `NodeVtable`).
    pub fn resolve(&self, path: &Path<'static>) -> Option<UserData> {
        match &self.find {
            Some(f) => f(path),
            None => Some(self.userdata.clone()),
        }
    }
}

pub struct NodeEnumerator {
    pub callback: Arc<EnumeratorFn>,
}

#[derive(Default)]
pub struct Node {
    pub callbacks: Vec<NodeCallback>,
    pub vtables: Vec<Arc<NodeVtable>>,
    pub enumerators: Vec<NodeEnumerator>,
    pub object_manager: bool,
}

impl Node {
    fn is_empty(&self) -> bool {
        self.callbacks.is_empty() && self.vtables.is_empty()
            && self.enumerators.is_empty() && !self.object_manager
    }
}

/// Index key for the method/property secondary indices (spec §3 "VtableMember index key").
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct MemberKey {
    pub path: Path<'static>,
    pub interface: IfaceName<'static>,
    pub member: String,
}

/// A secondary-index entry: which vtable (and which entry within it) answers
/// this `(path, interface, member)` triple.
///
/// `last_iteration` mirrors `vtable_member::last_iteration` in the original:
/// it guards METHOD calls and property `Set` against double-invocation if
/// dispatch restarts mid-call (spec §4.2, §4.4).
pub struct VtableMember {
    pub vtable: Arc<NodeVtable>,
    pub entry_index: usize,
    pub(crate) last_iteration: Cell<u64>,
}

impl Clone for VtableMember {
    fn clone(&self) -> Self {
        VtableMember { vtable: self.vtable.clone(), entry_index: self.entry_index, last_iteration: Cell::new(self.last_iteration.get()) }
    }
}

#[derive(Default)]
pub struct NodeStore {
    pub(crate) nodes: HashMap<Path<'static>, Node>,
    pub(crate) methods: HashMap<MemberKey, VtableMember>,
    pub(crate) properties: HashMap<MemberKey, VtableMember>,
}

impl NodeStore {
    pub fn get(&self, path: &Path<'static>) -> Option<&Node> { self.nodes.get(path) }

    pub fn contains(&self, path: &Path<'static>) -> bool { self.nodes.contains_key(path) }

    pub fn nodes_iter(&self) -> impl Iterator<Item = (&Path<'static>, &Node)> { self.nodes.iter() }

    fn node_mut(&mut self, path: &Path<'static>) -> &mut Node {
        self.nodes.entry(path.clone()).or_insert_with(Node::default)
    }

    fn gc(&mut self, path: &Path<'static>) {
        if self.nodes.get(path).map_or(false, Node::is_empty) {
            self.nodes.remove(path);
        }
    }

    pub fn add_object(&mut self, path: &Path<'static>, handler: Arc<CallbackFn>, userdata: Option<UserData>, is_fallback: bool) {
        self.node_mut(path).callbacks.push(NodeCallback {
            handler, userdata: userdata.unwrap_or_else(no_data), is_fallback,
            last_iteration: Cell::new(0),
        });
    }

    /// Remove the first callback matching `(is_fallback, predicate)`. Returns whether one was removed.
    pub fn remove_object<F: Fn(&NodeCallback) -> bool>(&mut self, path: &Path<'static>, is_fallback: bool, pred: F) -> bool {
        let removed = if let Some(node) = self.nodes.get_mut(path) {
            if let Some(pos) = node.callbacks.iter().position(|c| c.is_fallback == is_fallback && pred(c)) {
                node.callbacks.remove(pos);
                true
            } else { false }
        } else { false };
        if removed { self.gc(path); }
        removed
    }

    pub fn add_node_enumerator(&mut self, path: &Path<'static>, callback: Arc<EnumeratorFn>) {
        self.node_mut(path).enumerators.push(NodeEnumerator { callback });
    }

    pub fn remove_node_enumerator(&mut self, path: &Path<'static>) -> bool {
        let removed = if let Some(node) = self.nodes.get_mut(path) {
            if node.enumerators.is_empty() { false } else { node.enumerators.pop(); true }
        } else { false };
        if removed { self.gc(path); }
        removed
    }

    pub fn add_object_manager(&mut self, path: &Path<'static>) -> bool {
        let node = self.node_mut(path);
        if node.object_manager { return false; }
        node.object_manager = true;
        true
    }

    pub fn remove_object_manager(&mut self, path: &Path<'static>) -> bool {
        let removed = if let Some(node) = self.nodes.get_mut(path) {
            if node.object_manager { node.object_manager = false; true } else { false }
        } else { false };
        if removed { self.gc(path); }
        removed
    }

    /// Register a vtable after validating it (spec §4.1). Builds index entries
    /// inserted after any existing vtable for the same interface, keeping
    /// same-interface vtables contiguous (spec §5 ordering note).
    ///
    /// `entries` is an `Arc` (rather than a fresh `Vec`) so that callers can
    /// register the very same vtable array at several paths/interfaces, the
    /// way a `static const sd_bus_vtable[]` is reused across many objects in
    /// the original — and so that re-registering that same array is
    /// detectable as a duplicate by pointer identity (spec §4.1).
    pub fn add_vtable(
        &mut self,
        path: &Path<'static>,
        interface: IfaceName<'static>,
        entries: Arc<Vec<VtableEntry>>,
        userdata: Option<UserData>,
        is_fallback: bool,
        find: Option<Finder>,
    ) -> Result<(), RegistrationError> {
        if is_reserved_interface(&interface) {
            return Err(RegistrationError::ReservedInterface(interface.to_string()));
        }
        crate::vtable::validate(&entries)?;

        let node = self.node_mut(path);
        if let Some(existing) = node.vtables.first() {
            if existing.is_fallback != is_fallback {
                return Err(RegistrationError::MixedFallback);
            }
        }

        for existing in &node.vtables {
            if existing.interface == interface && Arc::ptr_eq(&existing.entries, &entries) {
                return Err(RegistrationError::DuplicateVtable);
            }
        }

        let vtable = Arc::new(NodeVtable {
            interface: interface.clone(),
            entries: entries.clone(),
            userdata: userdata.unwrap_or_else(no_data),
            find,
            is_fallback,
        });

        let insert_at = node.vtables.iter().rposition(|v| v.interface == interface)
            .map(|i| i + 1).unwrap_or(node.vtables.len());
        node.vtables.insert(insert_at, vtable.clone());

        for (idx, entry) in entries.iter().enumerate() {
            let key = MemberKey { path: path.clone(), interface: interface.clone(), member: String::new() };
            match entry {
                VtableEntry::Method { member, .. } => {
                    let key = MemberKey { member: member.to_string(), ..key };
                    self.methods.insert(key, VtableMember { vtable: vtable.clone(), entry_index: idx, last_iteration: Cell::new(0) });
                }
                VtableEntry::Property { member, .. } | VtableEntry::WritableProperty { member, .. } => {
                    let key = MemberKey { member: member.clone(), ..key };
                    self.properties.insert(key, VtableMember { vtable: vtable.clone(), entry_index: idx, last_iteration: Cell::new(0) });
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Remove a previously-registered vtable by interface + pointer identity of its entries.
    pub fn remove_vtable(&mut self, path: &Path<'static>, interface: &IfaceName<'static>, entries: &Arc<Vec<VtableEntry>>) -> bool {
        let removed = if let Some(node) = self.nodes.get_mut(path) {
            if let Some(pos) = node.vtables.iter().position(|v| &v.interface == interface && Arc::ptr_eq(&v.entries, entries)) {
                node.vtables.remove(pos);
                true
            } else { false }
        } else { false };
        if removed {
            self.methods.retain(|k, v| !(k.path == *path && k.interface == *interface && Arc::ptr_eq(&v.vtable.entries, entries)));
            self.properties.retain(|k, v| !(k.path == *path && k.interface == *interface && Arc::ptr_eq(&v.vtable.entries, entries)));
            self.gc(path);
        }
        removed
    }

    pub fn lookup_method(&self, path: &Path<'static>, interface: &IfaceName<'static>, member: &Member<'static>) -> Option<&VtableMember> {
        self.methods.get(&MemberKey { path: path.clone(), interface: interface.clone(), member: member.to_string() })
    }

    pub fn lookup_property(&self, path: &Path<'static>, interface: &IfaceName<'static>, member: &str) -> Option<&VtableMember> {
        self.properties.get(&MemberKey { path: path.clone(), interface: interface.clone(), member: member.to_string() })
    }

    /// True if `path` or any ancestor has `object_manager` set (spec §4.6/§4.7,
    /// and the original's `bus_find_parent_object_manager`).
    pub fn has_object_manager_ancestor(&self, path: &Path<'static>) -> bool {
        if self.nodes.get(path).map_or(false, |n| n.object_manager) { return true; }
        ascending_prefixes(path).any(|p| self.nodes.get(&p).map_or(false, |n| n.object_manager))
    }

    /// Static children directly registered under `prefix` (no enumerators —
    /// those are composed in by the enumerator walker). One level deep only,
    /// deduplicated the way the teacher's `Tree::children(..., direct_only)` does.
    pub fn static_children(&self, prefix: &Path<'static>) -> BTreeSet<Path<'static>> {
        let plen = if &**prefix == "/" { 1 } else { prefix.len() + 1 };
        let mut out: Vec<Path<'static>> = self.nodes.keys()
            .filter(|p| {
                let s: &str = p;
                s.starts_with(&**prefix) && s.len() > plen && s.as_bytes().get(plen - 1) == Some(&b'/')
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| (**a).cmp(&**b));
        let mut result = BTreeSet::new();
        let mut prev: Option<Path<'static>> = None;
        for p in out {
            let is_direct = prev.as_ref().map_or(true, |prev| {
                let s: &str = &p;
                !(s.starts_with(&**prev) && s.as_bytes().get(prev.len()) == Some(&b'/'))
            });
            if is_direct {
                result.insert(p.clone());
                prev = Some(p);
            }
        }
        result
    }

    pub fn set_modified(&self) {}
}

/// Yields every proper string-prefix of `path` that is itself a valid object
/// path, longest first (immediate parent up to `/`). Does not require a
/// `Node` to exist at any of them — the fallback scan (spec §4.2 step 3)
/// checks existence at each candidate itself.
pub fn ascending_prefixes(path: &Path<'static>) -> impl Iterator<Item = Path<'static>> {
    let s: String = (**path).to_string();
    let mut prefixes = Vec::new();
    if s != "/" {
        let mut segs: Vec<&str> = s.split('/').filter(|s| !s.is_empty()).collect();
        while !segs.is_empty() {
            segs.pop();
            let p = if segs.is_empty() { "/".to_string() } else { format!("/{}", segs.join("/")) };
            prefixes.push(p);
        }
    }
    prefixes.into_iter().filter_map(|p| Path::new(p).ok())
}

/// Context handed to a `METHOD` handler (spec §4.2 step (b)).
pub struct MethodInfo<'a> {
    pub msg: &'a Message,
    pub tree: &'a crate::Tree,
    pub path: &'a Path<'static>,
    pub interface: &'a IfaceName<'static>,
    pub member: &'a Member<'static>,
    pub data: UserData,
}

/// Context handed to a `PROPERTY`/`WRITABLE_PROPERTY` getter or setter (spec §4.4).
pub struct PropInfo<'a> {
    pub msg: &'a Message,
    pub tree: &'a crate::Tree,
    pub path: &'a Path<'static>,
    pub interface: &'a IfaceName<'static>,
    pub property: &'a str,
    pub data: UserData,
}

pub const RESERVED_INTERFACES: &[&str] = &[
    "org.freedesktop.DBus.Properties",
    "org.freedesktop.DBus.Introspectable",
    "org.freedesktop.DBus.Peer",
    "org.freedesktop.DBus.ObjectManager",
];

pub fn is_reserved_interface(name: &IfaceName<'static>) -> bool {
    RESERVED_INTERFACES.contains(&&***name)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ascending_prefixes_longest_first() {
        let p = Path::new("/a/b/c").unwrap();
        let v: Vec<String> = ascending_prefixes(&p).map(|p| (*p).to_string()).collect();
        assert_eq!(v, vec!["/a/b".to_string(), "/a".to_string(), "/".to_string()]);
    }

    #[test]
    fn ascending_prefixes_of_root_is_empty() {
        let p = Path::new("/").unwrap();
        assert_eq!(ascending_prefixes(&p).count(), 0);
    }

    #[test]
    fn gc_removes_empty_node() {
        let mut store = NodeStore::default();
        let path = Path::new("/x").unwrap();
        store.add_object(&path, Arc::new(|_, _| 0), None, false);
        assert!(store.contains(&path));
        assert!(store.remove_object(&path, false, |_| true));
        assert!(!store.contains(&path));
    }

    #[test]
    fn reserved_interfaces_rejected() {
        let mut store = NodeStore::default();
        let path = Path::new("/x").unwrap();
        let iface = IfaceName::new("org.freedesktop.DBus.Properties").unwrap();
        let entries = Arc::new(vec![VtableEntry::Start { element_size: 1, flags: crate::vtable::Flags::empty() }]);
        let err = store.add_vtable(&path, iface, entries, None, false, None).unwrap_err();
        assert_eq!(err, RegistrationError::ReservedInterface("org.freedesktop.DBus.Properties".into()));
    }
}
