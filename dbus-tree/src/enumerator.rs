//! Enumerator Walker (spec §4.9).
//!
//! Grounded on `add_subtree_to_set`/`add_enumerated_to_set` in the original
//! (`src/libsystemd-bus/bus-objects.c`): the intrusive tree there is walked
//! depth-first from the node at `prefix`, running every node's enumerators
//! (always passed the *original* `prefix`, not the descendant's own path) and
//! also collecting every descendant's own path. Our flat `HashMap<Path, Node>`
//! has no tree to walk, so both halves of that walk become a single scan:
//! "every registered path that starts with `prefix`" stands in for the
//! subtree, and the node at each such path contributes its enumerators.

use std::collections::BTreeSet;

use dbus::strings::Path;

use crate::error::MethodErr;
use crate::node::NodeStore;

fn is_subtree_of(path: &str, prefix: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    path == prefix || (path.starts_with(prefix) && path.as_bytes().get(prefix.len()) == Some(&b'/'))
}

/// Materializes the set of object paths under `prefix`: static descendants
/// plus whatever every enumerator registered anywhere in that subtree
/// reports, each filtered down to valid paths that are themselves under
/// `prefix` (spec §4.9).
pub fn get_child_nodes(store: &NodeStore, prefix: &Path<'static>) -> Result<BTreeSet<Path<'static>>, MethodErr> {
    let prefix_str: &str = prefix;
    let mut out = BTreeSet::new();

    for (path, node) in store.nodes_iter() {
        let path_str: &str = path;
        if !is_subtree_of(path_str, prefix_str) {
            continue;
        }
        if path_str != prefix_str {
            out.insert(path.clone());
        }
        for enumerator in &node.enumerators {
            for child in (enumerator.callback)(prefix) {
                let child_str: &str = &child;
                if !is_subtree_of(child_str, prefix_str) {
                    continue;
                }
                out.insert(child);
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::node::EnumeratorFn;
    use std::sync::Arc;

    #[test]
    fn unions_static_children_and_enumerator_results() {
        let mut store = NodeStore::default();
        store.add_object(&Path::new("/a/static").unwrap(), Arc::new(|_, _| 0), None, false);

        let dyn_cb: Arc<EnumeratorFn> = Arc::new(|_prefix: &Path<'static>| {
            vec![Path::new("/a/dynamic").unwrap()]
        });
        store.add_node_enumerator(&Path::new("/a").unwrap(), dyn_cb);

        let children = get_child_nodes(&store, &Path::new("/a").unwrap()).unwrap();
        assert!(children.contains(&Path::new("/a/static").unwrap()));
        assert!(children.contains(&Path::new("/a/dynamic").unwrap()));
    }

    #[test]
    fn enumerator_results_outside_prefix_are_dropped() {
        let mut store = NodeStore::default();
        let dyn_cb: Arc<EnumeratorFn> = Arc::new(|_prefix: &Path<'static>| {
            vec![Path::new("/other/child").unwrap()]
        });
        store.add_node_enumerator(&Path::new("/a").unwrap(), dyn_cb);

        let children = get_child_nodes(&store, &Path::new("/a").unwrap()).unwrap();
        assert!(children.is_empty());
    }

    #[test]
    fn duplicate_paths_are_deduplicated() {
        let mut store = NodeStore::default();
        store.add_object(&Path::new("/a/x").unwrap(), Arc::new(|_, _| 0), None, false);
        let dyn_cb: Arc<EnumeratorFn> = Arc::new(|_prefix: &Path<'static>| {
            vec![Path::new("/a/x").unwrap()]
        });
        store.add_node_enumerator(&Path::new("/a").unwrap(), dyn_cb);

        let children = get_child_nodes(&store, &Path::new("/a").unwrap()).unwrap();
        assert_eq!(children.len(), 1);
    }
}
