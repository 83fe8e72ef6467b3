//! Signal Emitters (spec §4.8): `PropertiesChanged`, `InterfacesAdded`,
//! `InterfacesRemoved`.
//!
//! Grounded on `sd_bus_emit_properties_changed_strv`/
//! `sd_bus_emit_object_added`/`sd_bus_emit_object_removed` in the original
//! `bus-objects.c`: walk every vtable for the given interface at the exact
//! path, then ascending fallback prefixes, same order the dispatcher itself
//! uses, retrying the whole walk if a handler mutated the tree underneath us.
//!
//! Getters are written to be driven by an incoming `Properties.Get` request,
//! so `PropInfo` always carries a `msg`. There is no such request here, so
//! each emitter builds one placeholder `Message` up front and reuses it for
//! every property it serializes — getters that only read their own
//! `data`/`property` (the documented contract for `PROPERTY_EMITS_CHANGE`
//! getters) never notice.

use std::collections::HashSet;

use dbus::arg::{Dict, IterAppend, Variant};
use dbus::strings::{Interface as IfaceName, Path, Signature};
use dbus::Message;

use crate::error::EmitError;
use crate::node::{ascending_prefixes, PropInfo};
use crate::vtable::{Flags, VtableEntry};
use crate::Tree;

const IFACE_PROPERTIES: &str = "org.freedesktop.DBus.Properties";
const IFACE_OBJECT_MANAGER: &str = "org.freedesktop.DBus.ObjectManager";

fn placeholder_request(path: &Path<'static>) -> Message {
    Message::new_method_call("org.freedesktop.DBus", &**path, IFACE_PROPERTIES, "Get")
        .expect("well-formed placeholder request")
}

/// `emit_properties_changed_strv` (spec §4.8, §9 open question).
///
/// Per the resolved open question, this returns as soon as one matching
/// vtable at `path` produces a signal, across however many restart attempts
/// the walk takes; `Err(NoSuchInterface)` only if no attempt ever found a
/// vtable for `interface` at `path`.
pub fn properties_changed(
    tree: &Tree, path: &Path<'static>, interface: &IfaceName<'static>, names: &[&str],
) -> Result<Vec<Message>, EmitError> {
    let request = placeholder_request(path);

    loop {
        tree.clear_modified();
        let (vtable, data) = {
            let store = tree.store();
            let exact = store.get(path).into_iter().flat_map(|n| n.vtables.iter().cloned());
            let fallback = ascending_prefixes(path)
                .filter_map(|p| store.get(&p).map(|n| n.vtables.clone()))
                .flatten()
                .filter(|v| v.is_fallback);
            let vtable = exact.chain(fallback).find(|v| &v.interface == interface)
                .ok_or_else(|| EmitError::NoSuchInterface(interface.to_string(), path.to_string()))?;
            let data = vtable.resolve(path)
                .ok_or_else(|| EmitError::NoSuchInterface(interface.to_string(), path.to_string()))?;
            (vtable, data)
        };

        let mut changed = Vec::new();
        let mut invalidated: Vec<String> = Vec::new();
        for name in names {
            let entry = vtable.entries.iter().find(|e| e.property_member() == Some(*name));
            let (signature, get, flags) = match entry {
                Some(VtableEntry::Property { signature, get, flags, .. }) => (signature, get, *flags),
                Some(VtableEntry::WritableProperty { signature, get, flags, .. }) => (signature, get, *flags),
                _ => continue,
            };
            if !flags.contains(Flags::PROPERTY_EMITS_CHANGE) {
                return Err(EmitError::NotEmitsChange((*name).to_string()));
            }
            if flags.contains(Flags::PROPERTY_INVALIDATE_ONLY) || get.is_none() {
                invalidated.push((*name).to_string());
            } else {
                changed.push((*name, signature, get.clone().unwrap()));
            }
        }
        if changed.is_empty() && invalidated.is_empty() {
            return Ok(Vec::new());
        }

        let mut signal = Message::new_signal(&**path, IFACE_PROPERTIES, "PropertiesChanged")
            .map_err(|_| EmitError::NoSuchInterface(interface.to_string(), path.to_string()))?;
        {
            let mut ia = IterAppend::new(&mut signal);
            ia.append(&**interface);
            ia.append_dict(&Signature::make::<&str>(), &Signature::make::<Variant<bool>>(), |dict| {
                for (name, signature, get) in &changed {
                    dict.append_dict_entry(|entry| {
                        entry.append(*name);
                        entry.append_variant(signature, |sub| {
                            let pinfo = PropInfo { msg: &request, tree, path, interface, property: name, data: data.clone() };
                            let _ = get(sub, &pinfo);
                        });
                    });
                }
            });
            ia.append(invalidated);
        }
        if tree.nodes_modified() {
            continue;
        }
        return Ok(vec![signal]);
    }
}

/// `emit_interfaces_added_strv` (spec §4.8). Emits `InterfacesAdded` with the
/// non-hidden properties of each named interface at `path`; `Err` if any
/// named interface has no matching vtable anywhere in the ascending scan.
pub fn interfaces_added(tree: &Tree, path: &Path<'static>, interfaces: &[&str]) -> Result<Vec<Message>, EmitError> {
    let request = placeholder_request(path);

    loop {
        tree.clear_modified();
        let mut per_iface = Vec::new();
        {
            let store = tree.store();
            for iname in interfaces {
                let iface = IfaceName::new(iname.to_string())
                    .map_err(|_| EmitError::NoSuchInterface((*iname).to_string(), path.to_string()))?;
                let exact = store.get(path).into_iter().flat_map(|n| n.vtables.iter().cloned());
                let fallback = ascending_prefixes(path)
                    .filter_map(|p| store.get(&p).map(|n| n.vtables.clone()))
                    .flatten()
                    .filter(|v| v.is_fallback);
                let vtable = exact.chain(fallback).find(|v| v.interface == iface)
                    .ok_or_else(|| EmitError::NoSuchInterface((*iname).to_string(), path.to_string()))?;
                let data = vtable.resolve(path)
                    .ok_or_else(|| EmitError::NoSuchInterface((*iname).to_string(), path.to_string()))?;
                per_iface.push((iface, vtable, data));
            }
        }

        let mut signal = Message::new_signal(&**path, IFACE_OBJECT_MANAGER, "InterfacesAdded")
            .map_err(|_| EmitError::NoSuchInterface(interfaces.join(","), path.to_string()))?;
        {
            let mut ia = IterAppend::new(&mut signal);
            ia.append(&**path);
            ia.append_dict(&Signature::make::<&str>(), &Signature::make::<Dict<&str, Variant<bool>, ()>>(), |iface_iter| {
                for (iface, vtable, data) in &per_iface {
                    iface_iter.append_dict_entry(|props| {
                        props.append(&**iface);
                        props.append_dict(&Signature::make::<&str>(), &Signature::make::<Variant<bool>>(), |prop_iter| {
                            for entry in vtable.entries.iter() {
                                if entry.is_hidden() { continue; }
                                let (member, signature, get) = match entry {
                                    VtableEntry::Property { member, signature, get, .. } => (member.as_str(), signature, get),
                                    VtableEntry::WritableProperty { member, signature, get, .. } => (member.as_str(), signature, get),
                                    _ => continue,
                                };
                                let get = match get { Some(g) => g, None => continue };
                                prop_iter.append_dict_entry(|e| {
                                    e.append(member);
                                    e.append_variant(signature, |sub| {
                                        let pinfo = PropInfo { msg: &request, tree, path, interface: iface, property: member, data: data.clone() };
                                        let _ = get(sub, &pinfo);
                                    });
                                });
                            }
                        });
                    });
                }
            });
        }

        if tree.nodes_modified() {
            continue;
        }
        return Ok(vec![signal]);
    }
}

/// `emit_interfaces_removed_strv` (spec §4.8). No tree walk needed — the
/// signal carries only the interface names, no properties.
pub fn interfaces_removed(path: &Path<'static>, interfaces: &[&str]) -> Vec<Message> {
    let dedup: HashSet<&str> = interfaces.iter().copied().collect();
    let mut signal = match Message::new_signal(&**path, IFACE_OBJECT_MANAGER, "InterfacesRemoved") {
        Ok(m) => m,
        Err(_) => return Vec::new(),
    };
    {
        let mut ia = IterAppend::new(&mut signal);
        ia.append(&**path);
        ia.append(dedup.into_iter().map(|s| s.to_string()).collect::<Vec<_>>());
    }
    vec![signal]
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::vtable::VtableEntry;
    use std::sync::Arc;

    fn counter_vtable() -> Arc<Vec<VtableEntry>> {
        Arc::new(vec![
            VtableEntry::Start { element_size: 2, flags: Flags::empty() },
            VtableEntry::Property {
                member: "Count".to_string(),
                signature: Signature::new("i").unwrap(),
                get: Some(Arc::new(|ia, _pi: &PropInfo| { ia.append(42i32); Ok(()) })),
                flags: Flags::PROPERTY_EMITS_CHANGE,
            },
        ])
    }

    fn no_emit_vtable() -> Arc<Vec<VtableEntry>> {
        Arc::new(vec![
            VtableEntry::Start { element_size: 2, flags: Flags::empty() },
            VtableEntry::Property {
                member: "Count".to_string(),
                signature: Signature::new("i").unwrap(),
                get: Some(Arc::new(|ia, _pi: &PropInfo| { ia.append(42i32); Ok(()) })),
                flags: Flags::empty(),
            },
        ])
    }

    #[test]
    fn properties_changed_emits_one_signal() {
        let tree = Tree::new().trusted(true);
        let path = Path::new("/obj").unwrap();
        tree.add_object_vtable(&path, IfaceName::new("com.x.I").unwrap(), counter_vtable(), None).unwrap();

        let msgs = tree.emit_properties_changed_strv(&path, &IfaceName::new("com.x.I").unwrap(), &["Count"]).unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].member().unwrap().to_string(), "PropertiesChanged");
    }

    #[test]
    fn properties_changed_unknown_interface_is_enoent() {
        let tree = Tree::new().trusted(true);
        let path = Path::new("/obj").unwrap();
        let err = tree.emit_properties_changed_strv(&path, &IfaceName::new("com.x.Nope").unwrap(), &["Count"]).unwrap_err();
        assert!(matches!(err, EmitError::NoSuchInterface(_, _)));
    }

    #[test]
    fn properties_changed_without_emits_change_is_edom() {
        let tree = Tree::new().trusted(true);
        let path = Path::new("/obj").unwrap();
        tree.add_object_vtable(&path, IfaceName::new("com.x.I").unwrap(), no_emit_vtable(), None).unwrap();

        let err = tree.emit_properties_changed_strv(&path, &IfaceName::new("com.x.I").unwrap(), &["Count"]).unwrap_err();
        assert!(matches!(err, EmitError::NotEmitsChange(ref n) if n == "Count"));
    }

    #[test]
    fn properties_changed_finds_fallback_vtable_on_ancestor() {
        let tree = Tree::new().trusted(true);
        let parent = Path::new("/obj").unwrap();
        let child = Path::new("/obj/child").unwrap();
        tree.add_fallback_vtable(&parent, IfaceName::new("com.x.I").unwrap(), counter_vtable(), None, None).unwrap();

        let msgs = tree.emit_properties_changed_strv(&child, &IfaceName::new("com.x.I").unwrap(), &["Count"]).unwrap();
        assert_eq!(msgs.len(), 1);
    }

    #[test]
    fn interfaces_removed_dedupes_names() {
        let path = Path::new("/obj").unwrap();
        let msgs = interfaces_removed(&path, &["com.x.A", "com.x.A", "com.x.B"]);
        assert_eq!(msgs.len(), 1);
    }
}
