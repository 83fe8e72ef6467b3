//! Standard Interface Handlers (spec §4.4-§4.7): `Properties.{Get,Set,GetAll}`,
//! `Introspectable.Introspect`, `ObjectManager.GetManagedObjects`.
//!
//! Grounded on `property_get_set_callbacks_run`/`vtable_append_all_properties`/
//! `property_get_all_callbacks_run` in the original `bus-objects.c`, and on the
//! marshaling style of `ObjectPath::get_managed_objects`/`introspect` in the
//! teacher's `dbus-tree/src/objectpath.rs`.

use dbus::arg::{ArgType, Dict, IterAppend, Variant};
use dbus::strings::{Interface as IfaceName, Path, Signature};
use dbus::Message;

use crate::access::check_access;
use crate::enumerator::get_child_nodes;
use crate::error::MethodErr;
use crate::node::{self, NodeStore, PropInfo, VtableMember};
use crate::vtable::VtableEntry;
use crate::Tree;

fn resolve_member<'a>(
    store: &'a NodeStore, path: &Path<'static>, interface: &IfaceName<'static>, member: &str,
    is_property: bool,
) -> Option<&'a VtableMember> {
    if is_property {
        store.lookup_property(path, interface, member)
    } else {
        let m = dbus::strings::Member::new(member.to_string()).ok()?;
        store.lookup_method(path, interface, &m)
    }
}

fn append_variant<F: FnOnce(&mut IterAppend) -> Result<(), MethodErr>>(
    ia: &mut IterAppend, sig: &Signature<'static>, f: F,
) -> Result<(), MethodErr> {
    let mut result = Ok(());
    ia.append_variant(sig, |sub| { result = f(sub); });
    result
}

/// `Properties.Get(interface_name, property_name) -> variant` (spec §4.4).
/// No access check: reads are unrestricted since `PropertiesChanged`
/// broadcasts contents anyway.
pub fn properties_get(tree: &Tree, path: &Path<'static>, require_fallback: bool, msg: &Message) -> Result<Option<Vec<Message>>, MethodErr> {
    let (iname, pname): (&str, &str) = msg.read2().map_err(|e| MethodErr::invalid_args(&e))?;
    let interface = IfaceName::new(iname).map_err(|_| MethodErr::unknown_interface(iname))?;

    let (vtable, entry_index) = {
        let store = tree.store();
        match resolve_member(&store, path, &interface, pname, true) {
            Some(vm) if vm.vtable.is_fallback == require_fallback => (vm.vtable.clone(), vm.entry_index),
            _ => return Ok(None),
        }
    };
    let entry = &vtable.entries[entry_index];
    let (signature, get) = match entry {
        VtableEntry::Property { signature, get, .. } => (signature, get),
        VtableEntry::WritableProperty { signature, get, .. } => (signature, get),
        _ => return Ok(None),
    };
    let data = match vtable.resolve(path) { Some(d) => d, None => return Ok(None) };
    let get = get.as_ref().ok_or_else(|| MethodErr::failed(&"property has no getter"))?;

    let mut reply = msg.method_return();
    {
        let mut ia = IterAppend::new(&mut reply);
        let pinfo = PropInfo { msg, tree, path, interface: &interface, property: pname, data };
        append_variant(&mut ia, signature, |sub| get(sub, &pinfo))?;
    }
    Ok(Some(vec![reply]))
}

/// `Properties.Set(interface_name, property_name, value)` (spec §4.4).
pub fn properties_set(tree: &Tree, path: &Path<'static>, require_fallback: bool, msg: &Message) -> Result<Option<Vec<Message>>, MethodErr> {
    let (iname, pname): (&str, &str) = msg.read2().map_err(|e| MethodErr::invalid_args(&e))?;
    let interface = IfaceName::new(iname).map_err(|_| MethodErr::unknown_interface(iname))?;

    let (vtable, entry_index) = {
        let store = tree.store();
        let vm = match resolve_member(&store, path, &interface, pname, true) {
            Some(vm) if vm.vtable.is_fallback == require_fallback => vm,
            _ => return Ok(None),
        };
        // Guard against re-running Set twice across a dispatch restart (spec §4.4, §4.2).
        if vm.last_iteration.get() == tree.iteration() {
            return Ok(None);
        }
        vm.last_iteration.set(tree.iteration());
        (vm.vtable.clone(), vm.entry_index)
    };
    let entry = &vtable.entries[entry_index];
    let (set, flags) = match entry {
        VtableEntry::WritableProperty { set, flags, .. } => (set, *flags),
        VtableEntry::Property { .. } => return Err(MethodErr::property_read_only(pname)),
        _ => return Ok(None),
    };

    let data = match vtable.resolve(path) { Some(d) => d, None => return Ok(None) };
    check_access(tree.creds(), tree.is_trusted(), msg, &interface, pname, flags, &vtable)?;

    let mut iter = dbus::arg::Iter::new(msg);
    iter.next();
    iter.next();
    let mut variant_iter = iter.recurse(ArgType::Variant).ok_or_else(|| MethodErr::invalid_args(&"value"))?;

    let set = set.as_ref().ok_or_else(|| MethodErr::failed(&"property has no setter"))?;
    let pinfo = PropInfo { msg, tree, path, interface: &interface, property: pname, data };
    set(&mut variant_iter, &pinfo)?;

    Ok(Some(vec![msg.method_return()]))
}

/// `Properties.GetAll(interface_name) -> {s: v}` (spec §4.5).
pub fn properties_get_all(tree: &Tree, path: &Path<'static>, require_fallback: bool, msg: &Message) -> Result<Option<Vec<Message>>, MethodErr> {
    let iname: &str = msg.read1().map_err(|e| MethodErr::invalid_args(&e))?;
    let iface_filter = if iname.is_empty() { None } else {
        Some(IfaceName::new(iname).map_err(|_| MethodErr::unknown_interface(iname))?)
    };

    let store = tree.store();
    let node = match store.get(path) { Some(n) => n, None => return Ok(None) };

    let mut any_matched = false;
    let mut result: Result<(), MethodErr> = Ok(());
    let mut reply = msg.method_return();
    {
        let mut ia = IterAppend::new(&mut reply);
        ia.append_dict(&Signature::make::<&str>(), &Signature::make::<Variant<bool>>(), |dict_iter| {
            for vtable in &node.vtables {
                if vtable.is_fallback != require_fallback { continue; }
                if let Some(want) = &iface_filter {
                    if &vtable.interface != want { continue; }
                }
                if vtable.entries.first().map_or(false, VtableEntry::is_hidden) { continue; }
                let data = match vtable.resolve(path) { Some(d) => d, None => continue };
                any_matched = true;
                for entry in vtable.entries.iter() {
                    if entry.is_hidden() { continue; }
                    let (member, signature, get) = match entry {
                        VtableEntry::Property { member, signature, get, .. } => (member.as_str(), signature, get),
                        VtableEntry::WritableProperty { member, signature, get, .. } => (member.as_str(), signature, get),
                        _ => continue,
                    };
                    let get = match get { Some(g) => g, None => continue };
                    dict_iter.append_dict_entry(|entry_iter| {
                        entry_iter.append(member);
                        let pinfo = PropInfo { msg, tree, path, interface: &vtable.interface, property: member, data: data.clone() };
                        if let Err(e) = append_variant(entry_iter, signature, |sub| get(sub, &pinfo)) {
                            result = Err(e);
                        }
                    });
                }
            }
        });
    }
    result?;
    if !any_matched {
        if let Some(want) = &iface_filter {
            if !node::is_reserved_interface(want) {
                return Err(MethodErr::unknown_interface(want));
            }
        }
        return Ok(None);
    }
    Ok(Some(vec![reply]))
}

fn visible_interfaces<'a>(node: &'a node::Node, require_fallback: bool) -> impl Iterator<Item = &'a std::sync::Arc<node::NodeVtable>> {
    node.vtables.iter().filter(move |v| v.is_fallback == require_fallback && !v.entries.first().map_or(false, VtableEntry::is_hidden))
}

/// `Introspectable.Introspect` (spec §4.6). Returns `None` (leaving
/// `found_object` false) if there is no node at `path` and no descendants.
pub fn introspect(tree: &Tree, path: &Path<'static>) -> Option<String> {
    let store = tree.store();
    let children = get_child_nodes(&store, path).unwrap_or_default();
    if !store.contains(path) && children.is_empty() {
        return None;
    }
    let node = store.get(path);
    let has_object_manager = store.has_object_manager_ancestor(path);

    let mut xml = String::new();
    xml.push_str("<!DOCTYPE node PUBLIC \"-//freedesktop//DTD D-BUS Object Introspection 1.0//EN\" \"http://www.freedesktop.org/standards/dbus/1.0/introspect.dtd\">\n");
    xml.push_str(&format!("<node name=\"{}\">\n", path));

    xml.push_str("  <interface name=\"org.freedesktop.DBus.Introspectable\">\n    <method name=\"Introspect\">\n      <arg name=\"xml_data\" type=\"s\" direction=\"out\"/>\n    </method>\n  </interface>\n");
    xml.push_str("  <interface name=\"org.freedesktop.DBus.Peer\">\n    <method name=\"Ping\"/>\n    <method name=\"GetMachineId\">\n      <arg name=\"machine_uuid\" type=\"s\" direction=\"out\"/>\n    </method>\n  </interface>\n");
    xml.push_str("  <interface name=\"org.freedesktop.DBus.Properties\">\n    <method name=\"Get\">\n      <arg name=\"interface_name\" type=\"s\" direction=\"in\"/>\n      <arg name=\"property_name\" type=\"s\" direction=\"in\"/>\n      <arg name=\"value\" type=\"v\" direction=\"out\"/>\n    </method>\n    <method name=\"GetAll\">\n      <arg name=\"interface_name\" type=\"s\" direction=\"in\"/>\n      <arg name=\"props\" type=\"a{sv}\" direction=\"out\"/>\n    </method>\n    <method name=\"Set\">\n      <arg name=\"interface_name\" type=\"s\" direction=\"in\"/>\n      <arg name=\"property_name\" type=\"s\" direction=\"in\"/>\n      <arg name=\"value\" type=\"v\" direction=\"in\"/>\n    </method>\n    <signal name=\"PropertiesChanged\">\n      <arg name=\"interface_name\" type=\"s\"/>\n      <arg name=\"changed_properties\" type=\"a{sv}\"/>\n      <arg name=\"invalidated_properties\" type=\"as\"/>\n    </signal>\n  </interface>\n");
    if has_object_manager {
        xml.push_str("  <interface name=\"org.freedesktop.DBus.ObjectManager\">\n    <method name=\"GetManagedObjects\">\n      <arg name=\"objpath_interfaces_and_properties\" type=\"a{oa{sa{sv}}}\" direction=\"out\"/>\n    </method>\n  </interface>\n");
    }

    if let Some(node) = node {
        for fallback in [false, true] {
            for vtable in visible_interfaces(node, fallback) {
                xml.push_str(&format!("  <interface name=\"{}\">\n", vtable.interface));
                for entry in vtable.entries.iter() {
                    match entry {
                        VtableEntry::Method { member, in_sig, out_sig, .. } => {
                            xml.push_str(&format!("    <method name=\"{}\">\n", member));
                            for c in in_sig.as_cstr().to_string_lossy().chars() {
                                xml.push_str(&format!("      <arg type=\"{}\" direction=\"in\"/>\n", c));
                            }
                            for c in out_sig.as_cstr().to_string_lossy().chars() {
                                xml.push_str(&format!("      <arg type=\"{}\" direction=\"out\"/>\n", c));
                            }
                            xml.push_str("    </method>\n");
                        }
                        VtableEntry::Property { member, signature, .. } => {
                            xml.push_str(&format!("    <property name=\"{}\" type=\"{}\" access=\"read\"/>\n", member, signature.as_cstr().to_string_lossy()));
                        }
                        VtableEntry::WritableProperty { member, signature, .. } => {
                            xml.push_str(&format!("    <property name=\"{}\" type=\"{}\" access=\"readwrite\"/>\n", member, signature.as_cstr().to_string_lossy()));
                        }
                        VtableEntry::Signal { member, signature, .. } => {
                            xml.push_str(&format!("    <signal name=\"{}\">\n", member));
                            for c in signature.as_cstr().to_string_lossy().chars() {
                                xml.push_str(&format!("      <arg type=\"{}\"/>\n", c));
                            }
                            xml.push_str("    </signal>\n");
                        }
                        _ => {}
                    }
                }
                xml.push_str("  </interface>\n");
            }
        }
    }

    let olen = if &**path == "/" { 1 } else { path.len() + 1 };
    for child in children {
        xml.push_str(&format!("  <node name=\"{}\"/>\n", &(*child)[olen..]));
    }

    xml.push_str("</node>");
    Some(xml)
}

/// `ObjectManager.GetManagedObjects` (spec §4.7). Returns `Ok(None)` when
/// the node has neither children nor vtables (no reply; caller falls through
/// to `UNKNOWN_METHOD`).
pub fn get_managed_objects(tree: &Tree, path: &Path<'static>, msg: &Message) -> Result<Option<Vec<Message>>, MethodErr> {
    let store = tree.store();
    let children = get_child_nodes(&store, path).unwrap_or_default();
    let has_vtables = store.get(path).map_or(false, |n| !n.vtables.is_empty());
    if children.is_empty() && !has_vtables {
        return Ok(None);
    }

    let mut result: Result<(), MethodErr> = Ok(());
    let mut reply = msg.method_return();
    {
        let mut ia = IterAppend::new(&mut reply);
        ia.append_dict(&Signature::make::<Path>(), &Signature::make::<Dict<&str, Dict<&str, Variant<bool>, ()>, ()>>(), |path_iter| {
            for child in &children {
                path_iter.append_dict_entry(|entry_iter| {
                    entry_iter.append(&**child);
                    entry_iter.append_dict(&Signature::make::<&str>(), &Signature::make::<Dict<&str, Variant<bool>, ()>>(), |iface_iter| {
                        let exact = store.get(child).map(|n| n.vtables.iter()).into_iter().flatten();
                        let fallback = node::ascending_prefixes(child)
                            .filter_map(|p| store.get(&p))
                            .flat_map(|n| n.vtables.iter())
                            .filter(|v| v.is_fallback);
                        for vtable in exact.chain(fallback) {
                            if vtable.entries.first().map_or(false, VtableEntry::is_hidden) { continue; }
                            let data = match vtable.resolve(child) { Some(d) => d, None => continue };
                            iface_iter.append_dict_entry(|props_iter| {
                                props_iter.append(&*vtable.interface);
                                props_iter.append_dict(&Signature::make::<&str>(), &Signature::make::<Variant<bool>>(), |prop_iter| {
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
                                            let pinfo = PropInfo { msg, tree, path: child, interface: &vtable.interface, property: member, data: data.clone() };
                                            if let Err(err) = append_variant(e, signature, |sub| get(sub, &pinfo)) {
                                                result = Err(err);
                                            }
                                        });
                                    }
                                });
                            });
                        }
                    });
                });
            }
        });
    }
    result?;
    Ok(Some(vec![reply]))
}
