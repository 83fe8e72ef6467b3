//! Access Check (spec §4.3): maps a vtable member's capability tag to a
//! capability number and checks it against the caller's effective set.
//!
//! Grounded directly on `check_access` in the original
//! (`src/libsystemd-bus/bus-objects.c`): bus-trusted and `UNPRIVILEGED` short
//! circuits, then a capability query gated on whether the transport is
//! kernel-mediated, then same-UID admission, then `ACCESS_DENIED`.

use dbus::Message;
use dbus::strings::Interface as IfaceName;

use crate::credentials::{CredentialsProvider, CredsMask, CAP_SYS_ADMIN};
use crate::error::MethodErr;
use crate::node::NodeVtable;
use crate::vtable::{Flags, VtableEntry};

/// Returns `Ok(())` if the call is allowed, `Err(MethodErr::access_denied)` otherwise.
pub fn check_access(
    creds: &dyn CredentialsProvider,
    trusted: bool,
    msg: &Message,
    interface: &IfaceName<'static>,
    member_name: &str,
    member_flags: Flags,
    vtable: &NodeVtable,
) -> Result<(), MethodErr> {
    // 1. Bus-wide trust.
    if trusted {
        return Ok(());
    }
    // 2. UNPRIVILEGED opt-out.
    if member_flags.contains(Flags::UNPRIVILEGED) {
        return Ok(());
    }

    // 3. Query credentials, racily-effective-caps only when kernel-mediated.
    let mask = if creds.is_kernel_mediated() { CredsMask::UID_AND_CAPS } else { CredsMask::UID };
    let who = creds.query_sender_creds(msg, mask)?;

    // 4. Resolve the required capability: member tag, else interface START tag, else CAP_SYS_ADMIN.
    let cap = member_flags.capability()
        .or_else(|| interface_default_capability(vtable))
        .unwrap_or(CAP_SYS_ADMIN);

    // 5. Effective capability.
    if who.has_effective_cap(cap) {
        return Ok(());
    }

    // 6. Same-UID admission.
    if let Some(uid) = who.uid {
        if uid == creds.process_uid() {
            return Ok(());
        }
    }

    // 7. Deny.
    log::debug!("access denied: {}.{}() requires cap {}", interface, member_name, cap);
    Err(MethodErr::access_denied(interface, member_name))
}

fn interface_default_capability(vtable: &NodeVtable) -> Option<crate::credentials::Capability> {
    match vtable.entries.first() {
        Some(VtableEntry::Start { flags, .. }) => flags.capability(),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::credentials::{Credentials, NullCredentials};
    use dbus::Message;
    use std::sync::Arc;

    struct Trusting;
    impl CredentialsProvider for Trusting {
        fn query_sender_creds(&self, _: &Message, _: CredsMask) -> Result<Credentials, MethodErr> {
            Ok(Credentials { uid: Some(1000), effective_caps: None })
        }
        fn is_kernel_mediated(&self) -> bool { false }
        fn process_uid(&self) -> u32 { 1000 }
    }

    fn sample_vtable() -> NodeVtable {
        NodeVtable {
            interface: IfaceName::new("com.x.I").unwrap(),
            entries: Arc::new(vec![VtableEntry::Start { element_size: 1, flags: Flags::empty() }]),
            userdata: Arc::new(()),
            find: None,
            is_fallback: false,
        }
    }

    #[test]
    fn trusted_bus_always_allows() {
        let msg = Message::new_method_call("a.b", "/", "a.b", "M").unwrap();
        let r = check_access(&NullCredentials, true, &msg, &IfaceName::new("a.b").unwrap(), "M", Flags::empty(), &sample_vtable());
        assert!(r.is_ok());
    }

    #[test]
    fn same_uid_allows() {
        let msg = Message::new_method_call("a.b", "/", "a.b", "M").unwrap();
        let r = check_access(&Trusting, false, &msg, &IfaceName::new("a.b").unwrap(), "M", Flags::empty(), &sample_vtable());
        assert!(r.is_ok());
    }

    #[test]
    fn unprivileged_flag_allows() {
        let msg = Message::new_method_call("a.b", "/", "a.b", "M").unwrap();
        let r = check_access(&NullCredentials, false, &msg, &IfaceName::new("a.b").unwrap(), "M", Flags::UNPRIVILEGED, &sample_vtable());
        assert!(r.is_ok());
    }
}
