//! Peer credentials, consumed by the access check (spec §4.3).
//!
//! Credential acquisition is explicitly out of scope for this crate (spec §1):
//! the engine only ever talks to a [`CredentialsProvider`], never to a
//! transport or kernel API directly. A real bus connection supplies its own
//! implementation; [`NullCredentials`] below is the trivial stub used by this
//! crate's own tests.

use dbus::Message;

/// A capability number, as assigned by `<linux/capability.h>` (e.g. `CAP_SYS_ADMIN = 21`).
pub type Capability = u32;

pub const CAP_SYS_ADMIN: Capability = 21;

/// Bitmask of which credential fields were requested/returned. Mirrors
/// `SD_BUS_CREDS_UID` / `SD_BUS_CREDS_EFFECTIVE_CAPS` in the original.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CredsMask {
    pub uid: bool,
    pub effective_caps: bool,
}

impl CredsMask {
    pub const UID: CredsMask = CredsMask { uid: true, effective_caps: false };
    pub const UID_AND_CAPS: CredsMask = CredsMask { uid: true, effective_caps: true };
}

/// Credentials for the peer that sent a given message.
#[derive(Clone, Debug, Default)]
pub struct Credentials {
    pub uid: Option<u32>,
    /// Only populated when requested with `CredsMask::UID_AND_CAPS` *and* the
    /// transport is kernel-mediated (spec §4.3 step 3): on a userspace bus the
    /// effective set is racy and must not be used for a trust decision.
    pub effective_caps: Option<Vec<Capability>>,
}

impl Credentials {
    pub fn has_effective_cap(&self, cap: Capability) -> bool {
        self.effective_caps.as_ref().map_or(false, |caps| caps.contains(&cap))
    }
}

/// Abstract peer-credential source, queried by the access check.
///
/// `is_kernel_mediated` answers whether the transport is kdbus-like (the
/// engine uses this to decide whether it's safe to request the effective
/// capability set alongside the UID — see spec §4.3 step 3).
pub trait CredentialsProvider {
    fn query_sender_creds(&self, msg: &Message, mask: CredsMask) -> Result<Credentials, crate::MethodErr>;
    fn is_kernel_mediated(&self) -> bool;
    /// UID this process runs as, used for the same-UID admission rule.
    fn process_uid(&self) -> u32;
}

/// A `CredentialsProvider` that never resolves any credentials. Useful in
/// tests and for buses that are fully `trusted` (the access check never
/// queries credentials in that case, see §4.3 step 1).
#[derive(Default)]
pub struct NullCredentials;

impl CredentialsProvider for NullCredentials {
    fn query_sender_creds(&self, _msg: &Message, _mask: CredsMask) -> Result<Credentials, crate::MethodErr> {
        Ok(Credentials::default())
    }
    fn is_kernel_mediated(&self) -> bool { false }
    fn process_uid(&self) -> u32 { unsafe { libc::getuid() } }
}
