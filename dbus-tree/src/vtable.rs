//! Vtable entries, flags and the structural validation rules from spec §4.1.

use std::sync::Arc;
use dbus::arg::{Iter, IterAppend};
use dbus::strings::{Member, Signature};
use crate::error::{MethodErr, MethodResult, RegistrationError};
use crate::credentials::Capability;

bitflags::bitflags! {
    /// Packed flags word for a vtable entry. The low bits are named flags;
    /// the high 16 bits carry the capability tag (spec §3, §9): 0 means
    /// "inherit from the interface default", otherwise capability-number + 1.
    ///
    /// `CAPABILITY_SHIFT` is the position of the mask's lowest set bit,
    /// exactly as `CAPABILITY_SHIFT` is computed from
    /// `__builtin_ctzll(_SD_BUS_VTABLE_CAPABILITY_MASK)` in the original.
    pub struct Flags: u32 {
        const HIDDEN                  = 0b0000_0001;
        const UNPRIVILEGED             = 0b0000_0010;
        const METHOD_NO_REPLY          = 0b0000_0100;
        const PROPERTY_EMITS_CHANGE    = 0b0000_1000;
        const PROPERTY_INVALIDATE_ONLY = 0b0001_0000;
    }
}

const CAPABILITY_SHIFT: u32 = 16;
const CAPABILITY_MASK: u32 = 0xFFFF << CAPABILITY_SHIFT;

impl Flags {
    /// Pack a capability number (+1, 0 = inherit) into the high 16 bits.
    pub fn with_capability_tag(self, tag: u16) -> Flags {
        Flags::from_bits_truncate((self.bits() & !CAPABILITY_MASK) | ((tag as u32) << CAPABILITY_SHIFT))
    }

    /// Unpack the raw capability tag (0 = inherit, otherwise capability + 1).
    pub fn capability_tag(self) -> u16 {
        ((self.bits() & CAPABILITY_MASK) >> CAPABILITY_SHIFT) as u16
    }

    /// Resolved capability number, or `None` if this entry inherits from its interface's default.
    pub fn capability(self) -> Option<Capability> {
        let tag = self.capability_tag();
        if tag == 0 { None } else { Some((tag - 1) as Capability) }
    }
}

pub type GetPropFn = dyn Fn(&mut IterAppend, &crate::node::PropInfo) -> Result<(), MethodErr> + Send + Sync + 'static;
pub type SetPropFn = dyn Fn(&mut Iter, &crate::node::PropInfo) -> Result<(), MethodErr> + Send + Sync + 'static;
pub type MethodFn = dyn Fn(&crate::node::MethodInfo) -> MethodResult + Send + Sync + 'static;

/// One entry of a vtable array (spec §3 "Vtable entry variants").
pub enum VtableEntry {
    /// Must be first; carries the element count for an ABI-style sanity check,
    /// and the interface-wide default capability tag (spec §4.3 step 4)
    /// consulted when a member entry's own tag is 0 ("inherit").
    Start { element_size: usize, flags: Flags },
    Method {
        member: Member<'static>,
        in_sig: Signature<'static>,
        out_sig: Signature<'static>,
        handler: Option<Arc<MethodFn>>,
        flags: Flags,
    },
    Property {
        member: String,
        signature: Signature<'static>,
        get: Option<Arc<GetPropFn>>,
        flags: Flags,
    },
    WritableProperty {
        member: String,
        signature: Signature<'static>,
        get: Option<Arc<GetPropFn>>,
        set: Option<Arc<SetPropFn>>,
        flags: Flags,
    },
    Signal {
        member: Member<'static>,
        signature: Signature<'static>,
        flags: Flags,
    },
    End,
}

impl VtableEntry {
    pub fn flags(&self) -> Flags {
        match self {
            VtableEntry::Method { flags, .. } => *flags,
            VtableEntry::Property { flags, .. } => *flags,
            VtableEntry::WritableProperty { flags, .. } => *flags,
            VtableEntry::Signal { flags, .. } => *flags,
            VtableEntry::Start { .. } | VtableEntry::End => Flags::empty(),
        }
    }

    pub fn is_hidden(&self) -> bool { self.flags().contains(Flags::HIDDEN) }

    pub fn property_member(&self) -> Option<&str> {
        match self {
            VtableEntry::Property { member, .. } => Some(member),
            VtableEntry::WritableProperty { member, .. } => Some(member),
            _ => None,
        }
    }

    pub fn writable(&self) -> bool { matches!(self, VtableEntry::WritableProperty { .. }) }
}

fn is_basic_signature(sig: &str) -> bool {
    sig.len() == 1 && "ybnqiuxtdsogh".contains(sig)
}

/// Checks that `sig` parses as exactly one complete type. Signature grammar
/// validation itself belongs to the wire codec (spec §1); this only measures
/// "single vs. multiple complete types" on an already-syntactically-valid string.
fn is_single_complete_type(sig: &str) -> bool {
    if sig.is_empty() { return false; }
    let mut depth = 0i32;
    let mut count = 0;
    for c in sig.chars() {
        match c {
            '(' | '{' => depth += 1,
            ')' | '}' => depth -= 1,
            _ => {}
        }
        if depth == 0 {
            count += 1;
            if c == 'a' { count -= 1; } // array marker isn't itself a complete type
        }
    }
    depth == 0 && count == 1
}

/// Checks that `sig` parses as zero or more complete types with balanced
/// struct/dict-entry braces. Unlike `is_single_complete_type`, an empty
/// string is valid here (a signal can carry no arguments), and more than one
/// complete type is fine too (a signal's `signature` concatenates every
/// argument, the same way METHOD's `in_sig`/`out_sig` do).
fn is_valid_multi_signature(sig: &str) -> bool {
    let mut depth = 0i32;
    for c in sig.chars() {
        match c {
            '(' | '{' => depth += 1,
            ')' | '}' => depth -= 1,
            _ => {}
        }
        if depth < 0 { return false; }
    }
    depth == 0
}

/// Validate a full vtable array per spec §4.1. Returns the element count
/// (used as the `START` entry's declared size, the way ABI producers check it).
pub fn validate(entries: &[VtableEntry]) -> Result<(), RegistrationError> {
    let mut iter = entries.iter();
    match iter.next() {
        Some(VtableEntry::Start { element_size, .. }) if *element_size == entries.len() => {}
        _ => return Err(RegistrationError::BadVtableHeader),
    }

    for entry in iter {
        match entry {
            VtableEntry::Start { .. } => return Err(RegistrationError::BadVtableHeader),
            VtableEntry::End => {}
            VtableEntry::Method { member, in_sig, out_sig, handler, flags } => {
                if member.as_cstr().to_bytes().is_empty() {
                    return Err(RegistrationError::InvalidMemberName(member.to_string()));
                }
                let in_s = in_sig.as_cstr().to_string_lossy();
                let out_s = out_sig.as_cstr().to_string_lossy();
                if handler.is_none() && !(in_s.is_empty() && out_s.is_empty()) {
                    return Err(RegistrationError::MethodMissingHandler(member.to_string()));
                }
                if flags.intersects(Flags::PROPERTY_EMITS_CHANGE | Flags::PROPERTY_INVALIDATE_ONLY) {
                    return Err(RegistrationError::NoReplyNotAllowed(member.to_string()));
                }
            }
            VtableEntry::Property { member, signature, get, flags } => {
                if Member::new(member.clone()).is_err() {
                    return Err(RegistrationError::InvalidMemberName(member.clone()));
                }
                let sig = signature.as_cstr().to_string_lossy();
                if !is_single_complete_type(&sig) {
                    return Err(RegistrationError::InvalidSignature(member.clone()));
                }
                if get.is_none() && !(is_basic_signature(&sig) || sig == "as") {
                    return Err(RegistrationError::PropertySignatureNeedsGetter(member.clone()));
                }
                if flags.contains(Flags::PROPERTY_INVALIDATE_ONLY) && !flags.contains(Flags::PROPERTY_EMITS_CHANGE) {
                    return Err(RegistrationError::InvalidateWithoutEmits(member.clone()));
                }
                if flags.contains(Flags::UNPRIVILEGED) {
                    return Err(RegistrationError::UnprivilegedOnReadOnlyProperty(member.clone()));
                }
                if flags.contains(Flags::METHOD_NO_REPLY) {
                    return Err(RegistrationError::NoReplyNotAllowed(member.clone()));
                }
            }
            VtableEntry::WritableProperty { member, signature, set, flags, .. } => {
                if Member::new(member.clone()).is_err() {
                    return Err(RegistrationError::InvalidMemberName(member.clone()));
                }
                let sig = signature.as_cstr().to_string_lossy();
                if !is_single_complete_type(&sig) {
                    return Err(RegistrationError::InvalidSignature(member.clone()));
                }
                if set.is_none() && !is_basic_signature(&sig) {
                    return Err(RegistrationError::WritablePropertyNeedsSetter(member.clone()));
                }
                if flags.contains(Flags::METHOD_NO_REPLY) {
                    return Err(RegistrationError::NoReplyNotAllowed(member.clone()));
                }
                if flags.contains(Flags::PROPERTY_INVALIDATE_ONLY) && !flags.contains(Flags::PROPERTY_EMITS_CHANGE) {
                    return Err(RegistrationError::InvalidateWithoutEmits(member.clone()));
                }
            }
            VtableEntry::Signal { member, signature, flags } => {
                if member.as_cstr().to_bytes().is_empty() {
                    return Err(RegistrationError::InvalidMemberName(member.to_string()));
                }
                let sig = signature.as_cstr().to_string_lossy();
                if !is_valid_multi_signature(&sig) {
                    return Err(RegistrationError::InvalidSignature(member.to_string()));
                }
                if flags.contains(Flags::UNPRIVILEGED) {
                    return Err(RegistrationError::UnprivilegedOnReadOnlyProperty(member.to_string()));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn capability_tag_roundtrip() {
        let f = Flags::empty().with_capability_tag(22); // CAP_NET_ADMIN + 1
        assert_eq!(f.capability(), Some(21));
    }

    #[test]
    fn zero_tag_means_inherit() {
        let f = Flags::empty();
        assert_eq!(f.capability(), None);
    }

    #[test]
    fn single_complete_type() {
        assert!(is_single_complete_type("s"));
        assert!(is_single_complete_type("as"));
        assert!(is_single_complete_type("a{sv}"));
        assert!(!is_single_complete_type("ss"));
        assert!(!is_single_complete_type(""));
    }

    #[test]
    fn bad_header_rejected() {
        let entries = vec![VtableEntry::Method {
            member: Member::new("M").unwrap(),
            in_sig: Signature::new("").unwrap(),
            out_sig: Signature::new("").unwrap(),
            handler: None,
            flags: Flags::empty(),
        }];
        assert_eq!(validate(&entries), Err(RegistrationError::BadVtableHeader));
    }

    #[test]
    fn valid_multi_signature() {
        assert!(is_valid_multi_signature(""));
        assert!(is_valid_multi_signature("s"));
        assert!(is_valid_multi_signature("ss"));
        assert!(is_valid_multi_signature("a{sv}s"));
        assert!(!is_valid_multi_signature("(s"));
        assert!(!is_valid_multi_signature("s)"));
    }

    fn signal_entries(signature: Signature<'static>, flags: Flags) -> Vec<VtableEntry> {
        vec![
            VtableEntry::Start { element_size: 2, flags: Flags::empty() },
            VtableEntry::Signal { member: Member::new("Tick").unwrap(), signature, flags },
        ]
    }

    #[test]
    fn signal_with_no_args_is_valid() {
        let entries = signal_entries(Signature::new("").unwrap(), Flags::empty());
        assert_eq!(validate(&entries), Ok(()));
    }

    #[test]
    fn signal_with_one_arg_is_valid() {
        let entries = signal_entries(Signature::new("s").unwrap(), Flags::empty());
        assert_eq!(validate(&entries), Ok(()));
    }

    #[test]
    fn signal_with_unprivileged_flag_rejected() {
        let entries = signal_entries(Signature::new("s").unwrap(), Flags::UNPRIVILEGED);
        assert_eq!(validate(&entries), Err(RegistrationError::UnprivilegedOnReadOnlyProperty("Tick".to_string())));
    }

    #[test]
    fn read_only_property_with_no_reply_rejected() {
        let entries = vec![
            VtableEntry::Start { element_size: 2, flags: Flags::empty() },
            VtableEntry::Property {
                member: "Count".to_string(),
                signature: Signature::new("i").unwrap(),
                get: Some(Arc::new(|ia, _pi: &crate::node::PropInfo| { ia.append(1i32); Ok(()) })),
                flags: Flags::METHOD_NO_REPLY,
            },
        ];
        assert_eq!(validate(&entries), Err(RegistrationError::NoReplyNotAllowed("Count".to_string())));
    }
}
