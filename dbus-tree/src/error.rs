//! Error types returned by the dispatch engine.
//!
//! [`MethodErr`] mirrors the wire-facing error the teacher crate's
//! `tree::MethodErr` has always been: a (name, message) pair that turns into a
//! method-error reply. Registration-time and emitter-time failures that never
//! reach the wire get their own small enums instead of being shoehorned into
//! `MethodErr`.

use std::fmt;
use dbus::{Message, arg};
use dbus::strings::{ErrorName, Member, Path};

/// A D-Bus method error: an error name plus a human-readable message.
///
/// Converts to a method-error reply with [`MethodErr::to_message`]. Construct
/// one of the standard wire errors listed in the public registration API
/// (`INVALID_ARGS`, `ACCESS_DENIED`, `PROPERTY_READ_ONLY`, `UNKNOWN_INTERFACE`,
/// `UNKNOWN_METHOD`, `UNKNOWN_PROPERTY`) with the associated constructor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodErr(String, String);

impl MethodErr {
    fn new<N: Into<String>, M: Into<String>>(name: N, msg: M) -> MethodErr {
        MethodErr(name.into(), msg.into())
    }

    /// `org.freedesktop.DBus.Error.InvalidArgs` — malformed or mismatched arguments.
    pub fn invalid_args<T: fmt::Debug>(a: &T) -> MethodErr {
        MethodErr::new("org.freedesktop.DBus.Error.InvalidArgs", format!("Invalid arguments: {:?}", a))
    }

    /// `org.freedesktop.DBus.Error.AccessDenied` — the access check in `access` denied the call.
    pub fn access_denied(iface: &str, member: &str) -> MethodErr {
        MethodErr::new("org.freedesktop.DBus.Error.AccessDenied",
            format!("Access to {}.{}() not permitted", iface, member))
    }

    /// `org.freedesktop.DBus.Error.PropertyReadOnly` — `Set` on a non-writable property.
    pub fn property_read_only(name: &str) -> MethodErr {
        MethodErr::new("org.freedesktop.DBus.Error.PropertyReadOnly",
            format!("Property {} is read-only", name))
    }

    /// `org.freedesktop.DBus.Error.UnknownInterface`
    pub fn unknown_interface(name: &str) -> MethodErr {
        MethodErr::new("org.freedesktop.DBus.Error.UnknownInterface",
            format!("Unknown interface {}", name))
    }

    /// `org.freedesktop.DBus.Error.UnknownMethod`
    pub fn unknown_method(member: &Member) -> MethodErr {
        MethodErr::new("org.freedesktop.DBus.Error.UnknownMethod",
            format!("Unknown method {}", member))
    }

    /// `org.freedesktop.DBus.Error.UnknownProperty`
    pub fn unknown_property(name: &str) -> MethodErr {
        MethodErr::new("org.freedesktop.DBus.Error.UnknownProperty",
            format!("Unknown property {}", name))
    }

    /// `org.freedesktop.DBus.Error.UnknownObject` — path not present in the node store.
    pub fn unknown_object(path: &Path) -> MethodErr {
        MethodErr::new("org.freedesktop.DBus.Error.UnknownObject",
            format!("Unknown object {}", path))
    }

    /// Generic failure, used by `maybe_reply_error` when a handler returned an
    /// error code without filling in a more specific one.
    pub fn failed<T: fmt::Display>(msg: &T) -> MethodErr {
        MethodErr::new("org.freedesktop.DBus.Error.Failed", msg.to_string())
    }

    pub fn errorname(&self) -> &str { &self.0 }
    pub fn description(&self) -> &str { &self.1 }

    /// Turn this error into a method-error reply to `call`.
    pub fn to_message(&self, call: &Message) -> Message {
        let name = ErrorName::new(self.0.clone()).unwrap_or_else(|_| {
            ErrorName::new("org.freedesktop.DBus.Error.Failed").unwrap()
        });
        call.error(&name, &std::ffi::CString::new(self.1.clone()).unwrap_or_default())
    }
}

impl fmt::Display for MethodErr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { write!(f, "{}: {}", self.0, self.1) }
}

impl std::error::Error for MethodErr {}

impl From<arg::TypeMismatchError> for MethodErr {
    fn from(e: arg::TypeMismatchError) -> MethodErr { MethodErr::invalid_args(&e) }
}

/// Result of a method, property accessor, or standard-interface handler:
/// zero or more outgoing messages, or a wire error to report to the caller.
pub type MethodResult = Result<Vec<Message>, MethodErr>;

/// Argument/validation errors from the registration API (spec §4.1, §7).
/// These never reach the wire; they are returned directly to the caller of
/// `add_object_vtable` et al.
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("vtable does not start with a START entry, or its element size does not match")]
    BadVtableHeader,
    #[error("{0} is not a valid member name")]
    InvalidMemberName(String),
    #[error("{0} is not a valid signature")]
    InvalidSignature(String),
    #[error("METHOD {0} has neither a handler nor empty in/out signatures")]
    MethodMissingHandler(String),
    #[error("PROPERTY {0} has a non-basic, non-\"as\" signature without a custom getter")]
    PropertySignatureNeedsGetter(String),
    #[error("WRITABLE_PROPERTY {0} has a non-basic signature without a custom setter")]
    WritablePropertyNeedsSetter(String),
    #[error("METHOD_NO_REPLY is not allowed on {0}")]
    NoReplyNotAllowed(String),
    #[error("PROPERTY_INVALIDATE_ONLY on {0} requires PROPERTY_EMITS_CHANGE")]
    InvalidateWithoutEmits(String),
    #[error("UNPRIVILEGED is not allowed on read-only PROPERTY {0}")]
    UnprivilegedOnReadOnlyProperty(String),
    #[error("{0} is a reserved interface and cannot be registered directly")]
    ReservedInterface(String),
    #[error("cannot mix fallback and non-fallback vtables on the same node")]
    MixedFallback,
    #[error("this vtable is already registered at this path/interface")]
    DuplicateVtable,
    #[error("no matching registration found to remove")]
    NotFound,
}

/// Programmer errors from the signal emitters (spec §4.11, §9 open question).
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
pub enum EmitError {
    #[error("property {0} was named in a PropertiesChanged emission but lacks PROPERTY_EMITS_CHANGE")]
    NotEmitsChange(String),
    #[error("no vtable resolved for interface {0} at {1}")]
    NoSuchInterface(String, String),
}

/// If a handler returned `Err(0)`-equivalent (i.e. reported failure) but never
/// filled in a `MethodErr`, synthesize a generic failure reply. Mirrors the
/// original's `bus_maybe_reply_error`.
pub fn maybe_reply_error(call: &Message, err: Option<MethodErr>) -> Message {
    let err = err.unwrap_or_else(|| MethodErr::failed(&"Operation failed"));
    err.to_message(call)
}
