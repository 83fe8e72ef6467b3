//! D-Bus bindings for Rust
//!
//! [D-Bus](http://dbus.freedesktop.org/) is a message bus, and is mainly used in Linux
//! for communication between processes. It is present by default on almost every
//! Linux distribution out there, and runs in two instances - one per session, and one
//! system-wide.
//!
//! In addition to the API documentation, which you're currently reading, you might want to
//! look in the examples directory, which contains many examples and an argument guide.
//! README.md also contain a few quick "getting started" examples.
//!
//! In addition to this crate, there are two companion crates, dbus-codegen for generating Rust
//! code from D-Bus introspection data, and dbus-tokio for integrating D-Bus with [Tokio](http://tokio.rs).
//! However, at the time of this writing, these are far less mature than this crate. 

#![warn(missing_docs)]

extern crate libc;

#[allow(missing_docs)]
extern crate libdbus_sys as ffi;


pub use crate::ffi::DBusBusType as BusType;
pub use crate::ffi::DBusRequestNameReply as RequestNameReply;
pub use crate::ffi::DBusReleaseNameReply as ReleaseNameReply;
pub use crate::ffi::DBusMessageType as MessageType;

pub use crate::message::Message;
pub use crate::message::MatchRule;

mod message;

mod error;
pub use error::Error;

mod watch;
pub mod channel;

mod dispatcher;
pub use crate::dispatcher::MessageDispatcher;

mod filters;
pub mod proxy;
pub use crate::proxy::Proxy;

mod server;
pub use crate::server::Server;

pub mod strings;
pub use crate::strings::{Signature, Path, Interface, Member, ErrorName, BusName};

pub mod arg;

static INITDBUS: std::sync::Once = std::sync::Once::new();

use std::ffi::{CString, CStr};
use std::os::raw::c_char;
use std::ptr;

fn init_dbus() {
    INITDBUS.call_once(|| {
        if unsafe { ffi::dbus_threads_init_default() } == 0 {
            panic!("Out of memory when trying to initialize D-Bus library!");
        }
    });
}

fn c_str_to_slice(c: & *const c_char) -> Option<&str> {
    if *c == ptr::null() { None }
    else { std::str::from_utf8( unsafe { CStr::from_ptr(*c).to_bytes() }).ok() }
}

fn to_c_str(n: &str) -> CString { CString::new(n.as_bytes()).unwrap() }


#[cfg(test)]
mod test {
    use super::{Message, MessageType};

    #[test]
    fn method_call_roundtrip() {
        let m = Message::new_method_call("foo.bar", "/", "foo.bar", "FooBar").unwrap()
            .append1(42i32);
        assert_eq!(m.msg_type(), MessageType::MethodCall);
        assert_eq!(m.interface().unwrap().to_string(), "foo.bar");
        assert_eq!(m.get1::<i32>(), Some(42));
    }

    #[test]
    fn error_message_has_error_type() {
        let call = Message::new_method_call("foo.bar", "/", "foo.bar", "FooBar").unwrap();
        let err = call.error(&"foo.bar.Error.Failed".into(), &super::to_c_str("nope"));
        assert_eq!(err.msg_type(), MessageType::Error);
    }
}
