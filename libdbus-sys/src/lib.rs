//! Low level D-Bus bindings. Don't use this module unless you want to do something very low-level.
#![allow(non_camel_case_types)]

use std::os::raw::{c_char, c_int, c_uint, c_void};

pub use std::ffi::CStr;

pub type dbus_bool_t = u32;
pub type dbus_uint32_t = u32;
pub type dbus_int32_t = i32;

// Opaque, heap-allocated-by-libdbus types. Never constructed on the Rust side.
#[repr(C)] pub struct DBusConnection { _private: [u8; 0] }
#[repr(C)] pub struct DBusMessage { _private: [u8; 0] }
#[repr(C)] pub struct DBusServer { _private: [u8; 0] }
#[repr(C)] pub struct DBusWatch { _private: [u8; 0] }
#[repr(C)] pub struct DBusTimeout { _private: [u8; 0] }
#[repr(C)] pub struct DBusPendingCall { _private: [u8; 0] }

/// Mirrors the real `DBusError` layout: two string fields libdbus itself
/// writes into, followed by a reserved dummy/padding tail.
#[repr(C)]
pub struct DBusError {
    pub name: *const c_char,
    pub message: *const c_char,
    dummy: c_uint,
    padding1: *mut c_void,
}

/// Fixed-size, stack-allocated iterator state. Libdbus treats the contents as
/// opaque and only ever writes/reads through `dbus_message_iter_*`; the Rust
/// side just needs a correctly sized, zero-initialized block to hand it.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct DBusMessageIter {
    dummy1: *mut c_void,
    dummy2: *mut c_void,
    dummy3: dbus_uint32_t,
    dummy4: c_int,
    dummy5: c_int,
    dummy6: c_int,
    dummy7: c_int,
    dummy8: c_int,
    dummy9: c_int,
    dummy10: c_int,
    dummy11: c_int,
    pad1: c_int,
    pad2: *mut c_void,
    pad3: *mut c_void,
}

impl DBusMessageIter {
    pub fn zeroed() -> DBusMessageIter {
        DBusMessageIter {
            dummy1: std::ptr::null_mut(), dummy2: std::ptr::null_mut(),
            dummy3: 0, dummy4: 0, dummy5: 0, dummy6: 0, dummy7: 0, dummy8: 0,
            dummy9: 0, dummy10: 0, dummy11: 0, pad1: 0,
            pad2: std::ptr::null_mut(), pad3: std::ptr::null_mut(),
        }
    }
}

#[repr(C)]
pub struct DBusObjectPathVTable {
    pub unregister_function: Option<unsafe extern "C" fn(*mut DBusConnection, *mut c_void)>,
    pub message_function: Option<unsafe extern "C" fn(*mut DBusConnection, *mut DBusMessage, *mut c_void) -> DBusHandlerResult>,
    _pad1: Option<unsafe extern "C" fn()>,
    _pad2: Option<unsafe extern "C" fn()>,
    _pad3: Option<unsafe extern "C" fn()>,
    _pad4: Option<unsafe extern "C" fn()>,
}

pub type DBusAddWatchFunction = Option<unsafe extern "C" fn(*mut DBusWatch, *mut c_void) -> dbus_bool_t>;
pub type DBusRemoveWatchFunction = Option<unsafe extern "C" fn(*mut DBusWatch, *mut c_void)>;
pub type DBusWatchToggledFunction = Option<unsafe extern "C" fn(*mut DBusWatch, *mut c_void)>;
pub type DBusFreeFunction = Option<unsafe extern "C" fn(*mut c_void)>;
pub type DBusNewConnectionFunction = Option<unsafe extern "C" fn(*mut DBusServer, *mut DBusConnection, *mut c_void)>;

#[repr(C)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum DBusBusType {
    Session = 0,
    System = 1,
    Starter = 2,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum DBusMessageType {
    MethodCall = 1,
    MethodReturn = 2,
    Error = 3,
    Signal = 4,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DBusHandlerResult {
    Handled = 0,
    NotYetHandled = 1,
    NeedMemory = 2,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DBusDispatchStatus {
    DataRemains = 0,
    Complete = 1,
    NeedMemory = 2,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DBusRequestNameReply {
    PrimaryOwner = 1,
    InQueue = 2,
    Exists = 3,
    AlreadyOwner = 4,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DBusReleaseNameReply {
    Released = 1,
    NonExistent = 2,
    NotOwner = 3,
}

pub const DBUS_NAME_FLAG_ALLOW_REPLACEMENT: u32 = 0x1;
pub const DBUS_NAME_FLAG_REPLACE_EXISTING: u32 = 0x2;
pub const DBUS_NAME_FLAG_DO_NOT_QUEUE: u32 = 0x4;

pub const DBUS_WATCH_READABLE: u32 = 0x1;
pub const DBUS_WATCH_WRITABLE: u32 = 0x2;
pub const DBUS_WATCH_ERROR: u32 = 0x4;
pub const DBUS_WATCH_HANGUP: u32 = 0x8;

// Argument type codes, as ASCII values (DBUS_TYPE_* in dbus-protocol.h).
pub const DBUS_TYPE_INVALID: c_int = 0;
pub const DBUS_TYPE_BYTE: c_int = b'y' as c_int;
pub const DBUS_TYPE_BOOLEAN: c_int = b'b' as c_int;
pub const DBUS_TYPE_INT16: c_int = b'n' as c_int;
pub const DBUS_TYPE_UINT16: c_int = b'q' as c_int;
pub const DBUS_TYPE_INT32: c_int = b'i' as c_int;
pub const DBUS_TYPE_UINT32: c_int = b'u' as c_int;
pub const DBUS_TYPE_INT64: c_int = b'x' as c_int;
pub const DBUS_TYPE_UINT64: c_int = b't' as c_int;
pub const DBUS_TYPE_DOUBLE: c_int = b'd' as c_int;
pub const DBUS_TYPE_STRING: c_int = b's' as c_int;
pub const DBUS_TYPE_OBJECT_PATH: c_int = b'o' as c_int;
pub const DBUS_TYPE_SIGNATURE: c_int = b'g' as c_int;
pub const DBUS_TYPE_UNIX_FD: c_int = b'h' as c_int;
pub const DBUS_TYPE_ARRAY: c_int = b'a' as c_int;
pub const DBUS_TYPE_VARIANT: c_int = b'v' as c_int;
pub const DBUS_TYPE_STRUCT: c_int = b'r' as c_int;
pub const DBUS_TYPE_DICT_ENTRY: c_int = b'e' as c_int;

extern "C" {
    // Error handling
    pub fn dbus_error_init(error: *mut DBusError);
    pub fn dbus_error_free(error: *mut DBusError);
    pub fn dbus_set_error(error: *mut DBusError, name: *const c_char, message: *const c_char, ...) -> ();
    pub fn dbus_set_error_from_message(error: *mut DBusError, message: *mut DBusMessage) -> dbus_bool_t;

    // Threading
    pub fn dbus_threads_init_default() -> dbus_bool_t;

    pub fn dbus_free(memory: *mut c_void);
    pub fn dbus_free_string_array(str_array: *mut *mut c_char);

    pub fn dbus_get_local_machine_id() -> *mut c_char;
    pub fn dbus_try_get_local_machine_id(error: *mut DBusError) -> *mut c_char;

    // Bus
    pub fn dbus_bus_get_private(ty: DBusBusType, error: *mut DBusError) -> *mut DBusConnection;
    pub fn dbus_bus_register(connection: *mut DBusConnection, error: *mut DBusError) -> dbus_bool_t;
    pub fn dbus_bus_get_unique_name(connection: *mut DBusConnection) -> *const c_char;
    pub fn dbus_bus_request_name(connection: *mut DBusConnection, name: *const c_char, flags: c_uint, error: *mut DBusError) -> c_int;
    pub fn dbus_bus_release_name(connection: *mut DBusConnection, name: *const c_char, error: *mut DBusError) -> c_int;
    pub fn dbus_bus_add_match(connection: *mut DBusConnection, rule: *const c_char, error: *mut DBusError);
    pub fn dbus_bus_remove_match(connection: *mut DBusConnection, rule: *const c_char, error: *mut DBusError);

    // Connection
    pub fn dbus_connection_open_private(address: *const c_char, error: *mut DBusError) -> *mut DBusConnection;
    pub fn dbus_connection_ref(connection: *mut DBusConnection) -> *mut DBusConnection;
    pub fn dbus_connection_unref(connection: *mut DBusConnection);
    pub fn dbus_connection_close(connection: *mut DBusConnection);
    pub fn dbus_connection_get_is_connected(connection: *mut DBusConnection) -> dbus_bool_t;
    pub fn dbus_connection_set_exit_on_disconnect(connection: *mut DBusConnection, exit_on_disconnect: dbus_bool_t);
    pub fn dbus_connection_flush(connection: *mut DBusConnection);
    pub fn dbus_connection_read_write(connection: *mut DBusConnection, timeout_ms: c_int) -> dbus_bool_t;
    pub fn dbus_connection_read_write_dispatch(connection: *mut DBusConnection, timeout_ms: c_int) -> dbus_bool_t;
    pub fn dbus_connection_dispatch(connection: *mut DBusConnection) -> DBusDispatchStatus;
    pub fn dbus_connection_pop_message(connection: *mut DBusConnection) -> *mut DBusMessage;
    pub fn dbus_connection_has_messages_to_send(connection: *mut DBusConnection) -> dbus_bool_t;
    pub fn dbus_connection_send(connection: *mut DBusConnection, message: *mut DBusMessage, serial: *mut dbus_uint32_t) -> dbus_bool_t;
    pub fn dbus_connection_send_with_reply_and_block(
        connection: *mut DBusConnection, message: *mut DBusMessage, timeout_ms: c_int, error: *mut DBusError,
    ) -> *mut DBusMessage;
    pub fn dbus_connection_add_filter(
        connection: *mut DBusConnection,
        function: Option<unsafe extern "C" fn(*mut DBusConnection, *mut DBusMessage, *mut c_void) -> DBusHandlerResult>,
        data: *mut c_void, free_data_function: DBusFreeFunction,
    ) -> dbus_bool_t;
    pub fn dbus_connection_set_watch_functions(
        connection: *mut DBusConnection, add_function: DBusAddWatchFunction, remove_function: DBusRemoveWatchFunction,
        toggled_function: DBusWatchToggledFunction, data: *mut c_void, free_data_function: DBusFreeFunction,
    ) -> dbus_bool_t;
    pub fn dbus_connection_try_register_object_path(
        connection: *mut DBusConnection, path: *const c_char, vtable: *const DBusObjectPathVTable,
        user_data: *mut c_void, error: *mut DBusError,
    ) -> dbus_bool_t;
    pub fn dbus_connection_unregister_object_path(connection: *mut DBusConnection, path: *const c_char) -> dbus_bool_t;
    pub fn dbus_connection_list_registered(
        connection: *mut DBusConnection, parent_path: *const c_char, child_entries: *mut *mut *mut c_char,
    ) -> dbus_bool_t;

    // Server
    pub fn dbus_server_listen(address: *const c_char, error: *mut DBusError) -> *mut DBusServer;
    pub fn dbus_server_ref(server: *mut DBusServer) -> *mut DBusServer;
    pub fn dbus_server_unref(server: *mut DBusServer);
    pub fn dbus_server_disconnect(server: *mut DBusServer);
    pub fn dbus_server_get_is_connected(server: *mut DBusServer) -> dbus_bool_t;
    pub fn dbus_server_get_address(server: *mut DBusServer) -> *mut c_char;
    pub fn dbus_server_get_id(server: *mut DBusServer) -> *mut c_char;
    pub fn dbus_server_set_auth_mechanisms(server: *mut DBusServer, mechanisms: *mut *const c_char) -> dbus_bool_t;
    pub fn dbus_server_set_new_connection_function(
        server: *mut DBusServer, function: DBusNewConnectionFunction, data: *mut c_void, free_data_function: DBusFreeFunction,
    );
    pub fn dbus_server_set_watch_functions(
        server: *mut DBusServer, add_function: DBusAddWatchFunction, remove_function: DBusRemoveWatchFunction,
        toggled_function: DBusWatchToggledFunction, data: *mut c_void, free_data_function: DBusFreeFunction,
    ) -> dbus_bool_t;

    // Watch
    pub fn dbus_watch_get_unix_fd(watch: *mut DBusWatch) -> c_int;
    pub fn dbus_watch_get_socket(watch: *mut DBusWatch) -> c_int;
    pub fn dbus_watch_get_enabled(watch: *mut DBusWatch) -> dbus_bool_t;
    pub fn dbus_watch_get_flags(watch: *mut DBusWatch) -> c_uint;
    pub fn dbus_watch_handle(watch: *mut DBusWatch, flags: c_uint) -> dbus_bool_t;

    // Message: construction, headers
    pub fn dbus_message_new_method_call(
        bus_name: *const c_char, path: *const c_char, iface: *const c_char, method: *const c_char,
    ) -> *mut DBusMessage;
    pub fn dbus_message_new_method_return(method_call: *mut DBusMessage) -> *mut DBusMessage;
    pub fn dbus_message_new_signal(path: *const c_char, iface: *const c_char, name: *const c_char) -> *mut DBusMessage;
    pub fn dbus_message_new_error(reply_to: *mut DBusMessage, error_name: *const c_char, error_message: *const c_char) -> *mut DBusMessage;
    pub fn dbus_message_ref(message: *mut DBusMessage) -> *mut DBusMessage;
    pub fn dbus_message_unref(message: *mut DBusMessage);
    pub fn dbus_message_get_type(message: *mut DBusMessage) -> c_int;
    pub fn dbus_message_get_path(message: *mut DBusMessage) -> *const c_char;
    pub fn dbus_message_get_interface(message: *mut DBusMessage) -> *const c_char;
    pub fn dbus_message_get_member(message: *mut DBusMessage) -> *const c_char;
    pub fn dbus_message_get_sender(message: *mut DBusMessage) -> *const c_char;
    pub fn dbus_message_get_destination(message: *mut DBusMessage) -> *const c_char;
    pub fn dbus_message_set_destination(message: *mut DBusMessage, destination: *const c_char) -> dbus_bool_t;
    pub fn dbus_message_get_serial(message: *mut DBusMessage) -> dbus_uint32_t;
    pub fn dbus_message_set_serial(message: *mut DBusMessage, serial: dbus_uint32_t);
    pub fn dbus_message_get_reply_serial(message: *mut DBusMessage) -> dbus_uint32_t;
    pub fn dbus_message_get_no_reply(message: *mut DBusMessage) -> dbus_bool_t;
    pub fn dbus_message_set_no_reply(message: *mut DBusMessage, no_reply: dbus_bool_t);
    pub fn dbus_message_get_auto_start(message: *mut DBusMessage) -> dbus_bool_t;
    pub fn dbus_message_set_auto_start(message: *mut DBusMessage, auto_start: dbus_bool_t);

    // Message: argument marshaling
    pub fn dbus_message_iter_init(message: *mut DBusMessage, iter: *mut DBusMessageIter) -> dbus_bool_t;
    pub fn dbus_message_iter_init_append(message: *mut DBusMessage, iter: *mut DBusMessageIter);
    pub fn dbus_message_iter_has_next(iter: *mut DBusMessageIter) -> dbus_bool_t;
    pub fn dbus_message_iter_next(iter: *mut DBusMessageIter) -> dbus_bool_t;
    pub fn dbus_message_iter_get_arg_type(iter: *mut DBusMessageIter) -> c_int;
    pub fn dbus_message_iter_get_element_type(iter: *mut DBusMessageIter) -> c_int;
    pub fn dbus_message_iter_get_signature(iter: *mut DBusMessageIter) -> *mut c_char;
    pub fn dbus_message_iter_recurse(iter: *mut DBusMessageIter, sub: *mut DBusMessageIter);
    pub fn dbus_message_iter_get_basic(iter: *mut DBusMessageIter, value: *mut c_void);
    pub fn dbus_message_iter_get_fixed_array(iter: *mut DBusMessageIter, value: *mut c_void, n_elements: *mut c_int);
    pub fn dbus_message_iter_append_basic(iter: *mut DBusMessageIter, ty: c_int, value: *const c_void) -> dbus_bool_t;
    pub fn dbus_message_iter_append_fixed_array(iter: *mut DBusMessageIter, element_type: c_int, value: *const c_void, n_elements: c_int) -> dbus_bool_t;
    pub fn dbus_message_iter_open_container(
        iter: *mut DBusMessageIter, ty: c_int, contained_signature: *const c_char, sub: *mut DBusMessageIter,
    ) -> dbus_bool_t;
    pub fn dbus_message_iter_close_container(iter: *mut DBusMessageIter, sub: *mut DBusMessageIter) -> dbus_bool_t;

    // Validation
    pub fn dbus_signature_validate_single(signature: *const c_char, error: *mut DBusError) -> dbus_bool_t;
    pub fn dbus_validate_path(path: *const c_char, error: *mut DBusError) -> dbus_bool_t;
    pub fn dbus_validate_member(name: *const c_char, error: *mut DBusError) -> dbus_bool_t;
    pub fn dbus_validate_interface(name: *const c_char, error: *mut DBusError) -> dbus_bool_t;
    pub fn dbus_validate_bus_name(name: *const c_char, error: *mut DBusError) -> dbus_bool_t;
    pub fn dbus_validate_error_name(name: *const c_char, error: *mut DBusError) -> dbus_bool_t;
}
