//! Types and traits for encoding and decoding D-Bus message arguments.
//!
//! [`Arg`], [`Append`] and [`Get`] are implemented for the Rust types that
//! correspond to a D-Bus basic type (`bool`, the integer widths, `f64`,
//! `&str`/`String` and the string-like wrappers in [`crate::strings`]).
//! [`Variant`], [`Array`] and [`Dict`] cover the three D-Bus container types
//! this crate round-trips; [`Iter`]/[`IterAppend`] drive `dbus_message_iter_*`
//! directly and are what `Message`'s own `get`/`read`/`append*` methods are
//! built on.

use std::ffi::{CStr, CString};
use std::marker::PhantomData;
use std::os::raw::{c_char, c_void};
use std::{fmt, ptr};

use crate::strings::Signature;
use crate::Message;

mod msgarg;
pub use self::msgarg::{cast, cast_mut, Append, Arg, DictKey, FixedArray, Get, RefArg};

/// D-Bus's own wire type code for a [`Arg`]/[`RefArg`] implementor.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ArgType {
    Array,
    Variant,
    Boolean,
    Invalid,
    String,
    DictEntry,
    Byte,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Double,
    ObjectPath,
    Signature,
    UnixFd,
    Struct,
}

impl ArgType {
    fn from_raw(i: i32) -> ArgType {
        match i {
            ffi::DBUS_TYPE_ARRAY => ArgType::Array,
            ffi::DBUS_TYPE_VARIANT => ArgType::Variant,
            ffi::DBUS_TYPE_BOOLEAN => ArgType::Boolean,
            ffi::DBUS_TYPE_STRING => ArgType::String,
            ffi::DBUS_TYPE_DICT_ENTRY => ArgType::DictEntry,
            ffi::DBUS_TYPE_BYTE => ArgType::Byte,
            ffi::DBUS_TYPE_INT16 => ArgType::Int16,
            ffi::DBUS_TYPE_UINT16 => ArgType::UInt16,
            ffi::DBUS_TYPE_INT32 => ArgType::Int32,
            ffi::DBUS_TYPE_UINT32 => ArgType::UInt32,
            ffi::DBUS_TYPE_INT64 => ArgType::Int64,
            ffi::DBUS_TYPE_UINT64 => ArgType::UInt64,
            ffi::DBUS_TYPE_DOUBLE => ArgType::Double,
            ffi::DBUS_TYPE_OBJECT_PATH => ArgType::ObjectPath,
            ffi::DBUS_TYPE_SIGNATURE => ArgType::Signature,
            ffi::DBUS_TYPE_UNIX_FD => ArgType::UnixFd,
            ffi::DBUS_TYPE_STRUCT => ArgType::Struct,
            _ => ArgType::Invalid,
        }
    }

    fn as_raw(self) -> i32 {
        match self {
            ArgType::Array => ffi::DBUS_TYPE_ARRAY,
            ArgType::Variant => ffi::DBUS_TYPE_VARIANT,
            ArgType::Boolean => ffi::DBUS_TYPE_BOOLEAN,
            ArgType::Invalid => ffi::DBUS_TYPE_INVALID,
            ArgType::String => ffi::DBUS_TYPE_STRING,
            ArgType::DictEntry => ffi::DBUS_TYPE_DICT_ENTRY,
            ArgType::Byte => ffi::DBUS_TYPE_BYTE,
            ArgType::Int16 => ffi::DBUS_TYPE_INT16,
            ArgType::UInt16 => ffi::DBUS_TYPE_UINT16,
            ArgType::Int32 => ffi::DBUS_TYPE_INT32,
            ArgType::UInt32 => ffi::DBUS_TYPE_UINT32,
            ArgType::Int64 => ffi::DBUS_TYPE_INT64,
            ArgType::UInt64 => ffi::DBUS_TYPE_UINT64,
            ArgType::Double => ffi::DBUS_TYPE_DOUBLE,
            ArgType::ObjectPath => ffi::DBUS_TYPE_OBJECT_PATH,
            ArgType::Signature => ffi::DBUS_TYPE_SIGNATURE,
            ArgType::UnixFd => ffi::DBUS_TYPE_UNIX_FD,
            ArgType::Struct => ffi::DBUS_TYPE_STRUCT,
        }
    }

    fn as_sig_str(self) -> &'static str {
        match self {
            ArgType::Array => "a",
            ArgType::Variant => "v",
            ArgType::Boolean => "b",
            ArgType::Invalid => "",
            ArgType::String => "s",
            ArgType::DictEntry => "e",
            ArgType::Byte => "y",
            ArgType::Int16 => "n",
            ArgType::UInt16 => "q",
            ArgType::Int32 => "i",
            ArgType::UInt32 => "u",
            ArgType::Int64 => "x",
            ArgType::UInt64 => "t",
            ArgType::Double => "d",
            ArgType::ObjectPath => "o",
            ArgType::Signature => "g",
            ArgType::UnixFd => "h",
            ArgType::Struct => "r",
        }
    }
}

/// Returned when an argument read from a message doesn't have the expected type.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TypeMismatchError {
    position: u32,
    found: ArgType,
    expected: ArgType,
}

impl TypeMismatchError {
    /// The zero-based argument position where the mismatch occurred.
    pub fn pos(&self) -> u32 { self.position }
    /// The type that was actually found on the wire.
    pub fn found_arg_type(&self) -> ArgType { self.found }
    /// The type the caller asked for.
    pub fn expected_arg_type(&self) -> ArgType { self.expected }
}

impl fmt::Display for TypeMismatchError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Argument {} is {:?}, expected {:?}", self.position, self.found, self.expected)
    }
}

impl std::error::Error for TypeMismatchError {}

/// A D-Bus argument iterator, reading one message's arguments in order.
pub struct Iter<'a> {
    iter: ffi::DBusMessageIter,
    pos: u32,
    _msg: PhantomData<&'a Message>,
}

impl<'a> Iter<'a> {
    /// Creates a new `Iter` positioned at the first argument of `msg`.
    pub fn new(msg: &'a Message) -> Iter<'a> {
        let mut iter = ffi::DBusMessageIter::zeroed();
        unsafe { ffi::dbus_message_iter_init(msg.ptr(), &mut iter) };
        Iter { iter, pos: 0, _msg: PhantomData }
    }

    fn empty() -> Iter<'a> { Iter { iter: ffi::DBusMessageIter::zeroed(), pos: 0, _msg: PhantomData } }

    /// The D-Bus type of the argument currently under the cursor.
    pub fn arg_type(&mut self) -> ArgType {
        ArgType::from_raw(unsafe { ffi::dbus_message_iter_get_arg_type(&mut self.iter) })
    }

    /// Advances to the next argument. Returns false if there wasn't one.
    pub fn next(&mut self) -> bool {
        self.pos += 1;
        unsafe { ffi::dbus_message_iter_next(&mut self.iter) != 0 }
    }

    /// Descends into a container argument (array, variant, struct, dict entry)
    /// if the cursor is currently on one of type `t`.
    pub fn recurse(&mut self, t: ArgType) -> Option<Iter<'a>> {
        if self.arg_type() != t { return None; }
        let mut sub = ffi::DBusMessageIter::zeroed();
        unsafe { ffi::dbus_message_iter_recurse(&mut self.iter, &mut sub) };
        Some(Iter { iter: sub, pos: 0, _msg: PhantomData })
    }

    unsafe fn get_basic_raw(&mut self, out: *mut c_void) {
        ffi::dbus_message_iter_get_basic(&mut self.iter, out)
    }

    /// Reads the current argument as `T`, leaving the cursor in place.
    /// Returns `None` on type mismatch or end of arguments.
    pub fn get<T: Get<'a>>(&mut self) -> Option<T> { T::get(self) }

    /// Like [`Iter::get`], but returns a [`TypeMismatchError`] instead of `None`.
    pub fn read<T: Arg + Get<'a>>(&mut self) -> Result<T, TypeMismatchError> {
        let found = self.arg_type();
        match self.get::<T>() {
            Some(v) => { self.next(); Ok(v) }
            None => Err(TypeMismatchError { position: self.pos, found, expected: T::ARG_TYPE }),
        }
    }

    /// A best-effort dynamic read of the current argument, for debug printing.
    pub fn get_refarg(&mut self) -> Option<Box<dyn RefArg + 'static>> {
        let t = self.arg_type();
        let r: Box<dyn RefArg + 'static> = match t {
            ArgType::Invalid => return None,
            ArgType::Boolean => Box::new(self.get::<bool>()?),
            ArgType::Byte => Box::new(self.get::<u8>()?),
            ArgType::Int16 => Box::new(self.get::<i16>()?),
            ArgType::UInt16 => Box::new(self.get::<u16>()?),
            ArgType::Int32 => Box::new(self.get::<i32>()?),
            ArgType::UInt32 => Box::new(self.get::<u32>()?),
            ArgType::Int64 => Box::new(self.get::<i64>()?),
            ArgType::UInt64 => Box::new(self.get::<u64>()?),
            ArgType::Double => Box::new(self.get::<f64>()?),
            ArgType::String | ArgType::ObjectPath | ArgType::Signature => {
                Box::new(self.get::<&str>()?.to_string())
            }
            ArgType::Variant => {
                let mut sub = self.recurse(ArgType::Variant)?;
                sub.get_refarg()?
            }
            other => Box::new(ContainerSummary(other.as_sig_str().to_string())),
        };
        Some(r)
    }
}

/// Stand-in for a container argument too deeply nested to marshal into a
/// concrete [`RefArg`]; carries just its top-level type code.
#[derive(Debug, Clone)]
struct ContainerSummary(String);

impl RefArg for ContainerSummary {
    fn arg_type(&self) -> ArgType { ArgType::Invalid }
    fn signature(&self) -> Signature<'static> { Signature::new("").unwrap() }
    fn append(&self, _: &mut IterAppend) {}
    fn as_any(&self) -> &dyn std::any::Any { self }
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any { self }
}

/// A D-Bus argument appender, writing arguments into a message in order.
pub struct IterAppend<'a> {
    iter: ffi::DBusMessageIter,
    _msg: PhantomData<&'a mut Message>,
}

impl<'a> IterAppend<'a> {
    /// Creates a new `IterAppend` writing to the end of `msg`'s argument list.
    pub fn new(msg: &'a mut Message) -> IterAppend<'a> {
        let mut iter = ffi::DBusMessageIter::zeroed();
        unsafe { ffi::dbus_message_iter_init_append(msg.ptr(), &mut iter) };
        IterAppend { iter, _msg: PhantomData }
    }

    /// Appends one argument.
    pub fn append<T: Append>(&mut self, a: T) { a.append(self) }

    fn append_basic(&mut self, t: ArgType, value: *const c_void) {
        unsafe { ffi::dbus_message_iter_append_basic(&mut self.iter, t.as_raw(), value) };
    }

    fn append_container<F: FnOnce(&mut IterAppend<'a>)>(&mut self, t: ArgType, contained_sig: Option<&str>, f: F) {
        let csig = contained_sig.map(|s| CString::new(s).unwrap());
        let csig_ptr = csig.as_ref().map_or(ptr::null(), |c| c.as_ptr());
        let mut sub = IterAppend { iter: ffi::DBusMessageIter::zeroed(), _msg: PhantomData };
        unsafe { ffi::dbus_message_iter_open_container(&mut self.iter, t.as_raw(), csig_ptr, &mut sub.iter) };
        f(&mut sub);
        unsafe { ffi::dbus_message_iter_close_container(&mut self.iter, &mut sub.iter) };
    }

    /// Appends a `VARIANT` whose contained value has signature `sig`.
    pub fn append_variant<F: FnOnce(&mut IterAppend<'a>)>(&mut self, sig: &Signature<'static>, f: F) {
        self.append_container(ArgType::Variant, Some(&sig.as_cstr().to_string_lossy()), f)
    }

    /// Appends an `a{..}` array of dict entries with the given key/value signatures.
    pub fn append_dict<F: FnOnce(&mut IterAppend<'a>)>(&mut self, key_sig: &Signature<'static>, val_sig: &Signature<'static>, f: F) {
        let contained = format!("{{{}{}}}", key_sig.as_cstr().to_string_lossy(), val_sig.as_cstr().to_string_lossy());
        self.append_container(ArgType::Array, Some(&contained), f)
    }

    /// Appends one dict entry (key then value) inside an [`IterAppend::append_dict`] closure.
    pub fn append_dict_entry<F: FnOnce(&mut IterAppend<'a>)>(&mut self, f: F) {
        self.append_container(ArgType::DictEntry, None, f)
    }

    /// Appends an array of `elem_sig`-typed elements.
    pub fn append_array<F: FnOnce(&mut IterAppend<'a>)>(&mut self, elem_sig: &str, f: F) {
        self.append_container(ArgType::Array, Some(elem_sig), f)
    }
}

macro_rules! basic_impl {
    ($t: ty, $arg_type: ident) => {
        impl Arg for $t {
            const ARG_TYPE: ArgType = ArgType::$arg_type;
            fn signature() -> Signature<'static> { Signature::new(ArgType::$arg_type.as_sig_str()).unwrap() }
        }
        impl Append for $t {
            fn append(self, ia: &mut IterAppend) {
                ia.append_basic(ArgType::$arg_type, &self as *const $t as *const c_void);
            }
        }
        impl<'a> Get<'a> for $t {
            fn get(i: &mut Iter<'a>) -> Option<Self> {
                if i.arg_type() != ArgType::$arg_type { return None; }
                let mut v: $t = Default::default();
                unsafe { i.get_basic_raw(&mut v as *mut $t as *mut c_void) };
                Some(v)
            }
        }
    };
}

basic_impl!(u8, Byte);
basic_impl!(i16, Int16);
basic_impl!(u16, UInt16);
basic_impl!(i32, Int32);
basic_impl!(u32, UInt32);
basic_impl!(i64, Int64);
basic_impl!(u64, UInt64);
basic_impl!(f64, Double);

impl Arg for bool {
    const ARG_TYPE: ArgType = ArgType::Boolean;
    fn signature() -> Signature<'static> { Signature::new("b").unwrap() }
}
impl Append for bool {
    fn append(self, ia: &mut IterAppend) {
        let v: u32 = if self { 1 } else { 0 };
        ia.append_basic(ArgType::Boolean, &v as *const u32 as *const c_void);
    }
}
impl<'a> Get<'a> for bool {
    fn get(i: &mut Iter<'a>) -> Option<bool> {
        if i.arg_type() != ArgType::Boolean { return None; }
        let mut v: u32 = 0;
        unsafe { i.get_basic_raw(&mut v as *mut u32 as *mut c_void) };
        Some(v != 0)
    }
}

impl Arg for &'_ str {
    const ARG_TYPE: ArgType = ArgType::String;
    fn signature() -> Signature<'static> { Signature::new("s").unwrap() }
}
impl<'a> Append for &'a str {
    fn append(self, ia: &mut IterAppend) {
        let c = CString::new(self).unwrap();
        let p = c.as_ptr();
        ia.append_basic(ArgType::String, &p as *const *const c_char as *const c_void);
    }
}
impl<'a> Get<'a> for &'a str {
    fn get(i: &mut Iter<'a>) -> Option<&'a str> {
        if i.arg_type() != ArgType::String { return None; }
        let mut p: *const c_char = ptr::null();
        unsafe { i.get_basic_raw(&mut p as *mut *const c_char as *mut c_void) };
        if p.is_null() { return None; }
        unsafe { CStr::from_ptr(p) }.to_str().ok()
    }
}

impl Arg for String {
    const ARG_TYPE: ArgType = ArgType::String;
    fn signature() -> Signature<'static> { Signature::new("s").unwrap() }
}
impl Append for String {
    fn append(self, ia: &mut IterAppend) { self.as_str().append(ia) }
}
impl<'a> Get<'a> for String {
    fn get(i: &mut Iter<'a>) -> Option<String> { <&str>::get(i).map(|s| s.to_string()) }
}

impl DictKey for &'_ str {}
impl DictKey for String {}
impl DictKey for bool {}
impl DictKey for u8 {}
impl DictKey for i16 {}
impl DictKey for u16 {}
impl DictKey for i32 {}
impl DictKey for u32 {}
impl DictKey for i64 {}
impl DictKey for u64 {}

unsafe impl FixedArray for u8 {}
unsafe impl FixedArray for i16 {}
unsafe impl FixedArray for u16 {}
unsafe impl FixedArray for i32 {}
unsafe impl FixedArray for u32 {}
unsafe impl FixedArray for i64 {}
unsafe impl FixedArray for u64 {}
unsafe impl FixedArray for f64 {}

macro_rules! refarg_basic_impl {
    ($t: ty) => {
        impl RefArg for $t {
            fn arg_type(&self) -> ArgType { <$t as Arg>::ARG_TYPE }
            fn signature(&self) -> Signature<'static> { <$t as Arg>::signature() }
            fn append(&self, ia: &mut IterAppend) { (*self).append(ia) }
            fn as_any(&self) -> &dyn std::any::Any { self }
            fn as_any_mut(&mut self) -> &mut dyn std::any::Any { self }
        }
    };
}
refarg_basic_impl!(bool);
refarg_basic_impl!(u8);
refarg_basic_impl!(i16);
refarg_basic_impl!(u16);
refarg_basic_impl!(i32);
refarg_basic_impl!(u32);
refarg_basic_impl!(i64);
refarg_basic_impl!(u64);
refarg_basic_impl!(f64);

impl RefArg for String {
    fn arg_type(&self) -> ArgType { ArgType::String }
    fn signature(&self) -> Signature<'static> { Signature::new("s").unwrap() }
    fn append(&self, ia: &mut IterAppend) { self.as_str().append(ia) }
    fn as_any(&self) -> &dyn std::any::Any { self }
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any { self }
    fn as_str(&self) -> Option<&str> { Some(self) }
}

macro_rules! string_like_impl {
    ($t: ident, $arg_type: ident, $sig: expr) => {
        impl<'s> Arg for crate::strings::$t<'s> {
            const ARG_TYPE: ArgType = ArgType::$arg_type;
            fn signature() -> Signature<'static> { Signature::new($sig).unwrap() }
        }
        impl<'s> Append for crate::strings::$t<'s> {
            fn append(self, ia: &mut IterAppend) {
                let p = self.as_cstr().as_ptr();
                ia.append_basic(ArgType::$arg_type, &p as *const *const c_char as *const c_void);
            }
        }
        impl<'a> Get<'a> for crate::strings::$t<'a> {
            fn get(i: &mut Iter<'a>) -> Option<Self> {
                if i.arg_type() != ArgType::$arg_type { return None; }
                let mut p: *const c_char = ptr::null();
                unsafe { i.get_basic_raw(&mut p as *mut *const c_char as *mut c_void) };
                if p.is_null() { return None; }
                let bytes = unsafe { CStr::from_ptr(p) }.to_bytes_with_nul();
                Some(unsafe { crate::strings::$t::from_slice_unchecked(bytes) })
            }
        }
    };
}

string_like_impl!(Path, ObjectPath, "o");
string_like_impl!(Signature, Signature, "g");
string_like_impl!(BusName, String, "s");
string_like_impl!(Interface, String, "s");
string_like_impl!(Member, String, "s");
string_like_impl!(ErrorName, String, "s");

/// A D-Bus `VARIANT`: wraps a value whose type isn't known until runtime.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Variant<T>(pub T);

impl<T: Arg> Arg for Variant<T> {
    const ARG_TYPE: ArgType = ArgType::Variant;
    fn signature() -> Signature<'static> { Signature::new("v").unwrap() }
}
impl<T: Arg + Append> Append for Variant<T> {
    fn append(self, ia: &mut IterAppend) {
        let sig = T::signature();
        let inner = self.0;
        ia.append_variant(&sig, move |sub| inner.append(sub));
    }
}
impl<'a, T: Get<'a>> Get<'a> for Variant<T> {
    fn get(i: &mut Iter<'a>) -> Option<Self> {
        let mut sub = i.recurse(ArgType::Variant)?;
        sub.get::<T>().map(Variant)
    }
}
impl<T: RefArg> RefArg for Variant<T> {
    fn arg_type(&self) -> ArgType { ArgType::Variant }
    fn signature(&self) -> Signature<'static> { Signature::new("v").unwrap() }
    fn append(&self, ia: &mut IterAppend) {
        let sig = self.0.signature();
        ia.append_variant(&sig, |sub| self.0.append(sub));
    }
    fn as_any(&self) -> &dyn std::any::Any where T: 'static { self.0.as_any() }
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any where T: 'static { self.0.as_any_mut() }
}

/// A D-Bus array, as a lazily-collected sequence of `T`.
pub struct Array<T, I> {
    inner: I,
    _elem: PhantomData<T>,
}

impl<T, I: Iterator<Item = T>> Iterator for Array<T, I> {
    type Item = T;
    fn next(&mut self) -> Option<T> { self.inner.next() }
}

impl<T: Arg, I> Arg for Array<T, I> {
    const ARG_TYPE: ArgType = ArgType::Array;
    fn signature() -> Signature<'static> {
        Signature::new(format!("a{}", T::signature().as_cstr().to_string_lossy())).unwrap()
    }
}

impl<'a, T: Arg + Get<'a>> Get<'a> for Array<T, std::vec::IntoIter<T>> {
    fn get(i: &mut Iter<'a>) -> Option<Self> {
        let mut sub = i.recurse(ArgType::Array)?;
        let mut v = Vec::new();
        while sub.arg_type() != ArgType::Invalid {
            v.push(sub.get::<T>()?);
            if !sub.next() { break; }
        }
        Some(Array { inner: v.into_iter(), _elem: PhantomData })
    }
}

/// A D-Bus `a{kv}` dictionary, as a lazily-collected sequence of `(K, V)`.
pub struct Dict<K, V, I> {
    inner: I,
    _kv: PhantomData<(K, V)>,
}

impl<K, V, I: Iterator<Item = (K, V)>> Iterator for Dict<K, V, I> {
    type Item = (K, V);
    fn next(&mut self) -> Option<(K, V)> { self.inner.next() }
}

impl<K: DictKey, V: Arg, I> Arg for Dict<K, V, I> {
    const ARG_TYPE: ArgType = ArgType::Array;
    fn signature() -> Signature<'static> {
        Signature::new(format!("a{{{}{}}}", K::signature().as_cstr().to_string_lossy(), V::signature().as_cstr().to_string_lossy())).unwrap()
    }
}

impl<'a, K: DictKey + Get<'a>, V: Arg + Get<'a>> Get<'a> for Dict<K, V, std::vec::IntoIter<(K, V)>> {
    fn get(i: &mut Iter<'a>) -> Option<Self> {
        let mut sub = i.recurse(ArgType::Array)?;
        let mut v = Vec::new();
        while sub.arg_type() != ArgType::Invalid {
            let mut entry = sub.recurse(ArgType::DictEntry)?;
            let k = entry.get::<K>()?;
            entry.next();
            let val = entry.get::<V>()?;
            v.push((k, val));
            if !sub.next() { break; }
        }
        Some(Dict { inner: v.into_iter(), _kv: PhantomData })
    }
}


/// Appends every element of `self` as a homogeneous D-Bus array.
impl<T: Arg + Append> Append for Vec<T> {
    fn append(self, ia: &mut IterAppend) {
        let elem_sig = T::signature().as_cstr().to_string_lossy().into_owned();
        ia.append_array(&elem_sig, |sub| {
            for item in self {
                item.append(sub);
            }
        });
    }
}

impl<T: Arg> Arg for Vec<T> {
    const ARG_TYPE: ArgType = ArgType::Array;
    fn signature() -> Signature<'static> {
        Signature::new(format!("a{}", T::signature().as_cstr().to_string_lossy())).unwrap()
    }
}

impl<'a, T: Arg + Get<'a>> Get<'a> for Vec<T> {
    fn get(i: &mut Iter<'a>) -> Option<Self> {
        i.get::<Array<T, std::vec::IntoIter<T>>>().map(|a| a.collect())
    }
}

/// Multiple arguments that can be appended together, in order.
pub trait AppendAll: Sized {
    /// Appends every element of `self` to `ia`, in order.
    fn append(&self, ia: &mut IterAppend);
}

/// Multiple arguments that can be read together, in order.
pub trait ReadAll: Sized {
    /// Reads every element of `Self` from `i`, in order.
    fn read(i: &mut Iter) -> Result<Self, TypeMismatchError>;
}

impl AppendAll for () {
    fn append(&self, _: &mut IterAppend) {}
}
impl ReadAll for () {
    fn read(_: &mut Iter) -> Result<(), TypeMismatchError> { Ok(()) }
}

macro_rules! tuple_impl {
    ($($n: tt : $t: ident),+) => {
        impl<$($t: Append + Clone),+> AppendAll for ($($t,)+) {
            fn append(&self, ia: &mut IterAppend) {
                $( ia.append(self.$n.clone()); )+
            }
        }
        impl<'a, $($t: Arg + Get<'a>),+> ReadAll for ($($t,)+) {
            fn read(i: &mut Iter<'a>) -> Result<Self, TypeMismatchError> {
                Ok(( $( i.read::<$t>()?, )+ ))
            }
        }
    };
}

tuple_impl!(0: A);
tuple_impl!(0: A, 1: B);
tuple_impl!(0: A, 1: B, 2: C);
tuple_impl!(0: A, 1: B, 2: C, 3: D);
tuple_impl!(0: A, 1: B, 2: C, 3: D, 4: E);

#[cfg(test)]
mod test {
    use super::*;
    use crate::Message;

    #[test]
    fn roundtrip_basic_types() {
        let m = Message::new_method_call("a.b", "/p", "a.b.I", "M").unwrap()
            .append3(7i32, true, "hello".to_string());
        let (a, b, c): (i32, bool, String) = m.read3().unwrap();
        assert_eq!((a, b, c.as_str()), (7, true, "hello"));
    }

    #[test]
    fn read_wrong_type_is_mismatch() {
        let m = Message::new_method_call("a.b", "/p", "a.b.I", "M").unwrap().append1(7i32);
        let err = m.read1::<&str>().unwrap_err();
        assert_eq!(err.expected_arg_type(), ArgType::String);
        assert_eq!(err.found_arg_type(), ArgType::Int32);
    }

    #[test]
    fn variant_roundtrip() {
        let mut m = Message::new_method_call("a.b", "/p", "a.b.I", "M").unwrap();
        {
            let mut ia = IterAppend::new(&mut m);
            ia.append(Variant(42i32));
        }
        let v: Variant<i32> = m.get1().unwrap();
        assert_eq!(v.0, 42);
    }

    #[test]
    fn array_of_str_roundtrip() {
        let mut m = Message::new_method_call("a.b", "/p", "a.b.I", "M").unwrap();
        {
            let mut ia = IterAppend::new(&mut m);
            ia.append(vec!["a".to_string(), "b".to_string(), "c".to_string()]);
        }
        let got: Array<&str, _> = m.get1().unwrap();
        assert_eq!(got.collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }
}
