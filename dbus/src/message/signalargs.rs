use crate::arg;
use crate::{Message, MessageType};
use crate::message::MatchRule;
use crate::strings::{BusName, Path, Interface, Member};

/// Helper methods for structs representing a Signal
///
/// A type implementing `SignalArgs` (together with `arg::AppendAll` and
/// `arg::ReadAll`) knows its own D-Bus interface and member name, and can
/// turn itself into an outgoing signal message or recover itself from an
/// incoming one.

pub trait SignalArgs {
    /// D-Bus name of signal
    const NAME: &'static str;

    /// D-Bus name of interface this signal belongs to
    const INTERFACE: &'static str;

    /// Returns a message that emits the signal.
    fn to_emit_message(&self, path: &Path) -> Message where Self: arg::AppendAll {
        let mut m = Message::signal(path, &Interface::from(Self::INTERFACE), &Member::from(Self::NAME));
        arg::AppendAll::append(self, &mut arg::IterAppend::new(&mut m));
        m
    } 

    /// If the message is a signal of the correct type, return its arguments, otherwise return None.
    ///
    /// This does not check sender and path of the message, which is likely relevant to you as well.
    fn from_message(m: &Message) -> Option<Self> where Self: Sized + arg::ReadAll {
        if m.msg_type() != MessageType::Signal { None }
        else if m.interface().as_ref().map(|x| &**x) != Some(Self::INTERFACE) { None }
        else if m.member().as_ref().map(|x| &**x) != Some(Self::NAME) { None }
        else {
            arg::ReadAll::read(&mut m.iter_init()).ok()
        }
    }

    /// Returns a match rule matching this signal.
    ///
    /// If sender and/or path is None, matches all senders and/or paths.
    fn match_rule<'a>(sender: Option<&'a BusName>, path: Option<&'a Path>) -> MatchRule<'a> {
        let mut m: MatchRule = Default::default();
        m.sender = sender.cloned();
        m.path = path.cloned();
        m.msg_type = Some(MessageType::Signal);
        m.interface = Some(Self::INTERFACE.into());
        m.member = Some(Self::NAME.into());
        m
    }


    /// Returns a string that can be sent to `Connection::add_match`.
    ///
    /// If sender and/or path is None, matches all senders and/or paths.
    fn match_str(sender: Option<&BusName>, path: Option<&Path>) -> String {
        Self::match_rule(sender, path).match_str()
    }
}

#[cfg(test)]
mod test {
    use super::SignalArgs;
    use crate::{arg, Message, MessageType};
    use crate::strings::Path;

    struct FooBarSignal {
        object: String,
        interfaces: Vec<String>,
    }

    impl arg::AppendAll for FooBarSignal {
        fn append(&self, ia: &mut arg::IterAppend) {
            ia.append(self.object.clone());
            ia.append(self.interfaces.clone());
        }
    }

    impl arg::ReadAll for FooBarSignal {
        fn read(i: &mut arg::Iter) -> Result<Self, arg::TypeMismatchError> {
            Ok(FooBarSignal {
                object: i.read::<String>()?,
                interfaces: i.read::<Vec<String>>()?,
            })
        }
    }

    impl SignalArgs for FooBarSignal {
        const NAME: &'static str = "InterfacesRemoved";
        const INTERFACE: &'static str = "org.freedesktop.DBus.ObjectManager";
    }

    #[test]
    fn emit_and_read_roundtrip() {
        let sig = FooBarSignal { object: "/hello".into(), interfaces: vec!["ABC.DEF".into(), "GHI.JKL".into()] };
        let msg = sig.to_emit_message(&Path::from("/hello"));
        assert_eq!(msg.msg_type(), MessageType::Signal);

        let sig2 = FooBarSignal::from_message(&msg).unwrap();
        assert_eq!(sig2.object, sig.object);
        assert_eq!(sig2.interfaces, sig.interfaces);
    }

    #[test]
    fn non_matching_message_is_rejected() {
        let msg = Message::new_method_call("a.b", "/p", "a.b.I", "M").unwrap();
        assert!(FooBarSignal::from_message(&msg).is_none());
    }

    #[test]
    fn match_str_contains_interface_and_member() {
        let s = FooBarSignal::match_str(None, None);
        assert!(s.contains("interface='org.freedesktop.DBus.ObjectManager'"));
        assert!(s.contains("member='InterfacesRemoved'"));
    }
}
