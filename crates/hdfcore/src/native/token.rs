//! Object tokens: the object header address, little-endian, in the first
//! eight bytes.

use std::cmp::Ordering;

use super::NativeConnector;
use crate::error::{Category, Error, Result};
use crate::vol::{CallCtx, ObjectToken, TokenClass, VolObject};

pub(crate) fn token_for(addr: u64) -> ObjectToken {
    let mut t = [0u8; 16];
    t[..8].copy_from_slice(&addr.to_le_bytes());
    ObjectToken(t)
}

pub(crate) fn addr_of(token: &ObjectToken) -> u64 {
    let mut a = [0u8; 8];
    a.copy_from_slice(&token.0[..8]);
    u64::from_le_bytes(a)
}

impl TokenClass for NativeConnector {
    fn compare(
        &self,
        _cx: &mut CallCtx,
        _obj: &VolObject,
        a: &ObjectToken,
        b: &ObjectToken,
    ) -> Result<Ordering> {
        Ok(addr_of(a).cmp(&addr_of(b)))
    }

    fn to_string(&self, _cx: &mut CallCtx, _obj: &VolObject, token: &ObjectToken) -> Result<String> {
        Ok(token.0.iter().map(|b| format!("{b:02x}")).collect())
    }

    fn from_string(&self, _cx: &mut CallCtx, _obj: &VolObject, s: &str) -> Result<ObjectToken> {
        let bad = || Error::args(Category::Token, format!("'{s}' is not a token string"));
        if s.len() != 32 || !s.is_ascii() {
            return Err(bad());
        }
        let mut t = [0u8; 16];
        for (i, byte) in t.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[2 * i..2 * i + 2], 16).map_err(|_| bad())?;
        }
        Ok(ObjectToken(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LibraryConfig;
    use crate::library::Library;
    use crate::plist::TransferProps;

    fn cx() -> CallCtx {
        CallCtx::new(Library::with_config(LibraryConfig::default()), TransferProps::default())
    }

    #[test]
    fn string_form_parses_back() {
        let c = NativeConnector::new();
        let cx = &mut cx();
        let obj = VolObject::new(());
        let tok = token_for(0x1234);
        let s = c.to_string(cx, &obj, &tok).unwrap();
        assert_eq!(&s[..4], "3412");
        assert_eq!(c.from_string(cx, &obj, &s).unwrap(), tok);
        assert!(c.from_string(cx, &obj, "xyz").is_err());
        assert!(c.from_string(cx, &obj, &"g".repeat(32)).is_err());
    }

    #[test]
    fn tokens_order_by_address() {
        let c = NativeConnector::new();
        let obj = VolObject::new(());
        assert_eq!(
            c.compare(&mut cx(), &obj, &token_for(8), &token_for(300)).unwrap(),
            Ordering::Less
        );
        assert_eq!(addr_of(&token_for(77)), 77);
    }
}
