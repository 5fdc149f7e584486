//! Connector registration and introspection.

use std::cmp::Ordering;

use tracing::info;

use crate::error::{Category, Error, Result};
use crate::ids::{Hid, IdKind};
use crate::library::Library;
use crate::vol::{
    dispatch, CapFlags, ConnectorLevel, ConnectorRef, IdObject, ObjectToken, OptionalArgs,
    Subclass, VolObject,
};

const OBJECTS: &[IdKind] = &[
    IdKind::File,
    IdKind::Group,
    IdKind::Dataset,
    IdKind::Datatype,
    IdKind::Attr,
];

impl Library {
    /// Register `conn` and return its identifier. Registering a name that
    /// is already present hands back the existing identifier with one more
    /// reference; a different connector claiming a taken value is refused.
    pub fn register_connector(&self, conn: ConnectorRef) -> Result<Hid> {
        self.api(|_| {
            if let Some((hid, _)) = self.connectors().find_name(conn.name()) {
                self.ids().inc_ref(hid)?;
                return Ok(hid);
            }
            if let Some((_, other)) = self.connectors().find_value(conn.value()) {
                return Err(Error::conflict(
                    Category::Connector,
                    format!(
                        "connector value {} already belongs to '{}'",
                        conn.value(),
                        other.name()
                    ),
                ));
            }
            let hid = self
                .ids()
                .register(IdKind::Connector, IdObject::new(conn.clone(), VolObject::new(())));
            self.connectors().add(conn, hid);
            Ok(hid)
        })
    }

    /// Identifier of the registered connector called `name`, with one more
    /// reference the caller closes.
    pub fn connector_by_name(&self, name: &str) -> Result<Hid> {
        self.api(|_| {
            let (hid, _) = self.connectors().find_name(name).ok_or_else(|| {
                Error::not_found(Category::Connector, format!("no connector named '{name}'"))
            })?;
            self.ids().inc_ref(hid)?;
            Ok(hid)
        })
    }

    pub fn connector_by_value(&self, value: u32) -> Result<Hid> {
        self.api(|_| {
            let (hid, _) = self.connectors().find_value(value).ok_or_else(|| {
                Error::not_found(Category::Connector, format!("no connector with value {value}"))
            })?;
            self.ids().inc_ref(hid)?;
            Ok(hid)
        })
    }

    pub fn is_connector_registered(&self, name: &str) -> bool {
        self.connectors().find_name(name).is_some()
    }

    /// The connector behind a connector identifier.
    pub fn connector(&self, hid: Hid) -> Result<ConnectorRef> {
        self.api(|_| Ok(self.object(hid, &[IdKind::Connector])?.connector))
    }

    /// The connector serving `obj`, or the innermost one below any
    /// pass-throughs.
    pub fn connector_of(&self, obj: Hid, level: ConnectorLevel) -> Result<ConnectorRef> {
        self.api(|cx| {
            let obj = self.object(obj, OBJECTS)?;
            let conn = dispatch::get_conn_cls(cx, &obj, level)?;
            info!(name = conn.name(), ?level, "connector queried");
            Ok(conn)
        })
    }

    pub fn cap_flags(&self, conn: Hid) -> Result<CapFlags> {
        self.api(|_| {
            let conn = self.object(conn, &[IdKind::Connector])?.connector;
            dispatch::get_cap_flags(&conn)
        })
    }

    /// Whether the connector serving `obj` understands `opcode` in
    /// `subclass`.
    pub fn opt_query(&self, obj: Hid, subclass: Subclass, opcode: u32) -> Result<bool> {
        self.api(|cx| {
            let obj = self.object(obj, OBJECTS)?;
            dispatch::opt_query(cx, &obj, subclass, opcode)
        })
    }

    pub fn token_cmp(&self, obj: Hid, a: &ObjectToken, b: &ObjectToken) -> Result<Ordering> {
        self.api(|cx| dispatch::token_cmp(cx, &self.object(obj, OBJECTS)?, a, b))
    }

    pub fn token_to_string(&self, obj: Hid, token: &ObjectToken) -> Result<String> {
        self.api(|cx| dispatch::token_to_string(cx, &self.object(obj, OBJECTS)?, token))
    }

    pub fn token_from_string(&self, obj: Hid, s: &str) -> Result<ObjectToken> {
        self.api(|cx| dispatch::token_from_string(cx, &self.object(obj, OBJECTS)?, s))
    }

    /// Pass an optional operation to whichever connector serves `obj`.
    pub fn optional(&self, obj: Hid, args: &mut OptionalArgs) -> Result<()> {
        self.api(|cx| {
            let obj = self.object(obj, OBJECTS)?;
            dispatch::optional(cx, &obj, args)
        })
    }
}
