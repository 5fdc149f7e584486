//! Object headers.
//!
//! Every group, dataset and committed datatype has a fixed-size header that
//! never moves, so its address identifies the object:
//!
//! ```text
//! "OHDR" version(1) kind(1) flags(1) reserved(1)
//! body address(offset size) body length(4) body allocation(4)
//! hard link count(4) lookup3 checksum(4)
//! ```
//!
//! The header points at a body holding the object's messages. The body is
//! reallocated when it outgrows its space:
//!
//! ```text
//! "OBDY" { type(1) reserved(1) length(4) payload }* lookup3 checksum(4)
//! ```

use std::collections::BTreeSet;
use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use hdfcore_format::{address, datatype, Datatype, UNDEFINED_ADDR};
use hdfcore_io::MemType;
use tracing::{debug, trace};

use crate::dataspace::Dataspace;
use crate::error::{Category, Error, ErrorKind, Result};
use crate::file::alloc::AllocKind;
use crate::file::{seal, SharedState};

const HEADER_MAGIC: &[u8; 4] = b"OHDR";
const BODY_MAGIC: &[u8; 4] = b"OBDY";
const HEADER_VERSION: u8 = 1;
/// Oldest header version a SWMR writer may keep open.
pub(crate) const SWMR_MIN_HEADER_VERSION: u8 = 1;

// Every header is written and loaded at HEADER_VERSION, so any object open
// in a file satisfies the SWMR minimum as long as this holds.
const _: () = assert!(HEADER_VERSION >= SWMR_MIN_HEADER_VERSION);

const MSG_LINK: u8 = 1;
const MSG_DATATYPE: u8 = 2;
const MSG_DATASPACE: u8 = 3;
const MSG_LAYOUT: u8 = 4;
const MSG_ATTRIBUTE: u8 = 5;

/// Bodies are allocated in multiples of this.
const BODY_GRANULE: usize = 64;

pub(crate) fn header_len(offset_size: u8) -> usize {
    24 + offset_size as usize
}

fn malformed(what: impl Into<String>) -> Error {
    Error::new(
        Category::Object,
        ErrorKind::DecodeMalformed,
        format!("object header: {}", what.into()),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HeaderKind {
    Group,
    Dataset,
    Datatype,
}

impl HeaderKind {
    fn code(self) -> u8 {
        match self {
            HeaderKind::Group => 0,
            HeaderKind::Dataset => 1,
            HeaderKind::Datatype => 2,
        }
    }

    fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(HeaderKind::Group),
            1 => Ok(HeaderKind::Dataset),
            2 => Ok(HeaderKind::Datatype),
            other => Err(malformed(format!("unknown object kind {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LinkValue {
    Hard(u64),
    Soft(String),
    External { file: String, path: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Link {
    pub name: String,
    pub value: LinkValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Attribute {
    pub name: String,
    pub dtype: Datatype,
    pub space: Dataspace,
    pub data: Vec<u8>,
}

/// Contiguous raw storage of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Layout {
    pub addr: u64,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Message {
    Link(Link),
    Datatype(Datatype),
    Dataspace(Dataspace),
    Layout(Layout),
    Attribute(Attribute),
}

#[derive(Debug, Clone)]
pub(crate) struct ObjectHeader {
    pub kind: HeaderKind,
    pub nlinks: u32,
    body_addr: u64,
    body_len: u32,
    body_alloc: u32,
    pub messages: Vec<Message>,
}

impl ObjectHeader {
    fn new(kind: HeaderKind, messages: Vec<Message>) -> Self {
        Self {
            kind,
            nlinks: 1,
            body_addr: UNDEFINED_ADDR,
            body_len: 0,
            body_alloc: 0,
            messages,
        }
    }

    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.messages.iter().filter_map(|m| match m {
            Message::Link(l) => Some(l),
            _ => None,
        })
    }

    pub fn find_link(&self, name: &str) -> Option<&Link> {
        self.links().find(|l| l.name == name)
    }

    pub fn add_link(&mut self, link: Link) -> Result<()> {
        if self.find_link(&link.name).is_some() {
            return Err(Error::new(
                Category::Link,
                ErrorKind::AlreadyExists,
                format!("name '{}' already exists", link.name),
            ));
        }
        self.messages.push(Message::Link(link));
        Ok(())
    }

    pub fn remove_link(&mut self, name: &str) -> Option<Link> {
        let idx = self
            .messages
            .iter()
            .position(|m| matches!(m, Message::Link(l) if l.name == name))?;
        match self.messages.remove(idx) {
            Message::Link(l) => Some(l),
            _ => None,
        }
    }

    pub fn datatype(&self) -> Option<&Datatype> {
        self.messages.iter().find_map(|m| match m {
            Message::Datatype(t) => Some(t),
            _ => None,
        })
    }

    pub fn dataspace(&self) -> Option<&Dataspace> {
        self.messages.iter().find_map(|m| match m {
            Message::Dataspace(s) => Some(s),
            _ => None,
        })
    }

    pub fn layout(&self) -> Option<Layout> {
        self.messages.iter().find_map(|m| match m {
            Message::Layout(l) => Some(*l),
            _ => None,
        })
    }

    /// Replace the first message of the same type as `msg`, or add it.
    pub fn set(&mut self, msg: Message) {
        let same = |m: &Message| std::mem::discriminant(m) == std::mem::discriminant(&msg);
        match self.messages.iter().position(same) {
            Some(i) => self.messages[i] = msg,
            None => self.messages.push(msg),
        }
    }

    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.messages.iter().filter_map(|m| match m {
            Message::Attribute(a) => Some(a),
            _ => None,
        })
    }

    pub fn find_attr(&self, name: &str) -> Option<&Attribute> {
        self.attributes().find(|a| a.name == name)
    }

    pub fn find_attr_mut(&mut self, name: &str) -> Option<&mut Attribute> {
        self.messages.iter_mut().find_map(|m| match m {
            Message::Attribute(a) if a.name == name => Some(a),
            _ => None,
        })
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<Attribute> {
        let idx = self
            .messages
            .iter()
            .position(|m| matches!(m, Message::Attribute(a) if a.name == name))?;
        match self.messages.remove(idx) {
            Message::Attribute(a) => Some(a),
            _ => None,
        }
    }
}

fn put_str(out: &mut Vec<u8>, s: &str) -> Result<()> {
    let len = u16::try_from(s.len())
        .map_err(|_| Error::args(Category::Object, format!("name too long: {} bytes", s.len())))?;
    // Writes into a Vec cannot fail.
    let _ = out.write_u16::<LittleEndian>(len);
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

fn put_blob(out: &mut Vec<u8>, b: &[u8]) -> Result<()> {
    let len = u32::try_from(b.len())
        .map_err(|_| Error::new(Category::Object, ErrorKind::Overflow, "message too large"))?;
    let _ = out.write_u32::<LittleEndian>(len);
    out.extend_from_slice(b);
    Ok(())
}

fn encode_message(s: &SharedState, msg: &Message, out: &mut Vec<u8>) -> Result<()> {
    let os = s.offset_size() as usize;
    let mut payload = Vec::new();
    let ty = match msg {
        Message::Link(link) => {
            put_str(&mut payload, &link.name)?;
            match &link.value {
                LinkValue::Hard(addr) => {
                    payload.push(0);
                    address::encode(*addr, os, &mut payload)?;
                }
                LinkValue::Soft(path) => {
                    payload.push(1);
                    put_str(&mut payload, path)?;
                }
                LinkValue::External { file, path } => {
                    payload.push(2);
                    put_str(&mut payload, file)?;
                    put_str(&mut payload, path)?;
                }
            }
            MSG_LINK
        }
        Message::Datatype(dt) => {
            payload = dt.encode_with(&s.encode_options())?;
            MSG_DATATYPE
        }
        Message::Dataspace(space) => {
            payload = space.encode();
            MSG_DATASPACE
        }
        Message::Layout(layout) => {
            address::encode(layout.addr, os, &mut payload)?;
            let _ = payload.write_u64::<LittleEndian>(layout.size);
            MSG_LAYOUT
        }
        Message::Attribute(attr) => {
            put_str(&mut payload, &attr.name)?;
            put_blob(&mut payload, &attr.dtype.encode_with(&s.encode_options())?)?;
            put_blob(&mut payload, &attr.space.encode())?;
            put_blob(&mut payload, &attr.data)?;
            MSG_ATTRIBUTE
        }
    };
    out.push(ty);
    out.push(0);
    put_blob(out, &payload)
}

struct Reader<'a> {
    cur: Cursor<&'a [u8]>,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            cur: Cursor::new(data),
        }
    }

    fn at_end(&self) -> bool {
        self.cur.position() as usize >= self.cur.get_ref().len()
    }

    fn u8(&mut self) -> Result<u8> {
        self.cur.read_u8().map_err(|_| malformed("truncated"))
    }

    fn u16(&mut self) -> Result<u16> {
        self.cur
            .read_u16::<LittleEndian>()
            .map_err(|_| malformed("truncated"))
    }

    fn u32(&mut self) -> Result<u32> {
        self.cur
            .read_u32::<LittleEndian>()
            .map_err(|_| malformed("truncated"))
    }

    fn u64(&mut self) -> Result<u64> {
        self.cur
            .read_u64::<LittleEndian>()
            .map_err(|_| malformed("truncated"))
    }

    fn bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.cur
            .read_exact(&mut buf)
            .map_err(|_| malformed("truncated"))?;
        Ok(buf)
    }

    fn string(&mut self) -> Result<String> {
        let n = self.u16()? as usize;
        String::from_utf8(self.bytes(n)?).map_err(|_| malformed("name is not UTF-8"))
    }

    fn blob(&mut self) -> Result<Vec<u8>> {
        let n = self.u32()? as usize;
        self.bytes(n)
    }

    fn addr(&mut self, width: usize) -> Result<u64> {
        let raw = self.bytes(width)?;
        Ok(address::decode_at(&raw, 0, width)?.0)
    }
}

fn decode_datatype(s: &SharedState, buf: &[u8]) -> Result<Datatype> {
    let (dt, _) = datatype::decode(buf, buf.len(), &s.decode_options())?;
    Ok(dt)
}

fn decode_message(s: &SharedState, ty: u8, payload: &[u8]) -> Result<Option<Message>> {
    let os = s.offset_size() as usize;
    let mut r = Reader::new(payload);
    let msg = match ty {
        MSG_LINK => {
            let name = r.string()?;
            let value = match r.u8()? {
                0 => LinkValue::Hard(r.addr(os)?),
                1 => LinkValue::Soft(r.string()?),
                2 => LinkValue::External {
                    file: r.string()?,
                    path: r.string()?,
                },
                other => return Err(malformed(format!("unknown link type {other}"))),
            };
            Message::Link(Link { name, value })
        }
        MSG_DATATYPE => Message::Datatype(decode_datatype(s, payload)?),
        MSG_DATASPACE => Message::Dataspace(Dataspace::decode(payload)?),
        MSG_LAYOUT => Message::Layout(Layout {
            addr: r.addr(os)?,
            size: r.u64()?,
        }),
        MSG_ATTRIBUTE => {
            let name = r.string()?;
            let dtype = decode_datatype(s, &r.blob()?)?;
            let space = Dataspace::decode(&r.blob()?)?;
            let data = r.blob()?;
            Message::Attribute(Attribute {
                name,
                dtype,
                space,
                data,
            })
        }
        other => {
            trace!(ty = other, "skipping unknown header message");
            return Ok(None);
        }
    };
    Ok(Some(msg))
}

fn encode_body(s: &SharedState, hdr: &ObjectHeader) -> Result<Vec<u8>> {
    let mut body = BODY_MAGIC.to_vec();
    for msg in &hdr.messages {
        encode_message(s, msg, &mut body)?;
    }
    seal(&mut body);
    Ok(body)
}

fn encode_header(s: &SharedState, hdr: &ObjectHeader) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(header_len(s.offset_size()));
    out.extend_from_slice(HEADER_MAGIC);
    out.push(HEADER_VERSION);
    out.push(hdr.kind.code());
    out.push(0);
    out.push(0);
    address::encode(hdr.body_addr, s.offset_size() as usize, &mut out)?;
    let _ = out.write_u32::<LittleEndian>(hdr.body_len);
    let _ = out.write_u32::<LittleEndian>(hdr.body_alloc);
    let _ = out.write_u32::<LittleEndian>(hdr.nlinks);
    seal(&mut out);
    Ok(out)
}

/// Read the header at `addr` and its body.
pub(crate) fn load(s: &mut SharedState, addr: u64) -> Result<ObjectHeader> {
    if addr == UNDEFINED_ADDR {
        return Err(malformed("undefined address"));
    }
    let os = s.offset_size() as usize;
    let raw = s.meta_read(MemType::ObjectHeader, addr, header_len(s.offset_size()))?;
    let mut r = Reader::new(&raw);
    if r.bytes(4)? != HEADER_MAGIC {
        return Err(malformed(format!("no header signature at {addr}")));
    }
    let version = r.u8()?;
    if version != HEADER_VERSION {
        return Err(Error::new(
            Category::Object,
            ErrorKind::NotSupported,
            format!("object header version {version}"),
        ));
    }
    let kind = HeaderKind::from_code(r.u8()?)?;
    r.u16()?;
    let body_addr = r.addr(os)?;
    let body_len = r.u32()?;
    let body_alloc = r.u32()?;
    let nlinks = r.u32()?;
    if body_len < 8 || body_len > body_alloc {
        return Err(malformed(format!("body length {body_len} of {body_alloc}")));
    }

    let body = s.meta_read(MemType::ObjectHeader, body_addr, body_len as usize)?;
    if &body[..4] != BODY_MAGIC {
        return Err(malformed(format!("no body signature at {body_addr}")));
    }
    let mut r = Reader::new(&body[4..body.len() - 4]);
    let mut messages = Vec::new();
    while !r.at_end() {
        let ty = r.u8()?;
        r.u8()?;
        let payload = r.blob()?;
        if let Some(msg) = decode_message(s, ty, &payload)? {
            messages.push(msg);
        }
    }
    Ok(ObjectHeader {
        kind,
        nlinks,
        body_addr,
        body_len,
        body_alloc,
        messages,
    })
}

/// Write `hdr` back to `addr`, moving its body if it grew.
pub(crate) fn store(s: &mut SharedState, addr: u64, hdr: &mut ObjectHeader) -> Result<()> {
    let body = encode_body(s, hdr)?;
    let len = u32::try_from(body.len())
        .map_err(|_| Error::new(Category::Object, ErrorKind::Overflow, "object header too large"))?;
    if len > hdr.body_alloc {
        if hdr.body_alloc > 0 {
            s.free(hdr.body_addr, hdr.body_alloc as u64)?;
        }
        let alloc = (body.len() + BODY_GRANULE - 1) / BODY_GRANULE * BODY_GRANULE;
        hdr.body_addr = s.allocate(AllocKind::Meta, alloc as u64)?;
        hdr.body_alloc = alloc as u32;
        trace!(addr, body = hdr.body_addr, alloc, "object body allocated");
    }
    hdr.body_len = len;
    s.meta_write(MemType::ObjectHeader, hdr.body_addr, body)?;
    let image = encode_header(s, hdr)?;
    s.meta_write(MemType::ObjectHeader, addr, image)
}

/// Allocate and write a new object with one hard link.
pub(crate) fn create(s: &mut SharedState, kind: HeaderKind, messages: Vec<Message>) -> Result<u64> {
    let addr = s.allocate(AllocKind::Meta, header_len(s.offset_size()) as u64)?;
    let mut hdr = ObjectHeader::new(kind, messages);
    store(s, addr, &mut hdr)?;
    debug!(addr, ?kind, "object created");
    Ok(addr)
}

pub(crate) fn create_group(s: &mut SharedState) -> Result<u64> {
    create(s, HeaderKind::Group, Vec::new())
}

/// Add one hard link to the object at `addr`.
pub(crate) fn link(s: &mut SharedState, addr: u64) -> Result<()> {
    let mut hdr = load(s, addr)?;
    hdr.nlinks += 1;
    store(s, addr, &mut hdr)
}

/// Drop one hard link to the object at `addr`. An object with no links
/// left is freed, or marked for freeing when its last handle closes if it
/// is open.
pub(crate) fn unlink(s: &mut SharedState, addr: u64) -> Result<()> {
    unlink_inner(s, addr, &mut BTreeSet::new())
}

fn unlink_inner(s: &mut SharedState, addr: u64, releasing: &mut BTreeSet<u64>) -> Result<()> {
    if releasing.contains(&addr) {
        return Ok(());
    }
    let mut hdr = load(s, addr)?;
    hdr.nlinks = hdr.nlinks.saturating_sub(1);
    if hdr.nlinks > 0 {
        return store(s, addr, &mut hdr);
    }
    if s.is_open(addr) {
        store(s, addr, &mut hdr)?;
        s.mark_deleted(addr);
        debug!(addr, "object unlinked while open; freeing on close");
        return Ok(());
    }
    release(s, addr, hdr, releasing)
}

fn release(
    s: &mut SharedState,
    addr: u64,
    hdr: ObjectHeader,
    releasing: &mut BTreeSet<u64>,
) -> Result<()> {
    releasing.insert(addr);
    for link in hdr.links() {
        if let LinkValue::Hard(child) = link.value {
            unlink_inner(s, child, releasing)?;
        }
    }
    if let Some(layout) = hdr.layout() {
        if layout.addr != UNDEFINED_ADDR && layout.size > 0 {
            s.free(layout.addr, layout.size)?;
        }
    }
    if hdr.body_alloc > 0 {
        s.free(hdr.body_addr, hdr.body_alloc as u64)?;
    }
    s.free(addr, header_len(s.offset_size()) as u64)?;
    debug!(addr, "object freed");
    Ok(())
}

/// Free an object whose links all went away while it was open.
pub(crate) fn free_deleted(s: &mut SharedState, addr: u64) -> Result<()> {
    let hdr = load(s, addr)?;
    if hdr.nlinks > 0 {
        return Ok(());
    }
    release(s, addr, hdr, &mut BTreeSet::new())
}

/// Addresses of the metadata images belonging to the object at `addr`.
pub(crate) fn image_addrs(s: &mut SharedState, addr: u64) -> Vec<u64> {
    match load(s, addr) {
        Ok(hdr) => vec![addr, hdr.body_addr],
        Err(_) => vec![addr],
    }
}
