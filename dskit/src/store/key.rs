use std::cmp::Ordering;
use std::fmt::{Debug, Display, Formatter};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::errors::{DsError, DsResult, ErrorKind};

/// The final component of a [`Key`]: either unset (incomplete), a numeric id
/// or a string name.
///
/// Numeric ids sort before names, and an incomplete id sorts before both.
#[derive(Clone, PartialEq, Eq, Hash, Debug, serde::Serialize, serde::Deserialize)]
pub enum KeyId {
    Incomplete,
    Id(i64),
    Name(String),
}

impl KeyId {
    fn rank(&self) -> u8 {
        match self {
            KeyId::Incomplete => 0,
            KeyId::Id(_) => 1,
            KeyId::Name(_) => 2,
        }
    }
}

impl PartialOrd for KeyId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KeyId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (KeyId::Id(a), KeyId::Id(b)) => a.cmp(b),
            (KeyId::Name(a), KeyId::Name(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

/// Hierarchical identifier of a stored entity.
///
/// A key names its kind, its own id or name, an optional parent key and an
/// optional namespace. A key without an id or name is *incomplete*; the
/// store assigns a numeric id when an incomplete key is written.
///
/// Keys order path element by element from the root, so a parent sorts
/// immediately before its children. This is the default order of every
/// query result.
///
/// # Examples
///
/// ```rust,ignore
/// use dskit::store::Key;
///
/// let shop = Key::name_key("Shop", "main", None);
/// let widget = Key::incomplete("Widget", Some(&shop));
/// assert!(!widget.is_complete());
/// assert_eq!(widget.parent(), Some(&shop));
/// ```
#[derive(Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Key {
    kind: String,
    id: KeyId,
    parent: Option<Box<Key>>,
    namespace: Option<String>,
}

impl Key {
    /// Creates an incomplete key of `kind` under an optional parent.
    /// The parent's namespace is inherited.
    pub fn incomplete(kind: &str, parent: Option<&Key>) -> Self {
        Key::with_id(kind, KeyId::Incomplete, parent)
    }

    /// Creates a key with a numeric id.
    pub fn id_key(kind: &str, id: i64, parent: Option<&Key>) -> Self {
        Key::with_id(kind, KeyId::Id(id), parent)
    }

    /// Creates a key with a string name.
    pub fn name_key(kind: &str, name: &str, parent: Option<&Key>) -> Self {
        Key::with_id(kind, KeyId::Name(name.to_string()), parent)
    }

    fn with_id(kind: &str, id: KeyId, parent: Option<&Key>) -> Self {
        Key {
            kind: kind.to_string(),
            id,
            parent: parent.map(|p| Box::new(p.clone())),
            namespace: parent.and_then(|p| p.namespace.clone()),
        }
    }

    /// Returns a copy of this key, and of all its ancestors, in `namespace`.
    pub fn in_namespace(mut self, namespace: &str) -> Self {
        let namespace = if namespace.is_empty() {
            None
        } else {
            Some(namespace.to_string())
        };
        self.set_namespace(namespace);
        self
    }

    fn set_namespace(&mut self, namespace: Option<String>) {
        if let Some(parent) = self.parent.as_mut() {
            parent.set_namespace(namespace.clone());
        }
        self.namespace = namespace;
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn key_id(&self) -> &KeyId {
        &self.id
    }

    /// Numeric id, `None` for named or incomplete keys.
    pub fn id(&self) -> Option<i64> {
        match self.id {
            KeyId::Id(id) => Some(id),
            _ => None,
        }
    }

    /// String name, `None` for numeric or incomplete keys.
    pub fn name(&self) -> Option<&str> {
        match &self.id {
            KeyId::Name(name) => Some(name.as_str()),
            _ => None,
        }
    }

    pub fn parent(&self) -> Option<&Key> {
        self.parent.as_deref()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// True when this key and every ancestor carry an id or a name.
    pub fn is_complete(&self) -> bool {
        self.id != KeyId::Incomplete && self.parent().map_or(true, Key::is_complete)
    }

    /// True when only the final component is missing, i.e. the store can
    /// assign it on write.
    pub fn is_incomplete(&self) -> bool {
        self.id == KeyId::Incomplete && self.parent().map_or(true, Key::is_complete)
    }

    /// Completes an incomplete key with a store-assigned numeric id.
    pub(crate) fn completed(&self, id: i64) -> Key {
        let mut key = self.clone();
        key.id = KeyId::Id(id);
        key
    }

    /// True when `ancestor` equals this key or is one of its ancestors.
    pub fn has_ancestor(&self, ancestor: &Key) -> bool {
        let mut current = Some(self);
        while let Some(key) = current {
            if key == ancestor {
                return true;
            }
            current = key.parent();
        }
        false
    }

    /// The key path from the root ancestor down to this key.
    pub fn path(&self) -> Vec<&Key> {
        let mut path = Vec::new();
        let mut current = Some(self);
        while let Some(key) = current {
            path.push(key);
            current = key.parent();
        }
        path.reverse();
        path
    }

    /// Encodes the key into an opaque URL-safe string.
    pub fn encode(&self) -> String {
        let mut buf = Vec::new();
        write_str(&mut buf, self.namespace().unwrap_or(""));
        let path = self.path();
        buf.extend_from_slice(&(path.len() as u32).to_be_bytes());
        for element in path {
            write_str(&mut buf, &element.kind);
            match &element.id {
                KeyId::Incomplete => buf.push(0),
                KeyId::Id(id) => {
                    buf.push(1);
                    buf.extend_from_slice(&id.to_be_bytes());
                }
                KeyId::Name(name) => {
                    buf.push(2);
                    write_str(&mut buf, name);
                }
            }
        }
        URL_SAFE_NO_PAD.encode(buf)
    }

    /// Decodes a key produced by [`Key::encode`].
    pub fn decode(encoded: &str) -> DsResult<Key> {
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded.trim_end_matches('='))
            .map_err(|err| invalid_key(&format!("malformed key encoding: {}", err)))?;
        let mut reader = Reader { bytes: &bytes, pos: 0 };

        let namespace = reader.read_str()?;
        let len = reader.read_u32()?;
        if len == 0 {
            return Err(invalid_key("encoded key has an empty path"));
        }

        let mut key: Option<Key> = None;
        for _ in 0..len {
            let kind = reader.read_str()?;
            let id = match reader.read_u8()? {
                0 => KeyId::Incomplete,
                1 => KeyId::Id(reader.read_i64()?),
                2 => KeyId::Name(reader.read_str()?),
                tag => return Err(invalid_key(&format!("unknown key id tag {}", tag))),
            };
            key = Some(Key::with_id(&kind, id, key.as_ref()));
        }
        if !reader.is_done() {
            return Err(invalid_key("trailing bytes in encoded key"));
        }

        // len > 0 so the loop assigned a key
        let key = key.ok_or_else(|| invalid_key("encoded key has an empty path"))?;
        Ok(key.in_namespace(&namespace))
    }
}

fn invalid_key(message: &str) -> DsError {
    DsError::new(message, ErrorKind::InvalidKey)
}

fn write_str(buf: &mut Vec<u8>, value: &str) {
    buf.extend_from_slice(&(value.len() as u32).to_be_bytes());
    buf.extend_from_slice(value.as_bytes());
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn take(&mut self, n: usize) -> DsResult<&[u8]> {
        if self.pos + n > self.bytes.len() {
            return Err(invalid_key("truncated key encoding"));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u8(&mut self) -> DsResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_u32(&mut self) -> DsResult<u32> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4)?);
        Ok(u32::from_be_bytes(raw))
    }

    fn read_i64(&mut self) -> DsResult<i64> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(i64::from_be_bytes(raw))
    }

    fn read_str(&mut self) -> DsResult<String> {
        let len = self.read_u32()? as usize;
        let raw = self.take(len)?.to_vec();
        String::from_utf8(raw).map_err(|err| invalid_key(&err.to_string()))
    }

    fn is_done(&self) -> bool {
        self.pos == self.bytes.len()
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        let ordering = self.namespace.cmp(&other.namespace);
        if ordering != Ordering::Equal {
            return ordering;
        }

        let left = self.path();
        let right = other.path();
        for (a, b) in left.iter().zip(right.iter()) {
            let ordering = a.kind.cmp(&b.kind).then_with(|| a.id.cmp(&b.id));
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        left.len().cmp(&right.len())
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(parent) = self.parent() {
            write!(f, "{}/", parent)?;
        }
        match &self.id {
            KeyId::Incomplete => write!(f, "{}(?)", self.kind),
            KeyId::Id(id) => write!(f, "{}({})", self.kind, id),
            KeyId::Name(name) => write!(f, "{}({:?})", self.kind, name),
        }
    }
}

impl Debug for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.namespace() {
            Some(ns) => write!(f, "Key[{}:{}]", ns, self),
            None => write!(f, "Key[{}]", self),
        }
    }
}
