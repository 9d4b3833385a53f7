use lasso::{Spur, ThreadedRodeo};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

/// Global string interner for canvas node keys.
static INTERNER: LazyLock<ThreadedRodeo> = LazyLock::new(ThreadedRodeo::default);

/// Suffix appended to an element name to key its thickness slider.
pub const THICKNESS_SUFFIX: &str = "_Thickness";

/// The canvas-facing identity of a model entity.
///
/// Element names key the geometry container node, `<name>_Thickness` keys
/// the slider, and material names key the material node. Internally a
/// `Spur` index: 4 bytes and `Copy`. Ordering follows the key text.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeKey(Spur);

impl NodeKey {
    /// Intern a new string as a NodeKey, or return existing if already interned.
    pub fn intern(s: &str) -> Self {
        NodeKey(INTERNER.get_or_intern(s))
    }

    /// The key for `s` if it was ever interned. Never interns.
    pub fn lookup(s: &str) -> Option<Self> {
        INTERNER.get(s).map(NodeKey)
    }

    /// Resolve back to a string slice.
    pub fn as_str(&self) -> &str {
        INTERNER.resolve(&self.0)
    }

    /// Key of the geometry container node for an element.
    pub fn element(name: &str) -> Self {
        Self::intern(name)
    }

    /// Key of the thickness slider node for an element.
    pub fn slider(element_name: &str) -> Self {
        Self::intern(&format!("{element_name}{THICKNESS_SUFFIX}"))
    }

    /// Key of the material definition node.
    pub fn material(name: &str) -> Self {
        Self::intern(name)
    }

    /// If this key is a thickness slider key, the element name it refers to.
    pub fn slider_target(&self) -> Option<&str> {
        self.as_str().strip_suffix(THICKNESS_SUFFIX)
    }
}

/// The first name that equals another name's slider key.
///
/// Elements `A` and `A_Thickness` would both claim the node key
/// `A_Thickness`, so a list holding both returns `Some("A_Thickness")`.
pub fn slider_key_collision<'a>(names: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    let names: Vec<&str> = names.into_iter().collect();
    let set: HashSet<&str> = names.iter().copied().collect();
    names.into_iter().find(|name| {
        name.strip_suffix(THICKNESS_SUFFIX)
            .is_some_and(|base| set.contains(base))
    })
}

impl Ord for NodeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.0 == other.0 {
            return Ordering::Equal;
        }
        self.as_str().cmp(other.as_str())
    }
}

impl PartialOrd for NodeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.as_str())
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for NodeKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for NodeKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(NodeKey::intern(&s))
    }
}
