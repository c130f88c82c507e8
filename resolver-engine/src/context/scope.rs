use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::json_ext::Value;

struct Frame {
    values: HashMap<String, Value>,
    parent: Option<Arc<Frame>>,
}

/// Scoped custom state inherited from ancestor resolvers.
///
/// A scope is an immutable chain of frames. Descending to children forks it:
/// the values written by a resolver become a new frame on top of the scope
/// it inherited, visible to its descendants only. Siblings each hold their
/// own fork and never observe each other's writes.
#[derive(Clone, Default)]
pub struct Scope {
    head: Option<Arc<Frame>>,
}

impl Scope {
    /// Look up a value, the closest frame winning.
    pub fn get(&self, key: &str) -> Option<&Value> {
        let mut frame = self.head.as_deref();
        while let Some(current) = frame {
            if let Some(value) = current.values.get(key) {
                return Some(value);
            }
            frame = current.parent.as_deref();
        }
        None
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Number of frames in the chain.
    pub fn depth(&self) -> usize {
        std::iter::successors(self.head.as_deref(), |frame| frame.parent.as_deref()).count()
    }

    pub(crate) fn fork(&self, values: HashMap<String, Value>) -> Scope {
        if values.is_empty() {
            return self.clone();
        }
        Scope {
            head: Some(Arc::new(Frame {
                values,
                parent: self.head.clone(),
            })),
        }
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        let mut frame = self.head.as_deref();
        while let Some(current) = frame {
            map.entries(current.values.iter());
            frame = current.parent.as_deref();
        }
        map.finish()
    }
}
