use keep_types::ResourcePath;

/// Whether a traversal should go on after a visit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visit {
    Continue,
    Stop,
}

/// Handle on the entry being visited.
///
/// Edits requested through [`EntryMut::set_value`] or [`EntryMut::delete`]
/// are applied by the bucket once the callback returns.
#[derive(Debug)]
pub struct EntryMut<'a, V> {
    path: &'a ResourcePath,
    value: &'a V,
    update: Option<Option<V>>,
}

impl<'a, V> EntryMut<'a, V> {
    pub(crate) fn new(path: &'a ResourcePath, value: &'a V) -> Self {
        Self {
            path,
            value,
            update: None,
        }
    }

    pub fn path(&self) -> &ResourcePath {
        self.path
    }

    /// The value as it was before this visit.
    pub fn value(&self) -> &V {
        self.value
    }

    /// Replace the entry's value. An empty value deletes the entry.
    pub fn set_value(&mut self, value: V) {
        self.update = Some(Some(value));
    }

    /// Remove the entry.
    pub fn delete(&mut self) {
        self.update = Some(None);
    }

    pub(crate) fn into_update(self) -> Option<Option<V>> {
        self.update
    }
}

/// Callback driven by `Bucket::accept` and `BucketTree::accept`.
pub trait BucketVisitor<V> {
    fn visit(&mut self, entry: &mut EntryMut<'_, V>) -> Visit;
}

impl<V, F> BucketVisitor<V> for F
where
    F: FnMut(&mut EntryMut<'_, V>) -> Visit,
{
    fn visit(&mut self, entry: &mut EntryMut<'_, V>) -> Visit {
        self(entry)
    }
}
