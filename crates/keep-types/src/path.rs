use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Workspace-relative, segment-based path of a resource.
///
/// The root is the zero-segment path. No segment is ever empty, `.` or
/// `..`, and segments never contain `/`. Ordering is lexical per segment,
/// so `/a/b` sorts before `/a/b/c`, which sorts before `/a/c`.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourcePath {
    segments: Vec<String>,
}

impl ResourcePath {
    /// The zero-segment root path.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a slash-separated path. A single leading and a single trailing
    /// slash are accepted; `""` and `"/"` are the root.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let trimmed = s.strip_prefix('/').unwrap_or(s);
        let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        let mut segments = Vec::new();
        for segment in trimmed.split('/') {
            if segment.is_empty() {
                return Err(TypeError::EmptySegment(s.to_string()));
            }
            validate_segment(segment)?;
            segments.push(segment.to_string());
        }
        Ok(Self { segments })
    }

    /// Build a path from already-split segments.
    pub fn from_segments<I, S>(segments: I) -> Result<Self, TypeError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out = Vec::new();
        for segment in segments {
            let segment = segment.into();
            if segment.is_empty() {
                return Err(TypeError::EmptySegment(out.join("/")));
            }
            validate_segment(&segment)?;
            out.push(segment);
        }
        Ok(Self { segments: out })
    }

    /// Returns `true` for the zero-segment path.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn segment(&self, index: usize) -> Option<&str> {
        self.segments.get(index).map(String::as_str)
    }

    /// Last segment, or `None` for the root.
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Parent path, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Append one segment.
    pub fn child(&self, name: &str) -> Result<Self, TypeError> {
        if name.is_empty() {
            return Err(TypeError::EmptySegment(format!("{self}/")));
        }
        validate_segment(name)?;
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Ok(Self { segments })
    }

    /// Concatenate a relative path onto this one.
    pub fn join(&self, relative: &ResourcePath) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(relative.segments.iter().cloned());
        Self { segments }
    }

    /// Returns `true` if `self` equals `other` or is one of its ancestors.
    pub fn is_prefix_of(&self, other: &ResourcePath) -> bool {
        other.segments.len() >= self.segments.len()
            && other.segments[..self.segments.len()] == self.segments[..]
    }

    /// The part of `self` below `prefix`, if `prefix` is a prefix of `self`.
    pub fn strip_prefix(&self, prefix: &ResourcePath) -> Option<Self> {
        if !prefix.is_prefix_of(self) {
            return None;
        }
        Some(Self {
            segments: self.segments[prefix.segments.len()..].to_vec(),
        })
    }

    /// Number of segments between `ancestor` and `self`, if `ancestor` is
    /// a prefix of `self`.
    pub fn distance_from(&self, ancestor: &ResourcePath) -> Option<usize> {
        ancestor
            .is_prefix_of(self)
            .then(|| self.segments.len() - ancestor.segments.len())
    }

    /// Resolve this path against a file-system base directory.
    pub fn to_fs_path(&self, base: &Path) -> PathBuf {
        let mut out = base.to_path_buf();
        for segment in &self.segments {
            out.push(segment);
        }
        out
    }
}

fn validate_segment(segment: &str) -> Result<(), TypeError> {
    if segment == "." || segment == ".." || segment.contains('/') || segment.contains('\0') {
        return Err(TypeError::InvalidSegment(segment.to_string()));
    }
    Ok(())
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return write!(f, "/");
        }
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourcePath({self})")
    }
}

impl std::str::FromStr for ResourcePath {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ResourcePath {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<ResourcePath> for String {
    fn from(path: ResourcePath) -> Self {
        path.to_string()
    }
}
