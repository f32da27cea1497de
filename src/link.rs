//! The link model: edge endpoints on a [`crate::node::Node`].

use std::fmt;

use crate::error::StoreError;

/// Which way a [`Link`] points relative to the node carrying it.
///
/// `Out` means the node emits the tag (it is a source for traversal); `In` means the node is
/// discoverable as a destination for the tag; `Bidir` is both at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    In,
    Out,
    Bidir,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
            Direction::Bidir => "bidir",
        }
    }

    /// Parse the wire representation of a direction.
    ///
    /// Unlike the write path (where a `Direction` is already one of the three closed variants by
    /// construction), this is the one place an unrecognized value can appear: a `links_blob` read
    /// back from storage that was written by a different version of this code, or by hand. This
    /// must be a decode error, not a silent default.
    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "in" => Ok(Direction::In),
            "out" => Ok(Direction::Out),
            "bidir" => Ok(Direction::Bidir),
            other => Err(StoreError::Input(format!(
                "unrecognized link direction '{other}'"
            ))),
        }
    }

    pub fn emits_out(self) -> bool {
        matches!(self, Direction::Out | Direction::Bidir)
    }

    pub fn accepts_in(self) -> bool {
        matches!(self, Direction::In | Direction::Bidir)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An edge endpoint: a `kind`/`tag` pair plus the direction it points.
///
/// Equality and hashing are by the full triple, so two links with the same kind/tag/direction are
/// interchangeable in a set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Link {
    pub kind: String,
    pub tag: String,
    pub direction: Direction,
}

impl Link {
    pub fn new(kind: impl Into<String>, tag: impl Into<String>, direction: Direction) -> Self {
        Self {
            kind: kind.into(),
            tag: tag.into(),
            direction,
        }
    }

    pub fn outgoing(kind: impl Into<String>, tag: impl Into<String>) -> Self {
        Self::new(kind, tag, Direction::Out)
    }

    pub fn incoming(kind: impl Into<String>, tag: impl Into<String>) -> Self {
        Self::new(kind, tag, Direction::In)
    }

    pub fn bidir(kind: impl Into<String>, tag: impl Into<String>) -> Self {
        Self::new(kind, tag, Direction::Bidir)
    }

    /// The `(kind, tag)` pair this link is keyed by in the targets table.
    pub fn tag_key(&self) -> (String, String) {
        (self.kind.clone(), self.tag.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_round_trips_through_its_wire_string() {
        for d in [Direction::In, Direction::Out, Direction::Bidir] {
            assert_eq!(Direction::parse(d.as_str()).unwrap(), d);
        }
    }

    #[test]
    fn direction_parse_rejects_unknown_values() {
        assert!(Direction::parse("sideways").is_err());
    }

    #[test]
    fn links_hash_and_eq_by_triple() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(Link::outgoing("hyperlink", "T"));
        set.insert(Link::outgoing("hyperlink", "T"));
        assert_eq!(set.len(), 1);
        set.insert(Link::incoming("hyperlink", "T"));
        assert_eq!(set.len(), 2);
    }
}
