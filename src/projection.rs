use crate::source_map::SourceMap;
use std::{
    fmt::{self, Display, Formatter},
    sync::Arc,
};

/// One of the two textual syntaxes a compiled unit can be shown in.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Projection {
    #[default]
    Primary,
    Derived,
}
impl Projection {
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Projection::Primary => Projection::Derived,
            Projection::Derived => Projection::Primary,
        }
    }
}
impl Display for Projection {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Projection::Primary => write!(f, "primary"),
            Projection::Derived => write!(f, "derived"),
        }
    }
}

/// Text of one projection together with the map for exactly that text.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ProjectionView {
    pub text: Arc<str>,
    pub source_map: Arc<SourceMap>,
}
impl ProjectionView {
    pub fn new(text: impl Into<Arc<str>>, source_map: SourceMap) -> Self {
        Self {
            text: text.into(),
            source_map: Arc::new(source_map),
        }
    }
}

/// A value per projection.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PerProjection<T> {
    pub primary: T,
    pub derived: T,
}
impl<T> PerProjection<T> {
    pub fn new(primary: T, derived: T) -> Self {
        Self { primary, derived }
    }
    pub fn from_fn(mut create: impl FnMut(Projection) -> T) -> Self {
        Self {
            primary: create(Projection::Primary),
            derived: create(Projection::Derived),
        }
    }

    pub fn get(&self, projection: Projection) -> &T {
        match projection {
            Projection::Primary => &self.primary,
            Projection::Derived => &self.derived,
        }
    }
    pub fn get_mut(&mut self, projection: Projection) -> &mut T {
        match projection {
            Projection::Primary => &mut self.primary,
            Projection::Derived => &mut self.derived,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Projection, &T)> {
        [
            (Projection::Primary, &self.primary),
            (Projection::Derived, &self.derived),
        ]
        .into_iter()
    }
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Projection, &mut T)> {
        [
            (Projection::Primary, &mut self.primary),
            (Projection::Derived, &mut self.derived),
        ]
        .into_iter()
    }
}
