use std::fmt::{Display, Formatter};

/// Identifier of one [`Client::run`](crate::Client::run) invocation, backed by ULID so log
/// lines from consecutive runs sort by start time.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct RunId(ulid::Ulid);

impl RunId {
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RunId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
