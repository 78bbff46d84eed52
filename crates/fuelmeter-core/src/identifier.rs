use std::{fmt::Display, ops::Deref};

use uuid::Uuid;

/// Opaque identifier correlating every point and response of one trip.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TraceId(String);

impl TraceId {
    const KEY_PREFIX: &str = "TRACE_ID:";

    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Key under which the trace's points are buffered.
    #[must_use]
    pub fn store_key(&self) -> String {
        format!("{}{}", Self::KEY_PREFIX, self.0)
    }
}

impl Deref for TraceId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(TraceId::generate(), TraceId::generate());
    }

    #[test]
    fn store_key_is_prefixed() {
        let id = TraceId::generate();
        assert_eq!(id.store_key(), format!("TRACE_ID:{id}"));
    }
}
