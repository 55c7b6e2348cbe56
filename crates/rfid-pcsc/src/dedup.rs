use std::collections::HashMap;

/// Tracks the last-known UID per reader so the engine emits `Identified`
/// only on a genuine transition into a new card, not on every poll of a card
/// still sitting on the reader. Cleared for a reader the moment it reports
/// not-present.
#[derive(Default)]
pub struct Dedup {
    last_known: HashMap<String, String>,
}

impl Dedup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call with `Some(uid)` when a card is present on `reader`, `None` when
    /// it isn't. Returns `Some(uid)` only the first time a given UID is seen
    /// after a gap (or after a different UID).
    pub fn observe(&mut self, reader: &str, uid: Option<&str>) -> Option<String> {
        match uid {
            None => {
                self.last_known.remove(reader);
                None
            }
            Some(uid) => {
                if self.last_known.get(reader).map(String::as_str) == Some(uid) {
                    None
                } else {
                    self.last_known.insert(reader.to_owned(), uid.to_owned());
                    Some(uid.to_owned())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_same_uid_twice_without_gap_emits_once() {
        let mut dedup = Dedup::new();
        assert_eq!(dedup.observe("reader0", Some("04A224")), Some("04A224".to_owned()));
        assert_eq!(dedup.observe("reader0", Some("04A224")), None);
        assert_eq!(dedup.observe("reader0", Some("04A224")), None);
    }

    #[test]
    fn not_present_then_same_uid_emits_again() {
        let mut dedup = Dedup::new();
        assert_eq!(dedup.observe("reader0", Some("04A224")), Some("04A224".to_owned()));
        assert_eq!(dedup.observe("reader0", None), None);
        assert_eq!(dedup.observe("reader0", Some("04A224")), Some("04A224".to_owned()));
    }

    #[test]
    fn different_uid_emits_immediately() {
        let mut dedup = Dedup::new();
        assert_eq!(dedup.observe("reader0", Some("AAAA")), Some("AAAA".to_owned()));
        assert_eq!(dedup.observe("reader0", Some("BBBB")), Some("BBBB".to_owned()));
    }

    #[test]
    fn readers_are_tracked_independently() {
        let mut dedup = Dedup::new();
        assert_eq!(dedup.observe("reader0", Some("AAAA")), Some("AAAA".to_owned()));
        assert_eq!(dedup.observe("reader1", Some("AAAA")), Some("AAAA".to_owned()));
    }
}
