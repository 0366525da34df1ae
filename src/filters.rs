// Journal match filters, per spec §3 (Data model / Match) and §4.2.
//
// A `Match` is a `(FIELD, value)` pair with the field upper-cased before
// use. A list of matches combines as logical AND; `MatchGroup::Or` combines
// as logical OR (used by the `/v2/component` routes to match either `UNIT`
// or `_SYSTEMD_UNIT`).

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub field: String,
    pub value: String,
}

impl Match {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into().to_uppercase(),
            value: value.into(),
        }
    }

    /// The `sd_journal_add_match` wire form: `FIELD=value`.
    pub fn as_native(&self) -> String {
        format!("{}={}", self.field, self.value)
    }
}

/// Parse a `field:value` filter parameter, per the Request Binder table
/// in §4.5.
pub fn parse_filter_param(raw: &str) -> Option<Match> {
    let (field, value) = raw.split_once(':')?;

    if field.is_empty() {
        return None;
    }

    Some(Match::new(field, value))
}

/// A full filter specification for one journal request: a conjunction of
/// `Match`es, and optionally a disjunction group layered on top (used by
/// the component-name routes, which OR `UNIT` and `_SYSTEMD_UNIT`).
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    pub and: Vec<Match>,
    pub or: Vec<Match>,
}

impl FilterSet {
    pub fn is_empty(&self) -> bool {
        self.and.is_empty() && self.or.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_is_uppercased() {
        let m = Match::new("container_id", "abc");
        assert_eq!(m.field, "CONTAINER_ID");
        assert_eq!(m.as_native(), "CONTAINER_ID=abc");
    }

    #[test]
    fn parses_key_value_filter() {
        let m = parse_filter_param("UNIT:tacd.service").unwrap();
        assert_eq!(m.field, "UNIT");
        assert_eq!(m.value, "tacd.service");
    }

    #[test]
    fn rejects_filter_without_colon() {
        assert!(parse_filter_param("nocolon").is_none());
    }
}
